use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::database::error::{Error, ErrorKind};
use crate::database::schema::{User, UserRole};

use super::permissions::ActionType;

const SESSION_LIFETIME_HOURS: i64 = 24;

fn signing_key() -> Result<Hmac<Sha256>, Error> {
    let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        log::warn!("JWT_SECRET is not set, falling back to the development key");
        String::from("secret")
    });
    Hmac::new_from_slice(secret.as_bytes())
        .map_err(|_| ErrorKind::Internal.new("Invalid signing key"))
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: i32,
    pub email: String,
    pub role: UserRole,
    pub token_serial: i32,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: i32, email: String, role: UserRole, token_serial: i32) -> Self {
        let now = Local::now();
        let iat = now.timestamp();
        let exp = (now + Duration::hours(SESSION_LIFETIME_HOURS)).timestamp();

        Self {
            user_id: id,
            email,
            role,
            token_serial,
            iat,
            exp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionData {
    pub user_id: i32,
    pub email: String,
    pub role: UserRole,
    pub token_serial: i32,
    pub is_admin: bool,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), Error> {
        if !action.authenticate(self) {
            return Err(ErrorKind::PermissionDenied
                .new("You don't have permission to perform this action"));
        }
        Ok(())
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            user_id: value.user_id,
            email: value.email,
            is_admin: value.role == UserRole::Admin,
            role: value.role,
            token_serial: value.token_serial,
        }
    }
}

pub fn generate_jwt_session(user: &User) -> Result<String, Error> {
    let key = signing_key()?;
    let claims = JwtSessionData::new(
        user.id,
        user.email.to_owned(),
        user.role.to_owned(),
        user.token_serial,
    );

    claims
        .sign_with_key(&key)
        .map_err(|_| ErrorKind::Internal.new("Failed to sign session token"))
}

pub fn verify_jwt_session(token: String) -> Result<JwtSessionData, Error> {
    let key = signing_key()?;

    token
        .verify_with_key(&key)
        .map_err(|_| ErrorKind::AuthenticationRequired.new("Invalid session token"))
        .map(|session: JwtSessionData| {
            let now = Local::now().timestamp();

            if (session.exp - now).is_negative() {
                return Err(ErrorKind::AuthenticationRequired.new("Session token expired"));
            }
            Ok(session)
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::schema::{User, UserRole};

    fn test_user() -> User {
        User {
            id: 7,
            email: String::from("cook@example.com"),
            username: String::from("cook"),
            first_name: String::from("Cook"),
            last_name: String::from("Example"),
            password: String::new(),
            role: UserRole::User,
            token_serial: 3,
        }
    }

    #[test]
    fn token_round_trips() {
        let token = generate_jwt_session(&test_user()).unwrap();
        let claims = verify_jwt_session(token).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.email, "cook@example.com");
        assert_eq!(claims.token_serial, 3);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let mut token = generate_jwt_session(&test_user()).unwrap();
        token.push('x');
        let err = verify_jwt_session(token).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AuthenticationRequired);
    }

    #[test]
    fn expired_token_is_rejected() {
        let key = signing_key().unwrap();
        let now = Local::now().timestamp();
        let claims = JwtSessionData {
            user_id: 7,
            email: String::from("cook@example.com"),
            role: UserRole::User,
            token_serial: 0,
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = claims.sign_with_key(&key).unwrap();
        let err = verify_jwt_session(token).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AuthenticationRequired);
    }

    #[test]
    fn admin_flag_follows_role() {
        let mut user = test_user();
        user.role = UserRole::Admin;
        let token = generate_jwt_session(&user).unwrap();
        let session: SessionData = verify_jwt_session(token).unwrap().into();
        assert!(session.is_admin);
    }
}
