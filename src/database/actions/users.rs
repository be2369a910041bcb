use sqlx::{Pool, Postgres};

use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::{generate_jwt_session, SessionData},
    },
    constants::RESERVED_USERNAMES,
    error::{Error, ErrorKind, QueryError},
    schema::{Credentials, NewUser, PasswordChange, TokenResponse, User, UserView, Uuid},
};

use super::follows::is_following;

pub async fn get_user_by_email(
    pool: &Pool<Postgres>,
    email: &str,
) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(row)
}

pub async fn get_user_by_id(pool: &Pool<Postgres>, user_id: i32) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(row)
}

/// Creates an account. The e-mail address is the login identity and must be
/// unique; the password is stored argon2-hashed.
pub async fn register_user(new_user: &NewUser, pool: &Pool<Postgres>) -> Result<Uuid, Error> {
    if RESERVED_USERNAMES.contains(&new_user.username.as_str()) {
        return Err(ErrorKind::Validation.new("This username is not available"));
    }

    let password = hash_password(&new_user.password)
        .map_err(|_| ErrorKind::Internal.new("Failed to hash password"))?;

    let row: Option<(Uuid,)> = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT DO NOTHING RETURNING id;
    ",
    )
    .bind(&new_user.email)
    .bind(&new_user.username)
    .bind(&new_user.first_name)
    .bind(&new_user.last_name)
    .bind(password)
    .fetch_optional(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    match row {
        Some((id,)) => Ok(id),
        None => Err(ErrorKind::Validation.new("Email is already registered")),
    }
}

/// Exchanges credentials for a signed session token. Invalid e-mail and
/// invalid password answer identically.
pub async fn login_user(
    credentials: &Credentials,
    pool: &Pool<Postgres>,
) -> Result<TokenResponse, Error> {
    let user = match get_user_by_email(pool, &credentials.email).await? {
        Some(user) => user,
        None => {
            log::warn!("login rejected for {}", credentials.email);
            return Err(ErrorKind::Validation.new("Invalid credentials"));
        }
    };

    let authenticated = verify_password(&credentials.password, &user.password)
        .map_err(|_| ErrorKind::Internal.new("Stored password hash is malformed"))?;
    if !authenticated {
        log::warn!("login rejected for {}", credentials.email);
        return Err(ErrorKind::Validation.new("Invalid credentials"));
    }

    let auth_token = generate_jwt_session(&user)?;
    Ok(TokenResponse { auth_token })
}

/// Invalidates every outstanding token of the user by bumping the serial the
/// tokens were signed with.
pub async fn revoke_tokens(user_id: i32, pool: &Pool<Postgres>) -> Result<(), Error> {
    sqlx::query("UPDATE users SET token_serial = token_serial + 1 WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(())
}

/// Re-checks a verified token against the store: the account must still exist
/// and the serial embedded in the token must match the current one.
pub async fn check_session(session: &SessionData, pool: &Pool<Postgres>) -> Result<(), Error> {
    let user = get_user_by_id(pool, session.user_id).await?;

    match user {
        Some(user) if user.token_serial == session.token_serial => Ok(()),
        _ => Err(ErrorKind::AuthenticationRequired.new("Session has been revoked")),
    }
}

pub async fn set_password(
    user_id: i32,
    change: &PasswordChange,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let user = get_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| ErrorKind::NotFound.new("No user exists with specified id"))?;

    let authenticated = verify_password(&change.current_password, &user.password)
        .map_err(|_| ErrorKind::Internal.new("Stored password hash is malformed"))?;
    if !authenticated {
        return Err(ErrorKind::Validation.new("Current password does not match"));
    }

    let password = hash_password(&change.new_password)
        .map_err(|_| ErrorKind::Internal.new("Failed to hash password"))?;

    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(password)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(())
}

/// Composes the user representation for a given viewer. `is_subscribed` is
/// `false` for anonymous viewers and for the viewer's own row.
pub async fn view_user(
    user: &User,
    viewer: Option<&SessionData>,
    pool: &Pool<Postgres>,
) -> Result<UserView, Error> {
    let is_subscribed = match viewer {
        Some(session) if session.user_id != user.id => {
            is_following(session.user_id, user.id, pool).await?
        }
        _ => false,
    };

    Ok(UserView {
        id: user.id,
        email: user.email.to_owned(),
        username: user.username.to_owned(),
        first_name: user.first_name.to_owned(),
        last_name: user.last_name.to_owned(),
        is_subscribed,
    })
}
