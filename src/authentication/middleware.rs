use warp::{reject::Rejection, Filter};

use crate::database::error::ErrorKind;

use super::jwt::{verify_jwt_session, SessionData};

/// Pulls the bearer token out of an `Authorization` header value. Both the
/// `Token` and `Bearer` schemes are accepted.
fn token_from_header(value: &str) -> Option<&str> {
    value
        .strip_prefix("Token ")
        .or_else(|| value.strip_prefix("Bearer "))
        .map(str::trim)
}

pub fn with_session() -> impl Filter<Extract = (SessionData,), Error = Rejection> + Copy {
    warp::header::<String>("authorization").and_then(|header: String| async move {
        match token_from_header(&header).map(|token| verify_jwt_session(token.to_string())) {
            Some(Ok(claims)) => Ok(SessionData::from(claims)),
            Some(Err(error)) => Err(warp::reject::custom(error)),
            None => Err(warp::reject::custom(
                ErrorKind::AuthenticationRequired.new("Missing bearer token"),
            )),
        }
    })
}

pub fn with_possible_session(
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Copy {
    warp::header::optional::<String>("authorization").map(|header: Option<String>| {
        header
            .as_deref()
            .and_then(token_from_header)
            .and_then(|token| verify_jwt_session(token.to_string()).ok())
            .map(SessionData::from)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_schemes_are_recognized() {
        assert_eq!(token_from_header("Token abc.def"), Some("abc.def"));
        assert_eq!(token_from_header("Bearer abc.def"), Some("abc.def"));
        assert_eq!(token_from_header("Basic abc"), None);
    }
}
