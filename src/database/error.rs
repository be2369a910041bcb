use std::convert::Infallible;
use std::fmt::{self, Display};

use serde_json::json;
use warp::http::StatusCode;
use warp::reject::{Reject, Rejection};
use warp::Reply;

/// Error taxonomy shared by every action in the crate. The kind decides the
/// HTTP status a consuming server should answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    AuthenticationRequired,
    PermissionDenied,
    NotFound,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::AuthenticationRequired => 401,
            ErrorKind::PermissionDenied => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Internal => 500,
        }
    }

    pub fn new(self, info: &str) -> Error {
        Error {
            kind: self,
            info: Some(info.to_string()),
        }
    }

    pub fn default(self) -> Error {
        Error {
            kind: self,
            info: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub info: Option<String>,
}

impl Error {
    pub fn status(&self) -> u16 {
        self.kind.status()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.info {
            Some(info) => write!(f, "{} ({info})", self.status()),
            None => write!(f, "{}", self.status()),
        }
    }
}

impl std::error::Error for Error {}

// warp's blanket impl turns any Reject into a Rejection.
impl Reject for Error {}

/// Wrapper around `sqlx::Error` so store failures surface with a uniform
/// message before they collapse into the crate error type.
#[derive(Debug, thiserror::Error)]
#[error("{info}")]
pub struct QueryError {
    info: String,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => Self::new(String::from("no matching row")),
            sqlx::Error::Database(e) => Self::new(format!("database: {e}")),
            sqlx::Error::PoolTimedOut => Self::new(String::from("connection pool timed out")),
            sqlx::Error::PoolClosed => Self::new(String::from("connection pool closed")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("failed to decode column {index}: {source}"))
            }
            other => Self::new(format!("{other}")),
        }
    }
}

impl Into<Error> for QueryError {
    fn into(self) -> Error {
        log::error!("query failed: {self}");
        ErrorKind::Internal.new(&self.to_string())
    }
}

/// Rejection handler for servers built on the crate's filters. Turns an
/// [`Error`] into a JSON body with the matching status code.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, detail) = if let Some(error) = err.find::<Error>() {
        (
            StatusCode::from_u16(error.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            error.info.clone().unwrap_or_default(),
        )
    } else if err.find::<warp::reject::MissingHeader>().is_some() {
        (
            StatusCode::UNAUTHORIZED,
            String::from("Missing authorization header"),
        )
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, String::new())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, String::new())
    };

    let body = warp::reply::json(&json!({ "detail": detail }));
    Ok(warp::reply::with_status(body, status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_expected_status_codes() {
        assert_eq!(ErrorKind::Validation.status(), 400);
        assert_eq!(ErrorKind::AuthenticationRequired.status(), 401);
        assert_eq!(ErrorKind::PermissionDenied.status(), 403);
        assert_eq!(ErrorKind::NotFound.status(), 404);
        assert_eq!(ErrorKind::Internal.status(), 500);
    }

    #[test]
    fn errors_convert_into_rejections() {
        let rejection: Rejection = ErrorKind::NotFound.new("missing").into();
        let found = rejection.find::<Error>().expect("error should round-trip");
        assert_eq!(found.kind, ErrorKind::NotFound);
    }

    #[test]
    fn query_error_collapses_to_internal() {
        let error: Error = Into::into(QueryError::from(sqlx::Error::PoolTimedOut));
        assert_eq!(error.kind, ErrorKind::Internal);
    }
}
