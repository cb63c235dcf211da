use axum::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unreachable: {0}")]
    Unavailable(String),

    #[error("Corrupt value under {key}: {value}")]
    Corrupt { key: String, value: String },
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Please enter a non-empty name")]
    InvalidName,

    #[error("You already voted")]
    AlreadyVoted,

    #[error("{}", store_message(.0))]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MalformedPayload | AppError::InvalidName => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::AlreadyVoted => StatusCode::CONFLICT,
            AppError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Store(StoreError::Corrupt { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn store_message(e: &StoreError) -> &'static str {
    match e {
        StoreError::Unavailable(_) => "Store unreachable, showing last known counts",
        StoreError::Corrupt { .. } => "Stored vote data is corrupt, please reset",
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value: {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_store_is_503() {
        let e = AppError::from(StoreError::Unavailable("connection refused".to_string()));

        assert_eq!(e.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(e.to_string(), "Store unreachable, showing last known counts");
    }

    #[test]
    fn test_corrupt_store_is_500() {
        let e = AppError::from(StoreError::Corrupt {
            key: "votes:voters/ada".to_string(),
            value: "maybe".to_string(),
        });

        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(e.to_string().contains("corrupt"));
    }

    #[test]
    fn test_user_errors_are_client_side() {
        assert_eq!(AppError::InvalidName.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(AppError::AlreadyVoted.status(), StatusCode::CONFLICT);
    }
}
