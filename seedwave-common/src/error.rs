//! Error type shared by the Seedwave crates

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Storage, configuration and serialization failures
///
/// Pipeline failures have their own taxonomy in `seedwave-gen`; this type
/// covers what sits underneath it.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unreadable or invalid TOML configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stored state or cached payload failed to (de)serialize
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// SQLite reported `database is locked`; the operation may succeed on retry
    pub fn is_lock_contention(&self) -> bool {
        match self {
            Error::Database(db_err) => db_err.to_string().contains("database is locked"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_contention_detection() {
        let locked = Error::Database(sqlx::Error::Protocol("database is locked".to_string()));
        assert!(locked.is_lock_contention());

        let other = Error::Database(sqlx::Error::RowNotFound);
        assert!(!other.is_lock_contention());
        assert!(!Error::Config("database is locked".to_string()).is_lock_contention());
    }

    #[test]
    fn test_json_errors_convert() {
        let err: Error = serde_json::from_str::<Vec<u8>>("{").unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
