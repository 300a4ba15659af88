use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Market data fetch failed for {symbol}: {reason}")]
    DataFetch { symbol: String, reason: String },

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Order execution failed: {0}")]
    Execution(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification the orchestrator branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DataFetch,
    InvalidSignal,
    Execution,
    Persistence,
    Config,
    Fatal,
}

impl Error {
    pub fn data_fetch(symbol: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::DataFetch {
            symbol: symbol.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DataFetch { .. } | Error::Http(_) => ErrorKind::DataFetch,
            Error::InvalidSignal(_) => ErrorKind::InvalidSignal,
            Error::Execution(_) => ErrorKind::Execution,
            Error::Persistence(_) | Error::Database(_) | Error::Migrate(_) => {
                ErrorKind::Persistence
            }
            Error::Config(_) => ErrorKind::Config,
            Error::Json(_) | Error::Io(_) | Error::Other(_) => ErrorKind::Fatal,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_errors_classify_as_persistence() {
        let err = Error::from(sqlx::Error::RowNotFound);
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }

    #[test]
    fn data_fetch_message_names_symbol() {
        let err = Error::data_fetch("BTCUSDT", "timeout");
        assert_eq!(err.kind(), ErrorKind::DataFetch);
        assert!(err.to_string().contains("BTCUSDT"));
    }
}
