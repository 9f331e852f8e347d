use thiserror::Error;

/// Errors surfaced by a record store
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),

    #[error("store command failed: {0}")]
    Command(String),

    #[error("invalid search query: {0}")]
    Query(String),

    #[error("unexpected store reply: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            return StoreError::Connection(err.to_string());
        }

        let message = err.to_string();
        if message.contains("Syntax error") || message.contains("Unknown field") {
            StoreError::Query(message)
        } else if err.kind() == redis::ErrorKind::TypeError {
            StoreError::Decode(message)
        } else {
            StoreError::Command(message)
        }
    }
}
