use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("BSON: {0}")]
    Bson(#[from] bson::error::Error),

    #[error("Config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Logging: {0}")]
    Logging(String),

    #[error("Collection not found: {0}")]
    NoSuchCollection(String),

    #[error("Document not found: {0}")]
    NoSuchDocument(String),

    /// A deferred query was composed in a way the translator cannot express natively.
    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Value cannot be null. (Parameter '{0}')")]
    ArgumentNull(&'static str),

    #[error("Sequence contains no elements")]
    NoElements,

    #[error("Sequence contains more than one element")]
    MoreThanOneElement,

    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl DbError {
    pub(crate) fn not_supported(what: impl Into<String>) -> Self {
        Self::NotSupported(what.into())
    }

    /// True for the composition errors raised by the query translator.
    #[must_use]
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported(_))
    }
}
