use thiserror::Error;

/// Application-wide error types.
///
/// These abort an import or override pass before reconciliation starts, or
/// surface a failure of the session bookkeeping around it.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Archive unreadable: {0}")]
    ArchiveUnreadable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Helper conversion from anyhow::Error
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Failure reported by an external collaborator (content, binary, job stores).
///
/// Uniqueness collisions are not errors: stores report them through
/// [`crate::db::repository::WriteOutcome::Conflict`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Backend(String),
}

/// Why a single document or attachment could not be reconciled.
///
/// Caught at the item boundary and turned into counters; never aborts a pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemError {
    #[error("no handler registered for content type '{0}'")]
    UnsupportedType(String),

    #[error("import is disabled for content type '{0}'")]
    ImportDisabled(String),

    #[error("draft of document '{0}' failed to import")]
    DependentDraftFailed(String),

    #[error("document '{0}' collides with an existing record")]
    UniqueConstraint(String),

    #[error("related documents have not been imported for attachment '{0}'")]
    OrphanAttachment(String),

    #[error("attachment '{0}' is not part of the archive")]
    MissingAttachment(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
