use thiserror::Error;

/// Error taxonomy for cloud API calls. Callers lean on the variants to decide
/// what is recoverable: `NotFound` is swallowed by idempotent deletes,
/// `Conflict` is recovered by fetching the pre-existing resource,
/// `QuotaExceeded` is fatal for the single call that hit it.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("resource not found")]
    NotFound,

    #[error("resource already exists: {0}")]
    Conflict(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("cloud api error: status={status} body={body}")]
    Api { status: u16, body: String },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl CloudError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound)
    }
}
