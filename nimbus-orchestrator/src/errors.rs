use thiserror::Error;

/// Failures raised by the orchestrator itself, as opposed to `CloudError`s
/// propagated from the cloud client.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Rejected before any cloud call is made.
    #[error("invalid node name `{name}`: {reason}")]
    InvalidName { name: String, reason: String },

    /// Tag persistence kept failing; the orphaned instance has been deleted.
    #[error("failed to persist tags for instance {id} after {attempts} attempts")]
    TaggingFailed { id: String, attempts: u32 },
}
