//! Text-completion seam. Implementations live outside the core (HTTP
//! clients in the CLI, scripted stubs in tests).

use async_trait::async_trait;
use thiserror::Error;

/// Infrastructure failures of a completion call. All are fatal for the
/// request and safe to retry at the caller's discretion.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("completion timed out after {0}s")]
    Timeout(u64),

    #[error("completion transport error: {0}")]
    Transport(String),

    #[error("completion provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("malformed completion response: {0}")]
    Malformed(String),
}

/// `complete(system, user) -> text`, expected to run at temperature 0 with a
/// bounded timeout.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError>;
}
