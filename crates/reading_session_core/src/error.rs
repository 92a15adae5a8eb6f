//! crates/reading_session_core/src/error.rs
//!
//! Errors surfaced by a reading session to its owner.
//!
//! Persistence failures never appear here: they are logged where they happen and
//! the session carries on.

use crate::ports::PortError;
use crate::session::SessionPhase;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The document could not be fetched (network, permission or missing file).
    #[error("Document unavailable: {0}")]
    DocumentUnavailable(String),

    /// The document was fetched but the engine cannot parse it.
    #[error("Document could not be read: {0}")]
    DocumentCorrupt(String),

    /// A navigation target that the engine cannot resolve.
    #[error("Location not found: {0}")]
    LocationNotFound(String),

    #[error("Session is not ready (currently {0:?})")]
    NotReady(SessionPhase),

    #[error("Session is closed")]
    Closed,

    /// Any other failure reported by the rendering engine after open.
    #[error("Rendering error: {0}")]
    Rendering(#[source] PortError),
}

impl SessionError {
    /// Failures that end the session and should send the reader back to the library.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::DocumentUnavailable(_) | SessionError::DocumentCorrupt(_)
        )
    }
}
