//! crates/reading_session_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the reading session core.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the database, the device storage and the rendering engine.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    BookActivity, Ebook, EbookId, Location, ReadingProgress, RenderedPage, TocItem,
};
use crate::settings::DisplayStyle;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Resource unavailable: {0}")]
    Unavailable(String),
    #[error("Unreadable content: {0}")]
    Corrupt(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Persistence Ports
//=========================================================================================

/// Storage for reading positions, keyed uniquely on `(user_id, ebook_id)`.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Returns `Ok(None)` when the reader has never saved a position for this ebook.
    async fn fetch(&self, user_id: Uuid, ebook_id: EbookId) -> PortResult<Option<ReadingProgress>>;

    /// Inserts the row or replaces location, percentage and timestamp of the existing one.
    async fn upsert(&self, progress: &ReadingProgress) -> PortResult<()>;
}

/// Device-scoped key/value storage holding serialized records.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> PortResult<()>;
}

/// Append-only activity log.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn record(&self, activity: &BookActivity) -> PortResult<()>;
}

//=========================================================================================
// Collaborator Ports
//=========================================================================================

/// Resolves ebook ids to fetchable documents.
#[async_trait]
pub trait LibraryCatalog: Send + Sync {
    async fn get_ebook(&self, ebook_id: EbookId) -> PortResult<Ebook>;
}

/// Resolves a browser login session to the user it belongs to.
#[async_trait]
pub trait AuthSessionLookup: Send + Sync {
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;
}

//=========================================================================================
// Rendering Ports
//=========================================================================================

/// Result of mapping a location onto the whole document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PercentageEstimate {
    Resolved(f64),
    /// The engine cannot place the location yet, e.g. while it is still indexing.
    Unresolved,
}

/// A pagination/rendering engine able to load documents.
#[async_trait]
pub trait RenderingEngine: Send + Sync {
    /// Loads the document behind `document_url`.
    ///
    /// Fails with `PortError::Unavailable`, `NotFound` or `Unauthorized` when the bytes
    /// cannot be fetched and with `PortError::Corrupt` when they cannot be parsed.
    async fn open(&self, document_url: &str) -> PortResult<Box<dyn RenderedDocument>>;
}

/// A loaded document and its live rendering surface.
#[async_trait]
pub trait RenderedDocument: Send + Sync {
    fn current_location(&self) -> Option<Location>;

    fn current_page(&self) -> Option<RenderedPage>;

    /// Shows the given location or table-of-contents href.
    /// Returns `PortError::NotFound` when the target does not resolve.
    async fn display_at(&mut self, target: &str) -> PortResult<Location>;

    /// Turns one page forward. `Ok(None)` at the end of the document.
    async fn next(&mut self) -> PortResult<Option<Location>>;

    /// Turns one page back. `Ok(None)` at the start of the document.
    async fn previous(&mut self) -> PortResult<Option<Location>>;

    async fn compute_percentage(&self, location: &Location) -> PercentageEstimate;

    /// Resolves once the document's navigation metadata has loaded.
    async fn table_of_contents(&self) -> PortResult<Vec<TocItem>>;

    /// Replaces the default style and re-renders the current page in place.
    fn apply_style(&mut self, style: &DisplayStyle);
}
