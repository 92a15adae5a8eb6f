//! crates/reading_session_core/src/progress_store.rs
//!
//! Loads and saves a reader's position in one ebook.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{EbookId, Location, ReadingProgress};
use crate::ports::{PortError, PortResult, ProgressRepository};

#[derive(Clone)]
pub struct ProgressStore {
    repository: Arc<dyn ProgressRepository>,
}

impl ProgressStore {
    pub fn new(repository: Arc<dyn ProgressRepository>) -> Self {
        Self { repository }
    }

    /// Returns the saved position, or `None` for a reader starting a new book.
    ///
    /// A failed lookup is logged and treated like a missing row so the reader can
    /// still open the book from the beginning.
    pub async fn load(&self, user_id: Uuid, ebook_id: EbookId) -> Option<ReadingProgress> {
        match self.repository.fetch(user_id, ebook_id).await {
            Ok(Some(progress)) => Some(progress),
            Ok(None) | Err(PortError::NotFound(_)) => {
                debug!(%user_id, ebook_id, "No saved reading progress.");
                None
            }
            Err(e) => {
                warn!(%user_id, ebook_id, error = %e, "Failed to load reading progress.");
                None
            }
        }
    }

    /// Upserts the position, stamping it with the current time.
    pub async fn save(
        &self,
        user_id: Uuid,
        ebook_id: EbookId,
        location: &Location,
        progress_percentage: f64,
    ) -> PortResult<ReadingProgress> {
        let progress = ReadingProgress {
            user_id,
            ebook_id,
            location: location.clone(),
            progress_percentage: clamp_percentage(progress_percentage),
            last_read_at: Utc::now(),
        };
        self.repository.upsert(&progress).await?;
        Ok(progress)
    }
}

/// Keeps a percentage inside `0.0..=100.0`; non-finite values become `0.0`.
pub fn clamp_percentage(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}
