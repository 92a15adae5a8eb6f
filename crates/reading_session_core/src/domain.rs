//! crates/reading_session_core/src/domain.rs
//!
//! Defines the pure, core data structures for a reading session.
//! These structs are independent of any database, rendering engine or wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of an ebook in the library catalog.
pub type EbookId = i64;

/// An opaque, engine-defined position inside a rendered document.
///
/// Only the rendering engine interprets the contents. Everything else stores,
/// compares and forwards it as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Location {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for Location {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// The saved reading position for one (user, ebook) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingProgress {
    pub user_id: Uuid,
    pub ebook_id: EbookId,
    pub location: Location,
    /// Completion in `0.0..=100.0`. Readers may move backwards, so this can decrease.
    pub progress_percentage: f64,
    pub last_read_at: DateTime<Utc>,
}

/// The kinds of events recorded in the book activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Read,
    Download,
    Send,
}

impl ActivityType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::Read => "read",
            ActivityType::Download => "download",
            ActivityType::Send => "send",
        }
    }
}

/// One append-only entry in the book activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookActivity {
    pub ebook_id: EbookId,
    pub user_id: Uuid,
    pub activity_type: ActivityType,
}

/// A node of a document's table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocItem {
    pub label: String,
    /// A reference the rendering engine accepts in `display_at`.
    pub href: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subitems: Vec<TocItem>,
}

impl TocItem {
    pub fn new(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: href.into(),
            subitems: Vec::new(),
        }
    }

    pub fn with_subitems(mut self, subitems: Vec<TocItem>) -> Self {
        self.subitems = subitems;
        self
    }
}

/// A library entry as handed over by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ebook {
    pub id: EbookId,
    pub title: String,
    /// `None` when the file has not been published for in-browser reading.
    pub download_url: Option<String>,
}

/// Everything a reading session needs before it can open a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub user_id: Uuid,
    pub ebook_id: EbookId,
    pub title: String,
    pub document_url: String,
}

/// The content currently shown on the rendering surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedPage {
    pub location: Location,
    pub content: String,
}

/// The value shown on the progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct ProgressIndicator {
    pub percentage: f64,
    /// Set when the latest location could not be resolved, so `percentage`
    /// still reflects an earlier position.
    pub stale: bool,
}

impl ProgressIndicator {
    pub fn resolved(percentage: f64) -> Self {
        Self {
            percentage,
            stale: false,
        }
    }

    pub fn into_stale(self) -> Self {
        Self {
            stale: true,
            ..self
        }
    }
}
