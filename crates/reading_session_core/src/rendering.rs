//! crates/reading_session_core/src/rendering.rs
//!
//! The rendering adapter: the session's only handle onto a loaded document.
//!
//! It narrows whatever engine is plugged in to the handful of operations the
//! session needs and translates engine failures into `SessionError`s.

use tracing::warn;

use crate::domain::{Location, RenderedPage, TocItem};
use crate::error::SessionError;
use crate::ports::{PercentageEstimate, PortError, RenderedDocument, RenderingEngine};
use crate::progress_store::clamp_percentage;
use crate::settings::{DisplayStyle, ReaderSettings};

pub struct RenderingAdapter {
    document: Box<dyn RenderedDocument>,
    applied_style: Option<DisplayStyle>,
}

impl RenderingAdapter {
    /// Opens `document_url` with the given engine.
    pub async fn open(
        engine: &dyn RenderingEngine,
        document_url: &str,
    ) -> Result<Self, SessionError> {
        let document = engine.open(document_url).await.map_err(|e| match e {
            PortError::Corrupt(reason) => SessionError::DocumentCorrupt(reason),
            PortError::Unavailable(reason) | PortError::NotFound(reason) => {
                SessionError::DocumentUnavailable(reason)
            }
            other => SessionError::DocumentUnavailable(other.to_string()),
        })?;
        Ok(Self::new(document))
    }

    pub fn new(document: Box<dyn RenderedDocument>) -> Self {
        Self {
            document,
            applied_style: None,
        }
    }

    pub fn current_location(&self) -> Option<Location> {
        self.document.current_location()
    }

    pub fn current_page(&self) -> Option<RenderedPage> {
        self.document.current_page()
    }

    pub async fn display_at(&mut self, target: &str) -> Result<Location, SessionError> {
        self.document
            .display_at(target)
            .await
            .map_err(|e| navigation_error(target, e))
    }

    pub async fn next(&mut self) -> Result<Option<Location>, SessionError> {
        self.document.next().await.map_err(SessionError::Rendering)
    }

    pub async fn previous(&mut self) -> Result<Option<Location>, SessionError> {
        self.document.previous().await.map_err(SessionError::Rendering)
    }

    /// Percentage of the document before `location`, clamped to `0..=100`.
    pub async fn compute_percentage(&self, location: &Location) -> PercentageEstimate {
        match self.document.compute_percentage(location).await {
            PercentageEstimate::Resolved(value) => {
                PercentageEstimate::Resolved(clamp_percentage(value))
            }
            PercentageEstimate::Unresolved => PercentageEstimate::Unresolved,
        }
    }

    /// The document's table of contents; empty if the engine cannot provide one.
    pub async fn table_of_contents(&self) -> Vec<TocItem> {
        match self.document.table_of_contents().await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Table of contents unavailable.");
                Vec::new()
            }
        }
    }

    /// Restyles the document for `settings`. Returns `false` when the derived
    /// style is already in effect and the engine was left untouched.
    pub fn apply_display_settings(&mut self, settings: &ReaderSettings) -> bool {
        let style = DisplayStyle::from_settings(settings);
        if self.applied_style.as_ref() == Some(&style) {
            return false;
        }
        self.document.apply_style(&style);
        self.applied_style = Some(style);
        true
    }

    /// CSS for the style currently in effect.
    pub fn stylesheet(&self) -> Option<String> {
        self.applied_style.as_ref().map(DisplayStyle::to_css)
    }
}

fn navigation_error(target: &str, error: PortError) -> SessionError {
    match error {
        PortError::NotFound(_) => SessionError::LocationNotFound(target.to_string()),
        other => SessionError::Rendering(other),
    }
}
