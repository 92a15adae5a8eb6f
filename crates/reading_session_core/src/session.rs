//! crates/reading_session_core/src/session.rs
//!
//! The reading session controller.
//!
//! A `ReadingSession` is owned by exactly one task and driven by discrete
//! events: `start`, page turns, table-of-contents jumps, settings changes,
//! expired save timers and `close`. Every location change, whatever caused it,
//! goes through `on_location_changed`, which updates the progress indicator and
//! (re)arms a single debounced save.
//!
//! Each location change takes the next value of a sequence counter and the
//! pending save carries that value as its timer ticket. A ticket that no
//! longer matches the pending save is ignored, so a save for an older location
//! can never land after a newer one was recorded.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::domain::{
    ActivityType, BookActivity, EbookId, Location, OpenRequest, ProgressIndicator, RenderedPage,
    TocItem,
};
use crate::error::SessionError;
use crate::ports::{ActivityLog, PercentageEstimate, RenderingEngine};
use crate::progress_store::ProgressStore;
use crate::rendering::RenderingAdapter;
use crate::settings::ReaderSettings;
use crate::settings_store::SettingsStore;
use crate::timer::{DebounceTimer, TimerHandle};

/// Quiet period after the last page turn before the position is saved.
pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_secs(2);

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Initializing,
    Ready,
    /// Handling a location change; always returns to `Ready` before the event completes.
    Navigating,
    Closed,
    /// The document could not be opened. Terminal.
    Failed,
}

/// The collaborators a session is built from.
#[derive(Clone)]
pub struct SessionDeps {
    pub progress: ProgressStore,
    pub settings: SettingsStore,
    pub activity: Arc<dyn ActivityLog>,
    pub engine: Arc<dyn RenderingEngine>,
    pub timer: Arc<dyn DebounceTimer>,
    pub save_delay: Duration,
}

/// What the UI needs to redraw after a location change.
#[derive(Debug, Clone, PartialEq)]
pub struct Relocation {
    pub location: Location,
    pub progress: ProgressIndicator,
}

struct PendingSave {
    ticket: u64,
    location: Location,
    percentage: f64,
    timer: TimerHandle,
}

pub struct ReadingSession {
    request: OpenRequest,
    deps: SessionDeps,
    phase: SessionPhase,
    adapter: Option<RenderingAdapter>,
    settings: ReaderSettings,
    current_location: Option<Location>,
    progress: ProgressIndicator,
    sequence: u64,
    pending: Option<PendingSave>,
    read_recorded: bool,
}

impl ReadingSession {
    pub fn new(request: OpenRequest, deps: SessionDeps) -> Self {
        Self {
            request,
            deps,
            phase: SessionPhase::Initializing,
            adapter: None,
            settings: ReaderSettings::default(),
            current_location: None,
            progress: ProgressIndicator::default(),
            sequence: 0,
            pending: None,
            read_recorded: false,
        }
    }

    //=====================================================================================
    // Accessors
    //=====================================================================================

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn title(&self) -> &str {
        &self.request.title
    }

    pub fn ebook_id(&self) -> EbookId {
        self.request.ebook_id
    }

    pub fn settings(&self) -> ReaderSettings {
        self.settings
    }

    pub fn progress(&self) -> ProgressIndicator {
        self.progress
    }

    pub fn current_location(&self) -> Option<&Location> {
        self.current_location.as_ref()
    }

    pub fn current_page(&self) -> Option<RenderedPage> {
        self.adapter.as_ref().and_then(RenderingAdapter::current_page)
    }

    pub fn stylesheet(&self) -> Option<String> {
        self.adapter.as_ref().and_then(RenderingAdapter::stylesheet)
    }

    /// True while a debounced save is waiting for its timer.
    pub fn has_pending_save(&self) -> bool {
        self.pending.is_some()
    }

    //=====================================================================================
    // Lifecycle
    //=====================================================================================

    /// Loads settings and saved progress while the document opens, restores the
    /// saved position and records the `read` activity.
    ///
    /// On failure the session moves to `Failed` and stays there.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Initializing {
            return Err(SessionError::NotReady(self.phase));
        }
        let user_id = self.request.user_id;
        let ebook_id = self.request.ebook_id;
        info!(%user_id, ebook_id, title = %self.request.title, "Opening reading session.");

        let (settings, saved, opened) = tokio::join!(
            self.deps.settings.load(),
            self.deps.progress.load(user_id, ebook_id),
            RenderingAdapter::open(self.deps.engine.as_ref(), &self.request.document_url),
        );
        self.settings = settings;

        let mut adapter = match opened {
            Ok(adapter) => adapter,
            Err(e) => {
                error!(%user_id, ebook_id, error = %e, "Failed to open document.");
                self.phase = SessionPhase::Failed;
                return Err(e);
            }
        };
        adapter.apply_display_settings(&self.settings);

        let restored = match saved {
            Some(saved) => {
                self.progress = ProgressIndicator::resolved(saved.progress_percentage);
                match adapter.display_at(saved.location.as_str()).await {
                    Ok(location) => Some(location),
                    Err(e) => {
                        warn!(
                            %user_id,
                            ebook_id,
                            location = %saved.location,
                            error = %e,
                            "Saved location no longer resolves; starting from the beginning."
                        );
                        None
                    }
                }
            }
            None => None,
        };
        let initial = adapter.current_location();
        self.adapter = Some(adapter);
        self.phase = SessionPhase::Ready;

        match restored {
            // Restoring is a location change like any other; its save refreshes `last_read_at`.
            Some(location) => {
                self.on_location_changed(location).await?;
            }
            None => {
                // A fresh first page is not a move by the reader; nothing to save yet.
                if let Some(location) = initial {
                    self.progress = self.indicator_for(&location).await;
                    self.current_location = Some(location);
                }
            }
        }

        self.record_read_activity().await;
        info!(%user_id, ebook_id, location = ?self.current_location, "Reading session ready.");
        Ok(())
    }

    /// Flushes a pending save and releases the document. Further calls fail with
    /// `SessionError::Closed`.
    pub async fn close(&mut self) {
        if self.phase == SessionPhase::Closed {
            return;
        }
        if let Some(pending) = self.pending.take() {
            pending.timer.cancel();
            info!(
                ebook_id = self.request.ebook_id,
                location = %pending.location,
                "Flushing pending progress save before close."
            );
            self.persist(pending).await;
        }
        self.adapter = None;
        self.phase = SessionPhase::Closed;
        info!(ebook_id = self.request.ebook_id, "Reading session closed.");
    }

    //=====================================================================================
    // Navigation
    //=====================================================================================

    /// Turns one page forward. `Ok(None)` when already on the last page.
    pub async fn next_page(&mut self) -> Result<Option<Relocation>, SessionError> {
        let moved = self.ready_adapter()?.next().await?;
        match moved {
            Some(location) => self.on_location_changed(location).await.map(Some),
            None => Ok(None),
        }
    }

    /// Turns one page back. `Ok(None)` when already on the first page.
    pub async fn previous_page(&mut self) -> Result<Option<Relocation>, SessionError> {
        let moved = self.ready_adapter()?.previous().await?;
        match moved {
            Some(location) => self.on_location_changed(location).await.map(Some),
            None => Ok(None),
        }
    }

    /// Jumps to a table-of-contents href (or any location the engine accepts).
    pub async fn navigate_to(&mut self, href: &str) -> Result<Relocation, SessionError> {
        let location = self.ready_adapter()?.display_at(href).await?;
        self.on_location_changed(location).await
    }

    pub async fn table_of_contents(&mut self) -> Result<Vec<TocItem>, SessionError> {
        Ok(self.ready_adapter()?.table_of_contents().await)
    }

    /// The single handler for every location change.
    pub async fn on_location_changed(
        &mut self,
        location: Location,
    ) -> Result<Relocation, SessionError> {
        self.ready_adapter()?;
        self.phase = SessionPhase::Navigating;
        self.sequence += 1;
        let ticket = self.sequence;
        self.current_location = Some(location.clone());

        let estimate = match &self.adapter {
            Some(adapter) => adapter.compute_percentage(&location).await,
            None => PercentageEstimate::Unresolved,
        };
        match estimate {
            PercentageEstimate::Resolved(percentage) => {
                self.progress = ProgressIndicator::resolved(percentage);
                self.schedule_save(ticket, location.clone(), percentage);
            }
            PercentageEstimate::Unresolved => {
                self.progress = self.progress.into_stale();
                // An older pending position must not overwrite this newer one.
                self.cancel_pending();
                debug!(ticket, location = %location, "Percentage unresolved; skipping save.");
            }
        }

        self.phase = SessionPhase::Ready;
        Ok(Relocation {
            location,
            progress: self.progress,
        })
    }

    /// Called when a debounce timer reports its ticket.
    pub async fn on_save_due(&mut self, ticket: u64) {
        match self.pending.take() {
            Some(pending) if pending.ticket == ticket => self.persist(pending).await,
            Some(pending) => {
                debug!(ticket, pending = pending.ticket, "Ignoring superseded save timer.");
                self.pending = Some(pending);
            }
            None => debug!(ticket, "Ignoring save timer with nothing pending."),
        }
    }

    //=====================================================================================
    // Settings
    //=====================================================================================

    /// Applies new display settings to the page and persists them right away.
    pub async fn change_settings(&mut self, settings: ReaderSettings) -> Result<(), SessionError> {
        let restyled = self.ready_adapter()?.apply_display_settings(&settings);
        self.settings = settings;
        debug!(restyled, "Reader settings changed.");
        self.deps.settings.save(&settings).await;
        Ok(())
    }

    //=====================================================================================
    // Internals
    //=====================================================================================

    fn ready_adapter(&mut self) -> Result<&mut RenderingAdapter, SessionError> {
        match self.phase {
            SessionPhase::Ready | SessionPhase::Navigating => self
                .adapter
                .as_mut()
                .ok_or(SessionError::NotReady(self.phase)),
            SessionPhase::Closed => Err(SessionError::Closed),
            phase => Err(SessionError::NotReady(phase)),
        }
    }

    async fn indicator_for(&self, location: &Location) -> ProgressIndicator {
        let estimate = match &self.adapter {
            Some(adapter) => adapter.compute_percentage(location).await,
            None => PercentageEstimate::Unresolved,
        };
        match estimate {
            PercentageEstimate::Resolved(percentage) => ProgressIndicator::resolved(percentage),
            PercentageEstimate::Unresolved => self.progress.into_stale(),
        }
    }

    fn schedule_save(&mut self, ticket: u64, location: Location, percentage: f64) {
        self.cancel_pending();
        let timer = self.deps.timer.arm(self.deps.save_delay, ticket);
        self.pending = Some(PendingSave {
            ticket,
            location,
            percentage,
            timer,
        });
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.timer.cancel();
            debug!(superseded = pending.ticket, "Cancelled pending progress save.");
        }
    }

    async fn persist(&mut self, pending: PendingSave) {
        let user_id = self.request.user_id;
        let ebook_id = self.request.ebook_id;
        match self
            .deps
            .progress
            .save(user_id, ebook_id, &pending.location, pending.percentage)
            .await
        {
            Ok(saved) => {
                debug!(
                    %user_id,
                    ebook_id,
                    location = %saved.location,
                    percentage = saved.progress_percentage,
                    "Reading progress saved."
                );
            }
            Err(e) => {
                warn!(
                    %user_id,
                    ebook_id,
                    location = %pending.location,
                    error = %e,
                    "Failed to save reading progress; the next page turn will retry."
                );
            }
        }
    }

    async fn record_read_activity(&mut self) {
        if self.read_recorded {
            return;
        }
        self.read_recorded = true;
        let activity = BookActivity {
            ebook_id: self.request.ebook_id,
            user_id: self.request.user_id,
            activity_type: ActivityType::Read,
        };
        if let Err(e) = self.deps.activity.record(&activity).await {
            warn!(
                user_id = %activity.user_id,
                ebook_id = activity.ebook_id,
                error = %e,
                "Failed to record read activity."
            );
        }
    }
}

impl Drop for ReadingSession {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.timer.cancel();
            warn!(
                ebook_id = self.request.ebook_id,
                location = %pending.location,
                "Reading session dropped without close; latest position was not saved."
            );
        }
    }
}
