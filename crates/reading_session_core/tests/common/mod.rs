//! Shared fixtures for reading session tests: a scripted rendering engine with
//! page-based locations and a harness wiring it to in-memory ports.
#![allow(dead_code)]

use async_trait::async_trait;
use reading_session_core::memory::{
    InMemoryActivityLog, InMemoryKeyValueStore, InMemoryProgressRepository,
};
use reading_session_core::{
    DisplayStyle, Location, ManualDebounceTimer, OpenRequest, PercentageEstimate, PortError,
    PortResult, ProgressStore, ReadingSession, RenderedDocument, RenderedPage, RenderingEngine,
    SessionDeps, SettingsStore, TocItem, DEFAULT_SAVE_DELAY,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const BOOK_URL: &str = "https://library.example/books/7.epub";
pub const MISSING_URL: &str = "https://library.example/books/missing.epub";
pub const CORRUPT_URL: &str = "https://library.example/books/corrupt.epub";
pub const EBOOK_ID: i64 = 7;

//=========================================================================================
// Scripted Engine
//=========================================================================================

/// A fake engine whose book has five chapters of four pages each.
/// Locations look like `chapter3.xhtml#page=2`.
pub struct ScriptedEngine {
    chapters: Vec<String>,
    pages_per_chapter: usize,
    indexed: Arc<AtomicBool>,
    styles: Arc<Mutex<Vec<DisplayStyle>>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            chapters: (1..=5).map(|n| format!("chapter{n}.xhtml")).collect(),
            pages_per_chapter: 4,
            indexed: Arc::new(AtomicBool::new(true)),
            styles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// While not indexed, percentages stay unresolved.
    pub fn set_indexed(&self, indexed: bool) {
        self.indexed.store(indexed, Ordering::SeqCst);
    }

    /// Every style the engine was asked to apply, across all opened documents.
    pub fn applied_styles(&self) -> Vec<DisplayStyle> {
        self.styles.lock().unwrap().clone()
    }
}

#[async_trait]
impl RenderingEngine for ScriptedEngine {
    async fn open(&self, document_url: &str) -> PortResult<Box<dyn RenderedDocument>> {
        if document_url.ends_with("missing.epub") {
            return Err(PortError::Unavailable("404 Not Found".to_string()));
        }
        if document_url.ends_with("corrupt.epub") {
            return Err(PortError::Corrupt("not a zip archive".to_string()));
        }
        Ok(Box::new(ScriptedDocument {
            chapters: self.chapters.clone(),
            pages_per_chapter: self.pages_per_chapter,
            position: (0, 0),
            indexed: self.indexed.clone(),
            styles: self.styles.clone(),
        }))
    }
}

struct ScriptedDocument {
    chapters: Vec<String>,
    pages_per_chapter: usize,
    position: (usize, usize),
    indexed: Arc<AtomicBool>,
    styles: Arc<Mutex<Vec<DisplayStyle>>>,
}

impl ScriptedDocument {
    fn location_of(&self, (chapter, page): (usize, usize)) -> Location {
        Location::new(format!("{}#page={}", self.chapters[chapter], page))
    }

    fn resolve(&self, target: &str) -> Option<(usize, usize)> {
        let (href, page) = match target.split_once("#page=") {
            Some((href, page)) => (href, page.parse().ok()?),
            None => (target.split('#').next().unwrap_or(target), 0),
        };
        let chapter = self.chapters.iter().position(|c| c == href)?;
        (page < self.pages_per_chapter).then_some((chapter, page))
    }
}

#[async_trait]
impl RenderedDocument for ScriptedDocument {
    fn current_location(&self) -> Option<Location> {
        Some(self.location_of(self.position))
    }

    fn current_page(&self) -> Option<RenderedPage> {
        let (chapter, page) = self.position;
        Some(RenderedPage {
            location: self.location_of(self.position),
            content: format!("{} page {}", self.chapters[chapter], page),
        })
    }

    async fn display_at(&mut self, target: &str) -> PortResult<Location> {
        let position = self
            .resolve(target)
            .ok_or_else(|| PortError::NotFound(target.to_string()))?;
        self.position = position;
        Ok(self.location_of(position))
    }

    async fn next(&mut self) -> PortResult<Option<Location>> {
        let (chapter, page) = self.position;
        let next = if page + 1 < self.pages_per_chapter {
            (chapter, page + 1)
        } else if chapter + 1 < self.chapters.len() {
            (chapter + 1, 0)
        } else {
            return Ok(None);
        };
        self.position = next;
        Ok(Some(self.location_of(next)))
    }

    async fn previous(&mut self) -> PortResult<Option<Location>> {
        let (chapter, page) = self.position;
        let previous = if page > 0 {
            (chapter, page - 1)
        } else if chapter > 0 {
            (chapter - 1, self.pages_per_chapter - 1)
        } else {
            return Ok(None);
        };
        self.position = previous;
        Ok(Some(self.location_of(previous)))
    }

    async fn compute_percentage(&self, location: &Location) -> PercentageEstimate {
        if !self.indexed.load(Ordering::SeqCst) {
            return PercentageEstimate::Unresolved;
        }
        match self.resolve(location.as_str()) {
            Some((chapter, page)) => {
                let total = self.chapters.len() * self.pages_per_chapter;
                let index = chapter * self.pages_per_chapter + page;
                PercentageEstimate::Resolved(index as f64 * 100.0 / total as f64)
            }
            None => PercentageEstimate::Unresolved,
        }
    }

    async fn table_of_contents(&self) -> PortResult<Vec<TocItem>> {
        Ok(self
            .chapters
            .iter()
            .enumerate()
            .map(|(i, href)| TocItem::new(format!("Chapter {}", i + 1), href.clone()))
            .collect())
    }

    fn apply_style(&mut self, style: &DisplayStyle) {
        self.styles.lock().unwrap().push(style.clone());
    }
}

//=========================================================================================
// Harness
//=========================================================================================

pub struct Harness {
    pub user_id: Uuid,
    pub progress: Arc<InMemoryProgressRepository>,
    pub storage: Arc<InMemoryKeyValueStore>,
    pub activity: Arc<InMemoryActivityLog>,
    pub engine: Arc<ScriptedEngine>,
    pub timer: Arc<ManualDebounceTimer>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_progress(InMemoryProgressRepository::new())
    }

    pub fn with_progress(progress: InMemoryProgressRepository) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            progress: Arc::new(progress),
            storage: Arc::new(InMemoryKeyValueStore::new()),
            activity: Arc::new(InMemoryActivityLog::new()),
            engine: Arc::new(ScriptedEngine::new()),
            timer: Arc::new(ManualDebounceTimer::new()),
        }
    }

    pub fn session_for(&self, document_url: &str) -> ReadingSession {
        let request = OpenRequest {
            user_id: self.user_id,
            ebook_id: EBOOK_ID,
            title: "The Pilgrim's Progress".to_string(),
            document_url: document_url.to_string(),
        };
        let deps = SessionDeps {
            progress: ProgressStore::new(self.progress.clone()),
            settings: SettingsStore::new(self.storage.clone()),
            activity: self.activity.clone(),
            engine: self.engine.clone(),
            timer: self.timer.clone(),
            save_delay: DEFAULT_SAVE_DELAY,
        };
        ReadingSession::new(request, deps)
    }

    pub async fn started_session(&self) -> ReadingSession {
        let mut session = self.session_for(BOOK_URL);
        session.start().await.unwrap();
        session
    }

    /// Lets every timer armed so far expire, oldest first.
    pub async fn expire_all_timers(&self, session: &mut ReadingSession) {
        for (_, ticket) in self.timer.armed() {
            session.on_save_due(ticket).await;
        }
    }

    /// Lets only the timers that are still live expire.
    pub async fn expire_live_timers(&self, session: &mut ReadingSession) {
        for ticket in self.timer.live_tickets() {
            session.on_save_due(ticket).await;
        }
    }
}
