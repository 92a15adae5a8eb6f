//! services/reader_api/src/adapters/epub.rs
//!
//! The EPUB rendering engine. Documents are fetched over HTTP or from disk,
//! flattened to plain text per spine item and paginated against a fixed
//! viewport whose capacity follows the applied display style.
//!
//! Locations have the form `{href}@{char_offset}` where `href` is the spine
//! item's path inside the archive.

use async_trait::async_trait;
use bytes::Bytes;
use epub::doc::{EpubDoc, NavPoint};
use reading_session_core::domain::{Location, RenderedPage, TocItem};
use reading_session_core::ports::{
    PercentageEstimate, PortError, PortResult, RenderedDocument, RenderingEngine,
};
use reading_session_core::settings::{DisplayStyle, ReaderSettings};
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// The reading viewport pages are laid out against.
const VIEWPORT_WIDTH_PX: usize = 640;
const VIEWPORT_HEIGHT_PX: usize = 880;

//=========================================================================================
// The Engine
//=========================================================================================

#[derive(Clone)]
pub struct EpubRenderer {
    http: reqwest::Client,
}

impl EpubRenderer {
    pub fn new(fetch_timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(fetch_timeout).build()?;
        Ok(Self { http })
    }

    async fn fetch(&self, document_url: &str) -> PortResult<Bytes> {
        if document_url.starts_with("http://") || document_url.starts_with("https://") {
            return self.fetch_remote(document_url).await;
        }
        let path = document_url.strip_prefix("file://").unwrap_or(document_url);
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PortError::NotFound(format!("No document at {}", path)))
            }
            Err(e) => Err(PortError::Unavailable(format!("Failed to read {}: {}", path, e))),
        }
    }

    async fn fetch_remote(&self, url: &str) -> PortResult<Bytes> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PortError::Unavailable(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PortError::NotFound(format!("No document at {}", url)));
        }
        if !status.is_success() {
            return Err(PortError::Unavailable(format!("{} answered {}", url, status)));
        }
        response
            .bytes()
            .await
            .map_err(|e| PortError::Unavailable(format!("Download from {} failed: {}", url, e)))
    }
}

#[async_trait]
impl RenderingEngine for EpubRenderer {
    #[instrument(skip(self))]
    async fn open(&self, document_url: &str) -> PortResult<Box<dyn RenderedDocument>> {
        let data = self.fetch(document_url).await?;
        debug!(bytes = data.len(), "Document fetched.");

        // Unzipping and HTML conversion are CPU bound.
        let book = tokio::task::spawn_blocking(move || Book::parse(data))
            .await
            .map_err(|e| PortError::Unexpected(format!("EPUB parser task failed: {}", e)))??;

        info!(
            chapters = book.chapters.len(),
            total_chars = book.total_chars,
            "EPUB loaded."
        );
        Ok(Box::new(EpubDocument::new(book)))
    }
}

//=========================================================================================
// The Parsed Book
//=========================================================================================

#[derive(Debug)]
struct Chapter {
    href: String,
    text: Vec<char>,
    /// Characters in all preceding chapters.
    start: usize,
}

#[derive(Debug)]
struct Book {
    chapters: Vec<Chapter>,
    /// Hrefs of dropped sections and the chapter that stands in for each.
    skipped: Vec<(String, usize)>,
    toc: Vec<TocItem>,
    total_chars: usize,
}

impl Book {
    fn parse(data: Bytes) -> PortResult<Self> {
        let mut doc = EpubDoc::from_reader(Cursor::new(data.to_vec()))
            .map_err(|e| PortError::Corrupt(format!("Not a readable EPUB: {}", e)))?;

        let mut sections = Vec::new();
        loop {
            let href = doc
                .get_current_path()
                .map(|p| p.to_string_lossy().into_owned());
            if let (Some(href), Some((markup, _mime))) = (href, doc.get_current_str()) {
                let text = match html2text::from_read(markup.as_bytes(), 10_000) {
                    Ok(clean) => clean,
                    Err(e) => {
                        warn!(%href, "html2text failed: {e}");
                        markup
                    }
                };
                sections.push((href, text));
            }
            if !doc.go_next() {
                break;
            }
        }

        let toc = doc.toc.iter().map(toc_item).collect();
        Self::from_sections(sections, toc)
    }

    /// Builds the book from `(href, plain text)` pairs in spine order.
    /// Sections without visible text are dropped; their hrefs resolve to the next
    /// readable chapter, or to the last one when nothing readable follows.
    fn from_sections(sections: Vec<(String, String)>, toc: Vec<TocItem>) -> PortResult<Self> {
        let mut chapters = Vec::new();
        let mut skipped = Vec::new();
        let mut total_chars = 0;
        for (href, text) in sections {
            if text.trim().is_empty() {
                skipped.push((href, chapters.len()));
                continue;
            }
            let text: Vec<char> = text.chars().collect();
            let len = text.len();
            chapters.push(Chapter {
                href,
                text,
                start: total_chars,
            });
            total_chars += len;
        }
        if chapters.is_empty() {
            return Err(PortError::Corrupt(
                "The EPUB contains no readable text".to_string(),
            ));
        }
        let last = chapters.len() - 1;
        for (_, chapter) in skipped.iter_mut() {
            *chapter = (*chapter).min(last);
        }
        Ok(Self {
            chapters,
            skipped,
            toc,
            total_chars,
        })
    }

    /// Resolves a table-of-contents href to a chapter index.
    /// Fragments are ignored and relative hrefs match on the path suffix.
    fn chapter_for_href(&self, href: &str) -> Option<usize> {
        let path = href.split('#').next().unwrap_or(href);
        if path.is_empty() {
            return None;
        }
        let suffix = format!("/{}", path.trim_start_matches("./"));
        let hrefs = self
            .chapters
            .iter()
            .enumerate()
            .map(|(index, c)| (c.href.as_str(), index))
            .chain(self.skipped.iter().map(|(h, index)| (h.as_str(), *index)));

        let mut suffix_match = None;
        for (candidate, index) in hrefs {
            if candidate == path {
                return Some(index);
            }
            if suffix_match.is_none() && candidate.ends_with(&suffix) {
                suffix_match = Some(index);
            }
        }
        suffix_match
    }

    fn parse_location(&self, raw: &str) -> Option<Position> {
        let (href, offset) = raw.rsplit_once('@')?;
        let offset = offset.parse::<usize>().ok()?;
        let chapter = self.chapters.iter().position(|c| c.href == href)?;
        (offset < self.chapters[chapter].text.len()).then_some(Position { chapter, offset })
    }
}

fn toc_item(point: &NavPoint) -> TocItem {
    TocItem::new(point.label.trim(), point.content.to_string_lossy())
        .with_subitems(point.children.iter().map(toc_item).collect())
}

//=========================================================================================
// The Live Document
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Position {
    chapter: usize,
    offset: usize,
}

/// Characters that fit on one page for the given style.
fn page_capacity(style: &DisplayStyle) -> usize {
    let font_px = usize::from(style.font_size_px.max(1));
    let line_tenths = usize::from(style.line_height.tenths().max(1));
    // Average glyph width is about half the font size.
    let columns = (VIEWPORT_WIDTH_PX * 2 / font_px).max(1);
    let rows = (VIEWPORT_HEIGHT_PX * 10 / (font_px * line_tenths)).max(1);
    columns * rows
}

pub struct EpubDocument {
    book: Book,
    position: Position,
    capacity: usize,
}

impl EpubDocument {
    fn new(book: Book) -> Self {
        let style = DisplayStyle::from_settings(&ReaderSettings::default());
        Self {
            book,
            position: Position {
                chapter: 0,
                offset: 0,
            },
            capacity: page_capacity(&style),
        }
    }

    fn location_of(&self, position: Position) -> Location {
        let chapter = &self.book.chapters[position.chapter];
        Location::new(format!("{}@{}", chapter.href, position.offset))
    }

    fn move_to(&mut self, position: Position) -> Location {
        self.position = position;
        self.location_of(position)
    }

    /// Start of the page holding the last character of `chapter`.
    fn last_page_start(&self, chapter: usize) -> usize {
        let len = self.book.chapters[chapter].text.len();
        (len.saturating_sub(1) / self.capacity) * self.capacity
    }
}

#[async_trait]
impl RenderedDocument for EpubDocument {
    fn current_location(&self) -> Option<Location> {
        Some(self.location_of(self.position))
    }

    fn current_page(&self) -> Option<RenderedPage> {
        let chapter = &self.book.chapters[self.position.chapter];
        let end = (self.position.offset + self.capacity).min(chapter.text.len());
        let content: String = chapter.text[self.position.offset..end].iter().collect();
        Some(RenderedPage {
            location: self.location_of(self.position),
            content,
        })
    }

    async fn display_at(&mut self, target: &str) -> PortResult<Location> {
        if let Some(position) = self.book.parse_location(target) {
            return Ok(self.move_to(position));
        }
        match self.book.chapter_for_href(target) {
            Some(chapter) => Ok(self.move_to(Position { chapter, offset: 0 })),
            None => Err(PortError::NotFound(format!("'{}' is not in this book", target))),
        }
    }

    async fn next(&mut self) -> PortResult<Option<Location>> {
        let Position { chapter, offset } = self.position;
        let next_offset = offset + self.capacity;
        if next_offset < self.book.chapters[chapter].text.len() {
            return Ok(Some(self.move_to(Position {
                chapter,
                offset: next_offset,
            })));
        }
        if chapter + 1 < self.book.chapters.len() {
            return Ok(Some(self.move_to(Position {
                chapter: chapter + 1,
                offset: 0,
            })));
        }
        Ok(None)
    }

    async fn previous(&mut self) -> PortResult<Option<Location>> {
        let Position { chapter, offset } = self.position;
        if offset > 0 {
            return Ok(Some(self.move_to(Position {
                chapter,
                offset: offset.saturating_sub(self.capacity),
            })));
        }
        if chapter > 0 {
            let offset = self.last_page_start(chapter - 1);
            return Ok(Some(self.move_to(Position {
                chapter: chapter - 1,
                offset,
            })));
        }
        Ok(None)
    }

    async fn compute_percentage(&self, location: &Location) -> PercentageEstimate {
        match self.book.parse_location(location.as_str()) {
            Some(position) => {
                let chapter = &self.book.chapters[position.chapter];
                let on_last_page = position.chapter + 1 == self.book.chapters.len()
                    && position.offset + self.capacity >= chapter.text.len();
                if on_last_page {
                    return PercentageEstimate::Resolved(100.0);
                }
                let before = chapter.start + position.offset;
                PercentageEstimate::Resolved(before as f64 / self.book.total_chars as f64 * 100.0)
            }
            None => PercentageEstimate::Unresolved,
        }
    }

    async fn table_of_contents(&self) -> PortResult<Vec<TocItem>> {
        Ok(self.book.toc.clone())
    }

    fn apply_style(&mut self, style: &DisplayStyle) {
        // The current offset is kept so the reader stays on the same text.
        self.capacity = page_capacity(style);
        debug!(capacity = self.capacity, "Page capacity updated.");
    }
}
