//! crates/reading_session_core/src/memory.rs
//!
//! In-process implementations of the persistence ports, used by tests and
//! local development. Writes can be made to fail on demand.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{BookActivity, EbookId, ReadingProgress};
use crate::ports::{ActivityLog, KeyValueStore, PortError, PortResult, ProgressRepository};

//=========================================================================================
// Progress
//=========================================================================================

#[derive(Default)]
pub struct InMemoryProgressRepository {
    rows: Mutex<HashMap<(Uuid, EbookId), ReadingProgress>>,
    fail_writes: AtomicBool,
    upserts: AtomicUsize,
}

impl InMemoryProgressRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row(progress: ReadingProgress) -> Self {
        let mut rows = HashMap::new();
        rows.insert((progress.user_id, progress.ebook_id), progress);
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful upserts so far.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub async fn rows(&self) -> Vec<ReadingProgress> {
        self.rows.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl ProgressRepository for InMemoryProgressRepository {
    async fn fetch(&self, user_id: Uuid, ebook_id: EbookId) -> PortResult<Option<ReadingProgress>> {
        Ok(self.rows.lock().await.get(&(user_id, ebook_id)).cloned())
    }

    async fn upsert(&self, progress: &ReadingProgress) -> PortResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("progress storage is offline".to_string()));
        }
        self.rows
            .lock()
            .await
            .insert((progress.user_id, progress.ebook_id), progress.clone());
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

//=========================================================================================
// Key/Value
//=========================================================================================

#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let mut entries = HashMap::new();
        entries.insert(key.to_string(), value.to_string());
        Self {
            entries: Mutex::new(entries),
            ..Self::default()
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("storage quota exceeded".to_string()));
        }
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

//=========================================================================================
// Activity
//=========================================================================================

#[derive(Default)]
pub struct InMemoryActivityLog {
    events: Mutex<Vec<BookActivity>>,
    fail_writes: AtomicBool,
}

impl InMemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<BookActivity> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl ActivityLog for InMemoryActivityLog {
    async fn record(&self, activity: &BookActivity) -> PortResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("activity log is offline".to_string()));
        }
        self.events.lock().await.push(activity.clone());
        Ok(())
    }
}
