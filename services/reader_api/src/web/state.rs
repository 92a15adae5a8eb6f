//! services/reader_api/src/web/state.rs
//!
//! Defines the application's shared state and how a reading session's
//! collaborators are assembled from it.

use crate::adapters::settings_file::FileKeyValueStore;
use crate::config::Config;
use reading_session_core::ports::{
    ActivityLog, AuthSessionLookup, LibraryCatalog, ProgressRepository, RenderingEngine,
};
use reading_session_core::{DebounceTimer, ProgressStore, SessionDeps, SettingsStore};
use std::sync::Arc;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub progress: Arc<dyn ProgressRepository>,
    pub activity: Arc<dyn ActivityLog>,
    pub catalog: Arc<dyn LibraryCatalog>,
    pub auth: Arc<dyn AuthSessionLookup>,
    pub engine: Arc<dyn RenderingEngine>,
}

impl AppState {
    /// The collaborators for one reader's session. Settings live in the
    /// reader's own directory and saves are debounced through `timer`.
    pub fn session_deps(&self, user_id: Uuid, timer: Arc<dyn DebounceTimer>) -> SessionDeps {
        let storage = FileKeyValueStore::for_user(&self.config.settings_dir, user_id);
        SessionDeps {
            progress: ProgressStore::new(self.progress.clone()),
            settings: SettingsStore::new(Arc::new(storage)),
            activity: self.activity.clone(),
            engine: self.engine.clone(),
            timer,
            save_delay: self.config.progress_save_delay,
        }
    }
}
