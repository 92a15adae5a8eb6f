pub mod domain;
pub mod error;
pub mod memory;
pub mod ports;
pub mod progress_store;
pub mod rendering;
pub mod session;
pub mod settings;
pub mod settings_store;
pub mod timer;

pub use domain::{
    ActivityType, BookActivity, Ebook, EbookId, Location, OpenRequest, ProgressIndicator,
    ReadingProgress, RenderedPage, TocItem,
};
pub use error::SessionError;
pub use ports::{
    ActivityLog, AuthSessionLookup, KeyValueStore, LibraryCatalog, PercentageEstimate, PortError,
    PortResult, ProgressRepository, RenderedDocument, RenderingEngine,
};
pub use progress_store::ProgressStore;
pub use rendering::RenderingAdapter;
pub use session::{ReadingSession, Relocation, SessionDeps, SessionPhase, DEFAULT_SAVE_DELAY};
pub use settings::{DisplayStyle, FontFamily, FontSize, LineHeight, ReaderSettings, Theme};
pub use settings_store::{SettingsStore, SETTINGS_KEY};
pub use timer::{DebounceTimer, ManualDebounceTimer, TimerHandle, TokioDebounceTimer};
