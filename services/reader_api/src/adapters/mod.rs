pub mod db;
pub mod epub;
pub mod settings_file;

pub use db::DbAdapter;
pub use epub::EpubRenderer;
pub use settings_file::FileKeyValueStore;
