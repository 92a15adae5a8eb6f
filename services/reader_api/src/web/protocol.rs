//! services/reader_api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser reader and the
//! API server. Every frame is a JSON text message tagged by `type`.

use reading_session_core::domain::{EbookId, Location, ProgressIndicator, TocItem};
use reading_session_core::settings::ReaderSettings;
use serde::{Deserialize, Serialize};

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens an ebook. This must be the first message sent on the connection.
    Open { ebook_id: EbookId },

    NextPage,

    PreviousPage,

    /// Jumps to a table-of-contents entry.
    NavigateTo { href: String },

    ChangeSettings { settings: ReaderSettings },

    /// Ends the session; any pending position is saved first.
    Close,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The document is open and styled.
    SessionReady {
        ebook_id: EbookId,
        title: String,
        settings: ReaderSettings,
        css: String,
        progress: ProgressIndicator,
    },

    TableOfContents { items: Vec<TocItem> },

    /// The page now on screen.
    Page {
        location: Location,
        content: String,
        progress: ProgressIndicator,
    },

    SettingsApplied { settings: ReaderSettings, css: String },

    /// A failure. When `fatal` is set the session is over and the client
    /// should return to the library.
    Error { message: String, fatal: bool },

    SessionClosed,
}

impl ServerMessage {
    pub fn error(message: impl Into<String>, fatal: bool) -> Self {
        ServerMessage::Error {
            message: message.into(),
            fatal,
        }
    }
}
