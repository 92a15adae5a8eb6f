//! services/reader_api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a reader's WebSocket
//! connection. One connection drives exactly one reading session.

use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use reading_session_core::domain::{EbookId, OpenRequest};
use reading_session_core::ports::{LibraryCatalog, PortError};
use reading_session_core::{ReadingSession, SessionError, TokioDebounceTimer};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user_id))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user_id: Uuid) {
    info!(%user_id, "New reader connection established.");
    let (mut sender, mut receiver) = socket.split();

    // --- 1. Open Phase ---
    let ebook_id = match receiver.next().await {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Open { ebook_id }) => ebook_id,
            _ => {
                warn!(%user_id, "First message was not a valid open message.");
                send(&mut sender, &ServerMessage::error("Expected an open message", true)).await;
                return;
            }
        },
        _ => {
            info!(%user_id, "Client disconnected before opening an ebook.");
            return;
        }
    };

    let request = match resolve_open(app_state.catalog.as_ref(), user_id, ebook_id).await {
        Ok(request) => request,
        Err(message) => {
            send(&mut sender, &ServerMessage::error(message, true)).await;
            return;
        }
    };

    let (timer, mut fired) = TokioDebounceTimer::new();
    let mut session =
        ReadingSession::new(request, app_state.session_deps(user_id, Arc::new(timer)));
    match open_while_listening(session.start(), &mut receiver, &mut sender).await {
        Some(Ok(())) => {}
        Some(Err(e)) => {
            send(&mut sender, &ServerMessage::error(e.to_string(), true)).await;
            return;
        }
        None => {
            info!(%user_id, ebook_id, "Client disconnected while the ebook was opening.");
            return;
        }
    }

    let toc = session.table_of_contents().await.unwrap_or_default();
    let mut opening = vec![
        session_ready(&session),
        ServerMessage::TableOfContents { items: toc },
    ];
    opening.extend(page_message(&session));
    for message in &opening {
        if !send(&mut sender, message).await {
            session.close().await;
            return;
        }
    }

    // --- 2. Main Message Loop ---
    run_session(&mut session, &mut fired, &mut receiver, &mut sender).await;

    // --- 3. Cleanup ---
    session.close().await;
    send(&mut sender, &ServerMessage::SessionClosed).await;
    info!(%user_id, ebook_id, "Reader connection closed.");
}

/// Drives `opening` to completion while still reading the socket. Commands
/// that arrive early are answered with a non-fatal error. Returns `None` when
/// the client leaves first, which abandons the open.
pub async fn open_while_listening<F, S, K>(
    opening: F,
    receiver: &mut S,
    sender: &mut K,
) -> Option<F::Output>
where
    F: Future,
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    tokio::pin!(opening);
    loop {
        tokio::select! {
            result = &mut opening => return Some(result),
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(_))) => {
                    send(sender, &ServerMessage::error("The ebook is still opening", false)).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// The event loop of an open session: client frames and expired save timers,
/// handled one at a time. Returns when the client leaves or asks to close.
pub async fn run_session<S, K>(
    session: &mut ReadingSession,
    fired: &mut UnboundedReceiver<u64>,
    receiver: &mut S,
    sender: &mut K,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    let ebook_id = session.ebook_id();
    loop {
        tokio::select! {
            frame = receiver.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        info!(ebook_id, "Client disconnected.");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(ebook_id, "WebSocket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => continue,
                };

                let (replies, flow) = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => handle_client_message(session, message).await,
                    Err(e) => {
                        warn!(ebook_id, "Unreadable client message: {}", e);
                        (vec![ServerMessage::error("Invalid message", false)], Flow::Continue)
                    }
                };
                let mut delivered = true;
                for reply in &replies {
                    delivered = delivered && send(sender, reply).await;
                }
                if flow == Flow::Close || !delivered {
                    break;
                }
            }
            Some(ticket) = fired.recv() => {
                debug!(ebook_id, ticket, "Save timer expired.");
                session.on_save_due(ticket).await;
            }
        }
    }
}

/// Looks the ebook up in the catalog and builds the open request for it.
/// Failures come back as the message shown to the reader.
pub async fn resolve_open(
    catalog: &dyn LibraryCatalog,
    user_id: Uuid,
    ebook_id: EbookId,
) -> Result<OpenRequest, String> {
    let ebook = match catalog.get_ebook(ebook_id).await {
        Ok(ebook) => ebook,
        Err(PortError::NotFound(_)) => return Err("Ebook not found".to_string()),
        Err(e) => {
            error!(ebook_id, "Failed to load ebook: {}", e);
            return Err("Failed to load ebook".to_string());
        }
    };
    let document_url = ebook
        .download_url
        .ok_or_else(|| "This ebook is not available for reading".to_string())?;
    Ok(OpenRequest {
        user_id,
        ebook_id: ebook.id,
        title: ebook.title,
        document_url,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// Applies one client message to the session and returns what to send back.
pub async fn handle_client_message(
    session: &mut ReadingSession,
    message: ClientMessage,
) -> (Vec<ServerMessage>, Flow) {
    let outcome = match message {
        ClientMessage::Open { .. } => {
            return (
                vec![ServerMessage::error("An ebook is already open", false)],
                Flow::Continue,
            )
        }
        ClientMessage::Close => return (Vec::new(), Flow::Close),
        ClientMessage::NextPage => session.next_page().await.map(|moved| moved.is_some()),
        ClientMessage::PreviousPage => session.previous_page().await.map(|moved| moved.is_some()),
        ClientMessage::NavigateTo { href } => session.navigate_to(&href).await.map(|_| true),
        ClientMessage::ChangeSettings { settings } => {
            return match session.change_settings(settings).await {
                Ok(()) => {
                    let mut replies = vec![ServerMessage::SettingsApplied {
                        settings: session.settings(),
                        css: session.stylesheet().unwrap_or_default(),
                    }];
                    replies.extend(page_message(session));
                    (replies, Flow::Continue)
                }
                Err(e) => error_reply(e),
            };
        }
    };

    match outcome {
        Ok(true) => (page_message(session).into_iter().collect(), Flow::Continue),
        // Already at the first or last page.
        Ok(false) => (Vec::new(), Flow::Continue),
        Err(e) => error_reply(e),
    }
}

fn error_reply(e: SessionError) -> (Vec<ServerMessage>, Flow) {
    let fatal = e.is_fatal() || matches!(e, SessionError::Closed);
    let flow = if fatal { Flow::Close } else { Flow::Continue };
    (vec![ServerMessage::error(e.to_string(), fatal)], flow)
}

fn session_ready(session: &ReadingSession) -> ServerMessage {
    ServerMessage::SessionReady {
        ebook_id: session.ebook_id(),
        title: session.title().to_string(),
        settings: session.settings(),
        css: session.stylesheet().unwrap_or_default(),
        progress: session.progress(),
    }
}

fn page_message(session: &ReadingSession) -> Option<ServerMessage> {
    session.current_page().map(|page| ServerMessage::Page {
        location: page.location,
        content: page.content,
        progress: session.progress(),
    })
}

/// Serializes and sends one message. Returns `false` once the client is gone.
async fn send<K>(sender: &mut K, message: &ServerMessage) -> bool
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return true;
        }
    };
    match sender.send(Message::Text(json.into())).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to send message to client: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use reading_session_core::domain::{Ebook, Location, RenderedPage, TocItem};
    use reading_session_core::memory::{
        InMemoryActivityLog, InMemoryKeyValueStore, InMemoryProgressRepository,
    };
    use reading_session_core::ports::{
        PercentageEstimate, PortResult, RenderedDocument, RenderingEngine,
    };
    use reading_session_core::settings::{DisplayStyle, ReaderSettings, Theme};
    use reading_session_core::{
        DebounceTimer, ManualDebounceTimer, ProgressStore, SessionDeps, SettingsStore,
        DEFAULT_SAVE_DELAY,
    };
    use futures::channel::mpsc;
    use std::time::Duration;

    struct Catalog;

    #[async_trait]
    impl LibraryCatalog for Catalog {
        async fn get_ebook(&self, ebook_id: EbookId) -> PortResult<Ebook> {
            match ebook_id {
                1 => Ok(Ebook {
                    id: 1,
                    title: "Moby Dick".to_string(),
                    download_url: Some("https://books.example/moby.epub".to_string()),
                }),
                2 => Ok(Ebook {
                    id: 2,
                    title: "Lost Manuscript".to_string(),
                    download_url: None,
                }),
                _ => Err(PortError::NotFound(format!("Ebook {}", ebook_id))),
            }
        }
    }

    /// Two pages, `p0` and `p1`.
    struct TwoPageEngine;

    struct TwoPageDocument {
        page: usize,
    }

    #[async_trait]
    impl RenderingEngine for TwoPageEngine {
        async fn open(&self, _document_url: &str) -> PortResult<Box<dyn RenderedDocument>> {
            Ok(Box::new(TwoPageDocument { page: 0 }))
        }
    }

    #[async_trait]
    impl RenderedDocument for TwoPageDocument {
        fn current_location(&self) -> Option<Location> {
            Some(Location::new(format!("p{}", self.page)))
        }

        fn current_page(&self) -> Option<RenderedPage> {
            Some(RenderedPage {
                location: Location::new(format!("p{}", self.page)),
                content: format!("Page {}", self.page + 1),
            })
        }

        async fn display_at(&mut self, target: &str) -> PortResult<Location> {
            match target {
                "p0" | "p1" => {
                    self.page = usize::from(target == "p1");
                    Ok(Location::new(target))
                }
                _ => Err(PortError::NotFound(target.to_string())),
            }
        }

        async fn next(&mut self) -> PortResult<Option<Location>> {
            if self.page == 1 {
                return Ok(None);
            }
            self.page = 1;
            Ok(self.current_location())
        }

        async fn previous(&mut self) -> PortResult<Option<Location>> {
            if self.page == 0 {
                return Ok(None);
            }
            self.page = 0;
            Ok(self.current_location())
        }

        async fn compute_percentage(&self, location: &Location) -> PercentageEstimate {
            match location.as_str() {
                "p0" => PercentageEstimate::Resolved(0.0),
                "p1" => PercentageEstimate::Resolved(50.0),
                _ => PercentageEstimate::Unresolved,
            }
        }

        async fn table_of_contents(&self) -> PortResult<Vec<TocItem>> {
            Ok(vec![TocItem::new("Second", "p1")])
        }

        fn apply_style(&mut self, _style: &DisplayStyle) {}
    }

    async fn started_session_with(
        timer: Arc<dyn DebounceTimer>,
        progress: Arc<InMemoryProgressRepository>,
    ) -> ReadingSession {
        let deps = SessionDeps {
            progress: ProgressStore::new(progress),
            settings: SettingsStore::new(Arc::new(InMemoryKeyValueStore::new())),
            activity: Arc::new(InMemoryActivityLog::new()),
            engine: Arc::new(TwoPageEngine),
            timer,
            save_delay: DEFAULT_SAVE_DELAY,
        };
        let request = resolve_open(&Catalog, Uuid::new_v4(), 1).await.unwrap();
        let mut session = ReadingSession::new(request, deps);
        session.start().await.unwrap();
        session
    }

    async fn started_session() -> ReadingSession {
        started_session_with(
            Arc::new(ManualDebounceTimer::new()),
            Arc::new(InMemoryProgressRepository::new()),
        )
        .await
    }

    fn text_frame(json: &str) -> Result<Message, axum::Error> {
        Ok(Message::Text(json.to_string().into()))
    }

    fn sent_json(message: Message) -> serde_json::Value {
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected a text frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn open_requests_resolve_through_the_catalog() {
        let user_id = Uuid::new_v4();
        let request = resolve_open(&Catalog, user_id, 1).await.unwrap();
        assert_eq!(request.title, "Moby Dick");
        assert_eq!(request.document_url, "https://books.example/moby.epub");
        assert_eq!(request.user_id, user_id);

        assert_eq!(
            resolve_open(&Catalog, user_id, 99).await.unwrap_err(),
            "Ebook not found"
        );
        assert_eq!(
            resolve_open(&Catalog, user_id, 2).await.unwrap_err(),
            "This ebook is not available for reading"
        );
    }

    #[tokio::test]
    async fn page_turns_reply_with_the_new_page_and_stop_quietly_at_the_end() {
        let mut session = started_session().await;

        let (replies, flow) = handle_client_message(&mut session, ClientMessage::NextPage).await;
        assert_eq!(flow, Flow::Continue);
        assert_matches!(
            replies.as_slice(),
            [ServerMessage::Page { location, content, progress }]
                if location.as_str() == "p1" && content == "Page 2" && progress.percentage == 50.0
        );

        let (replies, flow) = handle_client_message(&mut session, ClientMessage::NextPage).await;
        assert!(replies.is_empty());
        assert_eq!(flow, Flow::Continue);
    }

    #[tokio::test]
    async fn unknown_toc_targets_are_reported_without_ending_the_session() {
        let mut session = started_session().await;

        let (replies, flow) = handle_client_message(
            &mut session,
            ClientMessage::NavigateTo {
                href: "appendix.xhtml".to_string(),
            },
        )
        .await;

        assert_eq!(flow, Flow::Continue);
        assert_matches!(replies.as_slice(), [ServerMessage::Error { fatal: false, .. }]);
    }

    #[tokio::test]
    async fn settings_changes_echo_the_new_stylesheet() {
        let mut session = started_session().await;
        let settings = ReaderSettings {
            theme: Theme::Dark,
            ..ReaderSettings::default()
        };

        let (replies, _) =
            handle_client_message(&mut session, ClientMessage::ChangeSettings { settings }).await;

        assert_matches!(
            replies.first(),
            Some(ServerMessage::SettingsApplied { settings: applied, css })
                if applied.theme == Theme::Dark && css.contains("#1a1a1a")
        );
    }

    #[tokio::test]
    async fn close_ends_the_loop_and_a_second_open_is_rejected() {
        let mut session = started_session().await;

        let (replies, flow) =
            handle_client_message(&mut session, ClientMessage::Open { ebook_id: 1 }).await;
        assert_eq!(flow, Flow::Continue);
        assert_matches!(replies.as_slice(), [ServerMessage::Error { fatal: false, .. }]);

        let (replies, flow) = handle_client_message(&mut session, ClientMessage::Close).await;
        assert!(replies.is_empty());
        assert_eq!(flow, Flow::Close);
    }

    #[tokio::test(start_paused = true)]
    async fn page_turn_is_saved_by_the_event_loop_once_the_timer_fires() {
        let progress = Arc::new(InMemoryProgressRepository::new());
        let (timer, mut fired) = TokioDebounceTimer::new();
        let mut session = started_session_with(Arc::new(timer), progress.clone()).await;
        let (client, mut frames) = mpsc::unbounded();
        let (mut replies, mut sent) = mpsc::unbounded();
        client.unbounded_send(text_frame(r#"{"type":"next_page"}"#)).unwrap();

        let reader = {
            let progress = progress.clone();
            async move {
                tokio::time::sleep(DEFAULT_SAVE_DELAY - Duration::from_millis(100)).await;
                assert_eq!(progress.upsert_count(), 0);

                tokio::time::sleep(Duration::from_millis(200)).await;
                assert_eq!(progress.upsert_count(), 1);
                // Hanging up ends the loop.
                drop(client);
            }
        };
        tokio::join!(
            run_session(&mut session, &mut fired, &mut frames, &mut replies),
            reader
        );

        let page = sent_json(sent.next().await.unwrap());
        assert_eq!(page["type"], "page");
        assert_eq!(page["location"], "p1");
        let rows = progress.rows().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].location.as_str(), "p1");
        assert_eq!(rows[0].progress_percentage, 50.0);
        assert!(!session.has_pending_save());
    }

    #[tokio::test(start_paused = true)]
    async fn commands_sent_while_opening_are_answered_without_ending_the_open() {
        let (client, mut frames) = mpsc::unbounded();
        let (mut replies, mut sent) = mpsc::unbounded();
        client.unbounded_send(text_frame(r#"{"type":"next_page"}"#)).unwrap();

        let slow_open = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            "opened"
        };
        let outcome = open_while_listening(slow_open, &mut frames, &mut replies).await;

        assert_eq!(outcome, Some("opened"));
        let reply = sent_json(sent.next().await.unwrap());
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["fatal"], false);
        drop(client);
    }

    #[tokio::test]
    async fn hanging_up_while_opening_abandons_the_open() {
        let (client, mut frames) = mpsc::unbounded();
        let (mut replies, _sent) = mpsc::unbounded::<Message>();
        client.unbounded_send(Ok(Message::Close(None))).unwrap();

        let outcome = open_while_listening(
            futures::future::pending::<()>(),
            &mut frames,
            &mut replies,
        )
        .await;

        assert_eq!(outcome, None);
    }
}
