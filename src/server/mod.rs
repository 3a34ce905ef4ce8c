//! WebSocket front end.
//!
//! One socket per identity (`GET /ws?identity=<id>`). Each text frame is an
//! [`Inbound`] request routed to the session of its game; rejections go back
//! to the requester only. Everything else reaches the client through the
//! [`ConnectionHub`].

mod config;
mod protocol;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use config::{LedgerConfig, ServerConfig};
pub use protocol::{Inbound, Request};

use crate::blackjack::BlackjackTable;
use crate::broadcast::{Broadcast, Envelope, Outbound};
use crate::duel::DuelGame;
use crate::grid::GridGame;
use crate::ledger::Ledger;
use crate::registry::ConnectionId;
use crate::runtime::{ConnectionHub, SessionActor, SessionError, SessionHandle};
use crate::session::GameKind;
use crate::stack::StackGame;
use crate::timer::Clock;

const LOG_TARGET: &str = "parlor::server";

/// Spawns one session actor per game kind.
pub fn spawn_sessions(
    config: &ServerConfig,
    seed: u64,
    ledger: Arc<dyn Ledger>,
    clock: &Arc<dyn Clock>,
    broadcast: &Arc<dyn Broadcast>,
    cancel: &CancellationToken,
) -> Vec<SessionHandle> {
    let (blackjack, _) = SessionActor::spawn(
        BlackjackTable::new(config.blackjack.clone(), seed, ledger, clock.clone()),
        broadcast.clone(),
        cancel.clone(),
    );
    let (stack, _) = SessionActor::spawn(
        StackGame::new(config.stack.clone(), seed.wrapping_add(1), clock.clone()),
        broadcast.clone(),
        cancel.clone(),
    );
    let (grid, _) = SessionActor::spawn(
        GridGame::new(config.grid.clone(), clock.clone()),
        broadcast.clone(),
        cancel.clone(),
    );
    let (duel, _) = SessionActor::spawn(
        DuelGame::new(config.duel.clone(), seed.wrapping_add(2), clock.clone()),
        broadcast.clone(),
        cancel.clone(),
    );
    vec![blackjack, stack, grid, duel]
}

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    sessions: Arc<HashMap<GameKind, SessionHandle>>,
    hub: Arc<ConnectionHub>,
    shutdown: CancellationToken,
}

impl AppState {
    /// Creates the state. Sockets close when `shutdown` is cancelled.
    #[must_use]
    pub fn new(
        sessions: impl IntoIterator<Item = SessionHandle>,
        hub: Arc<ConnectionHub>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sessions: Arc::new(
                sessions
                    .into_iter()
                    .map(|session| (session.kind(), session))
                    .collect(),
            ),
            hub,
            shutdown,
        }
    }

    /// Session serving `kind`.
    #[must_use]
    pub fn session(&self, kind: GameKind) -> Option<&SessionHandle> {
        self.sessions.get(&kind)
    }
}

/// Builds the router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

#[derive(Debug, serde::Serialize)]
struct Health {
    status: &'static str,
    connections: usize,
    sessions: usize,
}

async fn healthz(State(state): State<AppState>) -> Json<Health> {
    let open = state
        .sessions
        .values()
        .filter(|session| !session.is_closed())
        .count();
    Json(Health {
        status: if open == state.sessions.len() { "ok" } else { "degraded" },
        connections: state.hub.len(),
        sessions: open,
    })
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    identity: String,
}

async fn ws_handler(
    State(state): State<AppState>,
    Query(WsQuery { identity }): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let identity = identity.trim().to_owned();
    if identity.is_empty() {
        return (StatusCode::BAD_REQUEST, "identity is required").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(state, identity, socket))
}

async fn handle_socket(state: AppState, identity: String, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (outgoing, mut queue) = mpsc::unbounded_channel::<String>();
    let connection = state.hub.register(&identity, outgoing.clone());
    info!(target: LOG_TARGET, identity = %identity, connection = connection.0, "client connected");

    let writer = tokio::spawn(async move {
        while let Some(text) = queue.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // A reconnect takes over whatever the identity held before.
    for session in state.sessions.values() {
        if let Ok(true) = session.attach(&identity, connection).await {
            debug!(target: LOG_TARGET, identity = %identity, game = %session.kind(), "reattached");
        }
    }

    loop {
        let frame = tokio::select! {
            () = state.shutdown.cancelled() => break,
            frame = stream.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(text))) => {
                dispatch(&state, &identity, connection, &outgoing, &text).await;
            }
            Some(Ok(Message::Close(_)) | Err(_)) | None => break,
            Some(Ok(_)) => {}
        }
    }

    for session in state.sessions.values() {
        session.disconnect(&identity, connection).await;
    }
    state.hub.unregister(&identity, connection);
    drop(outgoing);
    let _ = writer.await;
    info!(target: LOG_TARGET, identity = %identity, connection = connection.0, "client disconnected");
}

fn reply(outgoing: &mpsc::UnboundedSender<String>, envelope: &Envelope) {
    match serde_json::to_string(envelope) {
        Ok(text) => {
            let _ = outgoing.send(text);
        }
        Err(err) => warn!(target: LOG_TARGET, %err, "failed to encode reply"),
    }
}

async fn dispatch(
    state: &AppState,
    identity: &str,
    connection: ConnectionId,
    outgoing: &mpsc::UnboundedSender<String>,
    text: &str,
) {
    let frame = match Inbound::parse(text) {
        Ok(frame) => frame,
        Err(err) => {
            debug!(target: LOG_TARGET, identity, %err, "malformed frame");
            reply(
                outgoing,
                &Envelope::server(Outbound::Error {
                    reason: "bad_request",
                    message: err.to_string(),
                }),
            );
            return;
        }
    };
    let Some(session) = state.session(frame.game) else {
        reply(
            outgoing,
            &Envelope::server(Outbound::Error {
                reason: "unknown_game",
                message: format!("{} is not served here", frame.game),
            }),
        );
        return;
    };

    let result = match frame.request {
        Request::Join => session
            .join(identity, connection)
            .await
            .map(|outcome| Some(Outbound::Joined(outcome))),
        Request::Leave => session.leave(identity).await.map(|_| None),
        Request::Spectate => session.spectate(identity, connection).await.map(|()| None),
        Request::Start => session.start(identity).await.map(|()| None),
        request => match request.command() {
            Some(command) => session.command(identity, command).await.map(|()| None),
            None => Ok(None),
        },
    };

    let event = match result {
        Ok(Some(event)) => event,
        Ok(None) => return,
        Err(SessionError::Rejected(rejection)) => {
            debug!(target: LOG_TARGET, identity, game = %frame.game, reason = rejection.reason(), "request rejected");
            Outbound::Error {
                reason: rejection.reason(),
                message: rejection.to_string(),
            }
        }
        Err(SessionError::Closed) => Outbound::Error {
            reason: "unavailable",
            message: "the session is not running".to_owned(),
        },
    };
    reply(outgoing, &Envelope::game(frame.game, event));
}
