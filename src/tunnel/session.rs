//! Live tunnel sessions.
//!
//! # Responsibilities
//! - Track one session per agent client key
//! - Run the duplex read/write loop for each accepted WebSocket
//! - Close every session when shutdown is triggered
//!
//! # Design Decisions
//! - A reconnecting agent replaces its entry and the old loop is told directly,
//!   so it closes even while clones of the old [`SessionHandle`] are still held
//! - A loop only removes its own entry (matched by session id), never a newer one

use axum::body::Bytes;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::{Sink, SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;
use crate::tunnel::{AgentIdentity, TunnelError};

const OUTBOUND_BUFFER: usize = 64;

/// A frame received from an agent.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub client_key: String,
    pub session_id: Uuid,
    pub payload: Bytes,
}

/// Handle to a registered session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub agent: AgentIdentity,
    pub connected_at: DateTime<Utc>,
    outbound: mpsc::Sender<Bytes>,
}

impl SessionHandle {
    /// Queue a binary frame for the agent.
    pub async fn send(&self, payload: Bytes) -> Result<(), TunnelError> {
        self.outbound
            .send(payload)
            .await
            .map_err(|_| TunnelError::SessionClosed(self.agent.client_key.clone()))
    }
}

struct SessionEntry {
    handle: SessionHandle,
    replaced: oneshot::Sender<()>,
}

/// Concurrent map of client key to session.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, SessionEntry>>,
    inbound: Option<mpsc::Sender<InboundFrame>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward every inbound agent frame to `inbound`.
    pub fn with_inbound(mut self, inbound: mpsc::Sender<InboundFrame>) -> Self {
        self.inbound = Some(inbound);
        self
    }

    pub fn get(&self, client_key: &str) -> Option<SessionHandle> {
        self.sessions.get(client_key).map(|entry| entry.handle.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Serve one agent until it disconnects, is replaced, or shutdown fires.
    pub async fn run(self, socket: WebSocket, agent: AgentIdentity, shutdown: Shutdown) {
        let (sender, mut outbound) = mpsc::channel::<Bytes>(OUTBOUND_BUFFER);
        let handle = SessionHandle {
            id: Uuid::new_v4(),
            agent: agent.clone(),
            connected_at: Utc::now(),
            outbound: sender,
        };
        let id = handle.id;
        let (replaced_tx, mut replaced) = oneshot::channel();
        let entry = SessionEntry {
            handle,
            replaced: replaced_tx,
        };

        if let Some(previous) = self.sessions.insert(agent.client_key.clone(), entry) {
            let _ = previous.replaced.send(());
            tracing::info!(
                client_key = %agent.client_key,
                previous = %previous.handle.id,
                session = %id,
                "Agent reconnected, replacing session"
            );
        } else {
            tracing::info!(client_key = %agent.client_key, session = %id, "Tunnel session opened");
        }
        metrics::set_tunnel_sessions(self.sessions.len());

        let (mut ws_tx, mut ws_rx) = socket.split();

        let stopping = shutdown.triggered();
        tokio::pin!(stopping);

        loop {
            tokio::select! {
                biased;
                _ = &mut stopping => {
                    send_close(&mut ws_tx, close_code::AWAY, "server shutting down").await;
                    break;
                }
                _ = &mut replaced => {
                    send_close(&mut ws_tx, close_code::NORMAL, "session replaced").await;
                    break;
                }
                frame = outbound.recv() => match frame {
                    Some(payload) => {
                        if ws_tx.send(Message::Binary(payload)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        send_close(&mut ws_tx, close_code::NORMAL, "session replaced").await;
                        break;
                    }
                },
                message = ws_rx.next() => match message {
                    Some(Ok(Message::Binary(payload))) => self.deliver(&agent, id, payload).await,
                    Some(Ok(Message::Text(text))) => {
                        self.deliver(&agent, id, Bytes::from(text.as_str().to_owned())).await
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::warn!(client_key = %agent.client_key, error = %e, "Tunnel read failed");
                        break;
                    }
                },
            }
        }

        self.sessions.remove_if(&agent.client_key, |_, entry| entry.handle.id == id);
        metrics::set_tunnel_sessions(self.sessions.len());
        tracing::info!(client_key = %agent.client_key, session = %id, "Tunnel session closed");
    }

    async fn deliver(&self, agent: &AgentIdentity, session_id: Uuid, payload: Bytes) {
        match &self.inbound {
            Some(inbound) => {
                let frame = InboundFrame {
                    client_key: agent.client_key.clone(),
                    session_id,
                    payload,
                };
                if inbound.send(frame).await.is_err() {
                    tracing::debug!(client_key = %agent.client_key, "Inbound consumer gone, dropping frame");
                }
            }
            None => {
                tracing::trace!(client_key = %agent.client_key, bytes = payload.len(), "Dropping inbound frame");
            }
        }
    }

    /// Wait until every session has ended. Returns `false` on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while !self.sessions.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(remaining = self.sessions.len(), "Tunnel sessions still open after drain timeout");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        true
    }
}

async fn send_close<S>(sink: &mut S, code: u16, reason: &'static str)
where
    S: Sink<Message> + Unpin,
{
    let _ = sink
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}
