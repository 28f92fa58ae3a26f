//! Push channel lifecycle
//!
//! Maintains one live transport session per authenticated user, feeds
//! decoded frames into the sync engine, and recovers from drops with
//! exponential backoff.
//!
//! ## Connection lifecycle
//!
//! ```text
//!                 connect()               subscribed
//!  Disconnected ────────────► Connecting ───────────► Connected
//!       ▲  ▲                      │                       │
//!       │  │ server close         │ connect failure       │ transport failure
//!       │  └──────────────────────┼───────────────────────┤
//!       │                         ▼                       │
//!       └── disconnect()        Error ◄──────────────────┘
//! ```
//!
//! Every failure or server close schedules a reconnect while a session
//! exists: the attempt counter bumps, the task sleeps `2^attempt` seconds
//! (clamped to 30s), and calls `connect()` again. A successful connect
//! resets the counter; once `max_reconnect_attempts` attempts are spent
//! the channel latches an error and waits for the next explicit
//! `connect()`. `disconnect()` cancels everything in flight.
//!
//! Two topics are subscribed per session: the caller's private queue
//! (`/user/{user_id}/queue/messages`) and the shared broadcast topic
//! (`/topic/notifications`).

pub mod backoff;
pub mod event;
pub mod transport;

pub use backoff::BackoffPolicy;
pub use event::{PushEvent, PushFrame};
pub use transport::{Connection, Transport, TransportEvent};

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::ChannelConfig;
use crate::error::{Error, Result};
use crate::session::{Session, SessionStore};
use crate::sync::SyncEngine;

// ============================================
// Observable status
// ============================================

/// Lifecycle state of the push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::Error => "error",
        }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of the channel, published through a watch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStatus {
    pub state: ChannelState,
    /// Most recent failure; cleared on a successful connect
    pub error: Option<String>,
    /// Reconnect attempts since the last successful connect
    pub attempts: u32,
}

#[derive(Debug)]
struct Outbound {
    topic: String,
    body: String,
}

// ============================================
// Channel
// ============================================

/// Owns the transport session and the reconnect schedule
pub struct PushChannel {
    transport: Arc<dyn Transport>,
    engine: Arc<SyncEngine>,
    session: Arc<SessionStore>,
    config: ChannelConfig,
    status_tx: watch::Sender<ChannelStatus>,
    outbound_tx: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
    cancel: Mutex<CancellationToken>,
}

impl PushChannel {
    pub fn new(
        transport: Arc<dyn Transport>,
        engine: Arc<SyncEngine>,
        session: Arc<SessionStore>,
        config: ChannelConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(ChannelStatus::default());
        Self {
            transport,
            engine,
            session,
            config,
            status_tx,
            outbound_tx: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Current status snapshot
    pub fn status(&self) -> ChannelStatus {
        self.status_tx.borrow().clone()
    }

    /// Subscribe to status changes
    pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.status_tx.subscribe()
    }

    /// Start connecting in the background.
    ///
    /// Returns immediately; progress is observable through
    /// [`PushChannel::watch_status`]. A second call while the channel is
    /// connecting or connected is a no-op.
    pub fn connect(self: &Arc<Self>) -> Result<()> {
        let session = self.session.current().ok_or_else(|| {
            Error::Unauthenticated("connecting the push channel requires a session".to_string())
        })?;

        // The cancel lock serializes state transitions against disconnect()
        let cancel = {
            let guard = self.cancel.lock().unwrap();
            {
                let status = self.status_tx.borrow();
                if matches!(
                    status.state,
                    ChannelState::Connecting | ChannelState::Connected
                ) {
                    tracing::debug!(state = %status.state, "Push channel already active");
                    return Ok(());
                }
            }
            self.status_tx
                .send_modify(|s| s.state = ChannelState::Connecting);
            guard.clone()
        };

        let channel = Arc::clone(self);
        tokio::spawn(async move { channel.run(session, cancel).await });
        Ok(())
    }

    /// Tear down the session and cancel any pending reconnect.
    ///
    /// The last error and the attempt counter are left in place; only a
    /// successful connect clears them.
    pub fn disconnect(&self) {
        let mut cancel = self.cancel.lock().unwrap();
        let old = std::mem::replace(&mut *cancel, CancellationToken::new());
        old.cancel();
        *self.outbound_tx.lock().unwrap() = None;
        self.status_tx
            .send_modify(|s| s.state = ChannelState::Disconnected);
        drop(cancel);
        tracing::info!("Push channel disconnected");
    }

    /// Publish an application frame to a topic.
    ///
    /// Fails with `Error::Channel` unless the channel is connected; the
    /// payload is not queued for later.
    pub fn send<T: Serialize>(&self, topic: &str, payload: &T) -> Result<()> {
        let body = serde_json::to_string(payload)?;

        let guard = self.outbound_tx.lock().unwrap();
        let connected = self.status_tx.borrow().state == ChannelState::Connected;
        match guard.as_ref() {
            Some(tx) if connected => tx
                .send(Outbound {
                    topic: topic.to_string(),
                    body,
                })
                .map_err(|_| Error::Channel("push channel is shutting down".to_string())),
            _ => {
                tracing::warn!(topic = %topic, "Cannot send: push channel not connected");
                Err(Error::Channel("not connected".to_string()))
            }
        }
    }

    // ============================================
    // Session lifecycle task
    // ============================================

    async fn run(self: Arc<Self>, session: Session, cancel: CancellationToken) {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = self.transport.connect(&session.credential) => result,
        };
        let mut conn = match connected {
            Ok(conn) => conn,
            Err(e) => {
                if cancel.is_cancelled() {
                    return;
                }
                self.note_failure(format!("Connection error: {}", e));
                self.schedule_reconnect(&cancel);
                return;
            }
        };

        let user_topic = self.config.user_topic(&session.user.id);
        for topic in [user_topic.as_str(), self.config.notification_topic.as_str()] {
            if let Err(e) = conn.subscribe(topic).await {
                if cancel.is_cancelled() {
                    return;
                }
                self.note_failure(format!("Connection error: {}", e));
                self.schedule_reconnect(&cancel);
                return;
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        // Commit under the cancel lock: a disconnect that raced the
        // subscribe phase must not be overwritten with Connected
        let aborted = {
            let _guard = self.cancel.lock().unwrap();
            if cancel.is_cancelled() {
                true
            } else {
                *self.outbound_tx.lock().unwrap() = Some(tx.clone());
                self.status_tx.send_modify(|s| {
                    s.state = ChannelState::Connected;
                    s.error = None;
                    s.attempts = 0;
                });
                false
            }
        };
        if aborted {
            conn.close().await;
            return;
        }
        tracing::info!(user_id = %session.user.id, queue = %user_topic, "Push channel connected");

        // Holding tx here keeps rx.recv() from yielding None mid-loop
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    conn.close().await;
                    return;
                }
                Some(frame) = rx.recv() => {
                    if let Err(e) = conn.publish(&frame.topic, &frame.body).await {
                        self.clear_outbound();
                        if cancel.is_cancelled() {
                            return;
                        }
                        self.note_failure(format!("Connection error: {}", e));
                        self.schedule_reconnect(&cancel);
                        return;
                    }
                }
                event = conn.next_event() => match event {
                    Some(TransportEvent::Frame { topic, body }) => self.dispatch(&topic, &body),
                    Some(TransportEvent::Failed(reason)) => {
                        self.clear_outbound();
                        if cancel.is_cancelled() {
                            return;
                        }
                        self.note_failure(format!("Connection error: {}", reason));
                        self.schedule_reconnect(&cancel);
                        return;
                    }
                    Some(TransportEvent::Closed) | None => {
                        self.clear_outbound();
                        if cancel.is_cancelled() {
                            return;
                        }
                        tracing::info!("Push channel closed by server");
                        self.status_tx
                            .send_modify(|s| s.state = ChannelState::Disconnected);
                        self.schedule_reconnect(&cancel);
                        return;
                    }
                },
            }
        }
    }

    /// Route one decoded frame into the sync engine
    fn dispatch(&self, topic: &str, body: &str) {
        match event::decode(body) {
            Ok(PushEvent::NewMessage(message)) => {
                tracing::debug!(ticket_id = %message.ticket_id, "Pushed message received");
                self.engine.apply_message(message);
            }
            Ok(PushEvent::TicketUpdated(ticket)) => {
                tracing::debug!(ticket_id = %ticket.id, "Pushed ticket update");
                self.engine.reconcile(ticket);
            }
            Ok(PushEvent::TicketAssigned(ticket)) => {
                tracing::info!(
                    ticket_id = %ticket.id,
                    assignee = ticket.assigned_to.as_deref().unwrap_or("nobody"),
                    "Ticket assignment pushed"
                );
                self.engine.reconcile(ticket);
            }
            Ok(PushEvent::UserTyping) | Ok(PushEvent::ConnectionStatus) => {}
            Ok(PushEvent::Unknown(tag)) => {
                tracing::debug!(topic = %topic, tag = %tag, "Ignoring unknown push event");
            }
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "Dropping malformed push frame");
            }
        }
    }

    fn note_failure(&self, message: String) {
        tracing::warn!(error = %message, "Push channel failure");
        self.status_tx.send_modify(|s| {
            s.state = ChannelState::Error;
            s.error = Some(message);
        });
    }

    fn clear_outbound(&self) {
        *self.outbound_tx.lock().unwrap() = None;
    }

    /// Arm the next reconnect attempt, or latch a terminal error once the
    /// schedule is spent. Logged-out sessions never reconnect.
    fn schedule_reconnect(self: &Arc<Self>, cancel: &CancellationToken) {
        if !self.session.is_authenticated() {
            tracing::debug!("Not reconnecting without a session");
            return;
        }

        let policy = BackoffPolicy::from(&self.config);
        let attempts = self.status_tx.borrow().attempts;
        if policy.exhausted(attempts) {
            tracing::warn!(attempts, "Reconnect attempts exhausted");
            self.status_tx.send_modify(|s| {
                s.state = ChannelState::Error;
                s.error = Some("Failed to reconnect after multiple attempts".to_string());
            });
            return;
        }

        let attempt = attempts + 1;
        self.status_tx.send_modify(|s| s.attempts = attempt);
        let delay = policy.delay_for(attempt);
        tracing::info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling push channel reconnect"
        );

        let channel = Arc::clone(self);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = channel.connect() {
                        tracing::debug!(error = %e, "Reconnect abandoned");
                    }
                }
            }
        });
    }
}
