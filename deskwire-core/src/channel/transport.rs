//! Transport seam for the push channel
//!
//! The channel state machine is transport-agnostic: anything that can open
//! an authenticated duplex session, subscribe to topics, publish frames,
//! and surface lifecycle events can drive it. Production code plugs in a
//! STOMP-over-WebSocket client; tests plug in scripted fakes.

use async_trait::async_trait;

use crate::error::Result;

/// Raised by a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// An application frame arrived on a subscribed topic
    Frame { topic: String, body: String },
    /// The server ended the session in an orderly way
    Closed,
    /// The session broke (protocol error, socket failure)
    Failed(String),
}

/// Opens authenticated sessions.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a session using the caller's credential. Errors map to
    /// `Error::Transport`.
    async fn connect(&self, credential: &str) -> Result<Box<dyn Connection>>;
}

/// A live duplex session.
///
/// `next_event` must be cancellation safe: the channel polls it inside a
/// `select!` and may drop the future between events. Dropping a connection
/// releases it; `close` flushes a graceful shutdown first.
#[async_trait]
pub trait Connection: Send {
    async fn subscribe(&mut self, topic: &str) -> Result<()>;

    async fn publish(&mut self, topic: &str, body: &str) -> Result<()>;

    /// The next lifecycle event, or `None` once the session is spent
    async fn next_event(&mut self) -> Option<TransportEvent>;

    async fn close(&mut self);
}
