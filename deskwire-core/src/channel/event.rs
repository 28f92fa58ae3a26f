//! Push frame decoding
//!
//! Server frames are JSON envelopes with a `type` tag, a tag-specific
//! `payload`, and an optional `timestamp`:
//!
//! ```json
//! {"type": "TICKET_UPDATED", "payload": {...}, "timestamp": "2024-03-10T12:00:00Z"}
//! ```
//!
//! Unknown tags decode to [`PushEvent::Unknown`] so new server-side event
//! kinds never break an older client. A frame that is not valid JSON, or
//! whose payload does not match its tag, is a [`crate::Error::MalformedEvent`].

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::{Message, Ticket};

/// Raw wire envelope
#[derive(Debug, Deserialize)]
pub struct PushFrame {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A decoded push event
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// A message was appended to a ticket's thread
    NewMessage(Message),
    /// A ticket changed on the server
    TicketUpdated(Ticket),
    /// A ticket was assigned to an agent
    TicketAssigned(Ticket),
    /// Presence signal; carried on the wire but not acted on
    UserTyping,
    /// Server-side connection diagnostic; not acted on
    ConnectionStatus,
    /// A tag this client does not know
    Unknown(String),
}

/// Decode one frame body.
pub fn decode(body: &str) -> Result<PushEvent> {
    let frame: PushFrame = serde_json::from_str(body)
        .map_err(|e| Error::MalformedEvent(format!("bad frame: {}", e)))?;

    match frame.tag.as_str() {
        "NEW_MESSAGE" => {
            let message: Message = decode_payload(&frame)?;
            Ok(PushEvent::NewMessage(message))
        }
        "TICKET_UPDATED" => {
            let ticket: Ticket = decode_payload(&frame)?;
            Ok(PushEvent::TicketUpdated(ticket))
        }
        "TICKET_ASSIGNED" => {
            let ticket: Ticket = decode_payload(&frame)?;
            Ok(PushEvent::TicketAssigned(ticket))
        }
        "USER_TYPING" => Ok(PushEvent::UserTyping),
        "CONNECTION_STATUS" => Ok(PushEvent::ConnectionStatus),
        other => Ok(PushEvent::Unknown(other.to_string())),
    }
}

fn decode_payload<T: serde::de::DeserializeOwned>(frame: &PushFrame) -> Result<T> {
    serde_json::from_value(frame.payload.clone())
        .map_err(|e| Error::MalformedEvent(format!("{} payload: {}", frame.tag, e)))
}
