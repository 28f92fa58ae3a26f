//! Core domain types for deskwire
//!
//! These types form the canonical client-side model of the helpdesk data.
//! Records flow into the cache from server fetches, optimistic local writes,
//! and pushed events; all three paths produce the same types.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Ticket** | A support request with a status/priority lifecycle and a message thread |
//! | **Message** | One entry in a ticket's append-only conversation thread |
//! | **Customer** | The User who opened a ticket; immutable for the ticket's lifetime |
//! | **Assignee** | The User currently working a ticket; may be absent or reassigned |
//! | **Provisional record** | A locally-created record carrying a client-assigned `temp-` id |
//! | **Authoritative record** | The server's version of a record, returned by a write or pushed |
//!
//! Enum wire values are SCREAMING_SNAKE_CASE to match the service protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Users
// ============================================

/// Role attached to an authenticated identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    /// Opens tickets, sees only their own
    Customer,
    /// Works tickets, may be assigned
    Agent,
    /// Full visibility and mutation rights
    Admin,
}

impl UserRole {
    /// Returns the identifier used on the wire and in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Customer => "CUSTOMER",
            UserRole::Agent => "AGENT",
            UserRole::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CUSTOMER" => Ok(UserRole::Customer),
            "AGENT" => Ok(UserRole::Agent),
            "ADMIN" => Ok(UserRole::Admin),
            _ => Err(format!("unknown user role: {}", s)),
        }
    }
}

fn default_active() -> bool {
    true
}

/// An identity issued by the session; immutable once issued
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: String,
    /// Email address (login name)
    pub email: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Role, determines visibility and mutation rights
    pub role: UserRole,
    /// Whether the account is active (absent on embedded references)
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl User {
    /// Full display name, used for person-field sorting
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// ============================================
// Tickets
// ============================================

/// Lifecycle status of a ticket.
///
/// The nominal flow is OPEN → IN_PROGRESS → RESOLVED → CLOSED, but any
/// status may follow any other (tickets reopen, close without resolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    /// Returns the identifier used on the wire and in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "OPEN",
            TicketStatus::InProgress => "IN_PROGRESS",
            TicketStatus::Resolved => "RESOLVED",
            TicketStatus::Closed => "CLOSED",
        }
    }

    /// Position in the nominal lifecycle, used for sorting
    pub fn rank(&self) -> u8 {
        match self {
            TicketStatus::Open => 1,
            TicketStatus::InProgress => 2,
            TicketStatus::Resolved => 3,
            TicketStatus::Closed => 4,
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(TicketStatus::Open),
            "IN_PROGRESS" => Ok(TicketStatus::InProgress),
            "RESOLVED" => Ok(TicketStatus::Resolved),
            "CLOSED" => Ok(TicketStatus::Closed),
            _ => Err(format!("unknown ticket status: {}", s)),
        }
    }
}

/// Urgency of a ticket, totally ordered for sort purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TicketPriority {
    /// Returns the identifier used on the wire and in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "LOW",
            TicketPriority::Medium => "MEDIUM",
            TicketPriority::High => "HIGH",
            TicketPriority::Urgent => "URGENT",
        }
    }

    /// Position in the urgency order, used for sorting
    pub fn rank(&self) -> u8 {
        match self {
            TicketPriority::Low => 1,
            TicketPriority::Medium => 2,
            TicketPriority::High => 3,
            TicketPriority::Urgent => 4,
        }
    }
}

impl std::fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TicketPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(TicketPriority::Low),
            "MEDIUM" => Ok(TicketPriority::Medium),
            "HIGH" => Ok(TicketPriority::High),
            "URGENT" => Ok(TicketPriority::Urgent),
            _ => Err(format!("unknown ticket priority: {}", s)),
        }
    }
}

/// A support ticket and its full message thread.
///
/// Invariants: `id` is unique across the cache and stable for the ticket's
/// lifetime; `updated_at >= created_at`, and every mutation bumps
/// `updated_at`; `messages` is append-only and chronological.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique identifier (client-assigned `temp-` id until the server confirms)
    pub id: String,
    /// Short summary line
    pub title: String,
    /// Full problem description
    pub description: String,
    /// Current lifecycle status
    pub status: TicketStatus,
    /// Urgency
    pub priority: TicketPriority,
    /// Id of the customer who opened the ticket
    pub customer_id: String,
    /// The customer who opened the ticket; immutable
    pub customer: User,
    /// Id of the current assignee, if any
    pub assigned_to: Option<String>,
    /// The current assignee, if any; mutable
    pub assignee: Option<User>,
    /// Set-like labels; insertion order carries no meaning
    #[serde(default)]
    pub tags: Vec<String>,
    /// When the ticket was opened
    pub created_at: DateTime<Utc>,
    /// Bumped on every mutation; drives reconciliation ordering
    pub updated_at: DateTime<Utc>,
    /// Conversation thread, append-only, chronological
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Ticket {
    /// Bump `updated_at` to now
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Append a message if its id is not already present.
    ///
    /// Returns false on a duplicate id (the thread is left untouched).
    /// Advances `updated_at` to at least the message's creation time.
    pub fn append_message(&mut self, message: Message) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        if message.created_at > self.updated_at {
            self.updated_at = message.created_at;
        }
        self.messages.push(message);
        true
    }
}

// ============================================
// Messages
// ============================================

/// Kind of message within a ticket thread
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Ordinary conversation text
    #[default]
    Text,
    /// Generated by the service (status changes, assignment notices)
    System,
    /// Carries an uploaded file reference
    File,
}

impl MessageType {
    /// Returns the identifier used on the wire and in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "TEXT",
            MessageType::System => "SYSTEM",
            MessageType::File => "FILE",
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEXT" => Ok(MessageType::Text),
            "SYSTEM" => Ok(MessageType::System),
            "FILE" => Ok(MessageType::File),
            _ => Err(format!("unknown message type: {}", s)),
        }
    }
}

/// One entry in a ticket's conversation thread.
///
/// Append-only: once added to a ticket it is never removed or reordered
/// client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier (client-assigned `temp-msg-` id until confirmed)
    pub id: String,
    /// Ticket this message belongs to
    pub ticket_id: String,
    /// Id of the sender
    pub sender_id: String,
    /// The sender
    pub sender: User,
    /// Message body
    pub content: String,
    /// Kind of message
    #[serde(default)]
    pub message_type: MessageType,
    /// When the message was sent
    pub created_at: DateTime<Utc>,
}

// ============================================
// Mutation Inputs
// ============================================

/// Fields a caller supplies to open a new ticket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDraft {
    pub title: String,
    pub description: String,
    pub priority: TicketPriority,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Pre-assignment at creation time, if the caller's role allows it
    pub assigned_to: Option<String>,
}

/// Partial update for an existing ticket; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    /// `Some(None)` clears the assignee; `None` leaves it unchanged
    pub assignee: Option<Option<User>>,
    pub tags: Option<Vec<String>>,
}

impl TicketPatch {
    /// Merge the present fields into `ticket`, keeping `assigned_to` and
    /// `assignee` consistent. Does not bump `updated_at`; callers do.
    pub fn apply_to(&self, ticket: &mut Ticket) {
        if let Some(title) = &self.title {
            ticket.title = title.clone();
        }
        if let Some(description) = &self.description {
            ticket.description = description.clone();
        }
        if let Some(status) = self.status {
            ticket.status = status;
        }
        if let Some(priority) = self.priority {
            ticket.priority = priority;
        }
        if let Some(assignee) = &self.assignee {
            ticket.assigned_to = assignee.as_ref().map(|u| u.id.clone());
            ticket.assignee = assignee.clone();
        }
        if let Some(tags) = &self.tags {
            ticket.tags = tags.clone();
        }
    }
}

// ============================================
// Provisional Ids
// ============================================

/// Prefix shared by all client-assigned ids
pub const PROVISIONAL_PREFIX: &str = "temp-";

fn random_suffix() -> String {
    let mut s = uuid::Uuid::new_v4().simple().to_string();
    s.truncate(9);
    s
}

/// Client-assigned id for an optimistically created ticket
pub fn provisional_ticket_id() -> String {
    format!("temp-{}-{}", Utc::now().timestamp_millis(), random_suffix())
}

/// Client-assigned id for an optimistically posted message
pub fn provisional_message_id() -> String {
    format!("temp-msg-{}", Utc::now().timestamp_millis())
}

/// Whether an id was client-assigned and awaits a server-issued replacement
pub fn is_provisional_id(id: &str) -> bool {
    id.starts_with(PROVISIONAL_PREFIX)
}
