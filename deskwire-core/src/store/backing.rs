//! Backing store interface
//!
//! The remote half of every durable operation. No wire protocol is
//! prescribed here; the embedding application provides the client and maps
//! its failures onto [`crate::Error`]: `NotFound` for unknown ids,
//! `Transport` for everything network-shaped. There is no partial-success
//! contract; an operation either returns the authoritative record(s) or
//! fails as a whole.

use async_trait::async_trait;

use crate::cache::{Page, PageRequest, Sort, TicketFilters};
use crate::error::Result;
use crate::types::{Message, Ticket, TicketDraft, TicketPatch};

/// Remote persistence and query service for tickets.
///
/// Every returned record is authoritative: server-assigned ids, timestamps,
/// and server-filled fields. The sync engine reconciles them into the local
/// cache; implementations must not assume their results are applied
/// verbatim.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Fetch one page of tickets matching `filters`, sorted and sliced
    /// server-side.
    async fn fetch_page(
        &self,
        filters: &TicketFilters,
        page: &PageRequest,
        sort: &Sort,
    ) -> Result<Page<Ticket>>;

    /// Fetch a single ticket by id. `Error::NotFound` when the id is
    /// unknown to the service.
    async fn fetch_one(&self, id: &str) -> Result<Ticket>;

    /// Create a ticket from `draft`. The caller's identity travels with
    /// the connection credential; the returned record carries the
    /// server-assigned id and timestamps.
    async fn create(&self, draft: &TicketDraft) -> Result<Ticket>;

    /// Apply `patch` to an existing ticket and return the updated record.
    async fn update(&self, id: &str, patch: &TicketPatch) -> Result<Ticket>;

    /// Append a message to a ticket's thread. Returns the updated ticket
    /// together with the stored message (server-assigned message id).
    async fn append_message(
        &self,
        ticket_id: &str,
        content: &str,
        sender_id: &str,
    ) -> Result<(Ticket, Message)>;
}
