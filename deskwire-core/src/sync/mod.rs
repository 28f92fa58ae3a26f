//! Synchronization engine
//!
//! Orchestrates the two-phase write protocol: every mutation is applied to
//! the local cache synchronously (the optimistic phase), then persisted to
//! the backing store from a detached task (the durable phase). Server
//! responses and pushed events funnel through the same reconciliation
//! entry points, so there is exactly one merge policy: for a given ticket
//! id, the record with the later `updated_at` wins.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  optimistic upsert   ┌─────────────┐
//! │  UI / caller │ ───────────────────► │ TicketCache │
//! └──────┬───────┘     (synchronous)    └─────────────┘
//!        │                                     ▲
//!        │ WriteReceipt                        │ reconcile / supersede
//!        ▼                                     │ (later updated_at wins)
//! ┌──────────────┐   detached write     ┌──────┴──────┐
//! │  SyncEngine  │ ───────────────────► │ BackingStore│
//! └──────────────┘    (tokio::spawn)    └─────────────┘
//!        ▲
//!        │ pushed events (same reconcile path)
//! ┌──────┴──────┐
//! │ PushChannel │
//! └─────────────┘
//! ```
//!
//! A write failure never rolls back the optimistic entry: local state is
//! the source of truth until a later sync succeeds. The failure is
//! reported through the receipt and the per-ticket write state, and a
//! future refresh or pushed event is the recovery path.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use deskwire_core::sync::SyncEngine;
//!
//! let engine = Arc::new(SyncEngine::new(backing, local, session));
//! let receipt = engine.create_ticket(draft)?;
//! render(&receipt.ticket); // provisional record, visible immediately
//! match receipt.outcome.await {
//!     Ok(WriteOutcome::Committed(ticket)) => { /* server id assigned */ }
//!     Ok(WriteOutcome::Failed(err)) => { /* retained locally, flag it */ }
//!     Err(_) => { /* engine dropped mid-write */ }
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::oneshot;

use crate::cache::{Page, PageRequest, Sort, TicketCache, TicketFilters};
use crate::error::{Error, Result};
use crate::session::SessionStore;
use crate::store::{BackingStore, LocalStore};
use crate::types::{
    provisional_message_id, provisional_ticket_id, Message, Ticket, TicketDraft, TicketPatch,
};

/// Local-store key the cache snapshot is persisted under
const SNAPSHOT_KEY: &str = "tickets_cache";

/// Progress of a ticket's most recent durable write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    /// The durable write is in flight
    Pending,
    /// The durable write failed; the optimistic record is retained
    Failed,
}

/// Final result of a durable write
#[derive(Debug)]
pub enum WriteOutcome {
    /// The authoritative record, already reconciled into the cache
    Committed(Ticket),
    /// The write never reached the server; optimistic state retained
    Failed(Error),
}

/// Handed back by every mutating operation.
///
/// `ticket` is the provisional record the cache now holds; callers render
/// it immediately and do not wait. `outcome` resolves when the detached
/// durable write finishes; dropping it cancels nothing.
pub struct WriteReceipt {
    pub ticket: Ticket,
    pub outcome: oneshot::Receiver<WriteOutcome>,
}

/// Orchestrates optimistic writes, durable persistence, and reconciliation
pub struct SyncEngine {
    cache: Mutex<TicketCache>,
    backing: Arc<dyn BackingStore>,
    local: Arc<dyn LocalStore>,
    session: Arc<SessionStore>,
    writes: Mutex<HashMap<String, WriteState>>,
}

impl SyncEngine {
    pub fn new(
        backing: Arc<dyn BackingStore>,
        local: Arc<dyn LocalStore>,
        session: Arc<SessionStore>,
    ) -> Self {
        Self {
            cache: Mutex::new(TicketCache::new()),
            backing,
            local,
            session,
            writes: Mutex::new(HashMap::new()),
        }
    }

    // ============================================
    // Startup
    // ============================================

    /// Populate the cache from the persisted snapshot, merged over
    /// `baseline` (server-seeded records). Snapshot entries win id
    /// collisions. Read failures fall back to the baseline alone.
    pub fn load_snapshot(&self, baseline: Vec<Ticket>) {
        let persisted = match self.local.get(SNAPSHOT_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Ticket>>(&raw) {
                Ok(tickets) => tickets,
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring unreadable ticket snapshot");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read ticket snapshot");
                Vec::new()
            }
        };

        let mut cache = self.cache.lock().unwrap();
        tracing::info!(
            persisted = persisted.len(),
            baseline = baseline.len(),
            "Loading ticket cache"
        );
        cache.merge_baseline(baseline, persisted);
        self.persist_locked(&cache);
    }

    // ============================================
    // Reads
    // ============================================

    /// Filter, sort, and paginate the local cache
    pub fn query(
        &self,
        filters: &TicketFilters,
        page: &PageRequest,
        sort: &Sort,
    ) -> Result<Page<Ticket>> {
        self.cache.lock().unwrap().query(filters, page, sort)
    }

    /// A single cached ticket, if present
    pub fn ticket(&self, id: &str) -> Option<Ticket> {
        self.cache.lock().unwrap().get(id).cloned()
    }

    /// Number of cached tickets
    pub fn cached_count(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    /// Progress flag of the most recent durable write touching `id`
    pub fn write_state(&self, id: &str) -> Option<WriteState> {
        self.writes.lock().unwrap().get(id).copied()
    }

    /// Fetch a page from the backing store and reconcile it into the
    /// cache. Returns the server's page verbatim; the cache never regresses
    /// a locally newer record because every returned ticket goes through
    /// the same later-`updated_at`-wins merge as pushed events.
    pub async fn refresh(
        &self,
        filters: &TicketFilters,
        page: &PageRequest,
        sort: &Sort,
    ) -> Result<Page<Ticket>> {
        let fetched = self.backing.fetch_page(filters, page, sort).await?;

        let mut cache = self.cache.lock().unwrap();
        for ticket in &fetched.items {
            self.reconcile_locked(&mut cache, ticket.clone());
        }
        cache.mark_fetched();
        self.persist_locked(&cache);
        tracing::debug!(
            fetched = fetched.items.len(),
            total = fetched.total,
            "Refreshed tickets from backing store"
        );

        Ok(fetched)
    }

    /// Fetch one ticket from the backing store and reconcile it in.
    ///
    /// Returns the record the cache holds afterwards (the merge winner).
    /// `Error::NotFound` propagates and leaves the cache untouched.
    pub async fn fetch_ticket(&self, id: &str) -> Result<Ticket> {
        let fetched = self.backing.fetch_one(id).await?;

        let mut cache = self.cache.lock().unwrap();
        self.reconcile_locked(&mut cache, fetched.clone());
        self.persist_locked(&cache);
        Ok(cache.get(&fetched.id).cloned().unwrap_or(fetched))
    }

    // ============================================
    // Mutations (optimistic phase + detached durable phase)
    // ============================================

    /// Create a ticket.
    ///
    /// The returned receipt carries the provisional record under a
    /// client-assigned `temp-` id; once the server responds, the entry is
    /// rekeyed to the authoritative id in place.
    pub fn create_ticket(self: &Arc<Self>, draft: TicketDraft) -> Result<WriteReceipt> {
        let user = self.session.user().ok_or_else(|| {
            Error::Unauthenticated("creating a ticket requires a session".to_string())
        })?;

        let now = Utc::now();
        let ticket = Ticket {
            id: provisional_ticket_id(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            status: crate::types::TicketStatus::Open,
            priority: draft.priority,
            customer_id: user.id.clone(),
            customer: user,
            assigned_to: draft.assigned_to.clone(),
            assignee: None,
            tags: draft.tags.clone(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        };

        {
            let mut cache = self.cache.lock().unwrap();
            cache.upsert(ticket.clone());
            self.persist_locked(&cache);
        }
        self.set_write_state(&ticket.id, WriteState::Pending);
        tracing::info!(ticket_id = %ticket.id, "Ticket created optimistically");

        let (tx, rx) = oneshot::channel();
        let engine = Arc::clone(self);
        let temp_id = ticket.id.clone();
        tokio::spawn(async move {
            match engine.backing.create(&draft).await {
                Ok(authoritative) => {
                    engine.finish_create(&temp_id, authoritative.clone());
                    let _ = tx.send(WriteOutcome::Committed(authoritative));
                }
                Err(e) => {
                    tracing::warn!(ticket_id = %temp_id, error = %e, "Ticket create did not reach the server");
                    engine.set_write_state(&temp_id, WriteState::Failed);
                    let _ = tx.send(WriteOutcome::Failed(e));
                }
            }
        });

        Ok(WriteReceipt {
            ticket,
            outcome: rx,
        })
    }

    /// Update fields of a cached ticket.
    ///
    /// Fails fast with `Error::NotFound` when the id is not cached: the
    /// optimistic phase mutates a copy of the current record, so there must
    /// be one. Callers fetch before they mutate.
    pub fn update_ticket(self: &Arc<Self>, id: &str, patch: TicketPatch) -> Result<WriteReceipt> {
        if !self.session.is_authenticated() {
            return Err(Error::Unauthenticated(
                "updating a ticket requires a session".to_string(),
            ));
        }

        let provisional = {
            let mut cache = self.cache.lock().unwrap();
            let Some(current) = cache.get(id) else {
                return Err(Error::NotFound(id.to_string()));
            };
            let mut updated = current.clone();
            patch.apply_to(&mut updated);
            updated.touch();
            cache.upsert(updated.clone());
            self.persist_locked(&cache);
            updated
        };
        self.set_write_state(id, WriteState::Pending);
        tracing::info!(ticket_id = %id, "Ticket updated optimistically");

        let (tx, rx) = oneshot::channel();
        let engine = Arc::clone(self);
        let ticket_id = id.to_string();
        tokio::spawn(async move {
            match engine.backing.update(&ticket_id, &patch).await {
                Ok(authoritative) => {
                    engine.reconcile(authoritative.clone());
                    engine.clear_write_state(&ticket_id);
                    let _ = tx.send(WriteOutcome::Committed(authoritative));
                }
                Err(e) => {
                    tracing::warn!(ticket_id = %ticket_id, error = %e, "Ticket update did not reach the server");
                    engine.set_write_state(&ticket_id, WriteState::Failed);
                    let _ = tx.send(WriteOutcome::Failed(e));
                }
            }
        });

        Ok(WriteReceipt {
            ticket: provisional,
            outcome: rx,
        })
    }

    /// Append a message to a cached ticket's thread.
    ///
    /// The provisional message carries a `temp-msg-` id; the authoritative
    /// ticket returned by the server replaces it on success (by winning the
    /// `updated_at` merge), and is retained as-is on failure.
    pub fn post_message(self: &Arc<Self>, ticket_id: &str, content: &str) -> Result<WriteReceipt> {
        let user = self.session.user().ok_or_else(|| {
            Error::Unauthenticated("posting a message requires a session".to_string())
        })?;

        let message = Message {
            id: provisional_message_id(),
            ticket_id: ticket_id.to_string(),
            sender_id: user.id.clone(),
            sender: user,
            content: content.to_string(),
            message_type: crate::types::MessageType::Text,
            created_at: Utc::now(),
        };

        let provisional = {
            let mut cache = self.cache.lock().unwrap();
            let Some(current) = cache.get(ticket_id) else {
                return Err(Error::NotFound(ticket_id.to_string()));
            };
            let mut updated = current.clone();
            updated.append_message(message.clone());
            cache.upsert(updated.clone());
            self.persist_locked(&cache);
            updated
        };
        self.set_write_state(ticket_id, WriteState::Pending);
        tracing::info!(ticket_id = %ticket_id, message_id = %message.id, "Message posted optimistically");

        let (tx, rx) = oneshot::channel();
        let engine = Arc::clone(self);
        let ticket_id = ticket_id.to_string();
        let content = content.to_string();
        let sender_id = message.sender_id.clone();
        tokio::spawn(async move {
            match engine
                .backing
                .append_message(&ticket_id, &content, &sender_id)
                .await
            {
                Ok((authoritative, _message)) => {
                    engine.reconcile(authoritative.clone());
                    engine.clear_write_state(&ticket_id);
                    let _ = tx.send(WriteOutcome::Committed(authoritative));
                }
                Err(e) => {
                    tracing::warn!(ticket_id = %ticket_id, error = %e, "Message did not reach the server");
                    engine.set_write_state(&ticket_id, WriteState::Failed);
                    let _ = tx.send(WriteOutcome::Failed(e));
                }
            }
        });

        Ok(WriteReceipt {
            ticket: provisional,
            outcome: rx,
        })
    }

    // ============================================
    // Reconciliation (server responses and pushed events)
    // ============================================

    /// Merge an authoritative record into the cache.
    ///
    /// Applied unless the cached record is strictly newer by `updated_at`;
    /// on a tie the incoming record wins, since it is server truth.
    pub fn reconcile(&self, ticket: Ticket) {
        let mut cache = self.cache.lock().unwrap();
        if self.reconcile_locked(&mut cache, ticket) {
            self.persist_locked(&cache);
        }
    }

    /// Append a pushed message to its cached ticket.
    ///
    /// Idempotent on message id. Messages for tickets the cache does not
    /// know are dropped with a log line; the next fetch will bring the full
    /// ticket including the message.
    pub fn apply_message(&self, message: Message) {
        let mut cache = self.cache.lock().unwrap();
        let Some(current) = cache.get(&message.ticket_id) else {
            tracing::debug!(
                ticket_id = %message.ticket_id,
                message_id = %message.id,
                "Dropping pushed message for unknown ticket"
            );
            return;
        };

        let mut updated = current.clone();
        if updated.append_message(message) {
            cache.upsert(updated);
            self.persist_locked(&cache);
        }
    }

    /// Merge under an already-held cache lock. Returns whether the cache
    /// changed.
    fn reconcile_locked(&self, cache: &mut TicketCache, ticket: Ticket) -> bool {
        match cache.get(&ticket.id) {
            Some(existing) if existing.updated_at > ticket.updated_at => {
                tracing::debug!(
                    ticket_id = %ticket.id,
                    incoming = %ticket.updated_at,
                    local = %existing.updated_at,
                    "Keeping newer local record"
                );
                false
            }
            _ => {
                cache.upsert(ticket);
                true
            }
        }
    }

    /// Resolve a successful create: rekey the provisional entry to the
    /// authoritative id, letting a raced pushed copy win if it is newer.
    fn finish_create(&self, temp_id: &str, authoritative: Ticket) {
        let mut cache = self.cache.lock().unwrap();
        let winner = match cache.get(&authoritative.id) {
            Some(existing) if existing.updated_at > authoritative.updated_at => existing.clone(),
            _ => authoritative,
        };
        tracing::info!(temp_id = %temp_id, ticket_id = %winner.id, "Provisional ticket confirmed");
        cache.supersede(temp_id, winner);
        self.persist_locked(&cache);
        self.clear_write_state(temp_id);
    }

    // ============================================
    // Internals
    // ============================================

    fn set_write_state(&self, id: &str, state: WriteState) {
        self.writes.lock().unwrap().insert(id.to_string(), state);
    }

    fn clear_write_state(&self, id: &str) {
        self.writes.lock().unwrap().remove(id);
    }

    /// Persist the full cache snapshot; best-effort, failures are logged
    fn persist_locked(&self, cache: &TicketCache) {
        match serde_json::to_string(&cache.snapshot()) {
            Ok(raw) => {
                if let Err(e) = self.local.put(SNAPSHOT_KEY, &raw) {
                    tracing::warn!(error = %e, "Could not persist ticket snapshot");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not encode ticket snapshot");
            }
        }
    }
}
