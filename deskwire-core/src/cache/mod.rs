//! Ticket cache and query engine
//!
//! An in-memory map of tickets by id, plus the insertion-order index that
//! gives sort ties a stable, deterministic order. The cache is the single
//! read source for UI queries; it is mutated only through [`TicketCache::upsert`]
//! and friends, all of which are verbatim last-write-wins at this layer.
//! Deciding WHICH version of a record should win a race belongs to the
//! synchronization layer (`crate::sync`), not here.
//!
//! Entries are never evicted within a session. A ticket enters the cache
//! when a fetch returns it, when it is created optimistically, or when a
//! pushed event references it; it is updated in place from then on.

pub mod query;

pub use query::{Page, PageRequest, Sort, SortDirection, SortField, TicketFilters};

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::Ticket;

/// In-memory ticket store keyed by id, with stable insertion order
#[derive(Debug, Default)]
pub struct TicketCache {
    tickets: HashMap<String, Ticket>,
    /// Ids in first-seen order, the tiebreak for equal sort keys
    order: Vec<String>,
    last_fetch: Option<DateTime<Utc>>,
}

impl TicketCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached tickets
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Look up a ticket by id
    pub fn get(&self, id: &str) -> Option<&Ticket> {
        self.tickets.get(id)
    }

    /// When a fetch last completed successfully
    pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.last_fetch
    }

    /// Record a successful fetch
    pub fn mark_fetched(&mut self) {
        self.last_fetch = Some(Utc::now());
    }

    /// Insert or overwrite by id, verbatim.
    ///
    /// Last write wins unconditionally at this layer; callers that care
    /// about ordering compare `updated_at` before calling.
    pub fn upsert(&mut self, ticket: Ticket) {
        if !self.tickets.contains_key(&ticket.id) {
            self.order.push(ticket.id.clone());
        }
        self.tickets.insert(ticket.id.clone(), ticket);
    }

    /// Rekey a provisional entry to its authoritative record.
    ///
    /// The entry under `provisional_id` is removed and `ticket` is inserted
    /// under its own id, reusing the provisional entry's order slot so the
    /// record keeps its position in tie ordering. If the authoritative id
    /// is already cached (a pushed event arrived first) the provisional
    /// slot is dropped and the existing entry is overwritten verbatim.
    pub fn supersede(&mut self, provisional_id: &str, ticket: Ticket) {
        if provisional_id == ticket.id {
            self.upsert(ticket);
            return;
        }

        self.tickets.remove(provisional_id);
        let already_cached = self.tickets.contains_key(&ticket.id);
        if let Some(slot) = self.order.iter().position(|id| id == provisional_id) {
            if already_cached {
                self.order.remove(slot);
            } else {
                self.order[slot] = ticket.id.clone();
            }
        } else if !already_cached {
            self.order.push(ticket.id.clone());
        }
        self.tickets.insert(ticket.id.clone(), ticket);
    }

    /// Cold-start union of a server-seeded baseline and a persisted
    /// snapshot. Persisted entries win id collisions and keep their order;
    /// baseline entries the snapshot does not know about are appended.
    pub fn merge_baseline(&mut self, baseline: Vec<Ticket>, persisted: Vec<Ticket>) {
        for ticket in persisted {
            self.upsert(ticket);
        }
        for ticket in baseline {
            if !self.tickets.contains_key(&ticket.id) {
                self.upsert(ticket);
            }
        }
    }

    /// All cached tickets in insertion order, cloned.
    ///
    /// This is the image persisted to the local store.
    pub fn snapshot(&self) -> Vec<Ticket> {
        self.iter().cloned().collect()
    }

    /// Iterate cached tickets in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Ticket> {
        self.order.iter().filter_map(|id| self.tickets.get(id))
    }

    /// Filter, sort, and paginate the cache.
    ///
    /// Filters apply conjunctively (any-of within a multi-valued field),
    /// the sort is stable with insertion order as the tiebreak, and the
    /// returned `total` counts all matches before pagination. Pure with
    /// respect to cache state.
    pub fn query(
        &self,
        filters: &TicketFilters,
        page: &PageRequest,
        sort: &Sort,
    ) -> Result<Page<Ticket>> {
        if page.page < 1 {
            return Err(Error::InvalidQuery(format!(
                "page must be >= 1, got {}",
                page.page
            )));
        }
        if page.limit == 0 {
            return Err(Error::InvalidQuery("limit must be positive".to_string()));
        }

        let mut matched: Vec<&Ticket> = self
            .iter()
            .filter(|ticket| query::matches(ticket, filters))
            .collect();
        matched.sort_by(|a, b| query::compare(a, b, sort));

        let total = matched.len();
        let start = (page.page - 1).saturating_mul(page.limit);
        let items: Vec<Ticket> = matched
            .into_iter()
            .skip(start)
            .take(page.limit)
            .cloned()
            .collect();

        Ok(Page {
            items,
            total,
            page: page.page,
            limit: page.limit,
        })
    }
}
