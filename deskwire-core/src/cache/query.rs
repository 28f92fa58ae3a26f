//! Filter, sort, and pagination model for ticket queries
//!
//! Everything here is pure: predicates and comparators over tickets, with
//! no access to cache state. [`crate::cache::TicketCache::query`] composes
//! these into the full query pipeline.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::types::{Ticket, TicketPriority, TicketStatus};

// ============================================
// Filters
// ============================================

/// Optional conjunctive predicates over the ticket set.
///
/// Absent fields (empty sets, `None`) mean "no constraint". Multi-valued
/// fields match any of their values; across fields everything must hold.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketFilters {
    /// Case-insensitive substring over title, description, and id
    pub search: Option<String>,
    /// Match any of these statuses
    #[serde(default)]
    pub status: Vec<TicketStatus>,
    /// Match any of these priorities
    #[serde(default)]
    pub priority: Vec<TicketPriority>,
    /// Match tickets assigned to any of these user ids; unassigned
    /// tickets never match this predicate
    #[serde(default)]
    pub assignee: Vec<String>,
    /// Match tickets carrying any of these tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation date lower bound, from midnight
    pub date_from: Option<NaiveDate>,
    /// Creation date upper bound, inclusive of the whole day
    pub date_to: Option<NaiveDate>,
}

/// Whether `ticket` satisfies every active predicate in `filters`
pub fn matches(ticket: &Ticket, filters: &TicketFilters) -> bool {
    if let Some(search) = &filters.search {
        let needle = search.to_lowercase();
        let hit = ticket.title.to_lowercase().contains(&needle)
            || ticket.description.to_lowercase().contains(&needle)
            || ticket.id.to_lowercase().contains(&needle);
        if !hit {
            return false;
        }
    }

    if !filters.status.is_empty() && !filters.status.contains(&ticket.status) {
        return false;
    }

    if !filters.priority.is_empty() && !filters.priority.contains(&ticket.priority) {
        return false;
    }

    if !filters.assignee.is_empty() {
        match &ticket.assigned_to {
            Some(assigned_to) if filters.assignee.contains(assigned_to) => {}
            _ => return false,
        }
    }

    if !filters.tags.is_empty() && !ticket.tags.iter().any(|tag| filters.tags.contains(tag)) {
        return false;
    }

    if let Some(from) = filters.date_from {
        let start = from.and_time(NaiveTime::MIN).and_utc();
        if ticket.created_at < start {
            return false;
        }
    }

    if let Some(to) = filters.date_to {
        if let Some(end) = to.and_hms_milli_opt(23, 59, 59, 999) {
            if ticket.created_at > end.and_utc() {
                return false;
            }
        }
    }

    true
}

// ============================================
// Sorting
// ============================================

/// Ticket field a query sorts by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Title,
    Status,
    Priority,
    Customer,
    Assignee,
    Id,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::Title => "title",
            SortField::Status => "status",
            SortField::Priority => "priority",
            SortField::Customer => "customer",
            SortField::Assignee => "assignee",
            SortField::Id => "id",
        }
    }
}

impl std::str::FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at" => Ok(SortField::CreatedAt),
            "updated_at" => Ok(SortField::UpdatedAt),
            "title" => Ok(SortField::Title),
            "status" => Ok(SortField::Status),
            "priority" => Ok(SortField::Priority),
            "customer" => Ok(SortField::Customer),
            "assignee" => Ok(SortField::Assignee),
            "id" => Ok(SortField::Id),
            _ => Err(format!("unknown sort field: {}", s)),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl std::str::FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(format!("unknown sort direction: {}", s)),
        }
    }
}

/// Sort order for a query; defaults to creation time, newest first
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Sort {
    #[serde(default)]
    pub field: SortField,
    #[serde(default)]
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    pub fn ascending(field: SortField) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    pub fn descending(field: SortField) -> Self {
        Self::new(field, SortDirection::Desc)
    }
}

/// The numeric value embedded in a ticket id, for id sorting.
///
/// Concatenates every digit in the id and parses the result, so
/// "TICKET-42" sorts as 42. Ids with no digits (or too many) sort as 0.
fn numeric_id(id: &str) -> u64 {
    let digits: String = id.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

fn cmp_case_insensitive(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Order two tickets under `sort`.
///
/// Tickets with no assignee sort after all assigned tickets in BOTH
/// directions when sorting by assignee: missing is ranked lowest
/// independent of direction, so those comparisons return before the
/// direction flip.
pub fn compare(a: &Ticket, b: &Ticket, sort: &Sort) -> Ordering {
    let ordering = match sort.field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::Title => cmp_case_insensitive(&a.title, &b.title),
        SortField::Status => a.status.rank().cmp(&b.status.rank()),
        SortField::Priority => a.priority.rank().cmp(&b.priority.rank()),
        SortField::Customer => {
            cmp_case_insensitive(&a.customer.full_name(), &b.customer.full_name())
        }
        SortField::Assignee => {
            let a_name = a.assignee.as_ref().map(|u| u.full_name().to_lowercase());
            let b_name = b.assignee.as_ref().map(|u| u.full_name().to_lowercase());
            match (a_name, b_name) {
                (None, None) => return Ordering::Equal,
                (None, Some(_)) => return Ordering::Greater,
                (Some(_), None) => return Ordering::Less,
                (Some(a_name), Some(b_name)) => a_name.cmp(&b_name),
            }
        }
        SortField::Id => numeric_id(&a.id).cmp(&numeric_id(&b.id)),
    };

    match sort.direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

// ============================================
// Pagination
// ============================================

/// 1-indexed page request
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page number, starting at 1
    pub page: usize,
    /// Items per page, must be positive
    pub limit: usize,
}

impl PageRequest {
    pub fn new(page: usize, limit: usize) -> Self {
        Self { page, limit }
    }

    /// First page at the default page size
    pub fn first() -> Self {
        Self::default()
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

/// One page of query results plus the filtered total
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page, in sort order
    pub items: Vec<T>,
    /// Count of ALL tickets matching the filters, not just this page
    pub total: usize,
    /// Page number this slice came from
    pub page: usize,
    /// Page size used for the slice
    pub limit: usize,
}

impl<T> Page<T> {
    /// Number of pages needed to cover `total` at this page size
    pub fn total_pages(&self) -> usize {
        if self.limit == 0 {
            return 0;
        }
        (self.total + self.limit - 1) / self.limit
    }
}
