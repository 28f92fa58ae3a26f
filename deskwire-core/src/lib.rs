//! # deskwire-core
//!
//! Core library for deskwire - a client-side state sync engine for
//! helpdesk tickets.
//!
//! This library provides:
//! - Domain types for tickets, messages, and users
//! - An in-memory ticket cache with filtered, sorted, paginated queries
//! - Optimistic writes with background persistence and reconciliation
//! - A push channel with automatic reconnect and exponential backoff
//! - SQLite-backed snapshot persistence
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! All reads are served from the local cache; all writes land in the
//! cache first and reach the server from a background task:
//! - **Cache:** the queryable source of truth for the UI
//! - **Sync engine:** optimistic writes, snapshot persistence, and a
//!   single merge rule (later `updated_at` wins)
//! - **Push channel:** server events folded into the same merge rule
//!
//! ## Example
//!
//! ```rust,no_run
//! use deskwire_core::{Config, DeskClient};
//! # fn demo(backing: std::sync::Arc<dyn deskwire_core::BackingStore>,
//! #         transport: std::sync::Arc<dyn deskwire_core::Transport>) -> deskwire_core::Result<()> {
//!
//! // Load configuration
//! let config = Config::load()?;
//!
//! // Open the client over the configured snapshot store
//! let client = DeskClient::open(backing, transport, &config)?;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use cache::{Page, PageRequest, Sort, SortDirection, SortField, TicketFilters};
pub use channel::{ChannelState, ChannelStatus, PushChannel, Transport};
pub use client::DeskClient;
pub use config::Config;
pub use error::{Error, Result};
pub use session::{Session, SessionStore};
pub use store::{BackingStore, LocalStore, MemoryStore, SqliteStore};
pub use sync::{SyncEngine, WriteOutcome, WriteReceipt, WriteState};
pub use types::*;

// Public modules
pub mod cache;
pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod store;
pub mod sync;
pub mod types;
