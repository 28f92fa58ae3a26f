//! External collaborator interfaces
//!
//! The core is transport-agnostic: it reads and writes tickets through the
//! [`BackingStore`] trait and survives restarts through the [`LocalStore`]
//! trait. Embedding applications supply the backing store implementation;
//! [`SqliteStore`] ships as the default local store, with [`MemoryStore`]
//! for tests.

pub mod backing;
pub mod local;

pub use backing::BackingStore;
pub use local::{LocalStore, MemoryStore, SqliteStore};
