//! Client facade
//!
//! [`DeskClient`] wires the session store, sync engine, and push channel
//! together behind one handle. Hosts construct it once at startup, log a
//! user in, and then read and mutate tickets through it; everything else
//! (persistence, reconciliation, reconnects) happens behind the facade.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use deskwire_core::{Config, DeskClient};
//!
//! let config = Config::load()?;
//! let client = DeskClient::open(backing, transport, &config)?;
//!
//! client.login(user, jwt)?;
//! let page = client.refresh(&filters, &PageRequest::first(), &Sort::default()).await?;
//!
//! let receipt = client.create_ticket(draft)?;
//! show(&receipt.ticket);
//! ```

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::cache::{Page, PageRequest, Sort, TicketFilters};
use crate::channel::{ChannelStatus, PushChannel, Transport};
use crate::config::Config;
use crate::error::Result;
use crate::session::SessionStore;
use crate::store::{BackingStore, LocalStore, SqliteStore};
use crate::sync::{SyncEngine, WriteReceipt, WriteState};
use crate::types::{Ticket, TicketDraft, TicketPatch, User};

/// One handle over the whole client stack
pub struct DeskClient {
    session: Arc<SessionStore>,
    engine: Arc<SyncEngine>,
    channel: Arc<PushChannel>,
}

impl DeskClient {
    /// Assemble a client over explicit store seams.
    ///
    /// The persisted snapshot is loaded immediately, so cached tickets are
    /// readable before the first login.
    pub fn new(
        backing: Arc<dyn BackingStore>,
        transport: Arc<dyn Transport>,
        local: Arc<dyn LocalStore>,
        config: &Config,
    ) -> Self {
        let session = Arc::new(SessionStore::new());
        let engine = Arc::new(SyncEngine::new(backing, local, Arc::clone(&session)));
        engine.load_snapshot(Vec::new());

        let channel = Arc::new(PushChannel::new(
            transport,
            Arc::clone(&engine),
            Arc::clone(&session),
            config.channel.clone(),
        ));

        Self {
            session,
            engine,
            channel,
        }
    }

    /// Assemble a client backed by the configured SQLite snapshot store
    pub fn open(
        backing: Arc<dyn BackingStore>,
        transport: Arc<dyn Transport>,
        config: &Config,
    ) -> Result<Self> {
        let local = SqliteStore::open(&config.storage.resolved_database_path())?;
        Ok(Self::new(backing, transport, Arc::new(local), config))
    }

    // ============================================
    // Session
    // ============================================

    /// Establish a session and start the push channel.
    ///
    /// Must run inside a tokio runtime; the channel connects in the
    /// background. Callers typically follow up with a `refresh`.
    pub fn login(&self, user: User, credential: impl Into<String>) -> Result<()> {
        self.session.login(user, credential);
        self.channel.connect()
    }

    /// Tear down the push channel and clear the session.
    ///
    /// Cached tickets and the persisted snapshot survive logout.
    pub fn logout(&self) {
        self.channel.disconnect();
        self.session.logout();
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn current_user(&self) -> Option<User> {
        self.session.user()
    }

    // ============================================
    // Tickets
    // ============================================

    /// Filter, sort, and paginate cached tickets
    pub fn tickets(
        &self,
        filters: &TicketFilters,
        page: &PageRequest,
        sort: &Sort,
    ) -> Result<Page<Ticket>> {
        self.engine.query(filters, page, sort)
    }

    /// A single cached ticket
    pub fn ticket(&self, id: &str) -> Option<Ticket> {
        self.engine.ticket(id)
    }

    /// Progress of the most recent write touching a ticket
    pub fn write_state(&self, id: &str) -> Option<WriteState> {
        self.engine.write_state(id)
    }

    /// Seed the cache with server-provided records, merged under whatever
    /// the snapshot already holds
    pub fn seed_tickets(&self, baseline: Vec<Ticket>) {
        self.engine.load_snapshot(baseline);
    }

    /// Fetch a page from the backing store and fold it into the cache
    pub async fn refresh(
        &self,
        filters: &TicketFilters,
        page: &PageRequest,
        sort: &Sort,
    ) -> Result<Page<Ticket>> {
        self.engine.refresh(filters, page, sort).await
    }

    /// Fetch one ticket from the backing store and fold it into the cache
    pub async fn fetch_ticket(&self, id: &str) -> Result<Ticket> {
        self.engine.fetch_ticket(id).await
    }

    pub fn create_ticket(&self, draft: TicketDraft) -> Result<WriteReceipt> {
        self.engine.create_ticket(draft)
    }

    pub fn update_ticket(&self, id: &str, patch: TicketPatch) -> Result<WriteReceipt> {
        self.engine.update_ticket(id, patch)
    }

    pub fn post_message(&self, ticket_id: &str, content: &str) -> Result<WriteReceipt> {
        self.engine.post_message(ticket_id, content)
    }

    // ============================================
    // Push channel
    // ============================================

    /// Reopen the push channel after a latched failure
    pub fn reconnect(&self) -> Result<()> {
        self.channel.connect()
    }

    pub fn channel_status(&self) -> ChannelStatus {
        self.channel.status()
    }

    pub fn watch_channel_status(&self) -> watch::Receiver<ChannelStatus> {
        self.channel.watch_status()
    }

    /// Publish an application frame over the push channel
    pub fn send<T: Serialize>(&self, topic: &str, payload: &T) -> Result<()> {
        self.channel.send(topic, payload)
    }
}
