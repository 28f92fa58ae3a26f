//! Integration tests for the deskwire client stack
//!
//! These tests run end-to-end flows (optimistic writes, push frames,
//! reconnect schedules, snapshot persistence) over scripted store and
//! transport fakes. Timing-sensitive tests run on a paused tokio clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use tokio::sync::{mpsc, watch};

use deskwire_core::channel::{Connection, TransportEvent};
use deskwire_core::{
    BackingStore, ChannelState, ChannelStatus, Config, DeskClient, Error, Message, MessageType,
    Page, PageRequest, Sort, SqliteStore, Ticket, TicketDraft, TicketFilters, TicketPatch,
    TicketPriority, TicketStatus, Transport, User, UserRole, WriteOutcome, WriteState,
};

// ============================================
// Fakes
// ============================================

/// Server-side ticket truth with scriptable write failures
#[derive(Default)]
struct FakeStore {
    tickets: Mutex<HashMap<String, Ticket>>,
    fail_writes: AtomicBool,
    next_id: AtomicU32,
}

impl FakeStore {
    fn insert(&self, ticket: Ticket) {
        self.tickets.lock().unwrap().insert(ticket.id.clone(), ticket);
    }

    fn get(&self, id: &str) -> Option<Ticket> {
        self.tickets.lock().unwrap().get(id).cloned()
    }

    fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writes(&self) -> Result<(), Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(Error::Transport("write refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BackingStore for FakeStore {
    async fn fetch_page(
        &self,
        _filters: &TicketFilters,
        page: &PageRequest,
        _sort: &Sort,
    ) -> Result<Page<Ticket>, Error> {
        let mut items: Vec<Ticket> = self.tickets.lock().unwrap().values().cloned().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        let total = items.len();
        let start = (page.page - 1) * page.limit;
        let items = items.into_iter().skip(start).take(page.limit).collect();
        Ok(Page {
            items,
            total,
            page: page.page,
            limit: page.limit,
        })
    }

    async fn fetch_one(&self, id: &str) -> Result<Ticket, Error> {
        self.get(id).ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn create(&self, draft: &TicketDraft) -> Result<Ticket, Error> {
        self.check_writes()?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let ticket = Ticket {
            id: format!("TICKET-{}", n),
            title: draft.title.clone(),
            description: draft.description.clone(),
            status: TicketStatus::Open,
            priority: draft.priority,
            customer_id: "user-1".to_string(),
            customer: test_user("user-1"),
            assigned_to: draft.assigned_to.clone(),
            assignee: None,
            tags: draft.tags.clone(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        };
        self.insert(ticket.clone());
        Ok(ticket)
    }

    async fn update(&self, id: &str, patch: &TicketPatch) -> Result<Ticket, Error> {
        self.check_writes()?;
        let mut ticket = self.get(id).ok_or_else(|| Error::NotFound(id.to_string()))?;
        patch.apply_to(&mut ticket);
        ticket.updated_at = Utc::now();
        self.insert(ticket.clone());
        Ok(ticket)
    }

    async fn append_message(
        &self,
        ticket_id: &str,
        content: &str,
        sender_id: &str,
    ) -> Result<(Ticket, Message), Error> {
        self.check_writes()?;
        let mut ticket = self
            .get(ticket_id)
            .ok_or_else(|| Error::NotFound(ticket_id.to_string()))?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let message = Message {
            id: format!("msg-{}", n),
            ticket_id: ticket_id.to_string(),
            sender_id: sender_id.to_string(),
            sender: test_user(sender_id),
            content: content.to_string(),
            message_type: MessageType::Text,
            created_at: now,
        };
        ticket.messages.push(message.clone());
        ticket.updated_at = now;
        self.insert(ticket.clone());
        Ok((ticket, message))
    }
}

/// What the fake transport observed and the handle tests inject events with
#[derive(Default)]
struct FakeWire {
    event_tx: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    published: Mutex<Vec<(String, String)>>,
    subscriptions: Mutex<Vec<String>>,
}

impl FakeWire {
    fn push(&self, event: TransportEvent) {
        let guard = self.event_tx.lock().unwrap();
        guard
            .as_ref()
            .expect("no live connection to push into")
            .send(event)
            .expect("connection task gone");
    }

    fn push_frame(&self, topic: &str, body: impl Into<String>) {
        self.push(TransportEvent::Frame {
            topic: topic.to_string(),
            body: body.into(),
        });
    }
}

struct FakeTransport {
    refuse: AtomicBool,
    connects: AtomicU32,
    wire: Arc<FakeWire>,
}

impl FakeTransport {
    fn accepting() -> Self {
        Self {
            refuse: AtomicBool::new(false),
            connects: AtomicU32::new(0),
            wire: Arc::new(FakeWire::default()),
        }
    }

    fn refusing() -> Self {
        let transport = Self::accepting();
        transport.refuse.store(true, Ordering::SeqCst);
        transport
    }

    fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, _credential: &str) -> Result<Box<dyn Connection>, Error> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::Transport("connection refused".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.wire.event_tx.lock().unwrap() = Some(tx);
        Ok(Box::new(FakeConnection {
            events: rx,
            wire: Arc::clone(&self.wire),
        }))
    }
}

struct FakeConnection {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    wire: Arc<FakeWire>,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn subscribe(&mut self, topic: &str) -> Result<(), Error> {
        self.wire.subscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, body: &str) -> Result<(), Error> {
        self.wire
            .published
            .lock()
            .unwrap()
            .push((topic.to_string(), body.to_string()));
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    async fn close(&mut self) {}
}

// ============================================
// Helpers
// ============================================

fn test_user(id: &str) -> User {
    User {
        id: id.to_string(),
        email: format!("{}@example.com", id),
        first_name: "Dana".to_string(),
        last_name: "Whitfield".to_string(),
        role: UserRole::Customer,
        is_active: true,
    }
}

fn test_ticket(id: &str) -> Ticket {
    let created = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
    Ticket {
        id: id.to_string(),
        title: "Cannot log in".to_string(),
        description: "Password reset loop".to_string(),
        status: TicketStatus::Open,
        priority: TicketPriority::Medium,
        customer_id: "user-1".to_string(),
        customer: test_user("user-1"),
        assigned_to: None,
        assignee: None,
        tags: vec![],
        created_at: created,
        updated_at: created,
        messages: vec![],
    }
}

fn test_client(store: &Arc<FakeStore>, transport: &Arc<FakeTransport>) -> DeskClient {
    DeskClient::new(
        Arc::clone(store) as Arc<dyn BackingStore>,
        Arc::clone(transport) as Arc<dyn Transport>,
        Arc::new(deskwire_core::MemoryStore::new()),
        &Config::default(),
    )
}

async fn wait_for_state(rx: &mut watch::Receiver<ChannelStatus>, state: ChannelState) {
    loop {
        if rx.borrow_and_update().state == state {
            return;
        }
        rx.changed().await.expect("status sender dropped");
    }
}

/// Poll a condition, yielding between checks
async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}

fn ticket_update_frame(ticket: &Ticket) -> String {
    format!(
        r#"{{"type": "TICKET_UPDATED", "payload": {}}}"#,
        serde_json::to_string(ticket).unwrap()
    )
}

// ============================================
// Optimistic write flows
// ============================================

#[tokio::test]
async fn test_create_ticket_end_to_end() {
    let store = Arc::new(FakeStore::default());
    let transport = Arc::new(FakeTransport::accepting());
    let client = test_client(&store, &transport);
    client.login(test_user("user-1"), "jwt").unwrap();

    let draft = TicketDraft {
        title: "VPN drops hourly".to_string(),
        description: "Every hour on the hour".to_string(),
        priority: TicketPriority::High,
        tags: vec!["network".to_string()],
        assigned_to: None,
    };
    let receipt = client.create_ticket(draft).unwrap();
    let temp_id = receipt.ticket.id.clone();

    // Provisional record is queryable before the server responds
    assert!(temp_id.starts_with("temp-"));
    assert_eq!(client.ticket(&temp_id).unwrap().title, "VPN drops hourly");
    assert_eq!(client.write_state(&temp_id), Some(WriteState::Pending));

    let committed = match receipt.outcome.await.unwrap() {
        WriteOutcome::Committed(ticket) => ticket,
        WriteOutcome::Failed(e) => panic!("create failed: {}", e),
    };

    // Rekeyed to the server id, not duplicated
    assert!(client.ticket(&temp_id).is_none());
    assert_eq!(client.ticket(&committed.id).unwrap().title, "VPN drops hourly");
    assert!(store.get(&committed.id).is_some());

    let page = client
        .tickets(&TicketFilters::default(), &PageRequest::first(), &Sort::default())
        .unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn test_failed_update_is_retained_then_recovered_by_refresh() {
    let store = Arc::new(FakeStore::default());
    store.insert(test_ticket("TICKET-1"));
    let transport = Arc::new(FakeTransport::accepting());
    let client = test_client(&store, &transport);
    client.login(test_user("user-1"), "jwt").unwrap();

    client
        .refresh(&TicketFilters::default(), &PageRequest::first(), &Sort::default())
        .await
        .unwrap();
    assert_eq!(client.ticket("TICKET-1").unwrap().status, TicketStatus::Open);

    store.set_fail_writes(true);
    let patch = TicketPatch {
        status: Some(TicketStatus::Resolved),
        ..Default::default()
    };
    let receipt = client.update_ticket("TICKET-1", patch).unwrap();
    assert!(matches!(
        receipt.outcome.await.unwrap(),
        WriteOutcome::Failed(Error::Transport(_))
    ));

    // The edit is not rolled back
    assert_eq!(
        client.ticket("TICKET-1").unwrap().status,
        TicketStatus::Resolved
    );
    assert_eq!(client.write_state("TICKET-1"), Some(WriteState::Failed));
    // The server never saw it
    assert_eq!(store.get("TICKET-1").unwrap().status, TicketStatus::Open);

    // A refresh returning the stale server copy does not clobber the edit
    client
        .refresh(&TicketFilters::default(), &PageRequest::first(), &Sort::default())
        .await
        .unwrap();
    assert_eq!(
        client.ticket("TICKET-1").unwrap().status,
        TicketStatus::Resolved
    );

    // Once the server record moves past the local edit, it wins
    let mut server_side = store.get("TICKET-1").unwrap();
    server_side.status = TicketStatus::Closed;
    server_side.updated_at = Utc::now() + ChronoDuration::hours(1);
    store.insert(server_side);
    client
        .refresh(&TicketFilters::default(), &PageRequest::first(), &Sort::default())
        .await
        .unwrap();
    assert_eq!(
        client.ticket("TICKET-1").unwrap().status,
        TicketStatus::Closed
    );
}

#[tokio::test]
async fn test_post_message_appends_on_server() {
    let store = Arc::new(FakeStore::default());
    store.insert(test_ticket("TICKET-1"));
    let transport = Arc::new(FakeTransport::accepting());
    let client = test_client(&store, &transport);
    client.login(test_user("user-1"), "jwt").unwrap();
    client
        .refresh(&TicketFilters::default(), &PageRequest::first(), &Sort::default())
        .await
        .unwrap();

    let receipt = client.post_message("TICKET-1", "Any update?").unwrap();
    let provisional = &receipt.ticket.messages[0];
    assert!(provisional.id.starts_with("temp-msg-"));

    match receipt.outcome.await.unwrap() {
        WriteOutcome::Committed(ticket) => {
            assert_eq!(ticket.messages.len(), 1);
            assert!(ticket.messages[0].id.starts_with("msg-"));
        }
        WriteOutcome::Failed(e) => panic!("post failed: {}", e),
    }

    // The authoritative thread replaced the provisional one
    let cached = client.ticket("TICKET-1").unwrap();
    assert_eq!(cached.messages.len(), 1);
    assert!(cached.messages[0].id.starts_with("msg-"));
    assert_eq!(store.get("TICKET-1").unwrap().messages.len(), 1);
}

// ============================================
// Push channel flows
// ============================================

#[tokio::test]
async fn test_connect_subscribes_both_topics_and_dispatches_frames() {
    let store = Arc::new(FakeStore::default());
    let transport = Arc::new(FakeTransport::accepting());
    let client = test_client(&store, &transport);

    let mut status = client.watch_channel_status();
    client.login(test_user("user-1"), "jwt").unwrap();
    wait_for_state(&mut status, ChannelState::Connected).await;

    {
        let subs = transport.wire.subscriptions.lock().unwrap();
        assert!(subs.contains(&"/user/user-1/queue/messages".to_string()));
        assert!(subs.contains(&"/topic/notifications".to_string()));
    }

    let mut pushed = test_ticket("TICKET-7");
    pushed.status = TicketStatus::InProgress;
    transport
        .wire
        .push_frame("/topic/notifications", ticket_update_frame(&pushed));

    wait_until(|| client.ticket("TICKET-7").is_some()).await;
    assert_eq!(
        client.ticket("TICKET-7").unwrap().status,
        TicketStatus::InProgress
    );
}

#[tokio::test]
async fn test_pushed_message_lands_in_thread_once() {
    let store = Arc::new(FakeStore::default());
    let transport = Arc::new(FakeTransport::accepting());
    let client = test_client(&store, &transport);
    client.seed_tickets(vec![test_ticket("TICKET-1")]);

    let mut status = client.watch_channel_status();
    client.login(test_user("user-1"), "jwt").unwrap();
    wait_for_state(&mut status, ChannelState::Connected).await;

    let body = r#"{
        "type": "NEW_MESSAGE",
        "payload": {
            "id": "msg-77",
            "ticket_id": "TICKET-1",
            "sender_id": "user-2",
            "sender": {
                "id": "user-2",
                "email": "ava@example.com",
                "first_name": "Ava",
                "last_name": "Chen",
                "role": "AGENT"
            },
            "content": "Looking into it",
            "created_at": "2024-03-10T12:05:00Z"
        }
    }"#;
    transport.wire.push_frame("/user/user-1/queue/messages", body);
    transport.wire.push_frame("/user/user-1/queue/messages", body);

    wait_until(|| !client.ticket("TICKET-1").unwrap().messages.is_empty()).await;
    // Duplicate delivery collapses on message id
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(client.ticket("TICKET-1").unwrap().messages.len(), 1);
}

#[tokio::test]
async fn test_malformed_and_unknown_frames_do_not_break_the_channel() {
    let store = Arc::new(FakeStore::default());
    let transport = Arc::new(FakeTransport::accepting());
    let client = test_client(&store, &transport);

    let mut status = client.watch_channel_status();
    client.login(test_user("user-1"), "jwt").unwrap();
    wait_for_state(&mut status, ChannelState::Connected).await;

    transport.wire.push_frame("/topic/notifications", "{not json");
    transport
        .wire
        .push_frame("/topic/notifications", r#"{"type": "TICKET_ESCALATED", "payload": {}}"#);
    transport
        .wire
        .push_frame("/topic/notifications", ticket_update_frame(&test_ticket("TICKET-3")));

    wait_until(|| client.ticket("TICKET-3").is_some()).await;
    assert_eq!(client.channel_status().state, ChannelState::Connected);
    assert_eq!(transport.connect_count(), 1);
}

#[tokio::test]
async fn test_send_publishes_only_while_connected() {
    let store = Arc::new(FakeStore::default());
    let transport = Arc::new(FakeTransport::accepting());
    let client = test_client(&store, &transport);

    let payload = serde_json::json!({"ticket_id": "TICKET-1", "typing": true});
    assert!(matches!(
        client.send("/app/typing", &payload),
        Err(Error::Channel(_))
    ));

    let mut status = client.watch_channel_status();
    client.login(test_user("user-1"), "jwt").unwrap();
    wait_for_state(&mut status, ChannelState::Connected).await;

    client.send("/app/typing", &payload).unwrap();
    wait_until(|| !transport.wire.published.lock().unwrap().is_empty()).await;
    {
        let published = transport.wire.published.lock().unwrap();
        assert_eq!(published[0].0, "/app/typing");
        assert!(published[0].1.contains(r#""typing":true"#));
    }

    client.logout();
    assert!(matches!(
        client.send("/app/typing", &payload),
        Err(Error::Channel(_))
    ));
}

// ============================================
// Reconnect schedule (paused clock)
// ============================================

#[tokio::test(start_paused = true)]
async fn test_reconnect_backoff_runs_the_full_schedule() {
    let store = Arc::new(FakeStore::default());
    let transport = Arc::new(FakeTransport::refusing());
    let client = test_client(&store, &transport);

    let started = tokio::time::Instant::now();
    let mut status = client.watch_channel_status();
    client.login(test_user("user-1"), "jwt").unwrap();

    // Run until the channel gives up
    loop {
        let snapshot = status.borrow_and_update().clone();
        if snapshot.error.as_deref() == Some("Failed to reconnect after multiple attempts") {
            break;
        }
        status.changed().await.unwrap();
    }

    // Initial connect plus five retries
    assert_eq!(transport.connect_count(), 6);
    assert_eq!(client.channel_status().attempts, 5);
    assert_eq!(client.channel_status().state, ChannelState::Error);

    // 2 + 4 + 8 + 16 + 30 seconds of backoff
    assert!(started.elapsed() >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let store = Arc::new(FakeStore::default());
    let transport = Arc::new(FakeTransport::refusing());
    let client = test_client(&store, &transport);

    let mut status = client.watch_channel_status();
    client.login(test_user("user-1"), "jwt").unwrap();

    // Wait for the first failure to arm a retry
    loop {
        if status.borrow_and_update().attempts >= 1 {
            break;
        }
        status.changed().await.unwrap();
    }
    client.logout();
    let connects_at_logout = transport.connect_count();

    // Long after every armed timer would have fired
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(transport.connect_count(), connects_at_logout);
    assert_eq!(client.channel_status().state, ChannelState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_server_close_recovers_and_resets_attempts() {
    let store = Arc::new(FakeStore::default());
    let transport = Arc::new(FakeTransport::accepting());
    let client = test_client(&store, &transport);

    let mut status = client.watch_channel_status();
    client.login(test_user("user-1"), "jwt").unwrap();
    wait_for_state(&mut status, ChannelState::Connected).await;

    transport.wire.push(TransportEvent::Closed);
    wait_for_state(&mut status, ChannelState::Disconnected).await;

    // Backoff elapses on the paused clock, then the channel comes back
    wait_for_state(&mut status, ChannelState::Connected).await;
    assert_eq!(transport.connect_count(), 2);
    let snapshot = client.channel_status();
    assert_eq!(snapshot.attempts, 0);
    assert!(snapshot.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_sets_error_state_before_recovering() {
    let store = Arc::new(FakeStore::default());
    let transport = Arc::new(FakeTransport::accepting());
    let client = test_client(&store, &transport);

    let mut status = client.watch_channel_status();
    client.login(test_user("user-1"), "jwt").unwrap();
    wait_for_state(&mut status, ChannelState::Connected).await;

    transport
        .wire
        .push(TransportEvent::Failed("broken pipe".to_string()));
    wait_for_state(&mut status, ChannelState::Error).await;
    assert_eq!(
        client.channel_status().error.as_deref(),
        Some("Connection error: broken pipe")
    );

    wait_for_state(&mut status, ChannelState::Connected).await;
    assert!(client.channel_status().error.is_none());
}

// ============================================
// Snapshot persistence
// ============================================

#[tokio::test]
async fn test_snapshot_survives_client_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let db_path = dir.path().join("state").join("state.db");
    let store = Arc::new(FakeStore::default());
    let transport = Arc::new(FakeTransport::accepting());

    {
        let client = DeskClient::new(
            Arc::clone(&store) as Arc<dyn BackingStore>,
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(SqliteStore::open(&db_path).unwrap()),
            &Config::default(),
        );
        client.seed_tickets(vec![test_ticket("TICKET-1")]);
    }

    // A fresh client over the same database sees the cache without any
    // server traffic
    let client = DeskClient::new(
        Arc::clone(&store) as Arc<dyn BackingStore>,
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::new(SqliteStore::open(&db_path).unwrap()),
        &Config::default(),
    );
    let cached = client.ticket("TICKET-1").unwrap();
    assert_eq!(cached.title, "Cannot log in");

    let page = client
        .tickets(&TicketFilters::default(), &PageRequest::first(), &Sort::default())
        .unwrap();
    assert_eq!(page.total, 1);
}
