#![allow(dead_code)]

//! In-memory collaborators so every operation can be exercised without
//! Postgres or Redis.

use actix::Actor;
use futures_util::{stream::BoxStream, StreamExt};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};
use tokio::sync::{broadcast, mpsc, OwnedMutexGuard};

use crate::{
    api::error,
    configs::KeyValueCache,
    modules::{
        chat::{
            model::{ChatSummaryRow, InsertMessage, MessageQuery},
            repository::ChatRepository,
            schema::{ChatEntity, MessageEntity, MessageStatus},
            service::ChatService,
        },
        friend::{repository::RelationshipStore, schema::FriendshipStatus, service::FriendshipGate},
        media::{BlobStore, UploadConfig},
        websocket::{
            fanout::FanoutBus,
            manager::{Connection, ConnectionManager},
            presence::PresenceRegistry,
            server::ConnectionHub,
        },
    },
    utils::{AuthValidator, CanonicalPair, Claims, JwtAuthValidator, TypeClaims},
};

pub const TEST_SECRET: &str = "test-secret";

pub fn access_token(user_id: i64) -> String {
    Claims::new(user_id, 900)
        .with_type(TypeClaims::AccessToken)
        .encode(TEST_SECRET.as_bytes())
        .expect("token encodes")
}

pub fn auth_validator() -> Arc<dyn AuthValidator> {
    Arc::new(JwtAuthValidator::new(TEST_SECRET))
}

fn unavailable() -> error::SystemError {
    error::SystemError::presence_unavailable("store offline")
}

// ---------------------------------------------------------------------------
// chat store

#[derive(Debug, Clone, Default)]
pub struct ChatState {
    pub chats: Vec<ChatEntity>,
    pub messages: Vec<MessageEntity>,
    next_chat_id: i64,
    next_message_id: i64,
}

impl ChatState {
    fn insert_chat(&mut self, pair: &CanonicalPair) -> ChatEntity {
        self.next_chat_id += 1;
        let chat = ChatEntity {
            id: self.next_chat_id,
            user_low_id: pair.low,
            user_high_id: pair.high,
            created_at: chrono::Utc::now(),
        };
        self.chats.push(chat.clone());
        chat
    }
}

/// One unit of work: holds the store lock; rolls back on drop unless committed.
pub struct MemoryTx {
    state: OwnedMutexGuard<ChatState>,
    snapshot: Option<ChatState>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.state = snapshot;
        }
    }
}

#[derive(Default)]
pub struct MemoryChatStore {
    state: Arc<tokio::sync::Mutex<ChatState>>,
    simulate_race: AtomicBool,
}

impl MemoryChatStore {
    /// The next `insert_chat_if_absent` behaves as if another unit of work
    /// committed the same pair just before it.
    pub fn lose_next_insert_race(&self) {
        self.simulate_race.store(true, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> ChatState {
        self.state.lock().await.clone()
    }

    pub async fn message(&self, id: i64) -> Option<MessageEntity> {
        self.state.lock().await.messages.iter().find(|m| m.id == id).cloned()
    }
}

#[async_trait::async_trait]
impl ChatRepository for MemoryChatStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<Self::Tx, error::SystemError> {
        let state = self.state.clone().lock_owned().await;
        let snapshot = Some(state.clone());
        Ok(MemoryTx { state, snapshot })
    }

    async fn commit(&self, mut tx: Self::Tx) -> Result<(), error::SystemError> {
        tx.snapshot = None;
        Ok(())
    }

    async fn find_chat_by_id(
        &self,
        chat_id: i64,
        tx: &mut Self::Tx,
    ) -> Result<Option<ChatEntity>, error::SystemError> {
        Ok(tx.state.chats.iter().find(|c| c.id == chat_id).cloned())
    }

    async fn find_chat_by_pair(
        &self,
        pair: &CanonicalPair,
        tx: &mut Self::Tx,
    ) -> Result<Option<ChatEntity>, error::SystemError> {
        Ok(tx
            .state
            .chats
            .iter()
            .find(|c| c.user_low_id == pair.low && c.user_high_id == pair.high)
            .cloned())
    }

    async fn insert_chat_if_absent(
        &self,
        pair: &CanonicalPair,
        tx: &mut Self::Tx,
    ) -> Result<Option<ChatEntity>, error::SystemError> {
        if self.simulate_race.swap(false, Ordering::SeqCst) {
            // the competing insert is already committed, so it survives our rollback
            let chat = tx.state.insert_chat(pair);
            if let Some(snapshot) = tx.snapshot.as_mut() {
                snapshot.chats.push(chat);
                snapshot.next_chat_id = tx.state.next_chat_id;
            }
            return Ok(None);
        }

        let exists =
            tx.state.chats.iter().any(|c| c.user_low_id == pair.low && c.user_high_id == pair.high);
        if exists {
            return Ok(None);
        }
        Ok(Some(tx.state.insert_chat(pair)))
    }

    async fn find_message_in_chat(
        &self,
        chat_id: i64,
        message_id: i64,
        tx: &mut Self::Tx,
    ) -> Result<Option<MessageEntity>, error::SystemError> {
        Ok(tx.state.messages.iter().find(|m| m.id == message_id && m.chat_id == chat_id).cloned())
    }

    async fn insert_message(
        &self,
        message: &InsertMessage,
        tx: &mut Self::Tx,
    ) -> Result<MessageEntity, error::SystemError> {
        tx.state.next_message_id += 1;
        let entity = MessageEntity {
            id: tx.state.next_message_id,
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            _type: message._type,
            reply_to_id: message.reply_to_id,
            status: MessageStatus::Sent,
            created_at: chrono::Utc::now(),
            delivered_at: None,
            read_at: None,
        };
        tx.state.messages.push(entity.clone());
        Ok(entity)
    }

    async fn mark_delivered(
        &self,
        message_id: i64,
        tx: &mut Self::Tx,
    ) -> Result<Option<MessageEntity>, error::SystemError> {
        let message = tx
            .state
            .messages
            .iter_mut()
            .find(|m| m.id == message_id && m.status == MessageStatus::Sent);

        Ok(message.map(|m| {
            m.status = MessageStatus::Delivered;
            m.delivered_at = Some(chrono::Utc::now());
            m.clone()
        }))
    }

    async fn mark_read(
        &self,
        chat_id: i64,
        reader_id: i64,
        tx: &mut Self::Tx,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        let now = chrono::Utc::now();
        let updated = tx
            .state
            .messages
            .iter_mut()
            .filter(|m| {
                m.chat_id == chat_id && m.sender_id != reader_id && m.status < MessageStatus::Read
            })
            .map(|m| {
                m.status = MessageStatus::Read;
                m.read_at = Some(now);
                m.delivered_at.get_or_insert(now);
                m.clone()
            })
            .collect();

        Ok(updated)
    }

    async fn find_messages(
        &self,
        query: &MessageQuery,
        tx: &mut Self::Tx,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        let mut messages: Vec<MessageEntity> = tx
            .state
            .messages
            .iter()
            .filter(|m| m.chat_id == query.chat_id)
            .filter(|m| query.before_id.map_or(true, |before| m.id < before))
            .cloned()
            .collect();

        messages.sort_by(|a, b| b.id.cmp(&a.id));
        messages.truncate(query.limit.max(0) as usize);
        Ok(messages)
    }

    async fn find_chat_summaries(
        &self,
        user_id: i64,
        tx: &mut Self::Tx,
    ) -> Result<Vec<ChatSummaryRow>, error::SystemError> {
        let state: &ChatState = &tx.state;
        let mut rows: Vec<ChatSummaryRow> = state
            .chats
            .iter()
            .filter(|c| c.has_member(user_id))
            .map(|chat| {
                let in_chat: Vec<&MessageEntity> =
                    state.messages.iter().filter(|m| m.chat_id == chat.id).collect();
                let last = in_chat.iter().max_by_key(|m| m.id).copied();
                let unread_count = in_chat
                    .iter()
                    .filter(|m| m.sender_id != user_id && m.status != MessageStatus::Read)
                    .count() as i64;

                ChatSummaryRow {
                    chat_id: chat.id,
                    user_low_id: chat.user_low_id,
                    user_high_id: chat.user_high_id,
                    created_at: chat.created_at,
                    last_message_id: last.map(|m| m.id),
                    last_sender_id: last.map(|m| m.sender_id),
                    last_content: last.map(|m| m.content.clone()),
                    last_type: last.map(|m| m._type),
                    last_status: last.map(|m| m.status),
                    last_created_at: last.map(|m| m.created_at),
                    unread_count,
                }
            })
            .collect();

        rows.sort_by(|a, b| {
            let a_at = a.last_created_at.unwrap_or(a.created_at);
            let b_at = b.last_created_at.unwrap_or(b.created_at);
            b_at.cmp(&a_at).then(b.chat_id.cmp(&a.chat_id))
        });
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// relationships and cache

#[derive(Default)]
pub struct MemoryRelationshipStore {
    links: Mutex<HashMap<CanonicalPair, FriendshipStatus>>,
    lookups: AtomicUsize,
}

impl MemoryRelationshipStore {
    pub fn set_link(&self, user_a: i64, user_b: i64, status: FriendshipStatus) {
        let pair = CanonicalPair::new(user_a, user_b).expect("distinct users");
        self.links.lock().unwrap().insert(pair, status);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RelationshipStore for MemoryRelationshipStore {
    async fn find_link_status(
        &self,
        pair: &CanonicalPair,
    ) -> Result<Option<FriendshipStatus>, error::SystemError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.links.lock().unwrap().get(pair).copied())
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
    failing: AtomicBool,
}

impl MemoryCache {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    fn check(&self) -> Result<(), error::SystemError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(error::SystemError::InternalError("cache offline".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl KeyValueCache for MemoryCache {
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, error::SystemError> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((_, expires_at)) if Instant::now() >= *expires_at => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set_raw(
        &self,
        key: &str,
        value: Vec<u8>,
        expiration: u64,
    ) -> Result<(), error::SystemError> {
        self.check()?;
        let expires_at = Instant::now() + Duration::from_secs(expiration);
        self.entries.lock().unwrap().insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), error::SystemError> {
        self.check()?;
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// presence, bus, blobs

#[derive(Default)]
pub struct MemoryPresence {
    online: Mutex<HashSet<i64>>,
    failing: AtomicBool,
}

impl MemoryPresence {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn is_marked(&self, user_id: i64) -> bool {
        self.online.lock().unwrap().contains(&user_id)
    }

    /// Simulates TTL expiry, or another process marking the user online.
    pub fn expire(&self, user_id: i64) {
        self.online.lock().unwrap().remove(&user_id);
    }

    pub fn mark(&self, user_id: i64) {
        self.online.lock().unwrap().insert(user_id);
    }

    fn check(&self) -> Result<(), error::SystemError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PresenceRegistry for MemoryPresence {
    async fn mark_online(&self, user_id: i64, _ttl: u64) -> Result<(), error::SystemError> {
        self.check()?;
        self.mark(user_id);
        Ok(())
    }

    async fn mark_offline(&self, user_id: i64) -> Result<(), error::SystemError> {
        self.check()?;
        self.expire(user_id);
        Ok(())
    }

    async fn is_online(&self, user_id: i64) -> Result<bool, error::SystemError> {
        self.check()?;
        Ok(self.is_marked(user_id))
    }

    async fn refresh(&self, user_id: i64, _ttl: u64) -> Result<(), error::SystemError> {
        self.check()?;
        self.mark(user_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryFanoutBus {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    published: AtomicUsize,
}

impl MemoryFanoutBus {
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.lock().unwrap().get(channel).map_or(0, |tx| tx.receiver_count())
    }

    pub fn published_count(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl FanoutBus for MemoryFanoutBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), error::SystemError> {
        self.published.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = self.channels.lock().unwrap().get(channel) {
            // no subscriber means the payload is dropped
            let _ = tx.send(payload);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<BoxStream<'static, String>, error::SystemError> {
        let rx = self
            .channels
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .subscribe();

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => return Some((payload, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryBlobStore {
    pub fn object(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, error::SystemError> {
        self.objects.lock().unwrap().insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(format!("memory://{key}"))
    }
}

// ---------------------------------------------------------------------------
// wiring

/// A single server process wired to in-memory collaborators.
/// Must be built inside an actix system (`#[actix_web::test]`).
pub struct ChatHarness {
    pub service: Arc<ChatService<MemoryChatStore>>,
    pub store: Arc<MemoryChatStore>,
    pub links: Arc<MemoryRelationshipStore>,
    pub presence: Arc<MemoryPresence>,
    pub bus: Arc<MemoryFanoutBus>,
    pub blobs: Arc<MemoryBlobStore>,
    pub gate: Arc<FriendshipGate>,
    pub connections: ConnectionManager,
}

impl ChatHarness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryChatStore::default());
        let links = Arc::new(MemoryRelationshipStore::default());
        let presence = Arc::new(MemoryPresence::default());
        let bus = Arc::new(MemoryFanoutBus::default());
        let blobs = Arc::new(MemoryBlobStore::default());

        let gate = Arc::new(FriendshipGate::with_dependencies(
            links.clone(),
            Arc::new(MemoryCache::default()),
            60,
        ));
        let connections = ConnectionManager::with_dependencies(
            ConnectionHub::new().start(),
            presence.clone(),
            bus.clone(),
            auth_validator(),
            3600,
        );
        let service = Arc::new(ChatService::with_dependencies(
            store.clone(),
            gate.clone(),
            connections.clone(),
            presence.clone(),
            blobs.clone(),
            UploadConfig::default(),
        ));

        ChatHarness { service, store, links, presence, bus, blobs, gate, connections }
    }

    pub fn befriend(&self, user_a: i64, user_b: i64) {
        self.links.set_link(user_a, user_b, FriendshipStatus::Accepted);
    }

    pub async fn connect(&self, user_id: i64) -> (Connection, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection =
            self.connections.connect(&access_token(user_id), tx).await.expect("connects");
        (connection, rx)
    }
}

/// Next outbound frame, parsed; `None` if nothing arrives within a second.
pub async fn next_frame(rx: &mut mpsc::UnboundedReceiver<String>) -> Option<serde_json::Value> {
    let json = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.ok().flatten()?;
    serde_json::from_str(&json).ok()
}

/// Asserts that nothing is waiting on the connection.
pub async fn assert_no_frame(rx: &mut mpsc::UnboundedReceiver<String>) {
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rx.try_recv().is_err(), "unexpected outbound frame");
}
