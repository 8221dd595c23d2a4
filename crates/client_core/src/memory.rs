//! In-process stand-in for the data API. Records every issued call and can be
//! told to fail specific operations, which makes it the test double for the
//! navigator and the relationship editor.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{record_id, EntityId, EntityKind},
    error::{ApiError, ErrorCode},
    protocol::{ChangeNotification, ChangeOp, ListOptions, ListPage, MutationResponse},
};
use tokio::sync::{broadcast, Mutex};

use crate::{data_client::DataClient, images::ObjectStore};

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    List,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    List(EntityKind),
    Create(EntityKind, Value),
    Update(EntityKind, Value),
    Delete(EntityKind, EntityId),
}

impl RemoteCall {
    pub fn kind(&self) -> CallKind {
        match self {
            RemoteCall::List(_) => CallKind::List,
            RemoteCall::Create(..) => CallKind::Create,
            RemoteCall::Update(..) => CallKind::Update,
            RemoteCall::Delete(..) => CallKind::Delete,
        }
    }

    pub fn collection(&self) -> EntityKind {
        match self {
            RemoteCall::List(kind)
            | RemoteCall::Create(kind, _)
            | RemoteCall::Update(kind, _)
            | RemoteCall::Delete(kind, _) => *kind,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<EntityKind, BTreeMap<i64, Value>>,
    objects: HashMap<String, Vec<u8>>,
    calls: Vec<RemoteCall>,
    failing: HashSet<(CallKind, EntityKind)>,
    reject_creates: HashSet<EntityKind>,
}

pub struct InMemoryDataClient {
    state: Mutex<MemoryState>,
    changes: broadcast::Sender<ChangeNotification>,
    page_size: usize,
}

impl Default for InMemoryDataClient {
    fn default() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }
}

impl InMemoryDataClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(page_size: usize) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(MemoryState::default()),
            changes,
            page_size: page_size.max(1),
        }
    }

    /// Inserts records directly, without recording calls or notifying.
    pub async fn seed(&self, kind: EntityKind, records: impl IntoIterator<Item = Value>) {
        let mut state = self.state.lock().await;
        let collection = state.collections.entry(kind).or_default();
        for record in records {
            if let Some(id) = record_id(&record) {
                collection.insert(id.0, record);
            }
        }
    }

    pub async fn records(&self, kind: EntityKind) -> Vec<Value> {
        let state = self.state.lock().await;
        state
            .collections
            .get(&kind)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().await.calls.clone()
    }

    /// Calls other than `List`, which is what an edit actually wrote.
    pub async fn mutations(&self) -> Vec<RemoteCall> {
        self.calls()
            .await
            .into_iter()
            .filter(|call| call.kind() != CallKind::List)
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Makes every `op` against `kind` fail with a transport-style error.
    pub async fn set_failing(&self, op: CallKind, kind: EntityKind, failing: bool) {
        let mut state = self.state.lock().await;
        if failing {
            state.failing.insert((op, kind));
        } else {
            state.failing.remove(&(op, kind));
        }
    }

    /// Makes creates against `kind` answer with an `errors` payload instead of
    /// failing outright.
    pub async fn set_rejecting_creates(&self, kind: EntityKind, rejecting: bool) {
        let mut state = self.state.lock().await;
        if rejecting {
            state.reject_creates.insert(kind);
        } else {
            state.reject_creates.remove(&kind);
        }
    }

    fn check_failing(state: &MemoryState, op: CallKind, kind: EntityKind) -> Result<()> {
        if state.failing.contains(&(op, kind)) {
            return Err(anyhow!("connection reset while calling {op:?} on {kind}"));
        }
        Ok(())
    }

    fn notify(&self, collection: EntityKind, op: ChangeOp, record: Value) {
        let _ = self.changes.send(ChangeNotification {
            collection,
            op,
            record,
        });
    }
}

#[async_trait]
impl DataClient for InMemoryDataClient {
    async fn list(&self, kind: EntityKind, options: ListOptions) -> Result<ListPage> {
        let mut state = self.state.lock().await;
        state.calls.push(RemoteCall::List(kind));
        Self::check_failing(&state, CallKind::List, kind)?;

        let after = match options.next_token.as_deref() {
            Some(token) => Some(
                token
                    .parse::<i64>()
                    .map_err(|_| anyhow!("invalid nextToken '{token}'"))?,
            ),
            None => None,
        };
        let limit = options
            .limit
            .map(|l| l as usize)
            .unwrap_or(self.page_size)
            .clamp(1, self.page_size);

        let Some(collection) = state.collections.get(&kind) else {
            return Ok(ListPage::default());
        };
        let start = match after {
            Some(i64::MAX) => return Ok(ListPage::default()),
            Some(after) => after + 1,
            None => i64::MIN,
        };
        let mut remaining = collection
            .range(start..)
            .map(|(_, record)| record.clone());
        let data: Vec<Value> = remaining.by_ref().take(limit).collect();
        let next_token = if remaining.next().is_some() {
            data.last().and_then(record_id).map(|id| id.0.to_string())
        } else {
            None
        };
        Ok(ListPage { data, next_token })
    }

    async fn create(&self, kind: EntityKind, mut record: Value) -> Result<MutationResponse> {
        let stored = {
            let mut state = self.state.lock().await;
            state.calls.push(RemoteCall::Create(kind, record.clone()));
            Self::check_failing(&state, CallKind::Create, kind)?;
            if state.reject_creates.contains(&kind) {
                return Ok(MutationResponse::failed(ApiError::new(
                    ErrorCode::Validation,
                    format!("{kind} create rejected"),
                )));
            }
            let Some(fields) = record.as_object_mut() else {
                return Ok(MutationResponse::failed(ApiError::new(
                    ErrorCode::Validation,
                    format!("{kind} record must be a JSON object"),
                )));
            };

            let collection = state.collections.entry(kind).or_default();
            let requested = fields.get("id").and_then(Value::as_i64);
            let id = match requested {
                Some(id) if !collection.contains_key(&id) => id,
                _ => collection.keys().next_back().copied().unwrap_or(0) + 1,
            };
            fields.insert("id".to_string(), Value::from(id));
            collection.insert(id, record.clone());
            record
        };

        self.notify(kind, ChangeOp::Create, stored.clone());
        Ok(MutationResponse::ok(stored))
    }

    async fn update(&self, kind: EntityKind, record: Value) -> Result<Value> {
        {
            let mut state = self.state.lock().await;
            state.calls.push(RemoteCall::Update(kind, record.clone()));
            Self::check_failing(&state, CallKind::Update, kind)?;
            let id = record_id(&record).ok_or_else(|| anyhow!("{kind} record is missing an id"))?;
            let collection = state.collections.entry(kind).or_default();
            if !collection.contains_key(&id.0) {
                return Err(anyhow!("{kind} record {id} not found"));
            }
            collection.insert(id.0, record.clone());
        }

        self.notify(kind, ChangeOp::Update, record.clone());
        Ok(record)
    }

    async fn delete(&self, kind: EntityKind, id: EntityId) -> Result<()> {
        let removed = {
            let mut state = self.state.lock().await;
            state.calls.push(RemoteCall::Delete(kind, id));
            Self::check_failing(&state, CallKind::Delete, kind)?;
            state
                .collections
                .get_mut(&kind)
                .and_then(|collection| collection.remove(&id.0))
                .ok_or_else(|| anyhow!("{kind} record {id} not found"))?
        };

        self.notify(kind, ChangeOp::Delete, removed);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl ObjectStore for InMemoryDataClient {
    async fn get_object(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.state.lock().await.objects.get(path).cloned())
    }

    async fn put_object(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        self.state
            .lock()
            .await
            .objects
            .insert(path.to_string(), bytes);
        Ok(())
    }
}
