use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{from_record, to_record, Entity, EntityId, EntityKind},
    error::ApiException,
    protocol::{ChangeNotification, ListOptions, ListPage, MutationResponse},
};
use thiserror::Error;
use tokio::sync::broadcast;

/// Page size requested while walking a whole collection.
pub const FETCH_ALL_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum DataClientError {
    #[error("data API rejected {collection} write: {source}")]
    Rejected {
        collection: EntityKind,
        source: ApiException,
    },
    #[error("data API returned a {collection} record that does not decode: {source}")]
    Decode {
        collection: EntityKind,
        source: serde_json::Error,
    },
    #[error("pagination for {collection} repeated token '{token}'")]
    PaginationLoop { collection: EntityKind, token: String },
}

/// Per-collection CRUD plus change notifications, as offered by the data API.
#[async_trait]
pub trait DataClient: Send + Sync {
    async fn list(&self, kind: EntityKind, options: ListOptions) -> Result<ListPage>;
    async fn create(&self, kind: EntityKind, record: Value) -> Result<MutationResponse>;
    async fn update(&self, kind: EntityKind, record: Value) -> Result<Value>;
    async fn delete(&self, kind: EntityKind, id: EntityId) -> Result<()>;
    fn subscribe(&self) -> broadcast::Receiver<ChangeNotification>;
}

/// Calls `list` repeatedly, following `nextToken` until the collection is
/// exhausted.
pub async fn fetch_all_records(client: &dyn DataClient, kind: EntityKind) -> Result<Vec<Value>> {
    let mut records = Vec::new();
    let mut seen_tokens = HashSet::new();
    let mut options = ListOptions {
        limit: Some(FETCH_ALL_PAGE_SIZE),
        next_token: None,
    };

    loop {
        let page = client
            .list(kind, options.clone())
            .await
            .with_context(|| format!("failed to list {kind}"))?;
        records.extend(page.data);

        let Some(token) = page.next_token else {
            break;
        };
        if !seen_tokens.insert(token.clone()) {
            return Err(DataClientError::PaginationLoop {
                collection: kind,
                token,
            }
            .into());
        }
        options.next_token = Some(token);
    }

    Ok(records)
}

/// Creates a typed entity and returns it as stored, which may carry a
/// different id than the one requested.
pub async fn create_entity<T: Entity>(client: &dyn DataClient, entity: &T) -> Result<T> {
    let record = to_record(entity).with_context(|| format!("failed to encode {}", T::KIND))?;
    let stored = client
        .create(T::KIND, record)
        .await?
        .into_result()
        .map_err(|source| DataClientError::Rejected {
            collection: T::KIND,
            source,
        })?;
    Ok(from_record(stored).map_err(|source| DataClientError::Decode {
        collection: T::KIND,
        source,
    })?)
}
