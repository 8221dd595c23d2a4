use std::collections::BTreeMap;

use anyhow::Result;
use shared::domain::{from_record, Entity, EntityId};

use crate::data_client::{fetch_all_records, DataClient, DataClientError};

/// Id-indexed local copy of one collection.
#[derive(Debug, Clone)]
pub struct EntityStore<T: Entity> {
    items: BTreeMap<EntityId, T>,
}

impl<T: Entity> Default for EntityStore<T> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }
}

impl<T: Entity> EntityStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: items.into_iter().map(|item| (item.id(), item)).collect(),
        }
    }

    pub async fn fetch_all(client: &dyn DataClient) -> Result<Self> {
        let records = fetch_all_records(client, T::KIND).await?;
        let mut items = BTreeMap::new();
        for record in records {
            let item: T = from_record(record).map_err(|source| DataClientError::Decode {
                collection: T::KIND,
                source,
            })?;
            items.insert(item.id(), item);
        }
        Ok(Self { items })
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.items.get(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.items.contains_key(&id)
    }

    /// One past the largest id held locally, starting at 1.
    pub fn next_id(&self) -> EntityId {
        self.items
            .keys()
            .next_back()
            .map(|id| EntityId(id.0 + 1))
            .unwrap_or(EntityId(1))
    }

    pub fn insert(&mut self, item: T) -> Option<T> {
        self.items.insert(item.id(), item)
    }

    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        self.items.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }
}
