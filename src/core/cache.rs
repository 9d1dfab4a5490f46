//! Object cache shared by the structured stores.
//!
//! Entries are grouped per entity so a write can invalidate exactly what it
//! touched. Writers invalidate only after their write succeeded (after commit
//! inside a transaction), so a racing reader can at worst re-read fresh rows.

use crate::core::relationships::RelationshipType;
use crate::entities::{
    PostModel, ProductAttributeModel, ProductAttributeValueModel, ProductDownloadModel,
    ProductModel,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

/// Cache key, one group per kind of structured data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Registry row of an entity
    Entity(i64),
    /// Structured product row
    Product(i64),
    /// Whether the structured row is missing or holds only defaults
    UsesDefault(i64),
    /// Related ids for one relationship type
    Relationships(RelationshipType, i64),
    /// Attribute definitions
    Attributes(i64),
    /// Attribute values of every definition
    AttributeValues(i64),
    /// Download rows
    Downloads(i64),
}

impl CacheKey {
    const fn entity_id(&self) -> i64 {
        match self {
            Self::Entity(id)
            | Self::Product(id)
            | Self::UsesDefault(id)
            | Self::Relationships(_, id)
            | Self::Attributes(id)
            | Self::AttributeValues(id)
            | Self::Downloads(id) => *id,
        }
    }
}

/// Cached payload
#[derive(Debug, Clone)]
pub enum CachedValue {
    /// Registry row, `None` when the id is unknown
    Entity(Option<PostModel>),
    /// Product row, `None` before the first write
    Product(Option<ProductModel>),
    /// Yes/no answer
    Flag(bool),
    /// Ordered ids
    Ids(Vec<i64>),
    /// Attribute definition rows
    Attributes(Vec<ProductAttributeModel>),
    /// Attribute value rows
    AttributeValues(Vec<ProductAttributeValueModel>),
    /// Download rows in priority order
    Downloads(Vec<ProductDownloadModel>),
}

/// Process-local keyed cache. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct ObjectCache {
    entries: Arc<RwLock<HashMap<CacheKey, CachedValue>>>,
}

impl ObjectCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached payload for `key`, if present.
    pub async fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        let entries = self.entries.read().await;
        let hit = entries.get(key).cloned();
        trace!(?key, hit = hit.is_some(), "cache lookup");
        hit
    }

    /// Stores `value` under `key`.
    pub async fn set(&self, key: CacheKey, value: CachedValue) {
        self.entries.write().await.insert(key, value);
    }

    /// Drops the given keys.
    pub async fn invalidate(&self, keys: &[CacheKey]) {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(key);
        }
    }

    /// Drops every group cached for an entity.
    pub async fn invalidate_entity(&self, entity_id: i64) {
        let mut entries = self.entries.write().await;
        entries.retain(|key, _| key.entity_id() != entity_id);
        trace!(entity_id, "cache invalidated for entity");
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
