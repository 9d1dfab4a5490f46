//! Relationship store - ordered links from a product to related ids.
//!
//! Saving a list diffs it against the stored rows: targets missing from the new
//! list are deleted and every target in the list is upserted on its natural key
//! with its position as priority, so re-saving the same list is a no-op and
//! reordering never trips the unique index.

use crate::{
    core::cache::{CacheKey, CachedValue, ObjectCache},
    entities::{ProductRelationship, product_relationship},
    errors::Result,
};
use sea_orm::sea_query::OnConflict;
use sea_orm::{QueryOrder, QuerySelect, Set, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Kind of link stored in the relationships table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Upsell targets
    Upsell,
    /// Cross-sell targets
    CrossSell,
    /// Children of a grouped product
    GroupedChild,
    /// Gallery image attachments
    Image,
}

impl RelationshipType {
    /// Every relationship type.
    pub const ALL: [Self; 4] = [Self::Upsell, Self::CrossSell, Self::GroupedChild, Self::Image];

    /// Tag stored in the `type` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upsell => "upsell",
            Self::CrossSell => "cross_sell",
            Self::GroupedChild => "grouped",
            Self::Image => "image",
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

async fn stored_ids<C>(db: &C, entity_id: i64, kind: RelationshipType) -> Result<Vec<i64>>
where
    C: ConnectionTrait,
{
    ProductRelationship::find()
        .select_only()
        .column(product_relationship::Column::ObjectId)
        .filter(product_relationship::Column::RelationshipType.eq(kind.as_str()))
        .filter(product_relationship::Column::ProductId.eq(entity_id))
        .order_by_asc(product_relationship::Column::Priority)
        .into_tuple()
        .all(db)
        .await
        .map_err(Into::into)
}

/// Related ids of one type, in priority order.
pub async fn get<C>(
    db: &C,
    cache: &ObjectCache,
    entity_id: i64,
    kind: RelationshipType,
) -> Result<Vec<i64>>
where
    C: ConnectionTrait,
{
    if entity_id <= 0 {
        return Ok(Vec::new());
    }
    let key = CacheKey::Relationships(kind, entity_id);
    if let Some(CachedValue::Ids(ids)) = cache.get(&key).await {
        return Ok(ids);
    }

    let ids = stored_ids(db, entity_id, kind).await?;
    cache.set(key, CachedValue::Ids(ids.clone())).await;
    Ok(ids)
}

/// Replaces the related ids of one type with `ids`, in that order.
/// Duplicates keep their first position.
pub async fn set<C>(
    db: &C,
    cache: &ObjectCache,
    entity_id: i64,
    kind: RelationshipType,
    ids: &[i64],
) -> Result<bool>
where
    C: ConnectionTrait,
{
    if entity_id <= 0 {
        return Ok(false);
    }

    let mut seen = HashSet::new();
    let wanted: Vec<i64> = ids
        .iter()
        .copied()
        .filter(|id| *id > 0 && seen.insert(*id))
        .collect();
    let existing = stored_ids(db, entity_id, kind).await?;
    let removed: Vec<i64> = existing
        .iter()
        .copied()
        .filter(|id| !seen.contains(id))
        .collect();

    if !removed.is_empty() {
        ProductRelationship::delete_many()
            .filter(product_relationship::Column::RelationshipType.eq(kind.as_str()))
            .filter(product_relationship::Column::ProductId.eq(entity_id))
            .filter(product_relationship::Column::ObjectId.is_in(removed.clone()))
            .exec(db)
            .await?;
    }

    if !wanted.is_empty() {
        let rows = wanted
            .iter()
            .enumerate()
            .map(|(position, object_id)| product_relationship::ActiveModel {
                relationship_type: Set(kind.as_str().to_string()),
                product_id: Set(entity_id),
                object_id: Set(*object_id),
                priority: Set(position as i64),
                ..Default::default()
            });
        ProductRelationship::insert_many(rows)
            .on_conflict(
                OnConflict::columns([
                    product_relationship::Column::RelationshipType,
                    product_relationship::Column::ProductId,
                    product_relationship::Column::ObjectId,
                ])
                .update_column(product_relationship::Column::Priority)
                .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
    }

    cache
        .invalidate(&[CacheKey::Relationships(kind, entity_id)])
        .await;
    debug!(
        entity_id,
        %kind,
        kept = wanted.len(),
        removed = removed.len(),
        "relationships saved"
    );
    Ok(true)
}

/// Appends rows with sequential priorities, without diffing. Used by the
/// migration on entities that have no rows yet.
pub async fn insert_sequential<C>(
    db: &C,
    entity_id: i64,
    kind: RelationshipType,
    ids: &[i64],
) -> Result<usize>
where
    C: ConnectionTrait,
{
    let mut seen = HashSet::new();
    let rows: Vec<product_relationship::ActiveModel> = ids
        .iter()
        .copied()
        .filter(|id| *id > 0 && seen.insert(*id))
        .enumerate()
        .map(|(position, object_id)| product_relationship::ActiveModel {
            relationship_type: Set(kind.as_str().to_string()),
            product_id: Set(entity_id),
            object_id: Set(object_id),
            priority: Set(position as i64),
            ..Default::default()
        })
        .collect();
    let count = rows.len();
    if count > 0 {
        ProductRelationship::insert_many(rows)
            .exec_without_returning(db)
            .await?;
    }
    Ok(count)
}
