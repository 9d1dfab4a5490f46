//! Legacy key-value storage.
//!
//! Plain reads and writes against `postmeta`, with no interception. The
//! compatibility engine falls back here for unmapped keys and reads through
//! here when it needs what the legacy table still holds.

use crate::{
    core::meta_value::{self, MetaValue},
    entities::{PostMeta, post_meta},
    errors::Result,
};
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::Expr};
use std::collections::BTreeMap;
use tracing::trace;

/// All values stored under `key` for an entity, oldest first.
pub async fn get_values<C>(db: &C, entity_id: i64, key: &str) -> Result<Vec<MetaValue>>
where
    C: ConnectionTrait,
{
    let rows = PostMeta::find()
        .filter(post_meta::Column::PostId.eq(entity_id))
        .filter(post_meta::Column::MetaKey.eq(key))
        .order_by_asc(post_meta::Column::MetaId)
        .all(db)
        .await?;

    Ok(rows
        .iter()
        .map(|row| meta_value::maybe_unserialize(&row.meta_value))
        .collect())
}

/// Every legacy key of an entity with its list of values.
pub async fn get_all<C>(db: &C, entity_id: i64) -> Result<BTreeMap<String, Vec<MetaValue>>>
where
    C: ConnectionTrait,
{
    let rows = PostMeta::find()
        .filter(post_meta::Column::PostId.eq(entity_id))
        .order_by_asc(post_meta::Column::MetaId)
        .all(db)
        .await?;

    let mut all: BTreeMap<String, Vec<MetaValue>> = BTreeMap::new();
    for row in rows {
        all.entry(row.meta_key)
            .or_default()
            .push(meta_value::maybe_unserialize(&row.meta_value));
    }
    Ok(all)
}

/// Number of legacy rows stored under `key` for an entity.
pub async fn count<C>(db: &C, entity_id: i64, key: &str) -> Result<u64>
where
    C: ConnectionTrait,
{
    PostMeta::find()
        .filter(post_meta::Column::PostId.eq(entity_id))
        .filter(post_meta::Column::MetaKey.eq(key))
        .count(db)
        .await
        .map_err(Into::into)
}

/// Adds a row. With `unique`, refuses when the key already has a value.
pub async fn add<C>(
    db: &C,
    entity_id: i64,
    key: &str,
    value: &MetaValue,
    unique: bool,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    if entity_id <= 0 || key.is_empty() {
        return Ok(false);
    }
    if unique && count(db, entity_id, key).await? > 0 {
        return Ok(false);
    }

    post_meta::ActiveModel {
        post_id: Set(entity_id),
        meta_key: Set(key.to_string()),
        meta_value: Set(meta_value::maybe_serialize(value)),
        ..Default::default()
    }
    .insert(db)
    .await?;
    trace!(entity_id, key, "legacy meta added");
    Ok(true)
}

/// Updates every row of `key` (only rows equal to `prev_value` when given).
/// Adds the key when it does not exist yet and no previous value was given.
pub async fn update<C>(
    db: &C,
    entity_id: i64,
    key: &str,
    value: &MetaValue,
    prev_value: Option<&MetaValue>,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    if entity_id <= 0 || key.is_empty() {
        return Ok(false);
    }

    let mut query = PostMeta::update_many()
        .col_expr(
            post_meta::Column::MetaValue,
            Expr::value(meta_value::maybe_serialize(value)),
        )
        .filter(post_meta::Column::PostId.eq(entity_id))
        .filter(post_meta::Column::MetaKey.eq(key));
    if let Some(prev) = prev_value {
        query = query.filter(post_meta::Column::MetaValue.eq(meta_value::maybe_serialize(prev)));
    }
    let result = query.exec(db).await?;

    if result.rows_affected > 0 {
        return Ok(true);
    }
    if prev_value.is_none() && count(db, entity_id, key).await? == 0 {
        return add(db, entity_id, key, value, false).await;
    }
    Ok(false)
}

/// Deletes rows of `key` for an entity (only those equal to `prev_value` when
/// given). With `delete_all` the entity id is ignored and the key is removed
/// from every entity.
pub async fn delete<C>(
    db: &C,
    entity_id: i64,
    key: &str,
    prev_value: Option<&MetaValue>,
    delete_all: bool,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    if key.is_empty() || (!delete_all && entity_id <= 0) {
        return Ok(false);
    }

    let mut query = PostMeta::delete_many().filter(post_meta::Column::MetaKey.eq(key));
    if !delete_all {
        query = query.filter(post_meta::Column::PostId.eq(entity_id));
    }
    if let Some(prev) = prev_value.filter(|prev| !meta_value::is_empty(prev)) {
        query = query.filter(post_meta::Column::MetaValue.eq(meta_value::maybe_serialize(prev)));
    }
    let result = query.exec(db).await?;
    Ok(result.rows_affected > 0)
}

/// Removes the given keys from one entity. Returns the number of rows deleted.
pub async fn delete_keys<C>(db: &C, entity_id: i64, keys: &[&str]) -> Result<u64>
where
    C: ConnectionTrait,
{
    if keys.is_empty() {
        return Ok(0);
    }
    let result = PostMeta::delete_many()
        .filter(post_meta::Column::PostId.eq(entity_id))
        .filter(post_meta::Column::MetaKey.is_in(keys.iter().copied()))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
