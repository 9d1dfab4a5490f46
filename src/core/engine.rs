//! Metadata interception engine.
//!
//! Every generic metadata call is first offered to [`CompatEngine`]. Calls on
//! mapped keys of catalog entities are served from the structured stores and
//! come back as [`Intercept::Handled`]; everything else is
//! [`Intercept::PassThrough`] and stays with legacy storage.
//!
//! Entities without a structured row are still served from legacy storage on
//! read. The first mapped write migrates the entity, then applies the write,
//! both inside one transaction. Every write runs in its own transaction and
//! the entity's cache entries are dropped once it has committed or rolled back.

use crate::{
    config::settings::CatalogSettings,
    core::{
        attributes,
        cache::ObjectCache,
        columns,
        downloads::{self, DownloadSetting},
        entity, legacy,
        mapping::{self, CompatMap, FieldMapping, Handler, ListShape},
        meta_value::{self, MetaValue},
        migration, relationships,
    },
    entities::{PostModel, Product, product},
    errors::Result,
};
use sea_orm::{ConnectionTrait, DatabaseTransaction, EntityTrait, QuerySelect, TransactionTrait};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Outcome of offering a call to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Intercept<T> {
    /// Not intercepted; the caller proceeds with legacy storage
    PassThrough,
    /// Served from the structured stores
    Handled(T),
}

impl<T> Intercept<T> {
    /// Whether the structured stores served the call.
    #[must_use]
    pub const fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }
}

/// Result of a metadata read
#[derive(Debug, Clone, PartialEq)]
pub enum MetaRead {
    /// First value, or `""` when nothing is stored
    Single(MetaValue),
    /// Every value of the key
    List(Vec<MetaValue>),
    /// Every key of the entity, with list-wrapped values
    All(BTreeMap<String, Vec<MetaValue>>),
}

/// Per-call context handed down the stack
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetaContext {
    /// Skip interception and talk to legacy storage directly
    pub bypass_compat: bool,
}

impl MetaContext {
    /// Context for internal reads that must see legacy storage as-is.
    #[must_use]
    pub const fn bypass() -> Self {
        Self {
            bypass_compat: true,
        }
    }
}

/// Dispatches metadata calls on mapped keys to the structured stores
#[derive(Debug, Clone)]
pub struct CompatEngine {
    map: Arc<CompatMap>,
    cache: ObjectCache,
    catalog: Arc<CatalogSettings>,
}

impl CompatEngine {
    /// Engine over a shared mapping, cache and catalog configuration.
    #[must_use]
    pub const fn new(map: Arc<CompatMap>, cache: ObjectCache, catalog: Arc<CatalogSettings>) -> Self {
        Self {
            map,
            cache,
            catalog,
        }
    }

    /// Cache shared with the structured stores.
    #[must_use]
    pub const fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    /// Mapped legacy keys.
    #[must_use]
    pub fn map(&self) -> &CompatMap {
        &self.map
    }

    /// The entity's registry row when it is a catalog entity.
    async fn catalog_entity<C>(&self, db: &C, entity_id: i64) -> Result<Option<PostModel>>
    where
        C: ConnectionTrait,
    {
        Ok(entity::find(db, &self.cache, entity_id)
            .await?
            .filter(|post| self.catalog.is_catalog_type(&post.post_type)))
    }

    /// Registry row and mapping of `key` when the call on `entity_id` should
    /// be intercepted.
    async fn intercepted<C>(
        &self,
        db: &C,
        ctx: MetaContext,
        entity_id: i64,
        key: &str,
    ) -> Result<Option<(PostModel, &FieldMapping)>>
    where
        C: ConnectionTrait,
    {
        if ctx.bypass_compat {
            return Ok(None);
        }
        let Some(mapping) = self.map.get(key) else {
            return Ok(None);
        };
        Ok(self
            .catalog_entity(db, entity_id)
            .await?
            .map(|post| (post, mapping)))
    }

    /// Reads `key`, or every key when `key` is empty and `single` is false.
    pub async fn get<C>(
        &self,
        db: &C,
        ctx: MetaContext,
        entity_id: i64,
        key: &str,
        single: bool,
    ) -> Result<Intercept<MetaRead>>
    where
        C: ConnectionTrait,
    {
        if ctx.bypass_compat {
            return Ok(Intercept::PassThrough);
        }
        if key.is_empty() {
            if single {
                return Ok(Intercept::PassThrough);
            }
            return self.get_all(db, entity_id).await;
        }

        let Some((_, mapping)) = self.intercepted(db, ctx, entity_id, key).await? else {
            trace!(entity_id, key, "meta read passed through");
            return Ok(Intercept::PassThrough);
        };
        if columns::load_row(db, &self.cache, entity_id).await?.is_none() {
            trace!(entity_id, key, "not migrated, meta read passed through");
            return Ok(Intercept::PassThrough);
        }
        let values = self.read_field(db, entity_id, mapping).await?;
        Ok(Intercept::Handled(if single {
            MetaRead::Single(values.into_iter().next().unwrap_or_else(empty_value))
        } else {
            MetaRead::List(values)
        }))
    }

    /// Adds a value. With `unique`, refuses when the key already holds one.
    pub async fn add<C>(
        &self,
        db: &C,
        ctx: MetaContext,
        entity_id: i64,
        key: &str,
        value: &MetaValue,
        unique: bool,
    ) -> Result<Intercept<bool>>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let Some((post, mapping)) = self.intercepted(db, ctx, entity_id, key).await? else {
            return Ok(Intercept::PassThrough);
        };
        let txn = db.begin().await?;
        let result = self.add_field(&txn, &post, mapping, value, unique).await;
        let added = self.complete(txn, &[entity_id], result).await?;
        Ok(Intercept::Handled(added))
    }

    /// Replaces the value, only when the stored one equals `prev_value` if given.
    pub async fn update<C>(
        &self,
        db: &C,
        ctx: MetaContext,
        entity_id: i64,
        key: &str,
        value: &MetaValue,
        prev_value: Option<&MetaValue>,
    ) -> Result<Intercept<bool>>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let Some((post, mapping)) = self.intercepted(db, ctx, entity_id, key).await? else {
            return Ok(Intercept::PassThrough);
        };
        let txn = db.begin().await?;
        let result = self.update_field(&txn, &post, mapping, value, prev_value).await;
        let updated = self.complete(txn, &[entity_id], result).await?;
        Ok(Intercept::Handled(updated))
    }

    /// With `delete_all` the entity id is ignored and the key is reset on
    /// every structured entity and removed from every legacy one.
    pub async fn delete<C>(
        &self,
        db: &C,
        ctx: MetaContext,
        entity_id: i64,
        key: &str,
        prev_value: Option<&MetaValue>,
        delete_all: bool,
    ) -> Result<Intercept<bool>>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        if ctx.bypass_compat {
            return Ok(Intercept::PassThrough);
        }
        if delete_all {
            let Some(mapping) = self.map.get(key) else {
                return Ok(Intercept::PassThrough);
            };
            let txn = db.begin().await?;
            let (ids, result) = match structured_ids(&txn).await {
                Ok(ids) => {
                    let result = self.delete_everywhere(&txn, &ids, mapping, prev_value).await;
                    (ids, result)
                }
                Err(e) => (Vec::new(), Err(e)),
            };
            let deleted = self.complete(txn, &ids, result).await?;
            return Ok(Intercept::Handled(deleted));
        }

        let Some((post, mapping)) = self.intercepted(db, ctx, entity_id, key).await? else {
            return Ok(Intercept::PassThrough);
        };
        let txn = db.begin().await?;
        let result = match self.ensure_structured(&txn, &post).await {
            Ok(()) => self.delete_field(&txn, entity_id, mapping, prev_value).await,
            Err(e) => Err(e),
        };
        let deleted = self.complete(txn, &[entity_id], result).await?;
        Ok(Intercept::Handled(deleted))
    }

    /// Commits on success and rolls back on failure, then drops the cache
    /// entries of every touched entity either way.
    async fn complete<T>(
        &self,
        txn: DatabaseTransaction,
        entity_ids: &[i64],
        result: Result<T>,
    ) -> Result<T> {
        let outcome = match result {
            Ok(value) => match txn.commit().await {
                Ok(()) => Ok(value),
                Err(e) => Err(e.into()),
            },
            Err(e) => {
                warn!(?entity_ids, error = %e, "structured write rolled back");
                match txn.rollback().await {
                    Ok(()) => Err(e),
                    Err(rollback) => Err(rollback.into()),
                }
            }
        };
        for entity_id in entity_ids {
            self.cache.invalidate_entity(*entity_id).await;
        }
        outcome
    }

    /// Migrates an entity that has no structured row yet, so a write never
    /// leaves the rest of its legacy data behind.
    async fn ensure_structured<C>(&self, db: &C, post: &PostModel) -> Result<()>
    where
        C: ConnectionTrait,
    {
        if columns::load_row(db, &self.cache, post.id).await?.is_some() {
            return Ok(());
        }
        let rows = migration::migrate_entity(db, &self.cache, &self.map, post, true).await?;
        self.cache.invalidate_entity(post.id).await;
        debug!(entity_id = post.id, ?rows, "entity migrated on first structured write");
        Ok(())
    }

    async fn add_field<C>(
        &self,
        db: &C,
        post: &PostModel,
        mapping: &FieldMapping,
        value: &MetaValue,
        unique: bool,
    ) -> Result<bool>
    where
        C: ConnectionTrait,
    {
        self.ensure_structured(db, post).await?;
        if unique && self.holds_value(db, post.id, mapping).await? {
            debug!(entity_id = post.id, key = mapping.key, "unique add refused");
            return Ok(false);
        }
        self.write_field(db, post.id, mapping, value, None).await
    }

    async fn update_field<C>(
        &self,
        db: &C,
        post: &PostModel,
        mapping: &FieldMapping,
        value: &MetaValue,
        prev_value: Option<&MetaValue>,
    ) -> Result<bool>
    where
        C: ConnectionTrait,
    {
        self.ensure_structured(db, post).await?;
        self.write_field(db, post.id, mapping, value, prev_value).await
    }

    /// Whether the key holds a value for a unique add. A column still holding
    /// the value a fresh row starts with counts as empty.
    async fn holds_value<C>(&self, db: &C, entity_id: i64, mapping: &FieldMapping) -> Result<bool>
    where
        C: ConnectionTrait,
    {
        let Handler::Column { field, .. } = &mapping.handler else {
            return Ok(!self.read_field(db, entity_id, mapping).await?.is_empty());
        };
        if columns::uses_default_values(db, &self.cache, entity_id).await? {
            return Ok(false);
        }
        Ok(columns::load_row(db, &self.cache, entity_id)
            .await?
            .is_some_and(|row| !columns::holds_default(&row, *field)))
    }

    async fn get_all<C>(&self, db: &C, entity_id: i64) -> Result<Intercept<MetaRead>>
    where
        C: ConnectionTrait,
    {
        let Some(post) = self.catalog_entity(db, entity_id).await? else {
            return Ok(Intercept::PassThrough);
        };
        let product_type = entity::product_type(db, &self.cache, &post).await?;
        if self.catalog.uses_alternate_storage(&product_type) {
            trace!(entity_id, %product_type, "alternate storage, bulk read passed through");
            return Ok(Intercept::PassThrough);
        }
        let all = self.synthesize_all(db, entity_id).await?;
        Ok(Intercept::Handled(MetaRead::All(all)))
    }

    /// The full legacy-shaped map: structured values for mapped keys merged
    /// with whatever unmapped keys legacy storage still holds. An entity
    /// without a structured row keeps its mapped legacy values.
    pub async fn synthesize_all<C>(
        &self,
        db: &C,
        entity_id: i64,
    ) -> Result<BTreeMap<String, Vec<MetaValue>>>
    where
        C: ConnectionTrait,
    {
        let mut all = legacy::get_all(db, entity_id).await?;
        if columns::load_row(db, &self.cache, entity_id).await?.is_none() {
            return Ok(all);
        }

        all.retain(|key, _| !self.map.contains(key));
        for mapping in self.map.iter() {
            let values = self.read_field(db, entity_id, mapping).await?;
            if !values.is_empty() {
                all.insert(mapping.key.to_string(), values);
            }
        }
        Ok(all)
    }

    /// Values of one mapped key in legacy shape. Empty means "nothing stored".
    pub async fn read_field<C>(
        &self,
        db: &C,
        entity_id: i64,
        mapping: &FieldMapping,
    ) -> Result<Vec<MetaValue>>
    where
        C: ConnectionTrait,
    {
        let cache = &self.cache;
        let value = match &mapping.handler {
            Handler::Column { field, .. } => columns::get(db, cache, entity_id, *field)
                .await?
                .and_then(|v| mapping::render_column(*field, &v)),
            Handler::Relationship { kind, shape } => {
                let ids = relationships::get(db, cache, entity_id, *kind).await?;
                (!ids.is_empty()).then(|| render_ids(&ids, *shape))
            }
            Handler::Attributes => {
                let map = attributes::get_attributes(db, cache, entity_id).await?;
                if map.is_empty() {
                    None
                } else {
                    Some(serde_json::to_value(map)?)
                }
            }
            Handler::DefaultAttributes => {
                let defaults = attributes::get_default_attributes(db, cache, entity_id).await?;
                if defaults.is_empty() {
                    None
                } else {
                    Some(serde_json::to_value(defaults)?)
                }
            }
            Handler::Downloads => {
                let files = downloads::get_files(db, cache, entity_id).await?;
                (!files.is_empty()).then(|| downloads::encode_files(&files))
            }
            Handler::DownloadSetting(setting) => {
                downloads::get_setting(db, cache, entity_id, *setting)
                    .await?
                    .map(|v| Value::String(v.unwrap_or(-1).to_string()))
            }
        };
        Ok(value.into_iter().collect())
    }

    async fn matches_current<C>(
        &self,
        db: &C,
        entity_id: i64,
        mapping: &FieldMapping,
        prev_value: &MetaValue,
    ) -> Result<bool>
    where
        C: ConnectionTrait,
    {
        let current = self.read_field(db, entity_id, mapping).await?;
        Ok(match (&mapping.handler, current.first()) {
            (Handler::Relationship { .. }, current) => {
                current.map(meta_value::as_id_list).unwrap_or_default()
                    == meta_value::as_id_list(prev_value)
            }
            (Handler::DownloadSetting(_), current) => {
                current.and_then(DownloadSetting::parse) == DownloadSetting::parse(prev_value)
            }
            (_, None) => meta_value::is_empty(prev_value),
            (_, Some(current)) => current == prev_value,
        })
    }

    async fn write_field<C>(
        &self,
        db: &C,
        entity_id: i64,
        mapping: &FieldMapping,
        value: &MetaValue,
        prev_value: Option<&MetaValue>,
    ) -> Result<bool>
    where
        C: ConnectionTrait,
    {
        let cache = &self.cache;
        if let Handler::Column { field, .. } = &mapping.handler {
            let prev = prev_value.map(|prev| mapping::column_value(*field, prev));
            return columns::set(
                db,
                cache,
                entity_id,
                *field,
                mapping::column_value(*field, value),
                prev,
                false,
            )
            .await;
        }

        if let Some(prev) = prev_value {
            if !self.matches_current(db, entity_id, mapping, prev).await? {
                trace!(entity_id, key = mapping.key, "previous value mismatch");
                return Ok(false);
            }
        }

        match &mapping.handler {
            Handler::Column { .. } => Ok(false),
            Handler::Relationship { kind, .. } => {
                relationships::set(db, cache, entity_id, *kind, &meta_value::as_id_list(value))
                    .await
            }
            Handler::Attributes => {
                if !(value.is_object() || meta_value::is_empty(value)) {
                    return Ok(false);
                }
                let map = attributes::decode_attribute_map(value);
                attributes::set_attributes(db, cache, entity_id, &map).await
            }
            Handler::DefaultAttributes => {
                let defaults = attributes::decode_default_map(value);
                attributes::set_default_attributes(db, cache, entity_id, &defaults).await
            }
            Handler::Downloads => {
                if !(value.is_object() || meta_value::is_empty(value)) {
                    return Ok(false);
                }
                let files = downloads::decode_files(value);
                downloads::set_files(db, cache, entity_id, &files).await?;
                Ok(true)
            }
            Handler::DownloadSetting(setting) => {
                downloads::set_setting(db, cache, entity_id, *setting, DownloadSetting::parse(value))
                    .await
            }
        }
    }

    async fn delete_field<C>(
        &self,
        db: &C,
        entity_id: i64,
        mapping: &FieldMapping,
        prev_value: Option<&MetaValue>,
    ) -> Result<bool>
    where
        C: ConnectionTrait,
    {
        let cache = &self.cache;
        match &mapping.handler {
            Handler::Column {
                field,
                delete_value,
            } => {
                if columns::load_row(db, cache, entity_id).await?.is_none() {
                    return Ok(false);
                }
                let prev = prev_value
                    .filter(|prev| !meta_value::is_empty(prev))
                    .map(|prev| mapping::column_value(*field, prev));
                columns::set(db, cache, entity_id, *field, delete_value.clone(), prev, false).await
            }
            Handler::DownloadSetting(setting) => {
                if let Some(prev) = prev_value.filter(|prev| !meta_value::is_empty(prev)) {
                    if !self.matches_current(db, entity_id, mapping, prev).await? {
                        return Ok(false);
                    }
                }
                downloads::set_setting(db, cache, entity_id, *setting, None).await
            }
            _ => {
                let cleared = match &mapping.handler {
                    Handler::Attributes | Handler::DefaultAttributes | Handler::Downloads => {
                        Value::Object(serde_json::Map::new())
                    }
                    _ => Value::Array(Vec::new()),
                };
                let prev = prev_value.filter(|prev| !meta_value::is_empty(prev));
                self.write_field(db, entity_id, mapping, &cleared, prev).await
            }
        }
    }

    async fn delete_everywhere<C>(
        &self,
        db: &C,
        ids: &[i64],
        mapping: &FieldMapping,
        prev_value: Option<&MetaValue>,
    ) -> Result<bool>
    where
        C: ConnectionTrait,
    {
        let prev = prev_value.filter(|prev| !meta_value::is_empty(prev));
        let mut any = legacy::delete(db, 0, mapping.key, prev, true).await?;
        if let Handler::Column {
            field,
            delete_value,
        } = &mapping.handler
        {
            let prev = prev.map(|prev| mapping::column_value(*field, prev));
            any |= columns::set(db, &self.cache, 0, *field, delete_value.clone(), prev, true).await?;
        } else {
            for entity_id in ids {
                any |= self.delete_field(db, *entity_id, mapping, prev).await?;
            }
        }
        debug!(key = mapping.key, any, "mapped key deleted everywhere");
        Ok(any)
    }
}

/// Ids of every entity with a structured row.
async fn structured_ids<C>(db: &C) -> Result<Vec<i64>>
where
    C: ConnectionTrait,
{
    Product::find()
        .select_only()
        .column(product::Column::ProductId)
        .into_tuple()
        .all(db)
        .await
        .map_err(Into::into)
}

const fn empty_value() -> MetaValue {
    Value::String(String::new())
}

fn render_ids(ids: &[i64], shape: ListShape) -> MetaValue {
    match shape {
        ListShape::Array => Value::Array(ids.iter().map(|id| Value::from(*id)).collect()),
        ListShape::CommaSeparated => Value::String(
            ids.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
        ),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::ConnectionTrait;
    use serde_json::json;

    fn engine() -> CompatEngine {
        CompatEngine::new(
            Arc::new(CompatMap::build()),
            ObjectCache::new(),
            Arc::new(CatalogSettings::default()),
        )
    }

    async fn read_single<C: ConnectionTrait>(
        engine: &CompatEngine,
        db: &C,
        id: i64,
        key: &str,
    ) -> Result<MetaValue> {
        match engine.get(db, MetaContext::default(), id, key, true).await? {
            Intercept::Handled(MetaRead::Single(value)) => Ok(value),
            other => panic!("{key} not handled: {other:?}"),
        }
    }

    fn sample_values() -> Vec<(&'static str, MetaValue)> {
        vec![
            ("_sku", json!("DUMMY SKU")),
            ("_thumbnail_id", json!("42")),
            ("_height", json!("20")),
            ("_width", json!("10.5")),
            ("_length", json!("3")),
            ("_weight", json!("1.25")),
            ("_stock", json!("5")),
            ("_virtual", json!("yes")),
            ("_downloadable", json!("yes")),
            ("_tax_class", json!("reduced-rate")),
            ("_tax_status", json!("shipping")),
            ("total_sales", json!("7")),
            ("_price", json!("10")),
            ("_regular_price", json!("10")),
            ("_sale_price", json!("5")),
            ("_sale_price_dates_from", json!("1704153600")),
            ("_sale_price_dates_to", json!("1706745600")),
            ("_wc_average_rating", json!("4.5")),
            ("_stock_status", json!("outofstock")),
            ("_upsell_ids", json!([20, 30])),
            ("_crosssell_ids", json!([31])),
            ("_children", json!([40, 41, 42])),
            ("_product_image_gallery", json!("11,12")),
        ]
    }

    #[tokio::test]
    async fn test_round_trip_bypasses_legacy_storage() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = engine();
        let id = create_test_product(&db, "Chair").await?;

        for (key, value) in sample_values() {
            let result = engine
                .update(&db, MetaContext::default(), id, key, &value, None)
                .await?;
            assert_eq!(result, Intercept::Handled(true), "{key}");
        }
        for (key, value) in sample_values() {
            assert_eq!(read_single(&engine, &db, id, key).await?, value, "{key}");
            assert_eq!(legacy::count(&db, id, key).await?, 0, "{key}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_restores_documented_defaults() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = engine();
        let id = create_test_product(&db, "Chair").await?;
        let ctx = MetaContext::default();

        for (key, value) in sample_values() {
            engine.update(&db, ctx, id, key, &value, None).await?;
        }
        for (key, _) in sample_values() {
            let deleted = engine.delete(&db, ctx, id, key, None, false).await?;
            assert!(deleted.is_handled(), "{key}");
        }

        let expected = [
            ("_stock_status", json!("instock")),
            ("_tax_status", json!("taxable")),
            ("total_sales", json!("0")),
            ("_wc_average_rating", json!("0")),
            ("_virtual", json!("no")),
            ("_downloadable", json!("no")),
            ("_sku", json!("")),
            ("_thumbnail_id", json!("")),
            ("_price", json!("")),
            ("_stock", json!("")),
            ("_sale_price_dates_from", json!("")),
            ("_upsell_ids", json!("")),
            ("_product_image_gallery", json!("")),
        ];
        for (key, value) in expected {
            assert_eq!(read_single(&engine, &db, id, key).await?, value, "{key}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_unmapped_keys_and_other_entities_pass_through() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = engine();
        let ctx = MetaContext::default();
        let id = create_test_product(&db, "Chair").await?;
        let page = create_test_post(&db, "page", "About").await?;

        let result = engine.get(&db, ctx, id, "_edit_lock", true).await?;
        assert_eq!(result, Intercept::PassThrough);
        let result = engine.get(&db, ctx, page, "_sku", true).await?;
        assert_eq!(result, Intercept::PassThrough);
        let result = engine
            .update(&db, MetaContext::bypass(), id, "_sku", &json!("X"), None)
            .await?;
        assert_eq!(result, Intercept::PassThrough);
        Ok(())
    }

    #[tokio::test]
    async fn test_unique_add_refused_when_value_exists() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = engine();
        let ctx = MetaContext::default();
        let id = create_test_product(&db, "Chair").await?;

        let first = engine.add(&db, ctx, id, "_sku", &json!("A"), true).await?;
        assert_eq!(first, Intercept::Handled(true));
        let second = engine.add(&db, ctx, id, "_sku", &json!("B"), true).await?;
        assert_eq!(second, Intercept::Handled(false));
        assert_eq!(read_single(&engine, &db, id, "_sku").await?, json!("A"));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_with_stale_previous_value_fails() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = engine();
        let ctx = MetaContext::default();
        let id = create_test_product(&db, "Chair").await?;

        engine.update(&db, ctx, id, "_price", &json!("10"), None).await?;
        let stale = engine
            .update(&db, ctx, id, "_price", &json!("12"), Some(&json!("9")))
            .await?;
        assert_eq!(stale, Intercept::Handled(false));
        let fresh = engine
            .update(&db, ctx, id, "_price", &json!("12"), Some(&json!("10")))
            .await?;
        assert_eq!(fresh, Intercept::Handled(true));

        engine.update(&db, ctx, id, "_upsell_ids", &json!([1, 2]), None).await?;
        let stale = engine
            .update(&db, ctx, id, "_upsell_ids", &json!([3]), Some(&json!([2, 1])))
            .await?;
        assert_eq!(stale, Intercept::Handled(false));
        assert_eq!(read_single(&engine, &db, id, "_upsell_ids").await?, json!([1, 2]));
        Ok(())
    }

    #[tokio::test]
    async fn test_upsell_update_replaces_targets() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = engine();
        let ctx = MetaContext::default();
        let id = create_test_product(&db, "Chair").await?;

        engine.update(&db, ctx, id, "_upsell_ids", &json!([20, 30]), None).await?;
        engine.update(&db, ctx, id, "_upsell_ids", &json!([40, 50]), None).await?;

        let rows = relationship_rows(&db, id, "upsell").await?;
        assert_eq!(rows, vec![(40, 0), (50, 1)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_attribute_round_trip() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = engine();
        let ctx = MetaContext::default();
        let id = create_test_product(&db, "Shirt").await?;
        let attributes = json!({
            "material": {
                "name": "Material",
                "value": "Cotton | Linen",
                "position": 0,
                "is_visible": 1,
                "is_variation": 0,
                "is_taxonomy": 0
            },
            "fit": {
                "name": "Fit",
                "value": "Slim|Regular ",
                "position": 1,
                "is_visible": 0,
                "is_variation": 1,
                "is_taxonomy": 0
            }
        });

        engine
            .update(&db, ctx, id, "_product_attributes", &attributes, None)
            .await?;
        let read = read_single(&engine, &db, id, "_product_attributes").await?;
        assert_eq!(read["material"]["value"], json!("Cotton | Linen"));
        assert_eq!(read["fit"]["value"], json!("Slim | Regular"));
        assert_eq!(read["fit"]["position"], json!(1));
        assert_eq!(read["fit"]["is_variation"], json!(1));
        assert_eq!(read["fit"]["is_visible"], json!(0));
        assert_eq!(legacy::count(&db, id, "_product_attributes").await?, 0);

        engine
            .update(&db, ctx, id, "_default_attributes", &json!({"fit": "Slim"}), None)
            .await?;
        let defaults = read_single(&engine, &db, id, "_default_attributes").await?;
        assert_eq!(defaults, json!({"fit": "Slim"}));
        Ok(())
    }

    #[tokio::test]
    async fn test_download_keys() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = engine();
        let ctx = MetaContext::default();
        let id = create_test_product(&db, "Album").await?;

        assert_eq!(
            engine.get(&db, ctx, id, "_download_limit", true).await?,
            Intercept::PassThrough
        );

        // The limit is saved before any file exists
        let limit = engine.update(&db, ctx, id, "_download_limit", &json!("3"), None).await?;
        assert_eq!(limit, Intercept::Handled(true));
        assert_eq!(read_single(&engine, &db, id, "_download_limit").await?, json!("3"));
        assert_eq!(read_single(&engine, &db, id, "_download_expiry").await?, json!(""));

        let files = json!({
            "a": {"name": "Track", "file": "https://example.com/track.mp3"}
        });
        engine
            .update(&db, ctx, id, "_downloadable_files", &files, None)
            .await?;

        assert_eq!(read_single(&engine, &db, id, "_download_limit").await?, json!("3"));
        assert_eq!(read_single(&engine, &db, id, "_download_expiry").await?, json!("-1"));
        let stored = read_single(&engine, &db, id, "_downloadable_files").await?;
        let (file_id, entry) = stored.as_object().unwrap().iter().next().unwrap();
        assert_eq!(entry["id"], json!(file_id));
        assert_eq!(entry["name"], json!("Track"));
        let row = crate::entities::ProductDownload::find().one(&db).await?.unwrap();
        assert_eq!(row.limit, Some(3));

        engine.delete(&db, ctx, id, "_download_limit", None, false).await?;
        assert_eq!(read_single(&engine, &db, id, "_download_limit").await?, json!("-1"));
        Ok(())
    }

    #[tokio::test]
    async fn test_first_write_migrates_remaining_legacy_values() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = engine();
        let ctx = MetaContext::default();
        let id = create_test_product(&db, "Chair").await?;
        add_legacy_meta(&db, id, "_price", json!("10")).await?;
        add_legacy_meta(&db, id, "_upsell_ids", json!([7])).await?;

        // Unmigrated entities read from legacy storage, single and bulk alike
        assert_eq!(engine.get(&db, ctx, id, "_price", true).await?, Intercept::PassThrough);
        let Intercept::Handled(MetaRead::All(all)) = engine.get(&db, ctx, id, "", false).await?
        else {
            panic!("bulk read not handled");
        };
        assert_eq!(all["_price"], vec![json!("10")]);

        engine.update(&db, ctx, id, "_sku", &json!("X"), None).await?;

        assert_eq!(read_single(&engine, &db, id, "_price").await?, json!("10"));
        assert_eq!(read_single(&engine, &db, id, "_upsell_ids").await?, json!([7]));
        assert_eq!(read_single(&engine, &db, id, "_sku").await?, json!("X"));
        let Intercept::Handled(MetaRead::All(all)) = engine.get(&db, ctx, id, "", false).await?
        else {
            panic!("bulk read not handled");
        };
        assert_eq!(all["_price"], vec![json!("10")]);
        assert_eq!(legacy::count(&db, id, "_price").await?, 0);

        let report = migration::migrate_all(
            &db,
            engine.cache(),
            engine.map(),
            &CatalogSettings::default(),
            &crate::config::settings::MigrationSettings::default(),
        )
        .await?;
        assert_eq!(report.migrated, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(read_single(&engine, &db, id, "_price").await?, json!("10"));
        Ok(())
    }

    #[tokio::test]
    async fn test_unique_add_on_a_column_still_at_its_default() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = engine();
        let ctx = MetaContext::default();
        let id = create_test_product(&db, "Chair").await?;
        engine.update(&db, ctx, id, "_upsell_ids", &json!([3]), None).await?;

        let added = engine
            .add(&db, ctx, id, "_stock_status", &json!("outofstock"), true)
            .await?;
        assert_eq!(added, Intercept::Handled(true));
        let again = engine
            .add(&db, ctx, id, "_stock_status", &json!("onbackorder"), true)
            .await?;
        assert_eq!(again, Intercept::Handled(false));
        assert_eq!(read_single(&engine, &db, id, "_stock_status").await?, json!("outofstock"));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_attributes() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = engine();
        let ctx = MetaContext::default();
        let id = create_test_product(&db, "Shirt").await?;
        let local = json!({
            "material": {"name": "Material", "value": "Cotton", "position": 0,
                         "is_visible": 1, "is_variation": 0, "is_taxonomy": 0}
        });
        engine
            .update(&db, ctx, id, "_product_attributes", &local, None)
            .await?;
        db.execute_unprepared("DROP TABLE term_relationships").await?;

        let shared = json!({
            "pa_color": {"name": "pa_color", "value": "Red", "position": 0,
                         "is_visible": 1, "is_variation": 1, "is_taxonomy": 1}
        });
        let result = engine
            .update(&db, ctx, id, "_product_attributes", &shared, None)
            .await;
        assert!(result.is_err());

        let read = read_single(&engine, &db, id, "_product_attributes").await?;
        assert_eq!(read["material"]["value"], json!("Cotton"));
        assert!(read.get("pa_color").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_all_reaches_unmigrated_entities() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = engine();
        let ctx = MetaContext::default();
        let migrated = create_test_product(&db, "One").await?;
        let pending = create_test_product(&db, "Two").await?;
        engine.update(&db, ctx, migrated, "_sku", &json!("ONE"), None).await?;
        add_legacy_meta(&db, pending, "_sku", json!("TWO")).await?;

        let deleted = engine.delete(&db, ctx, 0, "_sku", None, true).await?;
        assert_eq!(deleted, Intercept::Handled(true));
        assert_eq!(read_single(&engine, &db, migrated, "_sku").await?, json!(""));
        assert_eq!(legacy::count(&db, pending, "_sku").await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_all_merges_structured_and_unmapped_keys() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = engine();
        let ctx = MetaContext::default();
        let id = create_test_product(&db, "Chair").await?;
        legacy::add(&db, id, "_edit_lock", &json!("1700000000:1"), false).await?;
        legacy::add(&db, id, "_sku", &json!("LEGACY"), false).await?;

        let Intercept::Handled(MetaRead::All(all)) = engine.get(&db, ctx, id, "", false).await?
        else {
            panic!("bulk read not handled");
        };
        assert_eq!(all["_sku"], vec![json!("LEGACY")]);

        engine.update(&db, ctx, id, "_sku", &json!("NEW"), None).await?;
        engine.update(&db, ctx, id, "_upsell_ids", &json!([5]), None).await?;
        let Intercept::Handled(MetaRead::All(all)) = engine.get(&db, ctx, id, "", false).await?
        else {
            panic!("bulk read not handled");
        };
        assert_eq!(all["_sku"], vec![json!("NEW")]);
        assert_eq!(all["_upsell_ids"], vec![json!([5])]);
        assert_eq!(all["_edit_lock"], vec![json!("1700000000:1")]);
        assert_eq!(all["_stock_status"], vec![json!("instock")]);
        assert!(!all.contains_key("_price"));
        assert!(!all.contains_key("_crosssell_ids"));
        Ok(())
    }

    #[tokio::test]
    async fn test_get_all_skips_alternate_storage_types() -> Result<()> {
        let db = setup_test_db().await?;
        let catalog = CatalogSettings {
            alternate_storage_types: vec!["external".to_string()],
            ..CatalogSettings::default()
        };
        let engine = CompatEngine::new(
            Arc::new(CompatMap::build()),
            ObjectCache::new(),
            Arc::new(catalog),
        );
        let ctx = MetaContext::default();
        let id = create_test_product(&db, "Voucher").await?;
        let external = crate::core::terms::find_or_create(&db, "product_type", "external").await?;
        crate::core::terms::set_object_terms(&db, id, "product_type", &[external.term_id]).await?;

        assert_eq!(engine.get(&db, ctx, id, "", false).await?, Intercept::PassThrough);
        assert_eq!(engine.get(&db, ctx, id, "", true).await?, Intercept::PassThrough);

        engine.update(&db, ctx, id, "_sku", &json!("GIFT"), None).await?;
        assert_eq!(engine.get(&db, ctx, id, "", false).await?, Intercept::PassThrough);
        assert_eq!(read_single(&engine, &db, id, "_sku").await?, json!("GIFT"));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_all_resets_every_entity() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = engine();
        let ctx = MetaContext::default();
        let first = create_test_product(&db, "One").await?;
        let second = create_test_product(&db, "Two").await?;

        for id in [first, second] {
            engine.update(&db, ctx, id, "_stock_status", &json!("outofstock"), None).await?;
            engine.update(&db, ctx, id, "_crosssell_ids", &json!([9]), None).await?;
        }
        let deleted = engine.delete(&db, ctx, 0, "_stock_status", None, true).await?;
        assert_eq!(deleted, Intercept::Handled(true));
        let deleted = engine.delete(&db, ctx, 0, "_crosssell_ids", None, true).await?;
        assert_eq!(deleted, Intercept::Handled(true));

        for id in [first, second] {
            assert_eq!(read_single(&engine, &db, id, "_stock_status").await?, json!("instock"));
            assert_eq!(read_single(&engine, &db, id, "_crosssell_ids").await?, json!(""));
        }
        Ok(())
    }
}
