//! Generic metadata operations for callers that still speak key-value.
//!
//! Each call is offered to the [`CompatEngine`] first and falls back to legacy
//! storage when the engine passes it through.

use crate::{
    config::settings::CatalogSettings,
    core::{
        cache::ObjectCache,
        engine::{CompatEngine, Intercept, MetaContext, MetaRead},
        entity, legacy,
        mapping::CompatMap,
        meta_value::MetaValue,
    },
    errors::Result,
};
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Metadata facade over the compatibility engine and legacy storage
#[derive(Debug, Clone)]
pub struct MetaApi {
    engine: CompatEngine,
}

impl MetaApi {
    /// Facade over an existing engine.
    #[must_use]
    pub const fn new(engine: CompatEngine) -> Self {
        Self { engine }
    }

    /// Facade with a freshly built mapping and an empty cache.
    #[must_use]
    pub fn with_catalog(catalog: CatalogSettings) -> Self {
        Self::new(CompatEngine::new(
            Arc::new(CompatMap::build()),
            ObjectCache::new(),
            Arc::new(catalog),
        ))
    }

    /// The engine calls are offered to first.
    #[must_use]
    pub const fn engine(&self) -> &CompatEngine {
        &self.engine
    }

    /// Reads `key`. An empty key with `single == false` reads every key.
    pub async fn get_meta<C>(
        &self,
        db: &C,
        ctx: MetaContext,
        entity_id: i64,
        key: &str,
        single: bool,
    ) -> Result<MetaRead>
    where
        C: ConnectionTrait,
    {
        if let Intercept::Handled(read) = self.engine.get(db, ctx, entity_id, key, single).await? {
            return Ok(read);
        }

        if key.is_empty() {
            if single {
                return Ok(MetaRead::Single(MetaValue::String(String::new())));
            }
            return Ok(MetaRead::All(legacy::get_all(db, entity_id).await?));
        }
        let values = legacy::get_values(db, entity_id, key).await?;
        Ok(if single {
            MetaRead::Single(
                values
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| MetaValue::String(String::new())),
            )
        } else {
            MetaRead::List(values)
        })
    }

    /// Every key of an entity, list-wrapped.
    pub async fn get_all_meta<C>(
        &self,
        db: &C,
        ctx: MetaContext,
        entity_id: i64,
    ) -> Result<BTreeMap<String, Vec<MetaValue>>>
    where
        C: ConnectionTrait,
    {
        match self.get_meta(db, ctx, entity_id, "", false).await? {
            MetaRead::All(all) => Ok(all),
            MetaRead::Single(_) | MetaRead::List(_) => Ok(BTreeMap::new()),
        }
    }

    /// Adds a value; with `unique`, only when the key holds none.
    pub async fn add_meta<C>(
        &self,
        db: &C,
        ctx: MetaContext,
        entity_id: i64,
        key: &str,
        value: &MetaValue,
        unique: bool,
    ) -> Result<bool>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        match self.engine.add(db, ctx, entity_id, key, value, unique).await? {
            Intercept::Handled(added) => Ok(added),
            Intercept::PassThrough => legacy::add(db, entity_id, key, value, unique).await,
        }
    }

    /// Replaces the value, gated on `prev_value` when given.
    pub async fn update_meta<C>(
        &self,
        db: &C,
        ctx: MetaContext,
        entity_id: i64,
        key: &str,
        value: &MetaValue,
        prev_value: Option<&MetaValue>,
    ) -> Result<bool>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        match self
            .engine
            .update(db, ctx, entity_id, key, value, prev_value)
            .await?
        {
            Intercept::Handled(updated) => Ok(updated),
            Intercept::PassThrough => legacy::update(db, entity_id, key, value, prev_value).await,
        }
    }

    /// Deletes the key, or with `delete_all` removes it from every entity.
    pub async fn delete_meta<C>(
        &self,
        db: &C,
        ctx: MetaContext,
        entity_id: i64,
        key: &str,
        prev_value: Option<&MetaValue>,
        delete_all: bool,
    ) -> Result<bool>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        match self
            .engine
            .delete(db, ctx, entity_id, key, prev_value, delete_all)
            .await?
        {
            Intercept::Handled(deleted) => Ok(deleted),
            Intercept::PassThrough => {
                legacy::delete(db, entity_id, key, prev_value, delete_all).await
            }
        }
    }

    /// Permanently removes the entity's structured rows.
    pub async fn delete_entity(&self, db: &DatabaseConnection, entity_id: i64) -> Result<()> {
        entity::delete_entity(db, self.engine.cache(), entity_id).await
    }
}
