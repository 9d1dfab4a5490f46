//! One-time migration of legacy product metadata into the structured tables.
//!
//! Candidates are catalog entities without a `wc_products` row. Variations run
//! after every other catalog type so their selections can resolve the parent's
//! attribute definitions. Each entity migrates inside its own transaction:
//! either every structured row is written and the legacy keys are cleaned, or
//! nothing is, and the entity is picked up again by the next run. The engine
//! runs the same per-entity step before the first structured write to an
//! entity, inside that write's transaction.

use crate::{
    config::settings::{CatalogSettings, MigrationSettings},
    core::{
        attributes,
        cache::ObjectCache,
        columns::{self, ProductField},
        downloads::{self, DownloadSetting},
        entity::{self, VARIATION_POST_TYPE},
        legacy,
        mapping::{self, CompatMap, Handler},
        meta_value::{self, MetaValue},
        product_object, relationships,
    },
    entities::{
        DownloadPermission, Post, PostModel, Product, download_permission, post, product,
        product_download,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{DatabaseConnection, QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Legacy keys a variation stores its attribute selections under start with this.
const VARIATION_SELECTION_PREFIX: &str = "attribute_";

/// Rows written for one entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigratedRows {
    /// Relationship rows inserted
    pub relationships: usize,
    /// Attribute definitions written
    pub attributes: usize,
    /// Download files written
    pub downloads: usize,
    /// Download permissions rewritten to the new file ids
    pub permissions: u64,
    /// Variation selections copied
    pub variation_values: usize,
    /// Legacy `postmeta` rows deleted
    pub legacy_rows_removed: u64,
}

/// Result of migrating one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntityOutcome {
    /// Every structured row was written and committed
    Migrated { entity_id: i64, rows: MigratedRows },
    /// The entity's transaction was rolled back
    Failed { entity_id: i64, error: String },
}

impl EntityOutcome {
    /// Id of the entity the outcome belongs to.
    #[must_use]
    pub const fn entity_id(&self) -> i64 {
        match self {
            Self::Migrated { entity_id, .. } | Self::Failed { entity_id, .. } => *entity_id,
        }
    }
}

/// Summary of a migration run
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    /// When the run began
    pub started_at: DateTime<Utc>,
    /// When the last batch finished
    pub finished_at: DateTime<Utc>,
    /// Entities committed in this run
    pub migrated: usize,
    /// Entities rolled back in this run
    pub failed: usize,
    /// Catalog entities that already had a structured row
    pub skipped: u64,
    /// One outcome per attempted entity
    pub outcomes: Vec<EntityOutcome>,
}

impl MigrationReport {
    /// Whether no entity failed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// The report itself when every entity migrated.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::MigrationFailed {
                failed: self.failed,
            })
        }
    }
}

/// Ids of entities of `post_type` that have no structured row yet.
async fn candidates<C>(db: &C, post_type: &str) -> Result<Vec<i64>>
where
    C: ConnectionTrait,
{
    Post::find()
        .select_only()
        .column(post::Column::Id)
        .filter(post::Column::PostType.eq(post_type))
        .filter(
            post::Column::Id.not_in_subquery(
                Query::select()
                    .column(product::Column::ProductId)
                    .from(Product)
                    .to_owned(),
            ),
        )
        .order_by_asc(post::Column::Id)
        .into_tuple()
        .all(db)
        .await
        .map_err(Into::into)
}

async fn already_migrated<C>(db: &C, post_types: &[&str]) -> Result<u64>
where
    C: ConnectionTrait,
{
    Post::find()
        .filter(post::Column::PostType.is_in(post_types.iter().copied()))
        .filter(
            post::Column::Id.in_subquery(
                Query::select()
                    .column(product::Column::ProductId)
                    .from(Product)
                    .to_owned(),
            ),
        )
        .count(db)
        .await
        .map_err(Into::into)
}

/// Catalog post types in migration order, variations last.
fn migration_order(catalog: &CatalogSettings) -> Vec<&str> {
    let mut post_types: Vec<&str> = Vec::new();
    for post_type in &catalog.entity_types {
        if !post_types.contains(&post_type.as_str()) {
            post_types.push(post_type);
        }
    }
    post_types.sort_by_key(|post_type| *post_type == VARIATION_POST_TYPE);
    post_types
}

/// Migrates every catalog entity that has no structured row yet.
///
/// Per-entity failures do not stop the run; they are rolled back and
/// reported in [`MigrationReport::outcomes`].
pub async fn migrate_all(
    db: &DatabaseConnection,
    cache: &ObjectCache,
    map: &CompatMap,
    catalog: &CatalogSettings,
    settings: &MigrationSettings,
) -> Result<MigrationReport> {
    let started_at = Utc::now();
    let post_types = migration_order(catalog);
    let skipped = already_migrated(db, &post_types).await?;
    let batch_size = usize::try_from(settings.batch_size.max(1)).unwrap_or(usize::MAX);

    let mut outcomes = Vec::new();
    for post_type in post_types {
        let ids = candidates(db, post_type).await?;
        info!(post_type, count = ids.len(), "migration candidates");

        for (batch, chunk) in ids.chunks(batch_size).enumerate() {
            let posts = Post::find()
                .filter(post::Column::Id.is_in(chunk.iter().copied()))
                .order_by_asc(post::Column::Id)
                .all(db)
                .await?;
            for post in &posts {
                outcomes.push(migrate_one(db, cache, map, settings, post).await);
            }
            debug!(post_type, batch, size = posts.len(), "batch done");
        }
    }

    let failed = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, EntityOutcome::Failed { .. }))
        .count();
    let report = MigrationReport {
        started_at,
        finished_at: Utc::now(),
        migrated: outcomes.len() - failed,
        failed,
        skipped,
        outcomes,
    };
    info!(
        migrated = report.migrated,
        failed = report.failed,
        skipped = report.skipped,
        "migration finished"
    );
    Ok(report)
}

/// Migrates one entity in its own transaction.
pub async fn migrate_one(
    db: &DatabaseConnection,
    cache: &ObjectCache,
    map: &CompatMap,
    settings: &MigrationSettings,
    post: &PostModel,
) -> EntityOutcome {
    let entity_id = post.id;
    let result = run_in_transaction(db, cache, map, settings, post).await;
    cache.invalidate_entity(entity_id).await;

    match result {
        Ok(rows) => {
            debug!(entity_id, ?rows, "entity migrated");
            EntityOutcome::Migrated { entity_id, rows }
        }
        Err(e) => {
            warn!(entity_id, error = %e, "entity migration rolled back");
            EntityOutcome::Failed {
                entity_id,
                error: e.to_string(),
            }
        }
    }
}

async fn run_in_transaction(
    db: &DatabaseConnection,
    cache: &ObjectCache,
    map: &CompatMap,
    settings: &MigrationSettings,
    post: &PostModel,
) -> Result<MigratedRows> {
    let txn = db.begin().await?;
    match migrate_entity(&txn, cache, map, post, settings.clean_legacy_data).await {
        Ok(rows) => {
            txn.commit().await?;
            Ok(rows)
        }
        Err(e) => {
            txn.rollback().await?;
            Err(e)
        }
    }
}

fn first<'a>(legacy: &'a BTreeMap<String, Vec<MetaValue>>, key: &str) -> Option<&'a MetaValue> {
    legacy.get(key).and_then(|values| values.first())
}

/// Moves one entity's legacy metadata into the structured tables on `db`,
/// removing the mapped legacy keys when `clean_legacy` is set. Callers own the
/// transaction.
pub async fn migrate_entity<C>(
    db: &C,
    cache: &ObjectCache,
    map: &CompatMap,
    post: &PostModel,
    clean_legacy: bool,
) -> Result<MigratedRows>
where
    C: ConnectionTrait,
{
    let entity_id = post.id;
    let legacy = legacy::get_all(db, entity_id).await?;
    let mut rows = MigratedRows::default();
    let limit = first(&legacy, "_download_limit").and_then(DownloadSetting::parse);
    let expires = first(&legacy, "_download_expiry").and_then(DownloadSetting::parse);

    // (a) product row
    let product_type = entity::legacy_product_type(db, post).await?;
    let mut row = product::Model::empty(entity_id, &product_type);
    for field in ProductField::ALL {
        let Some(value) = map.key_for_field(field).and_then(|key| first(&legacy, key)) else {
            continue;
        };
        field.write(&mut row, mapping::column_value(field, value));
    }
    row.download_limit = limit;
    row.download_expiry = expires;
    columns::upsert_row(db, row).await?;

    // (b) downloads, with the per-product settings carried onto every file
    let files = first(&legacy, "_downloadable_files")
        .map(downloads::decode_files)
        .unwrap_or_default();
    for (index, file) in files.iter().enumerate() {
        let stored = product_download::ActiveModel {
            product_id: Set(entity_id),
            name: Set(file.name.clone()),
            file: Set(file.file.clone()),
            priority: Set(index as i64 + 1),
            limit: Set(limit),
            expires: Set(expires),
            ..Default::default()
        }
        .insert(db)
        .await?;
        rows.downloads += 1;

        let repointed = DownloadPermission::update_many()
            .col_expr(
                download_permission::Column::DownloadId,
                Expr::value(stored.download_id.to_string()),
            )
            .filter(download_permission::Column::ProductId.eq(entity_id))
            .filter(download_permission::Column::DownloadId.eq(file.id.clone()))
            .exec(db)
            .await?;
        rows.permissions += repointed.rows_affected;
    }

    // (c, d) grouped children, upsells, cross-sells and gallery images
    for mapping in map.iter() {
        let Handler::Relationship { kind, .. } = mapping.handler else {
            continue;
        };
        let ids = first(&legacy, mapping.key)
            .map(meta_value::as_id_list)
            .unwrap_or_default();
        rows.relationships += relationships::insert_sequential(db, entity_id, kind, &ids).await?;
    }

    // (e) attribute definitions and values
    let attribute_map = first(&legacy, "_product_attributes")
        .map(attributes::decode_attribute_map)
        .unwrap_or_default();
    if !attribute_map.is_empty() {
        let defaults = first(&legacy, "_default_attributes")
            .map(attributes::decode_default_map)
            .unwrap_or_default();
        let resolved = attributes::resolve_attributes(db, entity_id, &attribute_map).await?;
        product_object::save_attributes(db, cache, entity_id, &resolved, Some(&defaults)).await?;
        rows.attributes = resolved.len();
    }

    // (f) variation selections
    if post.post_type == VARIATION_POST_TYPE && post.post_parent > 0 {
        let selections: BTreeMap<String, String> = legacy
            .iter()
            .filter(|(key, _)| key.starts_with(VARIATION_SELECTION_PREFIX))
            .filter_map(|(key, values)| {
                values
                    .first()
                    .and_then(meta_value::as_text)
                    .map(|value| (key.clone(), value))
            })
            .collect();
        rows.variation_values = product_object::save_variation_attributes(
            db,
            entity_id,
            post.post_parent,
            &selections,
        )
        .await?;
    }

    if clean_legacy {
        let keys: Vec<&str> = map.keys().collect();
        rows.legacy_rows_removed = legacy::delete_keys(db, entity_id, &keys).await?;
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::terms;
    use crate::entities::{ProductDownload, ProductRelationship, VariationAttributeValue};
    use crate::test_utils::*;
    use sea_orm::ConnectionTrait;
    use serde_json::json;

    async fn run(
        db: &DatabaseConnection,
        cache: &ObjectCache,
        settings: &MigrationSettings,
    ) -> Result<MigrationReport> {
        migrate_all(db, cache, &CompatMap::build(), &CatalogSettings::default(), settings).await
    }

    #[tokio::test]
    async fn test_failed_entity_is_rolled_back_and_reported() -> Result<()> {
        let db = setup_test_db().await?;
        let cache = ObjectCache::new();
        let plain = create_test_product(&db, "Plain").await?;
        add_legacy_meta(&db, plain, "_sku", json!("PLAIN")).await?;
        let album = create_test_product(&db, "Album").await?;
        add_legacy_meta(&db, album, "_sku", json!("ALBUM")).await?;
        add_legacy_meta(
            &db,
            album,
            "_downloadable_files",
            json!({"k1": {"name": "Track", "file": "https://example.com/t.mp3"}}),
        )
        .await?;
        db.execute_unprepared("DROP TABLE download_permissions").await?;

        let report = run(&db, &cache, &MigrationSettings::default()).await?;

        assert_eq!(report.migrated, 1);
        assert_eq!(report.failed, 1);
        assert!(!report.is_success());
        let failed: Vec<i64> = report
            .outcomes
            .iter()
            .filter(|o| matches!(o, EntityOutcome::Failed { .. }))
            .map(EntityOutcome::entity_id)
            .collect();
        assert_eq!(failed, vec![album]);
        assert!(Product::find_by_id(album).one(&db).await?.is_none());
        assert_eq!(ProductDownload::find().count(&db).await?, 0);
        assert_eq!(legacy::count(&db, album, "_sku").await?, 1);
        assert!(matches!(
            report.into_result(),
            Err(Error::MigrationFailed { failed: 1 })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_variation_selections_and_type() -> Result<()> {
        let db = setup_test_db().await?;
        let cache = ObjectCache::new();
        let parent = create_test_product(&db, "Shirt").await?;
        add_legacy_meta(
            &db,
            parent,
            "_product_attributes",
            json!({
                "size": {
                    "name": "Size",
                    "value": "S | M | L",
                    "position": 0,
                    "is_visible": 1,
                    "is_variation": 1,
                    "is_taxonomy": 0
                }
            }),
        )
        .await?;
        add_legacy_meta(&db, parent, "_default_attributes", json!({"size": "M"})).await?;
        let variation = create_test_variation(&db, parent, "Shirt - M").await?;
        add_legacy_meta(&db, variation, "attribute_size", json!("M")).await?;
        add_legacy_meta(&db, variation, "_price", json!("12")).await?;

        let report = run(&db, &cache, &MigrationSettings::default()).await?;
        assert_eq!(report.migrated, 2);
        assert_eq!(report.outcomes[0].entity_id(), parent);

        let row = Product::find_by_id(variation).one(&db).await?.unwrap();
        assert_eq!(row.product_type, "variation");
        assert_eq!(row.price, Some(12.0));
        let selections = VariationAttributeValue::find().all(&db).await?;
        assert_eq!(selections.len(), 1);
        assert_eq!(selections[0].value, "M");
        // selections stay readable through legacy storage
        assert_eq!(legacy::count(&db, variation, "attribute_size").await?, 1);

        let defaults = attributes::get_default_attributes(&db, &cache, parent).await?;
        assert_eq!(defaults["size"], "M");
        Ok(())
    }

    #[tokio::test]
    async fn test_small_batches_and_product_type_term() -> Result<()> {
        let db = setup_test_db().await?;
        let cache = ObjectCache::new();
        let mut ids = Vec::new();
        for name in ["A", "B", "C"] {
            let id = create_test_product(&db, name).await?;
            add_legacy_meta(&db, id, "_children", json!([100, 101])).await?;
            ids.push(id);
        }
        let grouped = terms::find_or_create(&db, entity::PRODUCT_TYPE_TAXONOMY, "grouped").await?;
        terms::set_object_terms(&db, ids[0], entity::PRODUCT_TYPE_TAXONOMY, &[grouped.term_id])
            .await?;

        let settings = MigrationSettings {
            batch_size: 2,
            clean_legacy_data: false,
        };
        let report = run(&db, &cache, &settings).await?;
        assert_eq!(report.migrated, 3);
        assert_eq!(ProductRelationship::find().count(&db).await?, 6);
        assert_eq!(
            Product::find_by_id(ids[0]).one(&db).await?.unwrap().product_type,
            "grouped"
        );
        // cleaning disabled
        assert_eq!(legacy::count(&db, ids[1], "_children").await?, 1);

        let again = run(&db, &cache, &settings).await?;
        assert_eq!(again.migrated, 0);
        assert_eq!(again.skipped, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_only_configured_entity_types_migrate() -> Result<()> {
        let db = setup_test_db().await?;
        let cache = ObjectCache::new();
        let shirt = create_test_product(&db, "Shirt").await?;
        let variation = create_test_variation(&db, shirt, "Shirt - M").await?;
        let bundle = create_test_post(&db, "bundle", "Gift set").await?;
        for id in [shirt, variation, bundle] {
            add_legacy_meta(&db, id, "_sku", json!(format!("SKU-{id}"))).await?;
        }

        let catalog = CatalogSettings {
            entity_types: vec!["product_variation".to_string(), "bundle".to_string()],
            ..CatalogSettings::default()
        };
        assert_eq!(migration_order(&catalog), vec!["bundle", "product_variation"]);

        let report = migrate_all(
            &db,
            &cache,
            &CompatMap::build(),
            &catalog,
            &MigrationSettings::default(),
        )
        .await?;
        assert_eq!(report.migrated, 2);
        assert_eq!(report.outcomes[0].entity_id(), bundle);
        assert!(Product::find_by_id(shirt).one(&db).await?.is_none());
        assert_eq!(Product::find_by_id(bundle).one(&db).await?.unwrap().sku, format!("SKU-{bundle}"));
        assert_eq!(legacy::count(&db, shirt, "_sku").await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_download_settings_kept_for_later_files() -> Result<()> {
        let db = setup_test_db().await?;
        let cache = ObjectCache::new();
        let id = create_test_product(&db, "Album").await?;
        add_legacy_meta(&db, id, "_download_limit", json!("4")).await?;
        add_legacy_meta(&db, id, "_download_expiry", json!("30")).await?;

        run(&db, &cache, &MigrationSettings::default()).await?;

        let row = Product::find_by_id(id).one(&db).await?.unwrap();
        assert_eq!(row.download_limit, Some(4));
        assert_eq!(row.download_expiry, Some(30));
        assert_eq!(legacy::count(&db, id, "_download_limit").await?, 0);
        Ok(())
    }
}
