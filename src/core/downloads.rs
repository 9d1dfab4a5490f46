//! Download store - downloadable files owned by a product.
//!
//! A saved list is diffed by download id: rows missing from the list are
//! deleted, the rest are updated or inserted with priorities starting at 1.
//! The per-product limit and expiry live on every file and on the product row,
//! which hands them to files added later.

use crate::{
    core::cache::{CacheKey, CachedValue, ObjectCache},
    core::columns,
    core::meta_value::{self, MetaValue},
    entities::{Product, ProductDownload, ProductDownloadModel, product, product_download},
    errors::Result,
};
use sea_orm::sea_query::Expr;
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// A downloadable file in legacy shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadFile {
    /// Structured download id as text, or a legacy file key before migration
    #[serde(default)]
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// File URL
    #[serde(default)]
    pub file: String,
}

/// Decodes a legacy `_downloadable_files` value (`key -> {id, name, file}`).
/// Entries without a file are dropped; a missing `id` takes the map key.
#[must_use]
pub fn decode_files(value: &MetaValue) -> Vec<DownloadFile> {
    let Value::Object(map) = value else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(key, entry)| {
            let mut file: DownloadFile = serde_json::from_value(entry.clone()).ok()?;
            if file.id.is_empty() {
                file.id.clone_from(key);
            }
            (!file.file.is_empty()).then_some(file)
        })
        .collect()
}

/// Encodes files back into the legacy map shape.
#[must_use]
pub fn encode_files(files: &[DownloadFile]) -> MetaValue {
    Value::Object(
        files
            .iter()
            .map(|file| (file.id.clone(), serde_json::json!(file)))
            .collect(),
    )
}

/// Download rows of an entity in priority order, through the cache.
pub async fn rows<C>(db: &C, cache: &ObjectCache, entity_id: i64) -> Result<Vec<ProductDownloadModel>>
where
    C: ConnectionTrait,
{
    if entity_id <= 0 {
        return Ok(Vec::new());
    }
    if let Some(CachedValue::Downloads(rows)) = cache.get(&CacheKey::Downloads(entity_id)).await {
        return Ok(rows);
    }
    let rows = stored_rows(db, entity_id).await?;
    cache
        .set(CacheKey::Downloads(entity_id), CachedValue::Downloads(rows.clone()))
        .await;
    Ok(rows)
}

async fn stored_rows<C>(db: &C, entity_id: i64) -> Result<Vec<ProductDownloadModel>>
where
    C: ConnectionTrait,
{
    ProductDownload::find()
        .filter(product_download::Column::ProductId.eq(entity_id))
        .order_by_asc(product_download::Column::Priority)
        .all(db)
        .await
        .map_err(Into::into)
}

/// The entity's files in legacy shape.
pub async fn get_files<C>(db: &C, cache: &ObjectCache, entity_id: i64) -> Result<Vec<DownloadFile>>
where
    C: ConnectionTrait,
{
    Ok(rows(db, cache, entity_id)
        .await?
        .into_iter()
        .map(|row| DownloadFile {
            id: row.download_id.to_string(),
            name: row.name,
            file: row.file,
        })
        .collect())
}

/// Replaces the entity's files. Files whose id matches an existing download
/// keep that id. Returns the stored rows in list order.
pub async fn set_files<C>(
    db: &C,
    cache: &ObjectCache,
    entity_id: i64,
    files: &[DownloadFile],
) -> Result<Vec<ProductDownloadModel>>
where
    C: ConnectionTrait,
{
    if entity_id <= 0 {
        return Ok(Vec::new());
    }
    let existing = stored_rows(db, entity_id).await?;
    let (limit, expires) = match existing.first() {
        Some(row) => (row.limit, row.expires),
        None => Product::find_by_id(entity_id)
            .one(db)
            .await?
            .map_or((None, None), |row| (row.download_limit, row.download_expiry)),
    };

    let kept: Vec<i64> = files
        .iter()
        .filter_map(|file| file.id.parse::<i64>().ok())
        .filter(|id| existing.iter().any(|row| row.download_id == *id))
        .collect();
    let removed: Vec<i64> = existing
        .iter()
        .map(|row| row.download_id)
        .filter(|id| !kept.contains(id))
        .collect();
    if !removed.is_empty() {
        ProductDownload::delete_many()
            .filter(product_download::Column::DownloadId.is_in(removed.clone()))
            .exec(db)
            .await?;
    }

    let mut stored = Vec::with_capacity(files.len());
    for (index, file) in files.iter().enumerate() {
        let priority = index as i64 + 1;
        let existing_id = file
            .id
            .parse::<i64>()
            .ok()
            .filter(|id| kept.contains(id));
        let row = if let Some(download_id) = existing_id {
            product_download::ActiveModel {
                download_id: Set(download_id),
                product_id: Set(entity_id),
                name: Set(file.name.clone()),
                file: Set(file.file.clone()),
                priority: Set(priority),
                limit: Set(limit),
                expires: Set(expires),
            }
            .update(db)
            .await?
        } else {
            product_download::ActiveModel {
                product_id: Set(entity_id),
                name: Set(file.name.clone()),
                file: Set(file.file.clone()),
                priority: Set(priority),
                limit: Set(limit),
                expires: Set(expires),
                ..Default::default()
            }
            .insert(db)
            .await?
        };
        stored.push(row);
    }

    cache.invalidate(&[CacheKey::Downloads(entity_id)]).await;
    debug!(entity_id, files = stored.len(), removed = removed.len(), "downloads saved");
    Ok(stored)
}

/// Which per-file setting a legacy per-product key addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadSetting {
    /// `_download_limit`
    Limit,
    /// `_download_expiry`
    Expiry,
}

impl DownloadSetting {
    const fn column(self) -> product_download::Column {
        match self {
            Self::Limit => product_download::Column::Limit,
            Self::Expiry => product_download::Column::Expires,
        }
    }

    const fn product_column(self) -> product::Column {
        match self {
            Self::Limit => product::Column::DownloadLimit,
            Self::Expiry => product::Column::DownloadExpiry,
        }
    }

    /// Parses a legacy setting value; `-1` and empty mean "unlimited".
    #[must_use]
    pub fn parse(value: &MetaValue) -> Option<i64> {
        meta_value::as_i64(value).filter(|v| *v >= 0)
    }
}

/// The setting of the entity's first file, or the product's setting for files
/// not added yet. `None` when neither is stored.
pub async fn get_setting<C>(
    db: &C,
    cache: &ObjectCache,
    entity_id: i64,
    setting: DownloadSetting,
) -> Result<Option<Option<i64>>>
where
    C: ConnectionTrait,
{
    if let Some(row) = rows(db, cache, entity_id).await?.first() {
        return Ok(Some(match setting {
            DownloadSetting::Limit => row.limit,
            DownloadSetting::Expiry => row.expires,
        }));
    }
    Ok(columns::load_row(db, cache, entity_id)
        .await?
        .and_then(|row| match setting {
            DownloadSetting::Limit => row.download_limit,
            DownloadSetting::Expiry => row.download_expiry,
        })
        .map(Some))
}

/// Applies a setting to every file of the entity and to the product row.
pub async fn set_setting<C>(
    db: &C,
    cache: &ObjectCache,
    entity_id: i64,
    setting: DownloadSetting,
    value: Option<i64>,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    if entity_id <= 0 {
        return Ok(false);
    }
    let files = ProductDownload::update_many()
        .col_expr(setting.column(), Expr::value(value))
        .filter(product_download::Column::ProductId.eq(entity_id))
        .exec(db)
        .await?;
    let product = Product::update_many()
        .col_expr(setting.product_column(), Expr::value(value))
        .filter(product::Column::ProductId.eq(entity_id))
        .exec(db)
        .await?;
    cache
        .invalidate(&[CacheKey::Downloads(entity_id), CacheKey::Product(entity_id)])
        .await;
    debug!(entity_id, ?setting, ?value, files = files.rows_affected, "download setting saved");
    Ok(files.rows_affected + product.rows_affected > 0)
}
