//! Catalog entity resolution and removal.

use crate::{
    core::cache::{CacheKey, CachedValue, ObjectCache},
    core::{columns, terms},
    entities::{
        Post, PostModel, Product, ProductAttribute, ProductAttributeValue, ProductDownload,
        ProductRelationship, VariationAttributeValue, product_attribute, product_attribute_value,
        product_download, product_relationship, variation_attribute_value,
    },
    errors::Result,
};
use sea_orm::{TransactionTrait, prelude::*};
use tracing::info;

/// Post type of product variations.
pub const VARIATION_POST_TYPE: &str = "product_variation";

/// Taxonomy holding the legacy product type term.
pub const PRODUCT_TYPE_TAXONOMY: &str = "product_type";

/// Registry row of an entity, through the cache.
pub async fn find<C>(db: &C, cache: &ObjectCache, entity_id: i64) -> Result<Option<PostModel>>
where
    C: ConnectionTrait,
{
    if entity_id <= 0 {
        return Ok(None);
    }
    if let Some(CachedValue::Entity(post)) = cache.get(&CacheKey::Entity(entity_id)).await {
        return Ok(post);
    }
    let post = Post::find_by_id(entity_id).one(db).await?;
    cache
        .set(CacheKey::Entity(entity_id), CachedValue::Entity(post.clone()))
        .await;
    Ok(post)
}

/// Product type of an entity: the structured row's discriminator once
/// migrated, otherwise the legacy type.
pub async fn product_type<C>(db: &C, cache: &ObjectCache, post: &PostModel) -> Result<String>
where
    C: ConnectionTrait,
{
    if post.post_type == VARIATION_POST_TYPE {
        return Ok("variation".to_string());
    }
    if let Some(row) = columns::load_row(db, cache, post.id).await? {
        return Ok(row.product_type);
    }
    legacy_product_type(db, post).await
}

/// Type of an entity from legacy storage: `variation` for variations, the
/// `product_type` term otherwise, `simple` without one.
pub async fn legacy_product_type<C>(db: &C, post: &PostModel) -> Result<String>
where
    C: ConnectionTrait,
{
    if post.post_type == VARIATION_POST_TYPE {
        return Ok("variation".to_string());
    }
    Ok(terms::object_terms(db, post.id, PRODUCT_TYPE_TAXONOMY)
        .await?
        .into_iter()
        .next()
        .map_or_else(|| "simple".to_string(), |term| term.slug))
}

/// [`legacy_product_type`] by id; `simple` for ids missing from the registry.
pub async fn legacy_product_type_of<C>(db: &C, entity_id: i64) -> Result<String>
where
    C: ConnectionTrait,
{
    match Post::find_by_id(entity_id).one(db).await? {
        Some(post) => legacy_product_type(db, &post).await,
        None => Ok("simple".to_string()),
    }
}

/// Deletes every structured row of an entity in one transaction, then drops
/// its cache entries. Legacy rows are left to the hosting application.
pub async fn delete_entity(db: &DatabaseConnection, cache: &ObjectCache, entity_id: i64) -> Result<()> {
    let txn = db.begin().await?;

    Product::delete_by_id(entity_id).exec(&txn).await?;
    ProductRelationship::delete_many()
        .filter(product_relationship::Column::ProductId.eq(entity_id))
        .exec(&txn)
        .await?;
    ProductAttributeValue::delete_many()
        .filter(product_attribute_value::Column::ProductId.eq(entity_id))
        .exec(&txn)
        .await?;
    ProductAttribute::delete_many()
        .filter(product_attribute::Column::ProductId.eq(entity_id))
        .exec(&txn)
        .await?;
    ProductDownload::delete_many()
        .filter(product_download::Column::ProductId.eq(entity_id))
        .exec(&txn)
        .await?;
    VariationAttributeValue::delete_many()
        .filter(variation_attribute_value::Column::ProductId.eq(entity_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;
    cache.invalidate_entity(entity_id).await;
    info!(entity_id, "structured rows deleted");
    Ok(())
}
