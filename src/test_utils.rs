//! Shared test utilities.
//!
//! This module provides helpers for setting up in-memory test databases and
//! seeding registry posts and legacy metadata with sensible defaults.

use crate::{
    core::{legacy, meta_value::MetaValue},
    entities::{ProductRelationship, post, product_relationship},
    errors::Result,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a registry post of any type. Returns its id.
pub async fn create_test_post(db: &DatabaseConnection, post_type: &str, title: &str) -> Result<i64> {
    let post = post::ActiveModel {
        post_type: Set(post_type.to_string()),
        post_parent: Set(0),
        post_title: Set(title.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(post.id)
}

/// Creates a top-level product with no metadata. Returns its id.
pub async fn create_test_product(db: &DatabaseConnection, title: &str) -> Result<i64> {
    create_test_post(db, "product", title).await
}

/// Creates a variation of `parent_id`. Returns its id.
pub async fn create_test_variation(
    db: &DatabaseConnection,
    parent_id: i64,
    title: &str,
) -> Result<i64> {
    let post = post::ActiveModel {
        post_type: Set("product_variation".to_string()),
        post_parent: Set(parent_id),
        post_title: Set(title.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(post.id)
}

/// Writes a value straight into legacy storage.
pub async fn add_legacy_meta(
    db: &DatabaseConnection,
    entity_id: i64,
    key: &str,
    value: MetaValue,
) -> Result<()> {
    legacy::add(db, entity_id, key, &value, false).await?;
    Ok(())
}

/// `(object_id, priority)` pairs of one relationship type, in priority order.
pub async fn relationship_rows(
    db: &DatabaseConnection,
    entity_id: i64,
    relationship_type: &str,
) -> Result<Vec<(i64, i64)>> {
    ProductRelationship::find()
        .select_only()
        .column(product_relationship::Column::ObjectId)
        .column(product_relationship::Column::Priority)
        .filter(product_relationship::Column::ProductId.eq(entity_id))
        .filter(product_relationship::Column::RelationshipType.eq(relationship_type))
        .order_by_asc(product_relationship::Column::Priority)
        .into_tuple()
        .all(db)
        .await
        .map_err(Into::into)
}
