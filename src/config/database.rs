//! Database configuration module.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs. The only hand-written DDL is the
//! natural-key index that relationship upserts rely on.

use crate::entities::{
    AttributeTaxonomy, DownloadPermission, Post, PostMeta, Product, ProductAttribute,
    ProductAttributeValue, ProductDownload, ProductRelationship, Term, TermRelationship,
    VariationAttributeValue, product_relationship,
};
use crate::errors::Result;
use sea_orm::sea_query::{Index, TableCreateStatement};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::debug;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/catalog.sqlite?mode=rwc";

/// Name of the unique (`type`, `product_id`, `object_id`) index.
pub const RELATIONSHIP_NATURAL_KEY_INDEX: &str = "idx_relationships_natural_key";

/// Gets the database URL from environment variable or returns default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
///
/// Falls back to a default local `SQLite` file if no environment variable is set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    connect(&get_database_url()).await
}

/// Connects to an explicit database URL.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection> {
    debug!("Connecting to {}", database_url);
    Database::connect(database_url).await.map_err(Into::into)
}

fn table_for<E: EntityTrait>(schema: &Schema, entity: E) -> TableCreateStatement {
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    statement
}

/// Creates every legacy and structured table, skipping the ones that already exist.
pub async fn create_tables<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let tables = [
        table_for(&schema, Post),
        table_for(&schema, PostMeta),
        table_for(&schema, Term),
        table_for(&schema, TermRelationship),
        table_for(&schema, AttributeTaxonomy),
        table_for(&schema, DownloadPermission),
        table_for(&schema, Product),
        table_for(&schema, ProductRelationship),
        table_for(&schema, ProductAttribute),
        table_for(&schema, ProductAttributeValue),
        table_for(&schema, ProductDownload),
        table_for(&schema, VariationAttributeValue),
    ];

    for table in &tables {
        db.execute(builder.build(table)).await?;
    }

    let natural_key = Index::create()
        .name(RELATIONSHIP_NATURAL_KEY_INDEX)
        .table(ProductRelationship)
        .col(product_relationship::Column::RelationshipType)
        .col(product_relationship::Column::ProductId)
        .col(product_relationship::Column::ObjectId)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&natural_key)).await?;

    let by_object = Index::create()
        .name("idx_relationships_object")
        .table(ProductRelationship)
        .col(product_relationship::Column::ObjectId)
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&by_object)).await?;

    Ok(())
}
