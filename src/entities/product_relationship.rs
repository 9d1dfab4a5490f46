//! Product relationship - ordered link between a product and a related id.
//!
//! One table holds upsells, cross-sells, grouped children and gallery images,
//! told apart by `relationship_type`. (`type`, `product_id`, `object_id`) is unique.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Relationship database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "wc_product_relationships")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub relationship_id: i64,
    /// Relationship tag, see `core::relationships::RelationshipType`
    #[sea_orm(column_name = "type")]
    pub relationship_type: String,
    /// Owning product
    pub product_id: i64,
    /// Linked product or attachment id
    pub object_id: i64,
    /// Position within the (`type`, `product_id`) group, ascending
    pub priority: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
