//! Product attribute value - one value of an attribute definition.
//!
//! Taxonomy-backed values store the term id as text, local values store the
//! trimmed free text.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Attribute value database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "wc_product_attribute_values")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub attribute_value_id: i64,
    pub product_id: i64,
    pub product_attribute_id: i64,
    pub value: String,
    pub priority: i64,
    /// Set on the value chosen as the product's default selection
    pub is_default: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product_attribute::Entity",
        from = "Column::ProductAttributeId",
        to = "super::product_attribute::Column::ProductAttributeId"
    )]
    Attribute,
}

impl Related<super::product_attribute::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Attribute.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
