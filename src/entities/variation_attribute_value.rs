//! Variation attribute selection - the value a variation picks for one of
//! its parent's variation attributes.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Variation attribute value database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "wc_product_variation_attribute_values")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub variation_attribute_value_id: i64,
    /// The variation
    pub product_id: i64,
    /// Selected value, empty for "any"
    pub value: String,
    /// Attribute definition on the parent product
    pub product_attribute_id: i64,
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
