//! Product attribute definition - one named attribute attached to a product.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Attribute definition database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "wc_product_attributes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub product_attribute_id: i64,
    pub product_id: i64,
    /// Display name, or the taxonomy name (`pa_color`) for shared attributes
    pub name: String,
    /// Key the attribute is addressed by in legacy maps
    pub slug: String,
    pub is_visible: bool,
    pub is_variation: bool,
    pub priority: i64,
    /// Shared taxonomy id from `attribute_taxonomies`, 0 for local attributes
    pub attribute_id: i64,
}

/// Attribute definitions own their values
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::product_attribute_value::Entity")]
    Values,
}

impl Related<super::product_attribute_value::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Values.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the attribute is backed by shared taxonomy terms.
    #[must_use]
    pub const fn is_taxonomy(&self) -> bool {
        self.attribute_id != 0
    }
}
