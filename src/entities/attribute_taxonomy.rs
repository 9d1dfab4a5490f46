//! Registered shared attribute. `attribute_name` `color` backs the `pa_color` taxonomy.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Attribute taxonomy database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "attribute_taxonomies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub attribute_id: i64,
    #[sea_orm(unique)]
    pub attribute_name: String,
    pub attribute_label: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
