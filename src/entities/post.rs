//! Post - the generic entity registry the catalog lives in.
//!
//! Only the columns the compatibility layer needs to resolve an entity are
//! modelled here.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Post database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "posts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Entity type, e.g. `product` or `product_variation`
    pub post_type: String,
    /// Parent entity id, 0 for top-level entities
    pub post_parent: i64,
    pub post_title: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::post_meta::Entity")]
    Meta,
}

impl Related<super::post_meta::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Meta.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
