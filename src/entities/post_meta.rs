//! Post meta - the legacy key-value metadata table.
//!
//! Values are text; complex values are serialized (see `core::meta_value`).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Legacy metadata row
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "postmeta")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub meta_id: i64,
    pub post_id: i64,
    pub meta_key: String,
    pub meta_value: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::post::Entity",
        from = "Column::PostId",
        to = "super::post::Column::Id"
    )]
    Post,
}

impl Related<super::post::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Post.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
