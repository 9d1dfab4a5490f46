//! Shared taxonomy term, reusable across products.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Taxonomy term database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "terms")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub term_id: i64,
    /// Taxonomy name, e.g. `pa_color` or `product_type`
    pub taxonomy: String,
    pub name: String,
    pub slug: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
