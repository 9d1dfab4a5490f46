//! Downloadable file owned by a product.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Download database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "wc_product_downloads")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub download_id: i64,
    pub product_id: i64,
    pub name: String,
    /// File URL or path
    pub file: String,
    /// Position in the product's download list, starting at 1
    pub priority: i64,
    /// Number of times the file may be downloaded, NULL for unlimited
    pub limit: Option<i64>,
    /// Days until access expires, NULL for never
    pub expires: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
