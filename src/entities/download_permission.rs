//! Download permission granted to a customer order.
//!
//! `download_id` holds the legacy file key before migration and the structured
//! download id (as text) afterwards.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Download permission database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "download_permissions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub permission_id: i64,
    pub download_id: String,
    pub product_id: i64,
    pub order_id: i64,
    /// Remaining downloads, NULL for unlimited
    pub downloads_remaining: Option<i64>,
    pub access_expires: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
