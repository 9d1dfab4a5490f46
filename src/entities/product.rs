//! Product row - one wide row of scalar catalog fields per product or variation.
//!
//! An absent row means the entity has not been migrated yet. Nullable numeric
//! columns are `Option`s; integer-format columns are never NULL and store 0 instead.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Structured product database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "wc_products")]
pub struct Model {
    /// Entity id shared with the `posts` registry
    #[sea_orm(primary_key, auto_increment = false)]
    pub product_id: i64,
    /// Stock keeping unit, empty when unset
    pub sku: String,
    /// Attachment id of the main image, 0 when unset
    pub image_id: i64,
    pub height: Option<f64>,
    pub width: Option<f64>,
    pub length: Option<f64>,
    pub weight: Option<f64>,
    /// Units in stock, NULL when stock is not managed
    pub stock_quantity: Option<f64>,
    /// Type discriminator (`simple`, `variable`, `grouped`, `external`, `variation`)
    #[sea_orm(column_name = "type")]
    pub product_type: String,
    #[sea_orm(column_name = "virtual")]
    pub is_virtual: bool,
    pub downloadable: bool,
    pub tax_class: String,
    pub tax_status: String,
    pub total_sales: i64,
    pub price: Option<f64>,
    pub regular_price: Option<f64>,
    pub sale_price: Option<f64>,
    /// Unix timestamp of the sale start
    pub date_on_sale_from: Option<i64>,
    /// Unix timestamp of the sale end
    pub date_on_sale_to: Option<i64>,
    pub average_rating: f64,
    /// `instock`, `outofstock` or `onbackorder`
    pub stock_status: String,
    /// Limit given to files added later, NULL for unlimited
    pub download_limit: Option<i64>,
    /// Expiry given to files added later, NULL for never
    pub download_expiry: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A row holding only default values for an entity of `product_type`.
    #[must_use]
    pub fn empty(product_id: i64, product_type: &str) -> Self {
        Self {
            product_id,
            sku: String::new(),
            image_id: 0,
            height: None,
            width: None,
            length: None,
            weight: None,
            stock_quantity: None,
            product_type: product_type.to_string(),
            is_virtual: false,
            downloadable: false,
            tax_class: String::new(),
            tax_status: "taxable".to_string(),
            total_sales: 0,
            price: None,
            regular_price: None,
            sale_price: None,
            date_on_sale_from: None,
            date_on_sale_to: None,
            average_rating: 0.0,
            stock_status: "instock".to_string(),
            download_limit: None,
            download_expiry: None,
        }
    }
}

impl Model {
    /// Active model with every column `Set`, ready for an insert or upsert.
    #[must_use]
    pub fn into_insertable(self) -> ActiveModel {
        use sea_orm::Set;
        let model = self;
        ActiveModel {
            product_id: Set(model.product_id),
            sku: Set(model.sku),
            image_id: Set(model.image_id),
            height: Set(model.height),
            width: Set(model.width),
            length: Set(model.length),
            weight: Set(model.weight),
            stock_quantity: Set(model.stock_quantity),
            product_type: Set(model.product_type),
            is_virtual: Set(model.is_virtual),
            downloadable: Set(model.downloadable),
            tax_class: Set(model.tax_class),
            tax_status: Set(model.tax_status),
            total_sales: Set(model.total_sales),
            price: Set(model.price),
            regular_price: Set(model.regular_price),
            sale_price: Set(model.sale_price),
            date_on_sale_from: Set(model.date_on_sale_from),
            date_on_sale_to: Set(model.date_on_sale_to),
            average_rating: Set(model.average_rating),
            stock_status: Set(model.stock_status),
            download_limit: Set(model.download_limit),
            download_expiry: Set(model.download_expiry),
        }
    }
}
