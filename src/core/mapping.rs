//! Compatibility mapping - legacy metadata keys and the store that owns each.
//!
//! The map is built once at startup and shared behind an `Arc`. Every entry
//! carries a typed [`Handler`]; the engine dispatches on it with a `match`.

use crate::core::{
    columns::{ColumnFormat, ColumnValue, ProductField},
    downloads::DownloadSetting,
    meta_value::{self, MetaValue},
    relationships::RelationshipType,
};
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;

/// How a relationship list is shaped in legacy storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListShape {
    /// A serialized array of ids
    Array,
    /// A comma-joined id string
    CommaSeparated,
}

/// The store operation behind a legacy key
#[derive(Debug, Clone, PartialEq)]
pub enum Handler {
    /// One `wc_products` column
    Column {
        /// Column the key is stored in
        field: ProductField,
        /// Value written on delete
        delete_value: ColumnValue,
    },
    /// An ordered id list in `wc_product_relationships`
    Relationship {
        /// Relationship type of the rows
        kind: RelationshipType,
        /// Legacy encoding of the list
        shape: ListShape,
    },
    /// The `slug -> descriptor` attribute map
    Attributes,
    /// Default selections as `slug -> value`
    DefaultAttributes,
    /// The downloadable file list
    Downloads,
    /// Limit or expiry shared by every file
    DownloadSetting(DownloadSetting),
}

/// One mapped legacy key
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    /// Legacy metadata key
    pub key: &'static str,
    /// Store that owns the key
    pub handler: Handler,
}

impl FieldMapping {
    const fn column(key: &'static str, field: ProductField, delete_value: ColumnValue) -> Self {
        Self {
            key,
            handler: Handler::Column {
                field,
                delete_value,
            },
        }
    }

    const fn relationship(key: &'static str, kind: RelationshipType, shape: ListShape) -> Self {
        Self {
            key,
            handler: Handler::Relationship { kind, shape },
        }
    }

    const fn custom(key: &'static str, handler: Handler) -> Self {
        Self { key, handler }
    }
}

/// Immutable registry of every mapped key
#[derive(Debug, Clone)]
pub struct CompatMap {
    fields: BTreeMap<&'static str, FieldMapping>,
}

impl CompatMap {
    /// Builds the full key set.
    #[must_use]
    pub fn build() -> Self {
        use ProductField as F;
        let text = |s: &str| ColumnValue::Text(s.to_string());

        let entries = vec![
            FieldMapping::column("_sku", F::Sku, text("")),
            FieldMapping::column("_thumbnail_id", F::ImageId, ColumnValue::Int(0)),
            FieldMapping::column("_height", F::Height, ColumnValue::Null),
            FieldMapping::column("_width", F::Width, ColumnValue::Null),
            FieldMapping::column("_length", F::Length, ColumnValue::Null),
            FieldMapping::column("_weight", F::Weight, ColumnValue::Null),
            FieldMapping::column("_stock", F::StockQuantity, ColumnValue::Null),
            FieldMapping::column("_virtual", F::Virtual, ColumnValue::Bool(false)),
            FieldMapping::column("_downloadable", F::Downloadable, ColumnValue::Bool(false)),
            FieldMapping::column("_tax_class", F::TaxClass, text("")),
            FieldMapping::column("_tax_status", F::TaxStatus, text("taxable")),
            FieldMapping::column("total_sales", F::TotalSales, ColumnValue::Int(0)),
            FieldMapping::column("_price", F::Price, ColumnValue::Null),
            FieldMapping::column("_regular_price", F::RegularPrice, ColumnValue::Null),
            FieldMapping::column("_sale_price", F::SalePrice, ColumnValue::Null),
            FieldMapping::column("_sale_price_dates_from", F::DateOnSaleFrom, ColumnValue::Null),
            FieldMapping::column("_sale_price_dates_to", F::DateOnSaleTo, ColumnValue::Null),
            FieldMapping::column("_wc_average_rating", F::AverageRating, ColumnValue::Float(0.0)),
            FieldMapping::column("_stock_status", F::StockStatus, text("instock")),
            FieldMapping::relationship("_upsell_ids", RelationshipType::Upsell, ListShape::Array),
            FieldMapping::relationship(
                "_crosssell_ids",
                RelationshipType::CrossSell,
                ListShape::Array,
            ),
            FieldMapping::relationship(
                "_children",
                RelationshipType::GroupedChild,
                ListShape::Array,
            ),
            FieldMapping::relationship(
                "_product_image_gallery",
                RelationshipType::Image,
                ListShape::CommaSeparated,
            ),
            FieldMapping::custom("_product_attributes", Handler::Attributes),
            FieldMapping::custom("_default_attributes", Handler::DefaultAttributes),
            FieldMapping::custom("_downloadable_files", Handler::Downloads),
            FieldMapping::custom(
                "_download_limit",
                Handler::DownloadSetting(DownloadSetting::Limit),
            ),
            FieldMapping::custom(
                "_download_expiry",
                Handler::DownloadSetting(DownloadSetting::Expiry),
            ),
        ];

        Self {
            fields: entries.into_iter().map(|entry| (entry.key, entry)).collect(),
        }
    }

    /// The mapping of a legacy key, if it is intercepted.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldMapping> {
        self.fields.get(key)
    }

    /// Whether `key` is intercepted.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Every mapped key, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.keys().copied()
    }

    /// Every mapping, sorted by key.
    pub fn iter(&self) -> impl Iterator<Item = &FieldMapping> {
        self.fields.values()
    }

    /// The key mapped to a column field.
    #[must_use]
    pub fn key_for_field(&self, field: ProductField) -> Option<&'static str> {
        self.iter().find_map(|mapping| match mapping.handler {
            Handler::Column { field: f, .. } if f == field => Some(mapping.key),
            _ => None,
        })
    }

    /// Number of mapped keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no key is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Converts a legacy value into the column value stored for `field`.
#[must_use]
pub fn column_value(field: ProductField, value: &MetaValue) -> ColumnValue {
    let converted = match field.format() {
        ColumnFormat::Text => {
            meta_value::as_text(value).map_or(ColumnValue::Null, ColumnValue::Text)
        }
        ColumnFormat::Int => meta_value::as_i64(value).map_or(ColumnValue::Null, ColumnValue::Int),
        ColumnFormat::Float => {
            meta_value::as_f64(value).map_or(ColumnValue::Null, ColumnValue::Float)
        }
        ColumnFormat::Bool => ColumnValue::Bool(match value {
            Value::Bool(b) => *b,
            other => meta_value::as_text(other)
                .is_some_and(|s| matches!(s.trim(), "yes" | "1" | "true")),
        }),
        ColumnFormat::Timestamp => meta_value::as_i64(value)
            .or_else(|| meta_value::as_text(value).and_then(|s| parse_date(&s)))
            .map_or(ColumnValue::Null, ColumnValue::Int),
    };
    field.format().normalize(converted)
}

/// Sale dates may be stored as `YYYY-MM-DD`; they are kept as midnight UTC.
fn parse_date(value: &str) -> Option<i64> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc().timestamp())
}

/// Renders a stored column value the way legacy storage held it. `None`
/// means "no value".
#[must_use]
pub fn render_column(field: ProductField, value: &ColumnValue) -> Option<MetaValue> {
    let rendered = match (field.format(), value) {
        (_, ColumnValue::Null) => return None,
        (ColumnFormat::Text, ColumnValue::Text(s)) if s.is_empty() => return None,
        (ColumnFormat::Int, ColumnValue::Int(0)) if field == ProductField::ImageId => return None,
        (ColumnFormat::Bool, ColumnValue::Bool(b)) => (if *b { "yes" } else { "no" }).to_string(),
        (_, ColumnValue::Text(s)) => s.clone(),
        (_, ColumnValue::Int(i)) => i.to_string(),
        (_, ColumnValue::Float(f)) => meta_value::format_number(*f),
        (_, ColumnValue::Bool(b)) => i64::from(*b).to_string(),
    };
    Some(Value::String(rendered))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_column_field_but_type_is_mapped() {
        let map = CompatMap::build();
        for field in ProductField::ALL {
            let key = map.key_for_field(field);
            if field == ProductField::ProductType {
                assert!(key.is_none());
            } else {
                assert!(key.is_some(), "{field:?} has no key");
            }
        }
        assert_eq!(map.len(), 28);
    }

    #[test]
    fn test_unmapped_keys_are_absent() {
        let map = CompatMap::build();
        assert!(map.get("_edit_lock").is_none());
        assert!(!map.contains("attribute_pa_color"));
        assert!(map.contains("_product_image_gallery"));
    }

    #[test]
    fn test_column_value_conversion() {
        assert_eq!(
            column_value(ProductField::Virtual, &json!("yes")),
            ColumnValue::Bool(true)
        );
        assert_eq!(
            column_value(ProductField::Height, &json!("20")),
            ColumnValue::Float(20.0)
        );
        assert_eq!(column_value(ProductField::Price, &json!("")), ColumnValue::Null);
        assert_eq!(
            column_value(ProductField::TotalSales, &json!("")),
            ColumnValue::Int(0)
        );
        assert_eq!(
            column_value(ProductField::DateOnSaleFrom, &json!("2024-01-02")),
            ColumnValue::Int(1_704_153_600)
        );
    }

    #[test]
    fn test_render_column() {
        assert_eq!(
            render_column(ProductField::Height, &ColumnValue::Float(20.0)),
            Some(json!("20"))
        );
        assert_eq!(
            render_column(ProductField::Downloadable, &ColumnValue::Bool(false)),
            Some(json!("no"))
        );
        assert_eq!(render_column(ProductField::ImageId, &ColumnValue::Int(0)), None);
        assert_eq!(
            render_column(ProductField::TotalSales, &ColumnValue::Int(0)),
            Some(json!("0"))
        );
        assert_eq!(render_column(ProductField::Sku, &ColumnValue::Text(String::new())), None);
    }
}
