//! Column store accessor - scalar product fields in the `wc_products` row.
//!
//! Reads go through the object cache and fall back to a primary-key lookup.
//! Writes update the entity's row, creating it first when missing, or sweep the
//! whole table with `delete_all`. A previous value is matched inside the
//! `UPDATE` itself. Writes invalidate the product and uses-default cache entries.

use crate::{
    core::cache::{CacheKey, CachedValue, ObjectCache},
    core::{entity, meta_value},
    entities::{Product, product},
    errors::Result,
};
use sea_orm::sea_query::{Expr, OnConflict, SimpleExpr};
use sea_orm::{QuerySelect, Value, prelude::*};
use tracing::{debug, trace};

/// Storage format of a product column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnFormat {
    /// Non-null text, empty when unset
    Text,
    /// Non-null integer, 0 when unset
    Int,
    /// Nullable float
    Float,
    /// Non-null flag
    Bool,
    /// Nullable unix timestamp
    Timestamp,
}

/// A typed column value
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// SQL NULL
    Null,
    /// Integer or timestamp
    Int(i64),
    /// Decimal
    Float(f64),
    /// String
    Text(String),
    /// Flag, `yes`/`no` in legacy storage
    Bool(bool),
}

impl ColumnFormat {
    /// Coerces a value into the shape this format stores. Integer formats
    /// store 0 for NULL, float and timestamp formats keep NULL as "unset".
    #[must_use]
    pub fn normalize(self, value: ColumnValue) -> ColumnValue {
        match (self, value) {
            (Self::Text, ColumnValue::Null) => ColumnValue::Text(String::new()),
            (Self::Text, ColumnValue::Int(i)) => ColumnValue::Text(i.to_string()),
            (Self::Text, ColumnValue::Float(f)) => {
                ColumnValue::Text(meta_value::format_number(f))
            }
            (Self::Text, ColumnValue::Bool(b)) => ColumnValue::Text(if b { "1" } else { "" }.into()),
            (Self::Int, ColumnValue::Null) => ColumnValue::Int(0),
            (Self::Int, ColumnValue::Float(f)) => ColumnValue::Int(f.trunc() as i64),
            (Self::Int, ColumnValue::Bool(b)) => ColumnValue::Int(i64::from(b)),
            (Self::Int, ColumnValue::Text(s)) => {
                ColumnValue::Int(meta_value::as_i64(&serde_json::Value::String(s)).unwrap_or(0))
            }
            (Self::Float, ColumnValue::Int(i)) => ColumnValue::Float(i as f64),
            (Self::Float, ColumnValue::Text(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map_or(ColumnValue::Null, ColumnValue::Float),
            (Self::Float | Self::Timestamp, ColumnValue::Bool(_)) => ColumnValue::Null,
            (Self::Bool, ColumnValue::Null) => ColumnValue::Bool(false),
            (Self::Bool, ColumnValue::Int(i)) => ColumnValue::Bool(i != 0),
            (Self::Bool, ColumnValue::Float(f)) => ColumnValue::Bool(f != 0.0),
            (Self::Bool, ColumnValue::Text(s)) => {
                ColumnValue::Bool(matches!(s.trim(), "yes" | "1" | "true"))
            }
            (Self::Timestamp, ColumnValue::Float(f)) => ColumnValue::Int(f.trunc() as i64),
            (Self::Timestamp, ColumnValue::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map_or(ColumnValue::Null, ColumnValue::Int),
            (_, value) => value,
        }
    }
}

/// Scalar fields of the product row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductField {
    /// Stock keeping unit
    Sku,
    /// Thumbnail attachment id
    ImageId,
    /// Height
    Height,
    /// Width
    Width,
    /// Length
    Length,
    /// Weight
    Weight,
    /// Units in stock
    StockQuantity,
    /// Product type slug
    ProductType,
    /// Virtual flag
    Virtual,
    /// Downloadable flag
    Downloadable,
    /// Tax class slug
    TaxClass,
    /// Tax status
    TaxStatus,
    /// Units sold
    TotalSales,
    /// Active price
    Price,
    /// Regular price
    RegularPrice,
    /// Sale price
    SalePrice,
    /// Sale start, unix seconds
    DateOnSaleFrom,
    /// Sale end, unix seconds
    DateOnSaleTo,
    /// Average review rating
    AverageRating,
    /// Stock status
    StockStatus,
}

impl ProductField {
    /// Every field, in table order.
    pub const ALL: [Self; 20] = [
        Self::Sku,
        Self::ImageId,
        Self::Height,
        Self::Width,
        Self::Length,
        Self::Weight,
        Self::StockQuantity,
        Self::ProductType,
        Self::Virtual,
        Self::Downloadable,
        Self::TaxClass,
        Self::TaxStatus,
        Self::TotalSales,
        Self::Price,
        Self::RegularPrice,
        Self::SalePrice,
        Self::DateOnSaleFrom,
        Self::DateOnSaleTo,
        Self::AverageRating,
        Self::StockStatus,
    ];

    /// The `wc_products` column backing the field.
    #[must_use]
    pub const fn column(self) -> product::Column {
        match self {
            Self::Sku => product::Column::Sku,
            Self::ImageId => product::Column::ImageId,
            Self::Height => product::Column::Height,
            Self::Width => product::Column::Width,
            Self::Length => product::Column::Length,
            Self::Weight => product::Column::Weight,
            Self::StockQuantity => product::Column::StockQuantity,
            Self::ProductType => product::Column::ProductType,
            Self::Virtual => product::Column::IsVirtual,
            Self::Downloadable => product::Column::Downloadable,
            Self::TaxClass => product::Column::TaxClass,
            Self::TaxStatus => product::Column::TaxStatus,
            Self::TotalSales => product::Column::TotalSales,
            Self::Price => product::Column::Price,
            Self::RegularPrice => product::Column::RegularPrice,
            Self::SalePrice => product::Column::SalePrice,
            Self::DateOnSaleFrom => product::Column::DateOnSaleFrom,
            Self::DateOnSaleTo => product::Column::DateOnSaleTo,
            Self::AverageRating => product::Column::AverageRating,
            Self::StockStatus => product::Column::StockStatus,
        }
    }

    /// How values of the field are stored.
    #[must_use]
    pub const fn format(self) -> ColumnFormat {
        match self {
            Self::Sku | Self::ProductType | Self::TaxClass | Self::TaxStatus | Self::StockStatus => {
                ColumnFormat::Text
            }
            Self::ImageId | Self::TotalSales => ColumnFormat::Int,
            Self::Height
            | Self::Width
            | Self::Length
            | Self::Weight
            | Self::StockQuantity
            | Self::Price
            | Self::RegularPrice
            | Self::SalePrice
            | Self::AverageRating => ColumnFormat::Float,
            Self::Virtual | Self::Downloadable => ColumnFormat::Bool,
            Self::DateOnSaleFrom | Self::DateOnSaleTo => ColumnFormat::Timestamp,
        }
    }

    /// Reads this field from a row.
    #[must_use]
    pub fn read(self, row: &product::Model) -> ColumnValue {
        let float = |v: Option<f64>| v.map_or(ColumnValue::Null, ColumnValue::Float);
        let stamp = |v: Option<i64>| v.map_or(ColumnValue::Null, ColumnValue::Int);
        match self {
            Self::Sku => ColumnValue::Text(row.sku.clone()),
            Self::ImageId => ColumnValue::Int(row.image_id),
            Self::Height => float(row.height),
            Self::Width => float(row.width),
            Self::Length => float(row.length),
            Self::Weight => float(row.weight),
            Self::StockQuantity => float(row.stock_quantity),
            Self::ProductType => ColumnValue::Text(row.product_type.clone()),
            Self::Virtual => ColumnValue::Bool(row.is_virtual),
            Self::Downloadable => ColumnValue::Bool(row.downloadable),
            Self::TaxClass => ColumnValue::Text(row.tax_class.clone()),
            Self::TaxStatus => ColumnValue::Text(row.tax_status.clone()),
            Self::TotalSales => ColumnValue::Int(row.total_sales),
            Self::Price => float(row.price),
            Self::RegularPrice => float(row.regular_price),
            Self::SalePrice => float(row.sale_price),
            Self::DateOnSaleFrom => stamp(row.date_on_sale_from),
            Self::DateOnSaleTo => stamp(row.date_on_sale_to),
            Self::AverageRating => ColumnValue::Float(row.average_rating),
            Self::StockStatus => ColumnValue::Text(row.stock_status.clone()),
        }
    }

    /// Writes this field into a row. The value is normalized to the field's format first.
    pub fn write(self, row: &mut product::Model, value: ColumnValue) {
        let value = self.format().normalize(value);
        let text = |v: ColumnValue| match v {
            ColumnValue::Text(s) => s,
            _ => String::new(),
        };
        let int = |v: &ColumnValue| match v {
            ColumnValue::Int(i) => *i,
            _ => 0,
        };
        let float = |v: &ColumnValue| match v {
            ColumnValue::Float(f) => Some(*f),
            _ => None,
        };
        let stamp = |v: &ColumnValue| match v {
            ColumnValue::Int(i) => Some(*i),
            _ => None,
        };
        let flag = |v: &ColumnValue| matches!(v, ColumnValue::Bool(true));
        match self {
            Self::Sku => row.sku = text(value),
            Self::ImageId => row.image_id = int(&value),
            Self::Height => row.height = float(&value),
            Self::Width => row.width = float(&value),
            Self::Length => row.length = float(&value),
            Self::Weight => row.weight = float(&value),
            Self::StockQuantity => row.stock_quantity = float(&value),
            Self::ProductType => row.product_type = text(value),
            Self::Virtual => row.is_virtual = flag(&value),
            Self::Downloadable => row.downloadable = flag(&value),
            Self::TaxClass => row.tax_class = text(value),
            Self::TaxStatus => row.tax_status = text(value),
            Self::TotalSales => row.total_sales = int(&value),
            Self::Price => row.price = float(&value),
            Self::RegularPrice => row.regular_price = float(&value),
            Self::SalePrice => row.sale_price = float(&value),
            Self::DateOnSaleFrom => row.date_on_sale_from = stamp(&value),
            Self::DateOnSaleTo => row.date_on_sale_to = stamp(&value),
            Self::AverageRating => row.average_rating = float(&value).unwrap_or(0.0),
            Self::StockStatus => row.stock_status = text(value),
        }
    }

    /// Database value for an update of this field, already normalized.
    fn db_value(self, value: &ColumnValue) -> Value {
        match (self.format(), value) {
            (ColumnFormat::Text, ColumnValue::Text(s)) => s.clone().into(),
            (ColumnFormat::Int, ColumnValue::Int(i)) => (*i).into(),
            (ColumnFormat::Float, ColumnValue::Float(f)) if self == Self::AverageRating => {
                (*f).into()
            }
            (ColumnFormat::Float, ColumnValue::Float(f)) => Some(*f).into(),
            (ColumnFormat::Float, _) if self == Self::AverageRating => 0.0_f64.into(),
            (ColumnFormat::Float, _) => Option::<f64>::None.into(),
            (ColumnFormat::Bool, ColumnValue::Bool(b)) => (*b).into(),
            (ColumnFormat::Timestamp, ColumnValue::Int(i)) => Some(*i).into(),
            (ColumnFormat::Timestamp, _) => Option::<i64>::None.into(),
            (ColumnFormat::Text, _) => String::new().into(),
            (ColumnFormat::Int, _) => 0_i64.into(),
            (ColumnFormat::Bool, _) => false.into(),
        }
    }
}

/// Loads the structured row of an entity, through the cache.
pub async fn load_row<C>(db: &C, cache: &ObjectCache, entity_id: i64) -> Result<Option<product::Model>>
where
    C: ConnectionTrait,
{
    if entity_id <= 0 {
        return Ok(None);
    }
    if let Some(CachedValue::Product(row)) = cache.get(&CacheKey::Product(entity_id)).await {
        return Ok(row);
    }

    let row = Product::find_by_id(entity_id).one(db).await?;
    cache
        .set(CacheKey::Product(entity_id), CachedValue::Product(row.clone()))
        .await;
    Ok(row)
}

/// Reads one field. `None` when the entity has no structured row.
pub async fn get<C>(
    db: &C,
    cache: &ObjectCache,
    entity_id: i64,
    field: ProductField,
) -> Result<Option<ColumnValue>>
where
    C: ConnectionTrait,
{
    Ok(load_row(db, cache, entity_id)
        .await?
        .map(|row| field.read(&row)))
}

/// Inserts or replaces a whole row.
pub async fn upsert_row<C>(db: &C, row: product::Model) -> Result<()>
where
    C: ConnectionTrait,
{
    let update_columns = ProductField::ALL
        .map(ProductField::column)
        .into_iter()
        .chain([product::Column::DownloadLimit, product::Column::DownloadExpiry]);
    Product::insert(row.into_insertable())
        .on_conflict(
            OnConflict::column(product::Column::ProductId)
                .update_columns(update_columns)
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Creates the entity's row with defaults unless it already has one. The
/// type is taken from legacy storage.
pub async fn ensure_row<C>(db: &C, cache: &ObjectCache, entity_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    if Product::find_by_id(entity_id).one(db).await?.is_some() {
        return Ok(());
    }
    let product_type = entity::legacy_product_type_of(db, entity_id).await?;
    Product::insert(product::Model::empty(entity_id, &product_type).into_insertable())
        .on_conflict(
            OnConflict::column(product::Column::ProductId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    invalidate(cache, entity_id).await;
    Ok(())
}

/// Writes one field.
///
/// With `delete_all` the field is set on every row, optionally only on rows
/// currently holding `prev_value`. Otherwise the entity's row is updated,
/// after being created when missing and no `prev_value` is given. A
/// `prev_value` that does not match the stored value makes the call a no-op
/// returning `false`.
pub async fn set<C>(
    db: &C,
    cache: &ObjectCache,
    entity_id: i64,
    field: ProductField,
    value: ColumnValue,
    prev_value: Option<ColumnValue>,
    delete_all: bool,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    let format = field.format();
    let value = format.normalize(value);
    let prev_value = prev_value.map(|prev| format.normalize(prev));

    if delete_all {
        return set_all_rows(db, cache, field, &value, prev_value.as_ref()).await;
    }
    if entity_id <= 0 {
        return Ok(false);
    }

    if prev_value.is_none() {
        ensure_row(db, cache, entity_id).await?;
    }
    let mut update = Product::update_many()
        .col_expr(field.column(), Expr::value(field.db_value(&value)))
        .filter(product::Column::ProductId.eq(entity_id));
    if let Some(prev) = &prev_value {
        update = update.filter(prev_filter(field, prev));
    }
    let written = update.exec(db).await?.rows_affected > 0;

    invalidate(cache, entity_id).await;
    if written {
        debug!(entity_id, ?field, "product column written");
    } else {
        trace!(entity_id, ?field, "previous value mismatch");
    }
    Ok(written)
}

/// Condition matching rows whose `field` holds `prev`.
fn prev_filter(field: ProductField, prev: &ColumnValue) -> SimpleExpr {
    match prev {
        ColumnValue::Null => field.column().is_null(),
        other => field.column().eq(field.db_value(other)),
    }
}

async fn set_all_rows<C>(
    db: &C,
    cache: &ObjectCache,
    field: ProductField,
    value: &ColumnValue,
    prev_value: Option<&ColumnValue>,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    let condition = prev_value.map(|prev| prev_filter(field, prev));

    let mut affected = Product::find()
        .select_only()
        .column(product::Column::ProductId);
    if let Some(filter) = condition.clone() {
        affected = affected.filter(filter);
    }
    let ids: Vec<i64> = affected.into_tuple().all(db).await?;
    if ids.is_empty() {
        return Ok(false);
    }

    let mut update = Product::update_many()
        .col_expr(field.column(), Expr::value(field.db_value(value)))
        .filter(product::Column::ProductId.is_in(ids.clone()));
    if let Some(filter) = condition {
        update = update.filter(filter);
    }
    let result = update.exec(db).await?;

    for id in &ids {
        invalidate(cache, *id).await;
    }
    debug!(?field, rows = result.rows_affected, "product column swept");
    Ok(result.rows_affected > 0)
}

async fn invalidate(cache: &ObjectCache, entity_id: i64) {
    cache
        .invalidate(&[CacheKey::Product(entity_id), CacheKey::UsesDefault(entity_id)])
        .await;
}

/// Whether the entity has no structured row, or a row holding only defaults.
pub async fn uses_default_values<C>(db: &C, cache: &ObjectCache, entity_id: i64) -> Result<bool>
where
    C: ConnectionTrait,
{
    if let Some(CachedValue::Flag(flag)) = cache.get(&CacheKey::UsesDefault(entity_id)).await {
        return Ok(flag);
    }

    let uses_default = load_row(db, cache, entity_id).await?.is_none_or(|row| {
        ProductField::ALL
            .iter()
            .filter(|field| **field != ProductField::ProductType)
            .all(|field| holds_default(&row, *field))
    });
    cache
        .set(CacheKey::UsesDefault(entity_id), CachedValue::Flag(uses_default))
        .await;
    Ok(uses_default)
}

/// Whether `field` of `row` still holds the value a fresh row starts with.
#[must_use]
pub fn holds_default(row: &product::Model, field: ProductField) -> bool {
    let defaults = product::Model::empty(row.product_id, &row.product_type);
    field.read(row) == field.read(&defaults)
}
