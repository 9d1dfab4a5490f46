//! Product object save path for attributes.
//!
//! Attribute rows are never written directly by the metadata layer: saving
//! them also assigns taxonomy terms to the product, which is the product
//! object's job. The attribute store and the migration both persist through here.

use crate::{
    core::cache::{CacheKey, ObjectCache},
    core::terms,
    entities::{
        ProductAttribute as ProductAttributeEntity, ProductAttributeModel, ProductAttributeValue,
        ProductAttributeValueModel, TermModel, VariationAttributeValue, product_attribute,
        product_attribute_value, variation_attribute_value,
    },
    errors::Result,
};
use sea_orm::{QueryOrder, Set, prelude::*};
use std::collections::BTreeMap;
use tracing::debug;

/// Default selection per attribute slug (term slug or local value).
pub type DefaultAttributes = BTreeMap<String, String>;

/// One option of an attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeOption {
    /// Shared taxonomy term
    Term(TermModel),
    /// Entity-local free text
    Text(String),
}

impl AttributeOption {
    /// Text stored in the value row.
    fn stored_value(&self) -> String {
        match self {
            Self::Term(term) => term.term_id.to_string(),
            Self::Text(text) => text.clone(),
        }
    }

    /// Whether this option is the wanted default.
    fn matches_default(&self, wanted: &str) -> bool {
        match self {
            Self::Term(term) => term.slug == wanted,
            Self::Text(text) => text == wanted.trim(),
        }
    }
}

/// An attribute as the product object holds it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductAttribute {
    /// Key the attribute is addressed by in legacy maps
    pub slug: String,
    /// Display name, or taxonomy name for shared attributes
    pub name: String,
    /// Sort order
    pub position: i64,
    /// Shown on the product page
    pub visible: bool,
    /// Used for variations
    pub variation: bool,
    /// Registered attribute id, `None` for local attributes
    pub taxonomy_id: Option<i64>,
    /// Values in priority order
    pub options: Vec<AttributeOption>,
}

/// Attribute definitions of a product in priority order.
pub async fn definitions<C>(db: &C, entity_id: i64) -> Result<Vec<ProductAttributeModel>>
where
    C: ConnectionTrait,
{
    ProductAttributeEntity::find()
        .filter(product_attribute::Column::ProductId.eq(entity_id))
        .order_by_asc(product_attribute::Column::Priority)
        .order_by_asc(product_attribute::Column::ProductAttributeId)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Attribute values of a product, grouped order by priority.
pub async fn values<C>(db: &C, entity_id: i64) -> Result<Vec<ProductAttributeValueModel>>
where
    C: ConnectionTrait,
{
    ProductAttributeValue::find()
        .filter(product_attribute_value::Column::ProductId.eq(entity_id))
        .order_by_asc(product_attribute_value::Column::ProductAttributeId)
        .order_by_asc(product_attribute_value::Column::Priority)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Reads the stored defaults straight from the tables.
pub async fn stored_defaults<C>(db: &C, entity_id: i64) -> Result<DefaultAttributes>
where
    C: ConnectionTrait,
{
    let definitions = definitions(db, entity_id).await?;
    let values = values(db, entity_id).await?;
    default_map(db, &definitions, &values).await
}

/// Builds the slug -> selection map from definition and value rows.
pub async fn default_map<C>(
    db: &C,
    definitions: &[ProductAttributeModel],
    values: &[ProductAttributeValueModel],
) -> Result<DefaultAttributes>
where
    C: ConnectionTrait,
{
    let mut defaults = DefaultAttributes::new();
    for definition in definitions {
        let Some(chosen) = values.iter().find(|v| {
            v.product_attribute_id == definition.product_attribute_id && v.is_default
        }) else {
            continue;
        };
        let selection = if definition.is_taxonomy() {
            let term_id = chosen.value.parse::<i64>().unwrap_or_default();
            terms::terms_by_id(db, &[term_id])
                .await?
                .into_iter()
                .next()
                .map(|term| term.slug)
        } else {
            Some(chosen.value.clone())
        };
        if let Some(selection) = selection {
            defaults.insert(definition.slug.clone(), selection);
        }
    }
    Ok(defaults)
}

/// Replaces the product's attribute definitions and values.
///
/// `defaults` picks the default selection per slug; `None` keeps whatever
/// selection the product had before the save.
pub async fn save_attributes<C>(
    db: &C,
    cache: &ObjectCache,
    entity_id: i64,
    attributes: &[ProductAttribute],
    defaults: Option<&DefaultAttributes>,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let previous = definitions(db, entity_id).await?;
    let defaults = match defaults {
        Some(defaults) => defaults.clone(),
        None => stored_defaults(db, entity_id).await?,
    };

    ProductAttributeValue::delete_many()
        .filter(product_attribute_value::Column::ProductId.eq(entity_id))
        .exec(db)
        .await?;
    ProductAttributeEntity::delete_many()
        .filter(product_attribute::Column::ProductId.eq(entity_id))
        .exec(db)
        .await?;

    let mut ordered: Vec<&ProductAttribute> = attributes.iter().collect();
    ordered.sort_by_key(|attribute| attribute.position);

    for attribute in ordered {
        let definition = product_attribute::ActiveModel {
            product_id: Set(entity_id),
            name: Set(attribute.name.clone()),
            slug: Set(attribute.slug.clone()),
            is_visible: Set(attribute.visible),
            is_variation: Set(attribute.variation),
            priority: Set(attribute.position),
            attribute_id: Set(attribute.taxonomy_id.unwrap_or(0)),
            ..Default::default()
        }
        .insert(db)
        .await?;

        let wanted = defaults.get(&attribute.slug);
        let rows: Vec<product_attribute_value::ActiveModel> = attribute
            .options
            .iter()
            .enumerate()
            .map(|(priority, option)| product_attribute_value::ActiveModel {
                product_id: Set(entity_id),
                product_attribute_id: Set(definition.product_attribute_id),
                value: Set(option.stored_value()),
                priority: Set(priority as i64),
                is_default: Set(wanted.is_some_and(|wanted| option.matches_default(wanted))),
                ..Default::default()
            })
            .collect();
        if !rows.is_empty() {
            ProductAttributeValue::insert_many(rows)
                .exec_without_returning(db)
                .await?;
        }

        if attribute.taxonomy_id.is_some() {
            let term_ids: Vec<i64> = attribute
                .options
                .iter()
                .filter_map(|option| match option {
                    AttributeOption::Term(term) => Some(term.term_id),
                    AttributeOption::Text(_) => None,
                })
                .collect();
            terms::set_object_terms(db, entity_id, &attribute.name, &term_ids).await?;
        }
    }

    // Taxonomies dropped from the product lose their term assignments
    for dropped in previous.iter().filter(|old| {
        old.is_taxonomy() && !attributes.iter().any(|new| new.name == old.name)
    }) {
        terms::set_object_terms(db, entity_id, &dropped.name, &[]).await?;
    }

    cache
        .invalidate(&[
            CacheKey::Attributes(entity_id),
            CacheKey::AttributeValues(entity_id),
        ])
        .await;
    debug!(entity_id, count = attributes.len(), "attributes saved");
    Ok(())
}

/// Marks the default selection of every attribute. Slugs missing from
/// `defaults` end up with no default.
pub async fn save_default_attributes<C>(
    db: &C,
    cache: &ObjectCache,
    entity_id: i64,
    defaults: &DefaultAttributes,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let definitions = definitions(db, entity_id).await?;
    let values = values(db, entity_id).await?;

    for definition in &definitions {
        let wanted = defaults.get(&definition.slug);
        let own_values = values
            .iter()
            .filter(|v| v.product_attribute_id == definition.product_attribute_id);

        let options: Vec<(i64, AttributeOption)> = if definition.is_taxonomy() {
            let ids: Vec<i64> = own_values
                .clone()
                .filter_map(|v| v.value.parse().ok())
                .collect();
            let found = terms::terms_by_id(db, &ids).await?;
            own_values
                .filter_map(|v| {
                    let term_id: i64 = v.value.parse().ok()?;
                    let term = found.iter().find(|t| t.term_id == term_id)?.clone();
                    Some((v.attribute_value_id, AttributeOption::Term(term)))
                })
                .collect()
        } else {
            own_values
                .map(|v| (v.attribute_value_id, AttributeOption::Text(v.value.clone())))
                .collect()
        };

        for (attribute_value_id, option) in options {
            let is_default = wanted.is_some_and(|wanted| option.matches_default(wanted));
            ProductAttributeValue::update_many()
                .col_expr(
                    product_attribute_value::Column::IsDefault,
                    sea_orm::sea_query::Expr::value(is_default),
                )
                .filter(product_attribute_value::Column::AttributeValueId.eq(attribute_value_id))
                .exec(db)
                .await?;
        }
    }

    cache
        .invalidate(&[CacheKey::AttributeValues(entity_id)])
        .await;
    Ok(())
}

/// Replaces a variation's selections. Keys are `attribute_<slug>` of the
/// parent's variation attributes; unknown slugs are ignored.
pub async fn save_variation_attributes<C>(
    db: &C,
    variation_id: i64,
    parent_id: i64,
    selections: &BTreeMap<String, String>,
) -> Result<usize>
where
    C: ConnectionTrait,
{
    VariationAttributeValue::delete_many()
        .filter(variation_attribute_value::Column::ProductId.eq(variation_id))
        .exec(db)
        .await?;

    let rows: Vec<variation_attribute_value::ActiveModel> = definitions(db, parent_id)
        .await?
        .into_iter()
        .filter(|definition| definition.is_variation)
        .filter_map(|definition| {
            let key = variation_key(&definition.slug);
            selections
                .get(&key)
                .map(|value| variation_attribute_value::ActiveModel {
                    product_id: Set(variation_id),
                    value: Set(value.clone()),
                    product_attribute_id: Set(definition.product_attribute_id),
                    ..Default::default()
                })
        })
        .collect();

    let count = rows.len();
    if count > 0 {
        VariationAttributeValue::insert_many(rows)
            .exec_without_returning(db)
            .await?;
    }
    Ok(count)
}

/// Legacy key a variation stores its selection for `slug` under.
#[must_use]
pub fn variation_key(slug: &str) -> String {
    format!("attribute_{slug}")
}
