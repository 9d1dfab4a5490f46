//! Attribute store - attribute definitions and values in legacy shape.
//!
//! Reads assemble the legacy `slug -> descriptor` map from the attribute
//! tables. Writes resolve descriptors into product attributes (creating shared
//! terms where needed) and persist them through [`product_object`].

use crate::{
    core::cache::{CacheKey, CachedValue, ObjectCache},
    core::meta_value::{self, MetaValue},
    core::product_object::{self, AttributeOption, DefaultAttributes, ProductAttribute},
    core::terms,
    entities::{ProductAttributeModel, ProductAttributeValueModel},
    errors::Result,
};
use sea_orm::ConnectionTrait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Separator between local attribute values.
pub const VALUE_DELIMITER: char = '|';

/// Legacy attribute map, slug -> descriptor. Order is given by `position`.
pub type AttributeMap = BTreeMap<String, AttributeDescriptor>;

/// One attribute as legacy callers see it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    /// Display name, or the taxonomy for shared attributes
    pub name: String,
    /// Pipe-delimited values for local attributes, empty for taxonomy attributes
    #[serde(default, deserialize_with = "lenient_text")]
    pub value: String,
    /// Sort order
    #[serde(default, deserialize_with = "lenient_int")]
    pub position: i64,
    /// Shown on the product page
    #[serde(default, deserialize_with = "lenient_flag", serialize_with = "int_flag")]
    pub is_visible: bool,
    /// Used for variations
    #[serde(default, deserialize_with = "lenient_flag", serialize_with = "int_flag")]
    pub is_variation: bool,
    /// Backed by a registered taxonomy
    #[serde(default, deserialize_with = "lenient_flag", serialize_with = "int_flag")]
    pub is_taxonomy: bool,
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(meta_value::as_text(&value).unwrap_or_default())
}

fn lenient_int<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(meta_value::as_i64(&value).unwrap_or_default())
}

fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::String(s) => matches!(s.trim(), "1" | "yes" | "true"),
        other => meta_value::as_i64(&other).is_some_and(|i| i != 0),
    })
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn int_flag<S: serde::Serializer>(flag: &bool, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_i64(i64::from(*flag))
}

/// Decodes a legacy `_product_attributes` value. Anything that is not a map
/// decodes to an empty map.
#[must_use]
pub fn decode_attribute_map(value: &MetaValue) -> AttributeMap {
    match value {
        Value::Object(_) => serde_json::from_value(value.clone()).unwrap_or_default(),
        _ => AttributeMap::new(),
    }
}

/// Decodes a legacy `_default_attributes` value.
#[must_use]
pub fn decode_default_map(value: &MetaValue) -> DefaultAttributes {
    match value {
        Value::Object(map) => map
            .iter()
            .filter_map(|(slug, v)| meta_value::as_text(v).map(|text| (slug.clone(), text)))
            .filter(|(_, text)| !text.is_empty())
            .collect(),
        _ => DefaultAttributes::new(),
    }
}

/// Splits a local value string on the delimiter, trimming each part.
#[must_use]
pub fn split_values(value: &str) -> Vec<String> {
    value
        .split(VALUE_DELIMITER)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

async fn cached_definitions<C>(
    db: &C,
    cache: &ObjectCache,
    entity_id: i64,
) -> Result<Vec<ProductAttributeModel>>
where
    C: ConnectionTrait,
{
    if let Some(CachedValue::Attributes(rows)) = cache.get(&CacheKey::Attributes(entity_id)).await {
        return Ok(rows);
    }
    let rows = product_object::definitions(db, entity_id).await?;
    cache
        .set(CacheKey::Attributes(entity_id), CachedValue::Attributes(rows.clone()))
        .await;
    Ok(rows)
}

async fn cached_values<C>(
    db: &C,
    cache: &ObjectCache,
    entity_id: i64,
) -> Result<Vec<ProductAttributeValueModel>>
where
    C: ConnectionTrait,
{
    if let Some(CachedValue::AttributeValues(rows)) =
        cache.get(&CacheKey::AttributeValues(entity_id)).await
    {
        return Ok(rows);
    }
    let rows = product_object::values(db, entity_id).await?;
    cache
        .set(
            CacheKey::AttributeValues(entity_id),
            CachedValue::AttributeValues(rows.clone()),
        )
        .await;
    Ok(rows)
}

/// The entity's attributes in legacy shape.
pub async fn get_attributes<C>(db: &C, cache: &ObjectCache, entity_id: i64) -> Result<AttributeMap>
where
    C: ConnectionTrait,
{
    if entity_id <= 0 {
        return Ok(AttributeMap::new());
    }
    let definitions = cached_definitions(db, cache, entity_id).await?;
    let values = cached_values(db, cache, entity_id).await?;

    Ok(definitions
        .iter()
        .map(|definition| {
            let value = if definition.is_taxonomy() {
                String::new()
            } else {
                values
                    .iter()
                    .filter(|v| v.product_attribute_id == definition.product_attribute_id)
                    .map(|v| v.value.as_str())
                    .collect::<Vec<_>>()
                    .join(" | ")
            };
            (
                definition.slug.clone(),
                AttributeDescriptor {
                    name: definition.name.clone(),
                    value,
                    position: definition.priority,
                    is_visible: definition.is_visible,
                    is_variation: definition.is_variation,
                    is_taxonomy: definition.is_taxonomy(),
                },
            )
        })
        .collect())
}

/// Turns legacy descriptors into product attributes. Taxonomy values are
/// resolved (or created) as shared terms; an empty taxonomy value falls back
/// to the terms already assigned to the entity.
pub async fn resolve_attributes<C>(
    db: &C,
    entity_id: i64,
    attributes: &AttributeMap,
) -> Result<Vec<ProductAttribute>>
where
    C: ConnectionTrait,
{
    let mut resolved = Vec::with_capacity(attributes.len());
    for (slug, descriptor) in attributes {
        let attribute = if descriptor.is_taxonomy {
            let taxonomy = if slug.starts_with(terms::ATTRIBUTE_TAXONOMY_PREFIX) {
                slug.clone()
            } else {
                descriptor.name.clone()
            };
            let taxonomy_id = terms::ensure_attribute_taxonomy(db, &taxonomy).await?;
            let names = split_values(&descriptor.value);
            let mut options = Vec::new();
            if names.is_empty() {
                for term in terms::object_terms(db, entity_id, &taxonomy).await? {
                    options.push(AttributeOption::Term(term));
                }
            } else {
                for name in &names {
                    options.push(AttributeOption::Term(
                        terms::find_or_create(db, &taxonomy, name).await?,
                    ));
                }
            }
            ProductAttribute {
                slug: slug.clone(),
                name: taxonomy,
                position: descriptor.position,
                visible: descriptor.is_visible,
                variation: descriptor.is_variation,
                taxonomy_id: Some(taxonomy_id),
                options,
            }
        } else {
            ProductAttribute {
                slug: slug.clone(),
                name: descriptor.name.clone(),
                position: descriptor.position,
                visible: descriptor.is_visible,
                variation: descriptor.is_variation,
                taxonomy_id: None,
                options: split_values(&descriptor.value)
                    .into_iter()
                    .map(AttributeOption::Text)
                    .collect(),
            }
        };
        resolved.push(attribute);
    }
    Ok(resolved)
}

/// Rebuilds the entity's attributes from a legacy map.
pub async fn set_attributes<C>(
    db: &C,
    cache: &ObjectCache,
    entity_id: i64,
    attributes: &AttributeMap,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    if entity_id <= 0 {
        return Ok(false);
    }
    let resolved = resolve_attributes(db, entity_id, attributes).await?;
    product_object::save_attributes(db, cache, entity_id, &resolved, None).await?;
    Ok(true)
}

/// Default selection per attribute slug.
pub async fn get_default_attributes<C>(
    db: &C,
    cache: &ObjectCache,
    entity_id: i64,
) -> Result<DefaultAttributes>
where
    C: ConnectionTrait,
{
    if entity_id <= 0 {
        return Ok(DefaultAttributes::new());
    }
    let definitions = cached_definitions(db, cache, entity_id).await?;
    let values = cached_values(db, cache, entity_id).await?;
    product_object::default_map(db, &definitions, &values).await
}

/// Replaces the default selection.
pub async fn set_default_attributes<C>(
    db: &C,
    cache: &ObjectCache,
    entity_id: i64,
    defaults: &DefaultAttributes,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    if entity_id <= 0 {
        return Ok(false);
    }
    product_object::save_default_attributes(db, cache, entity_id, defaults).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use serde_json::json;

    fn local(name: &str, value: &str, position: i64) -> AttributeDescriptor {
        AttributeDescriptor {
            name: name.to_string(),
            value: value.to_string(),
            position,
            is_visible: true,
            is_variation: position % 2 == 0,
            is_taxonomy: false,
        }
    }

    #[tokio::test]
    async fn test_local_attributes_round_trip() -> Result<()> {
        let db = setup_test_db().await?;
        let cache = ObjectCache::new();

        let mut attributes = AttributeMap::new();
        attributes.insert("size".into(), local("Size", "Small | Medium|Large ", 0));
        attributes.insert("frame-material".into(), local("Frame Material", "Oak", 1));

        assert!(set_attributes(&db, &cache, 5, &attributes).await?);
        let stored = get_attributes(&db, &cache, 5).await?;

        assert_eq!(stored.len(), 2);
        let size = &stored["size"];
        assert_eq!(size.value, "Small | Medium | Large");
        assert_eq!(size.position, 0);
        assert!(size.is_visible && size.is_variation && !size.is_taxonomy);
        let frame = &stored["frame-material"];
        assert_eq!(frame.name, "Frame Material");
        assert_eq!(frame.value, "Oak");
        assert!(!frame.is_variation);
        Ok(())
    }

    #[tokio::test]
    async fn test_keys_survive_differently_named_attributes() -> Result<()> {
        let db = setup_test_db().await?;
        let cache = ObjectCache::new();

        let mut attributes = AttributeMap::new();
        attributes.insert("my_size".into(), local("Size", "S | M", 0));
        set_attributes(&db, &cache, 5, &attributes).await?;

        let stored = get_attributes(&db, &cache, 5).await?;
        assert_eq!(stored.keys().collect::<Vec<_>>(), vec!["my_size"]);
        assert_eq!(stored["my_size"].name, "Size");

        let mut defaults = DefaultAttributes::new();
        defaults.insert("my_size".into(), "M".into());
        set_default_attributes(&db, &cache, 5, &defaults).await?;
        assert_eq!(get_default_attributes(&db, &cache, 5).await?, defaults);

        let selections: BTreeMap<String, String> =
            [("attribute_my_size".to_string(), "S".to_string())].into();
        assert_eq!(
            product_object::save_variation_attributes(&db, 6, 5, &selections).await?,
            1
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_taxonomy_attributes_create_shared_terms() -> Result<()> {
        let db = setup_test_db().await?;
        let cache = ObjectCache::new();

        let mut attributes = AttributeMap::new();
        attributes.insert(
            "pa_color".into(),
            AttributeDescriptor {
                name: "pa_color".into(),
                value: "Red | Blue".into(),
                position: 0,
                is_visible: true,
                is_variation: true,
                is_taxonomy: true,
            },
        );
        set_attributes(&db, &cache, 5, &attributes).await?;

        let stored = get_attributes(&db, &cache, 5).await?;
        assert!(stored["pa_color"].is_taxonomy);
        assert_eq!(stored["pa_color"].value, "");

        let assigned: Vec<String> = terms::object_terms(&db, 5, "pa_color")
            .await?
            .into_iter()
            .map(|t| t.slug)
            .collect();
        assert_eq!(assigned, vec!["red", "blue"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_default_attributes() -> Result<()> {
        let db = setup_test_db().await?;
        let cache = ObjectCache::new();

        let mut attributes = AttributeMap::new();
        attributes.insert("size".into(), local("Size", "Small | Large", 0));
        attributes.insert(
            "pa_color".into(),
            AttributeDescriptor {
                name: "pa_color".into(),
                value: "Red | Blue".into(),
                position: 1,
                is_visible: true,
                is_variation: true,
                is_taxonomy: true,
            },
        );
        set_attributes(&db, &cache, 5, &attributes).await?;

        let mut defaults = DefaultAttributes::new();
        defaults.insert("size".into(), "Large".into());
        defaults.insert("pa_color".into(), "blue".into());
        set_default_attributes(&db, &cache, 5, &defaults).await?;
        assert_eq!(get_default_attributes(&db, &cache, 5).await?, defaults);

        // Saving attributes again keeps the selection
        set_attributes(&db, &cache, 5, &attributes).await?;
        assert_eq!(get_default_attributes(&db, &cache, 5).await?, defaults);

        set_default_attributes(&db, &cache, 5, &DefaultAttributes::new()).await?;
        assert!(get_default_attributes(&db, &cache, 5).await?.is_empty());
        Ok(())
    }

    #[test]
    fn test_decode_legacy_flags() {
        let map = decode_attribute_map(&json!({
            "size": {"name": "Size", "value": "S | M", "position": "1",
                     "is_visible": 1, "is_variation": 0, "is_taxonomy": 0}
        }));
        let size = &map["size"];
        assert_eq!(size.position, 1);
        assert!(size.is_visible);
        assert!(!size.is_variation);
        assert_eq!(split_values(&size.value), vec!["S", "M"]);

        let encoded = serde_json::to_value(size).unwrap();
        assert_eq!(encoded["is_visible"], json!(1));
    }
}
