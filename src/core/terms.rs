//! Shared taxonomy terms backing taxonomy attributes.

use crate::{
    core::meta_value::sanitize_title,
    entities::{
        AttributeTaxonomy, Term, TermModel, TermRelationship, attribute_taxonomy, term,
        term_relationship,
    },
    errors::Result,
};
use sea_orm::{Condition, JoinType, QueryOrder, QuerySelect, RelationTrait, Set, prelude::*};
use tracing::debug;

/// Prefix of attribute taxonomy names (`pa_color`).
pub const ATTRIBUTE_TAXONOMY_PREFIX: &str = "pa_";

/// Id of the registered attribute behind `taxonomy`, registering it when missing.
pub async fn ensure_attribute_taxonomy<C>(db: &C, taxonomy: &str) -> Result<i64>
where
    C: ConnectionTrait,
{
    let name = taxonomy
        .strip_prefix(ATTRIBUTE_TAXONOMY_PREFIX)
        .unwrap_or(taxonomy);

    if let Some(existing) = AttributeTaxonomy::find()
        .filter(attribute_taxonomy::Column::AttributeName.eq(name))
        .one(db)
        .await?
    {
        return Ok(existing.attribute_id);
    }

    let created = attribute_taxonomy::ActiveModel {
        attribute_name: Set(name.to_string()),
        attribute_label: Set(name.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    debug!(taxonomy, attribute_id = created.attribute_id, "attribute taxonomy registered");
    Ok(created.attribute_id)
}

/// Finds a term by slug or name within a taxonomy, creating it when missing.
pub async fn find_or_create<C>(db: &C, taxonomy: &str, name_or_slug: &str) -> Result<TermModel>
where
    C: ConnectionTrait,
{
    let name = name_or_slug.trim();
    let slug = sanitize_title(name);

    let existing = Term::find()
        .filter(term::Column::Taxonomy.eq(taxonomy))
        .filter(
            Condition::any()
                .add(term::Column::Slug.eq(slug.as_str()))
                .add(term::Column::Name.eq(name)),
        )
        .one(db)
        .await?;
    if let Some(existing) = existing {
        return Ok(existing);
    }

    let created = term::ActiveModel {
        taxonomy: Set(taxonomy.to_string()),
        name: Set(name.to_string()),
        slug: Set(slug),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(created)
}

/// Terms of `taxonomy` assigned to an object, in assignment order.
pub async fn object_terms<C>(db: &C, object_id: i64, taxonomy: &str) -> Result<Vec<TermModel>>
where
    C: ConnectionTrait,
{
    Term::find()
        .join_rev(JoinType::InnerJoin, term_relationship::Relation::Term.def())
        .filter(term_relationship::Column::ObjectId.eq(object_id))
        .filter(term::Column::Taxonomy.eq(taxonomy))
        .order_by_asc(term_relationship::Column::TermOrder)
        .order_by_asc(term::Column::TermId)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Replaces the object's assignments within one taxonomy.
pub async fn set_object_terms<C>(db: &C, object_id: i64, taxonomy: &str, term_ids: &[i64]) -> Result<()>
where
    C: ConnectionTrait,
{
    let current: Vec<i64> = object_terms(db, object_id, taxonomy)
        .await?
        .into_iter()
        .map(|t| t.term_id)
        .collect();
    if !current.is_empty() {
        TermRelationship::delete_many()
            .filter(term_relationship::Column::ObjectId.eq(object_id))
            .filter(term_relationship::Column::TermId.is_in(current))
            .exec(db)
            .await?;
    }

    let rows: Vec<term_relationship::ActiveModel> = term_ids
        .iter()
        .enumerate()
        .map(|(order, term_id)| term_relationship::ActiveModel {
            object_id: Set(object_id),
            term_id: Set(*term_id),
            term_order: Set(order as i64),
        })
        .collect();
    if !rows.is_empty() {
        TermRelationship::insert_many(rows)
            .exec_without_returning(db)
            .await?;
    }
    Ok(())
}

/// Terms by id, in the order of `term_ids`. Unknown ids are skipped.
pub async fn terms_by_id<C>(db: &C, term_ids: &[i64]) -> Result<Vec<TermModel>>
where
    C: ConnectionTrait,
{
    if term_ids.is_empty() {
        return Ok(Vec::new());
    }
    let found = Term::find()
        .filter(term::Column::TermId.is_in(term_ids.iter().copied()))
        .all(db)
        .await?;
    Ok(term_ids
        .iter()
        .filter_map(|id| found.iter().find(|t| t.term_id == *id).cloned())
        .collect())
}
