/// Attribute store: attribute definitions and values in legacy shape
pub mod attributes;
/// Object cache shared by the structured stores
pub mod cache;
/// Column store accessor for the `wc_products` row
pub mod columns;
/// Download store for downloadable files
pub mod downloads;
/// Metadata interception engine
pub mod engine;
/// Catalog entity lookup and removal
pub mod entity;
/// Plain legacy key-value storage
pub mod legacy;
/// Compatibility mapping from legacy keys to store handlers
pub mod mapping;
/// Metadata facade: engine first, legacy storage otherwise
pub mod meta_api;
/// Legacy value encoding helpers
pub mod meta_value;
/// One-time migration into the structured tables
pub mod migration;
/// Product object save path for attributes and variation selections
pub mod product_object;
/// Relationship store (upsells, cross-sells, grouped children, gallery)
pub mod relationships;
/// Taxonomy terms backing shared attributes
pub mod terms;
