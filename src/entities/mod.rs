//! Entity module - Contains all SeaORM entity definitions for the database.
//!
//! The `wc_*` tables form the structured store. `posts`, `postmeta`, the term
//! tables and `download_permissions` belong to the hosting application and are
//! modelled only as far as the compatibility layer reads or rewrites them.

pub mod attribute_taxonomy;
pub mod download_permission;
pub mod post;
pub mod post_meta;
pub mod product;
pub mod product_attribute;
pub mod product_attribute_value;
pub mod product_download;
pub mod product_relationship;
pub mod term;
pub mod term_relationship;
pub mod variation_attribute_value;

// Re-export specific types to avoid conflicts
pub use attribute_taxonomy::Entity as AttributeTaxonomy;
pub use download_permission::Entity as DownloadPermission;
pub use post::{Entity as Post, Model as PostModel};
pub use post_meta::Entity as PostMeta;
pub use product::{Entity as Product, Model as ProductModel};
pub use product_attribute::{Entity as ProductAttribute, Model as ProductAttributeModel};
pub use product_attribute_value::{
    Entity as ProductAttributeValue, Model as ProductAttributeValueModel,
};
pub use product_download::{Entity as ProductDownload, Model as ProductDownloadModel};
pub use product_relationship::Entity as ProductRelationship;
pub use term::{Entity as Term, Model as TermModel};
pub use term_relationship::Entity as TermRelationship;
pub use variation_attribute_value::Entity as VariationAttributeValue;
