//! Entity, document and schema types consumed by the docmap mapping engine.
//!
//! # Module Organization
//!
//! - [`value`]: dynamic values exchanged between both graphs
//! - [`entity`]: the source entity interface and its shared handle
//! - [`record`]: an in-memory entity implementation driven by declared types
//! - [`document`]: target document instances
//! - [`schema`]: the document class family
//! - [`options`]: mapping-tree node configuration

pub mod document;
pub mod entity;
pub mod error;
pub mod options;
pub mod record;
pub mod schema;
pub mod value;

pub use document::{DocHandle, Element};
pub use entity::{AssociationReflection, Cardinality, Entity, EntityHandle, Related};
pub use error::{ModelError, Result};
pub use options::NodeOptions;
pub use record::{EntityCatalog, EntityType, Record};
pub use schema::{ClassDef, Schema};
pub use value::Value;
