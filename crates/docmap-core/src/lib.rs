//! Bidirectional mapping between entity graphs and document graphs.
//!
//! A [`MappingTree`] is declared once per (entity type, document class) pair
//! and then run in either direction:
//!
//! - [`MappingTree::materialize`]: entity graph to document graph
//! - [`MappingTree::absorb`]: document graph to entity graph
//!
//! # Module Organization
//!
//! - [`naming`]: canonical names for generated conversion pairs
//! - [`conversion`]: the conversion registry
//! - [`correlation`]: identity reconciliation for shared entities
//! - [`session`]: the context carried across calls
//! - [`factory`]: document instance construction
//! - [`lens`]: composable accessors over entity state
//! - [`scope`]: namespace dictionaries threaded through a traversal
//! - [`compare`]: structural matching used to gate branches
//! - [`node`] and [`tree`]: the mapping tree itself

pub mod compare;
pub mod conversion;
pub mod correlation;
pub mod error;
pub mod factory;
pub mod lens;
pub mod naming;
pub mod node;
pub mod scope;
pub mod session;
pub mod tree;

pub use conversion::{Conversion, ConversionRegistry};
pub use correlation::{Accumulator, CorrelationCache};
pub use error::{MapError, Result};
pub use factory::Factory;
pub use lens::{Accessor, Lens, Transform};
pub use naming::{ConversionName, Term};
pub use node::Node;
pub use scope::Scope;
pub use session::Session;
pub use tree::{MappingTree, MappingTreeBuilder};

/// Declares a mapping tree; the entry point the declarative front-end calls.
pub fn build_mapping(
    schema: std::rc::Rc<docmap_model::Schema>,
    entity_type: impl Into<String>,
    class: impl Into<String>,
    options: docmap_model::NodeOptions,
) -> MappingTreeBuilder {
    MappingTree::builder(schema, entity_type, class).options(options)
}
