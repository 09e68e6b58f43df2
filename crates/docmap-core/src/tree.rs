//! Root of a declared mapping between one entity type and one document class.

use std::fmt;
use std::rc::Rc;

use docmap_model::{DocHandle, EntityHandle, ModelError, NodeOptions, Schema, Value};

use crate::compare::attributes_match;
use crate::correlation::Accumulator;
use crate::error::{MapError, Result};
use crate::factory::{Factory, apply_attributes};
use crate::node::{Node, Pass};
use crate::scope::Scope;
use crate::session::Session;

pub type EntityFactory = Rc<dyn Fn() -> std::result::Result<EntityHandle, ModelError>>;

/// An immutable mapping tree, shared by every materialize and absorb call.
pub struct MappingTree {
    entity_type: String,
    class: String,
    factory: Factory,
    entity_factory: Option<EntityFactory>,
    options: NodeOptions,
    children: Vec<Node>,
}

pub struct MappingTreeBuilder {
    schema: Rc<Schema>,
    entity_type: String,
    class: String,
    entity_factory: Option<EntityFactory>,
    options: NodeOptions,
    children: Vec<Node>,
}

impl MappingTreeBuilder {
    /// Constructor used when absorbing without an existing entity.
    pub fn entity_factory<F>(mut self, f: F) -> Self
    where
        F: Fn() -> std::result::Result<EntityHandle, ModelError> + 'static,
    {
        self.entity_factory = Some(Rc::new(f));
        self
    }

    pub fn options(mut self, options: NodeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn allow_blank(mut self) -> Self {
        self.options.allow_blank = true;
        self
    }

    pub fn default_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options = self.options.default_attribute(name, value);
        self
    }

    pub fn child(mut self, node: Node) -> Self {
        self.children.push(node);
        self
    }

    pub fn children(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(nodes);
        self
    }

    /// Validates every class and node configuration and freezes the tree.
    pub fn build(self) -> Result<MappingTree> {
        let factory = Factory::new(self.schema);
        factory.verify(&self.class)?;
        let mut children = self.children;
        let mut namespaces = Vec::new();
        for child in &mut children {
            child.resolve(&factory, Some(&self.class), &mut namespaces)?;
        }
        Ok(MappingTree {
            entity_type: self.entity_type,
            class: self.class,
            factory,
            entity_factory: self.entity_factory,
            options: self.options,
            children,
        })
    }
}

impl MappingTree {
    pub fn builder(
        schema: Rc<Schema>,
        entity_type: impl Into<String>,
        class: impl Into<String>,
    ) -> MappingTreeBuilder {
        MappingTreeBuilder {
            schema,
            entity_type: entity_type.into(),
            class: class.into(),
            entity_factory: None,
            options: NodeOptions::default(),
            children: Vec::new(),
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// Writes `entity` into `existing`, or into a new instance of the tree's class.
    ///
    /// Returns `None` when no child was present and the tree does not allow blanks.
    pub fn materialize(
        &self,
        session: &mut Session,
        entity: &EntityHandle,
        existing: Option<&DocHandle>,
    ) -> Result<Option<DocHandle>> {
        let _span = tracing::debug_span!(
            "materialize",
            entity_type = %self.entity_type,
            class = %self.class
        )
        .entered();
        self.check_entity(entity)?;

        let doc = match existing {
            Some(doc) => {
                apply_attributes(doc, &self.options.default_attributes);
                doc.clone()
            }
            None => self
                .factory
                .build_with(&self.class, &self.options.default_attributes)?,
        };
        let mut accumulator = Accumulator::new();
        let mut cx = Pass {
            session,
            factory: &self.factory,
            accumulator: &mut accumulator,
        };
        let scope = Scope::root();
        let mut present = false;
        for child in &self.children {
            present |= child.materialize(&mut cx, &scope, entity, &doc)?;
        }
        if present || self.options.allow_blank {
            Ok(Some(doc))
        } else {
            tracing::debug!("no mapping produced a value");
            Ok(None)
        }
    }

    /// Reads `doc` into `existing`, or into an entity built by the entity factory.
    pub fn absorb(
        &self,
        session: &mut Session,
        doc: &DocHandle,
        existing: Option<&EntityHandle>,
    ) -> Result<Option<EntityHandle>> {
        let mut accumulator = Accumulator::new();
        self.absorb_with(session, doc, existing, &mut accumulator)
    }

    /// Like [`MappingTree::absorb`], sharing a caller's correlation accumulator.
    pub fn absorb_with(
        &self,
        session: &mut Session,
        doc: &DocHandle,
        existing: Option<&EntityHandle>,
        accumulator: &mut Accumulator,
    ) -> Result<Option<EntityHandle>> {
        let _span = tracing::debug_span!(
            "absorb",
            entity_type = %self.entity_type,
            class = %self.class
        )
        .entered();

        let class = doc.class();
        if !self.factory.is_a(&class, &self.class) {
            tracing::trace!(actual = %class, "document class does not match");
            return Ok(None);
        }
        if !attributes_match(
            &self.options.default_attributes,
            &doc.attributes(),
            &self.options.discriminators,
        ) {
            tracing::trace!("document attributes do not match declared defaults");
            return Ok(None);
        }

        let entity = match existing {
            Some(entity) => {
                self.check_entity(entity)?;
                entity.clone()
            }
            None => {
                let build = self
                    .entity_factory
                    .as_ref()
                    .ok_or_else(|| MapError::MissingEntityFactory(self.entity_type.clone()))?;
                build()?
            }
        };

        let mut cx = Pass {
            session,
            factory: &self.factory,
            accumulator,
        };
        let scope = Scope::root();
        let mut present = false;
        for child in &self.children {
            present |= child.absorb(&mut cx, &scope, doc, &entity)?;
        }
        if present || self.options.allow_blank {
            Ok(Some(entity))
        } else {
            tracing::debug!("no mapping consumed a value");
            Ok(None)
        }
    }

    fn check_entity(&self, entity: &EntityHandle) -> Result<()> {
        let actual = entity.entity_type();
        if actual != self.entity_type {
            return Err(MapError::InvalidEntityObject {
                expected: self.entity_type.clone(),
                actual,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for MappingTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingTree")
            .field("entity_type", &self.entity_type)
            .field("class", &self.class)
            .field("options", &self.options)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}
