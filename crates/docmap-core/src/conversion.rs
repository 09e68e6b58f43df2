//! Named bidirectional conversions and their registry.
//!
//! A conversion is the statically typed form of a `to_<name>`/`from_<name>`
//! pair declared on an entity type. The registry is keyed by the owning
//! entity type and the canonical [`ConversionName`].

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use docmap_model::{EntityHandle, Value};

use crate::correlation::Accumulator;
use crate::error::Result;
use crate::naming::ConversionName;
use crate::session::Session;
use crate::tree::MappingTree;

pub type ForwardFn = Rc<dyn Fn(&EntityHandle, &mut Session) -> Result<Option<Value>>>;
pub type ReverseFn = Rc<
    dyn Fn(&Value, Option<&EntityHandle>, &mut Accumulator, &mut Session) -> Result<Option<EntityHandle>>,
>;

#[derive(Clone)]
pub struct Conversion {
    name: ConversionName,
    forward: ForwardFn,
    reverse: ReverseFn,
}

impl Conversion {
    pub fn new<F, R>(name: ConversionName, forward: F, reverse: R) -> Self
    where
        F: Fn(&EntityHandle, &mut Session) -> Result<Option<Value>> + 'static,
        R: Fn(&Value, Option<&EntityHandle>, &mut Accumulator, &mut Session) -> Result<Option<EntityHandle>>
            + 'static,
    {
        Self {
            name,
            forward: Rc::new(forward),
            reverse: Rc::new(reverse),
        }
    }

    /// Exposes a nested mapping tree as a conversion.
    ///
    /// The forward side materializes a fresh document; the reverse side absorbs
    /// into the given entity (or one built by the tree's entity factory) and
    /// shares the caller's accumulator.
    pub fn from_mapping(name: ConversionName, tree: Rc<MappingTree>) -> Self {
        let forward_tree = Rc::clone(&tree);
        Self::new(
            name,
            move |entity, session| {
                Ok(forward_tree
                    .materialize(session, entity, None)?
                    .map(Value::Document))
            },
            move |value, existing, accumulator, session| {
                let Some(doc) = value.as_document() else {
                    tracing::trace!(kind = value.kind(), "conversion input is not a document");
                    return Ok(None);
                };
                tree.absorb_with(session, doc, existing, accumulator)
            },
        )
    }

    pub fn name(&self) -> &ConversionName {
        &self.name
    }

    pub fn forward(&self, entity: &EntityHandle, session: &mut Session) -> Result<Option<Value>> {
        (self.forward)(entity, session)
    }

    pub fn reverse(
        &self,
        value: &Value,
        existing: Option<&EntityHandle>,
        accumulator: &mut Accumulator,
        session: &mut Session,
    ) -> Result<Option<EntityHandle>> {
        (self.reverse)(value, existing, accumulator, session)
    }
}

impl fmt::Debug for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversion")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Conversions available to lenses, built once when mappings are declared.
#[derive(Debug, Default, Clone)]
pub struct ConversionRegistry {
    conversions: BTreeMap<(String, ConversionName), Conversion>,
}

impl ConversionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, owner: impl Into<String>, conversion: Conversion) -> &mut Self {
        let owner = owner.into();
        let key = (owner, conversion.name.clone());
        if self.conversions.contains_key(&key) {
            tracing::warn!(
                owner = %key.0,
                conversion = %key.1,
                "replacing previously registered conversion"
            );
        }
        self.conversions.insert(key, conversion);
        self
    }

    pub fn get(&self, owner: &str, name: &ConversionName) -> Option<&Conversion> {
        self.conversions.get(&(owner.to_string(), name.clone()))
    }

    pub fn has_conversion(&self, owner: &str, name: &ConversionName) -> bool {
        self.get(owner, name).is_some()
    }

    pub fn len(&self) -> usize {
        self.conversions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversions.is_empty()
    }
}
