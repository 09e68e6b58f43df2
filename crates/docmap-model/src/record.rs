//! In-memory reference implementation of [`Entity`].
//!
//! An [`EntityCatalog`] holds the declared entity types; every [`Record`]
//! keeps a handle to its catalog so associations can instantiate their
//! target type on demand.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use crate::entity::{AssociationReflection, Cardinality, Entity, EntityHandle, Related};
use crate::error::{ModelError, Result};
use crate::value::Value;

#[derive(Debug, Clone)]
struct AssociationDef {
    cardinality: Cardinality,
    target: String,
}

/// Declaration of one entity type: its attributes and associations.
#[derive(Debug, Clone, Default)]
pub struct EntityType {
    name: String,
    attributes: BTreeSet<String>,
    associations: BTreeMap<String, AssociationDef>,
}

impl EntityType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.insert(name.into());
        self
    }

    pub fn attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn has_one(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.association(name, Cardinality::One, target)
    }

    pub fn has_many(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.association(name, Cardinality::Many, target)
    }

    pub fn has_many_through(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.association(name, Cardinality::Indirect, target)
    }

    fn association(
        mut self,
        name: impl Into<String>,
        cardinality: Cardinality,
        target: impl Into<String>,
    ) -> Self {
        self.associations.insert(
            name.into(),
            AssociationDef {
                cardinality,
                target: target.into(),
            },
        );
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Cheaply clonable set of entity type declarations.
#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    types: Rc<BTreeMap<String, EntityType>>,
}

impl EntityCatalog {
    pub fn new(types: impl IntoIterator<Item = EntityType>) -> Self {
        let types = types
            .into_iter()
            .map(|ty| (ty.name.clone(), ty))
            .collect();
        Self {
            types: Rc::new(types),
        }
    }

    pub fn entity_type(&self, name: &str) -> Option<&EntityType> {
        self.types.get(name)
    }

    pub fn create(&self, type_name: &str) -> Result<EntityHandle> {
        let ty = self
            .types
            .get(type_name)
            .ok_or_else(|| ModelError::UnknownEntityType(type_name.to_string()))?;
        let associations = ty
            .associations
            .iter()
            .map(|(name, def)| {
                let empty = match def.cardinality {
                    Cardinality::One => Related::One(None),
                    Cardinality::Many | Cardinality::Indirect => Related::Many(Vec::new()),
                };
                (name.clone(), empty)
            })
            .collect();
        Ok(EntityHandle::new(Record {
            catalog: self.clone(),
            type_name: type_name.to_string(),
            attributes: BTreeMap::new(),
            associations,
        }))
    }

    /// Returns a constructor closure for `type_name`.
    pub fn factory(&self, type_name: &str) -> impl Fn() -> Result<EntityHandle> + 'static {
        let catalog = self.clone();
        let type_name = type_name.to_string();
        move || catalog.create(&type_name)
    }
}

/// A dynamically typed entity record.
pub struct Record {
    catalog: EntityCatalog,
    type_name: String,
    attributes: BTreeMap<String, Value>,
    associations: BTreeMap<String, Related>,
}

impl Record {
    fn declaration(&self) -> Option<&EntityType> {
        self.catalog.entity_type(&self.type_name)
    }

    fn association_def(&self, name: &str) -> Result<&AssociationDef> {
        self.declaration()
            .and_then(|ty| ty.associations.get(name))
            .ok_or_else(|| ModelError::UnknownAssociation {
                entity_type: self.type_name.clone(),
                association: name.to_string(),
            })
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("type_name", &self.type_name)
            .field("attributes", &self.attributes)
            .field("associations", &self.associations)
            .finish()
    }
}

impl Entity for Record {
    fn entity_type(&self) -> &str {
        &self.type_name
    }

    fn read_attribute(&self, name: &str) -> Option<Value> {
        let declared = self
            .declaration()
            .is_some_and(|ty| ty.attributes.contains(name));
        if !declared {
            return None;
        }
        Some(self.attributes.get(name).cloned().unwrap_or_default())
    }

    fn write_attribute(&mut self, name: &str, value: Value) -> Result<()> {
        let declared = self
            .declaration()
            .is_some_and(|ty| ty.attributes.contains(name));
        if !declared {
            return Err(ModelError::UnknownAttribute {
                entity_type: self.type_name.clone(),
                attribute: name.to_string(),
            });
        }
        self.attributes.insert(name.to_string(), value);
        Ok(())
    }

    fn reflect_association(&self, name: &str) -> Option<AssociationReflection> {
        let def = self.declaration()?.associations.get(name)?;
        Some(AssociationReflection {
            name: name.to_string(),
            cardinality: def.cardinality,
            target_type: def.target.clone(),
        })
    }

    fn related(&self, name: &str) -> Option<Related> {
        self.associations.get(name).cloned()
    }

    fn instantiate_related(&self, name: &str) -> Result<EntityHandle> {
        let target = self.association_def(name)?.target.clone();
        self.catalog.create(&target)
    }

    fn attach_related(&mut self, name: &str, target: EntityHandle) -> Result<()> {
        let def = self.association_def(name)?;
        if def.cardinality == Cardinality::Indirect {
            return Err(ModelError::ReadOnlyAssociation {
                entity_type: self.type_name.clone(),
                association: name.to_string(),
            });
        }
        // A self-reference is borrowed mutably right now, through us.
        let actual = target
            .try_entity_type()
            .unwrap_or_else(|| self.type_name.clone());
        if actual != def.target {
            return Err(ModelError::TargetTypeMismatch {
                association: name.to_string(),
                expected: def.target.clone(),
                actual,
            });
        }
        match self.associations.get_mut(name) {
            Some(Related::One(slot)) => *slot = Some(target),
            Some(Related::Many(targets)) => targets.push(target),
            None => {
                self.associations
                    .insert(name.to_string(), Related::One(Some(target)));
            }
        }
        Ok(())
    }
}
