//! The source-entity interface consumed by the mapping engine.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::value::Value;

/// Relationship kind reported by association reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    /// Zero or one related entity.
    One,
    /// Zero or more related entities, in order.
    Many,
    /// Reached through another association; not directly addressable.
    Indirect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationReflection {
    pub name: String,
    pub cardinality: Cardinality,
    pub target_type: String,
}

/// Current contents of an association.
#[derive(Debug, Clone)]
pub enum Related {
    One(Option<EntityHandle>),
    Many(Vec<EntityHandle>),
}

impl Related {
    pub fn into_value(self) -> Value {
        match self {
            Self::One(target) => target.map_or(Value::Null, Value::Entity),
            Self::Many(targets) => Value::List(targets.into_iter().map(Value::Entity).collect()),
        }
    }
}

/// A source record with scalar attributes and associations.
///
/// Implementations are owned by the host application. The engine only reads
/// and writes through this trait and never destroys entities.
pub trait Entity: fmt::Debug {
    fn entity_type(&self) -> &str;

    fn read_attribute(&self, name: &str) -> Option<Value>;

    fn write_attribute(&mut self, name: &str, value: Value) -> Result<()>;

    fn reflect_association(&self, name: &str) -> Option<AssociationReflection>;

    fn related(&self, name: &str) -> Option<Related>;

    /// Creates a new, unattached entity of the association's target type.
    fn instantiate_related(&self, name: &str) -> Result<EntityHandle>;

    /// Appends to a plural association or assigns a singular one.
    fn attach_related(&mut self, name: &str, target: EntityHandle) -> Result<()>;

    fn build_related(&mut self, name: &str) -> Result<EntityHandle> {
        let target = self.instantiate_related(name)?;
        self.attach_related(name, target.clone())?;
        Ok(target)
    }
}

/// Shared handle to an entity; equality and hashing follow identity.
#[derive(Clone)]
pub struct EntityHandle(Rc<RefCell<dyn Entity>>);

impl EntityHandle {
    pub fn new<E: Entity + 'static>(entity: E) -> Self {
        Self(Rc::new(RefCell::new(entity)))
    }

    pub fn borrow(&self) -> Ref<'_, dyn Entity> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, dyn Entity> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn entity_type(&self) -> String {
        self.0.borrow().entity_type().to_string()
    }

    /// The entity type, or `None` while the entity is mutably borrowed.
    ///
    /// During [`EntityHandle::attach`] the only borrowed entity is the owner,
    /// so implementations use this to type-check a target that may be
    /// the owner itself.
    pub fn try_entity_type(&self) -> Option<String> {
        self.0
            .try_borrow()
            .ok()
            .map(|entity| entity.entity_type().to_string())
    }

    pub fn read(&self, name: &str) -> Option<Value> {
        self.0.borrow().read_attribute(name)
    }

    pub fn write(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.0.borrow_mut().write_attribute(name, value.into())
    }

    pub fn related(&self, name: &str) -> Option<Related> {
        self.0.borrow().related(name)
    }

    pub fn reflect(&self, name: &str) -> Option<AssociationReflection> {
        self.0.borrow().reflect_association(name)
    }

    pub fn attach(&self, name: &str, target: EntityHandle) -> Result<()> {
        self.0.borrow_mut().attach_related(name, target)
    }

    fn address(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for EntityHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for EntityHandle {}

impl Hash for EntityHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Associations can be cyclic, so never recurse into the entity.
        match self.0.try_borrow() {
            Ok(entity) => write!(f, "EntityHandle({}@{:p})", entity.entity_type(), self.address()),
            Err(_) => write!(f, "EntityHandle(<borrowed>@{:p})", self.address()),
        }
    }
}
