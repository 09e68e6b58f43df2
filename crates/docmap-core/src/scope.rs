//! Namespace dictionaries threaded through one traversal.

use std::cell::RefCell;
use std::collections::BTreeMap;

use docmap_model::Value;

use crate::error::{MapError, Result};

pub type Namespace = BTreeMap<String, Value>;

/// A parent-linked chain of namespace dictionaries.
///
/// Namespaces are introduced once, by [`Scope::child`]. Reads and writes go
/// to the nearest scope in the chain that defines the namespace.
#[derive(Debug, Default)]
pub struct Scope<'p> {
    parent: Option<&'p Scope<'p>>,
    namespaces: RefCell<BTreeMap<String, Namespace>>,
}

impl<'p> Scope<'p> {
    pub fn root() -> Scope<'static> {
        Scope::default()
    }

    /// A scope below `self` with `namespace` declared empty.
    pub fn child<'s>(&'s self, namespace: &str) -> Scope<'s> {
        let mut namespaces = BTreeMap::new();
        namespaces.insert(namespace.to_string(), Namespace::new());
        Scope {
            parent: Some(self),
            namespaces: RefCell::new(namespaces),
        }
    }

    pub fn defines(&self, namespace: &str) -> bool {
        self.owner(namespace).is_some()
    }

    pub fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>> {
        let scope = self.require(namespace)?;
        Ok(scope
            .namespaces
            .borrow()
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    pub fn set(&self, namespace: &str, key: &str, value: Value) -> Result<()> {
        let scope = self.require(namespace)?;
        scope
            .namespaces
            .borrow_mut()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    /// Removes and returns the dictionary of a namespace this scope declared.
    pub fn take(&self, namespace: &str) -> Option<Namespace> {
        self.namespaces
            .borrow_mut()
            .get_mut(namespace)
            .map(std::mem::take)
    }

    fn owner(&self, namespace: &str) -> Option<&Scope<'p>> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if scope.namespaces.borrow().contains_key(namespace) {
                return Some(scope);
            }
            current = scope.parent;
        }
        None
    }

    fn require(&self, namespace: &str) -> Result<&Scope<'p>> {
        self.owner(namespace)
            .ok_or_else(|| MapError::UnscopedNamespace(namespace.to_string()))
    }
}
