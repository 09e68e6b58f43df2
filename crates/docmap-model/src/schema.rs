//! The document class family.
//!
//! A [`Schema`] is the registry of every class generated for one target
//! schema. Family membership is a lookup in that registry, and subtyping
//! follows the parent each class declares.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::value::Value;

/// Declaration of one document class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassDef {
    pub name: String,
    pub parent: Option<String>,
    /// Member name to member class.
    pub members: BTreeMap<String, String>,
    /// Field values every new instance starts with.
    pub defaults: BTreeMap<String, Value>,
    /// Out-of-band attributes every new instance starts with.
    pub attributes: BTreeMap<String, Value>,
    /// Correlation attribute names instances of this class expose.
    pub correlation: Vec<String>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn member(mut self, name: impl Into<String>, class: impl Into<String>) -> Self {
        self.members.insert(name.into(), class.into());
        self
    }

    pub fn default_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn correlated_by(mut self, attribute: impl Into<String>) -> Self {
        self.correlation.push(attribute.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Name of the family's base namespace, e.g. `nc`.
    pub family: String,
    #[serde(default)]
    pub classes: BTreeMap<String, ClassDef>,
}

#[derive(Deserialize)]
struct SchemaFile {
    family: String,
    #[serde(default)]
    classes: Vec<ClassDef>,
}

impl Schema {
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            classes: BTreeMap::new(),
        }
    }

    /// Adds a class declaration, replacing any previous one of the same name.
    pub fn class(mut self, class: ClassDef) -> Self {
        self.classes.insert(class.name.clone(), class);
        self
    }

    /// Parses a schema authored as `{"family": .., "classes": [..]}`.
    ///
    /// Every class must be declared exactly once.
    pub fn from_json(text: &str) -> Result<Self> {
        let file: SchemaFile = serde_json::from_str(text)?;
        let mut classes = BTreeMap::new();
        for class in file.classes {
            if classes.contains_key(&class.name) {
                return Err(ModelError::DuplicateClass { class: class.name });
            }
            classes.insert(class.name.clone(), class);
        }
        Ok(Self {
            family: file.family,
            classes,
        })
    }

    pub fn contains(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    pub fn get(&self, class: &str) -> Result<&ClassDef> {
        self.classes
            .get(class)
            .ok_or_else(|| ModelError::UnknownClass(class.to_string()))
    }

    /// True when `class` is `ancestor` or declares it somewhere up its parent chain.
    pub fn is_a(&self, class: &str, ancestor: &str) -> bool {
        let mut current = Some(class);
        // Parent chains are bounded by the class count; a cycle cannot loop forever.
        for _ in 0..=self.classes.len() {
            let Some(name) = current else {
                return false;
            };
            if name == ancestor {
                return true;
            }
            current = self
                .classes
                .get(name)
                .and_then(|def| def.parent.as_deref());
        }
        false
    }

    /// Class of the declared member `field` on `parent`, searching inherited members.
    pub fn member_class(&self, parent: &str, field: &str) -> Option<&str> {
        let mut current = self.classes.get(parent);
        for _ in 0..=self.classes.len() {
            let def = current?;
            if let Some(class) = def.members.get(field) {
                return Some(class);
            }
            current = def
                .parent
                .as_deref()
                .and_then(|name| self.classes.get(name));
        }
        None
    }
}
