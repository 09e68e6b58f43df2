//! Instance factory for document classes of one schema family.

use std::collections::BTreeMap;
use std::rc::Rc;

use docmap_model::{ClassDef, DocHandle, Element, Schema, Value};

use crate::error::{MapError, Result};

#[derive(Debug, Clone)]
pub struct Factory {
    schema: Rc<Schema>,
}

impl Factory {
    pub fn new(schema: Rc<Schema>) -> Self {
        Self { schema }
    }

    /// Fails with an invalid-mapping-class error unless `class` belongs to the family.
    pub fn verify(&self, class: &str) -> Result<&ClassDef> {
        self.schema
            .get(class)
            .map_err(|_| MapError::InvalidMappingClass {
                class: class.to_string(),
                family: self.schema.family.clone(),
            })
    }

    /// A new instance carrying the class's default fields and attributes.
    ///
    /// Correlation attribute names declared anywhere up the parent chain are
    /// registered on the instance, but no key is assigned yet.
    pub fn build(&self, class: &str) -> Result<DocHandle> {
        let def = self.verify(class)?;
        let mut element = Element::new(class);
        for (name, value) in &def.defaults {
            element.set_field(name.clone(), value.clone());
        }
        for (name, value) in &def.attributes {
            element.set_attribute(name.clone(), value.clone());
        }
        for attribute in self.correlation_attributes(class) {
            element.declare_correlation(attribute);
        }
        Ok(DocHandle::new(element))
    }

    pub fn build_with(&self, class: &str, attributes: &BTreeMap<String, Value>) -> Result<DocHandle> {
        let doc = self.build(class)?;
        apply_attributes(&doc, attributes);
        Ok(doc)
    }

    /// A leaf instance wrapping a scalar value.
    pub fn leaf(
        &self,
        class: &str,
        content: Value,
        attributes: &BTreeMap<String, Value>,
    ) -> Result<DocHandle> {
        let doc = self.build_with(class, attributes)?;
        doc.borrow_mut().set_content(content);
        Ok(doc)
    }

    pub fn member_class(&self, parent: &str, field: &str) -> Option<&str> {
        self.schema.member_class(parent, field)
    }

    pub fn is_a(&self, class: &str, ancestor: &str) -> bool {
        self.schema.is_a(class, ancestor)
    }

    pub fn correlation_attributes(&self, class: &str) -> Vec<String> {
        let mut attributes = Vec::new();
        let mut current = self.schema.classes.get(class);
        for _ in 0..=self.schema.classes.len() {
            let Some(def) = current else {
                break;
            };
            for attribute in &def.correlation {
                if !attributes.contains(attribute) {
                    attributes.push(attribute.clone());
                }
            }
            current = def
                .parent
                .as_deref()
                .and_then(|parent| self.schema.classes.get(parent));
        }
        attributes
    }
}

pub(crate) fn apply_attributes(doc: &DocHandle, attributes: &BTreeMap<String, Value>) {
    for (name, value) in attributes {
        doc.set_attribute(name.clone(), value.clone());
    }
}
