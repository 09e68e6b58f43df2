//! Document instances of the target schema.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::value::Value;

/// One node of a target document.
///
/// Members, scalar attributes and ordered collections all live in `fields`
/// and keep declaration order. `attributes` holds the out-of-band key/value
/// pairs (correlation ids, type discriminators) that are not child fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Element {
    class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<Value>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    fields: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, Value>,
    #[serde(skip)]
    correlation: BTreeSet<String>,
}

impl Element {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<Value>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn content(&self) -> Option<&Value> {
        self.content.as_ref()
    }

    pub fn set_content(&mut self, content: impl Into<Value>) {
        self.content = Some(content.into());
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Marks `attribute` as a correlation attribute this instance exposes.
    pub fn declare_correlation(&mut self, attribute: impl Into<String>) {
        self.correlation.insert(attribute.into());
    }

    pub fn declares_correlation(&self, attribute: &str) -> bool {
        self.correlation.contains(attribute)
    }
}

/// Shared handle to an [`Element`].
///
/// Handles compare equal when they point at the same instance or when the
/// instances are structurally equal; use [`DocHandle::ptr_eq`] for identity.
#[derive(Clone)]
pub struct DocHandle(Rc<RefCell<Element>>);

impl DocHandle {
    pub fn new(element: Element) -> Self {
        Self(Rc::new(RefCell::new(element)))
    }

    pub fn borrow(&self) -> Ref<'_, Element> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Element> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Replaces this instance's contents with a copy of `other`'s.
    pub fn fill_from(&self, other: &DocHandle) {
        if self.ptr_eq(other) {
            return;
        }
        let element = other.0.borrow().clone();
        *self.0.borrow_mut() = element;
    }

    pub fn class(&self) -> String {
        self.0.borrow().class.clone()
    }

    pub fn content(&self) -> Option<Value> {
        self.0.borrow().content.clone()
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.0.borrow().fields.get(name).cloned()
    }

    pub fn set_field(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.borrow_mut().set_field(name, value);
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.0.borrow().attributes.get(name).cloned()
    }

    pub fn attributes(&self) -> BTreeMap<String, Value> {
        self.0.borrow().attributes.clone()
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.borrow_mut().set_attribute(name, value);
    }

    pub fn declares_correlation(&self, attribute: &str) -> bool {
        self.0.borrow().declares_correlation(attribute)
    }

    /// Follows a dotted member path (`a.b.c`) through nested documents.
    pub fn path(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let mut current = self.field(segments.next()?)?;
        for segment in segments {
            current = current.as_document()?.field(segment)?;
        }
        Some(current)
    }
}

impl PartialEq for DocHandle {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        // Past a cycle only identity is compared.
        let Some(_visit) = Visit::enter(Walk::Compare, self) else {
            return false;
        };
        *self.0.borrow() == *other.0.borrow()
    }
}

impl fmt::Debug for DocHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(element) = self.0.try_borrow() else {
            return f.write_str("DocHandle(<borrowed>)");
        };
        match Visit::enter(Walk::Debug, self) {
            Some(_visit) => f.debug_tuple("DocHandle").field(&*element).finish(),
            None => write!(f, "DocHandle(<cycle {}>)", element.class),
        }
    }
}

impl Serialize for DocHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let element = self.0.borrow();
        let Some(_visit) = Visit::enter(Walk::Serialize, self) else {
            // Written as a reference: the class and the correlation attributes.
            let mut reference = serializer.serialize_struct("Reference", 2)?;
            reference.serialize_field("class", &element.class)?;
            reference.serialize_field("ref", &element.attributes)?;
            return reference.end();
        };
        element.serialize(serializer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Walk {
    Compare,
    Debug,
    Serialize,
}

thread_local! {
    static ACTIVE: RefCell<Vec<(Walk, *const RefCell<Element>)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a handle as being walked; `enter` returns `None` on a cycle.
struct Visit {
    walk: Walk,
    address: *const RefCell<Element>,
}

impl Visit {
    fn enter(walk: Walk, doc: &DocHandle) -> Option<Self> {
        let address = Rc::as_ptr(&doc.0);
        ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            if active.contains(&(walk, address)) {
                return None;
            }
            active.push((walk, address));
            Some(Self { walk, address })
        })
    }
}

impl Drop for Visit {
    fn drop(&mut self) {
        ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(idx) = active
                .iter()
                .rposition(|entry| *entry == (self.walk, self.address))
            {
                active.remove(idx);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_compare_by_identity_or_structure() {
        let a = DocHandle::new(Element::new("nc::TextType").with_content("x"));
        let b = DocHandle::new(Element::new("nc::TextType").with_content("x"));
        assert_eq!(a, b);
        assert!(!a.ptr_eq(&b));
        assert!(a.ptr_eq(&a.clone()));
    }

    #[test]
    fn fill_from_copies_into_the_same_handle() {
        let reserved = DocHandle::new(Element::default());
        let keep = reserved.clone();
        let built = DocHandle::new(Element::new("nc::PersonType").with_field("name", "Jo"));

        reserved.fill_from(&built);
        assert!(keep.ptr_eq(&reserved));
        assert_eq!(keep.class(), "nc::PersonType");
        assert_eq!(keep.field("name"), Some(Value::from("Jo")));
        reserved.fill_from(&keep);
        assert_eq!(keep.class(), "nc::PersonType");
    }

    #[test]
    fn cyclic_documents_serialize_back_references() {
        let a = DocHandle::new(Element::new("nc::PersonType").with_attribute("s:id", "person_1"));
        let b = DocHandle::new(Element::new("nc::PersonType").with_attribute("s:id", "person_2"));
        a.set_field("spouse", b.clone());
        b.set_field("spouse", a.clone());

        let json = serde_json::to_string(&a).unwrap();
        insta::assert_snapshot!(json, @r#"{"class":"nc::PersonType","fields":{"spouse":{"class":"nc::PersonType","fields":{"spouse":{"class":"nc::PersonType","ref":{"s:id":"person_1"}}},"attributes":{"s:id":"person_2"}}},"attributes":{"s:id":"person_1"}}"#);
        assert!(format!("{a:?}").contains("<cycle nc::PersonType>"));

        let twin = DocHandle::new(Element::new("nc::PersonType").with_attribute("s:id", "person_1"));
        twin.set_field("spouse", b.clone());
        assert_eq!(a, twin);
    }

    #[test]
    fn path_walks_nested_members() {
        let inner = DocHandle::new(Element::new("nc::Simple").with_field("streetAddress", "1 Main"));
        let outer = DocHandle::new(Element::new("nc::Detail").with_field("simplified", inner));
        let root = DocHandle::new(Element::new("nc::AddressType").with_field("detail", outer));

        assert_eq!(
            root.path("detail.simplified.streetAddress"),
            Some(Value::from("1 Main"))
        );
        assert_eq!(root.path("detail.missing"), None);
    }

    #[test]
    fn serializes_without_empty_sections() {
        let doc = DocHandle::new(
            Element::new("nc::TextType")
                .with_content("York")
                .with_attribute("s:id", "t1"),
        );
        let json = serde_json::to_string(&doc).unwrap();
        insta::assert_snapshot!(json, @r#"{"class":"nc::TextType","content":"York","attributes":{"s:id":"t1"}}"#);
    }
}
