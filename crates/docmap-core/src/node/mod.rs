//! Mapping-tree nodes.
//!
//! Every node takes part in both directions. `materialize` reads the entity
//! and writes into the current document; `absorb` reads the current document
//! and writes into the entity. Both return whether the node is present.
//!
//! Presence is aggregated with OR across children: a container is present
//! when its own step produced something and at least one child is present,
//! or when `allow_blank` is set.

mod association;
mod callback;
mod field;
mod guard;
mod namespace;

use docmap_model::{DocHandle, EntityHandle, NodeOptions, Value};

use crate::compare::attributes_match;
use crate::correlation::Accumulator;
use crate::error::{MapError, Result};
use crate::factory::Factory;
use crate::lens::{Accessor, Lens};
use crate::scope::Scope;
use crate::session::Session;

pub use callback::CallbackFn;
use callback::{Callback, Direction};
use guard::Guard;

/// Mutable state shared by every node during one root call.
pub(crate) struct Pass<'a> {
    pub session: &'a mut Session,
    pub factory: &'a Factory,
    pub accumulator: &'a mut Accumulator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldRole {
    /// A nested schema-class instance.
    Member,
    /// A scalar, or a leaf instance wrapping one.
    Attribute,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Field {
        role: FieldRole,
        field: String,
    },
    Collection {
        field: String,
        element: Option<(String, Option<String>)>,
    },
    Association {
        field: String,
    },
    Guard(Guard),
    Namespace {
        name: String,
    },
    NamespaceField {
        role: FieldRole,
        namespace: String,
        key: String,
        field: String,
    },
    Callback(Callback),
}

/// One traversal rule of a mapping tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) accessor: Option<Accessor>,
    pub(crate) class: Option<String>,
    pub(crate) options: NodeOptions,
    pub(crate) children: Vec<Node>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            accessor: None,
            class: None,
            options: NodeOptions::default(),
            children: Vec::new(),
        }
    }

    /// A member holding one nested schema-class instance.
    pub fn member(field: impl Into<String>) -> Self {
        Self::new(NodeKind::Field {
            role: FieldRole::Member,
            field: field.into(),
        })
    }

    /// A scalar field, coerced into a leaf instance when a class is known.
    pub fn attribute(field: impl Into<String>) -> Self {
        Self::new(NodeKind::Field {
            role: FieldRole::Attribute,
            field: field.into(),
        })
    }

    /// An aggregate instance whose children share one accumulation context.
    pub fn collection(field: impl Into<String>) -> Self {
        Self::new(NodeKind::Collection {
            field: field.into(),
            element: None,
        })
    }

    /// A singular or plural relation bound through an accessor.
    pub fn association(field: impl Into<String>, accessor: impl Into<Accessor>) -> Self {
        Self::new(NodeKind::Association {
            field: field.into(),
        })
        .accessor(accessor)
    }

    /// A branch selected by the value of one scalar attribute.
    ///
    /// Fails unless `values` is non-empty and `default` is given (and admissible)
    /// whenever there is more than one value.
    pub fn guard(lens: Lens, values: Vec<Value>, default: Option<Value>) -> Result<Self> {
        Ok(Self::new(NodeKind::Guard(Guard::new(lens, values, default)?)))
    }

    /// Groups scattered keys into one value read and written through `accessor`.
    pub fn namespace(name: impl Into<String>, accessor: impl Into<Accessor>) -> Self {
        Self::new(NodeKind::Namespace { name: name.into() }).accessor(accessor)
    }

    pub fn namespace_member(
        namespace: impl Into<String>,
        key: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self::new(NodeKind::NamespaceField {
            role: FieldRole::Member,
            namespace: namespace.into(),
            key: key.into(),
            field: field.into(),
        })
    }

    pub fn namespace_attribute(
        namespace: impl Into<String>,
        key: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self::new(NodeKind::NamespaceField {
            role: FieldRole::Attribute,
            namespace: namespace.into(),
            key: key.into(),
            field: field.into(),
        })
    }

    /// Runs `f` while materializing; absorbing passes through.
    pub fn on_materialize<F>(f: F) -> Self
    where
        F: Fn(&EntityHandle, &DocHandle, &mut Accumulator, &Scope<'_>) -> Result<bool> + 'static,
    {
        Self::new(NodeKind::Callback(Callback::new(Direction::Materialize, f)))
    }

    /// Runs `f` while absorbing; materializing passes through.
    pub fn on_absorb<F>(f: F) -> Self
    where
        F: Fn(&EntityHandle, &DocHandle, &mut Accumulator, &Scope<'_>) -> Result<bool> + 'static,
    {
        Self::new(NodeKind::Callback(Callback::new(Direction::Absorb, f)))
    }

    pub fn lens(self, lens: Lens) -> Self {
        self.accessor(lens)
    }

    pub fn accessor(mut self, accessor: impl Into<Accessor>) -> Self {
        self.accessor = Some(accessor.into());
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    /// Names the repeated member of a collection's aggregate instance.
    pub fn element(mut self, member: impl Into<String>) -> Self {
        if let NodeKind::Collection { element, .. } = &mut self.kind {
            *element = Some((member.into(), None));
        }
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

    pub fn allow_nil(mut self) -> Self {
        self.options.allow_nil = true;
        self
    }

    pub fn default_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options = self.options.default_attribute(name, value);
        self
    }

    pub fn discriminator(mut self, field: impl Into<String>) -> Self {
        self.options = self.options.discriminator(field);
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

    fn field_spec(&self) -> field::Spec<'_> {
        match &self.kind {
            NodeKind::NamespaceField {
                role,
                namespace,
                key,
                field,
            } => field::Spec {
                role: *role,
                field,
                source: field::Source::Scope { namespace, key },
            },
            NodeKind::Field { role, field } => field::Spec {
                role: *role,
                field,
                source: field::Source::Entity,
            },
            _ => field::Spec {
                role: FieldRole::Member,
                field: self.field_name().unwrap_or_default(),
                source: field::Source::Entity,
            },
        }
    }

    fn field_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Field { field, .. }
            | NodeKind::Collection { field, .. }
            | NodeKind::Association { field }
            | NodeKind::NamespaceField { field, .. } => Some(field),
            NodeKind::Guard(_) | NodeKind::Namespace { .. } | NodeKind::Callback(_) => None,
        }
    }

    /// Resolves classes against the schema and checks the node's configuration.
    ///
    /// Runs once, when the owning tree is built.
    pub(crate) fn resolve(
        &mut self,
        factory: &Factory,
        parent_class: Option<&str>,
        namespaces: &mut Vec<String>,
    ) -> Result<()> {
        if let Some(field) = self.field_name().map(str::to_string) {
            match &self.class {
                Some(class) => {
                    factory.verify(class)?;
                }
                None => {
                    self.class = parent_class
                        .and_then(|parent| factory.member_class(parent, &field))
                        .map(str::to_string);
                }
            }
            let yields_entities = self
                .accessor
                .as_ref()
                .is_some_and(|accessor| accessor.relation_name().is_some());
            let structural = matches!(
                self.kind,
                NodeKind::Field {
                    role: FieldRole::Member,
                    ..
                } | NodeKind::Collection { .. }
            ) && self.accessor.is_none();
            if self.class.is_none() && (yields_entities || structural) {
                return Err(MapError::unresolved_class(field));
            }
        }

        match &mut self.kind {
            NodeKind::Field {
                role: FieldRole::Attribute,
                field,
            } if self.accessor.is_none() => {
                return Err(MapError::invalid_lens(format!(
                    "attribute `{field}` has no accessor"
                )));
            }
            NodeKind::Collection { field, .. } if self.accessor.is_some() => {
                return Err(MapError::invalid_lens(format!(
                    "collection `{field}` is structural; bind accessors on its children"
                )));
            }
            NodeKind::Association { field } if self.accessor.is_none() => {
                return Err(MapError::invalid_lens(format!(
                    "association node `{field}` has no accessor"
                )));
            }
            NodeKind::Namespace { name } if self.accessor.is_none() => {
                return Err(MapError::invalid_lens(format!(
                    "namespace `{name}` has no accessor"
                )));
            }
            NodeKind::NamespaceField { namespace, .. } if !namespaces.contains(namespace) => {
                return Err(MapError::UnscopedNamespace(namespace.clone()));
            }
            NodeKind::Collection {
                element: Some((member, class)),
                ..
            } => {
                if let Some(aggregate) = &self.class {
                    *class = factory.member_class(aggregate, member).map(str::to_string);
                }
            }
            _ => {}
        }

        let entered = match &self.kind {
            NodeKind::Namespace { name } => {
                namespaces.push(name.clone());
                true
            }
            _ => false,
        };
        let context = match &self.kind {
            NodeKind::Guard(_) | NodeKind::Namespace { .. } | NodeKind::Callback(_) => {
                parent_class.map(str::to_string)
            }
            _ => self.class.clone(),
        };
        for child in &mut self.children {
            child.resolve(factory, context.as_deref(), namespaces)?;
        }
        if entered {
            namespaces.pop();
        }
        Ok(())
    }

    pub(crate) fn materialize(
        &self,
        cx: &mut Pass<'_>,
        scope: &Scope<'_>,
        entity: &EntityHandle,
        doc: &DocHandle,
    ) -> Result<bool> {
        match &self.kind {
            NodeKind::Field { .. } | NodeKind::NamespaceField { .. } => {
                field::materialize(self, self.field_spec(), cx, scope, entity, doc)
            }
            NodeKind::Collection { field, .. } => {
                field::materialize_structural(self, field, cx, scope, entity, doc)
            }
            NodeKind::Association { field } => {
                association::materialize(self, field, cx, scope, entity, doc)
            }
            NodeKind::Guard(guard) => guard.materialize(self, cx, scope, entity, doc),
            NodeKind::Namespace { name } => {
                namespace::materialize(self, name, cx, scope, entity, doc)
            }
            NodeKind::Callback(callback) => callback.materialize(cx, scope, entity, doc),
        }
    }

    pub(crate) fn absorb(
        &self,
        cx: &mut Pass<'_>,
        scope: &Scope<'_>,
        doc: &DocHandle,
        entity: &EntityHandle,
    ) -> Result<bool> {
        match &self.kind {
            NodeKind::Field { .. } | NodeKind::NamespaceField { .. } => {
                field::absorb(self, self.field_spec(), cx, scope, doc, entity)
            }
            NodeKind::Collection { field, element } => {
                field::absorb_collection(self, field, element.as_ref(), cx, scope, doc, entity)
            }
            NodeKind::Association { field } => {
                association::absorb(self, field, cx, scope, doc, entity)
            }
            NodeKind::Guard(guard) => guard.absorb(self, cx, scope, doc, entity),
            NodeKind::Namespace { name } => namespace::absorb(self, name, cx, scope, doc, entity),
            NodeKind::Callback(callback) => callback.absorb(cx, scope, doc, entity),
        }
    }

    pub(crate) fn materialize_children(
        &self,
        cx: &mut Pass<'_>,
        scope: &Scope<'_>,
        entity: &EntityHandle,
        doc: &DocHandle,
    ) -> Result<bool> {
        let mut present = false;
        for child in &self.children {
            // No short-circuit: later siblings may still need to run for scope effects.
            present |= child.materialize(cx, scope, entity, doc)?;
        }
        Ok(present)
    }

    pub(crate) fn absorb_children(
        &self,
        cx: &mut Pass<'_>,
        scope: &Scope<'_>,
        doc: &DocHandle,
        entity: &EntityHandle,
    ) -> Result<bool> {
        let mut present = false;
        for child in &self.children {
            present |= child.absorb(cx, scope, doc, entity)?;
        }
        Ok(present)
    }

    /// Presence of a node whose own step `produced` a value.
    pub(crate) fn presence(&self, produced: bool, children_present: bool) -> bool {
        (produced && (self.children.is_empty() || children_present)) || self.options.allow_blank
    }

    /// Whether a document-side value passes this node's class and attribute checks.
    pub(crate) fn admits(&self, factory: &Factory, value: &Value) -> bool {
        match value {
            Value::Document(doc) => {
                let class_ok = self
                    .class
                    .as_deref()
                    .is_none_or(|class| factory.is_a(&doc.class(), class));
                class_ok
                    && attributes_match(
                        &self.options.default_attributes,
                        &doc.attributes(),
                        &self.options.discriminators,
                    )
            }
            Value::List(items) => items.iter().all(|item| self.admits(factory, item)),
            _ => self.options.default_attributes.is_empty(),
        }
    }
}

/// Entity already absorbed for a document that carries a correlation key.
pub(crate) fn correlated_entity(cx: &Pass<'_>, doc: &DocHandle) -> Option<EntityHandle> {
    let class = doc.class();
    cx.factory
        .correlation_attributes(&class)
        .iter()
        .find_map(|attribute| {
            let key = doc.attribute(attribute).filter(|key| !key.is_blank())?;
            cx.accumulator.get(attribute, &key.to_string())
        })
}

pub(crate) fn forget_entity(cx: &mut Pass<'_>, doc: &DocHandle) {
    let class = doc.class();
    for attribute in cx.factory.correlation_attributes(&class) {
        if let Some(key) = doc.attribute(&attribute).filter(|key| !key.is_blank()) {
            cx.accumulator.forget(&attribute, &key.to_string());
        }
    }
}

pub(crate) fn remember_entity(cx: &mut Pass<'_>, doc: &DocHandle, entity: &EntityHandle) {
    let class = doc.class();
    for attribute in cx.factory.correlation_attributes(&class) {
        if let Some(key) = doc.attribute(&attribute).filter(|key| !key.is_blank()) {
            cx.accumulator
                .record(&attribute, &key.to_string(), entity.clone());
        }
    }
}
