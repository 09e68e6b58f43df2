//! Member, attribute and collection nodes, plus their namespace variants.

use docmap_model::{DocHandle, EntityHandle, Value};

use super::{FieldRole, Node, Pass, association};
use crate::error::{MapError, Result};
use crate::factory::apply_attributes;
use crate::lens::Accessor;
use crate::scope::Scope;

/// Where the entity-side value of a field comes from.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Source<'a> {
    /// The node's accessor over the current entity.
    Entity,
    /// A key of an enclosing namespace.
    Scope { namespace: &'a str, key: &'a str },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Spec<'a> {
    pub role: FieldRole,
    pub field: &'a str,
    pub source: Source<'a>,
}

pub(super) fn materialize(
    node: &Node,
    spec: Spec<'_>,
    cx: &mut Pass<'_>,
    scope: &Scope<'_>,
    entity: &EntityHandle,
    doc: &DocHandle,
) -> Result<bool> {
    let value = match spec.source {
        Source::Scope { namespace, key } => scope.get(namespace, key)?.unwrap_or_default(),
        Source::Entity => match &node.accessor {
            Some(accessor) => accessor.get(cx.session, entity)?,
            None => return materialize_structural(node, spec.field, cx, scope, entity, doc),
        },
    };

    if value.is_null() {
        if node.options.allow_nil {
            doc.set_field(spec.field, Value::Null);
            return Ok(true);
        }
        tracing::trace!(field = spec.field, "no value to materialize");
        return Ok(node.options.allow_blank);
    }

    match value {
        Value::Entity(target) => materialize_nested(node, spec.field, cx, scope, &target, doc),
        Value::Document(child) => {
            let children = node.materialize_children(cx, scope, entity, &child)?;
            let present = node.presence(true, children);
            if present {
                doc.set_field(spec.field, child);
            }
            Ok(present)
        }
        Value::List(items) if items.iter().any(|item| item.as_entity().is_some()) => {
            Err(MapError::invalid_lens(format!(
                "`{}` yields several entities; map it with an association node",
                spec.field
            )))
        }
        value => {
            let written = match node.class.as_deref() {
                Some(class) if value.is_scalar() => Value::Document(cx.factory.leaf(
                    class,
                    value,
                    &node.options.default_attributes,
                )?),
                _ => value,
            };
            doc.set_field(spec.field, written);
            Ok(true)
        }
    }
}

/// A member with no accessor: an intermediate instance that only groups children.
pub(super) fn materialize_structural(
    node: &Node,
    field: &str,
    cx: &mut Pass<'_>,
    scope: &Scope<'_>,
    entity: &EntityHandle,
    doc: &DocHandle,
) -> Result<bool> {
    let child = reuse_or_build(node, field, cx, doc)?;
    let present = node.materialize_children(cx, scope, entity, &child)? || node.options.allow_blank;
    if present {
        doc.set_field(field, child);
    }
    Ok(present)
}

fn materialize_nested(
    node: &Node,
    field: &str,
    cx: &mut Pass<'_>,
    scope: &Scope<'_>,
    target: &EntityHandle,
    doc: &DocHandle,
) -> Result<bool> {
    let child = reuse_or_build(node, field, cx, doc)?;
    let children = node.materialize_children(cx, scope, target, &child)?;
    let present = node.presence(true, children);
    if present {
        doc.set_field(field, child);
    }
    Ok(present)
}

/// The instance already at `field` when it has the right class, else a new one.
fn reuse_or_build(
    node: &Node,
    field: &str,
    cx: &Pass<'_>,
    doc: &DocHandle,
) -> Result<DocHandle> {
    let class = node
        .class
        .as_deref()
        .ok_or_else(|| MapError::unresolved_class(field))?;
    match doc.field(field) {
        Some(Value::Document(existing)) if cx.factory.is_a(&existing.class(), class) => {
            apply_attributes(&existing, &node.options.default_attributes);
            Ok(existing)
        }
        _ => cx.factory.build_with(class, &node.options.default_attributes),
    }
}

pub(super) fn absorb(
    node: &Node,
    spec: Spec<'_>,
    cx: &mut Pass<'_>,
    scope: &Scope<'_>,
    doc: &DocHandle,
    entity: &EntityHandle,
) -> Result<bool> {
    let value = doc.field(spec.field).unwrap_or_default();
    if value.is_null() {
        if node.options.allow_nil {
            write_through(node, spec, cx, scope, entity, Value::Null)?;
            return Ok(true);
        }
        tracing::trace!(field = spec.field, "field is empty");
        return Ok(node.options.allow_blank);
    }
    if !node.admits(cx.factory, &value) {
        tracing::trace!(
            field = spec.field,
            class = node.class.as_deref().unwrap_or_default(),
            "class or default attributes do not match"
        );
        return Ok(false);
    }

    if let (Source::Entity, Some(name)) = (
        spec.source,
        node.accessor.as_ref().and_then(Accessor::relation_name),
    ) {
        let Value::Document(child) = &value else {
            tracing::trace!(field = spec.field, kind = value.kind(), "relation needs a document");
            return Ok(false);
        };
        return association::absorb_related(node, name, cx, scope, child, entity);
    }

    let incoming = match (&node.accessor, spec.source) {
        (Some(accessor), Source::Entity) if accessor.wants_scalar() => value.scalar(),
        _ if spec.role == FieldRole::Attribute => value.scalar(),
        _ => value.clone(),
    };
    let produced = write_through(node, spec, cx, scope, entity, incoming)?;
    let children = match value.as_document() {
        Some(child) if !node.children.is_empty() => {
            node.absorb_children(cx, scope, child, entity)?
        }
        _ => false,
    };
    Ok(node.presence(produced, children))
}

/// Writes an absorbed value to the entity or the enclosing namespace.
fn write_through(
    node: &Node,
    spec: Spec<'_>,
    cx: &mut Pass<'_>,
    scope: &Scope<'_>,
    entity: &EntityHandle,
    value: Value,
) -> Result<bool> {
    match (spec.source, &node.accessor) {
        (Source::Scope { namespace, key }, _) => {
            scope.set(namespace, key, value)?;
            Ok(true)
        }
        (Source::Entity, Some(accessor)) => Ok(accessor
            .set(cx.session, entity, value, cx.accumulator)?
            .is_some()),
        (Source::Entity, None) => Ok(true),
    }
}

pub(super) fn absorb_collection(
    node: &Node,
    field: &str,
    element: Option<&(String, Option<String>)>,
    cx: &mut Pass<'_>,
    scope: &Scope<'_>,
    doc: &DocHandle,
    entity: &EntityHandle,
) -> Result<bool> {
    let Some(Value::Document(aggregate)) = doc.field(field) else {
        tracing::trace!(field, "collection is empty");
        return Ok(node.options.allow_blank);
    };
    if !node.admits(cx.factory, &Value::Document(aggregate.clone())) {
        tracing::trace!(field, "collection class or default attributes do not match");
        return Ok(false);
    }
    if let Some((member, Some(class))) = element {
        let items = match aggregate.field(member) {
            Some(Value::List(items)) => items,
            Some(item) => vec![item],
            None => Vec::new(),
        };
        let foreign = items.iter().any(|item| {
            item.as_document()
                .is_some_and(|element| !cx.factory.is_a(&element.class(), class))
        });
        if foreign {
            tracing::trace!(field, member = %member, "collection element of unexpected class");
            return Ok(false);
        }
    }
    Ok(node.absorb_children(cx, scope, &aggregate, entity)? || node.options.allow_blank)
}
