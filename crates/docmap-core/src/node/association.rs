//! Association nodes: singular and plural relations, one document per entity.

use docmap_model::{Cardinality, DocHandle, EntityHandle, ModelError, Related, Value};

use super::{Node, Pass, correlated_entity, forget_entity, remember_entity};
use crate::error::{MapError, Result};
use crate::scope::Scope;

pub(super) fn materialize(
    node: &Node,
    field: &str,
    cx: &mut Pass<'_>,
    scope: &Scope<'_>,
    entity: &EntityHandle,
    doc: &DocHandle,
) -> Result<bool> {
    let accessor = node
        .accessor
        .as_ref()
        .ok_or_else(|| MapError::invalid_lens(format!("association node `{field}` has no accessor")))?;
    let (items, plural) = match accessor.get(cx.session, entity)? {
        Value::Null => (Vec::new(), false),
        Value::List(items) => (items, true),
        Value::Map(entries) => (entries.into_values().collect(), true),
        single => (vec![single], false),
    };

    let mut produced = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Null => {}
            Value::Entity(target) => {
                let class = node
                    .class
                    .as_deref()
                    .ok_or_else(|| MapError::unresolved_class(field))?;
                let child = cx.factory.build_with(class, &node.options.default_attributes)?;
                let children = node.materialize_children(cx, scope, &target, &child)?;
                if node.presence(true, children) {
                    produced.push(Value::Document(child));
                } else {
                    tracing::trace!(field, "skipping element with no present children");
                }
            }
            Value::Document(child) => produced.push(Value::Document(child)),
            value => produced.push(match node.class.as_deref() {
                Some(class) if value.is_scalar() => Value::Document(cx.factory.leaf(
                    class,
                    value,
                    &node.options.default_attributes,
                )?),
                _ => value,
            }),
        }
    }

    if produced.is_empty() {
        tracing::trace!(field, "association produced nothing");
        return Ok(node.options.allow_blank);
    }
    let value = if plural {
        Value::List(produced)
    } else {
        produced.into_iter().next().unwrap_or_default()
    };
    // Replace rather than append so repeated runs over one document stay stable.
    doc.set_field(field, value);
    Ok(true)
}

pub(super) fn absorb(
    node: &Node,
    field: &str,
    cx: &mut Pass<'_>,
    scope: &Scope<'_>,
    doc: &DocHandle,
    entity: &EntityHandle,
) -> Result<bool> {
    let accessor = node
        .accessor
        .as_ref()
        .ok_or_else(|| MapError::invalid_lens(format!("association node `{field}` has no accessor")))?;
    let items = match doc.field(field) {
        None | Some(Value::Null) => {
            tracing::trace!(field, "association field is empty");
            return Ok(node.options.allow_blank);
        }
        Some(Value::List(items)) => items,
        Some(item) => vec![item],
    };

    let mut present = false;
    for item in items {
        if !node.admits(cx.factory, &item) {
            tracing::trace!(field, "skipping element whose class or attributes do not match");
            continue;
        }
        present |= match (accessor.relation_name(), &item) {
            (Some(name), Value::Document(child)) => {
                absorb_related(node, name, cx, scope, child, entity)?
            }
            (Some(_), other) => {
                tracing::trace!(field, kind = other.kind(), "relation needs a document");
                false
            }
            (None, _) => {
                let incoming = if accessor.wants_scalar() {
                    item.scalar()
                } else {
                    item.clone()
                };
                match accessor.set(cx.session, entity, incoming, cx.accumulator)? {
                    Some(target) => match item.as_document() {
                        Some(child) => {
                            let children = node.absorb_children(cx, scope, child, &target)?;
                            node.presence(true, children)
                        }
                        None => true,
                    },
                    None => false,
                }
            }
        };
    }
    Ok(present || node.options.allow_blank)
}

/// Absorbs `child` into the entity on the far side of relation `name`.
///
/// A singular relation reuses the entity already attached; a plural one gets
/// a new entity per document. Documents carrying a correlation key seen
/// earlier in the call resolve to the entity built for it then.
pub(super) fn absorb_related(
    node: &Node,
    name: &str,
    cx: &mut Pass<'_>,
    scope: &Scope<'_>,
    child: &DocHandle,
    entity: &EntityHandle,
) -> Result<bool> {
    let reflection = entity
        .reflect(name)
        .ok_or_else(|| ModelError::UnknownAssociation {
            entity_type: entity.entity_type(),
            association: name.to_string(),
        })?;
    if reflection.cardinality == Cardinality::Indirect {
        return Err(MapError::invalid_lens(format!(
            "association `{name}` is reached through another association and cannot be written"
        )));
    }
    if let Some(found) = correlated_entity(cx, child) {
        entity.attach(name, found)?;
        return Ok(true);
    }

    let existing = match (reflection.cardinality, entity.related(name)) {
        (Cardinality::One, Some(Related::One(Some(target)))) => Some(target),
        _ => None,
    };
    let fresh = existing.is_none();
    let target = match existing {
        Some(target) => target,
        None => entity.borrow().instantiate_related(name)?,
    };

    // Bound before descending so a document cycle finds the entity being filled.
    remember_entity(cx, child, &target);
    let children = node.absorb_children(cx, scope, child, &target)?;
    let present = node.presence(true, children);
    if !present {
        forget_entity(cx, child);
    } else if fresh {
        entity.attach(name, target.clone())?;
    }
    Ok(present)
}
