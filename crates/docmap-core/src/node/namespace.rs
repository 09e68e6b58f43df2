//! Namespace nodes: scattered keys gathered into one combined field.

use docmap_model::{DocHandle, EntityHandle, Value};

use super::{Node, Pass};
use crate::error::{MapError, Result};
use crate::scope::Scope;

pub(super) fn materialize(
    node: &Node,
    name: &str,
    cx: &mut Pass<'_>,
    scope: &Scope<'_>,
    entity: &EntityHandle,
    doc: &DocHandle,
) -> Result<bool> {
    let accessor = node
        .accessor
        .as_ref()
        .ok_or_else(|| MapError::invalid_lens(format!("namespace `{name}` has no accessor")))?;
    let inner = scope.child(name);
    match accessor.get(cx.session, entity)? {
        Value::Map(entries) => {
            for (key, value) in entries {
                inner.set(name, &key, value)?;
            }
        }
        Value::Null => {}
        other => {
            return Err(MapError::invalid_lens(format!(
                "namespace `{name}` needs a keyed value, got {}",
                other.kind()
            )));
        }
    }
    let children = node.materialize_children(cx, &inner, entity, doc)?;
    Ok(children || node.options.allow_blank)
}

pub(super) fn absorb(
    node: &Node,
    name: &str,
    cx: &mut Pass<'_>,
    scope: &Scope<'_>,
    doc: &DocHandle,
    entity: &EntityHandle,
) -> Result<bool> {
    let accessor = node
        .accessor
        .as_ref()
        .ok_or_else(|| MapError::invalid_lens(format!("namespace `{name}` has no accessor")))?;
    let inner = scope.child(name);
    let children = node.absorb_children(cx, &inner, doc, entity)?;
    let entries = inner.take(name).unwrap_or_default();
    if !children || entries.is_empty() {
        tracing::trace!(namespace = name, "namespace collected nothing");
        return Ok(node.options.allow_blank);
    }
    accessor.set(cx.session, entity, Value::Map(entries), cx.accumulator)?;
    Ok(true)
}
