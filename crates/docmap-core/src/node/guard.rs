//! Guard nodes, gating children on an admissible entity value.

use docmap_model::{DocHandle, EntityHandle, Value};

use super::{Node, Pass};
use crate::error::{MapError, Result};
use crate::lens::Lens;
use crate::scope::Scope;

/// A discriminated branch over one scalar attribute.
///
/// Materializing enters the children only when the attribute holds one of
/// the admissible values. Absorbing writes the configured value back when
/// any child was present.
#[derive(Debug, Clone)]
pub(crate) struct Guard {
    lens: Lens,
    values: Vec<Value>,
    written: Value,
}

impl Guard {
    pub(crate) fn new(lens: Lens, values: Vec<Value>, default: Option<Value>) -> Result<Self> {
        if !lens.wants_scalar() {
            return Err(MapError::invalid_guard(
                "guard lens must end in an attribute",
            ));
        }
        let written = match (values.as_slice(), default) {
            ([], _) => {
                return Err(MapError::invalid_guard("at least one admissible value is required"));
            }
            (_, Some(default)) => {
                if !values.iter().any(|value| same(value, &default)) {
                    return Err(MapError::invalid_guard(format!(
                        "default `{default}` is not among the admissible values"
                    )));
                }
                default
            }
            ([only], None) => only.clone(),
            (_, None) => {
                return Err(MapError::invalid_guard(format!(
                    "{} admissible values need a default",
                    values.len()
                )));
            }
        };
        Ok(Self {
            lens,
            values,
            written,
        })
    }

    fn admits(&self, value: &Value) -> bool {
        match value {
            // Batch reads pass only when every element is admissible.
            Value::List(items) => {
                !items.is_empty() && items.iter().all(|item| self.admits(item))
            }
            Value::Map(entries) => {
                !entries.is_empty() && entries.values().all(|item| self.admits(item))
            }
            value => self.values.iter().any(|candidate| same(candidate, value)),
        }
    }

    pub(super) fn materialize(
        &self,
        node: &Node,
        cx: &mut Pass<'_>,
        scope: &Scope<'_>,
        entity: &EntityHandle,
        doc: &DocHandle,
    ) -> Result<bool> {
        let value = self.lens.get(cx.session, entity)?;
        if !self.admits(&value) {
            tracing::trace!(value = %value, "guard rejected value");
            return Ok(false);
        }
        let children = node.materialize_children(cx, scope, entity, doc)?;
        Ok(node.presence(true, children))
    }

    pub(super) fn absorb(
        &self,
        node: &Node,
        cx: &mut Pass<'_>,
        scope: &Scope<'_>,
        doc: &DocHandle,
        entity: &EntityHandle,
    ) -> Result<bool> {
        let children = node.absorb_children(cx, scope, doc, entity)?;
        if !children && !node.options.allow_blank {
            return Ok(false);
        }
        self.lens
            .set(cx.session, entity, self.written.clone(), cx.accumulator)?;
        Ok(true)
    }
}

fn same(left: &Value, right: &Value) -> bool {
    left.to_string() == right.to_string()
}
