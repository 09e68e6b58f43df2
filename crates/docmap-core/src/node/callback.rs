//! Callback nodes that run arbitrary code in one direction only.

use std::fmt;
use std::rc::Rc;

use docmap_model::{DocHandle, EntityHandle};

use super::Pass;
use crate::correlation::Accumulator;
use crate::error::Result;
use crate::scope::Scope;

/// Escape-hatch callback. Returns whether it produced anything.
pub type CallbackFn =
    Rc<dyn Fn(&EntityHandle, &DocHandle, &mut Accumulator, &Scope<'_>) -> Result<bool>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Materialize,
    Absorb,
}

#[derive(Clone)]
pub(crate) struct Callback {
    direction: Direction,
    f: CallbackFn,
}

impl Callback {
    pub(crate) fn new<F>(direction: Direction, f: F) -> Self
    where
        F: Fn(&EntityHandle, &DocHandle, &mut Accumulator, &Scope<'_>) -> Result<bool> + 'static,
    {
        Self {
            direction,
            f: Rc::new(f),
        }
    }

    pub(super) fn materialize(
        &self,
        cx: &mut Pass<'_>,
        scope: &Scope<'_>,
        entity: &EntityHandle,
        doc: &DocHandle,
    ) -> Result<bool> {
        if self.direction != Direction::Materialize {
            return Ok(false);
        }
        (self.f)(entity, doc, cx.accumulator, scope)
    }

    pub(super) fn absorb(
        &self,
        cx: &mut Pass<'_>,
        scope: &Scope<'_>,
        doc: &DocHandle,
        entity: &EntityHandle,
    ) -> Result<bool> {
        if self.direction != Direction::Absorb {
            return Ok(false);
        }
        (self.f)(entity, doc, cx.accumulator, scope)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("direction", &self.direction)
            .finish_non_exhaustive()
    }
}
