//! Per-unit-of-work state shared by every mapping call.

use std::rc::Rc;

use crate::conversion::{Conversion, ConversionRegistry};
use crate::correlation::CorrelationCache;
use crate::naming::ConversionName;

/// Context threaded through every materialize and absorb call.
///
/// The correlation cache outlives single calls, so one session should be kept
/// per logical unit of work (a request, a batch, a whole document set).
/// Sessions are not `Send`; a threaded host keeps one session per thread.
#[derive(Debug, Default)]
pub struct Session {
    conversions: Rc<ConversionRegistry>,
    cache: CorrelationCache,
}

impl Session {
    pub fn new(conversions: ConversionRegistry) -> Self {
        Self {
            conversions: Rc::new(conversions),
            cache: CorrelationCache::default(),
        }
    }

    /// A new session over the same conversions with an empty cache.
    pub fn fork(&self) -> Self {
        Self {
            conversions: Rc::clone(&self.conversions),
            cache: CorrelationCache::default(),
        }
    }

    pub fn conversions(&self) -> &ConversionRegistry {
        &self.conversions
    }

    /// Owned copy of a registered conversion, so it can run with `&mut self`.
    pub fn conversion(&self, owner: &str, name: &ConversionName) -> Option<Conversion> {
        self.conversions.get(owner, name).cloned()
    }

    pub fn cache(&self) -> &CorrelationCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut CorrelationCache {
        &mut self.cache
    }
}
