//! Identity reconciliation for shared entities.
//!
//! The [`CorrelationCache`] works on the materialize side: once an entity has
//! been converted under a named conversion, every later conversion of the same
//! entity returns the same document instance. The [`Accumulator`] is its
//! absorb-side counterpart and maps correlation keys back to the entity they
//! were first absorbed into.
//!
//! Cyclic graphs are handled by reserving a document before a conversion
//! runs. Re-entering the same conversion for the same entity gets the reserved
//! instance back instead of recursing, and the finished document is copied
//! into it once the conversion returns.

use std::collections::{BTreeMap, HashMap};

use convert_case::{Case, Casing};
use docmap_model::{DocHandle, Element, EntityHandle};

use crate::naming::ConversionName;

#[derive(Debug, Default)]
struct Ledger {
    attribute: String,
    keys: HashMap<EntityHandle, String>,
    documents: HashMap<String, DocHandle>,
    pending: HashMap<EntityHandle, DocHandle>,
}

/// Per owner type and conversion name, entity to key and key to document.
#[derive(Debug, Default)]
pub struct CorrelationCache {
    ledgers: BTreeMap<(String, ConversionName), Ledger>,
    issued: BTreeMap<String, usize>,
}

impl CorrelationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Document previously recorded, or currently reserved, for `entity`
    /// under this conversion.
    pub fn lookup(
        &self,
        owner: &str,
        name: &ConversionName,
        entity: &EntityHandle,
    ) -> Option<DocHandle> {
        let ledger = self.ledgers.get(&(owner.to_string(), name.clone()))?;
        if let Some(reserved) = ledger.pending.get(entity) {
            tracing::debug!(owner, conversion = %name, "conversion re-entered; using reserved document");
            return Some(reserved.clone());
        }
        let key = ledger.keys.get(entity)?;
        let doc = ledger.documents.get(key).cloned();
        if doc.is_some() {
            tracing::debug!(owner, conversion = %name, key = %key, "correlation cache hit");
        }
        doc
    }

    /// Records `doc` as the instance for `entity`, returning its correlation key.
    ///
    /// Returns `None` without caching when the document's class does not
    /// declare `attribute`. A key already present on the document is kept;
    /// otherwise a fresh `<owner>_<n>` key is assigned to it.
    pub fn record(
        &mut self,
        owner: &str,
        name: &ConversionName,
        attribute: &str,
        entity: &EntityHandle,
        doc: &DocHandle,
    ) -> Option<String> {
        if !doc.declares_correlation(attribute) {
            return None;
        }
        let key = match doc.attribute(attribute).filter(|value| !value.is_blank()) {
            Some(existing) => existing.to_string(),
            None => {
                let key = self.issue_key(owner);
                doc.set_attribute(attribute, key.as_str());
                key
            }
        };

        let ledger = self
            .ledgers
            .entry((owner.to_string(), name.clone()))
            .or_default();
        ledger.attribute = attribute.to_string();
        ledger.keys.insert(entity.clone(), key.clone());
        ledger.documents.insert(key.clone(), doc.clone());
        Some(key)
    }

    /// Reserves an empty document for `entity` while its conversion runs.
    pub fn reserve(&mut self, owner: &str, name: &ConversionName, entity: &EntityHandle) -> DocHandle {
        let reserved = DocHandle::new(Element::default());
        self.ledgers
            .entry((owner.to_string(), name.clone()))
            .or_default()
            .pending
            .insert(entity.clone(), reserved.clone());
        reserved
    }

    /// Drops the reservation for `entity`, returning whether one was held.
    pub fn release(&mut self, owner: &str, name: &ConversionName, entity: &EntityHandle) -> bool {
        self.ledgers
            .get_mut(&(owner.to_string(), name.clone()))
            .is_some_and(|ledger| ledger.pending.remove(entity).is_some())
    }

    pub fn document(&self, owner: &str, name: &ConversionName, key: &str) -> Option<DocHandle> {
        self.ledgers
            .get(&(owner.to_string(), name.clone()))?
            .documents
            .get(key)
            .cloned()
    }

    /// Correlation attribute used by the ledger for this conversion, if any.
    pub fn attribute(&self, owner: &str, name: &ConversionName) -> Option<&str> {
        self.ledgers
            .get(&(owner.to_string(), name.clone()))
            .map(|ledger| ledger.attribute.as_str())
    }

    pub fn len(&self) -> usize {
        self.ledgers.values().map(|ledger| ledger.keys.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.ledgers.clear();
        self.issued.clear();
    }

    fn issue_key(&mut self, owner: &str) -> String {
        let counter = self.issued.entry(owner.to_string()).or_insert(0);
        *counter += 1;
        format!("{}_{}", owner.to_case(Case::Snake), counter)
    }
}

/// Absorb-side map from (correlation attribute, key) to the entity built for it.
#[derive(Debug, Default)]
pub struct Accumulator {
    entities: HashMap<(String, String), EntityHandle>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, attribute: &str, key: &str) -> Option<EntityHandle> {
        let found = self
            .entities
            .get(&(attribute.to_string(), key.to_string()))
            .cloned();
        if found.is_some() {
            tracing::debug!(attribute, key, "reusing absorbed entity");
        }
        found
    }

    pub fn record(&mut self, attribute: &str, key: &str, entity: EntityHandle) {
        self.entities
            .insert((attribute.to_string(), key.to_string()), entity);
    }

    pub fn forget(&mut self, attribute: &str, key: &str) -> Option<EntityHandle> {
        self.entities
            .remove(&(attribute.to_string(), key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
