//! Per-node mapping options.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Per-node configuration shared by every mapping-tree node kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeOptions {
    /// Count the node as present even when no child matched.
    pub allow_blank: bool,
    /// Write null values through instead of treating them as absent.
    pub allow_nil: bool,
    /// Out-of-band attributes the document value must carry, and receives on materialize.
    pub default_attributes: BTreeMap<String, Value>,
    /// Fields compared when validating nested document values.
    pub discriminators: Vec<String>,
}

impl NodeOptions {
    pub fn allow_blank(mut self, allow: bool) -> Self {
        self.allow_blank = allow;
        self
    }

    pub fn allow_nil(mut self, allow: bool) -> Self {
        self.allow_nil = allow;
        self
    }

    pub fn default_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_attributes.insert(name.into(), value.into());
        self
    }

    pub fn discriminator(mut self, field: impl Into<String>) -> Self {
        self.discriminators.push(field.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let options: NodeOptions =
            serde_json::from_str(r#"{"allow_blank": true, "default_attributes": {"s:kind": "home"}}"#)
                .unwrap();
        assert!(options.allow_blank);
        assert!(!options.allow_nil);
        assert_eq!(
            options,
            NodeOptions::default()
                .allow_blank(true)
                .default_attribute("s:kind", "home")
        );
    }
}
