//! Structural matching used to gate document branches.
//!
//! Matching is directional: `expected` describes what a node requires and
//! `actual` is what the document carries. Anything the expectation does not
//! mention is ignored.

use std::collections::BTreeMap;

use docmap_model::Value;

/// True when `actual` satisfies `expected`.
///
/// - lists: every expected element matches some actual element
/// - maps: every expected key is present with a matching value
/// - documents: same class, matching discriminator fields, matching attributes
///   and content
/// - anything else: equal string forms
pub fn deep_match(expected: &Value, actual: &Value, discriminators: &[String]) -> bool {
    match (expected, actual) {
        (Value::List(wanted), Value::List(found)) => wanted.iter().all(|item| {
            found
                .iter()
                .any(|candidate| deep_match(item, candidate, discriminators))
        }),
        (Value::Map(wanted), Value::Map(found)) => wanted.iter().all(|(key, item)| {
            found
                .get(key)
                .is_some_and(|candidate| deep_match(item, candidate, discriminators))
        }),
        (Value::Document(wanted), Value::Document(found)) => {
            if wanted.ptr_eq(found) {
                return true;
            }
            if wanted.class() != found.class() {
                return false;
            }
            let fields_match = discriminators.iter().all(|field| {
                let left = wanted.field(field).unwrap_or_default();
                let right = found.field(field).unwrap_or_default();
                deep_match(&left, &right, discriminators)
            });
            fields_match
                && attributes_match(&wanted.attributes(), &found.attributes(), discriminators)
                && wanted.content().unwrap_or_default().to_string()
                    == found.content().unwrap_or_default().to_string()
        }
        _ => expected.to_string() == actual.to_string(),
    }
}

/// True when every expected attribute is carried by `actual` with a matching value.
pub fn attributes_match(
    expected: &BTreeMap<String, Value>,
    actual: &BTreeMap<String, Value>,
    discriminators: &[String],
) -> bool {
    expected.iter().all(|(name, value)| {
        actual
            .get(name)
            .is_some_and(|found| deep_match(value, found, discriminators))
    })
}
