//! Naming resolver for generated conversion pairs.
//!
//! A conversion is identified by the terms that qualify it: the document
//! classes it produces, the attributes it covers and any aliases. The
//! canonical identifier is reversible, so a registry key can always be
//! decoded back into the terms that produced it.
//!
//! Encoding:
//! - `Class("Nc::PersonType")` becomes `c_nc__person_type`
//! - `Attribute("role")` becomes `a_role`
//! - `Alias { name: "home", alias: "primary" }` becomes `l_home__as__primary`
//! - terms are joined with `___`

use std::fmt;
use std::str::FromStr;

use convert_case::{Case, Casing};

use crate::error::{MapError, Result};

const TERM_SEPARATOR: &str = "___";
const SEGMENT_SEPARATOR: &str = "__";
const ALIAS_SEPARATOR: &str = "__as__";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    /// A `::`-separated path of PascalCase class segments.
    Class(String),
    /// A snake_case attribute name.
    Attribute(String),
    Alias { name: String, alias: String },
}

impl Term {
    pub fn class(path: impl Into<String>) -> Self {
        Self::Class(path.into())
    }

    pub fn attribute(name: impl Into<String>) -> Self {
        Self::Attribute(name.into())
    }

    pub fn alias(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::Alias {
            name: name.into(),
            alias: alias.into(),
        }
    }

    fn encode(&self) -> Result<String> {
        match self {
            Self::Class(path) => {
                let segments = path
                    .split("::")
                    .map(|segment| class_segment(path, segment))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("c_{}", segments.join(SEGMENT_SEPARATOR)))
            }
            Self::Attribute(name) => {
                snake_word(name)?;
                Ok(format!("a_{name}"))
            }
            Self::Alias { name, alias } => {
                snake_word(name)?;
                snake_word(alias)?;
                Ok(format!("l_{name}{ALIAS_SEPARATOR}{alias}"))
            }
        }
    }

    fn decode(encoded: &str) -> Result<Self> {
        if let Some(body) = encoded.strip_prefix("c_") {
            let segments = body
                .split(SEGMENT_SEPARATOR)
                .map(|segment| {
                    snake_word(segment)?;
                    Ok(segment.to_case(Case::Pascal))
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(Self::Class(segments.join("::")));
        }
        if let Some(name) = encoded.strip_prefix("a_") {
            snake_word(name)?;
            return Ok(Self::Attribute(name.to_string()));
        }
        if let Some(body) = encoded.strip_prefix("l_") {
            let (name, alias) = body
                .split_once(ALIAS_SEPARATOR)
                .ok_or_else(|| MapError::invalid_term(encoded, "alias without `__as__`"))?;
            snake_word(name)?;
            snake_word(alias)?;
            return Ok(Self::alias(name, alias));
        }
        Err(MapError::invalid_term(encoded, "unknown term prefix"))
    }
}

fn class_segment(path: &str, segment: &str) -> Result<String> {
    let starts_upper = segment.chars().next().is_some_and(|c| c.is_ascii_uppercase());
    if !starts_upper || !segment.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(MapError::invalid_term(
            path,
            format!("segment `{segment}` is not PascalCase"),
        ));
    }
    let snake = segment.to_case(Case::Snake);
    if snake.to_case(Case::Pascal) != segment {
        return Err(MapError::invalid_term(
            path,
            format!("segment `{segment}` does not survive snake_case inflection"),
        ));
    }
    Ok(snake)
}

fn snake_word(word: &str) -> Result<()> {
    let well_formed = word.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && word
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !word.ends_with('_')
        && !word.contains(SEGMENT_SEPARATOR);
    if !well_formed || word.to_case(Case::Snake) != word {
        return Err(MapError::invalid_term(word, "expected a snake_case word"));
    }
    Ok(())
}

/// Canonical, reversible identifier of a conversion pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversionName(String);

impl ConversionName {
    pub fn from_terms(terms: &[Term]) -> Result<Self> {
        if terms.is_empty() {
            return Err(MapError::invalid_term("", "no terms given"));
        }
        let encoded = terms
            .iter()
            .map(Term::encode)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(encoded.join(TERM_SEPARATOR)))
    }

    /// Convenience for the common single-class conversion.
    pub fn for_class(path: &str) -> Result<Self> {
        Self::from_terms(&[Term::class(path)])
    }

    pub fn terms(&self) -> Result<Vec<Term>> {
        self.0.split(TERM_SEPARATOR).map(Term::decode).collect()
    }

    /// Name of the entity-to-document side.
    pub fn forward(&self) -> String {
        format!("to_{}", self.0)
    }

    /// Name of the document-to-entity side.
    pub fn reverse(&self) -> String {
        format!("from_{}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ConversionName {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self> {
        let terms = Self(s.to_string()).terms()?;
        let name = Self::from_terms(&terms)?;
        if name.0 != s {
            return Err(MapError::invalid_term(s, "not in canonical form"));
        }
        Ok(name)
    }
}
