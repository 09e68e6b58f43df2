//! Composable bidirectional accessors over entity state.
//!
//! A [`Lens`] reads one value out of an entity and writes one value back in.
//! Attribute and conversion lenses are terminal; association lenses step
//! through a singular relationship into the entity on the other side and
//! delegate to the lens they wrap.

use std::fmt;
use std::rc::Rc;

use docmap_model::{AssociationReflection, Cardinality, EntityHandle, ModelError, Related, Value};

use crate::conversion::Conversion;
use crate::correlation::Accumulator;
use crate::error::{MapError, Result};
use crate::naming::ConversionName;
use crate::session::Session;

/// Value transform applied on the way out of (`to`) or into (`from`) an entity.
///
/// Returning `None` withholds the value.
#[derive(Clone)]
pub struct Transform(Rc<dyn Fn(Value) -> Option<Value>>);

impl Transform {
    pub fn new(f: impl Fn(Value) -> Option<Value> + 'static) -> Self {
        Self(Rc::new(f))
    }

    fn apply(&self, value: Value) -> Option<Value> {
        (self.0)(value)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transform")
    }
}

#[derive(Debug, Clone)]
pub enum Lens {
    Attribute {
        name: String,
        to: Option<Transform>,
        from: Option<Transform>,
    },
    /// A singular association, open until composed with a terminal lens.
    Association {
        name: String,
        terminal: Option<Box<Lens>>,
    },
    Conversion {
        name: ConversionName,
        correlation: Option<String>,
    },
    /// A conversion whose entity side lives behind an association.
    ConversionInto {
        association: String,
        name: ConversionName,
        correlation: Option<String>,
    },
}

impl Lens {
    pub fn attribute(name: impl Into<String>) -> Self {
        Self::Attribute {
            name: name.into(),
            to: None,
            from: None,
        }
    }

    pub fn association(name: impl Into<String>) -> Self {
        Self::Association {
            name: name.into(),
            terminal: None,
        }
    }

    pub fn conversion(name: ConversionName) -> Self {
        Self::Conversion {
            name,
            correlation: None,
        }
    }

    pub fn conversion_into(association: impl Into<String>, name: ConversionName) -> Self {
        Self::ConversionInto {
            association: association.into(),
            name,
            correlation: None,
        }
    }

    /// Chains association lenses ending in one terminal lens.
    ///
    /// Every step but the last must be an open association lens, and the last
    /// must not be one.
    pub fn compose(steps: impl IntoIterator<Item = Lens>) -> Result<Self> {
        let mut steps: Vec<Lens> = steps.into_iter().collect();
        let Some(terminal) = steps.pop() else {
            return Err(MapError::invalid_lens("cannot compose an empty chain"));
        };
        if let Self::Association { terminal: None, name } = &terminal {
            return Err(MapError::invalid_lens(format!(
                "chain ends in association `{name}`; it must end in an attribute or conversion"
            )));
        }
        steps.into_iter().rev().try_fold(terminal, |inner, step| match step {
            Self::Association {
                name,
                terminal: None,
            } => Ok(Self::Association {
                name,
                terminal: Some(Box::new(inner)),
            }),
            other => Err(MapError::invalid_lens(format!(
                "{} cannot be an interior step of a chain",
                other.describe()
            ))),
        })
    }

    /// Sets the outbound (`to`) transform on the attribute at the end of the chain.
    pub fn map_to(self, f: impl Fn(Value) -> Option<Value> + 'static) -> Self {
        let transform = Transform::new(f);
        self.map_terminal(&mut |lens| match lens {
            Self::Attribute { name, from, .. } => Self::Attribute {
                name,
                to: Some(transform.clone()),
                from,
            },
            other => other,
        })
    }

    /// Sets the inbound (`from`) transform on the attribute at the end of the chain.
    pub fn map_from(self, f: impl Fn(Value) -> Option<Value> + 'static) -> Self {
        let transform = Transform::new(f);
        self.map_terminal(&mut |lens| match lens {
            Self::Attribute { name, to, .. } => Self::Attribute {
                name,
                to,
                from: Some(transform.clone()),
            },
            other => other,
        })
    }

    /// Declares the correlation attribute of the conversion at the end of the chain.
    pub fn correlated(self, attribute: impl Into<String>) -> Self {
        let attribute = attribute.into();
        self.map_terminal(&mut |lens| match lens {
            Self::Conversion { name, .. } => Self::Conversion {
                name,
                correlation: Some(attribute.clone()),
            },
            Self::ConversionInto {
                association, name, ..
            } => Self::ConversionInto {
                association,
                name,
                correlation: Some(attribute.clone()),
            },
            other => other,
        })
    }

    /// True when the chain ends in an attribute, so documents should be read as scalars.
    pub fn wants_scalar(&self) -> bool {
        match self {
            Self::Attribute { .. } => true,
            Self::Association {
                terminal: Some(terminal),
                ..
            } => terminal.wants_scalar(),
            _ => false,
        }
    }

    fn map_terminal(self, f: &mut dyn FnMut(Lens) -> Lens) -> Self {
        match self {
            Self::Association {
                name,
                terminal: Some(terminal),
            } => Self::Association {
                name,
                terminal: Some(Box::new(terminal.map_terminal(f))),
            },
            other => f(other),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Attribute { name, .. } => format!("attribute `{name}`"),
            Self::Association { name, .. } => format!("association `{name}`"),
            Self::Conversion { name, .. } => format!("conversion `{name}`"),
            Self::ConversionInto {
                association, name, ..
            } => format!("conversion `{name}` over `{association}`"),
        }
    }

    pub fn get(&self, session: &mut Session, entity: &EntityHandle) -> Result<Value> {
        match self {
            Self::Attribute { name, to, .. } => {
                let value = entity
                    .read(name)
                    .ok_or_else(|| ModelError::UnknownAttribute {
                        entity_type: entity.entity_type(),
                        attribute: name.clone(),
                    })?;
                Ok(match to {
                    Some(to) => to.apply(value).unwrap_or_default(),
                    None => value,
                })
            }
            Self::Association { name, terminal } => {
                let terminal = open_terminal(name, terminal.as_deref())?;
                match singular_target(entity, name)? {
                    Some(target) => terminal.get(session, &target),
                    None => Ok(Value::Null),
                }
            }
            Self::Conversion { name, correlation } => {
                convert(session, entity, name, correlation.as_deref())
            }
            Self::ConversionInto {
                association,
                name,
                correlation,
            } => {
                reflect(entity, association)?;
                match entity.related(association) {
                    Some(Related::One(Some(target))) => {
                        convert(session, &target, name, correlation.as_deref())
                    }
                    Some(Related::Many(targets)) => {
                        let mut values = Vec::with_capacity(targets.len());
                        for target in &targets {
                            let value = convert(session, target, name, correlation.as_deref())?;
                            if !value.is_null() {
                                values.push(value);
                            }
                        }
                        Ok(Value::List(values))
                    }
                    Some(Related::One(None)) | None => Ok(Value::Null),
                }
            }
        }
    }

    /// Writes `value` into `entity`, returning the entity that received it.
    ///
    /// `None` means the value was withheld and nothing was written.
    pub fn set(
        &self,
        session: &mut Session,
        entity: &EntityHandle,
        value: Value,
        accumulator: &mut Accumulator,
    ) -> Result<Option<EntityHandle>> {
        match self {
            Self::Attribute { name, from, .. } => {
                let value = match from {
                    Some(from) => match from.apply(value) {
                        Some(value) => value,
                        None => {
                            tracing::trace!(attribute = %name, "inbound transform withheld value");
                            return Ok(None);
                        }
                    },
                    None => value,
                };
                entity.write(name, value)?;
                Ok(Some(entity.clone()))
            }
            Self::Association { name, terminal } => {
                let terminal = open_terminal(name, terminal.as_deref())?;
                if let Some(target) = singular_target(entity, name)? {
                    return Ok(terminal
                        .set(session, &target, value, accumulator)?
                        .map(|_| entity.clone()));
                }
                let target = entity.borrow().instantiate_related(name)?;
                if terminal.set(session, &target, value, accumulator)?.is_none() {
                    return Ok(None);
                }
                entity.attach(name, target)?;
                Ok(Some(entity.clone()))
            }
            Self::Conversion { name, correlation } => revert(
                session,
                &entity.entity_type(),
                name,
                correlation.as_deref(),
                &value,
                Some(entity),
                accumulator,
            ),
            Self::ConversionInto {
                association,
                name,
                correlation,
            } => {
                let reflection = reflect(entity, association)?;
                let existing = match reflection.cardinality {
                    Cardinality::One => singular_target(entity, association)?,
                    _ => None,
                };
                let target = match &existing {
                    Some(target) => target.clone(),
                    None => entity.borrow().instantiate_related(association)?,
                };
                let Some(result) = revert(
                    session,
                    &reflection.target_type,
                    name,
                    correlation.as_deref(),
                    &value,
                    Some(&target),
                    accumulator,
                )?
                else {
                    return Ok(None);
                };
                // A singular target filled in place is already attached.
                if existing.as_ref().is_none_or(|existing| !existing.ptr_eq(&result)) {
                    entity.attach(association, result.clone())?;
                }
                Ok(Some(result))
            }
        }
    }

    /// Element-wise read over a single entity, a list of entities or a keyed map of them.
    pub fn get_each(&self, session: &mut Session, subjects: &Value) -> Result<Value> {
        match subjects {
            Value::Null => Ok(Value::Null),
            Value::Entity(entity) => self.get(session, entity),
            Value::List(items) => items
                .iter()
                .map(|item| self.get_each(session, item))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            Value::Map(entries) => entries
                .iter()
                .map(|(key, item)| Ok((key.clone(), self.get_each(session, item)?)))
                .collect::<Result<_>>()
                .map(Value::Map),
            other => Err(MapError::invalid_lens(format!(
                "cannot read {} from a {} value",
                self.describe(),
                other.kind()
            ))),
        }
    }
}

fn open_terminal<'a>(name: &str, terminal: Option<&'a Lens>) -> Result<&'a Lens> {
    terminal.ok_or_else(|| {
        MapError::invalid_lens(format!("association `{name}` is not composed with a terminal lens"))
    })
}

fn reflect(entity: &EntityHandle, name: &str) -> Result<AssociationReflection> {
    let reflection = entity
        .reflect(name)
        .ok_or_else(|| ModelError::UnknownAssociation {
            entity_type: entity.entity_type(),
            association: name.to_string(),
        })?;
    if reflection.cardinality == Cardinality::Indirect {
        return Err(MapError::invalid_lens(format!(
            "association `{name}` is reached through another association and cannot be addressed"
        )));
    }
    Ok(reflection)
}

fn singular_target(entity: &EntityHandle, name: &str) -> Result<Option<EntityHandle>> {
    let reflection = reflect(entity, name)?;
    if reflection.cardinality == Cardinality::Many {
        return Err(MapError::invalid_lens(format!(
            "plural association `{name}` must be mapped through an association node"
        )));
    }
    Ok(match entity.related(name) {
        Some(Related::One(target)) => target,
        _ => None,
    })
}

fn lookup_conversion(session: &Session, owner: &str, name: &ConversionName) -> Result<Conversion> {
    session
        .conversion(owner, name)
        .ok_or_else(|| MapError::invalid_lens(format!("{owner} has no conversion `{name}`")))
}

fn convert(
    session: &mut Session,
    entity: &EntityHandle,
    name: &ConversionName,
    correlation: Option<&str>,
) -> Result<Value> {
    let owner = entity.entity_type();
    let conversion = lookup_conversion(session, &owner, name)?;
    let Some(attribute) = correlation else {
        return Ok(conversion.forward(entity, session)?.unwrap_or_default());
    };
    if let Some(doc) = session.cache().lookup(&owner, name, entity) {
        return Ok(Value::Document(doc));
    }

    let reserved = session.cache_mut().reserve(&owner, name, entity);
    let produced = conversion.forward(entity, session);
    session.cache_mut().release(&owner, name, entity);
    match produced?.unwrap_or_default() {
        Value::Document(doc) => {
            reserved.fill_from(&doc);
            session
                .cache_mut()
                .record(&owner, name, attribute, entity, &reserved);
            Ok(Value::Document(reserved))
        }
        value => {
            tracing::trace!(owner = %owner, conversion = %name, "correlated conversion produced no document");
            Ok(value)
        }
    }
}

fn revert(
    session: &mut Session,
    owner: &str,
    name: &ConversionName,
    correlation: Option<&str>,
    value: &Value,
    existing: Option<&EntityHandle>,
    accumulator: &mut Accumulator,
) -> Result<Option<EntityHandle>> {
    let key = correlation.and_then(|attribute| {
        let key = value
            .as_document()?
            .attribute(attribute)
            .filter(|key| !key.is_blank())?;
        Some((attribute, key.to_string()))
    });
    if let Some((attribute, key)) = &key {
        if let Some(found) = accumulator.get(attribute, key) {
            return Ok(Some(found));
        }
    }
    let conversion = lookup_conversion(session, owner, name)?;
    // Bound up front so a document cycle resolves to the entity being filled.
    if let (Some((attribute, key)), Some(existing)) = (&key, existing) {
        accumulator.record(attribute, key, existing.clone());
    }
    let result = conversion.reverse(value, existing, accumulator, session)?;
    if let Some((attribute, key)) = &key {
        match &result {
            Some(entity) => accumulator.record(attribute, key, entity.clone()),
            None => {
                accumulator.forget(attribute, key);
            }
        }
    }
    Ok(result)
}

pub type GetFn = Rc<dyn Fn(&EntityHandle, &mut Session) -> Result<Value>>;
pub type SetFn =
    Rc<dyn Fn(&EntityHandle, Value, &mut Accumulator, &mut Session) -> Result<Option<EntityHandle>>>;

/// The get/set pair a mapping node is bound to.
#[derive(Clone)]
pub enum Accessor {
    Lens(Lens),
    /// An association read and written as entities, singular or plural.
    Relation(String),
    Custom { get: GetFn, set: SetFn },
}

impl Accessor {
    pub fn relation(name: impl Into<String>) -> Self {
        Self::Relation(name.into())
    }

    pub fn custom<G, S>(get: G, set: S) -> Self
    where
        G: Fn(&EntityHandle, &mut Session) -> Result<Value> + 'static,
        S: Fn(&EntityHandle, Value, &mut Accumulator, &mut Session) -> Result<Option<EntityHandle>>
            + 'static,
    {
        Self::Custom {
            get: Rc::new(get),
            set: Rc::new(set),
        }
    }

    pub fn get(&self, session: &mut Session, entity: &EntityHandle) -> Result<Value> {
        match self {
            Self::Lens(lens) => lens.get(session, entity),
            Self::Relation(name) => {
                let related = entity
                    .related(name)
                    .ok_or_else(|| ModelError::UnknownAssociation {
                        entity_type: entity.entity_type(),
                        association: name.clone(),
                    })?;
                Ok(related.into_value())
            }
            Self::Custom { get, .. } => get(entity, session),
        }
    }

    pub fn set(
        &self,
        session: &mut Session,
        entity: &EntityHandle,
        value: Value,
        accumulator: &mut Accumulator,
    ) -> Result<Option<EntityHandle>> {
        match self {
            Self::Lens(lens) => lens.set(session, entity, value, accumulator),
            Self::Relation(name) => match value {
                Value::Entity(target) => {
                    entity.attach(name, target)?;
                    Ok(Some(entity.clone()))
                }
                other => {
                    tracing::trace!(association = %name, kind = other.kind(), "relation ignores non-entity value");
                    Ok(None)
                }
            },
            Self::Custom { set, .. } => set(entity, value, accumulator, session),
        }
    }

    pub fn wants_scalar(&self) -> bool {
        matches!(self, Self::Lens(lens) if lens.wants_scalar())
    }

    pub(crate) fn relation_name(&self) -> Option<&str> {
        match self {
            Self::Relation(name) => Some(name),
            _ => None,
        }
    }
}

impl From<Lens> for Accessor {
    fn from(lens: Lens) -> Self {
        Self::Lens(lens)
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lens(lens) => f.debug_tuple("Lens").field(lens).finish(),
            Self::Relation(name) => f.debug_tuple("Relation").field(name).finish(),
            Self::Custom { .. } => f.write_str("Custom"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use docmap_model::{DocHandle, Element, EntityCatalog, EntityType};

    use super::*;
    use crate::conversion::ConversionRegistry;

    fn catalog() -> EntityCatalog {
        EntityCatalog::new([
            EntityType::new("Person")
                .attributes(["name", "ssn"])
                .has_one("address", "Address")
                .has_many("phones", "Phone")
                .has_many_through("cases", "Case"),
            EntityType::new("Address")
                .attributes(["street"])
                .has_one("location", "Location"),
            EntityType::new("Location").attributes(["zone"]),
            EntityType::new("Phone").attributes(["number"]),
        ])
    }

    #[test]
    fn compose_rejects_malformed_chains() {
        assert!(Lens::compose(Vec::new()).is_err());

        let open_end = Lens::compose([Lens::association("address"), Lens::association("location")]);
        assert!(matches!(open_end, Err(MapError::InvalidLens(_))));

        let attribute_inside = Lens::compose([Lens::attribute("street"), Lens::attribute("zone")]);
        insta::assert_snapshot!(
            attribute_inside.unwrap_err().to_string(),
            @"invalid lens: attribute `street` cannot be an interior step of a chain"
        );
    }

    #[test]
    fn set_builds_missing_singular_targets() {
        let person = catalog().create("Person").unwrap();
        let lens = Lens::compose([
            Lens::association("address"),
            Lens::association("location"),
            Lens::attribute("zone"),
        ])
        .unwrap();
        let mut session = Session::default();
        let mut acc = Accumulator::new();

        assert_eq!(lens.get(&mut session, &person).unwrap(), Value::Null);
        lens.set(&mut session, &person, Value::from("east"), &mut acc)
            .unwrap()
            .unwrap();
        assert_eq!(lens.get(&mut session, &person).unwrap(), Value::from("east"));
        assert!(lens.wants_scalar());
    }

    #[test]
    fn withheld_values_do_not_build_targets() {
        let person = catalog().create("Person").unwrap();
        let lens = Lens::compose([Lens::association("address"), Lens::attribute("street")])
            .unwrap()
            .map_from(|value| (!value.is_blank()).then_some(value));
        let mut session = Session::default();
        let mut acc = Accumulator::new();

        let written = lens
            .set(&mut session, &person, Value::from(""), &mut acc)
            .unwrap();
        assert!(written.is_none());
        assert!(matches!(person.related("address"), Some(Related::One(None))));
    }

    #[test]
    fn transforms_apply_in_each_direction() {
        let person = catalog().create("Person").unwrap();
        let lens = Lens::attribute("name")
            .map_to(|value| Some(Value::from(value.to_string().to_uppercase())))
            .map_from(|value| Some(Value::from(value.to_string().to_lowercase())));
        let mut session = Session::default();
        let mut acc = Accumulator::new();

        lens.set(&mut session, &person, Value::from("ADA"), &mut acc)
            .unwrap();
        assert_eq!(person.read("name"), Some(Value::from("ada")));
        assert_eq!(lens.get(&mut session, &person).unwrap(), Value::from("ADA"));
    }

    #[test]
    fn plural_and_indirect_associations_are_invalid() {
        let person = catalog().create("Person").unwrap();
        let mut session = Session::default();
        for name in ["phones", "cases"] {
            let lens =
                Lens::compose([Lens::association(name), Lens::attribute("number")]).unwrap();
            assert!(matches!(
                lens.get(&mut session, &person),
                Err(MapError::InvalidLens(_))
            ));
        }
    }

    #[test]
    fn correlated_conversion_runs_once_per_entity() {
        let name = ConversionName::for_class("Nc::AddressType").unwrap();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let mut registry = ConversionRegistry::new();
        registry.register(
            "Address",
            Conversion::new(
                name.clone(),
                move |entity, _| {
                    counter.set(counter.get() + 1);
                    let mut element = Element::new("nc::AddressType")
                        .with_field("street", entity.read("street").unwrap_or_default());
                    element.declare_correlation("s:id");
                    Ok(Some(Value::Document(DocHandle::new(element))))
                },
                |_, existing, _, _| Ok(existing.cloned()),
            ),
        );
        let mut session = Session::new(registry);

        let person = catalog().create("Person").unwrap();
        let address = person.borrow_mut().build_related("address").unwrap();
        address.write("street", "1 Main").unwrap();

        let lens = Lens::conversion_into("address", name).correlated("s:id");
        let first = lens.get(&mut session, &person).unwrap();
        let second = lens.get(&mut session, &person).unwrap();

        assert_eq!(calls.get(), 1);
        assert!(first
            .as_document()
            .unwrap()
            .ptr_eq(second.as_document().unwrap()));
        assert_eq!(
            first.as_document().unwrap().attribute("s:id"),
            Some(Value::from("address_1"))
        );
    }

    #[test]
    fn get_each_reads_batches() {
        let catalog = catalog();
        let mut session = Session::default();
        let phones: Vec<Value> = ["1", "2"]
            .into_iter()
            .map(|number| {
                let phone = catalog.create("Phone").unwrap();
                phone.write("number", number).unwrap();
                Value::Entity(phone)
            })
            .collect();

        let lens = Lens::attribute("number");
        let values = lens
            .get_each(&mut session, &Value::List(phones.clone()))
            .unwrap();
        assert_eq!(values.to_string(), "[1, 2]");

        let keyed: std::collections::BTreeMap<String, Value> = phones
            .into_iter()
            .enumerate()
            .map(|(idx, phone)| (format!("p{idx}"), phone))
            .collect();
        let values = lens.get_each(&mut session, &Value::Map(keyed)).unwrap();
        assert_eq!(values.to_string(), "{p0: 1, p1: 2}");

        assert!(lens.get_each(&mut session, &Value::from("x")).is_err());
    }
}
