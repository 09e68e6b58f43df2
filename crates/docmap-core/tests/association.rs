//! Singular and plural relations mapped through association nodes.

use std::rc::Rc;

use anyhow::Result;
use docmap_core::{
    Accessor, Conversion, ConversionName, ConversionRegistry, Lens, MapError, MappingTree, Node,
    Session,
};
use docmap_model::{
    ClassDef, DocHandle, Element, EntityCatalog, EntityHandle, EntityType, Related, Schema, Value,
};

fn schema() -> Rc<Schema> {
    Rc::new(
        Schema::new("nc")
            .class(
                ClassDef::new("nc::PersonType")
                    .member("telephone", "nc::TelephoneType")
                    .member("employer", "nc::OrganizationType"),
            )
            .class(
                ClassDef::new("nc::TelephoneType")
                    .member("number", "nc::TextType")
                    .correlated_by("s:id"),
            )
            .class(
                ClassDef::new("nc::OrganizationType")
                    .member("name", "nc::TextType")
                    .member("taxId", "nc::TextType"),
            )
            .class(ClassDef::new("nc::TextType")),
    )
}

fn catalog() -> EntityCatalog {
    EntityCatalog::new([
        EntityType::new("Person")
            .has_many("phones", "Phone")
            .has_one("employer", "Organization")
            .has_many_through("colleagues", "Person"),
        EntityType::new("Phone").attribute("number"),
        EntityType::new("Organization").attributes(["name", "tax_id"]),
    ])
}

fn person_tree(catalog: &EntityCatalog) -> Result<MappingTree> {
    Ok(MappingTree::builder(schema(), "Person", "nc::PersonType")
        .entity_factory(catalog.factory("Person"))
        .child(
            Node::association("telephone", Accessor::relation("phones"))
                .child(Node::attribute("number").lens(Lens::attribute("number"))),
        )
        .child(
            Node::association("employer", Accessor::relation("employer"))
                .child(Node::attribute("name").lens(Lens::attribute("name"))),
        )
        .build()?)
}

fn person_with_phones(catalog: &EntityCatalog, numbers: &[Option<&str>]) -> Result<EntityHandle> {
    let person = catalog.create("Person")?;
    for number in numbers {
        let phone = catalog.create("Phone")?;
        if let Some(number) = number {
            phone.write("number", *number)?;
        }
        person.attach("phones", phone)?;
    }
    Ok(person)
}

fn numbers_in(doc: &DocHandle) -> Vec<Value> {
    match doc.field("telephone") {
        Some(Value::List(items)) => items
            .iter()
            .filter_map(Value::as_document)
            .filter_map(|phone| phone.field("number"))
            .map(|number| number.scalar())
            .collect(),
        other => panic!("expected a telephone list, got {other:?}"),
    }
}

fn related_many(entity: &EntityHandle, name: &str) -> Vec<EntityHandle> {
    match entity.related(name) {
        Some(Related::Many(targets)) => targets,
        other => panic!("`{name}` should be plural, got {other:?}"),
    }
}

#[test]
fn test_plural_relation_keeps_order() -> Result<()> {
    let catalog = catalog();
    let tree = person_tree(&catalog)?;
    let mut session = Session::default();
    let person = person_with_phones(&catalog, &[Some("555-0100"), Some("555-0101")])?;

    let doc = tree
        .materialize(&mut session, &person, None)?
        .expect("person should materialize");
    assert_eq!(
        numbers_in(&doc),
        vec![Value::from("555-0100"), Value::from("555-0101")]
    );

    let absorbed = tree.absorb(&mut session, &doc, None)?.expect("absorbed");
    let numbers: Vec<_> = related_many(&absorbed, "phones")
        .iter()
        .map(|phone| phone.read("number"))
        .collect();
    assert_eq!(
        numbers,
        vec![Some(Value::from("555-0100")), Some(Value::from("555-0101"))]
    );
    Ok(())
}

#[test]
fn test_blank_elements_are_skipped() -> Result<()> {
    let catalog = catalog();
    let tree = person_tree(&catalog)?;
    let mut session = Session::default();
    let person = person_with_phones(&catalog, &[Some("555-0100"), None, Some("555-0102")])?;

    let doc = tree
        .materialize(&mut session, &person, None)?
        .expect("person should materialize");
    assert_eq!(
        numbers_in(&doc),
        vec![Value::from("555-0100"), Value::from("555-0102")]
    );
    Ok(())
}

#[test]
fn test_repeated_materialize_is_stable() -> Result<()> {
    let catalog = catalog();
    let tree = person_tree(&catalog)?;
    let mut session = Session::default();
    let person = person_with_phones(&catalog, &[Some("555-0100"), Some("555-0101")])?;
    let existing = DocHandle::new(Element::new("nc::PersonType"));

    tree.materialize(&mut session, &person, Some(&existing))?;
    let first = serde_json::to_value(&existing)?;
    tree.materialize(&mut session, &person, Some(&existing))?;
    assert_eq!(serde_json::to_value(&existing)?, first);
    assert_eq!(numbers_in(&existing).len(), 2);
    Ok(())
}

#[test]
fn test_singular_relation_round_trip() -> Result<()> {
    let catalog = catalog();
    let tree = person_tree(&catalog)?;
    let mut session = Session::default();
    let person = catalog.create("Person")?;
    let employer = catalog.create("Organization")?;
    employer.write("name", "Acme")?;
    person.attach("employer", employer)?;

    let doc = tree
        .materialize(&mut session, &person, None)?
        .expect("person should materialize");
    assert_eq!(
        doc.path("employer.name").map(|value| value.scalar()),
        Some(Value::from("Acme"))
    );
    assert!(doc.field("telephone").is_none());

    let absorbed = tree.absorb(&mut session, &doc, None)?.expect("absorbed");
    match absorbed.related("employer") {
        Some(Related::One(Some(org))) => assert_eq!(org.read("name"), Some(Value::from("Acme"))),
        other => panic!("expected an employer, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_correlated_documents_absorb_into_one_entity() -> Result<()> {
    let catalog = catalog();
    let tree = person_tree(&catalog)?;
    let mut session = Session::default();

    let phone = |number: &str| {
        Value::Document(DocHandle::new(
            Element::new("nc::TelephoneType")
                .with_attribute("s:id", "telephone_1")
                .with_field(
                    "number",
                    DocHandle::new(Element::new("nc::TextType").with_content(number)),
                ),
        ))
    };
    let doc = DocHandle::new(
        Element::new("nc::PersonType")
            .with_field("telephone", vec![phone("555-0100"), phone("555-0100")]),
    );

    let absorbed = tree.absorb(&mut session, &doc, None)?.expect("absorbed");
    let phones = related_many(&absorbed, "phones");
    assert_eq!(phones.len(), 2);
    assert!(phones[0].ptr_eq(&phones[1]));
    Ok(())
}

#[test]
fn test_indirect_relations_cannot_be_absorbed() -> Result<()> {
    let catalog = catalog();
    let tree = MappingTree::builder(schema(), "Person", "nc::PersonType")
        .entity_factory(catalog.factory("Person"))
        .child(
            Node::association("employer", Accessor::relation("colleagues"))
                .class("nc::OrganizationType")
                .child(Node::attribute("name").lens(Lens::attribute("name"))),
        )
        .build()?;
    let mut session = Session::default();

    let doc = DocHandle::new(
        Element::new("nc::PersonType").with_field(
            "employer",
            DocHandle::new(
                Element::new("nc::OrganizationType").with_field(
                    "name",
                    DocHandle::new(Element::new("nc::TextType").with_content("Acme")),
                ),
            ),
        ),
    );
    let err = tree.absorb(&mut session, &doc, None).unwrap_err();
    assert!(matches!(err, MapError::InvalidLens(_)));
    Ok(())
}

fn leaf(content: &str) -> DocHandle {
    DocHandle::new(Element::new("nc::TextType").with_content(content))
}

/// Employer converted by its own tree, with the tax id mapped on the outer node.
fn converted_employer_tree(catalog: &EntityCatalog) -> Result<(MappingTree, ConversionRegistry)> {
    let organization_tree = MappingTree::builder(schema(), "Organization", "nc::OrganizationType")
        .entity_factory(catalog.factory("Organization"))
        .child(Node::attribute("name").lens(Lens::attribute("name")))
        .build()?;
    let to_organization = ConversionName::for_class("Nc::OrganizationType")?;
    let mut registry = ConversionRegistry::new();
    registry.register(
        "Organization",
        Conversion::from_mapping(to_organization.clone(), Rc::new(organization_tree)),
    );

    let tree = MappingTree::builder(schema(), "Person", "nc::PersonType")
        .entity_factory(catalog.factory("Person"))
        .child(
            Node::association("employer", Lens::conversion_into("employer", to_organization))
                .child(Node::attribute("taxId").lens(Lens::attribute("tax_id"))),
        )
        .build()?;
    Ok((tree, registry))
}

#[test]
fn test_converted_element_needs_a_present_child() -> Result<()> {
    let catalog = catalog();
    let (tree, registry) = converted_employer_tree(&catalog)?;
    let mut session = Session::new(registry);

    let employer = |fields: &[(&str, &str)]| {
        let mut element = Element::new("nc::OrganizationType");
        for (name, content) in fields {
            element = element.with_field(*name, leaf(content));
        }
        DocHandle::new(Element::new("nc::PersonType").with_field("employer", DocHandle::new(element)))
    };

    let name_only = employer(&[("name", "Acme")]);
    assert!(tree.absorb(&mut session, &name_only, None)?.is_none());

    let complete = employer(&[("name", "Acme"), ("taxId", "12-345")]);
    let absorbed = tree.absorb(&mut session, &complete, None)?.expect("absorbed");
    match absorbed.related("employer") {
        Some(Related::One(Some(org))) => {
            assert_eq!(org.read("name"), Some(Value::from("Acme")));
            assert_eq!(org.read("tax_id"), Some(Value::from("12-345")));
        }
        other => panic!("expected an employer, got {other:?}"),
    }
    Ok(())
}
