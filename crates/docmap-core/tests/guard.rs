//! Discriminated branches selected by one entity attribute.

use std::rc::Rc;

use anyhow::Result;
use docmap_core::{Lens, MapError, MappingTree, Node, Session};
use docmap_model::{ClassDef, EntityCatalog, EntityHandle, EntityType, Schema, Value};

fn schema() -> Rc<Schema> {
    Rc::new(
        Schema::new("nc")
            .class(
                ClassDef::new("nc::ContactInformationType")
                    .member("email", "nc::TextType")
                    .member("phone", "nc::TextType"),
            )
            .class(ClassDef::new("nc::TextType")),
    )
}

fn catalog() -> EntityCatalog {
    EntityCatalog::new([EntityType::new("Contact").attributes(["kind", "value"])])
}

fn contact_tree(catalog: &EntityCatalog) -> Result<MappingTree> {
    let email = Node::guard(Lens::attribute("kind"), vec![Value::from("email")], None)?
        .child(Node::attribute("email").lens(Lens::attribute("value")));
    let phone = Node::guard(
        Lens::attribute("kind"),
        vec![Value::from("phone"), Value::from("fax")],
        Some(Value::from("phone")),
    )?
    .child(Node::attribute("phone").lens(Lens::attribute("value")));

    Ok(MappingTree::builder(schema(), "Contact", "nc::ContactInformationType")
        .entity_factory(catalog.factory("Contact"))
        .children([email, phone])
        .build()?)
}

fn contact(catalog: &EntityCatalog, kind: &str, value: &str) -> Result<EntityHandle> {
    let contact = catalog.create("Contact")?;
    contact.write("kind", kind)?;
    contact.write("value", value)?;
    Ok(contact)
}

#[test]
fn test_only_the_admitted_branch_materializes() -> Result<()> {
    let catalog = catalog();
    let tree = contact_tree(&catalog)?;
    let mut session = Session::default();

    let doc = tree
        .materialize(&mut session, &contact(&catalog, "email", "jo@example.org")?, None)?
        .expect("email branch");
    assert_eq!(
        doc.field("email").map(|value| value.scalar()),
        Some(Value::from("jo@example.org"))
    );
    assert_eq!(doc.field("phone"), None);

    let doc = tree
        .materialize(&mut session, &contact(&catalog, "phone", "555-0100")?, None)?
        .expect("phone branch");
    assert_eq!(doc.field("email"), None);
    assert!(doc.field("phone").is_some());
    Ok(())
}

#[test]
fn test_no_admitted_branch_means_absent() -> Result<()> {
    let catalog = catalog();
    let tree = contact_tree(&catalog)?;
    let mut session = Session::default();

    let sms = contact(&catalog, "sms", "555-0100")?;
    assert!(tree.materialize(&mut session, &sms, None)?.is_none());
    Ok(())
}

#[test]
fn test_absorb_writes_the_discriminator_back() -> Result<()> {
    let catalog = catalog();
    let tree = contact_tree(&catalog)?;
    let mut session = Session::default();

    let email = tree
        .materialize(&mut session, &contact(&catalog, "email", "jo@example.org")?, None)?
        .expect("email branch");
    let absorbed = tree.absorb(&mut session, &email, None)?.expect("absorbed");
    assert_eq!(absorbed.read("kind"), Some(Value::from("email")));
    assert_eq!(absorbed.read("value"), Some(Value::from("jo@example.org")));

    // Multi-valued branches always write their default.
    let fax = tree
        .materialize(&mut session, &contact(&catalog, "fax", "555-0199")?, None)?
        .expect("fax shares the phone branch");
    let absorbed = tree.absorb(&mut session, &fax, None)?.expect("absorbed");
    assert_eq!(absorbed.read("kind"), Some(Value::from("phone")));
    assert_eq!(absorbed.read("value"), Some(Value::from("555-0199")));
    Ok(())
}

#[test]
fn test_guard_configuration_errors() {
    let err = Node::guard(
        Lens::attribute("kind"),
        vec![Value::from("phone"), Value::from("fax")],
        None,
    )
    .unwrap_err();
    assert!(matches!(err, MapError::InvalidGuard(_)));

    let err = Node::guard(Lens::association("owner"), vec![Value::from("x")], None).unwrap_err();
    assert!(matches!(err, MapError::InvalidGuard(_)));
}
