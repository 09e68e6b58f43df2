#![allow(missing_docs)]

use std::rc::Rc;

use anyhow::Result;
use docmap_core::{Accessor, Lens, MappingTree, Node, Session};
use docmap_model::{
    ClassDef, DocHandle, Element, EntityCatalog, EntityHandle, EntityType, Related, Schema, Value,
};

fn schema() -> Rc<Schema> {
    Rc::new(
        Schema::new("nc")
            .class(
                ClassDef::new("nc::TeamType")
                    .member("name", "nc::TextType")
                    .member("roster", "nc::PersonListType"),
            )
            .class(ClassDef::new("nc::PersonListType").member("person", "nc::PersonType"))
            .class(ClassDef::new("nc::PersonType").member("name", "nc::TextType"))
            .class(ClassDef::new("nc::OrganizationType").member("name", "nc::TextType"))
            .class(ClassDef::new("nc::TextType")),
    )
}

fn catalog() -> EntityCatalog {
    EntityCatalog::new([
        EntityType::new("Team")
            .attributes(["name", "audit"])
            .has_many("members", "Player"),
        EntityType::new("Player").attribute("name"),
    ])
}

fn team_tree(catalog: &EntityCatalog) -> Result<MappingTree> {
    Ok(MappingTree::builder(schema(), "Team", "nc::TeamType")
        .entity_factory(catalog.factory("Team"))
        .child(Node::attribute("name").lens(Lens::attribute("name")))
        .child(
            Node::collection("roster").element("person").child(
                Node::association("person", Accessor::relation("members"))
                    .default_attribute("nc:role", "player")
                    .child(Node::attribute("name").lens(Lens::attribute("name"))),
            ),
        )
        .build()?)
}

fn team(catalog: &EntityCatalog, players: &[&str]) -> Result<EntityHandle> {
    let team = catalog.create("Team")?;
    team.write("name", "Comets")?;
    for name in players {
        let player = catalog.create("Player")?;
        player.write("name", *name)?;
        team.attach("members", player)?;
    }
    Ok(team)
}

fn player_names(team: &EntityHandle) -> Vec<Option<Value>> {
    match team.related("members") {
        Some(Related::Many(players)) => players.iter().map(|player| player.read("name")).collect(),
        other => panic!("expected plural members, got {other:?}"),
    }
}

fn leaf(content: &str) -> DocHandle {
    DocHandle::new(Element::new("nc::TextType").with_content(content))
}

#[test]
fn test_collection_wraps_elements_in_one_aggregate() -> Result<()> {
    let catalog = catalog();
    let tree = team_tree(&catalog)?;
    let mut session = Session::default();

    let doc = tree
        .materialize(&mut session, &team(&catalog, &["Ada", "Grace"])?, None)?
        .expect("team should materialize");
    let Some(Value::Document(roster)) = doc.field("roster") else {
        panic!("roster should be one aggregate instance");
    };
    assert_eq!(roster.class(), "nc::PersonListType");
    let Some(Value::List(people)) = roster.field("person") else {
        panic!("people should be a list");
    };
    assert_eq!(people.len(), 2);
    for person in &people {
        let person = person.as_document().expect("person document");
        assert_eq!(person.attribute("nc:role"), Some(Value::from("player")));
    }

    let absorbed = tree.absorb(&mut session, &doc, None)?.expect("absorbed");
    assert_eq!(
        player_names(&absorbed),
        vec![Some(Value::from("Ada")), Some(Value::from("Grace"))]
    );
    Ok(())
}

#[test]
fn test_empty_collection_is_absent() -> Result<()> {
    let catalog = catalog();
    let tree = team_tree(&catalog)?;
    let mut session = Session::default();

    let doc = tree
        .materialize(&mut session, &team(&catalog, &[])?, None)?
        .expect("the name alone is present");
    assert_eq!(doc.field("roster"), None);
    Ok(())
}

#[test]
fn test_default_attributes_gate_absorb() -> Result<()> {
    let catalog = catalog();
    let tree = team_tree(&catalog)?;
    let mut session = Session::default();

    let person = |name: &str, role: &str| {
        Value::Document(DocHandle::new(
            Element::new("nc::PersonType")
                .with_attribute("nc:role", role)
                .with_field("name", leaf(name)),
        ))
    };
    let roster = DocHandle::new(
        Element::new("nc::PersonListType")
            .with_field("person", vec![person("Ada", "player"), person("Hal", "coach")]),
    );
    let doc = DocHandle::new(
        Element::new("nc::TeamType")
            .with_field("name", leaf("Comets"))
            .with_field("roster", roster),
    );

    let absorbed = tree.absorb(&mut session, &doc, None)?.expect("absorbed");
    assert_eq!(player_names(&absorbed), vec![Some(Value::from("Ada"))]);
    Ok(())
}

#[test]
fn test_foreign_collection_elements_are_rejected() -> Result<()> {
    let catalog = catalog();
    let tree = team_tree(&catalog)?;
    let mut session = Session::default();

    let roster = DocHandle::new(Element::new("nc::PersonListType").with_field(
        "person",
        DocHandle::new(Element::new("nc::OrganizationType").with_field("name", leaf("Acme"))),
    ));
    let doc = DocHandle::new(Element::new("nc::TeamType").with_field("roster", roster));

    assert!(tree.absorb(&mut session, &doc, None)?.is_none());
    Ok(())
}

#[test]
fn test_callbacks_run_in_their_own_direction() -> Result<()> {
    let catalog = catalog();
    let tree = MappingTree::builder(schema(), "Team", "nc::TeamType")
        .entity_factory(catalog.factory("Team"))
        .child(Node::attribute("name").lens(Lens::attribute("name")))
        .child(Node::on_materialize(|entity, doc, _accumulator, _scope| {
            doc.set_attribute("nc:audit", entity.read("audit").unwrap_or_default());
            Ok(true)
        }))
        .child(Node::on_absorb(|entity, doc, _accumulator, _scope| {
            let Some(audit) = doc.attribute("nc:audit") else {
                return Ok(false);
            };
            entity.write("audit", audit)?;
            Ok(true)
        }))
        .build()?;
    let mut session = Session::default();

    let source = team(&catalog, &[])?;
    source.write("audit", "checked")?;
    let doc = tree
        .materialize(&mut session, &source, None)?
        .expect("team should materialize");
    assert_eq!(doc.attribute("nc:audit"), Some(Value::from("checked")));

    let absorbed = tree.absorb(&mut session, &doc, None)?.expect("absorbed");
    assert_eq!(absorbed.read("audit"), Some(Value::from("checked")));
    Ok(())
}

#[test]
fn test_allow_nil_writes_explicit_nulls() -> Result<()> {
    let catalog = catalog();
    let tree = MappingTree::builder(schema(), "Team", "nc::TeamType")
        .entity_factory(catalog.factory("Team"))
        .child(Node::attribute("name").lens(Lens::attribute("name")).allow_nil())
        .build()?;
    let mut session = Session::default();

    let unnamed = catalog.create("Team")?;
    let doc = tree
        .materialize(&mut session, &unnamed, None)?
        .expect("a nil name still counts");
    assert_eq!(doc.field("name"), Some(Value::Null));

    let absorbed = tree.absorb(&mut session, &doc, None)?.expect("absorbed");
    assert_eq!(absorbed.read("name"), Some(Value::Null));
    Ok(())
}
