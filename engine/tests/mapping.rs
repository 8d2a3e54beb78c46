//! Round-trip, identity and projection tests for stow-engine
//!
//! These exercise serialization and reconciliation together, the way a
//! save followed by a fetch would.

use chrono::DateTime;
use proptest::prelude::*;
use serde_json::json;
use stow_engine::{
    fill_from, to_wire, Counter, DeclaredType, FieldDef, FieldValue, ModelRef, ModelType,
    Registry, Scalar, ScalarType, Selection,
};
use std::collections::BTreeSet;

fn create_registry() -> Registry {
    let registry = Registry::new();
    registry.register(
        ModelType::builder("Publisher")
            .field(FieldDef::scalar("name", ScalarType::String))
            .build(),
    );
    registry.register(
        ModelType::builder("Author")
            .field(FieldDef::scalar("name", ScalarType::String))
            .field(FieldDef::model("publisher", "Publisher"))
            .build(),
    );
    registry.register(
        ModelType::builder("Book")
            .fields([
                FieldDef::scalar("title", ScalarType::String),
                FieldDef::scalar("pages", ScalarType::Int),
                FieldDef::scalar("rating", ScalarType::Float),
                FieldDef::scalar("inPrint", ScalarType::Bool),
                FieldDef::scalar("publishedAt", ScalarType::Date),
                FieldDef::new("tags", DeclaredType::list(DeclaredType::string())),
                FieldDef::model("author", "Author"),
                FieldDef::model("publisher", "Publisher"),
                FieldDef::models("editors", "Author"),
                FieldDef::counter("likes"),
            ])
            .build(),
    );
    registry
}

fn author(registry: &Registry, name: &str) -> ModelRef {
    let author = registry.instantiate("Author").unwrap();
    author.set("name", name).unwrap();
    author
}

fn scalar_of(instance: &ModelRef, field: &str) -> Option<Scalar> {
    instance
        .borrow()
        .get(field)
        .and_then(FieldValue::as_scalar)
        .cloned()
}

// ============================================================================
// Round Trip
// ============================================================================

#[test]
fn round_trip_through_depth_one() {
    let registry = create_registry();
    let book = registry.instantiate("Book").unwrap();
    book.set("title", "Dune").unwrap();
    book.set("pages", 412).unwrap();
    book.set("tags", vec![Scalar::from("scifi"), Scalar::from("classic")])
        .unwrap();
    book.set("author", author(&registry, "Frank")).unwrap();
    book.set(
        "editors",
        vec![author(&registry, "Ann"), author(&registry, "Bo")],
    )
    .unwrap();

    let out = to_wire(&book, 1, &Selection::all()).unwrap();
    let copy = registry.instantiate("Book").unwrap();
    fill_from(&registry, &copy, &out.value, None);

    assert_eq!(copy.id(), book.id());
    assert_eq!(scalar_of(&copy, "title"), Some(Scalar::from("Dune")));
    assert_eq!(scalar_of(&copy, "pages"), Some(Scalar::Int(412)));
    assert!(matches!(
        copy.borrow().get("tags"),
        Some(FieldValue::Scalars(tags)) if tags.len() == 2
    ));

    let copied_author = copy.borrow().model("author").unwrap();
    assert_eq!(copied_author.id(), book.borrow().model("author").unwrap().id());
    assert_eq!(scalar_of(&copied_author, "name"), Some(Scalar::from("Frank")));

    let names: Vec<Option<Scalar>> = copy
        .borrow()
        .models("editors")
        .iter()
        .map(|e| scalar_of(e, "name"))
        .collect();
    assert_eq!(
        names,
        vec![Some(Scalar::from("Ann")), Some(Scalar::from("Bo"))]
    );
}

#[test]
fn sub_millisecond_dates_round_trip() {
    let registry = create_registry();
    let book = registry.instantiate("Book").unwrap();
    let precise = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
    book.set("publishedAt", precise).unwrap();

    let stored = scalar_of(&book, "publishedAt");
    let out = to_wire(&book, 0, &Selection::all()).unwrap();
    assert_eq!(out.value["publishedat"], json!(1_700_000_000_123i64));

    let copy = registry.instantiate("Book").unwrap();
    fill_from(&registry, &copy, &out.value, None);
    assert_eq!(scalar_of(&copy, "publishedAt"), stored);
    assert_eq!(
        stored,
        Some(Scalar::Date(
            DateTime::from_timestamp_millis(1_700_000_000_123).unwrap()
        ))
    );
}

#[test]
fn relations_below_depth_arrive_as_stubs() {
    let registry = create_registry();
    let frank = author(&registry, "Frank");
    frank.borrow_mut().set_id("auth1");
    let book = registry.instantiate("Book").unwrap();
    book.set("author", frank).unwrap();

    let out = to_wire(&book, 0, &Selection::all()).unwrap();
    assert_eq!(out.value["author"], json!("auth1"));
    let copy = registry.instantiate("Book").unwrap();
    fill_from(&registry, &copy, &out.value, None);

    let stub = copy.borrow().model("author").unwrap();
    assert_eq!(stub.id().as_deref(), Some("auth1"));
    assert!(!stub.borrow().has_data());
    assert!(stub.borrow().get("name").is_none());
}

// ============================================================================
// Identity Preservation
// ============================================================================

#[test]
fn nested_instance_is_mutated_in_place() {
    let registry = create_registry();
    let frank = author(&registry, "Frank");
    frank.borrow_mut().set_id("auth1");
    let book = registry.instantiate("Book").unwrap();
    book.set("author", frank.clone()).unwrap();

    fill_from(
        &registry,
        &book,
        &json!({
            "book_id": "b1",
            "author": {"author_id": "auth1", "name": "Frank Herbert"},
        }),
        None,
    );

    assert!(book.borrow().model("author").unwrap().ptr_eq(&frank));
    assert_eq!(
        scalar_of(&frank, "name"),
        Some(Scalar::from("Frank Herbert"))
    );
}

#[test]
fn locally_created_elements_adopt_server_ids() {
    let registry = create_registry();
    let ann = author(&registry, "Ann");
    let book = registry.instantiate("Book").unwrap();
    book.set("editors", vec![ann.clone()]).unwrap();

    fill_from(
        &registry,
        &book,
        &json!({"editors": [{"author_id": "srv1", "name": "Ann"}]}),
        None,
    );

    let editors = book.borrow().models("editors");
    assert!(editors[0].ptr_eq(&ann));
    assert_eq!(ann.id().as_deref(), Some("srv1"));
}

// ============================================================================
// Selection Projection
// ============================================================================

#[test]
fn selection_keeps_only_title_and_id() {
    let registry = create_registry();
    let book = registry.instantiate("Book").unwrap();
    book.set("title", "Dune").unwrap();
    book.set("author", author(&registry, "Frank")).unwrap();
    book.set("publisher", registry.instantiate("Publisher").unwrap())
        .unwrap();

    let out = to_wire(&book, 1, &Selection::of(["title"])).unwrap();
    let id = book.id().unwrap();
    assert_eq!(out.value, json!({"title": "Dune", "book_id": id}));
    assert!(out.relations.is_empty());
}

#[test]
fn selective_fill_ignores_unselected_keys() {
    let registry = create_registry();
    let book = registry.instantiate("Book").unwrap();

    fill_from(
        &registry,
        &book,
        &json!({"title": "Dune", "pages": 10, "author": {"name": "Frank"}}),
        Some(&Selection::of(["author.name"])),
    );

    assert!(book.borrow().get("title").is_none());
    assert!(book.borrow().get("pages").is_none());
    let author = book.borrow().model("author").unwrap();
    assert_eq!(scalar_of(&author, "name"), Some(Scalar::from("Frank")));
}

// ============================================================================
// Counters
// ============================================================================

#[test]
fn counter_force_then_increment() {
    let registry = create_registry();
    let book = registry.instantiate("Book").unwrap();
    book.set("likes", Counter::new()).unwrap();

    book.borrow_mut().counter_mut("likes").unwrap().force_to(5);
    let out = to_wire(&book, 0, &Selection::all()).unwrap();
    assert_eq!(out.value["likes"], json!(5));
    assert_eq!(book.borrow().counter("likes").unwrap().pending_delta(), 0);

    book.borrow_mut().counter_mut("likes").unwrap().update_by(3);
    assert_eq!(book.borrow().counter("likes").unwrap().get(), 5);
    let out = to_wire(&book, 0, &Selection::all()).unwrap();
    assert_eq!(out.value["likes[inc]"], json!(3));
    assert_eq!(book.borrow().counter("likes").unwrap().pending_delta(), 0);

    fill_from(&registry, &book, &json!({"likes": 8}), None);
    assert_eq!(book.borrow().counter("likes").unwrap().get(), 8);
}

// ============================================================================
// Properties
// ============================================================================

fn selectable_fields() -> impl Strategy<Value = BTreeSet<&'static str>> {
    proptest::sample::subsequence(vec!["title", "author", "publisher"], 0..=3)
        .prop_map(|fields| fields.into_iter().collect())
}

proptest! {
    #[test]
    fn scalars_round_trip(
        title in "\\PC{0,40}",
        pages in any::<i64>(),
        rating in -1.0e9f64..1.0e9,
        in_print in any::<bool>(),
        tags in proptest::collection::vec("[a-z]{1,8}", 0..5),
        author_name in "\\PC{0,20}",
    ) {
        let registry = create_registry();
        let book = registry.instantiate("Book").unwrap();
        book.set("title", title.as_str()).unwrap();
        book.set("pages", pages).unwrap();
        book.set("rating", rating).unwrap();
        book.set("inPrint", in_print).unwrap();
        book.set("tags", tags.iter().map(|t| Scalar::from(t.as_str())).collect::<Vec<_>>())
            .unwrap();
        book.set("author", author(&registry, &author_name)).unwrap();

        let out = to_wire(&book, 1, &Selection::all()).unwrap();
        let copy = registry.instantiate("Book").unwrap();
        fill_from(&registry, &copy, &out.value, None);

        prop_assert_eq!(scalar_of(&copy, "title"), Some(Scalar::String(title)));
        prop_assert_eq!(scalar_of(&copy, "pages"), Some(Scalar::Int(pages)));
        prop_assert_eq!(scalar_of(&copy, "rating"), Some(Scalar::Float(rating)));
        prop_assert_eq!(scalar_of(&copy, "inPrint"), Some(Scalar::Bool(in_print)));
        let copied_tags = match copy.borrow().get("tags") {
            Some(FieldValue::Scalars(items)) => items.clone(),
            _ => Vec::new(),
        };
        let expected: Vec<Scalar> = tags.into_iter().map(Scalar::String).collect();
        prop_assert_eq!(copied_tags, expected);

        let copied_author = copy.borrow().model("author").unwrap();
        prop_assert_eq!(scalar_of(&copied_author, "name"), Some(Scalar::String(author_name)));
    }

    #[test]
    fn selection_projects_exactly(selected in selectable_fields()) {
        let registry = create_registry();
        let book = registry.instantiate("Book").unwrap();
        book.set("title", "Dune").unwrap();
        book.set("author", author(&registry, "Frank")).unwrap();
        book.set("publisher", registry.instantiate("Publisher").unwrap()).unwrap();

        let out = to_wire(&book, 1, &Selection::of(selected.iter())).unwrap();
        let keys: BTreeSet<String> = out.value.as_object().unwrap().keys().cloned().collect();

        let mut expected: BTreeSet<String> = selected.iter().map(|s| s.to_string()).collect();
        expected.insert("book_id".to_string());
        prop_assert_eq!(keys, expected);
    }
}
