//! Edge case tests for stow-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use serde_json::{json, Value};
use stow_engine::{
    field, fill_from, to_wire, BinaryFile, Counter, DeclaredType, Error, Expr, FieldDef,
    FieldValue, ForgotPasswordEmail, GeoPoint, ModelType, QueryExpression, Registry, ScalarType,
    Selection,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn create_test_registry() -> Registry {
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
                FieldDef::scalar("copies", ScalarType::BigInt),
                FieldDef::model("author", "Author"),
                FieldDef::models("editors", "Author"),
                FieldDef::counter("likes"),
                FieldDef::new("shelf", DeclaredType::GeoPoint),
                FieldDef::new("cover", DeclaredType::Binary),
                FieldDef::new("extra", DeclaredType::Json),
            ])
            .build(),
    );
    registry
}

// ============================================================================
// Name Validation
// ============================================================================

#[test]
fn name_length_boundaries() {
    let registry = Registry::new();
    let at_limit = "a".repeat(25);
    let over_limit = "a".repeat(26);
    registry.register(
        ModelType::builder("Box")
            .field(FieldDef::scalar(at_limit.as_str(), ScalarType::Int))
            .build(),
    );
    registry.register(
        ModelType::builder("Crate")
            .field(FieldDef::scalar(over_limit.as_str(), ScalarType::Int))
            .build(),
    );

    let ok = registry.instantiate("Box").unwrap();
    assert!(to_wire(&ok, 0, &Selection::all()).is_ok());

    let bad = registry.instantiate("Crate").unwrap();
    assert_eq!(
        to_wire(&bad, 0, &Selection::all()).unwrap_err(),
        Error::InvalidName(over_limit)
    );
    assert!(bad.id().is_none());
}

#[test]
fn short_schema_name_is_rejected() {
    let registry = Registry::new();
    registry.register(ModelType::builder("Ox").build());
    let ox = registry.instantiate("Ox").unwrap();

    let err = to_wire(&ox, 0, &Selection::all()).unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(err, Error::InvalidName("ox".into()));
}

#[test]
fn non_alphanumeric_field_is_rejected() {
    let registry = Registry::new();
    registry.register(
        ModelType::builder("Book")
            .field(FieldDef::scalar("page_count", ScalarType::Int))
            .build(),
    );
    let book = registry.instantiate("Book").unwrap();

    assert_eq!(
        to_wire(&book, 0, &Selection::all()).unwrap_err(),
        Error::InvalidName("page_count".into())
    );
}

#[test]
fn reserved_id_field_leaves_no_trace() {
    let registry = Registry::new();
    registry.register(
        ModelType::builder("Book")
            .field(FieldDef::scalar("book_id", ScalarType::String))
            .field(FieldDef::counter("likes"))
            .build(),
    );
    let book = registry.instantiate("Book").unwrap();
    book.set("likes", Counter::new()).unwrap();
    book.borrow_mut().counter_mut("likes").unwrap().update_by(1);

    let err = to_wire(&book, 0, &Selection::all()).unwrap_err();
    assert!(matches!(err, Error::ReservedFieldName { .. }));
    assert!(book.id().is_none());
    assert_eq!(book.borrow().counter("likes").unwrap().pending_delta(), 1);
}

#[test]
fn custom_schema_name_sets_id_field() {
    let registry = Registry::new();
    registry.register(
        ModelType::builder("Book")
            .schema("volume")
            .field(FieldDef::scalar("title", ScalarType::String))
            .build(),
    );
    let book = registry.instantiate("Book").unwrap();
    book.borrow_mut().set_id("v1");

    let out = to_wire(&book, 0, &Selection::all()).unwrap();
    assert_eq!(out.value, json!({"volume_id": "v1"}));
}

// ============================================================================
// Scalar Edge Cases
// ============================================================================

#[test]
fn unicode_strings() {
    let registry = create_test_registry();
    let names = ["日本語テスト", "Привет мир", "🎉🚀💯", "Hello\nWorld\tTab", ""];

    for name in names {
        let book = registry.instantiate("Book").unwrap();
        book.set("title", name).unwrap();
        let out = to_wire(&book, 0, &Selection::all()).unwrap();

        let copy = registry.instantiate("Book").unwrap();
        fill_from(&registry, &copy, &out.value, None);
        assert_eq!(copy.borrow().get("title").unwrap().as_str(), Some(name));
    }
}

#[test]
fn big_integers_beyond_u64_travel_as_strings() {
    let registry = create_test_registry();
    let book = registry.instantiate("Book").unwrap();
    let huge: i128 = i128::from(u64::MAX) * 4;
    book.set("copies", stow_engine::Scalar::BigInt(huge)).unwrap();

    let out = to_wire(&book, 0, &Selection::all()).unwrap();
    assert_eq!(out.value["copies"], json!(huge.to_string()));

    let copy = registry.instantiate("Book").unwrap();
    fill_from(&registry, &copy, &out.value, None);
    assert!(matches!(
        copy.borrow().get("copies"),
        Some(FieldValue::Scalar(stow_engine::Scalar::BigInt(n))) if *n == huge
    ));
}

#[test]
fn geo_point_range_is_checked() {
    assert!(GeoPoint::new(90.0, 180.0).is_ok());
    assert!(matches!(
        GeoPoint::new(90.5, 0.0),
        Err(Error::InvalidGeoPoint { .. })
    ));
    assert!(GeoPoint::new(0.0, -180.5).is_err());
}

#[test]
fn mismatched_incoming_values_are_skipped() {
    init_tracing();
    let registry = create_test_registry();
    let book = registry.instantiate("Book").unwrap();

    fill_from(
        &registry,
        &book,
        &json!({
            "title": ["not", "a", "string"],
            "shelf": {"lat": "north"},
            "likes": 3.5,
            "copies": "twelve",
            "extra": {"ok": true},
        }),
        None,
    );

    let b = book.borrow();
    assert!(b.has_data());
    assert!(b.get("title").is_none());
    assert!(b.get("shelf").is_none());
    assert!(b.get("likes").is_none());
    assert!(b.get("copies").is_none());
    assert!(b.get("extra").is_some());
}

// ============================================================================
// Depth Edge Cases
// ============================================================================

#[test]
fn negative_depth_without_id_is_null() {
    let registry = create_test_registry();
    let book = registry.instantiate("Book").unwrap();

    let out = to_wire(&book, -1, &Selection::all()).unwrap();
    assert_eq!(out.value, Value::Null);
    assert!(book.id().is_none());
}

#[test]
fn deep_chain_collapses_at_depth() {
    let registry = create_test_registry();
    let publisher = registry.instantiate("Publisher").unwrap();
    publisher.set("name", "Chilton").unwrap();
    publisher.borrow_mut().set_id("p1");
    let author = registry.instantiate("Author").unwrap();
    author.set("publisher", publisher).unwrap();
    let book = registry.instantiate("Book").unwrap();
    book.set("author", author).unwrap();

    let shallow = to_wire(&book, 1, &Selection::all()).unwrap();
    assert_eq!(shallow.value["author"]["publisher"], json!("p1"));
    assert_eq!(shallow.relations.get("author.publisher"), Some("publisher"));

    let deep = to_wire(&book, 2, &Selection::all()).unwrap();
    assert_eq!(deep.value["author"]["publisher"]["name"], json!("Chilton"));
}

#[test]
fn empty_model_array_records_no_hint() {
    let registry = create_test_registry();
    let book = registry.instantiate("Book").unwrap();
    book.set("editors", Vec::<stow_engine::ModelRef>::new())
        .unwrap();

    let out = to_wire(&book, 1, &Selection::all()).unwrap();
    assert_eq!(out.value["editors"], json!([]));
    assert!(out.relations.is_empty());
}

// ============================================================================
// Special Field Kinds
// ============================================================================

#[test]
fn special_kinds_are_hinted_by_path() {
    let registry = Registry::new();
    registry.register(
        ModelType::builder("Account")
            .field(FieldDef::new("reset", DeclaredType::ForgotPasswordEmail))
            .build(),
    );
    registry.register(
        ModelType::builder("Store")
            .field(FieldDef::new("location", DeclaredType::GeoPoint))
            .field(FieldDef::model("owner", "Account"))
            .build(),
    );
    let account = registry.instantiate("Account").unwrap();
    account
        .set("reset", ForgotPasswordEmail::new("me@example.com"))
        .unwrap();
    let store = registry.instantiate("Store").unwrap();
    store
        .set("location", GeoPoint::new(37.5, -122.25).unwrap())
        .unwrap();
    store.set("owner", account).unwrap();

    let out = to_wire(&store, 1, &Selection::all()).unwrap();
    assert_eq!(out.value["location"], json!({"lat": 37.5, "lon": -122.25}));
    assert_eq!(out.value["owner"]["reset"], json!("me@example.com"));
    assert_eq!(
        out.types.to_header_value().as_deref(),
        Some("location=geopoint&owner.reset=forgotpassword")
    );
}

#[test]
fn binary_payload_is_base64_mime() {
    let registry = create_test_registry();
    let book = registry.instantiate("Book").unwrap();
    book.set("cover", BinaryFile::new("text/plain", "a.txt", b"hi".to_vec()))
        .unwrap();

    let out = to_wire(&book, 0, &Selection::all()).unwrap();
    let encoded = out.value["cover"].as_str().unwrap();
    assert!(encoded.starts_with("Content-Type: text/plain\n"));
    assert!(encoded.contains("filename=a.txt"));
    assert!(encoded.ends_with("\n\naGk="));
    assert_eq!(out.types.get("cover"), Some("binary"));
}

#[test]
fn counter_increments_accumulate_until_drained() {
    let registry = create_test_registry();
    let book = registry.instantiate("Book").unwrap();
    book.set("likes", Counter::with_value(10)).unwrap();
    {
        let mut b = book.borrow_mut();
        let likes = b.counter_mut("likes").unwrap();
        likes.update_by(2);
        likes.update_by(3);
        assert_eq!(likes.get(), 10);
    }

    let out = to_wire(&book, 0, &Selection::all()).unwrap();
    assert_eq!(out.value["likes[inc]"], json!(5));
    assert!(out.value.get("likes").is_none());

    let again = to_wire(&book, 0, &Selection::all()).unwrap();
    assert!(again.value.get("likes[inc]").is_none());
}

// ============================================================================
// Inheritance
// ============================================================================

#[test]
fn subtype_inherits_and_overrides_fields() {
    let registry = Registry::new();
    let base = registry.register(
        ModelType::builder("Item")
            .field(FieldDef::scalar("name", ScalarType::String))
            .field(FieldDef::scalar("weight", ScalarType::Int))
            .build(),
    );
    registry.register(
        ModelType::builder("Tool")
            .schema("item")
            .extends(base)
            .field(FieldDef::scalar("weight", ScalarType::Float))
            .field(FieldDef::scalar("brand", ScalarType::String))
            .build(),
    );

    let meta = registry.metadata("Tool").unwrap();
    let names: Vec<&str> = meta.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["name", "weight", "brand"]);
    assert!(meta.is_a("Item"));

    let tool = registry.instantiate("Tool").unwrap();
    tool.set("weight", 1.5).unwrap();
    assert!(tool.set("weight", 2).is_err());
}

#[test]
fn subtype_is_accepted_for_parent_relation() {
    let registry = Registry::new();
    let base = registry.register(ModelType::builder("Animal").build());
    registry.register(ModelType::builder("Dog").extends(base).build());
    registry.register(
        ModelType::builder("Owner")
            .field(FieldDef::model("pet", "Animal"))
            .build(),
    );

    let owner = registry.instantiate("Owner").unwrap();
    let dog = registry.instantiate("Dog").unwrap();
    owner.set("pet", dog).unwrap();

    let out = to_wire(&owner, 1, &Selection::all()).unwrap();
    assert_eq!(out.relations.get("pet"), Some("dog"));
}

// ============================================================================
// Query Edge Cases
// ============================================================================

#[test]
fn empty_expression_encodes_nothing() {
    assert!(QueryExpression::new().encode().is_empty());
    assert!(QueryExpression::from(Expr::or(Vec::<Expr>::new())).encode().is_empty());
}

#[test]
fn deeply_nested_groups_concatenate_prefixes() {
    let expr = QueryExpression::from(Expr::or([Expr::and([Expr::or([
        field("a").eq("1")
    ])])]));
    assert_eq!(
        expr.encode(),
        vec![("[or1].[and1].[or1].a".to_string(), "1".to_string())]
    );
}

#[test]
fn query_literals_render_scalars() {
    let expr = QueryExpression::new()
        .and(field("flag").eq(true))
        .and(field("ratio").lt(0.5));
    let mut pairs = expr.encode();
    pairs.sort();
    assert_eq!(
        pairs,
        vec![
            ("flag".to_string(), "true".to_string()),
            ("ratio[lt]".to_string(), "0.5".to_string()),
        ]
    );
}
