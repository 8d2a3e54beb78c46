//! # Stow Engine
//!
//! Client-side object mapping for a schema-less cloud object store.
//!
//! Application model types are described once, registered, and then moved
//! to and from the store's JSON wire format. Related records, counters,
//! geo points, files and password-reset emails each get their own wire
//! encoding, plus side-channel hints so the server can interpret them.
//!
//! ## Design Principles
//!
//! - **Explicit schemas**: every model type is a descriptor, never reflection
//! - **Classified once**: field kinds are computed once per type and cached
//! - **Best-effort reads**: malformed incoming fields are logged and skipped
//! - **Strict writes**: invalid model definitions fail before any output
//! - **No IO in the core**: the network lives behind [`Transport`]
//!
//! ## Core Concepts
//!
//! ### Model Types and Metadata
//!
//! A [`ModelType`] lists a type's fields and its parent type. The
//! [`Registry`] classifies each field into a [`FieldKind`] the first time
//! the type is used and caches the resulting [`TypeMetadata`].
//!
//! ### Serialization
//!
//! [`to_wire`] turns a model graph into a JSON body, expanding relations up
//! to a depth and collapsing deeper ones to their ids. It also returns the
//! relation and type hints for the request headers.
//!
//! ### Reconciliation
//!
//! [`fill_from`] merges incoming JSON into instances the caller already
//! holds. Related instances with matching ids are updated in place.
//!
//! ### Queries
//!
//! [`QueryExpression`] trees of conditions and AND/OR groups encode into flat
//! query-string pairs such as `[or1].[and2].dog=bodie`.
//!
//! ## Quick Start
//!
//! ```rust
//! use stow_engine::{
//!     to_wire, fill_from, FieldDef, ModelType, Registry, ScalarType, Selection,
//! };
//! use serde_json::json;
//!
//! // 1. Describe and register the model types
//! let registry = Registry::new();
//! registry.register(
//!     ModelType::builder("Author")
//!         .field(FieldDef::scalar("name", ScalarType::String))
//!         .build(),
//! );
//! registry.register(
//!     ModelType::builder("Book")
//!         .field(FieldDef::scalar("title", ScalarType::String))
//!         .field(FieldDef::model("author", "Author"))
//!         .build(),
//! );
//!
//! // 2. Build a graph
//! let author = registry.instantiate("Author").unwrap();
//! author.set("name", "Frank").unwrap();
//! let book = registry.instantiate("Book").unwrap();
//! book.set("title", "Dune").unwrap();
//! book.set("author", author.clone()).unwrap();
//!
//! // 3. Serialize with one level of expansion
//! let out = to_wire(&book, 1, &Selection::all()).unwrap();
//! assert_eq!(out.value["author"]["name"], json!("Frank"));
//! assert_eq!(out.relations.get("author"), Some("author"));
//!
//! // 4. Merge the server's answer back in place
//! let author_id = author.id().unwrap();
//! let reply = json!({"author": {"author_id": author_id, "name": "F. Herbert"}});
//! fill_from(&registry, &book, &reply, None);
//! assert_eq!(author.borrow().get("name").unwrap().as_str(), Some("F. Herbert"));
//! ```
//!
//! ## Configuration
//!
//! [`Config::load`] reads `STOW_EXPAND_DEPTH`, `STOW_MAX_EXPAND_DEPTH` and
//! `STOW_API_VERSION`, picking up a `.env` file when present.

pub mod client;
pub mod config;
pub mod counter;
pub mod error;
pub mod hints;
pub mod metadata;
pub mod model;
pub mod query;
pub mod reconcile;
pub mod schema;
pub mod selection;
pub mod serialize;
pub mod value;

// Re-export main types at crate root
pub use client::{Client, Method, Request, Response, Transport, TransportError};
pub use config::{Config, ConfigError};
pub use counter::{Counter, CounterMode, CounterWrite};
pub use error::{Error, Result};
pub use hints::{RelationHints, TypeHints, TypeTag};
pub use metadata::{classify, FieldKind, FieldMeta, Registry, TypeMetadata};
pub use model::{ModelCollection, ModelInstance, ModelRef};
pub use query::{field, Combinator, Condition, Direction, Expr, Operator, Query, QueryExpression};
pub use reconcile::{fill_from, Reconciler};
pub use schema::{ContainerKind, DeclaredType, FieldDef, ModelType, ScalarType};
pub use selection::Selection;
pub use serialize::{generate_id, to_wire, WireOutput};
pub use value::{BinaryFile, FieldValue, ForgotPasswordEmail, GeoPoint, Scalar};

/// Type aliases for clarity
pub type RecordId = String;
