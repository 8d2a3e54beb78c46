//! Model type descriptors.
//!
//! A [`ModelType`] is the explicit, per-type schema descriptor: a type name,
//! the schema it maps to on the server, an optional parent type whose fields
//! it inherits, and an ordered list of declared fields. The
//! [`metadata`](crate::metadata) module classifies these declarations into
//! wire-level field kinds.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Suffix appended to a schema name to form its reserved id field.
pub const ID_FIELD_SUFFIX: &str = "_id";

const MIN_NAME_LEN: usize = 3;
const MAX_NAME_LEN: usize = 25;

/// Scalar types covered by the codec table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Bool,
    Int,
    Float,
    /// Travels as epoch milliseconds
    Date,
    BigInt,
    Uuid,
    /// Travels as an array of byte values
    Bytes,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarType::String => write!(f, "String"),
            ScalarType::Bool => write!(f, "Bool"),
            ScalarType::Int => write!(f, "Int"),
            ScalarType::Float => write!(f, "Float"),
            ScalarType::Date => write!(f, "Date"),
            ScalarType::BigInt => write!(f, "BigInt"),
            ScalarType::Uuid => write!(f, "Uuid"),
            ScalarType::Bytes => write!(f, "Bytes"),
        }
    }
}

/// Concrete shape of a collection-typed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContainerKind {
    /// Ordered, duplicates allowed
    #[default]
    Sequence,
    /// Ordered, duplicates dropped (by id for models, by value otherwise)
    UniqueSet,
}

/// The declared type of a model field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeclaredType {
    Scalar(ScalarType),
    /// Free-form value; must flatten to scalars or arrays of scalars on the wire
    Json,
    Collection(ContainerKind, Box<DeclaredType>),
    /// Reference to another registered model type, by type name
    Model(String),
    Counter,
    GeoPoint,
    Binary,
    ForgotPasswordEmail,
}

impl DeclaredType {
    pub fn string() -> Self {
        DeclaredType::Scalar(ScalarType::String)
    }

    pub fn int() -> Self {
        DeclaredType::Scalar(ScalarType::Int)
    }

    pub fn model(type_name: impl Into<String>) -> Self {
        DeclaredType::Model(type_name.into())
    }

    /// An ordered sequence of `element`.
    pub fn list(element: DeclaredType) -> Self {
        DeclaredType::Collection(ContainerKind::Sequence, Box::new(element))
    }

    /// A deduplicated collection of `element`.
    pub fn set(element: DeclaredType) -> Self {
        DeclaredType::Collection(ContainerKind::UniqueSet, Box::new(element))
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredType::Scalar(s) => write!(f, "{}", s),
            DeclaredType::Json => write!(f, "Json"),
            DeclaredType::Collection(ContainerKind::Sequence, e) => write!(f, "List<{}>", e),
            DeclaredType::Collection(ContainerKind::UniqueSet, e) => write!(f, "Set<{}>", e),
            DeclaredType::Model(name) => write!(f, "{}", name),
            DeclaredType::Counter => write!(f, "Counter"),
            DeclaredType::GeoPoint => write!(f, "GeoPoint"),
            DeclaredType::Binary => write!(f, "Binary"),
            DeclaredType::ForgotPasswordEmail => write!(f, "ForgotPasswordEmail"),
        }
    }
}

/// Definition of a field on a model type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Field name as declared (wire name is its lowercase form)
    pub name: String,
    /// Declared type
    pub declared: DeclaredType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, declared: DeclaredType) -> Self {
        Self {
            name: name.into(),
            declared,
        }
    }

    pub fn scalar(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self::new(name, DeclaredType::Scalar(scalar))
    }

    /// A single reference to another model type.
    pub fn model(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, DeclaredType::model(target))
    }

    /// An ordered list of references to another model type.
    pub fn models(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, DeclaredType::list(DeclaredType::model(target)))
    }

    pub fn counter(name: impl Into<String>) -> Self {
        Self::new(name, DeclaredType::Counter)
    }
}

/// Descriptor of a model type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelType {
    type_name: String,
    schema_name: String,
    parent: Option<Arc<ModelType>>,
    fields: Vec<FieldDef>,
}

impl ModelType {
    /// Start building a model type.
    pub fn builder(type_name: impl Into<String>) -> ModelTypeBuilder {
        ModelTypeBuilder {
            type_name: type_name.into(),
            schema_name: None,
            parent: None,
            fields: Vec::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Server-side schema this type maps to.
    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    /// Reserved primary-key field name (`<schema>_id`).
    pub fn id_field(&self) -> String {
        id_field_for(&self.schema_name)
    }

    pub fn parent(&self) -> Option<&Arc<ModelType>> {
        self.parent.as_ref()
    }

    /// Fields declared directly on this type (not inherited).
    pub fn own_fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// This type followed by its ancestors, nearest first.
    pub fn lineage(&self) -> impl Iterator<Item = &ModelType> {
        std::iter::successors(Some(self), |t| t.parent.as_deref())
    }
}

/// Builder for [`ModelType`].
#[derive(Debug, Clone)]
pub struct ModelTypeBuilder {
    type_name: String,
    schema_name: Option<String>,
    parent: Option<Arc<ModelType>>,
    fields: Vec<FieldDef>,
}

impl ModelTypeBuilder {
    /// Override the schema name (defaults to the lowercased type name).
    pub fn schema(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = Some(schema_name.into());
        self
    }

    /// Inherit all fields declared on `parent` and its ancestors.
    pub fn extends(mut self, parent: Arc<ModelType>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn build(self) -> ModelType {
        let schema_name = self
            .schema_name
            .unwrap_or_else(|| self.type_name.to_lowercase());
        ModelType {
            type_name: self.type_name,
            schema_name,
            parent: self.parent,
            fields: self.fields,
        }
    }
}

/// Reserved id field for a schema.
pub fn id_field_for(schema_name: &str) -> String {
    format!("{}{}", schema_name, ID_FIELD_SUFFIX)
}

/// Whether a schema or field name is acceptable to the object store.
pub fn is_valid_name(name: &str) -> bool {
    (MIN_NAME_LEN..=MAX_NAME_LEN).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Validate a schema or field name.
pub fn validate_name(name: &str) -> Result<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}
