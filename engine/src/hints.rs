//! Relation and type hints.
//!
//! The server cannot tell from JSON alone that a nested object is a related
//! record or that a string is an encoded file. The serializer records that
//! knowledge per dotted field path; the transport sends it as two headers.

use std::collections::BTreeMap;
use std::fmt;

/// Wire-type tag for a special field kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    GeoPoint,
    Binary,
    ForgotPassword,
}

impl TypeTag {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::GeoPoint => "geopoint",
            TypeTag::Binary => "binary",
            TypeTag::ForgotPassword => "forgotpassword",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path-scoped accumulator of `dotted.path -> value` hints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hints {
    scope: Vec<String>,
    entries: BTreeMap<String, String>,
}

impl Hints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a nested field; later entries are recorded under it.
    pub fn push(&mut self, field: &str) {
        self.scope.push(field.to_lowercase());
    }

    pub fn pop(&mut self) {
        self.scope.pop();
    }

    /// Record a hint for `field` at the current scope.
    pub fn insert(&mut self, field: &str, value: impl Into<String>) {
        let key = self.path(field);
        self.entries.insert(key, value.into().to_lowercase());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy every entry of `other` under `scope`.
    pub fn merge_under(&mut self, scope: &str, other: &Hints) {
        self.push(scope);
        for (key, value) in other.iter() {
            self.insert(key, value);
        }
        self.pop();
    }

    /// `&`-joined `key=value` pairs, or `None` when there are no hints.
    pub fn to_header_value(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        Some(
            self.entries
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&"),
        )
    }

    fn path(&self, field: &str) -> String {
        let field = field.to_lowercase();
        if self.scope.is_empty() {
            field
        } else {
            format!("{}.{}", self.scope.join("."), field)
        }
    }
}

/// Dotted field path -> related schema name.
pub type RelationHints = Hints;

/// Dotted field path -> wire-type tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeHints(Hints);

impl TypeHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str) {
        self.0.push(field);
    }

    pub fn pop(&mut self) {
        self.0.pop();
    }

    pub fn insert(&mut self, field: &str, tag: TypeTag) {
        self.0.insert(field, tag.as_str());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path)
    }

    pub fn merge_under(&mut self, scope: &str, other: &TypeHints) {
        self.0.merge_under(scope, &other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter()
    }

    pub fn to_header_value(&self) -> Option<String> {
        self.0.to_header_value()
    }
}
