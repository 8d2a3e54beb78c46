//! Field values and the scalar codec table.
//!
//! Scalars travel on the wire as plain JSON with a fixed encoding per
//! [`ScalarType`]; anything the table cannot decode is reported as a
//! [`DecodeWarning`] rather than an error.

use crate::{
    counter::Counter,
    error::Result,
    metadata::FieldKind,
    model::{ModelCollection, ModelRef},
    schema::ScalarType,
    Error,
};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// A value the codec table could not decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeWarning {
    pub expected: String,
    pub got: &'static str,
}

impl DecodeWarning {
    pub(crate) fn new(expected: impl fmt::Display, got: &Value) -> Self {
        Self {
            expected: expected.to_string(),
            got: json_type_name(got),
        }
    }
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, got {}", self.expected, self.got)
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "Int",
        Value::Number(_) => "Float",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}

/// A primitive value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(DateTime<Utc>),
    BigInt(i128),
    Uuid(Uuid),
    Bytes(Vec<u8>),
}

impl Scalar {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Scalar::String(_) => ScalarType::String,
            Scalar::Bool(_) => ScalarType::Bool,
            Scalar::Int(_) => ScalarType::Int,
            Scalar::Float(_) => ScalarType::Float,
            Scalar::Date(_) => ScalarType::Date,
            Scalar::BigInt(_) => ScalarType::BigInt,
            Scalar::Uuid(_) => ScalarType::Uuid,
            Scalar::Bytes(_) => ScalarType::Bytes,
        }
    }

    /// Wire encoding.
    pub fn to_wire(&self) -> Value {
        match self {
            Scalar::String(s) => Value::String(s.clone()),
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::from(*i),
            // NaN and infinities have no JSON form
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Scalar::Date(d) => Value::from(d.timestamp_millis()),
            Scalar::BigInt(i) => {
                if let Ok(small) = i64::try_from(*i) {
                    Value::from(small)
                } else if let Ok(unsigned) = u64::try_from(*i) {
                    Value::from(unsigned)
                } else {
                    Value::String(i.to_string())
                }
            }
            Scalar::Uuid(u) => Value::String(u.hyphenated().to_string()),
            Scalar::Bytes(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        }
    }

    /// Decode a wire value as the given scalar type.
    pub fn decode(ty: ScalarType, value: &Value) -> std::result::Result<Self, DecodeWarning> {
        let decoded = match ty {
            ScalarType::String => value.as_str().map(|s| Scalar::String(s.to_string())),
            ScalarType::Bool => value.as_bool().map(Scalar::Bool),
            ScalarType::Int => value.as_i64().map(Scalar::Int),
            ScalarType::Float => value.as_f64().map(Scalar::Float),
            ScalarType::Date => value
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .map(Scalar::Date),
            ScalarType::BigInt => match value {
                Value::Number(n) => n
                    .as_i64()
                    .map(i128::from)
                    .or_else(|| n.as_u64().map(i128::from))
                    .map(Scalar::BigInt),
                Value::String(s) => s.parse().ok().map(Scalar::BigInt),
                _ => None,
            },
            ScalarType::Uuid => value
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(Scalar::Uuid),
            ScalarType::Bytes => value.as_array().and_then(|items| {
                items
                    .iter()
                    .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                    .collect::<Option<Vec<u8>>>()
                    .map(Scalar::Bytes)
            }),
        };
        decoded.ok_or_else(|| DecodeWarning::new(ty, value))
    }

    /// Drop precision the wire cannot carry: dates keep whole milliseconds.
    pub fn to_wire_precision(self) -> Self {
        match self {
            Scalar::Date(d) => Scalar::Date(truncate_to_millis(d)),
            other => other,
        }
    }

    /// Literal form used in query strings.
    pub fn to_query_literal(&self) -> String {
        match self {
            Scalar::String(s) => s.clone(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Date(d) => d.timestamp_millis().to_string(),
            Scalar::BigInt(i) => i.to_string(),
            Scalar::Uuid(u) => u.hyphenated().to_string(),
            Scalar::Bytes(bytes) => base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<i32> for Scalar {
    fn from(i: i32) -> Self {
        Scalar::Int(i64::from(i))
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Scalar::Float(f)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(d: DateTime<Utc>) -> Self {
        Scalar::Date(truncate_to_millis(d))
    }
}

fn truncate_to_millis(d: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(d.timestamp_millis()).unwrap_or(d)
}

impl From<Uuid> for Scalar {
    fn from(u: Uuid) -> Self {
        Scalar::Uuid(u)
    }
}

/// A geographic point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    lat: f64,
    lon: f64,
}

impl GeoPoint {
    /// Create a point, rejecting out-of-range coordinates.
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(Error::InvalidGeoPoint {
                lat: lat.to_string(),
                lon: lon.to_string(),
            });
        }
        Ok(Self { lat, lon })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    pub fn to_wire(&self) -> Value {
        serde_json::json!({ "lat": self.lat, "lon": self.lon })
    }

    pub fn from_wire(value: &Value) -> std::result::Result<Self, DecodeWarning> {
        let warn = || DecodeWarning::new("GeoPoint", value);
        let lat = value.get("lat").and_then(Value::as_f64).ok_or_else(warn)?;
        let lon = value.get("lon").and_then(Value::as_f64).ok_or_else(warn)?;
        Self::new(lat, lon).map_err(|_| warn())
    }

    /// `lat,lon` as used by geo query operators.
    pub fn to_query_literal(&self) -> String {
        format!("{},{}", self.lat, self.lon)
    }
}

/// A binary file field: either local bytes waiting for upload, or a
/// remote URL the server handed back, or both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFile {
    content_type: String,
    file_name: String,
    payload: Option<Vec<u8>>,
    url: Option<String>,
}

impl BinaryFile {
    /// A local file to upload.
    pub fn new(
        content_type: impl Into<String>,
        file_name: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            content_type: content_type.into(),
            file_name: file_name.into(),
            payload: Some(payload),
            url: None,
        }
    }

    /// A file known only by its remote URL.
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            content_type: String::new(),
            file_name: String::new(),
            payload: None,
            url: Some(url.into()),
        }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub(crate) fn set_url(&mut self, url: impl Into<String>) {
        self.url = Some(url.into());
    }

    /// Upload encoding, or `None` when there are no local bytes.
    pub fn to_wire(&self) -> Option<Value> {
        let payload = self.payload.as_ref()?;
        Some(Value::String(format!(
            "Content-Type: {}\nContent-Disposition: attachment; filename={}\nContent-Transfer-Encoding: base64\n\n{}",
            self.content_type,
            self.file_name,
            base64::engine::general_purpose::STANDARD.encode(payload)
        )))
    }
}

/// An email address that triggers the server's forgot-password flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgotPasswordEmail(String);

impl ForgotPasswordEmail {
    pub fn new(email: impl Into<String>) -> Self {
        Self(email.into())
    }

    pub fn email(&self) -> &str {
        &self.0
    }

    pub fn to_wire(&self) -> Value {
        Value::String(self.0.clone())
    }
}

/// The value held by a model field.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Null,
    Scalar(Scalar),
    Scalars(Vec<Scalar>),
    /// Object and ObjectArray fields
    Json(Value),
    Model(ModelRef),
    Models(ModelCollection),
    Counter(Counter),
    GeoPoint(GeoPoint),
    Binary(BinaryFile),
    ForgotPasswordEmail(ForgotPasswordEmail),
}

impl FieldValue {
    pub fn variant_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "Null",
            FieldValue::Scalar(_) => "Scalar",
            FieldValue::Scalars(_) => "Scalars",
            FieldValue::Json(_) => "Json",
            FieldValue::Model(_) => "Model",
            FieldValue::Models(_) => "Models",
            FieldValue::Counter(_) => "Counter",
            FieldValue::GeoPoint(_) => "GeoPoint",
            FieldValue::Binary(_) => "Binary",
            FieldValue::ForgotPasswordEmail(_) => "ForgotPasswordEmail",
        }
    }

    /// Whether this value can be stored in a field of `kind`.
    pub fn fits(&self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (FieldValue::Null, _)
                | (FieldValue::Scalar(_), FieldKind::Primitive)
                | (FieldValue::Scalars(_), FieldKind::PrimitiveArray)
                | (FieldValue::Json(_), FieldKind::Object | FieldKind::ObjectArray)
                | (FieldValue::Model(_), FieldKind::ModelRef)
                | (FieldValue::Models(_), FieldKind::ModelArray)
                | (FieldValue::Counter(_), FieldKind::Counter)
                | (FieldValue::GeoPoint(_), FieldKind::GeoPoint)
                | (FieldValue::Binary(_), FieldKind::Binary)
                | (FieldValue::ForgotPasswordEmail(_), FieldKind::ForgotPasswordEmail)
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            FieldValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Scalar(Scalar::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&ModelRef> {
        match self {
            FieldValue::Model(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_models(&self) -> Option<&ModelCollection> {
        match self {
            FieldValue::Models(m) => Some(m),
            _ => None,
        }
    }
}

impl From<Scalar> for FieldValue {
    fn from(value: Scalar) -> Self {
        FieldValue::Scalar(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Scalar(value.into())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Scalar(value.into())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Scalar(value.into())
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Scalar(value.into())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Scalar(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Scalar(value.into())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Scalar(value.into())
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        FieldValue::Scalar(value.into())
    }
}

impl From<Vec<Scalar>> for FieldValue {
    fn from(values: Vec<Scalar>) -> Self {
        FieldValue::Scalars(values)
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Json(value)
    }
}

impl From<ModelRef> for FieldValue {
    fn from(model: ModelRef) -> Self {
        FieldValue::Model(model)
    }
}

impl From<Vec<ModelRef>> for FieldValue {
    fn from(models: Vec<ModelRef>) -> Self {
        FieldValue::Models(ModelCollection::sequence(models))
    }
}

impl From<ModelCollection> for FieldValue {
    fn from(models: ModelCollection) -> Self {
        FieldValue::Models(models)
    }
}

impl From<Counter> for FieldValue {
    fn from(counter: Counter) -> Self {
        FieldValue::Counter(counter)
    }
}

impl From<GeoPoint> for FieldValue {
    fn from(point: GeoPoint) -> Self {
        FieldValue::GeoPoint(point)
    }
}

impl From<BinaryFile> for FieldValue {
    fn from(file: BinaryFile) -> Self {
        FieldValue::Binary(file)
    }
}

impl From<ForgotPasswordEmail> for FieldValue {
    fn from(email: ForgotPasswordEmail) -> Self {
        FieldValue::ForgotPasswordEmail(email)
    }
}
