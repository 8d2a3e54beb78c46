//! Field classification and the type registry.
//!
//! Every declared field is classified once into a [`FieldKind`], which
//! decides how the serializer emits it and how the reconciler decodes it.
//! The [`Registry`] owns the registered [`ModelType`]s and caches one
//! [`TypeMetadata`] per type.

use crate::{
    error::Result,
    model::{ModelInstance, ModelRef},
    schema::{id_field_for, ContainerKind, DeclaredType, ModelType, ScalarType},
    Error,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Semantic kind of a model field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Primitive,
    PrimitiveArray,
    Object,
    ObjectArray,
    ModelRef,
    ModelArray,
    Counter,
    GeoPoint,
    Binary,
    ForgotPasswordEmail,
}

impl FieldKind {
    /// Classify a declared type.
    pub fn of(declared: &DeclaredType) -> Self {
        match declared {
            DeclaredType::Scalar(_) => FieldKind::Primitive,
            DeclaredType::Json => FieldKind::Object,
            DeclaredType::Collection(_, element) => match element.as_ref() {
                DeclaredType::Scalar(_) => FieldKind::PrimitiveArray,
                DeclaredType::Model(_) => FieldKind::ModelArray,
                _ => FieldKind::ObjectArray,
            },
            DeclaredType::Model(_) => FieldKind::ModelRef,
            DeclaredType::Counter => FieldKind::Counter,
            DeclaredType::GeoPoint => FieldKind::GeoPoint,
            DeclaredType::Binary => FieldKind::Binary,
            DeclaredType::ForgotPasswordEmail => FieldKind::ForgotPasswordEmail,
        }
    }

    pub fn is_relation(self) -> bool {
        matches!(self, FieldKind::ModelRef | FieldKind::ModelArray)
    }
}

/// Classified field of a model type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMeta {
    pub name: String,
    pub wire_name: String,
    pub kind: FieldKind,
    pub declared: DeclaredType,
}

impl FieldMeta {
    fn new(name: &str, declared: &DeclaredType) -> Self {
        Self {
            name: name.to_string(),
            wire_name: name.to_lowercase(),
            kind: FieldKind::of(declared),
            declared: declared.clone(),
        }
    }

    /// Referenced model type name, for ModelRef and ModelArray fields.
    pub fn target_type(&self) -> Option<&str> {
        match &self.declared {
            DeclaredType::Model(name) => Some(name),
            DeclaredType::Collection(_, element) => match element.as_ref() {
                DeclaredType::Model(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    /// Container shape, for collection-typed fields.
    pub fn container(&self) -> Option<ContainerKind> {
        match &self.declared {
            DeclaredType::Collection(kind, _) => Some(*kind),
            _ => None,
        }
    }

    /// Element type of a collection-typed field.
    pub fn element(&self) -> Option<&DeclaredType> {
        match &self.declared {
            DeclaredType::Collection(_, element) => Some(element),
            _ => None,
        }
    }

    /// Scalar codec for Primitive fields and PrimitiveArray elements.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match &self.declared {
            DeclaredType::Scalar(s) => Some(*s),
            DeclaredType::Collection(_, element) => match element.as_ref() {
                DeclaredType::Scalar(s) => Some(*s),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Cached per-type field classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMetadata {
    type_name: String,
    schema_name: String,
    id_field: String,
    lineage: Vec<String>,
    fields: Vec<FieldMeta>,
    by_name: HashMap<String, usize>,
    by_wire: HashMap<String, String>,
}

impl TypeMetadata {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    /// Reserved id field name (`<schema>_id`).
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Whether this type is `type_name` or inherits from it.
    pub fn is_a(&self, type_name: &str) -> bool {
        self.lineage.iter().any(|t| t == type_name)
    }

    /// Fields in declaration order, ancestors first.
    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.field(name).map(|f| f.kind)
    }

    /// Resolve an incoming wire key to a declared field, ignoring case.
    pub fn resolve_wire(&self, key: &str) -> Option<&FieldMeta> {
        self.by_wire
            .get(&key.to_lowercase())
            .and_then(|name| self.field(name))
    }
}

/// Classify a model type, walking its whole parent chain.
///
/// A field redeclared on a subtype replaces the inherited declaration but
/// keeps the inherited position.
pub fn classify(model_type: &ModelType) -> TypeMetadata {
    let lineage: Vec<&ModelType> = model_type.lineage().collect();

    let mut fields: Vec<FieldMeta> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for ancestor in lineage.into_iter().rev() {
        for def in ancestor.own_fields() {
            let meta = FieldMeta::new(&def.name, &def.declared);
            match by_name.get(&def.name) {
                Some(&i) => fields[i] = meta,
                None => {
                    by_name.insert(def.name.clone(), fields.len());
                    fields.push(meta);
                }
            }
        }
    }

    let by_wire = fields
        .iter()
        .map(|f| (f.wire_name.clone(), f.name.clone()))
        .collect();

    TypeMetadata {
        type_name: model_type.type_name().to_string(),
        schema_name: model_type.schema_name().to_string(),
        id_field: id_field_for(model_type.schema_name()),
        lineage: model_type
            .lineage()
            .map(|t| t.type_name().to_string())
            .collect(),
        fields,
        by_name,
        by_wire,
    }
}

/// Registered model types and their cached metadata.
///
/// Shared as `Arc<Registry>`. Metadata for a type is computed at most once,
/// even when several threads ask for it concurrently on first use.
#[derive(Debug, Default)]
pub struct Registry {
    types: DashMap<String, Arc<ModelType>>,
    metadata: DashMap<String, Arc<TypeMetadata>>,
    classifications: AtomicUsize,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a model type under its type name.
    ///
    /// Registering the same name again replaces the descriptor and drops any
    /// metadata already cached for it.
    pub fn register(&self, model_type: ModelType) -> Arc<ModelType> {
        let name = model_type.type_name().to_string();
        let model_type = Arc::new(model_type);
        if self
            .types
            .insert(name.clone(), Arc::clone(&model_type))
            .is_some()
        {
            self.metadata.remove(&name);
        }
        tracing::debug!(model = %name, schema = %model_type.schema_name(), "model type registered");
        model_type
    }

    pub fn model_type(&self, type_name: &str) -> Result<Arc<ModelType>> {
        self.types
            .get(type_name)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| Error::UnknownModelType(type_name.to_string()))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Classified metadata for a registered type.
    pub fn metadata(&self, type_name: &str) -> Result<Arc<TypeMetadata>> {
        if let Some(cached) = self.metadata.get(type_name) {
            return Ok(Arc::clone(cached.value()));
        }

        let model_type = self.model_type(type_name)?;
        let entry = self
            .metadata
            .entry(type_name.to_string())
            .or_insert_with(|| {
                self.classifications.fetch_add(1, Ordering::Relaxed);
                Arc::new(classify(&model_type))
            });
        Ok(Arc::clone(entry.value()))
    }

    /// Create an empty, id-less instance of a registered type.
    pub fn instantiate(&self, type_name: &str) -> Result<ModelRef> {
        let meta = self.metadata(type_name)?;
        Ok(ModelRef::new(ModelInstance::new(meta)))
    }

    /// Number of classifications performed so far.
    pub fn classification_count(&self) -> usize {
        self.classifications.load(Ordering::Relaxed)
    }
}
