//! Depth- and selection-aware serialization of model graphs.
//!
//! # Algorithm
//!
//! 1. Validate the whole graph down to the requested depth: schema and field
//!    names, reserved id collisions, nested objects. Nothing is mutated, so a
//!    configuration error leaves no partial output behind.
//! 2. Emit: assign missing ids, write selected fields under their lowercased
//!    names, recurse into relations at `depth - 1`, drain counters, and record
//!    relation and type hints by dotted path.
//!
//! An instance below depth zero collapses to its bare id.

use crate::{
    counter::CounterWrite,
    error::Result,
    hints::{RelationHints, TypeHints, TypeTag},
    metadata::{FieldKind, FieldMeta},
    model::ModelRef,
    schema::{validate_name, DeclaredType},
    selection::Selection,
    value::FieldValue,
    Error, RecordId,
};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Result of serializing a model graph.
#[derive(Debug, Clone, PartialEq)]
pub struct WireOutput {
    /// JSON body
    pub value: Value,
    /// Dotted path -> related schema name
    pub relations: RelationHints,
    /// Dotted path -> wire-type tag
    pub types: TypeHints,
}

/// Serialize `instance` to wire JSON, expanding relations `depth` levels.
pub fn to_wire(instance: &ModelRef, depth: i32, selection: &Selection) -> Result<WireOutput> {
    Serializer::new().serialize(instance, depth, selection)
}

/// Fresh opaque id for an unsaved instance.
pub fn generate_id() -> RecordId {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Accumulates hints while walking one model graph.
#[derive(Debug, Default)]
pub struct Serializer {
    relations: RelationHints,
    types: TypeHints,
}

impl Serializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate, then emit. Consumes the serializer.
    pub fn serialize(
        mut self,
        instance: &ModelRef,
        depth: i32,
        selection: &Selection,
    ) -> Result<WireOutput> {
        validate(instance, depth, selection, "")?;
        let value = self.emit(instance, depth, selection, "")?;
        Ok(WireOutput {
            value,
            relations: self.relations,
            types: self.types,
        })
    }

    fn emit(
        &mut self,
        instance: &ModelRef,
        depth: i32,
        selection: &Selection,
        path: &str,
    ) -> Result<Value> {
        if depth < 0 {
            let inst = instance
                .try_borrow()
                .ok_or_else(|| Error::InstanceBorrowed(path.to_string()))?;
            return Ok(inst.id().map_or(Value::Null, |id| Value::String(id.to_string())));
        }

        let mut inst = instance
            .try_borrow_mut()
            .ok_or_else(|| Error::InstanceBorrowed(path.to_string()))?;

        if inst.id().is_none() {
            inst.set_id(generate_id());
        }

        let meta = Arc::clone(inst.metadata());
        let id = inst.id().map(str::to_string);
        let mut body = Map::new();
        let mut related: Vec<(&FieldMeta, Vec<ModelRef>, bool)> = Vec::new();

        for field in meta.fields() {
            if !selection.is_selected(&field.name) {
                continue;
            }
            let Some(value) = inst.get_mut(&field.name) else {
                continue;
            };

            match value {
                FieldValue::Null => {}
                FieldValue::Scalar(s) => {
                    body.insert(field.wire_name.clone(), s.to_wire());
                }
                FieldValue::Scalars(items) => {
                    body.insert(
                        field.wire_name.clone(),
                        Value::Array(items.iter().map(|s| s.to_wire()).collect()),
                    );
                }
                FieldValue::Json(json) => {
                    body.insert(field.wire_name.clone(), json.clone());
                }
                FieldValue::Counter(counter) => match counter.drain() {
                    Some(CounterWrite::Set(v)) => {
                        body.insert(field.wire_name.clone(), Value::from(v));
                    }
                    Some(CounterWrite::Increment(d)) => {
                        body.insert(format!("{}[inc]", field.wire_name), Value::from(d));
                    }
                    None => {}
                },
                FieldValue::GeoPoint(point) => {
                    body.insert(field.wire_name.clone(), point.to_wire());
                    self.types.insert(&field.name, TypeTag::GeoPoint);
                }
                FieldValue::ForgotPasswordEmail(email) => {
                    body.insert(field.wire_name.clone(), email.to_wire());
                    self.types.insert(&field.name, TypeTag::ForgotPassword);
                }
                FieldValue::Binary(file) => {
                    if let Some(encoded) = file.to_wire() {
                        body.insert(field.wire_name.clone(), encoded);
                    }
                    self.types.insert(&field.name, TypeTag::Binary);
                }
                FieldValue::Model(child) => related.push((field, vec![child.clone()], false)),
                FieldValue::Models(collection) => {
                    related.push((field, collection.items().to_vec(), true))
                }
            }
        }

        // Release the instance before descending so shared children and
        // back-references can be visited again.
        drop(inst);

        for (field, children, is_array) in related {
            let sub = selection.sub_selection(&field.name);
            let child_path = join_path(path, &field.wire_name);

            self.relations.push(&field.name);
            self.types.push(&field.name);
            let emitted: Result<Vec<Value>> = children
                .iter()
                .map(|child| self.emit(child, depth - 1, &sub, &child_path))
                .collect();
            self.relations.pop();
            self.types.pop();
            let mut emitted = emitted?;

            // Arrays are hinted by their first element; empty ones not at all.
            if let Some(first) = children.first() {
                let schema = first
                    .try_borrow()
                    .map(|c| c.schema_name().to_string())
                    .ok_or_else(|| Error::InstanceBorrowed(child_path.clone()))?;
                self.relations.insert(&field.name, schema);
            }

            let value = if is_array {
                Value::Array(emitted)
            } else {
                emitted.pop().unwrap_or(Value::Null)
            };
            body.insert(field.wire_name.clone(), value);
        }

        if let Some(id) = id {
            body.insert(meta.id_field().to_string(), Value::String(id));
        }

        Ok(Value::Object(body))
    }
}

fn join_path(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", path, field)
    }
}

/// Side-effect-free pass raising every configuration error up front.
fn validate(instance: &ModelRef, depth: i32, selection: &Selection, path: &str) -> Result<()> {
    if depth < 0 {
        return Ok(());
    }

    let inst = instance
        .try_borrow()
        .ok_or_else(|| Error::InstanceBorrowed(path.to_string()))?;
    let meta = inst.metadata();
    validate_name(meta.schema_name())?;

    for field in meta.fields() {
        if field.name.eq_ignore_ascii_case(meta.id_field()) {
            return Err(Error::ReservedFieldName {
                schema: meta.schema_name().to_string(),
                field: field.name.clone(),
            });
        }
        validate_name(&field.name)?;
        if field.kind == FieldKind::ObjectArray
            && matches!(field.element(), Some(DeclaredType::Collection(..)))
        {
            return Err(Error::AmbiguousElementType(field.name.clone()));
        }
    }

    for field in meta.fields() {
        if !selection.is_selected(&field.name) {
            continue;
        }
        let child_path = join_path(path, &field.wire_name);
        match inst.get(&field.name) {
            Some(FieldValue::Json(json)) => validate_flat(field, json)?,
            Some(FieldValue::Model(child)) => validate(
                child,
                depth - 1,
                &selection.sub_selection(&field.name),
                &child_path,
            )?,
            Some(FieldValue::Models(collection)) => {
                let sub = selection.sub_selection(&field.name);
                for child in collection.items() {
                    validate(child, depth - 1, &sub, &child_path)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Object fields must flatten to scalars or arrays of scalars.
fn validate_flat(field: &FieldMeta, json: &Value) -> Result<()> {
    match json {
        Value::Object(_) => Err(Error::NestedObjectUnsupported(field.name.clone())),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Object(_) => {
                        return Err(Error::NestedObjectUnsupported(field.name.clone()))
                    }
                    Value::Array(_) if field.kind == FieldKind::ObjectArray => {
                        return Err(Error::AmbiguousElementType(field.name.clone()))
                    }
                    _ => {}
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
