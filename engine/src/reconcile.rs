//! Reconciliation of incoming wire JSON into existing model graphs.
//!
//! Incoming data is merged into the instances the caller already holds
//! rather than replacing them, so handles kept elsewhere stay valid.
//!
//! # Algorithm
//!
//! 1. A scalar is an unexpanded relation stub: only the id is set.
//! 2. For an object, each key is resolved case-insensitively to a declared
//!    field and decoded according to its kind.
//! 3. Relations reuse the current instance when ids match, otherwise a fresh
//!    instance of the declared type is filled.
//! 4. Relation arrays match elements by id first, then hand unmatched
//!    incoming elements to existing id-less elements, then allocate.
//! 5. The instance is marked as populated.
//!
//! Any field that cannot be decoded is logged and skipped; it never aborts
//! the remaining keys.

use crate::{
    metadata::{FieldKind, FieldMeta, Registry},
    model::{ModelCollection, ModelRef},
    schema::ContainerKind,
    selection::Selection,
    value::{BinaryFile, DecodeWarning, FieldValue, ForgotPasswordEmail, GeoPoint, Scalar},
    RecordId,
};
use serde_json::{Map, Value};

/// Merge `wire` into `instance`.
pub fn fill_from(
    registry: &Registry,
    instance: &ModelRef,
    wire: &Value,
    selection: Option<&Selection>,
) {
    Reconciler::new(registry).fill(instance, wire, selection);
}

/// Applies wire data to model instances, constructing related instances
/// through the registry.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'a> {
    registry: &'a Registry,
}

impl<'a> Reconciler<'a> {
    /// Create a new reconciler.
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Merge `wire` into `instance`, restricted to `selection` when given.
    pub fn fill(&self, instance: &ModelRef, wire: &Value, selection: Option<&Selection>) {
        match wire {
            Value::Object(map) => self.fill_object(instance, map, selection),
            Value::Null => {}
            stub => match scalar_id(stub) {
                Some(id) => instance.borrow_mut().set_id(id),
                None => tracing::warn!(
                    model = %instance.type_name(),
                    got = %crate::value::json_type_name(stub),
                    "ignoring relation stub without a usable id"
                ),
            },
        }
    }

    fn fill_object(
        &self,
        instance: &ModelRef,
        map: &Map<String, Value>,
        selection: Option<&Selection>,
    ) {
        let meta = instance.borrow().metadata().clone();

        for (key, value) in map {
            if key == meta.id_field() {
                match scalar_id(value) {
                    Some(id) => instance.borrow_mut().set_id(id),
                    None => tracing::warn!(
                        schema = %meta.schema_name(),
                        field = %key,
                        "ignoring id that is not a scalar"
                    ),
                }
                continue;
            }

            let Some(field) = meta.resolve_wire(key) else {
                tracing::warn!(
                    schema = %meta.schema_name(),
                    field = %key,
                    "skipping unknown incoming field"
                );
                continue;
            };

            if let Some(selection) = selection {
                if field.kind != FieldKind::Binary && !selection.is_selected(&field.name) {
                    continue;
                }
            }

            if let Err(warning) = self.fill_field(instance, field, value, selection) {
                tracing::warn!(
                    schema = %meta.schema_name(),
                    field = %field.name,
                    %warning,
                    "skipping undecodable field"
                );
            }
        }

        instance.borrow_mut().mark_filled();
    }

    fn fill_field(
        &self,
        instance: &ModelRef,
        field: &FieldMeta,
        value: &Value,
        selection: Option<&Selection>,
    ) -> Result<(), DecodeWarning> {
        if value.is_null() {
            if !matches!(field.kind, FieldKind::Counter | FieldKind::Binary) {
                instance.borrow_mut().put(&field.name, FieldValue::Null);
            }
            return Ok(());
        }

        let sub = selection.map(|s| s.sub_selection(&field.name));

        let decoded = match field.kind {
            FieldKind::ModelRef => {
                let existing = instance.borrow().model(&field.name);
                let child = self.reconcile_one(field, existing, value, sub.as_ref())?;
                FieldValue::Model(child)
            }
            FieldKind::ModelArray => {
                let existing = instance
                    .borrow()
                    .get(&field.name)
                    .and_then(FieldValue::as_models)
                    .cloned();
                FieldValue::Models(self.reconcile_many(field, existing, value, sub.as_ref())?)
            }
            FieldKind::Counter => {
                let committed = value
                    .as_i64()
                    .ok_or_else(|| DecodeWarning::new("Counter", value))?;
                let mut inst = instance.borrow_mut();
                if let Some(counter) = inst.counter_mut(&field.name) {
                    counter.commit(committed);
                }
                return Ok(());
            }
            FieldKind::Binary => {
                let url = value
                    .as_str()
                    .ok_or_else(|| DecodeWarning::new("Binary url", value))?;
                let mut inst = instance.borrow_mut();
                if let Some(FieldValue::Binary(file)) = inst.get_mut(&field.name) {
                    file.set_url(url);
                    return Ok(());
                }
                FieldValue::Binary(BinaryFile::remote(url))
            }
            FieldKind::GeoPoint => FieldValue::GeoPoint(GeoPoint::from_wire(value)?),
            FieldKind::ForgotPasswordEmail => {
                let email = value
                    .as_str()
                    .ok_or_else(|| DecodeWarning::new("ForgotPasswordEmail", value))?;
                FieldValue::ForgotPasswordEmail(ForgotPasswordEmail::new(email))
            }
            FieldKind::Primitive => {
                let ty = field
                    .scalar_type()
                    .ok_or_else(|| DecodeWarning::new(&field.declared, value))?;
                FieldValue::Scalar(Scalar::decode(ty, value)?)
            }
            FieldKind::PrimitiveArray => FieldValue::Scalars(decode_scalars(field, value)?),
            FieldKind::Object => FieldValue::Json(value.clone()),
            FieldKind::ObjectArray => {
                if !value.is_array() {
                    return Err(DecodeWarning::new(&field.declared, value));
                }
                FieldValue::Json(value.clone())
            }
        };

        instance.borrow_mut().put(&field.name, decoded);
        Ok(())
    }

    /// Reuse `existing` when its id matches, otherwise allocate.
    fn reconcile_one(
        &self,
        field: &FieldMeta,
        existing: Option<ModelRef>,
        value: &Value,
        selection: Option<&Selection>,
    ) -> Result<ModelRef, DecodeWarning> {
        let target = field.target_type().unwrap_or_default();
        let id_field = self.target_id_field(target, value)?;
        let incoming = incoming_id(value, &id_field);

        let child = match existing {
            Some(current) if incoming.is_some() && current.id() == incoming => current,
            _ => self.allocate(target, value)?,
        };
        self.fill(&child, value, selection);
        Ok(child)
    }

    fn reconcile_many(
        &self,
        field: &FieldMeta,
        existing: Option<ModelCollection>,
        value: &Value,
        selection: Option<&Selection>,
    ) -> Result<ModelCollection, DecodeWarning> {
        let elements = value
            .as_array()
            .ok_or_else(|| DecodeWarning::new(&field.declared, value))?;
        let target = field.target_type().unwrap_or_default();
        let id_field = self.target_id_field(target, value)?;

        let kind = existing
            .as_ref()
            .map(ModelCollection::kind)
            .or_else(|| field.container())
            .unwrap_or(ContainerKind::Sequence);
        let current: Vec<ModelRef> = existing.map(ModelCollection::into_items).unwrap_or_default();
        let current_ids: Vec<Option<RecordId>> = current.iter().map(ModelRef::id).collect();
        let mut used = vec![false; current.len()];
        let mut chosen: Vec<Option<ModelRef>> = vec![None; elements.len()];

        // First pass: match by id.
        for (slot, element) in chosen.iter_mut().zip(elements) {
            let Some(id) = incoming_id(element, &id_field) else {
                continue;
            };
            if let Some(i) = (0..current.len())
                .find(|&i| !used[i] && current_ids[i].as_deref() == Some(id.as_str()))
            {
                used[i] = true;
                *slot = Some(current[i].clone());
            }
        }

        // Second pass: adopt local instances that have not received an id yet.
        for slot in chosen.iter_mut().filter(|s| s.is_none()) {
            if let Some(i) = (0..current.len()).find(|&i| !used[i] && current_ids[i].is_none()) {
                used[i] = true;
                *slot = Some(current[i].clone());
            }
        }

        let mut items = Vec::with_capacity(elements.len());
        for (slot, element) in chosen.into_iter().zip(elements) {
            let child = match slot {
                Some(child) => child,
                None => self.allocate(target, element)?,
            };
            self.fill(&child, element, selection);
            items.push(child);
        }

        Ok(ModelCollection::new(kind, items))
    }

    fn allocate(&self, target: &str, value: &Value) -> Result<ModelRef, DecodeWarning> {
        self.registry
            .instantiate(target)
            .map_err(|_| DecodeWarning::new(format!("registered model type '{}'", target), value))
    }

    fn target_id_field(&self, target: &str, value: &Value) -> Result<String, DecodeWarning> {
        self.registry
            .metadata(target)
            .map(|meta| meta.id_field().to_string())
            .map_err(|_| DecodeWarning::new(format!("registered model type '{}'", target), value))
    }
}

/// Id carried by a stub scalar.
fn scalar_id(value: &Value) -> Option<RecordId> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Id of an incoming relation element, whether stub or expanded object.
fn incoming_id(value: &Value, id_field: &str) -> Option<RecordId> {
    match value {
        Value::Object(map) => map.get(id_field).and_then(scalar_id),
        other => scalar_id(other),
    }
}

fn decode_scalars(field: &FieldMeta, value: &Value) -> Result<Vec<Scalar>, DecodeWarning> {
    let (Some(ty), Some(items)) = (field.scalar_type(), value.as_array()) else {
        return Err(DecodeWarning::new(&field.declared, value));
    };
    let mut out: Vec<Scalar> = Vec::with_capacity(items.len());
    for item in items {
        let scalar = Scalar::decode(ty, item)?;
        if field.container() == Some(ContainerKind::UniqueSet) && out.contains(&scalar) {
            continue;
        }
        out.push(scalar);
    }
    Ok(out)
}
