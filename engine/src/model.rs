//! Model instances.
//!
//! A [`ModelInstance`] is an id, a `has_data` flag and a map of field values
//! checked against its type's [`TypeMetadata`]. Instances reference each
//! other through [`ModelRef`] handles, so a caller holding a handle keeps
//! seeing the same object after reconciliation updates it in place.
//!
//! Handles are single-threaded (`Rc<RefCell<_>>`). Access to one instance
//! graph must be serialized by the caller.

use crate::{
    counter::Counter,
    error::Result,
    metadata::{FieldKind, TypeMetadata},
    schema::ContainerKind,
    value::{FieldValue, Scalar},
    Error, RecordId,
};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// A record of a registered model type.
#[derive(Debug, Clone)]
pub struct ModelInstance {
    meta: Arc<TypeMetadata>,
    id: Option<RecordId>,
    has_data: bool,
    fields: BTreeMap<String, FieldValue>,
}

impl ModelInstance {
    /// An empty instance with no id.
    pub fn new(meta: Arc<TypeMetadata>) -> Self {
        Self {
            meta,
            id: None,
            has_data: false,
            fields: BTreeMap::new(),
        }
    }

    /// A stub carrying only an id.
    pub fn with_id(meta: Arc<TypeMetadata>, id: impl Into<RecordId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(meta)
        }
    }

    pub fn metadata(&self) -> &Arc<TypeMetadata> {
        &self.meta
    }

    pub fn type_name(&self) -> &str {
        self.meta.type_name()
    }

    pub fn schema_name(&self) -> &str {
        self.meta.schema_name()
    }

    pub fn id_field(&self) -> &str {
        self.meta.id_field()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<RecordId>) {
        self.id = Some(id.into());
    }

    /// Whether reconciliation has populated this instance.
    pub fn has_data(&self) -> bool {
        self.has_data
    }

    pub(crate) fn mark_filled(&mut self) {
        self.has_data = true;
    }

    /// Set a field, checking the value against the field's kind.
    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) -> Result<()> {
        let value = self.check(field, value.into())?;
        self.fields.insert(field.to_string(), value);
        Ok(())
    }

    /// Clear a field so it is no longer emitted.
    pub fn unset(&mut self, field: &str) -> Option<FieldValue> {
        self.fields.remove(field)
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Set field values, in field-name order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn get_mut(&mut self, field: &str) -> Option<&mut FieldValue> {
        self.fields.get_mut(field)
    }

    /// Store an already-decoded value without kind checks.
    pub(crate) fn put(&mut self, field: &str, value: FieldValue) {
        self.fields.insert(field.to_string(), value);
    }

    pub fn counter(&self, field: &str) -> Option<&Counter> {
        match self.fields.get(field) {
            Some(FieldValue::Counter(c)) => Some(c),
            _ => None,
        }
    }

    /// Mutable access to a counter field, creating a clean counter if unset.
    pub fn counter_mut(&mut self, field: &str) -> Option<&mut Counter> {
        if self.meta.kind_of(field) != Some(FieldKind::Counter) {
            return None;
        }
        let slot = self
            .fields
            .entry(field.to_string())
            .or_insert_with(|| FieldValue::Counter(Counter::new()));
        if slot.is_null() {
            *slot = FieldValue::Counter(Counter::new());
        }
        match slot {
            FieldValue::Counter(c) => Some(c),
            _ => None,
        }
    }

    /// The instance referenced by a ModelRef field.
    pub fn model(&self, field: &str) -> Option<ModelRef> {
        self.fields
            .get(field)
            .and_then(FieldValue::as_model)
            .cloned()
    }

    /// The instances held by a ModelArray field.
    pub fn models(&self, field: &str) -> Vec<ModelRef> {
        self.fields
            .get(field)
            .and_then(FieldValue::as_models)
            .map(|c| c.items().to_vec())
            .unwrap_or_default()
    }

    fn check(&self, field: &str, value: FieldValue) -> Result<FieldValue> {
        let meta = self.meta.field(field).ok_or_else(|| Error::UnknownField {
            model: self.type_name().to_string(),
            field: field.to_string(),
        })?;

        let mismatch = |got: String| Error::TypeMismatch {
            field: field.to_string(),
            expected: meta.declared.to_string(),
            got,
        };

        if !value.fits(meta.kind) {
            return Err(mismatch(value.variant_name().to_string()));
        }

        match value {
            FieldValue::Scalar(ref s) if Some(s.scalar_type()) != meta.scalar_type() => {
                Err(mismatch(s.scalar_type().to_string()))
            }
            FieldValue::Scalar(s) => Ok(FieldValue::Scalar(s.to_wire_precision())),
            FieldValue::Scalars(items) => {
                if let Some(bad) = items
                    .iter()
                    .find(|s| Some(s.scalar_type()) != meta.scalar_type())
                {
                    return Err(Error::ElementTypeMismatch {
                        field: field.to_string(),
                        expected: meta.declared.to_string(),
                        got: bad.scalar_type().to_string(),
                    });
                }
                let unique = meta.container() == Some(ContainerKind::UniqueSet);
                let mut kept: Vec<Scalar> = Vec::with_capacity(items.len());
                for item in items.into_iter().map(Scalar::to_wire_precision) {
                    if unique && kept.contains(&item) {
                        continue;
                    }
                    kept.push(item);
                }
                Ok(FieldValue::Scalars(kept))
            }
            FieldValue::Model(ref m) => {
                let target = meta.target_type().unwrap_or_default();
                let actual = metadata_of(m, &self.meta);
                if !actual.is_a(target) {
                    return Err(mismatch(actual.type_name().to_string()));
                }
                Ok(value)
            }
            FieldValue::Models(collection) => {
                let target = meta.target_type().unwrap_or_default();
                check_items(field, target, collection.items(), Some(&self.meta))?;
                let kind = meta.container().unwrap_or_default();
                Ok(FieldValue::Models(ModelCollection::new(
                    kind,
                    collection.into_items(),
                )))
            }
            other => Ok(other),
        }
    }
}

/// Check that every element is an instance of `target`.
pub(crate) fn check_elements(field: &str, target: &str, items: &[ModelRef]) -> Result<()> {
    check_items(field, target, items, None)
}

fn check_items(
    field: &str,
    target: &str,
    items: &[ModelRef],
    editing: Option<&Arc<TypeMetadata>>,
) -> Result<()> {
    for item in items {
        let actual = match editing {
            Some(editing) => metadata_of(item, editing),
            None => Arc::clone(item.borrow().metadata()),
        };
        if !actual.is_a(target) {
            return Err(Error::ElementTypeMismatch {
                field: field.to_string(),
                expected: target.to_string(),
                got: actual.type_name().to_string(),
            });
        }
    }
    Ok(())
}

/// Metadata of `item`; an instance already mutably borrowed is the one
/// being edited, whose metadata is `editing`.
fn metadata_of(item: &ModelRef, editing: &Arc<TypeMetadata>) -> Arc<TypeMetadata> {
    item.try_borrow()
        .map(|inner| Arc::clone(inner.metadata()))
        .unwrap_or_else(|| Arc::clone(editing))
}

/// Shared handle to a model instance.
#[derive(Clone)]
pub struct ModelRef(Rc<RefCell<ModelInstance>>);

impl ModelRef {
    pub fn new(instance: ModelInstance) -> Self {
        Self(Rc::new(RefCell::new(instance)))
    }

    /// Borrow the instance.
    ///
    /// # Panics
    ///
    /// Panics if the instance is currently mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, ModelInstance> {
        self.0.borrow()
    }

    /// Mutably borrow the instance.
    ///
    /// # Panics
    ///
    /// Panics if the instance is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, ModelInstance> {
        self.0.borrow_mut()
    }

    pub(crate) fn try_borrow(&self) -> Option<Ref<'_, ModelInstance>> {
        self.0.try_borrow().ok()
    }

    pub(crate) fn try_borrow_mut(&self) -> Option<RefMut<'_, ModelInstance>> {
        self.0.try_borrow_mut().ok()
    }

    /// Whether both handles point at the same instance.
    pub fn ptr_eq(&self, other: &ModelRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn id(&self) -> Option<RecordId> {
        self.0.borrow().id().map(str::to_string)
    }

    pub fn type_name(&self) -> String {
        self.0.borrow().type_name().to_string()
    }

    pub fn set(&self, field: &str, value: impl Into<FieldValue>) -> Result<()> {
        self.0.borrow_mut().set(field, value)
    }
}

impl fmt::Debug for ModelRef {
    // Relation graphs may be cyclic; print identity only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(inner) => f
                .debug_struct("ModelRef")
                .field("type", &inner.type_name())
                .field("id", &inner.id())
                .finish(),
            Err(_) => f.write_str("ModelRef(<borrowed>)"),
        }
    }
}

/// The instances held by a ModelArray field, with their container shape.
#[derive(Debug, Clone, Default)]
pub struct ModelCollection {
    kind: ContainerKind,
    items: Vec<ModelRef>,
}

impl ModelCollection {
    /// Build a collection; a `UniqueSet` drops repeated instances.
    pub fn new(kind: ContainerKind, items: Vec<ModelRef>) -> Self {
        let mut collection = Self {
            kind,
            items: Vec::with_capacity(items.len()),
        };
        for item in items {
            collection.push(item);
        }
        collection
    }

    pub fn sequence(items: Vec<ModelRef>) -> Self {
        Self::new(ContainerKind::Sequence, items)
    }

    pub fn unique_set(items: Vec<ModelRef>) -> Self {
        Self::new(ContainerKind::UniqueSet, items)
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub fn items(&self) -> &[ModelRef] {
        &self.items
    }

    pub fn into_items(self) -> Vec<ModelRef> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append an instance, unless a `UniqueSet` already holds it.
    pub fn push(&mut self, item: ModelRef) {
        if self.kind == ContainerKind::UniqueSet && self.contains(&item) {
            return;
        }
        self.items.push(item);
    }

    /// Same instance, or same id when both have one.
    pub fn contains(&self, item: &ModelRef) -> bool {
        let id = peek_id(item);
        self.items
            .iter()
            .any(|existing| existing.ptr_eq(item) || (id.is_some() && peek_id(existing) == id))
    }

    /// Drop every element whose id is in `ids`. Elements borrowed elsewhere
    /// are kept.
    pub fn remove_ids(&mut self, ids: &[RecordId]) {
        self.items
            .retain(|item| peek_id(item).map_or(true, |id| !ids.contains(&id)));
    }
}

/// Id of `item`, or `None` while it is mutably borrowed elsewhere.
fn peek_id(item: &ModelRef) -> Option<RecordId> {
    item.try_borrow()
        .and_then(|inner| inner.id().map(str::to_string))
}
