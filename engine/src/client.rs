//! Save, fetch, query and delete operations over a pluggable transport.
//!
//! The client wraps the core: it serializes before a write, reconciles after
//! a read, and encodes queries for reads and bulk deletes. Network I/O,
//! retries and timeouts are the transport's business.

use crate::{
    config::Config,
    error::{Error, Result},
    hints::{RelationHints, TypeHints},
    metadata::{FieldKind, FieldMeta, Registry, TypeMetadata},
    model::{check_elements, ModelCollection, ModelRef},
    query::{Query, EXPAND_PARAM, RANGE_HEADER, SELECT_HEADER},
    reconcile::fill_from,
    selection::Selection,
    serialize::to_wire,
    value::FieldValue,
    RecordId,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub const ACCEPT_HEADER: &str = "Accept";
pub const RELATIONS_HEADER: &str = "X-Stow-Relations";
pub const FIELD_TYPES_HEADER: &str = "X-Stow-FieldTypes";
pub const CASCADE_DELETE_HEADER: &str = "X-Stow-CascadeDelete";
pub const CONTENT_RANGE_HEADER: &str = "Content-Range";

/// HTTP verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// Outgoing request handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_query(mut self, params: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query.extend(params);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Response returned by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl Response {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Header lookup, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn find_header<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Failure below HTTP: connection refused, timeout and the like.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Transport(err.0)
    }
}

/// Synchronous request/response channel to the object store.
pub trait Transport {
    fn send(&self, request: &Request) -> std::result::Result<Response, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, request: &Request) -> std::result::Result<Response, TransportError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &Request) -> std::result::Result<Response, TransportError> {
        (**self).send(request)
    }
}

/// Object-store client bound to a registry and a transport.
pub struct Client<T> {
    registry: Arc<Registry>,
    transport: T,
    config: Config,
}

impl<T: Transport> Client<T> {
    /// Create a client with default configuration.
    pub fn new(registry: Arc<Registry>, transport: T) -> Self {
        Self::with_config(registry, transport, Config::default())
    }

    pub fn with_config(registry: Arc<Registry>, transport: T, config: Config) -> Self {
        Self {
            registry,
            transport,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Empty, unsaved instance of a registered type.
    pub fn create(&self, type_name: &str) -> Result<ModelRef> {
        self.registry.instantiate(type_name)
    }

    /// Save with the configured default expansion depth.
    pub fn save(&self, instance: &ModelRef) -> Result<()> {
        self.save_with_depth(instance, self.config.default_expansion_depth)
    }

    /// Create or update `instance`, then merge the server's answer into it.
    ///
    /// Counters are drained when the body is built, so a failed send loses
    /// their pending deltas.
    pub fn save_with_depth(&self, instance: &ModelRef, depth: u32) -> Result<()> {
        let depth = self.config.clamp_depth(depth);
        let meta = self.metadata_of(instance);
        let existing_id = instance.id();

        let depth = i32::try_from(depth).unwrap_or(i32::MAX);
        let output = to_wire(instance, depth, &Selection::all())?;

        let (method, path) = match existing_id {
            Some(id) => (Method::Put, record_path(&meta, &id)),
            None => (Method::Post, collection_path(&meta)),
        };
        let request = self
            .request(method, path)
            .with_headers(hint_headers(&output.relations, &output.types))
            .with_body(output.value);

        let response = self.execute(&request)?;
        if response.body.is_object() {
            fill_from(&self.registry, instance, &response.body, None);
        }
        Ok(())
    }

    /// Fetch with the configured default depth and every field.
    pub fn fetch(&self, instance: &ModelRef) -> Result<()> {
        self.fetch_with(instance, self.config.default_expansion_depth, None)
    }

    /// Refresh `instance` from the server.
    pub fn fetch_with(
        &self,
        instance: &ModelRef,
        depth: u32,
        selection: Option<&Selection>,
    ) -> Result<()> {
        let meta = self.metadata_of(instance);
        let id = require_id(instance)?;
        let depth = self.config.clamp_depth(depth);

        let mut request = self.request(Method::Get, record_path(&meta, &id));
        if depth > 0 {
            request = request.with_query([(EXPAND_PARAM.to_string(), depth.to_string())]);
        }
        if let Some(paths) = selection.and_then(Selection::paths) {
            request = request.with_header(SELECT_HEADER, paths.collect::<Vec<_>>().join(","));
        }

        let response = self.execute(&request)?;
        if !response.body.is_object() {
            return Err(Error::InvalidResponse(format!(
                "expected an object for {} {}",
                meta.schema_name(),
                id
            )));
        }
        fill_from(&self.registry, instance, &response.body, selection);
        Ok(())
    }

    /// Run a query and reconcile every result into a fresh instance.
    pub fn query(&self, query: &Query) -> Result<Vec<ModelRef>> {
        let meta = self.registry.metadata(query.type_name())?;
        let mut query = query.clone();
        query.set_depth(self.config.clamp_depth(query.depth()));

        let request = self
            .request(Method::Get, collection_path(&meta))
            .with_query(query.query_params())
            .with_headers(query.headers());

        let response = self.execute(&request)?;
        let elements = response.body.as_array().ok_or_else(|| {
            Error::InvalidResponse(format!("expected an array for {}", meta.schema_name()))
        })?;

        let mut results = Vec::with_capacity(elements.len());
        for element in elements {
            let instance = self.registry.instantiate(query.type_name())?;
            fill_from(&self.registry, &instance, element, query.selection());
            results.push(instance);
        }
        tracing::debug!(schema = %meta.schema_name(), count = results.len(), "query results");
        Ok(results)
    }

    /// Number of records matching `query`.
    pub fn count(&self, query: &Query) -> Result<u64> {
        let meta = self.registry.metadata(query.type_name())?;
        let headers = query
            .headers()
            .into_iter()
            .filter(|(name, _)| name != RANGE_HEADER);

        let request = self
            .request(Method::Get, collection_path(&meta))
            .with_query(query.expression().encode())
            .with_headers(headers)
            .with_header(RANGE_HEADER, "objects=0-0");

        let response = self.execute(&request)?;
        if let Some(total) = response
            .header(CONTENT_RANGE_HEADER)
            .and_then(parse_content_range_total)
        {
            return Ok(total);
        }
        response
            .body
            .as_array()
            .map(|items| items.len() as u64)
            .ok_or_else(|| {
                Error::InvalidResponse(format!("no count for {}", meta.schema_name()))
            })
    }

    /// Delete one saved record.
    pub fn delete(&self, instance: &ModelRef) -> Result<()> {
        let meta = self.metadata_of(instance);
        let id = require_id(instance)?;
        let request = self.request(Method::Delete, record_path(&meta, &id));
        self.execute(&request)?;
        Ok(())
    }

    /// Delete every record matching `query`.
    pub fn delete_matching(&self, query: &Query) -> Result<()> {
        let meta = self.registry.metadata(query.type_name())?;
        let request = self
            .request(Method::Delete, collection_path(&meta))
            .with_query(query.expression().encode());
        self.execute(&request)?;
        Ok(())
    }

    /// Append `children` to a relation array on the server, then locally.
    pub fn append_and_save(
        &self,
        parent: &ModelRef,
        field: &str,
        children: Vec<ModelRef>,
    ) -> Result<()> {
        let meta = self.metadata_of(parent);
        let relation = relation_array(&meta, field)?;
        check_elements(field, relation.target_type().unwrap_or_default(), &children)?;
        let parent_id = require_id(parent)?;

        let mut relations = RelationHints::new();
        let mut types = TypeHints::new();
        let mut body = Vec::with_capacity(children.len());
        for child in &children {
            let output = to_wire(child, 0, &Selection::all())?;
            relations.merge_under(&relation.wire_name, &output.relations);
            types.merge_under(&relation.wire_name, &output.types);
            body.push(output.value);
        }
        if let Some(first) = children.first() {
            let schema = first.borrow().schema_name().to_string();
            relations.insert(&relation.wire_name, schema);
        }

        let path = format!("{}/{}", record_path(&meta, &parent_id), relation.wire_name);
        let request = self
            .request(Method::Post, path)
            .with_headers(hint_headers(&relations, &types))
            .with_body(Value::Array(body));
        self.execute(&request)?;

        let mut inst = parent.borrow_mut();
        match inst.get_mut(&relation.name) {
            Some(FieldValue::Models(collection)) => {
                for child in children {
                    collection.push(child);
                }
            }
            _ => {
                let kind = relation.container().unwrap_or_default();
                inst.put(
                    &relation.name,
                    FieldValue::Models(ModelCollection::new(kind, children)),
                );
            }
        }
        Ok(())
    }

    /// Remove `children` from a relation array on the server, then locally.
    ///
    /// With `cascade` the server also deletes the child records.
    pub fn remove_and_save(
        &self,
        parent: &ModelRef,
        field: &str,
        children: &[ModelRef],
        cascade: bool,
    ) -> Result<()> {
        let meta = self.metadata_of(parent);
        let relation = relation_array(&meta, field)?;
        check_elements(field, relation.target_type().unwrap_or_default(), children)?;
        let parent_id = require_id(parent)?;
        let ids = children
            .iter()
            .map(require_id)
            .collect::<Result<Vec<RecordId>>>()?;

        let path = format!(
            "{}/{}/{}",
            record_path(&meta, &parent_id),
            relation.wire_name,
            ids.join(",")
        );
        let mut request = self.request(Method::Delete, path);
        if cascade {
            request = request.with_header(CASCADE_DELETE_HEADER, "true");
        }
        self.execute(&request)?;

        if let Some(FieldValue::Models(collection)) = parent.borrow_mut().get_mut(&relation.name)
        {
            collection.remove_ids(&ids);
        }
        Ok(())
    }

    fn request(&self, method: Method, path: String) -> Request {
        Request::new(method, path).with_header(
            ACCEPT_HEADER,
            format!(
                "application/vnd.stow+json; version={}",
                self.config.api_version
            ),
        )
    }

    fn execute(&self, request: &Request) -> Result<Response> {
        tracing::debug!(method = %request.method, path = %request.path, "sending request");
        let response = self.transport.send(request)?;
        if !response.is_success() {
            tracing::warn!(
                method = %request.method,
                path = %request.path,
                status = response.status,
                "request failed"
            );
            return Err(Error::Http {
                status: response.status,
                body: response.body.to_string(),
            });
        }
        Ok(response)
    }

    fn metadata_of(&self, instance: &ModelRef) -> Arc<TypeMetadata> {
        Arc::clone(instance.borrow().metadata())
    }
}

fn collection_path(meta: &TypeMetadata) -> String {
    format!("/{}", meta.schema_name())
}

fn record_path(meta: &TypeMetadata, id: &str) -> String {
    format!("/{}/{}", meta.schema_name(), id)
}

fn require_id(instance: &ModelRef) -> Result<RecordId> {
    instance
        .id()
        .ok_or_else(|| Error::MissingId(instance.type_name()))
}

fn relation_array<'m>(meta: &'m TypeMetadata, field: &str) -> Result<&'m FieldMeta> {
    let relation = meta.field(field).ok_or_else(|| Error::UnknownField {
        model: meta.type_name().to_string(),
        field: field.to_string(),
    })?;
    if relation.kind != FieldKind::ModelArray {
        return Err(Error::TypeMismatch {
            field: field.to_string(),
            expected: "ModelArray".to_string(),
            got: format!("{:?}", relation.kind),
        });
    }
    Ok(relation)
}

fn hint_headers(relations: &RelationHints, types: &TypeHints) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    if let Some(value) = relations.to_header_value() {
        headers.push((RELATIONS_HEADER.to_string(), value));
    }
    if let Some(value) = types.to_header_value() {
        headers.push((FIELD_TYPES_HEADER.to_string(), value));
    }
    headers
}

/// Total from `objects <start>-<end>/<total>`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}
