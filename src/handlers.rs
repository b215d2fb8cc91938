//! CRUD operation handlers and the verb dispatch table.
//!
//! Each operation is a free function with the uniform signature
//! `fn(OperationContext<'_>) -> OperationFuture<'_>`; a [`HandlerSet`] maps
//! operations to functions and is resolved by the route compiler before
//! serving begins, so a missing handler is a registration failure, never a
//! request-time one.

use crate::error::ApiError;
use crate::response::CapabilityDescriptor;
use crate::routes::Endpoint;
use crate::serialize;
use crate::store::{Key, Record, StoreScope};
use axum::body::Bytes;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    Create,
    ReadAll,
    ReadOne,
    Update,
    Patch,
    Delete,
    Options,
    Head,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::ReadAll => "read-all",
            Operation::ReadOne => "read-one",
            Operation::Update => "update",
            Operation::Patch => "patch",
            Operation::Delete => "delete",
            Operation::Options => "options",
            Operation::Head => "head",
        };
        f.write_str(name)
    }
}

/// Per-request input: the parsed `:id` segment for item routes, the raw body
/// for verbs that carry one.
pub struct OperationInput {
    pub key: Option<Key>,
    pub body: Option<Bytes>,
}

pub struct OperationContext<'a> {
    pub scope: &'a mut dyn StoreScope,
    pub endpoint: &'a Endpoint,
    pub input: OperationInput,
}

/// What a handler produced; the dispatcher turns this into status + body.
#[derive(Debug)]
pub enum Outcome {
    /// 201 with the created instance.
    Created(Value),
    /// 200 with a single instance.
    One(Value),
    /// 200 with a sequence of instances.
    Many(Vec<Value>),
    /// 200 with the endpoint's capability descriptor.
    Capabilities(CapabilityDescriptor),
    /// 204, empty.
    NoContent,
    /// 200, empty JSON-typed body (existence probe).
    Empty,
}

pub type OperationFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Outcome, ApiError>> + Send + 'a>>;

pub type OperationFn = for<'a> fn(OperationContext<'a>) -> OperationFuture<'a>;

/// Explicit dispatch table from operation to handler function, built at
/// registration time.
#[derive(Clone)]
pub struct HandlerSet {
    table: HashMap<Operation, OperationFn>,
}

impl HandlerSet {
    pub fn empty() -> Self {
        HandlerSet {
            table: HashMap::new(),
        }
    }

    /// The full generic CRUD table.
    pub fn crud() -> Self {
        HandlerSet::empty()
            .with(Operation::Create, create)
            .with(Operation::ReadAll, read_all)
            .with(Operation::ReadOne, read_one)
            .with(Operation::Update, update)
            .with(Operation::Patch, patch)
            .with(Operation::Delete, delete)
            .with(Operation::Options, options)
            .with(Operation::Head, head)
    }

    pub fn with(mut self, operation: Operation, handler: OperationFn) -> Self {
        self.table.insert(operation, handler);
        self
    }

    pub fn without(mut self, operation: Operation) -> Self {
        self.table.remove(&operation);
        self
    }

    pub fn get(&self, operation: Operation) -> Option<OperationFn> {
        self.table.get(&operation).copied()
    }
}

impl Default for HandlerSet {
    fn default() -> Self {
        HandlerSet::crud()
    }
}

fn require_key(input: &OperationInput) -> Result<Key, ApiError> {
    // Item routes always carry a parsed key; reaching this without one is a
    // wiring bug, not a client error.
    input.key.ok_or(ApiError::Internal)
}

fn require_body(input: &OperationInput) -> Result<&Bytes, ApiError> {
    input
        .body
        .as_ref()
        .ok_or_else(|| ApiError::Validation("Invalid request body".into()))
}

async fn fetch(
    scope: &mut dyn StoreScope,
    endpoint: &Endpoint,
    key: Key,
) -> Result<Record, ApiError> {
    scope
        .get(&endpoint.entity, key)
        .await?
        .ok_or(ApiError::NotFound)
}

pub fn create(cx: OperationContext<'_>) -> OperationFuture<'_> {
    Box::pin(async move {
        let entity = &cx.endpoint.entity;
        let record = serialize::decode_body(entity, require_body(&cx.input)?)?;
        let stored = cx.scope.insert(entity, record).await?;
        Ok(Outcome::Created(serialize::to_wire(entity, &stored)))
    })
}

pub fn read_one(cx: OperationContext<'_>) -> OperationFuture<'_> {
    Box::pin(async move {
        let key = require_key(&cx.input)?;
        let record = fetch(cx.scope, cx.endpoint, key).await?;
        Ok(Outcome::One(serialize::to_wire(&cx.endpoint.entity, &record)))
    })
}

pub fn read_all(cx: OperationContext<'_>) -> OperationFuture<'_> {
    Box::pin(async move {
        let entity = &cx.endpoint.entity;
        let records = cx.scope.list(entity).await?;
        Ok(Outcome::Many(serialize::to_wire_list(entity, &records)))
    })
}

/// PUT: full replacement. Declared fields absent from the body are nulled.
pub fn update(cx: OperationContext<'_>) -> OperationFuture<'_> {
    Box::pin(async move {
        let entity = &cx.endpoint.entity;
        let key = require_key(&cx.input)?;
        fetch(cx.scope, cx.endpoint, key).await?;
        let supplied = serialize::decode_body(entity, require_body(&cx.input)?)?;

        let mut record = Record::new();
        record.insert(entity.primary_key_field.clone(), Value::from(key));
        for field in &entity.fields {
            record.insert(
                field.name.clone(),
                supplied.get(&field.name).cloned().unwrap_or(Value::Null),
            );
        }
        let stored = cx.scope.update(entity, record).await?;
        Ok(Outcome::One(serialize::to_wire(entity, &stored)))
    })
}

/// PATCH: overwrite only the supplied declared fields.
pub fn patch(cx: OperationContext<'_>) -> OperationFuture<'_> {
    Box::pin(async move {
        let entity = &cx.endpoint.entity;
        let key = require_key(&cx.input)?;
        let mut record = fetch(cx.scope, cx.endpoint, key).await?;
        let supplied = serialize::decode_body(entity, require_body(&cx.input)?)?;
        for (name, value) in supplied {
            record.insert(name, value);
        }
        let stored = cx.scope.update(entity, record).await?;
        Ok(Outcome::One(serialize::to_wire(entity, &stored)))
    })
}

pub fn delete(cx: OperationContext<'_>) -> OperationFuture<'_> {
    Box::pin(async move {
        let key = require_key(&cx.input)?;
        fetch(cx.scope, cx.endpoint, key).await?;
        cx.scope.delete(&cx.endpoint.entity, key).await?;
        Ok(Outcome::NoContent)
    })
}

pub fn options(cx: OperationContext<'_>) -> OperationFuture<'_> {
    Box::pin(async move {
        Ok(Outcome::Capabilities(CapabilityDescriptor::for_endpoint(
            cx.endpoint,
        )))
    })
}

pub fn head(_cx: OperationContext<'_>) -> OperationFuture<'_> {
    Box::pin(async move { Ok(Outcome::Empty) })
}
