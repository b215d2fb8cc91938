//! Route compiler: entity descriptor + verb set -> concrete route table.
//!
//! Pure function, run once per entity during registration. A verb whose
//! operation has no bound handler fails here, so the request path never sees
//! that error class.

use crate::descriptor::EntityDescriptor;
use crate::error::ConfigError;
use crate::handlers::{HandlerSet, Operation, OperationFn};
use axum::http::Method;
use axum::routing::MethodFilter;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Head,
}

impl Verb {
    pub const ALL: [Verb; 7] = [
        Verb::Get,
        Verb::Post,
        Verb::Put,
        Verb::Patch,
        Verb::Delete,
        Verb::Options,
        Verb::Head,
    ];

    pub fn http_method(self) -> Method {
        match self {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
            Verb::Put => Method::PUT,
            Verb::Patch => Method::PATCH,
            Verb::Delete => Method::DELETE,
            Verb::Options => Method::OPTIONS,
            Verb::Head => Method::HEAD,
        }
    }

    pub fn method_filter(self) -> MethodFilter {
        match self {
            Verb::Get => MethodFilter::GET,
            Verb::Post => MethodFilter::POST,
            Verb::Put => MethodFilter::PUT,
            Verb::Patch => MethodFilter::PATCH,
            Verb::Delete => MethodFilter::DELETE,
            Verb::Options => MethodFilter::OPTIONS,
            Verb::Head => MethodFilter::HEAD,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.http_method().as_str())
    }
}

/// Allowed minus excluded, order-normalized.
pub fn effective_verbs(allowed: &[Verb], excluded: &[Verb]) -> BTreeSet<Verb> {
    let excluded: BTreeSet<Verb> = excluded.iter().copied().collect();
    allowed
        .iter()
        .copied()
        .filter(|v| !excluded.contains(v))
        .collect()
}

/// One registered entity endpoint: descriptor, path segment, effective verb
/// set, and whether the gate wraps its routes.
#[derive(Clone, Debug)]
pub struct Endpoint {
    pub entity: Arc<EntityDescriptor>,
    pub path_segment: String,
    pub verbs: BTreeSet<Verb>,
    pub requires_auth: bool,
}

impl Endpoint {
    pub fn collection_path(&self) -> String {
        format!("/{}/", self.path_segment)
    }

    pub fn item_path(&self) -> String {
        format!("/{}/:id", self.path_segment)
    }
}

/// Compiled (method, path, handler) triple. Immutable once registration
/// completes; owned by the dispatcher's route table.
#[derive(Clone, Debug)]
pub struct Route {
    pub method: Verb,
    pub path: String,
    pub operation: Operation,
    pub handler: OperationFn,
    pub requires_auth: bool,
}

#[derive(Clone, Copy)]
enum PathKind {
    Collection,
    Item,
}

fn operations_for(verb: Verb) -> &'static [(Operation, PathKind)] {
    match verb {
        Verb::Get => &[
            (Operation::ReadAll, PathKind::Collection),
            (Operation::ReadOne, PathKind::Item),
        ],
        Verb::Post => &[(Operation::Create, PathKind::Collection)],
        Verb::Put => &[(Operation::Update, PathKind::Item)],
        Verb::Patch => &[(Operation::Patch, PathKind::Item)],
        Verb::Delete => &[(Operation::Delete, PathKind::Item)],
        Verb::Options => &[(Operation::Options, PathKind::Collection)],
        Verb::Head => &[(Operation::Head, PathKind::Collection)],
    }
}

/// Produce the route table for one endpoint. Every verb in the effective set
/// must have its operations bound in `handlers`.
pub fn compile(endpoint: &Endpoint, handlers: &HandlerSet) -> Result<Vec<Route>, ConfigError> {
    let mut routes = Vec::new();
    for verb in &endpoint.verbs {
        for (operation, kind) in operations_for(*verb) {
            let handler = handlers.get(*operation).ok_or(ConfigError::MissingHandler {
                verb: *verb,
                operation: *operation,
            })?;
            let path = match kind {
                PathKind::Collection => endpoint.collection_path(),
                PathKind::Item => endpoint.item_path(),
            };
            routes.push(Route {
                method: *verb,
                path,
                operation: *operation,
                handler,
                requires_auth: endpoint.requires_auth,
            });
        }
    }
    Ok(routes)
}
