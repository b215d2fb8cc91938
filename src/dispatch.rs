//! Per-request dispatch: compiled routes wired into an axum router.
//!
//! Each request runs the same pipeline: authenticate (when the route demands
//! it), parse the key, open exactly one store scope, run the bound handler,
//! serialize the outcome. Failures short-circuit into the error translator;
//! the scope is released on drop on every exit path.

use crate::auth::bearer_token;
use crate::error::ApiError;
use crate::handlers::{OperationContext, OperationFn, OperationInput, Outcome};
use crate::response::error_body;
use crate::routes::{Endpoint, Route};
use crate::state::AppState;
use crate::store::Key;
use axum::body::Bytes;
use axum::extract::Path;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::MethodRouter;
use axum::{Json, Router};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone)]
struct RouteBinding {
    endpoint: Arc<Endpoint>,
    handler: OperationFn,
    requires_auth: bool,
    state: AppState,
}

/// Build the router for one endpoint's compiled route table.
pub fn mount(endpoint: Arc<Endpoint>, routes: Vec<Route>, state: AppState) -> Router {
    let mut method_routers: BTreeMap<String, MethodRouter> = BTreeMap::new();

    for route in routes {
        let binding = RouteBinding {
            endpoint: Arc::clone(&endpoint),
            handler: route.handler,
            requires_auth: route.requires_auth,
            state: state.clone(),
        };
        let entry = method_routers
            .remove(&route.path)
            .unwrap_or_else(|| MethodRouter::new().fallback(method_not_allowed));
        let entry = if route.path.ends_with("/:id") {
            entry.on(
                route.method.method_filter(),
                move |Path(id): Path<String>, headers: HeaderMap, body: Bytes| async move {
                    run(binding, headers, Some(id), body).await
                },
            )
        } else {
            entry.on(
                route.method.method_filter(),
                move |headers: HeaderMap, body: Bytes| async move {
                    run(binding, headers, None, body).await
                },
            )
        };
        method_routers.insert(route.path, entry);
    }

    let mut router = Router::new();
    for (path, method_router) in method_routers {
        router = router.route(&path, method_router);
    }
    router
}

async fn run(
    binding: RouteBinding,
    headers: HeaderMap,
    raw_key: Option<String>,
    body: Bytes,
) -> Response {
    match drive(&binding, &headers, raw_key, body).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn drive(
    binding: &RouteBinding,
    headers: &HeaderMap,
    raw_key: Option<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    if binding.requires_auth {
        let token = bearer_token(headers).ok_or(ApiError::Unauthorized)?;
        let gate = binding.state.authenticator.as_ref().ok_or_else(|| {
            tracing::error!("authenticated route registered without an authenticator");
            ApiError::Internal
        })?;
        let identity = gate.verify(&token).await?;
        tracing::debug!(
            owner = %identity.owner_id,
            entity = %binding.endpoint.entity.name,
            "request authenticated"
        );
    }

    let key = match raw_key {
        Some(raw) => Some(
            raw.parse::<Key>()
                .map_err(|_| ApiError::Validation("Invalid item key".into()))?,
        ),
        None => None,
    };

    let mut scope = binding.state.store.scope().await?;
    let outcome = (binding.handler)(OperationContext {
        scope: scope.as_mut(),
        endpoint: &binding.endpoint,
        input: OperationInput {
            key,
            body: Some(body),
        },
    })
    .await?;

    Ok(respond(outcome))
}

fn respond(outcome: Outcome) -> Response {
    match outcome {
        Outcome::Created(v) => (StatusCode::CREATED, Json(v)).into_response(),
        Outcome::One(v) => (StatusCode::OK, Json(v)).into_response(),
        Outcome::Many(vs) => (StatusCode::OK, Json(vs)).into_response(),
        Outcome::Capabilities(c) => (StatusCode::OK, Json(c)).into_response(),
        Outcome::NoContent => StatusCode::NO_CONTENT.into_response(),
        Outcome::Empty => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            "",
        )
            .into_response(),
    }
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Router-level fallback for paths outside every compiled route table.
pub async fn unknown_path() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(error_body("Resource not found")),
    )
        .into_response()
}
