//! Application assembly: registration, router construction, serving.
//!
//! Registration must complete before the transport starts accepting
//! connections; `serve` consumes the builder so the route table is immutable
//! while traffic flows. Configuration failures abort startup.

use crate::auth::TokenAuthenticator;
use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::descriptor::EntityDescriptor;
use crate::dispatch::{mount, unknown_path};
use crate::error::ConfigError;
use crate::handlers::HandlerSet;
use crate::routes::{common_routes_with_ready, compile, effective_verbs, Endpoint, Verb};
use crate::state::AppState;
use crate::store::Store;
use axum::Router;
use std::collections::HashSet;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

const RESERVED_SEGMENTS: [&str; 3] = ["health", "ready", "version"];

/// Per-endpoint registration options. Defaults: every verb, no exclusions,
/// no authentication, path segment from the entity name, generic CRUD
/// handlers.
pub struct EndpointOptions {
    pub verbs: Vec<Verb>,
    pub exclude: Vec<Verb>,
    pub requires_auth: bool,
    pub path_segment: Option<String>,
    pub handlers: HandlerSet,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        EndpointOptions {
            verbs: Verb::ALL.to_vec(),
            exclude: Vec::new(),
            requires_auth: false,
            path_segment: None,
            handlers: HandlerSet::crud(),
        }
    }
}

pub struct Api {
    state: AppState,
    router: Router,
    segments: HashSet<String>,
    max_body_bytes: usize,
}

impl Api {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Api {
            state: AppState {
                store,
                authenticator: None,
            },
            router: Router::new(),
            segments: HashSet::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_authenticator(mut self, gate: TokenAuthenticator) -> Self {
        self.state.authenticator = Some(Arc::new(gate));
        self
    }

    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    pub fn authenticator(&self) -> Option<&Arc<TokenAuthenticator>> {
        self.state.authenticator.as_ref()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Register an entity with default options.
    pub fn register(&mut self, entity: EntityDescriptor) -> Result<(), ConfigError> {
        self.register_with(entity, EndpointOptions::default())
    }

    /// Register an entity endpoint. Compiles its route table now; any
    /// configuration problem surfaces here, before serving.
    pub fn register_with(
        &mut self,
        entity: EntityDescriptor,
        options: EndpointOptions,
    ) -> Result<(), ConfigError> {
        let segment = options
            .path_segment
            .unwrap_or_else(|| entity.name.clone());
        validate_segment(&segment)?;
        if RESERVED_SEGMENTS.contains(&segment.as_str()) {
            return Err(ConfigError::ReservedPathSegment(segment));
        }
        if options.requires_auth && self.state.authenticator.is_none() {
            return Err(ConfigError::MissingAuthenticator(segment));
        }
        if !self.segments.insert(segment.clone()) {
            return Err(ConfigError::DuplicatePathSegment(segment));
        }

        let endpoint = Arc::new(Endpoint {
            entity: Arc::new(entity),
            path_segment: segment,
            verbs: effective_verbs(&options.verbs, &options.exclude),
            requires_auth: options.requires_auth,
        });
        let routes = compile(&endpoint, &options.handlers)?;
        tracing::info!(
            entity = %endpoint.entity.name,
            path = %endpoint.collection_path(),
            routes = routes.len(),
            auth = endpoint.requires_auth,
            "registered entity endpoint"
        );

        let mounted = mount(Arc::clone(&endpoint), routes, self.state.clone());
        self.router = std::mem::take(&mut self.router).merge(mounted);
        Ok(())
    }

    /// The complete router: common routes, every registered endpoint, JSON
    /// 404 fallback, body-size limit.
    pub fn router(&self) -> Router {
        Router::new()
            .merge(common_routes_with_ready(self.state.clone()))
            .merge(self.router.clone())
            .fallback(unknown_path)
            .layer(RequestBodyLimitLayer::new(self.max_body_bytes))
    }

    pub async fn serve(self, addr: &str) -> std::io::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "serving registered entities");
        axum::serve(listener, app).await
    }
}

fn validate_segment(segment: &str) -> Result<(), ConfigError> {
    let valid = !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidPathSegment(segment.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SigningKey;
    use crate::descriptor::FieldType;
    use crate::handlers::Operation;
    use crate::store::MemoryStore;

    fn person() -> EntityDescriptor {
        EntityDescriptor::new("person").with_field("name", FieldType::Text)
    }

    #[test]
    fn duplicate_segments_are_rejected() {
        let mut api = Api::new(Arc::new(MemoryStore::new()));
        api.register(person()).unwrap();
        assert!(matches!(
            api.register(person()),
            Err(ConfigError::DuplicatePathSegment(_))
        ));
    }

    #[test]
    fn auth_requires_a_configured_gate() {
        let mut api = Api::new(Arc::new(MemoryStore::new()));
        let options = EndpointOptions {
            requires_auth: true,
            ..EndpointOptions::default()
        };
        assert!(matches!(
            api.register_with(person(), options),
            Err(ConfigError::MissingAuthenticator(_))
        ));

        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let mut api = Api::new(Arc::clone(&store))
            .with_authenticator(TokenAuthenticator::new(store, SigningKey::generate()));
        let options = EndpointOptions {
            requires_auth: true,
            ..EndpointOptions::default()
        };
        api.register_with(person(), options).unwrap();
    }

    #[test]
    fn missing_handler_aborts_registration() {
        let mut api = Api::new(Arc::new(MemoryStore::new()));
        let options = EndpointOptions {
            handlers: HandlerSet::crud().without(Operation::Delete),
            ..EndpointOptions::default()
        };
        assert!(matches!(
            api.register_with(person(), options),
            Err(ConfigError::MissingHandler { .. })
        ));
    }

    #[test]
    fn segments_are_validated() {
        let mut api = Api::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            api.register(EntityDescriptor::new("Bad Name")),
            Err(ConfigError::InvalidPathSegment(_))
        ));
        assert!(matches!(
            api.register(EntityDescriptor::new("health")),
            Err(ConfigError::ReservedPathSegment(_))
        ));
    }
}
