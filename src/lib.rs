//! restmodel: model-driven REST backend library.
//!
//! Describe an entity once, register it, and get the full CRUD surface
//! (create, read, list, update, patch, delete, options, head) compiled into
//! a router, optionally behind a token authentication gate.

pub mod app;
pub mod auth;
pub mod config;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod serialize;
pub mod state;
pub mod store;

pub use app::{Api, EndpointOptions};
pub use auth::{AuthError, Identity, IssuedToken, SigningKey, TokenAuthenticator};
pub use config::ServiceConfig;
pub use descriptor::{EntityDescriptor, FieldDescriptor, FieldType};
pub use error::{ApiError, ConfigError};
pub use handlers::{HandlerSet, Operation, Outcome};
pub use response::CapabilityDescriptor;
pub use routes::{compile, Endpoint, Route, Verb};
pub use state::AppState;
pub use store::{Key, MemoryStore, PostgresStore, Record, Store, StoreError, StoreScope};
