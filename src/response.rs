//! Wire response shapes shared by handlers and the dispatcher.

use crate::routes::Endpoint;
use serde::Serialize;

pub const ALLOWED_HEADERS: [&str; 2] = ["Content-Type", "Authorization"];
pub const CAPABILITY_MAX_AGE_SECS: u32 = 3600;

/// Static capability description returned by OPTIONS.
#[derive(Clone, Debug, Serialize)]
pub struct CapabilityDescriptor {
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub max_age: u32,
}

impl CapabilityDescriptor {
    /// Built from the endpoint's effective verb set, fixed at registration.
    pub fn for_endpoint(endpoint: &Endpoint) -> Self {
        CapabilityDescriptor {
            allowed_methods: endpoint.verbs.iter().map(|v| v.to_string()).collect(),
            allowed_headers: ALLOWED_HEADERS.iter().map(|h| h.to_string()).collect(),
            max_age: CAPABILITY_MAX_AGE_SECS,
        }
    }
}

pub fn error_body(message: &str) -> serde_json::Value {
    serde_json::json!({ "error": message })
}
