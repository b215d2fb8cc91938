//! Service configuration from the environment.

use std::env;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_MAX_BODY_BYTES: usize = 1 << 20;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub token_ttl_secs: i64,
    pub max_body_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_url: None,
            token_ttl_secs: crate::auth::DEFAULT_TOKEN_TTL_SECS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServiceConfig {
    /// Read `BIND_ADDR`, `DATABASE_URL`, `TOKEN_TTL_SECS`, `MAX_BODY_BYTES`
    /// from the environment (a `.env` file is honored), falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut cfg = ServiceConfig::default();
        if let Ok(v) = env::var("BIND_ADDR") {
            cfg.bind_addr = v;
        }
        cfg.database_url = env::var("DATABASE_URL").ok();
        if let Some(n) = env::var("TOKEN_TTL_SECS").ok().and_then(|v| v.parse().ok()) {
            cfg.token_ttl_secs = n;
        }
        if let Some(n) = env::var("MAX_BODY_BYTES").ok().and_then(|v| v.parse().ok()) {
            cfg.max_body_bytes = n;
        }
        cfg
    }
}
