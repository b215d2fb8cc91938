//! Token authentication gate: issuance, verification, revocation.
//!
//! Tokens are opaque `payload.signature` strings: base64url claims signed
//! with HMAC-SHA256. The claims embed the store key of the token's own
//! record, so verification resolves the record with a plain `get` and
//! revocation is deletion. The signing key lives for the process only; a
//! restart makes every outstanding token unverifiable, by design.

use crate::descriptor::{EntityDescriptor, FieldType};
use crate::error::ApiError;
use crate::store::{Key, Record, Store, StoreError};
use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Reserved entity name for persisted token records.
pub const TOKEN_ENTITY_NAME: &str = "tokens";

pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid token signature")]
    BadSignature,
    #[error("unknown or revoked token")]
    Unknown,
    #[error("token expired")]
    Expired,
    #[error("token store failure: {0}")]
    Store(#[from] StoreError),
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Store(StoreError::Backend(detail)) => {
                tracing::error!(%detail, "token store failure");
                ApiError::Internal
            }
            _ => ApiError::Unauthorized,
        }
    }
}

/// Process-lifetime HMAC key. Not persisted anywhere.
pub struct SigningKey([u8; 32]);

impl SigningKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        SigningKey(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        SigningKey(bytes)
    }

    fn mac(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.0).expect("HMAC can take key of any size");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey([REDACTED])")
    }
}

#[derive(Serialize, Deserialize)]
struct TokenClaims {
    id: Key,
    owner_id: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// What `issue` hands back to the caller.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub value: String,
    pub owner_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Identity attached to a request after successful verification.
#[derive(Clone, Debug)]
pub struct Identity {
    pub owner_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenAuthenticator {
    key: SigningKey,
    ttl: Duration,
    store: Arc<dyn Store>,
    tokens: Arc<EntityDescriptor>,
}

impl TokenAuthenticator {
    pub fn new(store: Arc<dyn Store>, key: SigningKey) -> Self {
        TokenAuthenticator {
            key,
            ttl: Duration::seconds(DEFAULT_TOKEN_TTL_SECS),
            store,
            tokens: Arc::new(token_descriptor()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Descriptor of the persisted token records, e.g. for table bootstrap.
    pub fn token_descriptor(&self) -> Arc<EntityDescriptor> {
        Arc::clone(&self.tokens)
    }

    /// Issue a fresh token for `owner_id`. Concurrent issuance for the same
    /// owner yields independent valid tokens.
    pub async fn issue(&self, owner_id: &str) -> Result<IssuedToken, AuthError> {
        let issued_at = Utc::now();
        let expires_at = issued_at + self.ttl;

        let mut scope = self.store.scope().await?;
        let mut record = Record::new();
        record.insert("value".into(), Value::String(String::new()));
        record.insert("owner_id".into(), Value::String(owner_id.to_string()));
        record.insert("issued_at".into(), Value::String(issued_at.to_rfc3339()));
        record.insert("expires_at".into(), Value::String(expires_at.to_rfc3339()));
        let stored = scope.insert(&self.tokens, record).await?;

        let id = stored
            .get(&self.tokens.primary_key_field)
            .and_then(Value::as_i64)
            .ok_or_else(|| StoreError::Backend("store returned no token key".into()))?;
        let value = self.sign(&TokenClaims {
            id,
            owner_id: owner_id.to_string(),
            issued_at,
            expires_at,
        });

        let mut updated = stored;
        updated.insert("value".into(), Value::String(value.clone()));
        scope.update(&self.tokens, updated).await?;

        tracing::debug!(owner = owner_id, token_id = id, "issued token");
        Ok(IssuedToken {
            value,
            owner_id: owner_id.to_string(),
            issued_at,
            expires_at,
        })
    }

    /// Structural checks first (no I/O), then the record lookup that covers
    /// revocation and expiry. Expiry is judged from the persisted record.
    pub async fn verify(&self, value: &str) -> Result<Identity, AuthError> {
        let claims = self.decode(value)?;

        let mut scope = self.store.scope().await?;
        let record = scope
            .get(&self.tokens, claims.id)
            .await?
            .ok_or(AuthError::Unknown)?;
        match record.get("value").and_then(Value::as_str) {
            Some(stored) if stored == value => {}
            _ => return Err(AuthError::Unknown),
        }
        let expires_at = read_timestamp(&record, "expires_at").ok_or(AuthError::Unknown)?;
        if Utc::now() >= expires_at {
            return Err(AuthError::Expired);
        }
        let issued_at = read_timestamp(&record, "issued_at").ok_or(AuthError::Unknown)?;
        let owner_id = record
            .get("owner_id")
            .and_then(Value::as_str)
            .ok_or(AuthError::Unknown)?
            .to_string();

        Ok(Identity {
            owner_id,
            issued_at,
            expires_at,
        })
    }

    /// Delete the token record; later `verify` calls fail. Idempotent.
    pub async fn revoke(&self, value: &str) -> Result<(), AuthError> {
        let claims = self.decode(value)?;
        let mut scope = self.store.scope().await?;
        match scope.delete(&self.tokens, claims.id).await {
            Ok(()) | Err(StoreError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn sign(&self, claims: &TokenClaims) -> String {
        let payload =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).expect("serialize token claims"));
        let signature = URL_SAFE_NO_PAD.encode(self.key.mac(payload.as_bytes()));
        format!("{payload}.{signature}")
    }

    fn decode(&self, value: &str) -> Result<TokenClaims, AuthError> {
        let (payload, signature) = value.split_once('.').ok_or(AuthError::Malformed)?;
        if signature.contains('.') {
            return Err(AuthError::Malformed);
        }
        let expected = URL_SAFE_NO_PAD.encode(self.key.mac(payload.as_bytes()));
        if !constant_time_eq(signature.as_bytes(), expected.as_bytes()) {
            return Err(AuthError::BadSignature);
        }
        let raw = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AuthError::Malformed)?;
        serde_json::from_slice(&raw).map_err(|_| AuthError::Malformed)
    }
}

/// Descriptor of the persisted token records. Useful for bootstrapping the
/// backing table before any authenticator exists.
pub fn token_descriptor() -> EntityDescriptor {
    EntityDescriptor::new(TOKEN_ENTITY_NAME)
        .with_unique_field("value", FieldType::Text)
        .with_field("owner_id", FieldType::Text)
        .with_field("issued_at", FieldType::Timestamp)
        .with_field("expires_at", FieldType::Timestamp)
}

fn read_timestamp(record: &Record, field: &str) -> Option<DateTime<Utc>> {
    record
        .get(field)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

/// Bearer credential from the Authorization header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let value = raw.strip_prefix("Bearer ")?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn gate() -> TokenAuthenticator {
        TokenAuthenticator::new(Arc::new(MemoryStore::new()), SigningKey::from_bytes([7u8; 32]))
    }

    #[tokio::test]
    async fn issue_then_verify_resolves_the_owner() {
        let gate = gate();
        let token = gate.issue("u1").await.unwrap();
        let identity = gate.verify(&token.value).await.unwrap();
        assert_eq!(identity.owner_id, "u1");
        assert_eq!(identity.expires_at, token.expires_at);
    }

    #[tokio::test]
    async fn tampered_signature_fails_structurally() {
        let gate = gate();
        let token = gate.issue("u1").await.unwrap();
        let mut forged = token.value.clone();
        let replacement = if forged.ends_with('A') { 'B' } else { 'A' };
        forged.pop();
        forged.push(replacement);
        assert!(matches!(
            gate.verify(&forged).await,
            Err(AuthError::BadSignature) | Err(AuthError::Malformed)
        ));
    }

    #[tokio::test]
    async fn a_different_key_rejects_the_token() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let first =
            TokenAuthenticator::new(Arc::clone(&store), SigningKey::from_bytes([1u8; 32]));
        let second =
            TokenAuthenticator::new(Arc::clone(&store), SigningKey::from_bytes([2u8; 32]));

        let token = first.issue("u1").await.unwrap();
        // record still exists in the store, but the restart-fresh key fails
        assert!(matches!(
            second.verify(&token.value).await,
            Err(AuthError::BadSignature)
        ));
    }

    #[tokio::test]
    async fn revoke_defeats_a_live_token() {
        let gate = gate();
        let token = gate.issue("u1").await.unwrap();
        gate.revoke(&token.value).await.unwrap();
        assert!(matches!(
            gate.verify(&token.value).await,
            Err(AuthError::Unknown)
        ));
        // a second revoke is a no-op
        gate.revoke(&token.value).await.unwrap();
    }

    #[tokio::test]
    async fn expired_tokens_fail_verification() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let gate = TokenAuthenticator::new(store, SigningKey::generate())
            .with_ttl(Duration::seconds(-1));
        let token = gate.issue("u1").await.unwrap();
        assert!(matches!(
            gate.verify(&token.value).await,
            Err(AuthError::Expired)
        ));
    }

    #[tokio::test]
    async fn concurrent_owners_get_independent_tokens() {
        let gate = gate();
        let a = gate.issue("u1").await.unwrap();
        let b = gate.issue("u1").await.unwrap();
        assert_ne!(a.value, b.value);
        gate.revoke(&a.value).await.unwrap();
        assert!(gate.verify(&b.value).await.is_ok());
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def"));
        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
    }
}
