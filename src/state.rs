//! Shared application state handed to compiled routes.

use crate::auth::TokenAuthenticator;
use crate::store::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    /// Present when the service was built with an authentication gate.
    pub authenticator: Option<Arc<TokenAuthenticator>>,
}
