//! Route compilation and the service's common routes.

mod common;
mod compile;

pub use common::{common_routes, common_routes_with_ready};
pub use compile::{compile, effective_verbs, Endpoint, Route, Verb};
