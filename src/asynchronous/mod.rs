//! Asynchronous evaluation of grants.
//!
//! Credential stores backed by a database or a remote service answer asynchronously. The driver in
//! this module awaits their lookups under a deadline so that a stalled store turns into a
//! `StoreUnavailable` rejection instead of a hanging token request. Everything after the lookup is
//! computation only and happens exactly as in the synchronous flow.
use crate::endpoint::{GrantOutcome, QueryParameter, WrappedRequest};

pub mod jwt_bearer;
pub mod primitives;


pub use self::jwt_bearer::Endpoint;

/// Validates JWT bearer grant requests with an asynchronous credential store.
pub struct JwtBearerFlow<E: Endpoint> {
    endpoint: E,
}

impl<E: Endpoint> JwtBearerFlow<E> {
    /// Wrap an endpoint providing the primitives.
    pub fn new(endpoint: E) -> Self {
        JwtBearerFlow { endpoint }
    }

    /// Evaluate the body parameters of a token request.
    pub async fn execute(&mut self, parameters: &dyn QueryParameter) -> GrantOutcome {
        let request = WrappedRequest { body: parameters };
        jwt_bearer::jwt_bearer(&mut self.endpoint, &request).await.into()
    }

    /// Get back the endpoint.
    pub fn into_inner(self) -> E {
        self.endpoint
    }
}
