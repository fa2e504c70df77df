//! Asynchronous driver of the JWT bearer grant.
use std::time::Duration;

use chrono::Utc;
use log::warn;

use crate::code_grant::assertion::Request;
use crate::code_grant::error::Rejection;
use crate::code_grant::jwt_bearer::{
    audit_entry, audit_outcome, key_rejection, lookup_rejection, record, Input, JwtBearer, Output,
};
use crate::code_grant::validator::{Validator, VerifiedIdentity};
use crate::endpoint::Generic;
use crate::primitives::key::KeyResolver;
use crate::primitives::replay::ReplayGuard;
use crate::primitives::Time;

use super::primitives::CredentialStore;

/// Required functionality to respond to JWT bearer grant requests asynchronously.
pub trait Endpoint {
    /// The store holding the registered credentials.
    fn store(&self) -> &dyn CredentialStore;

    /// Builds verification keys from credentials.
    fn resolver(&mut self) -> &mut dyn KeyResolver;

    /// Verifies assertions for this token endpoint.
    fn validator(&self) -> &Validator;

    /// Records consumed assertions.
    fn replay(&mut self) -> &mut dyn ReplayGuard;

    /// How long a credential lookup may take before the grant is rejected as unavailable.
    fn lookup_timeout(&self) -> Duration;

    /// The current time against which assertions and credentials are checked.
    fn now(&self) -> Time {
        Utc::now()
    }
}

impl<'a, E: Endpoint + ?Sized> Endpoint for &'a mut E {
    fn store(&self) -> &dyn CredentialStore {
        (**self).store()
    }

    fn resolver(&mut self) -> &mut dyn KeyResolver {
        (**self).resolver()
    }

    fn validator(&self) -> &Validator {
        (**self).validator()
    }

    fn replay(&mut self) -> &mut dyn ReplayGuard {
        (**self).replay()
    }

    fn lookup_timeout(&self) -> Duration {
        (**self).lookup_timeout()
    }

    fn now(&self) -> Time {
        (**self).now()
    }
}

impl<S, K, G> Endpoint for Generic<S, K, G>
where
    S: CredentialStore,
    K: KeyResolver,
    G: ReplayGuard,
{
    fn store(&self) -> &dyn CredentialStore {
        &self.store
    }

    fn resolver(&mut self) -> &mut dyn KeyResolver {
        &mut self.resolver
    }

    fn validator(&self) -> &Validator {
        &self.validator
    }

    fn replay(&mut self) -> &mut dyn ReplayGuard {
        &mut self.replay
    }

    fn lookup_timeout(&self) -> Duration {
        self.lookup_timeout
    }
}

/// Validate a JWT bearer grant request.
///
/// Same as the synchronous version except that the credential lookup is awaited. A lookup not
/// finished within the endpoint's deadline is abandoned and the grant rejected with
/// `StoreUnavailable`.
pub async fn jwt_bearer(
    handler: &mut dyn Endpoint, request: &dyn Request,
) -> Result<VerifiedIdentity, Rejection> {
    audit_entry();

    let mut jwt_bearer = JwtBearer::new(request, handler.now());
    let key_id = jwt_bearer.claimed_key_id().copied();
    let deadline = handler.lookup_timeout();
    let mut input = Input::None;

    let result = loop {
        let next = match jwt_bearer.advance(input) {
            Output::Lookup { key_id } => {
                match tokio::time::timeout(deadline, handler.store().find(key_id)).await {
                    Ok(Ok(credential)) => Input::Found(credential),
                    Ok(Err(err)) => Input::Rejected(lookup_rejection(err)),
                    Err(_) => {
                        warn!("credential lookup for {} exceeded {:?}", key_id, deadline);
                        Input::Rejected(Rejection::StoreUnavailable)
                    }
                }
            }
            Output::ResolveKey { credential } => match handler.resolver().resolve(credential) {
                Ok(key) => Input::Resolved(key),
                Err(err) => Input::Rejected(key_rejection(err)),
            },
            Output::Validate {
                assertion,
                credential,
                key,
                now,
            } => match handler.validator().validate(assertion, credential, key, now) {
                Ok(identity) => Input::Validated(identity),
                Err(rejection) => Input::Rejected(rejection),
            },
            Output::Record { identity, now } => record(handler.replay(), identity, now),
            Output::Ok(identity) => break Ok(identity),
            Output::Err(rejection) => break Err(rejection),
        };

        input = next;
    };

    audit_outcome(&result, key_id.as_ref());
    result
}
