//! The surface consumed by a token endpoint.
//!
//! A token endpoint runtime owns the http framing and parameter decoding. Once it has determined
//! that a request uses the JWT bearer grant it hands the body parameters to a [`JwtBearerFlow`] and
//! gets back a [`GrantOutcome`]. A successful outcome carries the identity to issue a token for,
//! a failed one an error to render as the body of a `400 Bad Request`.
//!
//! The primitives needed for the flow can be bundled ad-hoc into a [`Generic`] endpoint, or
//! provided by any custom implementation of the [`Endpoint`] trait.
//!
//! [`JwtBearerFlow`]: struct.JwtBearerFlow.html
//! [`GrantOutcome`]: enum.GrantOutcome.html
//! [`Generic`]: struct.Generic.html
//! [`Endpoint`]: ../code_grant/jwt_bearer/trait.Endpoint.html
use std::borrow::Cow;
use std::time::Duration;

use crate::code_grant::assertion::Request;
use crate::code_grant::error::{AccessTokenError, Rejection};
use crate::code_grant::jwt_bearer::jwt_bearer;
use crate::code_grant::validator::{Validator, VerifiedIdentity};
use crate::config::Config;
use crate::primitives::key::{KeyResolver, RsaKeyResolver};
use crate::primitives::replay::{ReplayGuard, SeenAssertions};
use crate::primitives::store::CredentialStore;

mod query;

#[cfg(test)]
pub(crate) mod tests;

pub use crate::code_grant::jwt_bearer::Endpoint;

pub use self::query::{FormValue, QueryParameter};

/// A rather basic [`Endpoint`] implementation.
///
/// All attributes are public, so there is no inner invariant. Included types are assumed to be
/// implemented independently, with no major connections.
///
/// ## Example
///
/// An endpoint holding credentials in memory and accepting each assertion only once.
///
/// ```
/// # use std::time::Duration;
/// # use jwt_bearer_grant::config::Config;
/// # use jwt_bearer_grant::code_grant::validator::Validator;
/// use jwt_bearer_grant::endpoint::Generic;
/// use jwt_bearer_grant::primitives::{
///     key::RsaKeyResolver,
///     replay::SeenAssertions,
///     store::CredentialMap,
/// };
///
/// # let config = Config::new("https://auth.example.com/connect/token").unwrap();
/// let endpoint = Generic {
///     store: CredentialMap::new(),
///     resolver: RsaKeyResolver,
///     replay: SeenAssertions::new(),
///     validator: Validator::new(&config),
///     lookup_timeout: Duration::from_secs(1),
/// };
/// ```
///
/// [`Endpoint`]: ../code_grant/jwt_bearer/trait.Endpoint.html
pub struct Generic<S, K = RsaKeyResolver, G = Option<SeenAssertions>> {
    /// The credential store.
    pub store: S,

    /// The key resolver, usually `RsaKeyResolver`.
    pub resolver: K,

    /// The replay guard, or `()` if assertions may be presented repeatedly.
    pub replay: G,

    /// The validator bound to the token endpoint.
    pub validator: Validator,

    /// Deadline of a credential lookup, enforced by the asynchronous driver.
    pub lookup_timeout: Duration,
}

impl<S> Generic<S> {
    /// Create an endpoint following the configuration.
    ///
    /// Assertions are only tracked if the configuration enables replay protection.
    pub fn new(store: S, config: &Config) -> Self {
        let replay = if config.replay_protection {
            Some(SeenAssertions::new())
        } else {
            None
        };

        Generic {
            store,
            resolver: RsaKeyResolver,
            replay,
            validator: Validator::new(config),
            lookup_timeout: config.lookup_timeout_duration(),
        }
    }
}

impl<S, K, G> Generic<S, K, G> {
    /// Change the replay guard.
    pub fn with_replay<N: ReplayGuard>(self, replay: N) -> Generic<S, K, N> {
        Generic {
            store: self.store,
            resolver: self.resolver,
            replay,
            validator: self.validator,
            lookup_timeout: self.lookup_timeout,
        }
    }

    /// Change the key resolver.
    pub fn with_resolver<N: KeyResolver>(self, resolver: N) -> Generic<S, N, G> {
        Generic {
            store: self.store,
            resolver,
            replay: self.replay,
            validator: self.validator,
            lookup_timeout: self.lookup_timeout,
        }
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
}

/// Validates JWT bearer grant requests.
///
/// The flow does not produce a response itself. The runtime should issue a token for the identity
/// of a successful outcome and render the error of a failed one.
pub struct JwtBearerFlow<E: Endpoint> {
    endpoint: E,
}

/// The result of evaluating a grant request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrantOutcome {
    /// The assertion was verified.
    Granted(VerifiedIdentity),

    /// The request was rejected.
    Rejected(Rejection),
}

pub(crate) struct WrappedRequest<'a> {
    pub(crate) body: &'a dyn QueryParameter,
}

impl<E: Endpoint> JwtBearerFlow<E> {
    /// Wrap an endpoint providing the primitives.
    pub fn new(endpoint: E) -> Self {
        JwtBearerFlow { endpoint }
    }

    /// Evaluate the body parameters of a token request.
    ///
    /// Only `assertion` and, if present, `grant_type` are read. Duplicated parameters count as
    /// absent.
    pub fn execute(&mut self, parameters: &dyn QueryParameter) -> GrantOutcome {
        let request = WrappedRequest { body: parameters };
        jwt_bearer(&mut self.endpoint, &request).into()
    }

    /// Get back the endpoint.
    pub fn into_inner(self) -> E {
        self.endpoint
    }
}

impl<'a> Request for WrappedRequest<'a> {
    fn valid(&self) -> bool {
        true
    }

    fn grant_type(&self) -> Option<Cow<str>> {
        self.body.unique_value("grant_type")
    }

    fn assertion(&self) -> Option<Cow<str>> {
        self.body.unique_value("assertion")
    }
}

impl GrantOutcome {
    /// Whether a token should be issued.
    pub fn is_success(&self) -> bool {
        matches!(self, GrantOutcome::Granted(_))
    }

    /// The verified identity of a successful grant.
    pub fn identity(&self) -> Option<&VerifiedIdentity> {
        match self {
            GrantOutcome::Granted(identity) => Some(identity),
            GrantOutcome::Rejected(_) => None,
        }
    }

    /// The rejection of a failed grant.
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            GrantOutcome::Granted(_) => None,
            GrantOutcome::Rejected(rejection) => Some(*rejection),
        }
    }

    /// The internal diagnostic code of a failed grant, for logs only.
    pub fn diagnostic(&self) -> Option<&'static str> {
        self.rejection().map(Rejection::code)
    }

    /// The error to render to the client for a failed grant.
    pub fn error(&self) -> Option<AccessTokenError> {
        self.rejection().map(Rejection::description)
    }

    /// Convert into a plain result.
    pub fn into_result(self) -> Result<VerifiedIdentity, Rejection> {
        self.into()
    }
}

impl From<Result<VerifiedIdentity, Rejection>> for GrantOutcome {
    fn from(result: Result<VerifiedIdentity, Rejection>) -> Self {
        match result {
            Ok(identity) => GrantOutcome::Granted(identity),
            Err(rejection) => GrantOutcome::Rejected(rejection),
        }
    }
}

impl From<GrantOutcome> for Result<VerifiedIdentity, Rejection> {
    fn from(outcome: GrantOutcome) -> Self {
        match outcome {
            GrantOutcome::Granted(identity) => Ok(identity),
            GrantOutcome::Rejected(rejection) => Err(rejection),
        }
    }
}
