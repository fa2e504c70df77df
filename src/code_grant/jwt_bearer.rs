//! Provides the handling for JWT bearer grant requests.
use std::mem;

use chrono::Utc;
use log::{debug, info, warn};

use crate::primitives::credential::{CredentialId, DeviceCredential};
use crate::primitives::key::{KeyError, KeyResolver, VerificationKey};
use crate::primitives::replay::ReplayGuard;
use crate::primitives::store::{CredentialStore, StoreError};
use crate::primitives::Time;
use crate::{AUDIT_TARGET, GRANT_TYPE};

use super::assertion::{self, Request, UnverifiedAssertionHeader};
use super::error::Rejection;
use super::validator::{Validator, VerifiedIdentity};

/// Required functionality to respond to JWT bearer grant requests.
///
/// Each method will only be invoked exactly once when processing a correct request, and
/// potentially less than once when the request is faulty.
pub trait Endpoint {
    /// The store holding the registered credentials.
    fn store(&self) -> &dyn CredentialStore;

    /// Builds verification keys from credentials.
    fn resolver(&mut self) -> &mut dyn KeyResolver;

    /// Verifies assertions for this token endpoint.
    fn validator(&self) -> &Validator;

    /// Records consumed assertions.
    ///
    /// It is possible to use `&mut ()` to accept assertions repeatedly until they expire.
    fn replay(&mut self) -> &mut dyn ReplayGuard;

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

    fn now(&self) -> Time {
        (**self).now()
    }
}

/// JWT bearer grant process.
///
/// This state machine goes through the phases of the two-phase trust model. On creation, the
/// request is parsed without trusting it and the claimed key id extracted. It will then pose
/// requests in the form of [`Output`] which should be satisfied with the next [`Input`] data. This
/// eventually produces a [`VerifiedIdentity`] or a [`Rejection`].
///
/// 1. `Parsed`: the credential named by the key id must be looked up.
/// 2. `CredentialResolved`: the credential is live, its verification key must be built.
/// 3. `KeyResolved`: the assertion must be validated with that key.
/// 4. `Validated`: the assertion must be recorded as consumed.
///
/// The terminal states are success and `Rejected`. There is no way back from either.
///
/// [`Input`]: enum.Input.html
/// [`Output`]: enum.Output.html
/// [`VerifiedIdentity`]: ../validator/struct.VerifiedIdentity.html
/// [`Rejection`]: ../error/enum.Rejection.html
pub struct JwtBearer {
    state: JwtBearerState,
    now: Time,
}

/// Inner state machine for the JWT bearer grant.
enum JwtBearerState {
    Parsed {
        assertion: UnverifiedAssertionHeader,
    },
    CredentialResolved {
        assertion: UnverifiedAssertionHeader,
        credential: DeviceCredential,
    },
    KeyResolved {
        assertion: UnverifiedAssertionHeader,
        credential: DeviceCredential,
        key: VerificationKey,
    },
    Validated {
        identity: VerifiedIdentity,
    },
    Rejected(Rejection),
}

/// Input injected by the executor into the state machine.
pub enum Input {
    /// The store found the credential.
    Found(DeviceCredential),
    /// The key of the credential was built.
    Resolved(VerificationKey),
    /// The assertion passed validation.
    Validated(VerifiedIdentity),
    /// The assertion was recorded as consumed.
    Recorded,
    /// A primitive failed, terminating the flow.
    Rejected(Rejection),
    /// Advance without input as far as possible, or just retrieve the output again.
    None,
}

/// A request by the state machine to the executor.
///
/// Each variant is fulfilled by certain variants of the next inputs as an argument to
/// `JwtBearer::advance`. The output of most states is simply repeated if `Input::None` is
/// provided instead but note that the successful identity is **not** repeated.
pub enum Output<'machine> {
    /// The store should find the credential.
    ///
    /// Fulfilled by `Input::Found`, or `Input::Rejected` with `UnknownCredential` or
    /// `StoreUnavailable`.
    Lookup {
        /// The untrusted key id of the assertion.
        key_id: &'machine CredentialId,
    },
    /// The resolver should build the verification key.
    ///
    /// Fulfilled by `Input::Resolved`, or `Input::Rejected` with `InvalidKeyMaterial`.
    ResolveKey {
        /// The live credential found for the key id.
        credential: &'machine DeviceCredential,
    },
    /// The validator should verify the assertion.
    ///
    /// Fulfilled by `Input::Validated` or `Input::Rejected` with the failed check.
    Validate {
        /// The raw assertion.
        assertion: &'machine str,
        /// Its credential.
        credential: &'machine DeviceCredential,
        /// The credential's key.
        key: &'machine VerificationKey,
        /// The time fixed at the start of the flow.
        now: Time,
    },
    /// The replay guard should record the assertion.
    ///
    /// Fulfilled by `Input::Recorded` or `Input::Rejected`.
    Record {
        /// The identity established by the assertion.
        identity: &'machine VerifiedIdentity,
        /// The time fixed at the start of the flow.
        now: Time,
    },
    /// The state machine finished and the identity was verified.
    ///
    /// This output **can not** be requested repeatedly, any future `Input` will yield a primitive
    /// error instead.
    Ok(VerifiedIdentity),
    /// The state machine finished in a rejection.
    ///
    /// The rejection will be repeated on *any* following input.
    Err(Rejection),
}

impl JwtBearer {
    /// Create the state machine, parsing the request in the process.
    pub fn new(request: &dyn Request, now: Time) -> Self {
        let state = match assertion::parse(request) {
            Ok(assertion) => JwtBearerState::Parsed { assertion },
            Err(rejection) => JwtBearerState::Rejected(rejection),
        };

        JwtBearer { state, now }
    }

    /// The time all checks of this flow are performed against.
    pub fn now(&self) -> Time {
        self.now
    }

    /// The claimed credential, once the request was parsed.
    ///
    /// Untrusted, for logging only.
    pub fn claimed_key_id(&self) -> Option<&CredentialId> {
        match &self.state {
            JwtBearerState::Parsed { assertion }
            | JwtBearerState::CredentialResolved { assertion, .. }
            | JwtBearerState::KeyResolved { assertion, .. } => Some(assertion.key_id()),
            JwtBearerState::Validated { identity } => Some(identity.credential_id()),
            JwtBearerState::Rejected(_) => None,
        }
    }

    /// Go to next state
    pub fn advance(&mut self, input: Input) -> Output<'_> {
        self.state = match (self.take(), input) {
            (current, Input::None) => current,
            (JwtBearerState::Rejected(rejection), _) => JwtBearerState::Rejected(rejection),
            (_, Input::Rejected(rejection)) => JwtBearerState::Rejected(rejection),
            (JwtBearerState::Parsed { assertion }, Input::Found(credential)) => {
                self.found(assertion, credential)
            }
            (JwtBearerState::CredentialResolved { assertion, credential }, Input::Resolved(key)) => {
                Self::resolved(assertion, credential, key)
            }
            (JwtBearerState::KeyResolved { .. }, Input::Validated(identity)) => {
                JwtBearerState::Validated { identity }
            }
            (JwtBearerState::Validated { identity }, Input::Recorded) => {
                return Output::Ok(identity);
            }
            (_, _) => JwtBearerState::Rejected(Rejection::Primitive),
        };

        self.output()
    }

    fn output(&self) -> Output<'_> {
        match &self.state {
            JwtBearerState::Rejected(rejection) => Output::Err(*rejection),
            JwtBearerState::Parsed { assertion } => Output::Lookup {
                key_id: assertion.key_id(),
            },
            JwtBearerState::CredentialResolved { credential, .. } => Output::ResolveKey { credential },
            JwtBearerState::KeyResolved {
                assertion,
                credential,
                key,
            } => Output::Validate {
                assertion: assertion.assertion(),
                credential,
                key,
                now: self.now,
            },
            JwtBearerState::Validated { identity } => Output::Record {
                identity,
                now: self.now,
            },
        }
    }

    fn take(&mut self) -> JwtBearerState {
        mem::replace(&mut self.state, JwtBearerState::Rejected(Rejection::Primitive))
    }

    fn found(&self, assertion: UnverifiedAssertionHeader, credential: DeviceCredential) -> JwtBearerState {
        // A store answering with another credential than asked for is broken.
        if &credential.credential_id != assertion.key_id() {
            return JwtBearerState::Rejected(Rejection::UnknownCredential);
        }

        // Cheapest rejection first, before any key is constructed.
        if !credential.is_live(self.now) {
            return JwtBearerState::Rejected(Rejection::CredentialRevoked);
        }

        JwtBearerState::CredentialResolved { assertion, credential }
    }

    fn resolved(
        assertion: UnverifiedAssertionHeader, credential: DeviceCredential, key: VerificationKey,
    ) -> JwtBearerState {
        if key.key_id() != &credential.credential_id {
            return JwtBearerState::Rejected(Rejection::InvalidKeyMaterial);
        }

        JwtBearerState::KeyResolved {
            assertion,
            credential,
            key,
        }
    }
}

/// Map a failed lookup to the rejection of the grant.
pub fn lookup_rejection(err: StoreError) -> Rejection {
    match err {
        StoreError::NotFound => Rejection::UnknownCredential,
        StoreError::Unavailable => Rejection::StoreUnavailable,
    }
}

/// Map unusable key material to the rejection of the grant.
pub fn key_rejection(err: KeyError) -> Rejection {
    debug!("stored key material unusable: {}", err);
    Rejection::InvalidKeyMaterial
}

/// Check the assertion against the replay guard.
pub fn record(guard: &mut dyn ReplayGuard, identity: &VerifiedIdentity, now: Time) -> Input {
    if !guard.enabled() {
        return Input::Recorded;
    }

    let jti = match identity.token_id() {
        Some(jti) => jti,
        None => return Input::Rejected(Rejection::MissingTokenId),
    };

    match guard.consume(identity.credential_id(), jti, identity.accepted_until(), now) {
        Ok(()) => Input::Recorded,
        Err(_) => Input::Rejected(Rejection::AssertionReplayed),
    }
}

/// Write the audit entry of a grant evaluation starting.
pub(crate) fn audit_entry() {
    info!(target: AUDIT_TARGET, "grant_type={} evaluating jwt bearer grant", GRANT_TYPE);
}

/// Write the audit entry of a finished grant evaluation.
pub(crate) fn audit_outcome(result: &Result<VerifiedIdentity, Rejection>, key_id: Option<&CredentialId>) {
    let key_id = key_id.map_or_else(|| "-".to_string(), CredentialId::to_string);
    match result {
        Ok(identity) => info!(
            target: AUDIT_TARGET,
            "grant_type={} outcome=validated credential={} user={} subject={}",
            identity.grant_type(),
            identity.credential_id(),
            identity.user_id(),
            identity.subject(),
        ),
        Err(rejection) => warn!(
            target: AUDIT_TARGET,
            "grant_type={} outcome=rejected credential={} reason={}",
            GRANT_TYPE,
            key_id,
            rejection.code(),
        ),
    }
}

/// Validate a JWT bearer grant request.
///
/// Drives the state machine with the primitives of the endpoint. Emits an audit entry when starting
/// and when finished.
pub fn jwt_bearer(handler: &mut dyn Endpoint, request: &dyn Request) -> Result<VerifiedIdentity, Rejection> {
    audit_entry();

    let mut jwt_bearer = JwtBearer::new(request, handler.now());
    let key_id = jwt_bearer.claimed_key_id().copied();
    let mut input = Input::None;

    let result = loop {
        let next = match jwt_bearer.advance(input) {
            Output::Lookup { key_id } => match handler.store().find(key_id) {
                Ok(credential) => Input::Found(credential),
                Err(err) => Input::Rejected(lookup_rejection(err)),
            },
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
