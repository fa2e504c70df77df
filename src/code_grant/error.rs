//! Rejections of a grant and their rendering as [rfc6749] errors.
//!
//! Internally every failed check keeps its own kind for logging and audit. Toward the client they
//! collapse into the few error codes of the token endpoint, so that an unknown credential can not be
//! told apart from a bad signature.
//!
//! [rfc6749]: https://tools.ietf.org/html/rfc6749#section-5.2

use std::borrow::Cow;
use std::fmt;
use std::vec;

use serde_json::{Map, Value};
use url::Url;

/// Why a grant was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// The request has no, a blank, or more than one `assertion` parameter.
    MissingParameter,

    /// The request names a grant type other than the JWT bearer grant.
    UnsupportedGrantType,

    /// The assertion is not a JWS compact serialization with a json header and claims set.
    MalformedAssertion,

    /// The header has no `kid`.
    MissingKeyId,

    /// The `kid` is not a credential identifier.
    InvalidKeyId,

    /// No credential is registered under the `kid`.
    UnknownCredential,

    /// The credential is disabled or expired.
    CredentialRevoked,

    /// The credential store did not answer in time or failed.
    StoreUnavailable,

    /// The stored key of the credential is unusable.
    InvalidKeyMaterial,

    /// The signature does not verify with the credential's key as `RS256`.
    InvalidSignature,

    /// The `iss` claim is not the device of the credential.
    IssuerMismatch,

    /// The `aud` claim is not exactly the token endpoint.
    AudienceMismatch,

    /// The `exp` claim is missing.
    MissingExpiration,

    /// The `exp` claim has passed.
    AssertionExpired,

    /// The `nbf` claim has not yet been reached.
    AssertionNotYetValid,

    /// The `exp` claim lies further ahead than the configured maximum lifetime.
    AssertionLifetimeExceeded,

    /// None of the subject claims holds a value.
    MissingSubject,

    /// Replay protection is active but the assertion has no `jti`.
    MissingTokenId,

    /// The assertion was already consumed.
    AssertionReplayed,

    /// The flow was driven incorrectly.
    Primitive,
}

impl Rejection {
    /// A stable identifier of the failed check, for diagnostics and audit.
    pub fn code(self) -> &'static str {
        match self {
            Rejection::MissingParameter => "missing_parameter",
            Rejection::UnsupportedGrantType => "unsupported_grant_type",
            Rejection::MalformedAssertion => "malformed_assertion",
            Rejection::MissingKeyId => "missing_key_id",
            Rejection::InvalidKeyId => "invalid_key_id",
            Rejection::UnknownCredential => "unknown_credential",
            Rejection::CredentialRevoked => "credential_revoked",
            Rejection::StoreUnavailable => "store_unavailable",
            Rejection::InvalidKeyMaterial => "invalid_key_material",
            Rejection::InvalidSignature => "invalid_signature",
            Rejection::IssuerMismatch => "issuer_mismatch",
            Rejection::AudienceMismatch => "audience_mismatch",
            Rejection::MissingExpiration => "missing_expiration",
            Rejection::AssertionExpired => "assertion_expired",
            Rejection::AssertionNotYetValid => "assertion_not_yet_valid",
            Rejection::AssertionLifetimeExceeded => "assertion_lifetime_exceeded",
            Rejection::MissingSubject => "missing_subject",
            Rejection::MissingTokenId => "missing_token_id",
            Rejection::AssertionReplayed => "assertion_replayed",
            Rejection::Primitive => "primitive",
        }
    }

    /// Whether resubmitting the same request later may succeed.
    ///
    /// Only an unavailable store is transient, a cryptographic or protocol failure never is.
    pub fn is_transient(self) -> bool {
        matches!(self, Rejection::StoreUnavailable)
    }

    /// The error code reported to the client.
    pub fn error_type(self) -> AccessTokenErrorType {
        match self {
            Rejection::MissingParameter => AccessTokenErrorType::InvalidRequest,
            Rejection::UnsupportedGrantType => AccessTokenErrorType::UnsupportedGrantType,
            _ => AccessTokenErrorType::InvalidGrant,
        }
    }

    /// The error description reported to the client.
    ///
    /// Deliberately does not reveal the failing check.
    pub fn description(self) -> AccessTokenError {
        let mut error = AccessTokenError::new(self.error_type());
        match self {
            Rejection::MissingParameter => error.explain("The 'assertion' parameter is required"),
            Rejection::UnsupportedGrantType => (),
            _ => error.explain("The assertion was not accepted"),
        }
        error
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::error::Error for Rejection {}

/// Error codes of a token endpoint relevant for the grant.
///
/// Details also found in <https://tools.ietf.org/html/rfc6749#section-5.2>.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessTokenErrorType {
    /// The request is missing a required parameter, includes an unsupported parameter value (other
    /// than grant type), repeats a parameter, or is otherwise malformed.
    InvalidRequest,

    /// The provided authorization grant, here the assertion, is invalid, expired, or revoked.
    InvalidGrant,

    /// The authorization grant type is not supported by the authorization server.
    UnsupportedGrantType,
}

impl AccessTokenErrorType {
    fn description(self) -> &'static str {
        match self {
            AccessTokenErrorType::InvalidRequest => "invalid_request",
            AccessTokenErrorType::InvalidGrant => "invalid_grant",
            AccessTokenErrorType::UnsupportedGrantType => "unsupported_grant_type",
        }
    }
}

/// Represents parameters of an error in an [Issuing Error Response][Issuing Error].
///
/// [Issuing Error]: https://tools.ietf.org/html/rfc6749#section-5.2
#[derive(Clone, Debug)]
pub struct AccessTokenError {
    error: AccessTokenErrorType,
    description: Option<Cow<'static, str>>,
    uri: Option<Cow<'static, str>>,
}

impl AccessTokenError {
    pub(crate) fn new(error: AccessTokenErrorType) -> Self {
        AccessTokenError {
            error,
            description: None,
            uri: None,
        }
    }

    /// Get the formal kind of error.
    pub fn kind(&self) -> AccessTokenErrorType {
        self.error
    }

    /// Provide a short text explanation for the error.
    pub fn explain<D: Into<Cow<'static, str>>>(&mut self, description: D) {
        self.description = Some(description.into())
    }

    /// A uri identifying a resource explaining the error in detail.
    pub fn explain_uri(&mut self, uri: Url) {
        self.uri = Some(String::from(uri).into())
    }

    /// Iterate over the key value pairs that describe this error.
    ///
    /// These pairs must be added to the json body of the Bad Request response.
    pub fn iter(&self) -> vec::IntoIter<(&'static str, Cow<'static, str>)> {
        self.into_iter()
    }

    /// Encode the error as the json body of a response.
    ///
    /// Keys are sorted, equal errors always render to the same bytes.
    pub fn to_json(&self) -> String {
        let asmap = self
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.into_owned())))
            .collect::<Map<String, Value>>();
        Value::Object(asmap).to_string()
    }
}

impl Default for AccessTokenError {
    /// Construct an `AccessTokenError` with no extra information.
    ///
    /// Will produce a generic `InvalidGrant` error without any description or error uri.
    fn default() -> Self {
        AccessTokenError::new(AccessTokenErrorType::InvalidGrant)
    }
}

impl AsRef<str> for AccessTokenErrorType {
    fn as_ref(&self) -> &str {
        self.description()
    }
}

impl fmt::Display for AccessTokenErrorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

/// The error as key-value pairs.
impl IntoIterator for &'_ AccessTokenError {
    type Item = (&'static str, Cow<'static, str>);
    type IntoIter = vec::IntoIter<(&'static str, Cow<'static, str>)>;

    fn into_iter(self) -> Self::IntoIter {
        let mut vec = vec![("error", Cow::Borrowed(self.error.description()))];
        if let Some(description) = &self.description {
            vec.push(("error_description", description.clone()));
        }
        if let Some(uri) = &self.uri {
            vec.push(("error_uri", uri.clone()));
        }
        vec.into_iter()
    }
}
