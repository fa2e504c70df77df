//! Untrusted inspection of an assertion.
//!
//! Before an assertion can be verified it must be known which key is supposed to verify it. That
//! information sits inside the assertion itself, so the header has to be read while nothing about
//! it is trustworthy yet. This module does only that. It never calls into any verification
//! primitive and its output type can not be mistaken for a verified identity: the only use of an
//! [`UnverifiedAssertionHeader`] is as a lookup hint for the credential store.
//!
//! [`UnverifiedAssertionHeader`]: struct.UnverifiedAssertionHeader.html
use std::borrow::Cow;
use std::fmt;

use log::debug;
use serde_json::Value;

use crate::primitives::credential::CredentialId;
use crate::GRANT_TYPE;

use super::error::Rejection;
use super::jws::Compact;

/// Required content of a JWT bearer grant request.
pub trait Request {
    /// Received request might not be encoded correctly. This method gives implementors the chance
    /// to signal that a request was received but its encoding was generally malformed. If this is
    /// the case, then no other attribute will be queried.
    fn valid(&self) -> bool;

    /// The `grant_type` parameter, if the runtime passes it along.
    ///
    /// When present it must be the JWT bearer grant type.
    fn grant_type(&self) -> Option<Cow<str>>;

    /// The unique `assertion` parameter.
    fn assertion(&self) -> Option<Cow<str>>;
}

/// The claimed signing credential of an assertion, read without verification.
///
/// Every field is attacker controlled. The key id may only be used to find the credential whose
/// key then verifies the unmodified assertion.
#[derive(Clone, PartialEq, Eq)]
pub struct UnverifiedAssertionHeader {
    key_id: CredentialId,
    raw: String,
}

impl UnverifiedAssertionHeader {
    /// The credential the assertion claims to be signed with.
    pub fn key_id(&self) -> &CredentialId {
        &self.key_id
    }

    /// The original compact serialization, exactly as received.
    pub fn assertion(&self) -> &str {
        &self.raw
    }
}

/// Read the claimed key id from the assertion of a request.
pub fn parse(request: &dyn Request) -> Result<UnverifiedAssertionHeader, Rejection> {
    if !request.valid() {
        return Err(Rejection::MissingParameter);
    }

    match request.grant_type() {
        Some(ref grant_type) if grant_type != GRANT_TYPE => {
            return Err(Rejection::UnsupportedGrantType)
        }
        _ => (),
    }

    let assertion = match request.assertion() {
        Some(assertion) if !assertion.trim().is_empty() => assertion,
        _ => {
            debug!("jwt bearer request without assertion");
            return Err(Rejection::MissingParameter);
        }
    };

    peek(&assertion)
}

/// Read the claimed key id from an assertion.
pub fn peek(assertion: &str) -> Result<UnverifiedAssertionHeader, Rejection> {
    let header = Compact::split(assertion)
        .and_then(|compact| compact.header())
        .map_err(|_| Rejection::MalformedAssertion)?;

    let key_id = match header.kid {
        None => return Err(Rejection::MissingKeyId),
        Some(Value::String(ref kid)) if kid.trim().is_empty() => return Err(Rejection::MissingKeyId),
        Some(Value::String(kid)) => kid.parse::<CredentialId>().map_err(|_| Rejection::InvalidKeyId)?,
        Some(_) => return Err(Rejection::InvalidKeyId),
    };

    debug!("jwt bearer assertion claims key id {}", key_id);
    Ok(UnverifiedAssertionHeader {
        key_id,
        raw: assertion.to_string(),
    })
}

impl fmt::Debug for UnverifiedAssertionHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("UnverifiedAssertionHeader")
            .field("key_id", &self.key_id)
            .field("assertion", &"<redacted>")
            .finish()
    }
}
