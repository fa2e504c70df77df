//! Registered device credentials.
//!
//! A credential binds the public half of a device key to the device and to the account owning the
//! device. Credentials are created by an enrollment process outside of this crate and are only
//! ever read while validating an assertion.
use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use super::Time;

/// Identifies a registered credential.
///
/// Assertions name the credential that signed them in their `kid` header, so this is also the
/// key identifier of the resolved verification key. Unique and never reassigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialId(Uuid);

/// Identifies a device owning a credential.
///
/// Assertions signed by a device carry this identifier as their `iss` claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(Uuid);

/// An identifier failed to parse from its textual representation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseIdError;

/// One device's registered signing identity.
///
/// The public key is stored as its two RSA components, each a base64 encoded big-endian byte
/// string. No private key material is ever part of a credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCredential {
    /// The unique id, also the `kid` of assertions signed with this credential.
    pub credential_id: CredentialId,

    /// The device owning the key, the expected issuer of its assertions.
    pub device_id: DeviceId,

    /// The account the device belongs to.
    pub user_id: Uuid,

    /// Base64 encoding of the public exponent.
    pub public_key_exponent: String,

    /// Base64 encoding of the public modulus.
    pub public_key_modulus: String,

    /// Disabled credentials never validate.
    #[serde(default = "enabled_default")]
    pub enabled: bool,

    /// Credentials never validate after this point in time.
    #[serde(default, with = "optional_time_serde")]
    pub expires: Option<Time>,
}

fn enabled_default() -> bool {
    true
}

impl CredentialId {
    /// Wrap a raw uuid.
    pub fn new(id: Uuid) -> Self {
        CredentialId(id)
    }

    /// The underlying uuid.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl DeviceId {
    /// Wrap a raw uuid.
    pub fn new(id: Uuid) -> Self {
        DeviceId(id)
    }

    /// The underlying uuid.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl DeviceCredential {
    /// An enabled credential without expiration.
    pub fn new(
        credential_id: CredentialId, device_id: DeviceId, user_id: Uuid, public_key_exponent: &str,
        public_key_modulus: &str,
    ) -> Self {
        DeviceCredential {
            credential_id,
            device_id,
            user_id,
            public_key_exponent: public_key_exponent.to_string(),
            public_key_modulus: public_key_modulus.to_string(),
            enabled: true,
            expires: None,
        }
    }

    /// Mark the credential as disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Let the credential expire at the given time.
    pub fn expiring(mut self, at: Time) -> Self {
        self.expires = Some(at);
        self
    }

    /// Whether the credential may be used at time `now`.
    ///
    /// Disabled credentials and those whose expiration lies in the past are not live.
    pub fn is_live(&self, now: Time) -> bool {
        self.enabled && self.expires.map_or(true, |expires| expires > now)
    }
}

impl FromStr for CredentialId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, ParseIdError> {
        Uuid::parse_str(s).map(CredentialId).map_err(|_| ParseIdError)
    }
}

impl FromStr for DeviceId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, ParseIdError> {
        Uuid::parse_str(s).map(DeviceId).map_err(|_| ParseIdError)
    }
}

impl From<Uuid> for CredentialId {
    fn from(id: Uuid) -> Self {
        CredentialId(id)
    }
}

impl From<Uuid> for DeviceId {
    fn from(id: Uuid) -> Self {
        DeviceId(id)
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("identifier is not a valid uuid")
    }
}

impl std::error::Error for ParseIdError {}

mod optional_time_serde {
    use super::Time;
    use chrono::{TimeZone, Utc};

    use serde::ser::Serializer;
    use serde::de::{Deserialize, Deserializer, Error};

    pub fn serialize<S: Serializer>(time: &Option<Time>, serializer: S) -> Result<S::Ok, S::Error> {
        match time {
            Some(time) => serializer.serialize_some(&time.timestamp()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Time>, D::Error> {
        let as_timestamp: Option<i64> = Option::<i64>::deserialize(deserializer)?;
        as_timestamp
            .map(|timestamp| {
                Utc.timestamp_opt(timestamp, 0)
                    .single()
                    .ok_or_else(|| Error::custom("timestamp out of range"))
            })
            .transpose()
    }
}
