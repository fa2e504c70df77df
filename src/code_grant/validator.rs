//! Verification of an assertion against a resolved credential.
//!
//! The checks run in a fixed order, cheapest rejection first:
//!
//! 1. The credential must be enabled and not expired. No cryptography happens otherwise.
//! 2. The signature must verify as `RS256` with the credential's key.
//! 3. `iss` must be the device owning the credential.
//! 4. `aud` must hold exactly one value, the configured token endpoint, compared without regard to
//!    case. Assertions addressed to several audiences are refused so that they can not be replayed
//!    against another relying party.
//! 5. `exp` must be present, in the future and not further ahead than the maximum assertion
//!    lifetime. `nbf` must be in the past if present.
//! 6. A subject is taken from the first configured subject claim holding a value.
//!
//! Each failure is terminal and mapped to its `Rejection`, nothing is retried.
use chrono::{Duration, TimeZone, Utc};
use log::debug;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::Config;
use crate::primitives::credential::{CredentialId, DeviceCredential, DeviceId};
use crate::primitives::key::VerificationKey;
use crate::primitives::Time;
use crate::GRANT_TYPE;

use super::error::Rejection;
use super::jws::Compact;

/// The only signature algorithm accepted.
pub const ALGORITHM: &str = "RS256";

/// Checks assertions for one token endpoint.
#[derive(Clone, Debug)]
pub struct Validator {
    audience: String,
    leeway: Duration,
    max_lifetime: Duration,
    subject_claims: Vec<String>,
}

/// The identity proven by a valid assertion.
///
/// Can only be produced by a successful `Validator::validate`. It is meant to be handed to token
/// issuance right away and not kept around.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedIdentity {
    subject: String,
    grant_type: &'static str,
    credential_id: CredentialId,
    user_id: Uuid,
    token_id: Option<String>,
    expires: Time,
    accepted_until: Time,
}

impl Validator {
    /// A validator following the configuration.
    pub fn new(config: &Config) -> Self {
        Validator {
            audience: config.token_endpoint.clone(),
            leeway: config.leeway_duration(),
            max_lifetime: config.max_assertion_lifetime_duration(),
            subject_claims: config.subject_claims.clone(),
        }
    }

    /// The audience every assertion must be addressed to.
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Fully verify an assertion signed with the credential.
    pub fn validate(
        &self, assertion: &str, credential: &DeviceCredential, key: &VerificationKey, now: Time,
    ) -> Result<VerifiedIdentity, Rejection> {
        if !credential.is_live(now) {
            return Err(Rejection::CredentialRevoked);
        }

        if key.key_id() != &credential.credential_id {
            return Err(Rejection::InvalidKeyMaterial);
        }

        let compact = Compact::split(assertion).map_err(|_| Rejection::MalformedAssertion)?;
        self.verify_signature(&compact, key)?;
        let claims = compact.claims().map_err(|_| Rejection::MalformedAssertion)?;

        self.check_issuer(&claims, &credential.device_id)?;
        self.check_audience(&claims)?;
        let expires = self.check_lifetime(&claims, now)?;
        let subject = self.subject(&claims)?;

        let token_id = match claims.get("jti") {
            Some(Value::String(jti)) if !jti.is_empty() => Some(jti.clone()),
            _ => None,
        };

        Ok(VerifiedIdentity {
            subject,
            grant_type: GRANT_TYPE,
            credential_id: credential.credential_id,
            user_id: credential.user_id,
            token_id,
            expires,
            accepted_until: expires.checked_add_signed(self.leeway).unwrap_or(expires),
        })
    }

    fn verify_signature(&self, compact: &Compact, key: &VerificationKey) -> Result<(), Rejection> {
        let header = compact.header().map_err(|_| Rejection::MalformedAssertion)?;

        match header.alg {
            Some(Value::String(ref alg)) if alg == ALGORITHM => (),
            _ => {
                debug!("assertion for key {} not signed with {}", key.key_id(), ALGORITHM);
                return Err(Rejection::InvalidSignature);
            }
        }

        // The header is signed as well, a `kid` naming another credential is a forgery attempt.
        let kid_matches = match header.kid {
            Some(Value::String(ref kid)) => kid.parse::<CredentialId>().ok().as_ref() == Some(key.key_id()),
            _ => false,
        };
        if !kid_matches {
            return Err(Rejection::InvalidSignature);
        }

        let signature = compact.signature().map_err(|_| Rejection::InvalidSignature)?;
        key.verify(compact.signing_input(), &signature)
            .map_err(|_| Rejection::InvalidSignature)
    }

    fn check_issuer(&self, claims: &Map<String, Value>, device: &DeviceId) -> Result<(), Rejection> {
        let issuer = match claims.get("iss") {
            Some(Value::String(iss)) => iss.parse::<DeviceId>().map_err(|_| Rejection::IssuerMismatch)?,
            _ => return Err(Rejection::IssuerMismatch),
        };

        if &issuer != device {
            return Err(Rejection::IssuerMismatch);
        }

        Ok(())
    }

    fn check_audience(&self, claims: &Map<String, Value>) -> Result<(), Rejection> {
        let audience = match claims.get("aud") {
            Some(Value::String(aud)) => aud.as_str(),
            Some(Value::Array(values)) => match values.as_slice() {
                [Value::String(aud)] => aud.as_str(),
                _ => return Err(Rejection::AudienceMismatch),
            },
            _ => return Err(Rejection::AudienceMismatch),
        };

        if audience.to_lowercase() != self.audience.to_lowercase() {
            return Err(Rejection::AudienceMismatch);
        }

        Ok(())
    }

    fn check_lifetime(&self, claims: &Map<String, Value>, now: Time) -> Result<Time, Rejection> {
        let expires = match claims.get("exp") {
            None | Some(Value::Null) => return Err(Rejection::MissingExpiration),
            Some(exp) => numeric_date(exp).ok_or(Rejection::MissingExpiration)?,
        };

        let expired = expires
            .checked_add_signed(self.leeway)
            .map_or(false, |limit| now >= limit);
        if expired {
            return Err(Rejection::AssertionExpired);
        }

        let too_long = now
            .checked_add_signed(self.max_lifetime + self.leeway)
            .map_or(true, |limit| expires > limit);
        if too_long {
            debug!("assertion expires at {}, beyond the maximum lifetime", expires);
            return Err(Rejection::AssertionLifetimeExceeded);
        }

        match claims.get("nbf") {
            None | Some(Value::Null) => (),
            Some(nbf) => {
                let not_before = numeric_date(nbf).ok_or(Rejection::MalformedAssertion)?;
                let tolerated = now.checked_add_signed(self.leeway).unwrap_or(now);
                if tolerated < not_before {
                    return Err(Rejection::AssertionNotYetValid);
                }
            }
        }

        Ok(expires)
    }

    fn subject(&self, claims: &Map<String, Value>) -> Result<String, Rejection> {
        self.subject_claims
            .iter()
            .find_map(|claim| match claims.get(claim) {
                Some(Value::String(value)) if !value.trim().is_empty() => Some(value.clone()),
                _ => None,
            })
            .ok_or(Rejection::MissingSubject)
    }
}

/// Seconds since the epoch, fractions truncated.
fn numeric_date(value: &Value) -> Option<Time> {
    let seconds = match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))?,
        _ => return None,
    };
    Utc.timestamp_opt(seconds, 0).single()
}

impl VerifiedIdentity {
    /// The verified subject, never empty.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The grant type this identity was established with.
    pub fn grant_type(&self) -> &'static str {
        self.grant_type
    }

    /// The credential whose key signed the assertion.
    pub fn credential_id(&self) -> &CredentialId {
        &self.credential_id
    }

    /// The account owning the signing device.
    pub fn user_id(&self) -> &Uuid {
        &self.user_id
    }

    /// The `jti` of the assertion, if it had one.
    pub fn token_id(&self) -> Option<&str> {
        self.token_id.as_deref()
    }

    /// When the assertion expires.
    pub fn expires(&self) -> Time {
        self.expires
    }

    /// The instant from which the assertion is refused, its expiration plus the leeway.
    ///
    /// A record of its consumption has to be kept at least until then.
    pub fn accepted_until(&self) -> Time {
        self.accepted_until
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> Validator {
        let mut config = Config::new("http://localhost:5000/connect/token").unwrap();
        config.subject_claims(vec!["sub", "client_id"]);
        Validator::new(&config)
    }

    fn claims(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn audience_single_value() {
        let validator = validator();
        let ok = claims(json!({ "aud": "HTTP://LOCALHOST:5000/connect/token" }));
        assert!(validator.check_audience(&ok).is_ok());
        let ok = claims(json!({ "aud": ["http://localhost:5000/connect/token"] }));
        assert!(validator.check_audience(&ok).is_ok());
    }

    #[test]
    fn audience_rejections() {
        let validator = validator();
        for aud in vec![
            json!({}),
            json!({ "aud": [] }),
            json!({ "aud": null }),
            json!({ "aud": 5 }),
            json!({ "aud": ["http://localhost:5000/connect/token", "http://other/token"] }),
            json!({ "aud": ["http://localhost:5000/connect/token", "http://localhost:5000/connect/token"] }),
            json!({ "aud": "http://wrong-host/token" }),
        ] {
            assert_eq!(validator.check_audience(&claims(aud)), Err(Rejection::AudienceMismatch));
        }
    }

    #[test]
    fn issuer_must_be_device() {
        let validator = validator();
        let device: DeviceId = "d1eaa073-0feb-48ad-bad2-0592963b4203".parse().unwrap();
        let ok = claims(json!({ "iss": "D1EAA073-0FEB-48AD-BAD2-0592963B4203" }));
        assert!(validator.check_issuer(&ok, &device).is_ok());

        for iss in vec![
            json!({}),
            json!({ "iss": "not-a-uuid" }),
            json!({ "iss": "11111111-1111-1111-1111-111111111111" }),
            json!({ "iss": 7 }),
        ] {
            assert_eq!(validator.check_issuer(&claims(iss), &device), Err(Rejection::IssuerMismatch));
        }
    }

    #[test]
    fn lifetime() {
        let validator = validator();
        let now = Utc.timestamp_opt(1_600_000_000, 0).unwrap();

        let ok = claims(json!({ "exp": 1_600_000_060 }));
        assert_eq!(
            validator.check_lifetime(&ok, now),
            Ok(Utc.timestamp_opt(1_600_000_060, 0).unwrap())
        );
        let fractional = claims(json!({ "exp": 1_600_000_060.5 }));
        assert!(validator.check_lifetime(&fractional, now).is_ok());

        let missing = claims(json!({}));
        assert_eq!(validator.check_lifetime(&missing, now), Err(Rejection::MissingExpiration));
        let text = claims(json!({ "exp": "tomorrow" }));
        assert_eq!(validator.check_lifetime(&text, now), Err(Rejection::MissingExpiration));

        let expired = claims(json!({ "exp": 1_599_999_999 }));
        assert_eq!(validator.check_lifetime(&expired, now), Err(Rejection::AssertionExpired));
        let exactly_now = claims(json!({ "exp": 1_600_000_000 }));
        assert_eq!(validator.check_lifetime(&exactly_now, now), Err(Rejection::AssertionExpired));

        let early = claims(json!({ "exp": 1_600_000_060, "nbf": 1_600_000_010 }));
        assert_eq!(validator.check_lifetime(&early, now), Err(Rejection::AssertionNotYetValid));
        let not_a_date = claims(json!({ "exp": 1_600_000_060, "nbf": "soon" }));
        assert_eq!(validator.check_lifetime(&not_a_date, now), Err(Rejection::MalformedAssertion));
    }

    #[test]
    fn lifetime_is_bounded() {
        let mut config = Config::new("http://localhost:5000/connect/token").unwrap();
        config.max_assertion_lifetime(600).leeway(30);
        let validator = Validator::new(&config);
        let now = Utc.timestamp_opt(1_600_000_000, 0).unwrap();

        let at_limit = claims(json!({ "exp": 1_600_000_630 }));
        assert!(validator.check_lifetime(&at_limit, now).is_ok());
        let beyond = claims(json!({ "exp": 1_600_000_631 }));
        assert_eq!(validator.check_lifetime(&beyond, now), Err(Rejection::AssertionLifetimeExceeded));
        let far_future = claims(json!({ "exp": 4_102_444_800i64 }));
        assert_eq!(
            validator.check_lifetime(&far_future, now),
            Err(Rejection::AssertionLifetimeExceeded)
        );
    }

    #[test]
    fn leeway_applies_to_both_bounds() {
        let mut config = Config::new("http://localhost:5000/connect/token").unwrap();
        config.leeway(30);
        let validator = Validator::new(&config);
        let now = Utc.timestamp_opt(1_600_000_000, 0).unwrap();

        let recently_expired = claims(json!({ "exp": 1_599_999_990 }));
        assert!(validator.check_lifetime(&recently_expired, now).is_ok());
        let slightly_early = claims(json!({ "exp": 1_600_000_060, "nbf": 1_600_000_010 }));
        assert!(validator.check_lifetime(&slightly_early, now).is_ok());
    }

    mod signed {
        use super::*;
        use crate::endpoint::tests::defaults::*;
        use crate::endpoint::tests::{claims, device_credential, header, sign};
        use crate::primitives::key::resolve;

        fn validate(assertion: &str, credential: &DeviceCredential) -> Result<VerifiedIdentity, Rejection> {
            let key = resolve(&device_credential()).unwrap();
            validator().validate(assertion, credential, &key, Utc::now())
        }

        #[test]
        fn accepts_device_assertion() {
            let assertion = sign(DEVICE_KEY, &header(), &claims());
            let identity = validate(&assertion, &device_credential()).unwrap();
            assert_eq!(identity.subject(), USER_ID);
            assert_eq!(identity.credential_id().to_string(), CREDENTIAL_ID);
            assert_eq!(identity.token_id(), Some("6d0d1c5e-0a4c-4e5f-9d1e-0c2b7a1f3e44"));
            assert_eq!(identity.accepted_until(), identity.expires());
        }

        #[test]
        fn accepted_until_includes_leeway() {
            let mut config = Config::new(TOKEN_ENDPOINT).unwrap();
            config.leeway(60);
            let credential = device_credential();
            let key = resolve(&credential).unwrap();
            let assertion = sign(DEVICE_KEY, &header(), &claims());

            let identity = Validator::new(&config)
                .validate(&assertion, &credential, &key, Utc::now())
                .unwrap();
            assert_eq!(identity.accepted_until(), identity.expires() + Duration::seconds(60));
        }

        #[test]
        fn signed_kid_must_name_key() {
            let mut header = header();
            header["kid"] = json!(UNKNOWN_KEY_ID);
            let assertion = sign(DEVICE_KEY, &header, &claims());
            assert_eq!(validate(&assertion, &device_credential()), Err(Rejection::InvalidSignature));

            header["kid"] = json!(7);
            let assertion = sign(DEVICE_KEY, &header, &claims());
            assert_eq!(validate(&assertion, &device_credential()), Err(Rejection::InvalidSignature));
        }

        #[test]
        fn key_of_other_credential() {
            let assertion = sign(DEVICE_KEY, &header(), &claims());
            let credential = device_credential();
            let mut other = device_credential();
            other.credential_id = UNKNOWN_KEY_ID.parse().unwrap();
            let key = resolve(&other).unwrap();

            let result = validator().validate(&assertion, &credential, &key, Utc::now());
            assert_eq!(result, Err(Rejection::InvalidKeyMaterial));
        }

        #[test]
        fn revoked_credential_is_refused() {
            let assertion = sign(DEVICE_KEY, &header(), &claims());
            let disabled = device_credential().disabled();
            assert_eq!(validate(&assertion, &disabled), Err(Rejection::CredentialRevoked));

            let lapsed = device_credential().expiring(Utc::now() - Duration::seconds(1));
            assert_eq!(validate(&assertion, &lapsed), Err(Rejection::CredentialRevoked));
        }

        #[test]
        fn non_numeric_not_before() {
            let mut claims = claims();
            claims["nbf"] = json!("soon");
            let assertion = sign(DEVICE_KEY, &header(), &claims);
            assert_eq!(validate(&assertion, &device_credential()), Err(Rejection::MalformedAssertion));
        }

        #[test]
        fn header_array_is_malformed() {
            let header = json!(["RS256", CREDENTIAL_ID]);
            let assertion = sign(DEVICE_KEY, &header, &claims());
            assert_eq!(validate(&assertion, &device_credential()), Err(Rejection::MalformedAssertion));
        }
    }

    #[test]
    fn subject_priority() {
        let validator = validator();
        let both = claims(json!({ "sub": "primary", "client_id": "fallback" }));
        assert_eq!(validator.subject(&both).unwrap(), "primary");
        let blank = claims(json!({ "sub": " ", "client_id": "fallback" }));
        assert_eq!(validator.subject(&blank).unwrap(), "fallback");
        let numeric = claims(json!({ "sub": 12, "client_id": "fallback" }));
        assert_eq!(validator.subject(&numeric).unwrap(), "fallback");
        let unlisted = claims(json!({ "name": "device" }));
        assert_eq!(validator.subject(&unlisted), Err(Rejection::MissingSubject));
    }
}
