use crate::code_grant::jws::encode;
use crate::primitives::credential::DeviceCredential;

use chrono::{Duration, Utc};
use ring::rand::SystemRandom;
use ring::signature::{self, RsaKeyPair};
use serde_json::{json, Value};


/// Constants shared by the endpoint tests.
pub mod defaults {
    pub const TOKEN_ENDPOINT: &str = "http://localhost:5000/connect/token";
    pub const CREDENTIAL_ID: &str = "12bf406a-ac37-43a2-8c5e-fcfc4bfa1f9f";
    pub const DEVICE_ID: &str = "d1eaa073-0feb-48ad-bad2-0592963b4203";
    pub const USER_ID: &str = "fb4a6d23-e383-4b64-95f5-5b62601ac9cb";
    pub const UNKNOWN_KEY_ID: &str = "11111111-1111-1111-1111-111111111111";
    pub const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

    pub const EXPONENT: &str = "AQAB";
    pub const DEVICE_MODULUS: &str = "nteYglD3jOKjxTKWlzrghFdW48VBiItiRVaCVl7tDcIQqyQfLOEVTChSGAMRbtw3wQ8pX6dOHNL8Bqf64cHus2DcgdDV+U/M6e+ZSsksxk0DT0GU6ttVCS4FtZvAKV0tCSeE+EsOVgfx0OIDTti01S+tgMYHCYGkq0ghLK3zE0u27NxI0MDg9+WqG22mn9XbdLVUenQebb6KjMmzrdoPVgKF53d8fVbSOPlsCe6o/uJJN6ocCVQgCuVUpd6AUjU/Lb8ZfYx3Zkzk4sSoknaUz57S2T0UtYXthOthF4YuHkXRjHfbCSwGnH1SzGq14amSNLN+H5XmYVdfRt0tnPR0kw==";

    pub const DEVICE_KEY: &[u8] = include_bytes!("../../../tests/fixtures/device-rsa.pk8");
    pub const OTHER_KEY: &[u8] = include_bytes!("../../../tests/fixtures/other-rsa.pk8");
}

use self::defaults::*;

/// The enrolled credential of the test device.
pub(crate) fn device_credential() -> DeviceCredential {
    DeviceCredential::new(
        CREDENTIAL_ID.parse().unwrap(),
        DEVICE_ID.parse().unwrap(),
        USER_ID.parse().unwrap(),
        EXPONENT,
        DEVICE_MODULUS,
    )
}

/// A header naming the device credential.
pub(crate) fn header() -> Value {
    json!({ "alg": "RS256", "typ": "JWT", "kid": CREDENTIAL_ID })
}

/// Claims a correctly configured device would send, valid for five minutes.
pub(crate) fn claims() -> Value {
    let now = Utc::now();
    json!({
        "iss": DEVICE_ID,
        "aud": TOKEN_ENDPOINT,
        "sub": USER_ID,
        "iat": now.timestamp(),
        "exp": (now + Duration::minutes(5)).timestamp(),
        "jti": "6d0d1c5e-0a4c-4e5f-9d1e-0c2b7a1f3e44",
    })
}

/// Sign an assertion as `RS256` with a pkcs8 encoded key.
pub(crate) fn sign(key: &[u8], header: &Value, claims: &Value) -> String {
    let signing_input = format!(
        "{}.{}",
        encode(header.to_string().as_bytes()),
        encode(claims.to_string().as_bytes())
    );

    let key_pair = RsaKeyPair::from_pkcs8(key).expect("Fixture is a valid pkcs8 key");
    let mut signature = vec![0; key_pair.public_modulus_len()];
    key_pair
        .sign(
            &signature::RSA_PKCS1_SHA256,
            &SystemRandom::new(),
            signing_input.as_bytes(),
            &mut signature,
        )
        .expect("Signing with a fixture key succeeds");

    format!("{}.{}", signing_input, encode(&signature))
}

/// Body parameters of a token request.
pub(crate) fn token_request(assertion: &str) -> Vec<(String, String)> {
    vec![
        ("grant_type".to_string(), GRANT_TYPE.to_string()),
        ("assertion".to_string(), assertion.to_string()),
    ]
}
