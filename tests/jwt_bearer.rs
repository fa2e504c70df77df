//! Drives the grant through the public surface, the way a token endpoint runtime would.
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use ring::rand::SystemRandom;
use ring::signature::{self, RsaKeyPair};
use serde_json::{json, Value};

use jwt_bearer_grant::config::Config;
use jwt_bearer_grant::endpoint::{Generic, GrantOutcome, JwtBearerFlow};
use jwt_bearer_grant::primitives::store::CredentialMap;
use jwt_bearer_grant::GRANT_TYPE;

const TOKEN_ENDPOINT: &str = "http://localhost:5000/connect/token";
const CREDENTIAL_ID: &str = "12bf406a-ac37-43a2-8c5e-fcfc4bfa1f9f";
const DEVICE_ID: &str = "d1eaa073-0feb-48ad-bad2-0592963b4203";
const USER_ID: &str = "fb4a6d23-e383-4b64-95f5-5b62601ac9cb";

const DEVICE_KEY: &[u8] = include_bytes!("fixtures/device-rsa.pk8");

const CREDENTIALS: &str = r#"[
    {
        "credential_id": "12bf406a-ac37-43a2-8c5e-fcfc4bfa1f9f",
        "device_id": "d1eaa073-0feb-48ad-bad2-0592963b4203",
        "user_id": "fb4a6d23-e383-4b64-95f5-5b62601ac9cb",
        "public_key_exponent": "AQAB",
        "public_key_modulus": "nteYglD3jOKjxTKWlzrghFdW48VBiItiRVaCVl7tDcIQqyQfLOEVTChSGAMRbtw3wQ8pX6dOHNL8Bqf64cHus2DcgdDV+U/M6e+ZSsksxk0DT0GU6ttVCS4FtZvAKV0tCSeE+EsOVgfx0OIDTti01S+tgMYHCYGkq0ghLK3zE0u27NxI0MDg9+WqG22mn9XbdLVUenQebb6KjMmzrdoPVgKF53d8fVbSOPlsCe6o/uJJN6ocCVQgCuVUpd6AUjU/Lb8ZfYx3Zkzk4sSoknaUz57S2T0UtYXthOthF4YuHkXRjHfbCSwGnH1SzGq14amSNLN+H5XmYVdfRt0tnPR0kw=="
    }
]"#;

fn store() -> CredentialMap {
    CredentialMap::from_json(CREDENTIALS.as_bytes()).expect("Fixture credentials are valid")
}

fn config() -> Config {
    let config: Config =
        serde_json::from_value(json!({ "token_endpoint": TOKEN_ENDPOINT })).expect("Valid config");
    config.validate().expect("Token endpoint is absolute");
    config
}

fn assertion(jti: &str) -> String {
    let header = json!({ "alg": "RS256", "typ": "JWT", "kid": CREDENTIAL_ID });
    let claims = json!({
        "iss": DEVICE_ID,
        "aud": TOKEN_ENDPOINT,
        "sub": USER_ID,
        "exp": (Utc::now() + Duration::minutes(5)).timestamp(),
        "jti": jti,
    });
    sign(&header, &claims)
}

fn sign(header: &Value, claims: &Value) -> String {
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    );

    let key_pair = RsaKeyPair::from_pkcs8(DEVICE_KEY).unwrap();
    let mut signature = vec![0; key_pair.public_modulus_len()];
    key_pair
        .sign(
            &signature::RSA_PKCS1_SHA256,
            &SystemRandom::new(),
            signing_input.as_bytes(),
            &mut signature,
        )
        .unwrap();

    format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature))
}

fn form(assertion: &str) -> HashMap<String, String> {
    let mut form = HashMap::new();
    form.insert("grant_type".to_string(), GRANT_TYPE.to_string());
    form.insert("assertion".to_string(), assertion.to_string());
    form.insert("scope".to_string(), "openid offline_access".to_string());
    form
}

#[test]
fn grant_from_seeded_store() {
    let mut endpoint = Generic::new(store(), &config());
    let outcome = JwtBearerFlow::new(&mut endpoint).execute(&form(&assertion("first")));

    let identity = outcome.identity().expect("Expected the assertion to be accepted");
    assert_eq!(identity.subject(), USER_ID);
    assert_eq!(identity.grant_type(), GRANT_TYPE);
    assert_eq!(identity.user_id().to_string(), USER_ID);
    assert_eq!(identity.token_id(), Some("first"));
    assert!(outcome.error().is_none());
}

#[test]
fn rejection_renders_invalid_grant() {
    let mut endpoint = Generic::new(CredentialMap::new(), &config());
    let outcome = JwtBearerFlow::new(&mut endpoint).execute(&form(&assertion("first")));

    assert_eq!(outcome.diagnostic(), Some("unknown_credential"));
    let body: HashMap<String, String> =
        serde_json::from_str(&outcome.error().unwrap().to_json()).unwrap();
    assert_eq!(body["error"], "invalid_grant");
    assert!(!body.values().any(|value| value.contains("credential")));
}

#[test]
fn revoked_after_enrollment() {
    let store = store();
    let mut revoked = store
        .remove(&CREDENTIAL_ID.parse().unwrap())
        .expect("Credential was seeded");
    revoked.enabled = false;
    store.register(revoked);

    let mut endpoint = Generic::new(store, &config());
    let outcome = JwtBearerFlow::new(&mut endpoint).execute(&form(&assertion("first")));
    assert_eq!(outcome.diagnostic(), Some("credential_revoked"));
}

#[test]
fn replay_protection_from_config() {
    let config: Config = serde_json::from_value(json!({
        "token_endpoint": TOKEN_ENDPOINT,
        "replay_protection": true,
    }))
    .unwrap();
    let mut endpoint = Generic::new(store(), &config);
    let assertion = assertion("once");

    assert!(JwtBearerFlow::new(&mut endpoint).execute(&form(&assertion)).is_success());
    let again = JwtBearerFlow::new(&mut endpoint).execute(&form(&assertion));
    assert_eq!(again.diagnostic(), Some("assertion_replayed"));
}

#[test]
fn concurrent_evaluations_share_store() {
    let store = Arc::new(store());
    let config = config();

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let store = Arc::clone(&store);
            let config = config.clone();
            thread::spawn(move || {
                let mut endpoint = Generic::new(store, &config);
                let jti = format!("worker-{}", worker);
                JwtBearerFlow::new(&mut endpoint).execute(&form(&assertion(&jti)))
            })
        })
        .collect();

    for worker in workers {
        let outcome = worker.join().expect("Worker panicked");
        assert!(matches!(outcome, GrantOutcome::Granted(_)));
    }
}
