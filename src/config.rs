//! Configuration of the grant validation.
//!
//! The token endpoint url is the only required value. It is supplied by the operator, never taken
//! from a request, and every assertion must name it as its single audience.
use std::fmt;
use std::time::Duration as StdDuration;

use chrono::Duration;
use url::Url;

/// The claims tried in order when extracting the subject of a verified assertion.
pub const DEFAULT_SUBJECT_CLAIMS: [&str; 2] = [
    "sub",
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier",
];

/// Validation settings.
///
/// Can be deserialized, for example from a configuration file, in which case all fields except
/// `token_endpoint` may be omitted. Call `validate` on deserialized values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// The absolute url of the token endpoint, the required audience.
    pub token_endpoint: String,

    /// Tolerated clock difference in seconds, applied to `exp` and `nbf`.
    #[serde(default)]
    pub leeway_seconds: u32,

    /// The claims tried for the subject, in order of preference.
    #[serde(default = "default_subject_claims")]
    pub subject_claims: Vec<String>,

    /// Deadline of an asynchronous credential lookup in milliseconds.
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    /// Accept each assertion, identified by its `jti`, only once.
    #[serde(default)]
    pub replay_protection: bool,

    /// How far in seconds the `exp` of an assertion may lie ahead of the time of validation.
    ///
    /// Bounds how long a consumed assertion has to be remembered for replay protection.
    #[serde(default = "default_max_assertion_lifetime_seconds")]
    pub max_assertion_lifetime_seconds: u32,
}

/// The configuration can not be used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The token endpoint is not an absolute url.
    TokenEndpoint(String),

    /// No subject claim is configured.
    NoSubjectClaims,
}

fn default_subject_claims() -> Vec<String> {
    DEFAULT_SUBJECT_CLAIMS.iter().map(|claim| claim.to_string()).collect()
}

fn default_lookup_timeout_ms() -> u64 {
    5_000
}

fn default_max_assertion_lifetime_seconds() -> u32 {
    3_600
}

impl Config {
    /// Configuration with default settings for the given token endpoint.
    pub fn new(token_endpoint: &str) -> Result<Self, ConfigError> {
        let config = Config {
            token_endpoint: token_endpoint.to_string(),
            leeway_seconds: 0,
            subject_claims: default_subject_claims(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
            replay_protection: false,
            max_assertion_lifetime_seconds: default_max_assertion_lifetime_seconds(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants of a configuration, for example after deserializing it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match Url::parse(&self.token_endpoint) {
            Ok(url) if !url.cannot_be_a_base() => (),
            _ => return Err(ConfigError::TokenEndpoint(self.token_endpoint.clone())),
        }

        if self.subject_claims.is_empty() {
            return Err(ConfigError::NoSubjectClaims);
        }

        Ok(())
    }

    /// Tolerate some clock skew between devices and the server.
    pub fn leeway(&mut self, seconds: u32) -> &mut Self {
        self.leeway_seconds = seconds;
        self
    }

    /// Replace the subject claim preference.
    pub fn subject_claims<I, S>(&mut self, claims: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subject_claims = claims.into_iter().map(Into::into).collect();
        self
    }

    /// Change the deadline of asynchronous credential lookups.
    pub fn lookup_timeout(&mut self, timeout: StdDuration) -> &mut Self {
        self.lookup_timeout_ms = timeout.as_millis().min(u128::from(u64::MAX)) as u64;
        self
    }

    /// Enable or disable single-use assertions.
    pub fn replay_protection(&mut self, enable: bool) -> &mut Self {
        self.replay_protection = enable;
        self
    }

    /// Limit how far ahead the expiration of an assertion may be.
    pub fn max_assertion_lifetime(&mut self, seconds: u32) -> &mut Self {
        self.max_assertion_lifetime_seconds = seconds;
        self
    }

    /// The leeway as a duration.
    pub fn leeway_duration(&self) -> Duration {
        Duration::seconds(i64::from(self.leeway_seconds))
    }

    /// The maximum assertion lifetime as a duration.
    pub fn max_assertion_lifetime_duration(&self) -> Duration {
        Duration::seconds(i64::from(self.max_assertion_lifetime_seconds))
    }

    /// The lookup deadline as a duration.
    pub fn lookup_timeout_duration(&self) -> StdDuration {
        StdDuration::from_millis(self.lookup_timeout_ms)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::TokenEndpoint(endpoint) => {
                write!(f, "token endpoint `{}` is not an absolute url", endpoint)
            }
            ConfigError::NoSubjectClaims => f.write_str("no subject claim configured"),
        }
    }
}

impl std::error::Error for ConfigError {}
