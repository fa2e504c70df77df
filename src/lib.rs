//! # jwt-bearer-grant
//!
//! Validation of [RFC 7523] JWT bearer assertions for an OAuth2 token endpoint, where each
//! assertion is signed by a device with a pre-registered RSA credential.
//!
//! ## About
//!
//! A device holds a private key whose public half was enrolled with the authorization server as a
//! [`DeviceCredential`]. To obtain a token without any interactive user, the device signs a JWT
//! naming the credential in its `kid` header, itself as `iss` and the token endpoint as `aud`, and
//! presents it as the `assertion` parameter of an extension grant request with the grant type
//! `urn:ietf:params:oauth:grant-type:jwt-bearer`.
//!
//! Validating such a request is a two-phase affair. The assertion must first be read *without*
//! trusting it, only to learn which credential claims to have signed it. Then the credential is
//! looked up, turned into a verification key, and the assertion is verified against that key and
//! bound to the credential's device and the configured token endpoint. The two phases are kept in
//! separate types: an [`UnverifiedAssertionHeader`] can only ever serve as a lookup hint, while a
//! [`VerifiedIdentity`] is produced exclusively by the [`Validator`].
//!
//! ## Usage
//!
//! The HTTP framing of the token endpoint is not part of this crate. A runtime hands over the raw
//! request parameters, in any form implementing [`QueryParameter`], and receives a
//! [`GrantOutcome`]: either the verified subject to issue a token for, or a rejection to render as
//! an `invalid_grant` error response.
//!
//! ```ignore
//! use jwt_bearer_grant::config::Config;
//! use jwt_bearer_grant::endpoint::{Generic, JwtBearerFlow};
//! use jwt_bearer_grant::primitives::store::CredentialMap;
//!
//! let config = Config::new("https://auth.example.com/connect/token")?;
//! let mut endpoint = Generic::new(CredentialMap::new(), &config);
//! let outcome = JwtBearerFlow::new(&mut endpoint).execute(&form_parameters);
//! ```
//!
//! Credentials are provided through a [`CredentialStore`]; the in-memory [`CredentialMap`] is
//! meant for tests and small deployments. Stores that answer asynchronously can be driven through
//! the [`asynchronous`] module, which also enforces the configured lookup deadline.
//!
//! [RFC 7523]: https://tools.ietf.org/html/rfc7523
//! [`DeviceCredential`]: primitives/credential/struct.DeviceCredential.html
//! [`UnverifiedAssertionHeader`]: code_grant/assertion/struct.UnverifiedAssertionHeader.html
//! [`VerifiedIdentity`]: code_grant/validator/struct.VerifiedIdentity.html
//! [`Validator`]: code_grant/validator/struct.Validator.html
//! [`QueryParameter`]: endpoint/trait.QueryParameter.html
//! [`GrantOutcome`]: endpoint/enum.GrantOutcome.html
//! [`CredentialStore`]: primitives/store/trait.CredentialStore.html
//! [`CredentialMap`]: primitives/store/struct.CredentialMap.html
//! [`asynchronous`]: asynchronous/index.html
#![warn(missing_docs)]

#[macro_use]
extern crate serde_derive;

pub mod asynchronous;
pub mod code_grant;
pub mod config;
pub mod endpoint;
pub mod primitives;

/// The grant type of RFC 7523 JWT bearer assertions.
///
/// Propagated with every verified identity and included in every audit entry.
pub const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Log target of the audit entries emitted for each evaluated grant.
pub const AUDIT_TARGET: &str = "jwt_bearer_grant::audit";
