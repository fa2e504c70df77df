//! The backend of the JWT bearer grant.
//!
//! Codifies the requirements of [RFC 7523] for assertions signed by registered device
//! credentials into types and functions. The result of the backend are abstract outcomes, a
//! verified identity or a rejection, which the token endpoint translates into its responses.
//!
//! The flow is split along its trust boundary. [`assertion`] reads an assertion without trusting
//! any of it, solely to find out which credential claims to have signed it. [`validator`] verifies
//! the assertion with the key of that credential and is the only producer of a
//! [`VerifiedIdentity`]. [`jwt_bearer`] composes both with the primitives into a state machine.
//!
//! [RFC 7523]: https://tools.ietf.org/html/rfc7523
//! [`assertion`]: assertion/index.html
//! [`validator`]: validator/index.html
//! [`jwt_bearer`]: jwt_bearer/index.html
//! [`VerifiedIdentity`]: validator/struct.VerifiedIdentity.html

pub mod assertion;
pub mod error;
pub mod jwt_bearer;
pub mod validator;

pub(crate) mod jws;
