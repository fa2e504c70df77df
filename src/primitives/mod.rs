//! A collection of primitives the grant is composed from.
//!
//! A primitive is the smallest independent unit of policy or data access. The credential store
//! answers lookups by credential id, the key resolver turns stored key material into something a
//! signature can be checked against, and the replay guard remembers consumed assertions. Each is a
//! trait so that a database backed or otherwise customized implementation can be swapped in for
//! the simple in-memory ones provided here.
//!
//! ```ignore
//! use jwt_bearer_grant::endpoint::Generic;
//! use jwt_bearer_grant::primitives::{
//!     key::RsaKeyResolver,
//!     replay::SeenAssertions,
//!     store::CredentialMap,
//! };
//!
//! Generic {
//!     store: CredentialMap::new(),
//!     resolver: RsaKeyResolver,
//!     replay: SeenAssertions::new(),
//!     validator,
//!     lookup_timeout,
//! };
//! ```

use chrono::DateTime;
use chrono::Utc;

pub mod credential;
pub mod key;
pub mod replay;
pub mod store;

/// Point in time, always in Utc.
pub type Time = DateTime<Utc>;

/// Commonly used primitives for endpoints and drivers.
pub mod prelude {
    pub use super::credential::{CredentialId, DeviceCredential, DeviceId};
    pub use super::key::{KeyResolver, RsaKeyResolver, VerificationKey};
    pub use super::replay::{ReplayGuard, SeenAssertions};
    pub use super::store::{CredentialMap, CredentialStore, StoreError};
    pub use super::Time;
}
