//! Single-use tracking of consumed assertions.
//!
//! Without tracking, a captured assertion can be presented again until it expires. A guard
//! remembers the `jti` of every accepted assertion per credential until it is no longer acceptable,
//! its expiration plus the leeway, and refuses to accept it a second time. The unit type `()` is the guard that remembers nothing.
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use super::credential::CredentialId;
use super::Time;

/// Records consumed assertions.
pub trait ReplayGuard {
    /// Whether the guard tracks anything at all.
    ///
    /// Assertions without a `jti` are only acceptable when this is `false`.
    fn enabled(&self) -> bool;

    /// Mark the assertion as consumed, failing if it was consumed before.
    ///
    /// `accepted_until` is the instant from which the validator refuses the assertion anyway. The
    /// record may be forgotten once `now` reaches it, never earlier.
    fn consume(&mut self, credential: &CredentialId, jti: &str, accepted_until: Time, now: Time)
        -> Result<(), Replayed>;
}

/// The assertion was already consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Replayed;

/// An in-memory record of consumed assertions.
///
/// Entries no longer acceptable are pruned on every insertion. Their number is bounded by the
/// maximum assertion lifetime the validator enforces. Interior locking makes it possible to share a
/// single instance between endpoints through a reference.
#[derive(Default)]
pub struct SeenAssertions {
    seen: Mutex<HashMap<(CredentialId, String), Time>>,
}

impl SeenAssertions {
    /// Create an empty record.
    pub fn new() -> Self {
        SeenAssertions::default()
    }

    /// Record the assertion, see `ReplayGuard::consume`.
    pub fn record(&self, credential: &CredentialId, jti: &str, accepted_until: Time, now: Time) -> Result<(), Replayed> {
        let mut seen = self.seen.lock().unwrap_or_else(|err| err.into_inner());
        seen.retain(|_, until| *until > now);

        let key = (*credential, jti.to_string());
        if seen.contains_key(&key) {
            return Err(Replayed);
        }

        seen.insert(key, accepted_until);
        Ok(())
    }

    /// The number of remembered assertions, including those not yet pruned.
    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(|err| err.into_inner()).len()
    }

    /// Whether nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReplayGuard for () {
    fn enabled(&self) -> bool {
        false
    }

    fn consume(&mut self, _: &CredentialId, _: &str, _: Time, _: Time) -> Result<(), Replayed> {
        Ok(())
    }
}

impl ReplayGuard for SeenAssertions {
    fn enabled(&self) -> bool {
        true
    }

    fn consume(&mut self, credential: &CredentialId, jti: &str, expires: Time, now: Time) -> Result<(), Replayed> {
        self.record(credential, jti, expires, now)
    }
}

impl<'a> ReplayGuard for &'a SeenAssertions {
    fn enabled(&self) -> bool {
        true
    }

    fn consume(&mut self, credential: &CredentialId, jti: &str, expires: Time, now: Time) -> Result<(), Replayed> {
        self.record(credential, jti, expires, now)
    }
}

/// An absent guard tracks nothing.
impl<G: ReplayGuard> ReplayGuard for Option<G> {
    fn enabled(&self) -> bool {
        self.as_ref().map_or(false, G::enabled)
    }

    fn consume(&mut self, credential: &CredentialId, jti: &str, expires: Time, now: Time) -> Result<(), Replayed> {
        match self {
            Some(guard) => guard.consume(credential, jti, expires, now),
            None => Ok(()),
        }
    }
}

impl<'a, G: ReplayGuard + ?Sized> ReplayGuard for &'a mut G {
    fn enabled(&self) -> bool {
        (**self).enabled()
    }

    fn consume(&mut self, credential: &CredentialId, jti: &str, expires: Time, now: Time) -> Result<(), Replayed> {
        (**self).consume(credential, jti, expires, now)
    }
}

impl<G: ReplayGuard + ?Sized> ReplayGuard for Box<G> {
    fn enabled(&self) -> bool {
        (**self).enabled()
    }

    fn consume(&mut self, credential: &CredentialId, jti: &str, expires: Time, now: Time) -> Result<(), Replayed> {
        (**self).consume(credential, jti, expires, now)
    }
}

impl fmt::Debug for SeenAssertions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SeenAssertions").field("seen", &self.len()).finish()
    }
}

impl fmt::Display for Replayed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("assertion was already consumed")
    }
}

impl std::error::Error for Replayed {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn second_use_is_refused() {
        let seen = SeenAssertions::new();
        let id: CredentialId = "12bf406a-ac37-43a2-8c5e-fcfc4bfa1f9f".parse().unwrap();
        let now = Utc::now();
        let expires = now + Duration::seconds(60);

        assert_eq!(seen.record(&id, "first", expires, now), Ok(()));
        assert_eq!(seen.record(&id, "first", expires, now), Err(Replayed));
        assert_eq!(seen.record(&id, "second", expires, now), Ok(()));
    }

    #[test]
    fn same_jti_other_credential() {
        let seen = SeenAssertions::new();
        let first: CredentialId = "12bf406a-ac37-43a2-8c5e-fcfc4bfa1f9f".parse().unwrap();
        let second: CredentialId = "11111111-1111-1111-1111-111111111111".parse().unwrap();
        let now = Utc::now();
        let expires = now + Duration::seconds(60);

        assert_eq!(seen.record(&first, "jti", expires, now), Ok(()));
        assert_eq!(seen.record(&second, "jti", expires, now), Ok(()));
    }

    #[test]
    fn expired_records_are_pruned() {
        let seen = SeenAssertions::new();
        let id: CredentialId = "12bf406a-ac37-43a2-8c5e-fcfc4bfa1f9f".parse().unwrap();
        let now = Utc::now();

        seen.record(&id, "old", now + Duration::seconds(1), now).unwrap();
        let later = now + Duration::seconds(2);
        seen.record(&id, "new", later + Duration::seconds(60), later).unwrap();
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn kept_until_no_longer_accepted() {
        let seen = SeenAssertions::new();
        let id: CredentialId = "12bf406a-ac37-43a2-8c5e-fcfc4bfa1f9f".parse().unwrap();
        let now = Utc::now();
        let accepted_until = now + Duration::seconds(55);

        seen.record(&id, "late", accepted_until, now).unwrap();
        let later = now + Duration::seconds(30);
        assert_eq!(seen.record(&id, "late", accepted_until, later), Err(Replayed));
        seen.record(&id, "other", accepted_until, later).unwrap();
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn unit_guard_accepts_everything() {
        let id: CredentialId = "12bf406a-ac37-43a2-8c5e-fcfc4bfa1f9f".parse().unwrap();
        let now = Utc::now();
        let mut guard = ();
        assert!(!guard.enabled());
        assert!(guard.consume(&id, "jti", now, now).is_ok());
        assert!(guard.consume(&id, "jti", now, now).is_ok());
    }

    #[test]
    fn optional_guard() {
        let id: CredentialId = "12bf406a-ac37-43a2-8c5e-fcfc4bfa1f9f".parse().unwrap();
        let now = Utc::now();
        let expires = now + Duration::seconds(60);

        let mut absent: Option<SeenAssertions> = None;
        assert!(!absent.enabled());
        assert!(absent.consume(&id, "jti", expires, now).is_ok());
        assert!(absent.consume(&id, "jti", expires, now).is_ok());

        let mut present = Some(SeenAssertions::new());
        assert!(present.enabled());
        assert!(present.consume(&id, "jti", expires, now).is_ok());
        assert_eq!(present.consume(&id, "jti", expires, now), Err(Replayed));
    }
}
