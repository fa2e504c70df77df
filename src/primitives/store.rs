//! Stores administer the registered device credentials.
//!
//! The validation path only ever reads from a store. An absent credential is an ordinary answer,
//! `StoreError::NotFound`, so that the grant can reject it the same way it rejects every other
//! failed check.
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::iter::{Extend, FromIterator};
use std::rc::Rc;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::credential::{CredentialId, DeviceCredential};

/// Read access to registered credentials.
///
/// Implementations are shared between concurrently evaluated grants and must therefore allow
/// concurrent reads. Writes happen in enrollment, which is not covered by this trait.
pub trait CredentialStore {
    /// Find the credential with the given id.
    fn find(&self, id: &CredentialId) -> Result<DeviceCredential, StoreError>;
}

/// Handled responses from a store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// No credential is registered under the id.
    NotFound,

    /// The store could not answer, for example because the backing database is unreachable.
    ///
    /// Not a statement about the credential. The grant reports this separately from all
    /// validation failures.
    Unavailable,
}

/// A simple in-memory map of credential ids to credentials.
///
/// Safe for concurrent use, reads only take a shared lock. Registration is meant for enrollment
/// and tests.
///
/// Every access goes through a single map operation, so a panic of another lock holder can not
/// leave the map half-written. A poisoned lock is therefore recovered from by reads and writes
/// alike.
#[derive(Default)]
pub struct CredentialMap {
    credentials: RwLock<HashMap<CredentialId, DeviceCredential>>,
}

impl CredentialMap {
    /// Create an empty map.
    pub fn new() -> Self {
        CredentialMap::default()
    }

    /// Read a json array of credentials.
    pub fn from_json<R: Read>(reader: R) -> Result<Self, serde_json::Error> {
        let credentials: Vec<DeviceCredential> = serde_json::from_reader(reader)?;
        Ok(credentials.into_iter().collect())
    }

    /// Insert or replace a credential.
    ///
    /// Returns the credential previously registered under the same id.
    pub fn register(&self, credential: DeviceCredential) -> Option<DeviceCredential> {
        self.write().insert(credential.credential_id, credential)
    }

    /// Remove a credential, returning it if it was present.
    pub fn remove(&self, id: &CredentialId) -> Option<DeviceCredential> {
        self.write().remove(id)
    }

    /// The number of registered credentials.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no credential is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<HashMap<CredentialId, DeviceCredential>> {
        self.credentials.read().unwrap_or_else(|err| err.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<HashMap<CredentialId, DeviceCredential>> {
        self.credentials.write().unwrap_or_else(|err| err.into_inner())
    }
}

impl CredentialStore for CredentialMap {
    fn find(&self, id: &CredentialId) -> Result<DeviceCredential, StoreError> {
        self.read().get(id).cloned().ok_or(StoreError::NotFound)
    }
}

impl Extend<DeviceCredential> for CredentialMap {
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = DeviceCredential>,
    {
        let credentials = self.credentials.get_mut().unwrap_or_else(|err| err.into_inner());
        credentials.extend(
            iter.into_iter()
                .map(|credential| (credential.credential_id, credential)),
        );
    }
}

impl FromIterator<DeviceCredential> for CredentialMap {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = DeviceCredential>,
    {
        let mut map = CredentialMap::new();
        map.extend(iter);
        map
    }
}

impl fmt::Debug for CredentialMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CredentialMap")
            .field("credentials", &self.len())
            .finish()
    }
}

impl<'s, S: CredentialStore + ?Sized> CredentialStore for &'s S {
    fn find(&self, id: &CredentialId) -> Result<DeviceCredential, StoreError> {
        (**self).find(id)
    }
}

impl<'s, S: CredentialStore + ?Sized> CredentialStore for &'s mut S {
    fn find(&self, id: &CredentialId) -> Result<DeviceCredential, StoreError> {
        (**self).find(id)
    }
}

impl<S: CredentialStore + ?Sized> CredentialStore for Box<S> {
    fn find(&self, id: &CredentialId) -> Result<DeviceCredential, StoreError> {
        (**self).find(id)
    }
}

impl<S: CredentialStore + ?Sized> CredentialStore for Rc<S> {
    fn find(&self, id: &CredentialId) -> Result<DeviceCredential, StoreError> {
        (**self).find(id)
    }
}

impl<S: CredentialStore + ?Sized> CredentialStore for Arc<S> {
    fn find(&self, id: &CredentialId) -> Result<DeviceCredential, StoreError> {
        (**self).find(id)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::NotFound => f.write_str("credential not found"),
            StoreError::Unavailable => f.write_str("credential store unavailable"),
        }
    }
}

impl std::error::Error for StoreError {}
