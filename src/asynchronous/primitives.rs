//! Async versions of the primitive traits.
use async_trait::async_trait;

use crate::primitives::credential::{CredentialId, DeviceCredential};
use crate::primitives::store::StoreError;

/// Read access to registered credentials, answered asynchronously.
///
/// Every synchronous `CredentialStore` is also an asynchronous one.
#[async_trait(?Send)]
pub trait CredentialStore {
    /// Find the credential with the given id.
    async fn find(&self, id: &CredentialId) -> Result<DeviceCredential, StoreError>;
}

#[async_trait(?Send)]
impl<T> CredentialStore for T
where
    T: crate::primitives::store::CredentialStore + ?Sized,
{
    async fn find(&self, id: &CredentialId) -> Result<DeviceCredential, StoreError> {
        crate::primitives::store::CredentialStore::find(self, id)
    }
}
