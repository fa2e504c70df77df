//! Verification keys built from stored credentials.
//!
//! Resolving a key is a pure transformation of the credential's stored public components. No file
//! or network is touched here; wherever the key material comes from, it arrives through the
//! credential store.
use std::fmt;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use ring::error::Unspecified;
use ring::signature::{self, RsaPublicKeyComponents};

use super::credential::{CredentialId, DeviceCredential};

/// Smallest modulus accepted for verification, in bits.
pub const MIN_MODULUS_BITS: usize = 2048;

/// Largest modulus accepted for verification, in bits.
pub const MAX_MODULUS_BITS: usize = 8192;

/// Turns a credential into a key assertions can be verified with.
pub trait KeyResolver {
    /// Build the verification key of the credential.
    fn resolve(&mut self, credential: &DeviceCredential) -> Result<VerificationKey, KeyError>;
}

/// The default resolver, decoding the stored RSA components.
#[derive(Clone, Copy, Debug, Default)]
pub struct RsaKeyResolver;

/// An RSA public key bound to the credential it was built from.
///
/// Verifies RSASSA-PKCS1-v1_5 signatures with SHA-256, the `RS256` algorithm of JWS.
#[derive(Clone)]
pub struct VerificationKey {
    key_id: CredentialId,
    components: RsaPublicKeyComponents<Vec<u8>>,
}

/// The stored key material does not form a usable RSA public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyError {
    /// A component is not valid base64.
    Encoding,

    /// The decoded exponent is zero, even, or smaller than three.
    Exponent,

    /// The decoded modulus is zero, even, or outside the accepted size.
    Modulus,
}

/// Decode and check the key of a credential.
pub fn resolve(credential: &DeviceCredential) -> Result<VerificationKey, KeyError> {
    let e = decode_component(&credential.public_key_exponent)?;
    let n = decode_component(&credential.public_key_modulus)?;
    VerificationKey::from_components(credential.credential_id, n, e)
}

fn decode_component(encoded: &str) -> Result<Vec<u8>, KeyError> {
    let encoded = encoded.trim();
    let bytes = STANDARD
        .decode(encoded)
        .or_else(|_| URL_SAFE_NO_PAD.decode(encoded))
        .map_err(|_| KeyError::Encoding)?;
    let leading = bytes.iter().take_while(|&&byte| byte == 0).count();
    Ok(bytes[leading..].to_vec())
}

fn bit_length(big_endian: &[u8]) -> usize {
    match big_endian.first() {
        None => 0,
        Some(first) => big_endian.len() * 8 - first.leading_zeros() as usize,
    }
}

fn is_odd(big_endian: &[u8]) -> bool {
    big_endian.last().map_or(false, |last| last & 1 == 1)
}

impl VerificationKey {
    /// Construct a key from big-endian modulus and exponent without leading zero bytes.
    pub fn from_components(key_id: CredentialId, n: Vec<u8>, e: Vec<u8>) -> Result<Self, KeyError> {
        if !is_odd(&e) || bit_length(&e) < 2 {
            return Err(KeyError::Exponent);
        }

        let bits = bit_length(&n);
        if !is_odd(&n) || bits < MIN_MODULUS_BITS || bits > MAX_MODULUS_BITS {
            return Err(KeyError::Modulus);
        }

        Ok(VerificationKey {
            key_id,
            components: RsaPublicKeyComponents { n, e },
        })
    }

    /// The credential this key belongs to.
    pub fn key_id(&self) -> &CredentialId {
        &self.key_id
    }

    /// Size of the modulus in bits.
    pub fn modulus_bits(&self) -> usize {
        bit_length(&self.components.n)
    }

    /// Check an `RS256` signature over the message.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), Unspecified> {
        self.components
            .verify(&signature::RSA_PKCS1_2048_8192_SHA256, message, signature)
    }
}

impl KeyResolver for RsaKeyResolver {
    fn resolve(&mut self, credential: &DeviceCredential) -> Result<VerificationKey, KeyError> {
        resolve(credential)
    }
}

impl<'a, K: KeyResolver + ?Sized> KeyResolver for &'a mut K {
    fn resolve(&mut self, credential: &DeviceCredential) -> Result<VerificationKey, KeyError> {
        (**self).resolve(credential)
    }
}

impl<K: KeyResolver + ?Sized> KeyResolver for Box<K> {
    fn resolve(&mut self, credential: &DeviceCredential) -> Result<VerificationKey, KeyError> {
        (**self).resolve(credential)
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("key_id", &self.key_id)
            .field("modulus_bits", &self.modulus_bits())
            .finish()
    }
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KeyError::Encoding => f.write_str("key component is not valid base64"),
            KeyError::Exponent => f.write_str("invalid public exponent"),
            KeyError::Modulus => f.write_str("invalid public modulus"),
        }
    }
}

impl std::error::Error for KeyError {}
