//! Schnorr signatures over secp256k1
//!
//! Owner identities are x-only public keys; the same curve test decides
//! whether a derived address is safe to use as a program account.

use k256::schnorr::signature::{Signer, Verifier};
use k256::schnorr::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

use super::{Address, Hash};

/// Signature errors
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid private key")]
    InvalidPrivateKey,
}

/// 32-byte private key
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

/// 32-byte public key (x-only for Schnorr)
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(pub [u8; 32]);

/// 64-byte Schnorr signature
#[derive(Clone, PartialEq, Eq)]
pub struct SchnorrSignature(pub [u8; 64]);

/// Whether `bytes` decode to a point on secp256k1 (as an x-only key)
pub fn is_on_curve(bytes: &[u8; 32]) -> bool {
    VerifyingKey::from_bytes(bytes).is_ok()
}

impl PrivateKey {
    /// Generate a new random private key
    pub fn generate() -> Self {
        PrivateKey(SigningKey::random(&mut OsRng))
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignatureError> {
        SigningKey::from_bytes(bytes)
            .map(PrivateKey)
            .map_err(|_| SignatureError::InvalidPrivateKey)
    }

    pub fn public_key(&self) -> PublicKey {
        let bytes = self.0.verifying_key().to_bytes();
        PublicKey(bytes.into())
    }

    /// Sign a message hash
    pub fn sign(&self, message: &Hash) -> SchnorrSignature {
        let signature: Signature = self.0.sign(&message.0);
        SchnorrSignature(signature.to_bytes())
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes().into()
    }
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignatureError> {
        if !is_on_curve(bytes) {
            return Err(SignatureError::InvalidPublicKey);
        }
        Ok(PublicKey(*bytes))
    }

    /// Recover the key behind an owner address; fails for program addresses
    pub fn from_address(address: &Address) -> Result<Self, SignatureError> {
        Self::from_bytes(address.as_bytes())
    }

    /// Verify a signature
    pub fn verify(&self, message: &Hash, signature: &SchnorrSignature) -> bool {
        let verifying_key = match VerifyingKey::from_bytes(&self.0) {
            Ok(vk) => vk,
            Err(_) => return false,
        };

        let sig = match Signature::try_from(signature.0.as_slice()) {
            Ok(s) => s,
            Err(_) => return false,
        };

        verifying_key.verify(&message.0, &sig).is_ok()
    }

    /// The account address controlled by this key
    pub fn to_address(&self) -> Address {
        Address(self.0)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }
}


impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

impl std::fmt::Debug for SchnorrSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_bytes;

    #[test]
    fn test_sign_verify() {
        let private = PrivateKey::generate();
        let public = private.public_key();

        let message = hash_bytes(b"test message");
        let signature = private.sign(&message);

        assert!(public.verify(&message, &signature));
    }

    #[test]
    fn test_wrong_key_fails() {
        let private1 = PrivateKey::generate();
        let public2 = PrivateKey::generate().public_key();

        let message = hash_bytes(b"test message");
        let signature = private1.sign(&message);

        assert!(!public2.verify(&message, &signature));
    }

    #[test]
    fn test_public_key_is_on_curve() {
        let public = PrivateKey::generate().public_key();
        assert!(is_on_curve(&public.0));
        assert_eq!(public.to_address().0, public.0);
    }

    #[test]
    fn test_zero_bytes_are_off_curve() {
        assert!(!is_on_curve(&[0u8; 32]));
        assert!(PublicKey::from_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_key_serialization() {
        let private = PrivateKey::generate();
        let recovered = PrivateKey::from_bytes(&private.to_bytes()).unwrap();
        assert_eq!(private.public_key(), recovered.public_key());
    }
}
