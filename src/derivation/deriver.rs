//! Deterministic address derivation
//!
//! A name is hashed with a fixed prefix, combined with a class and a parent
//! into a seed list, and reduced to an address by searching bump values
//! from 255 downwards until the candidate falls off the secp256k1 curve.
//! Nothing here reads time, randomness, or external state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    NAME_HASH_PREFIX, PDA_MARKER, PROGRAM_ID_SEED, REVERSE_CLASS_SEED, ROOT_DOMAIN_SEED,
};
use crate::crypto::{is_on_curve, sha256_concat, Address, Hash};

/// Derivation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DerivationError {
    #[error("Invalid input: domain name must not be empty")]
    EmptyName,
    #[error("No off-curve address found for seeds of {name}")]
    NoViableBump { name: String },
}

/// Fixed namespace the deriver works in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationScheme {
    /// Program that owns every derived account
    pub program_id: Address,
    /// Parent used for top-level names
    pub root_domain: Address,
    /// Class tag separating reverse-lookup accounts from forward ones
    pub reverse_class: Address,
}

impl Default for DerivationScheme {
    fn default() -> Self {
        Self {
            program_id: Address(sha256_concat(&[PROGRAM_ID_SEED]).0),
            root_domain: Address(sha256_concat(&[ROOT_DOMAIN_SEED]).0),
            reverse_class: Address(sha256_concat(&[REVERSE_CLASS_SEED]).0),
        }
    }
}

/// Pure mapping from names to program-owned addresses
#[derive(Debug, Clone, Default)]
pub struct AddressDeriver {
    scheme: DerivationScheme,
}

impl AddressDeriver {
    pub fn new(scheme: DerivationScheme) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> &DerivationScheme {
        &self.scheme
    }

    /// SHA-256 of the name under the fixed prefix
    pub fn hashed_name(name: &str) -> Result<Hash, DerivationError> {
        if name.is_empty() {
            return Err(DerivationError::EmptyName);
        }
        Ok(sha256_concat(&[NAME_HASH_PREFIX.as_bytes(), name.as_bytes()]))
    }

    /// Forward account address for `name` under `parent` (root domain if absent)
    pub fn derive_address(
        &self,
        name: &str,
        parent: Option<&Address>,
    ) -> Result<Address, DerivationError> {
        let hashed = Self::hashed_name(name)?;
        let class = Address::zero();
        let parent = parent.unwrap_or(&self.scheme.root_domain);

        let seeds = [hashed.0.as_slice(), class.0.as_slice(), parent.0.as_slice()];
        self.find_program_address(&seeds)
            .map(|(address, _)| address)
            .ok_or_else(|| DerivationError::NoViableBump {
                name: name.to_string(),
            })
    }

    /// Reverse-lookup account address for a forward `address`
    pub fn derive_reverse_address(
        &self,
        address: &Address,
        parent: Option<&Address>,
    ) -> Result<Address, DerivationError> {
        let key = address.to_base58();
        let hashed = Self::hashed_name(&key)?;
        let class = self.scheme.reverse_class;
        let parent = parent.copied().unwrap_or_else(Address::zero);

        let seeds = [hashed.0.as_slice(), class.0.as_slice(), parent.0.as_slice()];
        self.find_program_address(&seeds)
            .map(|(address, _)| address)
            .ok_or(DerivationError::NoViableBump { name: key })
    }

    /// First off-curve candidate, searching bumps from 255 down to 0
    pub fn find_program_address(&self, seeds: &[&[u8]]) -> Option<(Address, u8)> {
        for bump in (0..=u8::MAX).rev() {
            let candidate = self.create_program_address(seeds, bump);
            if !is_on_curve(&candidate.0) {
                return Some((candidate, bump));
            }
        }
        None
    }

    fn create_program_address(&self, seeds: &[&[u8]], bump: u8) -> Address {
        let bump_seed = [bump];
        let mut parts: Vec<&[u8]> = Vec::with_capacity(seeds.len() + 3);
        parts.extend_from_slice(seeds);
        parts.push(bump_seed.as_slice());
        parts.push(self.scheme.program_id.0.as_slice());
        parts.push(PDA_MARKER);
        Address(sha256_concat(&parts).0)
    }
}
