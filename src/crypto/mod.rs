//! Cryptography module - hashing, addresses, Schnorr signatures

mod address;
mod hash;
mod schnorr;

pub use address::*;
pub use hash::*;
pub use schnorr::*;
