//! Wallet module - Key management and signing identity

mod keypair;

pub use keypair::*;
