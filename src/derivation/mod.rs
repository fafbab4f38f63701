//! Address derivation - domain and reverse-lookup account keys

mod deriver;

pub use deriver::*;
