//! Ledger module - external chain client seam, in-memory ledger, retries

mod client;
mod memory;
mod retry;

pub use client::*;
pub use memory::*;
pub use retry::*;
