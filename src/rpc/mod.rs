//! JSON-RPC API Module
//!
//! Provides HTTP interface for external applications to register and
//! resolve domains. Mutating calls must be signed by the acting key.

mod auth;
mod methods;
mod server;

pub use auth::*;
pub use methods::*;
pub use server::*;
