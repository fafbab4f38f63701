//! Registry module - domain records, name policy, and registrar instructions

mod error;
pub mod instruction;
mod pricing;
mod record;
#[allow(clippy::module_inception)]
mod registry;

pub use error::*;
pub use instruction::{BincodeEncoder, EncodeError, InstructionEncoder, PendingInstruction};
pub use pricing::*;
pub use record::*;
pub use registry::*;
