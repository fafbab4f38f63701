//! GNS (.gorb) Name Service Core Library
//!
//! Deterministic domain registry: program-address derivation, forward and
//! reverse lookup with atomic persistence, and name-addressed transfers
//! delegated to an external ledger.

pub mod config;
pub mod crypto;
pub mod derivation;
pub mod ledger;
pub mod registry;
pub mod rpc;
pub mod storage;
pub mod wallet;

/// Protocol constants - changing any of these changes every derived address
pub mod constants {
    /// Prefix hashed in front of every name
    pub const NAME_HASH_PREFIX: &str = "GNS Name Service";

    /// Marker appended to program-address seeds
    pub const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

    /// Seed for the default registrar program id
    pub const PROGRAM_ID_SEED: &[u8] = b"gns:registrar:program:v1";

    /// Seed for the default root (top-level) domain account
    pub const ROOT_DOMAIN_SEED: &[u8] = b"gns:root:gorb";

    /// Seed for the reverse-lookup class tag
    pub const REVERSE_CLASS_SEED: &[u8] = b"gns:reverse-lookup:v1";

    /// Top-level domain suffix used by the demo scripts
    pub const TLD: &str = "gorb";

    /// Default upper bound on name length (characters)
    pub const DEFAULT_MAX_NAME_LEN: usize = 128;

    /// Base units per whole coin
    pub const UNITS_PER_COIN: u64 = 1_000_000_000;
}
