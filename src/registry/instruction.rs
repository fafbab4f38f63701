//! Pending registrar instructions
//!
//! The registry never talks to the chain. Each mutation can be described as
//! a `PendingInstruction`, which an `InstructionEncoder` turns into bytes for
//! whatever submits it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::DomainRecord;
use crate::crypto::Address;

/// Registrar opcodes
pub const OP_CREATE_REVERSE: u8 = 12;
pub const OP_CREATE: u8 = 13;
pub const OP_UPDATE_METADATA: u8 = 14;
pub const OP_DELETE: u8 = 17;

/// An instruction that would be sent to the registrar program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingInstruction {
    /// Create the name account (and its reverse entry) for a new domain
    Create {
        name: String,
        owner: Address,
        name_account: Address,
        reverse_account: Address,
        parent_account: Option<Address>,
        metadata_url: Option<String>,
        /// Registration price in schedule units
        price: u64,
    },
    /// Create only the reverse-lookup account
    CreateReverse {
        name: String,
        reverse_account: Address,
        parent_account: Option<Address>,
        fee_payer: Address,
    },
    /// Replace or clear the metadata URL
    UpdateMetadata {
        name: String,
        reverse_account: Address,
        owner: Address,
        metadata_url: Option<String>,
    },
    /// Close both accounts
    Delete {
        name_account: Address,
        reverse_account: Address,
        owner: Address,
    },
}

impl PendingInstruction {
    pub fn for_registration(
        record: &DomainRecord,
        parent_account: Option<Address>,
        price: u64,
    ) -> Self {
        PendingInstruction::Create {
            name: record.label().to_string(),
            owner: record.owner,
            name_account: record.address,
            reverse_account: record.reverse_address,
            parent_account,
            metadata_url: record.metadata_url.clone(),
            price,
        }
    }

    pub fn for_reverse(record: &DomainRecord, parent_account: Option<Address>, fee_payer: Address) -> Self {
        PendingInstruction::CreateReverse {
            name: record.name.clone(),
            reverse_account: record.reverse_address,
            parent_account,
            fee_payer,
        }
    }

    pub fn for_metadata_update(record: &DomainRecord) -> Self {
        PendingInstruction::UpdateMetadata {
            name: record.name.clone(),
            reverse_account: record.reverse_address,
            owner: record.owner,
            metadata_url: record.metadata_url.clone(),
        }
    }

    pub fn for_deletion(record: &DomainRecord) -> Self {
        PendingInstruction::Delete {
            name_account: record.address,
            reverse_account: record.reverse_address,
            owner: record.owner,
        }
    }

    pub fn opcode(&self) -> u8 {
        match self {
            PendingInstruction::Create { .. } => OP_CREATE,
            PendingInstruction::CreateReverse { .. } => OP_CREATE_REVERSE,
            PendingInstruction::UpdateMetadata { .. } => OP_UPDATE_METADATA,
            PendingInstruction::Delete { .. } => OP_DELETE,
        }
    }

    /// Accounts the instruction writes to
    pub fn writable_accounts(&self) -> Vec<Address> {
        match self {
            PendingInstruction::Create {
                name_account,
                reverse_account,
                owner,
                ..
            } => vec![*name_account, *reverse_account, *owner],
            PendingInstruction::CreateReverse {
                reverse_account,
                parent_account,
                fee_payer,
                ..
            } => {
                let mut accounts = vec![*reverse_account, *fee_payer];
                accounts.extend(parent_account);
                accounts
            }
            PendingInstruction::UpdateMetadata {
                reverse_account,
                owner,
                ..
            } => vec![*reverse_account, *owner],
            PendingInstruction::Delete {
                name_account,
                reverse_account,
                ..
            } => vec![*name_account, *reverse_account],
        }
    }

    /// Account that must sign the instruction
    pub fn signer(&self) -> Address {
        match self {
            PendingInstruction::Create { owner, .. }
            | PendingInstruction::UpdateMetadata { owner, .. }
            | PendingInstruction::Delete { owner, .. } => *owner,
            PendingInstruction::CreateReverse { fee_payer, .. } => *fee_payer,
        }
    }
}

/// Encoding errors
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("Empty instruction data")]
    Empty,
    #[error("Opcode mismatch: header {header}, body {body}")]
    OpcodeMismatch { header: u8, body: u8 },
}

/// Turns pending instructions into wire bytes
pub trait InstructionEncoder {
    fn encode(&self, instruction: &PendingInstruction) -> Result<Vec<u8>, EncodeError>;
    fn decode(&self, data: &[u8]) -> Result<PendingInstruction, EncodeError>;
}

/// Opcode byte followed by the bincode body
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeEncoder;

impl InstructionEncoder for BincodeEncoder {
    fn encode(&self, instruction: &PendingInstruction) -> Result<Vec<u8>, EncodeError> {
        let body = bincode::serialize(instruction)?;
        let mut data = Vec::with_capacity(body.len() + 1);
        data.push(instruction.opcode());
        data.extend_from_slice(&body);
        Ok(data)
    }

    fn decode(&self, data: &[u8]) -> Result<PendingInstruction, EncodeError> {
        let (&header, body) = data.split_first().ok_or(EncodeError::Empty)?;
        let instruction: PendingInstruction = bincode::deserialize(body)?;
        if instruction.opcode() != header {
            return Err(EncodeError::OpcodeMismatch {
                header,
                body: instruction.opcode(),
            });
        }
        Ok(instruction)
    }
}
