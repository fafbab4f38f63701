//! Request signatures for mutating RPC methods
//!
//! A mutating call carries `nonce` and `signature` after its arguments. The
//! signature is a Schnorr signature by the acting address over
//! `blake3(tag ‖ method ‖ 0 ‖ json(arguments) ‖ nonce_le)`. Absent optional
//! arguments are signed as JSON `null`. Nonces must strictly increase per
//! address.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

use crate::crypto::{hash_bytes, Address, Hash, PublicKey, SchnorrSignature};
use crate::wallet::KeyPair;

const REQUEST_TAG: &[u8] = b"gns-rpc:v1:";

/// Digest a client signs for `method` called with `args`
pub fn request_digest(method: &str, args: &[Value], nonce: u64) -> Hash {
    let body = Value::Array(args.to_vec()).to_string();
    let mut data = Vec::with_capacity(REQUEST_TAG.len() + method.len() + body.len() + 9);
    data.extend_from_slice(REQUEST_TAG);
    data.extend_from_slice(method.as_bytes());
    data.push(0);
    data.extend_from_slice(body.as_bytes());
    data.extend_from_slice(&nonce.to_le_bytes());
    hash_bytes(&data)
}

/// Hex signature to append to a request's params
pub fn sign_request(method: &str, args: &[Value], nonce: u64, signer: &KeyPair) -> String {
    hex::encode(signer.sign(&request_digest(method, args, nonce)).0)
}

/// Check that `signer` signed this exact call
pub fn verify_request(
    method: &str,
    args: &[Value],
    nonce: u64,
    signer: &Address,
    signature_hex: &str,
) -> Result<(), String> {
    let public_key = PublicKey::from_address(signer)
        .map_err(|_| format!("{} is not a signing key", signer))?;
    let bytes = hex::decode(signature_hex).map_err(|_| "signature is not hex".to_string())?;
    let bytes: [u8; 64] = bytes
        .try_into()
        .map_err(|_| "signature must be 64 bytes".to_string())?;

    if public_key.verify(&request_digest(method, args, nonce), &SchnorrSignature(bytes)) {
        Ok(())
    } else {
        Err(format!("signature does not match {} for {}", signer, method))
    }
}

/// Highest nonce accepted from each address
#[derive(Debug, Default)]
pub struct NonceTracker {
    last: Mutex<HashMap<Address, u64>>,
}

impl NonceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `nonce` if it is above the last one seen from `address`
    pub fn advance(&self, address: &Address, nonce: u64) -> Result<(), String> {
        let mut last = self.last.lock();
        match last.get(address) {
            Some(&seen) if nonce <= seen => Err(format!(
                "nonce {} already used by {} (last {})",
                nonce, address, seen
            )),
            _ => {
                last.insert(*address, nonce);
                Ok(())
            }
        }
    }
}
