//! RPC Method Implementations
//!
//! Each method corresponds to a JSON-RPC call that external apps can make.
//! Params are positional arrays; addresses travel as base58 strings.
//! Mutating methods end their params with `nonce, signature` (see `auth`).

use crate::crypto::Address;
use crate::derivation::AddressDeriver;
use crate::registry::{grapheme_len, DomainMetadata, DomainRegistry, ErrorKind, RegistryError};
use crate::rpc::auth::{verify_request, NonceTracker};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<Value>,
    pub id: Value,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

/// JSON-RPC Error
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const UNAUTHORIZED: i32 = -32003;
pub const NOT_FOUND: i32 = -32004;
pub const ALREADY_EXISTS: i32 = -32005;
pub const NETWORK_ERROR: i32 = -32006;

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError { code, message }),
            id,
        }
    }

    fn registry_error(id: Value, err: RegistryError) -> Self {
        let code = match err.kind() {
            ErrorKind::InvalidInput => INVALID_PARAMS,
            ErrorKind::AlreadyExists => ALREADY_EXISTS,
            ErrorKind::NotFound => NOT_FOUND,
            ErrorKind::Unauthorized => UNAUTHORIZED,
            ErrorKind::NetworkError => NETWORK_ERROR,
            ErrorKind::StorageError => INTERNAL_ERROR,
        };
        Self::error(id, code, err.to_string())
    }
}

/// RPC Handler State
pub struct RpcState {
    pub registry: Arc<DomainRegistry>,
    nonces: NonceTracker,
}

impl RpcState {
    pub fn new(registry: Arc<DomainRegistry>) -> Self {
        Self {
            registry,
            nonces: NonceTracker::new(),
        }
    }
}

/// Process a JSON-RPC request and return a response
pub fn handle_request(state: &RpcState, request: JsonRpcRequest) -> JsonRpcResponse {
    debug!(method = %request.method, "RPC request");
    let id = request.id;
    let params = Params(request.params);

    let outcome = match request.method.as_str() {
        "registerdomain" => register_domain(state, &params),
        "registersubdomain" => register_subdomain(state, &params),
        "resolvedomain" => resolve_domain(state, &params),
        "reverseresolve" => reverse_resolve(state, &params),
        "lookupaddress" => lookup_address(state, &params),
        "updatemetadata" => update_metadata(state, &params),
        "updateprofile" => update_profile(state, &params),
        "deletedomain" => delete_domain(state, &params),
        "getprice" => get_price(state, &params),
        "listdomains" => list_domains(state, &params),
        "deriveaddress" => derive_address(state, &params),
        "getinfo" => get_info(state),
        _ => {
            return JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            )
        }
    };

    match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(MethodError::Params(message)) => JsonRpcResponse::error(id, INVALID_PARAMS, message),
        Err(MethodError::Unauthorized(message)) => JsonRpcResponse::error(id, UNAUTHORIZED, message),
        Err(MethodError::Registry(err)) => JsonRpcResponse::registry_error(id, err),
    }
}

enum MethodError {
    Params(String),
    Unauthorized(String),
    Registry(RegistryError),
}

impl From<RegistryError> for MethodError {
    fn from(err: RegistryError) -> Self {
        MethodError::Registry(err)
    }
}

type MethodResult = Result<Value, MethodError>;

/// Positional params
struct Params(Option<Value>);

impl Params {
    fn get(&self, index: usize) -> Option<&Value> {
        match &self.0 {
            Some(Value::Array(arr)) => arr.get(index).filter(|v| !v.is_null()),
            Some(v) if index == 0 && !v.is_array() && !v.is_null() => Some(v),
            _ => None,
        }
    }

    fn str(&self, index: usize, what: &str) -> Result<&str, MethodError> {
        self.opt_str(index, what)?
            .ok_or_else(|| MethodError::Params(format!("Invalid params: expected {}", what)))
    }

    fn opt_str(&self, index: usize, what: &str) -> Result<Option<&str>, MethodError> {
        match self.get(index) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(MethodError::Params(format!(
                "Invalid params: {} must be a string",
                what
            ))),
        }
    }

    fn u64(&self, index: usize, what: &str) -> Result<u64, MethodError> {
        self.get(index)
            .and_then(Value::as_u64)
            .ok_or_else(|| MethodError::Params(format!("Invalid params: expected {}", what)))
    }

    fn address(&self, index: usize, what: &str) -> Result<Address, MethodError> {
        let text = self.str(index, what)?;
        parse_address(text, what)
    }

    fn opt_address(&self, index: usize, what: &str) -> Result<Option<Address>, MethodError> {
        self.opt_str(index, what)?
            .map(|text| parse_address(text, what))
            .transpose()
    }
}

/// Verify the `nonce, signature` that follow the first `argc` params
///
/// Returns the signer, read from param `signer_index`.
fn authorize(
    state: &RpcState,
    method: &str,
    params: &Params,
    argc: usize,
    signer_index: usize,
) -> Result<Address, MethodError> {
    let signer = params.address(signer_index, "signer")?;
    let unsigned = |_| MethodError::Unauthorized(format!("{} requires a nonce and signature", method));
    let nonce = params.u64(argc, "nonce").map_err(unsigned)?;
    let signature = params.str(argc + 1, "signature").map_err(unsigned)?;

    let args: Vec<Value> = (0..argc)
        .map(|i| params.get(i).cloned().unwrap_or(Value::Null))
        .collect();
    verify_request(method, &args, nonce, &signer, signature).map_err(MethodError::Unauthorized)?;
    state
        .nonces
        .advance(&signer, nonce)
        .map_err(MethodError::Unauthorized)?;
    Ok(signer)
}

fn parse_address(text: &str, what: &str) -> Result<Address, MethodError> {
    Address::from_str(text)
        .map_err(|e| MethodError::Params(format!("Invalid params: {} {}: {}", what, text, e)))
}

fn to_value<T: Serialize>(value: &T) -> MethodResult {
    serde_json::to_value(value)
        .map_err(|e| MethodError::Params(format!("Unserializable result: {}", e)))
}

/// [name, owner, metadata_url?, nonce, signature]; signed by the owner
fn register_domain(state: &RpcState, params: &Params) -> MethodResult {
    let owner = authorize(state, "registerdomain", params, 3, 1)?;
    let name = params.str(0, "name")?;
    let metadata_url = params.opt_str(2, "metadata_url")?.map(str::to_string);

    let record = state.registry.register(name, owner, metadata_url)?;
    to_value(&record)
}

/// [label, parent_name, owner, requester, metadata_url?, nonce, signature];
/// signed by the requester
fn register_subdomain(state: &RpcState, params: &Params) -> MethodResult {
    let requester = authorize(state, "registersubdomain", params, 5, 3)?;
    let label = params.str(0, "label")?;
    let parent = params.str(1, "parent name")?;
    let owner = params.address(2, "owner")?;
    let metadata_url = params.opt_str(4, "metadata_url")?.map(str::to_string);

    let record = state
        .registry
        .register_subdomain(label, parent, owner, metadata_url, &requester)?;
    to_value(&record)
}

/// [name]
fn resolve_domain(state: &RpcState, params: &Params) -> MethodResult {
    let name = params.str(0, "name")?;
    to_value(&state.registry.resolve(name)?)
}

/// [reverse_address]
fn reverse_resolve(state: &RpcState, params: &Params) -> MethodResult {
    let reverse = params.address(0, "reverse address")?;
    Ok(json!(state.registry.reverse_resolve(&reverse)?))
}

/// [domain_address]
fn lookup_address(state: &RpcState, params: &Params) -> MethodResult {
    let address = params.address(0, "domain address")?;
    to_value(&state.registry.lookup_by_address(&address)?)
}

/// [name, requester, metadata_url?, nonce, signature]; a null url clears it
fn update_metadata(state: &RpcState, params: &Params) -> MethodResult {
    let requester = authorize(state, "updatemetadata", params, 3, 1)?;
    let name = params.str(0, "name")?;
    let metadata_url = params.opt_str(2, "metadata_url")?.map(str::to_string);

    let record = state
        .registry
        .update_metadata(name, metadata_url, &requester)?;
    to_value(&record)
}

/// [name, requester, profile?, nonce, signature]; a null profile clears it
fn update_profile(state: &RpcState, params: &Params) -> MethodResult {
    let requester = authorize(state, "updateprofile", params, 3, 1)?;
    let name = params.str(0, "name")?;
    let profile = params
        .get(2)
        .map(|v| serde_json::from_value::<DomainMetadata>(v.clone()))
        .transpose()
        .map_err(|e| MethodError::Params(format!("Invalid params: profile: {}", e)))?;

    let record = state.registry.update_profile(name, profile, &requester)?;
    to_value(&record)
}

/// [name, requester, nonce, signature]
fn delete_domain(state: &RpcState, params: &Params) -> MethodResult {
    let requester = authorize(state, "deletedomain", params, 2, 1)?;
    let name = params.str(0, "name")?;
    to_value(&state.registry.delete(name, &requester)?)
}

/// [label]
fn get_price(state: &RpcState, params: &Params) -> MethodResult {
    let label = params.str(0, "name")?;
    let registry = &state.registry;
    let canonical = registry.policy().canonicalize_label(label)?;

    Ok(json!({
        "name": canonical,
        "length": grapheme_len(&canonical),
        "price": registry.price_for(&canonical)?,
        "unit": registry.pricing().unit,
    }))
}

/// [owner?]
fn list_domains(state: &RpcState, params: &Params) -> MethodResult {
    let records = match params.opt_address(0, "owner")? {
        Some(owner) => state.registry.list_by_owner(&owner)?,
        None => state.registry.list_all()?,
    };
    to_value(&records)
}

/// [name, parent_address?]
fn derive_address(state: &RpcState, params: &Params) -> MethodResult {
    let raw = params.str(0, "name")?;
    let parent = params.opt_address(1, "parent address")?;
    let registry = &state.registry;

    let name = registry.policy().canonicalize(raw)?;
    let deriver = registry.deriver();
    let invalid = |e| RegistryError::derivation(&name, e);

    let hashed = AddressDeriver::hashed_name(&name).map_err(invalid)?;
    let address = deriver
        .derive_address(&name, parent.as_ref())
        .map_err(invalid)?;
    let reverse = deriver
        .derive_reverse_address(&address, None)
        .map_err(invalid)?;

    Ok(json!({
        "name": name,
        "hashedName": hashed.to_hex(),
        "address": address.to_base58(),
        "reverseAddress": reverse.to_base58(),
    }))
}

fn get_info(state: &RpcState) -> MethodResult {
    let registry = &state.registry;
    let domains = registry.list_all()?.len();
    let scheme = registry.deriver().scheme();

    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "tld": crate::constants::TLD,
        "domains": domains,
        "nameCase": registry.policy().case,
        "maxNameLen": registry.policy().max_len,
        "priceUnit": registry.pricing().unit,
        "programId": scheme.program_id.to_base58(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::auth::sign_request;
    use crate::storage::MemoryStore;
    use crate::wallet::KeyPair;
    use std::sync::atomic::{AtomicU64, Ordering};

    static NONCE: AtomicU64 = AtomicU64::new(1);

    fn state() -> RpcState {
        RpcState::new(Arc::new(DomainRegistry::new(Arc::new(MemoryStore::new()))))
    }

    fn call(state: &RpcState, method: &str, params: Value) -> JsonRpcResponse {
        handle_request(
            state,
            JsonRpcRequest {
                jsonrpc: "2.0".to_string(),
                method: method.to_string(),
                params: Some(params),
                id: json!(1),
            },
        )
    }

    fn signed_with_nonce(
        state: &RpcState,
        method: &str,
        args: Vec<Value>,
        nonce: u64,
        signer: &KeyPair,
    ) -> JsonRpcResponse {
        let signature = sign_request(method, &args, nonce, signer);
        let mut params = args;
        params.push(json!(nonce));
        params.push(json!(signature));
        call(state, method, Value::Array(params))
    }

    fn signed(state: &RpcState, method: &str, args: Vec<Value>, signer: &KeyPair) -> JsonRpcResponse {
        let nonce = NONCE.fetch_add(1, Ordering::SeqCst);
        signed_with_nonce(state, method, args, nonce, signer)
    }

    fn addr(key: &KeyPair) -> Value {
        json!(key.address.to_base58())
    }

    fn register(state: &RpcState, name: &str, owner: &KeyPair) -> JsonRpcResponse {
        signed(state, "registerdomain", vec![json!(name), addr(owner), Value::Null], owner)
    }

    #[test]
    fn test_register_and_resolve() {
        let state = state();
        let alice = KeyPair::generate();
        let resp = signed(
            &state,
            "registerdomain",
            vec![json!("alice"), addr(&alice), json!("https://arweave.net/a.json")],
            &alice,
        );
        assert!(resp.error.is_none());

        let resp = call(&state, "resolvedomain", json!(["alice"]));
        let result = resp.result.unwrap();
        assert_eq!(result["name"], "alice");
        assert_eq!(result["owner"], addr(&alice));
        assert_eq!(result["metadataUrl"], "https://arweave.net/a.json");
        assert_eq!(result["metadata"]["description"], "alice's .gorb domain");
    }

    #[test]
    fn test_error_codes() {
        let state = state();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        register(&state, "alice", &alice);

        let dup = register(&state, "alice", &bob);
        assert_eq!(dup.error.unwrap().code, ALREADY_EXISTS);

        let missing = call(&state, "resolvedomain", json!(["bob"]));
        let err = missing.error.unwrap();
        assert_eq!(err.code, NOT_FOUND);
        assert!(err.message.contains("bob"));

        // properly signed, but not the owner
        let denied = signed(
            &state,
            "updatemetadata",
            vec![json!("alice"), addr(&bob), json!("x")],
            &bob,
        );
        assert_eq!(denied.error.unwrap().code, UNAUTHORIZED);

        let bad = call(&state, "resolvedomain", json!([7]));
        assert_eq!(bad.error.unwrap().code, INVALID_PARAMS);

        let unknown = call(&state, "getblock", json!([]));
        assert_eq!(unknown.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[test]
    fn test_unsigned_or_forged_mutations_rejected() {
        let state = state();
        let alice = KeyPair::generate();
        let mallory = KeyPair::generate();
        register(&state, "alice", &alice);

        // the old unsigned form naming the owner as requester
        let unsigned = call(&state, "deletedomain", json!(["alice", alice.address.to_base58()]));
        assert_eq!(unsigned.error.unwrap().code, UNAUTHORIZED);

        // signed by someone else on the owner's behalf
        let args = vec![json!("alice"), addr(&alice)];
        let forged_sig = sign_request("deletedomain", &args, 1_000_000, &mallory);
        let forged = call(
            &state,
            "deletedomain",
            json!(["alice", alice.address.to_base58(), 1_000_000, forged_sig]),
        );
        assert_eq!(forged.error.unwrap().code, UNAUTHORIZED);

        let forged_update = signed_with_nonce(
            &state,
            "updatemetadata",
            vec![json!("alice"), addr(&alice), json!("https://evil")],
            1_000_001,
            &mallory,
        );
        assert_eq!(forged_update.error.unwrap().code, UNAUTHORIZED);

        let forged_sub = signed_with_nonce(
            &state,
            "registersubdomain",
            vec![json!("pay"), json!("alice"), addr(&mallory), addr(&alice), Value::Null],
            1_000_002,
            &mallory,
        );
        assert_eq!(forged_sub.error.unwrap().code, UNAUTHORIZED);

        let still_there = call(&state, "resolvedomain", json!(["alice"])).result.unwrap();
        assert_eq!(still_there["owner"], addr(&alice));
        assert!(still_there["metadataUrl"].is_null());
        assert!(call(&state, "resolvedomain", json!(["pay.alice"])).error.is_some());
    }

    #[test]
    fn test_replayed_request_rejected() {
        let state = state();
        let alice = KeyPair::generate();
        register(&state, "alice", &alice);

        let args = vec![json!("alice"), addr(&alice), json!("https://x/1.json")];
        let first = signed_with_nonce(&state, "updatemetadata", args.clone(), 50_000, &alice);
        assert!(first.error.is_none());

        let cleared = signed_with_nonce(
            &state,
            "updatemetadata",
            vec![json!("alice"), addr(&alice), Value::Null],
            50_001,
            &alice,
        );
        assert!(cleared.error.is_none());

        let replay = signed_with_nonce(&state, "updatemetadata", args, 50_000, &alice);
        assert_eq!(replay.error.unwrap().code, UNAUTHORIZED);
        let record = call(&state, "resolvedomain", json!(["alice"])).result.unwrap();
        assert!(record["metadataUrl"].is_null());
    }

    #[test]
    fn test_reverse_paths() {
        let state = state();
        let alice = KeyPair::generate();
        let record = register(&state, "alice", &alice).result.unwrap();

        let name = call(&state, "reverseresolve", json!([record["reverseAddress"]]));
        assert_eq!(name.result.unwrap(), json!("alice"));

        let found = call(&state, "lookupaddress", json!([record["address"]]));
        assert_eq!(found.result.unwrap()["name"], "alice");
    }

    #[test]
    fn test_derive_matches_registration() {
        let state = state();
        let alice = KeyPair::generate();
        let derived = call(&state, "deriveaddress", json!(["alice"])).result.unwrap();
        let record = register(&state, "alice", &alice).result.unwrap();
        assert_eq!(derived["address"], record["address"]);
        assert_eq!(derived["reverseAddress"], record["reverseAddress"]);
    }

    #[test]
    fn test_list_and_delete() {
        let state = state();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        register(&state, "bob", &bob);
        register(&state, "alice", &alice);

        let all = call(&state, "listdomains", json!([])).result.unwrap();
        let names: Vec<&str> = all
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["alice", "bob"]);

        let mine = call(&state, "listdomains", json!([addr(&bob)])).result.unwrap();
        assert_eq!(mine.as_array().unwrap().len(), 1);

        let deleted = signed(&state, "deletedomain", vec![json!("bob"), addr(&bob)], &bob);
        assert!(deleted.error.is_none());
        let info = call(&state, "getinfo", json!([])).result.unwrap();
        assert_eq!(info["domains"], 1);
    }

    #[test]
    fn test_subdomain() {
        let state = state();
        let alice = KeyPair::generate();
        let carol = KeyPair::generate();
        register(&state, "alice", &alice);
        let sub = signed(
            &state,
            "registersubdomain",
            vec![json!("pay"), json!("alice"), addr(&carol), addr(&alice), Value::Null],
            &alice,
        );
        assert_eq!(sub.result.unwrap()["name"], "pay.alice");
    }

    #[test]
    fn test_profile_update_and_price() {
        let state = state();
        let alice = KeyPair::generate();
        register(&state, "alice", &alice);

        let profile = json!({
            "name": "alice.gorb",
            "description": "builder",
            "attributes": [{ "trait_type": "Role", "value": "Admin" }],
        });
        let updated = signed(
            &state,
            "updateprofile",
            vec![json!("alice"), addr(&alice), profile],
            &alice,
        );
        let record = updated.result.unwrap();
        assert_eq!(record["metadata"]["description"], "builder");
        assert_eq!(record["metadata"]["attributes"][0]["value"], "Admin");

        let price = call(&state, "getprice", json!(["abc"])).result.unwrap();
        assert_eq!(price["length"], 3);
        assert_eq!(price["price"], 640_000_000u64);

        let dotted = call(&state, "getprice", json!(["a.b"]));
        assert_eq!(dotted.error.unwrap().code, INVALID_PARAMS);
    }
}
