//! Domain registry
//!
//! Every operation reads through the injected store, so a registry always
//! answers from the latest persisted state even when another session wrote
//! it. Mutations hold the write guard across their whole read-modify-write
//! span; ledger calls never run under the guard.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use super::error::{RegistryError, Result};
use super::{DomainMetadata, DomainRecord, NamePolicy, PendingInstruction, PriceSchedule};
use crate::crypto::Address;
use crate::derivation::AddressDeriver;
use crate::ledger::{LedgerClient, TransferReceipt};
use crate::storage::RegistryStore;
use crate::wallet::KeyPair;

/// Name → owner/address/metadata registry
pub struct DomainRegistry {
    store: Arc<dyn RegistryStore>,
    deriver: AddressDeriver,
    policy: NamePolicy,
    pricing: PriceSchedule,
    lock: RwLock<()>,
}

impl std::fmt::Debug for DomainRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainRegistry")
            .field("deriver", &self.deriver)
            .field("policy", &self.policy)
            .field("pricing", &self.pricing)
            .finish_non_exhaustive()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl DomainRegistry {
    /// Registry with the default derivation scheme and name policy
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self::with_parts(store, AddressDeriver::default(), NamePolicy::default())
    }

    pub fn with_parts(
        store: Arc<dyn RegistryStore>,
        deriver: AddressDeriver,
        policy: NamePolicy,
    ) -> Self {
        Self {
            store,
            deriver,
            policy,
            pricing: PriceSchedule::default(),
            lock: RwLock::new(()),
        }
    }

    pub fn with_pricing(mut self, pricing: PriceSchedule) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn deriver(&self) -> &AddressDeriver {
        &self.deriver
    }

    pub fn policy(&self) -> &NamePolicy {
        &self.policy
    }

    pub fn pricing(&self) -> &PriceSchedule {
        &self.pricing
    }

    /// Registration price of a single label, before it is registered
    pub fn price_for(&self, label: &str) -> Result<u64> {
        let label = self.policy.canonicalize_label(label)?;
        Ok(self.pricing.price(&label))
    }

    /// Register a top-level domain
    ///
    /// Dotted names are refused: `blog.alice` can only come into being
    /// through `register_subdomain` by the owner of `alice`.
    pub fn register(
        &self,
        name: &str,
        owner: Address,
        metadata_url: Option<String>,
    ) -> Result<DomainRecord> {
        let name = self.policy.canonicalize_label(name)?;
        let address = self
            .deriver
            .derive_address(&name, None)
            .map_err(|e| RegistryError::derivation(&name, e))?;

        let _guard = self.lock.write();
        self.insert_record(name, None, owner, address, metadata_url)
    }

    /// Register `label.parent`; only the parent's owner may do this
    pub fn register_subdomain(
        &self,
        label: &str,
        parent_name: &str,
        owner: Address,
        metadata_url: Option<String>,
        requester: &Address,
    ) -> Result<DomainRecord> {
        let label = self.policy.canonicalize_label(label)?;
        let parent_name = self.policy.canonicalize(parent_name)?;

        let _guard = self.lock.write();
        let parent = self.fetch(&parent_name)?;
        if parent.owner != *requester {
            return Err(RegistryError::Unauthorized {
                name: parent.name,
                requester: *requester,
            });
        }

        let name = self
            .policy
            .canonicalize(&format!("{}.{}", label, parent.name))?;
        let address = self
            .deriver
            .derive_address(&label, Some(&parent.address))
            .map_err(|e| RegistryError::derivation(&name, e))?;

        self.insert_record(name, Some(parent.name), owner, address, metadata_url)
    }

    /// Caller must hold the write guard
    fn insert_record(
        &self,
        name: String,
        parent: Option<String>,
        owner: Address,
        address: Address,
        metadata_url: Option<String>,
    ) -> Result<DomainRecord> {
        let reverse_address = self
            .deriver
            .derive_reverse_address(&address, None)
            .map_err(|e| RegistryError::derivation(&name, e))?;

        let now = unix_now();
        let metadata = Some(DomainMetadata::default_profile(&name, now));
        let record = DomainRecord {
            name,
            parent,
            owner,
            address,
            reverse_address,
            metadata_url,
            metadata,
            registered_at: now,
            updated_at: now,
        };

        let inserted = self
            .store
            .insert(&record)
            .map_err(RegistryError::storage(record.name.as_str()))?;
        if !inserted {
            return Err(RegistryError::AlreadyExists { name: record.name });
        }

        info!(
            name = %record.name,
            owner = %record.owner,
            address = %record.address,
            "Domain registered"
        );
        Ok(record)
    }

    /// Forward lookup
    pub fn resolve(&self, name: &str) -> Result<DomainRecord> {
        let name = self.policy.canonicalize(name)?;
        let _guard = self.lock.read();
        let record = self.fetch(&name)?;
        debug!(name = %record.name, address = %record.address, "Resolved domain");
        Ok(record)
    }

    /// Reverse lookup from a reverse-lookup account to its name
    pub fn reverse_resolve(&self, reverse_address: &Address) -> Result<String> {
        let _guard = self.lock.read();
        self.store
            .name_for_reverse(reverse_address)
            .map_err(RegistryError::storage(reverse_address.to_base58()))?
            .ok_or(RegistryError::AddressNotFound {
                address: *reverse_address,
            })
    }

    /// Reverse lookup from a domain's name account
    pub fn lookup_by_address(&self, domain_address: &Address) -> Result<DomainRecord> {
        let reverse = self
            .deriver
            .derive_reverse_address(domain_address, None)
            .map_err(|e| RegistryError::derivation(&domain_address.to_base58(), e))?;

        let _guard = self.lock.read();
        let name = self
            .store
            .name_for_reverse(&reverse)
            .map_err(RegistryError::storage(reverse.to_base58()))?
            .ok_or(RegistryError::AddressNotFound {
                address: *domain_address,
            })?;
        self.fetch(&name)
    }

    /// Replace or clear the metadata URL; owner only
    pub fn update_metadata(
        &self,
        name: &str,
        metadata_url: Option<String>,
        requester: &Address,
    ) -> Result<DomainRecord> {
        let name = self.policy.canonicalize(name)?;

        let _guard = self.lock.write();
        let mut record = self.fetch(&name)?;
        if record.owner != *requester {
            return Err(RegistryError::Unauthorized {
                name: record.name,
                requester: *requester,
            });
        }

        record.metadata_url = metadata_url;
        record.updated_at = unix_now().max(record.registered_at);
        self.store
            .replace(&record)
            .map_err(RegistryError::storage(record.name.as_str()))?;

        info!(
            name = %record.name,
            metadata_url = ?record.metadata_url,
            "Domain metadata updated"
        );
        Ok(record)
    }

    /// Replace or clear the structured profile; owner only
    pub fn update_profile(
        &self,
        name: &str,
        metadata: Option<DomainMetadata>,
        requester: &Address,
    ) -> Result<DomainRecord> {
        let name = self.policy.canonicalize(name)?;

        let _guard = self.lock.write();
        let mut record = self.fetch(&name)?;
        if record.owner != *requester {
            return Err(RegistryError::Unauthorized {
                name: record.name,
                requester: *requester,
            });
        }

        record.metadata = metadata;
        record.updated_at = unix_now().max(record.registered_at);
        self.store
            .replace(&record)
            .map_err(RegistryError::storage(record.name.as_str()))?;

        info!(name = %record.name, cleared = record.metadata.is_none(), "Domain profile updated");
        Ok(record)
    }

    /// Registrar instruction that would create `record` on chain, priced by
    /// its own label
    pub fn registration_instruction(&self, record: &DomainRecord) -> Result<PendingInstruction> {
        let parent_account = match &record.parent {
            Some(parent) => {
                let _guard = self.lock.read();
                Some(self.fetch(parent)?.address)
            }
            None => None,
        };
        let price = self.pricing.price(record.label());
        Ok(PendingInstruction::for_registration(record, parent_account, price))
    }

    /// Remove a domain and its reverse entry; owner only
    pub fn delete(&self, name: &str, requester: &Address) -> Result<DomainRecord> {
        let name = self.policy.canonicalize(name)?;

        let _guard = self.lock.write();
        let record = self.fetch(&name)?;
        if record.owner != *requester {
            return Err(RegistryError::Unauthorized {
                name: record.name,
                requester: *requester,
            });
        }

        let has_children = self
            .store
            .list()
            .map_err(RegistryError::storage(record.name.as_str()))?
            .iter()
            .any(|r| r.parent.as_deref() == Some(record.name.as_str()));
        if has_children {
            return Err(RegistryError::HasSubdomains { name: record.name });
        }

        self.store
            .remove(&record)
            .map_err(RegistryError::storage(record.name.as_str()))?;

        info!(name = %record.name, "Domain deleted");
        Ok(record)
    }

    /// Every record, sorted by name
    pub fn list_all(&self) -> Result<Vec<DomainRecord>> {
        let _guard = self.lock.read();
        self.store.list().map_err(RegistryError::storage("*"))
    }

    pub fn list_by_owner(&self, owner: &Address) -> Result<Vec<DomainRecord>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|r| r.owner == *owner)
            .collect())
    }

    /// Send `amount` from the owner of `from_name` to the owner of `to_name`
    ///
    /// Both names are resolved afresh; nothing is sent to a name that does
    /// not resolve. The registry records nothing about the transfer.
    pub async fn transfer_by_name<L>(
        &self,
        ledger: &L,
        from_name: &str,
        to_name: &str,
        amount: u64,
        signer: &KeyPair,
    ) -> Result<TransferReceipt>
    where
        L: LedgerClient + ?Sized,
    {
        let from = self.resolve(from_name)?;
        let to = self.resolve(to_name)?;

        if from.owner != signer.address {
            return Err(RegistryError::Unauthorized {
                name: from.name,
                requester: signer.address,
            });
        }

        let transaction_id = ledger
            .submit_transfer(&from.owner, &to.owner, amount, signer)
            .await
            .map_err(RegistryError::network(from.name.as_str()))?;
        let status = ledger
            .confirm(&transaction_id)
            .await
            .map_err(RegistryError::network(from.name.as_str()))?;

        info!(
            from = %from.name,
            to = %to.name,
            amount,
            tx = %transaction_id,
            ?status,
            "Transfer by name submitted"
        );

        Ok(TransferReceipt {
            from_name: from.name,
            to_name: to.name,
            from: from.owner,
            to: to.owner,
            amount,
            transaction_id,
            status,
        })
    }

    /// Caller must hold a guard
    fn fetch(&self, name: &str) -> Result<DomainRecord> {
        self.store
            .get(name)
            .map_err(RegistryError::storage(name))?
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ErrorKind, NameCase};
    use crate::storage::MemoryStore;

    fn registry() -> DomainRegistry {
        DomainRegistry::new(Arc::new(MemoryStore::new()))
    }

    fn owner(byte: u8) -> Address {
        Address([byte; 32])
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = registry();
        let record = registry.register("alice", owner(1), None).unwrap();

        let resolved = registry.resolve("alice").unwrap();
        assert_eq!(resolved, record);
        assert_eq!(resolved.owner, owner(1));
        assert_eq!(
            resolved.address,
            registry.deriver().derive_address("alice", None).unwrap()
        );
    }

    #[test]
    fn test_duplicate_registration_leaves_state_unchanged() {
        let registry = registry();
        let first = registry.register("alice", owner(1), None).unwrap();

        let err = registry
            .register("alice", owner(2), Some("https://evil".into()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(registry.resolve("alice").unwrap(), first);
        assert_eq!(registry.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_reverse_round_trip() {
        let registry = registry();
        registry.register("alice", owner(1), None).unwrap();

        let deriver = registry.deriver();
        let forward = deriver.derive_address("alice", None).unwrap();
        let reverse = deriver.derive_reverse_address(&forward, None).unwrap();
        assert_eq!(registry.reverse_resolve(&reverse).unwrap(), "alice");
        assert_eq!(registry.lookup_by_address(&forward).unwrap().name, "alice");
    }

    #[test]
    fn test_update_metadata_owner_only() {
        let registry = registry();
        registry.register("alice", owner(1), None).unwrap();

        let updated = registry
            .update_metadata("alice", Some("https://x/meta.json".into()), &owner(1))
            .unwrap();
        assert_eq!(updated.metadata_url.as_deref(), Some("https://x/meta.json"));
        assert!(updated.updated_at >= updated.registered_at);

        let err = registry
            .update_metadata("alice", Some("https://evil".into()), &owner(2))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(
            registry.resolve("alice").unwrap().metadata_url.as_deref(),
            Some("https://x/meta.json")
        );
    }

    #[test]
    fn test_clear_metadata() {
        let registry = registry();
        registry
            .register("alice", owner(1), Some("https://x/meta.json".into()))
            .unwrap();
        registry.update_metadata("alice", None, &owner(1)).unwrap();
        assert_eq!(registry.resolve("alice").unwrap().metadata_url, None);
    }

    #[test]
    fn test_unknown_names() {
        let registry = registry();
        assert_eq!(
            registry.resolve("nosuchname").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            registry
                .update_metadata("nosuchname", None, &owner(1))
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            registry.reverse_resolve(&owner(9)).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_empty_name_is_invalid() {
        let err = registry().register("", owner(1), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_case_sensitive_by_default() {
        let registry = registry();
        registry.register("Anurag", owner(1), None).unwrap();
        registry.register("anurag", owner(2), None).unwrap();
        assert_eq!(registry.resolve("Anurag").unwrap().owner, owner(1));
        assert_eq!(registry.resolve("anurag").unwrap().owner, owner(2));
    }

    #[test]
    fn test_lowercase_policy_folds_names() {
        let registry = DomainRegistry::with_parts(
            Arc::new(MemoryStore::new()),
            AddressDeriver::default(),
            NamePolicy::new(NameCase::Lowercase, 64),
        );
        registry.register("Anurag", owner(1), None).unwrap();
        assert_eq!(registry.resolve("ANURAG").unwrap().name, "anurag");
        assert_eq!(
            registry
                .register("anurag", owner(2), None)
                .unwrap_err()
                .kind(),
            ErrorKind::AlreadyExists
        );
    }

    #[test]
    fn test_subdomain_registration() {
        let registry = registry();
        let parent = registry.register("alice", owner(1), None).unwrap();

        let err = registry
            .register_subdomain("blog", "alice", owner(2), None, &owner(2))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let sub = registry
            .register_subdomain("blog", "alice", owner(2), None, &owner(1))
            .unwrap();
        assert_eq!(sub.name, "blog.alice");
        assert_eq!(sub.parent.as_deref(), Some("alice"));
        assert_eq!(sub.owner, owner(2));
        assert_eq!(
            sub.address,
            registry
                .deriver()
                .derive_address("blog", Some(&parent.address))
                .unwrap()
        );
        assert_ne!(sub.address, registry.deriver().derive_address("blog", None).unwrap());
    }

    #[test]
    fn test_dotted_top_level_name_cannot_claim_subdomain() {
        let registry = registry();
        registry.register("alice", owner(1), None).unwrap();

        let err = registry.register("blog.alice", owner(2), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            registry.resolve("blog.alice").unwrap_err().kind(),
            ErrorKind::NotFound
        );

        let sub = registry
            .register_subdomain("blog", "alice", owner(1), None, &owner(1))
            .unwrap();
        assert_eq!(registry.resolve("blog.alice").unwrap(), sub);
    }

    #[test]
    fn test_new_domain_gets_default_profile() {
        let registry = registry();
        let record = registry.register("alice", owner(1), None).unwrap();

        let profile = record.metadata.clone().unwrap();
        assert_eq!(profile.name, "alice.gorb");
        assert_eq!(profile.image.as_deref(), Some("https://arweave.net/alice-avatar.png"));
        assert_eq!(
            profile.attribute("Registered"),
            Some(record.registered_at.to_string().as_str())
        );
        assert_eq!(registry.resolve("alice").unwrap().metadata, Some(profile));
    }

    #[test]
    fn test_update_profile_owner_only() {
        let registry = registry();
        registry.register("alice", owner(1), None).unwrap();

        let mut profile = DomainMetadata::default_profile("alice", 0);
        profile.description = Some("builder".into());
        let err = registry
            .update_profile("alice", Some(profile.clone()), &owner(2))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_ne!(registry.resolve("alice").unwrap().metadata, Some(profile.clone()));

        registry
            .update_profile("alice", Some(profile.clone()), &owner(1))
            .unwrap();
        assert_eq!(registry.resolve("alice").unwrap().metadata, Some(profile));

        registry.update_profile("alice", None, &owner(1)).unwrap();
        assert_eq!(registry.resolve("alice").unwrap().metadata, None);
    }

    #[test]
    fn test_price_depends_on_label_length() {
        let registry = registry().with_pricing(PriceSchedule::new(1_000));
        assert_eq!(registry.price_for("abc").unwrap(), 640_000);
        assert_eq!(registry.price_for("alice").unwrap(), 20_000);
        assert_eq!(registry.price_for("a.b").unwrap_err().kind(), ErrorKind::InvalidInput);

        let parent = registry.register("alice", owner(1), None).unwrap();
        let sub = registry
            .register_subdomain("io", "alice", owner(1), None, &owner(1))
            .unwrap();
        match registry.registration_instruction(&sub).unwrap() {
            PendingInstruction::Create {
                name,
                parent_account,
                price,
                ..
            } => {
                assert_eq!(name, "io");
                assert_eq!(parent_account, Some(parent.address));
                assert_eq!(price, 700_000);
            }
            other => panic!("unexpected instruction {:?}", other),
        }
    }

    #[test]
    fn test_delete_removes_both_entries() {
        let registry = registry();
        let record = registry.register("alice", owner(1), None).unwrap();

        assert_eq!(
            registry.delete("alice", &owner(2)).unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
        registry.delete("alice", &owner(1)).unwrap();

        assert_eq!(registry.resolve("alice").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            registry
                .reverse_resolve(&record.reverse_address)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_delete_refuses_parent_with_children() {
        let registry = registry();
        registry.register("alice", owner(1), None).unwrap();
        registry
            .register_subdomain("blog", "alice", owner(1), None, &owner(1))
            .unwrap();

        assert!(matches!(
            registry.delete("alice", &owner(1)),
            Err(RegistryError::HasSubdomains { .. })
        ));
        registry.delete("blog.alice", &owner(1)).unwrap();
        registry.delete("alice", &owner(1)).unwrap();
    }

    #[test]
    fn test_list_is_stable_and_filterable() {
        let registry = registry();
        registry.register("carol", owner(1), None).unwrap();
        registry.register("alice", owner(2), None).unwrap();
        registry.register("bob", owner(1), None).unwrap();

        let first: Vec<String> = registry.list_all().unwrap().into_iter().map(|r| r.name).collect();
        let second: Vec<String> = registry.list_all().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec!["alice", "bob", "carol"]);

        let owned: Vec<String> = registry
            .list_by_owner(&owner(1))
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(owned, vec!["bob", "carol"]);
    }
}
