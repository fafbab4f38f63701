//! Domain records and the name policy applied before any lookup

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use super::RegistryError;
use crate::constants::{DEFAULT_MAX_NAME_LEN, TLD};
use crate::crypto::Address;

/// A registered domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRecord {
    /// Canonical name (unique key)
    pub name: String,
    /// Canonical name of the parent domain, for subdomains
    #[serde(default)]
    pub parent: Option<String>,
    /// Current controller
    pub owner: Address,
    /// Derived name account
    pub address: Address,
    /// Derived reverse-lookup account
    pub reverse_address: Address,
    /// Off-system metadata pointer
    #[serde(default)]
    pub metadata_url: Option<String>,
    /// Structured profile shown by wallets and explorers
    #[serde(default)]
    pub metadata: Option<DomainMetadata>,
    /// Unix seconds
    pub registered_at: u64,
    /// Unix seconds
    pub updated_at: u64,
}

/// One `trait_type`/`value` pair of a domain profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataAttribute {
    pub trait_type: String,
    pub value: String,
}

impl MetadataAttribute {
    pub fn new(trait_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            trait_type: trait_type.into(),
            value: value.into(),
        }
    }
}

/// Structured domain profile
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DomainMetadata {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub attributes: Vec<MetadataAttribute>,
}

impl DomainMetadata {
    /// Profile a freshly registered domain starts with
    pub fn default_profile(name: &str, registered_at: u64) -> Self {
        Self {
            name: format!("{}.{}", name, TLD),
            description: Some(format!("{}'s .{} domain", name, TLD)),
            image: Some(format!("https://arweave.net/{}-avatar.png", name)),
            attributes: vec![
                MetadataAttribute::new("Role", "User"),
                MetadataAttribute::new("Registered", registered_at.to_string()),
            ],
        }
    }

    pub fn attribute(&self, trait_type: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.trait_type == trait_type)
            .map(|a| a.value.as_str())
    }
}

impl DomainRecord {
    /// The leftmost label for subdomains, the whole name otherwise
    pub fn label(&self) -> &str {
        match &self.parent {
            Some(parent) => self
                .name
                .strip_suffix(parent.as_str())
                .and_then(|rest| rest.strip_suffix('.'))
                .unwrap_or(&self.name),
            None => &self.name,
        }
    }

    pub fn is_subdomain(&self) -> bool {
        self.parent.is_some()
    }
}

/// Case handling for names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameCase {
    /// `Alice` and `alice` are different domains
    #[default]
    Sensitive,
    /// Names are lowercased before hashing and lookup
    Lowercase,
}

/// Validation and normalization applied to every incoming name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamePolicy {
    pub case: NameCase,
    pub max_len: usize,
}

impl Default for NamePolicy {
    fn default() -> Self {
        Self {
            case: NameCase::Sensitive,
            max_len: DEFAULT_MAX_NAME_LEN,
        }
    }
}

impl NamePolicy {
    pub fn new(case: NameCase, max_len: usize) -> Self {
        Self { case, max_len }
    }

    /// Validate `name` and return its canonical form
    ///
    /// Length is counted in grapheme clusters after case folding.
    pub fn canonicalize(&self, name: &str) -> Result<String, RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidInput {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(invalid("name is empty"));
        }
        if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(invalid("contains whitespace or control characters"));
        }
        if name.split('.').any(str::is_empty) {
            return Err(invalid("contains an empty label"));
        }

        let canonical = match self.case {
            NameCase::Sensitive => name.to_string(),
            NameCase::Lowercase => name.to_lowercase(),
        };
        if grapheme_len(&canonical) > self.max_len {
            return Err(invalid(&format!("longer than {} characters", self.max_len)));
        }
        Ok(canonical)
    }

    /// Like `canonicalize`, but for a single label: a top-level name or the
    /// new part of a subdomain
    pub fn canonicalize_label(&self, label: &str) -> Result<String, RegistryError> {
        if label.contains('.') {
            return Err(RegistryError::InvalidInput {
                name: label.to_string(),
                reason: "a single label must not contain '.'; register subdomains under their parent"
                    .to_string(),
            });
        }
        self.canonicalize(label)
    }
}

/// User-perceived character count
pub fn grapheme_len(name: &str) -> usize {
    name.graphemes(true).count()
}
