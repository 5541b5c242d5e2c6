//! Terminology sources

use crate::{ValueSetExpansion, ValueSetKey};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// Expands value sets (the `$expand` operation of a terminology service)
#[async_trait]
pub trait TerminologySource: Send + Sync {
    /// Expansion of the value set identified by `key`
    async fn fetch_expansion(&self, key: &ValueSetKey) -> Result<ValueSetExpansion, SourceError>;
}

/// Terminology source error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("Value set not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid value set: {0}")]
    Invalid(String),
}

/// Source serving expansions held in memory, keyed by canonical URL and
/// version, so several versions of one value set can be held side by side.
///
/// A request for a specific version matches an expansion with that version,
/// then one without a version. An unversioned request matches the
/// unversioned expansion, then the most recent of the held versions (latest
/// expansion timestamp, then highest version text).
#[derive(Debug, Clone, Default)]
pub struct InMemoryTerminologySource {
    expansions: BTreeMap<ValueSetKey, ValueSetExpansion>,
}

impl InMemoryTerminologySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, expansion: ValueSetExpansion) {
        self.expansions.insert(expansion.key(), expansion);
    }

    pub fn with_expansion(mut self, expansion: ValueSetExpansion) -> Self {
        self.insert(expansion);
        self
    }

    /// Load FHIR `ValueSet` resources: a single resource, an array of them, or
    /// a `Bundle` whose entries are value sets.
    pub fn from_fhir_json(text: &str) -> Result<Self, SourceError> {
        let value: Value = serde_json::from_str(text).map_err(|e| SourceError::Invalid(e.to_string()))?;
        let resources: Vec<&Value> = match &value {
            Value::Array(items) => items.iter().collect(),
            Value::Object(_) if value.get("resourceType").and_then(Value::as_str) == Some("Bundle") => value
                .get("entry")
                .and_then(Value::as_array)
                .map(|entries| entries.iter().filter_map(|e| e.get("resource")).collect())
                .unwrap_or_default(),
            _ => vec![&value],
        };

        let mut source = Self::new();
        for resource in resources {
            source.insert(ValueSetExpansion::from_fhir(resource).map_err(SourceError::Invalid)?);
        }
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.expansions.len()
    }

    fn lookup(&self, key: &ValueSetKey) -> Option<&ValueSetExpansion> {
        if let Some(exact) = self.expansions.get(key) {
            return Some(exact);
        }
        let unversioned = ValueSetKey::unversioned(key.url.clone());
        if key.version.is_some() {
            return self.expansions.get(&unversioned);
        }
        self.expansions
            .range(unversioned..)
            .take_while(|(held, _)| held.url == key.url)
            .map(|(_, expansion)| expansion)
            .max_by(|a, b| (a.timestamp, &a.version).cmp(&(b.timestamp, &b.version)))
    }

    pub fn is_empty(&self) -> bool {
        self.expansions.is_empty()
    }
}

#[async_trait]
impl TerminologySource for InMemoryTerminologySource {
    async fn fetch_expansion(&self, key: &ValueSetKey) -> Result<ValueSetExpansion, SourceError> {
        let expansion = self
            .lookup(key)
            .ok_or_else(|| SourceError::NotFound(key.to_string()))?;
        if expansion.version != key.version {
            log::debug!("Serving {} for {key}", expansion.key());
        }
        Ok(expansion.clone())
    }
}
