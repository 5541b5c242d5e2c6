//! Value set expansions and the per-run resolved snapshot

use crate::{TerminologyError, TerminologyResult};
use chrono::{DateTime, FixedOffset};
use octofhir_cqm_ast::ValueSetRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Canonical URL plus optional business version identifying an expansion
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueSetKey {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ValueSetKey {
    pub fn new(url: impl Into<String>, version: Option<impl Into<String>>) -> Self {
        Self {
            url: url.into(),
            version: version.map(Into::into),
        }
    }

    pub fn unversioned(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            version: None,
        }
    }
}

impl From<&ValueSetRef> for ValueSetKey {
    fn from(vs: &ValueSetRef) -> Self {
        Self {
            url: vs.url.clone(),
            version: vs.version.clone(),
        }
    }
}

impl fmt::Display for ValueSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}|{}", self.url, version),
            None => f.write_str(&self.url),
        }
    }
}

/// Flattened membership of one value set: code system to codes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSetExpansion {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// When the terminology server produced the expansion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<FixedOffset>>,
    /// Member count the server reported, which may exceed the codes listed
    /// when the expansion was paged or truncated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    codes: BTreeMap<String, BTreeSet<String>>,
    /// Display text by system, then code
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    displays: BTreeMap<String, BTreeMap<String, String>>,
}

impl ValueSetExpansion {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn with_code(mut self, system: impl Into<String>, code: impl Into<String>) -> Self {
        self.insert(system, code);
        self
    }

    /// Add a member together with its display text
    pub fn with_concept(
        mut self,
        system: impl Into<String>,
        code: impl Into<String>,
        display: impl Into<String>,
    ) -> Self {
        self.insert_concept(system, code, display);
        self
    }

    pub fn insert(&mut self, system: impl Into<String>, code: impl Into<String>) {
        self.codes.entry(system.into()).or_default().insert(code.into());
    }

    pub fn insert_concept(&mut self, system: impl Into<String>, code: impl Into<String>, display: impl Into<String>) {
        let (system, code) = (system.into(), code.into());
        self.displays
            .entry(system.clone())
            .or_default()
            .insert(code.clone(), display.into());
        self.insert(system, code);
    }

    /// Display text recorded for a member
    pub fn display(&self, system: &str, code: &str) -> Option<&str> {
        self.displays.get(system)?.get(code).map(String::as_str)
    }

    /// Every member as `(system, code, display)`, sorted by system then code
    pub fn concepts(&self) -> impl Iterator<Item = (&str, &str, Option<&str>)> {
        self.codes.iter().flat_map(move |(system, codes)| {
            codes
                .iter()
                .map(move |code| (system.as_str(), code.as_str(), self.display(system, code)))
        })
    }

    /// Whether every member the server counted is listed
    pub fn is_complete(&self) -> bool {
        self.total
            .is_none_or(|total| usize::try_from(total).is_ok_and(|total| total <= self.len()))
    }

    pub fn key(&self) -> ValueSetKey {
        ValueSetKey {
            url: self.url.clone(),
            version: self.version.clone(),
        }
    }

    /// Whether `(system, code)` is a member
    pub fn contains(&self, system: &str, code: &str) -> bool {
        self.codes.get(system).is_some_and(|codes| codes.contains(code))
    }

    /// Codes grouped by system, both in sorted order
    pub fn codes_by_system(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.codes
    }

    /// Number of `(system, code)` members
    pub fn len(&self) -> usize {
        self.codes.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.values().all(BTreeSet::is_empty)
    }

    /// Read a FHIR `ValueSet` resource carrying `expansion.contains`.
    ///
    /// Nested `contains` entries are flattened; entries without a system or
    /// code (grouping headers) are skipped. `expansion.timestamp`,
    /// `expansion.total` and member displays are kept.
    pub fn from_fhir(resource: &Value) -> Result<Self, String> {
        if resource.get("resourceType").and_then(Value::as_str) != Some("ValueSet") {
            return Err("resource is not a ValueSet".to_string());
        }
        let url = resource
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| "ValueSet has no url".to_string())?;
        let mut expansion = Self::new(url);
        expansion.version = resource
            .get("version")
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(text) = resource.pointer("/expansion/timestamp").and_then(Value::as_str) {
            let timestamp = DateTime::parse_from_rfc3339(text)
                .map_err(|err| format!("ValueSet {url} has an invalid expansion.timestamp {text}: {err}"))?;
            expansion.timestamp = Some(timestamp);
        }
        expansion.total = resource.pointer("/expansion/total").and_then(Value::as_u64);

        let contains = resource
            .pointer("/expansion/contains")
            .and_then(Value::as_array)
            .ok_or_else(|| format!("ValueSet {url} has no expansion.contains"))?;
        collect_contains(contains, &mut expansion);
        if !expansion.is_complete() {
            log::warn!(
                "ValueSet {url} expansion lists {} of {} members",
                expansion.len(),
                expansion.total.unwrap_or_default()
            );
        }
        Ok(expansion)
    }
}

fn collect_contains(entries: &[Value], expansion: &mut ValueSetExpansion) {
    for entry in entries {
        let system = entry.get("system").and_then(Value::as_str);
        let code = entry.get("code").and_then(Value::as_str);
        let display = entry.get("display").and_then(Value::as_str);
        match (system, code, display) {
            (Some(system), Some(code), Some(display)) => expansion.insert_concept(system, code, display),
            (Some(system), Some(code), None) => expansion.insert(system, code),
            _ => {}
        }
        if let Some(nested) = entry.get("contains").and_then(Value::as_array) {
            collect_contains(nested, expansion);
        }
    }
}

/// Expansions resolved for one run, read synchronously by both execution
/// paths so they see the same code lists.
#[derive(Debug, Clone, Default)]
pub struct ResolvedTerminology {
    expansions: HashMap<ValueSetKey, Arc<ValueSetExpansion>>,
}

impl ResolvedTerminology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ValueSetKey, expansion: Arc<ValueSetExpansion>) {
        self.expansions.insert(key, expansion);
    }

    /// Add an expansion under its own url and version
    pub fn with_expansion(mut self, expansion: ValueSetExpansion) -> Self {
        self.insert(expansion.key(), Arc::new(expansion));
        self
    }

    pub fn get(&self, key: &ValueSetKey) -> Option<&Arc<ValueSetExpansion>> {
        self.expansions.get(key)
    }

    /// Expansion for `key`, or [`TerminologyError::NotResolved`]
    pub fn expansion(&self, key: &ValueSetKey) -> TerminologyResult<&ValueSetExpansion> {
        self.expansions
            .get(key)
            .map(Arc::as_ref)
            .ok_or_else(|| TerminologyError::NotResolved {
                url: key.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.expansions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expansions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn heart_rate() -> ValueSetExpansion {
        ValueSetExpansion::new("http://example.org/vs/hr")
            .with_code("http://loinc.org", "8867-4")
            .with_code("http://snomed.info/sct", "364075005")
            .with_code("http://loinc.org", "40443-4")
    }

    #[test]
    fn test_contains() {
        let expansion = heart_rate();
        assert!(expansion.contains("http://loinc.org", "8867-4"));
        assert!(!expansion.contains("http://snomed.info/sct", "8867-4"));
        assert!(!expansion.contains("http://loinc.org", "0000-0"));
        assert_eq!(expansion.len(), 3);
    }

    #[test]
    fn test_codes_grouped_and_sorted() {
        let expansion = heart_rate();
        let groups: Vec<(&str, Vec<&str>)> = expansion
            .codes_by_system()
            .iter()
            .map(|(system, codes)| (system.as_str(), codes.iter().map(String::as_str).collect()))
            .collect();
        assert_eq!(
            groups,
            vec![
                ("http://loinc.org", vec!["40443-4", "8867-4"]),
                ("http://snomed.info/sct", vec!["364075005"]),
            ]
        );
    }

    #[test]
    fn test_from_fhir_flattens_nested_contains() {
        let resource = json!({
            "resourceType": "ValueSet",
            "url": "http://example.org/vs/hr",
            "version": "2024",
            "expansion": {
                "contains": [
                    {"system": "http://loinc.org", "code": "8867-4", "display": "Heart rate"},
                    {"display": "Grouping", "contains": [
                        {"system": "http://loinc.org", "code": "40443-4"}
                    ]}
                ]
            }
        });
        let expansion = ValueSetExpansion::from_fhir(&resource).unwrap();
        assert_eq!(expansion.key(), ValueSetKey::new("http://example.org/vs/hr", Some("2024")));
        assert_eq!(expansion.len(), 2);
        assert!(expansion.contains("http://loinc.org", "40443-4"));
        assert_eq!(expansion.timestamp, None);
        assert_eq!(expansion.total, None);
    }

    #[test]
    fn test_from_fhir_keeps_expansion_metadata() {
        let resource = json!({
            "resourceType": "ValueSet",
            "url": "http://example.org/vs/hr",
            "expansion": {
                "timestamp": "2024-05-01T09:30:00+02:00",
                "total": 3,
                "contains": [
                    {"system": "http://loinc.org", "code": "8867-4", "display": "Heart rate"},
                    {"system": "http://loinc.org", "code": "40443-4"}
                ]
            }
        });
        let expansion = ValueSetExpansion::from_fhir(&resource).unwrap();
        assert_eq!(
            expansion.timestamp,
            Some(DateTime::parse_from_rfc3339("2024-05-01T07:30:00Z").unwrap())
        );
        assert_eq!(expansion.total, Some(3));
        assert!(!expansion.is_complete());
        assert_eq!(expansion.display("http://loinc.org", "8867-4"), Some("Heart rate"));
        assert_eq!(expansion.display("http://loinc.org", "40443-4"), None);
        assert_eq!(
            expansion.concepts().collect::<Vec<_>>(),
            vec![
                ("http://loinc.org", "40443-4", None),
                ("http://loinc.org", "8867-4", Some("Heart rate")),
            ]
        );
    }

    #[test]
    fn test_from_fhir_rejects_bad_timestamp() {
        let resource = json!({
            "resourceType": "ValueSet",
            "url": "http://example.org/vs/hr",
            "expansion": {"timestamp": "yesterday", "contains": []}
        });
        let err = ValueSetExpansion::from_fhir(&resource).unwrap_err();
        assert!(err.contains("expansion.timestamp"), "{err}");
    }

    #[test]
    fn test_metadata_survives_serde() {
        let expansion = ValueSetExpansion::new("http://example.org/vs/hr")
            .with_total(1)
            .with_concept("http://loinc.org", "8867-4", "Heart rate");
        let text = serde_json::to_string(&expansion).unwrap();
        let back: ValueSetExpansion = serde_json::from_str(&text).unwrap();
        assert_eq!(back, expansion);
        assert!(back.is_complete());
    }

    #[test]
    fn test_from_fhir_requires_expansion() {
        let resource = json!({"resourceType": "ValueSet", "url": "http://example.org/vs/x"});
        assert!(ValueSetExpansion::from_fhir(&resource).is_err());
        assert!(ValueSetExpansion::from_fhir(&json!({"resourceType": "CodeSystem"})).is_err());
    }

    #[test]
    fn test_resolved_lookup() {
        let resolved = ResolvedTerminology::new().with_expansion(heart_rate());
        let key = ValueSetKey::unversioned("http://example.org/vs/hr");
        assert!(resolved.expansion(&key).is_ok());

        let versioned = ValueSetKey::new("http://example.org/vs/hr", Some("1"));
        assert_eq!(
            resolved.expansion(&versioned).unwrap_err(),
            TerminologyError::NotResolved {
                url: "http://example.org/vs/hr|1".into()
            }
        );
    }

    #[test]
    fn test_empty_expansion() {
        let expansion = ValueSetExpansion::new("http://example.org/vs/empty");
        assert!(expansion.is_empty());
        assert_eq!(expansion.len(), 0);
    }
}
