//! Engine configuration

use crate::{MeasureError, MeasureResult};
use octofhir_cqm_model::Interval;
use octofhir_cqm_sql::SqlDialect;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`MeasureEngine`](crate::MeasureEngine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long a fetched value set expansion stays cached (seconds)
    #[serde(default = "default_terminology_ttl")]
    pub terminology_ttl_secs: u64,

    /// Timeout for a single expansion fetch (ms)
    #[serde(default = "default_fetch_timeout")]
    pub terminology_fetch_timeout_ms: u64,

    /// Dialect of compiled SQL
    #[serde(default)]
    pub sql_dialect: SqlDialect,

    /// Measurement period used when a call does not pass one
    #[serde(default)]
    pub measure_period: Option<Interval>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            terminology_ttl_secs: default_terminology_ttl(),
            terminology_fetch_timeout_ms: default_fetch_timeout(),
            sql_dialect: SqlDialect::default(),
            measure_period: None,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(text: &str) -> MeasureResult<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| MeasureError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MeasureResult<()> {
        if self.terminology_fetch_timeout_ms == 0 {
            return Err(MeasureError::Config(
                "terminology_fetch_timeout_ms must be positive".into(),
            ));
        }
        match &self.measure_period {
            Some(period) if period.low > period.high => Err(MeasureError::Config(format!(
                "measure_period starts after it ends: {period}"
            ))),
            _ => Ok(()),
        }
    }

    pub fn terminology_ttl(&self) -> Duration {
        Duration::from_secs(self.terminology_ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.terminology_fetch_timeout_ms)
    }
}

fn default_terminology_ttl() -> u64 {
    86_400
}

fn default_fetch_timeout() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_from_empty_object() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.terminology_ttl(), Duration::from_secs(24 * 60 * 60));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.sql_dialect, SqlDialect::Ansi);
    }

    #[test]
    fn test_full_config() {
        let config = EngineConfig::from_json(
            r#"{
                "terminology_ttl_secs": 60,
                "sql_dialect": "spark",
                "measure_period": {
                    "low": "2024-01-01T00:00:00",
                    "high": "2025-01-01T00:00:00",
                    "highClosed": false
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.terminology_ttl(), Duration::from_secs(60));
        assert_eq!(config.sql_dialect, SqlDialect::Spark);
        let period = config.measure_period.unwrap();
        assert!(period.low_closed);
        assert!(!period.high_closed);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"terminology_fetch_timeout_ms": 0}"#),
            Err(MeasureError::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(
                r#"{"measure_period": {"low": "2025-01-01T00:00:00", "high": "2024-01-01T00:00:00"}}"#
            ),
            Err(MeasureError::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_json("not json"),
            Err(MeasureError::Config(_))
        ));
    }
}
