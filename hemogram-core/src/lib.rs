//! Core types for hemogram surveillance: canonical records, reference
//! ranges, deviation findings and regional aggregates.

pub mod catalog;
pub mod deviation;
pub mod report;
pub mod trend;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use catalog::{Analyte, ReferenceCatalog, ReferenceRange, LOINC_SYSTEM};
pub use deviation::{analyze, CombinedCondition, DeviationFinding, DeviationReport};
pub use report::{AggregateWindow, RegionalRiskReport, WindowStats};
pub use trend::{classify, TrendClassification, TrendResult};

/// Placeholder stored for identity fields the document did not carry.
pub const NOT_AVAILABLE: &str = "not available";

/// Patient identifier used when the document has no subject reference.
pub const UNKNOWN_PATIENT: &str = "unknown";

/// Default ± band (percent) inside which a trend is considered stable.
pub const DEFAULT_STABILITY_MARGIN_PERCENT: f64 = 5.0;

/// Default alert proportion a region must exceed to raise collective risk.
pub const DEFAULT_COLLECTIVE_RISK_THRESHOLD: f64 = 0.40;

/// Runtime settings shared by the normalizer, aggregator and scanner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Region assigned when no stronger location signal is present.
    pub fallback_region: String,
    /// Percent variation inside which a trend is reported as stable.
    pub stability_margin_percent: f64,
    /// Alert proportion (0..=1) a region must strictly exceed.
    pub collective_risk_threshold: f64,
    /// Window length used when the caller does not give one.
    pub default_window_hours: u32,
    /// Budget for a single record-store query.
    pub query_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            fallback_region: "Goiânia".to_string(),
            stability_margin_percent: DEFAULT_STABILITY_MARGIN_PERCENT,
            collective_risk_threshold: DEFAULT_COLLECTIVE_RISK_THRESHOLD,
            default_window_hours: 24,
            query_timeout_ms: 5_000,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.fallback_region.trim().is_empty() {
            return Err(MonitorError::InvalidConfig(
                "fallback_region must not be empty".to_string(),
            ));
        }
        if !self.stability_margin_percent.is_finite() || self.stability_margin_percent < 0.0 {
            return Err(MonitorError::InvalidConfig(format!(
                "stability_margin_percent must be a non-negative number, got {}",
                self.stability_margin_percent
            )));
        }
        if !(0.0..=1.0).contains(&self.collective_risk_threshold) {
            return Err(MonitorError::InvalidConfig(format!(
                "collective_risk_threshold must be within [0, 1], got {}",
                self.collective_risk_threshold
            )));
        }
        if self.default_window_hours == 0 {
            return Err(MonitorError::InvalidConfig(
                "default_window_hours must be positive".to_string(),
            ));
        }
        if self.query_timeout_ms == 0 {
            return Err(MonitorError::InvalidConfig(
                "query_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Normalized blood-count observation. Never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalHemogramRecord {
    pub record_id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub patient_cpf: String,
    pub patient_phone: String,
    pub timestamp: DateTime<Utc>,
    pub region: String,
    pub leukocytes: Option<f64>,
    pub hemoglobin: Option<f64>,
    pub platelets: Option<f64>,
    pub hematocrit: Option<f64>,
}

impl CanonicalHemogramRecord {
    pub fn value(&self, analyte: Analyte) -> Option<f64> {
        match analyte {
            Analyte::Leukocytes => self.leukocytes,
            Analyte::Hemoglobin => self.hemoglobin,
            Analyte::Platelets => self.platelets,
            Analyte::Hematocrit => self.hematocrit,
        }
    }

    pub fn has_any_analyte(&self) -> bool {
        Analyte::ALL.iter().any(|analyte| self.value(*analyte).is_some())
    }
}

/// Why a single document could not be turned into a canonical record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizationError {
    #[error("document is not valid JSON: {0}")]
    Parse(String),
    #[error("document does not declare a resourceType")]
    MissingResourceType,
    #[error("unsupported resourceType {0}")]
    UnsupportedResource(String),
    #[error("no hemogram analyte found in document")]
    NoAnalytes,
}

/// Configuration or reference data that must be fixed before startup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MonitorError {
    #[error("reference range for {analyte} is invalid (min {min}, max {max})")]
    InvalidReferenceRange { analyte: Analyte, min: f64, max: f64 },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(MonitorConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{"collective_risk_threshold": 0.25}"#).unwrap();
        assert_eq!(config.collective_risk_threshold, 0.25);
        assert_eq!(config.stability_margin_percent, DEFAULT_STABILITY_MARGIN_PERCENT);
        assert_eq!(config.fallback_region, "Goiânia");
    }

    #[test]
    fn threshold_out_of_bounds_is_rejected() {
        let config = MonitorConfig {
            collective_risk_threshold: 1.5,
            ..MonitorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MonitorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn negative_margin_is_rejected() {
        let config = MonitorConfig {
            stability_margin_percent: -1.0,
            ..MonitorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
