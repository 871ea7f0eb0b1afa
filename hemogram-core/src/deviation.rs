//! Per-record comparison against the reference catalog.

use std::fmt;

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

use crate::{Analyte, CanonicalHemogramRecord, ReferenceCatalog};

/// Multi-analyte patterns that raise an alert of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinedCondition {
    /// Platelets and leukocytes both below their minimum on the same record.
    DenguePattern,
}

impl CombinedCondition {
    pub fn description(self) -> &'static str {
        match self {
            CombinedCondition::DenguePattern => {
                "DENGUE ALERT: low platelets and low leukocytes detected simultaneously"
            }
        }
    }
}

/// One observation about a record, in analysis order.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviationFinding {
    OutOfRange {
        analyte: Analyte,
        observed: f64,
        min: f64,
        max: f64,
        unit: String,
    },
    CombinedAlert(CombinedCondition),
}

impl DeviationFinding {
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DeviationFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviationFinding::OutOfRange {
                analyte,
                observed,
                min,
                max,
                unit,
            } => {
                let (value_digits, bound_digits) = analyte.display_precision();
                write!(
                    f,
                    "{analyte} out of range: {observed:.value_digits$} {unit} (normal: {min:.bound_digits$}-{max:.bound_digits$} {unit})"
                )
            }
            DeviationFinding::CombinedAlert(condition) => f.write_str(condition.description()),
        }
    }
}

impl Serialize for DeviationFinding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DeviationFinding::OutOfRange {
                analyte,
                observed,
                min,
                max,
                unit,
            } => {
                let mut state = serializer.serialize_struct("DeviationFinding", 7)?;
                state.serialize_field("kind", "out_of_range")?;
                state.serialize_field("analyte", analyte)?;
                state.serialize_field("observed", observed)?;
                state.serialize_field("min", min)?;
                state.serialize_field("max", max)?;
                state.serialize_field("unit", unit)?;
                state.serialize_field("message", &self.message())?;
                state.end()
            }
            DeviationFinding::CombinedAlert(condition) => {
                let mut state = serializer.serialize_struct("DeviationFinding", 3)?;
                state.serialize_field("kind", "combined_alert")?;
                state.serialize_field("condition", condition)?;
                state.serialize_field("message", &self.message())?;
                state.end()
            }
        }
    }
}

/// Ordered findings for a record plus the combined-alert flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviationReport {
    pub findings: Vec<DeviationFinding>,
    pub dengue_alert: bool,
}

impl DeviationReport {
    pub fn is_normal(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.findings.iter().map(DeviationFinding::message).collect()
    }
}

/// Compare every present analyte against its range, then check the
/// combined dengue pattern. Range findings fire per analyte; the combined
/// alert needs both platelets and leukocytes below their minimum.
pub fn analyze(record: &CanonicalHemogramRecord, catalog: &ReferenceCatalog) -> DeviationReport {
    let mut findings = Vec::new();

    for analyte in Analyte::ALL {
        let Some(observed) = record.value(analyte) else {
            continue;
        };
        let range = catalog.range(analyte);
        if !range.contains(observed) {
            findings.push(DeviationFinding::OutOfRange {
                analyte,
                observed,
                min: range.min,
                max: range.max,
                unit: range.unit.clone(),
            });
        }
    }

    let low = |analyte: Analyte| {
        record
            .value(analyte)
            .is_some_and(|value| catalog.range(analyte).is_below(value))
    };
    let dengue_alert = low(Analyte::Platelets) && low(Analyte::Leukocytes);

    if dengue_alert {
        tracing::debug!(record_id = %record.record_id, "dengue pattern detected");
        findings.push(DeviationFinding::CombinedAlert(CombinedCondition::DenguePattern));
    }

    DeviationReport {
        findings,
        dengue_alert,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{NOT_AVAILABLE, UNKNOWN_PATIENT};

    fn record(leukocytes: Option<f64>, platelets: Option<f64>) -> CanonicalHemogramRecord {
        CanonicalHemogramRecord {
            record_id: "obs-1".to_string(),
            patient_id: UNKNOWN_PATIENT.to_string(),
            patient_name: NOT_AVAILABLE.to_string(),
            patient_cpf: NOT_AVAILABLE.to_string(),
            patient_phone: NOT_AVAILABLE.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
            region: "Goiânia".to_string(),
            leukocytes,
            hemoglobin: Some(14.2),
            platelets,
            hematocrit: Some(42.5),
        }
    }

    #[test]
    fn low_platelets_alone_do_not_raise_dengue_alert() {
        let report = analyze(
            &record(Some(8_500.0), Some(120_000.0)),
            &ReferenceCatalog::standard(),
        );

        assert!(!report.dengue_alert);
        assert_eq!(report.findings.len(), 1);
        assert!(matches!(
            report.findings[0],
            DeviationFinding::OutOfRange {
                analyte: Analyte::Platelets,
                ..
            }
        ));
    }

    #[test]
    fn low_platelets_and_leukocytes_raise_all_findings_in_order() {
        let report = analyze(
            &record(Some(3_000.0), Some(100_000.0)),
            &ReferenceCatalog::standard(),
        );

        assert!(report.dengue_alert);
        let kinds: Vec<_> = report
            .findings
            .iter()
            .map(|finding| match finding {
                DeviationFinding::OutOfRange { analyte, .. } => Some(*analyte),
                DeviationFinding::CombinedAlert(_) => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![Some(Analyte::Leukocytes), Some(Analyte::Platelets), None]
        );
    }

    #[test]
    fn high_leukocytes_do_not_count_as_low() {
        let report = analyze(
            &record(Some(15_000.0), Some(90_000.0)),
            &ReferenceCatalog::standard(),
        );
        assert!(!report.dengue_alert);
        assert_eq!(report.findings.len(), 2);
    }

    #[test]
    fn missing_values_are_skipped() {
        let report = analyze(&record(None, None), &ReferenceCatalog::standard());
        assert!(report.is_normal());
        assert!(!report.dengue_alert);
    }

    #[test]
    fn messages_carry_value_and_bounds() {
        let report = analyze(
            &record(Some(3_000.0), Some(100_000.0)),
            &ReferenceCatalog::standard(),
        );
        let messages = report.messages();
        assert_eq!(
            messages[0],
            "Leukocytes out of range: 3000.00 /µL (normal: 4000-11000 /µL)"
        );
        assert_eq!(
            messages[1],
            "Platelets out of range: 100000 /µL (normal: 150000-450000 /µL)"
        );
        assert!(messages[2].starts_with("DENGUE ALERT"));
    }

    #[test]
    fn finding_serializes_with_message() {
        let finding = DeviationFinding::OutOfRange {
            analyte: Analyte::Hemoglobin,
            observed: 9.5,
            min: 12.0,
            max: 17.5,
            unit: "g/dL".to_string(),
        };
        let value = serde_json::to_value(&finding).unwrap();
        assert_eq!(value["kind"], "out_of_range");
        assert_eq!(value["analyte"], "hemoglobin");
        assert_eq!(
            value["message"],
            "Hemoglobin out of range: 9.50 g/dL (normal: 12.0-17.5 g/dL)"
        );
    }
}
