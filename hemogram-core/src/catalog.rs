//! Reference table for the four hemogram analytes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::MonitorError;

/// Code system every lookup code in the catalog belongs to.
pub const LOINC_SYSTEM: &str = "http://loinc.org";

/// Blood-count parameters tracked by the monitor, in analysis order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Analyte {
    Leukocytes,
    Hemoglobin,
    Platelets,
    Hematocrit,
}

impl Analyte {
    pub const ALL: [Analyte; 4] = [
        Analyte::Leukocytes,
        Analyte::Hemoglobin,
        Analyte::Platelets,
        Analyte::Hematocrit,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Analyte::Leukocytes => "Leukocytes",
            Analyte::Hemoglobin => "Hemoglobin",
            Analyte::Platelets => "Platelets",
            Analyte::Hematocrit => "Hematocrit",
        }
    }

    /// Decimal places used for (observed value, range bounds) in messages.
    pub(crate) fn display_precision(self) -> (usize, usize) {
        match self {
            Analyte::Leukocytes => (2, 0),
            Analyte::Hemoglobin => (2, 1),
            Analyte::Platelets => (0, 0),
            Analyte::Hematocrit => (2, 0),
        }
    }

    fn index(self) -> usize {
        match self {
            Analyte::Leukocytes => 0,
            Analyte::Hemoglobin => 1,
            Analyte::Platelets => 2,
            Analyte::Hematocrit => 3,
        }
    }
}

impl fmt::Display for Analyte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Normal range and lookup code of a single analyte.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceRange {
    pub analyte: Analyte,
    pub loinc_code: String,
    pub min: f64,
    pub max: f64,
    /// Documentation only; values are never converted between units.
    pub unit: String,
}

impl ReferenceRange {
    fn new(analyte: Analyte, loinc_code: &str, min: f64, max: f64, unit: &str) -> Self {
        Self {
            analyte,
            loinc_code: loinc_code.to_string(),
            min,
            max,
            unit: unit.to_string(),
        }
    }

    /// Inclusive on both bounds.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn is_below(&self, value: f64) -> bool {
        value < self.min
    }
}

/// Immutable table of the four analytes, indexed by [`Analyte`].
///
/// Serialized as a list of ranges; deserialization goes through
/// [`ReferenceCatalog::from_ranges`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "Vec<ReferenceRange>", into = "Vec<ReferenceRange>")]
pub struct ReferenceCatalog {
    ranges: [ReferenceRange; 4],
}

impl Default for ReferenceCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl ReferenceCatalog {
    /// Adult reference values used by the monitoring service.
    pub fn standard() -> Self {
        Self {
            ranges: [
                ReferenceRange::new(Analyte::Leukocytes, "33747-0", 4_000.0, 11_000.0, "/µL"),
                ReferenceRange::new(Analyte::Hemoglobin, "718-7", 12.0, 17.5, "g/dL"),
                ReferenceRange::new(Analyte::Platelets, "777-3", 150_000.0, 450_000.0, "/µL"),
                ReferenceRange::new(Analyte::Hematocrit, "4544-3", 36.0, 52.0, "%"),
            ],
        }
    }

    /// Build a catalog from custom ranges. Each analyte must appear exactly once.
    pub fn from_ranges(ranges: Vec<ReferenceRange>) -> Result<Self, MonitorError> {
        let mut slots: [Option<ReferenceRange>; 4] = Default::default();
        for range in ranges {
            let slot = &mut slots[range.analyte.index()];
            if slot.is_some() {
                return Err(MonitorError::InvalidConfig(format!(
                    "analyte {} declared more than once",
                    range.analyte
                )));
            }
            *slot = Some(range);
        }

        let [leukocytes, hemoglobin, platelets, hematocrit] = slots;
        let missing = |analyte: Analyte| {
            MonitorError::InvalidConfig(format!("analyte {analyte} missing from catalog"))
        };
        let catalog = Self {
            ranges: [
                leukocytes.ok_or_else(|| missing(Analyte::Leukocytes))?,
                hemoglobin.ok_or_else(|| missing(Analyte::Hemoglobin))?,
                platelets.ok_or_else(|| missing(Analyte::Platelets))?,
                hematocrit.ok_or_else(|| missing(Analyte::Hematocrit))?,
            ],
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Reject contradictory ranges. Meant to run once at startup.
    pub fn validate(&self) -> Result<(), MonitorError> {
        for range in &self.ranges {
            if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
                return Err(MonitorError::InvalidReferenceRange {
                    analyte: range.analyte,
                    min: range.min,
                    max: range.max,
                });
            }
            if range.loinc_code.trim().is_empty() {
                return Err(MonitorError::InvalidConfig(format!(
                    "analyte {} has an empty lookup code",
                    range.analyte
                )));
            }
        }
        Ok(())
    }

    pub fn range(&self, analyte: Analyte) -> &ReferenceRange {
        &self.ranges[analyte.index()]
    }

    pub fn ranges(&self) -> &[ReferenceRange] {
        &self.ranges
    }

    /// Analyte whose lookup code equals `code`, if any.
    pub fn analyte_for_code(&self, code: &str) -> Option<Analyte> {
        self.ranges
            .iter()
            .find(|range| range.loinc_code == code)
            .map(|range| range.analyte)
    }
}

impl TryFrom<Vec<ReferenceRange>> for ReferenceCatalog {
    type Error = MonitorError;

    fn try_from(ranges: Vec<ReferenceRange>) -> Result<Self, Self::Error> {
        Self::from_ranges(ranges)
    }
}

impl From<ReferenceCatalog> for Vec<ReferenceRange> {
    fn from(catalog: ReferenceCatalog) -> Self {
        catalog.ranges.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalog_is_valid() {
        assert!(ReferenceCatalog::standard().validate().is_ok());
    }

    #[test]
    fn lookup_by_code() {
        let catalog = ReferenceCatalog::standard();
        assert_eq!(catalog.analyte_for_code("777-3"), Some(Analyte::Platelets));
        assert_eq!(catalog.analyte_for_code("33747-0"), Some(Analyte::Leukocytes));
        assert_eq!(catalog.analyte_for_code("58410-2"), None);
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let catalog = ReferenceCatalog::standard();
        let platelets = catalog.range(Analyte::Platelets);
        assert!(platelets.contains(150_000.0));
        assert!(platelets.contains(450_000.0));
        assert!(!platelets.contains(149_999.0));
        assert!(platelets.is_below(149_999.0));
    }

    #[test]
    fn contradictory_range_fails_fast() {
        let mut ranges = ReferenceCatalog::standard().ranges().to_vec();
        ranges[1].min = 20.0;
        let err = ReferenceCatalog::from_ranges(ranges).unwrap_err();
        assert!(matches!(
            err,
            MonitorError::InvalidReferenceRange {
                analyte: Analyte::Hemoglobin,
                ..
            }
        ));
    }

    #[test]
    fn missing_analyte_is_rejected() {
        let ranges = ReferenceCatalog::standard().ranges()[..3].to_vec();
        assert!(ReferenceCatalog::from_ranges(ranges).is_err());
    }

    #[test]
    fn duplicate_analyte_is_rejected() {
        let mut ranges = ReferenceCatalog::standard().ranges().to_vec();
        ranges[3] = ranges[0].clone();
        assert!(ReferenceCatalog::from_ranges(ranges).is_err());
    }

    #[test]
    fn deserialized_catalog_is_validated() {
        let mut json = serde_json::to_value(ReferenceCatalog::standard()).unwrap();
        let reloaded: ReferenceCatalog = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(reloaded, ReferenceCatalog::standard());

        json[2]["min"] = serde_json::json!(500_000.0);
        let err = serde_json::from_value::<ReferenceCatalog>(json).unwrap_err();
        assert!(err.to_string().contains("Platelets"));
    }
}
