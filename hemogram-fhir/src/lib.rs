//! FHIR JSON to [`CanonicalHemogramRecord`] normalizer.
//!
//! Accepts a single observation (flat, with components, or with an embedded
//! patient) or a `Bundle` of observations, and extracts the four hemogram
//! analytes by LOINC code.

pub mod identity;
pub mod region;
pub mod shape;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use hemogram_core::{
    Analyte, CanonicalHemogramRecord, MonitorConfig, NormalizationError, ReferenceCatalog,
    LOINC_SYSTEM,
};
use serde_json::Value;
use uuid::Uuid;

use identity::{resolve_patient, PatientIndex};
pub use identity::CPF_SYSTEM;
pub use region::{FallbackRegion, RegionResolver, CNES_SYSTEM};
pub use shape::DocumentShape;
use shape::resource_type;

/// Effective-time fields first, then the issue time.
const TIMESTAMP_FIELDS: [&str; 4] = [
    "effectiveDateTime",
    "effectiveInstant",
    "effectivePeriod",
    "issued",
];

/// Normalize a JSON string with the standard catalog and the configured
/// fallback region.
pub fn normalize_str(
    document_json: &str,
    config: &MonitorConfig,
) -> Result<CanonicalHemogramRecord, NormalizationError> {
    HemogramNormalizer::new(config).normalize_str(document_json)
}

/// Normalize a parsed document with the standard catalog and the configured
/// fallback region.
pub fn normalize_value(
    document: &Value,
    config: &MonitorConfig,
) -> Result<CanonicalHemogramRecord, NormalizationError> {
    HemogramNormalizer::new(config).normalize_value(document)
}

#[derive(Clone)]
pub struct HemogramNormalizer {
    catalog: ReferenceCatalog,
    region: Arc<dyn RegionResolver>,
}

impl HemogramNormalizer {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            catalog: ReferenceCatalog::standard(),
            region: Arc::new(FallbackRegion::new(config.fallback_region.clone())),
        }
    }

    pub fn with_catalog(mut self, catalog: ReferenceCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_region_resolver(mut self, resolver: impl RegionResolver + 'static) -> Self {
        self.region = Arc::new(resolver);
        self
    }

    pub fn catalog(&self) -> &ReferenceCatalog {
        &self.catalog
    }

    pub fn normalize_str(
        &self,
        document_json: &str,
    ) -> Result<CanonicalHemogramRecord, NormalizationError> {
        let document: Value = serde_json::from_str(document_json).map_err(|err| {
            tracing::warn!(error = %err, "document is not valid JSON");
            NormalizationError::Parse(err.to_string())
        })?;
        self.normalize_value(&document)
    }

    pub fn normalize_value(
        &self,
        document: &Value,
    ) -> Result<CanonicalHemogramRecord, NormalizationError> {
        self.normalize_at(document, Utc::now())
    }

    /// Normalize with an explicit clock; `now` is used only when the
    /// document has no usable timestamp.
    pub fn normalize_at(
        &self,
        document: &Value,
        now: DateTime<Utc>,
    ) -> Result<CanonicalHemogramRecord, NormalizationError> {
        let result = self.normalize_document(document, now);
        if let Err(err) = &result {
            let resource_id = document.get("id").and_then(Value::as_str).unwrap_or("-");
            tracing::warn!(
                resource_id,
                error = %err,
                "document rejected"
            );
        }
        result
    }

    /// One result per document; a failing document never affects the others.
    pub fn normalize_batch(
        &self,
        documents: &[Value],
    ) -> Vec<Result<CanonicalHemogramRecord, NormalizationError>> {
        let now = Utc::now();
        documents
            .iter()
            .map(|document| self.normalize_at(document, now))
            .collect()
    }

    fn normalize_document(
        &self,
        document: &Value,
        now: DateTime<Utc>,
    ) -> Result<CanonicalHemogramRecord, NormalizationError> {
        let shape = DocumentShape::detect(document)?;
        tracing::debug!(shape = shape.kind(), "document shape detected");

        match shape {
            DocumentShape::Container { entries } => self.normalize_container(entries, now),
            DocumentShape::WithComponents { observation, .. }
            | DocumentShape::Flat { observation }
            | DocumentShape::InlineIdentity { observation } => {
                let values = self.extract_values(&shape);
                self.build_record(observation, values, &PatientIndex::default(), now)
            }
        }
    }

    /// Identity, time and region come from the first entry that yields an
    /// analyte; analyte values merge across entries, first match wins.
    fn normalize_container(
        &self,
        entries: &[Value],
        now: DateTime<Utc>,
    ) -> Result<CanonicalHemogramRecord, NormalizationError> {
        let patients = PatientIndex::from_entries(entries);
        let mut values = AnalyteValues::default();
        let mut primary: Option<&Value> = None;

        for (position, entry) in entries.iter().enumerate() {
            let resource = entry.get("resource").unwrap_or(entry);
            match resource_type(resource) {
                Some("Observation") => {}
                Some("Patient") => continue,
                other => {
                    tracing::debug!(position, resource_type = ?other, "skipping container entry");
                    continue;
                }
            }

            let shape = match DocumentShape::detect_observation(resource) {
                Ok(shape) => shape,
                Err(NormalizationError::NoAnalytes) => {
                    tracing::debug!(position, "container entry carries no value or components");
                    continue;
                }
                Err(err) => {
                    tracing::warn!(position, error = %err, "skipping unreadable container entry");
                    continue;
                }
            };

            let found = self.extract_values(&shape);
            if found.is_empty() {
                tracing::debug!(position, "container entry carries no hemogram analyte");
                continue;
            }

            primary.get_or_insert(resource);
            values.merge_missing(found);
        }

        let Some(observation) = primary else {
            return Err(NormalizationError::NoAnalytes);
        };
        self.build_record(observation, values, &patients, now)
    }

    fn extract_values(&self, shape: &DocumentShape<'_>) -> AnalyteValues {
        let mut values = AnalyteValues::default();
        match *shape {
            DocumentShape::Container { .. } => {}
            DocumentShape::Flat { observation } => {
                self.collect_value(observation, &mut values);
            }
            DocumentShape::WithComponents {
                observation,
                components,
            } => {
                self.collect_value(observation, &mut values);
                for component in components {
                    self.collect_value(component, &mut values);
                }
            }
            DocumentShape::InlineIdentity { observation } => {
                self.collect_value(observation, &mut values);
                for component in observation
                    .get("component")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                {
                    self.collect_value(component, &mut values);
                }
            }
        }
        values
    }

    /// Record `element`'s value under its analyte unless that analyte
    /// already has one. Units are not checked.
    fn collect_value(&self, element: &Value, values: &mut AnalyteValues) {
        let Some(analyte) = self.analyte_for(element) else {
            return;
        };
        if values.get(analyte).is_some() {
            return;
        }
        match quantity_value(element) {
            Some(value) => {
                tracing::debug!(%analyte, value, "analyte extracted");
                values.set(analyte, value);
            }
            None => tracing::debug!(%analyte, "analyte code without numeric value"),
        }
    }

    /// A coding matches when its code is in the catalog and its system is
    /// LOINC or omitted.
    fn analyte_for(&self, element: &Value) -> Option<Analyte> {
        element
            .get("code")?
            .get("coding")?
            .as_array()?
            .iter()
            .find_map(|coding| {
                let system = coding.get("system").and_then(Value::as_str);
                if system.is_some_and(|system| system != LOINC_SYSTEM) {
                    return None;
                }
                let code = coding.get("code")?.as_str()?;
                self.catalog.analyte_for_code(code.trim())
            })
    }

    fn build_record(
        &self,
        observation: &Value,
        values: AnalyteValues,
        patients: &PatientIndex<'_>,
        now: DateTime<Utc>,
    ) -> Result<CanonicalHemogramRecord, NormalizationError> {
        if values.is_empty() {
            return Err(NormalizationError::NoAnalytes);
        }

        let record_id = observation
            .get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let timestamp = extract_datetime(observation, &TIMESTAMP_FIELDS).unwrap_or_else(|| {
            tracing::warn!(record_id = %record_id, "no usable timestamp, using current time");
            now
        });

        let patient = resolve_patient(observation, patients);
        let region = self.region.resolve(observation);

        tracing::info!(
            record_id = %record_id,
            patient_id = %patient.id,
            region = %region,
            "hemogram normalized"
        );

        Ok(CanonicalHemogramRecord {
            record_id,
            patient_id: patient.id,
            patient_name: patient.name,
            patient_cpf: patient.cpf,
            patient_phone: patient.phone,
            timestamp,
            region,
            leukocytes: values.leukocytes,
            hemoglobin: values.hemoglobin,
            platelets: values.platelets,
            hematocrit: values.hematocrit,
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct AnalyteValues {
    leukocytes: Option<f64>,
    hemoglobin: Option<f64>,
    platelets: Option<f64>,
    hematocrit: Option<f64>,
}

impl AnalyteValues {
    fn slot(&mut self, analyte: Analyte) -> &mut Option<f64> {
        match analyte {
            Analyte::Leukocytes => &mut self.leukocytes,
            Analyte::Hemoglobin => &mut self.hemoglobin,
            Analyte::Platelets => &mut self.platelets,
            Analyte::Hematocrit => &mut self.hematocrit,
        }
    }

    fn get(&self, analyte: Analyte) -> Option<f64> {
        match analyte {
            Analyte::Leukocytes => self.leukocytes,
            Analyte::Hemoglobin => self.hemoglobin,
            Analyte::Platelets => self.platelets,
            Analyte::Hematocrit => self.hematocrit,
        }
    }

    fn set(&mut self, analyte: Analyte, value: f64) {
        *self.slot(analyte) = Some(value);
    }

    fn merge_missing(&mut self, other: AnalyteValues) {
        for analyte in Analyte::ALL {
            let slot = self.slot(analyte);
            if slot.is_none() {
                *slot = other.get(analyte);
            }
        }
    }

    fn is_empty(&self) -> bool {
        Analyte::ALL.iter().all(|analyte| self.get(*analyte).is_none())
    }
}

fn quantity_value(element: &Value) -> Option<f64> {
    let value = element.get("valueQuantity")?.get("value")?;
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|text| text.trim().parse().ok()))
        .filter(|value: &f64| value.is_finite())
}

fn extract_datetime(resource: &Value, fields: &[&str]) -> Option<DateTime<Utc>> {
    for field in fields {
        let Some(value) = resource.get(*field) else {
            continue;
        };

        if let Some(text) = value.as_str() {
            if let Some(dt) = parse_datetime(text) {
                return Some(dt);
            }
        }

        if let Some(obj) = value.as_object() {
            for bound in ["start", "end"] {
                if let Some(dt) = obj.get(bound).and_then(Value::as_str).and_then(parse_datetime) {
                    return Some(dt);
                }
            }
        }
    }
    None
}

/// RFC 3339, offset-less date-time (read as UTC), or a bare date.
fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
