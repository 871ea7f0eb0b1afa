//! Closed set of document encodings the normalizer understands.

use hemogram_core::NormalizationError;
use serde_json::Value;

use crate::identity::has_embedded_patient;

/// Encoding of a raw document, detected by trying each predicate in
/// declaration order and taking the first that matches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DocumentShape<'a> {
    /// `Bundle` whose entries are independent observations.
    Container { entries: &'a [Value] },
    /// Observation with analytes spread over `component` entries.
    WithComponents {
        observation: &'a Value,
        components: &'a [Value],
    },
    /// Observation with one code and one top-level value.
    Flat { observation: &'a Value },
    /// Observation embedding the patient in `contained`.
    InlineIdentity { observation: &'a Value },
}

type Detector = for<'b> fn(&'b Value) -> Option<DocumentShape<'b>>;

const DOCUMENT_DETECTORS: [Detector; 4] = [
    as_container,
    as_with_components,
    as_flat,
    as_inline_identity,
];

const OBSERVATION_DETECTORS: [Detector; 3] = [as_with_components, as_flat, as_inline_identity];

impl<'a> DocumentShape<'a> {
    /// Detect the shape of a top-level document.
    pub fn detect(document: &'a Value) -> Result<Self, NormalizationError> {
        match resource_type(document) {
            None => Err(NormalizationError::MissingResourceType),
            Some("Bundle" | "Observation") => DOCUMENT_DETECTORS
                .iter()
                .find_map(|detect| detect(document))
                .ok_or(NormalizationError::NoAnalytes),
            Some(other) => Err(NormalizationError::UnsupportedResource(other.to_string())),
        }
    }

    /// Detect the shape of a sub-document inside a container. Containers do
    /// not nest.
    pub fn detect_observation(resource: &'a Value) -> Result<Self, NormalizationError> {
        match resource_type(resource) {
            None => Err(NormalizationError::MissingResourceType),
            Some("Observation") => OBSERVATION_DETECTORS
                .iter()
                .find_map(|detect| detect(resource))
                .ok_or(NormalizationError::NoAnalytes),
            Some(other) => Err(NormalizationError::UnsupportedResource(other.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DocumentShape::Container { .. } => "container",
            DocumentShape::WithComponents { .. } => "with_components",
            DocumentShape::Flat { .. } => "flat",
            DocumentShape::InlineIdentity { .. } => "inline_identity",
        }
    }
}

pub(crate) fn resource_type(resource: &Value) -> Option<&str> {
    resource.get("resourceType").and_then(Value::as_str)
}

fn is_observation(resource: &Value) -> bool {
    resource_type(resource) == Some("Observation")
}

fn as_container(document: &Value) -> Option<DocumentShape<'_>> {
    if resource_type(document) != Some("Bundle") {
        return None;
    }
    let entries = document.get("entry")?.as_array()?;
    Some(DocumentShape::Container { entries })
}

fn as_with_components(document: &Value) -> Option<DocumentShape<'_>> {
    if !is_observation(document) || has_embedded_patient(document) {
        return None;
    }
    let components = document.get("component")?.as_array()?;
    if components.is_empty() {
        return None;
    }
    Some(DocumentShape::WithComponents {
        observation: document,
        components,
    })
}

fn as_flat(document: &Value) -> Option<DocumentShape<'_>> {
    if !is_observation(document) || has_embedded_patient(document) {
        return None;
    }
    document.get("valueQuantity")?.as_object()?;
    Some(DocumentShape::Flat {
        observation: document,
    })
}

fn as_inline_identity(document: &Value) -> Option<DocumentShape<'_>> {
    if !is_observation(document) || !has_embedded_patient(document) {
        return None;
    }
    Some(DocumentShape::InlineIdentity {
        observation: document,
    })
}
