//! Patient identity extraction.
//!
//! Name, CPF and phone are taken field by field from, in order: a `Patient`
//! embedded in the observation's `contained` list, the identity the subject
//! reference points at, and finally the "not available" sentinel.

use std::collections::HashMap;

use hemogram_core::{NOT_AVAILABLE, UNKNOWN_PATIENT};
use serde_json::Value;

/// Identifier system of the Brazilian individual taxpayer registry (CPF).
pub const CPF_SYSTEM: &str = "https://fhir.saude.go.gov.br/sid/cpf";

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PatientIdentity {
    pub name: Option<String>,
    pub cpf: Option<String>,
    pub phone: Option<String>,
}

impl PatientIdentity {
    pub fn from_patient(resource: &Value) -> Self {
        Self {
            name: extract_patient_name(resource),
            cpf: extract_cpf(resource.get("identifier")),
            phone: extract_phone(resource),
        }
    }

    /// Fill fields still missing from `fallback`.
    pub fn or(self, fallback: PatientIdentity) -> Self {
        Self {
            name: self.name.or(fallback.name),
            cpf: self.cpf.or(fallback.cpf),
            phone: self.phone.or(fallback.phone),
        }
    }
}

/// Resolved identity with sentinels applied.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedPatient {
    pub id: String,
    pub name: String,
    pub cpf: String,
    pub phone: String,
}

/// `Patient` resources of a container, keyed by `Patient/<id>` and `fullUrl`.
#[derive(Debug, Default)]
pub(crate) struct PatientIndex<'a> {
    by_reference: HashMap<String, &'a Value>,
}

impl<'a> PatientIndex<'a> {
    pub fn from_entries(entries: &'a [Value]) -> Self {
        let mut by_reference = HashMap::new();
        for entry in entries {
            let Some(resource) = entry.get("resource") else {
                continue;
            };
            if resource.get("resourceType").and_then(Value::as_str) != Some("Patient") {
                continue;
            }
            if let Some(id) = resource.get("id").and_then(Value::as_str) {
                by_reference.insert(format!("Patient/{id}"), resource);
            }
            if let Some(full_url) = entry.get("fullUrl").and_then(Value::as_str) {
                by_reference.insert(full_url.to_string(), resource);
            }
        }
        Self { by_reference }
    }

    fn lookup(&self, reference: &str) -> Option<&'a Value> {
        self.by_reference.get(reference).copied()
    }
}

pub(crate) fn resolve_patient(observation: &Value, index: &PatientIndex<'_>) -> ResolvedPatient {
    let subject = observation.get("subject");
    let reference = subject
        .and_then(|subject| subject.get("reference"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|reference| !reference.is_empty());

    let embedded = embedded_patient(observation, reference)
        .map(PatientIdentity::from_patient)
        .unwrap_or_default();

    let mut referenced = PatientIdentity {
        name: subject
            .and_then(|subject| subject.get("display"))
            .and_then(Value::as_str)
            .and_then(non_empty),
        cpf: subject.and_then(|subject| extract_cpf(subject.get("identifier"))),
        phone: None,
    };
    if let Some(resource) = reference.and_then(|reference| index.lookup(reference)) {
        referenced = referenced.or(PatientIdentity::from_patient(resource));
    }

    let identity = embedded.or(referenced);
    let sentinel = |field: Option<String>| field.unwrap_or_else(|| NOT_AVAILABLE.to_string());

    ResolvedPatient {
        id: reference
            .map(patient_key)
            .unwrap_or_else(|| UNKNOWN_PATIENT.to_string()),
        name: sentinel(identity.name),
        cpf: sentinel(identity.cpf),
        phone: sentinel(identity.phone),
    }
}

/// Whether the observation embeds a `Patient` in its `contained` list.
pub(crate) fn has_embedded_patient(observation: &Value) -> bool {
    contained_patients(observation).next().is_some()
}

/// Anchor references (`#id`) select a specific contained patient; otherwise
/// the first contained patient is used.
fn embedded_patient<'a>(observation: &'a Value, reference: Option<&str>) -> Option<&'a Value> {
    if let Some(anchor) = reference.and_then(|reference| reference.strip_prefix('#')) {
        if let Some(patient) = contained_patients(observation)
            .find(|patient| patient.get("id").and_then(Value::as_str) == Some(anchor))
        {
            return Some(patient);
        }
    }
    contained_patients(observation).next()
}

fn contained_patients(observation: &Value) -> impl Iterator<Item = &Value> {
    observation
        .get("contained")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|resource| resource.get("resourceType").and_then(Value::as_str) == Some("Patient"))
}

/// `#p1` -> `p1`, `Patient/p1` -> `p1`, anything else verbatim.
fn patient_key(reference: &str) -> String {
    if let Some(anchor) = reference.strip_prefix('#') {
        return anchor.to_string();
    }
    match reference.split_once('/') {
        Some((kind, id))
            if !kind.is_empty() && kind.chars().all(|c| c.is_ascii_alphabetic()) =>
        {
            id.to_string()
        }
        _ => reference.to_string(),
    }
}

fn extract_patient_name(resource: &Value) -> Option<String> {
    let name = resource.get("name")?.as_array()?.first()?;
    if let Some(text) = name.get("text").and_then(Value::as_str).and_then(non_empty) {
        return Some(text);
    }
    let given = name
        .get("given")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    let family = name.get("family").and_then(Value::as_str).unwrap_or("");
    non_empty(&format!("{given} {family}"))
}

/// CPF-qualified identifier first, then the first identifier carrying a value.
/// Accepts a single identifier object or a list of them.
fn extract_cpf(identifier: Option<&Value>) -> Option<String> {
    let identifiers: Vec<&Value> = match identifier? {
        Value::Array(items) => items.iter().collect(),
        single @ Value::Object(_) => vec![single],
        _ => return None,
    };
    let value_of = |identifier: &&Value| {
        identifier
            .get("value")
            .and_then(Value::as_str)
            .and_then(non_empty)
    };

    identifiers
        .iter()
        .filter(|identifier| identifier.get("system").and_then(Value::as_str) == Some(CPF_SYSTEM))
        .find_map(value_of)
        .or_else(|| identifiers.iter().find_map(value_of))
}

fn extract_phone(resource: &Value) -> Option<String> {
    let telecom = resource.get("telecom")?.as_array()?;
    let value_of = |contact: &Value| {
        contact
            .get("value")
            .and_then(Value::as_str)
            .and_then(non_empty)
    };
    telecom
        .iter()
        .filter(|contact| contact.get("system").and_then(Value::as_str) == Some("phone"))
        .find_map(value_of)
        .or_else(|| telecom.iter().find_map(value_of))
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn resolve(observation: &Value) -> ResolvedPatient {
        resolve_patient(observation, &PatientIndex::default())
    }

    #[test]
    fn direct_reference_strips_resource_type() {
        let patient = resolve(&json!({"subject": {"reference": "Patient/patient-001"}}));
        assert_eq!(patient.id, "patient-001");
        assert_eq!(patient.name, NOT_AVAILABLE);
        assert_eq!(patient.cpf, NOT_AVAILABLE);
        assert_eq!(patient.phone, NOT_AVAILABLE);
    }

    #[test]
    fn missing_reference_is_unknown() {
        let patient = resolve(&json!({"status": "final"}));
        assert_eq!(patient.id, UNKNOWN_PATIENT);
    }

    #[test]
    fn urn_reference_is_kept_verbatim() {
        let patient = resolve(&json!({"subject": {"reference": "urn:uuid:1234"}}));
        assert_eq!(patient.id, "urn:uuid:1234");
    }

    #[test]
    fn subject_identifier_supplies_cpf() {
        let patient = resolve(&json!({
            "subject": {"identifier": {"system": CPF_SYSTEM, "value": "01234567891"}}
        }));
        assert_eq!(patient.id, UNKNOWN_PATIENT);
        assert_eq!(patient.cpf, "01234567891");
    }

    #[test]
    fn embedded_patient_wins_over_referenced_identity() {
        let observation = json!({
            "contained": [{
                "resourceType": "Patient",
                "id": "p1",
                "name": [{"given": ["Maria", "Clara"], "family": "Souza"}],
                "identifier": [
                    {"system": "urn:local", "value": "X-1"},
                    {"system": CPF_SYSTEM, "value": "98765432100"}
                ],
                "telecom": [
                    {"system": "email", "value": "maria@example.org"},
                    {"system": "phone", "value": "+55 62 99999-0000"}
                ]
            }],
            "subject": {
                "reference": "#p1",
                "display": "Someone Else",
                "identifier": {"system": CPF_SYSTEM, "value": "11111111111"}
            }
        });
        let patient = resolve(&observation);
        assert_eq!(patient.id, "p1");
        assert_eq!(patient.name, "Maria Clara Souza");
        assert_eq!(patient.cpf, "98765432100");
        assert_eq!(patient.phone, "+55 62 99999-0000");
    }

    #[test]
    fn referenced_identity_fills_gaps_of_embedded_block() {
        let observation = json!({
            "contained": [{"resourceType": "Patient", "id": "p1", "name": [{"text": "Ana"}]}],
            "subject": {
                "reference": "#p1",
                "identifier": {"system": CPF_SYSTEM, "value": "22222222222"}
            }
        });
        let patient = resolve(&observation);
        assert_eq!(patient.name, "Ana");
        assert_eq!(patient.cpf, "22222222222");
        assert_eq!(patient.phone, NOT_AVAILABLE);
    }

    #[test]
    fn container_patient_entry_is_referenced_identity() {
        let entries = vec![json!({
            "fullUrl": "urn:uuid:abc",
            "resource": {
                "resourceType": "Patient",
                "id": "pat-9",
                "name": [{"given": ["João"], "family": "Lima"}],
                "telecom": [{"system": "phone", "value": "62 3333-4444"}]
            }
        })];
        let index = PatientIndex::from_entries(&entries);

        let by_id = resolve_patient(&json!({"subject": {"reference": "Patient/pat-9"}}), &index);
        assert_eq!(by_id.id, "pat-9");
        assert_eq!(by_id.name, "João Lima");
        assert_eq!(by_id.phone, "62 3333-4444");

        let by_url = resolve_patient(&json!({"subject": {"reference": "urn:uuid:abc"}}), &index);
        assert_eq!(by_url.name, "João Lima");
    }
}
