//! Region strategies. The normalizer only ever asks "which region does this
//! observation belong to"; swapping the strategy leaves the rest untouched.

use serde_json::Value;

/// Identifier system of the health-facility registry (CNES).
pub const CNES_SYSTEM: &str = "https://fhir.saude.go.gov.br/sid/cnes";

pub trait RegionResolver: Send + Sync {
    fn resolve(&self, observation: &Value) -> String;
}

impl<F> RegionResolver for F
where
    F: Fn(&Value) -> String + Send + Sync,
{
    fn resolve(&self, observation: &Value) -> String {
        self(observation)
    }
}

/// Always answers with the configured region.
///
/// Observations do not carry a usable location today. The performing
/// facility identifier is logged so a facility-to-region table can replace
/// this strategy later.
#[derive(Debug, Clone)]
pub struct FallbackRegion {
    region: String,
}

impl FallbackRegion {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }
}

impl RegionResolver for FallbackRegion {
    fn resolve(&self, observation: &Value) -> String {
        if let Some(cnes) = facility_identifier(observation) {
            tracing::debug!(cnes, "facility identifier present, region mapping not available");
        }
        self.region.clone()
    }
}

/// CNES code of the first performer, when it is qualified by [`CNES_SYSTEM`].
pub fn facility_identifier(observation: &Value) -> Option<&str> {
    let identifier = observation
        .get("performer")?
        .as_array()?
        .first()?
        .get("identifier")?;
    if identifier.get("system").and_then(Value::as_str) != Some(CNES_SYSTEM) {
        return None;
    }
    identifier.get("value").and_then(Value::as_str)
}
