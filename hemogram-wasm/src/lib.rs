//! Framework-neutral WASM <-> JavaScript bridge.

use hemogram_core::{
    analyze, classify, CanonicalHemogramRecord, DeviationReport, MonitorConfig, MonitorError,
    NormalizationError, TrendClassification,
};
use hemogram_fhir::HemogramNormalizer;
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

#[derive(Deserialize, Default)]
struct JsMonitorConfig {
    #[serde(default)]
    fallback_region: Option<String>,
    #[serde(default)]
    stability_margin_percent: Option<f64>,
    #[serde(default)]
    collective_risk_threshold: Option<f64>,
    #[serde(default)]
    default_window_hours: Option<u32>,
    #[serde(default)]
    query_timeout_ms: Option<u64>,
}

impl From<JsMonitorConfig> for MonitorConfig {
    fn from(cfg: JsMonitorConfig) -> Self {
        let mut base = MonitorConfig::default();
        if let Some(region) = cfg.fallback_region {
            base.fallback_region = region;
        }
        if let Some(margin) = cfg.stability_margin_percent {
            base.stability_margin_percent = margin;
        }
        if let Some(threshold) = cfg.collective_risk_threshold {
            base.collective_risk_threshold = threshold;
        }
        if let Some(hours) = cfg.default_window_hours {
            base.default_window_hours = hours;
        }
        if let Some(timeout) = cfg.query_timeout_ms {
            base.query_timeout_ms = timeout;
        }
        base
    }
}

/// Normalized record together with its deviation analysis.
#[derive(Serialize)]
struct AnalyzedRecord {
    record: CanonicalHemogramRecord,
    analysis: DeviationReport,
}

#[derive(Serialize)]
struct TrendOutcome {
    percent_variation: Option<f64>,
    classification: TrendClassification,
}

#[wasm_bindgen]
pub fn normalize_document(document: JsValue, config: Option<JsValue>) -> Result<JsValue, JsValue> {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let document = from_value::<serde_json::Value>(document)
        .map_err(|err| JsValue::from_str(&format!("cannot read JSON document: {err}")))?;
    let cfg = read_config(config)?;

    let analyzed = analyze_document(&document, &cfg)
        .map_err(|err| JsValue::from_str(&format_normalization_error(err)))?;

    to_value(&analyzed).map_err(|err| JsValue::from_str(&format!("cannot serialize record: {err}")))
}

#[wasm_bindgen]
pub fn classify_trend(
    current_mean: Option<f64>,
    previous_mean: Option<f64>,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    let cfg = read_config(config)?;
    let (percent_variation, classification) =
        classify(current_mean, previous_mean, cfg.stability_margin_percent);

    to_value(&TrendOutcome {
        percent_variation,
        classification,
    })
    .map_err(|err| JsValue::from_str(&format!("cannot serialize trend: {err}")))
}

fn read_config(config: Option<JsValue>) -> Result<MonitorConfig, JsValue> {
    let cfg = match config {
        Some(js_cfg) if !js_cfg.is_undefined() && !js_cfg.is_null() => {
            let cfg: JsMonitorConfig = from_value(js_cfg)
                .map_err(|err| JsValue::from_str(&format!("cannot read config: {err}")))?;
            MonitorConfig::from(cfg)
        }
        _ => MonitorConfig::default(),
    };
    cfg.validate()
        .map_err(|err| JsValue::from_str(&format_monitor_error(err)))?;
    Ok(cfg)
}

fn analyze_document(
    document: &serde_json::Value,
    cfg: &MonitorConfig,
) -> Result<AnalyzedRecord, NormalizationError> {
    let normalizer = HemogramNormalizer::new(cfg);
    let record = normalizer.normalize_value(document)?;
    let analysis = analyze(&record, normalizer.catalog());
    Ok(AnalyzedRecord { record, analysis })
}

fn format_normalization_error(err: NormalizationError) -> String {
    format!("Normalization error: {err}")
}

fn format_monitor_error(err: MonitorError) -> String {
    format!("Configuration error: {err}")
}
