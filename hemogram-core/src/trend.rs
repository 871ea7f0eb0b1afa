//! Direction of change between two consecutive windows.

use serde::{Deserialize, Serialize};

use crate::Analyte;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendClassification {
    Rising,
    Falling,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendResult {
    pub analyte: Analyte,
    pub percent_variation: Option<f64>,
    pub classification: TrendClassification,
}

impl TrendResult {
    pub fn between(
        analyte: Analyte,
        current_mean: Option<f64>,
        previous_mean: Option<f64>,
        stability_margin_percent: f64,
    ) -> Self {
        let (percent_variation, classification) =
            classify(current_mean, previous_mean, stability_margin_percent);
        Self {
            analyte,
            percent_variation,
            classification,
        }
    }
}

/// Percent variation of `current` relative to `previous`, and its direction.
///
/// Missing means and a zero previous mean give no variation and
/// [`TrendClassification::InsufficientData`].
pub fn classify(
    current_mean: Option<f64>,
    previous_mean: Option<f64>,
    stability_margin_percent: f64,
) -> (Option<f64>, TrendClassification) {
    let (Some(current), Some(previous)) = (current_mean, previous_mean) else {
        return (None, TrendClassification::InsufficientData);
    };
    if previous == 0.0 {
        return (None, TrendClassification::InsufficientData);
    }

    let variation = (current - previous) / previous * 100.0;
    let classification = if variation > stability_margin_percent {
        TrendClassification::Rising
    } else if variation < -stability_margin_percent {
        TrendClassification::Falling
    } else {
        TrendClassification::Stable
    };

    (Some(variation), classification)
}
