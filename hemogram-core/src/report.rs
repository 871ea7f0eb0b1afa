//! Windowed regional statistics and the risk report built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Analyte, TrendResult};

/// Raw answer of a record-store query for one region and window.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WindowStats {
    pub count: u64,
    /// Records whose platelet count is below the reference minimum.
    pub alert_count: u64,
    pub mean_platelets: Option<f64>,
    pub mean_leukocytes: Option<f64>,
}

impl WindowStats {
    /// Stand-in used when the store could not answer.
    pub fn no_data() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateWindow {
    pub region: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total_count: u64,
    pub alert_count: u64,
    pub alert_proportion: f64,
    pub mean_platelets: Option<f64>,
    pub mean_leukocytes: Option<f64>,
}

impl AggregateWindow {
    pub fn from_stats(
        region: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        stats: WindowStats,
    ) -> Self {
        let alert_proportion = if stats.count == 0 {
            0.0
        } else {
            stats.alert_count as f64 / stats.count as f64
        };

        Self {
            region: region.to_string(),
            window_start,
            window_end,
            total_count: stats.count,
            alert_count: stats.alert_count,
            alert_proportion,
            mean_platelets: stats.mean_platelets,
            mean_leukocytes: stats.mean_leukocytes,
        }
    }

    pub fn mean(&self, analyte: Analyte) -> Option<f64> {
        match analyte {
            Analyte::Platelets => self.mean_platelets,
            Analyte::Leukocytes => self.mean_leukocytes,
            Analyte::Hemoglobin | Analyte::Hematocrit => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionalRiskReport {
    pub region: String,
    pub window: AggregateWindow,
    pub platelet_trend: TrendResult,
    pub leukocyte_trend: TrendResult,
    pub has_collective_risk: bool,
    pub message: String,
}

impl RegionalRiskReport {
    /// `has_collective_risk` is `alert_proportion > risk_threshold`, strictly.
    pub fn assemble(
        window: AggregateWindow,
        platelet_trend: TrendResult,
        leukocyte_trend: TrendResult,
        risk_threshold: f64,
    ) -> Self {
        let has_collective_risk = window.alert_proportion > risk_threshold;
        let percent = window.alert_proportion * 100.0;

        let message = if window.total_count == 0 {
            "No hemograms recorded for this region and period.".to_string()
        } else if has_collective_risk {
            format!(
                "ALERT: {percent:.1}% of hemograms show low platelets. Possible dengue outbreak!"
            )
        } else {
            format!("Situation under control: {percent:.1}% of hemograms with alterations.")
        };

        Self {
            region: window.region.clone(),
            window,
            platelet_trend,
            leukocyte_trend,
            has_collective_risk,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::{TrendClassification, DEFAULT_COLLECTIVE_RISK_THRESHOLD};

    fn bounds() -> (DateTime<Utc>, DateTime<Utc>) {
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        (end - Duration::hours(24), end)
    }

    fn flat_trend(analyte: Analyte) -> TrendResult {
        TrendResult {
            analyte,
            percent_variation: None,
            classification: TrendClassification::InsufficientData,
        }
    }

    fn report_for(count: u64, alert_count: u64) -> RegionalRiskReport {
        let (start, end) = bounds();
        let window = AggregateWindow::from_stats(
            "Setor Bueno",
            start,
            end,
            WindowStats {
                count,
                alert_count,
                mean_platelets: Some(120_000.0),
                mean_leukocytes: Some(3_500.0),
            },
        );
        RegionalRiskReport::assemble(
            window,
            flat_trend(Analyte::Platelets),
            flat_trend(Analyte::Leukocytes),
            DEFAULT_COLLECTIVE_RISK_THRESHOLD,
        )
    }

    #[test]
    fn empty_window_has_zero_proportion() {
        let (start, end) = bounds();
        let window = AggregateWindow::from_stats("Centro", start, end, WindowStats::no_data());
        assert_eq!(window.alert_proportion, 0.0);
        assert_eq!(window.mean_platelets, None);
        assert_eq!(window.mean_leukocytes, None);
    }

    #[test]
    fn three_of_five_is_collective_risk() {
        let report = report_for(5, 3);
        assert!((report.window.alert_proportion - 0.6).abs() < 1e-12);
        assert!(report.has_collective_risk);
        assert_eq!(
            report.message,
            "ALERT: 60.0% of hemograms show low platelets. Possible dengue outbreak!"
        );
    }

    #[test]
    fn exactly_forty_percent_is_not_risk() {
        let report = report_for(5, 2);
        assert!(!report.has_collective_risk);
        assert!(report.message.starts_with("Situation under control: 40.0%"));
    }

    #[test]
    fn empty_region_message() {
        let report = report_for(0, 0);
        assert!(!report.has_collective_risk);
        assert_eq!(
            report.message,
            "No hemograms recorded for this region and period."
        );
    }
}
