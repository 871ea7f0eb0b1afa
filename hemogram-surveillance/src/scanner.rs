use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use hemogram_core::{
    Analyte, MonitorConfig, MonitorError, RegionalRiskReport, TrendResult,
};

use crate::{RecordQuery, RegionalAggregator};

/// Runs the regional assessment for many regions concurrently and keeps the
/// ones above the collective-risk threshold.
#[derive(Clone)]
pub struct OutbreakScanner {
    aggregator: RegionalAggregator,
    config: MonitorConfig,
}

impl OutbreakScanner {
    pub fn new(query: Arc<dyn RecordQuery>, config: MonitorConfig) -> Result<Self, MonitorError> {
        config.validate()?;
        Ok(Self {
            aggregator: RegionalAggregator::new(query, &config),
            config,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Full report for one region, whether or not it is at risk.
    pub async fn assess_region(&self, region: &str, window_hours: u32) -> RegionalRiskReport {
        self.assess_region_at(region, window_hours, Utc::now()).await
    }

    /// Compares `[now - h, now]` with `[now - 2h, now - h]`.
    pub async fn assess_region_at(
        &self,
        region: &str,
        window_hours: u32,
        now: DateTime<Utc>,
    ) -> RegionalRiskReport {
        let length = Duration::hours(i64::from(window_hours));
        let current_start = window_start_before(now, length);
        let previous_start = window_start_before(current_start, length);

        let (current, previous) = tokio::join!(
            self.aggregator.aggregate(region, current_start, now),
            self.aggregator.aggregate(region, previous_start, current_start),
        );

        let margin = self.config.stability_margin_percent;
        let trend = |analyte: Analyte| {
            TrendResult::between(
                analyte,
                current.mean(analyte),
                previous.mean(analyte),
                margin,
            )
        };
        let platelet_trend = trend(Analyte::Platelets);
        let leukocyte_trend = trend(Analyte::Leukocytes);

        RegionalRiskReport::assemble(
            current,
            platelet_trend,
            leukocyte_trend,
            self.config.collective_risk_threshold,
        )
    }

    pub async fn scan(&self, regions: &[String], window_hours: u32) -> Vec<RegionalRiskReport> {
        self.scan_at(regions, window_hours, Utc::now()).await
    }

    /// Regions at collective risk, in input order. Every region is assessed
    /// on its own task; a region whose task dies is logged and left out.
    pub async fn scan_at(
        &self,
        regions: &[String],
        window_hours: u32,
        now: DateTime<Utc>,
    ) -> Vec<RegionalRiskReport> {
        let tasks = regions.iter().cloned().map(|region| {
            let scanner = self.clone();
            tokio::spawn(async move { scanner.assess_region_at(&region, window_hours, now).await })
        });
        let results = join_all(tasks).await;

        let mut at_risk = Vec::new();
        for (region, result) in regions.iter().zip(results) {
            match result {
                Ok(report) if report.has_collective_risk => {
                    tracing::warn!(
                        region = %region,
                        alert_proportion = report.window.alert_proportion,
                        "collective risk detected"
                    );
                    at_risk.push(report);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(region = %region, error = %err, "region assessment aborted");
                }
            }
        }

        tracing::info!(
            regions = regions.len(),
            at_risk = at_risk.len(),
            window_hours,
            "outbreak scan finished"
        );
        at_risk
    }

    pub async fn scan_known_regions(&self, window_hours: u32) -> Vec<RegionalRiskReport> {
        self.scan_known_regions_at(window_hours, Utc::now()).await
    }

    pub async fn scan_known_regions_at(
        &self,
        window_hours: u32,
        now: DateTime<Utc>,
    ) -> Vec<RegionalRiskReport> {
        match self.aggregator.known_regions().await {
            Ok(regions) => self.scan_at(&regions, window_hours, now).await,
            Err(err) => {
                tracing::warn!(error = %err, "could not list regions, nothing scanned");
                Vec::new()
            }
        }
    }
}

/// `end - length`, clamped to the earliest representable instant.
fn window_start_before(end: DateTime<Utc>, length: Duration) -> DateTime<Utc> {
    end.checked_sub_signed(length)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
