use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hemogram_core::{AggregateWindow, MonitorConfig, WindowStats};

use crate::{QueryError, RecordQuery};

/// Turns one store query into an [`AggregateWindow`], bounding the query by
/// the configured timeout.
#[derive(Clone)]
pub struct RegionalAggregator {
    query: Arc<dyn RecordQuery>,
    timeout: Duration,
}

impl RegionalAggregator {
    pub fn new(query: Arc<dyn RecordQuery>, config: &MonitorConfig) -> Self {
        Self {
            query,
            timeout: Duration::from_millis(config.query_timeout_ms),
        }
    }

    pub async fn aggregate(
        &self,
        region: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> AggregateWindow {
        let stats = match self.fetch(region, window_start, window_end).await {
            Ok(stats) => stats,
            Err(err) => {
                tracing::warn!(
                    region = %region,
                    window_start = %window_start,
                    window_end = %window_end,
                    error = %err,
                    "window query failed, treating as no data"
                );
                WindowStats::no_data()
            }
        };
        AggregateWindow::from_stats(region, window_start, window_end, stats)
    }

    /// Known regions, bounded by the same timeout as window queries.
    pub async fn known_regions(&self) -> Result<Vec<String>, QueryError> {
        tokio::time::timeout(self.timeout, self.query.list_known_regions())
            .await
            .map_err(|_| QueryError::Timeout(self.timeout))?
    }

    async fn fetch(
        &self,
        region: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<WindowStats, QueryError> {
        tokio::time::timeout(
            self.timeout,
            self.query
                .query_region_window(region, window_start, window_end),
        )
        .await
        .map_err(|_| QueryError::Timeout(self.timeout))?
    }
}
