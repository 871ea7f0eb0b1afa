//! Regional aggregation and outbreak scanning over persisted hemogram
//! records.
//!
//! The record store is an external collaborator reached only through the
//! [`RecordQuery`] capability. Query failures and timeouts degrade to "no
//! data" for the affected window; they never fail a scan.

pub mod aggregator;
pub mod scanner;
pub mod store;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hemogram_core::WindowStats;

pub use aggregator::RegionalAggregator;
pub use scanner::OutbreakScanner;
pub use store::InMemoryRecordStore;

/// Why the record store could not answer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("record store did not answer within {0:?}")]
    Timeout(Duration),
}

/// Read-only view over persisted canonical records.
#[async_trait]
pub trait RecordQuery: Send + Sync {
    /// Count, alert count and analyte means for `region` between `start`
    /// and `end`, both inclusive.
    async fn query_region_window(
        &self,
        region: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<WindowStats, QueryError>;

    async fn list_known_regions(&self) -> Result<Vec<String>, QueryError>;
}
