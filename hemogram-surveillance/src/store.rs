//! In-memory [`RecordQuery`] implementation used by the CLI and tests.

use std::collections::BTreeSet;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hemogram_core::{Analyte, CanonicalHemogramRecord, ReferenceCatalog, WindowStats};

use crate::{QueryError, RecordQuery};

/// Append-only record store backed by an `RwLock`.
#[derive(Debug)]
pub struct InMemoryRecordStore {
    records: RwLock<Vec<CanonicalHemogramRecord>>,
    catalog: ReferenceCatalog,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::with_catalog(ReferenceCatalog::standard())
    }

    /// The catalog's platelet minimum decides which records count as alerts.
    pub fn with_catalog(catalog: ReferenceCatalog) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            catalog,
        }
    }

    pub fn append(&self, record: CanonicalHemogramRecord) -> Result<(), QueryError> {
        self.extend([record])
    }

    pub fn extend(
        &self,
        records: impl IntoIterator<Item = CanonicalHemogramRecord>,
    ) -> Result<(), QueryError> {
        let mut stored = self.records.write().map_err(|_| lock_failed())?;
        stored.extend(records);
        Ok(())
    }

    pub fn len(&self) -> Result<usize, QueryError> {
        let records = self.records.read().map_err(|_| lock_failed())?;
        Ok(records.len())
    }

    pub fn is_empty(&self) -> Result<bool, QueryError> {
        Ok(self.len()? == 0)
    }

    fn window_stats(
        &self,
        region: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<WindowStats, QueryError> {
        let records = self.records.read().map_err(|_| lock_failed())?;
        let platelet_range = self.catalog.range(Analyte::Platelets);

        let mut stats = WindowStats::default();
        let mut platelets = Mean::default();
        let mut leukocytes = Mean::default();

        for record in records.iter().filter(|record| {
            record.region == region && record.timestamp >= start && record.timestamp <= end
        }) {
            stats.count += 1;
            if record
                .platelets
                .is_some_and(|value| platelet_range.is_below(value))
            {
                stats.alert_count += 1;
            }
            platelets.add(record.platelets);
            leukocytes.add(record.leukocytes);
        }

        stats.mean_platelets = platelets.value();
        stats.mean_leukocytes = leukocytes.value();
        Ok(stats)
    }
}

#[async_trait]
impl RecordQuery for InMemoryRecordStore {
    async fn query_region_window(
        &self,
        region: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<WindowStats, QueryError> {
        self.window_stats(region, start, end)
    }

    async fn list_known_regions(&self) -> Result<Vec<String>, QueryError> {
        let records = self.records.read().map_err(|_| lock_failed())?;
        let regions: BTreeSet<&str> = records.iter().map(|record| record.region.as_str()).collect();
        Ok(regions.into_iter().map(str::to_string).collect())
    }
}

fn lock_failed() -> QueryError {
    QueryError::Unavailable("record store lock poisoned".to_string())
}

/// Running arithmetic mean over the values that are present.
#[derive(Debug, Default)]
struct Mean {
    sum: f64,
    count: u64,
}

impl Mean {
    fn add(&mut self, value: Option<f64>) {
        if let Some(value) = value {
            self.sum += value;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use hemogram_core::{NOT_AVAILABLE, UNKNOWN_PATIENT};

    use super::*;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 8, hour, 0, 0).unwrap()
    }

    fn record(
        id: &str,
        region: &str,
        timestamp: DateTime<Utc>,
        platelets: Option<f64>,
        leukocytes: Option<f64>,
    ) -> CanonicalHemogramRecord {
        CanonicalHemogramRecord {
            record_id: id.to_string(),
            patient_id: UNKNOWN_PATIENT.to_string(),
            patient_name: NOT_AVAILABLE.to_string(),
            patient_cpf: NOT_AVAILABLE.to_string(),
            patient_phone: NOT_AVAILABLE.to_string(),
            timestamp,
            region: region.to_string(),
            leukocytes,
            hemoglobin: None,
            platelets,
            hematocrit: None,
        }
    }

    #[tokio::test]
    async fn window_bounds_are_inclusive() {
        let store = InMemoryRecordStore::new();
        store
            .extend([
                record("a", "Goiânia", at(0), Some(100_000.0), None),
                record("b", "Goiânia", at(12), Some(200_000.0), None),
                record("c", "Goiânia", at(12) + Duration::seconds(1), Some(90_000.0), None),
            ])
            .unwrap();

        let stats = store.query_region_window("Goiânia", at(0), at(12)).await.unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.alert_count, 1);
        assert_eq!(stats.mean_platelets, Some(150_000.0));
    }

    #[tokio::test]
    async fn means_skip_missing_values() {
        let store = InMemoryRecordStore::new();
        store
            .extend([
                record("a", "Goiânia", at(1), None, Some(3_000.0)),
                record("b", "Goiânia", at(2), Some(140_000.0), Some(5_000.0)),
                record("c", "Goiânia", at(3), None, None),
            ])
            .unwrap();

        let stats = store.query_region_window("Goiânia", at(0), at(4)).await.unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.alert_count, 1);
        assert_eq!(stats.mean_platelets, Some(140_000.0));
        assert_eq!(stats.mean_leukocytes, Some(4_000.0));
    }

    #[tokio::test]
    async fn platelets_at_minimum_are_not_alerts() {
        let store = InMemoryRecordStore::new();
        store
            .append(record("a", "Goiânia", at(1), Some(150_000.0), None))
            .unwrap();

        let stats = store.query_region_window("Goiânia", at(0), at(2)).await.unwrap();
        assert_eq!(stats.alert_count, 0);
    }

    #[tokio::test]
    async fn empty_region_has_no_means() {
        let store = InMemoryRecordStore::new();
        store
            .append(record("a", "Anápolis", at(1), Some(80_000.0), None))
            .unwrap();

        let stats = store.query_region_window("Goiânia", at(0), at(2)).await.unwrap();
        assert_eq!(stats, WindowStats::no_data());
    }

    #[test]
    fn poisoned_lock_is_reported() {
        let store = std::sync::Arc::new(InMemoryRecordStore::new());
        let writer = std::sync::Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = writer.records.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        assert!(matches!(store.len(), Err(QueryError::Unavailable(_))));
        assert!(store.is_empty().is_err());
    }

    #[tokio::test]
    async fn regions_are_distinct_and_sorted() {
        let store = InMemoryRecordStore::new();
        store
            .extend([
                record("a", "Goiânia", at(1), None, None),
                record("b", "Anápolis", at(1), None, None),
                record("c", "Goiânia", at(2), None, None),
            ])
            .unwrap();

        assert_eq!(
            store.list_known_regions().await.unwrap(),
            vec!["Anápolis".to_string(), "Goiânia".to_string()]
        );
        assert_eq!(store.len(), Ok(3));
    }
}
