//! Month-partitioned Parquet store on top of `object_store`
//!
//! Layout under the configured prefix:
//!
//! ```text
//! rows/period=month/month=2024-03/<stamp>-<uuid>.parquet
//! tombstones/period=month/month=2024-03/<stamp>-<uuid>.json
//! ```
//!
//! A partition holds every row whose anchor date falls in that calendar
//! month. Rows are never rewritten in place. A delete appends a tombstone,
//! and a row is dead once a tombstone for its coordinate carries a
//! `deleted_at` later than the row's `written_at`. Compaction folds a
//! partition into one file and drops the tombstones it applied.

use super::{ObservationStore, ObservationWriter, ScanRequest};
use crate::clock::WriteClock;
use crate::period::{add_periods, normalize_start, DateRange, PeriodType};
use crate::schema::{Coordinate, MetricKey, Observation};
use crate::Result;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Datelike, NaiveDate};
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const ROWS_DIR: &str = "rows";
const TOMBSTONES_DIR: &str = "tombstones";

/// One period/month partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub period: PeriodType,
    /// First day of the month
    pub month: NaiveDate,
}

impl PartitionKey {
    pub fn new(period: PeriodType, date: NaiveDate) -> Self {
        Self {
            period,
            month: normalize_start(date, PeriodType::Month),
        }
    }

    fn for_row(row: &Observation) -> Self {
        Self::new(row.period, row.date)
    }

    /// Parse `period=<p>/month=<YYYY-MM>` directory names.
    fn parse(period_dir: &str, month_dir: &str) -> Option<Self> {
        let period = period_dir.strip_prefix("period=")?.parse().ok()?;
        let month = month_dir.strip_prefix("month=")?;
        let date = NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d").ok()?;
        Some(Self::new(period, date))
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "period={}/month={:04}-{:02}",
            self.period,
            self.month.year(),
            self.month.month()
        )
    }
}

/// Delete marker for one coordinate.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tombstone {
    key: MetricKey,
    period: PeriodType,
    date: NaiveDate,
    deleted_at: i64,
}

impl Tombstone {
    fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.key.clone(), self.period, self.date)
    }
}

/// Latest tombstone stamp per coordinate within a partition.
type TombstoneIndex = HashMap<Coordinate, i64>;

fn is_dead(row: &Observation, tombstones: &TombstoneIndex) -> bool {
    tombstones
        .get(&row.coordinate())
        .is_some_and(|deleted_at| *deleted_at > row.written_at)
}

/// Outcome of compacting one partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub partition: Option<PartitionKey>,
    pub files_merged: usize,
    pub tombstones_applied: usize,
    pub rows_kept: usize,
    pub rows_dropped: usize,
}

/// Observation store writing Parquet files to any object store backend.
pub struct ParquetStore {
    object_store: Arc<dyn ObjectStore>,
    prefix: String,
    writer: ObservationWriter,
    clock: WriteClock,
}

impl ParquetStore {
    /// Create a store rooted at `prefix` (may be empty).
    pub fn new(object_store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into().trim_matches('/').to_string();
        Ok(Self {
            object_store,
            prefix,
            writer: ObservationWriter::new()?,
            clock: WriteClock::new(),
        })
    }

    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.object_store
    }

    fn path(&self, relative: String) -> Path {
        if self.prefix.is_empty() {
            Path::from(relative)
        } else {
            Path::from(format!("{}/{}", self.prefix, relative))
        }
    }

    fn partition_dir(&self, dir: &str, partition: &PartitionKey) -> Path {
        self.path(format!("{}/{}", dir, partition))
    }

    fn new_file_path(&self, dir: &str, partition: &PartitionKey, stamp: i64, ext: &str) -> Path {
        self.path(format!(
            "{}/{}/{:020}-{}.{}",
            dir,
            partition,
            stamp,
            Uuid::new_v4(),
            ext
        ))
    }

    /// Partitions a scan over `range` at `period` has to visit.
    fn partitions_for(period: PeriodType, range: &DateRange) -> Vec<PartitionKey> {
        if range.is_empty() {
            return Vec::new();
        }
        let last = normalize_start(range.to, PeriodType::Month);
        let mut month = normalize_start(range.from, PeriodType::Month);
        let mut partitions = Vec::new();
        while month <= last {
            partitions.push(PartitionKey { period, month });
            let next = add_periods(month, PeriodType::Month, 1);
            if next <= month {
                break;
            }
            month = next;
        }
        partitions
    }

    async fn list(&self, prefix: &Path) -> Result<Vec<ObjectMeta>> {
        let mut objects: Vec<ObjectMeta> = self
            .object_store
            .list(Some(prefix))
            .try_collect()
            .await?;
        objects.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(objects)
    }

    /// Fetch an object, treating a concurrently removed file as absent.
    async fn fetch(&self, location: &Path) -> Result<Option<Bytes>> {
        match self.object_store.get(location).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { path, .. }) => {
                debug!(path = %path, "Object removed before it could be read");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_rows(&self, files: &[ObjectMeta]) -> Result<Vec<Observation>> {
        let mut rows = Vec::new();
        for meta in files {
            if let Some(bytes) = self.fetch(&meta.location).await? {
                rows.extend(ObservationWriter::read(bytes)?);
            }
        }
        Ok(rows)
    }

    /// Load tombstones and move the clock past every stamp read, so a row
    /// written after this handle has seen a tombstone is never covered by it.
    async fn read_tombstones(&self, files: &[ObjectMeta]) -> Result<TombstoneIndex> {
        let mut index = TombstoneIndex::new();
        for meta in files {
            let Some(bytes) = self.fetch(&meta.location).await? else {
                continue;
            };
            let tombstone: Tombstone = serde_json::from_slice(&bytes)?;
            let deleted_at = tombstone.deleted_at;
            self.clock.observe(deleted_at);
            index
                .entry(tombstone.coordinate())
                .and_modify(|stamp| *stamp = (*stamp).max(deleted_at))
                .or_insert(deleted_at);
        }
        Ok(index)
    }

    async fn partition_tombstones(&self, partition: &PartitionKey) -> Result<TombstoneIndex> {
        let files = self
            .list(&self.partition_dir(TOMBSTONES_DIR, partition))
            .await?;
        self.read_tombstones(&files).await
    }

    async fn write_partition(&self, partition: &PartitionKey, rows: &[Observation]) -> Result<Path> {
        let stamp = rows.iter().map(|r| r.written_at).max().unwrap_or(0);
        let location = self.new_file_path(ROWS_DIR, partition, stamp, "parquet");
        let bytes = self.writer.write(rows)?;
        let size = bytes.len();
        self.object_store
            .put(&location, PutPayload::from(bytes))
            .await?;
        debug!(
            path = %location,
            rows = rows.len(),
            bytes = size,
            "Wrote observation file"
        );
        Ok(location)
    }

    /// Every partition that currently holds row files.
    pub async fn partitions(&self) -> Result<Vec<PartitionKey>> {
        let root = self.path(ROWS_DIR.to_string());
        let mut partitions = Vec::new();
        let periods = self.object_store.list_with_delimiter(Some(&root)).await?;
        for period_dir in periods.common_prefixes {
            let Some(period_name) = period_dir.filename().map(str::to_string) else {
                continue;
            };
            let months = self
                .object_store
                .list_with_delimiter(Some(&period_dir))
                .await?;
            for month_dir in months.common_prefixes {
                let Some(month_name) = month_dir.filename() else {
                    continue;
                };
                match PartitionKey::parse(&period_name, month_name) {
                    Some(key) => partitions.push(key),
                    None => warn!(path = %month_dir, "Skipping unrecognized partition directory"),
                }
            }
        }
        partitions.sort();
        Ok(partitions)
    }

    /// Rewrite one partition into a single file with tombstones applied.
    ///
    /// Files and tombstones written while compaction runs are left alone.
    /// A tombstone is only removed once the rows it could cover have been
    /// rewritten without them.
    ///
    /// Like the upsert race, this is not atomic with concurrent writers: a
    /// row stamped before a tombstone whose file lands after the row listing
    /// is not rewritten, and it becomes live again once that tombstone is
    /// deleted here.
    pub async fn compact_partition(&self, partition: PartitionKey) -> Result<CompactionReport> {
        // Tombstones first: any row file listed afterwards is complete
        // with respect to every tombstone we are about to remove.
        let tombstone_files = self
            .list(&self.partition_dir(TOMBSTONES_DIR, &partition))
            .await?;
        let row_files = self.list(&self.partition_dir(ROWS_DIR, &partition)).await?;

        let mut report = CompactionReport {
            partition: Some(partition),
            ..Default::default()
        };
        if row_files.len() <= 1 && tombstone_files.is_empty() {
            debug!(partition = %partition, "Partition already compact");
            return Ok(report);
        }

        let tombstones = self.read_tombstones(&tombstone_files).await?;
        let rows = self.read_rows(&row_files).await?;
        let total = rows.len();
        let mut live: Vec<Observation> = rows
            .into_iter()
            .filter(|row| !is_dead(row, &tombstones))
            .collect();
        live.sort_by(|a, b| {
            (&a.key, a.date, a.written_at).cmp(&(&b.key, b.date, b.written_at))
        });

        if !live.is_empty() {
            self.write_partition(&partition, &live).await?;
        }
        for meta in row_files.iter().chain(tombstone_files.iter()) {
            match self.object_store.delete(&meta.location).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        report.files_merged = row_files.len();
        report.tombstones_applied = tombstone_files.len();
        report.rows_kept = live.len();
        report.rows_dropped = total - live.len();

        info!(
            partition = %partition,
            files_merged = report.files_merged,
            tombstones = report.tombstones_applied,
            rows_kept = report.rows_kept,
            rows_dropped = report.rows_dropped,
            "Compacted partition"
        );
        Ok(report)
    }

    /// Compact every partition.
    pub async fn compact_all(&self) -> Result<Vec<CompactionReport>> {
        let mut reports = Vec::new();
        for partition in self.partitions().await? {
            reports.push(self.compact_partition(partition).await?);
        }
        Ok(reports)
    }
}

#[async_trait]
impl ObservationStore for ParquetStore {
    async fn scan(&self, request: &ScanRequest) -> Result<Vec<Observation>> {
        let matcher = request.matcher();
        let mut rows = Vec::new();
        let mut files_read = 0usize;

        for partition in Self::partitions_for(request.period, &request.range) {
            // Read even when the partition has no rows left: the upsert that
            // follows must stamp its row past these.
            let tombstones = self.partition_tombstones(&partition).await?;
            let row_files = self.list(&self.partition_dir(ROWS_DIR, &partition)).await?;
            if row_files.is_empty() {
                continue;
            }

            files_read += row_files.len();
            for row in self.read_rows(&row_files).await? {
                if matcher.matches(&row) && !is_dead(&row, &tombstones) {
                    rows.push(row);
                }
            }
        }

        if let Some(max) = rows.iter().map(|r| r.written_at).max() {
            self.clock.observe(max);
        }
        rows.sort_by_key(|row| (row.date, row.written_at));

        debug!(
            keys = request.keys.len(),
            period = %request.period,
            range = %request.range,
            files = files_read,
            rows = rows.len(),
            "Parquet scan"
        );
        Ok(rows)
    }

    async fn delete_at(&self, coordinate: &Coordinate) -> Result<()> {
        let stamp = self.clock.next_stamp();
        let partition = PartitionKey::new(coordinate.period, coordinate.date);
        let tombstone = Tombstone {
            key: coordinate.key.clone(),
            period: coordinate.period,
            date: coordinate.date,
            deleted_at: stamp,
        };
        let location = self.new_file_path(TOMBSTONES_DIR, &partition, stamp, "json");
        let body = serde_json::to_vec(&tombstone)?;
        self.object_store
            .put(&location, PutPayload::from(body))
            .await?;
        debug!(coordinate = %coordinate, path = %location, "Wrote tombstone");
        Ok(())
    }

    async fn insert(&self, mut row: Observation) -> Result<Observation> {
        let partition = PartitionKey::for_row(&row);
        self.partition_tombstones(&partition).await?;
        row.written_at = self.clock.next_stamp();
        self.write_partition(&partition, std::slice::from_ref(&row))
            .await?;
        Ok(row)
    }

    async fn insert_batch(&self, rows: Vec<Observation>) -> Result<usize> {
        let count = rows.len();
        let mut by_partition: BTreeMap<PartitionKey, Vec<Observation>> = BTreeMap::new();
        for row in rows {
            by_partition
                .entry(PartitionKey::for_row(&row))
                .or_default()
                .push(row);
        }
        for (partition, rows) in &mut by_partition {
            self.partition_tombstones(partition).await?;
            for row in rows.iter_mut() {
                row.written_at = self.clock.next_stamp();
            }
            self.write_partition(partition, rows).await?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Scope, ValueKind};
    use object_store::memory::InMemory;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn store() -> ParquetStore {
        ParquetStore::new(Arc::new(InMemory::new()), "ledger").unwrap()
    }

    fn key() -> MetricKey {
        MetricKey::new("revenue", Scope::company("acme"))
    }

    #[test]
    fn test_partition_display_and_parse() {
        let key = PartitionKey::new(PeriodType::Week, d(2024, 3, 18));
        assert_eq!(key.to_string(), "period=week/month=2024-03");
        assert_eq!(PartitionKey::parse("period=week", "month=2024-03"), Some(key));
        assert_eq!(PartitionKey::parse("week", "month=2024-03"), None);
    }

    #[test]
    fn test_partitions_for_range() {
        let parts = ParquetStore::partitions_for(
            PeriodType::Day,
            &DateRange::new(d(2023, 11, 20), d(2024, 2, 3)),
        );
        let months: Vec<_> = parts.iter().map(|p| p.month).collect();
        assert_eq!(
            months,
            vec![d(2023, 11, 1), d(2023, 12, 1), d(2024, 1, 1), d(2024, 2, 1)]
        );
        assert!(ParquetStore::partitions_for(
            PeriodType::Day,
            &DateRange::new(d(2024, 2, 1), d(2024, 1, 1))
        )
        .is_empty());
    }

    #[tokio::test]
    async fn test_insert_scan_and_tombstone() {
        let store = store();
        let coord = Coordinate::new(key(), PeriodType::Month, d(2024, 3, 9));
        store
            .insert(Observation::at(&coord).with_value(ValueKind::Plan, 10.0))
            .await
            .unwrap();

        let request = ScanRequest::coordinate(&coord);
        assert_eq!(store.scan(&request).await.unwrap().len(), 1);

        store.delete_at(&coord).await.unwrap();
        assert!(store.scan(&request).await.unwrap().is_empty());

        // A row written after the delete is live
        store
            .insert(Observation::at(&coord).with_value(ValueKind::Plan, 20.0))
            .await
            .unwrap();
        let rows = store.scan(&request).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].plan, 20.0);
    }

    #[tokio::test]
    async fn test_row_written_after_future_tombstone_is_live() {
        let store = store();
        let coord = Coordinate::new(key(), PeriodType::Month, d(2024, 3, 1));

        // Tombstone from a writer whose clock runs an hour ahead
        let ahead = chrono::Utc::now().timestamp_nanos_opt().unwrap() + 3_600_000_000_000;
        let tombstone = Tombstone {
            key: key(),
            period: coord.period,
            date: coord.date,
            deleted_at: ahead,
        };
        let partition = PartitionKey::new(coord.period, coord.date);
        store
            .object_store
            .put(
                &store.new_file_path(TOMBSTONES_DIR, &partition, ahead, "json"),
                PutPayload::from(serde_json::to_vec(&tombstone).unwrap()),
            )
            .await
            .unwrap();

        let row = store
            .insert(Observation::at(&coord).with_value(ValueKind::Fact, 7.0))
            .await
            .unwrap();
        assert!(row.written_at > ahead);

        let rows = store.scan(&ScanRequest::coordinate(&coord)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fact, 7.0);

        let batch = vec![Observation::at(&Coordinate::new(key(), PeriodType::Month, d(2024, 3, 1)))
            .with_value(ValueKind::Plan, 1.0)];
        store.insert_batch(batch).await.unwrap();
        assert_eq!(store.scan(&ScanRequest::coordinate(&coord)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_compaction_applies_tombstones() {
        let store = store();
        let rows: Vec<_> = (1..=5)
            .map(|day| {
                Observation::at(&Coordinate::new(key(), PeriodType::Day, d(2024, 4, day)))
                    .with_value(ValueKind::Fact, day as f64)
            })
            .collect();
        store.insert_batch(rows).await.unwrap();
        store
            .insert(Observation::at(&Coordinate::new(key(), PeriodType::Day, d(2024, 4, 6))))
            .await
            .unwrap();
        store
            .delete_at(&Coordinate::new(key(), PeriodType::Day, d(2024, 4, 2)))
            .await
            .unwrap();

        let partitions = store.partitions().await.unwrap();
        assert_eq!(partitions, vec![PartitionKey::new(PeriodType::Day, d(2024, 4, 1))]);

        let report = store.compact_partition(partitions[0]).await.unwrap();
        assert_eq!(report.files_merged, 2);
        assert_eq!(report.tombstones_applied, 1);
        assert_eq!(report.rows_kept, 5);
        assert_eq!(report.rows_dropped, 1);

        let request = ScanRequest::new(
            vec![key()],
            PeriodType::Day,
            DateRange::new(d(2024, 4, 1), d(2024, 4, 30)),
        );
        let dates: Vec<_> = store
            .scan(&request)
            .await
            .unwrap()
            .iter()
            .map(|r| r.date.day())
            .collect();
        assert_eq!(dates, vec![1, 3, 4, 5, 6]);

        // Second pass has nothing to do
        let again = store.compact_partition(partitions[0]).await.unwrap();
        assert_eq!(again.files_merged, 0);
    }
}
