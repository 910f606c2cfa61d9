//! Backing store for observation rows
//!
//! The store is append-only: it can scan a date range, insert a row, and
//! record a delete for a coordinate. It offers no partial update and no
//! uniqueness guarantee; see [`crate::upsert`] for how a cell is replaced.
//!
//! Two implementations ship with the crate:
//! - [`InMemoryStore`] for tests and single-process embedding
//! - [`ParquetStore`] for month-partitioned Parquet files on any
//!   `object_store` backend

mod memory;
mod parquet;
mod writer;

pub use self::memory::InMemoryStore;
pub use self::parquet::{CompactionReport, ParquetStore, PartitionKey};
pub use self::writer::ObservationWriter;

use crate::period::{DateRange, PeriodType};
use crate::schema::{Coordinate, MetricKey, Observation};
use crate::{Error, Result};

use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Parameters of a single range scan.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// Keys to return rows for
    pub keys: Vec<MetricKey>,
    /// Granularity the rows were recorded at
    pub period: PeriodType,
    /// Inclusive anchor-date bounds
    pub range: DateRange,
}

impl ScanRequest {
    pub fn new(keys: Vec<MetricKey>, period: PeriodType, range: DateRange) -> Self {
        Self {
            keys,
            period,
            range,
        }
    }

    /// Scan of exactly one coordinate
    pub fn coordinate(coordinate: &Coordinate) -> Self {
        Self::new(
            vec![coordinate.key.clone()],
            coordinate.period,
            DateRange::new(coordinate.date, coordinate.date),
        )
    }

    /// Predicate evaluator with the key list hashed once.
    pub fn matcher(&self) -> ScanMatcher<'_> {
        ScanMatcher {
            keys: self.keys.iter().collect(),
            request: self,
        }
    }
}

/// Row filter for a [`ScanRequest`].
pub struct ScanMatcher<'a> {
    keys: HashSet<&'a MetricKey>,
    request: &'a ScanRequest,
}

impl ScanMatcher<'_> {
    pub fn matches(&self, row: &Observation) -> bool {
        row.period == self.request.period
            && self.request.range.contains(row.date)
            && self.keys.contains(&row.key)
    }
}

/// Storage primitives the core is written against.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Live rows for the requested keys, period and anchor-date range.
    async fn scan(&self, request: &ScanRequest) -> Result<Vec<Observation>>;

    /// Record a delete of every row at `coordinate`. May take effect
    /// asynchronously; rows inserted afterwards are never affected.
    async fn delete_at(&self, coordinate: &Coordinate) -> Result<()>;

    /// Append a row. Returns the row with its store-assigned write stamp.
    async fn insert(&self, row: Observation) -> Result<Observation>;

    /// Append many rows. Returns the number written.
    async fn insert_batch(&self, rows: Vec<Observation>) -> Result<usize> {
        let count = rows.len();
        for row in rows {
            self.insert(row).await?;
        }
        Ok(count)
    }
}

/// Race `fut` against `cancel`, returning [`Error::Cancelled`] if the token
/// fires first.
pub async fn with_cancel<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}
