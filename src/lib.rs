//! # kpi-ledger
//!
//! Plan/fact KPI series on an append-only columnar store.
//!
//! Observations are recorded at one granularity (day, week, month, quarter
//! or year) and read back at any other: a monthly plan can be shown per
//! week, daily facts can be summed per quarter.
//!
//! ## Key Features
//!
//! - **Deterministic bucketing**: one calendar and one indexer behind every
//!   bucket layout
//! - **Resampling**: replication into finer buckets, grouped summation into
//!   coarser ones
//! - **Dashboard windows**: fixed 12-point trend arrays and trailing-year totals
//! - **Point upserts**: read/merge/delete/insert on a store without in-place updates
//!
//! ## Architecture
//!
//! - **Period**: calendar arithmetic and bucket indexing
//! - **Resample**: conversion between granularities and rolling windows
//! - **Store**: in-memory and Parquet-on-object-store backends
//! - **Reader / Upserter**: the read and write paths, fronted by [`Ledger`]

pub mod clock;
pub mod config;
pub mod ledger;
pub mod period;
pub mod reader;
pub mod resample;
pub mod schema;
pub mod store;
pub mod telemetry;
pub mod upsert;

mod error;

pub use error::{Error, Result};
pub use ledger::Ledger;

/// Object storage configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Backend the object store is built on.
    pub backend: StorageBackend,
    /// Root directory (local) or bucket name (s3). Unused for memory.
    pub location: Option<String>,
    /// Key prefix all ledger files live under.
    pub prefix: String,
}

impl StorageConfig {
    pub(crate) fn require_location(&self) -> Result<&str> {
        self.location.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "STORAGE_LOCATION required when STORAGE_BACKEND={}",
                self.backend.as_str()
            ))
        })
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            location: None,
            prefix: "kpi-ledger".to_string(),
        }
    }
}

/// Supported object storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Local,
    S3,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Local => "local",
            Self::S3 => "s3",
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "local" | "file" => Ok(Self::Local),
            "s3" | "aws" => Ok(Self::S3),
            other => Err(Error::Config(format!(
                "unknown storage backend '{}'; expected one of memory, local, s3",
                other
            ))),
        }
    }
}

/// Re-exports for convenience
pub mod prelude {
    pub use crate::period::{DateRange, PeriodType};
    pub use crate::reader::{PlanFactSeries, RollingTotals};
    pub use crate::schema::{FieldChanges, MetricKey, Observation, Scope, ValueKind};
    pub use crate::store::{InMemoryStore, ObservationStore, ParquetStore};
    pub use crate::{Error, Ledger, Result, StorageBackend, StorageConfig};
}
