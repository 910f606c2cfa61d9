//! Entry point for report and editing handlers

use crate::config::ComponentFactory;
use crate::period::{DateRange, PeriodType};
use crate::reader::{PlanFactSeries, RollingTotals, SeriesReader};
use crate::schema::{FieldChanges, MetricKey, Observation, ValueKind};
use crate::store::ObservationStore;
use crate::upsert::PointUpserter;
use crate::{Result, StorageConfig};

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Reads and writes plan/fact series over one observation store.
///
/// Every call runs under a child of the ledger's shutdown token, so
/// [`shutdown`](Self::shutdown) cancels in-flight reads and pending upserts.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn ObservationStore>,
    reader: SeriesReader,
    upserter: PointUpserter,
    shutdown: CancellationToken,
}

impl Ledger {
    pub fn new(store: Arc<dyn ObservationStore>) -> Self {
        Self::with_shutdown(store, CancellationToken::new())
    }

    /// Ledger whose calls are cancelled when `shutdown` fires.
    pub fn with_shutdown(store: Arc<dyn ObservationStore>, shutdown: CancellationToken) -> Self {
        Self {
            reader: SeriesReader::new(store.clone()),
            upserter: PointUpserter::new(store.clone()),
            store,
            shutdown,
        }
    }

    /// Open a ledger over the storage described by `config`.
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        Ok(Self::new(ComponentFactory::create_observation_store(config).await?))
    }

    pub fn store(&self) -> &Arc<dyn ObservationStore> {
        &self.store
    }

    pub fn reader(&self) -> &SeriesReader {
        &self.reader
    }

    pub fn upserter(&self) -> &PointUpserter {
        &self.upserter
    }

    /// Cancel every in-flight and future call.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub async fn read_series(
        &self,
        keys: &[MetricKey],
        range: DateRange,
        native: PeriodType,
        display: PeriodType,
    ) -> Result<HashMap<MetricKey, PlanFactSeries>> {
        let cancel = self.shutdown.child_token();
        self.reader.read(keys, range, native, display, &cancel).await
    }

    pub async fn read_rolling_totals(
        &self,
        key: &MetricKey,
        range: DateRange,
        native: PeriodType,
    ) -> Result<RollingTotals> {
        let cancel = self.shutdown.child_token();
        self.reader
            .read_rolling_totals(key, range, native, &cancel)
            .await
    }

    pub async fn write_value(
        &self,
        key: &MetricKey,
        kind: ValueKind,
        period: PeriodType,
        date: NaiveDate,
        value: f64,
    ) -> Result<Observation> {
        let cancel = self.shutdown.child_token();
        self.upserter
            .write_value(key, kind, period, date, value, &cancel)
            .await
    }

    pub async fn upsert(
        &self,
        key: &MetricKey,
        period: PeriodType,
        date: NaiveDate,
        changes: &FieldChanges,
    ) -> Result<Observation> {
        let cancel = self.shutdown.child_token();
        self.upserter
            .upsert(key, period, date, changes, &cancel)
            .await
    }
}
