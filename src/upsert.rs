//! Point upserts against an append-only store
//!
//! The store cannot update a row in place, so replacing a cell is a
//! four-step protocol:
//!
//! 1. scan the coordinate and keep the newest row
//! 2. merge the requested changes into it
//! 3. delete every row at the coordinate
//! 4. insert the merged row
//!
//! The protocol is not atomic. Two upserters racing on one coordinate can
//! leave a duplicate row or lose one side's change; callers that need
//! stronger guarantees must serialize writes per coordinate. A scan that
//! sees more than one live row logs a warning and keeps the newest.

use crate::period::PeriodType;
use crate::schema::{Coordinate, FieldChanges, MetricKey, Observation, ValueKind};
use crate::store::{with_cancel, ObservationStore, ScanRequest};
use crate::{Error, Result};

use chrono::NaiveDate;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Read-modify-delete-insert writer for single cells.
#[derive(Clone)]
pub struct PointUpserter {
    store: Arc<dyn ObservationStore>,
}

impl PointUpserter {
    pub fn new(store: Arc<dyn ObservationStore>) -> Self {
        Self { store }
    }

    /// Apply `changes` to the cell at `(key, period, date)`, keeping every
    /// field the changes leave untouched. `date` is normalized to the start
    /// of its period. Returns the row as written.
    ///
    /// Cancellation is honoured up to the delete; once the delete has been
    /// issued the insert always follows.
    pub async fn upsert(
        &self,
        key: &MetricKey,
        period: PeriodType,
        date: NaiveDate,
        changes: &FieldChanges,
        cancel: &CancellationToken,
    ) -> Result<Observation> {
        let coordinate = Coordinate::new(key.clone(), period, date);
        let existing = with_cancel(cancel, self.store.scan(&ScanRequest::coordinate(&coordinate)))
            .await?;

        let live: Vec<Observation> = existing
            .into_iter()
            .filter(|row| coordinate.matches(row))
            .collect();
        if live.len() > 1 {
            warn!(
                coordinate = %coordinate,
                rows = live.len(),
                "Multiple live rows at coordinate; keeping the newest"
            );
        }

        let mut merged = live
            .into_iter()
            .max_by_key(|row| row.written_at)
            .unwrap_or_else(|| Observation::at(&coordinate));
        changes.apply_to(&mut merged);

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.store.delete_at(&coordinate).await?;
        let written = match self.store.insert(merged).await {
            Ok(row) => row,
            Err(e) => {
                error!(
                    coordinate = %coordinate,
                    error = %e,
                    "Insert failed after delete; cell is empty until rewritten"
                );
                return Err(e);
            }
        };

        debug!(
            coordinate = %coordinate,
            plan = written.plan,
            fact = written.fact,
            written_at = written.written_at,
            "Upserted cell"
        );
        Ok(written)
    }

    /// Set one value of a cell, preserving the sibling value and payload.
    pub async fn write_value(
        &self,
        key: &MetricKey,
        kind: ValueKind,
        period: PeriodType,
        date: NaiveDate,
        value: f64,
        cancel: &CancellationToken,
    ) -> Result<Observation> {
        self.upsert(key, period, date, &FieldChanges::value(kind, value), cancel)
            .await
    }
}
