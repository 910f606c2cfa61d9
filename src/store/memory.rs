//! In-memory observation store for development and testing

use super::{ObservationStore, ScanRequest};
use crate::clock::WriteClock;
use crate::schema::{Coordinate, Observation};
use crate::{Error, Result};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

/// In-memory store.
///
/// By default deletes apply immediately. With
/// [`with_deferred_deletes`](Self::with_deferred_deletes) they are queued
/// and only take effect on [`apply_pending_deletes`](Self::apply_pending_deletes),
/// mirroring a warehouse whose deletes are applied by a background mutation.
#[derive(Debug)]
pub struct InMemoryStore {
    rows: RwLock<Vec<Observation>>,
    /// Queued deletes with the stamp they were issued at
    pending_deletes: Mutex<Vec<(Coordinate, i64)>>,
    deferred_deletes: bool,
    available: AtomicBool,
    scans: AtomicU64,
    clock: WriteClock,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            pending_deletes: Mutex::new(Vec::new()),
            deferred_deletes: false,
            available: AtomicBool::new(true),
            scans: AtomicU64::new(0),
            clock: WriteClock::new(),
        }
    }

    /// Store whose deletes stay invisible until applied explicitly.
    pub fn with_deferred_deletes() -> Self {
        Self {
            deferred_deletes: true,
            ..Self::new()
        }
    }

    /// Simulate an unreachable store. While unavailable every call fails
    /// with [`Error::StorageUnavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Apply queued deletes. Only rows written before the delete was issued
    /// are removed. Returns the number of rows removed.
    pub fn apply_pending_deletes(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending_deletes.lock());
        if pending.is_empty() {
            return 0;
        }
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|row| {
            !pending
                .iter()
                .any(|(coord, stamp)| coord.matches(row) && row.written_at < *stamp)
        });
        before - rows.len()
    }

    /// Number of deletes waiting to be applied
    pub fn pending_delete_count(&self) -> usize {
        self.pending_deletes.lock().len()
    }

    /// Total stored rows, live or not
    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }

    /// Number of scans served so far
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::StorageUnavailable("in-memory store marked unavailable".into()))
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObservationStore for InMemoryStore {
    async fn scan(&self, request: &ScanRequest) -> Result<Vec<Observation>> {
        self.ensure_available()?;
        self.scans.fetch_add(1, Ordering::Relaxed);

        let matcher = request.matcher();
        let mut rows: Vec<Observation> = self
            .rows
            .read()
            .iter()
            .filter(|row| matcher.matches(row))
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.date, row.written_at));

        debug!(
            keys = request.keys.len(),
            period = %request.period,
            range = %request.range,
            rows = rows.len(),
            "In-memory scan"
        );
        Ok(rows)
    }

    async fn delete_at(&self, coordinate: &Coordinate) -> Result<()> {
        self.ensure_available()?;
        if self.deferred_deletes {
            let stamp = self.clock.next_stamp();
            self.pending_deletes.lock().push((coordinate.clone(), stamp));
        } else {
            self.rows.write().retain(|row| !coordinate.matches(row));
        }
        Ok(())
    }

    async fn insert(&self, mut row: Observation) -> Result<Observation> {
        self.ensure_available()?;
        row.written_at = self.clock.next_stamp();
        self.rows.write().push(row.clone());
        Ok(row)
    }
}
