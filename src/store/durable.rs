use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info};

use crate::engine::conflict::find_conflict;
use crate::engine::validation::{check_transition, check_updatable};
use crate::engine::{Entity, EngineError};
use crate::limits::WAL_CHANNEL_CAPACITY;
use crate::model::*;
use crate::observability;
use crate::wal::Wal;

use super::{DaySheet, ReservationStore};

type SheetKey = (TableId, NaiveDate);
type SharedSheet = Arc<RwLock<DaySheet>>;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL. Appends that queue up while a flush is pending are written
/// together and share one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so stray bytes don't ride along with the next batch.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => {}
    }
}

/// Fold a replayed event stream into the latest version of each reservation.
fn rebuild(events: Vec<Event>) -> HashMap<ReservationId, Reservation> {
    let mut rows: HashMap<ReservationId, Reservation> = HashMap::new();
    for event in events {
        match event {
            Event::ReservationCreated { reservation } | Event::ReservationUpdated { reservation } => {
                rows.insert(reservation.id, reservation);
            }
            Event::StatusChanged { id, status } => {
                if let Some(r) = rows.get_mut(&id) {
                    r.status = status;
                }
            }
        }
    }
    rows
}

/// In-memory reservation store made durable by a write-ahead log.
///
/// Reservations live in day sheets keyed by `(table, date)`, each behind its
/// own lock. Writers hold the sheet's write lock across the conflict check,
/// the WAL append and the in-memory apply, which serializes bookings per
/// table-day. Moving a reservation between sheets locks both in key order.
pub struct WalStore {
    sheets: DashMap<SheetKey, SharedSheet>,
    /// Reservation id → the sheet currently holding it.
    index: DashMap<ReservationId, SheetKey>,
    by_customer: DashMap<CustomerId, Vec<ReservationId>>,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold this shared; compaction takes it exclusively so its
    /// snapshot cannot miss a write already queued for the log.
    gate: RwLock<()>,
    buffer: Secs,
}

impl WalStore {
    /// Replay the log at `path` and start its writer task. Must run inside a
    /// tokio runtime.
    pub fn open(path: &Path, buffer: Secs) -> io::Result<Self> {
        let (wal, events) = Wal::recover(path)?;
        let rows = rebuild(events);
        let (wal_tx, wal_rx) = mpsc::channel(WAL_CHANNEL_CAPACITY);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut sheets: HashMap<SheetKey, DaySheet> = HashMap::new();
        let index = DashMap::new();
        let by_customer: DashMap<CustomerId, Vec<ReservationId>> = DashMap::new();
        let count = rows.len();
        for row in rows.into_values() {
            let key = (row.table_id, row.date);
            index.insert(row.id, key);
            by_customer.entry(row.customer_id).or_default().push(row.id);
            sheets.entry(key).or_default().insert(row);
        }
        info!("replayed {count} reservations from {}", path.display());

        Ok(Self {
            sheets: sheets
                .into_iter()
                .map(|(k, s)| (k, Arc::new(RwLock::new(s))))
                .collect(),
            index,
            by_customer,
            wal_tx,
            gate: RwLock::new(()),
            buffer,
        })
    }

    async fn wal_append(&self, event: Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { event, response: tx })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    fn sheet(&self, key: SheetKey) -> SharedSheet {
        self.sheets.entry(key).or_default().value().clone()
    }

    fn existing_sheet(&self, key: &SheetKey) -> Option<SharedSheet> {
        self.sheets.get(key).map(|e| e.value().clone())
    }

    fn sheet_key_of(&self, id: &ReservationId) -> Result<SheetKey, EngineError> {
        self.index
            .get(id)
            .map(|e| *e.value())
            .ok_or_else(|| EngineError::not_found(Entity::Reservation, *id))
    }

    /// Lock the sheet holding `id`. Retries if the reservation moves between
    /// the index lookup and the lock.
    async fn lock_holding(
        &self,
        id: ReservationId,
    ) -> Result<OwnedRwLockWriteGuard<DaySheet>, EngineError> {
        loop {
            let key = self.sheet_key_of(&id)?;
            let guard = self.sheet(key).write_owned().await;
            if guard.find(id).is_some() {
                return Ok(guard);
            }
        }
    }

    fn conflict_in(&self, sheet: &DaySheet, record: &Reservation) -> Result<(), EngineError> {
        if !record.is_active() {
            return Ok(());
        }
        let span = record.span();
        let nearby = sheet.near(&span, self.buffer);
        match find_conflict(nearby, &span, self.buffer, Some(record.id)) {
            Some(other) => {
                metrics::counter!(observability::CONFLICTS_TOTAL, "source" => "store").increment(1);
                debug!(
                    "store rejected {} on table {}: clashes with {other}",
                    record.id, record.table_id
                );
                Err(EngineError::Conflict(other))
            }
            None => Ok(()),
        }
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Rewrite the log as one `ReservationCreated` per reservation.
    pub async fn compact(&self) -> Result<(), EngineError> {
        let _quiesced = self.gate.write().await;

        let sheets: Vec<SharedSheet> = self.sheets.iter().map(|e| e.value().clone()).collect();
        let mut events = Vec::with_capacity(self.index.len());
        for sheet in sheets {
            let guard = sheet.read().await;
            events.extend(
                guard
                    .rows
                    .iter()
                    .map(|r| Event::ReservationCreated { reservation: r.clone() }),
            );
        }
        let kept = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        info!("compacted WAL to {kept} records");
        Ok(())
    }
}

#[async_trait]
impl ReservationStore for WalStore {
    async fn get(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        loop {
            let key = self.sheet_key_of(&id)?;
            let Some(sheet) = self.existing_sheet(&key) else {
                return Err(EngineError::not_found(Entity::Reservation, id));
            };
            if let Some(row) = sheet.read().await.find(id) {
                return Ok(row.clone());
            }
        }
    }

    async fn list_active(
        &self,
        table_id: TableId,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, EngineError> {
        let Some(sheet) = self.existing_sheet(&(table_id, date)) else {
            return Ok(Vec::new());
        };
        let guard = sheet.read().await;
        Ok(guard.active().cloned().collect())
    }

    async fn list_active_on(
        &self,
        date: NaiveDate,
    ) -> Result<HashMap<TableId, Vec<Reservation>>, EngineError> {
        let sheets: Vec<(TableId, SharedSheet)> = self
            .sheets
            .iter()
            .filter(|e| e.key().1 == date)
            .map(|e| (e.key().0, e.value().clone()))
            .collect();

        let mut grouped = HashMap::with_capacity(sheets.len());
        for (table_id, sheet) in sheets {
            let rows: Vec<Reservation> = sheet.read().await.active().cloned().collect();
            if !rows.is_empty() {
                grouped.insert(table_id, rows);
            }
        }
        Ok(grouped)
    }

    async fn list_for_table(
        &self,
        table_id: TableId,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, EngineError> {
        let Some(sheet) = self.existing_sheet(&(table_id, date)) else {
            return Ok(Vec::new());
        };
        let rows = sheet.read().await.rows.clone();
        Ok(rows)
    }

    async fn list_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Reservation>, EngineError> {
        let ids = self
            .by_customer
            .get(&customer_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            rows.push(self.get(id).await?);
        }
        rows.sort_by(|a, b| (a.date, a.start).cmp(&(b.date, b.start)));
        Ok(rows)
    }

    async fn insert(&self, record: Reservation) -> Result<Reservation, EngineError> {
        let _gate = self.gate.read().await;
        let key = (record.table_id, record.date);
        let mut guard = self.sheet(key).write_owned().await;

        if self.index.contains_key(&record.id) {
            return Err(EngineError::AlreadyExists(record.id));
        }
        self.conflict_in(&guard, &record)?;

        self.wal_append(Event::ReservationCreated { reservation: record.clone() })
            .await?;
        guard.insert(record.clone());
        self.index.insert(record.id, key);
        self.by_customer
            .entry(record.customer_id)
            .or_default()
            .push(record.id);
        Ok(record)
    }

    async fn update(
        &self,
        id: ReservationId,
        record: Reservation,
    ) -> Result<Reservation, EngineError> {
        let _gate = self.gate.read().await;
        let new_key = (record.table_id, record.date);

        loop {
            let old_key = self.sheet_key_of(&id)?;

            // Same sheet: one lock. Different sheets: both, in key order.
            let (mut old_guard, mut new_guard) = if old_key == new_key {
                (self.sheet(old_key).write_owned().await, None)
            } else {
                let (old_sheet, new_sheet) = (self.sheet(old_key), self.sheet(new_key));
                if old_key < new_key {
                    let o = old_sheet.write_owned().await;
                    let n = new_sheet.write_owned().await;
                    (o, Some(n))
                } else {
                    let n = new_sheet.write_owned().await;
                    let o = old_sheet.write_owned().await;
                    (o, Some(n))
                }
            };

            let Some(current) = old_guard.find(id).cloned() else {
                continue;
            };
            check_updatable(current.status)?;

            let merged = Reservation {
                table_id: record.table_id,
                date: record.date,
                start: record.start,
                end: record.end,
                party_size: record.party_size,
                note: record.note.clone(),
                ..current
            };
            self.conflict_in(new_guard.as_deref().unwrap_or(&*old_guard), &merged)?;

            self.wal_append(Event::ReservationUpdated { reservation: merged.clone() })
                .await?;
            old_guard.remove(id);
            match new_guard.as_deref_mut() {
                Some(target) => target.insert(merged.clone()),
                None => old_guard.insert(merged.clone()),
            }
            self.index.insert(id, new_key);
            return Ok(merged);
        }
    }

    async fn set_status(
        &self,
        id: ReservationId,
        status: ReservationStatus,
    ) -> Result<Reservation, EngineError> {
        let _gate = self.gate.read().await;
        let mut guard = self.lock_holding(id).await?;
        let current = guard
            .find(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(Entity::Reservation, id))?;

        if !check_transition(current.status, status)? {
            return Ok(current);
        }

        self.wal_append(Event::StatusChanged { id, status }).await?;
        metrics::counter!(observability::STATUS_TRANSITIONS_TOTAL, "status" => status.as_str())
            .increment(1);
        let row = guard
            .find_mut(id)
            .ok_or_else(|| EngineError::not_found(Entity::Reservation, id))?;
        row.status = status;
        Ok(row.clone())
    }
}
