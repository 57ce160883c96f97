use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::conflict::find_conflict;
use super::validation::{check_updatable, validate_booking};
use super::{BusinessRule, Engine, EngineError, Entity};

impl Engine {
    /// Book a table. The new reservation starts out `Confirmed`.
    pub async fn create(&self, req: NewReservation) -> Result<Reservation, EngineError> {
        if !self.customers.customer_exists(req.customer_id).await? {
            return Err(EngineError::not_found(Entity::Customer, req.customer_id));
        }
        let table = self.tables.get_table(req.table_id).await?;

        let record = Reservation {
            id: Ulid::new(),
            customer_id: req.customer_id,
            table_id: req.table_id,
            date: req.date,
            start: req.start,
            end: req.end,
            party_size: req.party_size,
            status: ReservationStatus::Confirmed,
            created_at: self.clock.now(),
            note: req.note,
        };
        validate_booking(&record, &table, self.clock.today(), &self.config)?;
        if table.status != TableStatus::Available {
            return Err(BusinessRule::TableUnavailable.into());
        }
        self.precheck(&record).await?;

        let saved = self.store.insert(record).await?;
        metrics::counter!(observability::RESERVATIONS_CREATED_TOTAL).increment(1);
        info!(
            "reservation {} created: table {} on {} {}-{} for {}",
            saved.id, saved.table_id, saved.date, saved.start, saved.end, saved.party_size
        );
        Ok(saved)
    }

    /// Apply `patch` over the stored reservation and re-run every booking
    /// check against the merged record. The reservation never clashes with
    /// its own current slot.
    pub async fn update(
        &self,
        id: ReservationId,
        patch: ReservationPatch,
    ) -> Result<Reservation, EngineError> {
        let current = self.store.get(id).await?;
        check_updatable(current.status)?;

        let merged = patch.merge(&current);
        let table = self.tables.get_table(merged.table_id).await?;
        validate_booking(&merged, &table, self.clock.today(), &self.config)?;
        if merged.table_id != current.table_id && table.status != TableStatus::Available {
            return Err(BusinessRule::TableUnavailable.into());
        }
        if patch.moves_slot() {
            self.precheck(&merged).await?;
        }

        let saved = self.store.update(id, merged).await?;
        info!(
            "reservation {id} updated: table {} on {} {}-{} for {}",
            saved.table_id, saved.date, saved.start, saved.end, saved.party_size
        );
        Ok(saved)
    }

    /// Cancelling twice is a no-op.
    pub async fn cancel(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        self.transition(id, ReservationStatus::Cancelled).await
    }

    pub async fn check_in(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        self.transition(id, ReservationStatus::CheckedIn).await
    }

    /// Record that the party never arrived. Only a `Confirmed` reservation
    /// can become a no-show.
    pub async fn mark_no_show(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        self.transition(id, ReservationStatus::NoShow).await
    }

    async fn transition(
        &self,
        id: ReservationId,
        status: ReservationStatus,
    ) -> Result<Reservation, EngineError> {
        let saved = self.store.set_status(id, status).await?;
        info!("reservation {id} is {}", saved.status.as_str());
        Ok(saved)
    }

    /// Fail fast on a clash visible right now. The store repeats this check
    /// under its write lock, which is what actually closes the race.
    async fn precheck(&self, record: &Reservation) -> Result<(), EngineError> {
        let rows = self.store.list_active(record.table_id, record.date).await?;
        let span = record.span();
        if let Some(other) = find_conflict(&rows, &span, self.config.buffer, Some(record.id)) {
            metrics::counter!(observability::CONFLICTS_TOTAL, "source" => "precheck").increment(1);
            debug!(
                "reservation {} on table {} clashes with {other}",
                record.id, record.table_id
            );
            return Err(EngineError::Conflict(other));
        }
        Ok(())
    }
}
