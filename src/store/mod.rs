mod durable;
mod sheet;

pub use durable::WalStore;
pub use sheet::DaySheet;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::engine::EngineError;
use crate::model::*;

/// Persistence for reservation records.
///
/// `insert` and `update` must re-check for conflicts atomically with the
/// write, so two callers racing for one slot cannot both succeed. The losing
/// writer gets `EngineError::Conflict`, same as the engine's pre-check.
/// Records are never deleted.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn get(&self, id: ReservationId) -> Result<Reservation, EngineError>;

    /// Confirmed and checked-in reservations on one table-day.
    async fn list_active(
        &self,
        table_id: TableId,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, EngineError>;

    /// Active reservations on `date` across all tables, grouped by table.
    async fn list_active_on(
        &self,
        date: NaiveDate,
    ) -> Result<HashMap<TableId, Vec<Reservation>>, EngineError>;

    /// Every reservation on one table-day in any status, ordered by start.
    async fn list_for_table(
        &self,
        table_id: TableId,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, EngineError>;

    /// A customer's reservations ordered by date, then start time.
    async fn list_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Reservation>, EngineError>;

    async fn insert(&self, record: Reservation) -> Result<Reservation, EngineError>;

    /// Replace the slot, party size and note of `id`. Identity, status and
    /// creation time stay as stored.
    async fn update(&self, id: ReservationId, record: Reservation)
    -> Result<Reservation, EngineError>;

    /// Move `id` to `status`. Illegal transitions fail with a business-rule
    /// error; a transition to the current terminal status is a no-op.
    async fn set_status(
        &self,
        id: ReservationId,
        status: ReservationStatus,
    ) -> Result<Reservation, EngineError>;
}
