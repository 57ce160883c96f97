use chrono::NaiveDate;
use tracing::debug;

use crate::model::*;
use crate::observability;

use super::availability::free_tables;
use super::validation::{validate_party_size, validate_window};
use super::{Engine, EngineError};

impl Engine {
    pub async fn get(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        self.store.get(id).await
    }

    pub async fn list_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Reservation>, EngineError> {
        self.store.list_by_customer(customer_id).await
    }

    pub async fn list_for_table(
        &self,
        table_id: TableId,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, EngineError> {
        self.tables.get_table(table_id).await?;
        self.store.list_for_table(table_id, date).await
    }

    /// Tables free for the whole window, cheapest first.
    ///
    /// Reads a snapshot without locking. A table listed here can still be
    /// taken before the caller books it; `create` catches that.
    pub async fn find_available(&self, query: &AvailabilityQuery) -> Result<Vec<Quote>, EngineError> {
        validate_window(
            query.date,
            query.start,
            query.end,
            self.clock.today(),
            &self.config,
        )?;
        validate_party_size(query.party_size)?;

        let mut candidates = self
            .tables
            .list_tables(query.party_size, Some(TableStatus::Available))
            .await?;
        candidates.retain(|t| {
            t.capacity >= query.party_size
                && (!query.window_seat || t.window_seat)
                && (!query.accessible || t.accessible)
        });

        let booked = self.store.list_active_on(query.date).await?;
        let span = Span::of_day(query.start, query.end);
        let quotes = free_tables(candidates, &booked, &span, self.config.buffer);

        metrics::counter!(observability::AVAILABILITY_QUERIES_TOTAL).increment(1);
        metrics::histogram!(observability::AVAILABILITY_RESULTS).record(quotes.len() as f64);
        debug!(
            "{} tables free on {} {}-{} for {}",
            quotes.len(),
            query.date,
            query.start,
            query.end,
            query.party_size
        );
        Ok(quotes)
    }
}
