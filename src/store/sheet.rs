use crate::engine::conflict::buffered;
use crate::model::*;

/// Every reservation on one table for one date, any status, sorted by start.
#[derive(Debug, Clone, Default)]
pub struct DaySheet {
    pub rows: Vec<Reservation>,
}

impl DaySheet {
    /// Insert keeping rows ordered by start time.
    pub fn insert(&mut self, row: Reservation) {
        let start = row.start;
        let pos = self.rows.partition_point(|r| r.start <= start);
        self.rows.insert(pos, row);
    }

    pub fn remove(&mut self, id: ReservationId) -> Option<Reservation> {
        let pos = self.rows.iter().position(|r| r.id == id)?;
        Some(self.rows.remove(pos))
    }

    pub fn find(&self, id: ReservationId) -> Option<&Reservation> {
        self.rows.iter().find(|r| r.id == id)
    }

    pub fn find_mut(&mut self, id: ReservationId) -> Option<&mut Reservation> {
        self.rows.iter_mut().find(|r| r.id == id)
    }

    pub fn active(&self) -> impl Iterator<Item = &Reservation> {
        self.rows.iter().filter(|r| r.is_active())
    }

    /// Rows that could clash with `span` once `buffer` is applied.
    /// Rows starting at or after the widened end are skipped by binary search.
    pub fn near(&self, span: &Span, buffer: Secs) -> impl Iterator<Item = &Reservation> {
        let window = buffered(span, buffer);
        let right_bound = self
            .rows
            .partition_point(|r| secs_of_day(r.start) < window.end);
        self.rows[..right_bound]
            .iter()
            .filter(move |r| secs_of_day(r.end) > window.start)
    }
}
