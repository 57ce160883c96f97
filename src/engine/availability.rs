use std::collections::HashMap;

use crate::model::*;

use super::conflict::find_conflict;

// ── Availability Algorithm ────────────────────────────────────────

/// Price for holding a table over `span`, rounded half-up to the cent.
pub fn total_price(hourly_rate: Cents, span: &Span) -> Cents {
    let hour = SECS_PER_HOUR as i128;
    let raw = hourly_rate as i128 * span.duration_secs() as i128;
    (raw + hour / 2).div_euclid(hour) as Cents
}

/// Scan each candidate's same-day reservations for a clash with `span`.
///
/// Linear in tables × reservations per table-day. Candidates with no entry
/// in `booked` are free.
pub fn free_tables(
    candidates: Vec<Table>,
    booked: &HashMap<TableId, Vec<Reservation>>,
    span: &Span,
    buffer: Secs,
) -> Vec<Quote> {
    let mut quotes: Vec<Quote> = candidates
        .into_iter()
        .filter(|table| {
            booked
                .get(&table.id)
                .is_none_or(|rows| find_conflict(rows, span, buffer, None).is_none())
        })
        .map(|table| Quote {
            total_price: total_price(table.hourly_rate, span),
            table,
        })
        .collect();
    quotes.sort_by(|a, b| {
        a.total_price
            .cmp(&b.total_price)
            .then(a.table.id.cmp(&b.table.id))
    });
    quotes
}
