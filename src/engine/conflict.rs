use crate::model::*;

/// Widen `span` by `buffer` on both sides. The start is clamped at midnight;
/// the end is not, since closing time sits well before it.
pub fn buffered(span: &Span, buffer: Secs) -> Span {
    Span::new((span.start - buffer).max(0), span.end + buffer)
}

/// True if `a` and `b` are closer than `buffer` apart, or overlap outright.
///
/// The buffer is the gap required between the pair, so it is applied once:
/// `a` is widened and compared half-open against `b`. A booking that starts
/// exactly `buffer` after the other ends touches the widened edge and does
/// not conflict.
pub fn overlaps(a: &Span, b: &Span, buffer: Secs) -> bool {
    buffered(a, buffer).overlaps(b)
}

/// First active reservation in `existing` that clashes with `candidate`.
/// `exclude` skips a reservation's own row when it is being moved.
pub fn find_conflict<'a>(
    existing: impl IntoIterator<Item = &'a Reservation>,
    candidate: &Span,
    buffer: Secs,
    exclude: Option<ReservationId>,
) -> Option<ReservationId> {
    existing
        .into_iter()
        .filter(|r| r.is_active() && Some(r.id) != exclude)
        .find(|r| overlaps(&r.span(), candidate, buffer))
        .map(|r| r.id)
}
