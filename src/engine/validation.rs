//! Input and lifecycle rules shared by create, update and availability.

use chrono::{NaiveDate, NaiveTime};

use crate::config::EngineConfig;
use crate::limits::*;
use crate::model::*;

use super::error::{BusinessRule, ValidationError};

/// Date, time-range and operating-hours checks for a requested window.
///
/// Only the date is compared against "today": a slot earlier today that has
/// already started is still accepted.
pub(crate) fn validate_window(
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    today: NaiveDate,
    config: &EngineConfig,
) -> Result<(), ValidationError> {
    if date < today {
        return Err(ValidationError::PastDate { date, today });
    }
    if start >= end {
        return Err(ValidationError::InvalidTimeRange { start, end });
    }
    let hours = Span::of_day(config.opening, config.closing);
    if !hours.contains_span(&Span::of_day(start, end)) {
        return Err(ValidationError::OutsideOperatingHours {
            opening: config.opening,
            closing: config.closing,
        });
    }
    Ok(())
}

pub(crate) fn validate_party_size(party_size: u32) -> Result<(), ValidationError> {
    if !(MIN_PARTY_SIZE..=MAX_PARTY_SIZE).contains(&party_size) {
        return Err(ValidationError::PartySizeOutOfBounds(party_size));
    }
    Ok(())
}

/// Full rule set for a record about to be written to `table`.
pub(crate) fn validate_booking(
    record: &Reservation,
    table: &Table,
    today: NaiveDate,
    config: &EngineConfig,
) -> Result<(), ValidationError> {
    validate_window(record.date, record.start, record.end, today, config)?;
    validate_party_size(record.party_size)?;
    if record.party_size > table.capacity {
        return Err(ValidationError::ExceedsCapacity {
            party_size: record.party_size,
            capacity: table.capacity,
        });
    }
    if let Some(note) = &record.note
        && note.len() > MAX_NOTE_LEN
    {
        return Err(ValidationError::NoteTooLong(note.len()));
    }
    Ok(())
}

/// Cancelled and no-show reservations are history and stay frozen.
pub(crate) fn check_updatable(status: ReservationStatus) -> Result<(), BusinessRule> {
    match status {
        ReservationStatus::Cancelled => Err(BusinessRule::UpdateCancelled),
        ReservationStatus::NoShow => Err(BusinessRule::UpdateNoShow),
        ReservationStatus::Confirmed | ReservationStatus::CheckedIn => Ok(()),
    }
}

/// Transition table. `Ok(true)` means write the new status, `Ok(false)` means
/// the reservation is already there and nothing changes.
pub(crate) fn check_transition(
    current: ReservationStatus,
    next: ReservationStatus,
) -> Result<bool, BusinessRule> {
    use ReservationStatus::*;
    match (current, next) {
        (Confirmed, CheckedIn) => Ok(true),
        (CheckedIn, CheckedIn) => Err(BusinessRule::AlreadyCheckedIn),
        (Cancelled, CheckedIn) => Err(BusinessRule::CheckInCancelled),
        (NoShow, CheckedIn) => Err(BusinessRule::CheckInNoShow),

        (Confirmed | CheckedIn, Cancelled) => Ok(true),
        (Cancelled, Cancelled) => Ok(false),
        (NoShow, Cancelled) => Err(BusinessRule::CancelNoShow),

        (Confirmed, NoShow) => Ok(true),
        (NoShow, NoShow) => Ok(false),
        (CheckedIn, NoShow) => Err(BusinessRule::NoShowCheckedIn),
        (Cancelled, NoShow) => Err(BusinessRule::NoShowCancelled),

        (Confirmed, Confirmed) => Ok(false),
        (_, Confirmed) => Err(BusinessRule::Reopen),
    }
}
