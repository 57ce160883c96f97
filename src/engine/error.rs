use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::model::ReservationId;

/// Coarse error class for callers that map failures onto transport codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    BusinessRule,
    Storage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::BusinessRule => "business_rule",
            ErrorKind::Storage => "storage",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Customer,
    Table,
    Reservation,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Entity::Customer => "customer",
            Entity::Table => "table",
            Entity::Reservation => "reservation",
        })
    }
}

/// Which input rule a request broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    PastDate { date: NaiveDate, today: NaiveDate },
    InvalidTimeRange { start: NaiveTime, end: NaiveTime },
    PartySizeOutOfBounds(u32),
    ExceedsCapacity { party_size: u32, capacity: u32 },
    OutsideOperatingHours { opening: NaiveTime, closing: NaiveTime },
    NoteTooLong(usize),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use crate::limits::*;
        match self {
            ValidationError::PastDate { date, today } => {
                write!(f, "reservation date {date} is before today ({today})")
            }
            ValidationError::InvalidTimeRange { start, end } => {
                write!(f, "start time {start} must be before end time {end}")
            }
            ValidationError::PartySizeOutOfBounds(n) => {
                write!(f, "party size {n} outside {MIN_PARTY_SIZE}..={MAX_PARTY_SIZE}")
            }
            ValidationError::ExceedsCapacity { party_size, capacity } => {
                write!(f, "party size {party_size} exceeds table capacity {capacity}")
            }
            ValidationError::OutsideOperatingHours { opening, closing } => {
                write!(f, "requested time must fall within operating hours {opening}-{closing}")
            }
            ValidationError::NoteTooLong(len) => {
                write!(f, "note is {len} bytes, limit is {MAX_NOTE_LEN}")
            }
        }
    }
}

/// Lifecycle rules. Each variant carries a fixed message naming the rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusinessRule {
    AlreadyCheckedIn,
    CheckInCancelled,
    CheckInNoShow,
    CancelNoShow,
    UpdateCancelled,
    UpdateNoShow,
    NoShowCheckedIn,
    NoShowCancelled,
    Reopen,
    TableUnavailable,
}

impl BusinessRule {
    pub fn message(self) -> &'static str {
        match self {
            BusinessRule::AlreadyCheckedIn => "already checked in",
            BusinessRule::CheckInCancelled => "cannot check in a cancelled reservation",
            BusinessRule::CheckInNoShow => "cannot check in a no-show reservation",
            BusinessRule::CancelNoShow => "cannot cancel a no-show reservation",
            BusinessRule::UpdateCancelled => "cannot update a cancelled reservation",
            BusinessRule::UpdateNoShow => "cannot update a no-show reservation",
            BusinessRule::NoShowCheckedIn => "cannot mark a checked-in reservation as no-show",
            BusinessRule::NoShowCancelled => "cannot mark a cancelled reservation as no-show",
            BusinessRule::Reopen => "cannot return a reservation to confirmed",
            BusinessRule::TableUnavailable => "table is not available for booking",
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    Validation(ValidationError),
    NotFound { entity: Entity, id: Ulid },
    /// Overlap (buffer included) with the given active reservation.
    Conflict(ReservationId),
    BusinessRule(BusinessRule),
    AlreadyExists(ReservationId),
    Storage(String),
}

impl EngineError {
    pub fn not_found(entity: Entity, id: Ulid) -> Self {
        EngineError::NotFound { entity, id }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Conflict(_) | EngineError::AlreadyExists(_) => ErrorKind::Conflict,
            EngineError::BusinessRule(_) => ErrorKind::BusinessRule,
            EngineError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(e: ValidationError) -> Self {
        EngineError::Validation(e)
    }
}

impl From<BusinessRule> for EngineError {
    fn from(rule: BusinessRule) -> Self {
        EngineError::BusinessRule(rule)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(e) => write!(f, "validation failed: {e}"),
            EngineError::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            EngineError::Conflict(id) => write!(f, "conflict with reservation: {id}"),
            EngineError::BusinessRule(rule) => f.write_str(rule.message()),
            EngineError::AlreadyExists(id) => write!(f, "reservation already exists: {id}"),
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinct_per_family() {
        let id = Ulid::new();
        assert_eq!(EngineError::Conflict(id).kind(), ErrorKind::Conflict);
        assert_eq!(EngineError::AlreadyExists(id).kind(), ErrorKind::Conflict);
        assert_eq!(
            EngineError::not_found(Entity::Table, id).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            EngineError::from(ValidationError::PartySizeOutOfBounds(0)).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            EngineError::from(BusinessRule::AlreadyCheckedIn).kind(),
            ErrorKind::BusinessRule
        );
    }

    #[test]
    fn business_rule_message_is_the_display() {
        let err = EngineError::from(BusinessRule::AlreadyCheckedIn);
        assert_eq!(err.to_string(), "already checked in");
        let err = EngineError::from(BusinessRule::CheckInCancelled);
        assert_eq!(err.to_string(), "cannot check in a cancelled reservation");
    }

    #[test]
    fn not_found_names_the_entity() {
        let id = Ulid::new();
        let msg = EngineError::not_found(Entity::Customer, id).to_string();
        assert_eq!(msg, format!("customer not found: {id}"));
    }
}
