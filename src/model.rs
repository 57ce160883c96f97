use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Seconds since midnight. All interval math works in this unit.
pub type Secs = i64;

/// Money in minor currency units (cents).
pub type Cents = i64;

pub type TableId = Ulid;
pub type CustomerId = Ulid;
pub type ReservationId = Ulid;

pub const SECS_PER_HOUR: Secs = 3_600;
pub const SECS_PER_MINUTE: Secs = 60;

/// Half-open time-of-day interval `[start, end)` on a single calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Secs,
    pub end: Secs,
}

impl Span {
    pub fn new(start: Secs, end: Secs) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Build a span from two wall-clock times. Sub-second precision is dropped.
    pub fn of_day(start: NaiveTime, end: NaiveTime) -> Self {
        Self::new(secs_of_day(start), secs_of_day(end))
    }

    pub fn duration_secs(&self) -> Secs {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

pub fn secs_of_day(t: NaiveTime) -> Secs {
    t.num_seconds_from_midnight() as Secs
}

/// Operational status of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Available,
    Maintenance,
}

/// A bookable café table. Owned by the registry; read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    /// Number shown to guests and staff.
    pub number: u32,
    pub capacity: u32,
    #[serde(default)]
    pub window_seat: bool,
    #[serde(default)]
    pub accessible: bool,
    pub hourly_rate: Cents,
    pub status: TableStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Confirmed,
    CheckedIn,
    Cancelled,
    NoShow,
}

impl ReservationStatus {
    /// Active reservations occupy their table and take part in conflict checks.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Confirmed | Self::CheckedIn)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::CheckedIn => "checked_in",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub customer_id: CustomerId,
    pub table_id: TableId,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub party_size: u32,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl Reservation {
    pub fn span(&self) -> Span {
        Span::of_day(self.start, self.end)
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Input to `Engine::create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReservation {
    pub customer_id: CustomerId,
    pub table_id: TableId,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub party_size: u32,
    #[serde(default)]
    pub note: Option<String>,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationPatch {
    #[serde(default)]
    pub table_id: Option<TableId>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub start: Option<NaiveTime>,
    #[serde(default)]
    pub end: Option<NaiveTime>,
    #[serde(default)]
    pub party_size: Option<u32>,
    #[serde(default)]
    pub note: Option<String>,
}

impl ReservationPatch {
    /// Merge the provided fields over `current`.
    pub fn merge(&self, current: &Reservation) -> Reservation {
        Reservation {
            table_id: self.table_id.unwrap_or(current.table_id),
            date: self.date.unwrap_or(current.date),
            start: self.start.unwrap_or(current.start),
            end: self.end.unwrap_or(current.end),
            party_size: self.party_size.unwrap_or(current.party_size),
            note: self.note.clone().or_else(|| current.note.clone()),
            ..current.clone()
        }
    }

    pub fn moves_slot(&self) -> bool {
        self.table_id.is_some() || self.date.is_some() || self.start.is_some() || self.end.is_some()
    }
}

/// "Which tables are free for this party in this window?"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub party_size: u32,
    #[serde(default)]
    pub window_seat: bool,
    #[serde(default)]
    pub accessible: bool,
}

/// A free table and what the window would cost on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub table: Table,
    pub total_price: Cents,
}

/// WAL record format. One variant per state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated {
        reservation: Reservation,
    },
    ReservationUpdated {
        reservation: Reservation,
    },
    StatusChanged {
        id: ReservationId,
        status: ReservationStatus,
    },
}
