use crate::model::Secs;

/// Smallest party a table can be booked for.
pub const MIN_PARTY_SIZE: u32 = 1;

/// Largest party the booking engine accepts, regardless of table capacity.
pub const MAX_PARTY_SIZE: u32 = 20;

/// Max bytes in a special-request note.
pub const MAX_NOTE_LEN: usize = 500;

/// Default turnover gap between two bookings on one table (15 minutes).
pub const DEFAULT_BUFFER_SECS: Secs = 15 * 60;

/// WAL writer channel depth before appenders start waiting.
pub const WAL_CHANNEL_CAPACITY: usize = 4096;

/// Largest encoded WAL payload. A bigger length prefix on replay is treated
/// as a torn tail.
pub const MAX_WAL_RECORD_LEN: usize = 1 << 20;
