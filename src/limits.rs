use crate::model::Ms;

/// 1970-01-01T00:00:00Z.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;

/// 10000-01-01T00:00:00Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_800_000;

/// A single booking may not lend a tool out for more than a year.
pub const MAX_BOOKING_DURATION_MS: Ms = 366 * 24 * 3_600_000;

pub const MAX_CONTACT_LEN: usize = 256;
pub const MAX_COMMENTS_LEN: usize = 4096;

/// Bookings of every status count toward this, since none are ever deleted.
pub const MAX_BOOKINGS_PER_TOOL: usize = 100_000;

/// Largest WAL payload a valid event can encode to. Booking ids and fixed
/// fields fit well inside the headroom on top of the two text fields.
pub const MAX_FRAME_LEN: usize = MAX_CONTACT_LEN + MAX_COMMENTS_LEN + 1024;
