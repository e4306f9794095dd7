use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::BookingError;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Tools live in an external catalog keyed by integer id.
pub type ToolId = u64;
pub type UserId = Ulid;
pub type BookingId = Ulid;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::Accepted,
        BookingStatus::Rejected,
        BookingStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "accepted" => Ok(BookingStatus::Accepted),
            "rejected" => Ok(BookingStatus::Rejected),
            "cancelled" => Ok(BookingStatus::Cancelled),
            _ => Err(BookingError::UnknownStatus(s.to_string())),
        }
    }
}

/// A reservation of one tool by one user. Tool and users are referenced by id only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub tool_id: ToolId,
    pub requester_id: UserId,
    /// Owner of the tool when the booking was made.
    pub owner_id: UserId,
    pub span: Span,
    pub status: BookingStatus,
    pub contact: String,
    pub comments: String,
    pub created_at: Ms,
}

/// What the catalog tells us about a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolRef {
    pub id: ToolId,
    pub owner_id: UserId,
}

/// A booking request as it arrives from the application layer.
/// `start`/`end` are unchecked here; the service validates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateBooking {
    pub tool_id: ToolId,
    pub start: Ms,
    pub end: Ms,
    pub requester_id: UserId,
    pub owner_id: UserId,
    pub contact: String,
    pub comments: String,
}

/// Flat event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingCreated(Booking),
    StatusChanged {
        id: BookingId,
        tool_id: ToolId,
        from: BookingStatus,
        to: BookingStatus,
    },
}
