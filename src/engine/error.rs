use std::fmt;

use crate::model::{BookingId, BookingStatus, ToolId, UserId};

/// The entity a lookup failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Tool(ToolId),
    Booking(BookingId),
    User(UserId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Tool(id) => write!(f, "tool {id}"),
            Missing::Booking(id) => write!(f, "booking {id}"),
            Missing::User(id) => write!(f, "user {id}"),
        }
    }
}

#[derive(Debug)]
pub enum BookingError {
    Validation(&'static str),
    LimitExceeded(&'static str),
    NotFound(Missing),
    /// Carries the id of the accepted booking that blocks the window.
    DatesConflict(BookingId),
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    UnknownStatus(String),
    WalError(String),
}

/// Caller-facing signal. Several variants collapse onto one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    DatesConflict,
    InvalidTransition,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::DatesConflict => "dates_conflict",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::Storage => "storage",
        }
    }
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::Validation(_) | BookingError::LimitExceeded(_) => ErrorKind::Validation,
            BookingError::NotFound(_) => ErrorKind::NotFound,
            BookingError::DatesConflict(_) => ErrorKind::DatesConflict,
            BookingError::InvalidTransition { .. } | BookingError::UnknownStatus(_) => {
                ErrorKind::InvalidTransition
            }
            BookingError::WalError(_) => ErrorKind::Storage,
        }
    }
}

impl fmt::Display for BookingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingError::Validation(msg) => write!(f, "invalid booking: {msg}"),
            BookingError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            BookingError::NotFound(what) => write!(f, "not found: {what}"),
            BookingError::DatesConflict(id) => {
                write!(f, "booking dates conflict with accepted booking {id}")
            }
            BookingError::InvalidTransition { from, to } => {
                write!(f, "invalid status transition: {from} -> {to}")
            }
            BookingError::UnknownStatus(s) => {
                write!(f, "invalid status transition: unknown status {s:?}")
            }
            BookingError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for BookingError {}
