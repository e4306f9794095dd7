use crate::model::BookingStatus;

use super::BookingError;

/// The three moves out of `Pending`. Every other edge is invalid.
///
/// `Accept` is kept distinct so callers must route it through the overlap
/// re-check; see `BookingService::attempt_accept`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Owner confirms.
    Accept,
    /// Owner declines.
    Reject,
    /// Requester withdraws.
    Cancel,
}

impl Transition {
    pub fn between(from: BookingStatus, to: BookingStatus) -> Result<Self, BookingError> {
        let invalid = BookingError::InvalidTransition { from, to };
        if from != BookingStatus::Pending {
            return Err(invalid);
        }
        match to {
            BookingStatus::Accepted => Ok(Transition::Accept),
            BookingStatus::Rejected => Ok(Transition::Reject),
            BookingStatus::Cancelled => Ok(Transition::Cancel),
            BookingStatus::Pending => Err(invalid),
        }
    }

    pub fn target(self) -> BookingStatus {
        match self {
            Transition::Accept => BookingStatus::Accepted,
            Transition::Reject => BookingStatus::Rejected,
            Transition::Cancel => BookingStatus::Cancelled,
        }
    }
}
