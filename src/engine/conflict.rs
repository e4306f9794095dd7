use crate::limits::*;
use crate::model::*;

use super::BookingError;

pub(crate) fn validate_window(start: Ms, end: Ms) -> Result<Span, BookingError> {
    if start >= end {
        return Err(BookingError::Validation("start must be before end"));
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(BookingError::LimitExceeded("timestamp out of range"));
    }
    let span = Span::new(start, end);
    if span.duration_ms() > MAX_BOOKING_DURATION_MS {
        return Err(BookingError::LimitExceeded("booking too long"));
    }
    Ok(span)
}

pub(crate) fn validate_text(contact: &str, comments: &str) -> Result<(), BookingError> {
    if contact.len() > MAX_CONTACT_LEN {
        return Err(BookingError::LimitExceeded("contact too long"));
    }
    if comments.len() > MAX_COMMENTS_LEN {
        return Err(BookingError::LimitExceeded("comments too long"));
    }
    Ok(())
}

/// Fails with `DatesConflict` if an accepted booking in `existing` overlaps `span`.
///
/// Pending bookings never block: several tentative requests may share a slot.
/// Rejected and cancelled bookings are inert. `exclude` skips the booking
/// that is itself being accepted.
pub(crate) fn check_no_conflict(
    span: &Span,
    existing: &[Booking],
    exclude: Option<BookingId>,
) -> Result<(), BookingError> {
    for booking in existing {
        if Some(booking.id) == exclude {
            continue;
        }
        match booking.status {
            BookingStatus::Accepted if booking.span.overlaps(span) => {
                return Err(BookingError::DatesConflict(booking.id));
            }
            _ => {}
        }
    }
    Ok(())
}
