use tracing::{debug, info};

use crate::model::*;
use crate::observability::{
    BOOKINGS_CREATED_TOTAL, DATES_CONFLICTS_TOTAL, INVALID_TRANSITIONS_TOTAL,
    STATUS_TRANSITIONS_TOTAL,
};

use super::conflict::{check_no_conflict, validate_text, validate_window};
use super::{BookingError, BookingService, Transition};

impl BookingService {
    /// Record a new pending booking. `now` becomes its creation time.
    pub async fn create(&self, req: CreateBooking, now: Ms) -> Result<Booking, BookingError> {
        let span = validate_window(req.start, req.end)?;
        validate_text(&req.contact, &req.comments)?;
        let tool = self.resolve_tool(req.tool_id).await?;
        if tool.owner_id != req.owner_id {
            return Err(BookingError::Validation("owner does not own this tool"));
        }
        self.resolve_user(req.requester_id).await?;

        let _tool_guard = self.locks.lock(tool.id).await;
        let accepted = self
            .store
            .list_for_tool(tool.id, Some(BookingStatus::Accepted))
            .await?;
        if let Err(e) = check_no_conflict(&span, &accepted, None) {
            debug!("create on tool {} refused: {e}", tool.id);
            metrics::counter!(DATES_CONFLICTS_TOTAL, "op" => "create").increment(1);
            return Err(e);
        }

        let booking = Booking {
            id: self.next_id(),
            tool_id: tool.id,
            requester_id: req.requester_id,
            owner_id: tool.owner_id,
            span,
            status: BookingStatus::Pending,
            contact: req.contact,
            comments: req.comments,
            created_at: now,
        };
        self.store.insert(booking.clone()).await?;

        info!(
            "booking {} created on tool {} for [{}, {})",
            booking.id, booking.tool_id, span.start, span.end
        );
        metrics::counter!(BOOKINGS_CREATED_TOTAL).increment(1);
        Ok(booking)
    }

    /// Move a booking to `to`, following the state machine.
    ///
    /// Acceptance is delegated to `attempt_accept` and so is conflict-checked;
    /// rejection and cancellation are not.
    pub async fn update_status(
        &self,
        id: BookingId,
        to: BookingStatus,
    ) -> Result<Booking, BookingError> {
        let booking = self.get(id).await?;
        match self.plan(&booking, to)? {
            Transition::Accept => self.attempt_accept(id).await,
            transition => self.commit(&booking, transition).await,
        }
    }

    /// Like `update_status`, with the target given by name. Unknown names are
    /// invalid transitions.
    pub async fn update_status_str(&self, id: BookingId, to: &str) -> Result<Booking, BookingError> {
        self.get(id).await?;
        let to = to.parse::<BookingStatus>().inspect_err(|e| {
            debug!("status change of {id} refused: {e}");
            metrics::counter!(INVALID_TRANSITIONS_TOTAL).increment(1);
        })?;
        self.update_status(id, to).await
    }

    /// Pending → Accepted, re-checking overlap against every other accepted
    /// booking on the tool while holding the tool's lock.
    pub async fn attempt_accept(&self, id: BookingId) -> Result<Booking, BookingError> {
        let booking = self.get(id).await?;
        self.plan(&booking, BookingStatus::Accepted)?;

        let _tool_guard = self.locks.lock(booking.tool_id).await;
        let accepted = self
            .store
            .list_for_tool(booking.tool_id, Some(BookingStatus::Accepted))
            .await?;
        if let Err(e) = check_no_conflict(&booking.span, &accepted, Some(id)) {
            debug!("accept of {id} refused: {e}");
            metrics::counter!(DATES_CONFLICTS_TOTAL, "op" => "accept").increment(1);
            return Err(e);
        }
        self.commit(&booking, Transition::Accept).await
    }

    fn plan(&self, booking: &Booking, to: BookingStatus) -> Result<Transition, BookingError> {
        Transition::between(booking.status, to).inspect_err(|e| {
            debug!("status change of {} refused: {e}", booking.id);
            metrics::counter!(INVALID_TRANSITIONS_TOTAL).increment(1);
        })
    }

    /// Conditional write Pending → target. If the status moved since `booking`
    /// was read, report the transition from the status it moved to.
    async fn commit(&self, booking: &Booking, transition: Transition) -> Result<Booking, BookingError> {
        let to = transition.target();
        match self
            .store
            .compare_and_set_status(booking.id, BookingStatus::Pending, to)
            .await?
        {
            Some(updated) => {
                info!("booking {} on tool {} is now {to}", updated.id, updated.tool_id);
                metrics::counter!(STATUS_TRANSITIONS_TOTAL, "to" => to.as_str()).increment(1);
                Ok(updated)
            }
            None => {
                let current = self.get(booking.id).await?;
                debug!("booking {} moved to {} concurrently", booking.id, current.status);
                metrics::counter!(INVALID_TRANSITIONS_TOTAL).increment(1);
                Err(BookingError::InvalidTransition { from: current.status, to })
            }
        }
    }
}
