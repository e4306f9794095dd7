use crate::model::*;

use super::{BookingError, BookingService, Missing};

impl BookingService {
    pub async fn get(&self, id: BookingId) -> Result<Booking, BookingError> {
        self.store
            .get(id)
            .await?
            .ok_or(BookingError::NotFound(Missing::Booking(id)))
    }

    /// Bookings on tools `user_id` owns: the requests awaiting their answer.
    pub async fn user_requests(&self, user_id: UserId) -> Result<Vec<Booking>, BookingError> {
        self.resolve_user(user_id).await?;
        self.store.list_by_owner(user_id).await
    }

    /// Bookings `user_id` asked for.
    pub async fn user_petitions(&self, user_id: UserId) -> Result<Vec<Booking>, BookingError> {
        self.resolve_user(user_id).await?;
        self.store.list_by_requester(user_id).await
    }

    /// A tool's schedule, ordered by start.
    pub async fn tool_bookings(
        &self,
        tool_id: ToolId,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, BookingError> {
        self.resolve_tool(tool_id).await?;
        self.store.list_for_tool(tool_id, status).await
    }
}
