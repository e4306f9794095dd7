mod durable;
mod memory;

pub use durable::WalStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::engine::BookingError;
use crate::model::*;

/// Persistence for bookings. Bookings are never deleted; only their status moves.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert(&self, booking: Booking) -> Result<(), BookingError>;

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, BookingError>;

    /// Bookings on a tool ordered by start, optionally only those in `status`.
    async fn list_for_tool(
        &self,
        tool_id: ToolId,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, BookingError>;

    /// Ordered by booking id.
    async fn list_by_owner(&self, owner_id: UserId) -> Result<Vec<Booking>, BookingError>;

    /// Ordered by booking id.
    async fn list_by_requester(&self, requester_id: UserId) -> Result<Vec<Booking>, BookingError>;

    /// Set the status to `new` only if it is currently `expected`.
    ///
    /// Returns the updated booking, or `None` if the status had already moved.
    /// Fails with `NotFound` for an unknown id.
    async fn compare_and_set_status(
        &self,
        id: BookingId,
        expected: BookingStatus,
        new: BookingStatus,
    ) -> Result<Option<Booking>, BookingError>;
}
