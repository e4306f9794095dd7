mod conflict;
mod error;
mod mutations;
mod queries;
mod transition;

pub use error::{BookingError, ErrorKind, Missing};
pub use transition::Transition;

use std::sync::{Arc, Mutex, PoisonError};

use ulid::{Generator, Ulid};

use crate::directory::Directory;
use crate::locks::ToolLocks;
use crate::model::*;
use crate::store::BookingStore;

/// Booking facade: conflict checks, the status state machine, and lookups.
///
/// Creating and accepting take the tool's lock for the whole
/// read-check-write sequence, so of two overlapping pending bookings at most
/// one can ever become accepted. Rejecting and cancelling rely on the store's
/// compare-and-set alone.
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    directory: Arc<dyn Directory>,
    locks: ToolLocks,
    /// Monotonic within a millisecond, so id order is creation order.
    ids: Mutex<Generator>,
}

impl BookingService {
    pub fn new(store: Arc<dyn BookingStore>, directory: Arc<dyn Directory>) -> Self {
        Self {
            store,
            directory,
            locks: ToolLocks::new(),
            ids: Mutex::new(Generator::new()),
        }
    }

    pub(super) fn next_id(&self) -> BookingId {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        // Overflows only after 2^80 ids in one millisecond.
        ids.generate().unwrap_or_else(|_| Ulid::new())
    }

    pub(super) async fn resolve_tool(&self, tool_id: ToolId) -> Result<ToolRef, BookingError> {
        self.directory
            .tool(tool_id)
            .await
            .ok_or(BookingError::NotFound(Missing::Tool(tool_id)))
    }

    pub(super) async fn resolve_user(&self, user_id: UserId) -> Result<(), BookingError> {
        if self.directory.user_exists(user_id).await {
            Ok(())
        } else {
            Err(BookingError::NotFound(Missing::User(user_id)))
        }
    }
}
