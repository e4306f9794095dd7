use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::engine::{BookingError, Missing};
use crate::limits::MAX_BOOKINGS_PER_TOOL;
use crate::model::*;

use super::BookingStore;

pub struct MemoryStore {
    bookings: DashMap<BookingId, Booking>,
    /// tool → (start, booking id), sorted by start.
    by_tool: DashMap<ToolId, Vec<(Ms, BookingId)>>,
    by_owner: DashMap<UserId, Vec<BookingId>>,
    by_requester: DashMap<UserId, Vec<BookingId>>,
    tool_cap: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_tool_cap(MAX_BOOKINGS_PER_TOOL)
    }

    /// A store that admits at most `tool_cap` bookings per tool.
    pub fn with_tool_cap(tool_cap: usize) -> Self {
        Self {
            bookings: DashMap::new(),
            by_tool: DashMap::new(),
            by_owner: DashMap::new(),
            by_requester: DashMap::new(),
            tool_cap,
        }
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    pub fn lookup(&self, id: &BookingId) -> Option<Booking> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    /// Checks that `booking` may be stored, without storing it.
    pub(crate) fn admit(&self, booking: &Booking) -> Result<(), BookingError> {
        if self.bookings.contains_key(&booking.id) {
            return Err(BookingError::Validation("booking id already exists"));
        }
        let on_tool = self.by_tool.get(&booking.tool_id).map_or(0, |v| v.len());
        if on_tool >= self.tool_cap {
            return Err(BookingError::LimitExceeded("too many bookings on tool"));
        }
        Ok(())
    }

    /// Store and index without checks. Callers run `admit` first.
    pub(crate) fn put(&self, booking: Booking) {
        let (id, tool_id, start) = (booking.id, booking.tool_id, booking.span.start);
        self.by_owner.entry(booking.owner_id).or_default().push(id);
        self.by_requester.entry(booking.requester_id).or_default().push(id);
        self.bookings.insert(id, booking);

        let mut slots = self.by_tool.entry(tool_id).or_default();
        let pos = slots.partition_point(|(s, _)| *s <= start);
        slots.insert(pos, (start, id));
    }

    pub(crate) fn swap_status(
        &self,
        id: BookingId,
        expected: BookingStatus,
        new: BookingStatus,
    ) -> Result<Option<Booking>, BookingError> {
        let mut entry = self
            .bookings
            .get_mut(&id)
            .ok_or(BookingError::NotFound(Missing::Booking(id)))?;
        if entry.status != expected {
            return Ok(None);
        }
        entry.status = new;
        Ok(Some(entry.value().clone()))
    }

    /// Apply a WAL event during replay. Events were validated before they were logged.
    pub(crate) fn apply_event(&self, event: &Event) {
        match event {
            Event::BookingCreated(booking) => {
                if !self.bookings.contains_key(&booking.id) {
                    self.put(booking.clone());
                }
            }
            Event::StatusChanged { id, from, to, .. } => {
                let _ = self.swap_status(*id, *from, *to);
            }
        }
    }

    /// Every booking, ordered by id.
    pub fn snapshot(&self) -> Vec<Booking> {
        let mut all: Vec<Booking> = self.bookings.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|b| b.id);
        all
    }

    pub fn status_counts(&self) -> HashMap<BookingStatus, usize> {
        let mut counts = HashMap::new();
        for entry in self.bookings.iter() {
            *counts.entry(entry.value().status).or_insert(0) += 1;
        }
        counts
    }

    fn resolve(&self, ids: Vec<BookingId>) -> Vec<Booking> {
        ids.iter().filter_map(|id| self.lookup(id)).collect()
    }

    fn resolve_sorted(&self, mut ids: Vec<BookingId>) -> Vec<Booking> {
        ids.sort();
        self.resolve(ids)
    }

    pub(crate) fn tool_bookings(&self, tool_id: ToolId, status: Option<BookingStatus>) -> Vec<Booking> {
        // Copy the ids out so the index shard is not held while reading bookings.
        let ids: Vec<BookingId> = self
            .by_tool
            .get(&tool_id)
            .map(|slots| slots.iter().map(|(_, id)| *id).collect())
            .unwrap_or_default();
        let mut bookings = self.resolve(ids);
        if let Some(status) = status {
            bookings.retain(|b| b.status == status);
        }
        bookings
    }

    pub(crate) fn owner_bookings(&self, owner_id: UserId) -> Vec<Booking> {
        let ids = self
            .by_owner
            .get(&owner_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        self.resolve_sorted(ids)
    }

    pub(crate) fn requester_bookings(&self, requester_id: UserId) -> Vec<Booking> {
        let ids = self
            .by_requester
            .get(&requester_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        self.resolve_sorted(ids)
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert(&self, booking: Booking) -> Result<(), BookingError> {
        self.admit(&booking)?;
        self.put(booking);
        Ok(())
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, BookingError> {
        Ok(self.lookup(&id))
    }

    async fn list_for_tool(
        &self,
        tool_id: ToolId,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, BookingError> {
        Ok(self.tool_bookings(tool_id, status))
    }

    async fn list_by_owner(&self, owner_id: UserId) -> Result<Vec<Booking>, BookingError> {
        Ok(self.owner_bookings(owner_id))
    }

    async fn list_by_requester(&self, requester_id: UserId) -> Result<Vec<Booking>, BookingError> {
        Ok(self.requester_bookings(requester_id))
    }

    async fn compare_and_set_status(
        &self,
        id: BookingId,
        expected: BookingStatus,
        new: BookingStatus,
    ) -> Result<Option<Booking>, BookingError> {
        self.swap_status(id, expected, new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn booking(tool_id: ToolId, owner: UserId, requester: UserId, start: Ms, end: Ms) -> Booking {
        Booking {
            id: Ulid::new(),
            tool_id,
            requester_id: requester,
            owner_id: owner,
            span: Span::new(start, end),
            status: BookingStatus::Pending,
            contact: String::new(),
            comments: String::new(),
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn tool_listing_sorted_by_start() {
        let store = MemoryStore::new();
        let (owner, req) = (Ulid::new(), Ulid::new());
        store.insert(booking(1, owner, req, 300, 400)).await.unwrap();
        store.insert(booking(1, owner, req, 100, 200)).await.unwrap();
        store.insert(booking(1, owner, req, 200, 300)).await.unwrap();
        store.insert(booking(2, owner, req, 0, 50)).await.unwrap();

        let starts: Vec<Ms> = store
            .list_for_tool(1, None)
            .await
            .unwrap()
            .iter()
            .map(|b| b.span.start)
            .collect();
        assert_eq!(starts, vec![100, 200, 300]);
        assert_eq!(store.list_for_tool(2, None).await.unwrap().len(), 1);
        assert!(store.list_for_tool(3, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tool_listing_status_filter() {
        let store = MemoryStore::new();
        let (owner, req) = (Ulid::new(), Ulid::new());
        let a = booking(1, owner, req, 0, 100);
        let b = booking(1, owner, req, 0, 100);
        store.insert(a.clone()).await.unwrap();
        store.insert(b.clone()).await.unwrap();
        store
            .compare_and_set_status(a.id, BookingStatus::Pending, BookingStatus::Accepted)
            .await
            .unwrap();

        let accepted = store.list_for_tool(1, Some(BookingStatus::Accepted)).await.unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].id, a.id);
        let pending = store.list_for_tool(1, Some(BookingStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
    }

    #[tokio::test]
    async fn owner_and_requester_indexes() {
        let store = MemoryStore::new();
        let (alice, bob, carol) = (Ulid::new(), Ulid::new(), Ulid::new());
        let b1 = booking(1, alice, bob, 0, 10);
        let b2 = booking(2, alice, carol, 0, 10);
        let b3 = booking(3, bob, carol, 0, 10);
        for b in [&b1, &b2, &b3] {
            store.insert(b.clone()).await.unwrap();
        }

        let alice_owned: Vec<_> = store.list_by_owner(alice).await.unwrap().iter().map(|b| b.id).collect();
        let mut expected = vec![b1.id, b2.id];
        expected.sort();
        assert_eq!(alice_owned, expected);

        let carol_made: Vec<_> = store.list_by_requester(carol).await.unwrap().iter().map(|b| b.id).collect();
        let mut expected = vec![b2.id, b3.id];
        expected.sort();
        assert_eq!(carol_made, expected);

        assert!(store.list_by_requester(alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn compare_and_set_only_from_expected() {
        let store = MemoryStore::new();
        let b = booking(1, Ulid::new(), Ulid::new(), 0, 10);
        store.insert(b.clone()).await.unwrap();

        let first = store
            .compare_and_set_status(b.id, BookingStatus::Pending, BookingStatus::Rejected)
            .await
            .unwrap();
        assert_eq!(first.unwrap().status, BookingStatus::Rejected);

        let second = store
            .compare_and_set_status(b.id, BookingStatus::Pending, BookingStatus::Accepted)
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(store.lookup(&b.id).unwrap().status, BookingStatus::Rejected);
    }

    #[tokio::test]
    async fn compare_and_set_unknown_id() {
        let store = MemoryStore::new();
        let result = store
            .compare_and_set_status(Ulid::new(), BookingStatus::Pending, BookingStatus::Accepted)
            .await;
        assert!(matches!(result, Err(BookingError::NotFound(Missing::Booking(_)))));
    }

    #[tokio::test]
    async fn duplicate_id_rejected() {
        let store = MemoryStore::new();
        let b = booking(1, Ulid::new(), Ulid::new(), 0, 10);
        store.insert(b.clone()).await.unwrap();
        let result = store.insert(b).await;
        assert!(matches!(result, Err(BookingError::Validation(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn replay_applies_events_in_order() {
        let store = MemoryStore::new();
        let b = booking(1, Ulid::new(), Ulid::new(), 0, 10);
        store.apply_event(&Event::BookingCreated(b.clone()));
        store.apply_event(&Event::StatusChanged {
            id: b.id,
            tool_id: 1,
            from: BookingStatus::Pending,
            to: BookingStatus::Cancelled,
        });
        // Replaying the creation again must not reset the status.
        store.apply_event(&Event::BookingCreated(b.clone()));
        assert_eq!(store.lookup(&b.id).unwrap().status, BookingStatus::Cancelled);
        assert_eq!(store.tool_bookings(1, None).len(), 1);
        assert_eq!(store.status_counts().get(&BookingStatus::Cancelled), Some(&1));
    }
}
