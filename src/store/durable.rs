use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, error, info, warn};

use crate::engine::{BookingError, Missing};
use crate::locks::ToolLocks;
use crate::model::*;
use crate::observability;
use crate::wal::Wal;

use super::{BookingStore, MemoryStore};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
    #[cfg(test)]
    FailNextFlush { written: usize },
}

type Pending = Vec<(Event, oneshot::Sender<io::Result<()>>)>;

/// Owns the WAL. Drains every append already queued behind the first one
/// and commits them with a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch: Pending = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            warn!("WAL flush of {} events failed: {e}", batch.len());
        }
        for (_, tx) in batch {
            let _ = tx.send(match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            });
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

/// Commit the batch or, on any failure, leave the log as it was before it.
fn flush_batch(wal: &mut Wal, batch: &Pending) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if result.is_err() {
        if let Err(e) = wal.rollback() {
            error!("WAL rollback failed, refusing appends until compaction: {e}");
        }
    }
    result
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        #[cfg(test)]
        WalCommand::FailNextFlush { written } => wal.fail_next_flush(written),
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// `MemoryStore` made durable by a write-ahead log.
///
/// Every mutation is logged before it is applied, so a failed write leaves
/// memory untouched, and the failed batch is cut from the log. Mutations on one tool are serialised; `compact` excludes
/// all mutations while it snapshots and swaps the log.
pub struct WalStore {
    memory: MemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
    locks: ToolLocks,
    gate: RwLock<()>,
}

impl WalStore {
    /// Replay the log at `path` and start its writer task. Must be called
    /// from within a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let (wal, events) = Wal::recover(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let memory = MemoryStore::new();
        for event in &events {
            memory.apply_event(event);
        }
        info!(
            "opened booking log {} ({} events, {} bookings)",
            path.display(),
            events.len(),
            memory.len()
        );

        Ok(Self {
            memory,
            wal_tx,
            locks: ToolLocks::new(),
            gate: RwLock::new(()),
        })
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    async fn wal_append(&self, event: Event) -> Result<(), BookingError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { event, response: tx })
            .await
            .map_err(|_| BookingError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| BookingError::WalError(e.to_string()))
    }

    /// Rewrite the log as one `BookingCreated` per booking, carrying its current status.
    pub async fn compact(&self) -> Result<(), BookingError> {
        let _exclusive = self.gate.write().await;
        let events: Vec<Event> = self
            .memory
            .snapshot()
            .into_iter()
            .map(Event::BookingCreated)
            .collect();
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| BookingError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| BookingError::WalError(e.to_string()))?;
        debug!("compacted booking log to {count} events");
        Ok(())
    }

    #[cfg(test)]
    async fn fail_next_flush(&self, written: usize) {
        self.wal_tx
            .send(WalCommand::FailNextFlush { written })
            .await
            .unwrap();
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl BookingStore for WalStore {
    async fn insert(&self, booking: Booking) -> Result<(), BookingError> {
        let _shared = self.gate.read().await;
        let _tool = self.locks.lock(booking.tool_id).await;
        self.memory.admit(&booking)?;
        self.wal_append(Event::BookingCreated(booking.clone())).await?;
        self.memory.put(booking);
        Ok(())
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, BookingError> {
        Ok(self.memory.lookup(&id))
    }

    async fn list_for_tool(
        &self,
        tool_id: ToolId,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, BookingError> {
        Ok(self.memory.tool_bookings(tool_id, status))
    }

    async fn list_by_owner(&self, owner_id: UserId) -> Result<Vec<Booking>, BookingError> {
        Ok(self.memory.owner_bookings(owner_id))
    }

    async fn list_by_requester(&self, requester_id: UserId) -> Result<Vec<Booking>, BookingError> {
        Ok(self.memory.requester_bookings(requester_id))
    }

    async fn compare_and_set_status(
        &self,
        id: BookingId,
        expected: BookingStatus,
        new: BookingStatus,
    ) -> Result<Option<Booking>, BookingError> {
        let _shared = self.gate.read().await;
        let tool_id = self
            .memory
            .lookup(&id)
            .ok_or(BookingError::NotFound(Missing::Booking(id)))?
            .tool_id;
        let _tool = self.locks.lock(tool_id).await;

        // Re-read under the tool lock; the status may have moved while we waited.
        let current = self
            .memory
            .lookup(&id)
            .ok_or(BookingError::NotFound(Missing::Booking(id)))?;
        if current.status != expected {
            return Ok(None);
        }
        self.wal_append(Event::StatusChanged { id, tool_id, from: expected, to: new })
            .await?;
        self.memory.swap_status(id, expected, new)
    }
}
