use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::limits::MAX_FRAME_LEN;
use crate::model::Event;

/// Encode a single event as `[len][bincode][crc32]`.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read exactly `buf.len()` bytes. `Ok(false)` means the file ended first.
fn read_frame_part(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Decode the next event and its frame size in bytes.
/// `Ok(None)` at a clean end, a torn frame, or a corrupt frame.
fn decode_event(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; 4];
    if !read_frame_part(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Ok(None);
    }
    let mut payload = vec![0u8; len];
    if !read_frame_part(reader, &mut payload)? {
        return Ok(None);
    }
    let mut crc_buf = [0u8; 4];
    if !read_frame_part(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize::<Event>(&payload)
        .ok()
        .map(|event| (event, (len + 8) as u64)))
}

/// Every intact event at the head of the log, plus the byte length they cover.
fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut valid_len = 0;
    while let Some((event, frame_len)) = decode_event(&mut reader)? {
        events.push(event);
        valid_len += frame_len;
    }
    Ok((events, valid_len))
}

/// Append-only write-ahead log of booking events.
///
/// Entry format: `[u32: len][bincode: Event][u32: crc32]`, little endian.
/// `len` covers the payload only. A torn or corrupt tail (crash mid-write)
/// ends replay; everything before it is kept.
///
/// Appends are staged in memory and reach the file only in `flush_sync`.
/// After a failed flush, `rollback` cuts the file back to the last synced
/// length, so nothing from the failed batch is ever replayed.
pub struct Wal {
    file: File,
    path: PathBuf,
    staged: Vec<u8>,
    staged_events: u64,
    /// File length covered by the last successful `flush_sync`.
    synced_len: u64,
    /// Set when a rollback could not restore the file. Appends are refused until compaction.
    broken: bool,
    appends_since_compact: u64,
    #[cfg(test)]
    injected_failure: Option<usize>,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let synced_len = file.metadata()?.len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            staged: Vec::new(),
            staged_events: 0,
            synced_len,
            broken: false,
            appends_since_compact: 0,
            #[cfg(test)]
            injected_failure: None,
        })
    }

    /// Replay the log and open it for appends, dropping any torn tail first
    /// so new events are not written behind unreadable bytes.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (events, valid_len) = scan(path)?;
        let wal = Self::open(path)?;
        if wal.synced_len > valid_len {
            warn!(
                "discarding {} unreadable bytes at the end of {}",
                wal.synced_len - valid_len,
                path.display()
            );
            wal.file.set_len(valid_len)?;
            wal.file.sync_all()?;
        }
        Ok((Self { synced_len: valid_len, ..wal }, events))
    }

    /// Append and fsync one event. The store batches with `append_buffered` instead.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Stage an event. Not written until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        if self.broken {
            return Err(io::Error::other("WAL refuses appends after a failed rollback"));
        }
        let mark = self.staged.len();
        if let Err(e) = encode_event(&mut self.staged, event) {
            self.staged.truncate(mark);
            return Err(e);
        }
        self.staged_events += 1;
        Ok(())
    }

    /// Write every staged event and fsync.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        #[cfg(test)]
        if let Some(written) = self.injected_failure.take() {
            let written = written.min(self.staged.len());
            self.file.write_all(&self.staged[..written])?;
            return Err(io::Error::other("injected write failure"));
        }
        self.file.write_all(&self.staged)?;
        self.file.sync_all()?;
        self.synced_len += self.staged.len() as u64;
        self.appends_since_compact += self.staged_events;
        self.staged.clear();
        self.staged_events = 0;
        Ok(())
    }

    /// Forget staged events and cut the file back to the last synced length.
    pub fn rollback(&mut self) -> io::Result<()> {
        self.staged.clear();
        self.staged_events = 0;
        let restored = self
            .file
            .set_len(self.synced_len)
            .and_then(|()| self.file.sync_all());
        self.broken = restored.is_err();
        restored
    }

    /// Make the next `flush_sync` write only `written` staged bytes and then fail.
    #[cfg(test)]
    pub fn fail_next_flush(&mut self, written: usize) {
        self.injected_failure = Some(written);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write `events` to a side file and fsync it. Does not touch the live log.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_path(path))?);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the side file over the live log and reopen it for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::compact_path(&self.path), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.synced_len = file.metadata()?.len();
        self.file = file;
        self.staged.clear();
        self.staged_events = 0;
        self.broken = false;
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Events made durable since the last compaction.
    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Read every intact event. A missing file replays as empty.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        scan(path).map(|(events, _)| events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Booking, BookingStatus, Span};
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("toolbook_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn created(tool_id: u64) -> Event {
        Event::BookingCreated(Booking {
            id: Ulid::new(),
            tool_id,
            requester_id: Ulid::new(),
            owner_id: Ulid::new(),
            span: Span::new(1000, 2000),
            status: BookingStatus::Pending,
            contact: "555-0100".into(),
            comments: String::new(),
            created_at: 0,
        })
    }

    fn accepted(event: &Event) -> Event {
        let Event::BookingCreated(b) = event else { unreachable!() };
        Event::StatusChanged {
            id: b.id,
            tool_id: b.tool_id,
            from: BookingStatus::Pending,
            to: BookingStatus::Accepted,
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let first = created(1);
        let events = vec![first.clone(), accepted(&first)];

        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }

        assert_eq!(Wal::replay(&path).unwrap(), events);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_discards_torn_tail() {
        let path = tmp_path("torn_tail.wal");
        let event = created(1);
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&event).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0u8; 6]).unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), vec![event]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_nonexistent_file() {
        let path = tmp_path("nonexistent.wal");
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn replay_stops_at_bad_crc() {
        let path = tmp_path("bad_crc.wal");
        let good = created(1);
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&good).unwrap();
        }
        {
            let payload = bincode::serialize(&created(2)).unwrap();
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEADBEEFu32.to_le_bytes()).unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), vec![good]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_then_append() {
        let path = tmp_path("compact_append.wal");
        let first = created(1);
        let later = created(2);

        {
            let mut wal = Wal::open(&path).unwrap();
            for _ in 0..10 {
                wal.append(&created(9)).unwrap();
            }
            let before = fs::metadata(&path).unwrap().len();

            wal.compact(std::slice::from_ref(&first)).unwrap();
            assert_eq!(wal.appends_since_compact(), 0);
            let after = fs::metadata(&path).unwrap().len();
            assert!(after < before, "compacted WAL should be smaller: {after} < {before}");

            wal.append(&later).unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), vec![first, later]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn buffered_appends_are_counted() {
        let path = tmp_path("buffered.wal");
        let events: Vec<Event> = (0..5).map(created).collect();
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append_buffered(e).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 0);
            wal.flush_sync().unwrap();
            assert_eq!(wal.appends_since_compact(), 5);
        }
        assert_eq!(Wal::replay(&path).unwrap(), events);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn rollback_discards_failed_batch() {
        let path = tmp_path("rollback.wal");
        let kept = created(1);
        let later = created(3);
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&kept).unwrap();

            let lost = created(2);
            wal.append_buffered(&lost).unwrap();
            wal.append_buffered(&accepted(&lost)).unwrap();
            wal.fail_next_flush(11);
            assert!(wal.flush_sync().is_err());
            wal.rollback().unwrap();
            assert_eq!(wal.appends_since_compact(), 1);

            wal.append(&later).unwrap();
            assert_eq!(wal.appends_since_compact(), 2);
        }

        assert_eq!(Wal::replay(&path).unwrap(), vec![kept, later]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn recover_drops_torn_tail_before_appending() {
        let path = tmp_path("recover_torn.wal");
        let first = created(1);
        let second = created(2);
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[7u8; 9]).unwrap();
        }
        {
            let (mut wal, events) = Wal::recover(&path).unwrap();
            assert_eq!(events, vec![first.clone()]);
            wal.append(&second).unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), vec![first, second]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn oversized_length_prefix_ends_replay() {
        let path = tmp_path("oversized.wal");
        let good = created(1);
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&good).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&u32::MAX.to_le_bytes()).unwrap();
            f.write_all(&[0u8; 64]).unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), vec![good]);
        let _ = fs::remove_file(&path);
    }
}
