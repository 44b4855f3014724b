// Ordered key-value backends behind a session
// LogStore: append-only operation log replayed into an ordered table on open

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::StoreOptions;

const LOG_MAGIC: [u8; 8] = *b"LVTLOG01";
const RT_PUT: u8 = 1;
const RT_DEL: u8 = 2;
const LOG_FILE: &str = "data.log";
const LOCK_FILE: &str = "LOCK";
const MAX_RECORD: usize = 64 * 1024 * 1024;

/// Forward-only, single-pass ascending iteration over every pair
pub type Scan<'a> = Box<dyn Iterator<Item = io::Result<(String, String)>> + 'a>;

/// The ordered store a session drives.
///
/// `scan` borrows the store immutably, so no `put`/`delete` can run while a
/// scan from the same store is alive.
pub trait OrderedStore: Send {
    fn get(&self, key: &str) -> io::Result<Option<String>>;

    fn put(&mut self, key: &str, value: &str) -> io::Result<()>;

    /// Remove `key`. Returns whether it existed.
    fn delete(&mut self, key: &str) -> io::Result<bool>;

    fn scan(&self) -> Scan<'_>;

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// In-memory ordered store
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    table: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        MemoryStore {
            table: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl OrderedStore for MemoryStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.table.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> io::Result<()> {
        self.table.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> io::Result<bool> {
        Ok(self.table.remove(key).is_some())
    }

    fn scan(&self) -> Scan<'_> {
        Box::new(self.table.iter().map(|(k, v)| Ok((k.clone(), v.clone()))))
    }
}

/// Directory-backed store.
///
/// Layout: `data.log` holds a magic header followed by records framed as
/// `len u32 | body | crc32 u32`, body being `kind u8 | klen u32 | key`
/// plus `vlen u32 | value` for puts. Bodies larger than `MAX_RECORD` are
/// refused on write, matching the replay limit. `LOCK` is created
/// exclusively on open and removed when the store is closed or dropped.
#[derive(Debug)]
pub struct LogStore {
    dir: PathBuf,
    log: Option<File>,
    table: BTreeMap<String, String>,
    sync_writes: bool,
    /// Set when a failed append could not be cut back off the log
    broken: bool,
    _lock: DirLock,
}

enum LogRecord {
    Put(String, String),
    Del(String),
}

impl LogStore {
    pub fn open(dir: &Path, options: &StoreOptions) -> io::Result<Self> {
        if !dir.exists() {
            if !options.create_if_missing {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} does not exist and create_if_missing is off", dir.display()),
                ));
            }
            fs::create_dir_all(dir)?;
        }

        let lock = DirLock::acquire(dir)?;

        let log_path = dir.join(LOG_FILE);
        let mut table = BTreeMap::new();
        let good_len = replay_log(&log_path, &mut table)?;

        if options.error_if_exists && !table.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already holds {} keys and error_if_exists is on", dir.display(), table.len()),
            ));
        }

        let mut log = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&log_path)?;

        let file_len = log.metadata()?.len();
        if file_len > good_len {
            warn!(
                path = %log_path.display(),
                file_len,
                good_len,
                "truncating torn or corrupt log tail"
            );
            log.set_len(good_len)?;
        }
        if good_len == 0 {
            log.write_all(&LOG_MAGIC)?;
            log.sync_all()?;
        }
        log.seek(SeekFrom::End(0))?;

        info!(path = %dir.display(), keys = table.len(), "opened log store");

        Ok(LogStore {
            dir: dir.to_path_buf(),
            log: Some(log),
            table,
            sync_writes: options.sync_writes,
            broken: false,
            _lock: lock,
        })
    }

    fn append(&mut self, kind: u8, key: &str, value: Option<&str>) -> io::Result<()> {
        if self.broken {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "log store refuses writes after a failed append could not be rolled back",
            ));
        }
        let frame = encode_frame(kind, key, value)?;
        let log = self.log.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "log store is closed")
        })?;

        if let Err(failure) = write_frame(log, &frame) {
            if !failure.rolled_back {
                warn!(path = %self.dir.display(), error = %failure.error, "log tail left dirty, store is now read-only");
                self.broken = true;
            }
            return Err(failure.error);
        }

        if self.sync_writes {
            log.sync_data()?;
        }
        Ok(())
    }
}

impl OrderedStore for LogStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.table.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> io::Result<()> {
        self.append(RT_PUT, key, Some(value))?;
        self.table.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> io::Result<bool> {
        if !self.table.contains_key(key) {
            return Ok(false);
        }
        self.append(RT_DEL, key, None)?;
        self.table.remove(key);
        Ok(true)
    }

    fn scan(&self) -> Scan<'_> {
        Box::new(self.table.iter().map(|(k, v)| Ok((k.clone(), v.clone()))))
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(log) = self.log.take() {
            log.sync_all()?;
            debug!(path = %self.dir.display(), "closed log store");
        }
        Ok(())
    }
}

/// Frame one record as `len | body | crc32`.
fn encode_frame(kind: u8, key: &str, value: Option<&str>) -> io::Result<Vec<u8>> {
    let body_len = 1 + 4 + key.len() + value.map_or(0, |v| 4 + v.len());
    if body_len > MAX_RECORD {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("record of {} bytes exceeds the {} byte limit", body_len, MAX_RECORD),
        ));
    }

    let mut body = Vec::with_capacity(body_len);
    body.push(kind);
    body.extend_from_slice(&len_prefix(key.len())?);
    body.extend_from_slice(key.as_bytes());
    if let Some(val) = value {
        body.extend_from_slice(&len_prefix(val.len())?);
        body.extend_from_slice(val.as_bytes());
    }

    let mut frame = Vec::with_capacity(body.len() + 8);
    frame.extend_from_slice(&len_prefix(body.len())?);
    frame.extend_from_slice(&body);
    frame.extend_from_slice(&crc32(&body).to_le_bytes());
    Ok(frame)
}

fn len_prefix(len: usize) -> io::Result<[u8; 4]> {
    u32::try_from(len).map(u32::to_le_bytes).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("length {} does not fit in u32", len))
    })
}

/// Append target that can cut a failed write back off its tail
trait LogSink: Write + Seek {
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

impl LogSink for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

#[derive(Debug)]
struct FrameFailure {
    error: io::Error,
    rolled_back: bool,
}

/// Write one frame in a single `write_all`. On failure the log is truncated
/// back to where the frame started, so later appends never follow garbage.
fn write_frame<W: LogSink>(log: &mut W, frame: &[u8]) -> Result<(), FrameFailure> {
    let start = log.stream_position().map_err(|error| FrameFailure { error, rolled_back: true })?;

    let error = match log.write_all(frame) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    let rollback = log.set_len(start).and_then(|_| log.seek(SeekFrom::Start(start)));
    Err(FrameFailure {
        error,
        rolled_back: rollback.is_ok(),
    })
}

/// Replay `path` into `table`, returning the byte length of the valid
/// prefix of the log (0 when the file is missing or has no full header).
fn replay_log(path: &Path, table: &mut BTreeMap<String, String>) -> io::Result<u64> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 8];
    if reader.read_exact(&mut magic).is_err() {
        return Ok(0);
    }
    if magic != LOG_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} is not a leveltree log", path.display()),
        ));
    }

    let mut good = LOG_MAGIC.len() as u64;
    let mut records = 0usize;

    loop {
        let mut len_buf = [0u8; 4];
        if reader.read_exact(&mut len_buf).is_err() {
            break;
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_RECORD {
            break;
        }

        let mut body = vec![0u8; len];
        if reader.read_exact(&mut body).is_err() {
            break;
        }

        let mut crc_buf = [0u8; 4];
        if reader.read_exact(&mut crc_buf).is_err() {
            break;
        }
        if crc32(&body) != u32::from_le_bytes(crc_buf) {
            break;
        }

        match decode_record(&body) {
            Some(LogRecord::Put(key, value)) => {
                table.insert(key, value);
            }
            Some(LogRecord::Del(key)) => {
                table.remove(&key);
            }
            None => break,
        }

        good += 8 + len as u64;
        records += 1;
    }

    debug!(path = %path.display(), records, "replayed log");
    Ok(good)
}

fn decode_record(body: &[u8]) -> Option<LogRecord> {
    let (&kind, rest) = body.split_first()?;
    let (key, rest) = read_str(rest)?;

    match kind {
        RT_PUT => {
            let (value, rest) = read_str(rest)?;
            rest.is_empty().then_some(LogRecord::Put(key, value))
        }
        RT_DEL => rest.is_empty().then_some(LogRecord::Del(key)),
        _ => None,
    }
}

fn read_str(buf: &[u8]) -> Option<(String, &[u8])> {
    if buf.len() < 4 {
        return None;
    }
    let (len_bytes, rest) = buf.split_at(4);
    let len = u32::from_le_bytes(len_bytes.try_into().ok()?) as usize;
    if rest.len() < len {
        return None;
    }
    let (text, rest) = rest.split_at(len);
    Some((String::from_utf8(text.to_vec()).ok()?, rest))
}

/// Exclusive marker file; a second open of the same directory fails
#[derive(Debug)]
struct DirLock {
    path: PathBuf,
}

impl DirLock {
    fn acquire(dir: &Path) -> io::Result<Self> {
        let path = dir.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // pid is informational only
                let _ = writeln!(file, "{}", std::process::id());
                Ok(DirLock { path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!(
                    "database is locked by another session (remove {} if no session is running)",
                    path.display()
                ),
            )),
            Err(e) => Err(e),
        }
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xffffffff;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xedb88320
            } else {
                crc >> 1
            };
        }
    }
    crc ^ 0xffffffff
}
