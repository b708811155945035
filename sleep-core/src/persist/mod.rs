//! Persisted records and the storage port they travel through.
//!
//! Records are encoded with `postcard`. For the field types used here that
//! yields a fixed layout of one byte per field, in declaration order, which is
//! the on-flash format: `u8` as-is, `bool` as 0/1 and enums as their variant
//! index.

use core::fmt;

use heapless::{LinearMap, Vec};
use serde::{Serialize, de::DeserializeOwned};

use crate::alarm::{WAKE_ALARM_FORMAT_VERSION, WakeAlarmSettings, validate_time};
use crate::session::InfiniSleepSettings;

/// Upper bound for an encoded record.
pub const MAX_RECORD_LEN: usize = 16;

/// Records the storage port knows about.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RecordKind {
    WakeAlarm,
    SleepSettings,
}

impl RecordKind {
    pub const ALL: [RecordKind; 2] = [RecordKind::WakeAlarm, RecordKind::SleepSettings];

    /// Storage key, usable as a file name.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            RecordKind::WakeAlarm => "wakealarm.dat",
            RecordKind::SleepSettings => "infinisleep.dat",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PersistenceError {
    NotFound,
    /// The backing store failed to read or write.
    Storage,
    Decode,
    UnsupportedVersion(u8),
    /// A field decoded fine but holds a value outside its range.
    OutOfRange,
    BufferTooSmall,
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::NotFound => f.write_str("record not found"),
            PersistenceError::Storage => f.write_str("storage failure"),
            PersistenceError::Decode => f.write_str("record could not be decoded"),
            PersistenceError::UnsupportedVersion(version) => {
                write!(f, "unsupported record version {version}")
            }
            PersistenceError::OutOfRange => f.write_str("record field out of range"),
            PersistenceError::BufferTooSmall => f.write_str("record buffer too small"),
        }
    }
}

impl From<postcard::Error> for PersistenceError {
    fn from(err: postcard::Error) -> Self {
        match err {
            postcard::Error::SerializeBufferFull => PersistenceError::BufferTooSmall,
            _ => PersistenceError::Decode,
        }
    }
}

/// A value with a storage slot and a binary encoding.
pub trait Record: Serialize + DeserializeOwned + Default {
    const KIND: RecordKind;
    /// Expected leading version byte, for versioned layouts.
    const VERSION: Option<u8> = None;

    /// Field checks applied after decoding.
    fn validate(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}

impl Record for WakeAlarmSettings {
    const KIND: RecordKind = RecordKind::WakeAlarm;
    const VERSION: Option<u8> = Some(WAKE_ALARM_FORMAT_VERSION);

    fn validate(&self) -> Result<(), PersistenceError> {
        if self.version != WAKE_ALARM_FORMAT_VERSION {
            return Err(PersistenceError::UnsupportedVersion(self.version));
        }
        validate_time(self.hours, self.minutes).map_err(|_| PersistenceError::OutOfRange)
    }
}

impl Record for InfiniSleepSettings {
    const KIND: RecordKind = RecordKind::SleepSettings;
}

/// Byte-oriented storage port. Mechanics (files, flash pages) are up to the
/// implementation.
pub trait RecordStore {
    /// Reads the record into `buf`, returning the number of bytes written.
    fn read(&mut self, kind: RecordKind, buf: &mut [u8]) -> Result<usize, PersistenceError>;

    fn write(&mut self, kind: RecordKind, bytes: &[u8]) -> Result<(), PersistenceError>;
}

impl<S: RecordStore + ?Sized> RecordStore for &mut S {
    fn read(&mut self, kind: RecordKind, buf: &mut [u8]) -> Result<usize, PersistenceError> {
        (**self).read(kind, buf)
    }

    fn write(&mut self, kind: RecordKind, bytes: &[u8]) -> Result<(), PersistenceError> {
        (**self).write(kind, bytes)
    }
}

pub fn encode<'b, R: Record>(record: &R, buf: &'b mut [u8]) -> Result<&'b [u8], PersistenceError> {
    record.validate()?;
    let used = postcard::to_slice(record, buf)?;
    Ok(&*used)
}

pub fn decode<R: Record>(bytes: &[u8]) -> Result<R, PersistenceError> {
    if let Some(expected) = R::VERSION {
        match bytes.first() {
            Some(&version) if version != expected => {
                return Err(PersistenceError::UnsupportedVersion(version));
            }
            None => return Err(PersistenceError::Decode),
            Some(_) => {}
        }
    }
    let record: R = postcard::from_bytes(bytes)?;
    record.validate()?;
    Ok(record)
}

pub fn load<R: Record, S: RecordStore>(store: &mut S) -> Result<R, PersistenceError> {
    let mut buf = [0u8; MAX_RECORD_LEN];
    let len = store.read(R::KIND, &mut buf)?;
    let bytes = buf.get(..len).ok_or(PersistenceError::BufferTooSmall)?;
    decode(bytes)
}

pub fn save<R: Record, S: RecordStore>(store: &mut S, record: &R) -> Result<(), PersistenceError> {
    let mut buf = [0u8; MAX_RECORD_LEN];
    let bytes = encode(record, &mut buf)?;
    store.write(R::KIND, bytes)
}

/// RAM-backed store. Contents survive a session restart but not a reset.
#[derive(Default)]
pub struct MemoryStore {
    records: LinearMap<RecordKind, Vec<u8, MAX_RECORD_LEN>, 2>,
}

impl MemoryStore {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: LinearMap::new(),
        }
    }

    /// Raw bytes currently stored for `kind`.
    pub fn raw(&self, kind: RecordKind) -> Option<&[u8]> {
        self.records.get(&kind).map(Vec::as_slice)
    }

    pub fn remove(&mut self, kind: RecordKind) {
        self.records.remove(&kind);
    }
}

impl RecordStore for MemoryStore {
    fn read(&mut self, kind: RecordKind, buf: &mut [u8]) -> Result<usize, PersistenceError> {
        let stored = self.records.get(&kind).ok_or(PersistenceError::NotFound)?;
        let target = buf
            .get_mut(..stored.len())
            .ok_or(PersistenceError::BufferTooSmall)?;
        target.copy_from_slice(stored);
        Ok(stored.len())
    }

    fn write(&mut self, kind: RecordKind, bytes: &[u8]) -> Result<(), PersistenceError> {
        let value = Vec::from_slice(bytes).map_err(|_| PersistenceError::BufferTooSmall)?;
        self.records
            .insert(kind, value)
            .map_err(|_| PersistenceError::Storage)?;
        Ok(())
    }
}
