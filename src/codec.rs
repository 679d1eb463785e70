//! Fixed-endian binary encoding for the counter file header and for WAL
//! update records.
//!
//! Mirrors the manual, length-prefixed encoding `WALEntry::to_bytes` /
//! `WALEntry::from_bytes` use elsewhere in this codebase: no `serde`, every
//! decoder bounds-checks before indexing and returns `Error::InvalidUpdate`
//! (or the header equivalent) instead of panicking.

use crate::Error;

/// The only counter-file version this crate recognizes.
pub const VERSION: [u8; 8] = *b"SRLEDGR1";

/// Byte size of the counter file header.
pub const HEADER_SIZE: u64 = 8;

/// Byte width of a single sector's on-disk counter.
pub const COUNTER_SIZE: u64 = 2;

/// Byte offset of sector `index` within the counter file.
pub fn sector_offset(index: u64) -> u64 {
    HEADER_SIZE + COUNTER_SIZE * index
}

/// Encodes the version header.
pub fn encode_header() -> [u8; HEADER_SIZE as usize] {
    VERSION
}

/// Validates a version header read from disk.
///
/// `buf` must be at least `HEADER_SIZE` bytes; callers are expected to have
/// already turned a short read into an I/O `UnexpectedEof` error before
/// calling this (see `RefCounter::load`), matching the "file shorter than
/// 8 bytes fails with an end-of-file error" requirement.
pub fn decode_header(buf: &[u8]) -> Result<(), Error> {
    if buf.len() < HEADER_SIZE as usize {
        return Err(Error::IOError(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "counter file header truncated",
        )));
    }
    if buf[..HEADER_SIZE as usize] != VERSION {
        return Err(Error::InvalidVersion);
    }
    Ok(())
}

/// Encodes a single sector counter value.
pub fn encode_counter(value: u16) -> [u8; COUNTER_SIZE as usize] {
    value.to_le_bytes()
}

/// Decodes a single sector counter value.
pub fn decode_counter(buf: &[u8]) -> Result<u16, Error> {
    if buf.len() < COUNTER_SIZE as usize {
        return Err(Error::IOError(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "truncated sector counter",
        )));
    }
    Ok(u16::from_le_bytes([buf[0], buf[1]]))
}

/// A WAL update record produced by a `RefCounter` mutation and consumed by
/// its applier. The three variants correspond exactly to the three tag
/// strings recognized on the wire: `writeAt`, `truncate`, `delete`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalUpdate {
    WriteAt {
        path: String,
        sector_index: u64,
        value: u16,
    },
    Truncate {
        path: String,
        new_num_sectors: u64,
    },
    Delete {
        path: String,
    },
}

const TAG_WRITE_AT: &str = "writeAt";
const TAG_TRUNCATE: &str = "truncate";
const TAG_DELETE: &str = "delete";

fn write_len_prefixed(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn read_len_prefixed<'a>(data: &'a [u8], offset: &mut usize) -> Result<&'a str, Error> {
    if data.len() < *offset + 2 {
        return Err(Error::InvalidUpdate("truncated length prefix".to_string()));
    }
    let len = u16::from_le_bytes([data[*offset], data[*offset + 1]]) as usize;
    *offset += 2;
    if data.len() < *offset + len {
        return Err(Error::InvalidUpdate("truncated length-prefixed field".to_string()));
    }
    let s = std::str::from_utf8(&data[*offset..*offset + len])
        .map_err(|_| Error::InvalidUpdate("field is not valid utf-8".to_string()))?;
    *offset += len;
    Ok(s)
}

fn read_u64(data: &[u8], offset: &mut usize) -> Result<u64, Error> {
    if data.len() < *offset + 8 {
        return Err(Error::InvalidUpdate("truncated u64 field".to_string()));
    }
    let v = u64::from_le_bytes(data[*offset..*offset + 8].try_into().unwrap());
    *offset += 8;
    Ok(v)
}

fn read_u16(data: &[u8], offset: &mut usize) -> Result<u16, Error> {
    if data.len() < *offset + 2 {
        return Err(Error::InvalidUpdate("truncated u16 field".to_string()));
    }
    let v = u16::from_le_bytes(data[*offset..*offset + 2].try_into().unwrap());
    *offset += 2;
    Ok(v)
}

impl WalUpdate {
    /// Serializes this update to its wire form: a length-prefixed tag
    /// string, a length-prefixed path, then the tag-specific fixed fields.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            WalUpdate::WriteAt {
                path,
                sector_index,
                value,
            } => {
                write_len_prefixed(&mut buf, TAG_WRITE_AT);
                write_len_prefixed(&mut buf, path);
                buf.extend_from_slice(&sector_index.to_le_bytes());
                buf.extend_from_slice(&value.to_le_bytes());
            }
            WalUpdate::Truncate {
                path,
                new_num_sectors,
            } => {
                write_len_prefixed(&mut buf, TAG_TRUNCATE);
                write_len_prefixed(&mut buf, path);
                buf.extend_from_slice(&new_num_sectors.to_le_bytes());
            }
            WalUpdate::Delete { path } => {
                write_len_prefixed(&mut buf, TAG_DELETE);
                write_len_prefixed(&mut buf, path);
            }
        }
        buf
    }

    /// Deserializes an update produced by `to_bytes`. Fails with
    /// `Error::InvalidUpdate` if the blob is too short or carries an
    /// unrecognized tag.
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        let mut offset = 0usize;
        let tag = read_len_prefixed(data, &mut offset)?.to_string();
        let path = read_len_prefixed(data, &mut offset)?.to_string();
        match tag.as_str() {
            TAG_WRITE_AT => {
                let sector_index = read_u64(data, &mut offset)?;
                let value = read_u16(data, &mut offset)?;
                Ok(WalUpdate::WriteAt {
                    path,
                    sector_index,
                    value,
                })
            }
            TAG_TRUNCATE => {
                let new_num_sectors = read_u64(data, &mut offset)?;
                Ok(WalUpdate::Truncate {
                    path,
                    new_num_sectors,
                })
            }
            TAG_DELETE => Ok(WalUpdate::Delete { path }),
            other => Err(Error::InvalidUpdate(format!("unrecognized update tag '{other}'"))),
        }
    }

    /// The path of the counter file this update targets.
    pub fn path(&self) -> &str {
        match self {
            WalUpdate::WriteAt { path, .. } => path,
            WalUpdate::Truncate { path, .. } => path,
            WalUpdate::Delete { path } => path,
        }
    }
}
