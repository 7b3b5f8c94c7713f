//! Stored value encoding.
//!
//! Each record key owns one row in the store whose value is:
//!
//! ```text
//! ┌─────────┬──────────────────────┬──────────────────┬─────────────────────────┐
//! │ version │ commit_ts            │ file_id          │ partition_path          │
//! │ 1 byte  │ u16 len + utf8 bytes │ u16 len + bytes  │ u16 len + bytes         │
//! └─────────┴──────────────────────┴──────────────────┴─────────────────────────┘
//! ```
//!
//! All lengths are big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::error::{KvIndexError, KvIndexResult};
use crate::storage::location::Location;

pub const ENTRY_FORMAT_VERSION: u8 = 1;

/// Raw index entry as stored for one record key.
///
/// An entry only says where a record *was written*; whether that write is
/// visible is decided by the timeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    /// Instant of the commit that wrote the record.
    pub commit_ts: String,
    pub file_id: String,
    pub partition_path: String,
}

impl IndexEntry {
    pub fn new(
        commit_ts: impl Into<String>,
        file_id: impl Into<String>,
        partition_path: impl Into<String>,
    ) -> Self {
        Self {
            commit_ts: commit_ts.into(),
            file_id: file_id.into(),
            partition_path: partition_path.into(),
        }
    }

    pub fn from_location(location: &Location, partition_path: impl Into<String>) -> Self {
        Self::new(
            location.instant_time.clone(),
            location.file_id.clone(),
            partition_path,
        )
    }

    pub fn location(&self) -> Location {
        Location::new(self.file_id.clone(), self.commit_ts.clone())
    }

    pub fn encode(&self) -> KvIndexResult<Bytes> {
        let mut buf = BytesMut::with_capacity(
            1 + 6 + self.commit_ts.len() + self.file_id.len() + self.partition_path.len(),
        );
        buf.put_u8(ENTRY_FORMAT_VERSION);
        for field in [&self.commit_ts, &self.file_id, &self.partition_path] {
            let len = u16::try_from(field.len()).map_err(|_| {
                KvIndexError::internal(format!(
                    "entry field of {} bytes exceeds u16 length prefix",
                    field.len()
                ))
            })?;
            buf.put_u16(len);
            buf.put_slice(field.as_bytes());
        }
        Ok(buf.freeze())
    }

    /// Decode the value stored under `key`. `key` is only used for error
    /// reporting.
    pub fn decode(key: &str, data: &[u8]) -> KvIndexResult<Self> {
        let mut buf = data;
        if !buf.has_remaining() {
            return Err(KvIndexError::entry_decode(key, "empty value"));
        }
        let version = buf.get_u8();
        if version != ENTRY_FORMAT_VERSION {
            return Err(KvIndexError::entry_decode(
                key,
                format!("unsupported entry version {version}"),
            ));
        }
        let commit_ts = read_field(key, &mut buf, "commit_ts")?;
        let file_id = read_field(key, &mut buf, "file_id")?;
        let partition_path = read_field(key, &mut buf, "partition_path")?;
        if buf.has_remaining() {
            return Err(KvIndexError::entry_decode(
                key,
                format!("{} trailing bytes", buf.remaining()),
            ));
        }
        Ok(Self {
            commit_ts,
            file_id,
            partition_path,
        })
    }
}

fn read_field(key: &str, buf: &mut &[u8], name: &str) -> KvIndexResult<String> {
    if buf.remaining() < 2 {
        return Err(KvIndexError::entry_decode(
            key,
            format!("truncated length of {name}"),
        ));
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(KvIndexError::entry_decode(
            key,
            format!("{name} needs {len} bytes, {} left", buf.remaining()),
        ));
    }
    let field = String::from_utf8(buf[..len].to_vec())
        .map_err(|e| KvIndexError::entry_decode(key, format!("{name} is not utf8: {e}")))?;
    buf.advance(len);
    Ok(field)
}
