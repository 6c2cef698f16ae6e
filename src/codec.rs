//! Record Codec
//!
//! Binary framing for a single key/value entry.
//!
//! ## Record Format
//! ```text
//! ┌──────────┬─────────────┬─────────────┬───────────┬─────────────┐
//! │ CRC (4)  │ KeyLen (4)  │ ValLen (4)  │ Key bytes │ Value bytes │
//! └──────────┴─────────────┴─────────────┴───────────┴─────────────┘
//! ```
//!
//! All integers are little-endian. The CRC32 covers everything after it.
//! Records are self-delimiting, so a segment file is simply their
//! concatenation and can be replayed front to back.

use std::io::{self, Read};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, StoreError};

/// Header size: CRC (4) + KeyLen (4) + ValLen (4) = 12 bytes
pub const HEADER_SIZE: usize = 12;

/// Largest key or value a record can frame
pub const MAX_FIELD_LEN: u64 = u32::MAX as u64;

/// A single key/value pair as stored in a segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
}

/// Outcome of decoding one record from a stream
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    /// A full record; `len` is the number of bytes consumed
    Record { entry: Entry, len: u64 },

    /// The stream ended cleanly on a record boundary
    EndOfSegment,
}

impl Entry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Size of this entry once encoded
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.key.len() + self.value.len()
    }

    /// Encode to bytes: crc (4) + key_len (4) + val_len (4) + key + value
    ///
    /// Fails with `EntryTooLarge` if the key or value does not fit a u32
    /// length field.
    pub fn encode(&self) -> Result<Bytes> {
        let key_len = field_len(self.key.len())?;
        let val_len = field_len(self.value.len())?;

        let mut buf = BytesMut::with_capacity(self.encoded_len());

        buf.put_u32_le(0); // Placeholder for CRC
        buf.put_u32_le(key_len);
        buf.put_u32_le(val_len);
        buf.put_slice(self.key.as_bytes());
        buf.put_slice(self.value.as_bytes());

        let crc = crc32fast::hash(&buf[4..]);
        buf[0..4].copy_from_slice(&crc.to_le_bytes());

        Ok(buf.freeze())
    }

    /// Decode the next record from `reader`
    ///
    /// `offset` is the stream position of the record and is only used for
    /// error reporting.
    ///
    /// Returns:
    /// - `Ok(Decoded::Record { .. })`: a complete, checksummed record
    /// - `Ok(Decoded::EndOfSegment)`: zero bytes were available
    /// - `Err(CorruptRecord)`: a record started but is truncated or damaged
    pub fn decode<R: Read>(reader: &mut R, offset: u64) -> Result<Decoded> {
        let mut header = [0u8; HEADER_SIZE];
        let read = read_full(reader, &mut header)?;

        if read == 0 {
            return Ok(Decoded::EndOfSegment);
        }
        if read < HEADER_SIZE {
            return Err(corrupt(
                offset,
                format!("truncated header: {} of {} bytes", read, HEADER_SIZE),
            ));
        }

        let stored_crc = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let key_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as u64;
        let val_len = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as u64;

        // Read through `take` so a damaged length never pre-allocates
        let key = read_up_to(reader, key_len)?;
        if (key.len() as u64) < key_len {
            return Err(corrupt(
                offset,
                format!("truncated key: {} of {} bytes", key.len(), key_len),
            ));
        }

        let value = read_up_to(reader, val_len)?;
        if (value.len() as u64) < val_len {
            return Err(corrupt(
                offset,
                format!("truncated value: {} of {} bytes", value.len(), val_len),
            ));
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header[4..]);
        hasher.update(&key);
        hasher.update(&value);
        let computed_crc = hasher.finalize();

        if computed_crc != stored_crc {
            return Err(corrupt(
                offset,
                format!(
                    "checksum mismatch: stored {:#010x}, computed {:#010x}",
                    stored_crc, computed_crc
                ),
            ));
        }

        let key = String::from_utf8(key).map_err(|_| corrupt(offset, "key is not valid UTF-8"))?;
        let value =
            String::from_utf8(value).map_err(|_| corrupt(offset, "value is not valid UTF-8"))?;

        Ok(Decoded::Record {
            entry: Entry { key, value },
            len: HEADER_SIZE as u64 + key_len + val_len,
        })
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

fn field_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| StoreError::EntryTooLarge {
        len: len as u64,
        max: MAX_FIELD_LEN,
    })
}

fn corrupt(offset: u64, reason: impl Into<String>) -> StoreError {
    StoreError::CorruptRecord {
        offset,
        reason: reason.into(),
    }
}

/// Fill `buf` as far as the stream allows; returns bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read at most `len` bytes; a short result means the stream ended
fn read_up_to<R: Read>(reader: &mut R, len: u64) -> io::Result<Vec<u8>> {
    let mut data = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut data)?;
    Ok(data)
}
