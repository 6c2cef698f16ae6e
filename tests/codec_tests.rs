//! Tests for the Record Codec
//!
//! These tests verify:
//! - Encode/decode of single and concatenated records
//! - Byte counts reported for stream advancement
//! - Clean end-of-stream vs. truncated/damaged records

use std::io::Cursor;

use segstore::codec::{Decoded, Entry, HEADER_SIZE};
use segstore::StoreError;

// =============================================================================
// Helper Functions
// =============================================================================

fn decode_one(bytes: &[u8]) -> segstore::Result<Decoded> {
    let mut cursor = Cursor::new(bytes);
    Entry::decode(&mut cursor, 0)
}

/// Build a record by hand with a correct checksum (for crafting edge cases)
fn raw_record(key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&(key.len() as u32).to_le_bytes());
    body.extend_from_slice(&(value.len() as u32).to_le_bytes());
    body.extend_from_slice(key);
    body.extend_from_slice(value);

    let mut record = crc32fast::hash(&body).to_le_bytes().to_vec();
    record.extend_from_slice(&body);
    record
}

fn assert_corrupt(result: segstore::Result<Decoded>) {
    match result {
        Err(StoreError::CorruptRecord { .. }) => {}
        other => panic!("expected CorruptRecord, got {:?}", other),
    }
}

// =============================================================================
// Encode Tests
// =============================================================================

#[test]
fn test_encoded_len_matches_bytes() {
    let entry = Entry::new("hello", "world");
    let bytes = entry.encode().unwrap();

    assert_eq!(bytes.len(), entry.encoded_len());
    assert_eq!(bytes.len(), HEADER_SIZE + 5 + 5);
}

#[test]
fn test_encode_is_deterministic() {
    let entry = Entry::new("key", "value");
    assert_eq!(entry.encode().unwrap(), entry.encode().unwrap());
}

#[test]
fn test_encode_matches_documented_layout() {
    let bytes = Entry::new("ab", "xyz").encode().unwrap();

    assert_eq!(&bytes[4..8], &2u32.to_le_bytes());
    assert_eq!(&bytes[8..12], &3u32.to_le_bytes());
    assert_eq!(&bytes[12..14], b"ab");
    assert_eq!(&bytes[14..17], b"xyz");
    assert_eq!(&bytes[..], &raw_record(b"ab", b"xyz")[..]);
}

// =============================================================================
// Decode Tests
// =============================================================================

#[test]
fn test_decode_roundtrip_reports_length() {
    let entry = Entry::new("k1", "v1");
    let bytes = entry.encode().unwrap();

    let decoded = decode_one(&bytes).unwrap();

    assert_eq!(
        decoded,
        Decoded::Record {
            entry,
            len: bytes.len() as u64
        }
    );
}

#[test]
fn test_decode_empty_value() {
    let entry = Entry::new("k", "");
    let decoded = decode_one(&entry.encode().unwrap()).unwrap();

    match decoded {
        Decoded::Record { entry: got, len } => {
            assert_eq!(got.value, "");
            assert_eq!(len, HEADER_SIZE as u64 + 1);
        }
        other => panic!("expected record, got {:?}", other),
    }
}

#[test]
fn test_decode_unicode() {
    let entry = Entry::new("ключ", "значення ✓");
    match decode_one(&entry.encode().unwrap()).unwrap() {
        Decoded::Record { entry: got, .. } => assert_eq!(got, entry),
        other => panic!("expected record, got {:?}", other),
    }
}

#[test]
fn test_decode_concatenated_records() {
    let entries = vec![
        Entry::new("a", "1"),
        Entry::new("bb", "22"),
        Entry::new("ccc", ""),
    ];
    let mut stream = Vec::new();
    for entry in &entries {
        stream.extend_from_slice(&entry.encode().unwrap());
    }

    let mut cursor = Cursor::new(stream.as_slice());
    let mut offset = 0u64;
    let mut decoded = Vec::new();

    loop {
        match Entry::decode(&mut cursor, offset).unwrap() {
            Decoded::Record { entry, len } => {
                offset += len;
                decoded.push(entry);
            }
            Decoded::EndOfSegment => break,
        }
    }

    assert_eq!(decoded, entries);
    assert_eq!(offset, stream.len() as u64);
}

#[test]
fn test_decode_empty_stream_is_end_of_segment() {
    assert_eq!(decode_one(&[]).unwrap(), Decoded::EndOfSegment);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_decode_truncated_header() {
    let bytes = Entry::new("key", "value").encode().unwrap();
    assert_corrupt(decode_one(&bytes[..5]));
}

#[test]
fn test_decode_truncated_key() {
    let bytes = Entry::new("longer-key", "value").encode().unwrap();
    assert_corrupt(decode_one(&bytes[..HEADER_SIZE + 3]));
}

#[test]
fn test_decode_truncated_value() {
    let bytes = Entry::new("key", "a fairly long value").encode().unwrap();
    assert_corrupt(decode_one(&bytes[..bytes.len() - 1]));
}

#[test]
fn test_decode_checksum_mismatch() {
    let mut bytes = Entry::new("key", "value").encode().unwrap().to_vec();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    match decode_one(&bytes) {
        Err(StoreError::CorruptRecord { reason, .. }) => assert!(reason.contains("checksum")),
        other => panic!("expected checksum failure, got {:?}", other),
    }
}

#[test]
fn test_decode_huge_declared_length_is_corrupt() {
    // A damaged length must be reported, not allocated
    let mut bytes = vec![0u8; 4];
    bytes.extend_from_slice(&u32::MAX.to_le_bytes());
    bytes.extend_from_slice(&u32::MAX.to_le_bytes());
    bytes.extend_from_slice(b"abc");

    assert_corrupt(decode_one(&bytes));
}

#[test]
fn test_decode_invalid_utf8() {
    let bytes = raw_record(&[0xFF, 0xFE], b"value");

    match decode_one(&bytes) {
        Err(StoreError::CorruptRecord { reason, .. }) => assert!(reason.contains("UTF-8")),
        other => panic!("expected UTF-8 failure, got {:?}", other),
    }
}

#[test]
fn test_decode_error_reports_offset() {
    let bytes = Entry::new("key", "value").encode().unwrap();
    let mut cursor = Cursor::new(&bytes[..3]);

    match Entry::decode(&mut cursor, 1234) {
        Err(StoreError::CorruptRecord { offset, .. }) => assert_eq!(offset, 1234),
        other => panic!("expected CorruptRecord, got {:?}", other),
    }
}
