//! Tests for the frame codec

use bytes::{BufMut, Bytes, BytesMut};
use emberkv::compression::{compress_frame, decode_value, raw_frame, FRAME_HEADER_SIZE};
use emberkv::entry::EntryHeader;
use emberkv::EmberError;

fn compressed_header(logical_size: u64, compressed_size: u64) -> EntryHeader {
    EntryHeader {
        logical_size,
        compressed_size,
        checksum: 0,
        padding_size: 32,
    }
}

#[test]
fn test_compress_frame_layout() {
    let frame = compress_frame(&[b'x'; 500]).unwrap();

    let payload_len = u32::from_le_bytes(frame[0..4].try_into().unwrap());
    let raw_len = u32::from_le_bytes(frame[4..8].try_into().unwrap());
    assert_eq!(raw_len, 500);
    assert_eq!(payload_len as usize, frame.len() - FRAME_HEADER_SIZE as usize);
    assert!(frame.len() < 500);
}

#[test]
fn test_raw_frame_is_flagged() {
    let frame = raw_frame(b"plain").unwrap();

    let word = u32::from_le_bytes(frame[0..4].try_into().unwrap());
    assert_ne!(word & 0x8000_0000, 0);
    assert_eq!(word & 0x7FFF_FFFF, 5);
    assert_eq!(&frame[8..], b"plain");
}

#[test]
fn test_decode_multiple_frames() {
    let mut persisted = BytesMut::new();
    persisted.extend_from_slice(&compress_frame(&[1u8; 300]).unwrap());
    persisted.extend_from_slice(&compress_frame(&[2u8; 300]).unwrap());
    let len = persisted.len() as u64;

    let value = decode_value(&compressed_header(600, len), persisted.freeze()).unwrap();

    assert_eq!(&value[..300], &[1u8; 300][..]);
    assert_eq!(&value[300..], &[2u8; 300][..]);
}

#[test]
fn test_decode_raw_frame_takes_rest_of_entry() {
    let mut persisted = BytesMut::new();
    persisted.extend_from_slice(&compress_frame(&[1u8; 100]).unwrap());
    persisted.extend_from_slice(&raw_frame(b"abc").unwrap());
    persisted.extend_from_slice(b"defgh");
    let len = persisted.len() as u64;

    let value = decode_value(&compressed_header(108, len), persisted.freeze()).unwrap();

    assert_eq!(&value[..100], &[1u8; 100][..]);
    assert_eq!(&value[100..], b"abcdefgh");
}

#[test]
fn test_decode_uncompressed_entry_is_passthrough() {
    let header = EntryHeader {
        logical_size: 5,
        compressed_size: 0,
        checksum: 0,
        padding_size: 0,
    };

    let value = decode_value(&header, Bytes::from_static(b"hello")).unwrap();

    assert_eq!(&value[..], b"hello");
}

#[test]
fn test_decode_rejects_truncated_frame() {
    let frame = compress_frame(&[9u8; 300]).unwrap();
    let truncated = frame.slice(..frame.len() - 3);
    let len = truncated.len() as u64;

    let result = decode_value(&compressed_header(300, len), truncated);

    assert!(matches!(result, Err(EmberError::Corruption(_))));
}

#[test]
fn test_decode_rejects_size_mismatch() {
    let mut persisted = BytesMut::new();
    persisted.put_slice(&compress_frame(&[1u8; 100]).unwrap());
    let len = persisted.len() as u64;

    let result = decode_value(&compressed_header(99, len), persisted.freeze());

    assert!(matches!(result, Err(EmberError::Corruption(_))));
}
