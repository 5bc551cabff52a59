//! Integration tests for ring buffer leasing.

use dsbridge_audio::{CursorKind, RingBuffer, Span};
use dsbridge_core::BridgeError;

#[test]
fn whole_buffer_lease_blocks_any_other() {
    let ring = RingBuffer::new(1000).unwrap();
    let region = ring.lock(0, 1000).unwrap();
    assert_eq!(region.first, Span::new(0, 1000));
    assert!(region.second.is_none());

    assert!(matches!(ring.lock(0, 1), Err(BridgeError::RegionConflict(_))));
    ring.unlock(&region).unwrap();
    assert!(ring.lock(0, 1).is_ok());
}

#[test]
fn wrapping_lease_splits_in_two() {
    let ring = RingBuffer::new(100).unwrap();
    let region = ring.lock(90, 20).unwrap();
    assert_eq!(region.first, Span::new(90, 10));
    assert_eq!(region.second, Some(Span::new(0, 10)));
}

#[test]
fn lease_round_trip_returns_written_bytes() {
    let ring = RingBuffer::new(64).unwrap();
    let payload: Vec<u8> = (0..24).map(|i| i * 3 + 1).collect();

    let region = ring.lock(50, payload.len()).unwrap();
    assert_eq!(ring.write_region(&region, &payload).unwrap(), payload.len());
    ring.unlock(&region).unwrap();

    ring.set_cursor(CursorKind::Read, 50, false).unwrap();
    ring.set_cursor(CursorKind::Write, 50 + payload.len(), true).unwrap();
    let mut out = vec![0u8; payload.len()];
    assert_eq!(ring.read(payload.len(), &mut out).unwrap(), payload.len());
    assert_eq!(out, payload);
    assert_eq!(ring.cursors(), (50, 10));
}

#[test]
fn outstanding_leases_never_overlap() {
    let ring = RingBuffer::new(100).unwrap();
    let a = ring.lock(0, 30).unwrap();
    let b = ring.lock(30, 30).unwrap();
    assert!(matches!(ring.lock(20, 20), Err(BridgeError::RegionConflict(_))));
    let c = ring.lock(80, 30).unwrap_err();
    assert!(matches!(c, BridgeError::RegionConflict(_)));

    ring.unlock(&a).unwrap();
    let wrapped = ring.lock(80, 30).unwrap();
    assert_eq!(ring.outstanding_locks(), 2);
    assert!(!wrapped.overlaps(&b));

    ring.unlock(&b).unwrap();
    ring.unlock(&wrapped).unwrap();
    assert_eq!(ring.outstanding_locks(), 0);
}

#[test]
fn duplicates_share_bytes_but_not_leases() {
    let ring = RingBuffer::new(32).unwrap();
    ring.push(&[7u8; 8]).unwrap();
    let dup = ring.duplicate().unwrap();
    assert_eq!(ring.share_count(), 2);
    assert_eq!(dup.cursors(), (0, 8));

    // same range leased in both instances
    let mine = ring.lock(8, 8).unwrap();
    let theirs = dup.lock(8, 8).unwrap();
    dup.write_region(&theirs, &[9u8; 8]).unwrap();
    dup.unlock(&theirs).unwrap();
    ring.unlock(&mine).unwrap();

    ring.set_cursor(CursorKind::Write, 16, false).unwrap();
    let mut out = [0u8; 16];
    assert_eq!(ring.read(16, &mut out).unwrap(), 16);
    assert_eq!(&out[..8], &[7u8; 8]);
    assert_eq!(&out[8..], &[9u8; 8]);

    ring.release();
    assert_eq!(dup.share_count(), 1);
    assert!(matches!(ring.lock(0, 1), Err(BridgeError::InvalidArgument(_))));
    assert!(dup.lock(0, 1).is_ok());
}
