use crate::{Error, ManagedHeap};

#[test]
fn copy_roundtrip() {
    let heap = ManagedHeap::new();
    let array = heap.alloc_array(4, 8);

    let input: Vec<u8> = (0..32).collect();
    heap.copy_in(array, &input).unwrap();

    let mut output = vec![0u8; 32];
    heap.copy_out(array, &mut output).unwrap();
    assert_eq!(input, output);
}

#[test]
fn copy_size_must_match_cell() {
    let heap = ManagedHeap::new();
    let array = heap.alloc_array(4, 8);
    assert!(matches!(heap.copy_in(array, &[0u8; 16]), Err(Error::SizeMismatch { expected: 32, actual: 16 })));
}

#[test]
fn freed_handle_goes_stale() {
    let heap = ManagedHeap::new();
    let array = heap.alloc_array(4, 4);
    heap.free_array(array).unwrap();

    assert!(matches!(heap.pin(array), Err(Error::StaleHandle { .. })));
    assert!(matches!(heap.array_info(array), Err(Error::StaleHandle { .. })));
}

#[test]
fn reused_slot_does_not_resurrect_old_handle() {
    let heap = ManagedHeap::new();
    let old = heap.alloc_array(4, 4);
    heap.free_array(old).unwrap();

    // Slot is recycled for the new allocation with a bumped generation.
    let new = heap.alloc_array(4, 4);
    assert!(heap.pin(new).is_ok());
    assert!(matches!(heap.pin(old), Err(Error::StaleHandle { .. })));
}

#[test]
fn pinned_cell_cannot_be_freed() {
    let heap = ManagedHeap::new();
    let array = heap.alloc_array(8, 2);

    let guard = heap.pin(array).unwrap();
    assert!(matches!(heap.free_array(array), Err(Error::PinnedLive { pins: 1, .. })));

    drop(guard);
    heap.free_array(array).unwrap();
}

#[test]
fn compact_moves_unpinned_cells_and_preserves_contents() {
    let heap = ManagedHeap::new();
    let array = heap.alloc_array(1, 16);
    heap.copy_in(array, &[7u8; 16]).unwrap();

    let before = heap.pin(array).unwrap().addr();
    assert_eq!(heap.compact(), 1);
    let after = heap.pin(array).unwrap().addr();

    assert_ne!(before, after);
    let mut data = vec![0u8; 16];
    heap.copy_out(array, &mut data).unwrap();
    assert_eq!(data, vec![7u8; 16]);
}

#[test]
fn compact_skips_pinned_cells() {
    let heap = ManagedHeap::new();
    let pinned = heap.alloc_array(4, 4);
    let loose = heap.alloc_array(4, 4);
    let loose_before = heap.pin(loose).unwrap().addr();

    let guard = heap.pin(pinned).unwrap();
    let addr = guard.addr();
    assert_eq!(heap.compact(), 1);
    assert_eq!(guard.addr(), addr);

    // The unpinned neighbor did move.
    assert_ne!(heap.pin(loose).unwrap().addr(), loose_before);
}

#[test]
fn multiple_pins_on_one_cell() {
    let heap = ManagedHeap::new();
    let array = heap.alloc_array(4, 10);

    let first = heap.pin(array).unwrap();
    let second = heap.pin(array).unwrap();
    assert_eq!(first.addr(), second.addr());

    drop(first);
    // Still pinned through the second guard.
    assert!(matches!(heap.free_array(array), Err(Error::PinnedLive { .. })));
    drop(second);
    heap.free_array(array).unwrap();
}

#[test]
fn object_address_changes_across_compaction() {
    let heap = ManagedHeap::new();
    let object = heap.alloc_object(&42f32.to_le_bytes());

    let before = heap.resolve(object).unwrap();
    assert_eq!(heap.compact(), 1);
    let after = heap.resolve(object).unwrap();

    assert_ne!(before, after);
    let factor = unsafe { (after as *const f32).read_unaligned() };
    assert_eq!(factor, 42.0);
}

#[test]
fn live_count_tracks_allocation_and_free() {
    let heap = ManagedHeap::new();
    assert_eq!(heap.live_count(), 0);

    let a = heap.alloc_array(4, 1);
    let b = heap.alloc_object(&[1, 2, 3]);
    assert_eq!(heap.live_count(), 2);

    heap.free_array(a).unwrap();
    heap.free_object(b).unwrap();
    assert_eq!(heap.live_count(), 0);
}
