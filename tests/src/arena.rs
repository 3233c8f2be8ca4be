use ember_backend::Arena;
use ember_core::EmitError;

#[test]
fn cursor_advances_per_write() {
    let mut buf = [0u8; 16];
    let mut arena = Arena::new(&mut buf);
    assert_eq!(arena.offset(), 0);
    arena.put_u8(0xAA).unwrap();
    assert_eq!(arena.offset(), 1);
    arena.put_u32(0x1122_3344).unwrap();
    assert_eq!(arena.offset(), 5);
    assert_eq!(arena.remaining(), 11);
    assert_eq!(arena.as_slice(), &[0xAA, 0x44, 0x33, 0x22, 0x11]);
}

#[test]
fn capacity_error_reports_shortfall() {
    let mut buf = [0u8; 4];
    let mut arena = Arena::new(&mut buf);
    arena.put_u16(0xBEEF).unwrap();
    match arena.put_u32(0) {
        Err(EmitError::Capacity { offset, need, capacity }) => {
            assert_eq!(offset, 2);
            assert_eq!(need, 4);
            assert_eq!(capacity, 4);
        }
        other => panic!("expected capacity error, got {other:?}"),
    }
    // The failed write must not move the cursor.
    assert_eq!(arena.offset(), 2);
}

#[test]
fn patch_rewrites_emitted_bytes() {
    let mut buf = [0u8; 8];
    let mut arena = Arena::new(&mut buf);
    arena.put_u32(0).unwrap();
    arena.put_u8(0xC3).unwrap();
    arena.patch_u32(0, 0xDEAD_BEEF);
    assert_eq!(arena.read_u32(0), 0xDEAD_BEEF);
    assert_eq!(arena.as_slice()[4], 0xC3);
}

#[test]
#[should_panic(expected = "patch past write cursor")]
fn patch_beyond_cursor_panics() {
    let mut buf = [0u8; 8];
    let mut arena = Arena::new(&mut buf);
    arena.put_u8(0).unwrap();
    arena.patch_u32(2, 0);
}
