use ember_core::{Arg, ArgKind, Extend, Mem, Precision, Width, F0, R0, R1, R2};

use crate::util::{build, entry};

/// Emit `fn(ptr) -> *ptr` for the given width and extension.
fn loader(w: Width, ext: Extend) -> extern "C" fn(*const u8) -> i64 {
    let (mem, code) = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(&t, &[Arg::gpr(ArgKind::Pointer, R0)]).unwrap();
        s.load(R1, Mem::base(R0), w, ext).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret_val(R1).unwrap();
    });
    std::mem::forget(mem);
    unsafe { entry(&code) }
}

#[test]
fn byte_loads() {
    let data: [u8; 3] = [0xFF, 0x00, 0x42];
    let zx = loader(Width::W8, Extend::Zero);
    assert_eq!(zx(&data[0]), 255);
    assert_eq!(zx(&data[1]), 0);
    assert_eq!(zx(&data[2]), 0x42);

    let sx = loader(Width::W8, Extend::Sign);
    assert_eq!(sx(&data[0]), -1);
    assert_eq!(sx(&data[2]), 0x42);
}

#[test]
fn halfword_loads() {
    let data: u16 = 0xFFF0;
    let p = &data as *const u16 as *const u8;
    assert_eq!(loader(Width::W16, Extend::Zero)(p), 0xFFF0);
    assert_eq!(loader(Width::W16, Extend::Sign)(p), -16);
}

#[test]
fn word_loads() {
    let data: u32 = 0xFFFF_FFF0;
    let p = &data as *const u32 as *const u8;
    assert_eq!(loader(Width::W32, Extend::Zero)(p), 0xFFFF_FFF0);
    assert_eq!(loader(Width::W32, Extend::Sign)(p), -16);

    let wide: u64 = 0x1122_3344_5566_7788;
    let p = &wide as *const u64 as *const u8;
    assert_eq!(
        loader(Width::W64, Extend::Zero)(p),
        0x1122_3344_5566_7788
    );
}

#[test]
fn indexed_addressing_with_displacement() {
    // [base + index + 8] picks the element after the indexed one.
    let (_m, code) = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(&t, &[Arg::gpr(ArgKind::Pointer, R0), Arg::gpr(ArgKind::Word, R1)])
            .unwrap();
        let m = Mem { base: R0, index: Some(R1), disp: 8 };
        s.load(R2, m, Width::W64, Extend::Zero).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret_val(R2).unwrap();
    });
    let f: extern "C" fn(*const u64, i64) -> u64 = unsafe { entry(&code) };
    let data: [u64; 4] = [10, 20, 30, 40];
    assert_eq!(f(data.as_ptr(), 0), 20);
    assert_eq!(f(data.as_ptr(), 16), 40);
}

#[test]
fn absolute_displacement_is_legalized() {
    // A full pointer in the displacement field, with a zero base: the
    // backend must synthesize the address through its scratch register.
    static DATA: [u64; 3] = [u64::MAX, 0, 0x4242_4242_1234_5678];
    let addr = DATA.as_ptr() as i64;
    for (off, want) in [(0, u64::MAX), (8, 0), (16, 0x4242_4242_1234_5678)] {
        let (_m, code) = build(4096, |s| {
            let t = s.enter_abi(0, 0, 0).unwrap();
            s.mov_imm(R0, 0).unwrap();
            s.load(R1, Mem::offset(R0, addr + off), Width::W64, Extend::Zero)
                .unwrap();
            s.leave_abi(&t).unwrap();
            s.ret_val(R1).unwrap();
        });
        let f: extern "C" fn() -> u64 = unsafe { entry(&code) };
        assert_eq!(f(), want);
    }
}

#[test]
fn narrow_stores_leave_neighbors_alone() {
    let (_m, code) = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(&t, &[Arg::gpr(ArgKind::Pointer, R0), Arg::gpr(ArgKind::Word, R1)])
            .unwrap();
        s.store(Mem::offset(R0, 1), R1, Width::W8).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret().unwrap();
    });
    let f: extern "C" fn(*mut u8, i64) = unsafe { entry(&code) };
    let mut buf = [0xEEu8; 4];
    f(buf.as_mut_ptr(), 0x1FF);
    assert_eq!(buf, [0xEE, 0xFF, 0xEE, 0xEE]);
}

#[test]
fn wide_stores() {
    let store = |w: Width| {
        let (mem, code) = build(4096, |s| {
            let t = s.enter_abi(0, 0, 0).unwrap();
            s.load_args(&t, &[Arg::gpr(ArgKind::Pointer, R0), Arg::gpr(ArgKind::Word, R1)])
                .unwrap();
            s.store(Mem::base(R0), R1, w).unwrap();
            s.leave_abi(&t).unwrap();
            s.ret().unwrap();
        });
        std::mem::forget(mem);
        let f: extern "C" fn(*mut u8, i64) = unsafe { entry(&code) };
        f
    };
    let mut v16: u16 = 0;
    store(Width::W16)(&mut v16 as *mut u16 as *mut u8, 0x1_ABCD);
    assert_eq!(v16, 0xABCD);
    let mut v32: u32 = 0;
    store(Width::W32)(&mut v32 as *mut u32 as *mut u8, -2);
    assert_eq!(v32, 0xFFFF_FFFE);
    let mut v64: u64 = 0;
    store(Width::W64)(&mut v64 as *mut u64 as *mut u8, -2);
    assert_eq!(v64, 0xFFFF_FFFF_FFFF_FFFE);
}

#[test]
fn float_roundtrip_through_memory() {
    let (_m, code) = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(
            &t,
            &[Arg::gpr(ArgKind::Pointer, R0), Arg::gpr(ArgKind::Pointer, R1)],
        )
        .unwrap();
        s.load_f(Precision::Double, F0, Mem::base(R0)).unwrap();
        s.store_f(Precision::Double, Mem::base(R1), F0).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret().unwrap();
    });
    let f: extern "C" fn(*const f64, *mut f64) = unsafe { entry(&code) };
    let src = -123.456f64;
    let mut dst = 0.0f64;
    f(&src, &mut dst);
    assert_eq!(dst, -123.456);
}

#[test]
fn single_precision_store() {
    let (_m, code) = build(4096, |s| {
        let t = s.enter_abi(0, 0, 0).unwrap();
        s.load_args(
            &t,
            &[Arg::gpr(ArgKind::Pointer, R0), Arg::fpr(ArgKind::Float, F0)],
        )
        .unwrap();
        s.store_f(Precision::Single, Mem::offset(R0, 4), F0).unwrap();
        s.leave_abi(&t).unwrap();
        s.ret().unwrap();
    });
    let f: extern "C" fn(*mut f32, f32) = unsafe { entry(&code) };
    let mut buf = [0.0f32; 2];
    f(buf.as_mut_ptr(), 1.5);
    assert_eq!(buf, [0.0, 1.5]);
}
