#![cfg_attr(feature = "static-detour", feature(unboxed_closures, fn_traits))]

use std::mem;

type FnAdd = extern "C" fn(i32, i32) -> i32;

#[inline(never)]
extern "C" fn sub_detour(x: i32, y: i32) -> i32 {
  unsafe { std::ptr::read_volatile(&x as *const i32) - y }
}

mod raw {
  use super::*;
  use detour::RawDetour;

  #[test]
  fn test() {
    let _ = env_logger::try_init();

    #[inline(never)]
    extern "C" fn add(x: i32, y: i32) -> i32 {
      unsafe { std::ptr::read_volatile(&x as *const i32) + y }
    }

    unsafe {
      let hook = RawDetour::new(add as *const (), sub_detour as *const ())
        .expect("target or source is not usable for detouring");

      assert_eq!(add(10, 5), 15);
      assert_eq!(hook.is_enabled(), false);

      hook.enable().unwrap();
      {
        assert!(hook.is_enabled());

        // The `add` function is hooked, but can be called using the trampoline.
        let trampoline: FnAdd = mem::transmute(hook.trampoline());

        // Call the original function.
        assert_eq!(trampoline(10, 5), 15);

        // Call the hooked function (i.e. `add -> sub_detour`).
        assert_eq!(add(10, 5), 5);
      }
      hook.disable().unwrap();

      // With the hook disabled, the function is restored.
      assert_eq!(hook.is_enabled(), false);
      assert_eq!(add(10, 5), 15);
    }
  }
}

mod generic {
  use super::*;
  use detour::GenericDetour;

  #[test]
  fn test() {
    #[inline(never)]
    extern "C" fn add(x: i32, y: i32) -> i32 {
      unsafe { std::ptr::read_volatile(&x as *const i32) + y }
    }

    unsafe {
      let hook =
        GenericDetour::<FnAdd>::new(add, sub_detour).expect("target or source is not usable for detouring");

      assert_eq!(add(10, 5), 15);
      assert_eq!(hook.call(10, 5), 15);
      hook.enable().unwrap();
      {
        assert_eq!(hook.call(10, 5), 15);
        assert_eq!(add(10, 5), 5);
      }
      hook.disable().unwrap();
      assert_eq!(hook.call(10, 5), 15);
      assert_eq!(add(10, 5), 15);
    }
  }
}

#[cfg(feature = "static-detour")]
mod statik {
  use super::*;
  use detour::static_detour;

  #[inline(never)]
  unsafe extern "C" fn add(x: i32, y: i32) -> i32 {
    std::ptr::read_volatile(&x as *const i32) + y
  }

  static_detour! {
    pub static DETOUR_ADD: unsafe extern "C" fn(i32, i32) -> i32;
  }

  #[test]
  fn test() {
    unsafe {
      DETOUR_ADD.initialize(add, |x, y| x - y).unwrap();

      assert_eq!(add(10, 5), 15);
      assert_eq!(DETOUR_ADD.is_enabled(), false);

      DETOUR_ADD.enable().unwrap();
      {
        assert!(DETOUR_ADD.is_enabled());
        assert_eq!(DETOUR_ADD.call(10, 5), 15);
        assert_eq!(add(10, 5), 5);
      }
      DETOUR_ADD.disable().unwrap();

      assert_eq!(DETOUR_ADD.is_enabled(), false);
      assert_eq!(DETOUR_ADD.call(10, 5), 15);
      assert_eq!(add(10, 5), 15);
    }
  }
}

/// A straight-line prologue and a looping one, standing in for the
/// upstream `hookMe1`/`hookMe2` scenarios — real compiled functions rather
/// than raw byte fixtures, since both are meant to actually run.
mod normal_function {
  use super::*;
  use detour::RawDetour;
  use std::sync::atomic::{AtomicUsize, Ordering};

  static CALLS: AtomicUsize = AtomicUsize::new(0);

  #[inline(never)]
  extern "C" fn straight_line() -> i32 {
    let a = unsafe { std::ptr::read_volatile(&1i32) };
    let b = unsafe { std::ptr::read_volatile(&2i32) };
    a + b
  }

  extern "C" fn h_straight_line() -> i32 {
    CALLS.fetch_add(1, Ordering::SeqCst);
    99
  }

  #[test]
  fn straight_line_prologue_is_hookable() {
    unsafe {
      let hook = RawDetour::new(straight_line as *const (), h_straight_line as *const ()).unwrap();
      assert_eq!(straight_line(), 3);

      hook.enable().unwrap();
      assert_eq!(straight_line(), 99);
      assert_eq!(CALLS.load(Ordering::SeqCst), 1);

      hook.disable().unwrap();
      assert_eq!(straight_line(), 3);
    }
  }

  #[inline(never)]
  extern "C" fn looping_prologue() -> i32 {
    let mut total = 0;
    for i in 0..10 {
      total += unsafe { std::ptr::read_volatile(&i) };
    }
    total
  }

  extern "C" fn h_looping_prologue() -> i32 {
    CALLS.fetch_add(1, Ordering::SeqCst);
    -1
  }

  #[test]
  fn looping_prologue_is_hookable() {
    unsafe {
      let hook = RawDetour::new(looping_prologue as *const (), h_looping_prologue as *const ()).unwrap();
      assert_eq!(looping_prologue(), 45);

      hook.enable().unwrap();
      assert_eq!(looping_prologue(), -1);

      let trampoline: extern "C" fn() -> i32 = mem::transmute(hook.trampoline());
      assert_eq!(trampoline(), 45);

      hook.disable().unwrap();
      assert_eq!(looping_prologue(), 45);
    }
  }
}

/// `hookMe3`/`hookMe4` from the upstream fixture set: prologues crafted
/// purely to exercise `expand_prologue_self_jumps`, never meant to be
/// executed (upstream keeps these sections commented out for exactly that
/// reason). Hooked on an `mmap`'d buffer so the assertion is limited to
/// what the scenario actually claims: hooking succeeds, and unhooking
/// restores the bytes exactly.
mod self_referential_prologue {
  use detour::RawDetour;
  use std::ptr;

  unsafe fn alloc_executable(bytes: &[u8]) -> *mut u8 {
    let len = bytes.len().max(1);
    let addr = libc::mmap(
      ptr::null_mut(),
      len,
      libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
      libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
      -1,
      0,
    );
    assert_ne!(addr, libc::MAP_FAILED, "mmap failed");
    ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len());
    addr as *mut u8
  }

  extern "C" fn detour_stub() {}

  #[test]
  fn hookme3_self_jmp_in_range_round_trips_exactly() {
    // push rdi; je -7; je -16; 12x nop; ret
    const BYTES: [u8; 18] =
      [0x57, 0x74, 0xf9, 0x74, 0xf0, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0xc3];

    unsafe {
      let target = alloc_executable(&BYTES);
      let hook = RawDetour::new(target as *const (), detour_stub as *const ()).expect("hook must succeed");

      hook.enable().expect("enable must succeed");
      hook.disable().expect("disable must succeed");

      let restored = std::slice::from_raw_parts(target, BYTES.len());
      assert_eq!(restored, &BYTES);

      libc::munmap(target as *mut libc::c_void, BYTES.len());
    }
  }

  #[test]
  fn hookme4_self_jmp_out_of_range_round_trips_exactly() {
    // push rdi; sub rsp, 0x30; 12x nop; je -14 (back into the sub rsp bytes); ret
    const BYTES: [u8; 20] = [
      0x57, 0x48, 0x83, 0xec, 0x30, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x74,
      0xf2, 0xc3,
    ];

    unsafe {
      let target = alloc_executable(&BYTES);
      let hook = RawDetour::new(target as *const (), detour_stub as *const ())
        .expect("hook must succeed by expanding the overwrite window to cover the je");

      hook.enable().expect("enable must succeed");
      hook.disable().expect("disable must succeed");

      let restored = std::slice::from_raw_parts(target, BYTES.len());
      assert_eq!(restored, &BYTES);

      libc::munmap(target as *mut libc::c_void, BYTES.len());
    }
  }
}

/// The one scenario upstream actually left enabled: hooking `calloc` itself.
mod hook_malloc {
  use detour::RawDetour;
  use std::os::raw::c_void;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

  static TRAMPOLINE: AtomicUsize = AtomicUsize::new(0);
  static DID_EXECUTE: AtomicBool = AtomicBool::new(false);

  unsafe extern "C" fn h_hook_malloc(count: usize, size: usize) -> *mut c_void {
    DID_EXECUTE.store(true, Ordering::SeqCst);
    let tramp = TRAMPOLINE.load(Ordering::SeqCst);
    if tramp != 0 {
      let original: unsafe extern "C" fn(usize, usize) -> *mut c_void = std::mem::transmute(tramp);
      original(count, size)
    } else {
      ptr_null_mut()
    }
  }

  fn ptr_null_mut() -> *mut c_void {
    std::ptr::null_mut()
  }

  #[test]
  fn hooking_calloc_is_transparent_to_its_caller() {
    unsafe {
      let hook = RawDetour::new(libc::calloc as *const (), h_hook_malloc as *const ())
        .expect("calloc must be a valid detour target");
      TRAMPOLINE.store(hook.trampoline() as *const () as usize, Ordering::SeqCst);

      hook.enable().unwrap();

      let mem = libc::calloc(16, 16);
      assert!(!mem.is_null());
      libc::free(mem);

      hook.disable().unwrap();

      assert!(DID_EXECUTE.load(Ordering::SeqCst), "the hook must have run");
    }
  }
}

/// Hooking an already-hooked function must transparently re-target the
/// real prologue beneath the first hook's jump (`follow_jmp`), rather than
/// patching over the jump itself.
mod double_hook {
  use detour::RawDetour;
  use std::mem;

  #[inline(never)]
  extern "C" fn add(x: i32, y: i32) -> i32 {
    unsafe { std::ptr::read_volatile(&x as *const i32) + y }
  }

  extern "C" fn first_detour(x: i32, y: i32) -> i32 {
    x - y
  }

  extern "C" fn second_detour(x: i32, y: i32) -> i32 {
    x * y
  }

  #[test]
  fn rehooking_an_already_hooked_function_follows_through_the_first_jump() {
    type FnAdd = extern "C" fn(i32, i32) -> i32;

    unsafe {
      let hook1 = RawDetour::new(add as *const (), first_detour as *const ()).unwrap();
      hook1.enable().unwrap();
      assert_eq!(add(10, 5), 5);

      // `add`'s prologue is now a jump into `first_detour`. Hooking `add`
      // again must follow that jump and relocate `first_detour`'s own
      // prologue, not re-patch the jump we just installed.
      let hook2 = RawDetour::new(add as *const (), second_detour as *const ()).unwrap();
      hook2.enable().unwrap();

      assert_eq!(add(10, 5), 50);

      let original: FnAdd = mem::transmute(hook2.trampoline());
      assert_eq!(original(10, 5), 5);

      hook2.disable().unwrap();
      assert_eq!(add(10, 5), 5);

      hook1.disable().unwrap();
      assert_eq!(add(10, 5), 15);
    }
  }
}
