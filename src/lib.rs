#![recursion_limit = "1024"]
#![cfg_attr(feature = "static-detour", feature(unboxed_closures, fn_traits))]

//! An in-process x86-64 inline detour (function hooking) engine.
//!
//! ## Intro
//!
//! This crate provides thread-safe inline detouring by disassembling and
//! patching functions at runtime: it overwrites a target's prologue with an
//! unconditional jump to a replacement ("detour"/"callback") function,
//! while handing back a **trampoline** that still runs the original
//! prologue (relocated, with every displacement rewritten to match) before
//! resuming the rest of the target.
//!
//! Beyond the basic mechanism, the prologue analysis handles the edge cases
//! that make this hard:
//!
//! - prologue-internal relative branches (short `jcc`/`jmp` whose target
//!   lands inside the overwritten region),
//! - RIP-relative operands (`mov`/`lea` addressing `[rip+disp]`),
//! - already-installed jumps and compiler-emitted thunks (hooking a hooked
//!   function transparently re-hooks the real target),
//! - relaying through a jump table when a relocated branch's reach no
//!   longer fits its original encoding width.
//!
//! ## Detours
//!
//! Three layers of API share the same transactional core
//! ([`arch::Detour`]):
//!
//! - [`RawDetour`]: the untyped building block the others are built on. No
//!   type safety — operates on `*const ()`. Prefer this only when the
//!   prototype genuinely isn't known until runtime.
//! - [`GenericDetour`]: a type-safe interface — the same prototype is
//!   enforced for target and detour, and for invoking the trampoline.
//! - [`StaticDetour`] (behind the `static-detour` feature): a
//!   `static`-friendly, type-safe detour that accepts a boxed closure as
//!   its replacement, declared with [`static_detour!`].
//!
//! ## Features
//!
//! - **static-detour**: nightly-only. Required for [`StaticDetour`] /
//!   [`static_detour!`], which need `Fn<Args>` trait objects not nameable
//!   on stable.
//!
//! ## Platforms
//!
//! x86-64 only; the [`instruction`]/[`arch::x86::thunk`] machinery that
//! makes relocation correct is inherently architecture-specific, and this
//! crate does not attempt to generalize it to other backends.
//!
//! ## Procedure
//!
//! To illustrate a detour:
//!
//! ```c
//! 0 int return_five() {
//! 1     return 5;
//! 00400020 [b8 05 00 00 00] mov eax, 5
//! 00400025 [c3]             ret
//! 2 }
//! 3
//! 4 int detour_function() {
//! 5     return 10;
//! 00400040 [b8 0A 00 00 00] mov eax, 10
//! 00400045 [c3]             ret
//! 6 }
//! ```
//!
//! Detouring `return_five` replaces its five-byte prologue with a relative
//! jump (the common case, when the trampoline lands within reach):
//!
//! ```c
//! 0 int return_five() {
//! 1     return detour_function();
//! 00400020 [e9 16 00 00 00] jmp 1b <detour_function>
//! 00400025 [c3]             ret
//! 2 }
//! ```
//!
//! A trampoline is generated alongside so the original behavior remains
//! callable regardless of whether the detour is currently enabled.

#[macro_use]
mod macros;

mod alloc;
mod arch;
mod detour;
mod disasm;
mod error;
mod instruction;
mod protect;
mod traits;
mod util;

pub use crate::detour::{GenericDetour, RawDetour};
#[cfg(feature = "static-detour")]
pub use crate::detour::StaticDetour;
pub use crate::disasm::Disassembler;
pub use crate::error::{Error, Result};
pub use crate::instruction::{total_size, Displacement, Instruction, InstructionList};
pub use crate::traits::{Function, HookableWith};

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub use crate::arch::x86::disasm::Udis86Disassembler;

#[cfg(test)]
mod tests {
  use super::*;
  use matches::assert_matches;

  #[test]
  fn detours_share_target() {
    #[inline(never)]
    extern "C" fn add(x: i32, y: i32) -> i32 {
      unsafe { std::ptr::read_volatile(&x as *const i32) + y }
    }

    let hook1 = unsafe {
      extern "C" fn sub(x: i32, y: i32) -> i32 {
        x - y
      }
      GenericDetour::<extern "C" fn(i32, i32) -> i32>::new(add, sub).unwrap()
    };

    unsafe { hook1.enable().unwrap() };
    assert_eq!(add(5, 5), 0);

    let hook2 = unsafe {
      extern "C" fn div(x: i32, y: i32) -> i32 {
        x / y
      }
      GenericDetour::<extern "C" fn(i32, i32) -> i32>::new(add, div).unwrap()
    };

    unsafe { hook2.enable().unwrap() };

    // This calls through to the previous hook's detour, since `add` is
    // still patched to jump to `sub` at the instant `hook2` was built.
    assert_eq!(hook2.call(5, 5), 0);
    assert_eq!(add(10, 5), 2);
  }

  #[test]
  fn same_detour_and_target() {
    #[inline(never)]
    extern "C" fn add(x: i32, y: i32) -> i32 {
      unsafe { std::ptr::read_volatile(&x as *const i32) + y }
    }

    let err = unsafe { RawDetour::new(add as *const (), add as *const ()).unwrap_err() };
    assert_matches!(err, Error::SameAddress);
  }
}
