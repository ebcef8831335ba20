//! Architecture-specific code.
//!
//! Every other architecture backend is expected to expose the same surface
//! `x86` does: a `disasm` module with a [`Disassembler`](crate::disasm::Disassembler)
//! impl, `meta::{DETOUR_RANGE, prolog_margin}`, `thunk` jump emitters and a
//! `trampoline` relocation pipeline. None is implemented today.
pub use self::detour::Detour;

use cfg_if::cfg_if;

// TODO: flush instruction cache on architectures that need it (e.g. ARM);
// x86/x64 keep instruction and data caches coherent in hardware.
cfg_if! {
  if #[cfg(any(target_arch = "x86", target_arch = "x86_64"))] {
    pub mod x86;
    use self::x86::meta;
  } else {
    compile_error!("detour only implements the x86/x86_64 backend");
  }
}

mod detour;
mod memory;

/// True if `displacement` is within the engine's detour range (spec §6).
pub fn is_within_range(displacement: i64) -> bool {
  let range = meta::DETOUR_RANGE as i64;
  (-range..range).contains(&displacement)
}
