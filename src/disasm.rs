//! The disassembler capability consumed by the detour core.
//!
//! The core never decodes bytes itself — it asks a [`Disassembler`] for an
//! ordered instruction list and works purely on that. This keeps the hard
//! relocation logic in `arch::x86::trampoline` independent of whichever
//! disassembly backend happens to be linked in.
use crate::error::Result;
use crate::instruction::InstructionList;

/// Capability: decode machine code at a known address into instructions.
///
/// Implementations must decode until a natural terminator (e.g. `ret`) or
/// `max_len` bytes have been consumed, whichever comes first, and must
/// correctly populate every field `Instruction` exposes for the x86-64
/// instruction forms relevant to prologues: short/long conditional and
/// unconditional jumps, calls, returns, and RIP-relative `mov`/`lea`.
pub trait Disassembler {
  /// Disassembles up to `max_len` bytes of `buffer`, starting at `address`.
  ///
  /// `buffer` must contain at least `max_len` readable bytes starting at
  /// `address`. Returns an error if the first instruction cannot be
  /// decoded; a truncated final instruction is simply omitted.
  unsafe fn disassemble(&self, address: u64, buffer: *const u8, max_len: usize) -> Result<InstructionList>;
}
