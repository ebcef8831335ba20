//! x64 jump emitters: pure constructors from `(address, destination[, holder])`
//! to the instruction stream the CPU will execute at `address`.
//!
//! Byte-for-byte equivalent to PolyHook's `makex64MinimumJump`/
//! `makex64PreferredJump` forms and the `JumpAbs`/`CallAbs` packed-struct
//! encodings they're modeled on.
use crate::instruction::{calculate_relative_displacement, fits_i32, Instruction};

/// `FF 25 disp32` + a detached 8-byte absolute-destination holder.
///
/// `address` is where the 6-byte jump instruction lands, `holder` is the
/// absolute address of the 8-byte slot the jump reads its destination from
/// (typically somewhere else in the same trampoline), and `destination` is
/// the value written into that slot. Reach from `address` to `holder` must
/// fit in `i32`; reach from `holder` onward is unrestricted.
pub fn minimum_jump(address: u64, destination: u64, holder: u64) -> Option<Vec<Instruction>> {
  let disp = calculate_relative_displacement(address, holder, 6);
  if !fits_i32(disp) {
    return None;
  }
  let disp = disp as i32;

  let mut bytes = vec![0xFF, 0x25, 0, 0, 0, 0];
  bytes[2..6].copy_from_slice(&disp.to_le_bytes());

  let jmp = Instruction::new_relative_branch(address, bytes, 2, disp as i64, "jmp", format!("[{:#x}]", holder));
  let dest_bytes = destination.to_le_bytes().to_vec();
  let slot = Instruction::new_data(holder, dest_bytes);

  Some(vec![jmp, slot])
}

/// `push rax; mov rax, imm64; xchg [rsp], rax; ret` — 16 bytes, unrestricted
/// reach, no visible register clobbered (rax is restored from the stack
/// slot the `xchg` fills in).
pub fn preferred_jump(address: u64, destination: u64) -> Vec<Instruction> {
  let mut addr = address;

  let push_rax = Instruction::new(addr, vec![0x50], "push", "rax");
  addr += push_rax.size() as u64;

  let mut mov_bytes = vec![0x48, 0xB8, 0, 0, 0, 0, 0, 0, 0, 0];
  mov_bytes[2..10].copy_from_slice(&destination.to_le_bytes());
  let mov_rax = Instruction::new(addr, mov_bytes, "mov", format!("rax, {:#x}", destination));
  addr += mov_rax.size() as u64;

  let xchg = Instruction::new(addr, vec![0x48, 0x87, 0x04, 0x24], "xchg", "[rsp], rax");
  addr += xchg.size() as u64;

  let ret = Instruction::new(addr, vec![0xC3], "ret", "");

  vec![push_rax, mov_rax, xchg, ret]
}

/// Total byte length of [`preferred_jump`]'s output.
pub const PREFERRED_JUMP_SIZE: usize = 16;

/// Total byte length of [`minimum_jump`]'s jump instruction alone (the
/// holder lives separately, typically at the end of the trampoline).
pub const MINIMUM_JUMP_SIZE: usize = 6;

/// Size of the detached holder slot `minimum_jump` reads from.
pub const HOLDER_SIZE: usize = 8;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn minimum_jump_reaches_a_holder_within_i32_range() {
    let insts = minimum_jump(0x1_0000_0000, 0xdead_beef, 0x1_0000_1000).expect("holder is in range");
    assert_eq!(insts[0].mnemonic(), "jmp");
    assert_eq!(insts[1].bytes(), 0xdead_beefu64.to_le_bytes());
  }

  #[test]
  fn minimum_jump_refuses_a_holder_outside_i32_range() {
    assert!(minimum_jump(0x1_0000_0000, 0xdead_beef, 0x2_0000_1000).is_none());
  }

  #[test]
  fn preferred_jump_is_always_sixteen_bytes_and_reaches_anywhere() {
    let insts = preferred_jump(0x1000, 0xffff_ffff_ffff_0000);
    assert_eq!(crate::instruction::total_size(&insts), PREFERRED_JUMP_SIZE);
    assert_eq!(insts[3].mnemonic(), "ret");
  }
}
