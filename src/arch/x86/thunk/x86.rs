//! x86 jump emitter: `E9 rel32`, the 5-byte near relative jump.
//!
//! This is the primitive the "minimum" x64 form (`FF 25 disp32`) and the
//! relocated prologue's own relative branches both ultimately reduce to: a
//! single 32-bit-reach relative displacement write.
use crate::instruction::{calculate_relative_displacement, fits_i32, Instruction};

/// Total byte length of [`near_jump`]'s output.
pub const NEAR_JUMP_SIZE: usize = 5;

/// `E9 rel32`. Fails if `destination` is not reachable with a signed 32-bit
/// displacement from `address + 5`.
pub fn near_jump(address: u64, destination: u64) -> Option<Instruction> {
  let disp = calculate_relative_displacement(address, destination, NEAR_JUMP_SIZE as u8);
  if !fits_i32(disp) {
    return None;
  }
  let disp = disp as i32;

  let mut bytes = vec![0xE9, 0, 0, 0, 0];
  bytes[1..5].copy_from_slice(&disp.to_le_bytes());

  Some(Instruction::new_relative_branch(
    address,
    bytes,
    1,
    disp as i64,
    "jmp",
    format!("{:#x}", destination),
  ))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn near_jump_reaches_within_i32_range() {
    let inst = near_jump(0x1000, 0x1000 + 0x1000).expect("small forward jump is in range");
    assert_eq!(inst.destination(), 0x1000 + 0x1000);
  }

  #[test]
  fn near_jump_refuses_a_destination_outside_i32_range() {
    assert!(near_jump(0x1_0000_0000, 0xf_0000_0000).is_none());
  }
}
