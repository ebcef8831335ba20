//! The relocation pipeline (spec §4.3–§4.7): choosing how much of the
//! target's prologue to relocate, following through already-installed
//! hooks, widening the cut so internal branches keep reaching the same
//! instruction, classifying every instruction's relocation need, and
//! finally synthesizing the trampoline's bytes.
//!
//! This is deliberately decomposed into five standalone functions rather
//! than a builder that mutates its way through a single pass — each step
//! is independently testable and mirrors the stages `Detour::new` walks
//! through in order.
use crate::disasm::Disassembler;
use crate::error::{Error, Result};
use crate::instruction::{
  calculate_relative_displacement, fits_i32, fits_width, total_size, InstrId, Instruction, InstructionList,
};
use std::collections::HashSet;

/// Default recursion bound for [`follow_jmp`].
const MAX_FOLLOW_DEPTH: u32 = 3;

/// `calcNearestSz`: the shortest prefix of `insts` whose cumulative size is
/// at least `min_size`. Never splits an instruction; fails if the list is
/// exhausted first.
pub fn calc_nearest_size(insts: &[Instruction], min_size: usize) -> Result<usize> {
  let mut acc = 0usize;
  for inst in insts {
    acc += inst.size();
    if acc >= min_size {
      return Ok(acc);
    }
  }
  Err(Error::PrologueTooShort)
}

/// `followJmp`: if the first instruction at `address` is an unconditional,
/// relative `jmp`, decode at its destination instead and recurse — this is
/// what lets hooking an already-hooked function, or one that starts with a
/// compiler-emitted incremental-link thunk, land on the real prologue.
///
/// `max_len` bounds how many bytes are decoded at each hop; it should be
/// generous enough to cover the largest prologue the caller will ever need,
/// since the returned instruction list is also what `calc_nearest_size` and
/// `expand_prologue_self_jumps` work from.
pub unsafe fn follow_jmp(disasm: &dyn Disassembler, address: u64, max_len: usize) -> Result<(u64, InstructionList)> {
  follow_jmp_at_depth(disasm, address, max_len, 0)
}

unsafe fn follow_jmp_at_depth(
  disasm: &dyn Disassembler,
  address: u64,
  max_len: usize,
  depth: u32,
) -> Result<(u64, InstructionList)> {
  if depth > MAX_FOLLOW_DEPTH {
    return Err(Error::JumpFollowTooDeep);
  }

  let insts = disasm.disassemble(address, address as *const u8, max_len)?;
  let first = insts.first().ok_or(Error::InvalidCode)?;

  if first.mnemonic() == "jmp" && first.is_displacement_relative() {
    let destination = first.destination();
    return follow_jmp_at_depth(disasm, destination, max_len, depth + 1);
  }

  Ok((address, insts))
}

/// `expandProlSelfJmps`: widens `initial_min_size` to a fixed point so that
/// every branch *anywhere in the function* whose destination lands inside
/// the chosen prologue is itself pulled into the relocated region — not
/// just destinations reachable from instructions already inside the cut.
///
/// A branch past the cut that jumps back into it is the dangerous case: its
/// own copy stays behind in the original function, unmoved, but once the
/// prologue is overwritten with the outbound jump its destination no longer
/// holds the instruction it used to. Moving the branch itself into the
/// trampoline (and widening the cut to cover it) lets `build_relocation_list`
/// rewrite its destination to the relocated copy instead.
///
/// Returns the new rounded prologue size.
pub fn expand_prologue_self_jumps(func: &[Instruction], initial_min_size: usize) -> Result<usize> {
  let prologue_start = func.first().ok_or(Error::InvalidCode)?.address();
  let mut min_size = initial_min_size;

  loop {
    let round_size = calc_nearest_size(func, min_size)?;
    let prologue_end = prologue_start + round_size as u64;

    let mut extended = None;
    for inst in func {
      if inst.address() < prologue_end {
        continue;
      }
      if !inst.is_branching() || !inst.is_displacement_relative() {
        continue;
      }

      let dest = inst.destination();
      if dest >= prologue_start && dest < prologue_end {
        let required = (inst.address() + inst.size() as u64 - prologue_start) as usize;
        if required > extended.unwrap_or(0) {
          extended = Some(required);
        }
      }
    }

    match extended {
      Some(required) if required > min_size => {
        min_size = required;
        if min_size > total_size(func) {
          return Err(Error::SelfJmpUnboundable);
        }
      },
      _ => return Ok(round_size),
    }
  }
}

/// The three relocation-need classifications from `buildRelocationList`,
/// keyed by [`InstrId`] rather than cloned instructions so the prologue
/// list remains the single owner of each `Instruction`.
#[derive(Debug, Default)]
pub struct Relocation {
  /// RIP-relative non-branch instructions (e.g. `mov rax, [rip+disp]`)
  /// whose displacement is rewritten in place.
  pub needs_reloc: Vec<InstrId>,
  /// Branches whose target lies outside the prologue and no longer fits
  /// their original encoding width — routed through a jump-table slot.
  pub needs_entry: Vec<InstrId>,
  /// Branches whose target lies inside the prologue — rewritten to point
  /// at the relocated copy of that target.
  pub needs_jump: Vec<InstrId>,
}

/// `buildRelocationList`: walks the final prologue and classifies every
/// displacement-carrying instruction by what relocating it will require.
pub fn build_relocation_list(prologue: &[Instruction], delta: i64) -> Result<Relocation> {
  let mut reloc = Relocation::default();
  let prologue_start = prologue.first().ok_or(Error::InvalidCode)?.address();
  let prologue_end = prologue_start + total_size(prologue) as u64;

  for inst in prologue {
    if !inst.has_displacement() {
      continue;
    }

    let new_address = (inst.address() as i64 + delta) as u64;
    let dest = inst.destination();

    if inst.is_branching() {
      if dest >= prologue_start && dest < prologue_end {
        reloc.needs_jump.push(inst.id());
        continue;
      }

      let new_disp = calculate_relative_displacement(new_address, dest, inst.size() as u8);
      if !fits_width(new_disp, inst.disp_size()) {
        reloc.needs_entry.push(inst.id());
      }
      continue;
    }

    if inst.is_displacement_relative() {
      let new_disp = calculate_relative_displacement(new_address, dest, inst.size() as u8);
      if fits_i32(new_disp) {
        reloc.needs_reloc.push(inst.id());
      } else {
        return Err(Error::UnrelocatableInstruction);
      }
    }
  }

  Ok(reloc)
}

/// `relocateTrampoline`: lays the prologue out at its new addresses,
/// rewrites every displacement `build_relocation_list` flagged, appends the
/// tail jump back into the original function body, and finally appends one
/// jump-table slot per `needs_entry` instruction.
///
/// `jmp_emitter` synthesizes both the tail jump and every jump-table slot;
/// the caller passes [`thunk::x64::preferred_jump`](crate::arch::x86::thunk::x64::preferred_jump)
/// in practice, since both of those only need to reach *back into the
/// original function*, unlike the single outbound jump at the target site
/// whose reach is instead chosen by proximity to the trampoline.
pub fn relocate_trampoline<F>(
  prologue: &[Instruction],
  trampoline_addr: u64,
  tail_destination: u64,
  reloc: &Relocation,
  jmp_emitter: F,
) -> Result<InstructionList>
where
  F: Fn(u64, u64) -> Vec<Instruction>,
{
  let needs_reloc: HashSet<InstrId> = reloc.needs_reloc.iter().copied().collect();
  let needs_entry: HashSet<InstrId> = reloc.needs_entry.iter().copied().collect();
  let needs_jump: HashSet<InstrId> = reloc.needs_jump.iter().copied().collect();

  let mut relocated: InstructionList = Vec::with_capacity(prologue.len());
  let mut address_map: Vec<(u64, u64)> = Vec::with_capacity(prologue.len());
  let mut cursor = trampoline_addr;

  for inst in prologue {
    let mut copy = inst.clone();
    copy.set_address(cursor);
    address_map.push((inst.address(), cursor));
    cursor += copy.size() as u64;
    relocated.push(copy);
  }

  let prologue_end = cursor;

  for (inst, copy) in prologue.iter().zip(relocated.iter_mut()) {
    let id = inst.id();

    if needs_reloc.contains(&id) {
      let new_disp = calculate_relative_displacement(copy.address(), inst.destination(), copy.size() as u8);
      copy.set_relative_displacement(new_disp);
    } else if needs_jump.contains(&id) {
      let orig_dest = inst.destination();
      let new_dest = address_map
        .iter()
        .find(|(orig, _)| *orig == orig_dest)
        .map(|(_, new)| *new)
        .ok_or(Error::UnrelocatableInstruction)?;
      copy.set_destination(new_dest);
    }
  }

  let mut tail = jmp_emitter(prologue_end, tail_destination);
  let mut entries: InstructionList = Vec::new();
  let mut entry_cursor = prologue_end + total_size(&tail) as u64;

  for inst in prologue {
    if !needs_entry.contains(&inst.id()) {
      continue;
    }

    let slot = jmp_emitter(entry_cursor, inst.destination());
    let slot_address = slot
      .first()
      .map(Instruction::address)
      .ok_or(Error::UnrelocatableInstruction)?;
    entry_cursor += total_size(&slot) as u64;

    let copy = relocated
      .iter_mut()
      .zip(prologue.iter())
      .find(|(_, orig)| orig.id() == inst.id())
      .map(|(copy, _)| copy)
      .expect("needs_entry instruction is present in the relocated prologue");
    copy.set_destination(slot_address);

    entries.extend(slot);
  }

  let mut trampoline = relocated;
  trampoline.append(&mut tail);
  trampoline.extend(entries);
  Ok(trampoline)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::arch::x86::thunk;
  use crate::instruction::Instruction;

  fn nop(address: u64) -> Instruction {
    Instruction::new(address, vec![0x90], "nop", "")
  }

  fn push(address: u64) -> Instruction {
    Instruction::new(address, vec![0x57], "push", "rdi")
  }

  fn je(address: u64, destination: u64) -> Instruction {
    let size = 2u8;
    let disp = calculate_relative_displacement(address, destination, size) as i64;
    Instruction::new_relative_branch(address, vec![0x74, disp as u8], 1, disp, "je", format!("{:#x}", destination))
  }

  #[test]
  fn calc_nearest_size_rounds_up_to_instruction_boundary() {
    let insts = vec![push(0x1000), je(0x1001, 0x1001), nop(0x1003), nop(0x1004)];
    assert_eq!(calc_nearest_size(&insts, 2).unwrap(), 3);
    assert_eq!(calc_nearest_size(&insts, 3).unwrap(), 3);
    assert_eq!(calc_nearest_size(&insts, 4).unwrap(), 4);
  }

  #[test]
  fn calc_nearest_size_errors_when_prologue_too_short() {
    let insts = vec![push(0x1000), nop(0x1001)];
    assert!(matches!(calc_nearest_size(&insts, 16), Err(Error::PrologueTooShort)));
  }

  #[test]
  fn expand_prologue_self_jumps_stable_when_branch_already_inside() {
    // push; je (destination a few bytes further in, still inside the
    // initial window); six trailing nops to pad the window to 9 bytes.
    let mut insts = vec![push(0x1000), je(0x1001, 0x1008)];
    for addr in 0x1003u64..0x1009 {
      insts.push(nop(addr));
    }

    assert_eq!(expand_prologue_self_jumps(&insts, 9).unwrap(), 9);
  }

  #[test]
  fn expand_prologue_self_jumps_widens_for_a_branch_landing_back_in_the_window() {
    // Mirrors `hookMe4`: a `sub rsp` prologue the minimum margin (5 bytes)
    // already satisfies, followed by padding and a short `je` that jumps
    // back into the first 5 bytes. The je's own address must be pulled
    // into the window, or its relocated copy is left dangling: its
    // original-location sibling still points at bytes we're about to
    // overwrite with the outbound jump.
    let sub_rsp = Instruction::new(0x1001, vec![0x48, 0x83, 0xEC, 0x30], "sub", "rsp, 0x30");
    let mut insts = vec![push(0x1000), sub_rsp];
    for addr in 0x1005u64..0x1010 {
      insts.push(nop(addr));
    }
    insts.push(je(0x1010, 0x1002));

    // 0x1000 (push) + 0x1001..0x1005 (sub) + 11 nops + 2-byte je == 18 bytes.
    assert_eq!(expand_prologue_self_jumps(&insts, 5).unwrap(), 18);
  }

  #[test]
  fn build_relocation_list_classifies_internal_branch_as_needs_jump() {
    let prologue = vec![nop(0x2000), je(0x2001, 0x2000)];
    let reloc = build_relocation_list(&prologue, 0x10000).unwrap();
    assert_eq!(reloc.needs_jump, vec![prologue[1].id()]);
    assert!(reloc.needs_entry.is_empty());
    assert!(reloc.needs_reloc.is_empty());
  }

  #[test]
  fn build_relocation_list_routes_unreachable_external_branch_through_jump_table() {
    // A `je` whose destination lies far outside the prologue: once
    // relocated by `delta`, the original 1-byte relative field can no
    // longer reach it.
    let branch = je(0x3000, 0x9000);
    let reloc = build_relocation_list(&[branch.clone()], 0x1_0000).unwrap();
    assert_eq!(reloc.needs_entry, vec![branch.id()]);
    assert!(reloc.needs_jump.is_empty());
  }

  #[test]
  fn build_relocation_list_classifies_rip_relative_operand_as_needs_reloc() {
    let inst = Instruction::new_rip_relative(0x4000, vec![0x48, 0x8B, 0x05, 0, 0, 0, 0], 3, 0x100, "mov", "rax, [rip]");
    let reloc = build_relocation_list(&[inst.clone()], 0x10).unwrap();
    assert_eq!(reloc.needs_reloc, vec![inst.id()]);
  }

  #[test]
  fn relocate_trampoline_rewrites_internal_branch_and_appends_tail_jump() {
    let prologue = vec![nop(0x2000), je(0x2001, 0x2000)];
    let trampoline_addr = 0x5000u64;
    let delta = trampoline_addr as i64 - 0x2000i64;
    let reloc = build_relocation_list(&prologue, delta).unwrap();

    let body = relocate_trampoline(&prologue, trampoline_addr, 0x2003, &reloc, thunk::x64::preferred_jump).unwrap();

    // Relocated je now targets the relocated copy of the first nop, not
    // the original (now-overwritten) address.
    assert_eq!(body[1].destination(), trampoline_addr);

    // The tail jump (16 bytes, `preferred_jump` always emits all four
    // instructions) follows directly after the relocated prologue and
    // reaches back into the untouched part of the original function.
    let tail_start = &body[2..6];
    assert_eq!(total_size(tail_start), thunk::x64::PREFERRED_JUMP_SIZE);
    assert_eq!(tail_start[1].op_str, format!("rax, {:#x}", 0x2003u64));
  }
}
