//! The x86/x64 [`Disassembler`](crate::disasm::Disassembler) implementation,
//! backed by udis86. Translates raw `ud_*` decode results into
//! [`Instruction`] records; this is the only place in the crate that knows
//! about udis86's C API.
use crate::disasm::Disassembler;
use crate::error::{Error, Result};
use crate::instruction::{Instruction, InstructionList};
use std::slice;

/// udis86-backed disassembler for x86/x64 machine code.
pub struct Udis86Disassembler;

impl Udis86Disassembler {
  pub fn new() -> Self {
    Udis86Disassembler
  }
}

impl Default for Udis86Disassembler {
  fn default() -> Self {
    Self::new()
  }
}

impl Disassembler for Udis86Disassembler {
  unsafe fn disassemble(&self, address: u64, buffer: *const u8, max_len: usize) -> Result<InstructionList> {
    let mut ud: udis::ud = std::mem::zeroed();
    udis::ud_init(&mut ud);
    udis::ud_set_input_buffer(&mut ud, buffer, max_len);
    udis::ud_set_mode(&mut ud, (std::mem::size_of::<usize>() * 8) as u8);

    let mut insts = Vec::new();
    let mut offset: usize = 0;

    loop {
      let consumed = udis::ud_disassemble(&mut ud) as usize;
      if consumed == 0 {
        break;
      }

      let inst_addr = address + offset as u64;
      let bytes = slice::from_raw_parts(buffer.add(offset), consumed).to_vec();
      insts.push(decode_one(&ud, inst_addr, bytes));

      offset += consumed;
      if offset >= max_len {
        break;
      }
    }

    if insts.is_empty() {
      Err(Error::InvalidCode)
    } else {
      Ok(insts)
    }
  }
}

/// Converts the just-decoded `ud` state plus its raw bytes into an
/// `Instruction`, classifying relative branches, RIP-relative operands and
/// returns/loops along the way.
unsafe fn decode_one(ud: &udis::ud, address: u64, bytes: Vec<u8>) -> Instruction {
  let mnemonic = udis::ud_insn_mnemonic(ud);
  // The operand string is diagnostic-only (spec §3); udis86's formatted
  // disassembly isn't worth the extra FFI surface here.
  let op_str = String::new();

  if let Some((disp, disp_offset)) = relative_branch_operand(ud) {
    let mut inst = Instruction::new_relative_branch(address, bytes, disp_offset, disp, mnemonic_name(mnemonic), op_str);
    inst.set_branching(true);
    return inst;
  }

  if let Some((disp, disp_offset)) = rip_relative_operand(ud) {
    return Instruction::new_rip_relative(address, bytes, disp_offset, disp, mnemonic_name(mnemonic), op_str);
  }

  let mut inst = Instruction::new(address, bytes, mnemonic_name(mnemonic), op_str);
  if is_return(mnemonic) || is_unconditional_jump(mnemonic) || is_call(mnemonic) {
    inst.set_branching(true);
  }
  inst
}

/// Finds the immediate jump operand (`UD_OP_JIMM`), used by every relative
/// branch form: short/long `jcc`, `jmp`, `call`, `loop`.
unsafe fn relative_branch_operand(ud: &udis::ud) -> Option<(i64, u8)> {
  let inst_len = udis::ud_insn_len(ud) as usize;
  ud.operand.iter().find_map(|op| {
    if op.otype != udis::ud_type::UD_OP_JIMM {
      return None;
    }
    let value = match op.size {
      8 => op.lval.sbyte as i64,
      16 => op.lval.sword as i64,
      32 => op.lval.sdword as i64,
      _ => return None,
    };
    // The operand's byte size tells us where, from the end of the
    // instruction, its encoding starts.
    let disp_size = (op.size / 8) as usize;
    let offset = inst_len.saturating_sub(disp_size);
    Some((value, offset as u8))
  })
}

/// Finds a `[rip+disp32]` memory operand, used by position-independent
/// `mov`/`lea`.
unsafe fn rip_relative_operand(ud: &udis::ud) -> Option<(i64, u8)> {
  let inst_len = udis::ud_insn_len(ud) as usize;
  ud.operand.iter().find_map(|op| {
    if op.otype == udis::ud_type::UD_OP_MEM && op.base == udis::ud_type::UD_R_RIP {
      let disp_size = 4usize;
      let offset = inst_len.saturating_sub(disp_size);
      Some((op.lval.sdword as i64, offset as u8))
    } else {
      None
    }
  })
}

fn is_unconditional_jump(mnemonic: udis::ud_mnemonic_code) -> bool {
  mnemonic == udis::ud_mnemonic_code::UD_Ijmp
}

fn is_call(mnemonic: udis::ud_mnemonic_code) -> bool {
  mnemonic == udis::ud_mnemonic_code::UD_Icall
}

fn is_return(mnemonic: udis::ud_mnemonic_code) -> bool {
  matches!(mnemonic, udis::ud_mnemonic_code::UD_Iret | udis::ud_mnemonic_code::UD_Iretf)
}

fn mnemonic_name(mnemonic: udis::ud_mnemonic_code) -> String {
  unsafe {
    std::ffi::CStr::from_ptr(udis::ud_lookup_mnemonic(mnemonic))
      .to_string_lossy()
      .into_owned()
  }
}
