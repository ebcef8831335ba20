//! The decoded, mutable representation of a single machine instruction.
use std::convert::TryFrom;
use std::sync::atomic::{AtomicU64, Ordering};

/// A process-unique identity, minted once per [`Instruction`] and never
/// recomputed from its address or bytes.
///
/// Two instructions decoded from identical bytes at identical addresses
/// (e.g. the same prologue disassembled before and after relocation) must
/// stay distinguishable as map keys; comparing by address or bytes would
/// conflate them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(u64);

impl InstrId {
  fn next() -> Self {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    InstrId(COUNTER.fetch_add(1, Ordering::Relaxed))
  }
}

/// Where an instruction's operand or branch target points to.
///
/// `isRelative ⇒ hasDisplacement` from the source is upheld by keeping the
/// presence bit (`Instruction::has_displacement`) alongside this value
/// rather than folding it into a third enum state: an instruction may carry
/// a (still meaningless) `Displacement::Relative(0)` before any displacement
/// has actually been set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Displacement {
  /// Signed offset, added to `address + size()` to find the destination.
  Relative(i64),
  /// Unsigned absolute destination.
  Absolute(u64),
}

impl Default for Displacement {
  fn default() -> Self {
    Displacement::Relative(0)
  }
}

/// A single decoded (or synthesized) x86-64 instruction.
///
/// Equality and hashing are always identity-based (see [`InstrId`]), never
/// structural.
#[derive(Debug, Clone)]
pub struct Instruction {
  id: InstrId,
  address: u64,
  displacement: Displacement,
  disp_offset: u8,
  has_displacement: bool,
  is_branching: bool,
  bytes: Vec<u8>,
  mnemonic: String,
  op_str: String,
}

impl Instruction {
  /// Constructs an instruction with no displacement.
  pub fn new(address: u64, bytes: Vec<u8>, mnemonic: impl Into<String>, op_str: impl Into<String>) -> Self {
    Instruction {
      id: InstrId::next(),
      address,
      displacement: Displacement::default(),
      disp_offset: 0,
      has_displacement: false,
      is_branching: false,
      bytes,
      mnemonic: mnemonic.into(),
      op_str: op_str.into(),
    }
  }

  /// Constructs a branching instruction whose destination is a relative
  /// displacement encoded at `disp_offset` within `bytes`.
  pub fn new_relative_branch(
    address: u64,
    bytes: Vec<u8>,
    disp_offset: u8,
    displacement: i64,
    mnemonic: impl Into<String>,
    op_str: impl Into<String>,
  ) -> Self {
    let mut inst = Instruction::new(address, bytes, mnemonic, op_str);
    inst.is_branching = true;
    inst.set_relative_displacement(displacement);
    inst.disp_offset = disp_offset;
    inst
  }

  /// Constructs a non-branching instruction with a RIP-relative operand
  /// (e.g. `mov rax, [rip+disp]`).
  pub fn new_rip_relative(
    address: u64,
    bytes: Vec<u8>,
    disp_offset: u8,
    displacement: i64,
    mnemonic: impl Into<String>,
    op_str: impl Into<String>,
  ) -> Self {
    let mut inst = Instruction::new(address, bytes, mnemonic, op_str);
    inst.disp_offset = disp_offset;
    inst.set_relative_displacement(displacement);
    inst
  }

  /// A synthetic "instruction" that is really just a data slot: the 8-byte
  /// absolute-destination holder used by the 6-byte indirect outbound jump.
  pub fn new_data(address: u64, bytes: Vec<u8>) -> Self {
    Instruction::new(address, bytes, "(data)", "")
  }

  /// Process-unique identity; used only as a classification-list key.
  pub fn id(&self) -> InstrId {
    self.id
  }

  pub fn address(&self) -> u64 {
    self.address
  }

  /// Book-keeping only — does not re-encode or move anything.
  pub fn set_address(&mut self, address: u64) {
    self.address = address;
  }

  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  pub fn size(&self) -> usize {
    self.bytes.len()
  }

  pub fn mnemonic(&self) -> &str {
    &self.mnemonic
  }

  pub fn full_name(&self) -> String {
    if self.op_str.is_empty() {
      self.mnemonic.clone()
    } else {
      format!("{} {}", self.mnemonic, self.op_str)
    }
  }

  pub fn is_branching(&self) -> bool {
    self.is_branching
  }

  pub fn set_branching(&mut self, status: bool) {
    self.is_branching = status;
  }

  pub fn has_displacement(&self) -> bool {
    self.has_displacement
  }

  /// True iff a displacement has actually been set *and* it is the
  /// relative kind. `displacement` defaults to `Relative(0)` before either
  /// setter ever runs, so checking the enum discriminant alone would call
  /// an untouched `ret`/indirect `call`/indirect `jmp` "relative" — gating
  /// on `has_displacement` is what keeps `isRelative ⇒ hasDisplacement`.
  pub fn is_displacement_relative(&self) -> bool {
    self.has_displacement && matches!(self.displacement, Displacement::Relative(_))
  }

  pub fn displacement(&self) -> Displacement {
    self.displacement
  }

  pub fn disp_offset(&self) -> u8 {
    self.disp_offset
  }

  pub fn set_disp_offset(&mut self, offset: u8) {
    self.disp_offset = offset;
  }

  /// Number of bytes the displacement occupies, counted from `disp_offset`
  /// to the end of the instruction.
  pub fn disp_size(&self) -> usize {
    self.size().saturating_sub(self.disp_offset as usize)
  }

  /// Address this instruction points to, if it is branching or otherwise
  /// carries a displacement. Handles both relative and absolute forms.
  pub fn destination(&self) -> u64 {
    match self.displacement {
      Displacement::Relative(rel) => (self.address as i64 + rel + self.size() as i64) as u64,
      Displacement::Absolute(abs) => abs,
    }
  }

  /// Re-targets the instruction so [`destination`](Self::destination)
  /// returns `dest`, keeping whichever displacement kind it already used.
  pub fn set_destination(&mut self, dest: u64) {
    if !self.is_branching() && !self.has_displacement() {
      return;
    }
    match self.displacement {
      Displacement::Relative(_) => {
        let new_disp = calculate_relative_displacement(self.address, dest, self.size() as u8);
        self.set_relative_displacement(new_disp);
      },
      Displacement::Absolute(_) => self.set_absolute_displacement(dest),
    }
  }

  /// Updates the relative displacement and re-encodes it into `bytes` at
  /// `disp_offset`. Silently no-ops (debug-asserts) if the encoding would
  /// not fit; callers are expected to have validated reach beforehand.
  pub fn set_relative_displacement(&mut self, displacement: i64) {
    self.displacement = Displacement::Relative(displacement);
    self.has_displacement = true;
    self.encode_displacement(displacement.to_le_bytes().as_ref());
  }

  /// Symmetric with [`set_relative_displacement`](Self::set_relative_displacement).
  pub fn set_absolute_displacement(&mut self, displacement: u64) {
    self.displacement = Displacement::Absolute(displacement);
    self.has_displacement = true;
    self.encode_displacement(displacement.to_le_bytes().as_ref());
  }

  fn encode_displacement(&mut self, le_bytes: &[u8]) {
    let offset = self.disp_offset as usize;
    let size = self.disp_size();

    if size > le_bytes.len() || offset + size > self.bytes.len() {
      debug_assert!(
        offset + size <= self.bytes.len() && size <= le_bytes.len(),
        "displacement does not fit in instruction bytes"
      );
      return;
    }

    self.bytes[offset..offset + size].copy_from_slice(&le_bytes[..size]);
  }
}

/// `lhs == rhs` iff they are literally the same decoded instruction.
impl PartialEq for Instruction {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id
  }
}
impl Eq for Instruction {}

impl std::hash::Hash for Instruction {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.id.hash(state);
  }
}

impl std::fmt::Display for Instruction {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "{:#x} [{}]: {}", self.address, self.size(), self.full_name())?;
    if self.has_displacement && self.is_displacement_relative() {
      write!(f, " -> {:#x}", self.destination())?;
    }
    Ok(())
  }
}

/// Ordered sequence of instructions, e.g. a decoded prologue or a synthesized
/// trampoline.
pub type InstructionList = Vec<Instruction>;

/// Total byte length of a sequence of instructions.
pub fn total_size(insts: &[Instruction]) -> usize {
  insts.iter().map(Instruction::size).sum()
}

/// `calculateRelativeDisplacement<T>(from, to, insSize)` from the source:
/// the signed offset a branch of `ins_size` bytes at `from` needs to reach
/// `to`. Round-trips bit-exactly: `from + ins_size + d == to`.
pub fn calculate_relative_displacement(from: u64, to: u64, ins_size: u8) -> i64 {
  (to as i64).wrapping_sub(from as i64).wrapping_sub(ins_size as i64)
}

/// Whether a displacement fits in a signed 32-bit field.
pub fn fits_i32(displacement: i64) -> bool {
  i32::try_from(displacement).is_ok()
}

/// Whether `displacement` fits in a signed field of `width` bytes — used to
/// decide whether a relocated branch still fits its *original* encoding
/// width (1, 2 or 4 bytes) or needs to be routed through a jump-table entry.
pub fn fits_width(displacement: i64, width: usize) -> bool {
  match width {
    1 => i8::try_from(displacement).is_ok(),
    2 => i16::try_from(displacement).is_ok(),
    4 => i32::try_from(displacement).is_ok(),
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn relative_displacement_round_trips() {
    let from = 0x1000u64;
    let to = 0x2000u64;
    let disp = calculate_relative_displacement(from, to, 5);
    assert_eq!((from as i64 + disp + 5) as u64, to);
  }

  #[test]
  fn destination_matches_manual_relative_calculation() {
    let mut inst = Instruction::new_relative_branch(0x1000, vec![0xe9, 0, 0, 0, 0], 1, 0, "jmp", "");
    inst.set_relative_displacement(0x100);
    assert_eq!(inst.destination(), 0x1000 + 5 + 0x100);
  }

  #[test]
  fn set_destination_preserves_relative_kind_and_round_trips() {
    let mut inst = Instruction::new_relative_branch(0x2000, vec![0xe9, 0, 0, 0, 0], 1, 0, "jmp", "");
    inst.set_destination(0x9000);
    assert_eq!(inst.destination(), 0x9000);
    assert!(inst.is_displacement_relative());
  }

  #[test]
  fn fits_width_respects_signed_byte_boundary() {
    assert!(fits_width(127, 1));
    assert!(fits_width(-128, 1));
    assert!(!fits_width(128, 1));
    assert!(!fits_width(-129, 1));
  }

  #[test]
  fn total_size_sums_instruction_lengths() {
    let insts = vec![
      Instruction::new(0x1000, vec![0x90], "nop", ""),
      Instruction::new(0x1001, vec![0x57], "push", "rdi"),
      Instruction::new(0x1002, vec![0xe9, 0, 0, 0, 0], "jmp", ""),
    ];
    assert_eq!(total_size(&insts), 7);
  }
}
