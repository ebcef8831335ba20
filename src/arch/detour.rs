use crate::alloc::Allocator;
use crate::arch::memory;
use crate::arch::x86::disasm::Udis86Disassembler;
use crate::arch::x86::{meta, thunk, trampoline};
use crate::error::{Error, Result};
use crate::instruction::total_size;
use crate::protect::Protector;
use crate::util;
use log::{debug, warn};
use region::Protection;
use std::fmt;
use std::slice;
use std::sync::atomic::{AtomicBool, Ordering};

/// How many bytes of the target are disassembled before `calcNearestSz` /
/// `expandProlSelfJmps` settle on how much of it is actually needed.
/// Generous enough for any prologue this crate ever relocates.
const DISASSEMBLE_WINDOW: usize = 96;

/// An architecture-independent implementation of the hook lifecycle
/// (spec §4.8). This type is never instantiated by itself — it merely
/// exposes an API available through its descendants (`RawDetour`,
/// `GenericDetour`, `StaticDetour`).
pub struct Detour {
  /// The address actually patched — `target` after `followJmp`.
  patch_address: *const (),
  /// Total bytes of the prologue that were overwritten, and must be
  /// restored byte-exact on unhook.
  round_size: usize,
  /// The outbound jump, NOP-padded out to `round_size`.
  patch_bytes: Vec<u8>,
  /// The bytes originally at `patch_address`, snapshotted before patching.
  original_bytes: Vec<u8>,
  /// Owns the relocated prologue, tail jump, and any jump-table slots.
  trampoline: crate::alloc::ExecutableMemory,
  enabled: AtomicBool,
}

impl Detour {
  /// Builds (but does not install) a detour redirecting `target` to
  /// `callback`. Steps follow spec §4.8's `hook()` (a)-(h); step (i), the
  /// actual patch write, happens in [`enable`](Self::enable).
  pub unsafe fn new(target: *const (), callback: *const ()) -> Result<Self> {
    if target == callback {
      return Err(Error::SameAddress);
    }

    // Hold the pool lock across the whole build so concurrent detours
    // don't race on proximity allocation decisions.
    let pool = memory::POOL.lock().unwrap();

    if !util::is_executable_address(target)? || !util::is_executable_address(callback)? {
      return Err(Error::NotExecutable);
    }

    let disasm = Udis86Disassembler::new();
    let (followed, func_insts) = trampoline::follow_jmp(&disasm, target as u64, DISASSEMBLE_WINDOW)?;
    let patch_address = followed as *const ();

    let margin = meta::prolog_margin(patch_address);
    let round_size = trampoline::expand_prologue_self_jumps(&func_insts, margin)?;
    let prologue_end = followed + round_size as u64;

    let prologue: Vec<_> = func_insts.into_iter().take_while(|inst| inst.address() < prologue_end).collect();
    if prologue.is_empty() {
      return Err(Error::InvalidCode);
    }

    let original_bytes = slice::from_raw_parts(patch_address as *const u8, round_size).to_vec();

    // Worst-case trampoline size: we don't yet know the final address (and
    // therefore can't classify which branches truly need a jump-table
    // entry), so size for every branch leaving the prologue needing one.
    // Any slack left over after `relocate_trampoline` runs for real is
    // simply unused tail space in the allocation.
    let entry_candidates = prologue
      .iter()
      .filter(|inst| inst.is_branching() && inst.is_displacement_relative())
      .filter(|inst| {
        let dest = inst.destination();
        dest < followed || dest >= prologue_end
      })
      .count();

    let worst_case_size =
      round_size + thunk::x64::PREFERRED_JUMP_SIZE * (1 + entry_candidates) + thunk::x64::HOLDER_SIZE;

    let trampoline_mem = pool.alloc_near(patch_address, worst_case_size).map_err(|err| {
      warn!("failed to allocate {} bytes near {:?}: {}", worst_case_size, patch_address, err);
      Error::AllocationFailed
    })?;
    let trampoline_addr = trampoline_mem.as_ptr() as u64;
    let delta = trampoline_addr as i64 - followed as i64;

    let reloc = trampoline::build_relocation_list(&prologue, delta)?;
    let body = trampoline::relocate_trampoline(&prologue, trampoline_addr, prologue_end, &reloc, thunk::x64::preferred_jump)?;
    let body_size = total_size(&body);
    let holder_addr = trampoline_addr + body_size as u64;

    // Prefer the 6-byte indirect form when its holder (placed right after
    // the trampoline body) is in reach; otherwise fall back to the
    // register-transparent 16-byte form, which reaches anywhere.
    let (jmp_bytes, holder_bytes): (Vec<u8>, Option<Vec<u8>>) =
      if crate::arch::is_within_range(holder_addr as i64 - followed as i64) {
        let mut insts =
          thunk::x64::minimum_jump(followed, callback as u64, holder_addr).ok_or(Error::UnrelocatableInstruction)?;
        let holder = insts.pop().expect("minimum_jump returns a jump and a holder");
        let jmp = insts.pop().expect("minimum_jump returns a jump and a holder");
        (jmp.bytes().to_vec(), Some(holder.bytes().to_vec()))
      } else {
        let insts = thunk::x64::preferred_jump(followed, callback as u64);
        (insts.iter().flat_map(|inst| inst.bytes().iter().copied()).collect(), None)
      };

    if jmp_bytes.len() > round_size {
      return Err(Error::PrologueTooShort);
    }

    let mut patch_bytes = jmp_bytes;
    patch_bytes.resize(round_size, 0x90);

    let mut trampoline_mem = trampoline_mem;
    let mut offset = 0;
    for inst in &body {
      let bytes = inst.bytes();
      trampoline_mem[offset..offset + bytes.len()].copy_from_slice(bytes);
      offset += bytes.len();
    }
    if let Some(holder) = &holder_bytes {
      trampoline_mem[offset..offset + holder.len()].copy_from_slice(holder);
    }

    debug!(
      "built trampoline for {:?} (patched at {:?}, {} bytes) at {:?}",
      target,
      patch_address,
      round_size,
      trampoline_mem.as_ptr()
    );

    Ok(Detour {
      patch_address,
      round_size,
      patch_bytes,
      original_bytes,
      trampoline: trampoline_mem,
      enabled: AtomicBool::new(false),
    })
  }

  /// Enables the detour.
  pub unsafe fn enable(&self) -> Result<()> {
    self.toggle(true)
  }

  /// Disables the detour.
  pub unsafe fn disable(&self) -> Result<()> {
    self.toggle(false)
  }

  /// Returns whether the detour is enabled or not.
  pub fn is_enabled(&self) -> bool {
    self.enabled.load(Ordering::SeqCst)
  }

  /// Returns a reference to the generated trampoline.
  pub fn trampoline(&self) -> &() {
    unsafe {
      (self.trampoline.as_ptr() as *const ())
        .as_ref()
        .expect("trampoline should not be null")
    }
  }

  /// Writes either the outbound jump or the restored original bytes over
  /// `patch_address`, under a scoped write-enable (spec §4.8 steps (i)/unhook).
  unsafe fn toggle(&self, enable: bool) -> Result<()> {
    let _guard = memory::POOL.lock().unwrap();

    if self.enabled.load(Ordering::SeqCst) == enable {
      return Ok(());
    }

    let bytes: &[u8] = if enable { &self.patch_bytes } else { &self.original_bytes };

    let _protector = Protector::new(self.patch_address as *const u8, self.round_size, Protection::READ_WRITE_EXECUTE)
      .map_err(|err| {
        warn!("failed to toggle protection at {:?}: {}", self.patch_address, err);
        err
      })?;

    let dest = slice::from_raw_parts_mut(self.patch_address as *mut u8, self.round_size);
    dest.copy_from_slice(bytes);

    if &*dest != bytes {
      // Best-effort: put back whatever was there before this attempt. If
      // even that doesn't take, the target is left corrupted and there is
      // nothing left to do but report it.
      let previous: &[u8] = if enable { &self.original_bytes } else { &self.patch_bytes };
      dest.copy_from_slice(previous);
      warn!("outbound write at {:?} did not take; rolled back", self.patch_address);
      return Err(Error::WriteFailed);
    }

    self.enabled.store(enable, Ordering::SeqCst);
    debug!(
      "{} detour at {:?}",
      if enable { "enabled" } else { "disabled" },
      self.patch_address
    );
    Ok(())
  }
}

impl Drop for Detour {
  /// Disables the detour, if enabled.
  fn drop(&mut self) {
    debug_assert!(unsafe { self.disable().is_ok() });
  }
}

impl fmt::Debug for Detour {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "Detour {{ enabled: {}, trampoline: {:?} }}", self.is_enabled(), self.trampoline())
  }
}

unsafe impl Send for Detour {}
unsafe impl Sync for Detour {}
