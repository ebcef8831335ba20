//! The scoped memory-protection capability (spec §5, §6).
//!
//! Every write to code or data pages in this crate goes through
//! [`Protector`]: it reads the range's current protection on construction,
//! replaces it, and restores the original on every exit path — including a
//! panic unwinding through the protected section — via `Drop`. Nested
//! protectors on overlapping ranges simply stack; each restores whatever it
//! personally observed, so the outermost one is the one the process ends up
//! seeing, matching spec §5's shared-resource policy.
use crate::error::{Error, Result};
use region::Protection;

/// A page-protection change, scoped to its own lifetime.
///
/// There is no explicit `UNSET` variant — a `Protector` that has already
/// restored its range (or that never captured one) simply holds `None`,
/// which `Drop` treats as a no-op. This plays the role of the source's
/// `ProtFlag::UNSET` sentinel without needing a dedicated enum state.
pub struct Protector {
  address: *const u8,
  size: usize,
  original: Option<Protection>,
}

impl Protector {
  /// Reads the current protection of `[address, address + size)` and
  /// replaces it with `prot`. `region` rounds to whole pages internally, so
  /// callers need not page-align their arguments.
  pub unsafe fn new(address: *const u8, size: usize, prot: Protection) -> Result<Self> {
    let original = region::query(address).map_err(|_| Error::ProtectionFailed)?.protection;
    region::protect(address, size, prot).map_err(|_| Error::ProtectionFailed)?;

    Ok(Protector {
      address,
      size,
      original: Some(original),
    })
  }

  /// The protection observed (and now replaced) at construction time.
  pub fn original(&self) -> Option<Protection> {
    self.original
  }
}

impl Drop for Protector {
  fn drop(&mut self) {
    if let Some(original) = self.original.take() {
      // Best-effort: there is nothing sensible left to do if restoring
      // protection itself fails during unwind.
      let _ = unsafe { region::protect(self.address, self.size, original) };
    }
  }
}

/// Runs `f` with `[address, address + size)` temporarily protected as
/// `prot`, restoring the original protection before returning (or
/// unwinding).
pub unsafe fn protect<T>(address: *const u8, size: usize, prot: Protection, f: impl FnOnce() -> T) -> Result<T> {
  let _guard = Protector::new(address, size, prot)?;
  Ok(f())
}
