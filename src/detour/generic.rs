use crate::arch::Detour;
use crate::error::{Error, Result};
use crate::traits::{Function, HookableWith};
use std::fmt;

/// A type-safe detour: target and detour share (or are `HookableWith`
/// compatible variants of) a single function prototype `T`, and
/// [`call`](Self::call) — generated per-arity by `impl_hookable!` in
/// `traits.rs` — lets the caller invoke the original through the
/// trampoline without ever naming a raw pointer.
///
/// # Example
///
/// ```rust
/// # use detour::Result;
/// use detour::GenericDetour;
///
/// fn add5(val: i32) -> i32 {
///   val + 5
/// }
///
/// fn add10(val: i32) -> i32 {
///   val + 10
/// }
///
/// # fn main() -> Result<()> {
/// let hook = unsafe { GenericDetour::<fn(i32) -> i32>::new(add5, add10)? };
///
/// assert_eq!(add5(5), 10);
/// assert_eq!(hook.call(5), 10);
///
/// unsafe { hook.enable()? };
/// assert_eq!(add5(5), 15);
/// assert_eq!(hook.call(5), 10);
///
/// unsafe { hook.disable()? };
/// assert_eq!(add5(5), 10);
/// # Ok(())
/// # }
/// ```
pub struct GenericDetour<T: Function> {
  target: T,
  detour: Detour,
}

impl<T: Function> GenericDetour<T> {
  /// Constructs a new detour, rejecting `target == detour` before ever
  /// touching target memory.
  ///
  /// `D` need not be identical to `T` — only `HookableWith`-compatible
  /// (e.g. a safe and an `unsafe` variant of the same prototype) — but the
  /// trampoline is always handed back typed as `T`, the target's prototype.
  pub unsafe fn new<D>(target: T, detour: D) -> Result<Self>
  where
    T: HookableWith<D>,
    D: Function,
  {
    if target.to_ptr() == detour.to_ptr() {
      return Err(Error::SameAddress);
    }

    Ok(GenericDetour {
      target,
      detour: Detour::new(target.to_ptr(), detour.to_ptr())?,
    })
  }

  /// Enables the detour.
  pub unsafe fn enable(&self) -> Result<()> {
    self.detour.enable()
  }

  /// Disables the detour.
  pub unsafe fn disable(&self) -> Result<()> {
    self.detour.disable()
  }

  /// Returns whether the detour is enabled or not.
  pub fn is_enabled(&self) -> bool {
    self.detour.is_enabled()
  }

  /// Returns the target function, as it was passed to [`new`](Self::new).
  pub fn target(&self) -> T {
    self.target
  }

  /// Returns a reference to the generated trampoline.
  ///
  /// `call` (generated for every arity/calling-convention pair by
  /// `impl_hookable!`) transmutes this back to `T` — calling it is
  /// indistinguishable from calling the un-hooked target, regardless of
  /// whether the detour is currently enabled.
  pub fn trampoline(&self) -> &() {
    self.detour.trampoline()
  }
}

impl<T: Function> fmt::Debug for GenericDetour<T> {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "GenericDetour {{ enabled: {}, trampoline: {:?} }}", self.is_enabled(), self.trampoline())
  }
}

unsafe impl<T: Function> Send for GenericDetour<T> {}
unsafe impl<T: Function> Sync for GenericDetour<T> {}
