use crate::detour::GenericDetour;
use crate::error::{Error, Result};
use crate::traits::Function;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// A `static`-friendly, type-safe detour that accepts a boxed closure as its
/// replacement, declared with the [`static_detour!`] macro.
///
/// Requires the `static-detour` feature (nightly-only: the boxed-closure
/// field needs `Fn<Args>` trait objects, which aren't nameable on stable).
/// Because it is a `static`, only one [`GenericDetour`] can ever be active
/// behind it at a time — [`initialize`](Self::initialize) errors with
/// [`Error::AlreadyInitialized`] on a second call.
///
/// The `call` method (generated per-arity by `impl_hookable!`, hence absent
/// from this file and from the rendered docs) always invokes the current
/// closure directly, bypassing whatever is patched into the target —
/// callers needing "the original, right now" should go through this rather
/// than calling the detoured function a second time.
///
/// ```ignore
/// /// Calls the original function regardless of whether it's hooked or not.
/// ///
/// /// Panics if called before `initialize`.
/// fn call(&self, T::Arguments) -> T::Output
/// ```
pub struct StaticDetour<T: Function> {
  closure: AtomicPtr<Box<dyn Fn<T::Arguments, Output = T::Output>>>,
  detour: AtomicPtr<GenericDetour<T>>,
  ffi: T,
}

impl<T: Function> StaticDetour<T> {
  /// Constructs an uninitialized static detour around the `extern "C"`-ish
  /// FFI shim `static_detour!` generates for this prototype. Only called
  /// from macro-expanded code.
  #[doc(hidden)]
  pub const fn __new(ffi: T) -> Self {
    StaticDetour {
      closure: AtomicPtr::new(ptr::null_mut()),
      detour: AtomicPtr::new(ptr::null_mut()),
      ffi,
    }
  }

  /// Creates a hook given a target function and a compatible detour
  /// closure. May only be called once per instance; subsequent calls error
  /// with [`Error::AlreadyInitialized`].
  pub unsafe fn initialize<D>(&self, target: T, closure: D) -> Result<()>
  where
    D: Fn<T::Arguments, Output = T::Output> + Send + 'static,
  {
    let detour = Box::into_raw(Box::new(GenericDetour::new(target, self.ffi)?));

    if self.detour.compare_exchange(ptr::null_mut(), detour, Ordering::SeqCst, Ordering::SeqCst).is_err() {
      drop(Box::from_raw(detour));
      return Err(Error::AlreadyInitialized);
    }

    self.set_detour(closure);
    Ok(())
  }

  /// Enables the detour.
  pub unsafe fn enable(&self) -> Result<()> {
    self.detour.load(Ordering::SeqCst).as_ref().ok_or(Error::NotInitialized)?.enable()
  }

  /// Disables the detour.
  pub unsafe fn disable(&self) -> Result<()> {
    self.detour.load(Ordering::SeqCst).as_ref().ok_or(Error::NotInitialized)?.disable()
  }

  /// Returns whether the detour is enabled or not.
  pub fn is_enabled(&self) -> bool {
    unsafe { self.detour.load(Ordering::SeqCst).as_ref() }.map(GenericDetour::is_enabled).unwrap_or(false)
  }

  /// Changes the active closure, regardless of whether the target is
  /// hooked or not.
  pub fn set_detour<C>(&self, closure: C)
  where
    C: Fn<T::Arguments, Output = T::Output> + Send + 'static,
  {
    let previous = self.closure.swap(Box::into_raw(Box::new(Box::new(closure))), Ordering::SeqCst);
    if !previous.is_null() {
      unsafe { drop(Box::from_raw(previous)) };
    }
  }

  /// Returns a reference to the generated trampoline.
  pub(crate) fn trampoline(&self) -> Result<&()> {
    unsafe { self.detour.load(Ordering::SeqCst).as_ref() }.ok_or(Error::NotInitialized).map(GenericDetour::trampoline)
  }

  /// Returns a transient reference to the active closure.
  #[doc(hidden)]
  pub fn __detour(&self) -> &dyn Fn<T::Arguments, Output = T::Output> {
    unsafe { self.closure.load(Ordering::SeqCst).as_ref() }
      .ok_or(Error::NotInitialized)
      .expect("static detour has not been initialized")
      .as_ref()
  }
}

impl<T: Function> Drop for StaticDetour<T> {
  fn drop(&mut self) {
    let previous = self.closure.swap(ptr::null_mut(), Ordering::Relaxed);
    if !previous.is_null() {
      unsafe { drop(Box::from_raw(previous)) };
    }

    let previous = self.detour.swap(ptr::null_mut(), Ordering::Relaxed);
    if !previous.is_null() {
      unsafe { drop(Box::from_raw(previous)) };
    }
  }
}
