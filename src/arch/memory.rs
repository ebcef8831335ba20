use crate::arch::x86::meta;
use crate::alloc::ThreadAllocator;
use lazy_static::lazy_static;
use std::sync::Mutex;

lazy_static! {
  /// Shared allocator for all detours, scoped to the architecture's detour
  /// range so every trampoline lands within reach of the jump that targets it.
  pub static ref POOL: Mutex<ThreadAllocator> = Mutex::new(ThreadAllocator::new(meta::DETOUR_RANGE));
}
