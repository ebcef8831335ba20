//! Pure jump-instruction constructors (spec §4.2).
//!
//! `x86` holds the 5-byte relative form, kept as the building block the x64
//! forms specialize from (and as the only form 32-bit code would use, were
//! x86 prologue relocation ever promoted to a supported configuration).
//! `x64` is what the trampoline pipeline actually emits.
pub mod x86;

#[cfg(target_arch = "x86_64")]
pub mod x64;
