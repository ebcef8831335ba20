//! The x86/x64 backend: disassembly, jump emitters, and the relocation
//! pipeline the architecture-independent [`arch::Detour`](super::Detour)
//! core drives.
pub mod disasm;
pub mod meta;
pub mod thunk;
pub mod trampoline;
