use super::thunk;

/// The furthest distance between a target and its detour/trampoline (2 GiB),
/// matching the signed 32-bit reach of `minimum_jump`'s indirection and the
/// relative forms used inside a relocated prologue.
pub const DETOUR_RANGE: usize = 0x8000_0000;

/// The prologue margin the core asks `calcNearestSz` for: big enough for
/// either outbound jump form, so the choice between them (made later, once
/// the trampoline's actual address is known) never needs to widen the
/// overwrite window after the fact.
pub fn prolog_margin(_target: *const ()) -> usize {
  thunk::x64::PREFERRED_JUMP_SIZE
}
