//! The three public front doors onto the transactional core in
//! [`crate::arch::Detour`]: [`RawDetour`] (no type safety),
//! [`GenericDetour`] (shared-prototype type safety) and, behind the
//! `static-detour` feature, [`StaticDetour`] (a `static`-friendly detour
//! accepting a boxed closure).
use cfg_if::cfg_if;

mod generic;
mod raw;

pub use self::generic::GenericDetour;
pub use self::raw::RawDetour;

cfg_if! {
  if #[cfg(feature = "static-detour")] {
    mod statik;
    pub use self::statik::StaticDetour;
  }
}
