//! Error types and utilities.

use std::error::Error as StdError;
use std::fmt;

/// The result of a detour operation.
pub type Result<T> = ::std::result::Result<T, Error>;

/// A representation of all possible errors.
#[derive(Debug)]
pub enum Error {
  /// The address for the target and detour are identical
  SameAddress,
  /// The address does not contain valid instructions.
  InvalidCode,
  /// The address has no available area for patching.
  NoPatchArea,
  /// The address is not executable memory.
  NotExecutable,
  /// The detour is not initialized.
  NotInitialized,
  /// The detour is already initialized.
  AlreadyInitialized,
  /// The system is out of executable memory.
  OutOfMemory,
  /// The address contains an instruction that prevents detouring.
  UnsupportedInstruction,
  /// A memory operation failed.
  RegionFailure(region::Error),
  /// The function body is shorter than the smallest jump that can be
  /// installed, so no prefix of it can be safely overwritten.
  PrologueTooShort,
  /// `followJmp` exceeded its recursion depth without reaching a
  /// non-branching instruction.
  JumpFollowTooDeep,
  /// `expandProlSelfJmps` could not reach a fixed point within the
  /// function's decoded length.
  SelfJmpUnboundable,
  /// A RIP-relative instruction's relocated displacement no longer fits in
  /// 32 bits, and it is not a branch (so it cannot be routed through a
  /// jump-table entry instead).
  UnrelocatableInstruction,
  /// The executable allocator could not satisfy a request.
  AllocationFailed,
  /// A page protection change failed or could not be restored.
  ProtectionFailed,
  /// Writing the outbound jump or restoring saved bytes failed.
  WriteFailed,
}

impl StdError for Error {
  fn source(&self) -> Option<&(dyn StdError + 'static)> {
    if let Error::RegionFailure(error) = self {
      Some(error)
    } else {
      None
    }
  }
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Error::SameAddress => write!(f, "Target and detour address is the same"),
      Error::InvalidCode => write!(f, "Address contains invalid assembly"),
      Error::NoPatchArea => write!(f, "Cannot find an inline patch area"),
      Error::NotExecutable => write!(f, "Address is not executable"),
      Error::NotInitialized => write!(f, "Detour is not initialized"),
      Error::AlreadyInitialized => write!(f, "Detour is already initialized"),
      Error::OutOfMemory => write!(f, "Cannot allocate memory"),
      Error::UnsupportedInstruction => write!(f, "Address contains an unsupported instruction"),
      Error::RegionFailure(ref error) => write!(f, "{}", error),
      Error::PrologueTooShort => write!(f, "Function body is too short to relocate a prologue from"),
      Error::JumpFollowTooDeep => write!(f, "Too many chained jumps while following to the real target"),
      Error::SelfJmpUnboundable => write!(f, "Prologue-internal branches never reached a fixed-point size"),
      Error::UnrelocatableInstruction => write!(f, "Instruction cannot be relocated to the trampoline"),
      Error::AllocationFailed => write!(f, "Failed to allocate executable memory for the trampoline"),
      Error::ProtectionFailed => write!(f, "Failed to change or restore memory protection"),
      Error::WriteFailed => write!(f, "Failed to write or restore patched bytes"),
    }
  }
}

impl From<region::Error> for Error {
  fn from(error: region::Error) -> Self {
    Error::RegionFailure(error)
  }
}
