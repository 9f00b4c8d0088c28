//! Default interpreter limits.

/// Default bound on the call-frame stack.
pub const DEFAULT_CALL_DEPTH: usize = 256;

/// Default bound on the register file, in registers. Frames allocate at
/// most 256 registers each, so this admits every configuration the call
/// depth does.
pub const DEFAULT_REGISTER_FILE_CAPACITY: usize = 64 * 1024;
