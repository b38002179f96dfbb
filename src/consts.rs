pub use pagefs_core::{NAME_MAX, NAME_MAX_PLUS_ONE};

/// Version tag stored in the superblock, at most 16 bytes.
pub const VERSION: &str = "pagefs-v1";
/// Value of an erased flash byte. Doubles as the free-slot marker.
pub const ERASED: u8 = 0xff;

/// Capacity of the file-info table.
pub const FILES_MAX: usize = 32;
/// Capacity of the extent table, shared by all files.
pub const EXTENTS_MAX: usize = 64;
/// Page runs one file may be split into.
pub const EXTENTS_PER_FILE_MAX: usize = 8;
/// Files open at the same time. Must be a power of two.
pub const OPEN_FILES_MAX: usize = 8;
/// Callers holding cursors on one open file.
pub const CALLERS_MAX: usize = 4;
