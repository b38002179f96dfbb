/// Longest file name, in bytes. The on-flash field holds one more byte for the terminating nul.
pub const NAME_MAX: usize = 27;
pub const NAME_MAX_PLUS_ONE: usize = NAME_MAX + 1;
