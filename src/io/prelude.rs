//! Export of the Read, Write and Seek traits for ease of use.

pub use super::{Read, Seek, Write};
