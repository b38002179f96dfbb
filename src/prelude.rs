/*! Export of the Read, Seek and Write traits for ease of use.

*/

pub use crate::io::{Read as _, Seek as _, Write as _};
