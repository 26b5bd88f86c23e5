//! Core plumbing shared by every decoder: errors, encoding constants,
//! section windows, and the bounds-checked cursor.

pub mod constants;
pub mod cursor;
pub mod errors;
pub mod section;

pub use cursor::Cursor;
pub use errors::{DwarfError, Result};
pub use section::{DwarfFormat, Endian, SectionKind, SectionSlice};
