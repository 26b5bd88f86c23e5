//! Umbra DWARF Decoding Library
//!
//! The decoding core of a DWARF debug-information reader: the line-number
//! program state machine, range-list iteration, and form-encoded attribute
//! value projection, for DWARF versions 2 through 5. File containers, the
//! DIE tree walker, and expression evaluation live behind the
//! [`SectionSource`] / [`UnitContext`] seams and are out of scope.

// Shared plumbing: errors, constants, section windows, cursor
pub mod core;

// Collaborator seams and cross-section indexing
pub mod unit;
pub(crate) mod addr;

// Decoders
pub mod line;
pub mod ranges;
pub mod value;

// Re-export the main decoding surface
pub use crate::core::{
    constants, Cursor, DwarfError, DwarfFormat, Endian, Result, SectionKind, SectionSlice,
};
pub use crate::line::{FileEntry, LineOptions, LineRow, LineRows, LineTable};
pub use crate::ranges::{RangeEntry, RangeIter, RangeList};
pub use crate::unit::{DieRef, Expr, SectionSource, UnitContext};
pub use crate::value::{Value, ValueKind};
