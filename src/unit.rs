//! Seams to the collaborators that own sections and compilation units.
//!
//! The decoders in this crate never touch a file container or walk the DIE
//! tree. They consume sections through [`SectionSource`] and per-unit
//! context through [`UnitContext`], and hand back [`DieRef`] handles the
//! tree walker can materialize.

use crate::core::{Result, SectionKind, SectionSlice};

/// Access to the debug sections of one loaded object.
///
/// Implementations are expected to be idempotent: the decoders fetch
/// sections lazily the first time a cross-section form is hit and may cache
/// the returned slice.
pub trait SectionSource {
    /// The named section, with endianness, DWARF format, and address size
    /// filled in by the loader.
    fn section(&self, kind: SectionKind) -> Result<SectionSlice>;

    /// Start offsets of the compilation units within `.debug_info`, in
    /// ascending order. Used to locate the unit owning a
    /// `DW_FORM_ref_addr` target.
    fn unit_offsets(&self) -> Vec<u64>;

    /// Looks up a type unit by its 8-byte signature, returning the type DIE
    /// it declares. `None` when the signature is unknown.
    fn type_unit(&self, signature: u64) -> Option<DieRef>;
}

/// Per-compilation-unit context consumed by the value decoder.
pub trait UnitContext {
    /// The unit's window of `.debug_info`.
    fn data(&self) -> &SectionSlice;

    /// The unit's start offset within `.debug_info`.
    fn section_offset(&self) -> u64;

    /// The enclosing decoder context.
    fn dwarf(&self) -> &dyn SectionSource;

    /// The unit's base address, used as the initial range-list base.
    fn low_pc(&self) -> Option<u64> {
        None
    }

    /// `DW_AT_addr_base` from the root DIE, when present.
    fn addr_base(&self) -> Option<u64> {
        None
    }

    /// `DW_AT_str_offsets_base` from the root DIE, when present.
    fn str_offsets_base(&self) -> Option<u64> {
        None
    }
}

/// A reference to a debugging information entry, expressed as the owning
/// unit's start offset in its section plus the DIE offset within that unit.
///
/// This is the constructor seam of the out-of-scope tree walker: the value
/// decoder produces these, it never reads through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DieRef {
    pub unit_offset: u64,
    pub offset: u64,
}

impl DieRef {
    pub fn new(unit_offset: u64, offset: u64) -> Self {
        DieRef {
            unit_offset,
            offset,
        }
    }

    /// The absolute offset of the entry within its section.
    pub fn section_offset(&self) -> u64 {
        self.unit_offset + self.offset
    }
}

/// A location-expression slice: where the expression bytes live and how
/// many there are. Evaluation is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expr {
    /// Start offset of the owning unit within `.debug_info`.
    pub unit_offset: u64,
    /// Offset of the first expression byte within the unit.
    pub offset: u64,
    /// Expression length in bytes.
    pub size: u64,
}

impl Expr {
    /// The absolute offset of the expression bytes within `.debug_info`.
    pub fn section_offset(&self) -> u64 {
        self.unit_offset + self.offset
    }
}
