//! Indexed lookups into `.debug_addr` and `.debug_str_offsets`.
//!
//! DWARF v5 moves addresses and string offsets out of `.debug_info` into
//! per-unit pools indexed by `DW_FORM_addrx*` / `DW_FORM_strx*`. Both pools
//! start with a small header; the unit's `DW_AT_addr_base` /
//! `DW_AT_str_offsets_base` point just past it. Producers that omit the
//! base attribute get the standard header size as the fallback.

use tracing::trace;

use crate::core::{Cursor, DwarfFormat, Result, SectionSlice};

/// Header size of a `.debug_addr` contribution: initial length (4 or 12),
/// version (2), address size (1), segment selector size (1).
fn addr_header_size(format: DwarfFormat) -> u64 {
    match format {
        DwarfFormat::Dwarf32 => 8,
        DwarfFormat::Dwarf64 => 16,
    }
}

/// Header size of a `.debug_str_offsets` contribution: initial length
/// (4 or 12), version (2), padding (2).
fn str_offsets_header_size(format: DwarfFormat) -> u64 {
    match format {
        DwarfFormat::Dwarf32 => 8,
        DwarfFormat::Dwarf64 => 16,
    }
}

/// Reads slot `index` of the `.debug_addr` pool based at `base` (falling
/// back to just past the header), as an address of `addr_size` bytes.
pub(crate) fn address_at_index(
    sec: &SectionSlice,
    base: Option<u64>,
    addr_size: u8,
    index: u64,
) -> Result<u64> {
    let base = base.unwrap_or_else(|| {
        let fallback = addr_header_size(sec.format);
        trace!(fallback, "no addr_base attribute, assuming header-sized base");
        fallback
    });
    let slot = base.saturating_add(index.saturating_mul(u64::from(addr_size)));
    let mut sized = sec.clone();
    sized.addr_size = addr_size;
    let mut cur = Cursor::at(&sized, slot as usize);
    cur.address()
}

/// Reads slot `index` of the `.debug_str_offsets` pool based at `base`
/// (falling back to just past the header). Slot width follows the
/// section's DWARF format.
pub(crate) fn str_offset_at_index(
    sec: &SectionSlice,
    base: Option<u64>,
    index: u64,
) -> Result<u64> {
    let base = base.unwrap_or_else(|| {
        let fallback = str_offsets_header_size(sec.format);
        trace!(
            fallback,
            "no str_offsets_base attribute, assuming header-sized base"
        );
        fallback
    });
    let slot = base.saturating_add(index.saturating_mul(sec.format.offset_size() as u64));
    let mut cur = Cursor::at(sec, slot as usize);
    cur.offset()
}
