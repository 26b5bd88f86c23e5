//! Range list decoding for `.debug_ranges` (DWARF v4) and
//! `.debug_rnglists` (DWARF v5).
//!
//! A range list is a sequence of `[low, high)` address intervals attached
//! to a DIE. The v4 encoding is a flat array of address pairs with in-band
//! base-address selection; v5 tags every entry and adds indexed variants
//! that resolve through the `.debug_addr` pool.

use tracing::trace;

use crate::addr;
use crate::core::constants::{self, DwRle};
use crate::core::{Cursor, DwarfError, DwarfFormat, Endian, Result, SectionKind, SectionSlice};

/// One half-open address interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeEntry {
    pub low: u64,
    pub high: u64,
}

impl RangeEntry {
    /// Whether `addr` falls inside the interval.
    pub fn contains(&self, addr: u64) -> bool {
        self.low <= addr && addr < self.high
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListEncoding {
    Dwarf4,
    Dwarf5,
}

/// A handle on one encoded range list.
#[derive(Debug, Clone)]
pub struct RangeList {
    /// Window beginning at the first entry of the list.
    sec: SectionSlice,
    /// Initial base address, normally the owning unit's low PC.
    base_addr: u64,
    encoding: ListEncoding,
    /// The `.debug_addr` pool, needed by the v5 indexed entry kinds.
    debug_addr: Option<SectionSlice>,
    addr_base: Option<u64>,
}

impl RangeList {
    /// Wraps the list starting at `offset` within `sec`. Addresses are read
    /// with the owning unit's `addr_size`; `base_addr` seeds offset-pair
    /// entries and is normally the unit's low PC (0 when absent).
    pub fn new(
        sec: &SectionSlice,
        offset: u64,
        addr_size: u8,
        base_addr: u64,
        dwarf5: bool,
    ) -> Result<RangeList> {
        let mut window = sec.slice_to_end(offset as usize)?;
        window.addr_size = addr_size;
        Ok(RangeList {
            sec: window,
            base_addr,
            encoding: if dwarf5 {
                ListEncoding::Dwarf5
            } else {
                ListEncoding::Dwarf4
            },
            debug_addr: None,
            addr_base: None,
        })
    }

    /// Attaches the `.debug_addr` pool used to resolve `DW_RLE_base_addressx`,
    /// `DW_RLE_startx_endx`, and `DW_RLE_startx_length` entries.
    pub fn with_addr_pool(mut self, pool: Option<SectionSlice>, addr_base: Option<u64>) -> Self {
        self.debug_addr = pool;
        self.addr_base = addr_base;
        self
    }

    /// Builds an in-memory v4 list from literal pairs, terminated with
    /// `(0, 0)`. Useful for callers that synthesize coverage from
    /// `low_pc`/`high_pc` attributes.
    pub fn from_pairs(pairs: &[(u64, u64)]) -> RangeList {
        let mut bytes = Vec::with_capacity((pairs.len() + 1) * 16);
        for &(low, high) in pairs {
            bytes.extend_from_slice(&low.to_le_bytes());
            bytes.extend_from_slice(&high.to_le_bytes());
        }
        bytes.extend_from_slice(&[0u8; 16]);
        RangeList {
            sec: SectionSlice::new(
                SectionKind::Ranges,
                bytes,
                Endian::Little,
                DwarfFormat::Dwarf32,
                8,
            ),
            base_addr: 0,
            encoding: ListEncoding::Dwarf4,
            debug_addr: None,
            addr_base: None,
        }
    }

    /// An iterator over the entries, in file order.
    pub fn iter(&self) -> RangeIter<'_> {
        RangeIter {
            list: self,
            pos: 0,
            base_addr: self.base_addr,
            done: false,
        }
    }

    /// Whether any entry of the list contains `addr`.
    pub fn contains(&self, addr: u64) -> Result<bool> {
        let mut iter = self.iter();
        while let Some(entry) = iter.next()? {
            if entry.contains(addr) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Streaming decoder over one range list.
#[derive(Debug)]
pub struct RangeIter<'a> {
    list: &'a RangeList,
    pos: usize,
    base_addr: u64,
    done: bool,
}

impl<'a> RangeIter<'a> {
    /// Decodes entries until one yields an interval or the list ends.
    pub fn next(&mut self) -> Result<Option<RangeEntry>> {
        if self.done {
            return Ok(None);
        }
        let mut cur = Cursor::at(&self.list.sec, self.pos);
        let entry = match self.list.encoding {
            ListEncoding::Dwarf4 => self.next_v4(&mut cur),
            ListEncoding::Dwarf5 => self.next_v5(&mut cur),
        }?;
        self.pos = cur.pos();
        Ok(entry)
    }

    fn next_v4(&mut self, cur: &mut Cursor<'_>) -> Result<Option<RangeEntry>> {
        // The largest representable address marks a base-address selection.
        let largest = match self.list.sec.addr_size {
            8 => u64::MAX,
            size => (1u64 << (8 * u32::from(size))) - 1,
        };
        loop {
            let low = cur.address()?;
            let high = cur.address()?;
            if low == 0 && high == 0 {
                self.done = true;
                return Ok(None);
            } else if low == largest {
                self.base_addr = high;
            } else {
                return Ok(Some(RangeEntry {
                    low: self.base_addr.wrapping_add(low),
                    high: self.base_addr.wrapping_add(high),
                }));
            }
        }
    }

    fn next_v5(&mut self, cur: &mut Cursor<'_>) -> Result<Option<RangeEntry>> {
        loop {
            if cur.at_end() {
                self.done = true;
                return Ok(None);
            }
            let kind = DwRle(cur.read_u8()?);
            match kind {
                constants::DW_RLE_end_of_list => {
                    self.done = true;
                    return Ok(None);
                }
                constants::DW_RLE_base_addressx => {
                    let index = cur.uleb128()?;
                    self.base_addr = self.address_from_pool(kind, index)?;
                    trace!(base = self.base_addr, "range list base address from pool");
                }
                constants::DW_RLE_startx_endx => {
                    let low = self.address_from_pool(kind, cur.uleb128()?)?;
                    let high = self.address_from_pool(kind, cur.uleb128()?)?;
                    return Ok(Some(RangeEntry { low, high }));
                }
                constants::DW_RLE_startx_length => {
                    let low = self.address_from_pool(kind, cur.uleb128()?)?;
                    let length = cur.uleb128()?;
                    return Ok(Some(RangeEntry {
                        low,
                        high: low.wrapping_add(length),
                    }));
                }
                constants::DW_RLE_offset_pair => {
                    let low = self.base_addr.wrapping_add(cur.uleb128()?);
                    let high = self.base_addr.wrapping_add(cur.uleb128()?);
                    return Ok(Some(RangeEntry { low, high }));
                }
                constants::DW_RLE_base_address => {
                    self.base_addr = cur.address()?;
                }
                constants::DW_RLE_start_end => {
                    let low = cur.address()?;
                    let high = cur.address()?;
                    return Ok(Some(RangeEntry { low, high }));
                }
                constants::DW_RLE_start_length => {
                    let low = cur.address()?;
                    let length = cur.uleb128()?;
                    return Ok(Some(RangeEntry {
                        low,
                        high: low.wrapping_add(length),
                    }));
                }
                unknown => {
                    return Err(DwarfError::format(format!(
                        "unknown range list entry kind {} in {}",
                        unknown,
                        self.list.sec.kind.name()
                    )))
                }
            }
        }
    }

    fn address_from_pool(&self, kind: DwRle, index: u64) -> Result<u64> {
        match &self.list.debug_addr {
            Some(pool) => {
                addr::address_at_index(pool, self.list.addr_base, self.list.sec.addr_size, index)
            }
            None => Err(DwarfError::format(format!(
                "{} entry requires a .debug_addr section",
                kind
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges_section(bytes: Vec<u8>, addr_size: u8) -> SectionSlice {
        SectionSlice::new(
            SectionKind::Ranges,
            bytes,
            Endian::Little,
            DwarfFormat::Dwarf32,
            addr_size,
        )
    }

    fn rnglists_section(bytes: Vec<u8>) -> SectionSlice {
        SectionSlice::new(
            SectionKind::RngLists,
            bytes,
            Endian::Little,
            DwarfFormat::Dwarf32,
            8,
        )
    }

    fn collect(list: &RangeList) -> Vec<(u64, u64)> {
        let mut out = Vec::new();
        let mut iter = list.iter();
        while let Some(entry) = iter.next().unwrap() {
            out.push((entry.low, entry.high));
        }
        out
    }

    #[test]
    fn v4_entries_apply_base_address_selection() {
        let mut bytes = Vec::new();
        for word in [
            0x100u64,
            0x200,
            u64::MAX, // base address selection
            0x1000,
            0x10,
            0x20,
            0,
            0,
        ] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        let sec = ranges_section(bytes, 8);
        let list = RangeList::new(&sec, 0, 8, 0, false).unwrap();
        assert_eq!(collect(&list), vec![(0x100, 0x200), (0x1010, 0x1020)]);
    }

    #[test]
    fn v4_base_selection_uses_address_sized_sentinel() {
        let mut bytes = Vec::new();
        for word in [0xffff_ffffu32, 0x4000, 0x1, 0x2, 0, 0] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        let sec = ranges_section(bytes, 4);
        let list = RangeList::new(&sec, 0, 4, 0, false).unwrap();
        assert_eq!(collect(&list), vec![(0x4001, 0x4002)]);
    }

    #[test]
    fn v4_iteration_is_exhausted_after_terminator() {
        let list = RangeList::from_pairs(&[(0x10, 0x20)]);
        let mut iter = list.iter();
        assert_eq!(iter.next().unwrap(), Some(RangeEntry { low: 0x10, high: 0x20 }));
        assert_eq!(iter.next().unwrap(), None);
        assert_eq!(iter.next().unwrap(), None);
    }

    #[test]
    fn v4_truncated_list_is_a_format_error() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x100u64.to_le_bytes());
        let sec = ranges_section(bytes, 8);
        let list = RangeList::new(&sec, 0, 8, 0, false).unwrap();
        assert!(list.iter().next().is_err());
    }

    #[test]
    fn v5_base_address_and_offset_pair() {
        let mut bytes = Vec::new();
        bytes.push(constants::DW_RLE_base_address.0);
        bytes.extend_from_slice(&0x1000u64.to_le_bytes());
        bytes.push(constants::DW_RLE_offset_pair.0);
        bytes.push(0x10);
        bytes.push(0x30);
        bytes.push(constants::DW_RLE_end_of_list.0);
        let sec = rnglists_section(bytes);
        let list = RangeList::new(&sec, 0, 8, 0, true).unwrap();
        assert_eq!(collect(&list), vec![(0x1010, 0x1030)]);
    }

    #[test]
    fn v5_start_end_and_start_length() {
        let mut bytes = Vec::new();
        bytes.push(constants::DW_RLE_start_end.0);
        bytes.extend_from_slice(&0x100u64.to_le_bytes());
        bytes.extend_from_slice(&0x180u64.to_le_bytes());
        bytes.push(constants::DW_RLE_start_length.0);
        bytes.extend_from_slice(&0x2000u64.to_le_bytes());
        bytes.push(0x40);
        bytes.push(constants::DW_RLE_end_of_list.0);
        let sec = rnglists_section(bytes);
        let list = RangeList::new(&sec, 0, 8, 0, true).unwrap();
        assert_eq!(collect(&list), vec![(0x100, 0x180), (0x2000, 0x2040)]);
    }

    #[test]
    fn v5_indexed_entries_resolve_through_debug_addr() {
        let mut pool_bytes = vec![0u8; 8];
        for slot in [0x5000u64, 0x5800, 0x9000] {
            pool_bytes.extend_from_slice(&slot.to_le_bytes());
        }
        let pool = SectionSlice::new(
            SectionKind::Addr,
            pool_bytes,
            Endian::Little,
            DwarfFormat::Dwarf32,
            8,
        );

        let mut bytes = Vec::new();
        bytes.push(constants::DW_RLE_startx_endx.0);
        bytes.push(0); // -> 0x5000
        bytes.push(1); // -> 0x5800
        bytes.push(constants::DW_RLE_base_addressx.0);
        bytes.push(2); // base -> 0x9000
        bytes.push(constants::DW_RLE_offset_pair.0);
        bytes.push(0x08);
        bytes.push(0x10);
        bytes.push(constants::DW_RLE_startx_length.0);
        bytes.push(1); // -> 0x5800
        bytes.push(0x20);
        bytes.push(constants::DW_RLE_end_of_list.0);
        let sec = rnglists_section(bytes);
        let list = RangeList::new(&sec, 0, 8, 0, true)
            .unwrap()
            .with_addr_pool(Some(pool), None);
        assert_eq!(
            collect(&list),
            vec![(0x5000, 0x5800), (0x9008, 0x9010), (0x5800, 0x5820)]
        );
    }

    #[test]
    fn v5_indexed_entry_without_pool_is_a_format_error() {
        let bytes = vec![constants::DW_RLE_base_addressx.0, 0x00];
        let sec = rnglists_section(bytes);
        let list = RangeList::new(&sec, 0, 8, 0, true).unwrap();
        let err = list.iter().next().unwrap_err();
        assert!(err.to_string().contains(".debug_addr"));
    }

    #[test]
    fn v5_unknown_entry_kind_is_a_format_error() {
        let bytes = vec![0x2a];
        let sec = rnglists_section(bytes);
        let list = RangeList::new(&sec, 0, 8, 0, true).unwrap();
        assert!(matches!(
            list.iter().next(),
            Err(DwarfError::Format(_))
        ));
    }

    #[test]
    fn contains_respects_half_open_intervals() {
        let list = RangeList::from_pairs(&[(0x10, 0x20), (0x40, 0x50)]);
        assert!(list.contains(0x10).unwrap());
        assert!(list.contains(0x1f).unwrap());
        assert!(!list.contains(0x20).unwrap());
        assert!(list.contains(0x4f).unwrap());
        assert!(!list.contains(0x60).unwrap());
    }
}
