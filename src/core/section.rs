//! Shared immutable section windows.
//!
//! A [`SectionSlice`] is a cheap-to-clone view over the bytes of one debug
//! section, carrying everything a reader needs to interpret them: byte
//! order, 32/64-bit DWARF format, and address size. Sub-slicing retains the
//! backing allocation, so units, line tables, and range lists can all share
//! one loaded section.

use std::sync::Arc;

use crate::core::errors::{DwarfError, Result};

/// Identifies a debug section to the [`SectionSource`](crate::SectionSource).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Info,
    Str,
    LineStr,
    StrOffsets,
    Addr,
    Ranges,
    RngLists,
    Types,
    Line,
}

impl SectionKind {
    /// The ELF section name, for error messages.
    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Info => ".debug_info",
            SectionKind::Str => ".debug_str",
            SectionKind::LineStr => ".debug_line_str",
            SectionKind::StrOffsets => ".debug_str_offsets",
            SectionKind::Addr => ".debug_addr",
            SectionKind::Ranges => ".debug_ranges",
            SectionKind::RngLists => ".debug_rnglists",
            SectionKind::Types => ".debug_types",
            SectionKind::Line => ".debug_line",
        }
    }
}

/// Byte order of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// 32-bit or 64-bit DWARF format. Decides the width of section offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwarfFormat {
    Dwarf32,
    Dwarf64,
}

impl DwarfFormat {
    /// Width in bytes of a section offset in this format.
    pub fn offset_size(self) -> usize {
        match self {
            DwarfFormat::Dwarf32 => 4,
            DwarfFormat::Dwarf64 => 8,
        }
    }
}

/// A shared, immutable window over the bytes of one debug section.
#[derive(Debug, Clone)]
pub struct SectionSlice {
    data: Arc<[u8]>,
    /// Window bounds within `data`.
    start: usize,
    end: usize,
    pub kind: SectionKind,
    pub endian: Endian,
    pub format: DwarfFormat,
    /// Size in bytes of a machine address read from this window.
    pub addr_size: u8,
}

impl SectionSlice {
    pub fn new(
        kind: SectionKind,
        data: impl Into<Arc<[u8]>>,
        endian: Endian,
        format: DwarfFormat,
        addr_size: u8,
    ) -> Self {
        let data = data.into();
        let end = data.len();
        SectionSlice {
            data,
            start: 0,
            end,
            kind,
            endian,
            format,
            addr_size,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The bytes visible through this window.
    pub fn bytes(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    /// A sub-window of `len` bytes starting at `offset`, sharing the backing
    /// allocation.
    pub fn slice(&self, offset: usize, len: usize) -> Result<SectionSlice> {
        let end = offset.checked_add(len).filter(|e| *e <= self.len());
        match end {
            Some(end) => Ok(SectionSlice {
                data: Arc::clone(&self.data),
                start: self.start + offset,
                end: self.start + end,
                kind: self.kind,
                endian: self.endian,
                format: self.format,
                addr_size: self.addr_size,
            }),
            None => Err(DwarfError::format(format!(
                "slice of {} bytes at offset {} exceeds {} ({} bytes)",
                len,
                offset,
                self.kind.name(),
                self.len()
            ))),
        }
    }

    /// A sub-window from `offset` to the end of this window.
    pub fn slice_to_end(&self, offset: usize) -> Result<SectionSlice> {
        if offset > self.len() {
            return Err(DwarfError::format(format!(
                "offset {} exceeds {} ({} bytes)",
                offset,
                self.kind.name(),
                self.len()
            )));
        }
        self.slice(offset, self.len() - offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sec(bytes: &[u8]) -> SectionSlice {
        SectionSlice::new(
            SectionKind::Info,
            bytes.to_vec(),
            Endian::Little,
            DwarfFormat::Dwarf32,
            8,
        )
    }

    #[test]
    fn slicing_shares_and_narrows() {
        let s = sec(&[1, 2, 3, 4, 5]);
        let sub = s.slice(1, 3).unwrap();
        assert_eq!(sub.bytes(), &[2, 3, 4]);
        let subsub = sub.slice_to_end(2).unwrap();
        assert_eq!(subsub.bytes(), &[4]);
    }

    #[test]
    fn out_of_bounds_slice_is_a_format_error() {
        let s = sec(&[1, 2, 3]);
        assert!(matches!(s.slice(2, 2), Err(DwarfError::Format(_))));
        assert!(matches!(s.slice_to_end(4), Err(DwarfError::Format(_))));
        // usize overflow in offset + len must not panic
        assert!(s.slice(usize::MAX, 2).is_err());
    }
}
