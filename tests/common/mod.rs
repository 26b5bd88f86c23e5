//! In-memory section and unit fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;

use umbra_dwarf::{
    DieRef, DwarfError, DwarfFormat, Endian, Result, SectionKind, SectionSlice, SectionSource,
    UnitContext,
};

/// Builds a section slice over owned bytes with the test defaults
/// (little-endian, 32-bit DWARF, 8-byte addresses).
pub fn section(kind: SectionKind, bytes: Vec<u8>) -> SectionSlice {
    SectionSlice::new(kind, bytes, Endian::Little, DwarfFormat::Dwarf32, 8)
}

/// A `SectionSource` over in-memory sections.
#[derive(Default)]
pub struct FakeDwarf {
    sections: HashMap<SectionKind, SectionSlice>,
    unit_offsets: Vec<u64>,
    type_units: HashMap<u64, DieRef>,
}

impl FakeDwarf {
    pub fn new() -> Self {
        FakeDwarf::default()
    }

    pub fn with_section(mut self, kind: SectionKind, bytes: Vec<u8>) -> Self {
        self.sections.insert(kind, section(kind, bytes));
        self
    }

    pub fn with_section_slice(mut self, kind: SectionKind, slice: SectionSlice) -> Self {
        self.sections.insert(kind, slice);
        self
    }

    pub fn with_unit_offsets(mut self, offsets: Vec<u64>) -> Self {
        self.unit_offsets = offsets;
        self
    }

    pub fn with_type_unit(mut self, signature: u64, die: DieRef) -> Self {
        self.type_units.insert(signature, die);
        self
    }
}

impl SectionSource for FakeDwarf {
    fn section(&self, kind: SectionKind) -> Result<SectionSlice> {
        self.sections
            .get(&kind)
            .cloned()
            .ok_or_else(|| DwarfError::Format(format!("no {} section", kind.name())))
    }

    fn unit_offsets(&self) -> Vec<u64> {
        self.unit_offsets.clone()
    }

    fn type_unit(&self, signature: u64) -> Option<DieRef> {
        self.type_units.get(&signature).copied()
    }
}

/// A `UnitContext` over a window of fake `.debug_info` bytes.
pub struct FakeUnit {
    dwarf: FakeDwarf,
    data: SectionSlice,
    section_offset: u64,
    pub low_pc: Option<u64>,
    pub addr_base: Option<u64>,
    pub str_offsets_base: Option<u64>,
}

impl FakeUnit {
    pub fn new(dwarf: FakeDwarf, info_bytes: Vec<u8>) -> Self {
        FakeUnit {
            dwarf,
            data: section(SectionKind::Info, info_bytes),
            section_offset: 0,
            low_pc: None,
            addr_base: None,
            str_offsets_base: None,
        }
    }

    pub fn at_section_offset(mut self, offset: u64) -> Self {
        self.section_offset = offset;
        self
    }

    pub fn with_low_pc(mut self, low_pc: u64) -> Self {
        self.low_pc = Some(low_pc);
        self
    }
}

impl UnitContext for FakeUnit {
    fn data(&self) -> &SectionSlice {
        &self.data
    }

    fn section_offset(&self) -> u64 {
        self.section_offset
    }

    fn dwarf(&self) -> &dyn SectionSource {
        &self.dwarf
    }

    fn low_pc(&self) -> Option<u64> {
        self.low_pc
    }

    fn addr_base(&self) -> Option<u64> {
        self.addr_base
    }

    fn str_offsets_base(&self) -> Option<u64> {
        self.str_offsets_base
    }
}

/// Unsigned LEB128, for hand-assembled payloads.
pub fn uleb(mut v: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (v & 0x7f) as u8;
        v >>= 7;
        if v != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if v == 0 {
            return out;
        }
    }
}
