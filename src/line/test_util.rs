//! Builders that assemble line-number program units byte by byte.

use crate::core::{DwarfFormat, Endian, SectionKind, SectionSlice};

pub(crate) fn uleb(mut v: u64) -> Vec<u8> {
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

pub(crate) fn sleb(mut v: i64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (v & 0x7f) as u8;
        v >>= 7;
        let done = (v == 0 && byte & 0x40 == 0) || (v == -1 && byte & 0x40 != 0);
        if !done {
            byte |= 0x80;
        }
        out.push(byte);
        if done {
            return out;
        }
    }
}

/// `DW_LNE_set_address` with an 8-byte address.
pub(crate) fn ext_set_address(addr: u64) -> Vec<u8> {
    let mut out = vec![0x00, 9, 0x02];
    out.extend_from_slice(&addr.to_le_bytes());
    out
}

/// `DW_LNE_end_sequence`.
pub(crate) fn ext_end_sequence() -> Vec<u8> {
    vec![0x00, 1, 0x01]
}

/// Assembles one `.debug_line` unit with length fields fixed up.
pub(crate) struct ProgramBuilder {
    version: u16,
    pub minimum_instruction_length: u8,
    pub maximum_operations_per_instruction: u8,
    pub default_is_stmt: u8,
    pub line_base: i8,
    pub line_range: u8,
    pub opcode_base: u8,
    pub opcode_lengths: Vec<u8>,
    /// Directory and file tables, already encoded for the version.
    tables: Vec<u8>,
    code: Vec<u8>,
}

impl ProgramBuilder {
    pub fn new(version: u16) -> Self {
        ProgramBuilder {
            version,
            minimum_instruction_length: 1,
            maximum_operations_per_instruction: 1,
            default_is_stmt: 1,
            line_base: -5,
            line_range: 14,
            opcode_base: 13,
            opcode_lengths: vec![0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1],
            tables: Vec::new(),
            code: Vec::new(),
        }
    }

    pub fn line_params(mut self, line_base: i8, line_range: u8) -> Self {
        self.line_base = line_base;
        self.line_range = line_range;
        self
    }

    /// v2–v4 directory and file tables. Directories are NUL-terminated
    /// names; files are (name, dir_index) with zero mtime and length.
    pub fn v4_tables(mut self, dirs: &[&str], files: &[(&str, u64)]) -> Self {
        let mut out = Vec::new();
        for dir in dirs {
            out.extend_from_slice(dir.as_bytes());
            out.push(0);
        }
        out.push(0);
        for (name, dir_index) in files {
            out.extend_from_slice(name.as_bytes());
            out.push(0);
            out.extend_from_slice(&uleb(*dir_index));
            out.push(0); // mtime
            out.push(0); // length
        }
        out.push(0);
        self.tables = out;
        self
    }

    /// Raw table bytes, for v5 entry-format tables.
    pub fn raw_tables(mut self, tables: Vec<u8>) -> Self {
        self.tables = tables;
        self
    }

    pub fn code(mut self, code: Vec<u8>) -> Self {
        self.code = code;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&[0u8; 4]); // unit_length, fixed up below
        buf.extend_from_slice(&self.version.to_le_bytes());
        if self.version >= 5 {
            buf.push(8); // address_size
            buf.push(0); // segment_selector_size
        }
        let header_length_pos = buf.len();
        buf.extend_from_slice(&[0u8; 4]);
        let header_start = buf.len();

        buf.push(self.minimum_instruction_length);
        if self.version >= 4 {
            buf.push(self.maximum_operations_per_instruction);
        }
        buf.push(self.default_is_stmt);
        buf.push(self.line_base as u8);
        buf.push(self.line_range);
        buf.push(self.opcode_base);
        buf.extend_from_slice(&self.opcode_lengths);
        buf.extend_from_slice(&self.tables);

        let header_length = (buf.len() - header_start) as u32;
        buf[header_length_pos..header_length_pos + 4]
            .copy_from_slice(&header_length.to_le_bytes());

        buf.extend_from_slice(&self.code);

        let unit_length = (buf.len() - 4) as u32;
        buf[0..4].copy_from_slice(&unit_length.to_le_bytes());
        buf
    }

    pub fn section(&self) -> SectionSlice {
        SectionSlice::new(
            SectionKind::Line,
            self.build(),
            Endian::Little,
            DwarfFormat::Dwarf32,
            8,
        )
    }
}
