//! Bounds-checked byte reader over a [`SectionSlice`].
//!
//! Every multi-byte read honors the slice's byte order; addresses and
//! section offsets honor its address size and 32/64-bit DWARF format. All
//! reads validate against the window length and fail with
//! [`DwarfError::Format`] instead of running past the end.

use crate::core::constants::{self, DwForm};
use crate::core::errors::{DwarfError, Result};
use crate::core::section::{DwarfFormat, Endian, SectionSlice};

/// A stateful reader positioned within one section window.
///
/// Cursors are cheap, single-threaded, and never outlive their slice.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    sec: &'a SectionSlice,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(sec: &'a SectionSlice) -> Self {
        Cursor { sec, pos: 0 }
    }

    pub fn at(sec: &'a SectionSlice, pos: usize) -> Self {
        Cursor { sec, pos }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.sec.len()
    }

    pub fn remaining(&self) -> usize {
        self.sec.len().saturating_sub(self.pos)
    }

    pub fn section(&self) -> &'a SectionSlice {
        self.sec
    }

    fn ensure(&self, count: usize) -> Result<()> {
        if self.pos.checked_add(count).is_some_and(|e| e <= self.sec.len()) {
            Ok(())
        } else {
            Err(DwarfError::format(format!(
                "read of {} bytes at offset {} runs past the end of {} ({} bytes)",
                count,
                self.pos,
                self.sec.kind.name(),
                self.sec.len()
            )))
        }
    }

    /// Reads an unsigned integer of `size` bytes in the section's byte order.
    pub fn read_uint(&mut self, size: usize) -> Result<u64> {
        debug_assert!(size >= 1 && size <= 8);
        self.ensure(size)?;
        let bytes = &self.sec.bytes()[self.pos..self.pos + size];
        self.pos += size;
        let mut v: u64 = 0;
        match self.sec.endian {
            Endian::Little => {
                for &b in bytes.iter().rev() {
                    v = (v << 8) | u64::from(b);
                }
            }
            Endian::Big => {
                for &b in bytes {
                    v = (v << 8) | u64::from(b);
                }
            }
        }
        Ok(v)
    }

    /// Reads a signed integer of `size` bytes, sign-extended to 64 bits.
    pub fn read_sint(&mut self, size: usize) -> Result<i64> {
        let v = self.read_uint(size)?;
        let shift = 64 - 8 * size as u32;
        Ok(((v as i64) << shift) >> shift)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_uint(1)? as u8)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_uint(1)? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.read_uint(2)? as u16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.read_uint(4)? as u32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_uint(8)
    }

    /// Reads an unsigned LEB128 value. At most ten bytes encode a `u64`;
    /// longer or overflowing encodings are format errors.
    pub fn uleb128(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift: u32 = 0;
        loop {
            let byte = self.read_u8()?;
            let group = u64::from(byte & 0x7f);
            if shift >= 64 || (shift > 0 && group > (u64::MAX >> shift)) {
                return Err(DwarfError::format(format!(
                    "ULEB128 value at offset {} in {} overflows 64 bits",
                    self.pos,
                    self.sec.kind.name()
                )));
            }
            result |= group << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
    }

    /// Reads a signed LEB128 value, sign-extending from the final group.
    pub fn sleb128(&mut self) -> Result<i64> {
        let mut result: i64 = 0;
        let mut shift: u32 = 0;
        loop {
            let byte = self.read_u8()?;
            if shift >= 64 {
                return Err(DwarfError::format(format!(
                    "SLEB128 value at offset {} in {} overflows 64 bits",
                    self.pos,
                    self.sec.kind.name()
                )));
            }
            result |= i64::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= !0i64 << shift;
                }
                return Ok(result);
            }
        }
    }

    /// Returns a view of the next `count` bytes and advances past them.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        self.ensure(count)?;
        let bytes = &self.sec.bytes()[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    /// Reads a NUL-terminated byte string, returning the bytes before the
    /// NUL and advancing past it.
    pub fn cstr(&mut self) -> Result<&'a [u8]> {
        let bytes = self.sec.bytes();
        let rest = &bytes[self.pos.min(bytes.len())..];
        match rest.iter().position(|&b| b == 0) {
            Some(nul) => {
                let s = &rest[..nul];
                self.pos += nul + 1;
                Ok(s)
            }
            None => Err(DwarfError::format(format!(
                "unterminated string at offset {} in {}",
                self.pos,
                self.sec.kind.name()
            ))),
        }
    }

    /// Reads a NUL-terminated string as owned UTF-8 (lossy).
    pub fn string(&mut self) -> Result<String> {
        Ok(String::from_utf8_lossy(self.cstr()?).into_owned())
    }

    /// Reads a machine address of the slice's `addr_size` bytes.
    pub fn address(&mut self) -> Result<u64> {
        match self.sec.addr_size {
            4 | 8 => self.read_uint(self.sec.addr_size as usize),
            size => Err(DwarfError::format(format!(
                "unsupported address size {} in {}",
                size,
                self.sec.kind.name()
            ))),
        }
    }

    /// Reads a section offset of 4 or 8 bytes per the slice's DWARF format.
    pub fn offset(&mut self) -> Result<u64> {
        self.read_uint(self.sec.format.offset_size())
    }

    /// Reads an initial length field, detecting the 64-bit DWARF sentinel.
    ///
    /// Returns the unit length and the format it implies. The values
    /// `0xfffffff0..=0xfffffffe` are reserved by the standard.
    pub fn initial_length(&mut self) -> Result<(u64, DwarfFormat)> {
        let word = self.read_u32()?;
        if word == 0xffff_ffff {
            Ok((self.read_u64()?, DwarfFormat::Dwarf64))
        } else if word >= 0xffff_fff0 {
            Err(DwarfError::format(format!(
                "reserved initial length 0x{:x} in {}",
                word,
                self.sec.kind.name()
            )))
        } else {
            Ok((u64::from(word), DwarfFormat::Dwarf32))
        }
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.ensure(count)?;
        self.pos += count;
        Ok(())
    }

    /// Advances past a value encoded with `form` without decoding it.
    pub fn skip_form(&mut self, form: DwForm) -> Result<()> {
        let size = match form {
            constants::DW_FORM_addr => self.sec.addr_size as usize,
            constants::DW_FORM_data1
            | constants::DW_FORM_ref1
            | constants::DW_FORM_flag
            | constants::DW_FORM_strx1
            | constants::DW_FORM_addrx1 => 1,
            constants::DW_FORM_data2
            | constants::DW_FORM_ref2
            | constants::DW_FORM_strx2
            | constants::DW_FORM_addrx2 => 2,
            constants::DW_FORM_strx3 | constants::DW_FORM_addrx3 => 3,
            constants::DW_FORM_data4
            | constants::DW_FORM_ref4
            | constants::DW_FORM_ref_sup4
            | constants::DW_FORM_strx4
            | constants::DW_FORM_addrx4 => 4,
            constants::DW_FORM_data8
            | constants::DW_FORM_ref8
            | constants::DW_FORM_ref_sig8
            | constants::DW_FORM_ref_sup8 => 8,
            constants::DW_FORM_data16 => 16,
            constants::DW_FORM_strp
            | constants::DW_FORM_line_strp
            | constants::DW_FORM_strp_sup
            | constants::DW_FORM_sec_offset
            | constants::DW_FORM_ref_addr => self.sec.format.offset_size(),
            constants::DW_FORM_flag_present | constants::DW_FORM_implicit_const => 0,
            constants::DW_FORM_udata
            | constants::DW_FORM_sdata
            | constants::DW_FORM_ref_udata
            | constants::DW_FORM_strx
            | constants::DW_FORM_addrx
            | constants::DW_FORM_loclistx
            | constants::DW_FORM_rnglistx => {
                self.uleb128()?;
                0
            }
            constants::DW_FORM_string => {
                self.cstr()?;
                0
            }
            constants::DW_FORM_block1 => {
                let len = self.read_u8()? as usize;
                self.skip(len)?;
                0
            }
            constants::DW_FORM_block2 => {
                let len = self.read_u16()? as usize;
                self.skip(len)?;
                0
            }
            constants::DW_FORM_block4 => {
                let len = self.read_u32()? as usize;
                self.skip(len)?;
                0
            }
            constants::DW_FORM_block | constants::DW_FORM_exprloc => {
                let len = self.uleb128()? as usize;
                self.skip(len)?;
                0
            }
            constants::DW_FORM_indirect => {
                let inner = DwForm(self.uleb128()? as u16);
                return self.skip_form(inner);
            }
            other => {
                return Err(DwarfError::format(format!(
                    "cannot skip unknown form {} in {}",
                    other,
                    self.sec.kind.name()
                )))
            }
        };
        self.skip(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::section::SectionKind;

    pub(crate) fn encode_uleb128(mut v: u64) -> Vec<u8> {
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

    pub(crate) fn encode_sleb128(mut v: i64) -> Vec<u8> {
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

    fn sec(bytes: &[u8]) -> SectionSlice {
        SectionSlice::new(
            SectionKind::Info,
            bytes.to_vec(),
            Endian::Little,
            DwarfFormat::Dwarf32,
            8,
        )
    }

    fn sec_be(bytes: &[u8]) -> SectionSlice {
        SectionSlice::new(
            SectionKind::Info,
            bytes.to_vec(),
            Endian::Big,
            DwarfFormat::Dwarf32,
            8,
        )
    }

    #[test]
    fn fixed_reads_respect_byte_order() {
        let le = sec(&[0x34, 0x12, 0x78, 0x56, 0x34, 0x12]);
        let mut cur = Cursor::new(&le);
        assert_eq!(cur.read_u16().unwrap(), 0x1234);
        assert_eq!(cur.read_u32().unwrap(), 0x12345678);

        let be = sec_be(&[0x12, 0x34]);
        let mut cur = Cursor::new(&be);
        assert_eq!(cur.read_u16().unwrap(), 0x1234);
    }

    #[test]
    fn signed_fixed_reads_sign_extend() {
        let s = sec(&[0xff, 0xfe, 0xff]);
        let mut cur = Cursor::new(&s);
        assert_eq!(cur.read_sint(1).unwrap(), -1);
        assert_eq!(cur.read_sint(2).unwrap(), -2);
    }

    #[test]
    fn reads_past_end_fail() {
        let s = sec(&[0x01]);
        let mut cur = Cursor::new(&s);
        cur.read_u8().unwrap();
        assert!(matches!(cur.read_u8(), Err(DwarfError::Format(_))));
        let mut cur = Cursor::new(&s);
        assert!(cur.read_u32().is_err());
    }

    #[test]
    fn uleb128_round_trips() {
        for v in [
            0u64,
            1,
            127,
            128,
            624485,
            u64::from(u32::MAX),
            u64::MAX - 1,
            u64::MAX,
        ] {
            let bytes = encode_uleb128(v);
            let s = sec(&bytes);
            let mut cur = Cursor::new(&s);
            assert_eq!(cur.uleb128().unwrap(), v, "value {v}");
            assert!(cur.at_end());
        }
    }

    #[test]
    fn sleb128_round_trips() {
        for v in [
            0i64,
            1,
            -1,
            63,
            -64,
            64,
            -123456,
            i64::MAX,
            i64::MIN,
        ] {
            let bytes = encode_sleb128(v);
            let s = sec(&bytes);
            let mut cur = Cursor::new(&s);
            assert_eq!(cur.sleb128().unwrap(), v, "value {v}");
            assert!(cur.at_end());
        }
    }

    #[test]
    fn uleb128_overflow_is_a_format_error() {
        // 11 continuation groups cannot fit in 64 bits.
        let bytes = [0x80u8, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        let s = sec(&bytes);
        assert!(matches!(
            Cursor::new(&s).uleb128(),
            Err(DwarfError::Format(_))
        ));
    }

    #[test]
    fn uleb128_truncated_is_a_format_error() {
        let s = sec(&[0x80]);
        assert!(Cursor::new(&s).uleb128().is_err());
    }

    #[test]
    fn strings_stop_at_nul() {
        let s = sec(b"abc\0def\0");
        let mut cur = Cursor::new(&s);
        assert_eq!(cur.string().unwrap(), "abc");
        assert_eq!(cur.cstr().unwrap(), b"def");
        assert!(cur.at_end());

        let unterminated = sec(b"abc");
        assert!(Cursor::new(&unterminated).string().is_err());
    }

    #[test]
    fn address_width_follows_slice() {
        let mut s = sec(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        s.addr_size = 4;
        assert_eq!(Cursor::new(&s).address().unwrap(), 0x04030201);
        s.addr_size = 8;
        assert_eq!(Cursor::new(&s).address().unwrap(), 0x0807060504030201);
        s.addr_size = 2;
        assert!(Cursor::new(&s).address().is_err());
    }

    #[test]
    fn initial_length_detects_dwarf64() {
        let s = sec(&[0x10, 0x00, 0x00, 0x00]);
        assert_eq!(
            Cursor::new(&s).initial_length().unwrap(),
            (0x10, DwarfFormat::Dwarf32)
        );

        let mut bytes = vec![0xff, 0xff, 0xff, 0xff];
        bytes.extend_from_slice(&0x20u64.to_le_bytes());
        let s = sec(&bytes);
        assert_eq!(
            Cursor::new(&s).initial_length().unwrap(),
            (0x20, DwarfFormat::Dwarf64)
        );

        let s = sec(&[0xf0, 0xff, 0xff, 0xff]);
        assert!(Cursor::new(&s).initial_length().is_err());
    }

    #[test]
    fn skip_form_advances_by_encoded_width() {
        // data2, then an inline string, then a ULEB-prefixed block.
        let mut bytes = vec![0xaa, 0xbb];
        bytes.extend_from_slice(b"hi\0");
        bytes.push(0x02);
        bytes.extend_from_slice(&[0x11, 0x22]);
        bytes.push(0x99);
        let s = sec(&bytes);
        let mut cur = Cursor::new(&s);
        cur.skip_form(constants::DW_FORM_data2).unwrap();
        cur.skip_form(constants::DW_FORM_string).unwrap();
        cur.skip_form(constants::DW_FORM_block).unwrap();
        assert_eq!(cur.read_u8().unwrap(), 0x99);
    }

    #[test]
    fn skip_form_handles_zero_width_and_offsets() {
        let mut s = sec(&[0u8; 8]);
        let mut cur = Cursor::new(&s);
        cur.skip_form(constants::DW_FORM_flag_present).unwrap();
        cur.skip_form(constants::DW_FORM_implicit_const).unwrap();
        assert_eq!(cur.pos(), 0);
        cur.skip_form(constants::DW_FORM_strp).unwrap();
        assert_eq!(cur.pos(), 4);

        s.format = DwarfFormat::Dwarf64;
        let mut cur = Cursor::new(&s);
        cur.skip_form(constants::DW_FORM_sec_offset).unwrap();
        assert_eq!(cur.pos(), 8);
    }

    #[test]
    fn skip_unknown_form_fails() {
        let s = sec(&[0u8; 4]);
        assert!(matches!(
            Cursor::new(&s).skip_form(DwForm(0x7f)),
            Err(DwarfError::Format(_))
        ));
    }
}
