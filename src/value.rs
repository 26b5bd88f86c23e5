//! Typed projection of form-encoded attribute values.
//!
//! A [`Value`] is a lightweight handle on the raw bytes of one attribute:
//! the owning unit, the form the producer chose, and the payload offset.
//! Each `as_*` projection decodes those bytes on demand, chasing the
//! DWARF v5 cross-section indirections (`.debug_addr`,
//! `.debug_str_offsets`, `.debug_rnglists`) through the unit's
//! [`SectionSource`](crate::SectionSource). Projections are deterministic
//! and idempotent; asking for the wrong projection is a
//! [`DwarfError::ValueTypeMismatch`], not a panic.

use tracing::debug;

use crate::addr;
use crate::core::constants::{self, DwForm};
use crate::core::{Cursor, DwarfError, Result, SectionKind};
use crate::ranges::RangeList;
use crate::unit::{DieRef, Expr, UnitContext};

/// The semantic class a form maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Address,
    Block,
    Constant,
    UConstant,
    SConstant,
    Exprloc,
    Flag,
    Reference,
    String,
    SecOffset,
    RangeList,
    Invalid,
}

impl ValueKind {
    /// The class implied by `form` alone. Attribute-aware callers may
    /// override this with [`Value::with_kind`] (e.g. a `sec_offset` that is
    /// known to name a range list).
    pub fn from_form(form: DwForm) -> ValueKind {
        match form {
            constants::DW_FORM_addr
            | constants::DW_FORM_addrx
            | constants::DW_FORM_addrx1
            | constants::DW_FORM_addrx2
            | constants::DW_FORM_addrx3
            | constants::DW_FORM_addrx4 => ValueKind::Address,
            constants::DW_FORM_block
            | constants::DW_FORM_block1
            | constants::DW_FORM_block2
            | constants::DW_FORM_block4
            | constants::DW_FORM_data16 => ValueKind::Block,
            constants::DW_FORM_data1
            | constants::DW_FORM_data2
            | constants::DW_FORM_data4
            | constants::DW_FORM_data8 => ValueKind::Constant,
            constants::DW_FORM_udata => ValueKind::UConstant,
            constants::DW_FORM_sdata | constants::DW_FORM_implicit_const => ValueKind::SConstant,
            constants::DW_FORM_exprloc => ValueKind::Exprloc,
            constants::DW_FORM_flag | constants::DW_FORM_flag_present => ValueKind::Flag,
            constants::DW_FORM_ref1
            | constants::DW_FORM_ref2
            | constants::DW_FORM_ref4
            | constants::DW_FORM_ref8
            | constants::DW_FORM_ref_udata
            | constants::DW_FORM_ref_addr
            | constants::DW_FORM_ref_sig8 => ValueKind::Reference,
            constants::DW_FORM_string
            | constants::DW_FORM_strp
            | constants::DW_FORM_line_strp
            | constants::DW_FORM_strx
            | constants::DW_FORM_strx1
            | constants::DW_FORM_strx2
            | constants::DW_FORM_strx3
            | constants::DW_FORM_strx4 => ValueKind::String,
            constants::DW_FORM_sec_offset | constants::DW_FORM_loclistx => ValueKind::SecOffset,
            constants::DW_FORM_rnglistx => ValueKind::RangeList,
            _ => ValueKind::Invalid,
        }
    }
}

/// One attribute value, addressed but not yet decoded.
#[derive(Clone, Copy)]
pub struct Value<'a> {
    unit: &'a dyn UnitContext,
    form: DwForm,
    kind: ValueKind,
    /// Payload offset within the unit's window of `.debug_info`.
    offset: usize,
    /// Payload of `DW_FORM_implicit_const`, which lives in the abbreviation
    /// table rather than at `offset`.
    implicit_const: Option<i64>,
}

impl<'a> Value<'a> {
    /// Wraps the value encoded with `form` at `offset` within `unit`.
    ///
    /// `DW_FORM_indirect` is resolved here: the payload is read for form
    /// codes until a concrete one appears, and the value's form, kind, and
    /// offset all describe the resolved encoding.
    pub fn new(
        unit: &'a dyn UnitContext,
        form: DwForm,
        offset: u64,
        implicit_const: Option<i64>,
    ) -> Result<Value<'a>> {
        let mut value = Value {
            unit,
            form,
            kind: ValueKind::from_form(form),
            offset: offset as usize,
            implicit_const,
        };
        if form == constants::DW_FORM_indirect {
            value.resolve_indirect()?;
        }
        Ok(value)
    }

    /// Overrides the semantic class (for attribute-aware callers).
    pub fn with_kind(mut self, kind: ValueKind) -> Value<'a> {
        self.kind = kind;
        self
    }

    pub fn form(&self) -> DwForm {
        self.form
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// The absolute offset of the payload within `.debug_info`.
    pub fn section_offset(&self) -> u64 {
        self.unit.section_offset() + self.offset as u64
    }

    fn resolve_indirect(&mut self) -> Result<()> {
        let mut cur = Cursor::at(self.unit.data(), self.offset);
        let mut form = self.form;
        while form == constants::DW_FORM_indirect {
            form = DwForm(cur.uleb128()? as u16);
        }
        debug!(%form, "resolved indirect form");
        self.form = form;
        self.kind = ValueKind::from_form(form);
        self.offset = cur.pos();
        Ok(())
    }

    fn cursor(&self) -> Cursor<'a> {
        Cursor::at(self.unit.data(), self.offset)
    }

    /// Decodes the value as a machine address, resolving `DW_FORM_addrx*`
    /// through the unit's `.debug_addr` pool.
    pub fn as_address(&self) -> Result<u64> {
        let mut cur = self.cursor();
        let index = match self.form {
            constants::DW_FORM_addr => return cur.address(),
            constants::DW_FORM_addrx => cur.uleb128()?,
            constants::DW_FORM_addrx1 => cur.read_uint(1)?,
            constants::DW_FORM_addrx2 => cur.read_uint(2)?,
            constants::DW_FORM_addrx3 => cur.read_uint(3)?,
            constants::DW_FORM_addrx4 => cur.read_uint(4)?,
            form => return Err(DwarfError::mismatch(form, "address")),
        };
        let pool = self.unit.dwarf().section(SectionKind::Addr)?;
        addr::address_at_index(
            &pool,
            self.unit.addr_base(),
            self.unit.data().addr_size,
            index,
        )
    }

    /// Decodes the value as an unsigned constant.
    pub fn as_uconstant(&self) -> Result<u64> {
        let mut cur = self.cursor();
        match self.form {
            constants::DW_FORM_data1 => cur.read_uint(1),
            constants::DW_FORM_data2 => cur.read_uint(2),
            constants::DW_FORM_data4 => cur.read_uint(4),
            constants::DW_FORM_data8 => cur.read_uint(8),
            constants::DW_FORM_udata => cur.uleb128(),
            constants::DW_FORM_implicit_const => Ok(self.implicit_const() as u64),
            form => Err(DwarfError::mismatch(form, "uconstant")),
        }
    }

    /// Decodes the value as a signed constant. Fixed-width payloads are
    /// sign-extended.
    pub fn as_sconstant(&self) -> Result<i64> {
        let mut cur = self.cursor();
        match self.form {
            constants::DW_FORM_data1 => cur.read_sint(1),
            constants::DW_FORM_data2 => cur.read_sint(2),
            constants::DW_FORM_data4 => cur.read_sint(4),
            constants::DW_FORM_data8 => cur.read_sint(8),
            constants::DW_FORM_sdata => cur.sleb128(),
            constants::DW_FORM_implicit_const => Ok(self.implicit_const()),
            form => Err(DwarfError::mismatch(form, "sconstant")),
        }
    }

    fn implicit_const(&self) -> i64 {
        self.implicit_const.unwrap_or(0)
    }

    fn block_size(&self, cur: &mut Cursor<'a>, expected: &'static str) -> Result<usize> {
        match self.form {
            constants::DW_FORM_block1 => Ok(cur.read_uint(1)? as usize),
            constants::DW_FORM_block2 => Ok(cur.read_uint(2)? as usize),
            constants::DW_FORM_block4 => Ok(cur.read_uint(4)? as usize),
            constants::DW_FORM_block | constants::DW_FORM_exprloc => {
                Ok(cur.uleb128()? as usize)
            }
            form => Err(DwarfError::mismatch(form, expected)),
        }
    }

    /// Decodes the value as a raw byte block.
    pub fn as_block(&self) -> Result<&'a [u8]> {
        let mut cur = self.cursor();
        let size = self.block_size(&mut cur, "block")?;
        cur.read_bytes(size)
    }

    /// Decodes the value as a location expression. Producers before DWARF
    /// v4 encoded expressions as plain blocks, so the block forms are
    /// accepted too.
    pub fn as_exprloc(&self) -> Result<Expr> {
        let mut cur = self.cursor();
        let size = self.block_size(&mut cur, "exprloc")? as u64;
        let offset = cur.pos() as u64;
        cur.skip(size as usize)?;
        Ok(Expr {
            unit_offset: self.unit.section_offset(),
            offset,
            size,
        })
    }

    /// Decodes the value as a flag.
    pub fn as_flag(&self) -> Result<bool> {
        match self.form {
            constants::DW_FORM_flag => Ok(self.cursor().read_u8()? != 0),
            constants::DW_FORM_flag_present => Ok(true),
            form => Err(DwarfError::mismatch(form, "flag")),
        }
    }

    /// Decodes the value as a string, without transcoding. Indexed forms
    /// resolve through `.debug_str_offsets` into `.debug_str`.
    pub fn as_cstr(&self) -> Result<Vec<u8>> {
        let mut cur = self.cursor();
        let index = match self.form {
            constants::DW_FORM_string => return Ok(cur.cstr()?.to_vec()),
            constants::DW_FORM_strp => {
                let off = cur.offset()?;
                return read_section_cstr(self.unit, SectionKind::Str, off);
            }
            constants::DW_FORM_line_strp => {
                let off = cur.offset()?;
                return read_section_cstr(self.unit, SectionKind::LineStr, off);
            }
            constants::DW_FORM_strx => cur.uleb128()?,
            constants::DW_FORM_strx1 => cur.read_uint(1)?,
            constants::DW_FORM_strx2 => cur.read_uint(2)?,
            constants::DW_FORM_strx3 => cur.read_uint(3)?,
            constants::DW_FORM_strx4 => cur.read_uint(4)?,
            form => return Err(DwarfError::mismatch(form, "string")),
        };
        let offsets = self.unit.dwarf().section(SectionKind::StrOffsets)?;
        let off = addr::str_offset_at_index(&offsets, self.unit.str_offsets_base(), index)?;
        read_section_cstr(self.unit, SectionKind::Str, off)
    }

    /// Decodes the value as an owned string (lossy UTF-8).
    pub fn as_string(&self) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.as_cstr()?).into_owned())
    }

    /// Decodes the value as a DIE reference.
    ///
    /// `ref1/2/4/8` and `ref_udata` are offsets within the owning unit;
    /// `ref_addr` is an absolute `.debug_info` offset whose owning unit is
    /// found by scanning the unit table; `ref_sig8` goes through the
    /// type-unit index.
    pub fn as_reference(&self) -> Result<DieRef> {
        let mut cur = self.cursor();
        let off = match self.form {
            constants::DW_FORM_ref1 => cur.read_uint(1)?,
            constants::DW_FORM_ref2 => cur.read_uint(2)?,
            constants::DW_FORM_ref4 => cur.read_uint(4)?,
            constants::DW_FORM_ref8 => cur.read_uint(8)?,
            constants::DW_FORM_ref_udata => cur.uleb128()?,
            constants::DW_FORM_ref_addr => {
                let target = cur.offset()?;
                // Rare form; a linear scan beats maintaining a cache.
                let mut owner = None;
                for start in self.unit.dwarf().unit_offsets() {
                    if start > target {
                        break;
                    }
                    owner = Some(start);
                }
                let owner = owner.ok_or_else(|| {
                    DwarfError::format(format!(
                        "no compilation unit contains .debug_info offset 0x{target:x}"
                    ))
                })?;
                return Ok(DieRef::new(owner, target - owner));
            }
            constants::DW_FORM_ref_sig8 => {
                let signature = cur.read_u64()?;
                return self.unit.dwarf().type_unit(signature).ok_or_else(|| {
                    DwarfError::format(format!("unknown type signature 0x{signature:016x}"))
                });
            }
            form => return Err(DwarfError::mismatch(form, "reference")),
        };
        Ok(DieRef::new(self.unit.section_offset(), off))
    }

    /// Decodes the value as a section offset. `data4`/`data8` are accepted
    /// for producers predating DWARF v4's `sec_offset`.
    pub fn as_sec_offset(&self) -> Result<u64> {
        let mut cur = self.cursor();
        match self.form {
            constants::DW_FORM_data4 => cur.read_uint(4),
            constants::DW_FORM_data8 => cur.read_uint(8),
            constants::DW_FORM_sec_offset => cur.offset(),
            form => Err(DwarfError::mismatch(form, "sec_offset")),
        }
    }

    /// Decodes the value as a range list.
    ///
    /// `rnglistx` indexes the `.debug_rnglists` offset table; any other
    /// accepted form is a section offset into `.debug_ranges`. Either way
    /// the list is seeded with the unit's base address and, for the v5
    /// indexed entry kinds, the unit's `.debug_addr` pool.
    pub fn as_rangelist(&self) -> Result<RangeList> {
        // A unit without a base address leaves offset pairs relative to 0;
        // such lists must start with a base-address entry.
        let base_addr = self.unit.low_pc().unwrap_or(0);
        let addr_size = self.unit.data().addr_size;

        if self.form == constants::DW_FORM_rnglistx {
            let index = self.cursor().uleb128()?;
            let rnglists = self.unit.dwarf().section(SectionKind::RngLists)?;

            let mut hdr = Cursor::new(&rnglists);
            let (_unit_length, format) = hdr.initial_length()?;
            let _version = hdr.read_u16()?;
            let _addr_size = hdr.read_u8()?;
            let _segment_selector_size = hdr.read_u8()?;
            let offset_entry_count = u64::from(hdr.read_u32()?);
            if index >= offset_entry_count {
                return Err(DwarfError::format(format!(
                    "range list index {} out of bounds ({} entries in {})",
                    index,
                    offset_entry_count,
                    SectionKind::RngLists.name()
                )));
            }

            let header_size = hdr.pos() as u64;
            let offset_size = format.offset_size() as u64;
            let mut slot = Cursor::at(&rnglists, (header_size + index * offset_size) as usize);
            let entries_offset = slot.read_uint(offset_size as usize)?;
            // Table offsets are relative to the first byte past the table.
            let entries_base = header_size + offset_entry_count * offset_size;

            return Ok(
                RangeList::new(&rnglists, entries_base + entries_offset, addr_size, base_addr, true)?
                    .with_addr_pool(
                        self.unit.dwarf().section(SectionKind::Addr).ok(),
                        self.unit.addr_base(),
                    ),
            );
        }

        let offset = self.as_sec_offset()?;
        let ranges = self.unit.dwarf().section(SectionKind::Ranges)?;
        RangeList::new(&ranges, offset, addr_size, base_addr, false)
    }
}

impl std::fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Value")
            .field("form", &self.form)
            .field("kind", &self.kind)
            .field("offset", &self.offset)
            .finish()
    }
}

fn read_section_cstr(unit: &dyn UnitContext, kind: SectionKind, offset: u64) -> Result<Vec<u8>> {
    let sec = unit.dwarf().section(kind)?;
    let mut cur = Cursor::at(&sec, offset as usize);
    Ok(cur.cstr()?.to_vec())
}
