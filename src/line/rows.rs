//! The line-number program state machine.

use tracing::{trace, warn};

use crate::core::constants::{self, DwLne, DwLns};
use crate::core::{Cursor, DwarfError, Result};
use crate::line::table::LineTable;
use crate::line::{FileEntry, LineRow};

/// The state-machine registers (DWARF v5 section 6.2.2).
#[derive(Debug, Clone)]
struct Registers {
    address: u64,
    op_index: u64,
    file_index: u64,
    line: u64,
    column: u64,
    is_stmt: bool,
    basic_block: bool,
    end_sequence: bool,
    prologue_end: bool,
    epilogue_begin: bool,
    isa: u64,
    discriminator: u64,
}

impl Registers {
    fn reset(default_is_stmt: bool, file_index_base: u64) -> Self {
        Registers {
            address: 0,
            op_index: 0,
            file_index: file_index_base,
            line: 1,
            column: 0,
            is_stmt: default_is_stmt,
            basic_block: false,
            end_sequence: false,
            prologue_end: false,
            epilogue_begin: false,
            isa: 0,
            discriminator: 0,
        }
    }

    /// Clears the flags that hold for a single emitted row only.
    fn clear_transient(&mut self) {
        self.basic_block = false;
        self.prologue_end = false;
        self.epilogue_begin = false;
        self.discriminator = 0;
    }

    fn into_row(self, file: FileEntry) -> LineRow {
        LineRow {
            address: self.address,
            op_index: self.op_index,
            file_index: self.file_index,
            file,
            line: self.line,
            column: self.column,
            is_stmt: self.is_stmt,
            basic_block: self.basic_block,
            end_sequence: self.end_sequence,
            prologue_end: self.prologue_end,
            epilogue_begin: self.epilogue_begin,
            isa: self.isa,
            discriminator: self.discriminator,
        }
    }
}

/// Executes one line-number program, yielding a row per emitted step.
///
/// Iteration mutates the parent table's file-discovery bookkeeping, so
/// concurrent iteration of one table needs external synchronization;
/// distinct tables are independent.
#[derive(Debug)]
pub struct LineRows<'a> {
    table: &'a LineTable<'a>,
    /// Cursor position within the table's unit window.
    pos: usize,
    regs: Registers,
}

impl<'a> LineRows<'a> {
    pub(crate) fn new(table: &'a LineTable<'a>) -> Self {
        LineRows {
            table,
            pos: table.program_offset as usize,
            regs: Registers::reset(table.default_is_stmt, table.file_index_base),
        }
    }

    /// Runs opcodes until one emits a row or the program ends.
    ///
    /// A program that ends mid-row is malformed; a program that emitted its
    /// last row on the final opcode simply yields `None` afterwards.
    pub fn next_row(&mut self) -> Result<Option<LineRow>> {
        let mut cur = Cursor::at(&self.table.sec, self.pos);
        let mut emitted = None;
        let mut stepped = false;
        while !cur.at_end() && emitted.is_none() {
            emitted = self.step(&mut cur)?;
            stepped = true;
        }
        if stepped && emitted.is_none() {
            return Err(DwarfError::format("unexpected end of line number program"));
        }
        if stepped && cur.at_end() {
            // Every file-name record in the program has now been seen.
            self.table.mark_files_complete();
        }
        self.pos = cur.pos();
        match emitted {
            Some(regs) => {
                let file = self.table.file_for_index(regs.file_index)?;
                Ok(Some(regs.into_row(file)))
            }
            None => Ok(None),
        }
    }

    /// Executes a single opcode. Returns the register snapshot to emit, if
    /// the opcode emits.
    fn step(&mut self, cur: &mut Cursor<'_>) -> Result<Option<Registers>> {
        let opcode = cur.read_u8()?;

        if opcode >= self.table.opcode_base {
            return Ok(Some(self.special_opcode(opcode)));
        }
        if opcode != 0 {
            return self.standard_opcode(opcode, cur);
        }
        self.extended_opcode(cur)
    }

    fn special_opcode(&mut self, opcode: u8) -> Registers {
        let adjusted = opcode - self.table.opcode_base;
        let op_advance = u64::from(adjusted / self.table.line_range);
        let line_inc =
            i64::from(self.table.line_base) + i64::from(adjusted % self.table.line_range);

        self.regs.line = self.regs.line.wrapping_add_signed(line_inc);
        self.advance_operation(op_advance);
        let row = self.regs.clone();
        self.regs.clear_transient();
        row
    }

    fn standard_opcode(&mut self, opcode: u8, cur: &mut Cursor<'_>) -> Result<Option<Registers>> {
        match DwLns(opcode) {
            constants::DW_LNS_copy => {
                let row = self.regs.clone();
                self.regs.clear_transient();
                return Ok(Some(row));
            }
            constants::DW_LNS_advance_pc => {
                let advance = cur.uleb128()?;
                self.advance_operation(advance);
            }
            constants::DW_LNS_advance_line => {
                let delta = cur.sleb128()?;
                self.regs.line = self.regs.line.wrapping_add_signed(delta);
            }
            constants::DW_LNS_set_file => self.regs.file_index = cur.uleb128()?,
            constants::DW_LNS_set_column => self.regs.column = cur.uleb128()?,
            constants::DW_LNS_negate_stmt => self.regs.is_stmt = !self.regs.is_stmt,
            constants::DW_LNS_set_basic_block => self.regs.basic_block = true,
            constants::DW_LNS_const_add_pc => {
                let advance =
                    u64::from((255 - self.table.opcode_base) / self.table.line_range);
                self.advance_operation(advance);
            }
            constants::DW_LNS_fixed_advance_pc => {
                let advance = cur.read_u16()?;
                self.regs.address = self.regs.address.wrapping_add(u64::from(advance));
                self.regs.op_index = 0;
            }
            constants::DW_LNS_set_prologue_end => self.regs.prologue_end = true,
            constants::DW_LNS_set_epilogue_begin => self.regs.epilogue_begin = true,
            constants::DW_LNS_set_isa => self.regs.isa = cur.uleb128()?,
            unknown => {
                if self.table.options.strict_standard_opcode_lengths {
                    return Err(DwarfError::format(format!(
                        "unknown standard line number opcode {}",
                        unknown.0
                    )));
                }
                // Relaxed mode: the length table exists precisely so
                // unknown opcodes can be stepped over.
                let args = self
                    .table
                    .standard_opcode_lengths
                    .get(opcode as usize)
                    .copied()
                    .unwrap_or(0);
                warn!(opcode, args, "skipping unknown standard line number opcode");
                for _ in 0..args {
                    cur.uleb128()?;
                }
            }
        }
        Ok(None)
    }

    fn extended_opcode(&mut self, cur: &mut Cursor<'_>) -> Result<Option<Registers>> {
        let length = cur.uleb128()?;
        let end = cur
            .pos()
            .checked_add(length as usize)
            .ok_or_else(|| {
                DwarfError::format(format!(
                    "extended line number opcode length {length} overflows the program"
                ))
            })?;
        let sub = cur.read_u8()?;

        let mut emitted = None;
        match DwLne(sub) {
            constants::DW_LNE_end_sequence => {
                self.regs.end_sequence = true;
                emitted = Some(self.regs.clone());
                self.regs =
                    Registers::reset(self.table.default_is_stmt, self.table.file_index_base);
            }
            constants::DW_LNE_set_address => {
                self.regs.address = cur.address()?;
                self.regs.op_index = 0;
            }
            constants::DW_LNE_define_file => {
                trace!("mid-program file definition");
                self.table.read_program_file_record(cur)?;
            }
            constants::DW_LNE_set_discriminator => self.regs.discriminator = cur.uleb128()?,
            vendor if (constants::DW_LNE_lo_user.0..=constants::DW_LNE_hi_user.0)
                .contains(&vendor.0) =>
            {
                return Err(DwarfError::NotImplemented(format!(
                    "vendor line number opcode {} not implemented",
                    vendor.0
                )));
            }
            unknown => {
                return Err(DwarfError::format(format!(
                    "unknown extended line number opcode {}",
                    unknown.0
                )));
            }
        }

        if cur.pos() > end {
            return Err(DwarfError::format(format!(
                "extended line number opcode {sub} exceeded its declared size"
            )));
        }
        if cur.pos() < end {
            warn!(
                sub,
                declared = length,
                consumed = length as usize - (end - cur.pos()),
                "extended line number opcode shorter than declared"
            );
        }
        cur.set_pos(end);
        Ok(emitted)
    }

    /// The operation-advance update shared by `advance_pc`, `const_add_pc`,
    /// and special opcodes.
    fn advance_operation(&mut self, advance: u64) {
        let max_ops = u64::from(self.table.maximum_operations_per_instruction);
        let ops = self.regs.op_index.wrapping_add(advance);
        self.regs.address = self.regs.address.wrapping_add(
            u64::from(self.table.minimum_instruction_length).wrapping_mul(ops / max_ops),
        );
        self.regs.op_index = ops % max_ops;
    }
}
