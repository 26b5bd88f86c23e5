//! Line table handle: header parsing and file-table maintenance.

use std::cell::RefCell;

use tracing::debug;

use crate::core::constants::{self, DwForm, DwLnct};
use crate::core::{Cursor, DwarfError, Result, SectionKind, SectionSlice};
use crate::line::rows::LineRows;
use crate::line::{FileEntry, LineOptions, LineRow};
use crate::unit::SectionSource;

/// Canonical argument counts of the twelve standard opcodes, indexed by
/// opcode number (slot 0 is the extended-opcode marker).
const STANDARD_OPCODE_LENGTHS: [u8; 13] = [0, 0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1];

/// One (content, form) pair of a DWARF v5 entry-format descriptor.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EntryFormat {
    content: DwLnct,
    form: DwForm,
}

/// File-table state shared by every iterator over one table.
///
/// File names can be defined both in the header and mid-program via
/// `DW_LNE_define_file`, and the program can be iterated repeatedly, so the
/// table tracks how far into the unit file records have been consumed.
#[derive(Debug, Default)]
struct FileState {
    file_names: Vec<FileEntry>,
    /// Offset just past the last file-name record read from the unit.
    /// Monotonic; records at or before it are never re-added.
    last_file_name_end: u64,
    /// Set once an iterator has drained the whole program.
    file_names_complete: bool,
    str_sec: Option<SectionSlice>,
    line_str_sec: Option<SectionSlice>,
}

/// A parsed line-number program header plus the machinery to iterate its
/// opcode program.
///
/// Iterators hold `&LineTable` and share the file-discovery bookkeeping
/// through it; a table and its iterators belong to one thread.
pub struct LineTable<'a> {
    /// The unit's window of the line section, including the initial length.
    pub(crate) sec: SectionSlice,
    dwarf: Option<&'a dyn SectionSource>,
    /// Compilation directory, `/`-terminated unless empty.
    comp_dir: String,
    pub(crate) version: u16,
    pub(crate) minimum_instruction_length: u8,
    pub(crate) maximum_operations_per_instruction: u8,
    pub(crate) default_is_stmt: bool,
    pub(crate) line_base: i8,
    pub(crate) line_range: u8,
    pub(crate) opcode_base: u8,
    pub(crate) file_index_base: u64,
    /// Declared argument counts, indexed by standard opcode.
    pub(crate) standard_opcode_lengths: Vec<u8>,
    include_directories: Vec<String>,
    /// Retained for mid-program `DW_LNE_define_file` records (v5).
    file_entry_formats: Vec<EntryFormat>,
    /// Offset of the first program opcode within `sec`.
    pub(crate) program_offset: u64,
    pub(crate) options: LineOptions,
    state: RefCell<FileState>,
}

impl<'a> LineTable<'a> {
    /// Parses the line-number program header at `offset` within `section`.
    ///
    /// `cu_addr_size`, `comp_dir`, and `cu_name` come from the owning
    /// compilation unit; `dwarf` supplies `.debug_str` / `.debug_line_str`
    /// for DWARF v5 string forms and may be `None` when the producer uses
    /// only inline strings.
    pub fn new(
        section: &SectionSlice,
        offset: u64,
        cu_addr_size: u8,
        comp_dir: &str,
        cu_name: &str,
        dwarf: Option<&'a dyn SectionSource>,
        options: LineOptions,
    ) -> Result<LineTable<'a>> {
        let comp_dir = if comp_dir.is_empty() || comp_dir.ends_with('/') {
            comp_dir.to_string()
        } else {
            format!("{comp_dir}/")
        };

        let tail = section.slice_to_end(offset as usize)?;
        let mut head = Cursor::new(&tail);
        let (unit_length, format) = head.initial_length()?;
        let total = (head.pos() as u64).checked_add(unit_length).ok_or_else(|| {
            DwarfError::format("line number unit length overflows the section")
        })?;
        let mut unit_sec = tail.slice(0, total as usize)?;
        unit_sec.format = format;
        unit_sec.addr_size = cu_addr_size;

        let version_pos = head.pos();
        let parse_sec = unit_sec.clone();
        let mut cur = Cursor::at(&parse_sec, version_pos);

        let version = cur.read_u16()?;
        if !(2..=5).contains(&version) {
            return Err(DwarfError::format(format!(
                "unknown line number table version {version}"
            )));
        }
        if version >= 5 {
            let address_size = cur.read_u8()?;
            let _segment_selector_size = cur.read_u8()?;
            unit_sec.addr_size = address_size;
        }

        let header_length = cur.offset()?;
        let program_offset = cur.pos() as u64 + header_length;

        let minimum_instruction_length = cur.read_u8()?;
        let maximum_operations_per_instruction = if version >= 4 { cur.read_u8()? } else { 1 };
        if maximum_operations_per_instruction == 0 {
            return Err(DwarfError::format(
                "maximum_operations_per_instruction cannot be 0 in line number program",
            ));
        }
        let default_is_stmt = cur.read_u8()? != 0;
        let line_base = cur.read_i8()?;
        let line_range = cur.read_u8()?;
        if line_range == 0 {
            return Err(DwarfError::format(
                "line_range cannot be 0 in line number program",
            ));
        }
        let opcode_base = cur.read_u8()?;

        let mut standard_opcode_lengths = vec![0u8; opcode_base as usize];
        for opcode in 1..opcode_base as usize {
            let declared = cur.read_u8()?;
            if options.strict_standard_opcode_lengths
                && opcode < STANDARD_OPCODE_LENGTHS.len()
                && declared != STANDARD_OPCODE_LENGTHS[opcode]
            {
                return Err(DwarfError::format(format!(
                    "expected {} arguments for line number opcode {}, got {}",
                    STANDARD_OPCODE_LENGTHS[opcode], opcode, declared
                )));
            }
            standard_opcode_lengths[opcode] = declared;
        }

        let mut state = FileState::default();
        let mut include_directories = Vec::new();
        let mut file_entry_formats = Vec::new();
        let mut v5_file_count = 0u64;

        if version >= 5 {
            let dir_formats = read_entry_formats(&mut cur)?;
            let dir_count = cur.uleb128()?;
            for _ in 0..dir_count {
                let mut path = String::new();
                for fmt in &dir_formats {
                    match fmt.content {
                        constants::DW_LNCT_path => {
                            path = form_string(&mut cur, fmt.form, dwarf, &mut state)?;
                        }
                        _ => cur.skip_form(fmt.form)?,
                    }
                }
                include_directories.push(resolve_include_directory(&comp_dir, &path));
            }
            file_entry_formats = read_entry_formats(&mut cur)?;
            v5_file_count = cur.uleb128()?;
        } else {
            // Directory 0 is implicitly the compilation directory.
            include_directories.push(comp_dir.clone());
            loop {
                let dir = cur.string()?;
                if dir.is_empty() {
                    break;
                }
                include_directories.push(resolve_include_directory(&comp_dir, &dir));
            }
            // File 0 is implicitly the compilation unit's primary file.
            state
                .file_names
                .push(FileEntry::new(resolve_cu_name(&comp_dir, cu_name), 0, 0));
        }

        let table = LineTable {
            sec: unit_sec,
            dwarf,
            comp_dir,
            version,
            minimum_instruction_length,
            maximum_operations_per_instruction,
            default_is_stmt,
            line_base,
            line_range,
            opcode_base,
            file_index_base: if version >= 5 { 0 } else { 1 },
            standard_opcode_lengths,
            include_directories,
            file_entry_formats,
            program_offset,
            options,
            state: RefCell::new(state),
        };

        if version >= 5 {
            for _ in 0..v5_file_count {
                table.read_v5_file_record(&mut cur, true)?;
            }
            let mut state = table.state.borrow_mut();
            if state.file_names.is_empty() {
                state
                    .file_names
                    .push(FileEntry::new(resolve_cu_name(&table.comp_dir, cu_name), 0, 0));
            }
        } else {
            while table.read_v2_file_record(&mut cur, true)? {}
        }

        debug!(
            version,
            program_offset = table.program_offset,
            directories = table.include_directories.len(),
            files = table.state.borrow().file_names.len(),
            "parsed line number program header"
        );
        Ok(table)
    }

    /// DWARF version of this program's header (2 through 5).
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Offset of the first opcode within the program's unit window.
    pub fn program_offset(&self) -> u64 {
        self.program_offset
    }

    /// The resolved include-directory table.
    pub fn include_directories(&self) -> &[String] {
        &self.include_directories
    }

    /// The compilation directory, `/`-terminated unless empty.
    pub fn comp_dir(&self) -> &str {
        &self.comp_dir
    }

    /// First meaningful file index: 0 for v5 programs, 1 before.
    pub fn file_index_base(&self) -> u64 {
        self.file_index_base
    }

    /// A fresh iterator positioned at the start of the opcode program.
    pub fn rows(&self) -> LineRows<'_> {
        LineRows::new(self)
    }

    /// The file entry at `index`.
    ///
    /// Entries can be defined mid-program; on a miss this runs the whole
    /// opcode program once so `DW_LNE_define_file` records become visible
    /// before the lookup fails.
    pub fn file(&self, index: u64) -> Result<FileEntry> {
        if let Some(entry) = self.state.borrow().file_names.get(index as usize) {
            return Ok(entry.clone());
        }
        if !self.state.borrow().file_names_complete {
            let mut rows = self.rows();
            while rows.next_row()?.is_some() {}
        }
        let state = self.state.borrow();
        state
            .file_names
            .get(index as usize)
            .cloned()
            .ok_or_else(|| {
                DwarfError::format(format!(
                    "file name index {} exceeds file table size of {}",
                    index,
                    state.file_names.len()
                ))
            })
    }

    /// A snapshot of the file table as currently discovered.
    pub fn files(&self) -> Vec<FileEntry> {
        self.state.borrow().file_names.clone()
    }

    /// The last row `r` without `end_sequence` satisfying
    /// `r.address <= addr < next.address`, scanning in program order.
    pub fn find_address(&self, addr: u64) -> Result<Option<LineRow>> {
        let mut rows = self.rows();
        let mut prev = match rows.next_row()? {
            Some(row) => row,
            None => return Ok(None),
        };
        while let Some(row) = rows.next_row()? {
            if prev.address <= addr && addr < row.address && !prev.end_sequence {
                return Ok(Some(prev));
            }
            prev = row;
        }
        Ok(None)
    }

    /// Resolves `index` against the file table as discovered so far.
    pub(crate) fn file_for_index(&self, index: u64) -> Result<FileEntry> {
        self.state
            .borrow()
            .file_names
            .get(index as usize)
            .cloned()
            .ok_or_else(|| {
                DwarfError::format(format!("bad file index {index} in line number program"))
            })
    }

    pub(crate) fn mark_files_complete(&self) {
        self.state.borrow_mut().file_names_complete = true;
    }

    /// Parses one `DW_LNE_define_file` record at the cursor.
    pub(crate) fn read_program_file_record(&self, cur: &mut Cursor<'_>) -> Result<()> {
        if self.version >= 5 {
            self.read_v5_file_record(cur, false)
        } else {
            self.read_v2_file_record(cur, false).map(|_| ())
        }
    }

    /// Reads a v2–v4 file record. Returns false on the empty name that
    /// terminates the header table.
    fn read_v2_file_record(&self, cur: &mut Cursor<'_>, in_header: bool) -> Result<bool> {
        let name = cur.string()?;
        if in_header && name.is_empty() {
            return Ok(false);
        }
        let dir_index = cur.uleb128()?;
        let mtime = cur.uleb128()?;
        let length = cur.uleb128()?;

        let mut state = self.state.borrow_mut();
        if (cur.pos() as u64) <= state.last_file_name_end {
            return Ok(true);
        }
        state.last_file_name_end = cur.pos() as u64;
        if name.is_empty() {
            return Ok(false);
        }
        self.add_file_entry(&mut state, name, dir_index, mtime, length)?;
        Ok(true)
    }

    /// Reads a v5 form-described file record.
    fn read_v5_file_record(&self, cur: &mut Cursor<'_>, in_header: bool) -> Result<()> {
        if !in_header && self.file_entry_formats.is_empty() {
            return Err(DwarfError::format(
                "line table missing file name entry formats",
            ));
        }
        let mut path = String::new();
        let mut dir_index = 0u64;
        let mut mtime = 0u64;
        let mut length = 0u64;
        for fmt in &self.file_entry_formats {
            match fmt.content {
                constants::DW_LNCT_path => {
                    let mut state = self.state.borrow_mut();
                    path = form_string(cur, fmt.form, self.dwarf, &mut state)?;
                }
                constants::DW_LNCT_directory_index => dir_index = form_unsigned(cur, fmt.form)?,
                constants::DW_LNCT_timestamp => mtime = form_unsigned(cur, fmt.form)?,
                constants::DW_LNCT_size => length = form_unsigned(cur, fmt.form)?,
                _ => cur.skip_form(fmt.form)?,
            }
        }

        let mut state = self.state.borrow_mut();
        if !in_header {
            let entry_end = cur.pos() as u64;
            if entry_end <= state.last_file_name_end {
                return Ok(());
            }
            state.last_file_name_end = entry_end;
        }
        if !path.is_empty() {
            self.add_file_entry(&mut state, path, dir_index, mtime, length)?;
        }
        Ok(())
    }

    /// Appends a file entry, resolving its path to an absolute one.
    fn add_file_entry(
        &self,
        state: &mut FileState,
        name: String,
        dir_index: u64,
        mtime: u64,
        length: u64,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(DwarfError::format("file entry missing file name"));
        }
        if name.starts_with('/') {
            state.file_names.push(FileEntry::new(name, mtime, length));
            return Ok(());
        }
        let base = match self.include_directories.get(dir_index as usize) {
            Some(dir) => Some(dir.as_str()),
            None if dir_index == 0 && self.version < 5 && !self.comp_dir.is_empty() => {
                Some(self.comp_dir.as_str())
            }
            None => None,
        };
        match base {
            Some(base) => {
                state
                    .file_names
                    .push(FileEntry::new(format!("{base}{name}"), mtime, length));
                Ok(())
            }
            None => Err(DwarfError::format(format!(
                "file name directory index out of range: {dir_index}"
            ))),
        }
    }
}

impl std::fmt::Debug for LineTable<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineTable")
            .field("version", &self.version)
            .field("program_offset", &self.program_offset)
            .field("opcode_base", &self.opcode_base)
            .field("files", &self.state.borrow().file_names.len())
            .finish()
    }
}

/// Resolves an include directory to an absolute, `/`-terminated path.
fn resolve_include_directory(comp_dir: &str, dir: &str) -> String {
    let mut resolved = dir.to_string();
    if !resolved.is_empty() && !resolved.ends_with('/') {
        resolved.push('/');
    }
    if !resolved.is_empty() && !resolved.starts_with('/') && !comp_dir.is_empty() {
        resolved = format!("{comp_dir}{resolved}");
    }
    if resolved.is_empty() {
        resolved = comp_dir.to_string();
    }
    resolved
}

/// The compilation unit's primary file name, absolute or relative to the
/// compilation directory.
fn resolve_cu_name(comp_dir: &str, cu_name: &str) -> String {
    if cu_name.starts_with('/') {
        cu_name.to_string()
    } else {
        format!("{comp_dir}{cu_name}")
    }
}

/// Reads a ULEB128-counted list of (content, form) descriptor pairs.
fn read_entry_formats(cur: &mut Cursor<'_>) -> Result<Vec<EntryFormat>> {
    let count = cur.uleb128()?;
    let mut formats = Vec::with_capacity(count as usize);
    for _ in 0..count {
        formats.push(EntryFormat {
            content: DwLnct(cur.uleb128()? as u16),
            form: DwForm(cur.uleb128()? as u16),
        });
    }
    Ok(formats)
}

/// Decodes a string-class field of a v5 directory or file record.
fn form_string(
    cur: &mut Cursor<'_>,
    form: DwForm,
    dwarf: Option<&dyn SectionSource>,
    state: &mut FileState,
) -> Result<String> {
    match form {
        constants::DW_FORM_string => cur.string(),
        constants::DW_FORM_strp => {
            let off = cur.offset()?;
            section_string(dwarf, state, SectionKind::Str, off)
        }
        constants::DW_FORM_line_strp => {
            let off = cur.offset()?;
            section_string(dwarf, state, SectionKind::LineStr, off)
        }
        other => Err(DwarfError::format(format!(
            "unsupported string form {other} in line table"
        ))),
    }
}

/// Decodes an unsigned field of a v5 directory or file record.
fn form_unsigned(cur: &mut Cursor<'_>, form: DwForm) -> Result<u64> {
    match form {
        constants::DW_FORM_data1 => cur.read_uint(1),
        constants::DW_FORM_data2 => cur.read_uint(2),
        constants::DW_FORM_data4 => cur.read_uint(4),
        constants::DW_FORM_data8 => cur.read_uint(8),
        constants::DW_FORM_udata => cur.uleb128(),
        constants::DW_FORM_sdata => Ok(cur.sleb128()? as u64),
        other => Err(DwarfError::format(format!(
            "unsupported numeric form {other} in line table"
        ))),
    }
}

/// Reads a NUL-terminated string out of `.debug_str` / `.debug_line_str`,
/// fetching and caching the section on first use.
fn section_string(
    dwarf: Option<&dyn SectionSource>,
    state: &mut FileState,
    kind: SectionKind,
    offset: u64,
) -> Result<String> {
    let slot = match kind {
        SectionKind::Str => &mut state.str_sec,
        _ => &mut state.line_str_sec,
    };
    let sec = match slot {
        Some(sec) => sec,
        None => {
            let dwarf = dwarf.ok_or_else(|| {
                DwarfError::format(format!(
                    "line table requires a section provider to read strings from {}",
                    kind.name()
                ))
            })?;
            slot.insert(dwarf.section(kind)?)
        }
    };
    let mut cur = Cursor::at(sec, offset as usize);
    cur.string()
}
