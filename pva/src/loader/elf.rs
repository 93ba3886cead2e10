//! ELF64 Parser for VPU executables
//!
//! Extracts the loadable segments and the exported symbol table from a raw
//! VPU application binary. The VPU address space is 32-bit (VMEM), so
//! symbol addresses are rejected if they do not fit in a `u32`.

use alloc::string::String;
use alloc::vec::Vec;
use core::mem::size_of;

use bitflags::bitflags;

use crate::config::MAX_SYMBOL_NAME_LEN;
use crate::error::PvaError;

/// ELF magic number: 0x7F 'E' 'L' 'F'
pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// ELF class: 64-bit
pub const ELFCLASS64: u8 = 2;

/// ELF data encoding: little endian
pub const ELFDATA2LSB: u8 = 1;

/// ELF type: executable
pub const ET_EXEC: u16 = 2;

/// Program header type: loadable segment
pub const PT_LOAD: u32 = 1;

/// Section header type: symbol table
pub const SHT_SYMTAB: u32 = 2;

/// Section header type: string table
pub const SHT_STRTAB: u32 = 3;

/// Symbol binding: global
pub const STB_GLOBAL: u8 = 1;

/// Symbol type: data object
pub const STT_OBJECT: u8 = 1;

bitflags! {
    /// ELF segment permission flags (`p_flags`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegmentFlags: u32 {
        /// Segment is executable.
        const EXEC = 1;
        /// Segment is writable.
        const WRITE = 2;
        /// Segment is readable.
        const READ = 4;
    }
}

/// ELF64 file header
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Elf64Header {
    /// Magic number and other info
    pub e_ident: [u8; 16],
    /// Object file type
    pub e_type: u16,
    /// Machine type
    pub e_machine: u16,
    /// Object file version
    pub e_version: u32,
    /// Entry point virtual address
    pub e_entry: u64,
    /// Program header table file offset
    pub e_phoff: u64,
    /// Section header table file offset
    pub e_shoff: u64,
    /// Processor-specific flags
    pub e_flags: u32,
    /// ELF header size
    pub e_ehsize: u16,
    /// Program header table entry size
    pub e_phentsize: u16,
    /// Program header table entry count
    pub e_phnum: u16,
    /// Section header table entry size
    pub e_shentsize: u16,
    /// Section header table entry count
    pub e_shnum: u16,
    /// Section name string table index
    pub e_shstrndx: u16,
}

/// ELF64 program header
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Elf64ProgramHeader {
    /// Segment type
    pub p_type: u32,
    /// Segment flags
    pub p_flags: u32,
    /// Segment file offset
    pub p_offset: u64,
    /// Segment virtual address
    pub p_vaddr: u64,
    /// Segment physical address (unused)
    pub p_paddr: u64,
    /// Segment size in file
    pub p_filesz: u64,
    /// Segment size in memory
    pub p_memsz: u64,
    /// Segment alignment
    pub p_align: u64,
}

/// ELF64 section header
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Elf64SectionHeader {
    /// Section name (string table index)
    pub sh_name: u32,
    /// Section type
    pub sh_type: u32,
    /// Section flags
    pub sh_flags: u64,
    /// Section virtual address
    pub sh_addr: u64,
    /// Section file offset
    pub sh_offset: u64,
    /// Section size
    pub sh_size: u64,
    /// Link to another section
    pub sh_link: u32,
    /// Additional section information
    pub sh_info: u32,
    /// Section alignment
    pub sh_addralign: u64,
    /// Entry size if section holds table
    pub sh_entsize: u64,
}

/// ELF64 symbol table entry
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Elf64Symbol {
    /// Symbol name (string table offset)
    pub st_name: u32,
    /// Binding and type
    pub st_info: u8,
    /// Visibility
    pub st_other: u8,
    /// Section index
    pub st_shndx: u16,
    /// Symbol value (VMEM address)
    pub st_value: u64,
    /// Symbol size
    pub st_size: u64,
}

/// Which per-image buffer a VPU segment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VpuSegmentKind {
    /// Executable code
    Code = 0,
    /// Writable data
    Data = 1,
    /// Read-only symbol parameter data
    InParams = 2,
}

/// Number of segment kinds, and thus per-image segment buffers.
pub const NUM_SEGMENT_KINDS: usize = 3;

impl VpuSegmentKind {
    /// All kinds, in buffer-index order.
    pub const ALL: [VpuSegmentKind; NUM_SEGMENT_KINDS] =
        [Self::Code, Self::Data, Self::InParams];

    /// Classify a loadable segment by its permission flags.
    ///
    /// Executable segments are code, writable segments are data, and
    /// read-only segments carry symbol parameter values.
    pub fn from_flags(flags: SegmentFlags) -> Self {
        if flags.contains(SegmentFlags::EXEC) {
            Self::Code
        } else if flags.contains(SegmentFlags::WRITE) {
            Self::Data
        } else {
            Self::InParams
        }
    }

    /// Short name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Data => "data",
            Self::InParams => "in_params",
        }
    }
}

/// One loadable segment extracted from the binary.
#[derive(Debug, Clone, PartialEq)]
pub struct VpuSegment {
    /// VMEM address the segment is linked at
    pub vaddr: u64,
    /// File offset of segment data
    pub file_offset: u64,
    /// Size of segment data in file
    pub file_size: u64,
    /// Size of segment in memory (may exceed `file_size` for BSS tails)
    pub mem_size: u64,
    /// Permission flags
    pub flags: SegmentFlags,
}

/// One exported symbol extracted from `.symtab`.
#[derive(Debug, Clone, PartialEq)]
pub struct ElfSymbol {
    /// Symbol name
    pub name: String,
    /// VMEM address of the symbol
    pub addr: u32,
    /// Symbol size in bytes
    pub size: u32,
}

/// Parsed VPU executable: segments grouped by kind, plus exported symbols.
#[derive(Debug, PartialEq)]
pub struct VpuExecutable {
    /// Loadable segments, grouped by destination buffer, in file order
    pub segments: [Vec<VpuSegment>; NUM_SEGMENT_KINDS],
    /// Exported symbols
    pub symbols: Vec<ElfSymbol>,
    /// Machine type reported by the header, kept for diagnostics
    pub machine: u16,
}

impl VpuExecutable {
    /// Segments destined for one buffer kind.
    pub fn segments_of(&self, kind: VpuSegmentKind) -> &[VpuSegment] {
        &self.segments[kind as usize]
    }
}

/// ELF parsing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfParseError {
    /// Binary too small to contain ELF header
    TooSmall,
    /// Invalid ELF magic number
    InvalidMagic,
    /// Invalid ELF class (not 64-bit)
    InvalidClass,
    /// Invalid data encoding (not little endian)
    InvalidEncoding,
    /// Invalid ELF version
    InvalidVersion,
    /// Invalid ELF type (not executable)
    InvalidType,
    /// Invalid program header offset or table bounds
    InvalidPhoff,
    /// Invalid program header size
    InvalidPhentsize,
    /// Segment extends beyond file
    SegmentOutOfBounds,
    /// Memory size smaller than file size
    InvalidMemSize,
    /// No loadable segments
    NoLoadableSegments,
    /// Invalid section header offset or table bounds
    InvalidShoff,
    /// Malformed symbol table section
    InvalidSymbolTable,
    /// Malformed string table section
    InvalidStringTable,
    /// Symbol name exceeds the maximum length
    SymbolNameTooLong,
    /// Symbol address does not fit the 32-bit VMEM space
    SymbolAddressRange,
}

impl From<ElfParseError> for PvaError {
    fn from(_: ElfParseError) -> Self {
        PvaError::InvalidImage
    }
}

/// VPU ELF64 loader
pub struct VpuElfLoader;

impl VpuElfLoader {
    /// Parse and validate a VPU ELF64 binary.
    ///
    /// # Arguments
    ///
    /// * `binary` - Raw bytes of the ELF file
    ///
    /// # Returns
    ///
    /// * `Ok(VpuExecutable)` - Segments grouped by kind plus exported symbols
    /// * `Err(ElfParseError)` - Parsing or validation error
    pub fn parse(binary: &[u8]) -> Result<VpuExecutable, ElfParseError> {
        let header = Self::parse_header(binary)?;
        Self::validate_header(&header)?;

        let segments = Self::parse_program_headers(binary, &header)?;
        if segments.iter().all(|group| group.is_empty()) {
            return Err(ElfParseError::NoLoadableSegments);
        }

        let symbols = Self::parse_symbols(binary, &header)?;

        Ok(VpuExecutable {
            segments,
            symbols,
            machine: header.e_machine,
        })
    }

    /// Parse ELF header from raw bytes
    fn parse_header(binary: &[u8]) -> Result<Elf64Header, ElfParseError> {
        if binary.len() < size_of::<Elf64Header>() {
            return Err(ElfParseError::TooSmall);
        }

        // SAFETY: We've verified the size, and Elf64Header is repr(C, packed)
        let header: Elf64Header =
            unsafe { core::ptr::read_unaligned(binary.as_ptr() as *const Elf64Header) };

        Ok(header)
    }

    /// Validate ELF header
    fn validate_header(header: &Elf64Header) -> Result<(), ElfParseError> {
        if header.e_ident[0..4] != ELF_MAGIC {
            return Err(ElfParseError::InvalidMagic);
        }

        if header.e_ident[4] != ELFCLASS64 {
            return Err(ElfParseError::InvalidClass);
        }

        if header.e_ident[5] != ELFDATA2LSB {
            return Err(ElfParseError::InvalidEncoding);
        }

        if header.e_ident[6] != 1 {
            return Err(ElfParseError::InvalidVersion);
        }

        // VPU apps are fully linked executables; no PIE on this target.
        if header.e_type != ET_EXEC {
            return Err(ElfParseError::InvalidType);
        }

        if header.e_phentsize != size_of::<Elf64ProgramHeader>() as u16 {
            return Err(ElfParseError::InvalidPhentsize);
        }

        Ok(())
    }

    /// Parse program headers and group loadable segments by kind
    fn parse_program_headers(
        binary: &[u8],
        header: &Elf64Header,
    ) -> Result<[Vec<VpuSegment>; NUM_SEGMENT_KINDS], ElfParseError> {
        let phoff = header.e_phoff as usize;
        let phentsize = header.e_phentsize as usize;
        let phnum = header.e_phnum as usize;

        let ph_table_end = phoff
            .checked_add(
                phnum
                    .checked_mul(phentsize)
                    .ok_or(ElfParseError::InvalidPhoff)?,
            )
            .ok_or(ElfParseError::InvalidPhoff)?;

        if ph_table_end > binary.len() {
            return Err(ElfParseError::InvalidPhoff);
        }

        let mut segments: [Vec<VpuSegment>; NUM_SEGMENT_KINDS] =
            [Vec::new(), Vec::new(), Vec::new()];

        for i in 0..phnum {
            let ph_offset = phoff + i * phentsize;

            // SAFETY: We've validated bounds above
            let ph: Elf64ProgramHeader = unsafe {
                core::ptr::read_unaligned(
                    binary.as_ptr().add(ph_offset) as *const Elf64ProgramHeader
                )
            };

            if ph.p_type != PT_LOAD {
                continue;
            }

            Self::validate_segment(&ph, binary.len())?;

            let flags = SegmentFlags::from_bits_truncate(ph.p_flags);
            let kind = VpuSegmentKind::from_flags(flags);

            segments[kind as usize].push(VpuSegment {
                vaddr: ph.p_vaddr,
                file_offset: ph.p_offset,
                file_size: ph.p_filesz,
                mem_size: ph.p_memsz,
                flags,
            });
        }

        Ok(segments)
    }

    /// Validate a single loadable segment
    fn validate_segment(
        ph: &Elf64ProgramHeader,
        file_size: usize,
    ) -> Result<(), ElfParseError> {
        if ph.p_memsz < ph.p_filesz {
            return Err(ElfParseError::InvalidMemSize);
        }

        // Segments live in the 32-bit VMEM space; anything larger cannot
        // be a real VPU segment.
        if ph.p_memsz > u32::MAX as u64 {
            return Err(ElfParseError::InvalidMemSize);
        }

        let segment_end = ph
            .p_offset
            .checked_add(ph.p_filesz)
            .ok_or(ElfParseError::SegmentOutOfBounds)?;

        if segment_end > file_size as u64 {
            return Err(ElfParseError::SegmentOutOfBounds);
        }

        Ok(())
    }

    /// Extract exported symbols from `.symtab` and its linked string table.
    ///
    /// A binary with no symbol table section is valid and exports nothing.
    fn parse_symbols(
        binary: &[u8],
        header: &Elf64Header,
    ) -> Result<Vec<ElfSymbol>, ElfParseError> {
        let section_headers = Self::parse_section_headers(binary, header)?;

        let Some(symtab) = section_headers.iter().find(|s| s.sh_type == SHT_SYMTAB) else {
            return Ok(Vec::new());
        };

        // The linked string table holds the symbol names.
        let strtab_idx = symtab.sh_link as usize;
        let strtab = section_headers
            .get(strtab_idx)
            .ok_or(ElfParseError::InvalidSymbolTable)?;
        if strtab.sh_type != SHT_STRTAB {
            return Err(ElfParseError::InvalidSymbolTable);
        }

        let strtab_start = strtab.sh_offset as usize;
        let strtab_end = strtab_start
            .checked_add(strtab.sh_size as usize)
            .ok_or(ElfParseError::InvalidStringTable)?;
        if strtab_end > binary.len() {
            return Err(ElfParseError::InvalidStringTable);
        }
        let strings = &binary[strtab_start..strtab_end];

        if symtab.sh_entsize as usize != size_of::<Elf64Symbol>() {
            return Err(ElfParseError::InvalidSymbolTable);
        }
        let start = symtab.sh_offset as usize;
        let table_end = start
            .checked_add(symtab.sh_size as usize)
            .ok_or(ElfParseError::InvalidSymbolTable)?;
        if table_end > binary.len() {
            return Err(ElfParseError::InvalidSymbolTable);
        }
        let count = symtab.sh_size as usize / size_of::<Elf64Symbol>();

        let mut symbols = Vec::new();
        for i in 0..count {
            let offset = start + i * size_of::<Elf64Symbol>();

            // SAFETY: We've validated the table bounds above. Using
            // read_unaligned because the byte slice may not be aligned.
            let sym: Elf64Symbol = unsafe {
                core::ptr::read_unaligned(binary.as_ptr().add(offset) as *const Elf64Symbol)
            };

            // Only exported data objects are addressable by firmware.
            let bind = sym.st_info >> 4;
            let typ = sym.st_info & 0xF;
            if bind != STB_GLOBAL || typ != STT_OBJECT || sym.st_name == 0 {
                continue;
            }

            let name = Self::symbol_name(strings, sym.st_name)?;
            if name.len() > MAX_SYMBOL_NAME_LEN {
                return Err(ElfParseError::SymbolNameTooLong);
            }

            let addr =
                u32::try_from(sym.st_value).map_err(|_| ElfParseError::SymbolAddressRange)?;
            let size =
                u32::try_from(sym.st_size).map_err(|_| ElfParseError::SymbolAddressRange)?;

            symbols.push(ElfSymbol { name, addr, size });
        }

        Ok(symbols)
    }

    /// Parse the section header table
    fn parse_section_headers(
        binary: &[u8],
        header: &Elf64Header,
    ) -> Result<Vec<Elf64SectionHeader>, ElfParseError> {
        let shnum = header.e_shnum as usize;
        if shnum == 0 {
            return Ok(Vec::new());
        }

        let shoff = header.e_shoff as usize;
        let shentsize = header.e_shentsize as usize;
        if shentsize != size_of::<Elf64SectionHeader>() {
            return Err(ElfParseError::InvalidShoff);
        }

        let table_end = shoff
            .checked_add(
                shnum
                    .checked_mul(shentsize)
                    .ok_or(ElfParseError::InvalidShoff)?,
            )
            .ok_or(ElfParseError::InvalidShoff)?;
        if table_end > binary.len() {
            return Err(ElfParseError::InvalidShoff);
        }

        let mut headers = Vec::with_capacity(shnum);
        for i in 0..shnum {
            // SAFETY: We've validated bounds above
            let sh: Elf64SectionHeader = unsafe {
                core::ptr::read_unaligned(
                    binary.as_ptr().add(shoff + i * shentsize) as *const Elf64SectionHeader
                )
            };
            headers.push(sh);
        }

        Ok(headers)
    }

    /// Read a NUL-terminated name out of the string table.
    fn symbol_name(strings: &[u8], offset: u32) -> Result<String, ElfParseError> {
        let start = offset as usize;
        if start >= strings.len() {
            return Err(ElfParseError::InvalidStringTable);
        }

        let end = strings[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|p| start + p)
            .ok_or(ElfParseError::InvalidStringTable)?;

        let name = core::str::from_utf8(&strings[start..end])
            .map_err(|_| ElfParseError::InvalidStringTable)?;

        Ok(String::from(name))
    }

    /// Get segment data from the binary
    pub fn segment_data<'a>(binary: &'a [u8], segment: &VpuSegment) -> &'a [u8] {
        let start = segment.file_offset as usize;
        let end = start + segment.file_size as usize;
        &binary[start..end]
    }
}
