//! Test VPU executables.
//!
//! Builds small but structurally complete ELF64 images for unit tests:
//! program headers with segment contents, a `.symtab` with exported
//! symbols, and its linked string table.

use alloc::vec;
use alloc::vec::Vec;

use super::elf::{ELF_MAGIC, ELFCLASS64, ELFDATA2LSB, ET_EXEC, PT_LOAD, SHT_STRTAB, SHT_SYMTAB,
                 STB_GLOBAL, STT_OBJECT};

pub fn put16(buf: &mut [u8], pos: usize, val: u16) {
    buf[pos..pos + 2].copy_from_slice(&val.to_le_bytes());
}

pub fn put32(buf: &mut [u8], pos: usize, val: u32) {
    buf[pos..pos + 4].copy_from_slice(&val.to_le_bytes());
}

pub fn put64(buf: &mut [u8], pos: usize, val: u64) {
    buf[pos..pos + 8].copy_from_slice(&val.to_le_bytes());
}

/// Build a VPU ELF with the given segments and exported symbols.
///
/// Each segment is `(p_flags, vaddr, contents)`; each symbol is
/// `(name, addr, size)`. Layout: ELF header, program headers, segment
/// contents in order, `.symtab`, `.strtab`, section headers.
pub fn build_elf(segments: &[(u32, u64, Vec<u8>)], symbols: &[(&str, u32, u32)]) -> Vec<u8> {
    let phnum = segments.len();
    let phoff = 64;
    let mut off = phoff + phnum * 56;

    let seg_offsets: Vec<usize> = segments
        .iter()
        .map(|(_, _, data)| {
            let o = off;
            off += data.len();
            o
        })
        .collect();

    let symtab_off = off;
    let nsyms = symbols.len() + 1; // index 0 is the null symbol
    off += nsyms * 24;

    let strtab_off = off;
    let mut strtab = vec![0u8];
    let name_offsets: Vec<u32> = symbols
        .iter()
        .map(|(name, _, _)| {
            let o = strtab.len() as u32;
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
            o
        })
        .collect();
    off += strtab.len();

    let shoff = off;
    let shnum = 3;
    let total = shoff + shnum * 64;

    let mut elf = vec![0u8; total];

    // ELF header
    elf[0..4].copy_from_slice(&ELF_MAGIC);
    elf[4] = ELFCLASS64;
    elf[5] = ELFDATA2LSB;
    elf[6] = 1;
    put16(&mut elf, 16, ET_EXEC);
    put16(&mut elf, 18, 0xF3); // machine, unchecked
    put32(&mut elf, 20, 1);
    put64(&mut elf, 32, phoff as u64);
    put64(&mut elf, 40, shoff as u64);
    put16(&mut elf, 52, 64);
    put16(&mut elf, 54, 56);
    put16(&mut elf, 56, phnum as u16);
    put16(&mut elf, 58, 64);
    put16(&mut elf, 60, shnum as u16);

    // Program headers + segment contents
    for (i, (flags, vaddr, data)) in segments.iter().enumerate() {
        let ph = phoff + i * 56;
        put32(&mut elf, ph, PT_LOAD);
        put32(&mut elf, ph + 4, *flags);
        put64(&mut elf, ph + 8, seg_offsets[i] as u64);
        put64(&mut elf, ph + 16, *vaddr);
        put64(&mut elf, ph + 32, data.len() as u64);
        put64(&mut elf, ph + 40, data.len() as u64);
        elf[seg_offsets[i]..seg_offsets[i] + data.len()].copy_from_slice(data);
    }

    // Symbol table (entry 0 stays null)
    for (i, (_, addr, size)) in symbols.iter().enumerate() {
        let sym = symtab_off + (i + 1) * 24;
        put32(&mut elf, sym, name_offsets[i]);
        elf[sym + 4] = (STB_GLOBAL << 4) | STT_OBJECT;
        put16(&mut elf, sym + 6, 1);
        put64(&mut elf, sym + 8, *addr as u64);
        put64(&mut elf, sym + 16, *size as u64);
    }

    elf[strtab_off..strtab_off + strtab.len()].copy_from_slice(&strtab);

    // Section headers: null, .symtab, .strtab
    let sh = shoff + 64;
    put32(&mut elf, sh + 4, SHT_SYMTAB);
    put64(&mut elf, sh + 24, symtab_off as u64);
    put64(&mut elf, sh + 32, (nsyms * 24) as u64);
    put32(&mut elf, sh + 40, 2); // strtab index
    put64(&mut elf, sh + 56, 24);

    let sh = shoff + 128;
    put32(&mut elf, sh + 4, SHT_STRTAB);
    put64(&mut elf, sh + 24, strtab_off as u64);
    put64(&mut elf, sh + 32, strtab.len() as u64);

    elf
}

/// Three-segment executable (code, data, params) with two symbols.
pub fn simple_elf() -> Vec<u8> {
    build_elf(
        &[
            (5, 0x0, vec![0x90; 32]),    // R+X -> code
            (6, 0x1000, vec![0xAA; 16]), // R+W -> data
            (4, 0x2000, vec![0x55; 64]), // R -> in_params
        ],
        &[("main", 0x100, 64), ("init", 0x40, 16)],
    )
}
