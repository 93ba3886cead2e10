//! Shared test support: builds structurally complete VPU ELF images.

use pva::loader::elf::{
    ELFCLASS64, ELFDATA2LSB, ELF_MAGIC, ET_EXEC, PT_LOAD, SHT_STRTAB, SHT_SYMTAB, STB_GLOBAL,
    STT_OBJECT,
};

/// Builder for small VPU executables with segments and exported symbols.
#[derive(Default)]
pub struct ElfBuilder {
    segments: Vec<(u32, u64, Vec<u8>)>,
    symbols: Vec<(String, u32, u32)>,
}

impl ElfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(mut self, vaddr: u64, bytes: &[u8]) -> Self {
        self.segments.push((5, vaddr, bytes.to_vec()));
        self
    }

    pub fn data(mut self, vaddr: u64, bytes: &[u8]) -> Self {
        self.segments.push((6, vaddr, bytes.to_vec()));
        self
    }

    pub fn params(mut self, vaddr: u64, bytes: &[u8]) -> Self {
        self.segments.push((4, vaddr, bytes.to_vec()));
        self
    }

    pub fn symbol(mut self, name: &str, addr: u32, size: u32) -> Self {
        self.symbols.push((name.to_string(), addr, size));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let phnum = self.segments.len();
        let phoff = 64;
        let mut off = phoff + phnum * 56;

        let seg_offsets: Vec<usize> = self
            .segments
            .iter()
            .map(|(_, _, data)| {
                let o = off;
                off += data.len();
                o
            })
            .collect();

        let symtab_off = off;
        let nsyms = self.symbols.len() + 1;
        off += nsyms * 24;

        let strtab_off = off;
        let mut strtab = vec![0u8];
        let name_offsets: Vec<u32> = self
            .symbols
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
        let total = shoff + 3 * 64;
        let mut elf = vec![0u8; total];

        elf[0..4].copy_from_slice(&ELF_MAGIC);
        elf[4] = ELFCLASS64;
        elf[5] = ELFDATA2LSB;
        elf[6] = 1;
        elf[16..18].copy_from_slice(&ET_EXEC.to_le_bytes());
        elf[20..24].copy_from_slice(&1u32.to_le_bytes());
        elf[32..40].copy_from_slice(&(phoff as u64).to_le_bytes());
        elf[40..48].copy_from_slice(&(shoff as u64).to_le_bytes());
        elf[52..54].copy_from_slice(&64u16.to_le_bytes());
        elf[54..56].copy_from_slice(&56u16.to_le_bytes());
        elf[56..58].copy_from_slice(&(phnum as u16).to_le_bytes());
        elf[58..60].copy_from_slice(&64u16.to_le_bytes());
        elf[60..62].copy_from_slice(&3u16.to_le_bytes());

        for (i, (flags, vaddr, data)) in self.segments.iter().enumerate() {
            let ph = phoff + i * 56;
            elf[ph..ph + 4].copy_from_slice(&PT_LOAD.to_le_bytes());
            elf[ph + 4..ph + 8].copy_from_slice(&flags.to_le_bytes());
            elf[ph + 8..ph + 16].copy_from_slice(&(seg_offsets[i] as u64).to_le_bytes());
            elf[ph + 16..ph + 24].copy_from_slice(&vaddr.to_le_bytes());
            elf[ph + 32..ph + 40].copy_from_slice(&(data.len() as u64).to_le_bytes());
            elf[ph + 40..ph + 48].copy_from_slice(&(data.len() as u64).to_le_bytes());
            elf[seg_offsets[i]..seg_offsets[i] + data.len()].copy_from_slice(data);
        }

        for (i, (_, addr, size)) in self.symbols.iter().enumerate() {
            let sym = symtab_off + (i + 1) * 24;
            elf[sym..sym + 4].copy_from_slice(&name_offsets[i].to_le_bytes());
            elf[sym + 4] = (STB_GLOBAL << 4) | STT_OBJECT;
            elf[sym + 6..sym + 8].copy_from_slice(&1u16.to_le_bytes());
            elf[sym + 8..sym + 16].copy_from_slice(&(*addr as u64).to_le_bytes());
            elf[sym + 16..sym + 24].copy_from_slice(&(*size as u64).to_le_bytes());
        }

        elf[strtab_off..strtab_off + strtab.len()].copy_from_slice(&strtab);

        let sh = shoff + 64;
        elf[sh + 4..sh + 8].copy_from_slice(&SHT_SYMTAB.to_le_bytes());
        elf[sh + 24..sh + 32].copy_from_slice(&(symtab_off as u64).to_le_bytes());
        elf[sh + 32..sh + 40].copy_from_slice(&((nsyms * 24) as u64).to_le_bytes());
        elf[sh + 40..sh + 44].copy_from_slice(&2u32.to_le_bytes());
        elf[sh + 56..sh + 64].copy_from_slice(&24u64.to_le_bytes());

        let sh = shoff + 128;
        elf[sh + 4..sh + 8].copy_from_slice(&SHT_STRTAB.to_le_bytes());
        elf[sh + 24..sh + 32].copy_from_slice(&(strtab_off as u64).to_le_bytes());
        elf[sh + 32..sh + 40].copy_from_slice(&(strtab.len() as u64).to_le_bytes());

        elf
    }
}

/// An executable with one segment of each kind and two symbols.
pub fn simple_exe() -> Vec<u8> {
    ElfBuilder::new()
        .code(0x0, &[0x90; 32])
        .data(0x1000, &[0xAA; 16])
        .params(0x2000, &[0x55; 64])
        .symbol("main", 0x100, 64)
        .symbol("init", 0x40, 16)
        .build()
}
