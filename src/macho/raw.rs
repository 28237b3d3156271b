//! Container-native Mach-O structures.
//!
//! Grounded on goblin's `mach::load_command`, `mach::symbols`, and
//! `mach::relocation` modules: the same field names, the same
//! `#[derive(Pread, Pwrite, SizeWith)]` treatment, the same
//! `Nlist32`/`Nlist64` + `Container`-dispatched widening pattern.

use scroll::{Pread, Pwrite, SizeWith};

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pread, Pwrite, SizeWith)]
pub struct Header {
    pub magic: u32,
    pub cputype: u32,
    pub cpusubtype: u32,
    pub filetype: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: u32,
    pub reserved: u32,
}

pub const SIZEOF_HEADER_32: usize = 28;
pub const SIZEOF_HEADER_64: usize = 32;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pread, Pwrite, SizeWith)]
pub struct LoadCommandHeader {
    pub cmd: u32,
    pub cmdsize: u32,
}

pub const SIZEOF_LOAD_COMMAND: usize = 8;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pread, Pwrite, SizeWith)]
pub struct SegmentCommand32 {
    pub cmd: u32,
    pub cmdsize: u32,
    pub segname: [u8; 16],
    pub vmaddr: u32,
    pub vmsize: u32,
    pub fileoff: u32,
    pub filesize: u32,
    pub maxprot: u32,
    pub initprot: u32,
    pub nsects: u32,
    pub flags: u32,
}

pub const SIZEOF_SEGMENT_COMMAND_32: usize = 56;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pread, Pwrite, SizeWith)]
pub struct SegmentCommand64 {
    pub cmd: u32,
    pub cmdsize: u32,
    pub segname: [u8; 16],
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: u32,
    pub initprot: u32,
    pub nsects: u32,
    pub flags: u32,
}

pub const SIZEOF_SEGMENT_COMMAND_64: usize = 72;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pread, Pwrite, SizeWith)]
pub struct Section32 {
    pub sectname: [u8; 16],
    pub segname: [u8; 16],
    pub addr: u32,
    pub size: u32,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
    pub reserved1: u32,
    pub reserved2: u32,
}

pub const SIZEOF_SECTION_32: usize = 68;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pread, Pwrite, SizeWith)]
pub struct Section64 {
    pub sectname: [u8; 16],
    pub segname: [u8; 16],
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
    pub reserved1: u32,
    pub reserved2: u32,
    pub reserved3: u32,
}

pub const SIZEOF_SECTION_64: usize = 80;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pread, Pwrite, SizeWith)]
pub struct SymtabCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub symoff: u32,
    pub nsyms: u32,
    pub stroff: u32,
    pub strsize: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pread, Pwrite, SizeWith)]
pub struct DysymtabCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub ilocalsym: u32,
    pub nlocalsym: u32,
    pub iextdefsym: u32,
    pub nextdefsym: u32,
    pub iundefsym: u32,
    pub nundefsym: u32,
    pub tocoff: u32,
    pub ntoc: u32,
    pub modtaboff: u32,
    pub nmodtab: u32,
    pub extrefsymoff: u32,
    pub nextrefsyms: u32,
    pub indirectsymoff: u32,
    pub nindirectsyms: u32,
    pub extreloff: u32,
    pub nextrel: u32,
    pub locreloff: u32,
    pub nlocrel: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pread, Pwrite, SizeWith)]
pub struct DylibCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub name_offset: u32,
    pub timestamp: u32,
    pub current_version: u32,
    pub compatibility_version: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pread, Pwrite, SizeWith)]
pub struct EntryPointCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub entryoff: u64,
    pub stacksize: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pread, Pwrite, SizeWith)]
pub struct UuidCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub uuid: [u8; 16],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pread, Pwrite, SizeWith)]
pub struct DyldInfoCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub rebase_off: u32,
    pub rebase_size: u32,
    pub bind_off: u32,
    pub bind_size: u32,
    pub weak_bind_off: u32,
    pub weak_bind_size: u32,
    pub lazy_bind_off: u32,
    pub lazy_bind_size: u32,
    pub export_off: u32,
    pub export_size: u32,
}

/// 32-bit on-disk symbol table entry. Field names match `<mach-o/nlist.h>`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pread, Pwrite, SizeWith)]
pub struct Nlist32 {
    pub n_strx: u32,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: u16,
    pub n_value: u32,
}

pub const SIZEOF_NLIST_32: usize = 12;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pread, Pwrite, SizeWith)]
pub struct Nlist64 {
    pub n_strx: u32,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: u16,
    pub n_value: u64,
}

pub const SIZEOF_NLIST_64: usize = 16;

/// Width-erased `nlist`, produced by widening `Nlist32`/`Nlist64`
/// through `From`, exactly as goblin's `mach::symbols::Nlist` does.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nlist {
    pub n_strx: u32,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: u16,
    pub n_value: u64,
}

impl From<Nlist32> for Nlist {
    fn from(n: Nlist32) -> Self {
        Nlist {
            n_strx: n.n_strx,
            n_type: n.n_type,
            n_sect: n.n_sect,
            n_desc: n.n_desc,
            n_value: n.n_value as u64,
        }
    }
}

impl From<Nlist64> for Nlist {
    fn from(n: Nlist64) -> Self {
        Nlist {
            n_strx: n.n_strx,
            n_type: n.n_type,
            n_sect: n.n_sect,
            n_desc: n.n_desc,
            n_value: n.n_value,
        }
    }
}

impl Nlist {
    pub fn is_stab(&self) -> bool {
        self.n_type & super::constants::N_STAB != 0
    }
    pub fn is_ext(&self) -> bool {
        self.n_type & super::constants::N_EXT != 0
    }
    pub fn is_pext(&self) -> bool {
        self.n_type & super::constants::N_PEXT != 0
    }
    pub fn type_bits(&self) -> u8 {
        self.n_type & super::constants::N_TYPE
    }
}

/// Vanilla (non-scattered) relocation entry. Bit layout matches
/// goblin's `mach::relocation::RelocationInfo` (`r_info` packs
/// symbolnum/pcrel/length/extern/type).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pread, Pwrite, SizeWith)]
pub struct RelocationInfo {
    pub r_address: i32,
    pub r_info: u32,
}

impl RelocationInfo {
    pub fn r_symbolnum(&self) -> u32 {
        self.r_info & 0x00ff_ffff
    }
    pub fn r_pcrel(&self) -> bool {
        (self.r_info >> 24) & 0x1 != 0
    }
    pub fn r_length(&self) -> u8 {
        ((self.r_info >> 25) & 0x3) as u8
    }
    pub fn r_extern(&self) -> bool {
        (self.r_info >> 27) & 0x1 != 0
    }
    pub fn r_type(&self) -> u8 {
        ((self.r_info >> 28) & 0xf) as u8
    }
    pub fn is_scattered(&self) -> bool {
        (self.r_address as u32) & R_SCATTERED != 0
    }

    pub fn pack(symbolnum: u32, pcrel: bool, length: u8, is_extern: bool, kind: u8) -> u32 {
        (symbolnum & 0x00ff_ffff)
            | ((pcrel as u32) << 24)
            | (((length & 0x3) as u32) << 25)
            | ((is_extern as u32) << 27)
            | (((kind & 0xf) as u32) << 28)
    }
}

/// High bit of `r_address` marks a scattered relocation, per the
/// Mach-O `<mach-o/reloc.h>` convention referenced in spec §4.1.
pub const R_SCATTERED: u32 = 0x8000_0000;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ScatteredRelocationInfo {
    pub r_pcrel: bool,
    pub r_length: u8,
    pub r_type: u8,
    pub r_address: u32,
    pub r_value: i32,
}

impl ScatteredRelocationInfo {
    /// Decodes a packed `(u32, i32)` pair the way the second word of a
    /// scattered relocation is laid out.
    pub fn unpack(word0: u32, r_value: i32) -> Self {
        ScatteredRelocationInfo {
            r_pcrel: (word0 >> 30) & 0x1 != 0,
            r_length: ((word0 >> 28) & 0x3) as u8,
            r_type: ((word0 >> 24) & 0xf) as u8,
            r_address: word0 & 0x00ff_ffff,
            r_value,
        }
    }
}
