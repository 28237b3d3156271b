//! Mach-O magic numbers, file types, section type/attribute flags, and
//! canonical segment/section names. Grounded on goblin's
//! `mach::header` and `mach::constants` modules (same constant names
//! and values, trimmed to what the core link engine actually
//! branches on).

/// 32-bit Mach-O magic.
pub const MH_MAGIC: u32 = 0xfeed_face;
pub const MH_CIGAM: u32 = 0xcefa_edfe;
/// 64-bit Mach-O magic.
pub const MH_MAGIC_64: u32 = 0xfeed_facf;
pub const MH_CIGAM_64: u32 = 0xcffa_edfe;

// File types (header.filetype)
pub const MH_OBJECT: u32 = 0x1;
pub const MH_EXECUTE: u32 = 0x2;
pub const MH_DYLIB: u32 = 0x6;
pub const MH_DYLINKER: u32 = 0x7;
pub const MH_BUNDLE: u32 = 0x8;
pub const MH_DYLIB_STUB: u32 = 0x9;
pub const MH_KEXT_BUNDLE: u32 = 0xb;

// Header flags
pub const MH_SUBSECTIONS_VIA_SYMBOLS: u32 = 0x2000;
pub const MH_TWOLEVEL: u32 = 0x80;
pub const MH_PIE: u32 = 0x20_0000;
pub const MH_NOUNDEFS: u32 = 0x1;

// Section type mask + values (flags & SECTION_TYPE)
pub const SECTION_TYPE: u32 = 0x0000_00ff;
pub const S_REGULAR: u32 = 0x0;
pub const S_ZEROFILL: u32 = 0x1;
pub const S_CSTRING_LITERALS: u32 = 0x2;
pub const S_4BYTE_LITERALS: u32 = 0x3;
pub const S_8BYTE_LITERALS: u32 = 0x4;
pub const S_LITERAL_POINTERS: u32 = 0x5;
pub const S_NON_LAZY_SYMBOL_POINTERS: u32 = 0x6;
pub const S_LAZY_SYMBOL_POINTERS: u32 = 0x7;
pub const S_SYMBOL_STUBS: u32 = 0x8;
pub const S_MOD_INIT_FUNC_POINTERS: u32 = 0x9;
pub const S_MOD_TERM_FUNC_POINTERS: u32 = 0xa;
pub const S_COALESCED: u32 = 0xb;
pub const S_GB_ZEROFILL: u32 = 0xc;
pub const S_INTERPOSING: u32 = 0xd;
pub const S_16BYTE_LITERALS: u32 = 0xe;
pub const S_THREAD_LOCAL_VARIABLES: u32 = 0x13;

// Section attributes (flags & SECTION_ATTRIBUTES)
pub const SECTION_ATTRIBUTES: u32 = 0xffff_ff00;
pub const S_ATTR_PURE_INSTRUCTIONS: u32 = 0x8000_0000;
pub const S_ATTR_SOME_INSTRUCTIONS: u32 = 0x0000_0400;
pub const S_ATTR_DEBUG: u32 = 0x0200_0000;
pub const S_ATTR_NO_DEAD_STRIP: u32 = 0x1000_0000;
pub const S_ATTR_SELF_MODIFYING_CODE: u32 = 0x0400_0000;

/// Returns the section type (low byte of the flags field).
#[inline]
pub fn section_type(flags: u32) -> u32 {
    flags & SECTION_TYPE
}

/// Returns the section attribute bits of the flags field.
#[inline]
pub fn section_attrs(flags: u32) -> u32 {
    flags & SECTION_ATTRIBUTES
}

// Canonical segment/section names (spec §4.5 ordinal table, §6 output container)
pub const SEG_PAGEZERO: &str = "__PAGEZERO";
pub const SEG_TEXT: &str = "__TEXT";
pub const SECT_TEXT: &str = "__text";
pub const SECT_TEXT_COALESCED: &str = "__textcoal_nt";
pub const SEG_DATA: &str = "__DATA";
pub const SEG_OBJC: &str = "__OBJC";
pub const SEG_LINKEDIT: &str = "__LINKEDIT";

// nlist type-field masks (n_type)
pub const N_STAB: u8 = 0xe0;
pub const N_PEXT: u8 = 0x10;
pub const N_TYPE: u8 = 0x0e;
pub const N_EXT: u8 = 0x01;
pub const N_UNDF: u8 = 0x0;
pub const N_ABS: u8 = 0x2;
pub const N_SECT: u8 = 0xe;
pub const N_INDR: u8 = 0xa;

// Common stab type codes used by DebugInfoCollector (spec §4.7)
pub const N_GSYM: u8 = 0x20;
pub const N_FNAME: u8 = 0x22;
pub const N_FUN: u8 = 0x24;
pub const N_STSYM: u8 = 0x26;
pub const N_LCSYM: u8 = 0x28;
pub const N_BNSYM: u8 = 0x2e;
pub const N_OPT: u8 = 0x3c;
pub const N_RSYM: u8 = 0x40;
pub const N_SLINE: u8 = 0x44;
pub const N_ENSYM: u8 = 0x4e;
pub const N_SO: u8 = 0x64;
pub const N_OSO: u8 = 0x66;
pub const N_LSYM: u8 = 0x80;
pub const N_BINCL: u8 = 0x82;
pub const N_SOL: u8 = 0x84;
pub const N_LBRAC: u8 = 0xc0;
pub const N_EXCL: u8 = 0xc2;
pub const N_RBRAC: u8 = 0xe0;
pub const N_EINCL: u8 = 0xe2;

// Load command opcodes the reader/writer actually branch on.
pub const LC_REQ_DYLD: u32 = 0x8000_0000;
pub const LC_SEGMENT: u32 = 0x1;
pub const LC_SYMTAB: u32 = 0x2;
pub const LC_DYSYMTAB: u32 = 0xb;
pub const LC_LOAD_DYLIB: u32 = 0xc;
pub const LC_ID_DYLIB: u32 = 0xd;
pub const LC_LOAD_DYLINKER: u32 = 0xe;
pub const LC_SEGMENT_64: u32 = 0x19;
pub const LC_UUID: u32 = 0x1b;
pub const LC_REEXPORT_DYLIB: u32 = 0x1f | LC_REQ_DYLD;
pub const LC_DYLD_INFO: u32 = 0x22;
pub const LC_DYLD_INFO_ONLY: u32 = 0x22 | LC_REQ_DYLD;
pub const LC_LOAD_WEAK_DYLIB: u32 = 0x18 | LC_REQ_DYLD;
pub const LC_MAIN: u32 = 0x28 | LC_REQ_DYLD;
pub const LC_SUB_FRAMEWORK: u32 = 0x12;
pub const LC_SUB_UMBRELLA: u32 = 0x14;
pub const LC_SUB_LIBRARY: u32 = 0x15;
pub const LC_SUB_CLIENT: u32 = 0x13;

// Generic (i386/arm) relocation types (r_type in a vanilla r_info).
pub const GENERIC_RELOC_VANILLA: u8 = 0;
pub const GENERIC_RELOC_PAIR: u8 = 1;
pub const GENERIC_RELOC_SECTDIFF: u8 = 2;
pub const GENERIC_RELOC_PB_LA_PTR: u8 = 3;
pub const GENERIC_RELOC_LOCAL_SECTDIFF: u8 = 4;

// x86_64 relocation types.
pub const X86_64_RELOC_UNSIGNED: u8 = 0;
pub const X86_64_RELOC_SIGNED: u8 = 1;
pub const X86_64_RELOC_BRANCH: u8 = 2;
pub const X86_64_RELOC_GOT_LOAD: u8 = 3;
pub const X86_64_RELOC_GOT: u8 = 4;
pub const X86_64_RELOC_SUBTRACTOR: u8 = 5;
pub const X86_64_RELOC_SIGNED_1: u8 = 6;
pub const X86_64_RELOC_SIGNED_2: u8 = 7;
pub const X86_64_RELOC_SIGNED_4: u8 = 8;
pub const X86_64_RELOC_TLV: u8 = 9;

// PowerPC relocation types.
pub const PPC_RELOC_VANILLA: u8 = 0;
pub const PPC_RELOC_PAIR: u8 = 1;
pub const PPC_RELOC_BR14: u8 = 2;
pub const PPC_RELOC_BR24: u8 = 3;
pub const PPC_RELOC_HI16: u8 = 4;
pub const PPC_RELOC_LO16: u8 = 5;
pub const PPC_RELOC_HA16: u8 = 6;
pub const PPC_RELOC_LO14: u8 = 7;
pub const PPC_RELOC_SECTDIFF: u8 = 8;
pub const PPC_RELOC_PB_LA_PTR: u8 = 9;
pub const PPC_RELOC_HI16_SECTDIFF: u8 = 10;
pub const PPC_RELOC_LO16_SECTDIFF: u8 = 11;
pub const PPC_RELOC_HA16_SECTDIFF: u8 = 12;
pub const PPC_RELOC_LOCAL_SECTDIFF: u8 = 15;

// ARM relocation types.
pub const ARM_RELOC_VANILLA: u8 = 0;
pub const ARM_RELOC_PAIR: u8 = 1;
pub const ARM_RELOC_SECTDIFF: u8 = 2;
pub const ARM_RELOC_BR24: u8 = 5;
pub const ARM_THUMB_RELOC_BR22: u8 = 6;

/// Indirect symbol table sentinels (`<mach-o/loader.h>`): the slot is
/// locally bound (no symbol lookup needed) or an absolute symbol.
pub const INDIRECT_SYMBOL_LOCAL: u32 = 0x8000_0000;
pub const INDIRECT_SYMBOL_ABS: u32 = 0x4000_0000;
