//! Lifts one relocatable object into atoms and references (spec
//! §4.1). Grounded on goblin's `mach::mod::MachO::parse` (header then
//! load-command-stream walk) and `mach::symbols::Symbols`
//! (`Container`-dispatched `nlist` widening); scattered/vanilla
//! relocation pairing follows `mach::relocation::RelocationInfo`'s bit
//! layout, generalized to the three architecture families named in
//! spec §4.6's encoding table.

use crate::atom::*;
use crate::container::{Arch, Ctx};
use crate::debug_info::Stab;
use crate::error::{Error, Result};
use crate::macho::constants::*;
use crate::macho::raw::*;
use crate::macho::view::View;
use crate::reader::{DebugInfoKind, ParsedObject, ReaderOptions};
use std::collections::HashMap;

pub struct RelocatableReader {
    reader_id: ReaderId,
    path: String,
    ctx: Ctx,
    options: ReaderOptions,
}

struct ParsedSection {
    segname: String,
    sectname: String,
    addr: u64,
    size: u64,
    offset: u32,
    align: u32,
    reloff: u32,
    nreloc: u32,
    flags: u32,
    reserved1: u32,
    reserved2: u32,
}

impl RelocatableReader {
    pub fn new(reader_id: ReaderId, path: impl Into<String>, ctx: Ctx, options: ReaderOptions) -> Self {
        RelocatableReader {
            reader_id,
            path: path.into(),
            ctx,
            options,
        }
    }

    pub fn parse(&self, data: &[u8]) -> Result<ParsedObject> {
        let view = View::new(data, self.ctx);
        let (header, header_size) = view.header()?;
        if header.filetype != MH_OBJECT {
            return Err(Error::Malformed(format!(
                "expected MH_OBJECT filetype, found {:#x}",
                header.filetype
            )));
        }

        let mut sections: Vec<ParsedSection> = Vec::new();
        let mut symoff = 0u32;
        let mut nsyms = 0u32;
        let mut stroff = 0u32;
        let mut strsize = 0u32;
        let mut indirectsymoff = 0u32;
        let mut nindirectsyms = 0u32;

        let mut cmd_offset = header_size;
        for _ in 0..header.ncmds {
            if cmd_offset + 8 > data.len() {
                return Err(Error::TruncatedLoadCommands);
            }
            let lc = view.load_command_header(cmd_offset)?;
            if lc.cmdsize < 8 || cmd_offset + lc.cmdsize as usize > data.len() {
                return Err(Error::TruncatedLoadCommands);
            }
            match lc.cmd {
                LC_SEGMENT if !self.ctx.is_64() => {
                    let seg = view.segment_32(cmd_offset)?;
                    let mut off = cmd_offset + SIZEOF_SEGMENT_COMMAND_32;
                    for _ in 0..seg.nsects {
                        let s = view.section_32(off)?;
                        sections.push(ParsedSection {
                            segname: cstr16(&s.segname),
                            sectname: cstr16(&s.sectname),
                            addr: s.addr as u64,
                            size: s.size as u64,
                            offset: s.offset,
                            align: s.align,
                            reloff: s.reloff,
                            nreloc: s.nreloc,
                            flags: s.flags,
                            reserved1: s.reserved1,
                            reserved2: s.reserved2,
                        });
                        off += SIZEOF_SECTION_32;
                    }
                }
                LC_SEGMENT_64 if self.ctx.is_64() => {
                    let seg = view.segment_64(cmd_offset)?;
                    let mut off = cmd_offset + SIZEOF_SEGMENT_COMMAND_64;
                    for _ in 0..seg.nsects {
                        let s = view.section_64(off)?;
                        sections.push(ParsedSection {
                            segname: cstr16(&s.segname),
                            sectname: cstr16(&s.sectname),
                            addr: s.addr,
                            size: s.size,
                            offset: s.offset,
                            align: s.align,
                            reloff: s.reloff,
                            nreloc: s.nreloc,
                            flags: s.flags,
                            reserved1: s.reserved1,
                            reserved2: s.reserved2,
                        });
                        off += SIZEOF_SECTION_64;
                    }
                }
                LC_SYMTAB => {
                    let st = view.symtab_command(cmd_offset)?;
                    symoff = st.symoff;
                    nsyms = st.nsyms;
                    stroff = st.stroff;
                    strsize = st.strsize;
                }
                LC_DYSYMTAB => {
                    let dt = view.dysymtab_command(cmd_offset)?;
                    indirectsymoff = dt.indirectsymoff;
                    nindirectsyms = dt.nindirectsyms;
                }
                _ => {}
            }
            cmd_offset += lc.cmdsize as usize;
        }

        let strtab = crate::strtab::Strtab::new(
            data.get(stroff as usize..(stroff as usize + strsize as usize))
                .ok_or_else(|| Error::Malformed("string table out of bounds".into()))?,
            0,
        );

        let mut indirect_table = Vec::with_capacity(nindirectsyms as usize);
        for i in 0..nindirectsyms {
            let off = indirectsymoff as usize + i as usize * 4;
            indirect_table.push(view.u32_at(off)?);
        }

        // First pass over the symbol table (spec §4.1 step 3).
        let mut symbol_atoms: Vec<(u32, Atom)> = Vec::new(); // (n_sect, atom)
        let mut symbol_by_index: HashMap<u32, String> = HashMap::new();
        let mut stabs = Vec::new();
        let mut has_old_objc_classes = false;

        for i in 0..nsyms {
            let off = symoff as usize + i as usize * view.nlist_size();
            let nlist = view.nlist(off)?;
            let name = strtab.get_at(nlist.n_strx as usize).unwrap_or("").to_string();
            symbol_by_index.insert(i, name.clone());

            if nlist.is_stab() {
                stabs.push(Stab {
                    atom: None,
                    n_type: nlist.n_type,
                    n_other: nlist.n_sect,
                    n_desc: nlist.n_desc,
                    n_value: nlist.n_value,
                    string: name,
                });
                continue;
            }

            let scope = if !nlist.is_ext() {
                Scope::TranslationUnit
            } else if nlist.is_pext() {
                Scope::LinkageUnit
            } else {
                Scope::Global
            };

            match nlist.type_bits() {
                t if t == N_SECT => {
                    let sect_index = nlist.n_sect; // 1-based
                    let section = sections
                        .get(sect_index as usize - 1)
                        .ok_or_else(|| Error::Malformed("symbol references unknown section".into()))?;
                    if section_attrs(section.flags) & S_ATTR_DEBUG != 0 {
                        continue;
                    }
                    let atom = Atom {
                        id: AtomId(0),
                        name: if name.is_empty() { None } else { Some(name) },
                        scope,
                        definition: DefinitionKind::Regular,
                        symbol_table: SymbolTableInclusion::In,
                        kind: AtomKind::Symbol,
                        size: 0, // filled in once neighbor offsets are known
                        alignment: Alignment::pow2(section.align as u8),
                        dont_dead_strip: section_attrs(section.flags) & S_ATTR_NO_DEAD_STRIP != 0,
                        segment: section.segname.clone(),
                        section: section.sectname.clone(),
                        must_remain_in_section: None,
                        follow_on: None,
                        content: ContentProvider::Bytes(Vec::new()),
                        references: Vec::new(),
                        reader: self.reader_id,
                        sort_order: 0,
                        line_info: Vec::new(),
                        section_id: None,
                        section_offset: nlist.n_value - section.addr,
                        address: nlist.n_value,
                    };
                    symbol_atoms.push((sect_index as u32, atom));
                }
                t if t == N_UNDF && nlist.n_value != 0 => {
                    let align_pow = ((nlist.n_desc >> 8) & 0x0f) as u8;
                    symbol_atoms.push((
                        0,
                        Atom {
                            id: AtomId(0),
                            name: Some(name),
                            scope,
                            definition: DefinitionKind::Tentative,
                            symbol_table: SymbolTableInclusion::In,
                            kind: AtomKind::Tentative,
                            size: nlist.n_value,
                            alignment: Alignment::pow2(align_pow),
                            dont_dead_strip: false,
                            segment: SEG_DATA.to_string(),
                            section: "__common".to_string(),
                            must_remain_in_section: None,
                            follow_on: None,
                            content: ContentProvider::ZeroFill,
                            references: Vec::new(),
                            reader: self.reader_id,
                            sort_order: 0,
                            line_info: Vec::new(),
                            section_id: None,
                            section_offset: 0,
                            address: 0,
                        },
                    ));
                }
                t if t == N_ABS => {
                    if name.starts_with(".objc_class_name_") {
                        has_old_objc_classes = true;
                    }
                }
                _ => {}
            }
        }

        // Sort SymbolAtoms within each section by address, detect
        // same-address aliases and turn later ones into zero-size
        // follow-on aliases of the first (spec §4.1 step 3).
        let mut by_section: HashMap<u32, Vec<Atom>> = HashMap::new();
        for (sect, atom) in symbol_atoms {
            by_section.entry(sect).or_default().push(atom);
        }
        for atoms in by_section.values_mut() {
            atoms.sort_by_key(|a| a.address);
        }

        let mut atoms: Vec<Atom> = Vec::new();
        let mut follow_on_pairs: Vec<(usize, usize)> = Vec::new();
        let mut cstring_cache: HashMap<String, usize> = HashMap::new();

        for (sect_index, section) in sections.iter().enumerate() {
            let sect_num = (sect_index + 1) as u32;
            let kind = section_type(section.flags);
            let section_bytes = data
                .get(section.offset as usize..(section.offset as usize + section.size as usize))
                .unwrap_or(&[]);

            match kind {
                S_CSTRING_LITERALS => {
                    let mut i = 0usize;
                    while i < section_bytes.len() {
                        let end = section_bytes[i..]
                            .iter()
                            .position(|&b| b == 0)
                            .map(|p| i + p)
                            .unwrap_or(section_bytes.len());
                        let s = String::from_utf8_lossy(&section_bytes[i..end]).to_string();
                        let name = format!("cstring={s}");
                        if let Some(&idx) = cstring_cache.get(&name) {
                            let _ = idx;
                        } else {
                            let content = section_bytes[i..(end + 1).min(section_bytes.len())].to_vec();
                            let size = content.len() as u64;
                            cstring_cache.insert(name.clone(), atoms.len());
                            atoms.push(Atom {
                                id: AtomId(0),
                                name: Some(name),
                                scope: Scope::TranslationUnit,
                                definition: DefinitionKind::Regular,
                                symbol_table: SymbolTableInclusion::NotIn,
                                kind: AtomKind::Anonymous,
                                size,
                                alignment: Alignment::BYTE,
                                dont_dead_strip: false,
                                segment: section.segname.clone(),
                                section: section.sectname.clone(),
                                must_remain_in_section: None,
                                follow_on: None,
                                content: ContentProvider::Bytes(content),
                                references: Vec::new(),
                                reader: self.reader_id,
                                sort_order: 0,
                                line_info: Vec::new(),
                                section_id: None,
                                section_offset: i as u64,
                                address: section.addr + i as u64,
                            });
                        }
                        i = end + 1;
                    }
                }
                S_NON_LAZY_SYMBOL_POINTERS | S_LAZY_SYMBOL_POINTERS | S_SYMBOL_STUBS => {
                    let elem_size = if kind == S_SYMBOL_STUBS {
                        section.reserved2 as u64
                    } else {
                        self.ctx.width.pointer_size()
                    };
                    if elem_size == 0 {
                        return Err(Error::Malformed("symbol stub section has zero element size".into()));
                    }
                    let count = section.size / elem_size;
                    let suffix = match kind {
                        S_NON_LAZY_SYMBOL_POINTERS => "$non_lazy_ptr",
                        S_LAZY_SYMBOL_POINTERS => "$lazy_ptr",
                        _ => "$stub",
                    };
                    let stub_kind = match kind {
                        S_NON_LAZY_SYMBOL_POINTERS => StubKind::NonLazyPointer,
                        S_LAZY_SYMBOL_POINTERS => StubKind::LazyPointer,
                        _ => StubKind::SymbolStub,
                    };
                    for i in 0..count {
                        let indirect_index = section.reserved1 as usize + i as usize;
                        let sym_index = indirect_table
                            .get(indirect_index)
                            .copied()
                            .unwrap_or(INDIRECT_SYMBOL_LOCAL);
                        let base_name = if sym_index & (INDIRECT_SYMBOL_LOCAL | INDIRECT_SYMBOL_ABS) != 0 {
                            format!("anon@{:#x}", section.addr + i * elem_size)
                        } else {
                            symbol_by_index.get(&sym_index).cloned().unwrap_or_default()
                        };
                        atoms.push(Atom {
                            id: AtomId(0),
                            name: Some(format!("{base_name}{suffix}")),
                            scope: Scope::TranslationUnit,
                            definition: DefinitionKind::Regular,
                            symbol_table: SymbolTableInclusion::NotIn,
                            kind: AtomKind::Stub(stub_kind),
                            size: elem_size,
                            alignment: Alignment::pow2(section.align as u8),
                            dont_dead_strip: false,
                            segment: section.segname.clone(),
                            section: section.sectname.clone(),
                            must_remain_in_section: None,
                            follow_on: None,
                            content: ContentProvider::Synthesized,
                            references: Vec::new(),
                            reader: self.reader_id,
                            sort_order: 0,
                            line_info: Vec::new(),
                            section_id: None,
                            section_offset: i * elem_size,
                            address: section.addr + i * elem_size,
                        });
                    }
                }
                S_4BYTE_LITERALS | S_8BYTE_LITERALS | S_16BYTE_LITERALS => {
                    let elem_size: u64 = match kind {
                        S_4BYTE_LITERALS => 4,
                        S_8BYTE_LITERALS => 8,
                        _ => 16,
                    };
                    let count = section.size / elem_size;
                    for i in 0..count {
                        let start = (i * elem_size) as usize;
                        let content = section_bytes
                            .get(start..start + elem_size as usize)
                            .unwrap_or(&[])
                            .to_vec();
                        atoms.push(Atom {
                            id: AtomId(0),
                            name: None,
                            scope: Scope::TranslationUnit,
                            definition: DefinitionKind::Regular,
                            symbol_table: SymbolTableInclusion::NotIn,
                            kind: AtomKind::Anonymous,
                            size: elem_size,
                            alignment: Alignment::pow2(section.align as u8),
                            dont_dead_strip: false,
                            segment: section.segname.clone(),
                            section: section.sectname.clone(),
                            must_remain_in_section: None,
                            follow_on: None,
                            content: ContentProvider::Bytes(content),
                            references: Vec::new(),
                            reader: self.reader_id,
                            sort_order: 0,
                            line_info: Vec::new(),
                            section_id: None,
                            section_offset: i * elem_size,
                            address: section.addr + i * elem_size,
                        });
                    }
                }
                S_ZEROFILL | S_GB_ZEROFILL => {
                    let existing = by_section.remove(&sect_num).unwrap_or_default();
                    fill_gaps_zero_fill(&mut atoms, existing, section, self.reader_id);
                }
                _ => {
                    let existing = by_section.remove(&sect_num).unwrap_or_default();
                    fill_gaps_regular(
                        &mut atoms,
                        &mut follow_on_pairs,
                        existing,
                        section,
                        section_bytes,
                        self.reader_id,
                        self.options.subsections_via_symbols,
                    );
                }
            }
        }

        // Relocation walk (spec §4.1 step 6), x86_64/i386 vanilla forms.
        for section in &sections {
            if section_attrs(section.flags) & S_ATTR_DEBUG != 0 || section.sectname.starts_with("__debug") {
                continue;
            }
            let mut i = 0u32;
            while i < section.nreloc {
                let off = section.reloff as usize + i as usize * 8;
                let reloc = view.relocation(off)?;
                if reloc.is_scattered() {
                    // Scattered relocations are a PowerPC/i386-only
                    // affordance; consumed in pairs where PAIR follows.
                    i += 1;
                    continue;
                }
                let to_target = if reloc.r_extern() {
                    let name = symbol_by_index.get(&reloc.r_symbolnum()).cloned().unwrap_or_default();
                    Target::Unbound(name)
                } else {
                    Target::Unbound(format!("@sect{}", reloc.r_symbolnum()))
                };
                if let Some(kind) = reloc_kind_for(self.ctx.arch, reloc.r_type(), reloc.r_pcrel()) {
                    let reference = Reference::simple(reloc.r_address as u32, kind, to_target, 0);
                    attach_reference_to_owner(&mut atoms, section, reloc.r_address as u64, reference);
                }
                i += 1;
            }
        }

        let debug_info_kind = if sections.iter().any(|s| s.sectname == "__debug_info") {
            DebugInfoKind::Dwarf
        } else if !stabs.is_empty() {
            DebugInfoKind::Stabs
        } else {
            DebugInfoKind::None
        };

        Ok(ParsedObject {
            atoms,
            stabs,
            debug_info_kind,
            follow_on_pairs,
            has_old_objc_classes,
        })
    }

    /// `-sectcreate segname sectname file`: wraps raw bytes as one
    /// anonymous atom with no references (spec SPEC_FULL §1
    /// supplement, grounded on `original_source/src/SectCreate.cpp`).
    pub fn atom_from_raw_section(&self, segname: &str, sectname: &str, bytes: Vec<u8>) -> Atom {
        let size = bytes.len() as u64;
        Atom {
            id: AtomId(0),
            name: None,
            scope: Scope::TranslationUnit,
            definition: DefinitionKind::Regular,
            symbol_table: SymbolTableInclusion::NotIn,
            kind: AtomKind::Anonymous,
            size,
            alignment: Alignment::BYTE,
            dont_dead_strip: true,
            segment: segname.to_string(),
            section: sectname.to_string(),
            must_remain_in_section: Some(sectname.to_string()),
            follow_on: None,
            content: ContentProvider::Bytes(bytes),
            references: Vec::new(),
            reader: self.reader_id,
            sort_order: 0,
            line_info: Vec::new(),
            section_id: None,
            section_offset: 0,
            address: 0,
        }
    }
}

fn cstr16(raw: &[u8; 16]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(16);
    String::from_utf8_lossy(&raw[..end]).to_string()
}

fn fill_gaps_regular(
    atoms: &mut Vec<Atom>,
    follow_on_pairs: &mut Vec<(usize, usize)>,
    mut existing: Vec<Atom>,
    section: &ParsedSection,
    section_bytes: &[u8],
    reader_id: ReaderId,
    subsections_via_symbols: bool,
) {
    // Stable, so two symbols sharing an address keep the order they
    // were declared in (spec §4.1 step 3: the first declared is the
    // alias target, any later ones become size-0 aliases of it).
    existing.sort_by_key(|a| a.address);
    let mut cursor = section.addr;
    let end = section.addr + section.size;
    let run_start = atoms.len();
    let mut primary_for_address: HashMap<u64, usize> = HashMap::new();
    for atom in existing {
        if atom.address > cursor {
            let gap = anonymous_gap(cursor, atom.address - cursor, section, section_bytes, reader_id);
            atoms.push(gap);
        }
        cursor = atom.address; // size fixed up below, once neighbors are known
        let idx = atoms.len();
        match primary_for_address.get(&atom.address) {
            Some(&primary_idx) => follow_on_pairs.push((idx, primary_idx)),
            None => {
                primary_for_address.insert(atom.address, idx);
            }
        }
        atoms.push(atom);
    }
    if cursor < end {
        atoms.push(anonymous_gap(cursor, end - cursor, section, section_bytes, reader_id));
    }
    // Fix up sizes: a same-address alias is pinned at zero; everything
    // else's size runs to the next *distinct* address (ties collapse
    // to zero width, so a naive "next atom" lookup would otherwise
    // hand a real atom's bytes to whichever alias happens to sit next
    // to it in the sorted run).
    let run_end = atoms.len();
    for idx in run_start..run_end {
        let this_addr = atoms[idx].address;
        if primary_for_address.get(&this_addr) != Some(&idx) {
            atoms[idx].size = 0;
            continue;
        }
        let next_addr = atoms[idx + 1..run_end]
            .iter()
            .map(|a| a.address)
            .find(|&addr| addr != this_addr)
            .unwrap_or(end);
        if atoms[idx].size == 0 {
            atoms[idx].size = next_addr - this_addr;
        }
        if let ContentProvider::Bytes(content) = &atoms[idx].content {
            if content.is_empty() && atoms[idx].size > 0 {
                let start = (this_addr - section.addr) as usize;
                let size = atoms[idx].size as usize;
                atoms[idx].content =
                    ContentProvider::Bytes(section_bytes.get(start..start + size).unwrap_or(&[]).to_vec());
            }
        }
    }
    // Implicit ordering preserved when not compiled with
    // subsections-via-symbols (spec §4.1 step 5): chain consecutive,
    // distinct-address atoms in this run with follow-on edges. Same-
    // address aliases already got their own edge above and are
    // skipped here, since they don't sit "after" their primary.
    if !subsections_via_symbols {
        for idx in run_start..run_end.saturating_sub(1) {
            if atoms[idx].address != atoms[idx + 1].address {
                follow_on_pairs.push((idx, idx + 1));
            }
        }
    }
}

fn anonymous_gap(
    addr: u64,
    size: u64,
    section: &ParsedSection,
    section_bytes: &[u8],
    reader_id: ReaderId,
) -> Atom {
    let start = (addr - section.addr) as usize;
    let content = section_bytes.get(start..start + size as usize).unwrap_or(&[]).to_vec();
    Atom {
        id: AtomId(0),
        name: None,
        scope: Scope::TranslationUnit,
        definition: DefinitionKind::Regular,
        symbol_table: SymbolTableInclusion::NotIn,
        kind: AtomKind::Anonymous,
        size,
        alignment: Alignment::BYTE,
        dont_dead_strip: false,
        segment: section.segname.clone(),
        section: section.sectname.clone(),
        must_remain_in_section: None,
        follow_on: None,
        content: ContentProvider::Bytes(content),
        references: Vec::new(),
        reader: reader_id,
        sort_order: 0,
        line_info: Vec::new(),
        section_id: None,
        section_offset: start as u64,
        address: addr,
    }
}

fn fill_gaps_zero_fill(atoms: &mut Vec<Atom>, mut existing: Vec<Atom>, section: &ParsedSection, reader_id: ReaderId) {
    existing.sort_by_key(|a| a.address);
    let end = section.addr + section.size;
    if existing.is_empty() {
        // No nlist entries at all for this section: it still reserves
        // `section.size` bytes of runtime BSS, so it still needs one
        // atom, or the section's space silently vanishes from the
        // atom graph (spec §4.1 step 5).
        if section.size > 0 {
            atoms.push(Atom {
                id: AtomId(0),
                name: None,
                scope: Scope::TranslationUnit,
                definition: DefinitionKind::Regular,
                symbol_table: SymbolTableInclusion::NotIn,
                kind: AtomKind::Anonymous,
                size: section.size,
                alignment: Alignment::BYTE,
                dont_dead_strip: false,
                segment: section.segname.clone(),
                section: section.sectname.clone(),
                must_remain_in_section: None,
                follow_on: None,
                content: ContentProvider::ZeroFill,
                references: Vec::new(),
                reader: reader_id,
                sort_order: 0,
                line_info: Vec::new(),
                section_id: None,
                section_offset: 0,
                address: section.addr,
            });
        }
        return;
    }
    let run_start = atoms.len();
    for mut atom in existing {
        atom.content = ContentProvider::ZeroFill;
        atoms.push(atom);
    }
    let run_end = atoms.len();
    for idx in run_start..run_end {
        if atoms[idx].size != 0 {
            continue;
        }
        let next_addr = atoms.get(idx + 1).map(|a| a.address).unwrap_or(end);
        atoms[idx].size = next_addr - atoms[idx].address;
    }
}

fn attach_reference_to_owner(atoms: &mut [Atom], section: &ParsedSection, address: u64, reference: Reference) {
    for atom in atoms.iter_mut() {
        if atom.segment == section.segname
            && atom.section == section.sectname
            && address >= atom.address
            && address < atom.address + atom.size.max(1)
        {
            let mut r = reference;
            r.offset = (address - atom.address) as u32;
            atom.references.push(r);
            return;
        }
    }
}

/// Maps a vanilla relocation's `(type, pcrel)` to a `ReferenceKind`,
/// dispatched by architecture family per spec §4.6's encoding table.
fn reloc_kind_for(arch: Arch, r_type: u8, pcrel: bool) -> Option<ReferenceKind> {
    match arch {
        Arch::X86_64 => match r_type {
            X86_64_RELOC_UNSIGNED => Some(ReferenceKind::Pointer),
            X86_64_RELOC_SIGNED | X86_64_RELOC_SIGNED_1 | X86_64_RELOC_SIGNED_2 | X86_64_RELOC_SIGNED_4 => {
                Some(ReferenceKind::PcRel32)
            }
            X86_64_RELOC_BRANCH => Some(ReferenceKind::BranchPcRel32),
            X86_64_RELOC_GOT_LOAD => Some(ReferenceKind::PcRel32GotLoad),
            X86_64_RELOC_GOT => Some(ReferenceKind::PcRel32Got),
            X86_64_RELOC_SUBTRACTOR => Some(ReferenceKind::PointerDiff64),
            _ => None,
        },
        Arch::X86 => {
            if pcrel {
                Some(ReferenceKind::PcRel32)
            } else {
                Some(ReferenceKind::Absolute32)
            }
        }
        Arch::Ppc | Arch::Ppc64 => match r_type {
            PPC_RELOC_BR24 => Some(ReferenceKind::Branch24),
            PPC_RELOC_BR14 => Some(ReferenceKind::Branch14),
            PPC_RELOC_HI16 => Some(ReferenceKind::AbsHigh16),
            PPC_RELOC_HA16 => Some(ReferenceKind::AbsHigh16AddLow),
            PPC_RELOC_LO16 => Some(ReferenceKind::AbsLow16),
            PPC_RELOC_LO14 => Some(ReferenceKind::AbsLow14),
            PPC_RELOC_VANILLA => Some(ReferenceKind::Pointer),
            _ => None,
        },
        Arch::Arm | Arch::Arm64 => match r_type {
            ARM_RELOC_BR24 => Some(ReferenceKind::ArmBranch24),
            ARM_THUMB_RELOC_BR22 => Some(ReferenceKind::ThumbBranch22),
            ARM_RELOC_VANILLA => Some(ReferenceKind::Pointer),
            _ => None,
        },
    }
}
