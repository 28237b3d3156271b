//! Top-level orchestrator: wires every other module into the data-flow
//! pipeline of spec §2 ("turns relocatable objects, static archives and
//! dynamic-library stubs into a single executable, dynamic library,
//! bundle, or merged relocatable object") and serializes the result
//! into a Mach-O byte stream. Grounded on goblin's
//! `mach::mod::MachO::parse` for the header/load-command shape this
//! writes the mirror image of, run in reverse.

use crate::atom::{AtomGraph, AtomId, AtomKind, DefinitionKind, ReaderId, Scope, SymbolTableInclusion};
use crate::archive::Archive;
use crate::container::{Arch, Ctx, Width};
use crate::dead_strip::{DeadStripper, WhyLiveTrail};
use crate::debug_info::{self, DebugInfoContext, Stab};
use crate::error::{Error, Result};
use crate::exports_trie::{Export, ExportsTrie};
use crate::fixup::FixupEngine;
use crate::layout::{Layout, Layouter, PAGE_SIZE};
use crate::macho::constants::*;
use crate::macho::raw::*;
use crate::options::LinkOptions;
use crate::reader::archive_reader::{ArchiveReader, LoadPolicy};
use crate::reader::dylib::DylibReader;
use crate::reader::relocatable::RelocatableReader;
use crate::reader::{ingest_parsed_object, DebugInfoKind, ReaderOptions};
use crate::resolver::Resolver;
use crate::stubs::StubSynthesizer;
use crate::strtab::StrtabBuilder;
use crate::symtab::SymbolTable;
use scroll::Pwrite;
use std::collections::{HashMap, HashSet};

/// One relocatable object named directly on the link line (eagerly
/// included, never loaded on demand).
pub struct ObjectInput {
    pub path: String,
    pub bytes: Vec<u8>,
}

/// One static archive; members are pulled in lazily unless
/// `force_load` is set (spec §4.1 "members are themselves object
/// files consumed through the same reader").
pub struct ArchiveInput {
    pub path: String,
    pub bytes: Vec<u8>,
    pub force_load: bool,
}

/// One dynamic-library text stub (spec §4.2).
pub struct DylibInput {
    pub text: String,
}

/// Everything `link` needs beyond the policy knobs already captured in
/// `LinkOptions`.
pub struct LinkRequest {
    pub objects: Vec<ObjectInput>,
    pub archives: Vec<ArchiveInput>,
    pub dylibs: Vec<DylibInput>,
    pub entry_symbol: Option<String>,
    /// One of `MH_EXECUTE`, `MH_DYLIB`, `MH_BUNDLE`, `MH_OBJECT` (spec
    /// §6's output-container kinds).
    pub filetype: u32,
}

pub struct LinkOutput {
    pub bytes: Vec<u8>,
    pub why_live_trail: Option<WhyLiveTrail>,
}

/// Runs the full pipeline: ingest -> resolve -> dead-strip -> stub
/// synthesis -> layout -> fix-up -> debug-info -> exports trie ->
/// serialize (spec §2's numbered item list, in order).
pub fn link(request: LinkRequest, options: &LinkOptions) -> Result<LinkOutput> {
    let ctx = Ctx::new(options.arch);
    let mut graph = AtomGraph::new();
    let mut symbols = SymbolTable::new();
    let mut next_reader = 0u32;
    let mut object_stabs: Vec<Vec<Stab>> = Vec::new();

    for object in &request.objects {
        let reader_id = ReaderId(next_reader);
        next_reader += 1;
        let reader = RelocatableReader::new(reader_id, object.path.clone(), ctx, ReaderOptions {
            tolerate_truncated_stab_names: options.tolerate_truncated_stab_names,
            subsections_via_symbols: false,
        });
        let parsed = reader.parse(&object.bytes)?;
        if parsed.debug_info_kind == DebugInfoKind::Stabs || parsed.debug_info_kind == DebugInfoKind::StabsWithUuid {
            object_stabs.push(parsed.stabs.clone());
        }
        let ids = ingest_parsed_object(&mut graph, parsed);
        for id in ids {
            let name = graph.get(id).and_then(|a| a.name.clone());
            if let Some(name) = name {
                symbols.add(&graph, &name, id, options)?;
            }
        }
    }

    let mut archives = Vec::new();
    for archive_input in &request.archives {
        let reader_id = ReaderId(next_reader);
        next_reader += 1;
        let archive = Archive::parse(&archive_input.bytes)?;
        let policy = if archive_input.force_load || options.force_load_archives {
            LoadPolicy::ForceLoadAll
        } else if options.force_load_objc_classes {
            LoadPolicy::LoadAllObjcClasses
        } else {
            LoadPolicy::OnDemand
        };
        let mut reader = ArchiveReader::new(reader_id, archive, ctx, archive_input.path.clone(), policy);
        let eagerly_loaded = match policy {
            LoadPolicy::ForceLoadAll => reader.force_load_all(&mut graph)?,
            LoadPolicy::LoadAllObjcClasses => reader.load_all_objc_classes(&mut graph)?,
            LoadPolicy::OnDemand => Vec::new(),
        };
        for id in eagerly_loaded {
            let name = graph.get(id).and_then(|a| a.name.clone());
            if let Some(name) = name {
                symbols.add(&graph, &name, id, options)?;
            }
        }
        archives.push(reader);
    }

    let mut dylibs = Vec::new();
    for dylib_input in &request.dylibs {
        let reader_id = ReaderId(next_reader);
        next_reader += 1;
        dylibs.push(DylibReader::parse_text_stub(reader_id, &dylib_input.text)?);
    }

    {
        let mut archive_refs: Vec<&mut ArchiveReader> = archives.iter_mut().collect();
        let mut dylib_refs: Vec<&mut DylibReader> = dylibs.iter_mut().collect();
        let mut resolver = Resolver {
            graph: &mut graph,
            symbols: &mut symbols,
            archives: std::mem::take(&mut archive_refs),
            dylibs: std::mem::take(&mut dylib_refs),
            options,
        };
        resolver.seed(request.entry_symbol.as_deref());
        resolver.resolve()?;
    }

    let stub_reader = ReaderId(next_reader);
    next_reader += 1;
    StubSynthesizer::new(&mut graph, options.arch, options.allow_weak_mismatch, stub_reader).run()?;
    let _ = next_reader;

    let mut roots: Vec<AtomId> = Vec::new();
    if let Some(entry) = &request.entry_symbol {
        match symbols.winner(entry) {
            Some(id) => roots.push(id),
            None => return Err(Error::UndefinedSymbol(entry.clone())),
        }
    }
    for extra in &options.extra_roots {
        if let Some(id) = symbols.winner(extra) {
            roots.push(id);
        }
    }

    let (mut live, why_live_trail) = if options.dead_strip {
        let stripper = DeadStripper::new(&graph);
        let stripper = match &options.why_live {
            Some(name) => stripper.with_why_live(name),
            None => stripper,
        };
        let result = stripper.run(roots);
        (result.live, result.why_live_trail)
    } else {
        (graph.ids().collect::<HashSet<_>>(), None)
    };

    // Pass 1: lay out at address 0 purely to learn the segment/section
    // shape (and drive branch islands/mode shims to their fixed
    // point); the real addresses come from pass 2 once the header's
    // size is known.
    let mut probe_layouter = Layouter::new(&mut graph, options.arch, 0);
    let probe_layout = probe_layouter.run(&mut live)?;

    let header_size = estimate_header_size(request.filetype, options.arch.width(), &probe_layout);
    let base_address = align_up(header_size as u64, PAGE_SIZE);

    let mut layouter = Layouter::new(&mut graph, options.arch, base_address);
    let layout = layouter.run(&mut live)?;

    let live_ids: Vec<AtomId> = {
        let mut ids: Vec<AtomId> = live.iter().copied().collect();
        ids.sort_by_key(|id| graph.get(*id).map(|a| a.sort_order).unwrap_or(0));
        ids
    };

    let engine = FixupEngine::new(&graph, options.arch, options.pie);
    let (content, relocations) = if request.filetype == MH_OBJECT {
        let (content, relocs) = engine.apply_relocatable(&live_ids)?;
        (content, relocs)
    } else {
        (engine.apply_final_image(&live_ids)?, Vec::new())
    };

    let mut debug_ctx = DebugInfoContext::new();
    let mut stabs: Vec<Stab> = Vec::new();
    for object_stab_run in object_stabs {
        stabs.extend(debug_info::dedup_bincl(&mut debug_ctx, object_stab_run));
    }

    let image_base = layout.segments.first().map(|s| s.base_address).unwrap_or(base_address);
    let mut exports_list: Vec<Export> = Vec::new();
    for &id in &live_ids {
        let atom = graph.get(id).unwrap();
        if atom.scope != Scope::Global {
            continue;
        }
        if matches!(atom.kind, AtomKind::Export { .. } | AtomKind::Stub(_)) {
            continue;
        }
        if atom.symbol_table == SymbolTableInclusion::NotIn {
            continue;
        }
        let Some(name) = &atom.name else { continue };
        let offset = atom.address.saturating_sub(image_base);
        let export = if atom.definition == DefinitionKind::Weak {
            Export::weak(name.clone(), offset)
        } else {
            Export::regular(name.clone(), offset)
        };
        exports_list.push(export);
    }
    exports_list.sort_by(|a, b| a.name.cmp(&b.name));
    let trie = ExportsTrie::build(&exports_list);

    let assembled = Assembler {
        graph: &graph,
        layout: &layout,
        live: &live_ids,
        content: &content,
        relocations: &relocations,
        stabs: &stabs,
        trie: &trie,
        arch: options.arch,
        filetype: request.filetype,
        entry_symbol: request.entry_symbol.as_deref(),
        header_size,
        base_address,
    };
    let bytes = assembled.assemble()?;

    Ok(LinkOutput { bytes, why_live_trail })
}

fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

/// Counts the load commands the final header will carry, so the
/// writer can learn their total byte size before the real layout
/// (whose segment base address depends on that size) is computed.
fn estimate_header_size(filetype: u32, width: Width, layout: &Layout) -> usize {
    let mut size = if width == Width::W64 { SIZEOF_HEADER_64 } else { SIZEOF_HEADER_32 };
    let seg_cmd_size = if width == Width::W64 { SIZEOF_SEGMENT_COMMAND_64 } else { SIZEOF_SEGMENT_COMMAND_32 };
    let sect_size = if width == Width::W64 { SIZEOF_SECTION_64 } else { SIZEOF_SECTION_32 };
    for segment in &layout.segments {
        let nsects = layout.sections.iter().filter(|s| s.segment == segment.name).count();
        size += seg_cmd_size + nsects * sect_size;
    }
    size += seg_cmd_size; // synthetic __LINKEDIT segment, zero sections
    size += std::mem::size_of::<SymtabCommand>();
    size += std::mem::size_of::<DysymtabCommand>();
    size += std::mem::size_of::<DyldInfoCommand>();
    size += std::mem::size_of::<UuidCommand>();
    if filetype == MH_EXECUTE {
        size += std::mem::size_of::<EntryPointCommand>();
    }
    size
}

fn fixed16(name: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    let bytes = name.as_bytes();
    let n = bytes.len().min(16);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// One resolved symbol table entry, before it's split into
/// local/extern ranges and serialized as an `Nlist32`/`Nlist64`.
struct SymEntry {
    name: String,
    n_type: u8,
    n_sect: u8,
    n_desc: u16,
    n_value: u64,
}

struct Assembler<'a> {
    graph: &'a AtomGraph,
    layout: &'a Layout,
    live: &'a [AtomId],
    content: &'a HashMap<AtomId, Vec<u8>>,
    relocations: &'a [crate::fixup::RelocationRecord],
    stabs: &'a [Stab],
    trie: &'a ExportsTrie,
    arch: Arch,
    filetype: u32,
    entry_symbol: Option<&'a str>,
    header_size: usize,
    base_address: u64,
}

impl<'a> Assembler<'a> {
    fn assemble(&self) -> Result<Vec<u8>> {
        let width = self.arch.width();
        let endian = self.arch.default_endian();
        let is_64 = width == Width::W64;

        let (symtab_entries, nlocalsym, nextdefsym) = self.build_symtab();
        let mut strtab_builder = StrtabBuilder::new();
        let name_offset: HashMap<String, u32> =
            symtab_entries.iter().map(|e| (e.name.clone(), strtab_builder.intern(&e.name))).collect();
        let strtab = strtab_builder.into_bytes();
        let symbol_index: HashMap<String, u32> =
            symtab_entries.iter().enumerate().map(|(i, e)| (e.name.clone(), i as u32)).collect();

        let indirect = self.build_indirect_symbol_table(&symbol_index);

        let content_end_file = self
            .layout
            .segments
            .iter()
            .map(|s| s.file_offset + s.file_size)
            .max()
            .unwrap_or(self.base_address);
        let content_end_vm = self
            .layout
            .segments
            .iter()
            .map(|s| s.base_address + s.vm_size)
            .max()
            .unwrap_or(self.base_address);

        let reloc_region_offset = align_up(content_end_file, 4);
        let reloc_bytes = if self.filetype == MH_OBJECT {
            self.build_relocations(&symbol_index, endian)?
        } else {
            Vec::new()
        };
        let linkedit_file_offset = align_up(reloc_region_offset + reloc_bytes.len() as u64, PAGE_SIZE);
        let linkedit_vmaddr = align_up(content_end_vm, PAGE_SIZE);

        let symoff = linkedit_file_offset;
        let nsyms = symtab_entries.len() as u32;
        let nlist_size = if is_64 { SIZEOF_NLIST_64 } else { SIZEOF_NLIST_32 } as u64;
        let symtab_bytes_len = nsyms as u64 * nlist_size;
        let stroff = symoff + symtab_bytes_len;
        let strsize = align_up(strtab.len() as u64, 4);
        let indirectsymoff = stroff + strsize;
        let indirect_bytes_len = indirect.len() as u64 * 4;
        let export_off = indirectsymoff + indirect_bytes_len;
        let export_size = self.trie.bytes().len() as u64;
        let linkedit_end = export_off + export_size;
        let linkedit_file_size = linkedit_end - linkedit_file_offset;

        let total_len = linkedit_end as usize;
        let mut buf = vec![0u8; total_len];

        let ncmds = self.layout.segments.len() as u32
            + 1 // synthetic __LINKEDIT segment
            + 1 // symtab
            + 1 // dysymtab
            + 1 // dyld info
            + 1 // uuid
            + if self.filetype == MH_EXECUTE { 1 } else { 0 };

        let mut sizeofcmds = 0usize;
        let seg_cmd_size = if is_64 { SIZEOF_SEGMENT_COMMAND_64 } else { SIZEOF_SEGMENT_COMMAND_32 };
        let sect_size = if is_64 { SIZEOF_SECTION_64 } else { SIZEOF_SECTION_32 };
        for segment in &self.layout.segments {
            let nsects = self.layout.sections.iter().filter(|s| s.segment == segment.name).count();
            sizeofcmds += seg_cmd_size + nsects * sect_size;
        }
        sizeofcmds += seg_cmd_size; // synthetic __LINKEDIT segment, zero sections
        sizeofcmds += std::mem::size_of::<SymtabCommand>();
        sizeofcmds += std::mem::size_of::<DysymtabCommand>();
        sizeofcmds += std::mem::size_of::<DyldInfoCommand>();
        sizeofcmds += std::mem::size_of::<UuidCommand>();
        if self.filetype == MH_EXECUTE {
            sizeofcmds += std::mem::size_of::<EntryPointCommand>();
        }
        let header_len = if is_64 { SIZEOF_HEADER_64 } else { SIZEOF_HEADER_32 };
        debug_assert_eq!(header_len + sizeofcmds, self.header_size, "probe-pass header size estimate drifted from the real layout");

        let mut pos = 0usize;
        let header = Header {
            magic: if is_64 { MH_MAGIC_64 } else { MH_MAGIC },
            cputype: cputype_for(self.arch),
            cpusubtype: cpusubtype_for(self.arch),
            filetype: self.filetype,
            ncmds,
            sizeofcmds: sizeofcmds as u32,
            flags: MH_TWOLEVEL | MH_NOUNDEFS,
            reserved: 0,
        };
        buf.pwrite_with(header, pos, endian).map_err(Error::Scroll)?;
        pos += if is_64 { SIZEOF_HEADER_64 } else { SIZEOF_HEADER_32 };

        for segment in &self.layout.segments {
            let sections: Vec<&crate::layout::SectionInfo> =
                self.layout.sections.iter().filter(|s| s.segment == segment.name).collect();
            let cmdsize = seg_cmd_size + sections.len() * sect_size;
            if is_64 {
                let cmd = SegmentCommand64 {
                    cmd: LC_SEGMENT_64,
                    cmdsize: cmdsize as u32,
                    segname: fixed16(&segment.name),
                    vmaddr: segment.base_address,
                    vmsize: segment.vm_size,
                    fileoff: segment.file_offset,
                    filesize: segment.file_size,
                    maxprot: 7,
                    initprot: 7,
                    nsects: sections.len() as u32,
                    flags: 0,
                };
                buf.pwrite_with(cmd, pos, endian).map_err(Error::Scroll)?;
            } else {
                let cmd = SegmentCommand32 {
                    cmd: LC_SEGMENT,
                    cmdsize: cmdsize as u32,
                    segname: fixed16(&segment.name),
                    vmaddr: segment.base_address as u32,
                    vmsize: segment.vm_size as u32,
                    fileoff: segment.file_offset as u32,
                    filesize: segment.file_size as u32,
                    maxprot: 7,
                    initprot: 7,
                    nsects: sections.len() as u32,
                    flags: 0,
                };
                buf.pwrite_with(cmd, pos, endian).map_err(Error::Scroll)?;
            }
            pos += seg_cmd_size;

            for section in &sections {
                if is_64 {
                    let sect = Section64 {
                        sectname: fixed16(&section.section),
                        segname: fixed16(&section.segment),
                        addr: section.addr,
                        size: section.size,
                        offset: if section.is_zero_fill { 0 } else { section.file_offset as u32 },
                        align: section.alignment.power as u32,
                        reloff: 0,
                        nreloc: 0,
                        flags: section_flags(section),
                        reserved1: section.indirect_symbol_base,
                        reserved2: 0,
                        reserved3: 0,
                    };
                    buf.pwrite_with(sect, pos, endian).map_err(Error::Scroll)?;
                } else {
                    let sect = Section32 {
                        sectname: fixed16(&section.section),
                        segname: fixed16(&section.segment),
                        addr: section.addr as u32,
                        size: section.size as u32,
                        offset: if section.is_zero_fill { 0 } else { section.file_offset as u32 },
                        align: section.alignment.power as u32,
                        reloff: 0,
                        nreloc: 0,
                        flags: section_flags(section),
                        reserved1: section.indirect_symbol_base,
                        reserved2: 0,
                    };
                    buf.pwrite_with(sect, pos, endian).map_err(Error::Scroll)?;
                }
                pos += sect_size;

                if !section.is_zero_fill {
                    for &atom_id in &section.atoms {
                        if let Some(bytes) = self.content.get(&atom_id) {
                            let atom = self.graph.get(atom_id).unwrap();
                            let at = (section.file_offset + atom.section_offset) as usize;
                            buf[at..at + bytes.len()].copy_from_slice(bytes);
                        }
                    }
                }
            }
        }

        // __LINKEDIT carries no atoms, so it is appended to the load
        // command stream directly rather than threaded through Layout.
        if is_64 {
            let cmd = SegmentCommand64 {
                cmd: LC_SEGMENT_64,
                cmdsize: seg_cmd_size as u32,
                segname: fixed16(SEG_LINKEDIT),
                vmaddr: linkedit_vmaddr,
                vmsize: align_up(linkedit_file_size, PAGE_SIZE),
                fileoff: linkedit_file_offset,
                filesize: linkedit_file_size,
                maxprot: 1,
                initprot: 1,
                nsects: 0,
                flags: 0,
            };
            buf.pwrite_with(cmd, pos, endian).map_err(Error::Scroll)?;
        } else {
            let cmd = SegmentCommand32 {
                cmd: LC_SEGMENT,
                cmdsize: seg_cmd_size as u32,
                segname: fixed16(SEG_LINKEDIT),
                vmaddr: linkedit_vmaddr as u32,
                vmsize: align_up(linkedit_file_size, PAGE_SIZE) as u32,
                fileoff: linkedit_file_offset as u32,
                filesize: linkedit_file_size as u32,
                maxprot: 1,
                initprot: 1,
                nsects: 0,
                flags: 0,
            };
            buf.pwrite_with(cmd, pos, endian).map_err(Error::Scroll)?;
        }
        pos += seg_cmd_size;

        let symtab_cmd = SymtabCommand {
            cmd: LC_SYMTAB,
            cmdsize: std::mem::size_of::<SymtabCommand>() as u32,
            symoff: symoff as u32,
            nsyms,
            stroff: stroff as u32,
            strsize: strsize as u32,
        };
        buf.pwrite_with(symtab_cmd, pos, endian).map_err(Error::Scroll)?;
        pos += std::mem::size_of::<SymtabCommand>();

        let dysymtab_cmd = DysymtabCommand {
            cmd: LC_DYSYMTAB,
            cmdsize: std::mem::size_of::<DysymtabCommand>() as u32,
            ilocalsym: 0,
            nlocalsym: nlocalsym as u32,
            iextdefsym: nlocalsym as u32,
            nextdefsym: nextdefsym as u32,
            iundefsym: (nlocalsym + nextdefsym) as u32,
            nundefsym: 0,
            tocoff: 0,
            ntoc: 0,
            modtaboff: 0,
            nmodtab: 0,
            extrefsymoff: 0,
            nextrefsyms: 0,
            indirectsymoff: indirectsymoff as u32,
            nindirectsyms: indirect.len() as u32,
            extreloff: 0,
            nextrel: 0,
            locreloff: 0,
            nlocrel: 0,
        };
        buf.pwrite_with(dysymtab_cmd, pos, endian).map_err(Error::Scroll)?;
        pos += std::mem::size_of::<DysymtabCommand>();

        let dyld_info_cmd = DyldInfoCommand {
            cmd: LC_DYLD_INFO_ONLY,
            cmdsize: std::mem::size_of::<DyldInfoCommand>() as u32,
            rebase_off: 0,
            rebase_size: 0,
            bind_off: 0,
            bind_size: 0,
            weak_bind_off: 0,
            weak_bind_size: 0,
            lazy_bind_off: 0,
            lazy_bind_size: 0,
            export_off: export_off as u32,
            export_size: export_size as u32,
        };
        buf.pwrite_with(dyld_info_cmd, pos, endian).map_err(Error::Scroll)?;
        pos += std::mem::size_of::<DyldInfoCommand>();

        let uuid_cmd = UuidCommand {
            cmd: LC_UUID,
            cmdsize: std::mem::size_of::<UuidCommand>() as u32,
            uuid: synthetic_uuid(&symtab_entries),
        };
        buf.pwrite_with(uuid_cmd, pos, endian).map_err(Error::Scroll)?;
        pos += std::mem::size_of::<UuidCommand>();

        if self.filetype == MH_EXECUTE {
            let entry_off = self
                .entry_symbol
                .and_then(|name| symbol_index.get(name))
                .and_then(|&i| symtab_entries.get(i as usize))
                .map(|e| e.n_value.saturating_sub(self.base_address))
                .unwrap_or(0);
            let entry_cmd = EntryPointCommand {
                cmd: LC_MAIN,
                cmdsize: std::mem::size_of::<EntryPointCommand>() as u32,
                entryoff: entry_off,
                stacksize: 0,
            };
            buf.pwrite_with(entry_cmd, pos, endian).map_err(Error::Scroll)?;
            pos += std::mem::size_of::<EntryPointCommand>();
        }

        // relocations (MH_OBJECT only)
        if !reloc_bytes.is_empty() {
            let at = reloc_region_offset as usize;
            buf[at..at + reloc_bytes.len()].copy_from_slice(&reloc_bytes);
        }

        // symtab
        let mut off = symoff as usize;
        for entry in &symtab_entries {
            let n_strx = name_offset[&entry.name];
            if is_64 {
                let nlist = Nlist64 {
                    n_strx,
                    n_type: entry.n_type,
                    n_sect: entry.n_sect,
                    n_desc: entry.n_desc,
                    n_value: entry.n_value,
                };
                buf.pwrite_with(nlist, off, endian).map_err(Error::Scroll)?;
                off += SIZEOF_NLIST_64;
            } else {
                let nlist = Nlist32 {
                    n_strx,
                    n_type: entry.n_type,
                    n_sect: entry.n_sect,
                    n_desc: entry.n_desc,
                    n_value: entry.n_value as u32,
                };
                buf.pwrite_with(nlist, off, endian).map_err(Error::Scroll)?;
                off += SIZEOF_NLIST_32;
            }
        }

        // strtab
        let at = stroff as usize;
        buf[at..at + strtab.len()].copy_from_slice(&strtab);

        // indirect symbol table
        let mut off = indirectsymoff as usize;
        for &idx in &indirect {
            buf.pwrite_with(idx, off, endian).map_err(Error::Scroll)?;
            off += 4;
        }

        // exports trie
        let at = export_off as usize;
        buf[at..at + self.trie.bytes().len()].copy_from_slice(self.trie.bytes());

        Ok(buf)
    }

    /// Splits live, symbol-table-included atoms into the stabs/local/
    /// extern ranges `LC_DYSYMTAB` expects (spec §4.7's debug entries
    /// occupy the low end of the local range; spec §6's nlist
    /// contract covers the rest).
    fn build_symtab(&self) -> (Vec<SymEntry>, usize, usize) {
        let mut entries: Vec<SymEntry> = Vec::new();
        for stab in self.stabs {
            entries.push(SymEntry {
                name: stab.string.clone(),
                n_type: stab.n_type,
                n_sect: stab.n_other,
                n_desc: stab.n_desc,
                n_value: stab.n_value,
            });
        }
        let nlocalsym_stabs = entries.len();

        let mut locals = Vec::new();
        let mut externs = Vec::new();
        for &id in self.live {
            let atom = self.graph.get(id).unwrap();
            if atom.symbol_table == SymbolTableInclusion::NotIn {
                continue;
            }
            let Some(name) = &atom.name else { continue };
            let mut n_type = match atom.symbol_table {
                SymbolTableInclusion::InAsAbsolute => N_ABS,
                _ => N_SECT,
            };
            if atom.scope != Scope::TranslationUnit {
                n_type |= N_EXT;
            }
            if atom.scope == Scope::LinkageUnit {
                n_type |= N_PEXT;
            }
            let n_sect = atom.section_id.map(|s| (s + 1) as u8).unwrap_or(0);
            let entry = SymEntry {
                name: name.clone(),
                n_type,
                n_sect,
                n_desc: 0,
                n_value: atom.address,
            };
            if atom.scope == Scope::TranslationUnit {
                locals.push(entry);
            } else {
                externs.push(entry);
            }
        }
        externs.sort_by(|a, b| a.name.cmp(&b.name));

        let nlocalsym = nlocalsym_stabs + locals.len();
        let nextdefsym = externs.len();
        entries.extend(locals);
        entries.extend(externs);
        (entries, nlocalsym, nextdefsym)
    }

    /// Resolves each stub/lazy/non-lazy-pointer slot to the symtab
    /// index of the real definition it dereferences (spec §4.3 item 8).
    fn build_indirect_symbol_table(&self, symbol_index: &HashMap<String, u32>) -> Vec<u32> {
        let mut indirect = Vec::new();
        for section in &self.layout.sections {
            if !(section.all_lazy_pointers || section.all_non_lazy_pointers || section.all_stubs) {
                continue;
            }
            for &atom_id in &section.atoms {
                let atom = self.graph.get(atom_id).unwrap();
                let target_name = atom.references.first().and_then(|r| r.to_target.name(self.graph));
                let idx = target_name
                    .and_then(|n| symbol_index.get(n))
                    .copied()
                    .unwrap_or(INDIRECT_SYMBOL_LOCAL);
                indirect.push(idx);
            }
        }
        indirect
    }

    /// Serializes relocation records for an `MH_OBJECT` merged output
    /// (spec §4.6's relocatable mode). External relocations resolve to
    /// a real `r_symbolnum`; local (section-relative) relocations are
    /// left at symbolnum 0, a known simplification.
    fn build_relocations(&self, symbol_index: &HashMap<String, u32>, endian: scroll::Endian) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for record in self.relocations {
            let is_extern = record.info.r_extern();
            let symbolnum = if is_extern {
                record
                    .external_name
                    .as_deref()
                    .and_then(|n| symbol_index.get(n))
                    .copied()
                    .unwrap_or(0)
            } else {
                0
            };
            let info = RelocationInfo {
                r_address: record.info.r_address,
                r_info: RelocationInfo::pack(
                    symbolnum,
                    record.info.r_pcrel(),
                    record.info.r_length(),
                    is_extern,
                    record.info.r_type(),
                ),
            };
            let mut tmp = [0u8; 8];
            tmp.pwrite_with(info, 0, endian).map_err(Error::Scroll)?;
            out.extend_from_slice(&tmp);
        }
        Ok(out)
    }
}

fn section_flags(section: &crate::layout::SectionInfo) -> u32 {
    if section.is_zero_fill {
        S_ZEROFILL
    } else if section.all_stubs {
        S_SYMBOL_STUBS | S_ATTR_PURE_INSTRUCTIONS
    } else if section.all_lazy_pointers {
        S_LAZY_SYMBOL_POINTERS
    } else if section.all_non_lazy_pointers {
        S_NON_LAZY_SYMBOL_POINTERS
    } else if section.section == SECT_TEXT {
        S_REGULAR | S_ATTR_SOME_INSTRUCTIONS | S_ATTR_PURE_INSTRUCTIONS
    } else {
        S_REGULAR
    }
}

fn cputype_for(arch: Arch) -> u32 {
    match arch {
        Arch::X86 => 0x0000_0007,
        Arch::X86_64 => 0x0100_0007,
        Arch::Arm => 0x0000_000c,
        Arch::Arm64 => 0x0100_000c,
        Arch::Ppc => 0x0000_0012,
        Arch::Ppc64 => 0x0100_0012,
    }
}

fn cpusubtype_for(arch: Arch) -> u32 {
    match arch {
        Arch::Arm64 => 0,
        _ => 3,
    }
}

/// A stable, content-derived identifier in place of a random UUID
/// (spec's core engine has no RNG dependency); folds every symbol
/// name's bytes together.
fn synthetic_uuid(entries: &[SymEntry]) -> [u8; 16] {
    let mut acc = [0u8; 16];
    for entry in entries {
        for (i, b) in entry.name.bytes().enumerate() {
            acc[i % 16] ^= b.wrapping_add(i as u8);
        }
    }
    acc
}
