//! Layouter: partitions live atoms into segments/sections and assigns
//! addresses and file offsets (spec §4.5), driving the branch-island
//! and ARM mode-shim passes in `islands` to a fixed point.

use crate::atom::{Alignment, AtomGraph, AtomId, AtomKind, StubKind};
use crate::container::Arch;
use crate::error::{Error, Result};
use crate::islands;
use std::collections::{HashMap, HashSet};

pub const PAGE_SIZE: u64 = 0x1000;
/// PowerPC branch-island region width (spec §4.5, Open Question
/// resolution in DESIGN.md: no configurable override).
pub const ISLAND_REGION_SIZE: u64 = 15 * 1024 * 1024;
const MAX_ISLAND_ITERATIONS: u32 = 8;

#[derive(Debug, Clone)]
pub struct SegmentInfo {
    pub name: String,
    pub ordinal: u32,
    pub base_address: u64,
    pub vm_size: u64,
    pub file_offset: u64,
    pub file_size: u64,
    pub fixed_address: bool,
}

#[derive(Debug, Clone)]
pub struct SectionInfo {
    pub segment: String,
    pub section: String,
    pub alignment: Alignment,
    pub is_zero_fill: bool,
    pub addr: u64,
    pub file_offset: u64,
    pub size: u64,
    pub atoms: Vec<AtomId>,
    pub all_lazy_pointers: bool,
    pub all_non_lazy_pointers: bool,
    pub all_stubs: bool,
    pub indirect_symbol_base: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub segments: Vec<SegmentInfo>,
    pub sections: Vec<SectionInfo>,
}

fn segment_ordinal(name: &str) -> u32 {
    match name {
        "__PAGEZERO" => 1,
        "__TEXT" => 2,
        "__DATA" => 3,
        "__OBJC" => 4,
        "__LINKEDIT" => u32::MAX,
        _ => 5,
    }
}

pub struct Layouter<'a> {
    graph: &'a mut AtomGraph,
    arch: Arch,
    base_address: u64,
}

impl<'a> Layouter<'a> {
    pub fn new(graph: &'a mut AtomGraph, arch: Arch, base_address: u64) -> Self {
        Layouter { graph, arch, base_address }
    }

    /// Runs layout to a fixed point, inserting PowerPC branch islands
    /// and ARM thumb/arm shims as needed (spec §4.5).
    pub fn run(&mut self, live: &mut HashSet<AtomId>) -> Result<Layout> {
        let mut layout = self.compute_layout(live);
        let mut island_memo = HashMap::new();
        let mut shim_memo = HashMap::new();
        for _ in 0..MAX_ISLAND_ITERATIONS {
            let mut changed = false;
            if self.arch.uses_branch_islands() {
                changed |= islands::insert_branch_islands(self.graph, &layout, live, self.arch, &mut island_memo);
            }
            if self.arch.uses_mode_shims() {
                changed |= islands::insert_mode_shims(self.graph, &layout, live, &mut shim_memo);
            }
            if !changed {
                break;
            }
            layout = self.compute_layout(live);
        }
        self.check_overlaps(&layout)?;
        Ok(layout)
    }

    fn check_overlaps(&self, layout: &Layout) -> Result<()> {
        for i in 0..layout.segments.len() {
            for j in (i + 1)..layout.segments.len() {
                let a = &layout.segments[i];
                let b = &layout.segments[j];
                let a_end = a.base_address + a.vm_size;
                let b_end = b.base_address + b.vm_size;
                if a.base_address < b_end && b.base_address < a_end {
                    return Err(Error::SegmentOverlap { a: a.name.clone(), b: b.name.clone() });
                }
            }
        }
        Ok(())
    }

    /// Groups live atoms by `(segment, section)` in discovery order,
    /// sorts sections within a segment (zero-fill last, `__textcoal_nt`
    /// pinned after `__text`), assigns addresses/offsets, and writes
    /// `atom.address`/`atom.section_offset`/`atom.section_id` back.
    fn compute_layout(&mut self, live: &HashSet<AtomId>) -> Layout {
        let mut order: Vec<(String, String)> = Vec::new();
        let mut groups: HashMap<(String, String), Vec<AtomId>> = HashMap::new();
        let mut ids: Vec<AtomId> = self.graph.iter().map(|a| a.id).collect();
        ids.sort_by_key(|id| self.graph.get(*id).map(|a| a.sort_order).unwrap_or(0));

        for id in ids {
            if !live.contains(&id) {
                continue;
            }
            let atom = self.graph.get(id).unwrap();
            let key = (atom.segment.clone(), atom.section.clone());
            groups.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                Vec::new()
            });
            groups.get_mut(&key).unwrap().push(id);
        }

        // Pin __textcoal_nt immediately after __text within __TEXT.
        if let Some(coal_pos) = order.iter().position(|(seg, sect)| seg == "__TEXT" && sect == "__textcoal_nt") {
            if let Some(text_pos) = order.iter().position(|(seg, sect)| seg == "__TEXT" && sect == "__text") {
                if coal_pos != text_pos + 1 {
                    let entry = order.remove(coal_pos);
                    let insert_at = if coal_pos < text_pos { text_pos } else { text_pos + 1 };
                    order.insert(insert_at, entry);
                }
            }
        }

        // Group sections by segment, preserving discovery order, then
        // stable-sort zero-fill sections after non-zero-fill ones.
        let mut by_segment: Vec<String> = Vec::new();
        let mut segment_sections: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for (seg, sect) in &order {
            if !by_segment.contains(seg) {
                by_segment.push(seg.clone());
            }
            segment_sections.entry(seg.clone()).or_default().push((seg.clone(), sect.clone()));
        }
        by_segment.sort_by_key(|s| segment_ordinal(s));

        let mut sections = Vec::new();
        let mut segments = Vec::new();
        let mut vm_cursor = self.base_address;

        for seg_name in &by_segment {
            let mut section_keys = segment_sections.remove(seg_name).unwrap();
            section_keys.sort_by_key(|(s, sect)| {
                let ids = &groups[&(s.clone(), sect.clone())];
                let is_zero = ids.iter().all(|id| self.graph.get(*id).unwrap().is_zero_fill());
                is_zero as u8
            });

            let seg_base = align_up(vm_cursor, PAGE_SIZE);
            let seg_file_offset = seg_base; // flat file layout: file offset tracks vm address
            let mut seg_vm_cursor = seg_base;
            let mut seg_file_cursor = seg_file_offset;
            let mut seg_file_size_end = seg_file_offset;

            for (seg, sect) in &section_keys {
                let atom_ids = groups.remove(&(seg.clone(), sect.clone())).unwrap();
                let is_zero_fill = atom_ids.iter().all(|id| self.graph.get(*id).unwrap().is_zero_fill());
                let section_alignment = atom_ids
                    .iter()
                    .map(|id| self.graph.get(*id).unwrap().alignment)
                    .max_by_key(|a| a.power)
                    .unwrap_or(Alignment::BYTE);

                let section_addr = section_alignment.align(seg_vm_cursor);
                let section_file_offset = if is_zero_fill {
                    seg_file_cursor
                } else {
                    section_alignment.align(seg_file_cursor)
                };

                let mut cursor = section_addr;
                for &id in &atom_ids {
                    let atom = self.graph.get_mut(id).unwrap();
                    let addr = atom.alignment.align(cursor);
                    atom.address = addr;
                    atom.section_offset = addr - section_addr;
                    cursor = addr + atom.size;
                }
                let section_size = cursor - section_addr;

                seg_vm_cursor = section_addr + section_size;
                if !is_zero_fill {
                    seg_file_cursor = section_file_offset + section_size;
                    seg_file_size_end = seg_file_cursor;
                }

                let all_lazy_pointers = atom_ids
                    .iter()
                    .all(|id| matches!(self.graph.get(*id).unwrap().kind, AtomKind::Stub(StubKind::LazyPointer)));
                let all_non_lazy_pointers = atom_ids
                    .iter()
                    .all(|id| matches!(self.graph.get(*id).unwrap().kind, AtomKind::Stub(StubKind::NonLazyPointer)));
                let all_stubs = atom_ids
                    .iter()
                    .all(|id| matches!(self.graph.get(*id).unwrap().kind, AtomKind::Stub(StubKind::SymbolStub)));

                let section_id = sections.len() as u32;
                for &id in &atom_ids {
                    self.graph.get_mut(id).unwrap().section_id = Some(section_id);
                }

                sections.push(SectionInfo {
                    segment: seg.clone(),
                    section: sect.clone(),
                    alignment: section_alignment,
                    is_zero_fill,
                    addr: section_addr,
                    file_offset: section_file_offset,
                    size: section_size,
                    atoms: atom_ids,
                    all_lazy_pointers,
                    all_non_lazy_pointers,
                    all_stubs,
                    indirect_symbol_base: 0,
                });
            }

            let vm_size = seg_vm_cursor - seg_base;
            let file_size = seg_file_size_end - seg_file_offset;
            segments.push(SegmentInfo {
                name: seg_name.clone(),
                ordinal: segment_ordinal(seg_name),
                base_address: seg_base,
                vm_size,
                file_offset: seg_file_offset,
                file_size,
                fixed_address: seg_name == "__PAGEZERO",
            });
            vm_cursor = seg_base + vm_size;
        }

        assign_indirect_bases(&mut sections);
        Layout { segments, sections }
    }
}

fn assign_indirect_bases(sections: &mut [SectionInfo]) {
    let mut running = 0u32;
    for section in sections.iter_mut() {
        if section.all_lazy_pointers || section.all_non_lazy_pointers || section.all_stubs {
            section.indirect_symbol_base = running;
            running += section.atoms.len() as u32;
        }
    }
}

fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::*;

    fn push_atom(graph: &mut AtomGraph, segment: &str, section: &str, size: u64, zero_fill: bool) -> AtomId {
        graph.push(Atom {
            id: AtomId(0),
            name: Some(format!("_a{}", graph.len())),
            scope: Scope::Global,
            definition: DefinitionKind::Regular,
            symbol_table: SymbolTableInclusion::In,
            kind: AtomKind::Symbol,
            size,
            alignment: Alignment::BYTE,
            dont_dead_strip: false,
            segment: segment.into(),
            section: section.into(),
            must_remain_in_section: None,
            follow_on: None,
            content: if zero_fill { ContentProvider::ZeroFill } else { ContentProvider::Bytes(vec![0; size as usize]) },
            references: Vec::new(),
            reader: ReaderId(0),
            sort_order: 0,
            line_info: Vec::new(),
            section_id: None,
            section_offset: 0,
            address: 0,
        })
    }

    #[test]
    fn segments_ordered_and_page_aligned() {
        let mut graph = AtomGraph::new();
        let data = push_atom(&mut graph, "__DATA", "__data", 8, false);
        let text = push_atom(&mut graph, "__TEXT", "__text", 4, false);
        let live: HashSet<AtomId> = [data, text].into_iter().collect();
        let mut live = live;
        let mut layouter = Layouter::new(&mut graph, Arch::X86_64, 0);
        let layout = layouter.run(&mut live).unwrap();
        assert_eq!(layout.segments[0].name, "__TEXT");
        assert_eq!(layout.segments[1].name, "__DATA");
        assert_eq!(layout.segments[1].base_address % PAGE_SIZE, 0);
    }

    #[test]
    fn zero_fill_sections_sort_after_regular() {
        let mut graph = AtomGraph::new();
        let bss = push_atom(&mut graph, "__DATA", "__bss", 16, true);
        let data = push_atom(&mut graph, "__DATA", "__data", 8, false);
        let live: HashSet<AtomId> = [bss, data].into_iter().collect();
        let mut live = live;
        let mut layouter = Layouter::new(&mut graph, Arch::X86_64, 0);
        let layout = layouter.run(&mut live).unwrap();
        let data_sect = layout.sections.iter().find(|s| s.section == "__data").unwrap();
        let bss_sect = layout.sections.iter().find(|s| s.section == "__bss").unwrap();
        assert!(data_sect.addr < bss_sect.addr);
    }

    #[test]
    fn atom_address_matches_section_base_plus_offset() {
        let mut graph = AtomGraph::new();
        let a = push_atom(&mut graph, "__TEXT", "__text", 4, false);
        let b = push_atom(&mut graph, "__TEXT", "__text", 4, false);
        let live: HashSet<AtomId> = [a, b].into_iter().collect();
        let mut live = live;
        let mut layouter = Layouter::new(&mut graph, Arch::X86_64, 0);
        let layout = layouter.run(&mut live).unwrap();
        let section = &layout.sections[0];
        for &id in &section.atoms {
            let atom = graph.get(id).unwrap();
            assert_eq!(atom.address, section.addr + atom.section_offset);
        }
    }
}
