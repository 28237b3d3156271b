//! PowerPC long-branch island insertion and ARM thumb-to-arm mode
//! shims (spec §4.5). Both passes are iterated to a fixed point by
//! `layout::Layouter::run`.
//!
//! Shim byte sequences are grounded on
//! `original_source/src/ld/passes/branch_shim.cpp`'s
//! `Thumb2ToArmShimAtom`/`Thumb1ToArmShimAtom::copyRawContent`.
//!
//! Simplification: the data model (spec §3) carries no per-atom ISA
//! (thumb vs. arm) flag, so ARM/Thumb mode is inferred from an atom
//! name prefix `thumb_` rather than true instruction decoding; see
//! DESIGN.md.

use crate::atom::{
    Alignment, Atom, AtomGraph, AtomId, AtomKind, ContentProvider, DefinitionKind, ReaderId,
    Reference, ReferenceKind, Scope, SymbolTableInclusion, Target,
};
use crate::container::Arch;
use crate::layout::{Layout, ISLAND_REGION_SIZE};
use std::collections::{HashMap, HashSet};

/// `ldr ip, [pc, #4]; add ip, pc, ip; bx ip; <4 bytes of offset>`
/// (`Thumb2ToArmShimAtom::copyRawContent`).
pub const THUMB2_TO_ARM_SHIM: [u8; 12] = [
    0xdf, 0xf8, 0x04, 0xc0, // ldr.w ip, [pc, #4]
    0x0c, 0x44, // add ip, pc
    0x60, 0x47, // bx ip
    0x00, 0x00, 0x00, 0x00, // offset, patched at fix-up time
];

/// `push {r1}; ldr r1, [pc, #8]; add r1, pc; mov ip, r1; pop {r1};
/// bx ip; <4 bytes of offset>` (`Thumb1ToArmShimAtom::copyRawContent`).
pub const THUMB1_TO_ARM_SHIM: [u8; 16] = [
    0x02, 0xb4, // push {r1}
    0x02, 0x49, // ldr r1, [pc, #8]
    0x79, 0x44, // add r1, pc
    0x8c, 0x46, // mov ip, r1
    0x02, 0xbc, // pop {r1}
    0x60, 0x47, // bx ip
    0x00, 0x00, 0x00, 0x00, // offset, patched at fix-up time
];

fn region_index(addr: u64) -> i64 {
    (addr / ISLAND_REGION_SIZE) as i64
}

/// Inserts PowerPC long-branch islands for every `Branch24`/`Branch14`
/// reference whose source/target distance exceeds one island region,
/// daisy-chaining through every region strictly between the two.
/// Returns whether any new island atom was created this pass.
pub fn insert_branch_islands(
    graph: &mut AtomGraph,
    layout: &Layout,
    live: &mut HashSet<AtomId>,
    arch: Arch,
    memo: &mut HashMap<(i64, AtomId), AtomId>,
) -> bool {
    let text_segment_size: u64 = layout
        .segments
        .iter()
        .find(|s| s.name == "__TEXT")
        .map(|s| s.vm_size)
        .unwrap_or(0);
    if text_segment_size <= 16 * 1024 * 1024 {
        return false;
    }

    let mut edits: Vec<(AtomId, usize, AtomId)> = Vec::new();
    for atom in graph.iter() {
        if !live.contains(&atom.id) {
            continue;
        }
        for (i, reference) in atom.references.iter().enumerate() {
            if !matches!(reference.kind, ReferenceKind::Branch24 | ReferenceKind::Branch14) {
                continue;
            }
            let Target::Bound(target) = reference.to_target else { continue };
            let Some(target_atom) = graph.get(target) else { continue };
            let src_addr = atom.address + reference.offset as u64;
            let dst_addr = target_atom.address;
            let distance = (dst_addr as i64 - src_addr as i64).unsigned_abs();
            if distance <= ISLAND_REGION_SIZE {
                continue;
            }
            edits.push((atom.id, i, target));
        }
    }
    if edits.is_empty() {
        return false;
    }

    let mut created_any = false;
    for (source, ref_index, final_target) in edits {
        let src_addr = graph.get(source).unwrap().address;
        let dst_addr = graph.get(final_target).unwrap().address;
        let src_region = region_index(src_addr);
        let dst_region = region_index(dst_addr);
        if src_region == dst_region {
            continue;
        }
        let step: i64 = if dst_region > src_region { -1 } else { 1 };
        // Build the chain from the region closest to the target back
        // toward the region closest to the source, so each island's
        // single reference points one hop closer to `final_target`.
        let mut next_hop = final_target;
        let mut region = dst_region + step;
        loop {
            if region == src_region {
                break;
            }
            let key = (region, final_target);
            let island = if let Some(&existing) = memo.get(&key) {
                existing
            } else {
                let island = push_island(graph, arch, final_target, next_hop);
                memo.insert(key, island);
                live.insert(island);
                created_any = true;
                island
            };
            next_hop = island;
            region += step;
        }
        if let Some(atom) = graph.get_mut(source) {
            if atom.references[ref_index].to_target != Target::Bound(next_hop) {
                atom.references[ref_index].to_target = Target::Bound(next_hop);
            }
        }
    }
    created_any
}

fn push_island(graph: &mut AtomGraph, arch: Arch, final_target: AtomId, next_hop: AtomId) -> AtomId {
    let target_name = graph.get(final_target).and_then(|a| a.name.clone()).unwrap_or_default();
    let island_size = if arch == Arch::Ppc64 { 8 } else { 4 };
    let atom = Atom {
        id: AtomId(0),
        name: Some(format!("island@{target_name}")),
        scope: Scope::TranslationUnit,
        definition: DefinitionKind::Regular,
        symbol_table: SymbolTableInclusion::NotIn,
        kind: AtomKind::Anonymous,
        size: island_size,
        alignment: Alignment::pow2(2),
        dont_dead_strip: true,
        segment: "__TEXT".into(),
        section: "__text".into(),
        must_remain_in_section: None,
        follow_on: None,
        content: ContentProvider::Synthesized,
        references: vec![Reference::simple(0, ReferenceKind::Branch24, Target::Bound(next_hop), 0)],
        reader: ReaderId(u32::MAX),
        sort_order: 0,
        line_info: Vec::new(),
        section_id: None,
        section_offset: 0,
        address: 0,
    };
    graph.push(atom)
}

fn is_thumb_atom(atom: &Atom) -> bool {
    atom.name.as_deref().map_or(false, |n| n.starts_with("thumb_"))
}

/// Inserts a Thumb-to-ARM mode shim for every `ThumbBranch22` whose
/// bound target is ARM code, redirecting the reference through the
/// shim and marking it `ArmBranchShim` so a later pass does not
/// reprocess it. ARM-calling-Thumb shims are not modeled: the only
/// byte sequences recovered from the corpus are the Thumb-to-ARM
/// variants (see module docs).
pub fn insert_mode_shims(
    graph: &mut AtomGraph,
    _layout: &Layout,
    live: &mut HashSet<AtomId>,
    memo: &mut HashMap<AtomId, AtomId>,
) -> bool {
    let mut edits: Vec<(AtomId, usize, AtomId)> = Vec::new();
    for atom in graph.iter() {
        if !live.contains(&atom.id) {
            continue;
        }
        for (i, reference) in atom.references.iter().enumerate() {
            if reference.kind != ReferenceKind::ThumbBranch22 {
                continue;
            }
            let Target::Bound(target) = reference.to_target else { continue };
            let Some(target_atom) = graph.get(target) else { continue };
            if !is_thumb_atom(target_atom) {
                edits.push((atom.id, i, target));
            }
        }
    }
    if edits.is_empty() {
        return false;
    }

    let mut created_any = false;
    for (source, ref_index, target) in edits {
        let shim = if let Some(&existing) = memo.get(&target) {
            existing
        } else {
            let shim = push_shim(graph, target);
            memo.insert(target, shim);
            live.insert(shim);
            created_any = true;
            shim
        };
        if let Some(atom) = graph.get_mut(source) {
            atom.references[ref_index].to_target = Target::Bound(shim);
            atom.references[ref_index].kind = ReferenceKind::ArmBranchShim;
        }
    }
    created_any
}

fn push_shim(graph: &mut AtomGraph, target: AtomId) -> AtomId {
    let target_name = graph.get(target).and_then(|a| a.name.clone()).unwrap_or_default();
    let bytes = THUMB2_TO_ARM_SHIM.to_vec();
    let atom = Atom {
        id: AtomId(0),
        name: Some(format!("{target_name}$shim")),
        scope: Scope::TranslationUnit,
        definition: DefinitionKind::Regular,
        symbol_table: SymbolTableInclusion::NotIn,
        kind: AtomKind::Anonymous,
        size: bytes.len() as u64,
        alignment: Alignment::pow2(2),
        dont_dead_strip: true,
        segment: "__TEXT".into(),
        section: "__text".into(),
        must_remain_in_section: None,
        follow_on: None,
        content: ContentProvider::Bytes(bytes),
        references: vec![Reference::simple(8, ReferenceKind::ArmBranch24, Target::Bound(target), 0)],
        reader: ReaderId(u32::MAX),
        sort_order: 0,
        line_info: Vec::new(),
        section_id: None,
        section_offset: 0,
        address: 0,
    };
    graph.push(atom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::*;
    use crate::layout::Layouter;
    use std::collections::HashSet;

    fn push_far_pair(graph: &mut AtomGraph) -> (AtomId, AtomId, AtomId) {
        let target = graph.push(Atom {
            id: AtomId(0),
            name: Some("_far_target".into()),
            scope: Scope::Global,
            definition: DefinitionKind::Regular,
            symbol_table: SymbolTableInclusion::In,
            kind: AtomKind::Symbol,
            size: 4,
            alignment: Alignment::BYTE,
            dont_dead_strip: true,
            segment: "__TEXT".into(),
            section: "__text".into(),
            must_remain_in_section: None,
            follow_on: None,
            content: ContentProvider::Bytes(vec![0; 4]),
            references: Vec::new(),
            reader: ReaderId(0),
            sort_order: 0,
            line_info: Vec::new(),
            section_id: None,
            section_offset: 0,
            address: 0,
        });
        // A zero-fill gap far larger than one island region, so the
        // caller and target land in different regions without
        // allocating real bytes.
        let filler = graph.push(Atom {
            id: AtomId(0),
            name: None,
            scope: Scope::TranslationUnit,
            definition: DefinitionKind::Regular,
            symbol_table: SymbolTableInclusion::NotIn,
            kind: AtomKind::Anonymous,
            size: ISLAND_REGION_SIZE * 2,
            alignment: Alignment::BYTE,
            dont_dead_strip: true,
            segment: "__TEXT".into(),
            section: "__text".into(),
            must_remain_in_section: None,
            follow_on: None,
            content: ContentProvider::ZeroFill,
            references: Vec::new(),
            reader: ReaderId(0),
            sort_order: 0,
            line_info: Vec::new(),
            section_id: None,
            section_offset: 0,
            address: 0,
        });
        let caller = graph.push(Atom {
            id: AtomId(0),
            name: Some("_caller".into()),
            scope: Scope::Global,
            definition: DefinitionKind::Regular,
            symbol_table: SymbolTableInclusion::In,
            kind: AtomKind::Symbol,
            size: 4,
            alignment: Alignment::BYTE,
            dont_dead_strip: true,
            segment: "__TEXT".into(),
            section: "__text".into(),
            must_remain_in_section: None,
            follow_on: None,
            content: ContentProvider::Bytes(vec![0; 4]),
            references: vec![Reference::simple(0, ReferenceKind::Branch24, Target::Bound(target), 0)],
            reader: ReaderId(0),
            sort_order: 0,
            line_info: Vec::new(),
            section_id: None,
            section_offset: 0,
            address: 0,
        });
        (target, filler, caller)
    }

    #[test]
    fn island_inserted_for_out_of_range_branch() {
        let mut graph = AtomGraph::new();
        let (target, filler, caller) = push_far_pair(&mut graph);
        let mut live: HashSet<AtomId> = [target, filler, caller].into_iter().collect();
        let mut layouter = Layouter::new(&mut graph, Arch::Ppc, 0);
        layouter.run(&mut live).unwrap();

        let caller_atom = graph.get(caller).unwrap();
        let Target::Bound(bound) = caller_atom.references[0].to_target else {
            panic!("expected bound target");
        };
        assert_ne!(bound, target, "reference should be redirected through an island");
        let island = graph.get(bound).unwrap();
        assert!(island.name.as_deref().unwrap().starts_with("island@"));
    }

    #[test]
    fn short_branch_needs_no_island() {
        let mut graph = AtomGraph::new();
        let target = graph.push(Atom {
            id: AtomId(0),
            name: Some("_near".into()),
            scope: Scope::Global,
            definition: DefinitionKind::Regular,
            symbol_table: SymbolTableInclusion::In,
            kind: AtomKind::Symbol,
            size: 4,
            alignment: Alignment::BYTE,
            dont_dead_strip: true,
            segment: "__TEXT".into(),
            section: "__text".into(),
            must_remain_in_section: None,
            follow_on: None,
            content: ContentProvider::Bytes(vec![0; 4]),
            references: Vec::new(),
            reader: ReaderId(0),
            sort_order: 0,
            line_info: Vec::new(),
            section_id: None,
            section_offset: 0,
            address: 0,
        });
        let caller = graph.push(Atom {
            id: AtomId(0),
            name: Some("_caller".into()),
            scope: Scope::Global,
            definition: DefinitionKind::Regular,
            symbol_table: SymbolTableInclusion::In,
            kind: AtomKind::Symbol,
            size: 4,
            alignment: Alignment::BYTE,
            dont_dead_strip: true,
            segment: "__TEXT".into(),
            section: "__text".into(),
            must_remain_in_section: None,
            follow_on: None,
            content: ContentProvider::Bytes(vec![0; 4]),
            references: vec![Reference::simple(0, ReferenceKind::Branch24, Target::Bound(target), 0)],
            reader: ReaderId(0),
            sort_order: 0,
            line_info: Vec::new(),
            section_id: None,
            section_offset: 0,
            address: 0,
        });
        let mut live: HashSet<AtomId> = [target, caller].into_iter().collect();
        let mut layouter = Layouter::new(&mut graph, Arch::Ppc, 0);
        layouter.run(&mut live).unwrap();
        let caller_atom = graph.get(caller).unwrap();
        assert_eq!(caller_atom.references[0].to_target, Target::Bound(target));
    }
}
