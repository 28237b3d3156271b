//! FixupEngine: applies per-architecture relocation encodings to atom
//! content, in either final-image or relocatable-object mode (spec
//! §4.6).

use crate::atom::{Atom, AtomGraph, AtomId, AtomKind, ContentProvider, Reference, ReferenceKind, StubKind, Target};
use crate::container::Arch;
use crate::error::{Error, Result};
use crate::macho::constants::*;
use crate::macho::raw::RelocationInfo;
use scroll::{Endian, Pread, Pwrite};
use std::collections::HashMap;

/// Placeholder address dyld's stub-binding helper would occupy;
/// callers of the final-image writer may relocate this after the
/// fact, but the core engine only needs a stable value to write into
/// every lazy-pointer slot (spec §4.6: "initialized to point at the
/// dyld stub-binding helper").
pub const DEFAULT_BINDING_HELPER_ADDRESS: u64 = 0;

#[derive(Debug, Clone)]
pub struct RelocationRecord {
    pub atom: AtomId,
    pub info: RelocationInfo,
    /// External relocations carry the symbol name rather than a
    /// section-relative symbol index; the writer resolves this to a
    /// real `r_symbolnum` once the output symbol table is built.
    pub external_name: Option<String>,
}

pub struct FixupEngine<'a> {
    graph: &'a AtomGraph,
    arch: Arch,
    endian: Endian,
    pie: bool,
    binding_helper_address: u64,
}

impl<'a> FixupEngine<'a> {
    pub fn new(graph: &'a AtomGraph, arch: Arch, pie: bool) -> Self {
        FixupEngine {
            graph,
            arch,
            endian: arch.default_endian(),
            pie,
            binding_helper_address: DEFAULT_BINDING_HELPER_ADDRESS,
        }
    }

    pub fn with_binding_helper_address(mut self, addr: u64) -> Self {
        self.binding_helper_address = addr;
        self
    }

    /// Final-image mode: computes each live atom's fully fixed-up raw
    /// bytes, ready to be written at `atom.address`'s file position.
    pub fn apply_final_image(&self, live: &[AtomId]) -> Result<HashMap<AtomId, Vec<u8>>> {
        let mut out = HashMap::new();
        for &id in live {
            let atom = self.graph.get(id).ok_or(Error::Malformed("dangling live atom id".into()))?;
            if atom.is_zero_fill() {
                continue;
            }
            let mut buf = self.materialize(atom);

            if matches!(atom.kind, AtomKind::Stub(StubKind::LazyPointer)) {
                self.write_pointer(&mut buf, 0, self.binding_helper_address)?;
                out.insert(id, buf);
                continue;
            }

            for reference in &atom.references {
                self.encode_final(atom, reference, &mut buf)?;
            }
            out.insert(id, buf);
        }
        Ok(out)
    }

    /// Relocatable-object mode: addends are encoded in place and one
    /// relocation record is emitted per reference (spec §4.6).
    pub fn apply_relocatable(&self, live: &[AtomId]) -> Result<(HashMap<AtomId, Vec<u8>>, Vec<RelocationRecord>)> {
        let mut content = HashMap::new();
        let mut relocations = Vec::new();
        for &id in live {
            let atom = self.graph.get(id).ok_or(Error::Malformed("dangling live atom id".into()))?;
            if atom.is_zero_fill() {
                continue;
            }
            let mut buf = self.materialize(atom);
            for reference in &atom.references {
                if matches!(reference.kind, ReferenceKind::NoFixUp | ReferenceKind::FollowOn) {
                    continue;
                }
                self.write_addend(&mut buf, reference)?;
                let external_name = reference.to_target.name(self.graph).map(|s| s.to_string());
                let is_extern = !matches!(reference.to_target, Target::Bound(_)) || self.is_external_definition(&reference.to_target);
                let Some(r_type) = reloc_type_for(self.arch, reference.kind) else { continue };
                let length = length_for(reference.kind, self.arch);
                let info = RelocationInfo {
                    r_address: reference.offset as i32,
                    r_info: RelocationInfo::pack(0, reference.kind.is_pc_relative(), length, is_extern, r_type),
                };
                relocations.push(RelocationRecord { atom: id, info, external_name });
            }
            content.insert(id, buf);
        }
        Ok((content, relocations))
    }

    fn is_external_definition(&self, target: &Target) -> bool {
        match target {
            Target::Bound(id) => matches!(
                self.graph.get(*id).map(|a| &a.kind),
                Some(AtomKind::Export { .. })
            ),
            Target::Unbound(_) => true,
        }
    }

    fn materialize(&self, atom: &Atom) -> Vec<u8> {
        match &atom.content {
            ContentProvider::Bytes(bytes) => {
                let mut buf = bytes.clone();
                buf.resize(atom.size as usize, 0);
                buf
            }
            ContentProvider::Synthesized => vec![0u8; atom.size as usize],
            ContentProvider::ZeroFill => Vec::new(),
        }
    }

    fn target_address(&self, target: &Target) -> u64 {
        match target {
            Target::Bound(id) => self.graph.get(*id).map(|a| a.address).unwrap_or(0),
            Target::Unbound(_) => 0,
        }
    }

    fn write_addend(&self, buf: &mut [u8], reference: &Reference) -> Result<()> {
        let offset = reference.offset as usize;
        match reference.kind {
            ReferenceKind::PointerDiff32 | ReferenceKind::Absolute32 | ReferenceKind::PcRel32 => {
                buf.pwrite_with(reference.to_addend as i32, offset, self.endian).map_err(Error::Scroll)?;
            }
            ReferenceKind::PointerDiff64 | ReferenceKind::Pointer | ReferenceKind::PointerWeakImport => {
                buf.pwrite_with(reference.to_addend, offset, self.endian).map_err(Error::Scroll)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn write_pointer(&self, buf: &mut [u8], offset: usize, value: u64) -> Result<()> {
        match self.arch.width() {
            crate::container::Width::W64 => {
                buf.pwrite_with(value, offset, self.endian).map_err(Error::Scroll)?;
            }
            crate::container::Width::W32 => {
                buf.pwrite_with(value as u32, offset, self.endian).map_err(Error::Scroll)?;
            }
        }
        Ok(())
    }

    fn encode_final(&self, atom: &Atom, reference: &Reference, buf: &mut [u8]) -> Result<()> {
        let offset = reference.offset as usize;
        let name = || reference.to_target.name(self.graph).unwrap_or("<unknown>").to_string();
        let pc = atom.address + reference.offset as u64;
        let target_addr = self.target_address(&reference.to_target).wrapping_add(reference.to_addend as u64);

        match reference.kind {
            ReferenceKind::NoFixUp | ReferenceKind::FollowOn => {}
            ReferenceKind::Pointer | ReferenceKind::PointerWeakImport => {
                let Target::Bound(target_id) = reference.to_target else {
                    // The resolver binds every surviving reference (to a
                    // real winner or a dynamic-lookup proxy) or errors;
                    // reaching fix-up still unbound means that
                    // invariant broke upstream.
                    return Err(Error::UndefinedSymbol(name()));
                };
                let needs_runtime_rebase =
                    matches!(self.graph.get(target_id).map(|a| &a.kind), Some(AtomKind::Export { .. }));
                if self.pie && needs_runtime_rebase {
                    return Err(Error::PointerInReadOnlyInSlideable { name: name() });
                }
                self.write_pointer(buf, offset, target_addr)?;
            }
            ReferenceKind::PointerDiff32 | ReferenceKind::PointerDiff64 => {
                let from_addr = reference
                    .from_target
                    .as_ref()
                    .map(|t| self.target_address(t).wrapping_add(reference.from_addend as u64))
                    .unwrap_or(pc);
                let diff = target_addr.wrapping_sub(from_addr);
                if reference.kind == ReferenceKind::PointerDiff32 {
                    buf.pwrite_with(diff as u32, offset, self.endian).map_err(Error::Scroll)?;
                } else {
                    buf.pwrite_with(diff, offset, self.endian).map_err(Error::Scroll)?;
                }
            }
            ReferenceKind::Absolute32 => {
                buf.pwrite_with(target_addr as u32, offset, self.endian).map_err(Error::Scroll)?;
            }
            ReferenceKind::PcRel32
            | ReferenceKind::BranchPcRel32
            | ReferenceKind::BranchPcRel32WeakImport
            | ReferenceKind::PcRel32Got
            | ReferenceKind::PcRel32GotLoad => {
                let delta = target_addr as i64 - (pc as i64 + 4);
                if !(i32::MIN as i64..=i32::MAX as i64).contains(&delta) {
                    return Err(Error::Rel32OutOfRange { name: name(), delta });
                }
                buf.pwrite_with(delta as i32, offset, self.endian).map_err(Error::Scroll)?;
            }
            ReferenceKind::Branch24 | ReferenceKind::ArmBranch24 => {
                let delta = target_addr as i64 - pc as i64;
                if delta.unsigned_abs() > 16 * 1024 * 1024 {
                    return Err(Error::Branch24OutOfRange { name: name(), delta });
                }
                patch_branch_field(buf, offset, delta, 24, self.endian)?;
            }
            ReferenceKind::Branch14 => {
                let delta = target_addr as i64 - pc as i64;
                if delta.unsigned_abs() > 64 * 1024 {
                    return Err(Error::Branch14OutOfRange { name: name(), delta });
                }
                patch_branch_field(buf, offset, delta, 14, self.endian)?;
            }
            ReferenceKind::ThumbBranch22 | ReferenceKind::ArmBranchShim => {
                let delta = target_addr as i64 - pc as i64;
                buf.pwrite_with(delta as i32, offset, self.endian).map_err(Error::Scroll)?;
            }
            ReferenceKind::AbsHigh16 | ReferenceKind::PicBaseHigh16 => {
                let value = target_addr as u32;
                buf.pwrite_with(((value >> 16) as u16), offset, self.endian).map_err(Error::Scroll)?;
            }
            ReferenceKind::AbsHigh16AddLow => {
                let value = target_addr as u32;
                let hi = (((value as i64) + 0x8000) >> 16) as u16;
                buf.pwrite_with(hi, offset, self.endian).map_err(Error::Scroll)?;
            }
            ReferenceKind::AbsLow16 | ReferenceKind::PicBaseLow16 => {
                let value = target_addr as u32;
                buf.pwrite_with((value & 0xffff) as u16, offset, self.endian).map_err(Error::Scroll)?;
            }
            ReferenceKind::AbsLow14 | ReferenceKind::PicBaseLow14 => {
                let value = target_addr as u32;
                buf.pwrite_with((value & 0x3fff) as u16, offset, self.endian).map_err(Error::Scroll)?;
            }
            ReferenceKind::GotLoad => {
                self.write_pointer(buf, offset, target_addr)?;
            }
        }
        Ok(())
    }
}

/// Writes `delta` into the low `bits` bits of the big/little-endian
/// 32-bit word at `offset`, leaving the opcode bits untouched.
fn patch_branch_field(buf: &mut [u8], offset: usize, delta: i64, bits: u32, endian: Endian) -> Result<()> {
    let word: u32 = buf.pread_with(offset, endian).map_err(Error::Scroll)?;
    let mask = (1u32 << bits) - 1;
    let patched = (word & !mask) | ((delta as u32) & mask);
    buf.pwrite_with(patched, offset, endian).map_err(Error::Scroll)?;
    Ok(())
}

fn length_for(kind: ReferenceKind, arch: Arch) -> u8 {
    match kind {
        ReferenceKind::PointerDiff64 | ReferenceKind::Pointer | ReferenceKind::PointerWeakImport => {
            if arch.width() == crate::container::Width::W64 { 3 } else { 2 }
        }
        _ => 2,
    }
}

fn reloc_type_for(arch: Arch, kind: ReferenceKind) -> Option<u8> {
    match arch {
        Arch::X86_64 => match kind {
            ReferenceKind::Pointer | ReferenceKind::PointerWeakImport => Some(X86_64_RELOC_UNSIGNED),
            ReferenceKind::PointerDiff32 | ReferenceKind::PointerDiff64 => Some(X86_64_RELOC_SUBTRACTOR),
            ReferenceKind::BranchPcRel32 | ReferenceKind::BranchPcRel32WeakImport => Some(X86_64_RELOC_BRANCH),
            ReferenceKind::PcRel32Got => Some(X86_64_RELOC_GOT),
            ReferenceKind::PcRel32GotLoad => Some(X86_64_RELOC_GOT_LOAD),
            ReferenceKind::PcRel32 => Some(X86_64_RELOC_SIGNED),
            _ => None,
        },
        Arch::X86 => match kind {
            ReferenceKind::Pointer | ReferenceKind::Absolute32 => Some(GENERIC_RELOC_VANILLA),
            ReferenceKind::PcRel32 => Some(GENERIC_RELOC_VANILLA),
            _ => None,
        },
        Arch::Ppc | Arch::Ppc64 => match kind {
            ReferenceKind::Pointer => Some(PPC_RELOC_VANILLA),
            ReferenceKind::Branch24 => Some(PPC_RELOC_BR24),
            ReferenceKind::Branch14 => Some(PPC_RELOC_BR14),
            ReferenceKind::AbsHigh16 => Some(PPC_RELOC_HI16),
            ReferenceKind::AbsHigh16AddLow => Some(PPC_RELOC_HA16),
            ReferenceKind::AbsLow16 => Some(PPC_RELOC_LO16),
            ReferenceKind::AbsLow14 => Some(PPC_RELOC_LO14),
            _ => None,
        },
        Arch::Arm | Arch::Arm64 => match kind {
            ReferenceKind::Pointer => Some(ARM_RELOC_VANILLA),
            ReferenceKind::ArmBranch24 => Some(ARM_RELOC_BR24),
            ReferenceKind::ThumbBranch22 => Some(ARM_THUMB_RELOC_BR22),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::*;

    fn push(graph: &mut AtomGraph, name: &str, addr: u64, size: u64, refs: Vec<Reference>, bytes: Vec<u8>) -> AtomId {
        let id = graph.push(Atom {
            id: AtomId(0),
            name: Some(name.to_string()),
            scope: Scope::Global,
            definition: DefinitionKind::Regular,
            symbol_table: SymbolTableInclusion::In,
            kind: AtomKind::Symbol,
            size,
            alignment: Alignment::BYTE,
            dont_dead_strip: false,
            segment: "__TEXT".into(),
            section: "__text".into(),
            must_remain_in_section: None,
            follow_on: None,
            content: ContentProvider::Bytes(bytes),
            references: refs,
            reader: ReaderId(0),
            sort_order: 0,
            line_info: Vec::new(),
            section_id: None,
            section_offset: 0,
            address: addr,
        });
        id
    }

    #[test]
    fn pointer_reference_writes_absolute_address() {
        let mut graph = AtomGraph::new();
        let target = push(&mut graph, "_target", 0x2000, 4, vec![], vec![0; 4]);
        let caller = push(
            &mut graph,
            "_caller",
            0x1000,
            8,
            vec![Reference::simple(0, ReferenceKind::Pointer, Target::Bound(target), 0)],
            vec![0; 8],
        );
        let engine = FixupEngine::new(&graph, Arch::X86_64, false);
        let out = engine.apply_final_image(&[caller, target]).unwrap();
        let bytes = &out[&caller];
        let value: u64 = bytes.pread_with(0, Endian::Little).unwrap();
        assert_eq!(value, 0x2000);
    }

    #[test]
    fn pcrel32_computes_delta_from_next_instruction() {
        let mut graph = AtomGraph::new();
        let target = push(&mut graph, "_target", 0x1010, 4, vec![], vec![0; 4]);
        let caller = push(
            &mut graph,
            "_caller",
            0x1000,
            8,
            vec![Reference::simple(4, ReferenceKind::PcRel32, Target::Bound(target), 0)],
            vec![0; 8],
        );
        let engine = FixupEngine::new(&graph, Arch::X86_64, false);
        let out = engine.apply_final_image(&[caller, target]).unwrap();
        let bytes = &out[&caller];
        let value: i32 = bytes.pread_with(4, Endian::Little).unwrap();
        // pc = caller.address + offset = 0x1004; pc+4 = 0x1008
        assert_eq!(value, 0x1010 - 0x1008);
    }

    #[test]
    fn out_of_range_branch_is_fatal() {
        let mut graph = AtomGraph::new();
        let target = push(&mut graph, "_target", 0x20_000_000, 4, vec![], vec![0; 4]);
        let caller = push(
            &mut graph,
            "_caller",
            0x0,
            4,
            vec![Reference::simple(0, ReferenceKind::Branch24, Target::Bound(target), 0)],
            vec![0; 4],
        );
        let engine = FixupEngine::new(&graph, Arch::Ppc, false);
        assert!(engine.apply_final_image(&[caller, target]).is_err());
    }

    #[test]
    fn lazy_pointer_slot_targets_binding_helper() {
        let mut graph = AtomGraph::new();
        let real = push(&mut graph, "_puts", 0x3000, 0, vec![], vec![]);
        let lazy = graph.push(Atom {
            id: AtomId(0),
            name: Some("_puts$lazy_ptr".into()),
            scope: Scope::TranslationUnit,
            definition: DefinitionKind::Regular,
            symbol_table: SymbolTableInclusion::NotIn,
            kind: AtomKind::Stub(StubKind::LazyPointer),
            size: 8,
            alignment: Alignment::BYTE,
            dont_dead_strip: false,
            segment: "__DATA".into(),
            section: "__la_symbol_ptr".into(),
            must_remain_in_section: None,
            follow_on: None,
            content: ContentProvider::Synthesized,
            references: vec![Reference::simple(0, ReferenceKind::Pointer, Target::Bound(real), 0)],
            reader: ReaderId(0),
            sort_order: 0,
            line_info: Vec::new(),
            section_id: None,
            section_offset: 0,
            address: 0x4000,
        });
        let engine = FixupEngine::new(&graph, Arch::X86_64, false).with_binding_helper_address(0x9999);
        let out = engine.apply_final_image(&[lazy, real]).unwrap();
        let value: u64 = out[&lazy].pread_with(0, Endian::Little).unwrap();
        assert_eq!(value, 0x9999);
    }
}
