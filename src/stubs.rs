//! StubSynthesizer: materializes stub/lazy-pointer/non-lazy-pointer
//! atoms for references that need them, and applies the weak-import
//! mismatch policy (spec §2 item 8).

use crate::atom::{
    Alignment, Atom, AtomGraph, AtomId, AtomKind, ContentProvider, DefinitionKind, ReaderId,
    Reference, ReferenceKind, Scope, StubKind, SymbolTableInclusion, Target,
};
use crate::container::Arch;
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Which synthesized atom kind a reference kind calls for, if any.
fn stub_kind_for(kind: ReferenceKind) -> Option<StubKind> {
    match kind {
        ReferenceKind::BranchPcRel32 | ReferenceKind::BranchPcRel32WeakImport => {
            Some(StubKind::SymbolStub)
        }
        ReferenceKind::PcRel32Got | ReferenceKind::PcRel32GotLoad | ReferenceKind::GotLoad => {
            Some(StubKind::NonLazyPointer)
        }
        ReferenceKind::PointerWeakImport => Some(StubKind::NonLazyPointer),
        _ => None,
    }
}

/// Walks every reference in the graph, materializing one stub atom per
/// distinct `(target, kind)` pair that needs one, and rebinding the
/// originating reference to point at the synthesized atom instead of
/// the real definition (spec §4.3/§6 item 8).
pub struct StubSynthesizer<'a> {
    graph: &'a mut AtomGraph,
    arch: Arch,
    allow_weak_mismatch: bool,
    materialized: HashMap<(AtomId, StubKind), AtomId>,
    reader: ReaderId,
}

impl<'a> StubSynthesizer<'a> {
    pub fn new(graph: &'a mut AtomGraph, arch: Arch, allow_weak_mismatch: bool, reader: ReaderId) -> Self {
        StubSynthesizer {
            graph,
            arch,
            allow_weak_mismatch,
            materialized: HashMap::new(),
            reader,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        self.check_weak_import_consistency()?;

        let ids: Vec<AtomId> = self.graph.ids().collect();
        for id in ids {
            let edits = self.plan_edits(id);
            for (ref_index, stub_id) in edits {
                if let Some(atom) = self.graph.get_mut(id) {
                    atom.references[ref_index].to_target = Target::Bound(stub_id);
                }
            }
        }
        Ok(())
    }

    /// Decides which of `id`'s references need rebinding to a
    /// synthesized stub, materializing the stub as a side effect.
    /// Returns `(reference index, synthesized atom id)` pairs.
    fn plan_edits(&mut self, id: AtomId) -> Vec<(usize, AtomId)> {
        let mut edits = Vec::new();
        let count = match self.graph.get(id) {
            Some(a) => a.references.len(),
            None => return edits,
        };
        for i in 0..count {
            let (kind, to) = {
                let atom = self.graph.get(id).unwrap();
                (atom.references[i].kind, atom.references[i].to_target.clone())
            };
            let Some(stub_kind) = stub_kind_for(kind) else { continue };
            let Target::Bound(target) = to else { continue };
            if self.is_already_stub(target) {
                continue;
            }
            let stub_id = self.materialize(target, stub_kind);
            edits.push((i, stub_id));
        }
        edits
    }

    fn is_already_stub(&self, id: AtomId) -> bool {
        matches!(self.graph.get(id).map(|a| &a.kind), Some(AtomKind::Stub(_)))
    }

    fn materialize(&mut self, target: AtomId, kind: StubKind) -> AtomId {
        if let Some(&existing) = self.materialized.get(&(target, kind)) {
            return existing;
        }
        let target_name = self.graph.get(target).and_then(|a| a.name.clone());
        let suffix = match kind {
            StubKind::SymbolStub => "$stub",
            StubKind::LazyPointer => "$lazy_ptr",
            StubKind::NonLazyPointer => "$non_lazy_ptr",
        };
        let name = target_name.map(|n| format!("{n}{suffix}"));
        let size = match kind {
            StubKind::SymbolStub => self.arch.width().pointer_size(),
            StubKind::LazyPointer | StubKind::NonLazyPointer => self.arch.width().pointer_size(),
        };
        let to_target = match kind {
            StubKind::SymbolStub => {
                // a stub loads its own lazy pointer and jumps through it;
                // materialize that lazy pointer first.
                let lazy = self.materialize(target, StubKind::LazyPointer);
                Target::Bound(lazy)
            }
            StubKind::LazyPointer | StubKind::NonLazyPointer => Target::Bound(target),
        };
        let atom = Atom {
            id: AtomId(0),
            name,
            scope: Scope::TranslationUnit,
            definition: DefinitionKind::Regular,
            symbol_table: SymbolTableInclusion::NotIn,
            kind: AtomKind::Stub(kind),
            size,
            alignment: Alignment::pow2(self.arch.width().pointer_size().trailing_zeros() as u8),
            dont_dead_strip: false,
            segment: "__DATA".into(),
            section: match kind {
                StubKind::SymbolStub => "__symbol_stub".into(),
                StubKind::LazyPointer => "__la_symbol_ptr".into(),
                StubKind::NonLazyPointer => "__nl_symbol_ptr".into(),
            },
            must_remain_in_section: None,
            follow_on: None,
            content: ContentProvider::Synthesized,
            references: vec![Reference::simple(0, ReferenceKind::Pointer, to_target, 0)],
            reader: self.reader,
            sort_order: 0,
            line_info: Vec::new(),
            section_id: None,
            section_offset: 0,
            address: 0,
        };
        let id = self.graph.push(atom);
        self.materialized.insert((target, kind), id);
        id
    }

    /// A `PointerWeakImport`/`BranchPcRel32WeakImport` reference whose
    /// resolved target is *not* an `ExternalWeak` definition is a
    /// mismatch: the importer expects weak binding but the definition
    /// disagrees (spec §7 "Policy").
    fn check_weak_import_consistency(&self) -> Result<()> {
        for atom in self.graph.iter() {
            for reference in &atom.references {
                if !reference.kind.is_weak_import_variant() {
                    continue;
                }
                let Target::Bound(target) = reference.to_target else { continue };
                let Some(target_atom) = self.graph.get(target) else { continue };
                if target_atom.definition != DefinitionKind::ExternalWeak
                    && target_atom.definition != DefinitionKind::Weak
                {
                    if !self.allow_weak_mismatch {
                        let symbol = target_atom.name.clone().unwrap_or_default();
                        return Err(Error::WeakMismatch { symbol });
                    }
                }
            }
        }
        Ok(())
    }
}
