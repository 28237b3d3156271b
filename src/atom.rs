//! The atom graph: spec §3's `Atom`/`Reference` data model, collapsed
//! from the source's multi-tier `BaseAtom -> SymbolAtom/AnonymousAtom/
//! TentativeAtom/ExportAtom` inheritance into a tagged union, and
//! addressed by arena index rather than raw pointer (spec §9's
//! "Atom ownership and cycles" design note).

use std::collections::HashMap;

/// Opaque index into an `AtomGraph`'s arena. Cheap to copy, stable for
/// the lifetime of the link (atoms are "logically deleted," never
/// actually freed, per spec §3's lifecycle note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(pub u32);

/// Opaque index into an `AtomGraph`'s reader list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReaderId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scope {
    TranslationUnit,
    LinkageUnit,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Regular,
    Weak,
    Tentative,
    ExternalStrong,
    ExternalWeak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolTableInclusion {
    NotIn,
    In,
    InAndNeverStrip,
    InAsAbsolute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    /// Alignment expressed as a power of two.
    pub power: u8,
    /// Required modulus against that power-of-two boundary.
    pub modulus: u32,
}

impl Alignment {
    pub const BYTE: Alignment = Alignment { power: 0, modulus: 0 };

    pub fn pow2(power: u8) -> Self {
        Alignment { power, modulus: 0 }
    }

    pub fn value(&self) -> u64 {
        1u64 << self.power
    }

    /// Smallest address `>= from` satisfying both the power-of-two
    /// boundary and the modulus (spec §3 invariant 3).
    pub fn align(&self, from: u64) -> u64 {
        let align = self.value();
        let base = (from + align - 1) & !(align - 1);
        if self.modulus == 0 {
            base
        } else {
            let m = self.modulus as u64 % align;
            if base % align == m {
                base
            } else {
                base + ((m + align - base % align) % align)
            }
        }
    }
}

/// Where an atom's raw bytes come from. Collapses the source's
/// per-subclass `copyRawContent` override into one match arm (spec §9).
#[derive(Debug, Clone)]
pub enum ContentProvider {
    /// Literal bytes copied verbatim into the output buffer.
    Bytes(Vec<u8>),
    /// `size` bytes of zero-fill; no file bytes are ever written.
    ZeroFill,
    /// Content synthesized at fix-up time (stubs, lazy/non-lazy
    /// pointers — spec §2 item 8's `StubSynthesizer`); the byte
    /// template is filled in by the per-architecture encoder.
    Synthesized,
}

/// One of the tagged-union extension records collapsing
/// `SymbolAtom`/`AnonymousAtom`/`TentativeAtom`/`ExportAtom` (spec §9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtomKind {
    Symbol,
    Anonymous,
    Tentative,
    /// A zero-size export proxy atom produced by a `DylibReader`
    /// (spec §4.2).
    Export { weak_def: bool },
    /// A synthesized stub/lazy-pointer/non-lazy-pointer atom (spec §4.3
    /// item 8, §4.1 step 4).
    Stub(StubKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StubKind {
    SymbolStub,
    LazyPointer,
    NonLazyPointer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineInfo {
    Entry { atom_offset: u32, file: u32, line: u32 },
}

#[derive(Debug, Clone)]
pub struct Atom {
    pub id: AtomId,
    pub name: Option<String>,
    pub scope: Scope,
    pub definition: DefinitionKind,
    pub symbol_table: SymbolTableInclusion,
    pub kind: AtomKind,
    pub size: u64,
    pub alignment: Alignment,
    pub dont_dead_strip: bool,
    pub segment: String,
    pub section: String,
    pub must_remain_in_section: Option<String>,
    pub follow_on: Option<AtomId>,
    pub content: ContentProvider,
    pub references: Vec<Reference>,
    pub reader: ReaderId,
    /// Creation order, used as the final sort-order tie-breaker (spec
    /// §5 "Atom creation order is preserved as the initial sort key").
    pub sort_order: u32,
    pub line_info: Vec<LineInfo>,
    /// Assigned once the Layouter has partitioned atoms into sections
    /// (spec §3 invariant 3): `section_id` indexes `Layout::sections`.
    pub section_id: Option<u32>,
    pub section_offset: u64,
    pub address: u64,
}

impl Atom {
    pub fn is_zero_fill(&self) -> bool {
        matches!(self.content, ContentProvider::ZeroFill)
    }

    pub fn requires_follow_on_atom(&self) -> bool {
        self.follow_on.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    // Architecture-neutral
    NoFixUp,
    FollowOn,
    Pointer,
    PointerWeakImport,
    PointerDiff32,
    PointerDiff64,
    // PowerPC
    Branch24,
    Branch14,
    AbsHigh16,
    AbsHigh16AddLow,
    AbsLow14,
    AbsLow16,
    PicBaseHigh16,
    PicBaseLow16,
    PicBaseLow14,
    // x86 / x86_64
    PcRel32,
    Absolute32,
    BranchPcRel32,
    BranchPcRel32WeakImport,
    PcRel32Got,
    PcRel32GotLoad,
    // ARM
    ThumbBranch22,
    ArmBranch24,
    ArmBranchShim,
    // GOT-load used by the StubSynthesizer irrespective of arch
    GotLoad,
}

impl ReferenceKind {
    pub fn is_weak_import_variant(self) -> bool {
        matches!(
            self,
            ReferenceKind::PointerWeakImport | ReferenceKind::BranchPcRel32WeakImport
        )
    }

    pub fn is_pc_relative(self) -> bool {
        matches!(
            self,
            ReferenceKind::Branch24
                | ReferenceKind::Branch14
                | ReferenceKind::PcRel32
                | ReferenceKind::BranchPcRel32
                | ReferenceKind::BranchPcRel32WeakImport
                | ReferenceKind::PcRel32Got
                | ReferenceKind::PcRel32GotLoad
                | ReferenceKind::ThumbBranch22
                | ReferenceKind::ArmBranch24
                | ReferenceKind::ArmBranchShim
        )
    }
}

/// Either end of a `Reference`: bound to a concrete atom, or still
/// awaiting resolution by name (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Bound(AtomId),
    Unbound(String),
}

impl Target {
    pub fn is_bound(&self) -> bool {
        matches!(self, Target::Bound(_))
    }

    pub fn name<'a>(&'a self, graph: &'a AtomGraph) -> Option<&'a str> {
        match self {
            Target::Bound(id) => graph.get(*id).and_then(|a| a.name.as_deref()),
            Target::Unbound(name) => Some(name.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reference {
    pub offset: u32,
    pub kind: ReferenceKind,
    pub to_target: Target,
    pub to_addend: i64,
    pub from_target: Option<Target>,
    pub from_addend: i64,
}

impl Reference {
    pub fn simple(offset: u32, kind: ReferenceKind, to_target: Target, addend: i64) -> Self {
        Reference {
            offset,
            kind,
            to_target,
            to_addend: addend,
            from_target: None,
            from_addend: 0,
        }
    }

    pub fn is_fully_bound(&self) -> bool {
        self.to_target.is_bound() && self.from_target.as_ref().map_or(true, Target::is_bound)
    }
}

/// Owns every atom created during the link (spec §9: "atoms live in an
/// arena and references address them by index"). Atoms are never
/// physically removed; dead-stripping and lattice losers are tracked
/// by `live` / a separate discard set, not by deletion.
#[derive(Debug, Default)]
pub struct AtomGraph {
    atoms: Vec<Atom>,
    by_name: HashMap<String, AtomId>,
    next_sort_order: u32,
}

impl AtomGraph {
    pub fn new() -> Self {
        AtomGraph::default()
    }

    pub fn push(&mut self, mut atom: Atom) -> AtomId {
        let id = AtomId(self.atoms.len() as u32);
        atom.id = id;
        atom.sort_order = self.next_sort_order;
        self.next_sort_order += 1;
        if let Some(name) = atom.name.clone() {
            self.by_name.entry(name).or_insert(id);
        }
        self.atoms.push(atom);
        id
    }

    pub fn get(&self, id: AtomId) -> Option<&Atom> {
        self.atoms.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: AtomId) -> Option<&mut Atom> {
        self.atoms.get_mut(id.0 as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Atom> {
        self.atoms.iter()
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = AtomId> {
        (0..self.atoms.len() as u32).map(AtomId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_atom(name: Option<&str>, size: u64) -> Atom {
        Atom {
            id: AtomId(0),
            name: name.map(|s| s.to_string()),
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
            content: ContentProvider::Bytes(vec![0; size as usize]),
            references: Vec::new(),
            reader: ReaderId(0),
            sort_order: 0,
            line_info: Vec::new(),
            section_id: None,
            section_offset: 0,
            address: 0,
        }
    }

    #[test]
    fn alignment_with_modulus() {
        let a = Alignment { power: 4, modulus: 6 }; // 16-byte align, offset 6
        assert_eq!(a.align(0), 6);
        assert_eq!(a.align(7), 22);
    }

    #[test]
    fn push_assigns_increasing_sort_order() {
        let mut g = AtomGraph::new();
        let a = g.push(blank_atom(Some("_a"), 4));
        let b = g.push(blank_atom(Some("_b"), 4));
        assert!(g.get(a).unwrap().sort_order < g.get(b).unwrap().sort_order);
    }

    #[test]
    fn lookup_by_name_resolves_first_writer() {
        let mut g = AtomGraph::new();
        let a = g.push(blank_atom(Some("_dup"), 4));
        g.push(blank_atom(Some("_dup"), 8));
        assert_eq!(g.by_name["_dup"], a);
    }
}
