//! Reader trait and shared reader metadata (spec §3's `Reader` entity,
//! spec §2 items 2-4: `RelocatableReader`/`DylibReader`/`ArchiveReader`).

pub mod archive_reader;
pub mod dylib;
pub mod relocatable;

pub use archive_reader::ArchiveReader;
pub use dylib::{DylibMetadata, DylibReader, ExportFlags, Platform};
pub use relocatable::RelocatableReader;

use crate::atom::{Atom, AtomGraph, AtomId, ReaderId};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugInfoKind {
    None,
    Stabs,
    StabsWithUuid,
    Dwarf,
}

/// Collaborator order the Resolver walks when a name has no winner
/// (spec §4.3 step 1.1: "writer -> readers -> indirect dylibs -> proxy").
pub trait JustInTimeSource {
    /// Attempts to materialize an atom for `name`, pushing it (and any
    /// atoms it pulls in transitively) into `graph`. Returns the
    /// pushed atom, if any; repeated calls for the same name return
    /// the same atom (memoized).
    fn atom_for_name(&mut self, graph: &mut AtomGraph, name: &str) -> Result<Option<AtomId>>;

    fn reader_id(&self) -> ReaderId;
}

/// Common reader identity fields every input carries (spec §3
/// "Reader"). `RelocatableReader` embeds this directly;
/// `DylibReader`/`ArchiveReader` carry it too since all three are
/// addressed uniformly by the resolver.
#[derive(Debug, Clone)]
pub struct ReaderInfo {
    pub id: ReaderId,
    pub path: String,
    pub mod_time: u64,
    pub debug_info_kind: DebugInfoKind,
}

/// Options threaded through every reader (spec §4.1's `(bytes, modTime,
/// path, options)` contract).
#[derive(Debug, Clone, Default)]
pub struct ReaderOptions {
    /// §4.1's narrow permissive-parsing affordance, resolved in
    /// DESIGN.md's Open Question log: default strict (`false`).
    pub tolerate_truncated_stab_names: bool,
    /// Object was compiled with `-fsubsections-via-symbols`: suppress
    /// implicit follow-on ordering between top-level symbol atoms
    /// (spec §4.1 step 5).
    pub subsections_via_symbols: bool,
}

/// A freshly-parsed relocatable object's yield, ready to be folded
/// into the shared `AtomGraph` (spec §4.1's `(atoms[], stabs[],
/// debugInfoKind)` output contract).
pub struct ParsedObject {
    pub atoms: Vec<Atom>,
    pub stabs: Vec<crate::debug_info::Stab>,
    pub debug_info_kind: DebugInfoKind,
    /// `(from, to)` pairs, indexing into `atoms`, that need a
    /// follow-on edge once real `AtomId`s exist (spec §4.1 step 5:
    /// implicit ordering preserved when not compiled with
    /// subsections-via-symbols).
    pub follow_on_pairs: Vec<(usize, usize)>,
    /// Whether this object defines at least one old-style (non-
    /// fragile) Objective-C class (a `.objc_class_name_*` symbol),
    /// the signal `-ObjC`'s load-all-ObjC-classes archive policy acts
    /// on.
    pub has_old_objc_classes: bool,
}

/// Pushes every atom of a `ParsedObject` into `graph` in order and
/// wires up its `follow_on_pairs` using the real `AtomId`s assigned by
/// the push, returning the pushed ids in the same order as `atoms`.
pub fn ingest_parsed_object(graph: &mut AtomGraph, parsed: ParsedObject) -> Vec<AtomId> {
    let mut ids = Vec::with_capacity(parsed.atoms.len());
    for atom in parsed.atoms {
        ids.push(graph.push(atom));
    }
    for (from, to) in parsed.follow_on_pairs {
        if let (Some(&from_id), Some(&to_id)) = (ids.get(from), ids.get(to)) {
            if let Some(atom) = graph.get_mut(from_id) {
                atom.follow_on = Some(to_id);
            }
        }
    }
    ids
}
