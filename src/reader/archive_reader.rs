//! Exposes a static archive as a just-in-time source of atoms keyed
//! by symbol name (spec §2 item 4, §4.1's "members are themselves
//! object files consumed through the same reader").

use crate::archive::Archive;
use crate::atom::{AtomGraph, AtomId, ReaderId};
use crate::container::Ctx;
use crate::error::Result;
use crate::reader::relocatable::RelocatableReader;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Pull in only members that resolve a currently-required symbol.
    OnDemand,
    /// Pull in every member regardless of whether it's currently needed.
    ForceLoadAll,
    /// Pull in every member that defines an old-style Objective-C
    /// class, regardless of whether it's currently needed (`-ObjC`).
    LoadAllObjcClasses,
}

pub struct ArchiveReader<'a> {
    reader_id: ReaderId,
    archive: Archive<'a>,
    ctx: Ctx,
    path: String,
    policy: LoadPolicy,
    loaded_offsets: HashSet<usize>,
}

impl<'a> ArchiveReader<'a> {
    pub fn new(reader_id: ReaderId, archive: Archive<'a>, ctx: Ctx, path: impl Into<String>, policy: LoadPolicy) -> Self {
        ArchiveReader {
            reader_id,
            archive,
            ctx,
            path: path.into(),
            policy,
            loaded_offsets: HashSet::new(),
        }
    }

    /// Loads every member that has not yet been pulled in, ignoring
    /// the symbol index entirely (`-force_load`).
    pub fn force_load_all(&mut self, graph: &mut AtomGraph) -> Result<Vec<AtomId>> {
        let offsets: Vec<usize> = self.archive.all_members().map(|m| m.offset).collect();
        let mut pushed = Vec::new();
        for off in offsets {
            pushed.extend(self.load_member_at(graph, off)?);
        }
        Ok(pushed)
    }

    /// Loads every member that defines an old-style Objective-C class
    /// and has not yet been pulled in, ignoring the symbol index
    /// (`-ObjC`'s load-all-ObjC-classes policy).
    pub fn load_all_objc_classes(&mut self, graph: &mut AtomGraph) -> Result<Vec<AtomId>> {
        let offsets: Vec<usize> = self.archive.all_members().map(|m| m.offset).collect();
        let mut pushed = Vec::new();
        for off in offsets {
            if self.loaded_offsets.contains(&off) {
                continue;
            }
            let Some(member) = self.archive.member_at(off).cloned() else {
                continue;
            };
            let bytes = self.archive.extract(&member);
            let reader = RelocatableReader::new(self.reader_id, self.path.clone(), self.ctx, Default::default());
            let parsed = reader.parse(bytes)?;
            if !parsed.has_old_objc_classes {
                continue;
            }
            self.loaded_offsets.insert(off);
            for atom in parsed.atoms {
                pushed.push(graph.push(atom));
            }
        }
        Ok(pushed)
    }

    /// Pulls in whichever member (if any) defines `name`, per the
    /// archive's symbol index (§4.1's load-on-demand policy).
    pub fn atoms_for_name(&mut self, graph: &mut AtomGraph, name: &str) -> Result<Vec<AtomId>> {
        let Some(offset) = self.archive.index.lookup(name) else {
            return Ok(Vec::new());
        };
        self.load_member_at(graph, offset as usize)
    }

    fn load_member_at(&mut self, graph: &mut AtomGraph, offset: usize) -> Result<Vec<AtomId>> {
        if self.loaded_offsets.contains(&offset) {
            return Ok(Vec::new());
        }
        let Some(member) = self.archive.member_at(offset).cloned() else {
            return Ok(Vec::new());
        };
        let bytes = self.archive.extract(&member);
        let reader = RelocatableReader::new(self.reader_id, self.path.clone(), self.ctx, Default::default());
        let parsed = reader.parse(bytes)?;
        self.loaded_offsets.insert(offset);
        let mut ids = Vec::with_capacity(parsed.atoms.len());
        for atom in parsed.atoms {
            ids.push(graph.push(atom));
        }
        Ok(ids)
    }

    pub fn policy(&self) -> LoadPolicy {
        self.policy
    }
}
