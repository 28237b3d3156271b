//! Convergence-loop symbol resolution (spec §4.3's `Resolver`).
//! Collaborator order preserved: *readers already ingested -> archive
//! readers -> dylib readers -> dynamic-lookup proxy*, matching spec's
//! "writer -> readers -> indirect dylibs -> proxy" (the writer has
//! nothing to contribute before layout, so it is a no-op collaborator
//! here).

use crate::atom::{
    Alignment, Atom, AtomGraph, AtomId, AtomKind, ContentProvider, DefinitionKind, ReaderId, Scope,
    SymbolTableInclusion, Target,
};
use crate::error::{Error, Result};
use crate::options::{LinkOptions, UndefinedTreatment};
use crate::reader::archive_reader::ArchiveReader;
use crate::reader::dylib::DylibReader;
use crate::symtab::SymbolTable;
use std::collections::HashMap;

/// Drives symbol resolution to convergence over a fixed set of
/// collaborators (spec §4.3's resolver loop).
pub struct Resolver<'a, 'b> {
    pub graph: &'a mut AtomGraph,
    pub symbols: &'a mut SymbolTable,
    pub archives: Vec<&'a mut ArchiveReader<'b>>,
    pub dylibs: Vec<&'a mut DylibReader>,
    pub options: &'a LinkOptions,
}

impl<'a, 'b> Resolver<'a, 'b> {
    /// Seeds the required set from the entry point and any configured
    /// extra roots (spec §4.3's "initial required-set").
    pub fn seed(&mut self, entry_point: Option<&str>) {
        if let Some(entry) = entry_point {
            self.symbols.require(entry);
        }
        for root in &self.options.extra_roots {
            self.symbols.require(root.clone());
        }
    }

    /// Runs step 1 of §4.3's loop to convergence: while the required
    /// set grew in the last pass, ask every collaborator in order for
    /// just-in-time atoms for each unsatisfied name.
    pub fn resolve(&mut self) -> Result<()> {
        loop {
            let unsatisfied: Vec<String> = self
                .symbols
                .unsatisfied(self.graph)
                .into_iter()
                .map(String::from)
                .collect();
            if unsatisfied.is_empty() {
                break;
            }
            let mut made_progress = false;
            for name in unsatisfied {
                if self.try_satisfy(&name)? {
                    made_progress = true;
                }
            }
            if !made_progress {
                break;
            }
        }
        self.finish()
    }

    fn try_satisfy(&mut self, name: &str) -> Result<bool> {
        for archive in self.archives.iter_mut() {
            let ids = archive.atoms_for_name(self.graph, name)?;
            if !ids.is_empty() {
                self.add_all(&ids)?;
                return Ok(true);
            }
        }
        for dylib in self.dylibs.iter_mut() {
            if let Some(id) = dylib.atom_for_name(self.graph, name) {
                self.add_all(&[id])?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn add_all(&mut self, ids: &[AtomId]) -> Result<()> {
        for &id in ids {
            let name = self.graph.get(id).and_then(|a| a.name.clone());
            if let Some(name) = name {
                self.symbols.add(self.graph, &name, id, self.options)?;
            }
            let refs = self
                .graph
                .get(id)
                .map(|a| a.references.iter().filter_map(|r| match &r.to_target {
                    Target::Unbound(n) => Some(n.clone()),
                    Target::Bound(_) => None,
                }).collect::<Vec<_>>())
                .unwrap_or_default();
            for r in refs {
                self.symbols.require(r);
            }
        }
        Ok(())
    }

    /// Step 2 of §4.3: rebind every by-name reference to its winner,
    /// or apply the undefined-treatment policy.
    fn finish(&mut self) -> Result<()> {
        let ids: Vec<AtomId> = self.graph.ids().collect();
        let mut dynamic_lookups: HashMap<String, AtomId> = HashMap::new();
        for id in ids {
            let targets: Vec<(usize, String)> = {
                let atom = match self.graph.get(id) {
                    Some(a) => a,
                    None => continue,
                };
                atom.references
                    .iter()
                    .enumerate()
                    .filter_map(|(i, r)| match &r.to_target {
                        Target::Unbound(name) => Some((i, name.clone())),
                        Target::Bound(_) => None,
                    })
                    .collect()
            };
            for (i, name) in targets {
                let bound = match self.symbols.winner(&name) {
                    Some(bound) => bound,
                    None => match self.options.undefined {
                        UndefinedTreatment::Error => return Err(Error::UndefinedSymbol(name)),
                        UndefinedTreatment::Warning => {
                            #[cfg(feature = "log")]
                            log::warn!("undefined symbol (downgraded to dynamic lookup): {name}");
                            dynamic_lookup_atom(self.graph, &mut dynamic_lookups, &name, SymbolTableInclusion::In)
                        }
                        UndefinedTreatment::DynamicLookup => {
                            dynamic_lookup_atom(self.graph, &mut dynamic_lookups, &name, SymbolTableInclusion::In)
                        }
                        UndefinedTreatment::Suppress => {
                            dynamic_lookup_atom(self.graph, &mut dynamic_lookups, &name, SymbolTableInclusion::NotIn)
                        }
                    },
                };
                let atom = self.graph.get_mut(id).unwrap();
                atom.references[i].to_target = Target::Bound(bound);
            }
        }
        Ok(())
    }
}

/// Materializes (once per name, memoized in `cache`) a zero-size proxy
/// atom standing in for a symbol the undefined-treatment policy has
/// downgraded from a hard error to a dynamic lookup (spec §4.3's
/// "unbound references become dynamic-lookup imports"). Shaped like
/// `DylibReader::atom_for_name`'s export proxies so `StubSynthesizer`
/// and the writer's symbol-table pass treat it identically to a real
/// dylib import.
fn dynamic_lookup_atom(
    graph: &mut AtomGraph,
    cache: &mut HashMap<String, AtomId>,
    name: &str,
    symbol_table: SymbolTableInclusion,
) -> AtomId {
    if let Some(&id) = cache.get(name) {
        return id;
    }
    let id = graph.push(Atom {
        id: AtomId(0),
        name: Some(name.to_string()),
        scope: Scope::Global,
        definition: DefinitionKind::ExternalStrong,
        symbol_table,
        kind: AtomKind::Export { weak_def: false },
        size: 0,
        alignment: Alignment::BYTE,
        dont_dead_strip: false,
        segment: String::new(),
        section: String::new(),
        must_remain_in_section: None,
        follow_on: None,
        content: ContentProvider::ZeroFill,
        references: Vec::new(),
        reader: ReaderId(u32::MAX),
        sort_order: 0,
        line_info: Vec::new(),
        section_id: None,
        section_offset: 0,
        address: 0,
    });
    cache.insert(name.to_string(), id);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::*;
    use crate::container::Arch;
    use crate::reader::dylib::{DylibMetadata, DylibReader, ExportFlags, ExportRecord};
    use std::collections::HashMap;

    fn push_symbol(graph: &mut AtomGraph, name: &str, refs: Vec<Reference>) -> AtomId {
        graph.push(Atom {
            id: AtomId(0),
            name: Some(name.to_string()),
            scope: Scope::Global,
            definition: DefinitionKind::Regular,
            symbol_table: SymbolTableInclusion::In,
            kind: AtomKind::Symbol,
            size: 4,
            alignment: Alignment::BYTE,
            dont_dead_strip: false,
            segment: "__TEXT".into(),
            section: "__text".into(),
            must_remain_in_section: None,
            follow_on: None,
            content: ContentProvider::Bytes(vec![0; 4]),
            references: refs,
            reader: ReaderId(0),
            sort_order: 0,
            line_info: Vec::new(),
            section_id: None,
            section_offset: 0,
            address: 0,
        })
    }

    #[test]
    fn resolves_dylib_import_and_rebinds_reference() {
        let mut graph = AtomGraph::new();
        let mut symbols = SymbolTable::new();
        let options = LinkOptions::new(Arch::X86_64);

        let main = push_symbol(
            &mut graph,
            "_main",
            vec![Reference::simple(0, ReferenceKind::PcRel32, Target::Unbound("_puts".into()), 0)],
        );
        symbols.add(&graph, "_main", main, &options).unwrap();

        let mut exports = HashMap::new();
        exports.insert(
            "_puts".to_string(),
            ExportRecord {
                flags: ExportFlags { weak_def: false, thread_local: false },
                offset: 0,
            },
        );
        let mut dylib = DylibReader::new(
            ReaderId(1),
            DylibMetadata {
                install_name: "/usr/lib/libSystem.B.dylib".into(),
                timestamp: 2,
                current_version: 1,
                compatibility_version: 1,
                dependents: vec![],
                parent_umbrella: None,
                allowable_clients: vec![],
                platforms: vec![],
            },
            exports,
        );

        let mut resolver = Resolver {
            graph: &mut graph,
            symbols: &mut symbols,
            archives: Vec::new(),
            dylibs: vec![&mut dylib],
            options: &options,
        };
        resolver.seed(Some("_main"));
        resolver.resolve().unwrap();

        let main_atom = graph.get(main).unwrap();
        match &main_atom.references[0].to_target {
            Target::Bound(_) => {}
            Target::Unbound(n) => panic!("expected bound target, still unbound: {n}"),
        }
    }

    #[test]
    fn undefined_symbol_errors_by_default() {
        let mut graph = AtomGraph::new();
        let mut symbols = SymbolTable::new();
        let options = LinkOptions::new(Arch::X86_64);
        let main = push_symbol(
            &mut graph,
            "_main",
            vec![Reference::simple(0, ReferenceKind::PcRel32, Target::Unbound("_missing".into()), 0)],
        );
        symbols.add(&graph, "_main", main, &options).unwrap();
        let mut resolver = Resolver {
            graph: &mut graph,
            symbols: &mut symbols,
            archives: Vec::new(),
            dylibs: Vec::new(),
            options: &options,
        };
        resolver.seed(Some("_main"));
        assert!(resolver.resolve().is_err());
    }
}
