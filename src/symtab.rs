//! The global symbol table and its override lattice (spec §4.3's
//! table, transcribed directly into `SymbolTable::add`'s match arms).

use crate::atom::{AtomGraph, AtomId, DefinitionKind};
use crate::error::{Error, Result};
use crate::options::{CommonsMode, LinkOptions};
use std::collections::{HashMap, HashSet};

/// Outcome of adding a candidate atom to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The candidate became (or stayed) the winner.
    Accepted,
    /// The existing winner was kept; the candidate is dead.
    Rejected,
}

/// Process-wide unique mapping from external symbol name to its
/// current winning atom, plus the set of names still required to
/// drive the resolver's convergence loop (spec §2 item 5).
#[derive(Debug, Default)]
pub struct SymbolTable {
    winners: HashMap<String, AtomId>,
    required: HashSet<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn winner(&self, name: &str) -> Option<AtomId> {
        self.winners.get(name).copied()
    }

    pub fn require(&mut self, name: impl Into<String>) {
        self.required.insert(name.into());
    }

    pub fn required_names(&self) -> impl Iterator<Item = &String> {
        self.required.iter()
    }

    /// Names that are required but have no winner yet, or whose
    /// winner is a still-weak global (spec §4.3 step 1.1: "no winner
    /// or a weak global winner").
    pub fn unsatisfied<'a>(&'a self, graph: &'a AtomGraph) -> Vec<&'a str> {
        self.required
            .iter()
            .filter(|name| match self.winners.get(name.as_str()) {
                None => true,
                Some(&id) => graph
                    .get(id)
                    .map(|a| a.definition == DefinitionKind::Weak)
                    .unwrap_or(true),
            })
            .map(|s| s.as_str())
            .collect()
    }

    /// Applies the override lattice of spec §4.3 to decide whether
    /// `candidate` replaces the current winner for `name`.
    pub fn add(
        &mut self,
        graph: &AtomGraph,
        name: &str,
        candidate: AtomId,
        options: &LinkOptions,
    ) -> Result<AddOutcome> {
        let cand = graph.get(candidate).ok_or_else(|| {
            Error::Malformed(format!("dangling candidate atom for symbol {name}"))
        })?;

        let existing_id = match self.winners.get(name) {
            None => {
                self.winners.insert(name.to_string(), candidate);
                return Ok(AddOutcome::Accepted);
            }
            Some(&id) => id,
        };
        let existing = graph
            .get(existing_id)
            .ok_or_else(|| Error::Malformed(format!("dangling existing atom for symbol {name}")))?;

        use DefinitionKind::*;
        let accept = match (existing.definition, cand.definition) {
            (Regular, Regular) => return Err(Error::DuplicateSymbol(name.to_string())),
            (Regular, _) => false,

            (Weak, Regular) => true,
            (Weak, Weak) => cand.alignment.value() > existing.alignment.value(),
            (Weak, Tentative) => true,
            (Weak, ExternalStrong) => false,
            (Weak, ExternalWeak) => false,

            (Tentative, Regular) => true,
            (Tentative, Weak) => true,
            (Tentative, Tentative) => {
                if cand.size < existing.size {
                    false
                } else {
                    if cand.size > existing.size && cand.alignment.value() < existing.alignment.value() {
                        #[cfg(feature = "log")]
                        log::warn!(
                            "tentative definition {name} grew but lost alignment ({} -> {})",
                            existing.alignment.value(),
                            cand.alignment.value()
                        );
                    }
                    true
                }
            }
            (Tentative, ExternalStrong) | (Tentative, ExternalWeak) => {
                return self.apply_commons_policy(name, options)
            }

            (ExternalStrong, Regular) => true,
            (ExternalStrong, Weak) => true,
            (ExternalStrong, Tentative) => return self.apply_commons_policy(name, options),
            (ExternalStrong, ExternalStrong) => {
                return Err(Error::DuplicateSymbol(name.to_string()))
            }
            (ExternalStrong, ExternalWeak) => false,

            (ExternalWeak, Regular) => true,
            (ExternalWeak, Weak) => true,
            (ExternalWeak, Tentative) => return self.apply_commons_policy(name, options),
            (ExternalWeak, ExternalStrong) => true,
            (ExternalWeak, ExternalWeak) => false,
        };

        if accept {
            self.winners.insert(name.to_string(), candidate);
            Ok(AddOutcome::Accepted)
        } else {
            Ok(AddOutcome::Rejected)
        }
    }

    fn apply_commons_policy(&mut self, name: &str, options: &LinkOptions) -> Result<AddOutcome> {
        match options.commons_mode {
            CommonsMode::UseDylibs => Ok(AddOutcome::Accepted),
            CommonsMode::OverrideDylibs => Ok(AddOutcome::Rejected),
            CommonsMode::ConflictError => Err(Error::CommonsVsDylib(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::*;

    fn atom(g: &mut AtomGraph, name: &str, def: DefinitionKind, size: u64, align_pow: u8) -> AtomId {
        g.push(Atom {
            id: AtomId(0),
            name: Some(name.to_string()),
            scope: Scope::Global,
            definition: def,
            symbol_table: SymbolTableInclusion::In,
            kind: AtomKind::Symbol,
            size,
            alignment: Alignment::pow2(align_pow),
            dont_dead_strip: false,
            segment: "__DATA".into(),
            section: "__data".into(),
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
        })
    }

    #[test]
    fn regular_vs_regular_is_duplicate_error() {
        let mut g = AtomGraph::new();
        let mut t = SymbolTable::new();
        let opts = LinkOptions::new(crate::container::Arch::X86_64);
        let a = atom(&mut g, "_x", DefinitionKind::Regular, 4, 0);
        let b = atom(&mut g, "_x", DefinitionKind::Regular, 4, 0);
        t.add(&g, "_x", a, &opts).unwrap();
        assert!(t.add(&g, "_x", b, &opts).is_err());
    }

    #[test]
    fn tentative_vs_strong_keeps_strong_scenario_s2() {
        let mut g = AtomGraph::new();
        let mut t = SymbolTable::new();
        let opts = LinkOptions::new(crate::container::Arch::X86_64);
        let tentative = atom(&mut g, "_x", DefinitionKind::Tentative, 8, 0);
        let strong = atom(&mut g, "_x", DefinitionKind::Regular, 4, 0);
        t.add(&g, "_x", tentative, &opts).unwrap();
        let outcome = t.add(&g, "_x", strong, &opts).unwrap();
        assert_eq!(outcome, AddOutcome::Accepted);
        assert_eq!(t.winner("_x"), Some(strong));
    }

    #[test]
    fn weak_coalescing_prefers_larger_alignment_scenario_s3() {
        let mut g = AtomGraph::new();
        let mut t = SymbolTable::new();
        let opts = LinkOptions::new(crate::container::Arch::X86_64);
        let low = atom(&mut g, "_w", DefinitionKind::Weak, 4, 2);
        let high = atom(&mut g, "_w", DefinitionKind::Weak, 4, 4);
        t.add(&g, "_w", low, &opts).unwrap();
        let outcome = t.add(&g, "_w", high, &opts).unwrap();
        assert_eq!(outcome, AddOutcome::Accepted);
        assert_eq!(t.winner("_w"), Some(high));

        let mut g2 = AtomGraph::new();
        let mut t2 = SymbolTable::new();
        let high2 = atom(&mut g2, "_w", DefinitionKind::Weak, 4, 4);
        let low2 = atom(&mut g2, "_w", DefinitionKind::Weak, 4, 2);
        t2.add(&g2, "_w", high2, &opts).unwrap();
        let outcome2 = t2.add(&g2, "_w", low2, &opts).unwrap();
        assert_eq!(outcome2, AddOutcome::Rejected);
        assert_eq!(t2.winner("_w"), Some(high2));
    }

    #[test]
    fn tentative_vs_dylib_conflict_error_by_default() {
        let mut g = AtomGraph::new();
        let mut t = SymbolTable::new();
        let opts = LinkOptions::new(crate::container::Arch::X86_64);
        let tentative = atom(&mut g, "_x", DefinitionKind::Tentative, 8, 0);
        let dylib = atom(&mut g, "_x", DefinitionKind::ExternalStrong, 0, 0);
        t.add(&g, "_x", tentative, &opts).unwrap();
        assert!(t.add(&g, "_x", dylib, &opts).is_err());
    }
}
