//! Reachability-based dead-code stripping (spec §4.4).

use crate::atom::{AtomGraph, AtomId, Target};
use std::collections::{HashSet, VecDeque};

/// Seeds and runs the traversal, returning the set of live atoms.
/// `-why_live` back-chain printing is modeled as an optional
/// `why_live` target name plus the breadcrumb trail recorded in
/// `WhyLiveTrail` when that atom is first marked live (spec §4.4).
pub struct DeadStripper<'a> {
    graph: &'a AtomGraph,
    why_live: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct WhyLiveTrail {
    pub target: String,
    /// Atoms on the path from a root to `target`, root first.
    pub chain: Vec<AtomId>,
}

pub struct DeadStripResult {
    pub live: HashSet<AtomId>,
    pub why_live_trail: Option<WhyLiveTrail>,
}

impl<'a> DeadStripper<'a> {
    pub fn new(graph: &'a AtomGraph) -> Self {
        DeadStripper { graph, why_live: None }
    }

    pub fn with_why_live(mut self, name: &'a str) -> Self {
        self.why_live = Some(name);
        self
    }

    /// Runs the reachability closure from `roots` (spec §4.4: entry
    /// point, dyld stub-binding helper, `-exported_symbols_list`/`-u`
    /// names, every atom flagged `dontDeadStrip`, and — when
    /// `all_globals_are_roots` — every global-scope atom).
    pub fn run(&self, roots: impl IntoIterator<Item = AtomId>) -> DeadStripResult {
        let mut live = HashSet::new();
        let mut queue = VecDeque::new();
        let mut parent: std::collections::HashMap<AtomId, AtomId> = std::collections::HashMap::new();
        let mut found_why_live: Option<AtomId> = None;

        for root in roots {
            if live.insert(root) {
                queue.push_back(root);
                if self.root_matches_why_live(root) {
                    found_why_live = Some(root);
                }
            }
        }
        for atom in self.graph.iter() {
            if atom.dont_dead_strip && live.insert(atom.id) {
                queue.push_back(atom.id);
            }
        }

        while let Some(id) = queue.pop_front() {
            let Some(atom) = self.graph.get(id) else { continue };
            for reference in &atom.references {
                let mut targets = Vec::new();
                if let Target::Bound(t) = reference.to_target {
                    targets.push(t);
                }
                if let Some(Target::Bound(t)) = reference.from_target {
                    targets.push(t);
                }
                for target in targets {
                    if live.insert(target) {
                        parent.insert(target, id);
                        if found_why_live.is_none() && self.root_matches_why_live(target) {
                            found_why_live = Some(target);
                        }
                        queue.push_back(target);
                    }
                }
            }
            if let Some(follow) = atom.follow_on {
                if live.insert(follow) {
                    parent.insert(follow, id);
                    queue.push_back(follow);
                }
            }
        }

        let why_live_trail = self.why_live.zip(found_why_live).map(|(name, target)| {
            let mut chain = vec![target];
            let mut cur = target;
            while let Some(&p) = parent.get(&cur) {
                chain.push(p);
                cur = p;
            }
            chain.reverse();
            WhyLiveTrail {
                target: name.to_string(),
                chain,
            }
        });

        DeadStripResult { live, why_live_trail }
    }

    fn root_matches_why_live(&self, id: AtomId) -> bool {
        self.why_live
            .zip(self.graph.get(id).and_then(|a| a.name.as_deref()))
            .map_or(false, |(want, have)| want == have)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::*;

    fn push(graph: &mut AtomGraph, name: &str, refs: Vec<Reference>, dont_strip: bool) -> AtomId {
        graph.push(Atom {
            id: AtomId(0),
            name: Some(name.to_string()),
            scope: Scope::Global,
            definition: DefinitionKind::Regular,
            symbol_table: SymbolTableInclusion::In,
            kind: AtomKind::Symbol,
            size: 4,
            alignment: Alignment::BYTE,
            dont_dead_strip: dont_strip,
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
    fn prunes_unreachable_atoms_scenario_s4() {
        let mut graph = AtomGraph::new();
        let used = push(&mut graph, "_used", vec![], false);
        let _unused = push(&mut graph, "_unused", vec![], false);
        let main = push(
            &mut graph,
            "_main",
            vec![Reference::simple(0, ReferenceKind::PcRel32, Target::Bound(used), 0)],
            false,
        );
        let result = DeadStripper::new(&graph).run(vec![main]);
        assert!(result.live.contains(&main));
        assert!(result.live.contains(&used));
        assert_eq!(result.live.len(), 2);
    }

    #[test]
    fn dont_dead_strip_atoms_always_survive() {
        let mut graph = AtomGraph::new();
        let keep = push(&mut graph, "_keep", vec![], true);
        let main = push(&mut graph, "_main", vec![], false);
        let result = DeadStripper::new(&graph).run(vec![main]);
        assert!(result.live.contains(&keep));
    }

    #[test]
    fn why_live_trail_records_path_from_root() {
        let mut graph = AtomGraph::new();
        let leaf = push(&mut graph, "_leaf", vec![], false);
        let mid = push(
            &mut graph,
            "_mid",
            vec![Reference::simple(0, ReferenceKind::PcRel32, Target::Bound(leaf), 0)],
            false,
        );
        let main = push(
            &mut graph,
            "_main",
            vec![Reference::simple(0, ReferenceKind::PcRel32, Target::Bound(mid), 0)],
            false,
        );
        let result = DeadStripper::new(&graph).with_why_live("_leaf").run(vec![main]);
        let trail = result.why_live_trail.unwrap();
        assert_eq!(trail.chain.first(), Some(&main));
        assert_eq!(trail.chain.last(), Some(&leaf));
    }
}
