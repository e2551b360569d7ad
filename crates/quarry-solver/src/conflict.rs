use std::fmt;
use std::rc::Rc;

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::{DfsPostOrder, EdgeRef};
use petgraph::Direction;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ids::{ClauseId, NameId, SolvableId, StringId, VersionSetId};
use crate::pool::Pool;
use crate::provider::DependencyProvider;
use crate::solver::clause::Clause;
use crate::solver::Solver;

/// The clauses involved in an unsolvable problem.
///
/// Built by conflict analysis when a conflict surfaces at the lowest
/// decision level; turned into a [`ConflictGraph`] for explanation.
#[derive(Clone, Debug, Default)]
pub struct Conflict {
    clauses: Vec<ClauseId>,
}

impl Conflict {
    pub(crate) fn add_clause(&mut self, clause_id: ClauseId) {
        if !self.clauses.contains(&clause_id) {
            self.clauses.push(clause_id);
        }
    }

    /// Builds the graph representation of this conflict.
    ///
    /// The root of the graph is the root solvable; nodes are the solvables
    /// involved in the conflict plus sentinel nodes for unresolved
    /// dependencies and exclusions, and edges carry the requirement or the
    /// cause of a conflict.
    pub fn graph<D: DependencyProvider>(&self, solver: &Solver<D>) -> ConflictGraph {
        let mut graph = DiGraph::default();
        let mut nodes: FxHashMap<SolvableId, NodeIndex> = FxHashMap::default();
        let mut excluded_nodes: FxHashMap<StringId, NodeIndex> = FxHashMap::default();

        let root_node = Self::add_node(&mut graph, &mut nodes, SolvableId::root());
        let mut unresolved_node = None;

        for &clause_id in &self.clauses {
            match solver.clauses[clause_id].kind {
                Clause::InstallRoot => {}
                Clause::Excluded(solvable, reason) => {
                    let package_node = Self::add_node(&mut graph, &mut nodes, solvable);
                    let excluded_node = *excluded_nodes
                        .entry(reason)
                        .or_insert_with(|| graph.add_node(ConflictNode::Excluded(reason)));
                    graph.add_edge(
                        package_node,
                        excluded_node,
                        ConflictEdge::Conflict(ConflictCause::Excluded),
                    );
                }
                Clause::Learnt(..) => {
                    unreachable!("learnt clauses are expanded before explanation")
                }
                Clause::Requires(parent, version_set_id) => {
                    let package_node = Self::add_node(&mut graph, &mut nodes, parent);
                    let candidates = solver
                        .cache
                        .sorted_candidates
                        .get(&version_set_id)
                        .map(Vec::as_slice)
                        .unwrap_or_default();

                    if candidates.is_empty() {
                        let unresolved = *unresolved_node.get_or_insert_with(|| {
                            graph.add_node(ConflictNode::UnresolvedDependency)
                        });
                        graph.add_edge(
                            package_node,
                            unresolved,
                            ConflictEdge::Requires(version_set_id),
                        );
                    } else {
                        for &candidate in candidates {
                            let candidate_node =
                                Self::add_node(&mut graph, &mut nodes, candidate);
                            graph.add_edge(
                                package_node,
                                candidate_node,
                                ConflictEdge::Requires(version_set_id),
                            );
                        }
                    }
                }
                Clause::ForbidMultipleInstances(instance, other) => {
                    let instance_node = Self::add_node(&mut graph, &mut nodes, instance);
                    let other_node = Self::add_node(&mut graph, &mut nodes, other);
                    graph.add_edge(
                        instance_node,
                        other_node,
                        ConflictEdge::Conflict(ConflictCause::ForbidMultipleInstances),
                    );
                }
                Clause::Constrains(parent, forbidden, version_set_id) => {
                    let package_node = Self::add_node(&mut graph, &mut nodes, parent);
                    let forbidden_node = Self::add_node(&mut graph, &mut nodes, forbidden);
                    graph.add_edge(
                        package_node,
                        forbidden_node,
                        ConflictEdge::Conflict(ConflictCause::Constrains(version_set_id)),
                    );
                }
                Clause::Lock(locked, forbidden) => {
                    let forbidden_node = Self::add_node(&mut graph, &mut nodes, forbidden);
                    graph.add_edge(
                        root_node,
                        forbidden_node,
                        ConflictEdge::Conflict(ConflictCause::Locked(locked)),
                    );
                }
            }
        }

        ConflictGraph {
            graph,
            root_node,
            unresolved_node,
        }
    }

    fn add_node(
        graph: &mut DiGraph<ConflictNode, ConflictEdge>,
        nodes: &mut FxHashMap<SolvableId, NodeIndex>,
        solvable: SolvableId,
    ) -> NodeIndex {
        *nodes
            .entry(solvable)
            .or_insert_with(|| graph.add_node(ConflictNode::Solvable(solvable)))
    }
}

/// A node of the conflict graph.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConflictNode {
    /// A solvable involved in the conflict.
    Solvable(SolvableId),
    /// A requirement without any candidates.
    UnresolvedDependency,
    /// An exclusion reason.
    Excluded(StringId),
}

impl ConflictNode {
    fn solvable(self) -> SolvableId {
        match self {
            Self::Solvable(id) => id,
            Self::UnresolvedDependency => {
                panic!("expected a solvable node, found an unresolved-dependency node")
            }
            Self::Excluded(_) => panic!("expected a solvable node, found an excluded node"),
        }
    }
}

/// Why two nodes of the conflict graph conflict.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConflictCause {
    /// The target candidate is forbidden because this candidate is pinned.
    Locked(SolvableId),
    /// The target candidate violates a constraint of the source.
    Constrains(VersionSetId),
    /// Two candidates of one name cannot both be installed.
    ForbidMultipleInstances,
    /// The target candidate was excluded.
    Excluded,
}

/// An edge of the conflict graph.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConflictEdge {
    /// The target node is a candidate for this requirement of the source.
    Requires(VersionSetId),
    /// The target node is involved in a conflict with the source.
    Conflict(ConflictCause),
}

impl ConflictEdge {
    fn requires(self) -> Option<VersionSetId> {
        match self {
            Self::Requires(version_set_id) => Some(version_set_id),
            Self::Conflict(_) => None,
        }
    }

    fn is_conflict(self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Candidates merged for display because they share a name and occupy the
/// same position in the graph.
#[derive(Debug)]
struct MergedConflictNode {
    ids: Vec<SolvableId>,
}

/// Graph representation of an unsolvable problem.
pub struct ConflictGraph {
    pub graph: DiGraph<ConflictNode, ConflictEdge>,
    pub root_node: NodeIndex,
    pub unresolved_node: Option<NodeIndex>,
}

impl ConflictGraph {
    /// Nodes that could be installed if their siblings in the conflict were
    /// ignored: no conflict edge touches them and each of their requirements
    /// has at least one installable candidate.
    fn installable_set(&self) -> FxHashSet<NodeIndex> {
        let mut installable = FxHashSet::default();
        let mut dfs = DfsPostOrder::new(&self.graph, self.root_node);
        while let Some(node) = dfs.next(&self.graph) {
            if Some(node) == self.unresolved_node {
                continue;
            }
            let conflicting = self
                .graph
                .edges_directed(node, Direction::Incoming)
                .any(|edge| edge.weight().is_conflict())
                || self
                    .graph
                    .edges_directed(node, Direction::Outgoing)
                    .any(|edge| edge.weight().is_conflict());
            if conflicting {
                continue;
            }

            let mut requirements: FxHashMap<VersionSetId, bool> = FxHashMap::default();
            for edge in self.graph.edges_directed(node, Direction::Outgoing) {
                if let Some(version_set_id) = edge.weight().requires() {
                    let satisfied = installable.contains(&edge.target());
                    *requirements.entry(version_set_id).or_insert(false) |= satisfied;
                }
            }
            if requirements.values().all(|&satisfied| satisfied) {
                installable.insert(node);
            }
        }
        installable
    }

    /// Nodes that cannot be installed because some requirement bottoms out
    /// in a missing dependency (and not in a conflict).
    pub fn missing_set(&self) -> FxHashSet<NodeIndex> {
        let mut missing = FxHashSet::default();
        let Some(unresolved) = self.unresolved_node else {
            return missing;
        };
        missing.insert(unresolved);

        let mut dfs = DfsPostOrder::new(&self.graph, self.root_node);
        while let Some(node) = dfs.next(&self.graph) {
            let outgoing_conflicts = self
                .graph
                .edges_directed(node, Direction::Outgoing)
                .any(|edge| edge.weight().is_conflict());
            if outgoing_conflicts {
                continue;
            }

            let mut requirements: FxHashMap<VersionSetId, Vec<NodeIndex>> = FxHashMap::default();
            for edge in self.graph.edges_directed(node, Direction::Outgoing) {
                if let Some(version_set_id) = edge.weight().requires() {
                    requirements
                        .entry(version_set_id)
                        .or_default()
                        .push(edge.target());
                }
            }
            if requirements.is_empty() {
                continue;
            }
            if requirements
                .values()
                .any(|targets| targets.iter().all(|target| missing.contains(target)))
            {
                missing.insert(node);
            }
        }
        missing
    }

    /// Groups candidate nodes that share a name as well as predecessor and
    /// successor sets; they print as one entry with merged versions.
    fn simplify(&self, pool: &Pool) -> FxHashMap<SolvableId, Rc<MergedConflictNode>> {
        type GroupKey = (NameId, Vec<NodeIndex>, Vec<NodeIndex>);

        let mut groups: FxHashMap<GroupKey, Vec<SolvableId>> = FxHashMap::default();
        for node in self.graph.node_indices() {
            let ConflictNode::Solvable(solvable_id) = self.graph[node] else {
                continue;
            };
            let Some(package) = pool.resolve_solvable(solvable_id).package() else {
                continue;
            };

            let mut predecessors: Vec<NodeIndex> = self
                .graph
                .edges_directed(node, Direction::Incoming)
                .map(|edge| edge.source())
                .collect();
            predecessors.sort_unstable();
            predecessors.dedup();
            let mut successors: Vec<NodeIndex> = self
                .graph
                .edges_directed(node, Direction::Outgoing)
                .map(|edge| edge.target())
                .collect();
            successors.sort_unstable();
            successors.dedup();

            groups
                .entry((package.name, predecessors, successors))
                .or_default()
                .push(solvable_id);
        }

        let mut merged = FxHashMap::default();
        for (_, mut ids) in groups {
            if ids.len() <= 1 {
                continue;
            }
            // Newest first, matching candidate preference order.
            ids.sort_by(|&a, &b| {
                let left = &pool.resolve_solvable(a).package().unwrap().version;
                let right = &pool.resolve_solvable(b).package().unwrap().version;
                right.cmp(left)
            });
            let node = Rc::new(MergedConflictNode { ids: ids.clone() });
            for id in ids {
                merged.insert(id, Rc::clone(&node));
            }
        }
        merged
    }

    /// Renders the conflict as an indented explanation tree.
    pub fn display<'a>(&'a self, pool: &'a Pool) -> DisplayUnsat<'a> {
        DisplayUnsat::new(self, pool)
    }
}

#[derive(Copy, Clone)]
enum ChildOrder {
    HasRemainingSiblings,
    Last,
}

/// Tracks tree-drawing prefixes while walking the explanation graph.
#[derive(Clone)]
struct Indenter {
    levels: Vec<ChildOrder>,
    top_level_indent: bool,
}

impl Indenter {
    fn new(top_level_indent: bool) -> Self {
        Self {
            levels: Vec::new(),
            top_level_indent,
        }
    }

    fn is_at_top_level(&self) -> bool {
        self.levels.len() == 1
    }

    fn push_level(&self) -> Self {
        let mut child = self.clone();
        child.levels.push(ChildOrder::HasRemainingSiblings);
        child
    }

    fn set_last(&mut self) {
        if let Some(last) = self.levels.last_mut() {
            *last = ChildOrder::Last;
        }
    }

    fn get_indent(&self) -> String {
        let mut indent = String::new();
        let deepest = self.levels.len().saturating_sub(1);
        for (level, order) in self.levels.iter().enumerate() {
            if level == 0 && !self.top_level_indent {
                continue;
            }
            let prefix = if level == deepest {
                match order {
                    ChildOrder::HasRemainingSiblings => "├─",
                    ChildOrder::Last => "└─",
                }
            } else {
                match order {
                    ChildOrder::HasRemainingSiblings => "│ ",
                    ChildOrder::Last => "  ",
                }
            };
            indent.push_str(prefix);
            indent.push(' ');
        }
        indent
    }
}

enum DisplayOp {
    Requirement(VersionSetId, Vec<EdgeIndex>),
    Candidate(NodeIndex),
}

/// Formats a [`ConflictGraph`] as a human-readable tree, with installable
/// and non-installable branches annotated.
pub struct DisplayUnsat<'a> {
    graph: &'a ConflictGraph,
    pool: &'a Pool,
    merged_candidates: FxHashMap<SolvableId, Rc<MergedConflictNode>>,
    installable_set: FxHashSet<NodeIndex>,
}

impl<'a> DisplayUnsat<'a> {
    fn new(graph: &'a ConflictGraph, pool: &'a Pool) -> Self {
        Self {
            graph,
            pool,
            merged_candidates: graph.simplify(pool),
            installable_set: graph.installable_set(),
        }
    }

    fn display_candidate(&self, solvable_id: SolvableId) -> String {
        let package = self
            .pool
            .resolve_solvable(solvable_id)
            .package()
            .expect("candidate nodes are packages");
        let name = self.pool.resolve_name(package.name);
        match self.merged_candidates.get(&solvable_id) {
            Some(merged) => {
                let versions = merged
                    .ids
                    .iter()
                    .map(|&id| {
                        self.pool
                            .resolve_solvable(id)
                            .package()
                            .unwrap()
                            .version
                            .to_string()
                    })
                    .collect::<Vec<_>>()
                    .join(" | ");
                format!("{name} {versions}")
            }
            None => format!("{name} {}", package.version),
        }
    }

    /// Groups the requires edges among `edges` by version set, ordered with
    /// installable requirements first.
    fn chunk_requirements(&self, edges: &[EdgeIndex]) -> Vec<(VersionSetId, Vec<EdgeIndex>)> {
        let graph = &self.graph.graph;
        let mut chunked: Vec<(VersionSetId, Vec<EdgeIndex>)> = Vec::new();
        for &edge in edges {
            let Some(version_set_id) = graph[edge].requires() else {
                continue;
            };
            match chunked.iter_mut().find(|(vs, _)| *vs == version_set_id) {
                Some((_, group)) => group.push(edge),
                None => chunked.push((version_set_id, vec![edge])),
            }
        }
        // Installable requirements print first, so the conflicting tail is
        // read last.
        chunked.sort_by_key(|(_, group)| {
            let installable = group.iter().any(|&edge| {
                let (_, target) = graph.edge_endpoints(edge).unwrap();
                self.installable_set.contains(&target)
            });
            !installable
        });
        chunked
    }

    fn fmt_graph(
        &self,
        f: &mut fmt::Formatter<'_>,
        top_level_edges: &[EdgeIndex],
        top_level_indent: bool,
    ) -> fmt::Result {
        let graph = &self.graph.graph;
        let mut reported: FxHashSet<SolvableId> = FxHashSet::default();

        let indenter = Indenter::new(top_level_indent);
        let chunked = self.chunk_requirements(top_level_edges);
        let mut stack: Vec<(DisplayOp, Indenter)> = chunked
            .into_iter()
            .rev()
            .map(|(version_set_id, edges)| {
                (
                    DisplayOp::Requirement(version_set_id, edges),
                    indenter.push_level(),
                )
            })
            .collect();
        if let Some((_, indenter)) = stack.first_mut() {
            // The element popped last is the visually last sibling.
            indenter.set_last();
        }

        while let Some((op, indenter)) = stack.pop() {
            let top_level = indenter.is_at_top_level();
            let indent = indenter.get_indent();

            match op {
                DisplayOp::Requirement(version_set_id, edges) => {
                    debug_assert!(!edges.is_empty());
                    let installable = edges.iter().any(|&edge| {
                        let (_, target) = graph.edge_endpoints(edge).unwrap();
                        self.installable_set.contains(&target)
                    });
                    let requirement = self.pool.display_version_set(version_set_id);
                    let target_of = |edge: EdgeIndex| graph.edge_endpoints(edge).unwrap().1;
                    let missing = edges
                        .iter()
                        .all(|&edge| Some(target_of(edge)) == self.graph.unresolved_node);

                    if missing {
                        if top_level {
                            writeln!(f, "{indent}No candidates were found for {requirement}.")?;
                        } else {
                            writeln!(
                                f,
                                "{indent}{requirement}, for which no candidates were found.",
                            )?;
                        }
                    } else if installable {
                        if top_level {
                            writeln!(
                                f,
                                "{indent}{requirement} can be installed with any of the following options:",
                            )?;
                        } else {
                            writeln!(
                                f,
                                "{indent}{requirement}, which can be installed with any of the following options:",
                            )?;
                        }
                        let children: Vec<NodeIndex> = edges
                            .iter()
                            .map(|&edge| target_of(edge))
                            .filter(|target| self.installable_set.contains(target))
                            .collect();
                        self.push_children(&mut stack, &indenter, &children, &mut reported);
                    } else {
                        if top_level {
                            writeln!(
                                f,
                                "{indent}{requirement} cannot be installed because there are no viable options:",
                            )?;
                        } else {
                            writeln!(
                                f,
                                "{indent}{requirement}, which cannot be installed because there are no viable options:",
                            )?;
                        }
                        let children: Vec<NodeIndex> =
                            edges.iter().map(|&edge| target_of(edge)).collect();
                        self.push_children(&mut stack, &indenter, &children, &mut reported);
                    }
                }
                DisplayOp::Candidate(node) => {
                    let solvable_id = graph[node].solvable();
                    if reported.contains(&solvable_id) {
                        continue;
                    }
                    if let Some(merged) = self.merged_candidates.get(&solvable_id) {
                        reported.extend(merged.ids.iter().copied());
                    }
                    let candidate = self.display_candidate(solvable_id);

                    let excluded = graph
                        .edges_directed(node, Direction::Outgoing)
                        .find_map(|edge| match (edge.weight(), &graph[edge.target()]) {
                            (
                                ConflictEdge::Conflict(ConflictCause::Excluded),
                                ConflictNode::Excluded(reason),
                            ) => Some(*reason),
                            _ => None,
                        });
                    let requires_edges: Vec<EdgeIndex> = graph
                        .edges_directed(node, Direction::Outgoing)
                        .filter(|edge| edge.weight().requires().is_some())
                        .map(|edge| edge.id())
                        .collect();
                    let conflicting = graph
                        .edges_directed(node, Direction::Outgoing)
                        .chain(graph.edges_directed(node, Direction::Incoming))
                        .any(|edge| edge.weight().is_conflict());

                    if let Some(reason) = excluded {
                        writeln!(
                            f,
                            "{indent}{candidate} is excluded because {}",
                            self.pool.resolve_string(reason)
                        )?;
                    } else if !requires_edges.is_empty() {
                        writeln!(f, "{indent}{candidate} would require")?;
                        let chunked = self.chunk_requirements(&requires_edges);
                        let mut children: Vec<(DisplayOp, Indenter)> = chunked
                            .into_iter()
                            .rev()
                            .map(|(version_set_id, edges)| {
                                (
                                    DisplayOp::Requirement(version_set_id, edges),
                                    indenter.push_level(),
                                )
                            })
                            .collect();
                        if let Some((_, indenter)) = children.first_mut() {
                            indenter.set_last();
                        }
                        stack.extend(children);
                    } else if conflicting {
                        writeln!(
                            f,
                            "{indent}{candidate}, which conflicts with any installable versions previously reported",
                        )?;
                    } else {
                        writeln!(f, "{indent}{candidate}")?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Pushes candidate children on the stack, deduplicating merged
    /// candidates so every merged group prints once.
    fn push_children(
        &self,
        stack: &mut Vec<(DisplayOp, Indenter)>,
        indenter: &Indenter,
        children: &[NodeIndex],
        reported: &FxHashSet<SolvableId>,
    ) {
        let graph = &self.graph.graph;
        let mut deduplicated: Vec<(DisplayOp, Indenter)> = Vec::new();
        let mut merged_and_seen: FxHashSet<SolvableId> = FxHashSet::default();
        for &child in children {
            let solvable_id = graph[child].solvable();
            if merged_and_seen.contains(&solvable_id) || reported.contains(&solvable_id) {
                continue;
            }
            if let Some(merged) = self.merged_candidates.get(&solvable_id) {
                merged_and_seen.extend(merged.ids.iter().copied());
            }
            deduplicated.push((DisplayOp::Candidate(child), indenter.push_level()));
        }
        deduplicated.reverse();
        if let Some((_, indenter)) = deduplicated.first_mut() {
            indenter.set_last();
        }
        stack.extend(deduplicated);
    }
}

impl fmt::Display for DisplayUnsat<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = &self.graph.graph;
        let root_edges: Vec<EdgeIndex> = graph
            .edges_directed(self.graph.root_node, Direction::Outgoing)
            .map(|edge| edge.id())
            .collect();
        let root_requires: Vec<EdgeIndex> = root_edges
            .iter()
            .copied()
            .filter(|&edge| graph[edge].requires().is_some())
            .collect();

        // When every top-level requirement simply has no candidates there is
        // no conflict to draw, only the missing reports.
        let only_missing = !root_requires.is_empty()
            && root_requires.iter().all(|&edge| {
                let (_, target) = graph.edge_endpoints(edge).unwrap();
                Some(target) == self.graph.unresolved_node
            });

        if only_missing {
            self.fmt_graph(f, &root_requires, false)?;
        } else {
            writeln!(f, "The following packages are incompatible")?;
            self.fmt_graph(f, &root_requires, true)?;

            // Conflicts anchored at the root, e.g. locked packages.
            for &edge in &root_edges {
                let (_, target) = graph.edge_endpoints(edge).unwrap();
                if let ConflictEdge::Conflict(ConflictCause::Locked(locked)) = graph[edge] {
                    let candidate = self.display_candidate(graph[target].solvable());
                    writeln!(
                        f,
                        "{} is locked at {}, but another version is required as reported above",
                        candidate,
                        self.pool
                            .resolve_solvable(locked)
                            .package()
                            .map(|package| package.version.to_string())
                            .unwrap_or_default(),
                    )?;
                }
            }
        }

        Ok(())
    }
}
