// Call graph spanning every module of a session.
// One node per function, one edge per call site, tagged intra- or cross-module.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::domain::ir::CallSiteId;
use crate::domain::project::{FuncId, Project};
use crate::domain::store::FunctionStore;
use crate::domain::symbols::{ResolvedTarget, SymbolTable};

/// Index of an edge inside its `CallGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub usize);

/// Why an edge was not inlined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    NoBody,
    SignatureMismatch,
    Recursive,
    DepthExceeded,
    Unprofitable,
    NotVisible,
    Cancelled,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoBody => "no-body",
            SkipReason::SignatureMismatch => "signature-mismatch",
            SkipReason::Recursive => "recursive",
            SkipReason::DepthExceeded => "depth-exceeded",
            SkipReason::Unprofitable => "unprofitable",
            SkipReason::NotVisible => "not-visible",
            SkipReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeState {
    Pending,
    Inlined,
    Skipped(SkipReason),
}

impl EdgeState {
    pub fn is_pending(&self) -> bool {
        matches!(self, EdgeState::Pending)
    }
}

/// A caller's call site and where it leads.
#[derive(Debug, Clone, PartialEq)]
pub struct CallGraphEdge {
    pub id: EdgeId,
    pub caller: FuncId,
    pub site: CallSiteId,
    pub callee: String,
    pub target: ResolvedTarget,
    pub cross_module: bool,
    pub state: EdgeState,
    /// Number of splices that produced this call site (0 for original calls).
    pub depth: u32,
    /// Edge whose splice exposed this one.
    pub parent: Option<EdgeId>,
}

impl CallGraphEdge {
    pub fn callee_id(&self) -> Option<FuncId> {
        match self.target {
            ResolvedTarget::Definition(id) => Some(id),
            _ => None,
        }
    }
}

/// A node in the call graph.
#[derive(Debug, Clone)]
pub struct CallGraphNode {
    pub id: FuncId,
    pub outgoing: Vec<EdgeId>,
    pub incoming: Vec<EdgeId>,
}

/// The call graph itself.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    nodes: Vec<FuncId>,
    edges: Vec<CallGraphEdge>,
    adjacency: HashMap<FuncId, CallGraphNode>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: FuncId) {
        if !self.adjacency.contains_key(&id) {
            self.nodes.push(id);
            self.adjacency.insert(
                id,
                CallGraphNode {
                    id,
                    outgoing: Vec::new(),
                    incoming: Vec::new(),
                },
            );
        }
    }

    /// Append an edge; both endpoints become nodes when they are functions.
    pub fn add_edge(
        &mut self,
        caller: FuncId,
        site: CallSiteId,
        callee: &str,
        target: ResolvedTarget,
        cross_module: bool,
        depth: u32,
        parent: Option<EdgeId>,
    ) -> EdgeId {
        let id = EdgeId(self.edges.len());
        self.add_node(caller);
        if let ResolvedTarget::Definition(callee_id) = target {
            self.add_node(callee_id);
            if let Some(node) = self.adjacency.get_mut(&callee_id) {
                node.incoming.push(id);
            }
        }
        if let Some(node) = self.adjacency.get_mut(&caller) {
            node.outgoing.push(id);
        }
        self.edges.push(CallGraphEdge {
            id,
            caller,
            site,
            callee: callee.to_string(),
            target,
            cross_module,
            state: EdgeState::Pending,
            depth,
            parent,
        });
        id
    }

    pub fn nodes(&self) -> &[FuncId] {
        &self.nodes
    }

    pub fn edges(&self) -> &[CallGraphEdge] {
        &self.edges
    }

    pub fn edge(&self, id: EdgeId) -> &CallGraphEdge {
        &self.edges[id.0]
    }

    pub fn set_state(&mut self, id: EdgeId, state: EdgeState) {
        self.edges[id.0].state = state;
    }

    pub fn outgoing(&self, func: FuncId) -> &[EdgeId] {
        self.adjacency
            .get(&func)
            .map(|n| n.outgoing.as_slice())
            .unwrap_or(&[])
    }

    pub fn incoming(&self, func: FuncId) -> &[EdgeId] {
        self.adjacency
            .get(&func)
            .map(|n| n.incoming.as_slice())
            .unwrap_or(&[])
    }

    pub fn pending(&self) -> impl Iterator<Item = &CallGraphEdge> {
        self.edges.iter().filter(|e| e.state.is_pending())
    }

    /// Whether `to` is reachable from `from` along edges that are still (or
    /// may become) calls: Pending, Inlined, or already Skipped as recursive.
    pub fn reaches(&self, from: FuncId, to: FuncId) -> bool {
        let mut visited = HashSet::new();
        let mut worklist = vec![from];
        while let Some(func) = worklist.pop() {
            if func == to {
                return true;
            }
            if !visited.insert(func) {
                continue;
            }
            for edge_id in self.outgoing(func) {
                let edge = self.edge(*edge_id);
                let live = matches!(
                    edge.state,
                    EdgeState::Pending | EdgeState::Inlined | EdgeState::Skipped(SkipReason::Recursive)
                );
                if let (true, Some(next)) = (live, edge.callee_id()) {
                    if !visited.contains(&next) {
                        worklist.push(next);
                    }
                }
            }
        }
        false
    }

    /// Split into independent groups: connected components of the
    /// "touches the same function" relation over Definition edges.
    ///
    /// Groups are ordered by their first function in discovery order; each
    /// group keeps its edges in their original relative order, renumbered.
    pub fn partition(&self) -> Vec<CallGraph> {
        let mut uf = UnionFind::new(&self.nodes);
        for edge in &self.edges {
            if let Some(callee) = edge.callee_id() {
                uf.union(edge.caller, callee);
            }
        }

        let mut sorted_nodes = self.nodes.clone();
        sorted_nodes.sort();

        let mut group_of: HashMap<FuncId, usize> = HashMap::new();
        let mut groups: Vec<CallGraph> = Vec::new();
        for node in &sorted_nodes {
            let root = uf.find(*node);
            let gi = *group_of.entry(root).or_insert_with(|| {
                groups.push(CallGraph::new());
                groups.len() - 1
            });
            groups[gi].add_node(*node);
        }

        let mut remap: HashMap<EdgeId, EdgeId> = HashMap::new();
        for edge in &self.edges {
            let gi = group_of[&uf.find(edge.caller)];
            let group = &mut groups[gi];
            let parent = edge.parent.and_then(|p| remap.get(&p).copied());
            let new_id = group.add_edge(
                edge.caller,
                edge.site,
                &edge.callee,
                edge.target,
                edge.cross_module,
                edge.depth,
                parent,
            );
            group.set_state(new_id, edge.state);
            remap.insert(edge.id, new_id);
        }

        groups.retain(|g| !g.edges.is_empty());
        groups
    }
}

struct UnionFind {
    parent: HashMap<FuncId, FuncId>,
}

impl UnionFind {
    fn new(nodes: &[FuncId]) -> Self {
        Self {
            parent: nodes.iter().map(|n| (*n, *n)).collect(),
        }
    }

    fn find(&mut self, node: FuncId) -> FuncId {
        let mut root = node;
        while let Some(&p) = self.parent.get(&root) {
            if p == root {
                break;
            }
            root = p;
        }
        // path compression
        let mut cur = node;
        while cur != root {
            let next = self.parent.get(&cur).copied().unwrap_or(root);
            self.parent.insert(cur, root);
            cur = next;
        }
        root
    }

    fn union(&mut self, a: FuncId, b: FuncId) {
        let ra = self.find(a);
        let rb = self.find(b);
        // the smaller id becomes the root so roots are stable across runs
        match ra.cmp(&rb) {
            std::cmp::Ordering::Less => {
                self.parent.insert(rb, ra);
            }
            std::cmp::Ordering::Greater => {
                self.parent.insert(ra, rb);
            }
            std::cmp::Ordering::Equal => {}
        }
    }
}

/// Builds the graph from a project and keeps it in step with spliced bodies.
pub struct CallGraphBuilder<'a> {
    symbols: &'a SymbolTable,
}

impl<'a> CallGraphBuilder<'a> {
    pub fn new(symbols: &'a SymbolTable) -> Self {
        Self { symbols }
    }

    /// One node per function, one edge per call site, in discovery order.
    pub fn build(&self, project: &Project) -> CallGraph {
        let mut graph = CallGraph::new();
        for (id, _) in project.function_ids() {
            graph.add_node(id);
        }
        for (caller, func) in project.function_ids() {
            for (site, callee, _) in func.call_sites() {
                self.push_edge(&mut graph, caller, site, callee, 0, None);
            }
        }
        graph
    }

    /// Re-scan `caller` and append edges for call sites the graph does not
    /// know yet; `depth_of` gives the nesting depth of each new site. Nodes
    /// other than `caller` are left untouched.
    pub fn on_body_changed(
        &self,
        graph: &mut CallGraph,
        store: &FunctionStore,
        caller: FuncId,
        depth_of: impl Fn(CallSiteId) -> u32,
        parent: Option<EdgeId>,
    ) -> Vec<EdgeId> {
        let known: HashSet<CallSiteId> = graph
            .outgoing(caller)
            .iter()
            .map(|e| graph.edge(*e).site)
            .collect();

        let fresh: Vec<(CallSiteId, String)> = store
            .read(caller, |f| {
                f.call_sites()
                    .filter(|(site, _, _)| !known.contains(site))
                    .map(|(site, callee, _)| (site, callee.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        fresh
            .into_iter()
            .map(|(site, callee)| self.push_edge(graph, caller, site, &callee, depth_of(site), parent))
            .collect()
    }

    fn push_edge(
        &self,
        graph: &mut CallGraph,
        caller: FuncId,
        site: CallSiteId,
        callee: &str,
        depth: u32,
        parent: Option<EdgeId>,
    ) -> EdgeId {
        let target = self.symbols.resolve(callee);
        // A body that is not in this session lives in some other unit.
        let cross_module = match target {
            ResolvedTarget::Definition(id) => id.module != caller.module,
            ResolvedTarget::Declaration | ResolvedTarget::Unresolved => true,
        };
        graph.add_edge(caller, site, callee, target, cross_module, depth, parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ir::{Function, Linkage, Module, Op, Operand};

    fn call(callee: &str) -> Op {
        Op::call(Some("r"), callee, vec![Operand::var("x")])
    }

    fn def(name: &str, body: Vec<Op>) -> Function {
        Function::define(name, Linkage::External, &["x"], body)
    }

    fn project() -> Project {
        Project::from_modules(vec![
            Module::new(
                "caller",
                vec![
                    Function::declare("callee", &["x"]),
                    def("near", vec![call("callee"), Op::ret(Operand::var("r"))]),
                    def("top", vec![call("near"), call("far"), Op::ret(Operand::var("r"))]),
                    def("far", vec![call("simple_callee"), Op::ret(Operand::var("r"))]),
                ],
            ),
            Module::new("callee", vec![def("callee", vec![Op::ret(Operand::var("x"))])]),
        ])
    }

    #[test]
    fn test_build_tags_cross_module_edges() {
        let project = project();
        let symbols = SymbolTable::build(&project).unwrap();
        let graph = CallGraphBuilder::new(&symbols).build(&project);

        assert_eq!(graph.nodes().len(), 5);
        let summary: Vec<(&str, bool)> = graph
            .edges()
            .iter()
            .map(|e| (e.callee.as_str(), e.cross_module))
            .collect();
        assert_eq!(
            summary,
            vec![("callee", true), ("near", false), ("far", false), ("simple_callee", true)]
        );
        assert_eq!(graph.edges()[3].target, ResolvedTarget::Unresolved);
        assert_eq!(graph.incoming(FuncId::new(1, 0)).len(), 1);
    }

    #[test]
    fn test_reaches_follows_live_edges_only() {
        let project = Project::from_modules(vec![Module::new(
            "m",
            vec![
                def("a", vec![call("b"), Op::ret(Operand::var("r"))]),
                def("b", vec![call("a"), Op::ret(Operand::var("r"))]),
            ],
        )]);
        let symbols = SymbolTable::build(&project).unwrap();
        let mut graph = CallGraphBuilder::new(&symbols).build(&project);
        let (a, b) = (FuncId::new(0, 0), FuncId::new(0, 1));

        assert!(graph.reaches(b, a));
        graph.set_state(EdgeId(1), EdgeState::Skipped(SkipReason::Recursive));
        assert!(graph.reaches(b, a));
        graph.set_state(EdgeId(1), EdgeState::Skipped(SkipReason::Unprofitable));
        assert!(!graph.reaches(b, a));
    }

    #[test]
    fn test_partition_separates_unrelated_functions() {
        let project = Project::from_modules(vec![Module::new(
            "m",
            vec![
                def("a", vec![call("b"), Op::ret(Operand::var("r"))]),
                def("b", vec![Op::ret(Operand::var("x"))]),
                def("c", vec![call("d"), call("ext"), Op::ret(Operand::var("r"))]),
                def("d", vec![Op::ret(Operand::var("x"))]),
            ],
        )]);
        let symbols = SymbolTable::build(&project).unwrap();
        let graph = CallGraphBuilder::new(&symbols).build(&project);
        let groups = graph.partition();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].edges().len(), 1);
        assert_eq!(groups[0].edges()[0].callee, "b");
        let callees: Vec<&str> = groups[1].edges().iter().map(|e| e.callee.as_str()).collect();
        assert_eq!(callees, vec!["d", "ext"]);
        assert_eq!(groups[1].edges()[1].id, EdgeId(1));
    }

    #[test]
    fn test_on_body_changed_appends_only_new_sites() {
        let project = project();
        let symbols = SymbolTable::build(&project).unwrap();
        let builder = CallGraphBuilder::new(&symbols);
        let mut graph = builder.build(&project);
        let store = FunctionStore::from_project(project);
        let top = FuncId::new(0, 2);

        assert!(builder.on_body_changed(&mut graph, &store, top, |_| 1, None).is_empty());

        store.update(top, |f| {
            let site = f.alloc_site();
            f.body.insert(0, Op::Call { site, dest: None, callee: "callee".into(), args: vec![] });
        });
        let added = builder.on_body_changed(&mut graph, &store, top, |_| 1, Some(EdgeId(1)));
        assert_eq!(added, vec![EdgeId(4)]);
        let edge = graph.edge(EdgeId(4));
        assert_eq!((edge.depth, edge.parent, edge.cross_module), (1, Some(EdgeId(1)), true));
        assert_eq!(graph.outgoing(top).len(), 3);
    }
}
