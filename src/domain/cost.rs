//! Static cost and benefit estimates for inlining decisions.
//!
//! `cost` is a size metric for a whole body; `benefit` scores a single call
//! site by the call overhead it would remove, scaled by how many sibling call
//! sites of the caller target the same callee.

use dashmap::DashMap;

use crate::domain::callgraph::{CallGraph, CallGraphEdge};
use crate::domain::ir::{Function, Op};
use crate::domain::project::FuncId;
use crate::domain::store::FunctionStore;

/// Fixed cost of having a body at all, so every definition costs at least 1.
pub const FUNCTION_BASE_COST: u32 = 1;

/// Overhead a call pays before any argument is passed.
pub const CALL_OVERHEAD: u32 = 5;

/// Unit cost of a single operation.
pub fn op_cost(op: &Op) -> u32 {
    match op {
        Op::Copy { .. } | Op::Binary { .. } => 1,
        Op::Call { .. } => CALL_OVERHEAD,
        Op::Label(_) => 0,
        Op::Jump(_) => 1,
        Op::Branch { .. } => 2,
        Op::Return(_) => 1,
    }
}

/// Cost of a body, monotonic in its size.
pub fn body_cost(func: &Function) -> u32 {
    func.body
        .iter()
        .fold(FUNCTION_BASE_COST, |acc, op| acc.saturating_add(op_cost(op)))
}

/// Memoizing estimator shared by all worker threads of a session.
pub struct CostEstimator {
    budget: u32,
    marginal_factor: f64,
    memo: DashMap<FuncId, u32>,
}

impl CostEstimator {
    pub fn new(budget: u32, marginal_factor: f64) -> Self {
        Self {
            budget,
            marginal_factor,
            memo: DashMap::new(),
        }
    }

    /// Memoized `body_cost`; `None` for a function the store does not hold.
    pub fn cost(&self, store: &FunctionStore, func: FuncId) -> Option<u32> {
        if let Some(cached) = self.memo.get(&func) {
            return Some(*cached);
        }
        let cost = store.read(func, body_cost)?;
        self.memo.insert(func, cost);
        Some(cost)
    }

    /// Drop the cached cost of a body that was just mutated.
    pub fn invalidate(&self, func: FuncId) {
        self.memo.remove(&func);
    }

    pub fn is_cached(&self, func: FuncId) -> bool {
        self.memo.contains_key(&func)
    }

    /// Call overhead removed by inlining this site, times the number of
    /// sites in the caller that target the same callee.
    ///
    /// Sites are counted on the graph, whatever their state, among edges
    /// created together: the original edges, or the edges one splice exposed.
    /// Splicing one of them does not lower the benefit of its siblings, so
    /// identical sites get identical verdicts.
    pub fn benefit(&self, store: &FunctionStore, graph: &CallGraph, edge: &CallGraphEdge) -> u32 {
        let multiplicity = graph
            .outgoing(edge.caller)
            .iter()
            .map(|id| graph.edge(*id))
            .filter(|e| e.callee == edge.callee && e.parent == edge.parent)
            .count() as u32;
        let per_site = store
            .read(edge.caller, |caller| {
                caller.find_call(edge.site).and_then(|idx| match &caller.body[idx] {
                    Op::Call { args, .. } => {
                        let consts = args.iter().filter(|a| a.is_const()).count() as u32;
                        Some(CALL_OVERHEAD + args.len() as u32 + consts)
                    }
                    _ => None,
                })
            })
            .flatten()
            .unwrap_or(CALL_OVERHEAD);
        multiplicity.max(1) * per_site
    }

    /// `cost <= budget` and `benefit >= cost * marginal_factor`.
    pub fn is_profitable(&self, cost: u32, benefit: u32) -> bool {
        cost <= self.budget && f64::from(benefit) >= f64::from(cost) * self.marginal_factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::callgraph::{CallGraphBuilder, EdgeState};
    use crate::domain::ir::{BinOp, Linkage, Module, Operand};
    use crate::domain::project::Project;
    use crate::domain::symbols::SymbolTable;

    fn callee() -> Function {
        Function::define(
            "callee",
            Linkage::External,
            &["x"],
            vec![
                Op::binary("y", BinOp::Add, Operand::var("x"), Operand::Const(1)),
                Op::ret(Operand::var("y")),
            ],
        )
    }

    fn twice_caller() -> Function {
        Function::define(
            "twice_caller",
            Linkage::External,
            &[],
            vec![
                Op::call(Some("a"), "callee", vec![Operand::Const(1)]),
                Op::call(Some("b"), "callee", vec![Operand::Const(2)]),
                Op::binary("c", BinOp::Add, Operand::var("a"), Operand::var("b")),
                Op::ret(Operand::var("c")),
            ],
        )
    }

    #[test]
    fn test_body_cost_sums_unit_costs() {
        assert_eq!(body_cost(&callee()), 3);
        assert_eq!(body_cost(&twice_caller()), 1 + 5 + 5 + 1 + 1);
        assert_eq!(body_cost(&Function::declare("d", &[])), FUNCTION_BASE_COST);
    }

    #[test]
    fn test_cost_is_memoized_until_invalidated() {
        let project = Project::from_modules(vec![Module::new("m", vec![callee()])]);
        let store = FunctionStore::from_project(project);
        let estimator = CostEstimator::new(10, 1.0);
        let id = FuncId::new(0, 0);

        assert_eq!(estimator.cost(&store, id), Some(3));
        store.update(id, |f| f.body.insert(0, Op::copy("t", Operand::Const(0))));
        assert_eq!(estimator.cost(&store, id), Some(3));
        estimator.invalidate(id);
        assert_eq!(estimator.cost(&store, id), Some(4));
        assert!(estimator.is_cached(id));
    }

    #[test]
    fn test_benefit_counts_multiplicity_and_constants() {
        let project = Project::from_modules(vec![Module::new("m", vec![twice_caller(), callee()])]);
        let symbols = SymbolTable::build(&project).unwrap();
        let graph = CallGraphBuilder::new(&symbols).build(&project);
        let store = FunctionStore::from_project(project);
        let estimator = CostEstimator::new(10, 1.0);

        // two sites, each (overhead 5 + 1 arg + 1 constant)
        assert_eq!(estimator.benefit(&store, &graph, &graph.edges()[0]), 14);
        assert_eq!(estimator.benefit(&store, &graph, &graph.edges()[1]), 14);
    }

    #[test]
    fn test_benefit_survives_sibling_splice() {
        let project = Project::from_modules(vec![Module::new("m", vec![twice_caller(), callee()])]);
        let symbols = SymbolTable::build(&project).unwrap();
        let mut graph = CallGraphBuilder::new(&symbols).build(&project);
        let store = FunctionStore::from_project(project);
        let estimator = CostEstimator::new(10, 1.0);

        let first = graph.edges()[0].id;
        graph.set_state(first, EdgeState::Inlined);
        store.update(FuncId::new(0, 0), |f| f.body.remove(0));

        assert_eq!(store.read(FuncId::new(0, 0), |f| f.calls_to("callee")), Some(1));
        assert_eq!(estimator.benefit(&store, &graph, &graph.edges()[1]), 14);
    }

    #[test]
    fn test_profitability_threshold() {
        let estimator = CostEstimator::new(10, 2.0);
        assert!(estimator.is_profitable(3, 6));
        assert!(!estimator.is_profitable(3, 5));
        assert!(!estimator.is_profitable(11, 100));
        assert!(!CostEstimator::new(0, 0.0).is_profitable(1, 100));
    }
}
