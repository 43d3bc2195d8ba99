//! Splices callee bodies into callers.
//!
//! Renaming scheme: the n-th splice into a caller renames every variable and
//! label of the copied body to `{callee}.i{n}.{name}` and uses
//! `{callee}.i{n}#exit` as the join label. Parameters the callee never writes
//! are replaced by the call's argument operands; written parameters are
//! seeded with a `Copy` from the argument.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::domain::callgraph::{CallGraph, CallGraphBuilder, EdgeId, EdgeState};
use crate::domain::cost::CostEstimator;
use crate::domain::error::{InlineError, Result};
use crate::domain::ir::{CallSiteId, Function, Op, Operand};
use crate::domain::store::FunctionStore;

/// Result of one splice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splice {
    /// Edges created for call sites copied in with the callee body.
    pub new_edges: Vec<EdgeId>,
    /// Number of ops that replaced the call.
    pub ops_inserted: usize,
}

pub struct Inliner<'a> {
    builder: &'a CallGraphBuilder<'a>,
    costs: &'a CostEstimator,
}

impl<'a> Inliner<'a> {
    pub fn new(builder: &'a CallGraphBuilder<'a>, costs: &'a CostEstimator) -> Self {
        Self { builder, costs }
    }

    /// Replace the call behind `edge_id` with a renamed copy of the callee body.
    ///
    /// The edge must be Pending and resolve to a definition. On success the
    /// edge is Inlined, the caller's cost is invalidated, the caller's
    /// `inline_depth` absorbs the callee's, and the call sites brought in by
    /// the copy are appended to the graph one level below their old depth.
    pub fn apply(
        &self,
        graph: &mut CallGraph,
        store: &FunctionStore,
        edge_id: EdgeId,
    ) -> Result<Splice> {
        let edge = graph.edge(edge_id).clone();
        let caller_name = store.name_of(edge.caller);

        if !edge.state.is_pending() {
            return Err(InlineError::AlreadyApplied {
                caller: caller_name,
                callee: edge.callee,
                site: edge.site,
            });
        }

        let callee_id = edge.callee_id().ok_or_else(|| InlineError::NotInlinable {
            caller: caller_name.clone(),
            callee: edge.callee.clone(),
        })?;
        // Take the callee out first; no two store entries are held at once.
        let callee = store
            .snapshot(callee_id)
            .ok_or_else(|| InlineError::UnknownFunction { name: edge.callee.clone() })?;

        // Depth of every call site still in the callee body.
        let callee_depths: HashMap<CallSiteId, u32> = graph
            .outgoing(callee_id)
            .iter()
            .map(|id| graph.edge(*id))
            .map(|e| (e.site, e.depth))
            .collect();

        let copied = store
            .update(edge.caller, |caller| {
                let copied = splice_call(caller, edge.site, &callee)?;
                caller.inline_depth = caller
                    .inline_depth
                    .max(edge.depth + 1 + callee.inline_depth);
                Some(copied)
            })
            .ok_or_else(|| InlineError::UnknownFunction { name: caller_name.clone() })?
            .ok_or_else(|| InlineError::MissingCallSite {
                caller: caller_name.clone(),
                site: edge.site,
            })?;

        // A copied site sits one level below the spliced call, plus whatever
        // nesting it already had inside the callee.
        let site_depths: HashMap<CallSiteId, u32> = copied
            .sites
            .iter()
            .map(|(from, to)| {
                let inner = callee_depths.get(from).copied().unwrap_or(0);
                (*to, edge.depth + 1 + inner)
            })
            .collect();

        graph.set_state(edge_id, EdgeState::Inlined);
        self.costs.invalidate(edge.caller);
        let new_edges = self.builder.on_body_changed(
            graph,
            store,
            edge.caller,
            |site| site_depths.get(&site).copied().unwrap_or(edge.depth + 1),
            Some(edge_id),
        );
        let ops_inserted = copied.ops_inserted;

        debug!(
            caller = %caller_name,
            callee = %edge.callee,
            site = edge.site,
            ops = ops_inserted,
            exposed = new_edges.len(),
            "spliced call"
        );

        Ok(Splice {
            new_edges,
            ops_inserted,
        })
    }
}

/// Layout of a body copied over a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedBody {
    pub ops_inserted: usize,
    /// (site in the callee, fresh site in the caller) for every copied call.
    pub sites: Vec<(CallSiteId, CallSiteId)>,
}

/// Splice `callee` over the call op carrying `site` in `caller`.
///
/// Returns `None` when the site is gone.
pub fn splice_call(caller: &mut Function, site: CallSiteId, callee: &Function) -> Option<CopiedBody> {
    let idx = caller.find_call(site)?;
    let (dest, args) = match &caller.body[idx] {
        Op::Call { dest, args, .. } => (dest.clone(), args.clone()),
        _ => return None,
    };

    let seq = caller.inline_seq;
    caller.inline_seq += 1;
    let prefix = format!("{}.i{}", callee.name, seq);
    let exit_label = format!("{}#exit", prefix);

    let written: HashSet<&str> = callee.body.iter().filter_map(Op::dest).collect();

    let mut ops = Vec::with_capacity(callee.body.len() + callee.params.len() + 1);
    let mut sites = Vec::new();
    let mut subst: HashMap<String, Operand> = HashMap::new();
    for (param, arg) in callee.params.iter().zip(args.iter()) {
        if written.contains(param.as_str()) {
            let renamed = format!("{}.{}", prefix, param);
            ops.push(Op::Copy {
                dest: renamed.clone(),
                value: arg.clone(),
            });
            subst.insert(param.clone(), Operand::Var(renamed));
        } else {
            subst.insert(param.clone(), arg.clone());
        }
    }

    let renamer = Renamer {
        prefix: &prefix,
        subst: &subst,
    };

    let returns = callee.body.iter().filter(|op| matches!(op, Op::Return(_))).count();
    let single_tail_return = returns == 1 && matches!(callee.body.last(), Some(Op::Return(_)));

    for op in &callee.body {
        match op {
            Op::Return(value) => {
                if let (Some(d), Some(v)) = (&dest, value) {
                    ops.push(Op::Copy {
                        dest: d.clone(),
                        value: renamer.operand(v),
                    });
                }
                if !single_tail_return {
                    ops.push(Op::Jump(exit_label.clone()));
                }
            }
            Op::Call { site: from, dest: d, callee: c, args: a } => {
                let site = caller.alloc_site();
                sites.push((*from, site));
                ops.push(Op::Call {
                    site,
                    dest: d.as_ref().map(|d| renamer.name(d)),
                    callee: c.clone(),
                    args: a.iter().map(|x| renamer.operand(x)).collect(),
                });
            }
            other => ops.push(renamer.op(other)),
        }
    }
    if !single_tail_return {
        ops.push(Op::Label(exit_label));
    }

    let ops_inserted = ops.len();
    caller.body.splice(idx..=idx, ops);
    Some(CopiedBody { ops_inserted, sites })
}

struct Renamer<'r> {
    prefix: &'r str,
    subst: &'r HashMap<String, Operand>,
}

impl Renamer<'_> {
    fn name(&self, name: &str) -> String {
        format!("{}.{}", self.prefix, name)
    }

    fn operand(&self, operand: &Operand) -> Operand {
        match operand {
            Operand::Const(c) => Operand::Const(*c),
            Operand::Var(v) => match self.subst.get(v) {
                Some(replacement) => replacement.clone(),
                None => Operand::Var(self.name(v)),
            },
        }
    }

    fn op(&self, op: &Op) -> Op {
        match op {
            Op::Copy { dest, value } => Op::Copy {
                dest: self.name(dest),
                value: self.operand(value),
            },
            Op::Binary { dest, op, lhs, rhs } => Op::Binary {
                dest: self.name(dest),
                op: *op,
                lhs: self.operand(lhs),
                rhs: self.operand(rhs),
            },
            Op::Label(l) => Op::Label(self.name(l)),
            Op::Jump(l) => Op::Jump(self.name(l)),
            Op::Branch { cond, then_label, else_label } => Op::Branch {
                cond: self.operand(cond),
                then_label: self.name(then_label),
                else_label: self.name(else_label),
            },
            // calls and returns are rewritten by `splice_call`
            Op::Call { .. } | Op::Return(_) => op.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ir::{BinOp, Linkage, Module};
    use crate::domain::project::{FuncId, Project};
    use crate::domain::symbols::SymbolTable;

    fn add_one() -> Function {
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

    #[test]
    fn test_splice_substitutes_each_copy_independently() {
        let mut caller = Function::define(
            "twice_caller",
            Linkage::External,
            &[],
            vec![
                Op::call(Some("a"), "callee", vec![Operand::Const(1)]),
                Op::call(Some("b"), "callee", vec![Operand::Const(2)]),
                Op::ret(Operand::var("b")),
            ],
        );
        let callee = add_one();

        assert_eq!(splice_call(&mut caller, 0, &callee).map(|c| c.ops_inserted), Some(2));
        assert_eq!(splice_call(&mut caller, 1, &callee).map(|c| c.ops_inserted), Some(2));
        assert_eq!(
            caller.body,
            vec![
                Op::binary("callee.i0.y", BinOp::Add, Operand::Const(1), Operand::Const(1)),
                Op::copy("a", Operand::var("callee.i0.y")),
                Op::binary("callee.i1.y", BinOp::Add, Operand::Const(2), Operand::Const(1)),
                Op::copy("b", Operand::var("callee.i1.y")),
                Op::ret(Operand::var("b")),
            ]
        );
        assert_eq!(splice_call(&mut caller, 0, &callee), None);
    }

    #[test]
    fn test_splice_multiple_returns_join_at_exit() {
        let callee = Function::define(
            "abs",
            Linkage::External,
            &["x"],
            vec![
                Op::Branch {
                    cond: Operand::var("x"),
                    then_label: "pos".into(),
                    else_label: "neg".into(),
                },
                Op::Label("pos".into()),
                Op::ret(Operand::var("x")),
                Op::Label("neg".into()),
                Op::binary("x", BinOp::Sub, Operand::Const(0), Operand::var("x")),
                Op::ret(Operand::var("x")),
            ],
        );
        let mut caller = Function::define(
            "f",
            Linkage::External,
            &["v"],
            vec![Op::call(Some("r"), "abs", vec![Operand::var("v")]), Op::ret(Operand::var("r"))],
        );

        splice_call(&mut caller, 0, &callee).unwrap();

        assert_eq!(caller.body[0], Op::copy("abs.i0.x", Operand::var("v")));
        assert_eq!(
            caller.body[1],
            Op::Branch {
                cond: Operand::var("abs.i0.x"),
                then_label: "abs.i0.pos".into(),
                else_label: "abs.i0.neg".into(),
            }
        );
        let jumps = caller
            .body
            .iter()
            .filter(|op| **op == Op::Jump("abs.i0#exit".into()))
            .count();
        assert_eq!(jumps, 2);
        assert_eq!(caller.body[caller.body.len() - 2], Op::Label("abs.i0#exit".into()));
        assert_eq!(caller.body.last(), Some(&Op::ret(Operand::var("r"))));
    }

    #[test]
    fn test_apply_rejects_second_splice() {
        let project = Project::from_modules(vec![
            Module::new(
                "caller",
                vec![Function::define(
                    "caller",
                    Linkage::External,
                    &["x"],
                    vec![
                        Op::call(Some("r"), "callee", vec![Operand::var("x")]),
                        Op::ret(Operand::var("r")),
                    ],
                )],
            ),
            Module::new("callee", vec![add_one()]),
        ]);
        let symbols = SymbolTable::build(&project).unwrap();
        let builder = CallGraphBuilder::new(&symbols);
        let mut graph = builder.build(&project);
        let store = FunctionStore::from_project(project);
        let costs = CostEstimator::new(10, 1.0);
        let inliner = Inliner::new(&builder, &costs);

        let splice = inliner.apply(&mut graph, &store, EdgeId(0)).unwrap();
        assert!(splice.new_edges.is_empty());
        assert_eq!(graph.edge(EdgeId(0)).state, EdgeState::Inlined);
        assert_eq!(
            store.read(FuncId::new(0, 0), |f| f.body.len()),
            Some(3)
        );

        let err = inliner.apply(&mut graph, &store, EdgeId(0)).unwrap_err();
        assert!(matches!(err, InlineError::AlreadyApplied { .. }));
    }

    #[test]
    fn test_apply_exposes_nested_calls() {
        let project = Project::from_modules(vec![Module::new(
            "m",
            vec![
                Function::define(
                    "outer",
                    Linkage::External,
                    &["x"],
                    vec![
                        Op::call(Some("r"), "near", vec![Operand::var("x")]),
                        Op::ret(Operand::var("r")),
                    ],
                ),
                Function::define(
                    "near",
                    Linkage::Local,
                    &["x"],
                    vec![
                        Op::call(Some("r"), "callee", vec![Operand::var("x")]),
                        Op::ret(Operand::var("r")),
                    ],
                ),
                Function::declare("callee", &["x"]),
            ],
        )]);
        let symbols = SymbolTable::build(&project).unwrap();
        let builder = CallGraphBuilder::new(&symbols);
        let mut graph = builder.build(&project);
        let store = FunctionStore::from_project(project);
        let costs = CostEstimator::new(10, 1.0);

        let splice = Inliner::new(&builder, &costs)
            .apply(&mut graph, &store, EdgeId(0))
            .unwrap();
        assert_eq!(splice.new_edges.len(), 1);
        let exposed = graph.edge(splice.new_edges[0]);
        assert_eq!(exposed.callee, "callee");
        assert_eq!(exposed.depth, 1);
        assert_eq!(exposed.parent, Some(EdgeId(0)));
        assert_eq!(exposed.site, 1);
    }

    #[test]
    fn test_apply_carries_nesting_already_inside_callee() {
        let chain = |name: &str, callee: &str| {
            Function::define(
                name,
                Linkage::External,
                &["x"],
                vec![
                    Op::call(Some("r"), callee, vec![Operand::var("x")]),
                    Op::ret(Operand::var("r")),
                ],
            )
        };
        let project = Project::from_modules(vec![Module::new(
            "m",
            vec![chain("a", "b"), chain("b", "c"), chain("c", "d"), Function::declare("d", &["x"])],
        )]);
        let symbols = SymbolTable::build(&project).unwrap();
        let builder = CallGraphBuilder::new(&symbols);
        let mut graph = builder.build(&project);
        let store = FunctionStore::from_project(project);
        let costs = CostEstimator::new(10, 1.0);
        let inliner = Inliner::new(&builder, &costs);

        // b -> c first: b now holds c's call to d one level down
        let inner = inliner.apply(&mut graph, &store, EdgeId(1)).unwrap();
        assert_eq!(graph.edge(inner.new_edges[0]).depth, 1);
        assert_eq!(store.read(FuncId::new(0, 1), |f| f.inline_depth), Some(1));

        let outer = inliner.apply(&mut graph, &store, EdgeId(0)).unwrap();
        let exposed = graph.edge(outer.new_edges[0]);
        assert_eq!((exposed.callee.as_str(), exposed.depth), ("d", 2));
        assert_eq!(store.read(FuncId::new(0, 0), |f| f.inline_depth), Some(2));
    }

    #[test]
    fn test_apply_on_declaration_is_not_inlinable() {
        let project = Project::from_modules(vec![Module::new(
            "m",
            vec![Function::define(
                "far",
                Linkage::External,
                &[],
                vec![Op::call(None, "simple_callee", vec![])],
            )],
        )]);
        let symbols = SymbolTable::build(&project).unwrap();
        let builder = CallGraphBuilder::new(&symbols);
        let mut graph = builder.build(&project);
        let store = FunctionStore::from_project(project);
        let costs = CostEstimator::new(10, 1.0);

        let err = Inliner::new(&builder, &costs)
            .apply(&mut graph, &store, EdgeId(0))
            .unwrap_err();
        assert!(matches!(err, InlineError::NotInlinable { .. }));
        assert!(graph.edge(EdgeId(0)).state.is_pending());
    }
}
