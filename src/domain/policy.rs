//! Worklist-driven inlining policy.
//!
//! Every edge moves `Pending -> Inlined | Skipped(reason)` exactly once.
//! The graph is split into independent groups that run in parallel; inside
//! a group edges are decided in edge order, pass by pass, and call sites
//! exposed by a splice are queued for the next pass.
//!
//! An edge's depth counts the splices its call site went through. A callee
//! that already holds inlined code adds its own `inline_depth`, so the bound
//! on nesting holds whichever end of a chain is spliced first.

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::domain::callgraph::{CallGraph, CallGraphBuilder, EdgeId, EdgeState, SkipReason};
use crate::domain::cost::CostEstimator;
use crate::domain::error::Result;
use crate::domain::inliner::Inliner;
use crate::domain::ir::{CallSiteId, Function, Linkage, Op};
use crate::domain::project::FuncId;
use crate::domain::report::{Decision, InlineReport, Outcome};
use crate::domain::store::FunctionStore;
use crate::domain::symbols::{ResolvedTarget, SymbolTable};

/// Session abort switch, checked between worklist passes.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel automatically once `budget` has elapsed from now.
    pub fn with_time_budget(budget: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + budget),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.flag.store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }
}

/// Decisions of one independent group.
#[derive(Debug, Default)]
struct GroupOutcome {
    decisions: Vec<Decision>,
    cancelled: bool,
}

pub struct PolicyEngine<'a> {
    symbols: &'a SymbolTable,
    builder: &'a CallGraphBuilder<'a>,
    costs: &'a CostEstimator,
    store: &'a FunctionStore,
    max_nesting_depth: u32,
    cancel: Cancellation,
}

impl<'a> PolicyEngine<'a> {
    pub fn new(
        symbols: &'a SymbolTable,
        builder: &'a CallGraphBuilder<'a>,
        costs: &'a CostEstimator,
        store: &'a FunctionStore,
        max_nesting_depth: u32,
        cancel: Cancellation,
    ) -> Self {
        Self {
            symbols,
            builder,
            costs,
            store,
            max_nesting_depth,
            cancel,
        }
    }

    /// Decide every edge of `graph`.
    ///
    /// `graph` itself is only read: it is partitioned into group graphs, and
    /// those copies carry the edge states and exposed edges while the groups
    /// are worked off. The outcome of every edge is returned in the report.
    /// Groups run on the current rayon pool; their decisions are concatenated
    /// in group order, so the report does not depend on scheduling.
    pub fn run(&self, graph: &CallGraph) -> Result<InlineReport> {
        let groups = graph.partition();
        let group_count = groups.len();

        let outcomes: Vec<Result<GroupOutcome>> = groups
            .into_par_iter()
            .map(|mut group| self.run_group(&mut group))
            .collect();

        let mut report = InlineReport::default();
        for outcome in outcomes {
            let outcome = outcome?;
            report.cancelled |= outcome.cancelled;
            report.decisions.extend(outcome.decisions);
        }

        info!(
            groups = group_count,
            inlined = report.inlined().count(),
            skipped = report.count(Outcome::Skipped),
            depth_exceeded = report.skipped(SkipReason::DepthExceeded).count(),
            cancelled = report.cancelled,
            "inlining decisions complete"
        );
        Ok(report)
    }

    fn run_group(&self, graph: &mut CallGraph) -> Result<GroupOutcome> {
        let inliner = Inliner::new(self.builder, self.costs);
        let mut outcome = GroupOutcome::default();
        let mut queue: Vec<EdgeId> = graph.pending().map(|e| e.id).collect();
        let mut pass = 0usize;

        while !queue.is_empty() {
            if self.cancel.is_cancelled() {
                for id in queue {
                    if graph.edge(id).state.is_pending() {
                        graph.set_state(id, EdgeState::Skipped(SkipReason::Cancelled));
                        outcome.decisions.push(self.record(graph, id));
                    }
                }
                outcome.cancelled = true;
                break;
            }

            let mut next = Vec::new();
            for id in queue {
                if !graph.edge(id).state.is_pending() {
                    continue;
                }
                match self.evaluate(graph, id) {
                    Ok(()) => {
                        let splice = inliner.apply(graph, self.store, id)?;
                        next.extend(splice.new_edges);
                    }
                    Err(reason) => graph.set_state(id, EdgeState::Skipped(reason)),
                }
                let decision = self.record(graph, id);
                debug!(pass, "{}", decision);
                outcome.decisions.push(decision);
            }
            queue = next;
            pass += 1;
        }

        Ok(outcome)
    }

    /// Legality and profitability checks, short-circuiting on the first failure.
    pub fn evaluate(&self, graph: &CallGraph, id: EdgeId) -> std::result::Result<(), SkipReason> {
        let edge = graph.edge(id);
        let arg_count = self.call_arg_count(edge.caller, edge.site);

        let callee_id = match edge.target {
            ResolvedTarget::Definition(callee_id) => callee_id,
            ResolvedTarget::Declaration => {
                if let (Some(expected), Some(got)) = (self.symbols.arity(&edge.callee), arg_count) {
                    if expected != got {
                        warn!(
                            callee = %edge.callee,
                            expected,
                            got,
                            "residual call does not match its declaration"
                        );
                    }
                }
                return Err(SkipReason::NoBody);
            }
            ResolvedTarget::Unresolved => return Err(SkipReason::NoBody),
        };

        if self.symbols.arity(&edge.callee) != arg_count {
            return Err(SkipReason::SignatureMismatch);
        }

        if callee_id == edge.caller || graph.reaches(callee_id, edge.caller) {
            return Err(SkipReason::Recursive);
        }

        // The copy would nest the callee's own inlined code one level below
        // this site.
        let callee_nesting = self.store.read(callee_id, |f| f.inline_depth).unwrap_or(0);
        if edge.depth + callee_nesting > self.max_nesting_depth {
            return Err(SkipReason::DepthExceeded);
        }

        let cost = self.costs.cost(self.store, callee_id).unwrap_or(u32::MAX);
        let benefit = self.costs.benefit(self.store, graph, edge);
        if !self.costs.is_profitable(cost, benefit) {
            return Err(SkipReason::Unprofitable);
        }

        if edge.cross_module {
            let visible = self
                .store
                .read(callee_id, Function::is_externally_visible)
                .unwrap_or(false);
            if !visible || self.calls_module_private(callee_id) {
                return Err(SkipReason::NotVisible);
            }
        }

        Ok(())
    }

    /// Whether the body of `func` calls a local function of its own module;
    /// a copy of it would name a symbol other modules cannot see.
    fn calls_module_private(&self, func: FuncId) -> bool {
        self.store
            .read(func, |f| {
                f.call_sites().any(|(_, name, _)| {
                    self.symbols
                        .definition(name)
                        .map(|d| d.linkage == Linkage::Local && d.id.module == func.module)
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }

    fn call_arg_count(&self, caller: FuncId, site: CallSiteId) -> Option<usize> {
        self.store
            .read(caller, |f| {
                f.find_call(site).and_then(|idx| match &f.body[idx] {
                    Op::Call { args, .. } => Some(args.len()),
                    _ => None,
                })
            })
            .flatten()
    }

    fn record(&self, graph: &CallGraph, id: EdgeId) -> Decision {
        let edge = graph.edge(id);
        let (outcome, reason) = match edge.state {
            EdgeState::Inlined => (Outcome::Inlined, None),
            EdgeState::Skipped(reason) => (Outcome::Skipped, Some(reason)),
            EdgeState::Pending => (Outcome::Skipped, None),
        };
        Decision {
            caller: self.store.name_of(edge.caller),
            caller_module: self.store.module_name(edge.caller).to_string(),
            callee: edge.callee.clone(),
            site: edge.site,
            depth: edge.depth,
            cross_module: edge.cross_module,
            outcome,
            reason,
        }
    }
}
