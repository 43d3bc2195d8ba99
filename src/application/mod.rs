// Application layer: wires the domain components into one inlining session.

pub mod config;

pub use config::InlineConfig;

use std::time::Duration;
use tracing::info;

use crate::domain::callgraph::CallGraphBuilder;
use crate::domain::cost::CostEstimator;
use crate::domain::error::{InlineError, Result};
use crate::domain::ir::Module;
use crate::domain::policy::{Cancellation, PolicyEngine};
use crate::domain::project::Project;
use crate::domain::report::InlineReport;
use crate::domain::store::FunctionStore;
use crate::domain::symbols::SymbolTable;
use crate::infrastructure::concurrency::build_pool;
use crate::ports::{ModuleCodec, ReportExporter};

/// One compilation session: symbol table, call graph and function store live
/// only for the duration of `run`.
pub struct InlineSession {
    config: InlineConfig,
    cancel: Cancellation,
}

impl InlineSession {
    pub fn new(config: InlineConfig) -> Self {
        let cancel = match config.time_budget_ms {
            Some(ms) => Cancellation::with_time_budget(Duration::from_millis(ms)),
            None => Cancellation::new(),
        };
        Self { config, cancel }
    }

    /// Handle that aborts the session between worklist passes.
    pub fn cancellation(&self) -> Cancellation {
        self.cancel.clone()
    }

    pub fn run(&self, project: Project) -> Result<(Project, InlineReport)> {
        self.config.validate()?;

        let symbols = SymbolTable::build(&project)?;
        let builder = CallGraphBuilder::new(&symbols);
        let graph = builder.build(&project);
        info!(
            modules = project.modules().len(),
            symbols = symbols.len(),
            edges = graph.edges().len(),
            "call graph built"
        );

        let store = FunctionStore::from_project(project);
        let costs = CostEstimator::new(self.config.budget, self.config.marginal_factor);
        let pool = build_pool(self.config.threads).map_err(|e| InlineError::ThreadPool(e.to_string()))?;

        let report = {
            let engine = PolicyEngine::new(
                &symbols,
                &builder,
                &costs,
                &store,
                self.config.max_nesting_depth,
                self.cancel.clone(),
            );
            pool.install(|| engine.run(&graph))?
        };

        Ok((store.into_project(), report))
    }
}

/// Decide and apply inlining over `modules`, returning the transformed
/// modules and the ordered decision report.
pub fn run_inlining(modules: Vec<Module>, config: &InlineConfig) -> Result<(Vec<Module>, InlineReport)> {
    let (project, report) = InlineSession::new(config.clone()).run(Project::from_modules(modules))?;
    Ok((project.into_modules(), report))
}

/// Inline a project and hand the results to the configured outputs.
pub struct InlineUsecase<'a> {
    pub codec: &'a dyn ModuleCodec,
    pub exporter: &'a dyn ReportExporter,
}

impl<'a> InlineUsecase<'a> {
    pub fn run(
        &self,
        project: Project,
        config: &InlineConfig,
        report_path: Option<&str>,
        emit_dir: Option<&std::path::Path>,
    ) -> anyhow::Result<InlineReport> {
        let (project, report) = InlineSession::new(config.clone()).run(project)?;
        if let Some(path) = report_path {
            self.exporter.export(&report, path)?;
        }

        if let Some(dir) = emit_dir {
            std::fs::create_dir_all(dir)?;
            for module in project.modules() {
                let bytes = self.codec.dump_module(module)?;
                let file = dir.join(format!("{}.{}", sanitize(&module.name), self.codec.extension()));
                std::fs::write(&file, bytes)?;
            }
        }
        Ok(report)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}
