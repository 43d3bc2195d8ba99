// Command-line entry point for the cross-module inlining resolver.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{info, warn};
use xmod_inline::application::{InlineConfig, InlineUsecase};
use xmod_inline::domain::project::Project;
use xmod_inline::infrastructure::codec_for_extension;
use xmod_inline::infrastructure::logging::init_logging;
use xmod_inline::infrastructure::project_loader::ProjectLoader;
use xmod_inline::ports::decision_exporter::{DotDecisionExporter, JsonReportExporter, TextReportExporter};
use xmod_inline::ports::ReportExporter;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
    Dot,
}

#[derive(Parser, Debug)]
#[command(name = "xmod-inline", author, version, about, long_about = None)]
struct Cli {
    /// Input module file (can specify multiple)
    #[arg(short, long)]
    input: Vec<PathBuf>,

    /// Directory of module files (can specify multiple, not recursive)
    #[arg(short = 'd', long)]
    dir: Vec<PathBuf>,

    /// Module file extension used for --dir and --emit-dir
    #[arg(short, long, default_value = "json")]
    extension: String,

    /// TOML config; command-line flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    budget: Option<u32>,

    #[arg(long)]
    marginal_factor: Option<f64>,

    #[arg(long)]
    max_depth: Option<u32>,

    #[arg(long)]
    threads: Option<usize>,

    #[arg(long)]
    time_budget_ms: Option<u64>,

    /// Report output path; printed to stdout when omitted
    #[arg(short, long)]
    report: Option<String>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    format: Format,

    /// Write the transformed modules here
    #[arg(long)]
    emit_dir: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn config(&self) -> Result<InlineConfig> {
        let mut config = match &self.config {
            Some(path) => InlineConfig::from_toml_file(path)?,
            None => InlineConfig::default(),
        };
        if let Some(budget) = self.budget {
            config.budget = budget;
        }
        if let Some(factor) = self.marginal_factor {
            config.marginal_factor = factor;
        }
        if let Some(depth) = self.max_depth {
            config.max_nesting_depth = depth;
        }
        if self.threads.is_some() {
            config.threads = self.threads;
        }
        if self.time_budget_ms.is_some() {
            config.time_budget_ms = self.time_budget_ms;
        }
        config.validate()?;
        Ok(config)
    }

    fn project(&self) -> Result<Project> {
        if self.input.is_empty() && self.dir.is_empty() {
            bail!("Please provide at least one --input <file> or --dir <dir>");
        }
        let mut project = Project::new();
        for path in &self.input {
            ProjectLoader::add_path(&mut project, path)?;
        }
        for dir in &self.dir {
            ProjectLoader::add_dir(&mut project, dir, &self.extension)?;
        }
        if project.modules().is_empty() {
            warn!("no modules found");
        }
        Ok(project)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.config()?;
    let project = cli.project()?;
    info!(modules = project.modules().len(), "project loaded");

    let exporter: &dyn ReportExporter = match cli.format {
        Format::Text => &TextReportExporter,
        Format::Json => &JsonReportExporter,
        Format::Dot => &DotDecisionExporter,
    };
    let usecase = InlineUsecase {
        codec: codec_for_extension(&cli.extension),
        exporter,
    };

    let report = usecase
        .run(project, &config, cli.report.as_deref(), cli.emit_dir.as_deref())
        .context("Inlining failed")?;

    match &cli.report {
        Some(path) => println!(
            "Inlining completed! Report written to {} (format: {:?})",
            path, cli.format
        ),
        None => print_report(&report, cli.format)?,
    }
    if let Some(dir) = &cli.emit_dir {
        println!("Transformed modules written to {}", dir.display());
    }
    Ok(())
}

fn print_report(report: &xmod_inline::InlineReport, format: Format) -> Result<()> {
    match format {
        Format::Text => println!("{}", report),
        Format::Json => println!("{}", serde_json::to_string_pretty(report)?),
        Format::Dot => println!("{}", DotDecisionExporter::to_dot(report)),
    }
    Ok(())
}
