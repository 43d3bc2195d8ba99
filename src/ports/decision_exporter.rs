//! Report exporters
//!
//! Text, JSON and Graphviz DOT renderings of an inlining report.

use crate::domain::callgraph::SkipReason;
use crate::domain::report::{Decision, InlineReport, Outcome};
use crate::ports::ReportExporter;
use std::io::Result;

/// One line per decision plus a summary.
pub struct TextReportExporter;

impl ReportExporter for TextReportExporter {
    fn export(&self, report: &InlineReport, path: &str) -> Result<()> {
        std::fs::write(path, format!("{}\n", report))
    }
}

pub struct JsonReportExporter;

impl ReportExporter for JsonReportExporter {
    fn export(&self, report: &InlineReport, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(path, json)
    }
}

/// Decisions as a call graph: one node per function, one edge per decision.
pub struct DotDecisionExporter;

impl ReportExporter for DotDecisionExporter {
    fn export(&self, report: &InlineReport, path: &str) -> Result<()> {
        std::fs::write(path, Self::to_dot(report))
    }
}

impl DotDecisionExporter {
    pub fn to_dot(report: &InlineReport) -> String {
        let mut lines = Vec::new();

        lines.push("digraph Inlining {".to_string());
        lines.push("    rankdir=LR;".to_string());
        lines.push("    node [shape=box, fontname=\"Helvetica\", fontsize=12];".to_string());
        lines.push("    edge [fontname=\"Helvetica\", fontsize=10];".to_string());
        lines.push("".to_string());

        // Cluster callers by module; callees without a known module stay outside.
        let mut modules: Vec<&str> = report.decisions.iter().map(|d| d.caller_module.as_str()).collect();
        modules.sort();
        modules.dedup();
        for (i, module) in modules.iter().enumerate() {
            lines.push(format!("    subgraph cluster_{} {{", i));
            lines.push(format!("        label=\"{}\";", Self::escape_label(module)));
            let mut callers: Vec<&str> = report
                .decisions
                .iter()
                .filter(|d| d.caller_module == *module)
                .map(|d| d.caller.as_str())
                .collect();
            callers.sort();
            callers.dedup();
            for caller in callers {
                lines.push(format!("        \"{}\";", Self::escape_label(caller)));
            }
            lines.push("    }".to_string());
        }

        lines.push("".to_string());

        for decision in &report.decisions {
            let (color, style) = Self::edge_style(decision);
            lines.push(format!(
                "    \"{}\" -> \"{}\" [label=\"{}\", color=\"{}\", style=\"{}\"];",
                Self::escape_label(&decision.caller),
                Self::escape_label(&decision.callee),
                Self::edge_label(decision),
                color,
                style
            ));
        }

        lines.push("}".to_string());
        lines.join("\n")
    }

    fn edge_label(decision: &Decision) -> String {
        let verdict = match (decision.outcome, decision.reason) {
            (Outcome::Inlined, _) => "inlined".to_string(),
            (Outcome::Skipped, Some(reason)) => reason.to_string(),
            (Outcome::Skipped, None) => "skipped".to_string(),
        };
        if decision.depth > 0 {
            format!("#{} {} (d{})", decision.site, verdict, decision.depth)
        } else {
            format!("#{} {}", decision.site, verdict)
        }
    }

    /// (color, style) per outcome; cross-module skips are dashed.
    fn edge_style(decision: &Decision) -> (&'static str, &'static str) {
        let color = match decision.reason {
            None => "#2E7D32",
            Some(SkipReason::NoBody) => "#757575",
            Some(SkipReason::Recursive) => "#C62828",
            Some(SkipReason::DepthExceeded) => "#6A1B9A",
            Some(SkipReason::Unprofitable) => "#EF6C00",
            Some(SkipReason::NotVisible) => "#1565C0",
            Some(SkipReason::SignatureMismatch) | Some(SkipReason::Cancelled) => "#000000",
        };
        let style = if decision.is_inlined() {
            "bold"
        } else if decision.cross_module {
            "dashed"
        } else {
            "solid"
        };
        (color, style)
    }

    fn escape_label(label: &str) -> String {
        label.replace('\\', "\\\\").replace('"', "\\\"")
    }
}
