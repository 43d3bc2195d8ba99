use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::callgraph::SkipReason;
use crate::domain::ir::CallSiteId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Inlined,
    Skipped,
}

/// One verdict on one call graph edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub caller: String,
    pub caller_module: String,
    pub callee: String,
    pub site: CallSiteId,
    pub depth: u32,
    pub cross_module: bool,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<SkipReason>,
}

impl Decision {
    pub fn is_inlined(&self) -> bool {
        self.outcome == Outcome::Inlined
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = if self.cross_module { "cross" } else { "local" };
        write!(
            f,
            "{}::{} -> {} [site {}, depth {}, {}] ",
            self.caller_module, self.caller, self.callee, self.site, self.depth, scope
        )?;
        match (self.outcome, self.reason) {
            (Outcome::Inlined, _) => write!(f, "inlined"),
            (Outcome::Skipped, Some(reason)) => write!(f, "skipped ({})", reason),
            (Outcome::Skipped, None) => write!(f, "skipped"),
        }
    }
}

/// Ordered decisions of one session: the only externally observable result
/// besides the transformed modules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineReport {
    pub decisions: Vec<Decision>,
    /// The session stopped early; undecided edges are reported as cancelled.
    #[serde(default)]
    pub cancelled: bool,
}

impl InlineReport {
    pub fn inlined(&self) -> impl Iterator<Item = &Decision> {
        self.decisions.iter().filter(|d| d.is_inlined())
    }

    pub fn skipped(&self, reason: SkipReason) -> impl Iterator<Item = &Decision> {
        self.decisions.iter().filter(move |d| d.reason == Some(reason))
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.decisions.iter().filter(|d| d.outcome == outcome).count()
    }

    /// Decisions whose caller and callee match.
    pub fn find<'r>(&'r self, caller: &'r str, callee: &'r str) -> impl Iterator<Item = &'r Decision> + 'r {
        self.decisions
            .iter()
            .filter(move |d| d.caller == caller && d.callee == callee)
    }
}

impl fmt::Display for InlineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for decision in &self.decisions {
            writeln!(f, "{}", decision)?;
        }
        write!(
            f,
            "{} inlined, {} skipped",
            self.count(Outcome::Inlined),
            self.count(Outcome::Skipped)
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(outcome: Outcome, reason: Option<SkipReason>) -> Decision {
        Decision {
            caller: "far".to_string(),
            caller_module: "caller".to_string(),
            callee: "simple_callee".to_string(),
            site: 0,
            depth: 0,
            cross_module: true,
            outcome,
            reason,
        }
    }

    #[test]
    fn test_display_lines() {
        let d = decision(Outcome::Skipped, Some(SkipReason::NoBody));
        assert_eq!(d.to_string(), "caller::far -> simple_callee [site 0, depth 0, cross] skipped (no-body)");
        let report = InlineReport {
            decisions: vec![d, decision(Outcome::Inlined, None)],
            cancelled: false,
        };
        assert!(report.to_string().ends_with("1 inlined, 1 skipped"));
    }

    #[test]
    fn test_json_uses_kebab_reasons() {
        let json = serde_json::to_string(&decision(Outcome::Skipped, Some(SkipReason::DepthExceeded))).unwrap();
        assert!(json.contains("\"reason\":\"depth-exceeded\""));
        let inlined = serde_json::to_string(&decision(Outcome::Inlined, None)).unwrap();
        assert!(!inlined.contains("reason"));
    }
}
