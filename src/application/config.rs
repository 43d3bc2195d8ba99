use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::domain::error::InlineError;

/// Tunables of one inlining session.
///
/// ```toml
/// budget = 40
/// marginal_factor = 1.0
/// max_nesting_depth = 2
/// threads = 4
/// time_budget_ms = 500
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InlineConfig {
    /// Largest callee cost that may be inlined.
    pub budget: u32,
    /// Required ratio of benefit to callee cost.
    pub marginal_factor: f64,
    /// Deepest level of transitively exposed call sites that may be inlined.
    pub max_nesting_depth: u32,
    /// Worker threads; defaults to half the cores.
    pub threads: Option<usize>,
    /// Abort between worklist passes once this much time has passed.
    pub time_budget_ms: Option<u64>,
}

impl Default for InlineConfig {
    fn default() -> Self {
        Self {
            budget: 40,
            marginal_factor: 1.0,
            max_nesting_depth: 2,
            threads: None,
            time_budget_ms: None,
        }
    }
}

impl InlineConfig {
    pub fn from_toml_str(src: &str) -> Result<Self> {
        let config: InlineConfig = toml::from_str(src).context("Invalid inlining config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let src = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&src)
    }

    pub fn validate(&self) -> std::result::Result<(), InlineError> {
        if !self.marginal_factor.is_finite() || self.marginal_factor < 0.0 {
            return Err(InlineError::InvalidConfig(format!(
                "marginal_factor must be a finite, non-negative number (got {})",
                self.marginal_factor
            )));
        }
        if self.threads == Some(0) {
            return Err(InlineError::InvalidConfig("threads must be at least 1".to_string()));
        }
        Ok(())
    }
}
