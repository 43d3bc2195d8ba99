//! A `Project` is the set of modules taking part in one inlining session.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::error::{InlineError, Result};
use crate::domain::ir::{Function, Module};

/// Position of a function in a project: (module index, function index).
///
/// The derived ordering is discovery order, which the policy engine relies on
/// for deterministic scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FuncId {
    pub module: u32,
    pub index: u32,
}

impl FuncId {
    pub fn new(module: usize, index: usize) -> Self {
        Self {
            module: module as u32,
            index: index as u32,
        }
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}#f{}", self.module, self.index)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Project {
    modules: Vec<Module>,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_modules(modules: impl IntoIterator<Item = Module>) -> Self {
        let mut project = Self::new();
        for module in modules {
            project.add_module(module);
        }
        project
    }

    /// Add a module; call-site ids are normalized on the way in.
    pub fn add_module(&mut self, mut module: Module) {
        module.normalize_sites();
        self.modules.push(module);
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn into_modules(self) -> Vec<Module> {
        self.modules
    }

    pub fn function(&self, id: FuncId) -> Option<&Function> {
        self.modules
            .get(id.module as usize)
            .and_then(|m| m.functions.get(id.index as usize))
    }

    /// Iterate over all `Function`s with the `Module` each one lives in.
    pub fn all_functions(&self) -> impl Iterator<Item = (&Function, &Module)> {
        self.modules
            .iter()
            .flat_map(|m| m.functions.iter().map(move |f| (f, m)))
    }

    /// Like `all_functions`, with ids in discovery order.
    pub fn function_ids(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.modules.iter().enumerate().flat_map(|(mi, m)| {
            m.functions
                .iter()
                .enumerate()
                .map(move |(fi, f)| (FuncId::new(mi, fi), f))
        })
    }

    pub fn active_module_names(&self) -> impl Iterator<Item = &String> {
        self.modules.iter().map(|m| &m.name)
    }

    /// Search the project for a function by name.
    ///
    /// A definition is preferred over declarations. Two definitions of the
    /// same name are a `DuplicateSymbol` error.
    pub fn get_func_by_name(&self, name: &str) -> Result<Option<(&Function, &Module)>> {
        let mut found: Option<(&Function, &Module)> = None;
        for (func, module) in self.all_functions().filter(|(f, _)| f.name == name) {
            found = match found {
                None => Some((func, module)),
                Some((prev, _)) if !prev.is_definition() && func.is_definition() => {
                    Some((func, module))
                }
                Some((prev, prev_mod)) if prev.is_definition() && func.is_definition() => {
                    return Err(InlineError::DuplicateSymbol {
                        name: name.to_string(),
                        first_module: prev_mod.name.clone(),
                        second_module: module.name.clone(),
                    });
                }
                keep => keep,
            };
        }
        Ok(found)
    }
}
