use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::{InlineError, Result};
use crate::domain::ir::Linkage;
use crate::domain::project::{FuncId, Project};

/// Where a call site's callee name leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolvedTarget {
    /// No module in the session mentions the symbol.
    Unresolved,
    /// Only prototypes exist; there is no body to inline.
    Declaration,
    Definition(FuncId),
}

/// The defining body of a symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionInfo {
    pub id: FuncId,
    pub module: String,
    pub linkage: Linkage,
    pub arity: usize,
}

#[derive(Debug, Clone, Default)]
struct SymbolRecord {
    definitions: Vec<DefinitionInfo>,
    // (module index, arity) of every prototype
    declarations: Vec<(u32, usize)>,
}

/// Session-wide symbol table.
///
/// Indexed in parallel, then frozen into a plain map: after `build` it is
/// read-only and shared between worker threads without locking.
#[derive(Debug)]
pub struct SymbolTable {
    symbols: HashMap<String, SymbolRecord>,
}

impl SymbolTable {
    /// Index every function of every module.
    ///
    /// Fails with `DuplicateSymbol` when a name has a body in more than one
    /// place; the reported pair is the first two definitions in discovery order.
    pub fn build(project: &Project) -> Result<Self> {
        let staging: DashMap<String, SymbolRecord> = DashMap::new();

        project
            .modules()
            .par_iter()
            .enumerate()
            .for_each(|(mi, module)| {
                for (fi, func) in module.functions.iter().enumerate() {
                    let mut record = staging.entry(func.name.clone()).or_default();
                    if func.is_definition() {
                        record.definitions.push(DefinitionInfo {
                            id: FuncId::new(mi, fi),
                            module: module.name.clone(),
                            linkage: func.linkage,
                            arity: func.params.len(),
                        });
                    } else {
                        record.declarations.push((mi as u32, func.params.len()));
                    }
                }
            });

        let mut symbols: HashMap<String, SymbolRecord> = staging.into_iter().collect();

        let mut names: Vec<&String> = symbols.keys().collect();
        names.sort();
        for name in names {
            let record = &symbols[name];
            if record.definitions.len() > 1 {
                let mut defs = record.definitions.clone();
                defs.sort_by_key(|d| d.id);
                return Err(InlineError::DuplicateSymbol {
                    name: name.clone(),
                    first_module: defs[0].module.clone(),
                    second_module: defs[1].module.clone(),
                });
            }
        }

        for record in symbols.values_mut() {
            record.declarations.sort_unstable();
        }

        Ok(Self { symbols })
    }

    pub fn resolve(&self, name: &str) -> ResolvedTarget {
        match self.symbols.get(name) {
            Some(record) => match record.definitions.first() {
                Some(def) => ResolvedTarget::Definition(def.id),
                None => ResolvedTarget::Declaration,
            },
            None => ResolvedTarget::Unresolved,
        }
    }

    pub fn definition(&self, name: &str) -> Option<&DefinitionInfo> {
        self.symbols.get(name).and_then(|r| r.definitions.first())
    }

    /// Parameter count of the symbol: the definition's, else the first prototype's.
    pub fn arity(&self, name: &str) -> Option<usize> {
        let record = self.symbols.get(name)?;
        match record.definitions.first() {
            Some(def) => Some(def.arity),
            None => record.declarations.first().map(|(_, arity)| *arity),
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
