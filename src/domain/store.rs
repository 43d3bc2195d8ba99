use dashmap::DashMap;

use crate::domain::ir::{Function, Module};
use crate::domain::project::{FuncId, Project};

/// Session-owned function bodies, keyed by `FuncId`.
///
/// The project is moved in at the start of a session and rebuilt at the end.
/// Worker threads touch disjoint entries; callers must never hold one entry
/// while asking for another (see `Inliner::apply`).
pub struct FunctionStore {
    functions: DashMap<FuncId, Function>,
    // (module name, function count) in project order
    layout: Vec<(String, usize)>,
}

impl FunctionStore {
    pub fn from_project(project: Project) -> Self {
        let functions = DashMap::new();
        let mut layout = Vec::new();
        for (mi, module) in project.into_modules().into_iter().enumerate() {
            layout.push((module.name, module.functions.len()));
            for (fi, func) in module.functions.into_iter().enumerate() {
                functions.insert(FuncId::new(mi, fi), func);
            }
        }
        Self { functions, layout }
    }

    /// Reassemble the modules in their original order.
    pub fn into_project(self) -> Project {
        let mut modules = Vec::with_capacity(self.layout.len());
        for (mi, (name, count)) in self.layout.into_iter().enumerate() {
            let functions = (0..count)
                .filter_map(|fi| self.functions.remove(&FuncId::new(mi, fi)).map(|(_, f)| f))
                .collect();
            modules.push(Module { name, functions });
        }
        Project::from_modules(modules)
    }

    /// Clone of a function; the entry lock is released before returning.
    pub fn snapshot(&self, id: FuncId) -> Option<Function> {
        self.functions.get(&id).map(|r| r.clone())
    }

    pub fn read<R>(&self, id: FuncId, f: impl FnOnce(&Function) -> R) -> Option<R> {
        self.functions.get(&id).map(|r| f(r.value()))
    }

    pub fn update<R>(&self, id: FuncId, f: impl FnOnce(&mut Function) -> R) -> Option<R> {
        self.functions.get_mut(&id).map(|mut r| f(r.value_mut()))
    }

    pub fn name_of(&self, id: FuncId) -> String {
        self.read(id, |f| f.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn module_name(&self, id: FuncId) -> &str {
        self.layout
            .get(id.module as usize)
            .map(|(name, _)| name.as_str())
            .unwrap_or("<unknown>")
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
