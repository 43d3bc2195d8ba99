//! In-memory IR consumed by the resolver.
//!
//! A `Module` owns `Function`s; a function body is a flat sequence of `Op`s.
//! Call operations carry a per-function `CallSiteId` so call graph edges
//! survive splices that shift op positions.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Identifier of a call operation, unique within its function.
pub type CallSiteId = u32;

/// Linkage/visibility of a function symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    /// Defined, only visible inside its owning module.
    Local,
    /// Defined, visible to other modules.
    External,
    /// Prototype only; the body lives elsewhere (or nowhere in this session).
    Declaration,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Const(i64),
    Var(String),
}

impl Operand {
    pub fn var(name: &str) -> Self {
        Operand::Var(name.to_string())
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Operand::Const(_))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Const(c) => write!(f, "{}", c),
            Operand::Var(v) => write!(f, "%{}", v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
        }
    }
}

/// A basic operation in a function body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Copy {
        dest: String,
        value: Operand,
    },
    Binary {
        dest: String,
        op: BinOp,
        lhs: Operand,
        rhs: Operand,
    },
    Call {
        #[serde(default)]
        site: CallSiteId,
        dest: Option<String>,
        callee: String,
        args: Vec<Operand>,
    },
    Label(String),
    Jump(String),
    Branch {
        cond: Operand,
        then_label: String,
        else_label: String,
    },
    Return(Option<Operand>),
}

impl Op {
    pub fn copy(dest: &str, value: Operand) -> Self {
        Op::Copy { dest: dest.to_string(), value }
    }

    pub fn binary(dest: &str, op: BinOp, lhs: Operand, rhs: Operand) -> Self {
        Op::Binary { dest: dest.to_string(), op, lhs, rhs }
    }

    /// Call with site id 0; ids are assigned by `Function::normalize_sites`.
    pub fn call(dest: Option<&str>, callee: &str, args: Vec<Operand>) -> Self {
        Op::Call {
            site: 0,
            dest: dest.map(str::to_string),
            callee: callee.to_string(),
            args,
        }
    }

    pub fn ret(value: Operand) -> Self {
        Op::Return(Some(value))
    }

    /// Variable written by this op, if any.
    pub fn dest(&self) -> Option<&str> {
        match self {
            Op::Copy { dest, .. } | Op::Binary { dest, .. } => Some(dest),
            Op::Call { dest, .. } => dest.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Copy { dest, value } => write!(f, "%{} = {}", dest, value),
            Op::Binary { dest, op, lhs, rhs } => {
                write!(f, "%{} = {} {}, {}", dest, op.mnemonic(), lhs, rhs)
            }
            Op::Call { site, dest, callee, args } => {
                if let Some(d) = dest {
                    write!(f, "%{} = ", d)?;
                }
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "call @{}({}) !site {}", callee, args.join(", "), site)
            }
            Op::Label(l) => write!(f, "{}:", l),
            Op::Jump(l) => write!(f, "br label {}", l),
            Op::Branch { cond, then_label, else_label } => {
                write!(f, "br {}, label {}, label {}", cond, then_label, else_label)
            }
            Op::Return(Some(v)) => write!(f, "ret {}", v),
            Op::Return(None) => write!(f, "ret void"),
        }
    }
}

/// A function symbol and, unless it is a declaration, its body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub linkage: Linkage,
    pub params: Vec<String>,
    #[serde(default)]
    pub body: Vec<Op>,
    /// Next free call-site id.
    #[serde(default)]
    pub next_site: CallSiteId,
    /// Number of splices performed into this function so far.
    #[serde(default)]
    pub inline_seq: u32,
    /// Deepest nesting of inlined code in the body (0 when nothing was inlined).
    #[serde(default)]
    pub inline_depth: u32,
}

impl Function {
    /// Build a defined function; call-site ids are normalized.
    pub fn define(name: &str, linkage: Linkage, params: &[&str], body: Vec<Op>) -> Self {
        let mut func = Self {
            name: name.to_string(),
            linkage,
            params: params.iter().map(|p| p.to_string()).collect(),
            body,
            next_site: 0,
            inline_seq: 0,
            inline_depth: 0,
        };
        func.normalize_sites();
        func
    }

    pub fn declare(name: &str, params: &[&str]) -> Self {
        Self::define(name, Linkage::Declaration, params, Vec::new())
    }

    pub fn is_definition(&self) -> bool {
        self.linkage != Linkage::Declaration
    }

    pub fn is_externally_visible(&self) -> bool {
        self.linkage == Linkage::External
    }

    /// Ensure every call op has a unique site id and `next_site` is past all of them.
    ///
    /// Bodies whose ids are already unique keep them untouched; otherwise all
    /// calls are renumbered in body order.
    pub fn normalize_sites(&mut self) {
        let mut seen = HashSet::new();
        let mut unique = true;
        let mut max_seen = None;
        for op in &self.body {
            if let Op::Call { site, .. } = op {
                if !seen.insert(*site) {
                    unique = false;
                    break;
                }
                max_seen = Some(max_seen.map_or(*site, |m: CallSiteId| m.max(*site)));
            }
        }

        if unique {
            let floor = max_seen.map_or(0, |m| m + 1);
            self.next_site = self.next_site.max(floor);
            return;
        }

        let mut next = 0;
        for op in &mut self.body {
            if let Op::Call { site, .. } = op {
                *site = next;
                next += 1;
            }
        }
        self.next_site = next;
    }

    pub fn alloc_site(&mut self) -> CallSiteId {
        let site = self.next_site;
        self.next_site += 1;
        site
    }

    /// Call operations in body order: (site, callee, arg count).
    pub fn call_sites(&self) -> impl Iterator<Item = (CallSiteId, &str, &[Operand])> {
        self.body.iter().filter_map(|op| match op {
            Op::Call { site, callee, args, .. } => Some((*site, callee.as_str(), args.as_slice())),
            _ => None,
        })
    }

    /// Position of the call op carrying `site`.
    pub fn find_call(&self, site: CallSiteId) -> Option<usize> {
        self.body
            .iter()
            .position(|op| matches!(op, Op::Call { site: s, .. } if *s == site))
    }

    /// Number of live call ops naming `callee`.
    pub fn calls_to(&self, callee: &str) -> usize {
        self.call_sites().filter(|(_, name, _)| *name == callee).count()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(|p| format!("%{}", p)).collect();
        if !self.is_definition() {
            return writeln!(f, "declare @{}({})", self.name, params.join(", "));
        }
        let linkage = match self.linkage {
            Linkage::Local => "internal ",
            _ => "",
        };
        writeln!(f, "define {}@{}({}) {{", linkage, self.name, params.join(", "))?;
        for op in &self.body {
            match op {
                Op::Label(_) => writeln!(f, "{}", op)?,
                _ => writeln!(f, "  {}", op)?,
            }
        }
        writeln!(f, "}}")
    }
}

/// A translation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    #[serde(default)]
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: &str, functions: Vec<Function>) -> Self {
        Self { name: name.to_string(), functions }
    }

    pub fn get_func_by_name(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn normalize_sites(&mut self) {
        for func in &mut self.functions {
            func.normalize_sites();
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for func in &self.functions {
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_assigns_sites_in_order() {
        let func = Function::define(
            "twice",
            Linkage::External,
            &[],
            vec![
                Op::call(Some("a"), "callee", vec![Operand::Const(1)]),
                Op::call(Some("b"), "callee", vec![Operand::Const(2)]),
                Op::ret(Operand::var("b")),
            ],
        );
        let sites: Vec<CallSiteId> = func.call_sites().map(|(s, _, _)| s).collect();
        assert_eq!(sites, vec![0, 1]);
        assert_eq!(func.next_site, 2);
        assert_eq!(func.calls_to("callee"), 2);
    }

    #[test]
    fn test_normalize_keeps_unique_ids() {
        let mut func = Function::declare("f", &[]);
        func.linkage = Linkage::External;
        func.body = vec![
            Op::Call { site: 7, dest: None, callee: "g".into(), args: vec![] },
            Op::Call { site: 3, dest: None, callee: "h".into(), args: vec![] },
        ];
        func.normalize_sites();
        assert_eq!(func.find_call(7), Some(0));
        assert_eq!(func.find_call(3), Some(1));
        assert_eq!(func.alloc_site(), 8);
    }

    #[test]
    fn test_display_declaration() {
        let decl = Function::declare("simple_callee", &["x"]);
        assert_eq!(decl.to_string(), "declare @simple_callee(%x)\n");
        assert!(!decl.is_definition());
    }

    #[test]
    fn test_module_json_shape() {
        let json = r#"{
            "name": "m",
            "functions": [
                {"name": "f", "linkage": "external", "params": ["x"],
                 "body": [{"return": {"var": "x"}}]}
            ]
        }"#;
        let module: Module = serde_json::from_str(json).unwrap();
        assert_eq!(module.functions[0].body, vec![Op::ret(Operand::var("x"))]);
    }
}
