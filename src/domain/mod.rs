pub mod callgraph;
pub mod cost;
pub mod error;
pub mod inliner;
pub mod ir;
pub mod policy;
pub mod project;
pub mod report;
pub mod store;
pub mod symbols;
