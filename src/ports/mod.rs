use crate::domain::ir::Module;
use crate::domain::report::InlineReport;

pub mod decision_exporter;

/// IR loader boundary: bytes in, modules out, and back.
pub trait ModuleCodec: Send + Sync {
    fn load_module(&self, bytes: &[u8]) -> anyhow::Result<Module>;
    fn dump_module(&self, module: &Module) -> anyhow::Result<Vec<u8>>;
    /// File extension used when writing modules.
    fn extension(&self) -> &'static str;
}

pub trait ReportExporter {
    fn export(&self, report: &InlineReport, path: &str) -> std::io::Result<()>;
}
