// Infrastructure implementations: module codecs, loading, threads, logging.

pub mod concurrency;
pub mod logging;
pub mod project_loader;

use anyhow::{Context, Result};

use crate::domain::ir::Module;
use crate::ports::ModuleCodec;

/// Human-readable modules (serde_json).
pub struct JsonModuleCodec;

impl ModuleCodec for JsonModuleCodec {
    fn load_module(&self, bytes: &[u8]) -> Result<Module> {
        let mut module: Module =
            serde_json::from_slice(bytes).context("Failed to decode JSON module")?;
        module.normalize_sites();
        Ok(module)
    }

    fn dump_module(&self, module: &Module) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(module).context("Failed to encode JSON module")
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}

/// Compact binary modules (bincode).
pub struct BincodeModuleCodec;

impl ModuleCodec for BincodeModuleCodec {
    fn load_module(&self, bytes: &[u8]) -> Result<Module> {
        let mut module: Module =
            bincode::deserialize(bytes).context("Failed to decode binary module")?;
        module.normalize_sites();
        Ok(module)
    }

    fn dump_module(&self, module: &Module) -> Result<Vec<u8>> {
        bincode::serialize(module).context("Failed to encode binary module")
    }

    fn extension(&self) -> &'static str {
        "xbc"
    }
}

/// Codec for a file extension: `json` is JSON, anything else is bincode.
pub fn codec_for_extension(extension: &str) -> &'static dyn ModuleCodec {
    if extension.eq_ignore_ascii_case("json") {
        &JsonModuleCodec
    } else {
        &BincodeModuleCodec
    }
}
