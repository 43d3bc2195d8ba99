use anyhow::{Context, Result};
use memmap2::Mmap;
use std::fs::{self, File};
use std::path::Path;

use crate::domain::ir::Module;
use crate::domain::project::Project;
use crate::infrastructure::codec_for_extension;

pub struct ProjectLoader;

impl ProjectLoader {
    /// Load a single module file; the codec is chosen by extension.
    pub fn load_module(path: &Path) -> Result<Module> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let codec = codec_for_extension(extension);

        let file = File::open(path)
            .with_context(|| format!("Failed to open module {}", path.display()))?;
        let len = file
            .metadata()
            .with_context(|| format!("Failed to stat module {}", path.display()))?
            .len();
        if len == 0 {
            return codec
                .load_module(&[])
                .with_context(|| format!("Empty module file {}", path.display()));
        }

        // Safety: the mapping is read-only and dropped before returning.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to map module {}", path.display()))?;
        codec
            .load_module(&mmap)
            .with_context(|| format!("Failed to load module {}", path.display()))
    }

    pub fn load_path(path: &Path) -> Result<Project> {
        Ok(Project::from_modules(vec![Self::load_module(path)?]))
    }

    pub fn load_paths<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Result<Project> {
        let modules = paths
            .into_iter()
            .map(|p| Self::load_module(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Project::from_modules(modules))
    }

    /// Load every file in `dir` (not recursive) whose extension is `extn`.
    pub fn load_dir(dir: &Path, extn: &str) -> Result<Project> {
        Self::load_dir_with_blacklist(dir, extn, |_| false)
    }

    /// Like `load_dir`, skipping paths for which `exclude` returns true.
    /// Files are loaded in name order so module order is stable.
    pub fn load_dir_with_blacklist(
        dir: &Path,
        extn: &str,
        exclude: impl Fn(&Path) -> bool,
    ) -> Result<Project> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_dir() {
                continue;
            }
            match path.extension() {
                Some(e) if e == extn && !exclude(&path) => paths.push(path),
                _ => {}
            }
        }
        paths.sort();
        tracing::debug!(dir = %dir.display(), files = paths.len(), "loading modules");
        Self::load_paths(paths)
    }

    /// Add the modules found in `dir` to an existing project.
    pub fn add_dir(project: &mut Project, dir: &Path, extn: &str) -> Result<()> {
        for module in Self::load_dir(dir, extn)?.into_modules() {
            project.add_module(module);
        }
        Ok(())
    }

    pub fn add_path(project: &mut Project, path: &Path) -> Result<()> {
        project.add_module(Self::load_module(path)?);
        Ok(())
    }
}
