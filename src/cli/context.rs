//! Host context used by the `build` and `watch` commands.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::build::BuildOptions;
use crate::inline::HostContext;

/// Context of one inlining run over one input document.
///
/// Dependencies are deduplicated but keep first-registration order, warnings
/// are kept in the order they were emitted. Both are read back by the command
/// once the run has finished.
pub struct CliContext {
    base: PathBuf,
    options: BuildOptions,
    dependencies: Mutex<Dependencies>,
    warnings: Mutex<Vec<String>>,
}

#[derive(Default)]
struct Dependencies {
    seen: FxHashSet<PathBuf>,
    ordered: Vec<PathBuf>,
}

impl CliContext {
    pub fn new(base: impl Into<PathBuf>, options: BuildOptions) -> Self {
        Self {
            base: base.into(),
            options,
            dependencies: Mutex::new(Dependencies::default()),
            warnings: Mutex::new(Vec::new()),
        }
    }

    pub fn dependencies(&self) -> Vec<PathBuf> {
        self.dependencies.lock().ordered.clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }
}

impl HostContext for CliContext {
    fn base_path(&self) -> &Path {
        &self.base
    }

    fn options(&self) -> &BuildOptions {
        &self.options
    }

    fn add_dependency(&self, path: &Path) {
        let mut deps = self.dependencies.lock();
        if deps.seen.insert(path.to_path_buf()) {
            deps.ordered.push(path.to_path_buf());
        }
    }

    fn emit_warning(&self, message: &str) {
        crate::debug!("inline"; "{}", message);
        self.warnings.lock().push(message.to_string());
    }
}
