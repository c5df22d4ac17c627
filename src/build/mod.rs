//! Nested builds.
//!
//! A nested build compiles one script entry in isolation and writes the result
//! into a [`MemoryFs`]. The loader only knows the [`NestedBuild`] trait, so any
//! backend (or a test double) can be plugged in.
//!
//! ```text
//! build/
//! ├── memfs.rs    # scoped in-memory output filesystem
//! ├── oxc.rs      # built-in backend (parse, rule loaders, plugins)
//! ├── command.rs  # external command backend (esbuild, swc, ...)
//! └── mod.rs      # NestedBuild trait, BuildConfig, BuildStats, BuildError
//! ```

pub mod command;
pub mod memfs;
pub mod oxc;

pub use command::CommandBuild;
pub use memfs::MemoryFs;
pub use oxc::OxcBuild;

use std::future::Future;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::path::clean_path;

// ============================================================================
// Forwarded options
// ============================================================================

/// A module rule: loaders applied to entries whose path matches `test`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleRule {
    /// Regex matched against the entry path.
    pub test: String,

    /// Loader names, applied in order.
    #[serde(rename = "use")]
    pub loaders: Vec<String>,
}

/// `[module]` options forwarded to every nested build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleOptions {
    pub rules: Vec<ModuleRule>,
}

/// A plugin entry. Everything besides `name` is plugin-specific.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    pub name: String,

    #[serde(flatten)]
    pub options: toml::Table,
}

impl Plugin {
    /// String option lookup.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(toml::Value::as_str)
    }
}

/// Host configuration copied verbatim into each nested build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildOptions {
    pub module: ModuleOptions,
    pub plugins: Vec<Plugin>,
}

// ============================================================================
// Build configuration and result
// ============================================================================

/// Synthetic configuration of one nested build.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Entry, relative to `context` (always starts with `.`).
    pub entry: String,
    /// Directory the entry and output are resolved against.
    pub context: PathBuf,
    /// Output filename, relative to `context`.
    pub filename: String,
    pub module: ModuleOptions,
    pub plugins: Vec<Plugin>,
}

impl BuildConfig {
    /// Build the configuration for a script `src`.
    ///
    /// Entries must be relative: `/app.js` becomes `./app.js`.
    pub fn for_src(src: &str, context: &Path, options: &BuildOptions) -> Self {
        let entry = relative_entry(src);
        Self {
            filename: entry.clone(),
            entry,
            context: context.to_path_buf(),
            module: options.module.clone(),
            plugins: options.plugins.clone(),
        }
    }

    /// Absolute path of the entry file.
    pub fn entry_path(&self) -> PathBuf {
        clean_path(&self.context.join(&self.entry))
    }

    /// Absolute path the compiled output is written to.
    pub fn output_path(&self) -> PathBuf {
        clean_path(&self.context.join(&self.filename))
    }
}

/// Normalize a `src` to the relative entry form.
///
/// Bare names (`app.js`) get `./` so they stay inside the context directory.
pub fn relative_entry(src: &str) -> String {
    if src.starts_with('.') {
        src.to_string()
    } else if src.starts_with('/') {
        format!(".{src}")
    } else {
        format!("./{src}")
    }
}

/// What a finished nested build reports back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildStats {
    /// Files the build read, in the order the backend reports them.
    pub file_dependencies: Option<Vec<PathBuf>>,
}

impl BuildStats {
    pub fn with_dependencies(deps: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            file_dependencies: Some(deps.into_iter().collect()),
        }
    }
}

// ============================================================================
// BuildError
// ============================================================================

/// Nested build failure.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("syntax error in `{path}`:\n{message}")]
    Syntax { path: PathBuf, message: String },

    #[error("`{0}` is not a JavaScript file, use the command backend for it")]
    Unsupported(PathBuf),

    #[error("invalid module rule `{test}`")]
    InvalidRule {
        test: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown loader `{0}`")]
    UnknownLoader(String),

    #[error("unknown plugin `{0}`")]
    UnknownPlugin(String),

    #[error("code generation failed for `{0}`")]
    Codegen(PathBuf),

    #[error("{0}")]
    Command(String),

    #[error("nested build task failed: {0}")]
    Task(String),

    #[error("build produced no output at `{0}`")]
    MissingOutput(PathBuf),

    #[error("output `{0}` is not valid UTF-8")]
    Utf8(PathBuf),
}

// ============================================================================
// NestedBuild
// ============================================================================

/// A build backend able to compile one entry into a [`MemoryFs`].
///
/// Implementations write the compiled code to `config.output_path()` and
/// report the files they read through [`BuildStats`].
pub trait NestedBuild: Send + Sync + 'static {
    fn run(
        &self,
        config: &BuildConfig,
        output: &MemoryFs,
    ) -> impl Future<Output = Result<BuildStats, BuildError>> + Send;
}

/// Backend selected by `[backend] kind`.
#[derive(Debug, Clone)]
pub enum Backend {
    Oxc(OxcBuild),
    Command(CommandBuild),
}

impl NestedBuild for Backend {
    async fn run(&self, config: &BuildConfig, output: &MemoryFs) -> Result<BuildStats, BuildError> {
        match self {
            Self::Oxc(backend) => backend.run(config, output).await,
            Self::Command(backend) => backend.run(config, output).await,
        }
    }
}

// ============================================================================
// Test double
// ============================================================================
