//! Configuration management for `tola-inline.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # [build] and [backend]
//! ├── types/         # ConfigError, ConfigDiagnostics, FieldPath
//! ├── util.rs        # config file discovery
//! └── mod.rs         # InlineConfig (this file)
//! ```
//!
//! # Sections
//!
//! | Section            | Purpose                                        |
//! |--------------------|------------------------------------------------|
//! | `[build]`          | Root, output, input documents, minify          |
//! | `[backend]`        | `oxc` (built-in) or an external `command`      |
//! | `[[module.rules]]` | Loaders applied to entries matching a regex    |
//! | `[[plugins]]`      | Plugins forwarded to every nested build        |
//!
//! Without a config file every value comes from its default and the CLI.

pub mod section;
pub mod types;
mod util;

use util::find_config_file;

pub use section::{BackendConfig, BackendKind, BuildSectionConfig};
pub use types::{ConfigDiagnostics, ConfigError, FieldPath};

use crate::build::{Backend, BuildOptions, ModuleOptions, Plugin, oxc};
use crate::cli::{BuildArgs, Cli};
use crate::utils::path::normalize_path;
use crate::{debug, log};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing `tola-inline.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InlineConfig {
    /// Absolute path to the config file, if one was found (internal use only)
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// Directory relative config paths are resolved against (internal use only)
    #[serde(skip)]
    pub project_dir: PathBuf,

    #[serde(default)]
    pub build: BuildSectionConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    /// Forwarded to every nested build
    #[serde(default)]
    pub module: ModuleOptions,

    /// Forwarded to every nested build
    #[serde(default)]
    pub plugins: Vec<Plugin>,
}

impl InlineConfig {
    pub const RULES: FieldPath = FieldPath::new("module.rules");
    pub const PLUGINS: FieldPath = FieldPath::new("plugins");

    /// Load configuration for the given CLI invocation.
    ///
    /// Searches upward from cwd for the config file. Its directory becomes the
    /// project directory; without one, the cwd is used.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;

        let mut config = match find_config_file(&cli.config) {
            Some(path) => {
                let mut config = Self::from_path(&path)?;
                config.config_path = Some(normalize_path(&path));
                config
            }
            None => {
                debug!("config"; "no {} found, using defaults", cli.config.display());
                Self::default()
            }
        };

        let project_dir = config
            .config_path
            .as_deref()
            .and_then(Path::parent)
            .map_or_else(|| cwd.clone(), Path::to_path_buf);

        config.finalize(&project_dir, &cwd, cli.build_args());
        config.validate()?;
        Ok(config)
    }

    /// Resolve paths and apply CLI overrides.
    fn finalize(&mut self, project_dir: &Path, cwd: &Path, args: &BuildArgs) {
        self.project_dir = normalize_path(project_dir);
        self.normalize_paths();
        self.apply_build_args(args, cwd);
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Print warning about unknown fields.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {field}");
        }
    }

    // ========================================================================
    // accessors
    // ========================================================================

    /// Options copied into each nested build.
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            module: self.module.clone(),
            plugins: self.plugins.clone(),
        }
    }

    /// The configured nested-build backend.
    pub fn create_backend(&self) -> Backend {
        self.backend
            .create(self.build.minify, !crate::logger::is_verbose())
    }

    /// Where the inlined version of `input` is written.
    pub fn output_for(&self, input: &Path) -> PathBuf {
        self.build.output_for(input, self.build.inputs.len())
    }

    /// Get path relative to the project directory, for display.
    pub fn project_relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.project_dir).unwrap_or(path)
    }

    // ========================================================================
    // cli configuration updates
    // ========================================================================

    /// Apply build arguments from CLI. CLI paths are relative to `cwd`.
    fn apply_build_args(&mut self, args: &BuildArgs, cwd: &Path) {
        crate::logger::set_verbose(args.verbose);

        Self::update_option(&mut self.build.minify, args.minify.as_ref());

        if let Some(root) = &args.root {
            self.build.root = normalize_path(&cwd.join(root));
        }
        if let Some(output) = &args.output {
            self.build.output = normalize_path(&cwd.join(output));
        }
        if !args.inputs.is_empty() {
            self.build.inputs = args
                .inputs
                .iter()
                .map(|input| normalize_path(&cwd.join(input)))
                .collect();
        }
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    // ========================================================================
    // path normalization
    // ========================================================================

    /// Resolve config-file paths against the project directory.
    fn normalize_paths(&mut self) {
        let dir = self.project_dir.clone();
        self.build.root = normalize_path(&dir.join(&self.build.root));
        self.build.output = normalize_path(&dir.join(&self.build.output));
        self.build.inputs = self
            .build
            .inputs
            .iter()
            .map(|input| normalize_path(&dir.join(input)))
            .collect();
    }

    // ========================================================================
    // validation
    // ========================================================================

    /// Validate the final configuration.
    ///
    /// Collects all validation errors and returns them at once.
    pub fn validate(&self) -> Result<()> {
        let mut diag = ConfigDiagnostics::new();

        self.build.validate(&mut diag);
        self.backend.validate(&mut diag);
        self.validate_rules(&mut diag);
        self.validate_plugins(&mut diag);

        diag.print_warnings();
        diag.into_result()
            .map_err(|e| ConfigError::Diagnostics(e).into())
    }

    /// Rules are interpreted by the built-in backend only; an external command
    /// receives them verbatim.
    fn validate_rules(&self, diag: &mut ConfigDiagnostics) {
        let builtin = self.backend.kind == BackendKind::Oxc;

        for (i, rule) in self.module.rules.iter().enumerate() {
            let field = Self::RULES.index(i);
            if rule.test.is_empty() {
                diag.error(field.field("test"), "rule has no `test` pattern");
            } else if builtin && let Err(err) = Regex::new(&rule.test) {
                diag.error(
                    field.field("test"),
                    format!("invalid regex `{}`: {err}", rule.test),
                );
            }

            if rule.loaders.is_empty() {
                diag.warn(field.field("use"), "rule applies no loaders");
            }
            if !builtin {
                continue;
            }
            for (j, loader) in rule.loaders.iter().enumerate() {
                if !oxc::LOADERS.contains(&loader.as_str()) {
                    diag.error_with_hint(
                        field.field("use").index(j),
                        format!("unknown loader `{loader}`"),
                        format!("available loaders: {}", oxc::LOADERS.join(", ")),
                    );
                }
            }
        }
    }

    fn validate_plugins(&self, diag: &mut ConfigDiagnostics) {
        let builtin = self.backend.kind == BackendKind::Oxc;

        for (i, plugin) in self.plugins.iter().enumerate() {
            let field = Self::PLUGINS.index(i);
            if plugin.name.trim().is_empty() {
                diag.error(field.field("name"), "plugin has no name");
                continue;
            }
            if !builtin {
                continue;
            }
            if !oxc::PLUGINS.contains(&plugin.name.as_str()) {
                diag.error_with_hint(
                    field.field("name"),
                    format!("unknown plugin `{}`", plugin.name),
                    format!("available plugins: {}", oxc::PLUGINS.join(", ")),
                );
            } else if plugin.option_str(&plugin.name).is_none() {
                diag.warn(
                    field.field(&plugin.name),
                    format!("`{}` plugin has no text and does nothing", plugin.name),
                );
            }
        }
    }
}

// ============================================================================
// Test Helpers (available to all modules via `use crate::config::test_*`)
// ============================================================================

/// Parse config, panicking on unknown fields (to catch config typos in tests).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> InlineConfig {
    let (parsed, ignored) = InlineConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn site() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        dir
    }

    fn finalized(content: &str, dir: &Path, args: &BuildArgs) -> InlineConfig {
        let mut config = test_parse_config(content);
        config.finalize(dir, dir, args);
        config
    }

    fn error_fields(config: &InlineConfig) -> Vec<String> {
        let err = config.validate().unwrap_err();
        match err.downcast_ref::<ConfigError>() {
            Some(ConfigError::Diagnostics(diag)) => diag
                .errors()
                .map(|e| e.field.as_str().to_string())
                .collect(),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_str_invalid_toml() {
        let result: Result<InlineConfig, _> = toml::from_str("[build\nroot = \".\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_full_config() {
        let config = test_parse_config(
            r#"
[build]
inputs = ["index.html"]

[backend]
kind = "oxc"

[[module.rules]]
test = "\\.js$"
use = ["minify"]

[[plugins]]
name = "banner"
banner = "/* built */"
"#,
        );
        assert_eq!(config.module.rules.len(), 1);
        assert_eq!(config.module.rules[0].loaders, vec!["minify"]);
        assert_eq!(config.plugins[0].option_str("banner"), Some("/* built */"));

        let options = config.build_options();
        assert_eq!(options.module, config.module);
        assert_eq!(options.plugins, config.plugins);
    }

    #[test]
    fn test_unknown_fields_detected() {
        let content = "[build]\nminify = true\n[unknown_section]\nfield = \"value\"";
        let (config, ignored) = InlineConfig::parse_with_ignored(content).unwrap();

        assert!(config.build.minify);
        assert!(ignored.iter().any(|f| f.contains("unknown_section")));
    }

    #[test]
    fn test_paths_resolved_against_project_dir() {
        let dir = site();
        let config = finalized(
            "[build]\noutput = \"out\"\ninputs = [\"index.html\"]",
            dir.path(),
            &BuildArgs::default(),
        );
        let project = normalize_path(dir.path());

        assert_eq!(config.build.root, project);
        assert_eq!(config.build.output, project.join("out"));
        assert_eq!(config.build.inputs, vec![project.join("index.html")]);
        assert_eq!(
            config.output_for(&project.join("index.html")),
            project.join("out/index.html")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides() {
        let dir = site();
        fs::create_dir(dir.path().join("public")).unwrap();
        let args = BuildArgs {
            inputs: vec![PathBuf::from("index.html")],
            output: Some(PathBuf::from("inlined.html")),
            root: Some(PathBuf::from("public")),
            minify: Some(true),
            verbose: false,
        };
        let config = finalized("[build]\ninputs = [\"other.html\"]", dir.path(), &args);
        let project = normalize_path(dir.path());

        assert!(config.build.minify);
        assert_eq!(config.build.root, project.join("public"));
        assert_eq!(config.build.inputs, vec![project.join("index.html")]);
        assert_eq!(
            config.output_for(&project.join("index.html")),
            project.join("inlined.html")
        );
    }

    #[test]
    fn test_validate_rules_for_builtin_backend() {
        let dir = site();
        let config = finalized(
            r#"
[build]
inputs = ["index.html"]

[[module.rules]]
test = "(unclosed"
use = ["minify"]

[[module.rules]]
test = "\\.js$"
use = ["minify", "babel"]
"#,
            dir.path(),
            &BuildArgs::default(),
        );
        assert_eq!(
            error_fields(&config),
            vec!["module.rules[0].test", "module.rules[1].use[1]"]
        );
    }

    #[test]
    fn test_command_backend_skips_builtin_checks() {
        let dir = site();
        let config = finalized(
            r#"
[build]
inputs = ["index.html"]

[backend]
kind = "command"
command = ["esbuild", "$INLINE_ENTRY", "--bundle"]

[[module.rules]]
test = "(?=lookahead)"
use = ["babel-loader"]

[[plugins]]
name = "define"
"#,
            dir.path(),
            &BuildArgs::default(),
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_plugins() {
        let dir = site();
        let config = finalized(
            r#"
[build]
inputs = ["index.html"]

[[plugins]]
name = "banner"
banner = "/* hi */"

[[plugins]]
name = "license"

[[plugins]]
name = ""
"#,
            dir.path(),
            &BuildArgs::default(),
        );
        assert_eq!(
            error_fields(&config),
            vec!["plugins[1].name", "plugins[2].name"]
        );
    }

    #[test]
    fn test_missing_inputs_reported() {
        let dir = site();
        let config = finalized("", dir.path(), &BuildArgs::default());
        assert_eq!(error_fields(&config), vec!["build.inputs"]);
    }
}
