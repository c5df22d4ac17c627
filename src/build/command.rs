//! External command backend.
//!
//! Runs a configured command (esbuild, swc, a shell script, ...) once per
//! script and captures its stdout as the compiled output.
//!
//! # Variables
//!
//! Substituted in arguments and exported to the environment:
//!
//! | Variable              | Value                                  |
//! |-----------------------|----------------------------------------|
//! | `$INLINE_ENTRY`       | entry relative to the context (`./app.js`) |
//! | `$INLINE_ENTRY_PATH`  | absolute entry path                    |
//! | `$INLINE_CONTEXT`     | context directory (also the cwd)       |
//! | `$INLINE_FILENAME`    | output filename (`./app.js`)           |
//!
//! Exported to the environment only, as JSON:
//! `INLINE_MODULE_RULES` and `INLINE_PLUGINS`.
//!
//! # Example
//!
//! ```toml
//! [backend]
//! kind = "command"
//! command = ["esbuild", "$INLINE_ENTRY", "--bundle", "--format=iife"]
//! ```

use super::{BuildConfig, BuildError, BuildStats, MemoryFs, NestedBuild};
use crate::utils::exec::Cmd;

/// Command-running backend.
#[derive(Debug, Clone)]
pub struct CommandBuild {
    command: Vec<String>,
    quiet: bool,
}

impl CommandBuild {
    pub fn new(command: Vec<String>, quiet: bool) -> Self {
        Self { command, quiet }
    }

    /// Display name for logging (`command[0]`).
    pub fn display_name(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or("command")
    }

    fn execute(&self, config: &BuildConfig) -> Result<Vec<u8>, BuildError> {
        if self.command.is_empty() {
            return Err(BuildError::Command("backend command is empty".into()));
        }

        let vars = build_vars(config);
        let args = resolve_args(&self.command, &vars);

        let rules = serde_json::to_string(&config.module.rules)
            .map_err(|err| BuildError::Command(err.to_string()))?;
        let plugins = serde_json::to_string(&config.plugins)
            .map_err(|err| BuildError::Command(err.to_string()))?;

        crate::debug!("build"; "`{}` {}", self.display_name(), config.entry);

        Cmd::from_slice(&args)
            .cwd(&config.context)
            .envs(vars.iter().map(|(k, v)| (*k, v.as_str())))
            .envs([("INLINE_MODULE_RULES", rules), ("INLINE_PLUGINS", plugins)])
            .quiet(self.quiet)
            .run()
            .map_err(|err| BuildError::Command(err.to_string()))
    }
}

impl NestedBuild for CommandBuild {
    async fn run(&self, config: &BuildConfig, output: &MemoryFs) -> Result<BuildStats, BuildError> {
        let backend = self.clone();
        let owned = config.clone();
        let stdout = tokio::task::spawn_blocking(move || backend.execute(&owned))
            .await
            .map_err(|err| BuildError::Task(err.to_string()))??;

        output.write_file(&config.output_path(), stdout);
        Ok(BuildStats::with_dependencies([config.entry_path()]))
    }
}

/// `$INLINE_*` variables, longest name first so that `$INLINE_ENTRY_PATH`
/// is substituted before `$INLINE_ENTRY`.
fn build_vars(config: &BuildConfig) -> Vec<(&'static str, String)> {
    vec![
        (
            "INLINE_ENTRY_PATH",
            config.entry_path().display().to_string(),
        ),
        ("INLINE_FILENAME", config.filename.clone()),
        ("INLINE_CONTEXT", config.context.display().to_string()),
        ("INLINE_ENTRY", config.entry.clone()),
    ]
}

/// Replace `$INLINE_XXX` occurrences in command arguments.
fn resolve_args(args: &[String], vars: &[(&'static str, String)]) -> Vec<String> {
    args.iter()
        .map(|arg| {
            let mut result = arg.clone();
            for (key, value) in vars {
                result = result.replace(&format!("${key}"), value);
            }
            result
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{BuildOptions, ModuleOptions, ModuleRule};
    use std::path::Path;

    fn config(src: &str, context: &Path) -> BuildConfig {
        BuildConfig::for_src(src, context, &BuildOptions::default())
    }

    #[test]
    fn test_resolve_args() {
        let config = config("/js/app.js", Path::new("/site"));
        let vars = build_vars(&config);
        let args = resolve_args(
            &[
                "esbuild".into(),
                "$INLINE_ENTRY".into(),
                "--abs=$INLINE_ENTRY_PATH".into(),
                "--cwd=$INLINE_CONTEXT".into(),
            ],
            &vars,
        );
        assert_eq!(
            args,
            vec![
                "esbuild",
                "./js/app.js",
                "--abs=/site/js/app.js",
                "--cwd=/site",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_becomes_output() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();
        let backend = CommandBuild::new(vec!["cat".into(), "$INLINE_ENTRY".into()], true);
        let config = config("/app.js", dir.path());
        let fs = MemoryFs::new();

        let stats = backend.run(&config, &fs).await.unwrap();

        assert_eq!(
            fs.read_file(&config.output_path()),
            Some(b"console.log(1)".to_vec())
        );
        assert_eq!(stats.file_dependencies, Some(vec![dir.path().join("app.js")]));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_options_exported_as_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = CommandBuild::new(vec!["printenv".into(), "INLINE_MODULE_RULES".into()], true);
        let options = BuildOptions {
            module: ModuleOptions {
                rules: vec![ModuleRule {
                    test: "x".into(),
                    loaders: vec!["y".into()],
                }],
            },
            plugins: Vec::new(),
        };
        let config = BuildConfig::for_src("/app.js", dir.path(), &options);
        let fs = MemoryFs::new();

        backend.run(&config, &fs).await.unwrap();

        let out = String::from_utf8(fs.read_file(&config.output_path()).unwrap()).unwrap();
        assert_eq!(out.trim(), r#"[{"test":"x","use":["y"]}]"#);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_is_command_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = CommandBuild::new(
            vec!["sh".into(), "-c".into(), "echo nope >&2; exit 1".into()],
            true,
        );
        let config = config("/app.js", dir.path());
        let fs = MemoryFs::new();

        let err = backend.run(&config, &fs).await.unwrap_err();

        assert!(matches!(&err, BuildError::Command(msg) if msg.contains("nope")));
        assert!(!fs.exists(&config.output_path()));
    }

    #[tokio::test]
    async fn test_empty_command() {
        let backend = CommandBuild::new(Vec::new(), true);
        let fs = MemoryFs::new();
        let err = backend
            .run(&config("/app.js", Path::new("/site")), &fs)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Command(_)));
    }
}
