//! `tola-inline build`: inline every input document once.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use super::context::CliContext;
use crate::build::NestedBuild;
use crate::config::InlineConfig;
use crate::inline::InlineLoader;
use crate::log;

/// Outcome of one input document.
#[derive(Debug, Clone)]
pub struct InputReport {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Files the nested builds read, first registration first.
    pub dependencies: Vec<PathBuf>,
    /// Non-fatal diagnostics (missing script sources).
    pub warnings: Vec<String>,
}

/// Inline the scripts of `input` and write the result.
///
/// The output file is only written when every nested build succeeded.
pub async fn inline_file<B: NestedBuild>(
    config: &InlineConfig,
    backend: Arc<B>,
    input: &Path,
) -> Result<InputReport> {
    let html = fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let context = Arc::new(CliContext::new(&config.build.root, config.build_options()));
    let label = config.project_relative(input).display().to_string();

    let inlined = InlineLoader::new(Arc::clone(&context), backend, &html)
        .with_context(|| format!("Failed to parse {label}"))?
        .run()
        .await
        .with_context(|| format!("Failed to inline scripts of {label}"))?;

    let output = config.output_for(input);
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&output, inlined).with_context(|| format!("Failed to write {}", output.display()))?;

    Ok(InputReport {
        input: input.to_path_buf(),
        output,
        dependencies: context.dependencies(),
        warnings: context.warnings(),
    })
}

/// Process all inputs in order, stopping at the first failure.
pub async fn build_all<B: NestedBuild>(
    config: &InlineConfig,
    backend: Arc<B>,
) -> Result<Vec<InputReport>> {
    let mut reports = Vec::with_capacity(config.build.inputs.len());
    for input in &config.build.inputs {
        let report = inline_file(config, Arc::clone(&backend), input).await?;
        log_report(config, &report);
        reports.push(report);
    }
    Ok(reports)
}

/// Entry point of the `build` command.
pub async fn run_build(config: &InlineConfig) -> Result<()> {
    let backend = Arc::new(config.create_backend());
    let reports = build_all(config, backend).await?;

    let warnings: usize = reports.iter().map(|r| r.warnings.len()).sum();
    log!(
        "build";
        "inlined {} document{} ({} warning{})",
        reports.len(),
        plural_s(reports.len()),
        warnings,
        plural_s(warnings)
    );
    Ok(())
}

fn log_report(config: &InlineConfig, report: &InputReport) {
    for warning in &report.warnings {
        log!("warning"; "{}: {}", config.project_relative(&report.input).display(), warning);
    }
    log!(
        "build";
        "{} -> {}",
        config.project_relative(&report.input).display(),
        config.project_relative(&report.output).display()
    );
}

/// Returns "s" if count != 1, otherwise "".
pub const fn plural_s(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::testing::FakeBuild;
    use crate::build::{Backend, OxcBuild};
    use crate::config::BuildSectionConfig;
    use crate::utils::path::normalize_path;
    use tempfile::TempDir;

    fn site(files: &[(&str, &str)]) -> (TempDir, InlineConfig) {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let root = normalize_path(dir.path());
        let config = InlineConfig {
            project_dir: root.clone(),
            build: BuildSectionConfig {
                root: root.clone(),
                output: root.join("dist"),
                inputs: vec![root.join("index.html")],
                minify: false,
            },
            ..Default::default()
        };
        (dir, config)
    }

    #[test]
    fn test_plural_s() {
        assert_eq!(plural_s(0), "s");
        assert_eq!(plural_s(1), "");
        assert_eq!(plural_s(2), "s");
    }

    #[tokio::test]
    async fn test_inline_file_writes_output() {
        let (_dir, config) = site(&[
            ("index.html", r#"<body><script src="/app.js"></script><script src="/gone.js"></script></body>"#),
            ("app.js", "// app"),
        ]);
        let backend = Arc::new(FakeBuild::new().ok_with_deps("./app.js", "app()", &["/deps/app.js"]));
        let input = config.build.inputs[0].clone();

        let report = inline_file(&config, backend, &input).await.unwrap();

        assert_eq!(report.output, config.build.root.join("dist/index.html"));
        assert_eq!(
            fs::read_to_string(&report.output).unwrap(),
            r#"<body><script>app()</script><script src="/gone.js"></script></body>"#
        );
        assert_eq!(report.dependencies, vec![PathBuf::from("/deps/app.js")]);
        assert_eq!(report.warnings, vec!["Source file (/gone.js) does not exist."]);
    }

    #[tokio::test]
    async fn test_failed_build_writes_nothing() {
        let (_dir, config) = site(&[
            ("index.html", r#"<script src="/app.js"></script>"#),
            ("app.js", "// app"),
        ]);
        let backend = Arc::new(FakeBuild::new().fail("./app.js", "app.js: unexpected token"));

        let err = build_all(&config, backend).await.unwrap_err();

        assert!(format!("{err:#}").contains("app.js: unexpected token"));
        assert!(!config.build.root.join("dist/index.html").exists());
    }

    #[tokio::test]
    async fn test_build_with_builtin_backend() {
        let (_dir, config) = site(&[
            ("index.html", "<head><script src=\"js/main.js\" defer></script></head>"),
            ("js/main.js", "const answer = 42;\nconsole.log(answer);\n"),
        ]);
        let backend = Arc::new(Backend::Oxc(OxcBuild::new(false)));

        let reports = build_all(&config, backend).await.unwrap();

        let html = fs::read_to_string(&reports[0].output).unwrap();
        assert!(html.starts_with("<head><script defer>const answer = 42;"));
        assert!(html.ends_with("</script></head>"));
        assert_eq!(
            reports[0].dependencies,
            vec![config.build.root.join("js/main.js")]
        );
    }
}
