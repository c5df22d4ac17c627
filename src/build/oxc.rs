//! Built-in nested build backend.
//!
//! Reads the entry from disk, validates it with the oxc parser, runs the
//! loaders of every matching module rule, applies plugins and writes the
//! result into the build's [`MemoryFs`].
//!
//! | Loader           | Effect                                  |
//! |------------------|-----------------------------------------|
//! | `minify`         | oxc minifier + mangler, minified codegen |
//! | `strip-comments` | re-emit the program without comments    |
//!
//! | Plugin   | Option   | Effect                     |
//! |----------|----------|----------------------------|
//! | `banner` | `banner` | prepend text to the output |
//! | `footer` | `footer` | append text to the output  |
//!
//! No bundling: `import` statements are left as written.

use std::path::Path;

use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;
use regex::Regex;

use super::{BuildConfig, BuildError, BuildStats, MemoryFs, ModuleRule, NestedBuild, Plugin};

/// Loaders understood by [`OxcBuild`].
pub const LOADERS: &[&str] = &["minify", "strip-comments"];

/// Plugins understood by [`OxcBuild`].
pub const PLUGINS: &[&str] = &["banner", "footer"];

/// oxc-powered backend.
#[derive(Debug, Clone, Default)]
pub struct OxcBuild {
    /// Minify every entry, on top of whatever the rules ask for.
    minify: bool,
}

impl OxcBuild {
    pub const fn new(minify: bool) -> Self {
        Self { minify }
    }

    /// Compile one entry to its final text.
    fn compile(&self, config: &BuildConfig) -> Result<String, BuildError> {
        let path = config.entry_path();
        let source_type = source_type(&path)?;
        let source =
            std::fs::read_to_string(&path).map_err(|err| BuildError::Io(path.clone(), err))?;

        check_syntax(&path, &source, source_type)?;

        let mut code = source;
        for loader in self.loaders_for(&path, &config.module.rules)? {
            code = match loader.as_str() {
                "minify" => minify_js(&code, source_type),
                "strip-comments" => strip_comments(&code, source_type),
                other => return Err(BuildError::UnknownLoader(other.to_string())),
            }
            .ok_or_else(|| BuildError::Codegen(path.clone()))?;
        }

        apply_plugins(code, &config.plugins)
    }

    /// Loaders of all rules matching `path`, in rule order.
    fn loaders_for(&self, path: &Path, rules: &[ModuleRule]) -> Result<Vec<String>, BuildError> {
        let subject = path.to_string_lossy();
        let mut loaders = Vec::new();
        for rule in rules {
            let test = Regex::new(&rule.test).map_err(|source| BuildError::InvalidRule {
                test: rule.test.clone(),
                source,
            })?;
            if test.is_match(&subject) {
                loaders.extend(rule.loaders.iter().cloned());
            }
        }
        if self.minify && !loaders.iter().any(|l| l == "minify") {
            loaders.push("minify".to_string());
        }
        Ok(loaders)
    }
}

impl NestedBuild for OxcBuild {
    async fn run(&self, config: &BuildConfig, output: &MemoryFs) -> Result<BuildStats, BuildError> {
        let backend = self.clone();
        let owned = config.clone();
        let code = tokio::task::spawn_blocking(move || backend.compile(&owned))
            .await
            .map_err(|err| BuildError::Task(err.to_string()))??;

        output.write_file(&config.output_path(), code);
        Ok(BuildStats::with_dependencies([config.entry_path()]))
    }
}

/// How an entry is parsed.
///
/// A classic `<script>` shares its top-level declarations with the page, so
/// `.js` only counts as a module when it uses `import`/`export`. Minifying a
/// module may drop unused top-level code; minifying a script must not.
fn source_type(path: &Path) -> Result<SourceType, BuildError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("js") => Ok(SourceType::unambiguous()),
        Some("mjs") => Ok(SourceType::mjs()),
        Some("cjs") => Ok(SourceType::script()),
        _ => Err(BuildError::Unsupported(path.to_path_buf())),
    }
}

fn check_syntax(path: &Path, source: &str, source_type: SourceType) -> Result<(), BuildError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type).parse();
    if ret.errors.is_empty() {
        return Ok(());
    }
    let message = ret
        .errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n");
    Err(BuildError::Syntax {
        path: path.to_path_buf(),
        message,
    })
}

/// Minify JavaScript source code.
fn minify_js(source: &str, source_type: SourceType) -> Option<String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type).parse();
    if !ret.errors.is_empty() {
        return None;
    }
    let mut program = ret.program;
    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions::smallest()),
    };
    let ret = Minifier::new(options).minify(&allocator, &mut program);
    let code = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        })
        .with_scoping(ret.scoping)
        .build(&program)
        .code;
    Some(code)
}

/// Re-print the program without comments.
fn strip_comments(source: &str, source_type: SourceType) -> Option<String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type).parse();
    if !ret.errors.is_empty() {
        return None;
    }
    let code = Codegen::new()
        .with_options(CodegenOptions {
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        })
        .build(&ret.program)
        .code;
    Some(code)
}

fn apply_plugins(mut code: String, plugins: &[Plugin]) -> Result<String, BuildError> {
    for plugin in plugins {
        match plugin.name.as_str() {
            "banner" => {
                if let Some(banner) = plugin.option_str("banner") {
                    code = format!("{banner}\n{code}");
                }
            }
            "footer" => {
                if let Some(footer) = plugin.option_str("footer") {
                    if !code.ends_with('\n') {
                        code.push('\n');
                    }
                    code.push_str(footer);
                }
            }
            other => return Err(BuildError::UnknownPlugin(other.to_string())),
        }
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{BuildOptions, ModuleOptions};
    use std::fs;
    use tempfile::TempDir;

    fn setup(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        dir
    }

    fn plugin(name: &str, key: &str, value: &str) -> Plugin {
        let mut options = toml::Table::new();
        options.insert(key.into(), toml::Value::String(value.into()));
        Plugin {
            name: name.into(),
            options,
        }
    }

    async fn build(backend: &OxcBuild, dir: &Path, src: &str, options: &BuildOptions) -> Result<(String, BuildStats), BuildError> {
        let config = BuildConfig::for_src(src, dir, options);
        let fs = MemoryFs::new();
        let stats = backend.run(&config, &fs).await?;
        let code = fs.read_file(&config.output_path()).unwrap();
        Ok((String::from_utf8(code).unwrap(), stats))
    }

    #[tokio::test]
    async fn test_passthrough_reports_entry_dependency() {
        let dir = setup(&[("app.js", "console.log(1);\n")]);
        let (code, stats) = build(&OxcBuild::default(), dir.path(), "/app.js", &BuildOptions::default())
            .await
            .unwrap();

        assert_eq!(code, "console.log(1);\n");
        assert_eq!(
            stats.file_dependencies,
            Some(vec![dir.path().join("app.js")])
        );
    }

    #[tokio::test]
    async fn test_minify_flag() {
        let source = "const message = 'hi';\nconsole.log(message);\n";
        let dir = setup(&[("app.js", source)]);
        let (code, _) = build(&OxcBuild::new(true), dir.path(), "/app.js", &BuildOptions::default())
            .await
            .unwrap();

        assert!(code.contains("console.log"));
        assert!(code.len() < source.len());
    }

    #[tokio::test]
    async fn test_minify_keeps_script_globals() {
        let dir = setup(&[(
            "app.js",
            "function handleClick() { console.log('hi'); }\nvar counter = 0;\n",
        )]);
        let (code, _) = build(&OxcBuild::new(true), dir.path(), "/app.js", &BuildOptions::default())
            .await
            .unwrap();

        assert!(code.contains("function handleClick("));
        assert!(code.contains("counter"));
    }

    #[tokio::test]
    async fn test_module_syntax_in_js_entry() {
        let dir = setup(&[("app.js", "import { x } from './x.js';\nconsole.log(x);\n")]);
        let (code, _) = build(&OxcBuild::default(), dir.path(), "/app.js", &BuildOptions::default())
            .await
            .unwrap();
        assert!(code.starts_with("import"));
    }

    #[tokio::test]
    async fn test_rule_loaders_only_apply_on_match() {
        let dir = setup(&[
            ("a.js", "// note\nconsole.log(1);\n"),
            ("b.mjs", "// note\nconsole.log(2);\n"),
        ]);
        let options = BuildOptions {
            module: ModuleOptions {
                rules: vec![ModuleRule {
                    test: r"\.js$".into(),
                    loaders: vec!["strip-comments".into()],
                }],
            },
            plugins: Vec::new(),
        };
        let backend = OxcBuild::default();

        let (a, _) = build(&backend, dir.path(), "/a.js", &options).await.unwrap();
        let (b, _) = build(&backend, dir.path(), "/b.mjs", &options).await.unwrap();

        assert!(!a.contains("// note"));
        assert!(b.contains("// note"));
    }

    #[tokio::test]
    async fn test_banner_and_footer_plugins() {
        let dir = setup(&[("app.js", "run();")]);
        let options = BuildOptions {
            module: ModuleOptions::default(),
            plugins: vec![
                plugin("banner", "banner", "/* top */"),
                plugin("footer", "footer", "/* end */"),
            ],
        };
        let (code, _) = build(&OxcBuild::default(), dir.path(), "/app.js", &options)
            .await
            .unwrap();

        assert_eq!(code, "/* top */\nrun();\n/* end */");
    }

    #[tokio::test]
    async fn test_syntax_error() {
        let dir = setup(&[("broken.js", "function (")]);
        let err = build(&OxcBuild::default(), dir.path(), "/broken.js", &BuildOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Syntax { .. }));
    }

    #[tokio::test]
    async fn test_unknown_loader_and_plugin() {
        let dir = setup(&[("app.js", "run();")]);
        let options = BuildOptions {
            module: ModuleOptions {
                rules: vec![ModuleRule {
                    test: "app".into(),
                    loaders: vec!["babel".into()],
                }],
            },
            plugins: Vec::new(),
        };
        let err = build(&OxcBuild::default(), dir.path(), "/app.js", &options)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::UnknownLoader(name) if name == "babel"));

        let options = BuildOptions {
            module: ModuleOptions::default(),
            plugins: vec![plugin("define", "x", "1")],
        };
        let err = build(&OxcBuild::default(), dir.path(), "/app.js", &options)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::UnknownPlugin(name) if name == "define"));
    }

    #[tokio::test]
    async fn test_unsupported_and_missing() {
        let dir = setup(&[("app.ts", "let a: number = 1;")]);
        let err = build(&OxcBuild::default(), dir.path(), "/app.ts", &BuildOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Unsupported(_)));

        let err = build(&OxcBuild::default(), dir.path(), "/gone.js", &BuildOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Io(..)));
    }
}
