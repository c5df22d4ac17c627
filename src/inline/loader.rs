//! `InlineLoader`: one inlining run over one HTML document.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{Document, FailFastJoin, HostContext, InlineError};
use crate::build::{BuildConfig, BuildError, BuildStats, MemoryFs, NestedBuild};
use crate::utils::path::join_src;

/// Inlines every locally resolvable `<script src>` of a document.
///
/// Nested builds run as concurrent tokio tasks. Each task mutates only its
/// own script element, so the document lock is held for a single attribute
/// and text update at a time.
pub struct InlineLoader<C, B> {
    shared: Arc<Shared<C, B>>,
}

/// State shared with the nested-build tasks.
struct Shared<C, B> {
    context: Arc<C>,
    backend: Arc<B>,
    document: Mutex<Document>,
}

impl<C: HostContext, B: NestedBuild> InlineLoader<C, B> {
    /// Parse `html` and prepare a run.
    pub fn new(context: Arc<C>, backend: Arc<B>, html: &str) -> Result<Self, InlineError> {
        let document = Document::parse(html)?;
        Ok(Self {
            shared: Arc::new(Shared {
                context,
                backend,
                document: Mutex::new(document),
            }),
        })
    }

    /// Parse `html`, start inlining right away and report through `callback`.
    ///
    /// `callback` is invoked exactly once, with the serialized document or the
    /// first error. Must be called from within a tokio runtime.
    pub fn start<F>(
        context: Arc<C>,
        backend: Arc<B>,
        html: &str,
        callback: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: FnOnce(Result<String, InlineError>) + Send + 'static,
    {
        let loader = Self::new(context, backend, html);
        tokio::spawn(async move {
            let result = match loader {
                Ok(loader) => loader.run().await,
                Err(err) => Err(err),
            };
            callback(result);
        })
    }

    /// Inline all scripts and return the serialized document.
    pub async fn run(self) -> Result<String, InlineError> {
        let tasks = self.inline_scripts();
        self.await_all(tasks).await
    }

    /// Scan scripts in document order, scheduling one nested build per
    /// existing source file and warning about the rest.
    fn inline_scripts(&self) -> FailFastJoin<InlineError> {
        let mut tasks = FailFastJoin::new();
        let candidates: Vec<(usize, String)> = {
            let document = self.shared.document.lock();
            document
                .scripts()
                .iter()
                .enumerate()
                .filter_map(|(index, script)| script.src().map(|src| (index, src)))
                .collect()
        };

        let base = self.shared.context.base_path();
        for (index, src) in candidates {
            let path = join_src(base, &src);
            if !path.is_file() {
                self.shared
                    .context
                    .emit_warning(&format!("Source file ({src}) does not exist."));
                continue;
            }

            crate::debug!("inline"; "scheduling {}", src);
            let shared = Arc::clone(&self.shared);
            tasks.spawn(async move { shared.inline_one(index, &src).await });
        }
        tasks
    }

    /// Join all tasks; serialize only if every one of them succeeded.
    async fn await_all(self, tasks: FailFastJoin<InlineError>) -> Result<String, InlineError> {
        tasks.join().await?;
        Ok(self.shared.document.lock().serialize())
    }
}

impl<C: HostContext, B: NestedBuild> Shared<C, B> {
    /// Build `src` and swap it into the script element at `index`.
    async fn inline_one(&self, index: usize, src: &str) -> Result<(), InlineError> {
        let source = self.run_nested_build(src).await?;

        let mut document = self.document.lock();
        if let Some(script) = document.script_mut(index) {
            script.remove_attribute("src");
            script.set_text_content(source);
        }
        Ok(())
    }

    /// Run one nested build into a fresh in-memory filesystem.
    async fn run_nested_build(&self, src: &str) -> Result<String, BuildError> {
        let config = BuildConfig::for_src(src, self.context.base_path(), self.context.options());
        let output = MemoryFs::new();

        let stats = self.backend.run(&config, &output).await?;
        self.register_dependencies(&stats);

        let path = config.output_path();
        let bytes = output
            .read_file(&path)
            .ok_or_else(|| BuildError::MissingOutput(path.clone()))?;
        String::from_utf8(bytes).map_err(|_| BuildError::Utf8(path))
    }

    fn register_dependencies(&self, stats: &BuildStats) {
        let Some(deps) = &stats.file_dependencies else {
            return;
        };
        for dep in deps {
            self.context.add_dependency(dep);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::testing::FakeBuild;
    use crate::inline::testing::RecordingContext;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;

    fn site(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in files {
            let path = dir.path().join(name.trim_start_matches('/'));
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "// source").unwrap();
        }
        dir
    }

    fn loader(
        dir: &Path,
        backend: FakeBuild,
        html: &str,
    ) -> (
        InlineLoader<RecordingContext, FakeBuild>,
        Arc<RecordingContext>,
        Arc<FakeBuild>,
    ) {
        let context = Arc::new(RecordingContext::new(dir));
        let backend = Arc::new(backend);
        let loader = InlineLoader::new(context.clone(), backend.clone(), html).unwrap();
        (loader, context, backend)
    }

    #[tokio::test]
    async fn test_inlines_existing_script() {
        let dir = site(&["/foo.js"]);
        let html = r#"<script src="/foo.js"></script>"#;
        let (loader, context, backend) =
            loader(dir.path(), FakeBuild::new().ok("./foo.js", "console.log(1)"), html);

        let out = loader.run().await.unwrap();

        assert_eq!(out, "<script>console.log(1)</script>");
        assert!(context.warnings.lock().is_empty());
        assert_eq!(backend.entries(), vec!["./foo.js"]);
    }

    #[tokio::test]
    async fn test_missing_script_warns_and_stays() {
        let dir = site(&[]);
        let html = r#"<script src="/missing.js"></script>"#;
        let (loader, context, backend) = loader(dir.path(), FakeBuild::new(), html);

        let out = loader.run().await.unwrap();

        assert_eq!(out, html);
        let warnings = context.warnings.lock();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("/missing.js"));
        assert!(backend.entries().is_empty());
    }

    #[tokio::test]
    async fn test_no_src_scripts_is_identity() {
        let dir = site(&[]);
        let html = "<html><body><script>inline()</script><p>x</p></body></html>";
        let (loader, context, backend) = loader(dir.path(), FakeBuild::new(), html);

        assert_eq!(loader.run().await.unwrap(), html);
        assert!(context.warnings.lock().is_empty());
        assert!(backend.entries().is_empty());
    }

    #[tokio::test]
    async fn test_mixed_document() {
        let dir = site(&["/a.js", "/js/c.js"]);
        let html = concat!(
            r#"<head><script src="/a.js"></script></head>"#,
            r#"<body><script src="/b.js"></script><script src="./js/c.js" defer></script></body>"#,
        );
        let backend = FakeBuild::new()
            .ok("./a.js", "a()")
            .ok("./js/c.js", "c()")
            .delay("./a.js", Duration::from_millis(30));
        let (loader, context, backend) = loader(dir.path(), backend, html);

        let out = loader.run().await.unwrap();

        assert_eq!(
            out,
            concat!(
                "<head><script>a()</script></head>",
                r#"<body><script src="/b.js"></script><script defer>c()</script></body>"#,
            )
        );
        assert_eq!(*context.warnings.lock(), vec!["Source file (/b.js) does not exist."]);
        // scheduled in document order, c finishes first
        assert_eq!(backend.entries(), vec!["./a.js", "./js/c.js"]);
        assert_eq!(*backend.finished.lock(), vec!["./js/c.js", "./a.js"]);
    }

    #[tokio::test]
    async fn test_script_markup_inside_strings_is_not_a_script() {
        let dir = site(&["/x.js", "/y.js"]);
        let html = concat!(
            r#"<script>var s = "<script src='/x.js'></scr" + "ipt>"; go(s);</script>"#,
            r#"<p>after</p><script src="/y.js"></script>"#,
        );
        let (loader, context, backend) =
            loader(dir.path(), FakeBuild::new().ok("./y.js", "Y()"), html);

        let out = loader.run().await.unwrap();

        assert_eq!(
            out,
            concat!(
                r#"<script>var s = "<script src='/x.js'></scr" + "ipt>"; go(s);</script>"#,
                "<p>after</p><script>Y()</script>",
            )
        );
        assert!(context.warnings.lock().is_empty());
        assert_eq!(backend.entries(), vec!["./y.js"]);
    }

    #[tokio::test]
    async fn test_build_config_forwarded() {
        let dir = site(&["/app.js"]);
        let mut context = RecordingContext::new(dir.path());
        context.options.plugins.push(crate::build::Plugin {
            name: "banner".into(),
            options: toml::Table::new(),
        });
        let context = Arc::new(context);
        let backend = Arc::new(FakeBuild::new().ok("./app.js", "x"));
        let loader = InlineLoader::new(
            context.clone(),
            backend.clone(),
            r#"<script src="/app.js"></script>"#,
        )
        .unwrap();

        loader.run().await.unwrap();

        let requests = backend.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].entry, "./app.js");
        assert_eq!(requests[0].filename, "./app.js");
        assert_eq!(requests[0].context, dir.path());
        assert_eq!(requests[0].plugins, context.options.plugins);
    }

    #[tokio::test]
    async fn test_first_failure_fails_whole_run() {
        let dir = site(&["/ok.js", "/bad.js"]);
        let html = r#"<script src="/ok.js"></script><script src="/bad.js"></script>"#;
        let backend = FakeBuild::new()
            .ok("./ok.js", "ok()")
            .delay("./ok.js", Duration::from_millis(50))
            .fail("./bad.js", "bad.js: unexpected token");
        let (loader, _, backend) = loader(dir.path(), backend, html);

        let err = loader.run().await.unwrap_err();

        assert_eq!(err.to_string(), "bad.js: unexpected token");
        assert!(matches!(err, InlineError::Build(BuildError::Command(_))));
        // the sibling was not cancelled
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(backend.finished.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_dependencies_registered_in_order() {
        let dir = site(&["/a.js"]);
        let backend = FakeBuild::new().ok_with_deps("./a.js", "a()", &["/x/a.js", "/x/util.js"]);
        let (loader, context, _) = loader(dir.path(), backend, r#"<script src="/a.js"></script>"#);

        loader.run().await.unwrap();

        assert_eq!(
            *context.dependencies.lock(),
            vec![PathBuf::from("/x/a.js"), PathBuf::from("/x/util.js")]
        );
    }

    #[tokio::test]
    async fn test_empty_or_absent_dependencies_register_nothing() {
        let dir = site(&["/a.js", "/b.js"]);
        let backend = FakeBuild::new()
            .ok("./a.js", "a()")
            .ok_with_deps("./b.js", "b()", &[]);
        let html = r#"<script src="/a.js"></script><script src="/b.js"></script>"#;
        let (loader, context, _) = loader(dir.path(), backend, html);

        loader.run().await.unwrap();

        assert!(context.dependencies.lock().is_empty());
    }

    #[tokio::test]
    async fn test_start_invokes_callback_once() {
        let dir = site(&["/foo.js"]);
        let context = Arc::new(RecordingContext::new(dir.path()));
        let backend = Arc::new(FakeBuild::new().ok("./foo.js", "foo()"));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        InlineLoader::start(context, backend, r#"<script src="/foo.js"></script>"#, move |result| {
            tx.send(result).unwrap();
        })
        .await
        .unwrap();

        let result = rx.recv().await.unwrap();
        assert_eq!(result.unwrap(), "<script>foo()</script>");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_start_reports_failure() {
        let dir = site(&["/foo.js"]);
        let context = Arc::new(RecordingContext::new(dir.path()));
        let backend = Arc::new(FakeBuild::new().fail("./foo.js", "nope"));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        InlineLoader::start(context, backend, r#"<script src="/foo.js"></script>"#, move |result| {
            tx.send(result).unwrap();
        })
        .await
        .unwrap();

        let err = rx.recv().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "nope");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_output_is_error() {
        struct SilentBuild;
        impl NestedBuild for SilentBuild {
            async fn run(&self, _: &BuildConfig, _: &MemoryFs) -> Result<BuildStats, BuildError> {
                Ok(BuildStats::default())
            }
        }

        let dir = site(&["/foo.js"]);
        let context = Arc::new(RecordingContext::new(dir.path()));
        let loader = InlineLoader::new(
            context,
            Arc::new(SilentBuild),
            r#"<script src="/foo.js"></script>"#,
        )
        .unwrap();

        let err = loader.run().await.unwrap_err();
        assert!(matches!(err, InlineError::Build(BuildError::MissingOutput(_))));
    }
}
