//! `tola-inline watch`: build, then rebuild on change.
//!
//! ```text
//! notify watcher → Debouncer (timing, dedup) → WatchGraph (affected inputs) → rebuild
//! ```
//!
//! The watcher starts before the initial build so that no event is lost
//! while it runs. Every rebuild refreshes the dependency set of its input.

mod debouncer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::{FxHashMap, FxHashSet};

use super::build::{InputReport, inline_file};
use crate::build::NestedBuild;
use crate::config::InlineConfig;
use crate::core::{set_watching, shutdown_requested};
use crate::logger::{status_detach, status_error, status_success, status_warning};
use crate::{debug, log};
use debouncer::{ChangeKind, Debouncer};

/// Entry point of the `watch` command. Returns on Ctrl+C.
pub async fn run_watch(config: &InlineConfig) -> Result<()> {
    let backend = Arc::new(config.create_backend());

    let (notify_tx, notify_rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = notify_tx.send(res);
    })
    .context("Failed to create file watcher")?;
    let mut roots = WatchRoots::new(&config.build.root);
    roots.attach(&mut watcher, &config.build.root, RecursiveMode::Recursive)?;
    for input in &config.build.inputs {
        roots.attach_parent(&mut watcher, input)?;
    }

    let mut graph = WatchGraph::new(&config.build.inputs);
    for input in &config.build.inputs {
        rebuild(config, &backend, input, &mut graph, &mut roots, &mut watcher).await;
        status_detach();
    }
    log!("watch"; "watching for changes, press Ctrl+C to stop");

    // notify delivers on its own thread; forward into the async loop
    let (async_tx, mut async_rx) = tokio::sync::mpsc::channel::<notify::Event>(64);
    std::thread::spawn(move || {
        while let Ok(result) = notify_rx.recv() {
            match result {
                Ok(event) => {
                    if async_tx.blocking_send(event).is_err() {
                        break;
                    }
                }
                Err(e) => log!("watch"; "notify error: {}", e),
            }
        }
    });

    set_watching(true);
    let mut debouncer = Debouncer::new();
    loop {
        tokio::select! {
            biased;
            () = shutdown_requested() => break,
            Some(event) = async_rx.recv() => debouncer.add_event(&event),
            () = tokio::time::sleep(debouncer.sleep_duration()) => {
                let Some(mut changes) = debouncer.take_if_ready() else {
                    continue;
                };
                // our own writes
                changes.retain(|path, _| !path.starts_with(&config.build.output));
                for input in graph.affected(&changes) {
                    rebuild(config, &backend, &input, &mut graph, &mut roots, &mut watcher).await;
                }
            }
        }
    }
    set_watching(false);
    Ok(())
}

/// Rebuild one input and refresh what is watched for it.
async fn rebuild<B: NestedBuild>(
    config: &InlineConfig,
    backend: &Arc<B>,
    input: &Path,
    graph: &mut WatchGraph,
    roots: &mut WatchRoots,
    watcher: &mut RecommendedWatcher,
) {
    let label = config.project_relative(input).display().to_string();
    match inline_file(config, Arc::clone(backend), input).await {
        Ok(report) => {
            for dep in &report.dependencies {
                if let Err(e) = roots.attach_parent(watcher, dep) {
                    debug!("watch"; "cannot watch {}: {:#}", dep.display(), e);
                }
            }
            show_report(&label, &report);
            graph.update(report);
        }
        Err(e) => {
            // keep the previous dependencies: they are still worth watching
            graph.mark_failed(input);
            status_error(&format!("failed: {label}"), &format!("{e:#}"));
        }
    }
}

fn show_report(label: &str, report: &InputReport) {
    if report.warnings.is_empty() {
        status_success(&format!("rebuilt: {label}"));
    } else {
        status_warning(&format!("rebuilt: {label}\n{}", report.warnings.join("\n")));
    }
}

// ============================================================================
// WatchGraph
// ============================================================================

/// Which input documents a changed file affects.
#[derive(Debug, Default)]
struct WatchGraph {
    /// Inputs in configured order.
    inputs: Vec<PathBuf>,
    /// Registered dependencies per input.
    dependencies: FxHashMap<PathBuf, Vec<PathBuf>>,
    /// Inputs whose last run referenced a missing file; a newly created file
    /// may fix them.
    missing: FxHashSet<PathBuf>,
    /// Inputs whose last run failed. The failing file is unknown, so any
    /// change retries them.
    failed: FxHashSet<PathBuf>,
}

impl WatchGraph {
    fn new(inputs: &[PathBuf]) -> Self {
        Self {
            inputs: inputs.to_vec(),
            ..Self::default()
        }
    }

    fn update(&mut self, report: InputReport) {
        self.failed.remove(&report.input);
        if report.warnings.is_empty() {
            self.missing.remove(&report.input);
        } else {
            self.missing.insert(report.input.clone());
        }
        self.dependencies.insert(report.input, report.dependencies);
    }

    fn mark_failed(&mut self, input: &Path) {
        self.failed.insert(input.to_path_buf());
    }

    /// Inputs to rebuild for `changes`, in configured order.
    fn affected(&self, changes: &FxHashMap<PathBuf, ChangeKind>) -> Vec<PathBuf> {
        let created = changes.values().any(|kind| *kind == ChangeKind::Created);
        self.inputs
            .iter()
            .filter(|input| {
                changes.contains_key(*input)
                    || self.failed.contains(*input)
                    || (created && self.missing.contains(*input))
                    || self
                        .dependencies
                        .get(*input)
                        .is_some_and(|deps| deps.iter().any(|dep| changes.contains_key(dep)))
            })
            .cloned()
            .collect()
    }
}

// ============================================================================
// WatchRoots
// ============================================================================

/// Directories handed to the watcher, so each is attached only once.
struct WatchRoots {
    recursive_root: PathBuf,
    attached: FxHashSet<PathBuf>,
}

impl WatchRoots {
    fn new(root: &Path) -> Self {
        Self {
            recursive_root: root.to_path_buf(),
            attached: FxHashSet::default(),
        }
    }

    fn attach(
        &mut self,
        watcher: &mut RecommendedWatcher,
        dir: &Path,
        mode: RecursiveMode,
    ) -> Result<()> {
        if !self.attached.insert(dir.to_path_buf()) {
            return Ok(());
        }
        watcher
            .watch(dir, mode)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
        debug!("watch"; "watching {}", dir.display());
        Ok(())
    }

    /// Watch the directory of `file` unless the recursive root covers it.
    fn attach_parent(&mut self, watcher: &mut RecommendedWatcher, file: &Path) -> Result<()> {
        if file.starts_with(&self.recursive_root) {
            return Ok(());
        }
        match file.parent() {
            Some(dir) => self.attach(watcher, dir, RecursiveMode::NonRecursive),
            None => Ok(()),
        }
    }
}
