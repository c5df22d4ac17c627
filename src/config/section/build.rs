//! `[build]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [build]
//! root = "."                  # Directory script `src` is resolved against
//! output = "dist"             # Output directory
//! inputs = ["index.html"]     # HTML documents to process
//! minify = false              # Built-in backend: minify every script
//! ```
//!
//! Relative paths are resolved against the directory of `tola-inline.toml`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSectionConfig {
    pub root: PathBuf,
    pub output: PathBuf,
    pub inputs: Vec<PathBuf>,
    pub minify: bool,
}

impl BuildSectionConfig {
    pub const ROOT: FieldPath = FieldPath::new("build.root");
    pub const OUTPUT: FieldPath = FieldPath::new("build.output");
    pub const INPUTS: FieldPath = FieldPath::new("build.inputs");

    /// Validate normalized (absolute) paths.
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if !self.root.is_dir() {
            diag.error(
                Self::ROOT,
                format!("`{}` is not a directory", self.root.display()),
            );
        }

        if self.inputs.is_empty() {
            diag.error_with_hint(
                Self::INPUTS,
                "no input documents",
                "pass them on the command line or set `inputs = [\"index.html\"]`",
            );
        }

        for (i, input) in self.inputs.iter().enumerate() {
            if !input.is_file() {
                diag.error(
                    Self::INPUTS.index(i),
                    format!("`{}` does not exist", input.display()),
                );
            } else if *input == self.output_for(input, self.inputs.len()) {
                diag.error_with_hint(
                    Self::OUTPUT,
                    format!("output would overwrite `{}`", input.display()),
                    "choose a different output directory",
                );
            }
        }
    }

    /// Where the inlined version of `input` is written.
    ///
    /// A single input with an `.html`/`.htm` output writes that file directly;
    /// otherwise the input's path below `root` (or its file name) is kept
    /// under the output directory.
    pub fn output_for(&self, input: &std::path::Path, input_count: usize) -> PathBuf {
        let is_file_target = self
            .output
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"));
        if input_count == 1 && is_file_target {
            return self.output.clone();
        }

        let relative = input
            .strip_prefix(&self.root)
            .ok()
            .map(PathBuf::from)
            .or_else(|| input.file_name().map(PathBuf::from))
            .unwrap_or_else(|| input.to_path_buf());
        self.output.join(relative)
    }
}

impl Default for BuildSectionConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            output: PathBuf::from("dist"),
            inputs: Vec::new(),
            minify: false,
        }
    }
}
