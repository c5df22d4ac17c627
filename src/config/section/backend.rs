//! `[backend]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [backend]
//! kind = "command"            # "oxc" (built-in, default) or "command"
//! command = ["esbuild", "$INLINE_ENTRY", "--bundle", "--format=iife"]
//! ```

use serde::{Deserialize, Serialize};

use crate::build::{Backend, CommandBuild, OxcBuild};
use crate::config::{ConfigDiagnostics, FieldPath};

/// Which nested-build backend compiles the scripts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Oxc,
    Command,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,

    /// Program and arguments for `kind = "command"`.
    pub command: Vec<String>,
}

impl BackendConfig {
    pub const KIND: FieldPath = FieldPath::new("backend.kind");
    pub const COMMAND: FieldPath = FieldPath::new("backend.command");

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        match self.kind {
            BackendKind::Command if self.command.first().is_none_or(|p| p.trim().is_empty()) => {
                diag.error_with_hint(
                    Self::COMMAND,
                    "command backend needs a program to run",
                    "set `command = [\"esbuild\", \"$INLINE_ENTRY\", \"--bundle\"]`",
                );
            }
            BackendKind::Oxc if !self.command.is_empty() => {
                diag.warn(Self::COMMAND, "ignored unless `backend.kind = \"command\"`");
            }
            _ => {}
        }
    }

    /// Instantiate the configured backend.
    pub fn create(&self, minify: bool, quiet: bool) -> Backend {
        match self.kind {
            BackendKind::Oxc => Backend::Oxc(OxcBuild::new(minify)),
            BackendKind::Command => Backend::Command(CommandBuild::new(self.command.clone(), quiet)),
        }
    }
}
