//! External command execution.
//!
//! Builder for running a backend command with captured output. Stdout is
//! returned to the caller untouched; stderr is forwarded to the log line by
//! line unless the command runs quietly, and becomes part of the error when
//! the command fails.
//!
//! ```ignore
//! let stdout = Cmd::from_slice(&["esbuild", "./app.js", "--bundle"])
//!     .cwd(root)
//!     .envs([("NODE_ENV", "production")])
//!     .run()?;
//! ```

use crate::log;
use regex::Regex;
use std::{
    borrow::Cow,
    ffi::{OsStr, OsString},
    io,
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    sync::LazyLock,
};
use thiserror::Error;

/// Why a command produced no usable output.
#[derive(Debug, Error)]
pub enum CmdError {
    #[error("no program given")]
    Empty,

    #[error("failed to execute `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` failed with {status}{}", stderr_suffix(.stderr))]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\n{stderr}")
    }
}

// ============================================================================
// Builder API
// ============================================================================

/// Command builder for one external process.
#[derive(Debug, Default)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
    quiet: bool,
}

impl Cmd {
    /// Create from a command array (`["esbuild", ...]` or `["npx", "esbuild", ...]`).
    pub fn from_slice<S: AsRef<OsStr>>(cmd: &[S]) -> Self {
        let mut iter = cmd.iter().map(|s| s.as_ref().to_owned());
        Self {
            program: iter.next().unwrap_or_default(),
            args: iter.collect(),
            ..Default::default()
        }
    }

    /// Set working directory.
    pub fn cwd<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    /// Add environment variables for the subprocess.
    pub fn envs<K, V, I>(mut self, vars: I) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.envs.extend(
            vars.into_iter()
                .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().to_owned())),
        );
        self
    }

    /// Do not forward stderr of a successful run to the log.
    pub const fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Run to completion and return stdout.
    pub fn run(self) -> Result<Vec<u8>, CmdError> {
        if self.program.is_empty() {
            return Err(CmdError::Empty);
        }
        let program = self.program.to_string_lossy().into_owned();

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null());
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }

        let output = command.output().map_err(|source| CmdError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(CmdError::Failed {
                program,
                status: output.status,
                stderr: strip_ansi(stderr.trim()).into_owned(),
            });
        }

        if !self.quiet {
            forward_stderr(&program, &stderr);
        }
        Ok(output.stdout)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Log the non-empty stderr lines of a successful run under `[program]`.
fn forward_stderr(program: &str, stderr: &str) {
    let lines: Vec<_> = stderr
        .lines()
        .map(strip_ansi)
        .filter(|line| !line.trim().is_empty())
        .collect();
    if !lines.is_empty() {
        log!(program; "{}", lines.join("\n"));
    }
}

/// Strip ANSI escape codes from string.
fn strip_ansi(s: &str) -> Cow<'_, str> {
    static RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("valid ANSI regex"));
    RE.replace_all(s, "")
}

// ============================================================================
// Tests
// ============================================================================
