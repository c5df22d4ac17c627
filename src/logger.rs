//! Logging utilities with colored output.
//!
//! - `log!` macro for terminal output with colored `[module]` prefixes
//! - `debug!` for output only shown with `--verbose`
//! - `WatchStatus` for the single-block status of `tola-inline watch`
//!
//! # Example
//!
//! ```ignore
//! log!("build"; "inlined {} scripts", count);
//! debug!("inline"; "scheduling {}", src);
//! ```

use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType},
};
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::{
    io::{Write, stdout},
    sync::LazyLock,
    sync::atomic::{AtomicBool, Ordering},
};

/// Set from `--verbose`; gates `debug!` and backend stderr.
static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

// ============================================================================
// Log Macros
// ============================================================================

/// `log!("module"; "format {}", args)`
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Log a debug message (only shown when --verbose is enabled)
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

/// Print `[module] message`, clearing whatever the status block left on the line.
pub fn log(module: &str, message: &str) {
    let prefix = format!("[{module}]");
    let prefix = match module.to_ascii_lowercase().as_str() {
        "watch" => prefix.bright_green().bold().to_string(),
        "error" => prefix.bright_red().bold().to_string(),
        "warning" | "warn" => prefix.bright_magenta().bold().to_string(),
        "inline" => prefix.bright_cyan().bold().to_string(),
        _ => prefix.bright_yellow().bold().to_string(),
    };

    let mut stdout = stdout().lock();
    execute!(stdout, Clear(ClearType::UntilNewLine)).ok();
    writeln!(stdout, "{prefix} {message}").ok();
    stdout.flush().ok();
}

// ============================================================================
// Watch Status
// ============================================================================

/// Wall-clock `HH:MM:SS` in UTC.
fn now() -> String {
    use std::time::SystemTime;
    let secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    format!("{:02}:{:02}:{:02}", (secs / 3600) % 24, (secs / 60) % 60, secs % 60)
}

fn line_count(message: &str) -> usize {
    message.lines().count().max(1)
}

/// Outcome shown in front of a status block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Rebuilt,
    Warned,
    Failed,
}

impl Outcome {
    fn symbol(self) -> String {
        match self {
            Self::Rebuilt => "✓".green().to_string(),
            Self::Warned => "⚠".yellow().to_string(),
            Self::Failed => "✗".red().to_string(),
        }
    }
}

/// Rebuild status for `tola-inline watch`.
///
/// A new block replaces the previous one in place, so a long watch session
/// shows only the latest outcome.
#[derive(Debug, Default)]
pub struct WatchStatus {
    /// Height of the block currently on screen.
    last_lines: usize,
}

static WATCH_STATUS: LazyLock<Mutex<WatchStatus>> = LazyLock::new(Mutex::default);

impl WatchStatus {
    fn show(&mut self, outcome: Outcome, message: &str) {
        let mut stdout = stdout().lock();

        if let Ok(lines @ 1..) = u16::try_from(self.last_lines) {
            execute!(stdout, cursor::MoveUp(lines), Clear(ClearType::FromCursorDown)).ok();
        }

        let timestamp = format!("[{}]", now());
        writeln!(stdout, "{} {} {message}", timestamp.dimmed(), outcome.symbol()).ok();
        stdout.flush().ok();

        self.last_lines = line_count(message);
    }

    /// Leave the current block on screen; the next one prints below it.
    pub fn detach(&mut self) {
        self.last_lines = 0;
    }
}

pub fn status_success(message: &str) {
    WATCH_STATUS.lock().show(Outcome::Rebuilt, message);
}

/// `summary` on the first line, `detail` (usually an error chain) below.
pub fn status_error(summary: &str, detail: &str) {
    let message = if detail.is_empty() {
        summary.to_owned()
    } else {
        format!("{summary}\n{detail}")
    };
    WATCH_STATUS.lock().show(Outcome::Failed, &message);
}

pub fn status_warning(message: &str) {
    WATCH_STATUS.lock().show(Outcome::Warned, message);
}

/// Keep the current block; used between the builds of the initial pass.
pub fn status_detach() {
    WATCH_STATUS.lock().detach();
}

// ============================================================================
// Tests
// ============================================================================
