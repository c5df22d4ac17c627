//! Script inlining.
//!
//! Turns `<script src="/app.js"></script>` into `<script>…compiled…</script>`
//! by running one nested build per script.
//!
//! ```text
//! parse ─► scan scripts (document order)
//!            ├─ file exists  ─► spawn nested build ─┐
//!            └─ file missing ─► emit warning        │
//!                                                   ▼
//!          fail-fast join ─► serialize ─► callback(Ok(html))
//!                 └─ first error ─────────► callback(Err(error))
//! ```
//!
//! | Module     | Purpose                                   |
//! |------------|-------------------------------------------|
//! | `document` | tl-backed document with mutable scripts   |
//! | `context`  | `HostContext` trait                       |
//! | `join`     | non-cancelling fail-fast join             |
//! | `loader`   | `InlineLoader`                            |

mod context;
mod document;
mod join;
mod loader;

pub use context::HostContext;
pub use document::Document;
pub use join::{FailFastJoin, Interrupted};
pub use loader::InlineLoader;

#[cfg(test)]
pub use context::testing;

use thiserror::Error;

use crate::build::BuildError;

/// Why an inlining run produced no document.
#[derive(Debug, Error)]
pub enum InlineError {
    #[error("failed to parse HTML: {0}")]
    Parse(String),

    /// A nested build failed; shown exactly as the backend reported it.
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("a nested build task stopped before reporting a result")]
    Interrupted,
}

impl From<Interrupted> for InlineError {
    fn from(_: Interrupted) -> Self {
        Self::Interrupted
    }
}
