//! Configuration section definitions.
//!
//! | Module    | TOML Section | Purpose                                |
//! |-----------|--------------|----------------------------------------|
//! | `build`   | `[build]`    | Root, output, input documents, minify  |
//! | `backend` | `[backend]`  | Nested-build backend selection         |
//!
//! `[module]` and `[[plugins]]` deserialize straight into the types
//! forwarded to nested builds (`crate::build::{ModuleOptions, Plugin}`).

mod backend;
mod build;

pub use backend::{BackendConfig, BackendKind};
pub use build::BuildSectionConfig;
