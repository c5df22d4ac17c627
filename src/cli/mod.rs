//! Command-line interface module.
//!
//! | Module    | Purpose                                        |
//! |-----------|------------------------------------------------|
//! | `args`    | clap definitions                               |
//! | `context` | `CliContext`, the host context of one document |
//! | `build`   | `tola-inline build`                            |
//! | `watch`   | `tola-inline watch`                            |

mod args;
pub mod build;
pub mod context;
pub mod watch;

pub use args::{BuildArgs, Cli, Commands};
