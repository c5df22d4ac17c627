//! Shared utilities.

pub mod exec;
pub mod html;
pub mod path;
