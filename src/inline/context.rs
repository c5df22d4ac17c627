//! Host context seen by the loader.

use std::path::Path;

use crate::build::BuildOptions;

/// What the surrounding build supplies to one loader invocation.
///
/// The loader only reads `base_path` and `options`; both `add_dependency` and
/// `emit_warning` may be called from several nested-build tasks at once.
pub trait HostContext: Send + Sync + 'static {
    /// Directory script `src` attributes are resolved against.
    fn base_path(&self) -> &Path;

    /// Module rules and plugins, forwarded verbatim to every nested build.
    fn options(&self) -> &BuildOptions;

    /// Register a file whose change should re-run this loader.
    fn add_dependency(&self, path: &Path);

    /// Report a non-fatal diagnostic.
    fn emit_warning(&self, message: &str);
}
