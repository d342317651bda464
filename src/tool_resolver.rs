//! # Tool Path Resolver
//!
//! Resolves the binary named by an optimizer rule to an executable on disk:
//! - a path containing a separator is taken as-is (relative to the working directory)
//! - a bare name is searched in the system `PATH`, with `.exe` appended on Windows

use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolves optimizer binaries at configuration time
#[derive(Debug, Clone)]
pub struct ToolPathResolver {
    search_path: Vec<PathBuf>,
}

impl ToolPathResolver {
    /// Create a resolver over the current process `PATH`
    pub fn new() -> Self {
        let search_path = env::var_os("PATH")
            .map(|paths| env::split_paths(&paths).collect())
            .unwrap_or_default();
        Self { search_path }
    }

    /// Create a resolver over an explicit list of directories
    pub fn with_search_path(search_path: Vec<PathBuf>) -> Self {
        Self { search_path }
    }

    /// Resolve the path to a specific tool
    pub fn resolve_tool(&self, tool: &str) -> Option<PathBuf> {
        let candidate = Path::new(tool);
        if candidate.components().count() > 1 || candidate.is_absolute() {
            let found = is_executable(candidate).then(|| candidate.to_path_buf());
            debug!("Resolving tool path {} -> {:?}", tool, found);
            return found;
        }

        let found = self.find_in_system_path(tool);
        debug!("Resolving tool {} in PATH -> {:?}", tool, found);
        found
    }

    /// Check if a specific tool is available
    pub fn is_tool_available(&self, tool: &str) -> bool {
        self.resolve_tool(tool).is_some()
    }

    fn find_in_system_path(&self, tool: &str) -> Option<PathBuf> {
        let extension = if cfg!(windows) { ".exe" } else { "" };
        let tool_with_ext = format!("{}{}", tool, extension);

        self.search_path
            .iter()
            .map(|dir| dir.join(&tool_with_ext))
            .find(|path| is_executable(path))
    }
}

impl Default for ToolPathResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
