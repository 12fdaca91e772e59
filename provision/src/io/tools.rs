//! Executable lookup on the search path.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// Answers "is this executable available?".
pub trait ToolProbe {
    /// Full path of `name` if it resolves on the search path.
    fn find(&self, name: &str) -> Option<PathBuf>;

    fn exists(&self, name: &str) -> bool {
        self.find(name).is_some()
    }
}

/// Probe backed by `which`, searching `$PATH` plus extra directories.
///
/// Extra directories come first, so a freshly installed Miniconda or Homebrew
/// is found even before the shell profile is re-sourced.
#[derive(Debug, Clone)]
pub struct PathProbe {
    search_path: OsString,
    cwd: PathBuf,
}

impl PathProbe {
    pub fn new(extra_dirs: &[PathBuf]) -> Result<Self> {
        let inherited = std::env::var_os("PATH").unwrap_or_default();
        let mut dirs: Vec<PathBuf> = extra_dirs.to_vec();
        dirs.extend(std::env::split_paths(&inherited));
        let search_path = std::env::join_paths(dirs).context("join search path")?;
        let cwd = std::env::current_dir().context("resolve current directory")?;
        Ok(Self { search_path, cwd })
    }

    /// Probe restricted to exactly `dirs`.
    pub fn only(dirs: &[PathBuf], cwd: &Path) -> Result<Self> {
        let search_path = std::env::join_paths(dirs).context("join search path")?;
        Ok(Self {
            search_path,
            cwd: cwd.to_path_buf(),
        })
    }
}

impl ToolProbe for PathProbe {
    fn find(&self, name: &str) -> Option<PathBuf> {
        let found = which::which_in(name, Some(&self.search_path), &self.cwd).ok();
        debug!(tool = name, found = ?found, "probe");
        found
    }
}
