use std::path::{Path, PathBuf};
use std::sync::Arc;

use relaunch_core::Options;

use crate::error::RuntimeError;

/// Process-wide state captured once at startup and handed to every component
/// at construction time.
#[derive(Debug, Clone)]
pub struct Context {
    options: Arc<Options>,
    cwd: PathBuf,
}

impl Context {
    /// Validate `options` and capture the current working directory.
    pub fn new(options: Options) -> Result<Self, RuntimeError> {
        let cwd = std::env::current_dir().map_err(RuntimeError::WorkingDir)?;
        // Watch roots are canonicalized, so the anchor must be too.
        let cwd = std::fs::canonicalize(&cwd).unwrap_or(cwd);
        Self::with_cwd(options, cwd)
    }

    /// Validate `options` and anchor their path filter at `cwd`.
    pub fn with_cwd(mut options: Options, cwd: impl Into<PathBuf>) -> Result<Self, RuntimeError> {
        options.validate()?;
        let cwd = cwd.into();
        options.filter.anchor(&cwd);
        Ok(Self {
            options: Arc::new(options),
            cwd,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Watch roots resolved against the working directory.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        self.options
            .watch
            .iter()
            .map(|path| self.cwd.join(path))
            .collect()
    }
}
