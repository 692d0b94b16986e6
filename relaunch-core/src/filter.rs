//! Decides whether a changed path is relevant enough to restart the command.

use std::path::{Component, Path, PathBuf};

/// Allow/deny rules applied to every changed path.
///
/// A filter is anchored at a base directory, normally the working directory.
/// Relative ignore entries resolve against it, and hidden components are
/// only looked for below it. [`PathFilter::relative`] builds an unanchored
/// filter; [`PathFilter::anchor`] fixes the base later.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathFilter {
    extensions: Vec<String>,
    ignored: Vec<PathBuf>,
    base: PathBuf,
}

impl PathFilter {
    /// Filter anchored at `cwd`.
    pub fn new<E, I>(extensions: E, ignored: I, cwd: &Path) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        I: IntoIterator,
        I::Item: AsRef<Path>,
    {
        let mut filter = Self::relative(extensions, ignored);
        filter.anchor(cwd);
        filter
    }

    /// Filter whose relative ignore entries are kept as given until
    /// [`PathFilter::anchor`] is called.
    pub fn relative<E, I>(extensions: E, ignored: I) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        I: IntoIterator,
        I::Item: AsRef<Path>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        let ignored = ignored
            .into_iter()
            .map(|path| path.as_ref().to_path_buf())
            .collect();
        Self {
            extensions,
            ignored,
            base: PathBuf::new(),
        }
    }

    /// Resolve relative ignore entries against `cwd` and make it the base.
    /// Absolute entries are only normalized, so anchoring twice is harmless.
    pub fn anchor(&mut self, cwd: &Path) {
        for path in &mut self.ignored {
            *path = normalize(&cwd.join(&*path));
        }
        self.base = normalize(cwd);
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn ignored(&self) -> &[PathBuf] {
        &self.ignored
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// `true` when a change at `path` should count as a restart trigger.
    pub fn allows(&self, path: &Path) -> bool {
        let path = normalize(path);
        if self.is_hidden(&path) {
            return false;
        }

        if self.ignored.iter().any(|prefix| path.starts_with(prefix)) {
            return false;
        }

        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    // Editor swap files, VCS internals and tool caches: any dot-component
    // below the base. Outside the base only the file name is checked.
    fn is_hidden(&self, path: &Path) -> bool {
        let below = match path.strip_prefix(&self.base) {
            Ok(rel) => rel,
            Err(_) => path.file_name().map(Path::new).unwrap_or(path),
        };
        below.components().any(|component| match component {
            Component::Normal(name) => name.to_string_lossy().starts_with('.'),
            _ => false,
        })
    }
}

/// Lexically drop `.` and resolve `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_normalized() {
        let filter = PathFilter::new([".RS", " toml ", ""], Vec::<&str>::new(), Path::new("/w"));
        assert_eq!(filter.extensions(), ["rs", "toml"]);
    }

    #[test]
    fn ignored_paths_resolve_against_cwd() {
        let filter = PathFilter::new(Vec::<&str>::new(), ["./target", "../other"], Path::new("/w/proj"));
        assert_eq!(
            filter.ignored(),
            [PathBuf::from("/w/proj/target"), PathBuf::from("/w/other")]
        );
    }

    #[test]
    fn anchoring_resolves_relative_entries_once() {
        let mut filter = PathFilter::relative(Vec::<&str>::new(), ["target", "/abs/out"]);
        assert_eq!(filter.ignored(), [PathBuf::from("target"), PathBuf::from("/abs/out")]);
        filter.anchor(Path::new("/w"));
        filter.anchor(Path::new("/elsewhere"));
        assert_eq!(
            filter.ignored(),
            [PathBuf::from("/w/target"), PathBuf::from("/abs/out")]
        );
        assert_eq!(filter.base(), Path::new("/elsewhere"));
    }

    #[test]
    fn hidden_base_does_not_hide_its_contents() {
        let filter = PathFilter::new(Vec::<&str>::new(), Vec::<&str>::new(), Path::new("/tmp/.tmpAbc"));
        assert!(filter.allows(Path::new("/tmp/.tmpAbc/src/main.rs")));
        assert!(!filter.allows(Path::new("/tmp/.tmpAbc/.git/HEAD")));
    }

    #[test]
    fn normalize_collapses_dots() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
    }
}
