use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::build_settings;
use crate::core::interning::Atom;
use crate::core::source_file::SourceFile;
use crate::util::errors::{ErrorKind, GenError, Location, NgenResult};
use crate::util::paths::normalize_logical;

/// A directory within the source tree. Always ends in a slash. Carries the
/// alias-remapped actual path like `SourceFile`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SourceDir {
    value: Atom,
    actual: Atom,
}

fn with_trailing_slash(s: &str) -> String {
    let mut normalized = normalize_logical(s);
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

impl SourceDir {
    pub fn new(value: &str) -> SourceDir {
        let normalized = with_trailing_slash(value);
        let actual = build_settings::remap_source_to_actual(&normalized);
        SourceDir {
            value: Atom::new(&normalized),
            actual: Atom::new(&actual),
        }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_empty()
    }

    pub fn value(&self) -> &'static str {
        self.value.as_str()
    }

    pub fn value_atom(&self) -> Atom {
        self.value
    }

    pub fn actual_path(&self) -> &'static str {
        self.actual.as_str()
    }

    pub fn is_source_absolute(&self) -> bool {
        self.value().starts_with("//")
    }

    /// The last path component, without slashes (`"bar"` for `//foo/bar/`).
    /// Empty for the source root.
    pub fn last_dir_component(&self) -> &'static str {
        let v = self.value().trim_end_matches('/');
        match v.rfind('/') {
            Some(idx) => &v[idx + 1..],
            None => v,
        }
    }

    /// Resolves a user-supplied path against this directory, producing a
    /// file. `""` and anything ending in a slash are rejected.
    pub fn resolve_relative_file(
        &self,
        input: &str,
        blame: Option<Location>,
    ) -> NgenResult<SourceFile> {
        if input.is_empty() {
            return Err(GenError::new(ErrorKind::InvalidPath, "empty file path")
                .with_help("You can't use empty strings as file paths.")
                .at(blame)
                .into());
        }
        if input.ends_with('/') {
            return Err(GenError::new(
                ErrorKind::InvalidPath,
                format!("file path ends in a slash: {}", input),
            )
            .with_help("A trailing slash indicates a directory, but a file is expected here.")
            .at(blame)
            .into());
        }
        Ok(SourceFile::new(&self.resolve_relative(input)))
    }

    /// Resolves a user-supplied path against this directory, producing a
    /// directory.
    pub fn resolve_relative_dir(
        &self,
        input: &str,
        blame: Option<Location>,
    ) -> NgenResult<SourceDir> {
        if input.is_empty() {
            return Err(GenError::new(ErrorKind::InvalidPath, "empty directory path")
                .with_help("You can't use empty strings as directories.")
                .at(blame)
                .into());
        }
        Ok(SourceDir::new(&with_trailing_slash(&self.resolve_relative(input))))
    }

    fn resolve_relative(&self, input: &str) -> String {
        if input.starts_with("//") || input.starts_with('/') || has_drive_prefix(input) {
            input.to_string()
        } else {
            format!("{}{}", self.value(), input)
        }
    }

    /// Resolves against the OS source root.
    pub fn resolve(&self, source_root: &Path, use_actual_path: bool) -> PathBuf {
        let value = if use_actual_path {
            self.actual_path()
        } else {
            self.value()
        };
        if let Some(rest) = value.strip_prefix("//") {
            source_root.join(rest)
        } else {
            PathBuf::from(value)
        }
    }
}

fn has_drive_prefix(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() > 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
}

impl fmt::Display for SourceDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

impl fmt::Debug for SourceDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceDir({})", self.value())
    }
}

impl PartialOrd for SourceDir {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SourceDir {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_enforced() {
        assert_eq!(SourceDir::new("//foo").value(), "//foo/");
        assert_eq!(SourceDir::new("//foo/").value(), "//foo/");
        assert_eq!(SourceDir::new("//").value(), "//");
    }

    #[test]
    fn resolve_relative_files() {
        let dir = SourceDir::new("//base/");
        assert_eq!(
            dir.resolve_relative_file("foo.cc", None).unwrap().value(),
            "//base/foo.cc"
        );
        assert_eq!(
            dir.resolve_relative_file("../other/x.cc", None).unwrap().value(),
            "//other/x.cc"
        );
        assert_eq!(
            dir.resolve_relative_file("//abs/y.cc", None).unwrap().value(),
            "//abs/y.cc"
        );
        assert!(dir.resolve_relative_file("", None).is_err());
        assert!(dir.resolve_relative_file("dir/", None).is_err());
    }

    #[test]
    fn last_component() {
        assert_eq!(SourceDir::new("//foo/bar/").last_dir_component(), "bar");
        assert_eq!(SourceDir::new("//").last_dir_component(), "");
    }
}
