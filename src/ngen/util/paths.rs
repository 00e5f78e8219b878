use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use anyhow::Context as _;

use crate::util::errors::NgenResult;

/// Normalizes a logical slash-separated path in place: collapses duplicate
/// slashes, folds `.` components, and resolves `..` against earlier
/// components. A leading `//` (source-absolute marker) is preserved, as is a
/// single leading `/`. `..` components that would escape the root are
/// dropped for absolute paths and preserved for relative ones.
pub fn normalize_logical(path: &str) -> String {
    let (prefix, rest) = if let Some(rest) = path.strip_prefix("//") {
        ("//", rest)
    } else if let Some(rest) = path.strip_prefix('/') {
        ("/", rest)
    } else {
        ("", path)
    };

    let trailing_slash = rest.ends_with('/');
    let mut components: Vec<&str> = Vec::new();
    for component in rest.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if let Some(last) = components.last() {
                    if *last != ".." {
                        components.pop();
                        continue;
                    }
                }
                if prefix.is_empty() {
                    components.push("..");
                }
            }
            c => components.push(c),
        }
    }

    let mut result = String::with_capacity(path.len());
    result.push_str(prefix);
    result.push_str(&components.join("/"));
    if trailing_slash && !result.ends_with('/') {
        result.push('/');
    }
    result
}

/// Rebases a source-absolute path against a source-absolute directory,
/// producing a relative path (`../../foo/bar.cc` style). Both inputs must
/// begin with `//`; `dir` must end with `/`.
pub fn rebase_source_absolute(path: &str, dir: &str) -> String {
    debug_assert!(path.starts_with("//"), "not source-absolute: {}", path);
    debug_assert!(dir.starts_with("//") && dir.ends_with('/'), "bad dir: {}", dir);

    let path = &path[2..];
    let dir = &dir[2..];

    // Find the shared component prefix.
    let mut path_it = path.split('/').peekable();
    let mut dir_components: Vec<&str> = dir.split('/').filter(|c| !c.is_empty()).collect();
    let mut shared = 0;
    for c in &dir_components {
        if path_it.peek() == Some(c) {
            path_it.next();
            shared += 1;
        } else {
            break;
        }
    }
    dir_components.drain(..shared);

    let mut result = String::new();
    for _ in &dir_components {
        result.push_str("../");
    }
    let remainder: Vec<&str> = path_it.collect();
    result.push_str(&remainder.join("/"));
    if result.is_empty() {
        result.push('.');
    }
    result
}

/// Lexically folds `.` and `..` components of an OS path. ngen deals in
/// paths that may not exist yet (the build directory on a first run), so
/// filesystem canonicalization is not an option; the fold mirrors what
/// `normalize_logical` does for source-form paths. A `..` that would climb
/// past the root (or prefix) of an absolute path is dropped; leading `..`
/// components of a relative path are preserved.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut stack: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match stack.last() {
                Some(Component::Normal(_)) => {
                    stack.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => stack.push(component),
            },
            other => stack.push(other),
        }
    }
    stack.iter().map(|c| c.as_os_str()).collect()
}

/// Writes `contents` to `path` via a temp file in the same directory followed
/// by a rename, but only when the on-disk contents differ. Returns whether
/// the file was (re)written.
pub fn write_atomically_if_changed(path: &Path, contents: &str) -> NgenResult<bool> {
    if let Ok(existing) = fs::read(path) {
        if existing == contents.as_bytes() {
            return Ok(false);
        }
    }
    write_atomically(path, contents)?;
    Ok(true)
}

/// Unconditional atomic replace (write-temp-then-rename).
pub fn write_atomically(path: &Path, contents: &str) -> NgenResult<()> {
    let dir = path
        .parent()
        .with_context(|| format!("no parent directory for {}", path.display()))?;
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_dots() {
        assert_eq!(normalize_logical("//foo/./bar/../baz.cc"), "//foo/baz.cc");
        assert_eq!(normalize_logical("//foo//bar/"), "//foo/bar/");
        assert_eq!(normalize_logical("//../foo"), "//foo");
        assert_eq!(normalize_logical("../foo/bar"), "../foo/bar");
        assert_eq!(normalize_logical("//"), "//");
    }

    #[test]
    fn normalize_os_paths() {
        assert_eq!(
            normalize_path(Path::new("/root/src/../out/./Debug")),
            PathBuf::from("/root/out/Debug")
        );
        // Climbing past the root is dropped; relative ".." survives.
        assert_eq!(normalize_path(Path::new("/../x")), PathBuf::from("/x"));
        assert_eq!(normalize_path(Path::new("../x/y")), PathBuf::from("../x/y"));
    }

    #[test]
    fn rebase_against_build_dir() {
        assert_eq!(
            rebase_source_absolute("//foo/bar.cc", "//out/Debug/"),
            "../../foo/bar.cc"
        );
        assert_eq!(rebase_source_absolute("//out/Debug/a.o", "//out/Debug/"), "a.o");
        assert_eq!(rebase_source_absolute("//out/Debug/", "//out/Debug/"), ".");
    }
}
