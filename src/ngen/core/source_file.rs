use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::build_settings;
use crate::core::interning::Atom;
use crate::core::source_dir::SourceDir;
use crate::util::paths::normalize_logical;

/// Classification of a source file by extension. Comparisons are
/// case-sensitive and only the trailing-dot extension is consulted; there are
/// no content heuristics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileType {
    Unknown = 0,
    Asm,
    C,
    Cpp,
    H,
    M,
    Mm,
    ModuleMap,
    S,
    Rc,
    /// Object files can be inputs too. Also counts `.obj`.
    O,
    Def,
    Rs,
    Go,
    Swift,
    SwiftModule,
}

pub const FILE_TYPE_COUNT: usize = FileType::SwiftModule as usize + 1;

fn file_type_for_extension(ext: &str) -> FileType {
    match ext {
        "asm" => FileType::Asm,
        "c" => FileType::C,
        "cc" | "cpp" | "cxx" => FileType::Cpp,
        "h" | "hh" | "hpp" | "hxx" | "inc" => FileType::H,
        "m" => FileType::M,
        "mm" => FileType::Mm,
        "modulemap" => FileType::ModuleMap,
        "s" | "S" => FileType::S,
        "rc" => FileType::Rc,
        "o" | "obj" => FileType::O,
        "def" => FileType::Def,
        "rs" => FileType::Rs,
        "go" => FileType::Go,
        "swift" => FileType::Swift,
        "swiftmodule" => FileType::SwiftModule,
        _ => FileType::Unknown,
    }
}

/// A file within the source tree. Always begins with a slash, never ends in
/// one. Source-root-relative paths begin with `//`. The `actual` shadow is
/// the alias-remapped form used for filesystem access; the primary value is
/// the user-facing form used for display and identity.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SourceFile {
    value: Atom,
    actual: Atom,
}

impl SourceFile {
    pub fn new(value: &str) -> SourceFile {
        let normalized = normalize_logical(value);
        debug_assert!(
            !normalized.ends_with('/'),
            "SourceFile may not end in a slash: {}",
            value
        );
        let actual = build_settings::remap_source_to_actual(&normalized);
        SourceFile {
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

    pub fn get_type(&self) -> FileType {
        match self.value().rsplit_once('.') {
            Some((base, ext)) if !base.is_empty() => file_type_for_extension(ext),
            _ => FileType::Unknown,
        }
    }

    /// Everything after the last slash.
    pub fn get_name(&self) -> &'static str {
        match self.value().rfind('/') {
            Some(idx) => &self.value()[idx + 1..],
            None => self.value(),
        }
    }

    pub fn get_dir(&self) -> SourceDir {
        match self.value().rfind('/') {
            Some(idx) => SourceDir::new(&self.value()[..idx + 1]),
            None => SourceDir::default(),
        }
    }

    pub fn is_source_absolute(&self) -> bool {
        self.value().starts_with("//")
    }

    pub fn is_system_absolute(&self) -> bool {
        !self.is_source_absolute()
    }

    /// Resolves against the OS source root. System-absolute values resolve to
    /// themselves; source-absolute values use the actual (alias-remapped)
    /// path when `use_actual_path` is set.
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

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceFile({})", self.value())
    }
}

impl PartialOrd for SourceFile {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SourceFile {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

/// Records which source types a target's sources used; consulted when
/// choosing the final-output tool and validating source sets.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct SourceFileTypeSet {
    flags: u32,
}

impl SourceFileTypeSet {
    pub fn set(&mut self, t: FileType) {
        self.flags |= 1 << (t as u32);
    }

    pub fn get(&self, t: FileType) -> bool {
        self.flags & (1 << (t as u32)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.flags == 0
    }

    pub fn c_source_used(&self) -> bool {
        self.get(FileType::C)
            || self.get(FileType::Cpp)
            || self.get(FileType::H)
            || self.get(FileType::M)
            || self.get(FileType::Mm)
            || self.get(FileType::Rc)
            || self.get(FileType::S)
            || self.get(FileType::Asm)
            || self.get(FileType::O)
            || self.get(FileType::Def)
            || self.get(FileType::ModuleMap)
    }

    pub fn rust_source_used(&self) -> bool {
        self.get(FileType::Rs)
    }

    pub fn go_source_used(&self) -> bool {
        self.get(FileType::Go)
    }

    pub fn swift_source_used(&self) -> bool {
        self.get(FileType::Swift)
    }

    pub fn mixed_source_used(&self) -> bool {
        (self.c_source_used() as u8
            + self.rust_source_used() as u8
            + self.go_source_used() as u8
            + self.swift_source_used() as u8)
            > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_from_extension() {
        assert_eq!(SourceFile::new("//foo/bar.cc").get_type(), FileType::Cpp);
        assert_eq!(SourceFile::new("//foo/bar.c").get_type(), FileType::C);
        assert_eq!(SourceFile::new("//foo/bar.rs").get_type(), FileType::Rs);
        assert_eq!(SourceFile::new("//foo/bar.obj").get_type(), FileType::O);
        assert_eq!(SourceFile::new("//foo/bar.R").get_type(), FileType::Unknown);
        // Case-sensitive: .C is not C.
        assert_eq!(SourceFile::new("//foo/bar.C").get_type(), FileType::Unknown);
        assert_eq!(SourceFile::new("//foo/noext").get_type(), FileType::Unknown);
    }

    #[test]
    fn name_and_dir() {
        let f = SourceFile::new("//foo/bar/baz.cc");
        assert_eq!(f.get_name(), "baz.cc");
        assert_eq!(f.get_dir().value(), "//foo/bar/");
    }

    #[test]
    fn construction_normalizes() {
        assert_eq!(SourceFile::new("//foo/../bar.cc").value(), "//bar.cc");
        assert_eq!(SourceFile::new("//foo//x/./y.cc").value(), "//foo/x/y.cc");
    }

    #[test]
    fn type_set_classification() {
        let mut set = SourceFileTypeSet::default();
        assert!(set.is_empty());
        set.set(FileType::Cpp);
        assert!(set.c_source_used());
        assert!(!set.rust_source_used());
        assert!(!set.mixed_source_used());
        set.set(FileType::Rs);
        assert!(set.mixed_source_used());
    }
}
