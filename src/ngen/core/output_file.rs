use std::fmt;

use crate::core::build_settings::BuildSettings;
use crate::core::interning::Atom;
use crate::core::source_file::SourceFile;
use crate::util::paths::normalize_logical;

/// A path relative to the build output directory. Typically never begins
/// with a slash.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OutputFile {
    value: Atom,
}

impl OutputFile {
    pub fn new(value: &str) -> OutputFile {
        OutputFile {
            value: Atom::new(value),
        }
    }

    /// Converts a source file inside the build directory to its
    /// build-dir-relative form. Files outside the build directory keep their
    /// absolute form (callers check containment first where it matters).
    pub fn from_source_file(build_settings: &BuildSettings, file: SourceFile) -> OutputFile {
        let build_dir = build_settings.build_dir().value();
        match file.value().strip_prefix(build_dir) {
            Some(rest) => OutputFile::new(rest),
            None => OutputFile::new(file.value()),
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

    /// Re-interns with `.` and duplicate-slash components folded. Tool output
    /// patterns often expand to values like `./foo`, which must compare equal
    /// to `foo`.
    pub fn normalized(&self) -> OutputFile {
        OutputFile::new(&normalize_logical(self.value()))
    }

    pub fn as_source_file(&self, build_settings: &BuildSettings) -> SourceFile {
        SourceFile::new(&format!(
            "{}{}",
            build_settings.build_dir().value(),
            self.value()
        ))
    }
}

impl fmt::Display for OutputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

impl fmt::Debug for OutputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputFile({})", self.value())
    }
}

impl PartialOrd for OutputFile {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OutputFile {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}
