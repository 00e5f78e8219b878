use std::fmt;

use crate::core::source_file::SourceFile;

pub type NgenResult<T> = anyhow::Result<T>;

/// A position in an input file, kept for error attribution. Items declared
/// programmatically (tests, embedders) have no location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub file: SourceFile,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.value(), self.line, self.column)
    }
}

/// Classification of generation failures. Every error the pipeline produces
/// carries one of these so callers (and tests) can match on failure class
/// without string inspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    UnresolvedReference,
    DepCycle,
    DuplicateItem,
    DuplicateOutput,
    DuplicateToolchain,
    VisibilityViolation,
    TestonlyViolation,
    AssertNoDepsViolation,
    PchConflict,
    InvalidPlaceholder,
    InvalidToolConfiguration,
    InvalidPath,
    Io,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Parse => "parse error",
            ErrorKind::UnresolvedReference => "unresolved reference",
            ErrorKind::DepCycle => "dependency cycle",
            ErrorKind::DuplicateItem => "duplicate item",
            ErrorKind::DuplicateOutput => "duplicate output",
            ErrorKind::DuplicateToolchain => "duplicate toolchain",
            ErrorKind::VisibilityViolation => "visibility violation",
            ErrorKind::TestonlyViolation => "testonly violation",
            ErrorKind::AssertNoDepsViolation => "assert_no_deps violation",
            ErrorKind::PchConflict => "precompiled header conflict",
            ErrorKind::InvalidPlaceholder => "invalid placeholder",
            ErrorKind::InvalidToolConfiguration => "invalid tool configuration",
            ErrorKind::InvalidPath => "invalid path",
            ErrorKind::Io => "I/O failure",
            ErrorKind::Other => "error",
        }
    }
}

/// The pipeline error type: a kind, a one-line message, optional multi-line
/// help, a source location, and sub-errors pointing at collaborating
/// locations (the other target in a collision, the previous declaration of a
/// duplicate, and so on).
#[derive(Clone, Debug)]
pub struct GenError {
    pub kind: ErrorKind,
    pub location: Option<Location>,
    pub message: String,
    pub help: String,
    pub sub_errors: Vec<GenError>,
}

impl GenError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> GenError {
        GenError {
            kind,
            location: None,
            message: message.into(),
            help: String::new(),
            sub_errors: Vec::new(),
        }
    }

    pub fn at(mut self, location: Option<Location>) -> GenError {
        self.location = location;
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> GenError {
        self.help = help.into();
        self
    }

    pub fn with_sub_error(mut self, sub: GenError) -> GenError {
        self.sub_errors.push(sub);
        self
    }
}

impl fmt::Display for GenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(loc) = &self.location {
            write!(f, "{}: ", loc)?;
        }
        write!(f, "{}: {}", self.kind.as_str(), self.message)?;
        if !self.help.is_empty() {
            write!(f, "\n{}", self.help)?;
        }
        for sub in &self.sub_errors {
            write!(f, "\nsee also: {}", sub)?;
        }
        Ok(())
    }
}

impl std::error::Error for GenError {}

// =============================================================================
// CLI errors

pub type CliResult = Result<(), CliError>;

#[derive(Debug)]
pub struct CliError {
    pub error: Option<anyhow::Error>,
    pub exit_code: i32,
}

impl CliError {
    pub fn new(error: anyhow::Error, code: i32) -> CliError {
        CliError {
            error: Some(error),
            exit_code: code,
        }
    }

    pub fn code(code: i32) -> CliError {
        CliError {
            error: None,
            exit_code: code,
        }
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> CliError {
        CliError::new(err, 1)
    }
}

impl From<clap::Error> for CliError {
    fn from(err: clap::Error) -> CliError {
        let code = if err.use_stderr() { 2 } else { 0 };
        CliError::new(err.into(), code)
    }
}
