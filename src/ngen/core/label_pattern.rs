use std::fmt;

use crate::core::interning::Atom;
use crate::core::label::Label;
use crate::core::source_dir::SourceDir;
use crate::util::errors::{ErrorKind, GenError, Location, NgenResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatternType {
    /// An exact label match: `//foo:bar`.
    Match,
    /// Any target in the directory: `//foo:*`.
    Directory,
    /// Any target in the directory or any subdirectory: `//foo/*`.
    RecursiveDirectory,
}

/// A pattern for matching labels, used by visibility lists, check filters,
/// root filters, and `assert_no_deps`. Optionally toolchain-qualified; an
/// unqualified pattern matches a label under any toolchain.
#[derive(Clone, PartialEq, Eq)]
pub struct LabelPattern {
    pattern_type: PatternType,
    dir: SourceDir,
    name: Atom,
    toolchain: Option<Label>,
}

impl LabelPattern {
    pub fn new_match(label: Label) -> LabelPattern {
        LabelPattern {
            pattern_type: PatternType::Match,
            dir: *label.dir(),
            name: label.name_atom(),
            toolchain: None,
        }
    }

    /// Parses a pattern string relative to `current_dir`. Accepted forms:
    /// `//foo:bar`, `:bar`, `//foo:*`, `//foo/*`, `*`, each optionally
    /// followed by `(//toolchain:name)`.
    pub fn resolve(
        current_dir: &SourceDir,
        input: &str,
        blame: Option<Location>,
    ) -> NgenResult<LabelPattern> {
        let bad = |msg: &str| -> anyhow::Error {
            GenError::new(
                ErrorKind::InvalidPath,
                format!("invalid label pattern \"{}\": {}", input, msg),
            )
            .at(blame.clone())
            .into()
        };

        if input.is_empty() {
            return Err(bad("empty pattern"));
        }

        let (main, toolchain) = match input.find('(') {
            Some(open) => {
                if !input.ends_with(')') {
                    return Err(bad("unterminated toolchain qualifier"));
                }
                let tc = Label::resolve(
                    current_dir,
                    &Label::default(),
                    &input[open + 1..input.len() - 1],
                    blame.clone(),
                )?;
                (&input[..open], Some(tc))
            }
            None => (input, None),
        };

        // "*" alone matches everything.
        if main == "*" {
            return Ok(LabelPattern {
                pattern_type: PatternType::RecursiveDirectory,
                dir: SourceDir::default(),
                name: Atom::default(),
                toolchain,
            });
        }

        if let Some(dir_part) = main.strip_suffix("/*") {
            let dir = if dir_part.is_empty() {
                return Err(bad("missing directory part"));
            } else {
                current_dir.resolve_relative_dir(dir_part, blame.clone())?
            };
            return Ok(LabelPattern {
                pattern_type: PatternType::RecursiveDirectory,
                dir,
                name: Atom::default(),
                toolchain,
            });
        }

        if let Some(dir_part) = main.strip_suffix(":*") {
            let dir = if dir_part.is_empty() {
                *current_dir
            } else {
                current_dir.resolve_relative_dir(dir_part, blame.clone())?
            };
            return Ok(LabelPattern {
                pattern_type: PatternType::Directory,
                dir,
                name: Atom::default(),
                toolchain,
            });
        }

        // Anything else is an exact label.
        let label = Label::resolve(current_dir, &Label::default(), main, blame)?;
        Ok(LabelPattern {
            pattern_type: PatternType::Match,
            dir: *label.dir(),
            name: label.name_atom(),
            toolchain,
        })
    }

    pub fn pattern_type(&self) -> PatternType {
        self.pattern_type
    }

    pub fn dir(&self) -> &SourceDir {
        &self.dir
    }

    pub fn name(&self) -> &'static str {
        self.name.as_str()
    }

    pub fn toolchain(&self) -> Option<&Label> {
        self.toolchain.as_ref()
    }

    pub fn matches(&self, label: &Label) -> bool {
        if let Some(tc) = &self.toolchain {
            if label.get_toolchain_label().get_with_no_toolchain()
                != tc.get_with_no_toolchain()
            {
                return false;
            }
        }

        match self.pattern_type {
            PatternType::Match => {
                self.name == label.name_atom() && self.dir == *label.dir()
            }
            PatternType::Directory => self.dir == *label.dir(),
            PatternType::RecursiveDirectory => {
                self.dir.is_null() || label.dir().value().starts_with(self.dir.value())
            }
        }
    }

    /// The canonical string form, used in error messages.
    pub fn describe(&self) -> String {
        let mut out = match self.pattern_type {
            PatternType::Match => {
                Label::new_with_no_toolchain(self.dir, self.name()).get_user_visible_name(false)
            }
            PatternType::Directory => {
                let mut d = self.dir.value().trim_end_matches('/').to_string();
                if d.is_empty() {
                    d.push_str("//");
                }
                format!("{}:*", d)
            }
            PatternType::RecursiveDirectory => {
                if self.dir.is_null() {
                    "*".to_string()
                } else {
                    format!("{}*", self.dir.value())
                }
            }
        };
        if let Some(tc) = &self.toolchain {
            out.push('(');
            out.push_str(&tc.get_user_visible_name(false));
            out.push(')');
        }
        out
    }

    /// True if any pattern in the list matches the label.
    pub fn vector_matches(patterns: &[LabelPattern], label: &Label) -> bool {
        patterns.iter().any(|p| p.matches(label))
    }
}

impl fmt::Display for LabelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl fmt::Debug for LabelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LabelPattern({})", self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir() -> SourceDir {
        SourceDir::new("//base/")
    }

    fn pattern(s: &str) -> LabelPattern {
        LabelPattern::resolve(&dir(), s, None).unwrap()
    }

    fn label(s: &str) -> Label {
        Label::resolve(
            &SourceDir::new("//"),
            &Label::new_with_no_toolchain(SourceDir::new("//tc/"), "x"),
            s,
            None,
        )
        .unwrap()
    }

    #[test]
    fn exact_match() {
        let p = pattern("//foo:bar");
        assert_eq!(p.pattern_type(), PatternType::Match);
        assert!(p.matches(&label("//foo:bar")));
        assert!(!p.matches(&label("//foo:baz")));
        assert!(!p.matches(&label("//other:bar")));
        assert_eq!(p.describe(), "//foo:bar");
    }

    #[test]
    fn directory_wildcard() {
        let p = pattern("//foo:*");
        assert!(p.matches(&label("//foo:bar")));
        assert!(p.matches(&label("//foo:baz")));
        assert!(!p.matches(&label("//foo/sub:bar")));
        assert_eq!(p.describe(), "//foo:*");
    }

    #[test]
    fn recursive_wildcard() {
        let p = pattern("//foo/*");
        assert!(p.matches(&label("//foo:bar")));
        assert!(p.matches(&label("//foo/sub:bar")));
        assert!(!p.matches(&label("//foobar:bar")));
        assert_eq!(p.describe(), "//foo/*");

        let all = pattern("*");
        assert!(all.matches(&label("//anything:x")));
        assert_eq!(all.describe(), "*");
    }

    #[test]
    fn toolchain_qualified() {
        let p = pattern("//foo:bar(//tc:x)");
        assert!(p.matches(&label("//foo:bar")));
        let other_tc = label("//foo:bar(//tc:y)");
        assert!(!p.matches(&other_tc));
    }
}
