use std::fmt;

use crate::core::interning::Atom;
use crate::core::source_dir::SourceDir;
use crate::util::errors::{ErrorKind, GenError, Location, NgenResult};

/// A fully-qualified identifier for a build item:
/// `//dir:name(//toolchain_dir:toolchain_name)`. The toolchain parts are
/// null atoms for labels written without an explicit toolchain; the loader
/// fills in the default toolchain when instantiating items.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Label {
    dir: SourceDir,
    name: Atom,
    toolchain_dir: SourceDir,
    toolchain_name: Atom,
}

impl Label {
    pub fn new(dir: SourceDir, name: &str, toolchain_dir: SourceDir, toolchain_name: &str) -> Label {
        Label {
            dir,
            name: Atom::new(name),
            toolchain_dir,
            toolchain_name: Atom::new(toolchain_name),
        }
    }

    pub fn new_with_no_toolchain(dir: SourceDir, name: &str) -> Label {
        Label {
            dir,
            name: Atom::new(name),
            toolchain_dir: SourceDir::default(),
            toolchain_name: Atom::default(),
        }
    }

    /// Parses a label string relative to `current_dir`, qualifying it with
    /// `current_toolchain` when the string names no explicit toolchain.
    pub fn resolve(
        current_dir: &SourceDir,
        current_toolchain: &Label,
        input: &str,
        blame: Option<Location>,
    ) -> NgenResult<Label> {
        let bad = |msg: &str| -> anyhow::Error {
            GenError::new(
                ErrorKind::InvalidPath,
                format!("invalid label \"{}\": {}", input, msg),
            )
            .at(blame.clone())
            .into()
        };

        if input.is_empty() {
            return Err(bad("empty label"));
        }

        // Split off "(//toolchain:name)".
        let (main, toolchain_str) = match input.find('(') {
            Some(open) => {
                if !input.ends_with(')') {
                    return Err(bad("unterminated toolchain qualifier"));
                }
                (&input[..open], Some(&input[open + 1..input.len() - 1]))
            }
            None => (input, None),
        };
        if main.is_empty() {
            return Err(bad("missing label before toolchain qualifier"));
        }

        let (dir_part, name_part) = match main.rfind(':') {
            Some(colon) => (&main[..colon], Some(&main[colon + 1..])),
            None => (main, None),
        };

        let dir = if dir_part.is_empty() {
            *current_dir
        } else {
            current_dir.resolve_relative_dir(dir_part, blame.clone())?
        };

        let name = match name_part {
            Some(name) => {
                if name.is_empty() {
                    return Err(bad("empty name part"));
                }
                if name.contains('/') {
                    return Err(bad("names may not contain slashes"));
                }
                name.to_string()
            }
            None => {
                // "//foo/bar" means "//foo/bar:bar".
                let name = dir.last_dir_component();
                if name.is_empty() {
                    return Err(bad("the source root has no implicit name"));
                }
                name.to_string()
            }
        };

        let (toolchain_dir, toolchain_name) = match toolchain_str {
            Some(tc) => {
                let tc_label = Label::resolve(current_dir, &Label::default(), tc, blame.clone())?;
                if tc_label.has_toolchain() {
                    return Err(bad("toolchain qualifiers may not nest"));
                }
                (tc_label.dir, tc_label.name)
            }
            None => (current_toolchain.dir, current_toolchain.name),
        };

        Ok(Label {
            dir,
            name: Atom::new(&name),
            toolchain_dir,
            toolchain_name,
        })
    }

    pub fn is_null(&self) -> bool {
        self.name.is_empty()
    }

    pub fn dir(&self) -> &SourceDir {
        &self.dir
    }

    pub fn name(&self) -> &'static str {
        self.name.as_str()
    }

    pub fn name_atom(&self) -> Atom {
        self.name
    }

    pub fn toolchain_dir(&self) -> &SourceDir {
        &self.toolchain_dir
    }

    pub fn toolchain_name(&self) -> &'static str {
        self.toolchain_name.as_str()
    }

    pub fn has_toolchain(&self) -> bool {
        !self.toolchain_name.is_empty()
    }

    /// The toolchain as its own (toolchain-less) label.
    pub fn get_toolchain_label(&self) -> Label {
        Label {
            dir: self.toolchain_dir,
            name: self.toolchain_name,
            toolchain_dir: SourceDir::default(),
            toolchain_name: Atom::default(),
        }
    }

    pub fn get_with_no_toolchain(&self) -> Label {
        Label {
            dir: self.dir,
            name: self.name,
            toolchain_dir: SourceDir::default(),
            toolchain_name: Atom::default(),
        }
    }

    pub fn with_toolchain(&self, toolchain: &Label) -> Label {
        Label {
            dir: self.dir,
            name: self.name,
            toolchain_dir: toolchain.dir,
            toolchain_name: toolchain.name,
        }
    }

    /// `//dir:name`, with the toolchain appended when requested and present.
    pub fn get_user_visible_name(&self, include_toolchain: bool) -> String {
        let mut out = String::new();
        out.push_str(self.dir.value());
        if out.ends_with('/') && out.len() > 2 {
            out.pop();
        }
        out.push(':');
        out.push_str(self.name());
        if include_toolchain && self.has_toolchain() {
            out.push('(');
            out.push_str(&self.get_toolchain_label().get_user_visible_name(false));
            out.push(')');
        }
        out
    }

    /// The form diagnostics use: `//dir:name`, with the toolchain appended
    /// only when it differs from the ambient default toolchain (a matching
    /// suffix carries no information for the reader).
    pub fn get_user_visible_name_with_default(&self, default_toolchain: &Label) -> String {
        self.get_user_visible_name(!self.toolchain_is(default_toolchain))
    }

    /// Whether the toolchain part matches the given (toolchain-less)
    /// toolchain label; used to elide it from display.
    pub fn toolchain_is(&self, toolchain: &Label) -> bool {
        self.toolchain_dir == toolchain.dir && self.toolchain_name == toolchain.name
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.get_user_visible_name(true))
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Label({})", self)
    }
}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.dir, self.name, self.toolchain_dir, self.toolchain_name).cmp(&(
            other.dir,
            other.name,
            other.toolchain_dir,
            other.toolchain_name,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current_dir() -> SourceDir {
        SourceDir::new("//base/")
    }

    fn default_tc() -> Label {
        Label::new_with_no_toolchain(SourceDir::new("//tc/"), "default")
    }

    fn resolve(s: &str) -> Label {
        Label::resolve(&current_dir(), &default_tc(), s, None).unwrap()
    }

    #[test]
    fn absolute_forms() {
        let l = resolve("//foo/bar:baz");
        assert_eq!(l.dir().value(), "//foo/bar/");
        assert_eq!(l.name(), "baz");
        assert_eq!(l.get_user_visible_name(false), "//foo/bar:baz");
        assert!(l.toolchain_is(&default_tc()));

        let implicit = resolve("//foo/bar");
        assert_eq!(implicit.name(), "bar");
        assert_eq!(implicit.get_user_visible_name(false), "//foo/bar:bar");
    }

    #[test]
    fn relative_forms() {
        assert_eq!(resolve(":local").get_user_visible_name(false), "//base:local");
        assert_eq!(resolve("sub:x").get_user_visible_name(false), "//base/sub:x");
        assert_eq!(resolve("sub").get_user_visible_name(false), "//base/sub:sub");
    }

    #[test]
    fn default_toolchain_is_elided() {
        let in_default = resolve("//foo:bar");
        assert_eq!(
            in_default.get_user_visible_name_with_default(&default_tc()),
            "//foo:bar"
        );

        let in_other = resolve("//foo:bar(//tc:other)");
        assert_eq!(
            in_other.get_user_visible_name_with_default(&default_tc()),
            "//foo:bar(//tc:other)"
        );
    }

    #[test]
    fn explicit_toolchain() {
        let l = resolve("//foo:bar(//tc:other)");
        assert_eq!(l.toolchain_dir().value(), "//tc/");
        assert_eq!(l.toolchain_name(), "other");
        assert_eq!(
            l.get_user_visible_name(true),
            "//foo:bar(//tc:other)"
        );
        assert_eq!(l.get_toolchain_label().get_user_visible_name(false), "//tc:other");
    }

    #[test]
    fn root_dir_label() {
        let l = resolve("//:root");
        assert_eq!(l.dir().value(), "//");
        assert_eq!(l.get_user_visible_name(false), "//:root");
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", ":", "//foo:", "//foo:a/b", "//foo:x(//tc:a(//t:b))"] {
            assert!(
                Label::resolve(&current_dir(), &default_tc(), bad, None).is_err(),
                "expected failure for {:?}",
                bad
            );
        }
    }
}
