use crate::core::label::Label;
use crate::util::errors::Location;

/// A Ninja pool: a named concurrency limit referenced by tools and by
/// action/binary targets.
#[derive(Clone, Debug)]
pub struct Pool {
    label: Label,
    defined_from: Option<Location>,
    depth: i64,
}

impl Pool {
    pub fn new(label: Label, defined_from: Option<Location>, depth: i64) -> Pool {
        Pool {
            label,
            defined_from,
            depth,
        }
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn defined_from(&self) -> Option<&Location> {
        self.defined_from.as_ref()
    }

    pub fn depth(&self) -> i64 {
        self.depth
    }

    /// The name used in emitted Ninja files. `console` is ninja's reserved
    /// built-in pool and passes through unchanged; other pools get their
    /// label flattened (slashes to underscores), prefixed with the toolchain
    /// name when not in the default toolchain.
    pub fn get_ninja_name(&self, default_toolchain: &Label) -> String {
        if self.label.name() == "console" {
            return "console".to_string();
        }
        let mut out = String::new();
        if !self.label.get_toolchain_label().get_with_no_toolchain().is_null()
            && self.label.get_toolchain_label().get_with_no_toolchain()
                != default_toolchain.get_with_no_toolchain()
        {
            out.push_str(self.label.toolchain_name());
            out.push('_');
        }
        for c in self.label.dir().value().chars() {
            out.push(if c == '/' { '_' } else { c });
        }
        out.push_str(self.label.name());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::source_dir::SourceDir;

    #[test]
    fn ninja_names() {
        let tc = Label::new_with_no_toolchain(SourceDir::new("//tc/"), "default");
        let pool = Pool::new(
            Label::new(SourceDir::new("//build/"), "link_pool", SourceDir::new("//tc/"), "default"),
            None,
            4,
        );
        assert_eq!(pool.get_ninja_name(&tc), "__build_link_pool");

        let other = Pool::new(
            Label::new(SourceDir::new("//build/"), "link_pool", SourceDir::new("//tc/"), "arm"),
            None,
            2,
        );
        assert_eq!(other.get_ninja_name(&tc), "arm___build_link_pool");

        let console = Pool::new(
            Label::new(SourceDir::new("//"), "console", SourceDir::new("//tc/"), "default"),
            None,
            1,
        );
        assert_eq!(console.get_ninja_name(&tc), "console");
    }
}
