use crate::core::config::Config;
use crate::core::label::Label;
use crate::core::pool::Pool;
use crate::core::target::Target;
use crate::core::toolchain::Toolchain;
use crate::util::errors::Location;

/// A node in the build graph: the things that can be declared in a build
/// file and referenced by label.
pub enum Item {
    Target(Target),
    Config(Config),
    Toolchain(Toolchain),
    Pool(Pool),
}

impl Item {
    pub fn label(&self) -> &Label {
        match self {
            Item::Target(t) => t.label(),
            Item::Config(c) => c.label(),
            Item::Toolchain(t) => t.label(),
            Item::Pool(p) => p.label(),
        }
    }

    pub fn defined_from(&self) -> Option<&Location> {
        match self {
            Item::Target(t) => t.defined_from(),
            Item::Config(c) => c.defined_from(),
            Item::Toolchain(t) => t.defined_from(),
            Item::Pool(p) => p.defined_from(),
        }
    }

    /// Lowercase noun for messages ("target", "config", ...).
    pub fn kind_str(&self) -> &'static str {
        match self {
            Item::Target(_) => "target",
            Item::Config(_) => "config",
            Item::Toolchain(_) => "toolchain",
            Item::Pool(_) => "pool",
        }
    }

    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Item::Target(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_config(&self) -> Option<&Config> {
        match self {
            Item::Config(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_toolchain(&self) -> Option<&Toolchain> {
        match self {
            Item::Toolchain(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_pool(&self) -> Option<&Pool> {
        match self {
            Item::Pool(p) => Some(p),
            _ => None,
        }
    }

    pub fn testonly(&self) -> bool {
        match self {
            Item::Target(t) => t.testonly,
            Item::Config(c) => c.testonly,
            _ => false,
        }
    }

    pub fn visibility(&self) -> &[crate::core::label_pattern::LabelPattern] {
        match self {
            Item::Target(t) => &t.visibility,
            Item::Config(c) => &c.visibility,
            _ => &[],
        }
    }
}
