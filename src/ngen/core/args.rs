use std::collections::BTreeSet;
use std::sync::Mutex;

use crate::frontend::value::{Value, ValueMap};

/// Build arguments: dotfile `default_args`, the persisted/`--args` overrides,
/// and which of the overrides were actually consulted during generation.
/// Declared-args tracking is interior-mutable because lookups happen from
/// worker threads during file execution.
#[derive(Default, Debug)]
pub struct Args {
    inner: Mutex<Inner>,
}

#[derive(Default, Debug)]
struct Inner {
    defaults: ValueMap,
    overrides: ValueMap,
    used: BTreeSet<String>,
}

impl Args {
    pub fn set_default_args(&self, defaults: ValueMap) {
        self.inner.lock().unwrap().defaults = defaults;
    }

    pub fn add_overrides(&self, overrides: ValueMap) {
        self.inner.lock().unwrap().overrides.extend(overrides);
    }

    pub fn overrides(&self) -> ValueMap {
        self.inner.lock().unwrap().overrides.clone()
    }

    /// The scope seeded into a toolchain's build-config execution: defaults,
    /// then command-line overrides, then (for non-default toolchains) the
    /// toolchain's own arg overrides on top.
    pub fn merged_for_toolchain(&self, toolchain_args: Option<&ValueMap>) -> ValueMap {
        let inner = self.inner.lock().unwrap();
        let mut merged = inner.defaults.clone();
        merged.extend(inner.overrides.clone());
        if let Some(args) = toolchain_args {
            merged.extend(args.clone());
        }
        merged
    }

    /// Looks up an override (or default) by name, recording the use for the
    /// unused-args report.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut inner = self.inner.lock().unwrap();
        let found = inner
            .overrides
            .get(name)
            .or_else(|| inner.defaults.get(name))
            .cloned();
        if found.is_some() {
            inner.used.insert(name.to_string());
        }
        found
    }

    pub fn mark_used(&self, name: &str) {
        self.inner.lock().unwrap().used.insert(name.to_string());
    }

    /// Overrides that were never consulted, for `--fail-on-unused-args`.
    pub fn unused_overrides(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .overrides
            .keys()
            .filter(|k| !inner.used.contains(*k))
            .cloned()
            .collect()
    }
}
