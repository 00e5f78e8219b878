use crate::core::label::Label;
use crate::core::label_pattern::LabelPattern;
use crate::core::label_ptr::LabelConfigPair;
use crate::core::source_dir::SourceDir;
use crate::core::source_file::SourceFile;
use crate::util::errors::Location;

/// The flag/define/include/etc. values carried by a config (or set directly
/// on a target). Lists are ordered and duplicates are preserved: ordering is
/// significant for compile flags.
#[derive(Clone, Default, Debug)]
pub struct ConfigValues {
    pub arflags: Vec<String>,
    pub asmflags: Vec<String>,
    pub cflags: Vec<String>,
    pub cflags_c: Vec<String>,
    pub cflags_cc: Vec<String>,
    pub cflags_objc: Vec<String>,
    pub cflags_objcc: Vec<String>,
    pub defines: Vec<String>,
    pub frameworks: Vec<String>,
    pub weak_frameworks: Vec<String>,
    pub framework_dirs: Vec<SourceDir>,
    pub include_dirs: Vec<SourceDir>,
    pub inputs: Vec<SourceFile>,
    pub ldflags: Vec<String>,
    pub lib_dirs: Vec<SourceDir>,
    pub libs: Vec<String>,
    pub precompiled_header: String,
    pub precompiled_source: Option<SourceFile>,
    pub rustflags: Vec<String>,
    pub rustenv: Vec<String>,
    pub swiftflags: Vec<String>,
}

impl ConfigValues {
    pub fn has_precompiled_headers(&self) -> bool {
        !self.precompiled_header.is_empty() || self.precompiled_source.is_some()
    }

    /// In-order concatenation; PCH values overwrite only when unset here.
    pub fn append_values_from(&mut self, other: &ConfigValues) {
        self.arflags.extend_from_slice(&other.arflags);
        self.asmflags.extend_from_slice(&other.asmflags);
        self.cflags.extend_from_slice(&other.cflags);
        self.cflags_c.extend_from_slice(&other.cflags_c);
        self.cflags_cc.extend_from_slice(&other.cflags_cc);
        self.cflags_objc.extend_from_slice(&other.cflags_objc);
        self.cflags_objcc.extend_from_slice(&other.cflags_objcc);
        self.defines.extend_from_slice(&other.defines);
        self.frameworks.extend_from_slice(&other.frameworks);
        self.weak_frameworks.extend_from_slice(&other.weak_frameworks);
        self.framework_dirs.extend_from_slice(&other.framework_dirs);
        self.include_dirs.extend_from_slice(&other.include_dirs);
        self.inputs.extend_from_slice(&other.inputs);
        self.ldflags.extend_from_slice(&other.ldflags);
        self.lib_dirs.extend_from_slice(&other.lib_dirs);
        self.libs.extend_from_slice(&other.libs);
        if self.precompiled_header.is_empty() {
            self.precompiled_header = other.precompiled_header.clone();
        }
        if self.precompiled_source.is_none() {
            self.precompiled_source = other.precompiled_source;
        }
        self.rustflags.extend_from_slice(&other.rustflags);
        self.rustenv.extend_from_slice(&other.rustenv);
        self.swiftflags.extend_from_slice(&other.swiftflags);
    }
}

/// A named bundle of compile/link values. Configs form a forest via
/// sub-configs; the resolved values are the transitive in-order
/// concatenation, computed once when the config resolves.
#[derive(Clone, Debug)]
pub struct Config {
    label: Label,
    defined_from: Option<Location>,
    pub visibility: Vec<LabelPattern>,
    pub testonly: bool,
    pub own_values: ConfigValues,
    /// Sub-configs, applied after this config's own values.
    pub configs: Vec<LabelConfigPair>,
    resolved_values: Option<ConfigValues>,
}

impl Config {
    pub fn new(label: Label, defined_from: Option<Location>) -> Config {
        Config {
            label,
            defined_from,
            visibility: Vec::new(),
            testonly: false,
            own_values: ConfigValues::default(),
            configs: Vec::new(),
            resolved_values: None,
        }
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn defined_from(&self) -> Option<&Location> {
        self.defined_from.as_ref()
    }

    /// Runs when the Builder has filled in all sub-config pointers. The
    /// sub-configs have already resolved, so reading their resolved values
    /// flattens transitively.
    pub fn on_resolved(&mut self) {
        if self.configs.is_empty() {
            return; // Own values are already the resolved values.
        }
        let mut resolved = self.own_values.clone();
        for sub in &self.configs {
            resolved.append_values_from(sub.get().resolved_values());
        }
        self.resolved_values = Some(resolved);
    }

    pub fn resolved_values(&self) -> &ConfigValues {
        self.resolved_values.as_ref().unwrap_or(&self.own_values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::source_dir::SourceDir;
    use std::sync::Arc;

    fn label(name: &str) -> Label {
        Label::new_with_no_toolchain(SourceDir::new("//cfg/"), name)
    }

    #[test]
    fn sub_config_flattening_preserves_order_and_duplicates() {
        let mut leaf = Config::new(label("leaf"), None);
        leaf.own_values.cflags = vec!["-c".into()];
        leaf.on_resolved();
        let leaf = Arc::new(leaf);

        let mut mid = Config::new(label("mid"), None);
        mid.own_values.cflags = vec!["-b".into()];
        let mut pair = LabelConfigPair::new(*leaf.label(), None);
        pair.ptr = Some(leaf.clone());
        mid.configs.push(pair);
        mid.on_resolved();
        let mid = Arc::new(mid);

        let mut root = Config::new(label("root"), None);
        root.own_values.cflags = vec!["-a".into(), "-c".into()];
        let mut pair = LabelConfigPair::new(*mid.label(), None);
        pair.ptr = Some(mid);
        root.configs.push(pair);
        let mut pair = LabelConfigPair::new(*leaf.label(), None);
        pair.ptr = Some(leaf);
        root.configs.push(pair);
        root.on_resolved();

        assert_eq!(
            root.resolved_values().cflags,
            vec!["-a", "-c", "-b", "-c", "-c"]
        );
    }
}
