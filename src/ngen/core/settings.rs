use std::sync::Arc;

use crate::core::build_settings::BuildSettings;
use crate::core::label::Label;

/// Per-toolchain settings: the context in which files load and targets
/// resolve for one toolchain. Created by the Loader the first time a
/// toolchain is required.
#[derive(Debug)]
pub struct Settings {
    build_settings: Arc<BuildSettings>,
    toolchain_label: Label,
    default_toolchain_label: Label,
    /// Subdirectory of the build dir this toolchain writes to: empty for the
    /// default toolchain, `<name>/` otherwise.
    output_subdir: String,
}

impl Settings {
    pub fn new(
        build_settings: Arc<BuildSettings>,
        toolchain_label: Label,
        default_toolchain_label: Label,
    ) -> Settings {
        let is_default = toolchain_label == default_toolchain_label;
        let output_subdir = if is_default {
            String::new()
        } else {
            format!("{}/", toolchain_label.name())
        };
        Settings {
            build_settings,
            toolchain_label,
            default_toolchain_label,
            output_subdir,
        }
    }

    pub fn build_settings(&self) -> &Arc<BuildSettings> {
        &self.build_settings
    }

    pub fn toolchain_label(&self) -> &Label {
        &self.toolchain_label
    }

    pub fn default_toolchain_label(&self) -> &Label {
        &self.default_toolchain_label
    }

    pub fn is_default(&self) -> bool {
        self.toolchain_label == self.default_toolchain_label
    }

    pub fn output_subdir(&self) -> &str {
        &self.output_subdir
    }

    /// The toolchain rule file, relative to the build dir.
    pub fn ninja_file(&self) -> String {
        format!("{}toolchain.ninja", self.output_subdir)
    }

    /// Rule-name prefix distinguishing this toolchain's rules in the merged
    /// ninja namespace: empty for the default toolchain.
    pub fn ninja_rule_prefix(&self) -> String {
        if self.is_default() {
            String::new()
        } else {
            format!("{}_", self.toolchain_label.name())
        }
    }
}
