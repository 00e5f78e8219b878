use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::config::ConfigValues;
use crate::core::interning::Atom;
use crate::core::label::Label;
use crate::core::label_pattern::LabelPattern;
use crate::core::label_ptr::{LabelConfigPair, LabelPoolPair, LabelTargetPair};
use crate::core::output_file::OutputFile;
use crate::core::settings::Settings;
use crate::core::source_dir::SourceDir;
use crate::core::source_file::{SourceFile, SourceFileTypeSet};
use crate::core::tool;
use crate::core::toolchain::Toolchain;
use crate::core::substitution::{SubstitutionList, SubstitutionPattern};
use crate::frontend::value::Value;
use crate::util::errors::Location;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputType {
    Unknown,
    Group,
    Executable,
    SharedLibrary,
    LoadableModule,
    StaticLibrary,
    SourceSet,
    CopyFiles,
    Action,
    ActionForeach,
    BundleData,
    CreateBundle,
    GeneratedFile,
    RustLibrary,
    RustProcMacro,
}

impl OutputType {
    /// The declaration keyword for this output type.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::Unknown => "unknown",
            OutputType::Group => "group",
            OutputType::Executable => "executable",
            OutputType::SharedLibrary => "shared_library",
            OutputType::LoadableModule => "loadable_module",
            OutputType::StaticLibrary => "static_library",
            OutputType::SourceSet => "source_set",
            OutputType::CopyFiles => "copy",
            OutputType::Action => "action",
            OutputType::ActionForeach => "action_foreach",
            OutputType::BundleData => "bundle_data",
            OutputType::CreateBundle => "create_bundle",
            OutputType::GeneratedFile => "generated_file",
            OutputType::RustLibrary => "rust_library",
            OutputType::RustProcMacro => "rust_proc_macro",
        }
    }

    pub fn from_str(s: &str) -> Option<OutputType> {
        Some(match s {
            "group" => OutputType::Group,
            "executable" => OutputType::Executable,
            "shared_library" => OutputType::SharedLibrary,
            "loadable_module" => OutputType::LoadableModule,
            "static_library" => OutputType::StaticLibrary,
            "source_set" => OutputType::SourceSet,
            "copy" => OutputType::CopyFiles,
            "action" => OutputType::Action,
            "action_foreach" => OutputType::ActionForeach,
            "bundle_data" => OutputType::BundleData,
            "create_bundle" => OutputType::CreateBundle,
            "generated_file" => OutputType::GeneratedFile,
            "rust_library" => OutputType::RustLibrary,
            "rust_proc_macro" => OutputType::RustProcMacro,
            _ => return None,
        })
    }
}

/// Values for `action` and `action_foreach` targets (also holds the output
/// patterns for `copy` and `generated_file`).
#[derive(Clone, Debug, Default)]
pub struct ActionValues {
    pub script: SourceFile,
    pub args: SubstitutionList,
    pub outputs: SubstitutionList,
    pub depfile: SubstitutionPattern,
    pub response_file_contents: SubstitutionList,
}

impl ActionValues {
    pub fn uses_rsp_file(&self) -> bool {
        !self.response_file_contents.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrateType {
    Auto,
    Bin,
    CDylib,
    Dylib,
    ProcMacro,
    Rlib,
    Staticlib,
}

impl CrateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrateType::Auto => "auto",
            CrateType::Bin => "bin",
            CrateType::CDylib => "cdylib",
            CrateType::Dylib => "dylib",
            CrateType::ProcMacro => "proc-macro",
            CrateType::Rlib => "rlib",
            CrateType::Staticlib => "staticlib",
        }
    }

    pub fn from_str(s: &str) -> Option<CrateType> {
        match s {
            "auto" => Some(CrateType::Auto),
            "bin" => Some(CrateType::Bin),
            "cdylib" => Some(CrateType::CDylib),
            "dylib" => Some(CrateType::Dylib),
            "proc-macro" => Some(CrateType::ProcMacro),
            "rlib" => Some(CrateType::Rlib),
            "staticlib" => Some(CrateType::Staticlib),
            _ => None,
        }
    }
}

/// Rust-specific target values.
#[derive(Clone, Debug)]
pub struct RustValues {
    pub crate_name: Atom,
    pub crate_root: SourceFile,
    pub crate_type: CrateType,
    /// Renames applied to dep crates in `extern` flags: dep label -> name.
    pub aliased_deps: BTreeMap<Label, String>,
}

impl Default for RustValues {
    fn default() -> RustValues {
        RustValues {
            crate_name: Atom::default(),
            crate_root: SourceFile::default(),
            crate_type: CrateType::Auto,
            aliased_deps: BTreeMap::new(),
        }
    }
}

/// Swift-specific target values.
#[derive(Clone, Debug, Default)]
pub struct SwiftValues {
    pub module_name: String,
    /// Per-source partial object files, filled during resolution when the
    /// swift tool declares partial_outputs.
    pub partial_outputs: Vec<OutputFile>,
}

pub const APPLICATION_PRODUCT_TYPE: &str = "com.apple.product-type.application";

/// Bundle-related values: set on `bundle_data` and `create_bundle` targets,
/// and accumulated on targets whose deps reach bundle data.
#[derive(Clone, Debug, Default)]
pub struct BundleData {
    pub product_type: String,
    /// A transparent create_bundle does not terminate bundle-data
    /// propagation; its collected files flow through to enclosing bundles.
    pub transparent: bool,
    /// Collected bundle_data leaves (create_bundle targets only).
    pub bundle_deps: Vec<Arc<Target>>,
    /// Bundle data visible to dependents of this target.
    pub forwarded_bundle_deps: Vec<Arc<Target>>,
}

impl BundleData {
    pub fn is_application(&self) -> bool {
        self.product_type == APPLICATION_PRODUCT_TYPE
    }
}

/// Free-form metadata attached to a target: key to list of values.
#[derive(Clone, Debug, Default)]
pub struct Metadata {
    pub contents: BTreeMap<String, Vec<Value>>,
}

/// Payload of `generated_file` targets.
#[derive(Clone, Debug, Default)]
pub struct GeneratedFile {
    pub contents: Option<Value>,
    /// How to render the contents: "" (list lines), "string", or "json".
    pub output_conversion: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepsIterationType {
    /// Deps that affect linking: public then private.
    Linked,
    /// All deps: public, private, then data.
    All,
}

lazy_static::lazy_static! {
    static ref EMPTY_CONFIG_VALUES: ConfigValues = ConfigValues::default();
    static ref EMPTY_ACTION_VALUES: ActionValues = ActionValues::default();
    static ref EMPTY_RUST_VALUES: RustValues = RustValues::default();
    static ref EMPTY_SWIFT_VALUES: SwiftValues = SwiftValues::default();
    static ref EMPTY_BUNDLE_DATA: BundleData = BundleData::default();
    static ref EMPTY_METADATA: Metadata = Metadata::default();
    static ref EMPTY_GENERATED_FILE: GeneratedFile = GeneratedFile::default();
}

/// The core graph node. Filled in by the frontend, then finalized by the
/// resolution pipeline once all referenced labels have resolved; immutable
/// afterwards.
#[derive(Debug)]
pub struct Target {
    label: Label,
    defined_from: Option<Location>,

    pub output_type: OutputType,
    pub output_name: String,
    pub output_prefix_override: bool,
    pub output_dir: Option<SourceDir>,
    pub output_extension: Option<String>,

    pub sources: Vec<SourceFile>,
    pub source_types_used: SourceFileTypeSet,
    pub all_headers_public: bool,
    pub public_headers: Vec<SourceFile>,
    pub inputs: Vec<SourceFile>,
    pub data: Vec<String>,

    pub testonly: bool,
    /// Empty means public.
    pub visibility: Vec<LabelPattern>,
    pub assert_no_deps: Vec<LabelPattern>,

    pub private_deps: Vec<LabelTargetPair>,
    pub public_deps: Vec<LabelTargetPair>,
    pub data_deps: Vec<LabelTargetPair>,
    /// Associated targets whose "generated" state follows this target's,
    /// without a build-time dependency.
    pub gen_deps: Vec<LabelTargetPair>,

    pub configs: Vec<LabelConfigPair>,
    pub public_configs: Vec<LabelConfigPair>,
    pub all_dependent_configs: Vec<LabelConfigPair>,

    pub pool: Option<LabelPoolPair>,
    pub toolchain: Option<Arc<Toolchain>>,
    /// The per-toolchain settings this target was loaded under; set by the
    /// loader before the item is posted to the Builder.
    pub settings: Option<Arc<Settings>>,

    pub complete_static_lib: bool,
    pub write_runtime_deps: Option<SourceFile>,

    config_values: Option<Box<ConfigValues>>,
    action_values: Option<Box<ActionValues>>,
    rust_values: Option<Box<RustValues>>,
    swift_values: Option<Box<SwiftValues>>,
    bundle_data: Option<Box<BundleData>>,
    metadata: Option<Box<Metadata>>,
    generated_file: Option<Box<GeneratedFile>>,

    // Derived during resolution.
    pub dependency_output_file: Option<OutputFile>,
    pub dependency_is_phony: bool,
    pub link_output_file: Option<OutputFile>,
    pub runtime_outputs: Vec<OutputFile>,
    pub computed_outputs: Vec<OutputFile>,
    pub write_runtime_deps_output: Option<OutputFile>,
}

impl Target {
    pub fn new(label: Label, defined_from: Option<Location>) -> Target {
        Target {
            label,
            defined_from,
            output_type: OutputType::Unknown,
            output_name: String::new(),
            output_prefix_override: false,
            output_dir: None,
            output_extension: None,
            sources: Vec::new(),
            source_types_used: SourceFileTypeSet::default(),
            all_headers_public: true,
            public_headers: Vec::new(),
            inputs: Vec::new(),
            data: Vec::new(),
            testonly: false,
            visibility: Vec::new(),
            assert_no_deps: Vec::new(),
            private_deps: Vec::new(),
            public_deps: Vec::new(),
            data_deps: Vec::new(),
            gen_deps: Vec::new(),
            configs: Vec::new(),
            public_configs: Vec::new(),
            all_dependent_configs: Vec::new(),
            pool: None,
            toolchain: None,
            settings: None,
            complete_static_lib: false,
            write_runtime_deps: None,
            config_values: None,
            action_values: None,
            rust_values: None,
            swift_values: None,
            bundle_data: None,
            metadata: None,
            generated_file: None,
            dependency_output_file: None,
            dependency_is_phony: false,
            link_output_file: None,
            runtime_outputs: Vec::new(),
            computed_outputs: Vec::new(),
            write_runtime_deps_output: None,
        }
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn defined_from(&self) -> Option<&Location> {
        self.defined_from.as_ref()
    }

    /// The settings this target was instantiated under. Panics before the
    /// loader has attached them.
    pub fn settings(&self) -> &Arc<Settings> {
        self.settings
            .as_ref()
            .expect("target read before the loader attached settings")
    }

    pub fn is_binary(&self) -> bool {
        matches!(
            self.output_type,
            OutputType::Executable
                | OutputType::SharedLibrary
                | OutputType::LoadableModule
                | OutputType::StaticLibrary
                | OutputType::SourceSet
                | OutputType::RustLibrary
                | OutputType::RustProcMacro
        )
    }

    pub fn is_linkable(&self) -> bool {
        matches!(
            self.output_type,
            OutputType::StaticLibrary
                | OutputType::SharedLibrary
                | OutputType::RustLibrary
                | OutputType::RustProcMacro
        )
    }

    /// Final targets are not depended upon for linking purposes by things
    /// that include them.
    pub fn is_final(&self) -> bool {
        matches!(
            self.output_type,
            OutputType::Executable
                | OutputType::SharedLibrary
                | OutputType::LoadableModule
                | OutputType::Action
                | OutputType::ActionForeach
                | OutputType::CopyFiles
                | OutputType::CreateBundle
                | OutputType::RustProcMacro
        ) || (self.output_type == OutputType::StaticLibrary && self.complete_static_lib)
    }

    /// BUNDLE_DATA declares inputs to later CREATE_BUNDLE steps; dependents
    /// treat it like a data dependency so edits don't relink binaries.
    pub fn is_data_only(&self) -> bool {
        self.output_type == OutputType::BundleData
    }

    pub fn deps(&self, iteration: DepsIterationType) -> impl Iterator<Item = &LabelTargetPair> {
        let data: &[LabelTargetPair] = match iteration {
            DepsIterationType::Linked => &[],
            DepsIterationType::All => &self.data_deps,
        };
        self.public_deps
            .iter()
            .chain(self.private_deps.iter())
            .chain(data.iter())
    }

    // Lazily-allocated payloads. The immutable accessors return a shared
    // empty value when the payload was never set.

    pub fn config_values(&self) -> &ConfigValues {
        self.config_values.as_deref().unwrap_or(&EMPTY_CONFIG_VALUES)
    }

    pub fn config_values_mut(&mut self) -> &mut ConfigValues {
        self.config_values.get_or_insert_with(Default::default)
    }

    pub fn has_config_values(&self) -> bool {
        self.config_values.is_some()
    }

    pub fn action_values(&self) -> &ActionValues {
        self.action_values.as_deref().unwrap_or(&EMPTY_ACTION_VALUES)
    }

    pub fn action_values_mut(&mut self) -> &mut ActionValues {
        self.action_values.get_or_insert_with(Default::default)
    }

    pub fn has_action_values(&self) -> bool {
        self.action_values.is_some()
    }

    pub fn rust_values(&self) -> &RustValues {
        self.rust_values.as_deref().unwrap_or(&EMPTY_RUST_VALUES)
    }

    pub fn rust_values_mut(&mut self) -> &mut RustValues {
        self.rust_values.get_or_insert_with(Default::default)
    }

    pub fn swift_values(&self) -> &SwiftValues {
        self.swift_values.as_deref().unwrap_or(&EMPTY_SWIFT_VALUES)
    }

    pub fn swift_values_mut(&mut self) -> &mut SwiftValues {
        self.swift_values.get_or_insert_with(Default::default)
    }

    pub fn bundle_data(&self) -> &BundleData {
        self.bundle_data.as_deref().unwrap_or(&EMPTY_BUNDLE_DATA)
    }

    pub fn bundle_data_mut(&mut self) -> &mut BundleData {
        self.bundle_data.get_or_insert_with(Default::default)
    }

    pub fn has_bundle_data(&self) -> bool {
        self.bundle_data.is_some()
    }

    pub fn metadata(&self) -> &Metadata {
        self.metadata.as_deref().unwrap_or(&EMPTY_METADATA)
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        self.metadata.get_or_insert_with(Default::default)
    }

    pub fn generated_file(&self) -> &GeneratedFile {
        self.generated_file.as_deref().unwrap_or(&EMPTY_GENERATED_FILE)
    }

    pub fn generated_file_mut(&mut self) -> &mut GeneratedFile {
        self.generated_file.get_or_insert_with(Default::default)
    }

    /// The name of the tool producing this target's canonical output. Rust
    /// sources route through the crate-type mapping; everything not linked
    /// uses `stamp` so there is a single file to depend on.
    pub fn tool_name_for_final_output(&self) -> &'static str {
        if self.source_types_used.rust_source_used() {
            match self.rust_values().crate_type {
                CrateType::Auto => match self.output_type {
                    OutputType::Executable => return tool::RUST_TOOL_BIN,
                    OutputType::SharedLibrary => return tool::RUST_TOOL_DYLIB,
                    OutputType::StaticLibrary => return tool::RUST_TOOL_STATICLIB,
                    OutputType::RustLibrary => return tool::RUST_TOOL_RLIB,
                    OutputType::RustProcMacro => return tool::RUST_TOOL_MACRO,
                    _ => {}
                },
                CrateType::Bin => return tool::RUST_TOOL_BIN,
                CrateType::CDylib => return tool::RUST_TOOL_CDYLIB,
                CrateType::Dylib => return tool::RUST_TOOL_DYLIB,
                CrateType::ProcMacro => return tool::RUST_TOOL_MACRO,
                CrateType::Rlib => return tool::RUST_TOOL_RLIB,
                CrateType::Staticlib => return tool::RUST_TOOL_STATICLIB,
            }
        }
        match self.output_type {
            OutputType::Executable => tool::C_TOOL_LINK,
            OutputType::SharedLibrary => tool::C_TOOL_SOLINK,
            OutputType::LoadableModule => tool::C_TOOL_SOLINK_MODULE,
            OutputType::StaticLibrary => tool::C_TOOL_ALINK,
            OutputType::Group
            | OutputType::SourceSet
            | OutputType::Action
            | OutputType::ActionForeach
            | OutputType::BundleData
            | OutputType::CreateBundle
            | OutputType::CopyFiles
            | OutputType::GeneratedFile => tool::GENERAL_TOOL_STAMP,
            _ => tool::TOOL_NONE,
        }
    }

    /// The output name with the tool's prefix applied (unless overridden or
    /// already present).
    pub fn computed_output_name(&self) -> String {
        let name = if self.output_name.is_empty() {
            self.label.name()
        } else {
            &self.output_name
        };
        let mut result = String::new();
        if let Some(toolchain) = &self.toolchain {
            if let Some(tool) = toolchain.get_tool_for_target_final_output(self) {
                if !self.output_prefix_override && !name.starts_with(&tool.output_prefix) {
                    result.push_str(&tool.output_prefix);
                }
            }
        }
        result.push_str(name);
        result
    }

    pub fn has_dependency_output(&self) -> bool {
        self.dependency_output_file.is_some()
    }
}
