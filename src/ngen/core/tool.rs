use crate::core::label_ptr::LabelPoolPair;
use crate::core::source_file::FileType;
use crate::core::substitution::{
    is_valid_alink_substitution, is_valid_compile_xcassets_substitution,
    is_valid_compiler_outputs_substitution, is_valid_compiler_substitution,
    is_valid_copy_substitution, is_valid_linker_outputs_substitution,
    is_valid_linker_substitution, is_valid_rust_linker_outputs_substitution,
    is_valid_rust_substitution, is_valid_swift_substitution, is_valid_tool_substitution,
    SubstitutionBits, SubstitutionList, SubstitutionPattern, SubstitutionType,
};
use crate::util::errors::{ErrorKind, GenError, Location, NgenResult};

// C compiler tools.
pub const C_TOOL_CC: &str = "cc";
pub const C_TOOL_CXX: &str = "cxx";
pub const C_TOOL_CXX_MODULE: &str = "cxx_module";
pub const C_TOOL_OBJC: &str = "objc";
pub const C_TOOL_OBJCXX: &str = "objcxx";
pub const C_TOOL_RC: &str = "rc";
pub const C_TOOL_ASM: &str = "asm";
pub const C_TOOL_SWIFT: &str = "swift";

// C linker tools.
pub const C_TOOL_ALINK: &str = "alink";
pub const C_TOOL_SOLINK: &str = "solink";
pub const C_TOOL_SOLINK_MODULE: &str = "solink_module";
pub const C_TOOL_LINK: &str = "link";

// General tools.
pub const GENERAL_TOOL_STAMP: &str = "stamp";
pub const GENERAL_TOOL_COPY: &str = "copy";
pub const GENERAL_TOOL_ACTION: &str = "action";
pub const GENERAL_TOOL_COPY_BUNDLE_DATA: &str = "copy_bundle_data";
pub const GENERAL_TOOL_COMPILE_XCASSETS: &str = "compile_xcassets";

// Rust tools.
pub const RUST_TOOL_BIN: &str = "rust_bin";
pub const RUST_TOOL_CDYLIB: &str = "rust_cdylib";
pub const RUST_TOOL_DYLIB: &str = "rust_dylib";
pub const RUST_TOOL_MACRO: &str = "rust_macro";
pub const RUST_TOOL_RLIB: &str = "rust_rlib";
pub const RUST_TOOL_STATICLIB: &str = "rust_staticlib";

// Builtin tools.
pub const BUILTIN_TOOL_PHONY: &str = "phony";

/// Sentinel for "no tool applies".
pub const TOOL_NONE: &str = "";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepsFormat {
    Gcc,
    Msvc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrecompiledHeaderType {
    None,
    Gcc,
    Msvc,
}

/// Fields only meaningful on C-family tools.
#[derive(Clone, Debug)]
pub struct CToolData {
    pub depsformat: DepsFormat,
    pub precompiled_header_type: PrecompiledHeaderType,
    pub link_output: SubstitutionPattern,
    pub depend_output: SubstitutionPattern,
}

impl Default for CToolData {
    fn default() -> CToolData {
        CToolData {
            depsformat: DepsFormat::Gcc,
            precompiled_header_type: PrecompiledHeaderType::None,
            link_output: SubstitutionPattern::default(),
            depend_output: SubstitutionPattern::default(),
        }
    }
}

impl CToolData {
    /// True if the tool has separate outputs for dependency tracking and
    /// linking.
    pub fn has_separate_solink_files(&self) -> bool {
        !self.link_output.is_empty() || !self.depend_output.is_empty()
    }
}

/// Fields only meaningful on Rust tools.
#[derive(Clone, Debug, Default)]
pub struct RustToolData {
    pub rust_sysroot: String,
    pub dynamic_link_switch: String,
}

#[derive(Clone, Debug)]
pub enum ToolKind {
    C(CToolData),
    General,
    Rust(RustToolData),
    Builtin,
}

/// A typed description of how to produce outputs of one category. Mutable
/// while the frontend fills in fields; `set_complete()` validates, computes
/// the substitution bitset, and freezes it.
#[derive(Clone, Debug)]
pub struct Tool {
    name: &'static str,
    defined_from: Option<Location>,
    kind: ToolKind,

    pub command: SubstitutionPattern,
    pub command_launcher: String,
    pub default_output_dir: SubstitutionPattern,
    pub default_output_extension: String,
    pub depfile: SubstitutionPattern,
    pub description: SubstitutionPattern,
    pub framework_switch: String,
    pub weak_framework_switch: String,
    pub framework_dir_switch: String,
    pub lib_switch: String,
    pub lib_dir_switch: String,
    pub swiftmodule_switch: String,
    pub outputs: SubstitutionList,
    pub partial_outputs: SubstitutionList,
    pub runtime_outputs: SubstitutionList,
    pub output_prefix: String,
    pub restat: bool,
    pub rspfile: SubstitutionPattern,
    pub rspfile_content: SubstitutionPattern,
    pub pool: Option<LabelPoolPair>,

    complete: bool,
    substitution_bits: SubstitutionBits,
}

impl Tool {
    /// Creates a tool of the variant implied by `name`, or `None` for an
    /// unknown tool name. The `phony` builtin cannot be created this way; it
    /// is preconstructed by the toolchain.
    pub fn create(name: &str, defined_from: Option<Location>) -> Option<Tool> {
        let (name, kind) = match name {
            C_TOOL_CC | C_TOOL_CXX | C_TOOL_CXX_MODULE | C_TOOL_OBJC | C_TOOL_OBJCXX
            | C_TOOL_RC | C_TOOL_ASM | C_TOOL_SWIFT | C_TOOL_ALINK | C_TOOL_SOLINK
            | C_TOOL_SOLINK_MODULE | C_TOOL_LINK => {
                (intern_name(name), ToolKind::C(CToolData::default()))
            }
            GENERAL_TOOL_STAMP | GENERAL_TOOL_COPY | GENERAL_TOOL_ACTION
            | GENERAL_TOOL_COPY_BUNDLE_DATA | GENERAL_TOOL_COMPILE_XCASSETS => {
                (intern_name(name), ToolKind::General)
            }
            RUST_TOOL_BIN | RUST_TOOL_CDYLIB | RUST_TOOL_DYLIB | RUST_TOOL_MACRO
            | RUST_TOOL_RLIB | RUST_TOOL_STATICLIB => {
                (intern_name(name), ToolKind::Rust(RustToolData::default()))
            }
            _ => return None,
        };
        Some(Tool::new(name, kind, defined_from))
    }

    pub(crate) fn new_builtin_phony() -> Tool {
        Tool::new(BUILTIN_TOOL_PHONY, ToolKind::Builtin, None)
    }

    fn new(name: &'static str, kind: ToolKind, defined_from: Option<Location>) -> Tool {
        Tool {
            name,
            defined_from,
            kind,
            command: SubstitutionPattern::default(),
            command_launcher: String::new(),
            default_output_dir: SubstitutionPattern::default(),
            default_output_extension: String::new(),
            depfile: SubstitutionPattern::default(),
            description: SubstitutionPattern::default(),
            framework_switch: String::new(),
            weak_framework_switch: String::new(),
            framework_dir_switch: String::new(),
            lib_switch: String::new(),
            lib_dir_switch: String::new(),
            swiftmodule_switch: String::new(),
            outputs: SubstitutionList::default(),
            partial_outputs: SubstitutionList::default(),
            runtime_outputs: SubstitutionList::default(),
            output_prefix: String::new(),
            restat: false,
            rspfile: SubstitutionPattern::default(),
            rspfile_content: SubstitutionPattern::default(),
            pool: None,
            complete: false,
            substitution_bits: SubstitutionBits::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn defined_from(&self) -> Option<&Location> {
        self.defined_from.as_ref()
    }

    pub fn kind(&self) -> &ToolKind {
        &self.kind
    }

    pub fn as_c(&self) -> Option<&CToolData> {
        match &self.kind {
            ToolKind::C(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_c_mut(&mut self) -> Option<&mut CToolData> {
        debug_assert!(!self.complete);
        match &mut self.kind {
            ToolKind::C(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_rust(&self) -> Option<&RustToolData> {
        match &self.kind {
            ToolKind::Rust(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_rust_mut(&mut self) -> Option<&mut RustToolData> {
        debug_assert!(!self.complete);
        match &mut self.kind {
            ToolKind::Rust(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.kind, ToolKind::Builtin)
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_c_compiler(&self) -> bool {
        matches!(&self.kind, ToolKind::C(_))
            && matches!(
                self.name,
                C_TOOL_CC
                    | C_TOOL_CXX
                    | C_TOOL_CXX_MODULE
                    | C_TOOL_OBJC
                    | C_TOOL_OBJCXX
                    | C_TOOL_RC
                    | C_TOOL_ASM
                    | C_TOOL_SWIFT
            )
    }

    pub fn is_c_linker(&self) -> bool {
        matches!(&self.kind, ToolKind::C(_))
            && matches!(
                self.name,
                C_TOOL_ALINK | C_TOOL_SOLINK | C_TOOL_SOLINK_MODULE | C_TOOL_LINK
            )
    }

    pub fn is_shared_library_linker(&self) -> bool {
        matches!(self.name, C_TOOL_SOLINK | C_TOOL_SOLINK_MODULE)
            || matches!(self.name, RUST_TOOL_CDYLIB | RUST_TOOL_DYLIB | RUST_TOOL_MACRO)
    }

    /// Whether the given substitution may appear in this tool's command or
    /// description patterns.
    pub fn validate_substitution(&self, t: SubstitutionType) -> bool {
        match &self.kind {
            ToolKind::Builtin => is_valid_tool_substitution(t),
            ToolKind::General => match self.name {
                GENERAL_TOOL_STAMP | GENERAL_TOOL_ACTION => is_valid_tool_substitution(t),
                GENERAL_TOOL_COPY | GENERAL_TOOL_COPY_BUNDLE_DATA => is_valid_copy_substitution(t),
                GENERAL_TOOL_COMPILE_XCASSETS => is_valid_compile_xcassets_substitution(t),
                _ => false,
            },
            ToolKind::C(_) => {
                if self.name == C_TOOL_SWIFT {
                    is_valid_swift_substitution(t)
                } else if self.is_c_compiler() {
                    is_valid_compiler_substitution(t)
                } else if self.name == C_TOOL_ALINK {
                    is_valid_alink_substitution(t)
                } else {
                    is_valid_linker_substitution(t)
                }
            }
            ToolKind::Rust(_) => is_valid_rust_substitution(t),
        }
    }

    /// Whether the given substitution may appear in this tool's `outputs`
    /// patterns (a narrower set: flags never name files).
    pub fn validate_output_substitution(&self, t: SubstitutionType) -> bool {
        match &self.kind {
            ToolKind::Builtin | ToolKind::General => is_valid_tool_substitution(t),
            ToolKind::C(_) => {
                if self.is_c_compiler() {
                    is_valid_compiler_outputs_substitution(t)
                } else {
                    is_valid_linker_outputs_substitution(t)
                }
            }
            ToolKind::Rust(_) => is_valid_rust_linker_outputs_substitution(t),
        }
    }

    fn validate_pattern(&self, what: &str, pattern: &SubstitutionPattern) -> NgenResult<()> {
        for t in pattern.required_types() {
            if !self.validate_substitution(t) {
                return Err(invalid_tool(
                    self,
                    format!(
                        "the substitution {{{{{}}}}} is not valid in the {} of tool \"{}\"",
                        t.name(),
                        what,
                        self.name
                    ),
                ));
            }
        }
        Ok(())
    }

    fn validate_output_list(&self, what: &str, list: &SubstitutionList) -> NgenResult<()> {
        for t in list.required_types() {
            if !self.validate_output_substitution(t) {
                return Err(invalid_tool(
                    self,
                    format!(
                        "the substitution {{{{{}}}}} is not valid in the {} of tool \"{}\"",
                        t.name(),
                        what,
                        self.name
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Validates the finished tool and freezes it. After this call mutation
    /// is a programming error (checked in debug builds by the setters).
    pub fn set_complete(&mut self) -> NgenResult<()> {
        debug_assert!(!self.complete);

        if self.command.is_empty()
            && self.name != GENERAL_TOOL_ACTION
            && !matches!(self.kind, ToolKind::Builtin)
        {
            return Err(invalid_tool(
                self,
                format!("tool \"{}\" must specify a command", self.name),
            ));
        }

        self.validate_pattern("command", &self.command)?;
        self.validate_pattern("description", &self.description)?;
        self.validate_pattern("depfile", &self.depfile)?;
        self.validate_pattern("rspfile", &self.rspfile)?;
        self.validate_pattern("rspfile_content", &self.rspfile_content)?;
        self.validate_output_list("outputs", &self.outputs)?;
        self.validate_output_list("partial_outputs", &self.partial_outputs)?;
        self.validate_output_list("runtime_outputs", &self.runtime_outputs)?;

        if self.rspfile.is_empty() != self.rspfile_content.is_empty() {
            return Err(invalid_tool(
                self,
                format!(
                    "tool \"{}\" must specify rspfile and rspfile_content together",
                    self.name
                ),
            ));
        }

        let needs_outputs =
            matches!(self.kind, ToolKind::C(_)) || matches!(self.kind, ToolKind::Rust(_));
        if needs_outputs && self.outputs.is_empty() {
            return Err(invalid_tool(
                self,
                format!("tool \"{}\" must specify outputs", self.name),
            ));
        }

        for pattern in self.runtime_outputs.list() {
            if !self.outputs.contains_pattern(pattern) {
                return Err(invalid_tool(
                    self,
                    format!(
                        "runtime output \"{}\" of tool \"{}\" is not in the outputs list",
                        pattern.as_string(),
                        self.name
                    ),
                ));
            }
        }

        if let ToolKind::C(data) = &self.kind {
            if data.depsformat == DepsFormat::Msvc && !self.depfile.is_empty() {
                return Err(invalid_tool(
                    self,
                    format!(
                        "tool \"{}\" uses depsformat \"msvc\" which does not allow a depfile",
                        self.name
                    ),
                ));
            }
            if data.precompiled_header_type != PrecompiledHeaderType::None && !self.is_c_compiler()
            {
                return Err(invalid_tool(
                    self,
                    format!(
                        "precompiled_header_type is only valid on compiler tools, not \"{}\"",
                        self.name
                    ),
                ));
            }
            if data.has_separate_solink_files()
                && !matches!(self.name, C_TOOL_SOLINK | C_TOOL_SOLINK_MODULE)
            {
                return Err(invalid_tool(
                    self,
                    format!(
                        "link_output and depend_output are only valid on solink tools, not \"{}\"",
                        self.name
                    ),
                ));
            }
            for (what, pattern) in [
                ("link_output", &data.link_output),
                ("depend_output", &data.depend_output),
            ] {
                if !pattern.is_empty() && !self.outputs.contains_pattern(pattern) {
                    return Err(invalid_tool(
                        self,
                        format!(
                            "{} \"{}\" of tool \"{}\" is not in the outputs list",
                            what,
                            pattern.as_string(),
                            self.name
                        ),
                    ));
                }
            }
        }

        self.command.fill_required_types(&mut self.substitution_bits);
        self.depfile.fill_required_types(&mut self.substitution_bits);
        self.description.fill_required_types(&mut self.substitution_bits);
        self.outputs.fill_required_types(&mut self.substitution_bits);
        self.rspfile.fill_required_types(&mut self.substitution_bits);
        self.rspfile_content
            .fill_required_types(&mut self.substitution_bits);

        self.complete = true;
        Ok(())
    }

    pub fn substitution_bits(&self) -> &SubstitutionBits {
        debug_assert!(self.complete);
        &self.substitution_bits
    }

    /// The tool name used to compile one source file of the given type.
    /// Object files map to no tool (they pass through to the link), and Rust
    /// compilation is per crate rather than per source, which callers must
    /// special-case.
    pub fn tool_for_source_type(file_type: FileType) -> &'static str {
        match file_type {
            FileType::C => C_TOOL_CC,
            FileType::Cpp => C_TOOL_CXX,
            FileType::M => C_TOOL_OBJC,
            FileType::Mm => C_TOOL_OBJCXX,
            FileType::Asm | FileType::S => C_TOOL_ASM,
            FileType::Rc => C_TOOL_RC,
            FileType::Swift => C_TOOL_SWIFT,
            FileType::Rs => RUST_TOOL_BIN,
            _ => TOOL_NONE,
        }
    }
}

fn invalid_tool(tool: &Tool, message: String) -> anyhow::Error {
    GenError::new(ErrorKind::InvalidToolConfiguration, message)
        .at(tool.defined_from.clone())
        .into()
}

fn intern_name(name: &str) -> &'static str {
    // Tool names form a closed set, so interning them gives 'static lifetime
    // without touching the atom pool.
    for known in [
        C_TOOL_CC,
        C_TOOL_CXX,
        C_TOOL_CXX_MODULE,
        C_TOOL_OBJC,
        C_TOOL_OBJCXX,
        C_TOOL_RC,
        C_TOOL_ASM,
        C_TOOL_SWIFT,
        C_TOOL_ALINK,
        C_TOOL_SOLINK,
        C_TOOL_SOLINK_MODULE,
        C_TOOL_LINK,
        GENERAL_TOOL_STAMP,
        GENERAL_TOOL_COPY,
        GENERAL_TOOL_ACTION,
        GENERAL_TOOL_COPY_BUNDLE_DATA,
        GENERAL_TOOL_COMPILE_XCASSETS,
        RUST_TOOL_BIN,
        RUST_TOOL_CDYLIB,
        RUST_TOOL_DYLIB,
        RUST_TOOL_MACRO,
        RUST_TOOL_RLIB,
        RUST_TOOL_STATICLIB,
        BUILTIN_TOOL_PHONY,
    ] {
        if known == name {
            return known;
        }
    }
    unreachable!("unknown tool name {}", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(s: &str) -> SubstitutionPattern {
        SubstitutionPattern::parse(s, None).unwrap()
    }

    fn list(items: &[&str]) -> SubstitutionList {
        let strings: Vec<String> = items.iter().map(|s| s.to_string()).collect();
        SubstitutionList::parse(&strings, None).unwrap()
    }

    #[test]
    fn create_picks_variant() {
        assert!(Tool::create("cc", None).unwrap().as_c().is_some());
        assert!(Tool::create("rust_rlib", None).unwrap().as_rust().is_some());
        assert!(matches!(
            Tool::create("stamp", None).unwrap().kind(),
            ToolKind::General
        ));
        assert!(Tool::create("phony", None).is_none());
        assert!(Tool::create("no_such_tool", None).is_none());
    }

    #[test]
    fn command_is_required() {
        let mut stamp = Tool::create("stamp", None).unwrap();
        assert!(stamp.set_complete().is_err());

        let mut stamp = Tool::create("stamp", None).unwrap();
        stamp.command = pattern("touch {{output}}");
        assert!(stamp.set_complete().is_ok());

        // Action tools carry no command of their own.
        let mut action = Tool::create("action", None).unwrap();
        assert!(action.set_complete().is_ok());
    }

    #[test]
    fn compiler_rejects_linker_substitutions() {
        let mut cc = Tool::create("cc", None).unwrap();
        cc.command = pattern("gcc {{libs}} -c {{source}}");
        cc.outputs = list(&["{{source_out_dir}}/{{source_name_part}}.o"]);
        assert!(cc.set_complete().is_err());
    }

    #[test]
    fn runtime_outputs_must_be_subset() {
        let mut solink = Tool::create("solink", None).unwrap();
        solink.command = pattern("ld -shared -o {{output}} {{inputs}}");
        solink.outputs = list(&["{{output_dir}}/{{target_output_name}}.so"]);
        solink.runtime_outputs = list(&["{{output_dir}}/other.so"]);
        let err = solink.set_complete().unwrap_err();
        let gen = err.downcast_ref::<GenError>().unwrap();
        assert_eq!(gen.kind, ErrorKind::InvalidToolConfiguration);
    }

    #[test]
    fn rspfile_pairing_enforced() {
        let mut link = Tool::create("link", None).unwrap();
        link.command = pattern("ld -o {{output}} @{{output}}.rsp");
        link.outputs = list(&["{{output_dir}}/{{target_output_name}}"]);
        link.rspfile = pattern("{{output}}.rsp");
        assert!(link.set_complete().is_err());
    }

    #[test]
    fn msvc_depsformat_disallows_depfile() {
        let mut cc = Tool::create("cc", None).unwrap();
        cc.command = pattern("cl /c {{source}}");
        cc.outputs = list(&["{{source_out_dir}}/{{source_name_part}}.obj"]);
        cc.depfile = pattern("{{output}}.d");
        cc.as_c_mut().unwrap().depsformat = DepsFormat::Msvc;
        assert!(cc.set_complete().is_err());
    }

    #[test]
    fn bits_union_over_patterns() {
        let mut cc = Tool::create("cc", None).unwrap();
        cc.command = pattern("gcc {{defines}} {{cflags}} -c {{source}} -o {{output}}");
        cc.outputs = list(&["{{source_out_dir}}/{{source_name_part}}.o"]);
        cc.set_complete().unwrap();
        let bits = cc.substitution_bits();
        assert!(bits.has(SubstitutionType::Defines));
        assert!(bits.has(SubstitutionType::CFlags));
        assert!(bits.has(SubstitutionType::Source));
        assert!(bits.has(SubstitutionType::SourceOutDir));
        assert!(!bits.has(SubstitutionType::Libs));
    }

    #[test]
    fn source_type_mapping() {
        assert_eq!(Tool::tool_for_source_type(FileType::C), C_TOOL_CC);
        assert_eq!(Tool::tool_for_source_type(FileType::Cpp), C_TOOL_CXX);
        assert_eq!(Tool::tool_for_source_type(FileType::Rs), RUST_TOOL_BIN);
        assert_eq!(Tool::tool_for_source_type(FileType::O), TOOL_NONE);
        assert_eq!(Tool::tool_for_source_type(FileType::H), TOOL_NONE);
    }
}
