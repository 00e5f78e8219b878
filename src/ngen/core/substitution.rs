use std::fmt;

use crate::util::errors::{ErrorKind, GenError, Location, NgenResult};

/// The closed placeholder vocabulary. Each value is a `{{name}}` token in
/// tool commands and output patterns, resolved at emission time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum SubstitutionType {
    // Valid on any tool.
    Label,
    LabelName,
    LabelNoToolchain,
    Output,
    OutputDir,
    OutputExtension,
    RootGenDir,
    RootOutDir,
    TargetGenDir,
    TargetOutDir,
    TargetOutputName,
    ResponseFileName,

    // Valid for compiler tools, bound to one source file.
    Source,
    SourceNamePart,
    SourceFilePart,
    SourceDir,
    SourceRootRelativeDir,
    SourceGenDir,
    SourceOutDir,

    // C-family compiler flags.
    AsmFlags,
    CFlags,
    CFlagsC,
    CFlagsCc,
    CFlagsObjC,
    CFlagsObjCc,
    Defines,
    IncludeDirs,
    ModuleDeps,
    ModuleDepsNoSelf,

    // Linker tools.
    LinkerInputs,
    LinkerInputsNewline,
    LdFlags,
    Libs,
    SoLibs,
    RLibs,
    Frameworks,
    SwiftModules,

    // Static library tool.
    ArFlags,

    // Rust tools.
    CrateName,
    CrateType,
    Externs,
    RustDeps,
    RustEnv,
    RustFlags,

    // Swift tools.
    SwiftModuleName,
    SwiftModuleDirs,
    SwiftFlags,

    // Bundle / asset-catalog tools.
    BundleProductType,
    BundlePartialInfoPlist,
    XcassetCompilerFlags,
}

use SubstitutionType::*;

pub const ALL_SUBSTITUTIONS: &[SubstitutionType] = &[
    Label,
    LabelName,
    LabelNoToolchain,
    Output,
    OutputDir,
    OutputExtension,
    RootGenDir,
    RootOutDir,
    TargetGenDir,
    TargetOutDir,
    TargetOutputName,
    ResponseFileName,
    Source,
    SourceNamePart,
    SourceFilePart,
    SourceDir,
    SourceRootRelativeDir,
    SourceGenDir,
    SourceOutDir,
    AsmFlags,
    CFlags,
    CFlagsC,
    CFlagsCc,
    CFlagsObjC,
    CFlagsObjCc,
    Defines,
    IncludeDirs,
    ModuleDeps,
    ModuleDepsNoSelf,
    LinkerInputs,
    LinkerInputsNewline,
    LdFlags,
    Libs,
    SoLibs,
    RLibs,
    Frameworks,
    SwiftModules,
    ArFlags,
    CrateName,
    CrateType,
    Externs,
    RustDeps,
    RustEnv,
    RustFlags,
    SwiftModuleName,
    SwiftModuleDirs,
    SwiftFlags,
    BundleProductType,
    BundlePartialInfoPlist,
    XcassetCompilerFlags,
];

impl SubstitutionType {
    /// The name as written between braces: `source` for `{{source}}`.
    pub fn name(self) -> &'static str {
        match self {
            Label => "label",
            LabelName => "label_name",
            LabelNoToolchain => "label_no_toolchain",
            Output => "output",
            OutputDir => "output_dir",
            OutputExtension => "output_extension",
            RootGenDir => "root_gen_dir",
            RootOutDir => "root_out_dir",
            TargetGenDir => "target_gen_dir",
            TargetOutDir => "target_out_dir",
            TargetOutputName => "target_output_name",
            ResponseFileName => "response_file_name",
            Source => "source",
            SourceNamePart => "source_name_part",
            SourceFilePart => "source_file_part",
            SourceDir => "source_dir",
            SourceRootRelativeDir => "source_root_relative_dir",
            SourceGenDir => "source_gen_dir",
            SourceOutDir => "source_out_dir",
            AsmFlags => "asmflags",
            CFlags => "cflags",
            CFlagsC => "cflags_c",
            CFlagsCc => "cflags_cc",
            CFlagsObjC => "cflags_objc",
            CFlagsObjCc => "cflags_objcc",
            Defines => "defines",
            IncludeDirs => "include_dirs",
            ModuleDeps => "module_deps",
            ModuleDepsNoSelf => "module_deps_no_self",
            LinkerInputs => "inputs",
            LinkerInputsNewline => "inputs_newline",
            LdFlags => "ldflags",
            Libs => "libs",
            SoLibs => "solibs",
            RLibs => "rlibs",
            Frameworks => "frameworks",
            SwiftModules => "swiftmodules",
            ArFlags => "arflags",
            CrateName => "crate_name",
            CrateType => "crate_type",
            Externs => "externs",
            RustDeps => "rustdeps",
            RustEnv => "rustenv",
            RustFlags => "rustflags",
            SwiftModuleName => "module_name",
            SwiftModuleDirs => "module_dirs",
            SwiftFlags => "swiftflags",
            BundleProductType => "bundle_product_type",
            BundlePartialInfoPlist => "bundle_partial_info_plist",
            XcassetCompilerFlags => "xcasset_compiler_flags",
        }
    }

    pub fn from_name(name: &str) -> Option<SubstitutionType> {
        ALL_SUBSTITUTIONS.iter().copied().find(|t| t.name() == name)
    }

    /// The Ninja variable a rule references for this substitution. `source`
    /// and the linker inputs map to ninja's implicit `in`; `output` to `out`.
    pub fn ninja_var(self) -> &'static str {
        match self {
            Source | LinkerInputs => "in",
            LinkerInputsNewline => "in_newline",
            Output => "out",
            ResponseFileName => "rspfile",
            other => other.name(),
        }
    }

    fn bit(self) -> u64 {
        1u64 << (self as u8)
    }
}

/// Valid in any tool: values derivable from the target and toolchain alone.
pub fn is_valid_tool_substitution(t: SubstitutionType) -> bool {
    matches!(
        t,
        Label
            | LabelName
            | LabelNoToolchain
            | Output
            | OutputDir
            | OutputExtension
            | RootGenDir
            | RootOutDir
            | TargetGenDir
            | TargetOutDir
            | TargetOutputName
            | ResponseFileName
    )
}

fn is_valid_source_substitution(t: SubstitutionType) -> bool {
    matches!(
        t,
        Source
            | SourceNamePart
            | SourceFilePart
            | SourceDir
            | SourceRootRelativeDir
            | SourceGenDir
            | SourceOutDir
    )
}

pub fn is_valid_compiler_substitution(t: SubstitutionType) -> bool {
    is_valid_tool_substitution(t)
        || is_valid_source_substitution(t)
        || matches!(
            t,
            AsmFlags
                | CFlags
                | CFlagsC
                | CFlagsCc
                | CFlagsObjC
                | CFlagsObjCc
                | Defines
                | IncludeDirs
                | ModuleDeps
                | ModuleDepsNoSelf
        )
}

pub fn is_valid_compiler_outputs_substitution(t: SubstitutionType) -> bool {
    (is_valid_tool_substitution(t) && t != Output) || is_valid_source_substitution(t)
}

pub fn is_valid_linker_substitution(t: SubstitutionType) -> bool {
    is_valid_tool_substitution(t)
        || matches!(
            t,
            LinkerInputs
                | LinkerInputsNewline
                | LdFlags
                | Libs
                | SoLibs
                | RLibs
                | Frameworks
                | SwiftModules
        )
}

pub fn is_valid_linker_outputs_substitution(t: SubstitutionType) -> bool {
    is_valid_tool_substitution(t) && t != Output
}

pub fn is_valid_alink_substitution(t: SubstitutionType) -> bool {
    is_valid_tool_substitution(t) || matches!(t, LinkerInputs | LinkerInputsNewline | ArFlags)
}

pub fn is_valid_copy_substitution(t: SubstitutionType) -> bool {
    is_valid_tool_substitution(t) || t == Source
}

pub fn is_valid_compile_xcassets_substitution(t: SubstitutionType) -> bool {
    is_valid_tool_substitution(t)
        || matches!(
            t,
            LinkerInputs | BundleProductType | BundlePartialInfoPlist | XcassetCompilerFlags
        )
}

pub fn is_valid_rust_substitution(t: SubstitutionType) -> bool {
    is_valid_tool_substitution(t)
        || is_valid_source_substitution(t)
        || matches!(
            t,
            CrateName
                | CrateType
                | Externs
                | RustDeps
                | RustEnv
                | RustFlags
                | LinkerInputs
                | LinkerInputsNewline
                | LdFlags
                | Libs
                | SoLibs
                | RLibs
                | Frameworks
                | SwiftModules
        )
}

pub fn is_valid_rust_linker_outputs_substitution(t: SubstitutionType) -> bool {
    is_valid_linker_outputs_substitution(t) || t == CrateName
}

pub fn is_valid_swift_substitution(t: SubstitutionType) -> bool {
    is_valid_tool_substitution(t)
        || is_valid_source_substitution(t)
        || matches!(
            t,
            SwiftModuleName | SwiftModuleDirs | SwiftFlags | ModuleDeps | ModuleDepsNoSelf
                | Defines | IncludeDirs | LinkerInputs
        )
}

/// Which substitutions a pattern set requires, as a bitset. Merged across a
/// tool's patterns at `set_complete()` time and across a toolchain's tools at
/// setup-complete time.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct SubstitutionBits(u64);

impl SubstitutionBits {
    pub fn set(&mut self, t: SubstitutionType) {
        self.0 |= t.bit();
    }

    pub fn has(&self, t: SubstitutionType) -> bool {
        self.0 & t.bit() != 0
    }

    pub fn merge_from(&mut self, other: &SubstitutionBits) {
        self.0 |= other.0;
    }

    pub fn iter(&self) -> impl Iterator<Item = SubstitutionType> + '_ {
        ALL_SUBSTITUTIONS.iter().copied().filter(|t| self.has(*t))
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum SubstitutionSegment {
    Literal(String),
    Placeholder(SubstitutionType),
}

/// A tool command or output pattern: a sequence of literal and placeholder
/// segments, parsed once from the `{{...}}` form.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SubstitutionPattern {
    segments: Vec<SubstitutionSegment>,
    origin: Option<Location>,
}

impl SubstitutionPattern {
    pub fn parse(input: &str, origin: Option<Location>) -> NgenResult<SubstitutionPattern> {
        let mut segments = Vec::new();
        let mut rest = input;
        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(SubstitutionSegment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 2..];
            let close = after.find("}}").ok_or_else(|| {
                anyhow::Error::from(
                    GenError::new(
                        ErrorKind::InvalidPlaceholder,
                        format!("unterminated substitution in \"{}\"", input),
                    )
                    .at(origin.clone()),
                )
            })?;
            let name = &after[..close];
            let sub_type = SubstitutionType::from_name(name).ok_or_else(|| {
                anyhow::Error::from(
                    GenError::new(
                        ErrorKind::InvalidPlaceholder,
                        format!("unknown substitution \"{{{{{}}}}}\"", name),
                    )
                    .at(origin.clone()),
                )
            })?;
            segments.push(SubstitutionSegment::Placeholder(sub_type));
            rest = &after[close + 2..];
        }
        if !rest.is_empty() {
            segments.push(SubstitutionSegment::Literal(rest.to_string()));
        }
        Ok(SubstitutionPattern { segments, origin })
    }

    pub fn literal(s: &str) -> SubstitutionPattern {
        SubstitutionPattern {
            segments: vec![SubstitutionSegment::Literal(s.to_string())],
            origin: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[SubstitutionSegment] {
        &self.segments
    }

    pub fn origin(&self) -> Option<&Location> {
        self.origin.as_ref()
    }

    /// The distinct placeholder types this pattern uses.
    pub fn required_types(&self) -> Vec<SubstitutionType> {
        let mut bits = SubstitutionBits::default();
        self.fill_required_types(&mut bits);
        bits.iter().collect()
    }

    pub fn fill_required_types(&self, bits: &mut SubstitutionBits) {
        for segment in &self.segments {
            if let SubstitutionSegment::Placeholder(t) = segment {
                bits.set(*t);
            }
        }
    }

    /// Re-renders the original `{{...}}` form.
    pub fn as_string(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                SubstitutionSegment::Literal(s) => out.push_str(s),
                SubstitutionSegment::Placeholder(t) => {
                    out.push_str("{{");
                    out.push_str(t.name());
                    out.push_str("}}");
                }
            }
        }
        out
    }
}

impl fmt::Debug for SubstitutionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubstitutionPattern({})", self.as_string())
    }
}

/// An ordered list of patterns, e.g. a tool's `outputs`.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct SubstitutionList {
    list: Vec<SubstitutionPattern>,
}

impl SubstitutionList {
    pub fn parse(inputs: &[String], origin: Option<Location>) -> NgenResult<SubstitutionList> {
        let mut list = Vec::with_capacity(inputs.len());
        for input in inputs {
            list.push(SubstitutionPattern::parse(input, origin.clone())?);
        }
        Ok(SubstitutionList { list })
    }

    pub fn from_patterns(list: Vec<SubstitutionPattern>) -> SubstitutionList {
        SubstitutionList { list }
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn list(&self) -> &[SubstitutionPattern] {
        &self.list
    }

    pub fn required_types(&self) -> Vec<SubstitutionType> {
        let mut bits = SubstitutionBits::default();
        self.fill_required_types(&mut bits);
        bits.iter().collect()
    }

    pub fn fill_required_types(&self, bits: &mut SubstitutionBits) {
        for pattern in &self.list {
            pattern.fill_required_types(bits);
        }
    }

    /// Whether any pattern in the list has exactly these segments.
    pub fn contains_pattern(&self, pattern: &SubstitutionPattern) -> bool {
        self.list.iter().any(|p| p.segments == pattern.segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        for input in [
            "gcc -c {{source}} -o {{output}}",
            "{{output_dir}}/{{target_output_name}}{{output_extension}}",
            "plain literal",
            "{{source}}",
        ] {
            let pattern = SubstitutionPattern::parse(input, None).unwrap();
            assert_eq!(pattern.as_string(), input);
        }
    }

    #[test]
    fn unknown_placeholder_rejected() {
        let err = SubstitutionPattern::parse("{{bogus}}", None).unwrap_err();
        let gen = err.downcast_ref::<GenError>().unwrap();
        assert_eq!(gen.kind, ErrorKind::InvalidPlaceholder);

        assert!(SubstitutionPattern::parse("{{source", None).is_err());
    }

    #[test]
    fn required_types_deduplicate() {
        let pattern =
            SubstitutionPattern::parse("{{source}} {{cflags}} {{source}}", None).unwrap();
        assert_eq!(pattern.required_types(), vec![Source, CFlags]);
    }

    #[test]
    fn domain_checks() {
        assert!(is_valid_compiler_substitution(Source));
        assert!(!is_valid_linker_substitution(Source));
        assert!(is_valid_linker_substitution(Libs));
        assert!(!is_valid_compiler_substitution(Libs));
        assert!(is_valid_copy_substitution(Source));
        assert!(!is_valid_copy_substitution(CFlags));
        assert!(is_valid_tool_substitution(Label));
        assert!(is_valid_rust_substitution(Externs));
        assert!(!is_valid_compiler_substitution(Externs));
    }

    #[test]
    fn bits_merge() {
        let mut a = SubstitutionBits::default();
        a.set(Source);
        let mut b = SubstitutionBits::default();
        b.set(Output);
        a.merge_from(&b);
        assert!(a.has(Source) && a.has(Output));
        assert_eq!(a.iter().count(), 2);
    }
}
