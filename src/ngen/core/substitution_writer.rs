//! Expansion of substitution patterns in the three contexts: per-source
//! (compiler), per-target (linker), and Ninja-variable emission for rule
//! blocks. Expansion is string-level; substituted values are never
//! re-parsed.

use crate::core::output_file::OutputFile;
use crate::core::settings::Settings;
use crate::core::source_file::SourceFile;
use crate::core::substitution::{
    SubstitutionPattern, SubstitutionSegment, SubstitutionType,
};
use crate::core::substitution::SubstitutionList;
use crate::core::target::Target;
use crate::core::tool::Tool;
use crate::util::errors::{ErrorKind, GenError, NgenResult};
use crate::util::paths::{normalize_logical, rebase_source_absolute};

/// Whether directory-flavored substitutions expand relative to the build
/// directory (tool outputs, command arguments) or to source-absolute form
/// (action/copy output declarations, which are then resolved as files).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputContext {
    BuildRelative,
    SourceAbsolute,
}

fn strip_trailing_slash(mut s: String) -> String {
    if s.len() > 1 && s.ends_with('/') {
        s.pop();
    }
    s
}

/// `obj/<label dir>/` for the target, inside the toolchain subdir.
pub fn build_dir_for_target(target: &Target, flavor: &str) -> String {
    let settings = target.settings();
    let dir = target.label().dir();
    debug_assert!(dir.is_source_absolute());
    format!(
        "{}{}/{}",
        settings.output_subdir(),
        flavor,
        &dir.value()[2..]
    )
}

/// `obj/<source dir>/` for one source file.
fn build_dir_for_source(settings: &Settings, source: &SourceFile, flavor: &str) -> String {
    let dir = source.get_dir();
    if dir.is_source_absolute() {
        format!(
            "{}{}/{}",
            settings.output_subdir(),
            flavor,
            &dir.value()[2..]
        )
    } else {
        // System-absolute sources bucket under a stable subdirectory.
        format!("{}{}/ABS_PATH{}", settings.output_subdir(), flavor, dir.value())
    }
}

fn source_absolute(settings: &Settings, build_relative: &str) -> String {
    format!(
        "{}{}",
        settings.build_settings().build_dir().value(),
        build_relative
    )
}

/// The `{{output_dir}}` value for a target: the explicit override, else the
/// tool's default_output_dir pattern, else the target's obj directory.
pub fn get_output_dir_for_target(target: &Target, tool: &Tool) -> NgenResult<String> {
    if let Some(dir) = &target.output_dir {
        // The override is source-absolute; emission wants build-relative.
        let build_dir = target.settings().build_settings().build_dir().value();
        let value = dir.value();
        match value.strip_prefix(build_dir) {
            Some(rest) => return Ok(strip_trailing_slash(rest.to_string())),
            None => {
                return Err(GenError::new(
                    ErrorKind::InvalidPath,
                    format!(
                        "output_dir {} of {} is not inside the build directory",
                        value,
                        target.label().get_user_visible_name(false)
                    ),
                )
                .at(target.defined_from().cloned())
                .into())
            }
        }
    }
    if !tool.default_output_dir.is_empty() {
        let expanded = apply_pattern_to_linker(target, tool, &tool.default_output_dir)?;
        return Ok(strip_trailing_slash(expanded));
    }
    Ok(strip_trailing_slash(build_dir_for_target(target, "obj")))
}

fn get_output_extension_for_target(target: &Target, tool: &Tool) -> String {
    match &target.output_extension {
        Some(ext) if ext.is_empty() => String::new(),
        Some(ext) => format!(".{}", ext.trim_start_matches('.')),
        None => tool.default_output_extension.clone(),
    }
}

/// Substitutions derivable from the target and toolchain alone.
fn get_target_substitution(
    target: &Target,
    tool: &Tool,
    sub_type: SubstitutionType,
    context: OutputContext,
) -> NgenResult<Option<String>> {
    let settings = target.settings();
    let relative = |s: String| -> String { strip_trailing_slash(s) };
    let value = match sub_type {
        SubstitutionType::Label => target.label().get_user_visible_name(false),
        SubstitutionType::LabelName => target.label().name().to_string(),
        SubstitutionType::LabelNoToolchain => {
            target.label().get_with_no_toolchain().get_user_visible_name(false)
        }
        SubstitutionType::RootGenDir => relative(format!("{}gen", settings.output_subdir())),
        SubstitutionType::RootOutDir => {
            let subdir = strip_trailing_slash(settings.output_subdir().to_string());
            if subdir.is_empty() {
                ".".to_string()
            } else {
                subdir
            }
        }
        SubstitutionType::TargetGenDir => relative(build_dir_for_target(target, "gen")),
        SubstitutionType::TargetOutDir => relative(build_dir_for_target(target, "obj")),
        SubstitutionType::TargetOutputName => target.computed_output_name(),
        SubstitutionType::OutputDir => get_output_dir_for_target(target, tool)?,
        SubstitutionType::OutputExtension => get_output_extension_for_target(target, tool),
        _ => return Ok(None),
    };
    let value = match (context, sub_type) {
        (
            OutputContext::SourceAbsolute,
            SubstitutionType::RootGenDir
            | SubstitutionType::RootOutDir
            | SubstitutionType::TargetGenDir
            | SubstitutionType::TargetOutDir
            | SubstitutionType::OutputDir,
        ) => {
            if value == "." {
                strip_trailing_slash(
                    settings.build_settings().build_dir().value().to_string(),
                )
            } else {
                source_absolute(settings, &value)
            }
        }
        _ => value,
    };
    Ok(Some(value))
}

/// Substitutions bound to one source file.
fn get_source_substitution(
    target: &Target,
    source: &SourceFile,
    sub_type: SubstitutionType,
    context: OutputContext,
) -> NgenResult<Option<String>> {
    let settings = target.settings();
    let build_dir = settings.build_settings().build_dir().value();
    let value = match sub_type {
        SubstitutionType::Source => {
            if source.is_source_absolute() {
                rebase_source_absolute(source.actual_path(), build_dir)
            } else {
                source.value().to_string()
            }
        }
        SubstitutionType::SourceNamePart => {
            let name = source.get_name();
            match name.rfind('.') {
                Some(idx) if idx > 0 => name[..idx].to_string(),
                _ => name.to_string(),
            }
        }
        SubstitutionType::SourceFilePart => source.get_name().to_string(),
        SubstitutionType::SourceDir => {
            let dir = source.get_dir();
            if dir.is_source_absolute() {
                strip_trailing_slash(rebase_source_absolute(dir.actual_path(), build_dir))
            } else {
                strip_trailing_slash(dir.value().to_string())
            }
        }
        SubstitutionType::SourceRootRelativeDir => {
            let dir = source.get_dir();
            if dir.is_source_absolute() {
                strip_trailing_slash(dir.value()[2..].to_string())
            } else {
                strip_trailing_slash(dir.value().to_string())
            }
        }
        SubstitutionType::SourceGenDir => {
            strip_trailing_slash(build_dir_for_source(settings, source, "gen"))
        }
        SubstitutionType::SourceOutDir => {
            strip_trailing_slash(build_dir_for_source(settings, source, "obj"))
        }
        _ => return Ok(None),
    };
    let value = match (context, sub_type) {
        (
            OutputContext::SourceAbsolute,
            SubstitutionType::SourceGenDir | SubstitutionType::SourceOutDir,
        ) => source_absolute(settings, &value),
        _ => value,
    };
    Ok(Some(value))
}

fn unsupported(sub_type: SubstitutionType, target: &Target) -> anyhow::Error {
    GenError::new(
        ErrorKind::InvalidPlaceholder,
        format!(
            "{{{{{}}}}} cannot be expanded in this context for {}",
            sub_type.name(),
            target.label().get_user_visible_name(false)
        ),
    )
    .at(target.defined_from().cloned())
    .into()
}

fn apply_pattern(
    target: &Target,
    tool: &Tool,
    pattern: &SubstitutionPattern,
    source: Option<&SourceFile>,
    context: OutputContext,
) -> NgenResult<String> {
    let mut out = String::new();
    for segment in pattern.segments() {
        match segment {
            SubstitutionSegment::Literal(s) => out.push_str(s),
            SubstitutionSegment::Placeholder(t) => {
                if let Some(value) = get_target_substitution(target, tool, *t, context)? {
                    out.push_str(&value);
                    continue;
                }
                if let Some(source) = source {
                    if let Some(value) = get_source_substitution(target, source, *t, context)? {
                        out.push_str(&value);
                        continue;
                    }
                }
                return Err(unsupported(*t, target));
            }
        }
    }
    Ok(out)
}

/// The tool-independent target-context substitutions, for per-statement
/// variable bindings in the rule files. Returns `None` for substitutions
/// that need a tool or source binding.
pub fn get_target_context_value(target: &Target, t: SubstitutionType) -> Option<String> {
    match t {
        SubstitutionType::Label
        | SubstitutionType::LabelName
        | SubstitutionType::LabelNoToolchain
        | SubstitutionType::RootGenDir
        | SubstitutionType::RootOutDir
        | SubstitutionType::TargetGenDir
        | SubstitutionType::TargetOutDir
        | SubstitutionType::TargetOutputName => {
            // These never consult the tool; any tool works for expansion, so
            // reuse the shared lookup with a null context.
            let phony = Tool::new_builtin_phony();
            get_target_substitution(target, &phony, t, OutputContext::BuildRelative)
                .ok()
                .flatten()
        }
        _ => None,
    }
}

// -----------------------------------------------------------------------------
// Linker (per-target) context

pub fn apply_pattern_to_linker(
    target: &Target,
    tool: &Tool,
    pattern: &SubstitutionPattern,
) -> NgenResult<String> {
    apply_pattern(target, tool, pattern, None, OutputContext::BuildRelative)
}

pub fn apply_pattern_to_linker_as_output_file(
    target: &Target,
    tool: &Tool,
    pattern: &SubstitutionPattern,
) -> NgenResult<OutputFile> {
    Ok(OutputFile::new(&apply_pattern_to_linker(target, tool, pattern)?))
}

pub fn apply_list_to_linker_as_output_file(
    target: &Target,
    tool: &Tool,
    list: &SubstitutionList,
) -> NgenResult<Vec<OutputFile>> {
    list.list()
        .iter()
        .map(|p| apply_pattern_to_linker_as_output_file(target, tool, p))
        .collect()
}

// -----------------------------------------------------------------------------
// Compiler (per-source) context

pub fn apply_pattern_to_compiler_as_output_file(
    target: &Target,
    tool: &Tool,
    source: &SourceFile,
    pattern: &SubstitutionPattern,
) -> NgenResult<OutputFile> {
    let expanded = apply_pattern(
        target,
        tool,
        pattern,
        Some(source),
        OutputContext::BuildRelative,
    )?;
    Ok(OutputFile::new(&expanded))
}

pub fn apply_list_to_compiler_as_output_file(
    target: &Target,
    tool: &Tool,
    source: &SourceFile,
    list: &SubstitutionList,
) -> NgenResult<Vec<OutputFile>> {
    list.list()
        .iter()
        .map(|p| apply_pattern_to_compiler_as_output_file(target, tool, source, p))
        .collect()
}

// -----------------------------------------------------------------------------
// Action/copy output declarations (source-absolute results)

/// Expands one declared output of an action/copy/generated_file target,
/// optionally bound to a source (action_foreach, copy). The expansion is
/// resolved against the target's directory, producing a source-absolute
/// file.
pub fn apply_output_pattern_as_source_file(
    target: &Target,
    tool: &Tool,
    source: Option<&SourceFile>,
    pattern: &SubstitutionPattern,
) -> NgenResult<SourceFile> {
    let expanded = apply_pattern(target, tool, pattern, source, OutputContext::SourceAbsolute)?;
    if expanded.starts_with("//") || expanded.starts_with('/') {
        Ok(SourceFile::new(&normalize_logical(&expanded)))
    } else {
        target
            .label()
            .dir()
            .resolve_relative_file(&expanded, target.defined_from().cloned())
    }
}

pub fn apply_output_list_as_source_files(
    target: &Target,
    tool: &Tool,
    source: Option<&SourceFile>,
    list: &SubstitutionList,
) -> NgenResult<Vec<SourceFile>> {
    list.list()
        .iter()
        .map(|p| apply_output_pattern_as_source_file(target, tool, source, p))
        .collect()
}

// -----------------------------------------------------------------------------
// Ninja rule emission

/// Renders a pattern with `${var}` placeholders for everything that varies
/// per build statement. Literal text gets command-level escaping (`$` is
/// doubled; commands are otherwise preformatted).
pub fn write_with_ninja_variables(pattern: &SubstitutionPattern) -> String {
    let mut out = String::new();
    for segment in pattern.segments() {
        match segment {
            SubstitutionSegment::Literal(s) => out.push_str(&s.replace('$', "$$")),
            SubstitutionSegment::Placeholder(t) => {
                out.push_str("${");
                out.push_str(t.ninja_var());
                out.push('}');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::build_settings::BuildSettings;
    use crate::core::label::Label;
    use crate::core::source_dir::SourceDir;
    use crate::core::target::OutputType;
    use std::sync::Arc;

    fn make_target() -> Target {
        let mut bs = BuildSettings::default();
        bs.set_build_dir(SourceDir::new("//out/Debug/"));
        let tc = Label::new_with_no_toolchain(SourceDir::new("//tc/"), "default");
        let settings = Arc::new(Settings::new(Arc::new(bs), tc, tc));
        let mut target = Target::new(
            Label::new(SourceDir::new("//foo/bar/"), "baz", SourceDir::new("//tc/"), "default"),
            None,
        );
        target.output_type = OutputType::Executable;
        target.settings = Some(settings);
        target
    }

    fn link_tool() -> Tool {
        let mut tool = Tool::create("link", None).unwrap();
        tool.command = SubstitutionPattern::parse("ld -o {{output}} {{inputs}}", None).unwrap();
        tool.outputs = SubstitutionList::parse(
            &["{{output_dir}}/{{target_output_name}}{{output_extension}}".to_string()],
            None,
        )
        .unwrap();
        tool.set_complete().unwrap();
        tool
    }

    #[test]
    fn linker_output_expansion() {
        let target = make_target();
        let tool = link_tool();
        let out = apply_pattern_to_linker_as_output_file(
            &target,
            &tool,
            &tool.outputs.list()[0],
        )
        .unwrap();
        assert_eq!(out.value(), "obj/foo/bar/baz");
    }

    #[test]
    fn compiler_source_expansion() {
        let target = make_target();
        let tool = link_tool();
        let source = SourceFile::new("//foo/bar/main.cc");
        let pattern =
            SubstitutionPattern::parse("{{source_out_dir}}/{{source_name_part}}.o", None).unwrap();
        let out =
            apply_pattern_to_compiler_as_output_file(&target, &tool, &source, &pattern).unwrap();
        assert_eq!(out.value(), "obj/foo/bar/main.o");
    }

    #[test]
    fn source_rebasing() {
        let target = make_target();
        let tool = link_tool();
        let source = SourceFile::new("//foo/bar/main.cc");
        let pattern = SubstitutionPattern::parse("{{source}}", None).unwrap();
        let expanded = apply_pattern(
            &target,
            &tool,
            &pattern,
            Some(&source),
            OutputContext::BuildRelative,
        )
        .unwrap();
        assert_eq!(expanded, "../../foo/bar/main.cc");
    }

    #[test]
    fn action_outputs_are_source_absolute() {
        let target = make_target();
        let tool = link_tool();
        let pattern =
            SubstitutionPattern::parse("{{target_gen_dir}}/generated.h", None).unwrap();
        let file =
            apply_output_pattern_as_source_file(&target, &tool, None, &pattern).unwrap();
        assert_eq!(file.value(), "//out/Debug/gen/foo/bar/generated.h");
    }

    #[test]
    fn ninja_variable_rendering() {
        let pattern =
            SubstitutionPattern::parse("gcc {{cflags}} -c {{source}} -o {{output}}", None).unwrap();
        assert_eq!(
            write_with_ninja_variables(&pattern),
            "gcc ${cflags} -c ${in} -o ${out}"
        );
    }
}
