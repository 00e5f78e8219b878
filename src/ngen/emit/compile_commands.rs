//! Writes `compile_commands.json` for the targets matching the
//! `export_compile_commands` patterns: one entry per compiled C-family
//! source.

use std::sync::Arc;

use serde::Serialize;

use crate::core::build_settings::BuildSettings;
use crate::core::label_pattern::LabelPattern;
use crate::core::resolve;
use crate::core::source_file::SourceFile;
use crate::core::substitution::{SubstitutionSegment, SubstitutionType};
use crate::core::target::Target;
use crate::core::tool;
use crate::emit::path_output::PathOutput;
use crate::emit::target_writer;
use crate::util::errors::NgenResult;
use crate::util::paths::write_atomically_if_changed;

#[derive(Serialize)]
struct Entry {
    file: String,
    directory: String,
    command: String,
}

/// Expands a compile tool's command for one concrete source, substituting
/// real values where the ninja rule would use `${vars}`.
fn expand_command(
    target: &Arc<Target>,
    source: &SourceFile,
    tool_name: &str,
    outputs: &[crate::core::output_file::OutputFile],
    path: &PathOutput,
) -> Option<String> {
    let toolchain = target.toolchain.as_ref()?;
    let compile_tool = toolchain.get_tool(tool_name)?;

    let mut command = String::new();
    if !compile_tool.command_launcher.is_empty() {
        command.push_str(&compile_tool.command_launcher);
        command.push(' ');
    }
    for segment in compile_tool.command.segments() {
        match segment {
            SubstitutionSegment::Literal(s) => command.push_str(s),
            SubstitutionSegment::Placeholder(t) => {
                let value = match t {
                    SubstitutionType::Source => path.source_file_str(source),
                    SubstitutionType::Output => outputs
                        .first()
                        .map(|o| path.output_file_str(o))
                        .unwrap_or_default(),
                    SubstitutionType::Defines => target_writer::defines_value(target),
                    SubstitutionType::IncludeDirs => target_writer::include_dirs_value(target),
                    SubstitutionType::AsmFlags => {
                        target_writer::flags_value(target, |v| &v.asmflags)
                    }
                    SubstitutionType::CFlags => target_writer::flags_value(target, |v| &v.cflags),
                    SubstitutionType::CFlagsC => {
                        target_writer::flags_value(target, |v| &v.cflags_c)
                    }
                    SubstitutionType::CFlagsCc => {
                        target_writer::flags_value(target, |v| &v.cflags_cc)
                    }
                    SubstitutionType::CFlagsObjC => {
                        target_writer::flags_value(target, |v| &v.cflags_objc)
                    }
                    SubstitutionType::CFlagsObjCc => {
                        target_writer::flags_value(target, |v| &v.cflags_objcc)
                    }
                    other => {
                        // Target-scoped values expand the same way as in
                        // output computation.
                        match crate::core::substitution_writer::apply_pattern_to_linker(
                            target,
                            compile_tool,
                            &crate::core::substitution::SubstitutionPattern::parse(
                                &format!("{{{{{}}}}}", other.name()),
                                None,
                            )
                            .ok()?,
                        ) {
                            Ok(v) => v,
                            Err(_) => return None,
                        }
                    }
                };
                command.push_str(&value);
            }
        }
    }
    Some(command)
}

pub fn render_json(
    build_settings: &BuildSettings,
    all_targets: &[Arc<Target>],
    patterns: &[LabelPattern],
) -> NgenResult<String> {
    let path = PathOutput::new(build_settings);
    let directory = build_settings
        .get_full_path_dir(build_settings.build_dir())
        .to_string_lossy()
        .trim_end_matches('/')
        .to_string();

    let mut entries = Vec::new();
    for target in all_targets {
        if !target.is_binary() {
            continue;
        }
        if !patterns.iter().any(|p| p.matches(target.label())) {
            continue;
        }
        for source in &target.sources {
            let Some((tool_name, outputs)) = resolve::get_outputs_for_source(target, source)?
            else {
                continue;
            };
            if tool_name == tool::TOOL_NONE {
                continue;
            }
            let Some(command) = expand_command(target, source, tool_name, &outputs, &path) else {
                continue;
            };
            entries.push(Entry {
                file: path.source_file_str(source),
                directory: directory.clone(),
                command,
            });
        }
    }

    let mut json = serde_json::to_string_pretty(&entries).expect("entries serialize");
    json.push('\n');
    Ok(json)
}

/// Writes `<build_dir>/compile_commands.json` when any pattern matched.
pub fn run_and_write_files(
    build_settings: &BuildSettings,
    all_targets: &[Arc<Target>],
    patterns: &[LabelPattern],
) -> NgenResult<()> {
    if patterns.is_empty() {
        return Ok(());
    }
    let contents = render_json(build_settings, all_targets, patterns)?;
    let file = SourceFile::new(&format!(
        "{}compile_commands.json",
        build_settings.build_dir().value()
    ));
    write_atomically_if_changed(&build_settings.get_full_path(&file), &contents)?;
    Ok(())
}
