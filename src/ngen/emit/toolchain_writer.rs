//! Writes one rule file per used toolchain: a Ninja `rule` block for every
//! tool (except `action` and builtins), then the per-target build statements
//! sorted by label.

use std::sync::Arc;

use crate::core::settings::Settings;
use crate::core::substitution_writer::write_with_ninja_variables;
use crate::core::target::Target;
use crate::core::tool::{self, DepsFormat, Tool};
use crate::core::toolchain::Toolchain;
use crate::emit::target_writer;
use crate::util::errors::NgenResult;
use crate::util::paths::write_atomically_if_changed;

const INDENT: &str = "  ";

fn write_rule_pattern(out: &mut String, name: &str, pattern: &crate::core::substitution::SubstitutionPattern) {
    if pattern.is_empty() {
        return;
    }
    out.push_str(INDENT);
    out.push_str(name);
    out.push_str(" = ");
    out.push_str(&write_with_ninja_variables(pattern));
    out.push('\n');
}

fn write_tool_rule(out: &mut String, settings: &Settings, t: &Tool, rule_prefix: &str) {
    out.push_str("rule ");
    out.push_str(rule_prefix);
    out.push_str(t.name());
    out.push('\n');

    // Rules explicitly include shell commands, so the command is written
    // preformatted.
    out.push_str(INDENT);
    out.push_str("command = ");
    if !t.command_launcher.is_empty() {
        out.push_str(&t.command_launcher);
        out.push(' ');
    }
    out.push_str(&write_with_ninja_variables(&t.command));
    out.push('\n');

    write_rule_pattern(out, "description", &t.description);
    write_rule_pattern(out, "rspfile", &t.rspfile);
    write_rule_pattern(out, "rspfile_content", &t.rspfile_content);

    if let Some(c_tool) = t.as_c() {
        match c_tool.depsformat {
            DepsFormat::Gcc => {
                // GCC-style deps require a depfile.
                if !t.depfile.is_empty() {
                    write_rule_pattern(out, "depfile", &t.depfile);
                    out.push_str(INDENT);
                    out.push_str("deps = gcc\n");
                }
            }
            DepsFormat::Msvc => {
                // MSVC deps don't have a depfile.
                out.push_str(INDENT);
                out.push_str("deps = msvc\n");
            }
        }
    } else if !t.depfile.is_empty() {
        write_rule_pattern(out, "depfile", &t.depfile);
        out.push_str(INDENT);
        out.push_str("deps = gcc\n");
    }

    if let Some(pool) = &t.pool {
        let name = pool.get().get_ninja_name(settings.default_toolchain_label());
        out.push_str(INDENT);
        out.push_str("pool = ");
        out.push_str(&name);
        out.push('\n');
    }

    if t.restat {
        out.push_str(INDENT);
        out.push_str("restat = 1\n");
    }
}

/// Renders the toolchain file: rules, a separating blank line, and every
/// target's build statements (callers pass the targets pre-sorted by label
/// so the output is stable).
pub fn render(
    settings: &Settings,
    toolchain: &Toolchain,
    targets: &[Arc<Target>],
) -> NgenResult<String> {
    let rule_prefix = settings.ninja_rule_prefix();
    let mut out = String::new();

    for t in toolchain.tools() {
        if t.name() == tool::GENERAL_TOOL_ACTION || t.is_builtin() {
            continue;
        }
        write_tool_rule(&mut out, settings, t, &rule_prefix);
    }
    out.push('\n');

    for target in targets {
        out.push_str(&target_writer::write_target(target)?);
    }
    Ok(out)
}

/// Renders and writes `<build_dir>[/<toolchain subdir>]/toolchain.ninja`.
pub fn run_and_write_file(
    settings: &Settings,
    toolchain: &Toolchain,
    targets: &[Arc<Target>],
) -> NgenResult<()> {
    let contents = render(settings, toolchain, targets)?;
    let build_settings = settings.build_settings();
    let file = crate::core::source_file::SourceFile::new(&format!(
        "{}{}",
        build_settings.build_dir().value(),
        settings.ninja_file()
    ));
    let path = build_settings.get_full_path(&file);
    write_atomically_if_changed(&path, &contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::build_settings::BuildSettings;
    use crate::core::label::Label;
    use crate::core::source_dir::SourceDir;
    use crate::core::substitution::{SubstitutionList, SubstitutionPattern};

    fn settings() -> Settings {
        let mut bs = BuildSettings::default();
        bs.set_build_dir(SourceDir::new("//out/Debug/"));
        let tc = Label::new_with_no_toolchain(SourceDir::new("//tc/"), "default");
        Settings::new(std::sync::Arc::new(bs), tc, tc)
    }

    #[test]
    fn rule_block_layout() {
        let settings = settings();
        let tc_label = Label::new_with_no_toolchain(SourceDir::new("//tc/"), "default");
        let mut toolchain = Toolchain::new(tc_label, None);

        let mut cc = Tool::create("cc", None).unwrap();
        cc.command =
            SubstitutionPattern::parse("gcc {{defines}} -c {{source}} -o {{output}}", None)
                .unwrap();
        cc.depfile = SubstitutionPattern::parse("{{output}}.d", None).unwrap();
        cc.description = SubstitutionPattern::parse("CC {{output}}", None).unwrap();
        cc.outputs = SubstitutionList::parse(
            &["{{source_out_dir}}/{{source_name_part}}.o".to_string()],
            None,
        )
        .unwrap();
        toolchain.set_tool(cc).unwrap();
        toolchain.toolchain_setup_complete();

        let text = render(&settings, &toolchain, &[]).unwrap();
        assert!(text.contains("rule cc\n"));
        assert!(text.contains("  command = gcc ${defines} -c ${in} -o ${out}\n"));
        assert!(text.contains("  description = CC ${out}\n"));
        assert!(text.contains("  depfile = ${out}.d\n"));
        assert!(text.contains("  deps = gcc\n"));
        // The builtin phony tool gets no rule.
        assert!(!text.contains("rule phony"));
    }

    #[test]
    fn msvc_deps_have_no_depfile() {
        let settings = settings();
        let tc_label = Label::new_with_no_toolchain(SourceDir::new("//tc/"), "default");
        let mut toolchain = Toolchain::new(tc_label, None);

        let mut cc = Tool::create("cc", None).unwrap();
        cc.command = SubstitutionPattern::parse("cl /c {{source}}", None).unwrap();
        cc.outputs = SubstitutionList::parse(
            &["{{source_out_dir}}/{{source_name_part}}.obj".to_string()],
            None,
        )
        .unwrap();
        cc.as_c_mut().unwrap().depsformat = DepsFormat::Msvc;
        toolchain.set_tool(cc).unwrap();
        toolchain.toolchain_setup_complete();

        let text = render(&settings, &toolchain, &[]).unwrap();
        assert!(text.contains("  deps = msvc\n"));
        assert!(!text.contains("depfile"));
    }
}
