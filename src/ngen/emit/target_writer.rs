//! Per-target build statements for the toolchain rule files: per-source
//! compiles and links for C-family binaries, per-crate compiles for Rust,
//! copy/action statements, and stamp (or phony) aggregation for everything
//! else.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::core::config::ConfigValues;
use crate::core::label::Label;
use crate::core::output_file::OutputFile;
use crate::core::resolve;
use crate::core::source_file::FileType;
use crate::core::substitution::{SubstitutionSegment, SubstitutionType};
use crate::core::substitution_writer as subst;
use crate::core::target::{CrateType, DepsIterationType, OutputType, Target};
use crate::core::tool::{self, Tool};
use crate::emit::escape::{command_arg_escape, ninja_command_escape};
use crate::emit::path_output::PathOutput;
use crate::util::errors::{ErrorKind, GenError, NgenResult};

const INDENT: &str = "  ";

/// Everything contributing to a final link, collected over the dep graph.
#[derive(Default)]
struct LinkDeps {
    /// Objects from source_sets plus static/rust library files, in
    /// dependency order.
    link_inputs: Vec<OutputFile>,
    /// Shared libraries: linked against but not re-examined.
    solibs: Vec<OutputFile>,
    /// Dependency outputs of non-linkable deps, for order-only edges.
    order_only: Vec<OutputFile>,
}

fn collect_link_deps(target: &Target, deps: &mut LinkDeps, seen: &mut HashSet<Label>) {
    for pair in target.deps(DepsIterationType::Linked) {
        let dep = pair.get();
        if !seen.insert(*dep.label()) {
            continue;
        }
        match dep.output_type {
            OutputType::StaticLibrary | OutputType::RustLibrary => {
                if let Some(out) = dep.link_output_file {
                    deps.link_inputs.push(out);
                }
                if !dep.complete_static_lib {
                    collect_link_deps(dep, deps, seen);
                }
            }
            OutputType::SharedLibrary | OutputType::RustProcMacro => {
                if let Some(out) = dep.link_output_file {
                    deps.solibs.push(out);
                }
                // Shared libraries encapsulate their own deps.
            }
            OutputType::SourceSet => {
                for source in &dep.sources {
                    if let Ok(Some((_, outputs))) = resolve::get_outputs_for_source(dep, source) {
                        deps.link_inputs.extend(outputs);
                    }
                }
                if let Some(out) = dep.dependency_output_file {
                    deps.order_only.push(out);
                }
                collect_link_deps(dep, deps, seen);
            }
            OutputType::Group => {
                if let Some(out) = dep.dependency_output_file {
                    deps.order_only.push(out);
                }
                collect_link_deps(dep, deps, seen);
            }
            _ => {
                if let Some(out) = dep.dependency_output_file {
                    deps.order_only.push(out);
                }
            }
        }
    }
}

/// The dependency outputs of the direct deps, split into build-order inputs
/// (linked deps) and order-only data deps.
fn direct_dep_outputs(target: &Target) -> (Vec<OutputFile>, Vec<OutputFile>) {
    let mut linked = Vec::new();
    for pair in target.deps(DepsIterationType::Linked) {
        if let Some(out) = pair.get().dependency_output_file {
            linked.push(out);
        }
    }
    let mut data = Vec::new();
    for pair in &target.data_deps {
        if let Some(out) = pair.get().dependency_output_file {
            data.push(out);
        }
    }
    (linked, data)
}

/// The target's own config values followed by every attached config's
/// resolved values, in application order.
pub(crate) fn recursive_config_values(target: &Target) -> Vec<&ConfigValues> {
    let mut values = Vec::with_capacity(1 + target.configs.len());
    if target.has_config_values() {
        values.push(target.config_values());
    }
    for pair in &target.configs {
        values.push(pair.get().resolved_values());
    }
    values
}

pub(crate) fn defines_value(target: &Target) -> String {
    let mut parts = Vec::new();
    for values in recursive_config_values(target) {
        for define in &values.defines {
            parts.push(format!("-D{}", command_arg_escape(define)));
        }
    }
    parts.join(" ")
}

pub(crate) fn include_dirs_value(target: &Target) -> String {
    let build_dir = target.settings().build_settings().build_dir().value();
    let mut parts = Vec::new();
    for values in recursive_config_values(target) {
        for dir in &values.include_dirs {
            let rebased = if dir.is_source_absolute() {
                crate::util::paths::rebase_source_absolute(dir.actual_path(), build_dir)
            } else {
                dir.value().to_string()
            };
            parts.push(format!("-I{}", ninja_command_escape(&rebased)));
        }
    }
    parts.join(" ")
}

pub(crate) fn flags_value(
    target: &Target,
    get: impl Fn(&ConfigValues) -> &Vec<String>,
) -> String {
    let mut parts = Vec::new();
    for values in recursive_config_values(target) {
        for flag in get(values) {
            parts.push(ninja_command_escape(flag));
        }
    }
    parts.join(" ")
}

pub(crate) fn libs_value(target: &Target, link_tool: &Tool) -> String {
    let build_dir = target.settings().build_settings().build_dir().value();
    let mut parts = Vec::new();
    for values in recursive_config_values(target) {
        for dir in &values.lib_dirs {
            let rebased = if dir.is_source_absolute() {
                crate::util::paths::rebase_source_absolute(dir.actual_path(), build_dir)
            } else {
                dir.value().to_string()
            };
            parts.push(format!(
                "{}{}",
                link_tool.lib_dir_switch,
                ninja_command_escape(&rebased)
            ));
        }
        for lib in &values.libs {
            parts.push(format!("{}{}", link_tool.lib_switch, ninja_command_escape(lib)));
        }
    }
    parts.join(" ")
}

pub(crate) fn frameworks_value(target: &Target, link_tool: &Tool) -> String {
    let mut parts = Vec::new();
    for values in recursive_config_values(target) {
        for framework in &values.frameworks {
            let name = framework.trim_end_matches(".framework");
            parts.push(format!(
                "{}{}",
                link_tool.framework_switch,
                ninja_command_escape(name)
            ));
        }
        for framework in &values.weak_frameworks {
            let name = framework.trim_end_matches(".framework");
            parts.push(format!(
                "{}{}",
                link_tool.weak_framework_switch,
                ninja_command_escape(name)
            ));
        }
    }
    parts.join(" ")
}

struct TargetWriter<'a> {
    target: &'a Arc<Target>,
    path: PathOutput,
    rule_prefix: String,
    out: String,
}

/// Writes the build statements for one resolved target.
pub fn write_target(target: &Arc<Target>) -> NgenResult<String> {
    let settings = target.settings();
    let mut writer = TargetWriter {
        target,
        path: PathOutput::new(settings.build_settings()),
        rule_prefix: settings.ninja_rule_prefix(),
        out: String::new(),
    };
    writer.run()?;
    Ok(writer.out)
}

impl<'a> TargetWriter<'a> {
    fn run(&mut self) -> NgenResult<()> {
        match self.target.output_type {
            OutputType::Group
            | OutputType::BundleData
            | OutputType::CreateBundle
            | OutputType::GeneratedFile => self.write_aggregate(),
            OutputType::CopyFiles => self.write_copy(),
            OutputType::Action | OutputType::ActionForeach => self.write_action(),
            _ if self.target.source_types_used.rust_source_used() => self.write_rust_binary(),
            OutputType::SourceSet => self.write_source_set(),
            _ => self.write_c_binary(),
        }
    }

    fn toolchain(&self) -> &Arc<crate::core::toolchain::Toolchain> {
        self.target.toolchain.as_ref().unwrap()
    }

    fn rule(&self, tool_name: &str) -> String {
        if tool_name == tool::BUILTIN_TOOL_PHONY {
            tool_name.to_string()
        } else {
            format!("{}{}", self.rule_prefix, tool_name)
        }
    }

    fn write_build_line(
        &mut self,
        outputs: &[OutputFile],
        rule: &str,
        inputs: &[String],
        implicit: &[String],
        order_only: &[OutputFile],
    ) {
        self.out.push_str("build");
        for output in outputs {
            self.out.push(' ');
            let s = self.path.output_file_str(output);
            self.out.push_str(&s);
        }
        let _ = write!(self.out, ": {}", rule);
        for input in inputs {
            self.out.push(' ');
            self.out.push_str(input);
        }
        if !implicit.is_empty() {
            self.out.push_str(" |");
            for input in implicit {
                self.out.push(' ');
                self.out.push_str(input);
            }
        }
        if !order_only.is_empty() {
            self.out.push_str(" ||");
            for dep in order_only {
                self.out.push(' ');
                let s = self.path.output_file_str(dep);
                self.out.push_str(&s);
            }
        }
        self.out.push('\n');
    }

    fn write_var(&mut self, name: &str, value: &str) {
        if !value.is_empty() {
            let _ = writeln!(self.out, "{}{} = {}", INDENT, name, value);
        }
    }

    // -------------------------------------------------------------------------
    // Flag variables

    fn defines_value(&self) -> String {
        defines_value(self.target)
    }

    fn include_dirs_value(&self) -> String {
        include_dirs_value(self.target)
    }

    fn flags_value(&self, get: impl Fn(&ConfigValues) -> &Vec<String>) -> String {
        flags_value(self.target, get)
    }

    /// Binds the target-context variables (label, output dirs, output name)
    /// a rule's substitution set references.
    fn write_target_context_vars(&mut self, bits: &crate::core::substitution::SubstitutionBits) {
        use SubstitutionType::*;
        for t in [
            Label,
            LabelName,
            LabelNoToolchain,
            RootGenDir,
            RootOutDir,
            TargetGenDir,
            TargetOutDir,
            TargetOutputName,
        ] {
            if bits.has(t) {
                if let Some(value) = subst::get_target_context_value(self.target, t) {
                    self.write_var(t.ninja_var(), &value);
                }
            }
        }
    }

    fn write_compile_vars(&mut self, bits: &crate::core::substitution::SubstitutionBits) {
        use SubstitutionType::*;
        self.write_target_context_vars(bits);
        if bits.has(Defines) {
            let v = self.defines_value();
            self.write_var("defines", &v);
        }
        if bits.has(IncludeDirs) {
            let v = self.include_dirs_value();
            self.write_var("include_dirs", &v);
        }
        let flag_vars: [(SubstitutionType, &str, fn(&ConfigValues) -> &Vec<String>); 7] = [
            (AsmFlags, "asmflags", |v| &v.asmflags),
            (CFlags, "cflags", |v| &v.cflags),
            (CFlagsC, "cflags_c", |v| &v.cflags_c),
            (CFlagsCc, "cflags_cc", |v| &v.cflags_cc),
            (CFlagsObjC, "cflags_objc", |v| &v.cflags_objc),
            (CFlagsObjCc, "cflags_objcc", |v| &v.cflags_objcc),
            (SwiftFlags, "swiftflags", |v| &v.swiftflags),
        ];
        for (bit, name, get) in flag_vars {
            if bits.has(bit) {
                let v = self.flags_value(get);
                self.write_var(name, &v);
            }
        }
    }

    // -------------------------------------------------------------------------
    // C-family binaries

    fn write_c_binary(&mut self) -> NgenResult<()> {
        let target = Arc::clone(self.target);
        let toolchain = Arc::clone(self.toolchain());

        // Per-source compiles. Object and header files don't compile;
        // objects feed the link directly.
        let mut object_files: Vec<OutputFile> = Vec::new();
        let (linked_outputs, _) = direct_dep_outputs(&target);

        for source in &target.sources {
            let Some((tool_name, outputs)) = resolve::get_outputs_for_source(&target, source)?
            else {
                continue;
            };
            if tool_name == tool::TOOL_NONE {
                object_files.extend(outputs);
                continue;
            }
            let compile_tool = toolchain.get_tool(tool_name).unwrap();
            let rule = self.rule(tool_name);
            let input = self.path.source_file_str(source);
            self.write_build_line(&outputs, &rule, &[input], &[], &linked_outputs);
            let bits = *compile_tool.substitution_bits();
            self.write_compile_vars(&bits);
            object_files.extend(outputs);
        }

        // The link (or archive) step.
        let final_tool = toolchain
            .get_tool_for_target_final_output(&target)
            .expect("validated during resolution");
        if final_tool.name() == tool::GENERAL_TOOL_STAMP {
            // Non-linked binary flavors fall back to aggregation.
            return self.write_source_set();
        }

        let mut link_deps = LinkDeps::default();
        let mut seen = HashSet::new();
        seen.insert(*target.label());
        collect_link_deps(&target, &mut link_deps, &mut seen);

        let mut inputs: Vec<String> = Vec::new();
        for object in &object_files {
            inputs.push(self.path.output_file_str(object));
        }
        for lib in &link_deps.link_inputs {
            inputs.push(self.path.output_file_str(lib));
        }
        let implicit: Vec<String> = link_deps
            .solibs
            .iter()
            .map(|s| self.path.output_file_str(s))
            .collect();

        let outputs: Vec<OutputFile> = subst::apply_list_to_linker_as_output_file(
            &target,
            final_tool,
            &final_tool.outputs,
        )?;
        let rule = self.rule(final_tool.name());
        self.write_build_line(&outputs, &rule, &inputs, &implicit, &link_deps.order_only);

        let bits = *final_tool.substitution_bits();
        use SubstitutionType::*;
        self.write_target_context_vars(&bits);
        if bits.has(LdFlags) {
            let v = self.flags_value(|v| &v.ldflags);
            self.write_var("ldflags", &v);
        }
        if bits.has(ArFlags) {
            let v = self.flags_value(|v| &v.arflags);
            self.write_var("arflags", &v);
        }
        if bits.has(Libs) {
            let v = self.libs_value(final_tool);
            self.write_var("libs", &v);
        }
        if bits.has(SoLibs) {
            let v = link_deps
                .solibs
                .iter()
                .map(|s| self.path.output_file_str(s))
                .collect::<Vec<_>>()
                .join(" ");
            self.write_var("solibs", &v);
        }
        if bits.has(Frameworks) {
            let v = self.frameworks_value(final_tool);
            self.write_var("frameworks", &v);
        }
        if bits.has(OutputExtension) {
            let v = subst::apply_pattern_to_linker(
                &target,
                final_tool,
                &single_placeholder(OutputExtension),
            )?;
            self.write_var("output_extension", &v);
        }
        if bits.has(OutputDir) {
            let v = subst::get_output_dir_for_target(&target, final_tool)?;
            self.write_var("output_dir", &v);
        }
        if let Some(pool) = &target.pool {
            let default_tc = *target.settings().default_toolchain_label();
            let name = pool.get().get_ninja_name(&default_tc);
            self.write_var("pool", &name);
        }
        Ok(())
    }

    fn libs_value(&self, link_tool: &Tool) -> String {
        libs_value(self.target, link_tool)
    }

    fn frameworks_value(&self, link_tool: &Tool) -> String {
        frameworks_value(self.target, link_tool)
    }

    // -------------------------------------------------------------------------
    // Rust binaries: one compile per crate, not per source.

    fn write_rust_binary(&mut self) -> NgenResult<()> {
        let target = Arc::clone(self.target);
        let toolchain = Arc::clone(self.toolchain());
        let tool_name = target.tool_name_for_final_output();
        let rust_tool = toolchain.get_tool(tool_name).ok_or_else(|| {
            anyhow::Error::from(GenError::new(
                ErrorKind::InvalidToolConfiguration,
                format!(
                    "toolchain {} has no tool \"{}\"",
                    toolchain.label().get_user_visible_name(false),
                    tool_name
                ),
            ))
        })?;

        let rust = target.rust_values();
        let crate_root = self.path.source_file_str(&rust.crate_root);

        // Every source (plus inputs) is an implicit dep; rustc reads the
        // module tree itself.
        let mut implicit: Vec<String> = Vec::new();
        for source in &target.sources {
            if *source != rust.crate_root {
                implicit.push(self.path.source_file_str(source));
            }
        }
        for input in &target.inputs {
            implicit.push(self.path.source_file_str(input));
        }

        let mut link_deps = LinkDeps::default();
        let mut seen = HashSet::new();
        seen.insert(*target.label());
        collect_link_deps(&target, &mut link_deps, &mut seen);
        for lib in link_deps.link_inputs.iter().chain(&link_deps.solibs) {
            implicit.push(self.path.output_file_str(lib));
        }

        let outputs =
            subst::apply_list_to_linker_as_output_file(&target, rust_tool, &rust_tool.outputs)?;
        let rule = self.rule(tool_name);
        self.write_build_line(
            &outputs,
            &rule,
            &[crate_root],
            &implicit,
            &link_deps.order_only,
        );

        let bits = *rust_tool.substitution_bits();
        use SubstitutionType::*;
        self.write_target_context_vars(&bits);
        if bits.has(CrateName) {
            let v = rust.crate_name.as_str().to_string();
            self.write_var("crate_name", &v);
        }
        if bits.has(CrateType) {
            let v = effective_crate_type(&target).as_str().to_string();
            self.write_var("crate_type", &v);
        }
        if bits.has(Externs) {
            let v = self.externs_value();
            self.write_var("externs", &v);
        }
        if bits.has(RustDeps) {
            let v = self.rustdeps_value(&link_deps);
            self.write_var("rustdeps", &v);
        }
        if bits.has(RustFlags) {
            let v = self.flags_value(|v| &v.rustflags);
            self.write_var("rustflags", &v);
        }
        if bits.has(RustEnv) {
            let v = self.flags_value(|v| &v.rustenv);
            self.write_var("rustenv", &v);
        }
        if bits.has(OutputExtension) {
            let v = subst::apply_pattern_to_linker(
                &target,
                rust_tool,
                &single_placeholder(OutputExtension),
            )?;
            self.write_var("output_extension", &v);
        }
        if bits.has(OutputDir) {
            let v = subst::get_output_dir_for_target(&target, rust_tool)?;
            self.write_var("output_dir", &v);
        }
        if bits.has(LdFlags) {
            let v = self.flags_value(|v| &v.ldflags);
            self.write_var("ldflags", &v);
        }
        Ok(())
    }

    fn externs_value(&self) -> String {
        let mut parts = Vec::new();
        for pair in self.target.deps(DepsIterationType::Linked) {
            let dep = pair.get();
            if !dep.source_types_used.rust_source_used() || !dep.is_linkable() {
                continue;
            }
            let Some(out) = dep.link_output_file else { continue };
            let rust = self.target.rust_values();
            let name = rust
                .aliased_deps
                .get(dep.label())
                .cloned()
                .unwrap_or_else(|| dep.rust_values().crate_name.as_str().to_string());
            parts.push(format!(
                "--extern {}={}",
                name,
                self.path.output_file_str(&out)
            ));
        }
        parts.join(" ")
    }

    fn rustdeps_value(&self, link_deps: &LinkDeps) -> String {
        let mut dirs: Vec<String> = Vec::new();
        for lib in link_deps.link_inputs.iter().chain(&link_deps.solibs) {
            if let Some(idx) = lib.value().rfind('/') {
                let dir = &lib.value()[..idx];
                let flag = format!("-Ldependency={}", dir);
                if !dirs.contains(&flag) {
                    dirs.push(flag);
                }
            }
        }
        dirs.join(" ")
    }

    // -------------------------------------------------------------------------
    // Source sets and other aggregates

    fn write_source_set(&mut self) -> NgenResult<()> {
        let target = Arc::clone(self.target);
        let toolchain = Arc::clone(self.toolchain());
        let (linked_outputs, data_outputs) = direct_dep_outputs(&target);

        let mut object_files: Vec<OutputFile> = Vec::new();
        for source in &target.sources {
            let Some((tool_name, outputs)) = resolve::get_outputs_for_source(&target, source)?
            else {
                continue;
            };
            if tool_name == tool::TOOL_NONE {
                object_files.extend(outputs);
                continue;
            }
            let compile_tool = toolchain.get_tool(tool_name).unwrap();
            let rule = self.rule(tool_name);
            let input = self.path.source_file_str(source);
            self.write_build_line(&outputs, &rule, &[input], &[], &linked_outputs);
            let bits = *compile_tool.substitution_bits();
            self.write_compile_vars(&bits);
            object_files.extend(outputs);
        }

        let mut inputs: Vec<String> = object_files
            .iter()
            .map(|o| self.path.output_file_str(o))
            .collect();
        inputs.extend(linked_outputs.iter().map(|o| self.path.output_file_str(o)));
        self.write_stamp_or_phony(&inputs, &data_outputs);
        Ok(())
    }

    fn write_aggregate(&mut self) -> NgenResult<()> {
        let target = Arc::clone(self.target);
        let (linked_outputs, data_outputs) = direct_dep_outputs(&target);
        let mut inputs: Vec<String> = linked_outputs
            .iter()
            .map(|o| self.path.output_file_str(o))
            .collect();

        if target.output_type == OutputType::GeneratedFile {
            // The file itself is written at gen time; the stamp tracks it
            // for dependents.
            for out in &target.computed_outputs {
                inputs.insert(0, self.path.output_file_str(out));
            }
        }
        if target.output_type == OutputType::CreateBundle {
            for dep in &target.bundle_data().bundle_deps {
                if let Some(out) = dep.dependency_output_file {
                    inputs.push(self.path.output_file_str(&out));
                }
            }
        }

        self.write_stamp_or_phony(&inputs, &data_outputs);
        Ok(())
    }

    fn write_stamp_or_phony(&mut self, inputs: &[String], order_only: &[OutputFile]) {
        let Some(out) = self.target.dependency_output_file else {
            return;
        };
        let rule = if self.target.dependency_is_phony {
            self.rule(tool::BUILTIN_TOOL_PHONY)
        } else {
            self.rule(tool::GENERAL_TOOL_STAMP)
        };
        self.write_build_line(&[out], &rule, inputs, &[], order_only);
    }

    // -------------------------------------------------------------------------
    // Copy

    fn write_copy(&mut self) -> NgenResult<()> {
        let target = Arc::clone(self.target);
        let toolchain = Arc::clone(self.toolchain());
        let copy_tool = toolchain.get_tool(tool::GENERAL_TOOL_COPY).ok_or_else(|| {
            anyhow::Error::from(GenError::new(
                ErrorKind::InvalidToolConfiguration,
                format!(
                    "toolchain {} has no tool \"copy\"",
                    toolchain.label().get_user_visible_name(false)
                ),
            ))
        })?;
        let (linked_outputs, data_outputs) = direct_dep_outputs(&target);
        let build_settings = target.settings().build_settings();

        let mut all_outputs: Vec<String> = Vec::new();
        let rule = self.rule(tool::GENERAL_TOOL_COPY);
        for source in &target.sources {
            let outputs = subst::apply_output_list_as_source_files(
                &target,
                copy_tool,
                Some(source),
                &target.action_values().outputs,
            )?;
            let outputs: Vec<OutputFile> = outputs
                .iter()
                .map(|f| OutputFile::from_source_file(build_settings, *f))
                .collect();
            let input = self.path.source_file_str(source);
            self.write_build_line(&outputs, &rule, &[input], &[], &linked_outputs);
            all_outputs.extend(outputs.iter().map(|o| self.path.output_file_str(o)));
        }

        self.write_stamp_or_phony(&all_outputs, &data_outputs);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Actions

    fn action_rule_name(&self) -> String {
        let label = self.target.label();
        let mut name = String::from("__");
        for c in label.dir().value()[2..].chars() {
            name.push(if c == '/' { '_' } else { c });
        }
        name.push_str(label.name());
        name.push_str("___rule");
        format!("{}{}", self.rule_prefix, name)
    }

    /// Renders the action command: the script interpreter, the script, and
    /// the args with source-bound substitutions left as `${vars}` and
    /// target-bound substitutions expanded now.
    fn action_command(&self, action_tool: &Tool) -> NgenResult<String> {
        let target = self.target;
        let action = target.action_values();
        let build_settings = target.settings().build_settings();

        let mut command = String::new();
        if let Some(python) = build_settings.script_executable() {
            command.push_str(&command_arg_escape(&python.to_string_lossy()));
            command.push(' ');
        }
        command.push_str(&command_arg_escape(
            &self.path.source_file_str(&action.script),
        ));

        for pattern in action.args.list() {
            command.push(' ');
            for segment in pattern.segments() {
                match segment {
                    SubstitutionSegment::Literal(s) => {
                        command.push_str(&ninja_command_escape(s))
                    }
                    SubstitutionSegment::Placeholder(t) => {
                        if is_source_bound(*t) {
                            command.push_str("${");
                            command.push_str(t.ninja_var());
                            command.push('}');
                        } else {
                            let expanded = subst::apply_pattern_to_linker(
                                target,
                                action_tool,
                                &single_placeholder(*t),
                            )?;
                            command.push_str(&ninja_command_escape(&expanded));
                        }
                    }
                }
            }
        }
        Ok(command)
    }

    fn write_action(&mut self) -> NgenResult<()> {
        let target = Arc::clone(self.target);
        let toolchain = Arc::clone(self.toolchain());
        let action_tool = toolchain
            .get_tool(tool::GENERAL_TOOL_ACTION)
            .or_else(|| toolchain.get_tool(tool::GENERAL_TOOL_STAMP))
            .ok_or_else(|| {
                anyhow::Error::from(GenError::new(
                    ErrorKind::InvalidToolConfiguration,
                    format!(
                        "toolchain {} defines neither \"action\" nor \"stamp\"",
                        toolchain.label().get_user_visible_name(false)
                    ),
                ))
            })?;
        let action = target.action_values();
        let build_settings = Arc::clone(target.settings().build_settings());
        let (linked_outputs, data_outputs) = direct_dep_outputs(&target);

        // Each action gets its own rule carrying the command line.
        let rule_name = self.action_rule_name();
        let command = self.action_command(action_tool)?;
        let _ = writeln!(self.out, "rule {}", rule_name);
        let _ = writeln!(self.out, "{}command = {}", INDENT, command);
        let _ = writeln!(
            self.out,
            "{}description = ACTION {}",
            INDENT,
            self.target.label().get_user_visible_name(false)
        );
        if action.uses_rsp_file() {
            let rsp_base = format!(
                "{}{}",
                subst::build_dir_for_target(&target, "obj"),
                target.label().name()
            );
            if target.output_type == OutputType::ActionForeach {
                let _ = writeln!(
                    self.out,
                    "{}rspfile = {}.${{source_name_part}}.rsp",
                    INDENT, rsp_base
                );
            } else {
                let _ = writeln!(self.out, "{}rspfile = {}.rsp", INDENT, rsp_base);
            }
            let mut content = String::new();
            for (i, pattern) in action.response_file_contents.list().iter().enumerate() {
                if i > 0 {
                    content.push(' ');
                }
                content.push_str(&subst::write_with_ninja_variables(pattern));
            }
            let _ = writeln!(self.out, "{}rspfile_content = {}", INDENT, content);
        }
        if let Some(pool) = &target.pool {
            let default_tc = *target.settings().default_toolchain_label();
            let name = pool.get().get_ninja_name(&default_tc);
            let _ = writeln!(self.out, "{}pool = {}", INDENT, name);
        }

        let script = self.path.source_file_str(&action.script);
        let mut implicit: Vec<String> = vec![script];
        for input in &target.inputs {
            implicit.push(self.path.source_file_str(input));
        }

        let mut stamp_inputs: Vec<String> = Vec::new();
        if target.output_type == OutputType::ActionForeach {
            for source in &target.sources {
                let outputs = subst::apply_output_list_as_source_files(
                    &target,
                    action_tool,
                    Some(source),
                    &action.outputs,
                )?;
                let outputs: Vec<OutputFile> = outputs
                    .iter()
                    .map(|f| OutputFile::from_source_file(&build_settings, *f))
                    .collect();
                let input = self.path.source_file_str(source);
                self.write_build_line(&outputs, &rule_name, &[input], &implicit, &linked_outputs);
                self.write_per_source_vars(source, action)?;
                stamp_inputs.extend(outputs.iter().map(|o| self.path.output_file_str(o)));
            }
        } else {
            let outputs = subst::apply_output_list_as_source_files(
                &target,
                action_tool,
                None,
                &action.outputs,
            )?;
            let outputs: Vec<OutputFile> = outputs
                .iter()
                .map(|f| OutputFile::from_source_file(&build_settings, *f))
                .collect();
            for source in &target.sources {
                implicit.push(self.path.source_file_str(source));
            }
            self.write_build_line(&outputs, &rule_name, &[], &implicit, &linked_outputs);
            if !action.depfile.is_empty() {
                let depfile = subst::apply_pattern_to_linker(&target, action_tool, &action.depfile)?;
                self.write_var("depfile", &depfile);
                self.write_var("deps", "gcc");
            }
            stamp_inputs.extend(outputs.iter().map(|o| self.path.output_file_str(o)));
        }

        self.write_stamp_or_phony(&stamp_inputs, &data_outputs);
        Ok(())
    }

    /// Binds the source-flavored variables the foreach rule references.
    fn write_per_source_vars(
        &mut self,
        source: &crate::core::source_file::SourceFile,
        action: &crate::core::target::ActionValues,
    ) -> NgenResult<()> {
        use SubstitutionType::*;
        let mut needed = crate::core::substitution::SubstitutionBits::default();
        action.args.fill_required_types(&mut needed);
        action.outputs.fill_required_types(&mut needed);
        action
            .response_file_contents
            .fill_required_types(&mut needed);
        let toolchain = Arc::clone(self.toolchain());
        let tool = toolchain
            .get_tool(tool::GENERAL_TOOL_STAMP)
            .or_else(|| toolchain.get_tool(tool::BUILTIN_TOOL_PHONY))
            .unwrap();

        for t in [
            SourceNamePart,
            SourceFilePart,
            SourceDir,
            SourceRootRelativeDir,
            SourceGenDir,
            SourceOutDir,
        ] {
            if needed.has(t) {
                let value = subst::apply_pattern_to_compiler_as_output_file(
                    self.target,
                    tool,
                    source,
                    &single_placeholder(t),
                )?;
                let value = value.value().to_string();
                self.write_var(t.ninja_var(), &value);
            }
        }
        if !action.depfile.is_empty() {
            let depfile = subst::apply_pattern_to_compiler_as_output_file(
                self.target,
                tool,
                source,
                &action.depfile,
            )?;
            let value = depfile.value().to_string();
            self.write_var("depfile", &value);
            self.write_var("deps", "gcc");
        }
        Ok(())
    }
}

fn is_source_bound(t: SubstitutionType) -> bool {
    use SubstitutionType::*;
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

fn single_placeholder(t: SubstitutionType) -> crate::core::substitution::SubstitutionPattern {
    crate::core::substitution::SubstitutionPattern::parse(&format!("{{{{{}}}}}", t.name()), None)
        .expect("known substitution always parses")
}

fn effective_crate_type(target: &Target) -> CrateType {
    match target.rust_values().crate_type {
        CrateType::Auto => match target.output_type {
            OutputType::Executable => CrateType::Bin,
            OutputType::SharedLibrary => CrateType::Dylib,
            OutputType::StaticLibrary => CrateType::Staticlib,
            OutputType::RustLibrary => CrateType::Rlib,
            OutputType::RustProcMacro => CrateType::ProcMacro,
            _ => CrateType::Rlib,
        },
        other => other,
    }
}

/// True when this source type participates in C-family compilation.
pub fn source_is_compilable(file_type: FileType) -> bool {
    !matches!(file_type, FileType::Unknown | FileType::H | FileType::O)
}
