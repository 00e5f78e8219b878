//! The top-level emitter: `build.ninja`, its depfile, and the stamp marker.
//! Output is byte-stable across runs with identical input.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::build_settings::BuildSettings;
use crate::core::label::Label;
use crate::core::output_file::OutputFile;
use crate::core::pool::Pool;
use crate::core::scheduler::Scheduler;
use crate::core::settings::Settings;
use crate::core::target::{OutputType, Target};
use crate::core::toolchain::Toolchain;
use crate::emit::escape::{command_arg_escape, depfile_escape, ninja_escape};
use crate::emit::path_output::PathOutput;
use crate::util::errors::{ErrorKind, GenError, NgenResult};
use crate::util::paths::write_atomically_if_changed;

/// Computes the command Ninja re-runs to regenerate the build: the current
/// executable invoking `gen .` with the normalized switch set. `--args` is
/// deliberately excluded; those persist in args.gn.
pub fn get_self_invocation_command(build_settings: &BuildSettings) -> String {
    let build_path = build_settings
        .build_dir()
        .resolve(build_settings.root_path(), true);

    let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("ngen"));
    let exe = make_relative_if_possible(&build_path, &exe);

    let mut parts: Vec<String> = Vec::new();
    parts.push(command_arg_escape(&path_to_slashes(&exe)));
    // Use "." for the directory to generate; Ninja runs the command with the
    // build directory current, so an explicit path would break if the user
    // renames it.
    parts.push("gen".to_string());
    parts.push(".".to_string());

    let root = make_relative_if_possible(&build_path, build_settings.root_path());
    parts.push(format!("--root={}", command_arg_escape(&path_to_slashes(&root))));
    // Successful automatic invocations shouldn't print output.
    parts.push("-q".to_string());

    if build_settings.dotfile_explicit() {
        let dotfile = make_relative_if_possible(&build_path, build_settings.dotfile_name());
        parts.push(format!(
            "--dotfile={}",
            command_arg_escape(&path_to_slashes(&dotfile))
        ));
    }

    let mut switches: Vec<(String, String)> = build_settings.regen_switches().to_vec();
    switches.sort();
    for (name, value) in switches {
        if value.is_empty() {
            parts.push(format!("--{}", name));
        } else {
            parts.push(format!("--{}={}", name, command_arg_escape(&value)));
        }
    }

    // Mark regeneration invocations so gen can elide post-processing steps
    // Ninja performs itself.
    parts.push("--regeneration".to_string());

    parts.join(" ")
}

fn path_to_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn make_relative_if_possible(base: &Path, path: &Path) -> PathBuf {
    if base.is_absolute() && path.is_absolute() {
        if let Some(relative) = pathdiff::diff_paths(path, base) {
            if !relative.as_os_str().is_empty() {
                return relative;
            }
            return PathBuf::from(".");
        }
    }
    path.to_path_buf()
}

/// Tails the emitted file to the fourth blank line: exactly the regeneration
/// rules written by `write_ninja_rules` below. The blank-line count is a
/// format contract; tools extract the regeneration commands this way.
pub fn extract_regeneration_commands(build_ninja: &str) -> String {
    let mut out = String::new();
    let mut num_blank_lines = 0;
    for line in build_ninja.lines() {
        out.push_str(line);
        out.push('\n');
        if line.is_empty() {
            num_blank_lines += 1;
        }
        if num_blank_lines == 4 {
            return out;
        }
    }
    String::new()
}

struct Counts {
    count: usize,
    last_seen: Arc<Target>,
}

pub struct NinjaBuildWriter<'a> {
    build_settings: &'a Arc<BuildSettings>,
    scheduler: &'a Scheduler,
    used_toolchains: &'a [(Arc<Settings>, Arc<Toolchain>)],
    all_targets: &'a [Arc<Target>],
    default_toolchain: Label,
    default_toolchain_targets: &'a [Arc<Target>],
    path: PathOutput,
    out: String,
    dep_out: String,
}

impl<'a> NinjaBuildWriter<'a> {
    fn run(&mut self) -> NgenResult<()> {
        self.write_ninja_rules();
        self.write_all_pools();
        self.write_subninjas()?;
        self.write_phony_and_all_rules()
    }

    fn write_ninja_rules(&mut self) {
        let _ = writeln!(
            self.out,
            "ninja_required_version = {}\n",
            self.build_settings.ninja_required_version()
        );
        let _ = writeln!(self.out, "rule gn");
        let _ = writeln!(
            self.out,
            "  command = {}",
            get_self_invocation_command(self.build_settings)
        );
        // Console pool, for colorful output on regeneration.
        let _ = writeln!(self.out, "  pool = console");
        let _ = writeln!(self.out, "  description = Regenerating ninja files\n");

        // The two-statement setup is easy to misread, so leave a comment in
        // the output.
        self.out.push_str(
            "# The 'gn' rule also writes build.ninja, unbeknownst to ninja. The\n\
             # build.ninja edge is separate to prevent ninja from deleting it\n\
             # (due to depfile usage) if interrupted. gn uses atomic writes to\n\
             # ensure that build.ninja is always valid even if interrupted.\n",
        );
        self.out.push_str(
            "build build.ninja.stamp: gn\n  generator = 1\n  depfile = build.ninja.d\n\n",
        );
        self.out
            .push_str("build build.ninja: phony build.ninja.stamp\n  generator = 1\n");

        // Input build files go in the ".d" file: if they were dependencies
        // in the .ninja file itself, ninja would error when one goes
        // missing; depfile entries are ignored when absent.
        self.dep_out.push_str("build.ninja.stamp:");
        let build_path = self
            .build_settings
            .build_dir()
            .resolve(self.build_settings.root_path(), true);
        let mut inputs: BTreeSet<String> = BTreeSet::new();
        for input in self.scheduler.gen_dependencies() {
            let file = make_relative_if_possible(&build_path, &input);
            inputs.insert(path_to_slashes(&file));
        }
        for input in inputs {
            self.dep_out.push(' ');
            self.dep_out.push_str(&depfile_escape(&input));
        }
        self.dep_out.push('\n');

        self.out.push('\n');
    }

    fn write_all_pools(&mut self) {
        let mut used_pools: BTreeMap<String, Arc<Pool>> = BTreeMap::new();
        for (_, toolchain) in self.used_toolchains {
            for tool in toolchain.tools() {
                if let Some(pool) = &tool.pool {
                    let pool = pool.get();
                    used_pools
                        .insert(pool.get_ninja_name(&self.default_toolchain), Arc::clone(pool));
                }
            }
        }
        for target in self.all_targets {
            let uses_pool = target.is_binary()
                || matches!(
                    target.output_type,
                    OutputType::Action | OutputType::ActionForeach
                );
            if uses_pool {
                if let Some(pool) = &target.pool {
                    let pool = pool.get();
                    used_pools
                        .insert(pool.get_ninja_name(&self.default_toolchain), Arc::clone(pool));
                }
            }
        }

        for (name, pool) in used_pools {
            // "console" is Ninja's own and is never re-declared.
            if name == "console" {
                continue;
            }
            let _ = writeln!(self.out, "pool {}\n  depth = {}\n", name, pool.depth());
        }
    }

    fn write_subninjas(&mut self) -> NgenResult<()> {
        // The default toolchain always comes first; the rest sort by file
        // name. Since they're sorted, a duplicate is always adjacent.
        let used_toolchains = self.used_toolchains;
        let mut sorted: Vec<&(Arc<Settings>, Arc<Toolchain>)> = used_toolchains.iter().collect();
        sorted.sort_by(|a, b| {
            let a_default = a.0.is_default();
            let b_default = b.0.is_default();
            b_default
                .cmp(&a_default)
                .then_with(|| a.0.ninja_file().cmp(&b.0.ninja_file()))
        });

        let mut previous: Option<&(Arc<Settings>, Arc<Toolchain>)> = None;
        for pair in sorted {
            let subninja = pair.0.ninja_file();
            if let Some(prev) = previous {
                if prev.0.ninja_file() == subninja {
                    return Err(GenError::new(
                        ErrorKind::DuplicateToolchain,
                        format!("two or more toolchains write to the same directory: {}", subninja),
                    )
                    .at(pair.1.defined_from().cloned())
                    .with_sub_error(
                        GenError::new(
                            ErrorKind::DuplicateToolchain,
                            "previous toolchain".to_string(),
                        )
                        .at(prev.1.defined_from().cloned()),
                    )
                    .into());
                }
            }
            let _ = writeln!(self.out, "subninja {}", ninja_escape(&subninja));
            previous = Some(pair);
        }
        self.out.push('\n');
        Ok(())
    }

    fn write_phony_rule(&mut self, target: &Target, phony_name: &str) {
        let escaped = ninja_escape(phony_name);
        let _ = write!(self.out, "build {}: phony ", escaped);
        if let Some(out) = &target.dependency_output_file {
            let s = self.path.output_file_str(out);
            self.out.push_str(&s);
        }
        self.out.push('\n');
    }

    fn duplicate_output_error(&self, bad_output: &OutputFile) -> GenError {
        let mut matches: Vec<&Arc<Target>> = Vec::new();
        for target in self.default_toolchain_targets {
            if target
                .computed_outputs
                .iter()
                .any(|out| out.normalized() == *bad_output)
            {
                matches.push(target);
            }
        }
        let mut matches_string = String::new();
        for target in &matches {
            let _ = writeln!(
                matches_string,
                "  {}",
                target
                    .label()
                    .get_user_visible_name_with_default(&self.default_toolchain)
            );
        }
        let mut err = GenError::new(
            ErrorKind::DuplicateOutput,
            format!("two or more targets generate the same output: {}", bad_output.value()),
        )
        .with_help(format!(
            "This is often fixed by changing one of the target names, or by\n\
             setting an output_name on one of them.\nCollisions:\n{}",
            matches_string
        ));
        if let Some(first) = matches.first() {
            err = err.at(first.defined_from().cloned());
        }
        for target in matches.iter().skip(1) {
            err = err.with_sub_error(
                GenError::new(ErrorKind::DuplicateOutput, "collision".to_string())
                    .at(target.defined_from().cloned()),
            );
        }
        err
    }

    fn write_phony_and_all_rules(&mut self) -> NgenResult<()> {
        // Track rules as they're written to avoid collisions with anything
        // else. "all" is generated internally, so reserve it up front.
        let mut written_rules: BTreeSet<String> = BTreeSet::new();
        written_rules.insert("all".to_string());

        let mut default_target: Option<Arc<Target>> = None;
        let mut toplevel_targets: Vec<Arc<Target>> = Vec::new();
        let mut toplevel_dir_targets: Vec<Arc<Target>> = Vec::new();
        let mut short_names: BTreeMap<String, Counts> = BTreeMap::new();
        let mut exes: BTreeMap<String, Counts> = BTreeMap::new();

        let root_dir = *self.build_settings.root_target_label().dir();

        for target in self.default_toolchain_targets {
            let label = target.label();
            let short_name = label.name().to_string();

            if *label.dir() == root_dir && short_name == "default" {
                default_target = Some(Arc::clone(target));
            }

            let counts = short_names.entry(short_name.clone()).or_insert(Counts {
                count: 0,
                last_seen: Arc::clone(target),
            });
            counts.count += 1;
            counts.last_seen = Arc::clone(target);

            let is_exe_like = target.output_type == OutputType::Executable
                || (target.output_type == OutputType::CreateBundle
                    && target.bundle_data().is_application());
            if is_exe_like {
                let counts = exes.entry(short_name).or_insert(Counts {
                    count: 0,
                    last_seen: Arc::clone(target),
                });
                counts.count += 1;
                counts.last_seen = Arc::clone(target);
            }

            let dir_string = label.dir().value();
            if dir_string == "//" {
                toplevel_targets.push(Arc::clone(target));
            } else if dir_string.len() == label.name().len() + 3
                && dir_string.starts_with("//")
                && dir_string.ends_with('/')
                && &dir_string[2..dir_string.len() - 1] == label.name()
            {
                toplevel_dir_targets.push(Arc::clone(target));
            }

            // Computed outputs occupy the namespace first; a collision here
            // (before any phony rules) means two targets make the same file.
            for output in &target.computed_outputs {
                let normalized = output.normalized();
                if !written_rules.insert(normalized.value().to_string()) {
                    return Err(self.duplicate_output_error(&normalized).into());
                }
            }
        }

        // First, the short names of toplevel targets.
        for target in &toplevel_targets {
            if written_rules.insert(target.label().name().to_string()) {
                self.write_phony_rule(target, target.label().name());
            }
        }

        // Next, short names of targets matching their toplevel directory.
        for target in &toplevel_dir_targets {
            if written_rules.insert(target.label().name().to_string()) {
                self.write_phony_rule(target, target.label().name());
            }
        }

        // Unique executable short names.
        for (name, counts) in &exes {
            if counts.count == 1 && written_rules.insert(name.clone()) {
                let target = Arc::clone(&counts.last_seen);
                self.write_phony_rule(&target, name);
            }
        }

        // Unique short names of any target.
        for (name, counts) in &short_names {
            if counts.count == 1 && written_rules.insert(name.clone()) {
                let target = Arc::clone(&counts.last_seen);
                self.write_phony_rule(&target, name);
            }
        }

        // Label variants.
        for target in self.default_toolchain_targets {
            let label = target.label();

            // "foo/bar:baz" for "//foo/bar:baz".
            let long_name = label
                .get_user_visible_name(false)
                .trim_matches('/')
                .to_string();
            if written_rules.insert(long_name.clone()) {
                self.write_phony_rule(target, &long_name);
            }

            // "foo/bar" when the directory name matches the target name.
            if label.dir().last_dir_component() == label.name() {
                let medium_name = label
                    .dir()
                    .value()
                    .trim_matches('/')
                    .to_string();
                if medium_name != label.name() && written_rules.insert(medium_name.clone()) {
                    self.write_phony_rule(target, &medium_name);
                }
            }
        }

        // The autogenerated "all" rule.
        if !self.default_toolchain_targets.is_empty() {
            self.out.push_str("\nbuild all: phony");
            for target in self.default_toolchain_targets {
                if let Some(out) = &target.dependency_output_file {
                    let s = self.path.output_file_str(out);
                    self.out.push_str(" $\n    ");
                    self.out.push_str(&s);
                }
            }
        }
        self.out.push('\n');

        if let Some(default_target) = default_target {
            if written_rules.contains("default") {
                self.out.push_str("\ndefault default\n");
            } else if let Some(out) = &default_target.dependency_output_file {
                let s = self.path.output_file_str(out);
                let _ = writeln!(self.out, "\ndefault {}", s);
            }
            // A default target with no dependency output would make the
            // default statement a ninja runtime failure; omit it.
        } else if !self.default_toolchain_targets.is_empty() {
            self.out.push_str("\ndefault all\n");
        }

        Ok(())
    }
}

/// Renders and writes `build.ninja`, `build.ninja.d`, and the empty
/// `build.ninja.stamp`, atomically and only when contents changed.
pub fn run_and_write_file(
    build_settings: &Arc<BuildSettings>,
    scheduler: &Scheduler,
    used_toolchains: &[(Arc<Settings>, Arc<Toolchain>)],
    all_targets: &[Arc<Target>],
    default_toolchain: Label,
    default_toolchain_targets: &[Arc<Target>],
) -> NgenResult<()> {
    let mut writer = NinjaBuildWriter {
        build_settings,
        scheduler,
        used_toolchains,
        all_targets,
        default_toolchain,
        default_toolchain_targets,
        path: PathOutput::new(build_settings),
        out: String::new(),
        dep_out: String::new(),
    };
    writer.run()?;

    let build_dir = build_settings.build_dir().value();
    let ninja_file =
        crate::core::source_file::SourceFile::new(&format!("{}build.ninja", build_dir));
    write_atomically_if_changed(&build_settings.get_full_path(&ninja_file), &writer.out)?;

    let dep_file =
        crate::core::source_file::SourceFile::new(&format!("{}build.ninja.d", build_dir));
    write_atomically_if_changed(&build_settings.get_full_path(&dep_file), &writer.dep_out)?;

    // The empty marker expected by the first of the two regeneration rules.
    let stamp_file =
        crate::core::source_file::SourceFile::new(&format!("{}build.ninja.stamp", build_dir));
    write_atomically_if_changed(&build_settings.get_full_path(&stamp_file), "")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regeneration_extraction_stops_at_fourth_blank_line() {
        let content = "ninja_required_version = 1.7.2\n\n\
                       rule gn\n  command = x\n  pool = console\n  description = d\n\n\
                       # c\nbuild build.ninja.stamp: gn\n  generator = 1\n  depfile = build.ninja.d\n\n\
                       build build.ninja: phony build.ninja.stamp\n  generator = 1\n\n\
                       pool foo\n  depth = 2\n\nsubninja toolchain.ninja\n";
        let extracted = extract_regeneration_commands(content);
        assert!(extracted.ends_with("  generator = 1\n\n"));
        assert!(!extracted.contains("pool foo"));
        assert_eq!(extracted.matches('\n').count(), 15);
    }
}
