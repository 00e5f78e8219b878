//! Setup: dotfile discovery and interpretation, args.gn handling, and
//! `BuildSettings` assembly. Runs before the scheduler starts.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use tracing::debug;

use crate::core::build_settings::{self, BuildSettings};
use crate::core::label::Label;
use crate::core::label_pattern::LabelPattern;
use crate::core::scheduler::Scheduler;
use crate::core::source_dir::SourceDir;
use crate::core::source_file::SourceFile;
use crate::frontend::parser;
use crate::frontend::value::{Scope, Value, ValueKind, ValueMap};
use crate::util::errors::{ErrorKind, GenError, NgenResult};
use crate::util::paths::normalize_path;

pub const BUILD_ARG_FILE_NAME: &str = "args.gn";

/// Options collected by the driver shell for the `gen` pipeline.
#[derive(Default)]
pub struct GenOptions {
    pub out_dir: String,
    pub root: Option<PathBuf>,
    pub dotfile: Option<PathBuf>,
    pub args: Option<String>,
    pub quiet: bool,
    pub verbose: bool,
    pub fail_on_unused_args: bool,
    pub root_target: Option<String>,
    pub root_patterns: Vec<String>,
    pub add_export_compile_commands: Vec<String>,
    pub script_executable: Option<PathBuf>,
    pub regeneration: bool,
    pub export_rust_project: bool,
    pub tracelog: Option<PathBuf>,
    pub num_workers: Option<usize>,
}

fn dotfile_error(message: String, key: &str) -> anyhow::Error {
    GenError::new(ErrorKind::Parse, message)
        .with_help(format!("while reading the \"{}\" value of the dotfile", key))
        .into()
}

/// Executes a file that may only contain assignments (the dotfile, args.gn)
/// and returns the resulting values.
fn exec_assignment_file(path: &Path, file: &SourceFile) -> NgenResult<ValueMap> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    exec_assignment_text(&contents, file)
}

fn exec_assignment_text(contents: &str, file: &SourceFile) -> NgenResult<ValueMap> {
    let statements = parser::parse_file(contents, file)?;
    let mut scope = Scope::new(ValueMap::new());
    crate::frontend::lower::exec_standalone_assignments(&statements, &mut scope)?;
    Ok(scope.into_values())
}

fn take_string(values: &mut ValueMap, key: &str) -> NgenResult<Option<String>> {
    match values.remove(key) {
        Some(v) => Ok(Some(v.as_string()?.to_string())),
        None => Ok(None),
    }
}

fn take_bool(values: &mut ValueMap, key: &str) -> NgenResult<Option<bool>> {
    match values.remove(key) {
        Some(v) => Ok(Some(v.as_bool()?)),
        None => Ok(None),
    }
}

fn take_string_list(values: &mut ValueMap, key: &str) -> NgenResult<Option<Vec<String>>> {
    match values.remove(key) {
        Some(v) => Ok(Some(v.as_string_list()?)),
        None => Ok(None),
    }
}

fn take_patterns(
    values: &mut ValueMap,
    key: &str,
) -> NgenResult<Option<Vec<LabelPattern>>> {
    let root = SourceDir::new("//");
    match values.remove(key) {
        Some(v) => {
            let mut patterns = Vec::new();
            for item in v.as_list()? {
                patterns.push(LabelPattern::resolve(
                    &root,
                    item.as_string()?,
                    item.origin.clone(),
                )?);
            }
            Ok(Some(patterns))
        }
        None => Ok(None),
    }
}

/// Everything setup produces for the generation run.
pub struct Setup {
    pub build_settings: Arc<BuildSettings>,
    /// The raw `--args` text to persist into args.gn, when given.
    args_text_to_write: Option<String>,
}

impl Setup {
    pub fn run(options: &GenOptions, scheduler: &Scheduler) -> NgenResult<Setup> {
        let mut bs = BuildSettings::default();

        // Root directory: explicit, or the current directory.
        let root = match &options.root {
            Some(root) => normalize_path(&std::env::current_dir()?.join(root)),
            None => std::env::current_dir()?,
        };
        bs.set_root_path(root.clone());

        // The dotfile lives at the root unless named explicitly.
        let dotfile = match &options.dotfile {
            Some(dotfile) => {
                let path = normalize_path(&std::env::current_dir()?.join(dotfile));
                bs.set_dotfile_name(path.clone(), true);
                path
            }
            None => {
                let path = root.join(".gn");
                bs.set_dotfile_name(path.clone(), false);
                path
            }
        };
        if !dotfile.exists() {
            return Err(GenError::new(
                ErrorKind::Io,
                format!("no .gn file found at {}", dotfile.display()),
            )
            .into());
        }
        scheduler.add_gen_dependency(dotfile.clone());

        // Build directory, relative to the root. Regeneration invocations
        // pass "." with the build dir current.
        let out_abs = normalize_path(&std::env::current_dir()?.join(&options.out_dir));
        let build_dir_value = match pathdiff::diff_paths(&out_abs, &root) {
            Some(rel) if !rel.starts_with("..") => {
                format!("//{}/", rel.to_string_lossy().replace('\\', "/"))
            }
            _ => {
                return Err(GenError::new(
                    ErrorKind::InvalidPath,
                    format!(
                        "the build directory {} is not inside the source root {}",
                        out_abs.display(),
                        root.display()
                    ),
                )
                .into())
            }
        };
        bs.set_build_dir(SourceDir::new(&build_dir_value));

        Self::fill_from_dotfile(&mut bs, &dotfile, options)?;
        Self::fill_regen_switches(&mut bs, options);

        // Build arguments: --args wins and is persisted; otherwise read the
        // existing args.gn.
        let args_file = out_abs.join(BUILD_ARG_FILE_NAME);
        let args_source =
            SourceFile::new(&format!("{}{}", build_dir_value, BUILD_ARG_FILE_NAME));
        let mut args_text_to_write = None;
        match &options.args {
            Some(text) => {
                let overrides = exec_assignment_text(text, &args_source)?;
                bs.build_args().add_overrides(overrides);
                args_text_to_write = Some(text.clone());
            }
            None => {
                if args_file.exists() {
                    scheduler.add_gen_dependency(args_file.clone());
                    let overrides = exec_assignment_file(&args_file, &args_source)?;
                    bs.build_args().add_overrides(overrides);
                }
            }
        }

        debug!(
            "setup complete: root={} build_dir={}",
            bs.root_path().display(),
            bs.build_dir().value()
        );
        Ok(Setup {
            build_settings: Arc::new(bs),
            args_text_to_write,
        })
    }

    fn fill_from_dotfile(
        bs: &mut BuildSettings,
        dotfile: &Path,
        options: &GenOptions,
    ) -> NgenResult<()> {
        let dotfile_source = SourceFile::new("//.gn");
        let mut values = exec_assignment_file(dotfile, &dotfile_source)?;
        let root_dir = SourceDir::new("//");

        // Path aliases must be registered before any SourceFile whose value
        // they affect is constructed, including the buildconfig file below.
        if let Some(aliases) = values.remove("path_map") {
            for (prefix, actual) in aliases.as_scope()? {
                let source_prefix = format!("//{}", prefix);
                if !build_settings::register_path_map(&source_prefix, actual.as_string()?) {
                    return Err(dotfile_error(
                        format!("invalid path_map entry \"{}\"", prefix),
                        "path_map",
                    ));
                }
            }
        }

        // buildconfig is the one required value.
        let buildconfig = take_string(&mut values, "buildconfig")?.ok_or_else(|| {
            dotfile_error("the dotfile must name a buildconfig file".to_string(), "buildconfig")
        })?;
        bs.set_build_config_file(root_dir.resolve_relative_file(&buildconfig, None)?);

        let root_label_str = options
            .root_target
            .clone()
            .or(take_string(&mut values, "root")?)
            .unwrap_or_else(|| "//".to_string());
        let root_label = if root_label_str == "//" {
            Label::new_with_no_toolchain(root_dir, "")
        } else {
            Label::resolve(&root_dir, &Label::default(), &root_label_str, None)?
        };
        bs.set_root_target_label(root_label);

        let mut root_patterns = take_patterns(&mut values, "root_patterns")?.unwrap_or_default();
        for pattern in &options.root_patterns {
            root_patterns.push(LabelPattern::resolve(&root_dir, pattern, None)?);
        }
        bs.set_root_patterns(root_patterns);

        let check_targets = take_patterns(&mut values, "check_targets")?;
        let no_check_targets = take_patterns(&mut values, "no_check_targets")?;
        if check_targets.is_some() && no_check_targets.is_some() {
            return Err(dotfile_error(
                "check_targets and no_check_targets are mutually exclusive".to_string(),
                "check_targets",
            ));
        }
        if let Some(p) = check_targets {
            bs.set_check_targets(p);
        }
        if let Some(p) = no_check_targets {
            bs.set_no_check_targets(p);
        }

        if let Some(b) = take_bool(&mut values, "check_system_includes")? {
            bs.set_check_system_includes(b);
        }

        if let Some(list) = take_string_list(&mut values, "exec_script_whitelist")? {
            let mut files = Vec::new();
            for item in list {
                files.push(root_dir.resolve_relative_file(&item, None)?);
            }
            bs.set_exec_script_whitelist(files);
        }

        if let Some(patterns) = take_patterns(&mut values, "export_compile_commands")? {
            for p in patterns {
                bs.add_export_compile_commands(p);
            }
        }
        for pattern in &options.add_export_compile_commands {
            bs.add_export_compile_commands(LabelPattern::resolve(&root_dir, pattern, None)?);
        }

        if let Some(secondary) = take_string(&mut values, "secondary_source")? {
            let dir = root_dir.resolve_relative_dir(&secondary, None)?;
            bs.set_secondary_source_path(&dir);
        }

        if let Some(args) = values.remove("default_args") {
            bs.build_args().set_default_args(args.as_scope()?.clone());
        }

        if let Some(ext) = take_string(&mut values, "build_file_extension")? {
            if ext.contains('/') || ext.contains('\\') {
                return Err(dotfile_error(
                    "build_file_extension may not contain a slash".to_string(),
                    "build_file_extension",
                ));
            }
            bs.set_build_file_extension(ext);
        }

        if let Some(version) = take_string(&mut values, "ninja_required_version")? {
            let parsed = semver::Version::parse(&version).map_err(|e| {
                dotfile_error(
                    format!("invalid ninja_required_version \"{}\": {}", version, e),
                    "ninja_required_version",
                )
            })?;
            bs.set_ninja_required_version(parsed);
        }

        match &options.script_executable {
            Some(path) => bs.set_script_executable(Some(path.clone())),
            None => {
                if let Some(script) = take_string(&mut values, "script_executable")? {
                    if script.is_empty() {
                        bs.set_script_executable(None);
                    } else {
                        bs.set_script_executable(Some(PathBuf::from(script)));
                    }
                }
            }
        }
        // Consume the key even when the command line overrode it.
        let _ = take_string(&mut values, "script_executable")?;

        if let Some(template) = take_string(&mut values, "arg_file_template")? {
            bs.set_arg_file_template_path(root_dir.resolve_relative_file(&template, None)?);
        }

        if let Some(b) = take_bool(&mut values, "no_stamp_files")? {
            bs.set_no_stamp_files(b);
        }

        if let Some(key) = values.keys().next() {
            return Err(dotfile_error(
                format!("unknown dotfile value \"{}\"", key),
                key,
            ));
        }
        Ok(())
    }

    /// Records the switches echoed into the self-invocation command line.
    /// `--root`, `--dotfile`, `-q`, `--args`, and `--regeneration` are
    /// normalized separately by the build writer.
    fn fill_regen_switches(bs: &mut BuildSettings, options: &GenOptions) {
        if let Some(target) = &options.root_target {
            bs.add_regen_switch("root-target".to_string(), target.clone());
        }
        for pattern in &options.root_patterns {
            bs.add_regen_switch("root-pattern".to_string(), pattern.clone());
        }
        for pattern in &options.add_export_compile_commands {
            bs.add_regen_switch("add-export-compile-commands".to_string(), pattern.clone());
        }
        if let Some(script) = &options.script_executable {
            bs.add_regen_switch(
                "script-executable".to_string(),
                script.to_string_lossy().to_string(),
            );
        }
        if options.fail_on_unused_args {
            bs.add_regen_switch("fail-on-unused-args".to_string(), String::new());
        }
        if options.export_rust_project {
            bs.add_regen_switch("export-rust-project".to_string(), String::new());
        }
        if let Some(tracelog) = &options.tracelog {
            bs.add_regen_switch(
                "tracelog".to_string(),
                tracelog.to_string_lossy().to_string(),
            );
        }
    }

    /// Persists the `--args` text into `<build_dir>/args.gn`, canonically
    /// terminated. Call after the build dir exists.
    pub fn save_args_to_file(&self, scheduler: &Scheduler) -> NgenResult<()> {
        let Some(text) = &self.args_text_to_write else {
            return Ok(());
        };
        let mut canonical = text.clone();
        if !canonical.ends_with('\n') {
            canonical.push('\n');
        }
        let file = SourceFile::new(&format!(
            "{}{}",
            self.build_settings.build_dir().value(),
            BUILD_ARG_FILE_NAME
        ));
        let path = self.build_settings.get_full_path(&file);
        crate::util::paths::write_atomically_if_changed(&path, &canonical)?;
        scheduler.add_gen_dependency(path);
        Ok(())
    }
}

/// Renders a `Value` the way `generated_file` output conversions expect.
pub fn render_generated_file_contents(value: &Value, output_conversion: &str) -> String {
    fn to_json(value: &Value) -> serde_json::Value {
        match &value.kind {
            ValueKind::Bool(b) => serde_json::Value::Bool(*b),
            ValueKind::Int(i) => serde_json::Value::from(*i),
            ValueKind::String(s) => serde_json::Value::String(s.clone()),
            ValueKind::List(items) => {
                serde_json::Value::Array(items.iter().map(to_json).collect())
            }
            ValueKind::Scope(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), to_json(v))).collect(),
            ),
        }
    }

    match output_conversion {
        "json" => {
            let mut out =
                serde_json::to_string_pretty(&to_json(value)).unwrap_or_default();
            out.push('\n');
            out
        }
        "string" => match &value.kind {
            ValueKind::String(s) => s.clone(),
            other => Value::new(other.clone(), None).to_string(),
        },
        // Default: "list lines".
        _ => {
            let mut out = String::new();
            if let ValueKind::List(items) = &value.kind {
                for item in items {
                    match &item.kind {
                        ValueKind::String(s) => out.push_str(s),
                        other => out.push_str(&Value::new(other.clone(), None).to_string()),
                    }
                    out.push('\n');
                }
            }
            out
        }
    }
}
