//! The `gen` driver: setup, scheduler start, root load, drain, emission.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::core::builder::Builder;
use crate::core::label::Label;
use crate::core::loader::Loader;
use crate::core::output_file::OutputFile;
use crate::core::scheduler::Scheduler;
use crate::core::settings::Settings;
use crate::core::shell::Shell;
use crate::core::target::{DepsIterationType, OutputType, Target};
use crate::core::toolchain::Toolchain;
use crate::emit::{build_writer, compile_commands, rust_project, toolchain_writer};
use crate::ops::setup::{GenOptions, Setup};
use crate::util::errors::{ErrorKind, GenError, NgenResult};
use crate::util::paths::write_atomically_if_changed;

#[derive(Debug)]
pub struct GenStats {
    pub target_count: usize,
    pub file_count: usize,
    pub elapsed_ms: u128,
}

pub fn gen(options: &GenOptions, shell: &mut Shell) -> NgenResult<GenStats> {
    let start = Instant::now();

    let scheduler = Arc::new(Scheduler::new());
    let setup = Setup::run(options, &scheduler)?;
    let build_settings = Arc::clone(&setup.build_settings);
    setup.save_args_to_file(&scheduler)?;

    let builder = Arc::new(Builder::new(Arc::clone(&scheduler)));
    let loader = Loader::new(
        Arc::clone(&scheduler),
        Arc::clone(&builder),
        Arc::clone(&build_settings),
    );

    loader.load_root()?;

    let num_workers = options.num_workers.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    });
    scheduler.run(num_workers);

    // Report every error the parallel phase accumulated; independent
    // failures surface in one run.
    let mut errors = scheduler.take_errors();
    if errors.is_empty() {
        errors = builder.check_for_bad_items();
    }
    if !errors.is_empty() {
        for err in &errors {
            shell.error(err)?;
        }
        return Err(anyhow::Error::from(errors.into_iter().next().unwrap()));
    }

    let all_targets = builder.get_all_resolved_targets();
    let default_toolchain = loader
        .default_toolchain()
        .expect("default toolchain known after successful load");

    let generated = compute_generated_set(&all_targets, &default_toolchain);
    let generated_targets: Vec<Arc<Target>> = all_targets
        .iter()
        .filter(|t| generated.contains(t.label()))
        .cloned()
        .collect();
    let default_toolchain_targets: Vec<Arc<Target>> = generated_targets
        .iter()
        .filter(|t| t.settings().is_default())
        .cloned()
        .collect();

    write_runtime_deps_files(&scheduler, &generated_targets)?;
    write_generated_files(&scheduler, &generated_targets)?;
    report_unknown_generated_inputs(&build_settings, &scheduler, shell)?;
    report_unused_args(&build_settings, options, shell)?;

    // One rule file per used toolchain, default toolchain first.
    let mut by_toolchain: BTreeMap<Label, Vec<Arc<Target>>> = BTreeMap::new();
    for target in &generated_targets {
        by_toolchain
            .entry(target.label().get_toolchain_label())
            .or_default()
            .push(Arc::clone(target));
    }
    by_toolchain.entry(default_toolchain).or_default();

    let mut used_toolchains: Vec<(Arc<Settings>, Arc<Toolchain>)> = Vec::new();
    for (tc_label, targets) in &by_toolchain {
        let settings = loader.get_toolchain_settings(tc_label).ok_or_else(|| {
            anyhow::Error::from(GenError::new(
                ErrorKind::UnresolvedReference,
                format!(
                    "toolchain {} was never loaded",
                    tc_label.get_user_visible_name(false)
                ),
            ))
        })?;
        let toolchain = builder.get_toolchain(tc_label).ok_or_else(|| {
            anyhow::Error::from(GenError::new(
                ErrorKind::UnresolvedReference,
                format!(
                    "toolchain {} was never defined",
                    tc_label.get_user_visible_name(false)
                ),
            ))
        })?;
        toolchain_writer::run_and_write_file(&settings, &toolchain, targets)?;
        if *tc_label == default_toolchain {
            used_toolchains.insert(0, (settings, toolchain));
        } else {
            used_toolchains.push((settings, toolchain));
        }
    }

    build_writer::run_and_write_file(
        &build_settings,
        &scheduler,
        &used_toolchains,
        &generated_targets,
        default_toolchain,
        &default_toolchain_targets,
    )?;

    compile_commands::run_and_write_files(
        &build_settings,
        &generated_targets,
        build_settings.export_compile_commands(),
    )?;

    if options.export_rust_project {
        rust_project::run_and_write_files(&build_settings, &generated_targets)?;
    }

    let stats = GenStats {
        target_count: generated_targets.len(),
        file_count: scheduler.gen_dependencies().len(),
        elapsed_ms: start.elapsed().as_millis(),
    };

    if let Some(tracelog) = &options.tracelog {
        let trace = serde_json::json!([{
            "name": "gen",
            "dur_ms": stats.elapsed_ms as u64,
            "targets": stats.target_count,
            "input_files": stats.file_count,
        }]);
        let mut contents = serde_json::to_string_pretty(&trace).expect("trace serializes");
        contents.push('\n');
        write_atomically_if_changed(tracelog, &contents)?;
    }

    Ok(stats)
}

/// Which targets get build rules: everything in the default toolchain, plus
/// the closure of their deps (including gen_deps and across toolchains).
fn compute_generated_set(all_targets: &[Arc<Target>], default_toolchain: &Label) -> BTreeSet<Label> {
    let by_label: BTreeMap<Label, &Arc<Target>> =
        all_targets.iter().map(|t| (*t.label(), t)).collect();

    let mut generated = BTreeSet::new();
    let mut stack: Vec<Label> = all_targets
        .iter()
        .filter(|t| t.label().get_toolchain_label() == *default_toolchain)
        .map(|t| *t.label())
        .collect();

    while let Some(label) = stack.pop() {
        if !generated.insert(label) {
            continue;
        }
        let Some(target) = by_label.get(&label) else {
            continue;
        };
        for pair in target.deps(DepsIterationType::All) {
            stack.push(pair.label);
        }
        for pair in &target.gen_deps {
            stack.push(pair.label);
        }
    }
    generated
}

/// Writes `<file>` for every target that declared `write_runtime_deps`:
/// one build-dir-relative runtime path per line, computed over the
/// data/runtime closure.
fn write_runtime_deps_files(
    scheduler: &Scheduler,
    generated_targets: &[Arc<Target>],
) -> NgenResult<()> {
    let registered: BTreeSet<Label> = scheduler.write_runtime_deps_targets().into_iter().collect();
    if registered.is_empty() {
        return Ok(());
    }
    let by_label: BTreeMap<Label, &Arc<Target>> = generated_targets
        .iter()
        .map(|t| (*t.label(), t))
        .collect();

    for label in registered {
        let Some(target) = by_label.get(&label) else {
            continue;
        };
        let Some(out_file) = &target.write_runtime_deps_output else {
            continue;
        };

        let mut lines: BTreeSet<String> = BTreeSet::new();
        let mut seen = BTreeSet::new();
        collect_runtime_deps(target, &mut lines, &mut seen);

        let mut contents = String::new();
        for line in lines {
            contents.push_str(&line);
            contents.push('\n');
        }
        let file = out_file.as_source_file(target.settings().build_settings());
        let path = target.settings().build_settings().get_full_path(&file);
        write_atomically_if_changed(&path, &contents)?;
        scheduler.add_written_file(*out_file);
    }
    Ok(())
}

fn collect_runtime_deps(
    target: &Arc<Target>,
    lines: &mut BTreeSet<String>,
    seen: &mut BTreeSet<Label>,
) {
    if !seen.insert(*target.label()) {
        return;
    }
    for out in &target.runtime_outputs {
        lines.insert(out.value().to_string());
    }
    if target.runtime_outputs.is_empty() {
        if let Some(out) = &target.dependency_output_file {
            if !target.dependency_is_phony {
                lines.insert(out.value().to_string());
            }
        }
    }
    for data in &target.data {
        lines.insert(data.clone());
    }
    for pair in target.deps(DepsIterationType::All) {
        collect_runtime_deps(pair.get(), lines, seen);
    }
}

/// Writes the contents of every `generated_file` target now; the build
/// statements only stamp them.
fn write_generated_files(
    scheduler: &Scheduler,
    generated_targets: &[Arc<Target>],
) -> NgenResult<()> {
    for target in generated_targets {
        if target.output_type != OutputType::GeneratedFile {
            continue;
        }
        let generated = target.generated_file();
        let contents = match &generated.contents {
            Some(value) => crate::ops::setup::render_generated_file_contents(
                value,
                &generated.output_conversion,
            ),
            None => String::new(),
        };
        let Some(out) = target.computed_outputs.first() else {
            continue;
        };
        let file = out.as_source_file(target.settings().build_settings());
        let path = target.settings().build_settings().get_full_path(&file);
        write_atomically_if_changed(&path, &contents)?;
        scheduler.add_written_file(*out);
    }
    Ok(())
}

fn report_unknown_generated_inputs(
    build_settings: &Arc<crate::core::build_settings::BuildSettings>,
    scheduler: &Scheduler,
    shell: &mut Shell,
) -> NgenResult<()> {
    for (label, source) in scheduler.unknown_generated_inputs() {
        // Files the gen process wrote itself (response files, runtime-deps
        // listings, generated_file outputs) are expected to be unknown to
        // the graph.
        let out = OutputFile::from_source_file(build_settings, source);
        if scheduler.is_file_written_by_us(&out) {
            continue;
        }
        shell.warn(format!(
            "{} uses the generated input {} with no dependency producing it",
            label.get_user_visible_name(false),
            source.value()
        ))?;
    }
    Ok(())
}

fn report_unused_args(
    build_settings: &Arc<crate::core::build_settings::BuildSettings>,
    options: &GenOptions,
    shell: &mut Shell,
) -> NgenResult<()> {
    let unused = build_settings.build_args().unused_overrides();
    if unused.is_empty() {
        return Ok(());
    }
    for name in &unused {
        shell.warn(format!("build argument \"{}\" was never used", name))?;
    }
    if options.fail_on_unused_args {
        return Err(GenError::new(
            ErrorKind::Other,
            format!("{} unused build argument(s)", unused.len()),
        )
        .into());
    }
    Ok(())
}

/// Prints the end-of-run summary.
pub fn print_summary(stats: &GenStats, shell: &mut Shell) -> NgenResult<()> {
    debug!(
        targets = stats.target_count,
        files = stats.file_count,
        ms = %stats.elapsed_ms,
        "generation finished"
    );
    shell.status(
        "Done",
        format!(
            "made {} targets from {} files in {}ms",
            stats.target_count, stats.file_count, stats.elapsed_ms
        ),
    )
}
