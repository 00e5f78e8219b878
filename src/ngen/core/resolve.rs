//! Per-target finalisation, run by the Builder once every referenced label
//! has resolved: config merging, bundle-data propagation, precompiled-header
//! resolution, output-file computation, and the validator sequence.

use std::collections::HashSet;
use std::sync::Arc;

use itertools::Itertools;

use crate::core::builder::ResolvedItem;
use crate::core::item::Item;
use crate::core::label::Label;
use crate::core::label_pattern::LabelPattern;
use crate::core::label_ptr::LabelConfigPair;
use crate::core::output_file::OutputFile;
use crate::core::scheduler::Scheduler;
use crate::core::source_file::{FileType, SourceFile};
use crate::core::substitution_writer as subst;
use crate::core::target::{DepsIterationType, OutputType, Target};
use crate::core::tool::{self, Tool};
use crate::util::errors::{ErrorKind, GenError, NgenResult};

/// Fills the resolved-item pointers of every label reference in `item`.
/// All references have resolved by the time this runs; a missing or
/// wrongly-typed referent is reported against the referencing location.
pub fn fill_resolved_references(
    mut item: Item,
    lookup: &dyn Fn(&Label) -> Option<ResolvedItem>,
    default_toolchain: Option<&Label>,
) -> NgenResult<Item> {
    match &mut item {
        Item::Target(target) => {
            let toolchain_label = target.label().get_toolchain_label();
            match lookup(&toolchain_label) {
                Some(ResolvedItem::Toolchain(tc)) => target.toolchain = Some(tc),
                Some(other) => {
                    return Err(wrong_type(&toolchain_label, "toolchain", other.kind_str(), default_toolchain))
                }
                None => return Err(missing(&toolchain_label, default_toolchain)),
            }

            for pair in target
                .private_deps
                .iter_mut()
                .chain(target.public_deps.iter_mut())
                .chain(target.data_deps.iter_mut())
                .chain(target.gen_deps.iter_mut())
            {
                match lookup(&pair.label) {
                    Some(ResolvedItem::Target(t)) => pair.ptr = Some(t),
                    Some(other) => return Err(wrong_type(&pair.label, "target", other.kind_str(), default_toolchain)),
                    None => return Err(missing(&pair.label, default_toolchain)),
                }
            }
            for pair in target
                .configs
                .iter_mut()
                .chain(target.public_configs.iter_mut())
                .chain(target.all_dependent_configs.iter_mut())
            {
                match lookup(&pair.label) {
                    Some(ResolvedItem::Config(c)) => pair.ptr = Some(c),
                    Some(other) => return Err(wrong_type(&pair.label, "config", other.kind_str(), default_toolchain)),
                    None => return Err(missing(&pair.label, default_toolchain)),
                }
            }
            if let Some(pool) = &mut target.pool {
                match lookup(&pool.label) {
                    Some(ResolvedItem::Pool(p)) => pool.ptr = Some(p),
                    Some(other) => return Err(wrong_type(&pool.label, "pool", other.kind_str(), default_toolchain)),
                    None => return Err(missing(&pool.label, default_toolchain)),
                }
            }
        }
        Item::Config(config) => {
            for pair in config.configs.iter_mut() {
                match lookup(&pair.label) {
                    Some(ResolvedItem::Config(c)) => pair.ptr = Some(c),
                    Some(other) => return Err(wrong_type(&pair.label, "config", other.kind_str(), default_toolchain)),
                    None => return Err(missing(&pair.label, default_toolchain)),
                }
            }
        }
        Item::Toolchain(toolchain) => {
            for pair in toolchain.deps.iter_mut() {
                match lookup(&pair.label) {
                    Some(ResolvedItem::Target(t)) => pair.ptr = Some(t),
                    Some(other) => return Err(wrong_type(&pair.label, "target", other.kind_str(), default_toolchain)),
                    None => return Err(missing(&pair.label, default_toolchain)),
                }
            }
            for t in toolchain.tools_mut() {
                if let Some(pool) = &mut t.pool {
                    match lookup(&pool.label) {
                        Some(ResolvedItem::Pool(p)) => pool.ptr = Some(p),
                        Some(other) => {
                            return Err(wrong_type(&pool.label, "pool", other.kind_str(), default_toolchain))
                        }
                        None => return Err(missing(&pool.label, default_toolchain)),
                    }
                }
            }
        }
        Item::Pool(_) => {}
    }
    Ok(item)
}

/// The diagnostic form of a label: the toolchain suffix is elided when it
/// matches the default toolchain.
fn visible(label: &Label, default_toolchain: Option<&Label>) -> String {
    match default_toolchain {
        Some(default) => label.get_user_visible_name_with_default(default),
        None => label.get_user_visible_name(true),
    }
}

fn missing(label: &Label, default_toolchain: Option<&Label>) -> anyhow::Error {
    GenError::new(
        ErrorKind::UnresolvedReference,
        format!(
            "internal: \"{}\" was not resolved before its dependent",
            visible(label, default_toolchain)
        ),
    )
    .into()
}

fn wrong_type(
    label: &Label,
    expected: &str,
    actual: &str,
    default_toolchain: Option<&Label>,
) -> anyhow::Error {
    GenError::new(
        ErrorKind::UnresolvedReference,
        format!(
            "\"{}\" names a {}, but a {} is required here",
            visible(label, default_toolchain),
            actual,
            expected
        ),
    )
    .into()
}

/// Runs the per-item resolution pipeline and publishes the immutable form.
pub fn resolve_item(item: Item, scheduler: &Arc<Scheduler>) -> NgenResult<ResolvedItem> {
    match item {
        Item::Target(mut target) => {
            resolve_target(&mut target, scheduler)?;
            Ok(ResolvedItem::Target(Arc::new(target)))
        }
        Item::Config(mut config) => {
            config.on_resolved();
            Ok(ResolvedItem::Config(Arc::new(config)))
        }
        Item::Toolchain(toolchain) => Ok(ResolvedItem::Toolchain(Arc::new(toolchain))),
        Item::Pool(pool) => Ok(ResolvedItem::Pool(Arc::new(pool))),
    }
}

/// Whether configs on `dep` are visible to `target` across the toolchain
/// boundary.
fn dep_propagates_configs(dep: &Target, target: &Target) -> bool {
    let same = dep.label().get_toolchain_label() == target.label().get_toolchain_label();
    same || dep
        .toolchain
        .as_ref()
        .map(|tc| tc.propagates_configs)
        .unwrap_or(false)
}

fn append_config_unique(dest: &mut Vec<LabelConfigPair>, pair: &LabelConfigPair) {
    if !dest.iter().any(|existing| existing.label == pair.label) {
        dest.push(pair.clone());
    }
}

fn resolve_target(target: &mut Target, scheduler: &Arc<Scheduler>) -> NgenResult<()> {
    debug_assert!(target.output_type != OutputType::Unknown);
    debug_assert!(target.toolchain.is_some());

    // Record which source languages appear; later steps and validators key
    // off this.
    for source in &target.sources {
        target.source_types_used.set(source.get_type());
    }

    check_tool_defined(target)?;

    // Copy this target's own dependent and public configs to the list of
    // configs applying to it.
    let own_dependent: Vec<LabelConfigPair> = target.all_dependent_configs.clone();
    for pair in &own_dependent {
        append_config_unique(&mut target.configs, pair);
    }
    let own_public: Vec<LabelConfigPair> = target.public_configs.clone();
    for pair in &own_public {
        append_config_unique(&mut target.configs, pair);
    }

    // Check visibility for just this target's own configs, before dependents
    // are added.
    check_config_visibility(target)?;

    pull_dependent_target_configs(target);

    // Re-export public deps' public configs as our own public configs.
    let mut inherited_public = Vec::new();
    for dep in &target.public_deps {
        let dep_target = dep.get();
        if dep_propagates_configs(dep_target, target) {
            for pair in &dep_target.public_configs {
                inherited_public.push(pair.clone());
            }
        }
    }
    for pair in &inherited_public {
        append_config_unique(&mut target.public_configs, pair);
    }

    pull_recursive_bundle_data(target);
    resolve_precompiled_headers(target)?;
    fill_output_files(target)?;
    fill_swift_partial_outputs(target)?;

    check_source_set_languages(target)?;
    check_visibility(target)?;
    check_testonly(target)?;
    check_assert_no_deps(target)?;
    check_sources_generated(target, scheduler);

    if let Some(file) = &target.write_runtime_deps {
        let out = OutputFile::from_source_file(target.settings().build_settings(), *file);
        target.write_runtime_deps_output = Some(out);
        scheduler.add_write_runtime_deps_target(*target.label());
        scheduler.add_runtime_deps_file(out);
    }

    if target.output_type == OutputType::GeneratedFile {
        debug_assert!(!target.computed_outputs.is_empty());
        let file = target.computed_outputs[0].as_source_file(target.settings().build_settings());
        scheduler.add_generated_file(file);
    }

    Ok(())
}

fn check_tool_defined(target: &Target) -> NgenResult<()> {
    let tool_name = target.tool_name_for_final_output();
    if tool_name == tool::TOOL_NONE {
        return Ok(());
    }
    let toolchain = target.toolchain.as_ref().unwrap();
    if toolchain.get_tool(tool_name).is_some() {
        return Ok(());
    }
    Err(GenError::new(
        ErrorKind::InvalidToolConfiguration,
        format!(
            "target {} of type \"{}\" uses toolchain {} which doesn't define the tool \"{}\"",
            target.label().get_user_visible_name(false),
            target.output_type.as_str(),
            toolchain.label().get_user_visible_name(false),
            tool_name
        ),
    )
    .at(target.defined_from().cloned())
    .into())
}

fn pull_dependent_target_configs(target: &mut Target) {
    let mut dependent = Vec::new();
    let mut public = Vec::new();
    for dep in target.public_deps.iter().chain(target.private_deps.iter()) {
        let dep_target = dep.get();
        if !dep_propagates_configs(dep_target, target) {
            continue;
        }
        for pair in &dep_target.all_dependent_configs {
            dependent.push(pair.clone());
        }
        for pair in &dep_target.public_configs {
            public.push(pair.clone());
        }
    }
    for pair in &dependent {
        append_config_unique(&mut target.configs, pair);
        append_config_unique(&mut target.all_dependent_configs, pair);
    }
    for pair in &public {
        append_config_unique(&mut target.configs, pair);
    }
}

fn pull_recursive_bundle_data(target: &mut Target) {
    let is_create_bundle = target.output_type == OutputType::CreateBundle;
    let mut collected: Vec<Arc<Target>> = Vec::new();

    for dep in target.public_deps.iter().chain(target.private_deps.iter()) {
        let dep_target = dep.get();
        // Bundle data doesn't cross toolchains.
        if dep_target.label().get_toolchain_label() != target.label().get_toolchain_label() {
            continue;
        }
        // An opaque create_bundle terminates propagation.
        if dep_target.output_type == OutputType::CreateBundle
            && !dep_target.bundle_data().transparent
        {
            continue;
        }
        if dep_target.output_type == OutputType::BundleData {
            collected.push(Arc::clone(dep_target));
        }
        if dep_target.has_bundle_data() {
            for forwarded in &dep_target.bundle_data().forwarded_bundle_deps {
                collected.push(Arc::clone(forwarded));
            }
        }
    }

    if collected.is_empty() && !is_create_bundle {
        return;
    }

    let mut seen: Vec<Label> = Vec::new();
    let bundle = target.bundle_data_mut();
    for dep in collected {
        if seen.contains(dep.label()) {
            continue;
        }
        seen.push(*dep.label());
        if is_create_bundle {
            bundle.bundle_deps.push(Arc::clone(&dep));
        } else {
            bundle.forwarded_bundle_deps.push(Arc::clone(&dep));
        }
    }
}

fn resolve_precompiled_headers(target: &mut Target) -> NgenResult<()> {
    // PCH settings are unique values, not concatenating lists. They may be
    // set anywhere but every setter must agree. `None` origin means the
    // settings came from the target itself.
    let mut from_label: Option<Label> = None;
    let mut has_settings = target.config_values().has_precompiled_headers();

    let config_list: Vec<LabelConfigPair> = target.configs.clone();
    for pair in &config_list {
        let config = pair.get();
        let cur = config.resolved_values();
        if !cur.has_precompiled_headers() {
            continue;
        }
        if has_settings {
            let mine = target.config_values();
            if mine.precompiled_header != cur.precompiled_header
                || mine.precompiled_source != cur.precompiled_source
            {
                let from = match &from_label {
                    Some(label) => label.get_user_visible_name(false),
                    None => target.label().get_user_visible_name(false),
                };
                return Err(GenError::new(
                    ErrorKind::PchConflict,
                    format!(
                        "the target {} has conflicting precompiled header settings",
                        target.label().get_user_visible_name(false)
                    ),
                )
                .with_help(format!(
                    "from {}\n  header: {}\n  source: {}\nfrom {}\n  header: {}\n  source: {}",
                    from,
                    mine.precompiled_header,
                    mine.precompiled_source
                        .map(|s| s.value().to_string())
                        .unwrap_or_default(),
                    config.label().get_user_visible_name(false),
                    cur.precompiled_header,
                    cur.precompiled_source
                        .map(|s| s.value().to_string())
                        .unwrap_or_default(),
                ))
                .at(target.defined_from().cloned())
                .into());
            }
        } else {
            from_label = Some(*config.label());
            has_settings = true;
            let values = target.config_values_mut();
            values.precompiled_header = cur.precompiled_header.clone();
            values.precompiled_source = cur.precompiled_source;
        }
    }
    Ok(())
}

fn fill_output_files(target: &mut Target) -> NgenResult<()> {
    let settings = Arc::clone(target.settings());
    let build_settings = Arc::clone(settings.build_settings());
    let toolchain = Arc::clone(target.toolchain.as_ref().unwrap());
    let tool = toolchain.get_tool_for_target_final_output(target);
    let mut check_tool_outputs = false;

    match target.output_type {
        OutputType::Group
        | OutputType::BundleData
        | OutputType::CreateBundle
        | OutputType::SourceSet
        | OutputType::CopyFiles
        | OutputType::Action
        | OutputType::ActionForeach
        | OutputType::GeneratedFile => {
            // These don't get linked to. With stamps enabled they depend on
            // "<target_out_dir>/<name>.stamp" (output_name never affects the
            // stamp); otherwise on a phony alias under phony/.
            if build_settings.no_stamp_files() {
                let dir = target.label().dir();
                target.dependency_output_file = Some(OutputFile::new(&format!(
                    "{}phony/{}{}",
                    settings.output_subdir(),
                    &dir.value()[2..],
                    target.label().name()
                )));
                target.dependency_is_phony = true;
            } else {
                let mut value = subst::build_dir_for_target(target, "obj");
                value.push_str(target.label().name());
                value.push_str(".stamp");
                target.dependency_output_file = Some(OutputFile::new(&value));
            }
        }
        OutputType::Executable | OutputType::LoadableModule => {
            // Executables and loadable modules don't get linked to, but the
            // first output is used for dependency management.
            let tool = tool.expect("checked in check_tool_defined");
            check_tool_outputs = true;
            let first = subst::apply_pattern_to_linker_as_output_file(
                target,
                tool,
                &tool.outputs.list()[0],
            )?;
            target.dependency_output_file = Some(first);
            if tool.runtime_outputs.is_empty() {
                target.runtime_outputs.push(first);
            } else {
                target.runtime_outputs =
                    subst::apply_list_to_linker_as_output_file(target, tool, &tool.runtime_outputs)?;
            }
        }
        OutputType::RustLibrary | OutputType::StaticLibrary => {
            let tool = tool.expect("checked in check_tool_defined");
            check_tool_outputs = true;
            let first = subst::apply_pattern_to_linker_as_output_file(
                target,
                tool,
                &tool.outputs.list()[0],
            )?;
            target.link_output_file = Some(first);
            target.dependency_output_file = Some(first);
        }
        OutputType::RustProcMacro | OutputType::SharedLibrary => {
            let tool = tool.expect("checked in check_tool_defined");
            check_tool_outputs = true;
            if let Some(c_tool) = tool.as_c() {
                if c_tool.link_output.is_empty() && c_tool.depend_output.is_empty() {
                    let first = subst::apply_pattern_to_linker_as_output_file(
                        target,
                        tool,
                        &tool.outputs.list()[0],
                    )?;
                    target.link_output_file = Some(first);
                    target.dependency_output_file = Some(first);
                } else {
                    if !c_tool.link_output.is_empty() {
                        target.link_output_file = Some(
                            subst::apply_pattern_to_linker_as_output_file(
                                target,
                                tool,
                                &c_tool.link_output,
                            )?,
                        );
                    }
                    if !c_tool.depend_output.is_empty() {
                        target.dependency_output_file = Some(
                            subst::apply_pattern_to_linker_as_output_file(
                                target,
                                tool,
                                &c_tool.depend_output,
                            )?,
                        );
                    }
                }
                if tool.runtime_outputs.is_empty() {
                    if let Some(link) = target.link_output_file {
                        target.runtime_outputs.push(link);
                    }
                } else {
                    target.runtime_outputs = subst::apply_list_to_linker_as_output_file(
                        target,
                        tool,
                        &tool.runtime_outputs,
                    )?;
                }
            } else if tool.as_rust().is_some() {
                let first = subst::apply_pattern_to_linker_as_output_file(
                    target,
                    tool,
                    &tool.outputs.list()[0],
                )?;
                target.link_output_file = Some(first);
                target.dependency_output_file = Some(first);
            }
        }
        OutputType::Unknown => unreachable!("output type validated by the frontend"),
    }

    // Count all outputs from the tool as generated by this target. Output
    // patterns often expand with a leading "./" which must be normalized to
    // match SourceFile-derived forms.
    if check_tool_outputs {
        let tool = tool.expect("checked above");
        let outputs = subst::apply_list_to_linker_as_output_file(target, tool, &tool.outputs)?;
        for out in outputs {
            target.computed_outputs.push(out.normalized());
        }
    }

    // Also count anything the target declared as an output.
    if target.has_action_values() {
        let outputs = get_action_outputs_as_source_files(target)?;
        for out in outputs {
            target
                .computed_outputs
                .push(OutputFile::from_source_file(&build_settings, out));
        }
    }

    Ok(())
}

/// The declared outputs of an action/copy/generated_file target as source
/// files: per-source for the foreach flavors, once for the rest.
pub fn get_action_outputs_as_source_files(target: &Target) -> NgenResult<Vec<SourceFile>> {
    let toolchain = target.toolchain.as_ref().unwrap();
    let tool = toolchain
        .get_tool(tool::GENERAL_TOOL_STAMP)
        .or_else(|| toolchain.get_tool(tool::BUILTIN_TOOL_PHONY))
        .expect("phony always present");
    let action = target.action_values();
    let mut outputs = Vec::new();
    if matches!(
        target.output_type,
        OutputType::CopyFiles | OutputType::ActionForeach
    ) {
        for source in &target.sources {
            outputs.extend(subst::apply_output_list_as_source_files(
                target,
                tool,
                Some(source),
                &action.outputs,
            )?);
        }
    } else {
        outputs.extend(subst::apply_output_list_as_source_files(
            target,
            tool,
            None,
            &action.outputs,
        )?);
    }
    Ok(outputs)
}

fn fill_swift_partial_outputs(target: &mut Target) -> NgenResult<()> {
    if !target.source_types_used.swift_source_used() {
        return Ok(());
    }
    let toolchain = Arc::clone(target.toolchain.as_ref().unwrap());
    let Some(swift_tool) = toolchain.get_tool(tool::C_TOOL_SWIFT) else {
        return Ok(());
    };
    if swift_tool.partial_outputs.is_empty() {
        return Ok(());
    }
    let mut partials = Vec::new();
    for source in &target.sources {
        if source.get_type() != FileType::Swift {
            continue;
        }
        partials.extend(subst::apply_list_to_compiler_as_output_file(
            target,
            swift_tool,
            source,
            &swift_tool.partial_outputs,
        )?);
    }
    target.swift_values_mut().partial_outputs = partials;
    Ok(())
}

// =============================================================================
// Validators

fn check_source_set_languages(target: &Target) -> NgenResult<()> {
    if target.output_type == OutputType::SourceSet
        && target.source_types_used.rust_source_used()
    {
        return Err(GenError::new(
            ErrorKind::InvalidToolConfiguration,
            format!(
                "{} has Rust code, but only C/C++ source_sets are supported",
                target.label().get_user_visible_name(false)
            ),
        )
        .at(target.defined_from().cloned())
        .into());
    }
    Ok(())
}

fn check_visibility(target: &Target) -> NgenResult<()> {
    let default = *target.settings().default_toolchain_label();
    for pair in target.deps(DepsIterationType::All) {
        let dep = pair.get();
        if !dep.visibility.is_empty()
            && !LabelPattern::vector_matches(&dep.visibility, target.label())
        {
            return Err(GenError::new(
                ErrorKind::VisibilityViolation,
                format!(
                    "{} is not visible from {}",
                    dep.label().get_user_visible_name_with_default(&default),
                    target.label().get_user_visible_name_with_default(&default)
                ),
            )
            .at(pair.origin.clone())
            .with_help("Either move this target into the visibility list or refactor.")
            .into());
        }
    }
    Ok(())
}

fn check_config_visibility(target: &Target) -> NgenResult<()> {
    let default = *target.settings().default_toolchain_label();
    for pair in &target.configs {
        let config = pair.get();
        if !config.visibility.is_empty()
            && !LabelPattern::vector_matches(&config.visibility, target.label())
        {
            return Err(GenError::new(
                ErrorKind::VisibilityViolation,
                format!(
                    "config {} is not visible from {}",
                    config.label().get_user_visible_name_with_default(&default),
                    target.label().get_user_visible_name_with_default(&default)
                ),
            )
            .at(pair.origin.clone())
            .into());
        }
    }
    Ok(())
}

fn testonly_error(target: &Target, to: &Label) -> anyhow::Error {
    let default = *target.settings().default_toolchain_label();
    GenError::new(
        ErrorKind::TestonlyViolation,
        format!(
            "{} which is NOT marked testonly can't depend on {} which is marked testonly",
            target.label().get_user_visible_name_with_default(&default),
            to.get_user_visible_name_with_default(&default)
        ),
    )
    .at(target.defined_from().cloned())
    .with_help("Only targets with \"testonly = true\" can depend on other test-only targets.")
    .into()
}

fn check_testonly(target: &Target) -> NgenResult<()> {
    // A testonly target can include both testonly and non-testonly deps.
    if target.testonly {
        return Ok(());
    }
    for pair in target.deps(DepsIterationType::All) {
        if pair.get().testonly {
            return Err(testonly_error(target, &pair.label));
        }
    }
    for pair in &target.configs {
        if pair.get().testonly {
            return Err(testonly_error(target, &pair.label));
        }
    }
    Ok(())
}

/// DFS over the dep closure (executables excluded) for labels matching the
/// assert_no_deps patterns, reconstructing the failing path for the error.
fn recursive_check_assert_no_deps(
    target: &Target,
    check_this: bool,
    assert_no: &[LabelPattern],
    visited: &mut HashSet<Label>,
    failure_path: &mut Vec<Label>,
) -> Option<LabelPattern> {
    if !visited.insert(*target.label()) {
        return None;
    }

    if check_this {
        for pattern in assert_no {
            if pattern.matches(target.label()) {
                failure_path.push(*target.label());
                return Some(pattern.clone());
            }
        }
    }

    for pair in target.deps(DepsIterationType::All) {
        let dep = pair.get();
        if dep.output_type == OutputType::Executable {
            continue;
        }
        if let Some(pattern) =
            recursive_check_assert_no_deps(dep, true, assert_no, visited, failure_path)
        {
            failure_path.insert(0, *target.label());
            return Some(pattern);
        }
    }
    None
}

fn check_assert_no_deps(target: &Target) -> NgenResult<()> {
    if target.assert_no_deps.is_empty() {
        return Ok(());
    }
    let mut visited = HashSet::new();
    let mut failure_path = Vec::new();
    if let Some(pattern) = recursive_check_assert_no_deps(
        target,
        false,
        &target.assert_no_deps,
        &mut visited,
        &mut failure_path,
    ) {
        let path = failure_path
            .iter()
            .map(|l| l.get_user_visible_name(false))
            .join(" ->\n  ");
        return Err(GenError::new(
            ErrorKind::AssertNoDepsViolation,
            format!(
                "{} has an assert_no_deps entry:\n  {}\nwhich fails for the dependency path:\n  {}",
                target.label().get_user_visible_name(false),
                pattern.describe(),
                path
            ),
        )
        .at(target.defined_from().cloned())
        .into());
    }
    Ok(())
}

// =============================================================================
// Generated-input checking

/// Per-source compile outputs for object-file probing and the C writer.
/// Returns the tool name and outputs, or None when nothing compiles this
/// source (headers, objects, Rust sources which compile per crate).
pub fn get_outputs_for_source(
    target: &Target,
    source: &SourceFile,
) -> NgenResult<Option<(&'static str, Vec<OutputFile>)>> {
    debug_assert!(target.toolchain.is_some());
    let file_type = source.get_type();
    if file_type == FileType::Unknown || file_type == FileType::Rs {
        return Ok(None);
    }
    if file_type == FileType::O {
        // Object files pass through to the link untouched.
        return Ok(Some((
            tool::TOOL_NONE,
            vec![OutputFile::from_source_file(
                target.settings().build_settings(),
                *source,
            )],
        )));
    }
    let tool_name = Tool::tool_for_source_type(file_type);
    if tool_name == tool::TOOL_NONE {
        return Ok(None);
    }
    let toolchain = target.toolchain.as_ref().unwrap();
    let Some(compile_tool) = toolchain.get_tool(tool_name) else {
        return Ok(None);
    };
    let list = if file_type == FileType::Swift {
        if compile_tool.partial_outputs.is_empty() {
            return Ok(None);
        }
        &compile_tool.partial_outputs
    } else {
        &compile_tool.outputs
    };
    let outputs = subst::apply_list_to_compiler_as_output_file(target, compile_tool, source, list)?;
    if outputs.is_empty() {
        return Ok(None);
    }
    Ok(Some((tool_name, outputs)))
}

fn ensure_file_is_generated_by_dependency(
    target: &Target,
    file: &OutputFile,
    check_private_deps: bool,
    consider_object_files: bool,
    check_data_deps: bool,
    seen: &mut HashSet<Label>,
) -> bool {
    if !seen.insert(*target.label()) {
        return false;
    }

    if target.computed_outputs.iter().any(|out| out == file) {
        return true;
    }
    if target.write_runtime_deps_output.as_ref() == Some(file) {
        return true;
    }

    // Binary target intermediate files, only when requested (slow path).
    if consider_object_files && target.is_binary() {
        for source in &target.sources {
            if let Ok(Some((_, outputs))) = get_outputs_for_source(target, source) {
                if outputs.iter().any(|out| out == file) {
                    return true;
                }
            }
        }
    }

    if check_data_deps {
        // Consider only direct data deps.
        for pair in &target.data_deps {
            if ensure_file_is_generated_by_dependency(
                pair.get(),
                file,
                false,
                consider_object_files,
                false,
                seen,
            ) {
                return true;
            }
        }
    }

    for pair in &target.public_deps {
        if ensure_file_is_generated_by_dependency(
            pair.get(),
            file,
            false,
            consider_object_files,
            check_data_deps,
            seen,
        ) {
            return true;
        }
    }

    if check_private_deps {
        for pair in &target.private_deps {
            if ensure_file_is_generated_by_dependency(
                pair.get(),
                file,
                false,
                consider_object_files,
                check_data_deps,
                seen,
            ) {
                return true;
            }
        }
        if target.output_type == OutputType::CreateBundle {
            for dep in &target.bundle_data().bundle_deps {
                if ensure_file_is_generated_by_dependency(
                    dep,
                    file,
                    false,
                    consider_object_files,
                    check_data_deps,
                    seen,
                ) {
                    return true;
                }
            }
        }
    }
    false
}

/// Warns when a source or input inside the build directory is not produced
/// by anything this target depends on. The expensive object-file probe runs
/// only after the cheap pass fails.
fn check_sources_generated(target: &Target, scheduler: &Arc<Scheduler>) {
    let mut check_one = |file: &SourceFile| {
        let build_dir = target.settings().build_settings().build_dir().value();
        if !file.value().starts_with(build_dir) {
            return; // Not in the output dir, fine.
        }
        let out_file = OutputFile::from_source_file(target.settings().build_settings(), *file);

        let mut seen = HashSet::new();
        if ensure_file_is_generated_by_dependency(target, &out_file, true, false, false, &mut seen)
        {
            return;
        }

        seen.clear();
        let check_data_deps = scheduler.is_file_generated_by_write_runtime_deps(&out_file)
            || scheduler.is_file_generated_by_target(file);
        // Check object files (much slower and very rare) only when the
        // normal output check failed.
        let consider_object_files = !check_data_deps;
        if !ensure_file_is_generated_by_dependency(
            target,
            &out_file,
            true,
            consider_object_files,
            check_data_deps,
            &mut seen,
        ) {
            scheduler.add_unknown_generated_input(*target.label(), *file);
        }
    };

    for file in &target.sources {
        check_one(file);
    }
    for file in &target.inputs {
        check_one(file);
    }
    for pair in &target.configs {
        for file in &pair.get().resolved_values().inputs {
            check_one(file);
        }
    }
    for file in &target.config_values().inputs {
        check_one(file);
    }
}
