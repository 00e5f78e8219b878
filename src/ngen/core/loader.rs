use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::core::build_settings::BuildSettings;
use crate::core::builder::Builder;
use crate::core::item::Item;
use crate::core::label::Label;
use crate::core::scheduler::Scheduler;
use crate::core::settings::Settings;
use crate::core::source_file::SourceFile;
use crate::frontend::lower::FileExecutor;
use crate::frontend::parser;
use crate::frontend::value::{Scope, ValueMap};
use crate::util::errors::{ErrorKind, GenError, NgenResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoadState {
    Loading,
    Loaded,
}

struct ToolchainRecord {
    settings: Arc<Settings>,
    /// The scope produced by executing the build config in this toolchain's
    /// context; the base for every file loaded in the toolchain.
    base_values: ValueMap,
}

#[derive(Default)]
struct LoaderState {
    load_states: HashMap<(SourceFile, Label), LoadState>,
    toolchains: HashMap<Label, Arc<ToolchainRecord>>,
    /// Files waiting for their toolchain's definition (and arg overrides)
    /// to arrive. Keyed by toolchain label; the value also remembers the
    /// definition file so a fruitless load can be diagnosed.
    pending_files: HashMap<Label, (SourceFile, Vec<SourceFile>)>,
    default_toolchain: Option<Label>,
}

/// The per-(file, toolchain) load state machine. Guarantees each build file
/// is parsed once per toolchain, executes the build config once per
/// toolchain (with that toolchain's arg overrides merged atop command-line
/// args, except for the default toolchain), and feeds declared items to the
/// Builder.
pub struct Loader {
    scheduler: Arc<Scheduler>,
    builder: Arc<Builder>,
    build_settings: Arc<BuildSettings>,
    state: Mutex<LoaderState>,
}

impl Loader {
    pub fn new(
        scheduler: Arc<Scheduler>,
        builder: Arc<Builder>,
        build_settings: Arc<BuildSettings>,
    ) -> Arc<Loader> {
        let loader = Arc::new(Loader {
            scheduler,
            builder,
            build_settings,
            state: Mutex::new(LoaderState::default()),
        });

        // Wire the Builder's lazy-load callback: a referenced-but-unseen
        // label pulls in its directory's build file under the label's
        // toolchain (or the default toolchain for toolchain-less labels).
        let weak = Arc::downgrade(&loader);
        loader.builder.set_load_requester(Box::new(move |label: &Label| {
            if let Some(loader) = weak.upgrade() {
                loader.request_load_for_label(label);
            }
        }));

        loader
    }

    pub fn default_toolchain(&self) -> Option<Label> {
        self.state.lock().unwrap().default_toolchain
    }

    pub fn get_toolchain_settings(&self, toolchain: &Label) -> Option<Arc<Settings>> {
        self.state
            .lock()
            .unwrap()
            .toolchains
            .get(toolchain)
            .map(|r| Arc::clone(&r.settings))
    }

    fn build_file_for_dir(&self, dir: &crate::core::source_dir::SourceDir) -> SourceFile {
        SourceFile::new(&format!(
            "{}{}",
            dir.value(),
            self.build_settings.build_file_name()
        ))
    }

    fn request_load_for_label(self: &Arc<Self>, label: &Label) {
        let toolchain = if label.has_toolchain() {
            label.get_toolchain_label()
        } else {
            match self.default_toolchain() {
                Some(tc) => tc,
                None => return, // Bootstrap not finished; root load covers it.
            }
        };
        let file = self.build_file_for_dir(label.dir());
        self.load(file, toolchain);
    }

    /// Reads and parses a file, registering it as a generation dependency.
    fn read_and_parse(&self, file: &SourceFile) -> NgenResult<Vec<parser::Statement>> {
        let mut path = self.build_settings.get_full_path(file);
        let mut contents = fs::read_to_string(&path);
        if contents.is_err() {
            if let Some(secondary) = self.build_settings.get_full_path_secondary(file) {
                if let Ok(text) = fs::read_to_string(&secondary) {
                    path = secondary;
                    contents = Ok(text);
                }
            }
        }
        let contents = contents.map_err(|e| {
            anyhow::Error::from(
                GenError::new(
                    ErrorKind::Io,
                    format!("can't load build file {}: {}", file.value(), e),
                ),
            )
        })?;
        self.scheduler.add_gen_dependency(path);
        parser::parse_file(&contents, file)
    }

    /// Executes the build config file for one toolchain, producing its
    /// record. For the default toolchain `toolchain_args` must be empty
    /// (overrides are expected to come from args.gn / --args).
    fn create_toolchain_record(
        self: &Arc<Self>,
        toolchain: Label,
        toolchain_args: Option<&ValueMap>,
        default_toolchain: Label,
    ) -> NgenResult<Arc<ToolchainRecord>> {
        let build_config = *self.build_settings.build_config_file();
        debug!(
            "executing build config {} for toolchain {}",
            build_config.value(),
            toolchain.get_user_visible_name(false)
        );
        let statements = self.read_and_parse(&build_config)?;

        let settings = Arc::new(Settings::new(
            Arc::clone(&self.build_settings),
            toolchain,
            default_toolchain,
        ));

        let seed = self
            .build_settings
            .build_args()
            .merged_for_toolchain(toolchain_args);
        let mut scope = Scope::new(seed);
        let mut executor = FileExecutor::new(&settings, build_config);
        executor.run(&statements, &mut scope)?;
        if !executor.items.is_empty() {
            return Err(GenError::new(
                ErrorKind::Parse,
                "the build config file may not declare targets or toolchains".to_string(),
            )
            .into());
        }

        Ok(Arc::new(ToolchainRecord {
            settings,
            base_values: scope.into_values(),
        }))
    }

    /// Bootstraps: executes the build config once to learn the default
    /// toolchain, records the default toolchain's settings, and loads the
    /// root build file.
    pub fn load_root(self: &Arc<Self>) -> NgenResult<()> {
        let build_config = *self.build_settings.build_config_file();
        let statements = self.read_and_parse(&build_config)?;

        // First execution runs with a placeholder toolchain to discover
        // set_default_toolchain().
        let placeholder = Label::default();
        let bootstrap_settings = Arc::new(Settings::new(
            Arc::clone(&self.build_settings),
            placeholder,
            placeholder,
        ));
        let seed = self.build_settings.build_args().merged_for_toolchain(None);
        let mut scope = Scope::new(seed);
        let mut executor = FileExecutor::new(&bootstrap_settings, build_config);
        executor.run(&statements, &mut scope)?;

        let default_toolchain = executor.default_toolchain.ok_or_else(|| {
            anyhow::Error::from(GenError::new(
                ErrorKind::Parse,
                format!(
                    "the build config file {} must call set_default_toolchain()",
                    build_config.value()
                ),
            ))
        })?;
        debug!(
            "default toolchain: {}",
            default_toolchain.get_user_visible_name(false)
        );
        self.builder.set_default_toolchain(default_toolchain);

        let record =
            self.create_toolchain_record(default_toolchain, None, default_toolchain)?;
        {
            let mut state = self.state.lock().unwrap();
            state.default_toolchain = Some(default_toolchain);
            state.toolchains.insert(default_toolchain, record);
        }

        let root_dir = *self.build_settings.root_target_label().dir();
        let root_dir = if root_dir.is_null() {
            crate::core::source_dir::SourceDir::new("//")
        } else {
            root_dir
        };
        let root_file = self.build_file_for_dir(&root_dir);
        self.load(root_file, default_toolchain);
        Ok(())
    }

    /// Requests a (file, toolchain) load. Duplicate requests collapse; the
    /// parse happens on a scheduler worker. Files in not-yet-defined
    /// toolchains wait for the toolchain definition to arrive.
    pub fn load(self: &Arc<Self>, file: SourceFile, toolchain: Label) {
        let key = (file, toolchain);
        let mut state = self.state.lock().unwrap();
        if state.load_states.contains_key(&key) {
            return;
        }
        state.load_states.insert(key, LoadState::Loading);

        if state.toolchains.contains_key(&toolchain) {
            drop(state);
            self.schedule_file_load(file, toolchain);
        } else {
            // Defer until the toolchain item (with its arg overrides) is
            // defined. Make sure the definition file itself gets loaded.
            trace!(
                "deferring {} until toolchain {} is defined",
                file.value(),
                toolchain.get_user_visible_name(false)
            );
            let definition_file = self.build_file_for_dir(toolchain.dir());
            self.scheduler.increment_work_count();
            state
                .pending_files
                .entry(toolchain)
                .or_insert_with(|| (definition_file, Vec::new()))
                .1
                .push(file);
            let default = state.default_toolchain;
            drop(state);
            if let Some(default) = default {
                self.load(definition_file, default);
            }
        }
    }

    fn schedule_file_load(self: &Arc<Self>, file: SourceFile, toolchain: Label) {
        let loader = Arc::clone(self);
        self.scheduler.schedule_work(Box::new(move || {
            if let Err(err) = loader.execute_file(file, toolchain) {
                let gen_err = match err.downcast::<GenError>() {
                    Ok(gen) => gen,
                    Err(other) => GenError::new(ErrorKind::Other, other.to_string()),
                };
                loader.scheduler.fail_with_error(gen_err);
            }
        }));
    }

    /// Like `schedule_file_load` but reuses a work count already taken when
    /// the file was deferred.
    fn schedule_deferred_file_load(self: &Arc<Self>, file: SourceFile, toolchain: Label) {
        let loader = Arc::clone(self);
        self.scheduler.schedule_work_counted(Box::new(move || {
            if let Err(err) = loader.execute_file(file, toolchain) {
                let gen_err = match err.downcast::<GenError>() {
                    Ok(gen) => gen,
                    Err(other) => GenError::new(ErrorKind::Other, other.to_string()),
                };
                loader.scheduler.fail_with_error(gen_err);
            }
        }));
    }

    fn execute_file(self: &Arc<Self>, file: SourceFile, toolchain: Label) -> NgenResult<()> {
        if self.scheduler.is_failed() {
            return Ok(());
        }
        debug!(
            "loading {} in toolchain {}",
            file.value(),
            toolchain.get_user_visible_name(false)
        );

        let record = {
            let state = self.state.lock().unwrap();
            Arc::clone(state.toolchains.get(&toolchain).expect("toolchain record"))
        };

        let statements = self.read_and_parse(&file)?;
        let base = Scope::new(record.base_values.clone());
        let mut scope = Scope::with_parent(&base);
        let mut executor = FileExecutor::new(&record.settings, file);
        executor.run(&statements, &mut scope)?;

        let items = std::mem::take(&mut executor.items);
        drop(executor);
        for mut item in items {
            if let Item::Target(target) = &mut item {
                target.settings = Some(Arc::clone(&record.settings));
            }
            if let Item::Toolchain(tc) = &item {
                self.toolchain_defined(tc.label(), &tc.args);
            }
            self.builder.item_defined(item);
        }

        {
            let mut state = self.state.lock().unwrap();
            state.load_states.insert((file, toolchain), LoadState::Loaded);
        }
        self.check_fruitless_definitions(&file, &toolchain);
        Ok(())
    }

    /// Called when a toolchain item is declared: creates its record and
    /// flushes files that were waiting on it.
    fn toolchain_defined(self: &Arc<Self>, toolchain_label: &Label, args: &ValueMap) {
        let (default, already) = {
            let state = self.state.lock().unwrap();
            (
                state.default_toolchain,
                state.toolchains.contains_key(toolchain_label),
            )
        };
        let Some(default) = default else { return };
        if already {
            return;
        }

        let args = if *toolchain_label == default {
            // Arg overrides on the default toolchain are ignored; those come
            // from args.gn / --args.
            None
        } else {
            Some(args)
        };
        let record = match self.create_toolchain_record(*toolchain_label, args, default) {
            Ok(record) => record,
            Err(err) => {
                let gen_err = match err.downcast::<GenError>() {
                    Ok(gen) => gen,
                    Err(other) => GenError::new(ErrorKind::Other, other.to_string()),
                };
                self.scheduler.fail_with_error(gen_err);
                return;
            }
        };

        let waiting = {
            let mut state = self.state.lock().unwrap();
            state.toolchains.insert(*toolchain_label, record);
            state
                .pending_files
                .remove(toolchain_label)
                .map(|(_, files)| files)
                .unwrap_or_default()
        };
        for file in waiting {
            self.schedule_deferred_file_load(file, *toolchain_label);
        }
    }

    /// After a file in the default toolchain finishes, any toolchain still
    /// pending whose definition file was this one will never arrive; report
    /// it rather than hanging the drain.
    fn check_fruitless_definitions(&self, file: &SourceFile, toolchain: &Label) {
        let is_default = {
            let state = self.state.lock().unwrap();
            state.default_toolchain == Some(*toolchain)
        };
        if !is_default {
            return;
        }
        let dead: Vec<(Label, Vec<SourceFile>)> = {
            let mut state = self.state.lock().unwrap();
            let dead_keys: Vec<Label> = state
                .pending_files
                .iter()
                .filter(|(_, (definition, _))| definition == file)
                .map(|(l, _)| *l)
                .collect();
            dead_keys
                .into_iter()
                .map(|l| {
                    let (_, files) = state.pending_files.remove(&l).unwrap();
                    (l, files)
                })
                .collect()
        };
        for (toolchain, files) in dead {
            self.scheduler.fail_with_error(GenError::new(
                ErrorKind::UnresolvedReference,
                format!(
                    "the toolchain {} was referenced but {} does not define it",
                    toolchain.get_user_visible_name(false),
                    file.value()
                ),
            ));
            for _ in files {
                self.scheduler.decrement_work_count();
            }
        }
    }
}
