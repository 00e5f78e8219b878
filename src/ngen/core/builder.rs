use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use itertools::Itertools;
use tracing::trace;

use crate::core::config::Config;
use crate::core::item::Item;
use crate::core::label::Label;
use crate::core::pool::Pool;
use crate::core::resolve;
use crate::core::scheduler::Scheduler;
use crate::core::target::Target;
use crate::core::toolchain::Toolchain;
use crate::util::errors::{ErrorKind, GenError, Location};

/// A resolved, immutable item published for dependents to read.
#[derive(Clone)]
pub enum ResolvedItem {
    Target(Arc<Target>),
    Config(Arc<Config>),
    Toolchain(Arc<Toolchain>),
    Pool(Arc<Pool>),
}

impl ResolvedItem {
    pub fn kind_str(&self) -> &'static str {
        match self {
            ResolvedItem::Target(_) => "target",
            ResolvedItem::Config(_) => "config",
            ResolvedItem::Toolchain(_) => "toolchain",
            ResolvedItem::Pool(_) => "pool",
        }
    }

    pub fn as_target(&self) -> Option<&Arc<Target>> {
        match self {
            ResolvedItem::Target(t) => Some(t),
            _ => None,
        }
    }

    pub fn testonly(&self) -> bool {
        match self {
            ResolvedItem::Target(t) => t.testonly,
            ResolvedItem::Config(c) => c.testonly,
            _ => false,
        }
    }
}

#[derive(Default)]
struct Record {
    /// Declared but not yet resolved.
    item: Option<Item>,
    /// Where the declaration came from, kept for duplicate reporting.
    defined_from: Option<Location>,
    resolved: Option<ResolvedItem>,
    /// Number of this item's references that have not resolved yet.
    waiting_count: usize,
    /// Items waiting on this one.
    waiting_on_me: Vec<Label>,
    /// The labels this item references, kept for post-drain diagnosis.
    dep_labels: Vec<Label>,
    /// Whether we already asked the Loader for this label's build file.
    load_requested: bool,
}

type LoadRequester = Box<dyn Fn(&Label) + Send + Sync>;

/// The deferred-item registry: records items by label, tracks unresolved
/// references, triggers the resolution pipeline when the last dependency
/// arrives, and classifies leftovers as dangling references or cycles after
/// the scheduler drains.
pub struct Builder {
    state: Mutex<HashMap<Label, Record>>,
    scheduler: Arc<Scheduler>,
    load_requester: Mutex<Option<LoadRequester>>,
    /// Set by the Loader once the build config has named it; diagnostics
    /// elide this toolchain from labels.
    default_toolchain: OnceLock<Label>,
}

impl Builder {
    pub fn new(scheduler: Arc<Scheduler>) -> Builder {
        Builder {
            state: Mutex::new(HashMap::new()),
            scheduler,
            load_requester: Mutex::new(None),
            default_toolchain: OnceLock::new(),
        }
    }

    /// Wires the callback used to lazily load the build file that should
    /// define a referenced-but-unseen label.
    pub fn set_load_requester(&self, requester: LoadRequester) {
        *self.load_requester.lock().unwrap() = Some(requester);
    }

    pub fn set_default_toolchain(&self, label: Label) {
        let _ = self.default_toolchain.set(label);
    }

    /// The diagnostic name of a label: the toolchain suffix appears only
    /// when it isn't the default one.
    fn visible(&self, label: &Label) -> String {
        match self.default_toolchain.get() {
            Some(default) => label.get_user_visible_name_with_default(default),
            None => label.get_user_visible_name(true),
        }
    }

    /// The labels an item references and therefore must wait for.
    fn dep_labels_of(item: &Item) -> Vec<Label> {
        let mut labels = Vec::new();
        match item {
            Item::Target(target) => {
                for pair in target
                    .private_deps
                    .iter()
                    .chain(&target.public_deps)
                    .chain(&target.data_deps)
                    .chain(&target.gen_deps)
                {
                    labels.push(pair.label);
                }
                for pair in target
                    .configs
                    .iter()
                    .chain(&target.public_configs)
                    .chain(&target.all_dependent_configs)
                {
                    labels.push(pair.label);
                }
                if let Some(pool) = &target.pool {
                    labels.push(pool.label);
                }
                labels.push(target.label().get_toolchain_label());
            }
            Item::Config(config) => {
                for pair in &config.configs {
                    labels.push(pair.label);
                }
            }
            Item::Toolchain(toolchain) => {
                for pair in &toolchain.deps {
                    labels.push(pair.label);
                }
                for tool in toolchain.tools() {
                    if let Some(pool) = &tool.pool {
                        labels.push(pool.label);
                    }
                }
            }
            Item::Pool(_) => {}
        }
        labels
    }

    /// Called (from any worker) when the frontend declares an item.
    pub fn item_defined(self: &Arc<Self>, item: Item) {
        let label = *item.label();
        trace!("item defined: {}", label);

        let mut to_load = Vec::new();
        let ready = {
            let mut state = self.state.lock().unwrap();

            let existing = state.entry(label).or_default();
            if existing.item.is_some() || existing.resolved.is_some() {
                let previous = existing.defined_from.clone();
                let mut err = GenError::new(
                    ErrorKind::DuplicateItem,
                    format!(
                        "the {} {} is declared twice in the same toolchain",
                        item.kind_str(),
                        self.visible(&label)
                    ),
                )
                .at(item.defined_from().cloned());
                if previous.is_some() {
                    err = err.with_sub_error(
                        GenError::new(ErrorKind::DuplicateItem, "previous declaration".to_string())
                            .at(previous),
                    );
                }
                self.scheduler.fail_with_error(err);
                return;
            }

            let dep_labels = Self::dep_labels_of(&item);
            let mut waiting = 0usize;
            for dep in &dep_labels {
                if *dep == label {
                    continue; // A toolchain's own-toolchain reference.
                }
                let dep_record = state.entry(*dep).or_default();
                if dep_record.resolved.is_none() {
                    waiting += 1;
                    dep_record.waiting_on_me.push(label);
                    if dep_record.item.is_none() && !dep_record.load_requested {
                        dep_record.load_requested = true;
                        to_load.push(*dep);
                    }
                }
            }

            let record = state.get_mut(&label).unwrap();
            record.defined_from = item.defined_from().cloned();
            record.dep_labels = dep_labels;
            record.item = Some(item);
            record.waiting_count = waiting;
            waiting == 0
        };

        for dep in to_load {
            self.request_load(&dep);
        }

        if ready {
            self.schedule_resolution(label);
        }
    }

    fn request_load(&self, label: &Label) {
        if let Some(requester) = &*self.load_requester.lock().unwrap() {
            requester(label);
        }
    }

    fn schedule_resolution(self: &Arc<Self>, label: Label) {
        let builder = Arc::clone(self);
        self.scheduler.schedule_work(Box::new(move || {
            builder.resolve_record(label);
        }));
    }

    /// Runs the resolution pipeline for one item whose references have all
    /// resolved, then unblocks dependents.
    fn resolve_record(self: &Arc<Self>, label: Label) {
        if self.scheduler.is_failed() {
            return; // An earlier error already doomed the run.
        }

        let item = {
            let mut state = self.state.lock().unwrap();
            let record = state.get_mut(&label).expect("record vanished");
            debug_assert_eq!(record.waiting_count, 0);
            match record.item.take() {
                Some(item) => item,
                None => return,
            }
        };

        let resolved = {
            // Dependencies are immutable now; snapshot the Arcs we need.
            let state = self.state.lock().unwrap();
            let lookup = |l: &Label| -> Option<ResolvedItem> {
                state.get(l).and_then(|r| r.resolved.clone())
            };
            resolve::fill_resolved_references(item, &lookup, self.default_toolchain.get())
        };

        let resolved = match resolved {
            Ok(item) => resolve::resolve_item(item, &self.scheduler),
            Err(err) => Err(err),
        };

        match resolved {
            Ok(resolved) => {
                trace!("resolved: {}", label);
                let now_ready = {
                    let mut state = self.state.lock().unwrap();
                    let record = state.get_mut(&label).unwrap();
                    record.resolved = Some(resolved);
                    let waiters = std::mem::take(&mut record.waiting_on_me);
                    let mut ready = Vec::new();
                    for waiter in waiters {
                        let waiter_record = state.get_mut(&waiter).unwrap();
                        waiter_record.waiting_count -= 1;
                        if waiter_record.waiting_count == 0 && waiter_record.item.is_some() {
                            ready.push(waiter);
                        }
                    }
                    ready
                };
                for ready in now_ready {
                    self.schedule_resolution(ready);
                }
            }
            Err(err) => {
                let gen_err = match err.downcast::<GenError>() {
                    Ok(gen) => gen,
                    Err(other) => GenError::new(ErrorKind::Other, other.to_string()),
                };
                self.scheduler.fail_with_error(gen_err);
            }
        }
    }

    /// After the scheduler drains: reports items that never resolved, as
    /// dangling references or cycles.
    pub fn check_for_bad_items(&self) -> Vec<GenError> {
        let state = self.state.lock().unwrap();
        let mut errors = Vec::new();

        // Labels that were referenced but never declared.
        let mut reported_undeclared = Vec::new();
        for (label, record) in state.iter() {
            if record.item.is_none() {
                continue;
            }
            for dep in &record.dep_labels {
                let dep_record = state.get(dep);
                let declared = dep_record
                    .map(|r| r.item.is_some() || r.resolved.is_some())
                    .unwrap_or(false);
                if !declared && !reported_undeclared.contains(dep) {
                    reported_undeclared.push(*dep);
                    errors.push(
                        GenError::new(
                            ErrorKind::UnresolvedReference,
                            format!("\"{}\" was never defined", self.visible(dep)),
                        )
                        .at(record.defined_from.clone())
                        .with_help(format!("referenced from {}", self.visible(label))),
                    );
                }
            }
        }
        if !errors.is_empty() {
            return errors;
        }

        // Everything referenced exists, so leftovers can only be cycles.
        // Find one concrete cycle for the message.
        let unresolved: Vec<Label> = state
            .iter()
            .filter(|(_, r)| r.item.is_some())
            .map(|(l, _)| *l)
            .collect();
        if unresolved.is_empty() {
            return errors;
        }

        if let Some(cycle) = find_cycle(&unresolved, |l| {
            state
                .get(l)
                .map(|r| {
                    r.dep_labels
                        .iter()
                        .filter(|d| {
                            state
                                .get(d)
                                .map(|dr| dr.resolved.is_none())
                                .unwrap_or(false)
                        })
                        .copied()
                        .collect()
                })
                .unwrap_or_default()
        }) {
            let path = cycle.iter().map(|l| self.visible(l)).join(" ->\n  ");
            let first = state.get(&cycle[0]).and_then(|r| r.defined_from.clone());
            errors.push(
                GenError::new(ErrorKind::DepCycle, "dependency cycle".to_string())
                    .at(first)
                    .with_help(format!("cycle:\n  {}", path)),
            );
        } else {
            for label in unresolved {
                errors.push(GenError::new(
                    ErrorKind::UnresolvedReference,
                    format!(
                        "\"{}\" was referenced but never resolved",
                        self.visible(&label)
                    ),
                ));
            }
        }
        errors
    }

    pub fn get_resolved_item(&self, label: &Label) -> Option<ResolvedItem> {
        self.state
            .lock()
            .unwrap()
            .get(label)
            .and_then(|r| r.resolved.clone())
    }

    pub fn get_toolchain(&self, label: &Label) -> Option<Arc<Toolchain>> {
        match self.get_resolved_item(&label.get_with_no_toolchain())? {
            ResolvedItem::Toolchain(tc) => Some(tc),
            _ => None,
        }
    }

    /// All resolved targets, sorted by label for deterministic output.
    pub fn get_all_resolved_targets(&self) -> Vec<Arc<Target>> {
        let state = self.state.lock().unwrap();
        let mut targets: Vec<Arc<Target>> = state
            .values()
            .filter_map(|r| match &r.resolved {
                Some(ResolvedItem::Target(t)) => Some(Arc::clone(t)),
                _ => None,
            })
            .collect();
        targets.sort_by(|a, b| a.label().cmp(b.label()));
        targets
    }
}

/// DFS for a cycle among `nodes`, returning the cycle path (first node
/// repeated at the end is implied).
fn find_cycle<F>(nodes: &[Label], deps_of: F) -> Option<Vec<Label>>
where
    F: Fn(&Label) -> Vec<Label>,
{
    fn visit<F: Fn(&Label) -> Vec<Label>>(
        node: Label,
        deps_of: &F,
        stack: &mut Vec<Label>,
        done: &mut Vec<Label>,
    ) -> Option<Vec<Label>> {
        if let Some(pos) = stack.iter().position(|l| *l == node) {
            return Some(stack[pos..].to_vec());
        }
        if done.contains(&node) {
            return None;
        }
        stack.push(node);
        for dep in deps_of(&node) {
            if let Some(cycle) = visit(dep, deps_of, stack, done) {
                return Some(cycle);
            }
        }
        stack.pop();
        done.push(node);
        None
    }

    let mut done = Vec::new();
    for node in nodes {
        let mut stack = Vec::new();
        if let Some(cycle) = visit(*node, &deps_of, &mut stack, &mut done) {
            return Some(cycle);
        }
    }
    None
}
