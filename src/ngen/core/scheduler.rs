use std::collections::{BTreeSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::core::label::Label;
use crate::core::output_file::OutputFile;
use crate::core::source_file::SourceFile;
use crate::util::errors::GenError;

pub type Task = Box<dyn FnOnce() + Send>;

/// A work-count tracked task queue driving loader and resolution callbacks
/// on a fixed worker pool. `run()` blocks until the count drains to zero.
///
/// Also the rendezvous point for the side channels the rest of the pipeline
/// feeds: files the next gen run must re-read, files this process wrote
/// itself, unknown-generated-input warnings, and targets registered for
/// runtime-deps writing.
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    cv: Condvar,
    work_count: AtomicUsize,
    has_error: AtomicBool,

    errors: Mutex<Vec<GenError>>,
    gen_dependency_files: Mutex<BTreeSet<PathBuf>>,
    written_files: Mutex<BTreeSet<OutputFile>>,
    unknown_generated_inputs: Mutex<Vec<(Label, SourceFile)>>,
    write_runtime_deps_targets: Mutex<Vec<Label>>,
    runtime_deps_files: Mutex<BTreeSet<OutputFile>>,
    generated_files: Mutex<BTreeSet<SourceFile>>,
}

struct SchedulerState {
    queue: VecDeque<Task>,
    shutdown: bool,
}

impl Default for Scheduler {
    fn default() -> Scheduler {
        Scheduler::new()
    }
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler {
            state: Mutex::new(SchedulerState {
                queue: VecDeque::new(),
                shutdown: false,
            }),
            cv: Condvar::new(),
            work_count: AtomicUsize::new(0),
            has_error: AtomicBool::new(false),
            errors: Mutex::new(Vec::new()),
            gen_dependency_files: Mutex::new(BTreeSet::new()),
            written_files: Mutex::new(BTreeSet::new()),
            unknown_generated_inputs: Mutex::new(Vec::new()),
            write_runtime_deps_targets: Mutex::new(Vec::new()),
            runtime_deps_files: Mutex::new(BTreeSet::new()),
            generated_files: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn increment_work_count(&self) {
        self.work_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement_work_count(&self) {
        let prev = self.work_count.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "work count underflow");
        if prev == 1 {
            // Drained; wake everyone so workers and run() can exit.
            let _state = self.state.lock().unwrap();
            self.cv.notify_all();
        }
    }

    /// Posts a task whose work count was already taken, letting a parent
    /// carry the count for work it hands off.
    pub fn schedule_work_counted(&self, task: Task) {
        let mut state = self.state.lock().unwrap();
        state.queue.push_back(task);
        self.cv.notify_one();
    }

    /// Increments the work count and posts a task.
    pub fn schedule_work(&self, task: Task) {
        self.increment_work_count();
        self.schedule_work_counted(task);
    }

    /// Records a pipeline error and sets the sticky failure flag. Parallel
    /// tasks keep draining so independent errors surface in one run.
    pub fn fail_with_error(&self, err: GenError) {
        self.has_error.store(true, Ordering::SeqCst);
        self.errors.lock().unwrap().push(err);
    }

    pub fn is_failed(&self) -> bool {
        self.has_error.load(Ordering::SeqCst)
    }

    pub fn take_errors(&self) -> Vec<GenError> {
        std::mem::take(&mut self.errors.lock().unwrap())
    }

    /// Runs tasks on `num_workers` threads until the work count drains.
    pub fn run(self: &Arc<Self>, num_workers: usize) {
        let num_workers = num_workers.max(1);
        let mut handles = Vec::with_capacity(num_workers);
        for _ in 0..num_workers {
            let scheduler = Arc::clone(self);
            handles.push(std::thread::spawn(move || scheduler.worker_loop()));
        }
        for handle in handles {
            let _ = handle.join();
        }
        debug_assert_eq!(self.work_count.load(Ordering::SeqCst), 0);
    }

    fn worker_loop(&self) {
        loop {
            let task = {
                let mut state = self.state.lock().unwrap();
                loop {
                    if let Some(task) = state.queue.pop_front() {
                        break Some(task);
                    }
                    if state.shutdown || self.work_count.load(Ordering::SeqCst) == 0 {
                        state.shutdown = true;
                        self.cv.notify_all();
                        break None;
                    }
                    state = self.cv.wait(state).unwrap();
                }
            };
            match task {
                Some(task) => {
                    task();
                    self.decrement_work_count();
                }
                None => return,
            }
        }
    }

    // -------------------------------------------------------------------------
    // Side channels

    /// Registers a physical file that must be re-read on the next gen run
    /// (build files, the dotfile, imported args files).
    pub fn add_gen_dependency(&self, path: PathBuf) {
        self.gen_dependency_files.lock().unwrap().insert(path);
    }

    pub fn gen_dependencies(&self) -> Vec<PathBuf> {
        self.gen_dependency_files
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .collect()
    }

    /// Registers a file written by this process itself; such files are
    /// filtered out of "unknown generated input" warnings.
    pub fn add_written_file(&self, file: OutputFile) {
        self.written_files.lock().unwrap().insert(file);
    }

    pub fn is_file_written_by_us(&self, file: &OutputFile) -> bool {
        self.written_files.lock().unwrap().contains(file)
    }

    pub fn add_unknown_generated_input(&self, target: Label, source: SourceFile) {
        self.unknown_generated_inputs
            .lock()
            .unwrap()
            .push((target, source));
    }

    pub fn unknown_generated_inputs(&self) -> Vec<(Label, SourceFile)> {
        self.unknown_generated_inputs.lock().unwrap().clone()
    }

    pub fn add_write_runtime_deps_target(&self, label: Label) {
        self.write_runtime_deps_targets.lock().unwrap().push(label);
    }

    pub fn write_runtime_deps_targets(&self) -> Vec<Label> {
        self.write_runtime_deps_targets.lock().unwrap().clone()
    }

    pub fn add_runtime_deps_file(&self, file: OutputFile) {
        self.runtime_deps_files.lock().unwrap().insert(file);
    }

    pub fn is_file_generated_by_write_runtime_deps(&self, file: &OutputFile) -> bool {
        self.runtime_deps_files.lock().unwrap().contains(file)
    }

    /// Registers the output of a `generated_file` target for later
    /// generated-input matching in other targets.
    pub fn add_generated_file(&self, file: SourceFile) {
        self.generated_files.lock().unwrap().insert(file);
    }

    pub fn is_file_generated_by_target(&self, file: &SourceFile) -> bool {
        self.generated_files.lock().unwrap().contains(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn drains_all_posted_work() {
        let scheduler = Arc::new(Scheduler::new());
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            scheduler.schedule_work(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        scheduler.run(4);
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn tasks_can_post_more_tasks() {
        let scheduler = Arc::new(Scheduler::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let sched2 = Arc::clone(&scheduler);
        let counter2 = Arc::clone(&counter);
        scheduler.schedule_work(Box::new(move || {
            for _ in 0..10 {
                let counter = Arc::clone(&counter2);
                sched2.schedule_work(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }));
            }
        }));
        scheduler.run(4);
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn error_flag_is_sticky() {
        let scheduler = Scheduler::new();
        assert!(!scheduler.is_failed());
        scheduler.fail_with_error(GenError::new(
            crate::util::errors::ErrorKind::Other,
            "boom",
        ));
        assert!(scheduler.is_failed());
        assert_eq!(scheduler.take_errors().len(), 1);
    }
}
