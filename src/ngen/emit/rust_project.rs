//! Writes `rust-project.json`: one crate entry per Rust target plus
//! synthesized sysroot crates, for rust-analyzer integration.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::core::build_settings::BuildSettings;
use crate::core::label::Label;
use crate::core::source_file::{FileType, SourceFile};
use crate::core::target::{DepsIterationType, OutputType, Target};
use crate::util::errors::NgenResult;
use crate::util::paths::write_atomically_if_changed;

#[derive(Serialize)]
struct Project {
    roots: Vec<String>,
    crates: Vec<Crate>,
}

#[derive(Serialize)]
struct Crate {
    crate_id: usize,
    root_module: String,
    label: String,
    deps: Vec<Dep>,
    edition: String,
    cfg: Vec<String>,
}

#[derive(Serialize)]
struct Dep {
    #[serde(rename = "crate")]
    crate_index: usize,
    name: String,
}

// TODO(rust-project): parse the sysroot structure from its manifests instead
// of hardcoding the crate set and dependency graph.
const SYSROOT_CRATES: &[&str] = &[
    "std",
    "core",
    "alloc",
    "collections",
    "libc",
    "panic_unwind",
    "proc_macro",
    "rustc_unicode",
    "std_unicode",
    "test",
    "alloc_jemalloc",
    "alloc_system",
    "compiler_builtins",
    "getopts",
    "panic_abort",
    "unwind",
    "build_helper",
    "rustc_asan",
    "rustc_lsan",
    "rustc_msan",
    "rustc_tsan",
    "syntax",
];

fn sysroot_deps(crate_name: &str) -> &'static [&'static str] {
    match crate_name {
        "std" => &["alloc", "core", "panic_abort", "unwind"],
        "alloc" => &["core"],
        _ => &[],
    }
}

/// The Rust deps of a target, flattening groups; a Rust lib dependency is
/// not expanded further.
fn get_rust_deps(target: &Target, out: &mut Vec<Arc<Target>>) {
    for pair in target.deps(DepsIterationType::Linked) {
        let dep = pair.get();
        if dep.source_types_used.rust_source_used() {
            if !out.iter().any(|t| t.label() == dep.label()) {
                out.push(Arc::clone(dep));
            }
        } else if dep.output_type == OutputType::Group {
            get_rust_deps(dep, out);
        }
    }
}

struct ProjectBuilder<'a> {
    build_settings: &'a BuildSettings,
    crates: Vec<Crate>,
    target_indices: HashMap<Label, usize>,
    /// Per sysroot: crate name -> index.
    sysroot_indices: HashMap<String, HashMap<String, usize>>,
}

impl<'a> ProjectBuilder<'a> {
    fn abs_path(&self, file: &SourceFile) -> String {
        self.build_settings
            .get_full_path(file)
            .to_string_lossy()
            .replace('\\', "/")
    }

    fn add_sysroot_crate(&mut self, sysroot: &str, crate_name: &str) -> usize {
        if let Some(idx) = self
            .sysroot_indices
            .get(sysroot)
            .and_then(|m| m.get(crate_name))
        {
            return *idx;
        }

        // Dependencies first, so their indices exist.
        let mut deps = Vec::new();
        for dep in sysroot_deps(crate_name) {
            let idx = self.add_sysroot_crate(sysroot, dep);
            deps.push(Dep {
                crate_index: idx,
                name: dep.to_string(),
            });
        }

        let build_dir = self
            .build_settings
            .get_full_path_dir(self.build_settings.build_dir())
            .to_string_lossy()
            .replace('\\', "/");
        let root_module = format!(
            "{}{}/lib/rustlib/src/rust/src/lib{}/lib.rs",
            build_dir, sysroot, crate_name
        );

        let crate_id = self.crates.len();
        self.sysroot_indices
            .entry(sysroot.to_string())
            .or_default()
            .insert(crate_name.to_string(), crate_id);
        self.crates.push(Crate {
            crate_id,
            root_module,
            label: crate_name.to_string(),
            deps,
            edition: "2018".to_string(),
            cfg: vec!["debug_assertions".to_string()],
        });
        crate_id
    }

    fn add_sysroot(&mut self, sysroot: &str) {
        if self.sysroot_indices.contains_key(sysroot) {
            return;
        }
        self.sysroot_indices.insert(sysroot.to_string(), HashMap::new());
        for crate_name in SYSROOT_CRATES {
            self.add_sysroot_crate(sysroot, crate_name);
        }
    }

    fn add_target(&mut self, target: &Arc<Target>) -> usize {
        if let Some(idx) = self.target_indices.get(target.label()) {
            return *idx;
        }

        let current_sysroot = target
            .toolchain
            .as_ref()
            .and_then(|tc| tc.get_tool_for_source_type(FileType::Rs))
            .and_then(|t| t.as_rust())
            .map(|r| r.rust_sysroot.clone())
            .unwrap_or_default();
        if !current_sysroot.is_empty() {
            self.add_sysroot(&current_sysroot);
        }

        let mut rust_deps = Vec::new();
        get_rust_deps(target, &mut rust_deps);

        // All dependencies of this crate come before it.
        let mut deps = Vec::new();
        for dep in &rust_deps {
            let idx = self.add_target(dep);
            deps.push(Dep {
                crate_index: idx,
                name: dep.rust_values().crate_name.as_str().to_string(),
            });
        }

        if !current_sysroot.is_empty() {
            if let Some(std_idx) = self
                .sysroot_indices
                .get(&current_sysroot)
                .and_then(|m| m.get("std"))
            {
                deps.push(Dep {
                    crate_index: *std_idx,
                    name: "std".to_string(),
                });
            }
        }

        let mut edition = "2015".to_string();
        let mut cfg = vec!["test".to_string(), "debug_assertions".to_string()];
        let mut all_rustflags: Vec<String> = target.config_values().rustflags.clone();
        for pair in &target.configs {
            all_rustflags.extend_from_slice(&pair.get().resolved_values().rustflags);
        }
        for flag in &all_rustflags {
            if let Some(value) = flag.strip_prefix("--edition=") {
                edition = value.to_string();
            }
            if let Some(value) = flag.strip_prefix("--cfg=") {
                cfg.push(value.to_string());
            }
        }

        let crate_id = self.crates.len();
        self.target_indices.insert(*target.label(), crate_id);
        self.crates.push(Crate {
            crate_id,
            root_module: self.abs_path(&target.rust_values().crate_root),
            label: target.label().get_user_visible_name(false),
            deps,
            edition,
            cfg,
        });
        crate_id
    }
}

pub fn render_json(build_settings: &BuildSettings, all_targets: &[Arc<Target>]) -> String {
    let mut builder = ProjectBuilder {
        build_settings,
        crates: Vec::new(),
        target_indices: HashMap::new(),
        sysroot_indices: HashMap::new(),
    };

    for target in all_targets {
        if !target.is_binary() || !target.source_types_used.rust_source_used() {
            continue;
        }
        builder.add_target(target);
    }

    let roots = builder
        .crates
        .iter()
        .map(|c| match c.root_module.rfind('/') {
            Some(idx) => c.root_module[..idx + 1].to_string(),
            None => c.root_module.clone(),
        })
        .collect();
    let project = Project {
        roots,
        crates: builder.crates,
    };
    let mut json = serde_json::to_string_pretty(&project).expect("project serializes");
    json.push('\n');
    json
}

/// Writes `<build_dir>/rust-project.json` when any Rust target exists.
pub fn run_and_write_files(
    build_settings: &BuildSettings,
    all_targets: &[Arc<Target>],
) -> NgenResult<()> {
    let contents = render_json(build_settings, all_targets);
    let file = SourceFile::new(&format!(
        "{}rust-project.json",
        build_settings.build_dir().value()
    ));
    write_atomically_if_changed(&build_settings.get_full_path(&file), &contents)?;
    Ok(())
}
