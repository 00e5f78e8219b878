use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::core::args::Args;
use crate::core::label::Label;
use crate::core::label_pattern::LabelPattern;
use crate::core::source_dir::SourceDir;
use crate::core::source_file::SourceFile;
use crate::util::paths::normalize_logical;

// =============================================================================
// Path alias table
//
// A process-wide ordered list of (source_prefix, actual_prefix) pairs, both
// stored without leading "//" or trailing "/". Initialized before any worker
// thread runs and never mutated afterwards. Forward mapping walks
// front-to-back, reverse mapping back-to-front, so earlier registrations
// shadow later ones in both directions.

struct PathMapper {
    prefix: String,
    actual_path: String,
}

lazy_static::lazy_static! {
    static ref PATH_MAP: RwLock<Vec<PathMapper>> = RwLock::new(Vec::new());
}

/// Registers an alias mapping the source-form `prefix` (must begin with
/// `//`) to `map_to_path`, a path relative to the source root (or `//`-form;
/// an empty remainder means the source root itself). Returns false for
/// malformed input.
pub fn register_path_map(prefix: &str, map_to_path: &str) -> bool {
    let Some(prefix) = prefix.strip_prefix("//") else {
        return false;
    };
    if map_to_path.starts_with('/') && !map_to_path.starts_with("//") {
        return false; // System-absolute targets are not remappable.
    }
    let actual = map_to_path.strip_prefix("//").unwrap_or(map_to_path);

    PATH_MAP.write().unwrap().push(PathMapper {
        prefix: prefix.trim_end_matches('/').to_string(),
        actual_path: actual.trim_end_matches('/').to_string(),
    });
    true
}

pub fn clear_path_map() {
    PATH_MAP.write().unwrap().clear();
}

pub fn path_maps_enabled() -> bool {
    !PATH_MAP.read().unwrap().is_empty()
}

fn prefix_matches(rest: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || rest == prefix
        || (rest.starts_with(prefix) && rest.as_bytes().get(prefix.len()) == Some(&b'/'))
}

fn substitute(rest: &str, from: &str, to: &str) -> String {
    let tail = if from.is_empty() { rest } else { &rest[from.len()..] };
    let mut out = String::with_capacity(2 + to.len() + 1 + tail.len());
    out.push_str("//");
    out.push_str(to);
    if !to.is_empty() && !tail.starts_with('/') && !tail.is_empty() {
        out.push('/');
    }
    out.push_str(tail);
    normalize_logical(&out)
}

/// Maps a source-form path (`//foo/bar.cc`) to its on-disk form. Paths not
/// starting with `//`, and paths matching no alias, pass through unchanged.
pub fn remap_source_to_actual(path: &str) -> String {
    let Some(rest) = path.strip_prefix("//") else {
        return path.to_string();
    };
    let map = PATH_MAP.read().unwrap();
    for entry in map.iter() {
        if prefix_matches(rest, &entry.prefix) {
            return substitute(rest, &entry.prefix, &entry.actual_path);
        }
    }
    path.to_string()
}

/// The reverse of `remap_source_to_actual`: maps an on-disk form back to the
/// aliased source form. Walks the table back-to-front.
pub fn remap_actual_to_source(path: &str) -> String {
    let Some(rest) = path.strip_prefix("//") else {
        return path.to_string();
    };
    let map = PATH_MAP.read().unwrap();
    for entry in map.iter().rev() {
        if prefix_matches(rest, &entry.actual_path) {
            return substitute(rest, &entry.actual_path, &entry.prefix);
        }
    }
    path.to_string()
}

// =============================================================================
// BuildSettings

/// Settings for one build: one toplevel output directory. There may be many
/// toolchain `Settings` referring to one of these. Filled in during setup and
/// read-only once generation starts (`build_args` tracks usage internally).
#[derive(Debug)]
pub struct BuildSettings {
    root_path: PathBuf,
    root_path_utf8: String,
    dotfile_name: PathBuf,
    dotfile_explicit: bool,
    secondary_source_path: Option<PathBuf>,
    script_executable: Option<PathBuf>,

    build_dir: SourceDir,
    build_config_file: SourceFile,
    arg_file_template_path: Option<SourceFile>,
    root_target_label: Label,
    root_patterns: Vec<LabelPattern>,
    check_targets: Option<Vec<LabelPattern>>,
    no_check_targets: Option<Vec<LabelPattern>>,
    check_system_includes: bool,
    exec_script_whitelist: Option<Vec<SourceFile>>,
    export_compile_commands: Vec<LabelPattern>,
    build_file_extension: String,
    // 1.7.2 is the oldest ninja whose regeneration handling we rely on.
    ninja_required_version: semver::Version,
    no_stamp_files: bool,

    build_args: Args,

    /// Switches (other than the always-normalized set) from the current
    /// invocation, echoed into the self-invocation command line.
    regen_switches: Vec<(String, String)>,
}

impl Default for BuildSettings {
    fn default() -> BuildSettings {
        BuildSettings {
            root_path: PathBuf::new(),
            root_path_utf8: String::new(),
            dotfile_name: PathBuf::new(),
            dotfile_explicit: false,
            secondary_source_path: None,
            script_executable: None,
            build_dir: SourceDir::default(),
            build_config_file: SourceFile::default(),
            arg_file_template_path: None,
            root_target_label: Label::default(),
            root_patterns: Vec::new(),
            check_targets: None,
            no_check_targets: None,
            check_system_includes: false,
            exec_script_whitelist: None,
            export_compile_commands: Vec::new(),
            build_file_extension: String::new(),
            ninja_required_version: semver::Version::new(1, 7, 2),
            no_stamp_files: false,
            build_args: Args::default(),
            regen_switches: Vec::new(),
        }
    }
}

impl BuildSettings {
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn root_path_utf8(&self) -> &str {
        &self.root_path_utf8
    }

    pub fn set_root_path(&mut self, p: PathBuf) {
        self.root_path_utf8 = p.to_string_lossy().replace('\\', "/");
        self.root_path = p;
    }

    pub fn dotfile_name(&self) -> &Path {
        &self.dotfile_name
    }

    pub fn dotfile_explicit(&self) -> bool {
        self.dotfile_explicit
    }

    pub fn set_dotfile_name(&mut self, d: PathBuf, explicit: bool) {
        self.dotfile_name = d;
        self.dotfile_explicit = explicit;
    }

    pub fn secondary_source_path(&self) -> Option<&Path> {
        self.secondary_source_path.as_deref()
    }

    pub fn set_secondary_source_path(&mut self, d: &SourceDir) {
        self.secondary_source_path = Some(d.resolve(&self.root_path, true));
    }

    pub fn script_executable(&self) -> Option<&Path> {
        self.script_executable.as_deref()
    }

    pub fn set_script_executable(&mut self, p: Option<PathBuf>) {
        self.script_executable = p;
    }

    pub fn build_dir(&self) -> &SourceDir {
        &self.build_dir
    }

    pub fn set_build_dir(&mut self, dir: SourceDir) {
        self.build_dir = dir;
    }

    pub fn build_config_file(&self) -> &SourceFile {
        &self.build_config_file
    }

    pub fn set_build_config_file(&mut self, f: SourceFile) {
        self.build_config_file = f;
    }

    pub fn arg_file_template_path(&self) -> Option<&SourceFile> {
        self.arg_file_template_path.as_ref()
    }

    pub fn set_arg_file_template_path(&mut self, f: SourceFile) {
        self.arg_file_template_path = Some(f);
    }

    pub fn root_target_label(&self) -> &Label {
        &self.root_target_label
    }

    pub fn set_root_target_label(&mut self, l: Label) {
        self.root_target_label = l;
    }

    pub fn root_patterns(&self) -> &[LabelPattern] {
        &self.root_patterns
    }

    pub fn set_root_patterns(&mut self, p: Vec<LabelPattern>) {
        self.root_patterns = p;
    }

    pub fn check_targets(&self) -> Option<&[LabelPattern]> {
        self.check_targets.as_deref()
    }

    pub fn set_check_targets(&mut self, p: Vec<LabelPattern>) {
        self.check_targets = Some(p);
    }

    pub fn no_check_targets(&self) -> Option<&[LabelPattern]> {
        self.no_check_targets.as_deref()
    }

    pub fn set_no_check_targets(&mut self, p: Vec<LabelPattern>) {
        self.no_check_targets = Some(p);
    }

    pub fn check_system_includes(&self) -> bool {
        self.check_system_includes
    }

    pub fn set_check_system_includes(&mut self, b: bool) {
        self.check_system_includes = b;
    }

    pub fn exec_script_whitelist(&self) -> Option<&[SourceFile]> {
        self.exec_script_whitelist.as_deref()
    }

    pub fn set_exec_script_whitelist(&mut self, list: Vec<SourceFile>) {
        self.exec_script_whitelist = Some(list);
    }

    pub fn export_compile_commands(&self) -> &[LabelPattern] {
        &self.export_compile_commands
    }

    pub fn add_export_compile_commands(&mut self, p: LabelPattern) {
        self.export_compile_commands.push(p);
    }

    pub fn build_file_extension(&self) -> &str {
        &self.build_file_extension
    }

    pub fn set_build_file_extension(&mut self, ext: String) {
        self.build_file_extension = ext;
    }

    /// The build file name in effect (`BUILD.gn`, or `BUILD.<ext>.gn` when
    /// the dotfile sets `build_file_extension`).
    pub fn build_file_name(&self) -> String {
        if self.build_file_extension.is_empty() {
            "BUILD.gn".to_string()
        } else {
            format!("BUILD.{}.gn", self.build_file_extension)
        }
    }

    pub fn ninja_required_version(&self) -> &semver::Version {
        &self.ninja_required_version
    }

    pub fn set_ninja_required_version(&mut self, v: semver::Version) {
        self.ninja_required_version = v;
    }

    pub fn no_stamp_files(&self) -> bool {
        self.no_stamp_files
    }

    pub fn set_no_stamp_files(&mut self, b: bool) {
        self.no_stamp_files = b;
    }

    pub fn build_args(&self) -> &Args {
        &self.build_args
    }

    pub fn build_args_mut(&mut self) -> &mut Args {
        &mut self.build_args
    }

    pub fn regen_switches(&self) -> &[(String, String)] {
        &self.regen_switches
    }

    pub fn add_regen_switch(&mut self, name: String, value: String) {
        self.regen_switches.push((name, value));
    }

    /// Full OS path for a source file, using the actual (alias-remapped)
    /// form.
    pub fn get_full_path(&self, file: &SourceFile) -> PathBuf {
        file.resolve(&self.root_path, true)
    }

    pub fn get_full_path_dir(&self, dir: &SourceDir) -> PathBuf {
        dir.resolve(&self.root_path, true)
    }

    /// OS path of the same file under the secondary source tree, if one is
    /// configured.
    pub fn get_full_path_secondary(&self, file: &SourceFile) -> Option<PathBuf> {
        let secondary = self.secondary_source_path.as_ref()?;
        let rest = file.value().strip_prefix("//")?;
        Some(secondary.join(rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The alias table is process-global, so exercise every aliasing behavior
    // from a single test to avoid cross-test interference.
    #[test]
    fn alias_remapping() {
        clear_path_map();
        assert!(!path_maps_enabled());
        assert_eq!(remap_source_to_actual("//foo/bar.cc"), "//foo/bar.cc");

        // Entries whose actual prefix shadows others in reverse (the empty
        // actual matches every path) must be registered before them so the
        // back-to-front reverse walk consults them last.
        assert!(register_path_map("//vendored", ""));
        assert!(register_path_map("//foo", "third_party/foo"));
        assert!(!register_path_map("relative", "x"));
        assert!(path_maps_enabled());

        assert_eq!(remap_source_to_actual("//foo/bar.cc"), "//third_party/foo/bar.cc");
        assert_eq!(remap_source_to_actual("//foo"), "//third_party/foo");
        assert_eq!(remap_source_to_actual("//foobar/x.cc"), "//foobar/x.cc");
        assert_eq!(remap_source_to_actual("//vendored/a.c"), "//a.c");
        assert_eq!(remap_source_to_actual("rel/path"), "rel/path");

        assert_eq!(remap_actual_to_source("//third_party/foo/bar.cc"), "//foo/bar.cc");
        assert_eq!(remap_actual_to_source("//a.c"), "//vendored/a.c");

        // Round trip for source-form paths under an alias.
        for p in ["//foo/bar.cc", "//foo/sub/dir/", "//vendored/x.h"] {
            assert_eq!(remap_actual_to_source(&remap_source_to_actual(p)), p);
        }

        clear_path_map();
    }
}
