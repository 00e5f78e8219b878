use crate::core::build_settings::BuildSettings;
use crate::core::output_file::OutputFile;
use crate::core::source_dir::SourceDir;
use crate::core::source_file::SourceFile;
use crate::emit::escape::ninja_escape;
use crate::util::paths::rebase_source_absolute;

/// Renders paths relative to the build directory with Ninja escaping, for
/// the writers. Source files rebase through their actual (alias-remapped)
/// form so emitted paths point at real files.
pub struct PathOutput {
    build_dir: SourceDir,
}

impl PathOutput {
    pub fn new(build_settings: &BuildSettings) -> PathOutput {
        PathOutput {
            build_dir: *build_settings.build_dir(),
        }
    }

    pub fn source_file_str(&self, file: &SourceFile) -> String {
        let rebased = if file.is_source_absolute() {
            rebase_source_absolute(file.actual_path(), self.build_dir.value())
        } else {
            file.value().to_string()
        };
        ninja_escape(&rebased)
    }

    pub fn output_file_str(&self, file: &OutputFile) -> String {
        ninja_escape(file.value())
    }

    pub fn write_source_file(&self, out: &mut String, file: &SourceFile) {
        out.push_str(&self.source_file_str(file));
    }

    pub fn write_output_file(&self, out: &mut String, file: &OutputFile) {
        out.push_str(&self.output_file_str(file));
    }
}
