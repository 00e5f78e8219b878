pub use self::build_settings::BuildSettings;
pub use self::builder::Builder;
pub use self::config::{Config, ConfigValues};
pub use self::interning::Atom;
pub use self::item::Item;
pub use self::label::Label;
pub use self::label_pattern::LabelPattern;
pub use self::loader::Loader;
pub use self::output_file::OutputFile;
pub use self::pool::Pool;
pub use self::scheduler::Scheduler;
pub use self::settings::Settings;
pub use self::shell::{Shell, Verbosity};
pub use self::source_dir::SourceDir;
pub use self::source_file::{FileType, SourceFile};
pub use self::target::Target;
pub use self::tool::Tool;
pub use self::toolchain::Toolchain;

pub mod args;
pub mod build_settings;
pub mod builder;
pub mod config;
pub mod interning;
pub mod item;
pub mod label;
pub mod label_pattern;
pub mod label_ptr;
pub mod loader;
pub mod output_file;
pub mod pool;
pub mod resolve;
pub mod scheduler;
pub mod settings;
pub mod shell;
pub mod source_dir;
pub mod source_file;
pub mod substitution;
pub mod substitution_writer;
pub mod target;
pub mod tool;
pub mod toolchain;
