pub mod build_writer;
pub mod compile_commands;
pub mod escape;
pub mod path_output;
pub mod rust_project;
pub mod target_writer;
pub mod toolchain_writer;
