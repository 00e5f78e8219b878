//! ngen is a meta-build system: it reads a declarative configuration
//! language describing targets, toolchains, configs, and pools, resolves a
//! typed build graph (which may instantiate the same label under several
//! toolchains), and lowers the graph to Ninja files for incremental
//! execution.
//!
//! The library is organized like the pipeline:
//!
//! - [`frontend`] parses the declarative subset and lowers declarations
//!   into typed items.
//! - [`core`] holds the data model (atoms, paths, labels, substitutions,
//!   tools, toolchains, configs, targets) and the machinery that builds and
//!   resolves the graph (scheduler, loader, builder, resolution pipeline).
//! - [`emit`] writes the per-toolchain rule files, the top-level
//!   `build.ninja`, and the optional IDE integration files.
//! - [`ops`] ties it together: `setup` interprets the dotfile and args.gn,
//!   `gen` drives a full generation.

pub use crate::util::errors::{CliError, CliResult, ErrorKind, GenError, NgenResult};

pub mod core;
pub mod emit;
pub mod frontend;
pub mod ops;
pub mod util;
