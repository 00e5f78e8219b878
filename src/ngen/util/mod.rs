pub use self::errors::{CliError, CliResult, ErrorKind, GenError, Location, NgenResult};

pub mod errors;
pub mod paths;
