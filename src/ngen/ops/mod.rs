pub use self::gen::{gen, print_summary, GenStats};
pub use self::setup::{GenOptions, Setup};

pub mod gen;
pub mod setup;
