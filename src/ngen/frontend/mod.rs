//! The declarative-source frontend surface: the value model the core
//! consumes, a parser for the declarative subset, and lowering of parsed
//! declarations into typed items.

pub mod lower;
pub mod parser;
pub mod value;
