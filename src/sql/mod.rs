pub mod boundary;
pub mod parser_utils;

pub use boundary::{classify, Classified, ControlStatement, ShowStatement};
