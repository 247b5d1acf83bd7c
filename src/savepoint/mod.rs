mod savepoint;
mod stack;

pub use savepoint::{Savepoint, SavepointInfo};
pub use stack::SavepointStack;
