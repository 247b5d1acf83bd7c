pub mod common;
pub mod savepoint_tests;
pub mod cancellation_tests;
