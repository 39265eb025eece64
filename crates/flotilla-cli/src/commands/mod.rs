//! Command implementations

pub mod run;

pub use run::{parse_test_list, RunOutcome};
