//! Dry run: report discovered tests without running them

use flotilla_core::{Status, Task, TestUnit};

/// Every pending unit comes back `OK`; discovery failures pass through
pub fn dry_run<I>(tasks: I) -> impl Iterator<Item = TestUnit>
where
    I: Iterator<Item = Task>,
{
    tasks.flat_map(Task::into_units).map(|unit| {
        if unit.is_done() {
            unit
        } else {
            TestUnit::with_outcome(unit.spec(), Status::Ok, "")
        }
    })
}
