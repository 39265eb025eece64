//! Serial execution in the calling process

use crate::execute::Executor;
use crate::unit::{Task, TestUnit};
use std::collections::VecDeque;

/// Runs tasks one unit at a time as the stream is pulled
pub struct SerialRun<I> {
    tasks: I,
    executor: Executor,
    pending: VecDeque<TestUnit>,
    accepting: bool,
    finished: bool,
}

impl<I: Iterator<Item = Task>> SerialRun<I> {
    pub fn new(tasks: I, executor: Executor) -> Self {
        Self {
            tasks,
            executor,
            pending: VecDeque::new(),
            accepting: true,
            finished: false,
        }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.executor.finish();
        }
    }
}

impl<I: Iterator<Item = Task>> Iterator for SerialRun<I> {
    type Item = TestUnit;

    fn next(&mut self) -> Option<TestUnit> {
        loop {
            if let Some(unit) = self.pending.pop_front() {
                let done = self.executor.run(unit);
                if self.executor.options().stop && done.is_unexpected_failure() {
                    // the current task still runs to the end so its teardowns happen
                    self.accepting = false;
                }
                return Some(done);
            }

            let next_task = if self.accepting { self.tasks.next() } else { None };
            match next_task {
                Some(task) => self.pending.extend(task.into_units()),
                None => {
                    self.finish();
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ExecOptions;
    use crate::registry::{Module, Registry, TestError};
    use crate::resolver::{Resolver, ResolverSettings};
    use crate::unit::Status;
    use std::sync::Arc;

    fn executor(stop: bool) -> Executor {
        let registry = Registry::new().with(
            Module::new("m")
                .test("test_ok", |_| Ok(()))
                .test("test_bad", |_| Err(TestError::fail("bad"))),
        );
        let settings = ResolverSettings {
            search_path: Vec::new(),
            ..Default::default()
        };
        let resolver = Resolver::new(Arc::new(registry), settings).unwrap();
        let options = ExecOptions {
            stop,
            ..Default::default()
        };
        Executor::new(Arc::new(resolver), options)
    }

    fn tasks() -> Vec<Task> {
        vec![
            Task::Single(TestUnit::new("m:test_ok")),
            Task::Group(vec![TestUnit::new("m:test_bad"), TestUnit::new("m:test_ok")]),
            Task::Single(TestUnit::new("m:test_ok")),
        ]
    }

    #[test]
    fn test_runs_every_unit_in_order() {
        let results: Vec<TestUnit> = SerialRun::new(tasks().into_iter(), executor(false)).collect();
        let statuses: Vec<_> = results.iter().map(|u| u.status()).collect();
        assert_eq!(
            statuses,
            vec![Some(Status::Ok), Some(Status::Fail), Some(Status::Ok), Some(Status::Ok)]
        );
    }

    #[test]
    fn test_stop_finishes_current_task_only() {
        let results: Vec<TestUnit> = SerialRun::new(tasks().into_iter(), executor(true)).collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].status(), Some(Status::Fail));
    }

    #[test]
    fn test_units_are_run_lazily() {
        let mut run = SerialRun::new(tasks().into_iter(), executor(false));
        assert_eq!(run.executor().units_run(), 0);
        run.next();
        assert_eq!(run.executor().units_run(), 1);
    }
}
