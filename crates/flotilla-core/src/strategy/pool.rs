//! Pool of worker processes fed from a task stream
//!
//! The coordinator listens on a loopback port. Each worker connects,
//! authenticates with the pool's key, and is then handed one task at a time.
//! A worker reports one result per unit followed by `TaskDone`. Results are
//! yielded as they arrive.
//!
//! A worker that dies mid-task gets a synthesized `FAIL` for every unit of
//! that task it never reported, and is replaced while the respawn budget
//! lasts. Shutdown sends `Stop` to every worker and joins them all, also
//! when the stream is dropped early.

use crate::child::{ChildRole, PAYLOAD_VAR, ROLE_VAR};
use crate::error::{HarnessError, HarnessResult};
use crate::execute::Executor;
use crate::options::WorkerConfig;
use crate::resolver::{ModuleLoader, Resolver};
use crate::unit::{Task, TestUnit};
use crate::wire::{generate_authkey, Connection, FrameWriter};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Replacement workers allowed per slot
pub const MAX_RESPAWNS: usize = 2;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_DEADLINE: Duration = Duration::from_secs(60);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Everything a worker needs to join the pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStartup {
    pub slot: usize,
    pub generation: u64,
    pub address: SocketAddr,
    pub authkey: String,
    pub config: WorkerConfig,
}

#[derive(Debug, Serialize, Deserialize)]
enum ToWorker {
    Run(Task),
    Stop,
}

#[derive(Debug, Serialize, Deserialize)]
enum FromWorker {
    Hello {
        slot: usize,
        generation: u64,
        authkey: String,
    },
    Result(TestUnit),
    TaskDone,
}

/// Starts workers for the pool
pub trait WorkerLauncher: Send {
    fn launch(&mut self, startup: WorkerStartup) -> HarnessResult<Box<dyn WorkerProcess>>;
}

/// Handle on a started worker
pub trait WorkerProcess: Send {
    fn has_exited(&mut self) -> bool;

    fn kill(&mut self);

    /// Wait for the worker to end
    fn join(&mut self);
}

/// Launches workers by re-executing a test binary
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Re-execute the running binary
    pub fn current_exe() -> HarnessResult<Self> {
        let program = std::env::current_exe().map_err(|e| HarnessError::launch("worker", e))?;
        Ok(Self::new(program))
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&mut self, startup: WorkerStartup) -> HarnessResult<Box<dyn WorkerProcess>> {
        let payload = serde_json::to_string(&startup).map_err(|e| HarnessError::Payload(e.to_string()))?;
        let child = Command::new(&self.program)
            .env(ROLE_VAR, ChildRole::Worker.as_str())
            .env(PAYLOAD_VAR, payload)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| HarnessError::launch("worker", e))?;
        tracing::debug!(slot = startup.slot, pid = child.id(), "worker process started");
        Ok(Box::new(ChildWorker(child)))
    }
}

struct ChildWorker(Child);

impl WorkerProcess for ChildWorker {
    fn has_exited(&mut self) -> bool {
        !matches!(self.0.try_wait(), Ok(None))
    }

    fn kill(&mut self) {
        let _ = self.0.kill();
    }

    fn join(&mut self) {
        let _ = self.0.wait();
    }
}

/// Runs workers as threads of the current process
///
/// Useful when embedding the harness, and for exercising the pool without
/// spawning processes. Thread workers can't be killed.
pub struct ThreadLauncher {
    loader: Arc<dyn ModuleLoader>,
}

impl ThreadLauncher {
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self { loader }
    }
}

impl WorkerLauncher for ThreadLauncher {
    fn launch(&mut self, startup: WorkerStartup) -> HarnessResult<Box<dyn WorkerProcess>> {
        let loader = Arc::clone(&self.loader);
        let handle = thread::Builder::new()
            .name(format!("flotilla-worker-{}", startup.slot))
            .spawn(move || {
                if let Err(e) = run_worker(startup, loader) {
                    tracing::warn!(error = %e, "worker thread failed");
                }
            })?;
        Ok(Box::new(ThreadWorker(Some(handle))))
    }
}

struct ThreadWorker(Option<JoinHandle<()>>);

impl WorkerProcess for ThreadWorker {
    fn has_exited(&mut self) -> bool {
        self.0.as_ref().map_or(true, JoinHandle::is_finished)
    }

    fn kill(&mut self) {}

    fn join(&mut self) {
        if let Some(handle) = self.0.take() {
            let _ = handle.join();
        }
    }
}

/// Worker main loop: connect, then run tasks until told to stop
pub fn run_worker(startup: WorkerStartup, loader: Arc<dyn ModuleLoader>) -> HarnessResult<()> {
    let resolver = Arc::new(Resolver::new(loader, startup.config.resolver.clone())?);
    let mut executor = Executor::new(resolver, startup.config.options.clone());

    let mut conn = Connection::connect(startup.address)?;
    conn.send(&FromWorker::Hello {
        slot: startup.slot,
        generation: startup.generation,
        authkey: startup.authkey.clone(),
    })?;

    while let Some(message) = conn.recv::<ToWorker>()? {
        match message {
            ToWorker::Stop => break,
            ToWorker::Run(task) => {
                for unit in task.into_units() {
                    let done = executor.run(unit);
                    conn.send(&FromWorker::Result(done))?;
                }
                conn.send(&FromWorker::TaskDone)?;
            }
        }
    }

    executor.finish();
    tracing::debug!(slot = startup.slot, units = executor.units_run(), "worker exiting");
    Ok(())
}

/// Lifecycle of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Idle,
    Started,
    Draining,
    Stopped,
}

enum Event {
    Connected {
        slot: usize,
        generation: u64,
        writer: FrameWriter,
    },
    Message {
        slot: usize,
        generation: u64,
        message: FromWorker,
    },
    Disconnected {
        slot: usize,
        generation: u64,
    },
}

struct InFlight {
    units: Vec<TestUnit>,
    reported: usize,
}

struct Slot {
    generation: u64,
    process: Option<Box<dyn WorkerProcess>>,
    writer: Option<FrameWriter>,
    in_flight: Option<InFlight>,
    launched_at: Instant,
    respawns: usize,
    stop_sent: bool,
    retired: bool,
}

impl Slot {
    fn send_stop(&mut self) {
        if self.stop_sent {
            return;
        }
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.send(&ToWorker::Stop);
            self.stop_sent = true;
        }
    }
}

/// Stream of results from a running pool
pub struct PoolRun<I> {
    tasks: I,
    input_done: bool,
    stopping: bool,
    state: PoolState,
    config: WorkerConfig,
    launcher: Box<dyn WorkerLauncher>,
    address: SocketAddr,
    authkey: String,
    events: Receiver<Event>,
    acceptor: Option<JoinHandle<()>>,
    acceptor_stop: Arc<AtomicBool>,
    slots: Vec<Slot>,
    next_generation: u64,
    ready: VecDeque<TestUnit>,
    max_in_flight: usize,
}

impl<I: Iterator<Item = Task>> PoolRun<I> {
    /// Bind the listener and launch `config.options.num_procs` workers
    pub fn start(tasks: I, config: WorkerConfig, launcher: Box<dyn WorkerLauncher>) -> HarnessResult<Self> {
        let workers = config.options.num_procs.max(1);
        let listener = TcpListener::bind("127.0.0.1:0").map_err(|e| HarnessError::bind("worker listener", e))?;
        let address = listener.local_addr()?;
        let authkey = generate_authkey();
        let (sender, events) = channel::unbounded();
        let acceptor_stop = Arc::new(AtomicBool::new(false));

        let acceptor = {
            let authkey = authkey.clone();
            let stop = Arc::clone(&acceptor_stop);
            thread::Builder::new()
                .name("flotilla-pool-acceptor".to_string())
                .spawn(move || accept_workers(listener, authkey, sender, stop))?
        };

        let mut pool = Self {
            tasks,
            input_done: false,
            stopping: false,
            state: PoolState::Idle,
            config,
            launcher,
            address,
            authkey,
            events,
            acceptor: Some(acceptor),
            acceptor_stop,
            slots: Vec::with_capacity(workers),
            next_generation: 0,
            ready: VecDeque::new(),
            max_in_flight: 0,
        };

        pool.state = PoolState::Started;
        for slot in 0..workers {
            let launched = pool.launch(slot, 0)?;
            pool.slots.push(launched);
        }
        tracing::info!(workers, %address, "worker pool started");
        Ok(pool)
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    /// Highest number of tasks that were in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    fn launch(&mut self, slot: usize, respawns: usize) -> HarnessResult<Slot> {
        self.next_generation += 1;
        let generation = self.next_generation;
        let process = self.launcher.launch(WorkerStartup {
            slot,
            generation,
            address: self.address,
            authkey: self.authkey.clone(),
            config: self.config.clone(),
        })?;

        Ok(Slot {
            generation,
            process: Some(process),
            writer: None,
            in_flight: None,
            launched_at: Instant::now(),
            respawns,
            stop_sent: false,
            retired: false,
        })
    }

    fn is_current(&self, slot: usize, generation: u64) -> bool {
        self.slots
            .get(slot)
            .is_some_and(|s| s.generation == generation && !s.retired)
    }

    fn is_finished(&self) -> bool {
        (self.input_done || self.stopping) && self.slots.iter().all(|s| s.in_flight.is_none())
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Connected {
                slot,
                generation,
                mut writer,
            } => {
                if !self.is_current(slot, generation) {
                    let _ = writer.send(&ToWorker::Stop);
                    return;
                }
                self.slots[slot].writer = Some(writer);
                self.feed(slot);
            }
            Event::Message {
                slot,
                generation,
                message,
            } => {
                if !self.is_current(slot, generation) {
                    return;
                }
                match message {
                    FromWorker::Result(unit) => {
                        if let Some(flight) = self.slots[slot].in_flight.as_mut() {
                            flight.reported += 1;
                        }
                        self.ready.push_back(unit);
                    }
                    FromWorker::TaskDone => {
                        self.slots[slot].in_flight = None;
                        self.feed(slot);
                    }
                    FromWorker::Hello { .. } => {}
                }
            }
            Event::Disconnected { slot, generation } => {
                if self.is_current(slot, generation) {
                    self.worker_lost(slot, "connection to worker closed");
                }
            }
        }
    }

    /// Hand the next task to an idle, connected worker
    fn feed(&mut self, slot: usize) {
        if self.slots[slot].in_flight.is_some() || self.slots[slot].writer.is_none() {
            return;
        }
        if self.stopping || self.input_done {
            self.slots[slot].send_stop();
            return;
        }
        let Some(task) = self.tasks.next() else {
            self.input_done = true;
            self.slots[slot].send_stop();
            return;
        };

        let sent = match self.slots[slot].writer.as_mut() {
            Some(writer) => writer.send(&ToWorker::Run(task.clone())),
            None => Err(HarnessError::protocol("worker has no connection")),
        };
        self.slots[slot].in_flight = Some(InFlight {
            units: task.into_units(),
            reported: 0,
        });
        let busy = self.slots.iter().filter(|s| s.in_flight.is_some()).count();
        self.max_in_flight = self.max_in_flight.max(busy);

        if let Err(e) = sent {
            self.worker_lost(slot, &format!("can't send task: {}", e));
        }
    }

    /// A worker went away; fail what it never reported and maybe replace it
    fn worker_lost(&mut self, slot: usize, reason: &str) {
        let state = &mut self.slots[slot];
        if let Some(writer) = state.writer.take() {
            writer.shutdown();
        }
        let lost = state.in_flight.take();
        let expected = state.stop_sent && lost.is_none();
        if let Some(mut process) = state.process.take() {
            if !expected {
                process.kill();
            }
            process.join();
        }
        state.retired = true;
        if expected {
            return;
        }

        tracing::warn!(slot, reason, "worker lost");
        if let Some(flight) = lost {
            let msg = format!(
                "worker {} terminated unexpectedly while running this test ({})",
                slot, reason
            );
            for mut unit in flight.units.into_iter().skip(flight.reported) {
                unit.conclude_failed(msg.clone());
                self.ready.push_back(unit);
            }
        }

        let respawns = self.slots[slot].respawns;
        if !self.stopping && !self.input_done && respawns < MAX_RESPAWNS {
            match self.launch(slot, respawns + 1) {
                Ok(replacement) => self.slots[slot] = replacement,
                Err(e) => tracing::warn!(slot, error = %e, "can't replace worker"),
            }
        }

        if self.slots.iter().all(|s| s.retired) && !self.stopping && !self.input_done {
            self.abandon("no worker processes are left to run this test");
        }
    }

    /// Look after workers that never connected
    fn check_workers(&mut self) {
        for slot in 0..self.slots.len() {
            let state = &mut self.slots[slot];
            if state.retired || state.writer.is_some() {
                continue;
            }
            let exited = state.process.as_mut().map_or(true, |p| p.has_exited());
            if exited {
                self.worker_lost(slot, "worker exited before connecting");
            } else if state.launched_at.elapsed() > CONNECT_DEADLINE {
                self.worker_lost(slot, "worker did not connect in time");
            }
        }
    }

    /// Fail everything not yet run
    fn abandon(&mut self, reason: &str) {
        for state in self.slots.iter_mut() {
            if let Some(flight) = state.in_flight.take() {
                for mut unit in flight.units.into_iter().skip(flight.reported) {
                    unit.conclude_failed(reason);
                    self.ready.push_back(unit);
                }
            }
        }
        if !self.stopping {
            for task in self.tasks.by_ref() {
                for mut unit in task.into_units() {
                    unit.conclude_failed(reason);
                    self.ready.push_back(unit);
                }
            }
        }
        self.input_done = true;
    }

    /// Stop handing out work; running tasks still report
    fn begin_drain(&mut self) {
        if self.stopping {
            return;
        }
        tracing::info!("stopping after first failure");
        self.stopping = true;
        self.state = PoolState::Draining;
        for state in self.slots.iter_mut().filter(|s| s.in_flight.is_none()) {
            state.send_stop();
        }
    }

    /// Stop every worker and wait for all of them
    fn shutdown(&mut self) {
        if self.state == PoolState::Stopped {
            return;
        }
        self.state = PoolState::Draining;
        for state in self.slots.iter_mut() {
            state.send_stop();
        }

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            // workers that connect late still need their Stop
            while let Ok(event) = self.events.try_recv() {
                if let Event::Connected {
                    slot,
                    generation,
                    mut writer,
                } = event
                {
                    let _ = writer.send(&ToWorker::Stop);
                    if let Some(state) = self.slots.get_mut(slot).filter(|s| s.generation == generation) {
                        state.writer = Some(writer);
                        state.stop_sent = true;
                    }
                }
            }

            let all_exited = self
                .slots
                .iter_mut()
                .all(|s| s.process.as_mut().map_or(true, |p| p.has_exited()));
            if all_exited {
                break;
            }
            if Instant::now() >= deadline {
                tracing::warn!("workers did not stop in time; killing them");
                for state in self.slots.iter_mut() {
                    if let Some(process) = state.process.as_mut() {
                        process.kill();
                    }
                }
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }

        for state in self.slots.iter_mut() {
            if let Some(mut process) = state.process.take() {
                process.join();
            }
            state.writer = None;
            state.retired = true;
        }

        self.acceptor_stop.store(true, Ordering::SeqCst);
        let _ = TcpStream::connect(self.address);
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
        self.state = PoolState::Stopped;
        tracing::debug!(max_in_flight = self.max_in_flight, "worker pool stopped");
    }
}

impl<I: Iterator<Item = Task>> Iterator for PoolRun<I> {
    type Item = TestUnit;

    fn next(&mut self) -> Option<TestUnit> {
        loop {
            if let Some(unit) = self.ready.pop_front() {
                if self.config.options.stop && unit.is_unexpected_failure() {
                    self.begin_drain();
                }
                return Some(unit);
            }

            match self.state {
                PoolState::Idle | PoolState::Stopped => return None,
                PoolState::Started | PoolState::Draining => {}
            }
            if self.is_finished() {
                self.shutdown();
                continue;
            }

            match self.events.recv_timeout(POLL_INTERVAL) {
                Ok(event) => self.handle(event),
                Err(RecvTimeoutError::Timeout) => self.check_workers(),
                Err(RecvTimeoutError::Disconnected) => self.abandon("worker pool lost its listener"),
            }
        }
    }
}

impl<I> Drop for PoolRun<I> {
    fn drop(&mut self) {
        if self.state == PoolState::Stopped {
            return;
        }
        self.acceptor_stop.store(true, Ordering::SeqCst);
        for state in self.slots.iter_mut() {
            state.send_stop();
            if let Some(writer) = state.writer.take() {
                writer.shutdown();
            }
        }
        for state in self.slots.iter_mut() {
            if let Some(mut process) = state.process.take() {
                process.kill();
                process.join();
            }
        }
        let _ = TcpStream::connect(self.address);
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
    }
}

fn accept_workers(listener: TcpListener, authkey: String, events: Sender<Event>, stop: Arc<AtomicBool>) {
    for stream in listener.incoming() {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let Ok(stream) = stream else { continue };
        let authkey = authkey.clone();
        let events = events.clone();
        let spawned = thread::Builder::new()
            .name("flotilla-pool-reader".to_string())
            .spawn(move || read_worker(stream, &authkey, &events));
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "can't spawn worker reader thread");
        }
    }
}

/// Authenticate a worker connection, then forward its messages
fn read_worker(stream: TcpStream, authkey: &str, events: &Sender<Event>) {
    let Ok(conn) = Connection::new(stream) else { return };
    let (mut reader, writer) = conn.into_parts();
    if reader.set_timeout(Some(HANDSHAKE_TIMEOUT)).is_err() {
        return;
    }

    let (slot, generation) = match reader.recv::<FromWorker>() {
        Ok(Some(FromWorker::Hello {
            slot,
            generation,
            authkey: offered,
        })) if offered == authkey => (slot, generation),
        _ => {
            tracing::warn!("rejected unauthenticated worker connection");
            return;
        }
    };
    if reader.set_timeout(None).is_err() {
        return;
    }
    if events
        .send(Event::Connected {
            slot,
            generation,
            writer,
        })
        .is_err()
    {
        return;
    }

    while let Ok(Some(message)) = reader.recv::<FromWorker>() {
        let forwarded = Event::Message {
            slot,
            generation,
            message,
        };
        if events.send(forwarded).is_err() {
            return;
        }
    }
    let _ = events.send(Event::Disconnected { slot, generation });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ExecOptions;
    use crate::registry::{Module, Registry, TestError};
    use crate::resolver::ResolverSettings;
    use crate::unit::Status;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn registry() -> Arc<Registry> {
        Arc::new(
            Registry::new().with(
                Module::new("m")
                    .test("test_a", |_| Ok(()))
                    .test("test_b", |_| Ok(()))
                    .test("test_c", |_| Err(TestError::fail("c failed")))
                    .test("test_d", |_| Err(TestError::skip("d skipped"))),
            ),
        )
    }

    fn config(num_procs: usize, stop: bool) -> WorkerConfig {
        WorkerConfig {
            options: ExecOptions {
                num_procs,
                stop,
                ..Default::default()
            },
            resolver: ResolverSettings {
                search_path: Vec::new(),
                ..Default::default()
            },
        }
    }

    fn singles(specs: &[&str]) -> Vec<Task> {
        specs.iter().map(|s| Task::Single(TestUnit::new(*s))).collect()
    }

    fn statuses(results: &[TestUnit]) -> BTreeMap<String, Status> {
        results
            .iter()
            .map(|u| (u.spec().to_string(), u.status().unwrap()))
            .collect()
    }

    #[test]
    fn test_each_unit_reported_once() {
        let tasks = singles(&["m:test_a", "m:test_b", "m:test_c", "m:test_d"]);
        let launcher = Box::new(ThreadLauncher::new(registry()));
        let mut run = PoolRun::start(tasks.into_iter(), config(2, false), launcher).unwrap();

        let results: Vec<TestUnit> = run.by_ref().collect();
        assert_eq!(results.len(), 4);
        let by_spec = statuses(&results);
        assert_eq!(by_spec["m:test_a"], Status::Ok);
        assert_eq!(by_spec["m:test_b"], Status::Ok);
        assert_eq!(by_spec["m:test_c"], Status::Fail);
        assert_eq!(by_spec["m:test_d"], Status::Skip);
        assert!(run.max_in_flight() <= 2);
        assert_eq!(run.state(), PoolState::Stopped);
    }

    #[test]
    fn test_group_task_keeps_order() {
        let tasks = vec![Task::Group(vec![
            TestUnit::new("m:test_b"),
            TestUnit::new("m:test_a"),
            TestUnit::new("m:test_d"),
        ])];
        let launcher = Box::new(ThreadLauncher::new(registry()));
        let results: Vec<TestUnit> = PoolRun::start(tasks.into_iter(), config(3, false), launcher)
            .unwrap()
            .collect();

        let order: Vec<&str> = results.iter().map(|u| u.spec()).collect();
        assert_eq!(order, vec!["m:test_b", "m:test_a", "m:test_d"]);
    }

    #[test]
    fn test_empty_input_stops_cleanly() {
        let launcher = Box::new(ThreadLauncher::new(registry()));
        let mut run = PoolRun::start(Vec::<Task>::new().into_iter(), config(2, false), launcher).unwrap();
        assert!(run.next().is_none());
        assert_eq!(run.state(), PoolState::Stopped);
    }

    #[test]
    fn test_stop_after_failure_schedules_nothing_new() {
        let mut specs = vec!["m:test_c"];
        specs.extend(std::iter::repeat("m:test_a").take(20));
        let launcher = Box::new(ThreadLauncher::new(registry()));
        let results: Vec<TestUnit> = PoolRun::start(singles(&specs).into_iter(), config(1, true), launcher)
            .unwrap()
            .collect();

        assert_eq!(results[0].status(), Some(Status::Fail));
        assert!(results.len() < specs.len());
    }

    /// Connects like a worker, reports the first unit of its task, then drops
    struct CrashingLauncher;

    impl WorkerLauncher for CrashingLauncher {
        fn launch(&mut self, startup: WorkerStartup) -> HarnessResult<Box<dyn WorkerProcess>> {
            let handle = thread::spawn(move || {
                let mut conn = Connection::connect(startup.address).unwrap();
                conn.send(&FromWorker::Hello {
                    slot: startup.slot,
                    generation: startup.generation,
                    authkey: startup.authkey.clone(),
                })
                .unwrap();
                if let Ok(Some(ToWorker::Run(task))) = conn.recv::<ToWorker>() {
                    let mut units = task.into_units().into_iter();
                    if let Some(first) = units.next() {
                        let done = TestUnit::with_outcome(first.spec(), Status::Ok, "");
                        conn.send(&FromWorker::Result(done)).unwrap();
                    }
                }
            });
            Ok(Box::new(ThreadWorker(Some(handle))))
        }
    }

    #[test]
    fn test_crashed_worker_units_are_failed_exactly_once() {
        let tasks = vec![
            Task::Group(vec![
                TestUnit::new("m:test_a"),
                TestUnit::new("m:test_b"),
                TestUnit::new("m:test_c"),
            ]),
            Task::Single(TestUnit::new("m:test_d")),
        ];
        let results: Vec<TestUnit> = PoolRun::start(tasks.into_iter(), config(1, false), Box::new(CrashingLauncher))
            .unwrap()
            .collect();

        let by_spec = statuses(&results);
        assert_eq!(results.len(), 4);
        assert_eq!(by_spec["m:test_a"], Status::Ok);
        assert_eq!(by_spec["m:test_b"], Status::Fail);
        assert_eq!(by_spec["m:test_c"], Status::Fail);
        let b = results.iter().find(|u| u.spec() == "m:test_b").unwrap();
        assert!(b.err_msg().contains("terminated unexpectedly"));
        // the replacement worker crashes too; test_d still gets exactly one result
        assert!(by_spec.contains_key("m:test_d"));
    }

    #[test]
    fn test_launch_failure_is_reported() {
        struct Broken;
        impl WorkerLauncher for Broken {
            fn launch(&mut self, _: WorkerStartup) -> HarnessResult<Box<dyn WorkerProcess>> {
                Err(HarnessError::launch(
                    "worker",
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no binary"),
                ))
            }
        }
        let result = PoolRun::start(Vec::<Task>::new().into_iter(), config(2, false), Box::new(Broken));
        assert!(matches!(result, Err(HarnessError::Launch { .. })));
    }
}
