//! Rendezvous server: named FIFO queues reachable over an authenticated socket
//!
//! Isolated and distributed children have no channel back to the harness
//! except this one. A child puts its finished unit on a queue named by its
//! parent; the parent gets it after the child exits.

use crate::error::{HarnessError, HarnessResult};
use crate::options::RendezvousHandle;
use crate::wire::{generate_authkey, Connection};
use parking_lot::{Condvar, Mutex};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long a connection may take to authenticate
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

static QUEUE_SEQ: AtomicU64 = AtomicU64::new(0);

/// A queue name unique to this process
pub fn unique_queue(prefix: &str) -> String {
    format!(
        "{}-{}-{}",
        prefix,
        std::process::id(),
        QUEUE_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

#[derive(Debug, Serialize, Deserialize)]
enum Request {
    Hello { authkey: String },
    Put { queue: String, item: Value },
    Get { queue: String, timeout_ms: u64 },
}

#[derive(Debug, Serialize, Deserialize)]
enum Reply {
    Welcome,
    Stored,
    Item(Value),
    Empty,
}

#[derive(Default)]
struct Queues {
    items: Mutex<HashMap<String, VecDeque<Value>>>,
    ready: Condvar,
}

impl Queues {
    fn put(&self, queue: String, item: Value) {
        self.items.lock().entry(queue).or_default().push_back(item);
        self.ready.notify_all();
    }

    fn get(&self, queue: &str, timeout: Duration) -> Option<Value> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();
        loop {
            if let Some(item) = pop(&mut items, queue) {
                return Some(item);
            }
            if self.ready.wait_until(&mut items, deadline).timed_out() {
                return pop(&mut items, queue);
            }
        }
    }

    #[cfg(test)]
    fn live_queues(&self) -> usize {
        self.items.lock().len()
    }
}

/// Take the oldest item, dropping the queue once it is empty
fn pop(items: &mut HashMap<String, VecDeque<Value>>, queue: &str) -> Option<Value> {
    let entry = items.get_mut(queue)?;
    let item = entry.pop_front();
    if entry.is_empty() {
        items.remove(queue);
    }
    item
}

/// A running rendezvous server; shut down on drop
pub struct RendezvousServer {
    handle: RendezvousHandle,
    shutdown: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
}

impl RendezvousServer {
    /// Bind a loopback port and start accepting connections
    pub fn start() -> HarnessResult<Self> {
        let listener =
            TcpListener::bind("127.0.0.1:0").map_err(|e| HarnessError::bind("rendezvous server", e))?;
        let address = listener.local_addr()?;
        let handle = RendezvousHandle {
            address,
            authkey: generate_authkey(),
        };

        let shutdown = Arc::new(AtomicBool::new(false));
        let queues = Arc::new(Queues::default());
        let acceptor = {
            let shutdown = Arc::clone(&shutdown);
            let authkey = handle.authkey.clone();
            thread::Builder::new()
                .name("flotilla-rendezvous".to_string())
                .spawn(move || accept_loop(listener, authkey, queues, shutdown))?
        };

        tracing::debug!(%address, "rendezvous server listening");
        Ok(Self {
            handle,
            shutdown,
            acceptor: Some(acceptor),
        })
    }

    pub fn handle(&self) -> &RendezvousHandle {
        &self.handle
    }

    pub fn shutdown(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            self.shutdown.store(true, Ordering::SeqCst);
            // wake the blocking accept
            let _ = TcpStream::connect(self.handle.address);
            let _ = acceptor.join();
        }
    }
}

impl Drop for RendezvousServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(listener: TcpListener, authkey: String, queues: Arc<Queues>, shutdown: Arc<AtomicBool>) {
    for stream in listener.incoming() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "rendezvous accept failed");
                continue;
            }
        };
        let authkey = authkey.clone();
        let queues = Arc::clone(&queues);
        let spawned = thread::Builder::new()
            .name("flotilla-rendezvous-conn".to_string())
            .spawn(move || {
                if let Err(e) = serve(stream, &authkey, &queues) {
                    tracing::debug!(error = %e, "rendezvous connection closed");
                }
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "could not spawn rendezvous connection thread");
        }
    }
}

fn serve(stream: TcpStream, authkey: &str, queues: &Queues) -> HarnessResult<()> {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown peer".to_string());
    let mut conn = Connection::new(stream)?;

    conn.reader.set_timeout(Some(HANDSHAKE_TIMEOUT))?;
    match conn.recv::<Request>()? {
        Some(Request::Hello { authkey: offered }) if offered == authkey => {}
        _ => return Err(HarnessError::Auth { peer }),
    }
    conn.reader.set_timeout(None)?;
    conn.send(&Reply::Welcome)?;

    while let Some(request) = conn.recv::<Request>()? {
        match request {
            Request::Put { queue, item } => {
                queues.put(queue, item);
                conn.send(&Reply::Stored)?;
            }
            Request::Get { queue, timeout_ms } => {
                let reply = match queues.get(&queue, Duration::from_millis(timeout_ms)) {
                    Some(item) => Reply::Item(item),
                    None => Reply::Empty,
                };
                conn.send(&reply)?;
            }
            Request::Hello { .. } => return Err(HarnessError::protocol("repeated handshake")),
        }
    }
    Ok(())
}

/// Client side of the rendezvous protocol
pub struct RendezvousClient {
    conn: Connection,
}

impl RendezvousClient {
    pub fn connect(handle: &RendezvousHandle) -> HarnessResult<Self> {
        let mut conn = Connection::connect(handle.address)?;
        conn.send(&Request::Hello {
            authkey: handle.authkey.clone(),
        })?;
        match conn.recv::<Reply>()? {
            Some(Reply::Welcome) => Ok(Self { conn }),
            _ => Err(HarnessError::Auth {
                peer: handle.address.to_string(),
            }),
        }
    }

    /// Append an item to a named queue
    pub fn put<T: Serialize>(&mut self, queue: &str, item: &T) -> HarnessResult<()> {
        let item = serde_json::to_value(item).map_err(HarnessError::protocol)?;
        self.conn.send(&Request::Put {
            queue: queue.to_string(),
            item,
        })?;
        match self.conn.recv::<Reply>()? {
            Some(Reply::Stored) => Ok(()),
            other => Err(HarnessError::protocol(format!("unexpected reply to put: {:?}", other))),
        }
    }

    /// Take the oldest item of a queue, waiting up to `timeout`
    pub fn get<T: DeserializeOwned>(&mut self, queue: &str, timeout: Duration) -> HarnessResult<Option<T>> {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.conn.send(&Request::Get {
            queue: queue.to_string(),
            timeout_ms,
        })?;
        match self.conn.recv::<Reply>()? {
            Some(Reply::Item(value)) => serde_json::from_value(value)
                .map(Some)
                .map_err(HarnessError::protocol),
            Some(Reply::Empty) => Ok(None),
            other => Err(HarnessError::protocol(format!("unexpected reply to get: {:?}", other))),
        }
    }
}
