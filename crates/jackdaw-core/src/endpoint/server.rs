//! UDP control plane
//!
//! A background thread receives datagrams of the form `"<route> <value>;"`,
//! looks the route up in the shared [`RouteTable`] and writes the endpoint
//! from [`ThreadId::Server`] with every callback enabled. Each datagram gets
//! one reply: `"200 OK;"` on success, `"Error: endpoint not found"` for an
//! unknown route.
//!
//! Every handled message is also published as a [`ServerEvent`] on a bounded
//! crossbeam channel so the UI can show remote activity. Events nobody reads
//! are dropped once [`EVENT_QUEUE_CAPACITY`] is reached.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};

use super::error::EndpointError;
use super::route::RouteTable;
use super::session::Session;
use super::{ThreadId, Value, WriteFlags};

pub const REPLY_OK: &str = "200 OK;";
pub const REPLY_NOT_FOUND: &str = "Error: endpoint not found";
pub const REPLY_BAD_VALUE: &str = "Error: invalid value";

/// Unread events kept before new ones are dropped
pub const EVENT_QUEUE_CAPACITY: usize = 256;

const RECV_BUF_LEN: usize = 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Activity seen by the server thread
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// An endpoint was written
    Write { route: String, value: Value },
    /// The write was refused, e.g. the owner's queue was full
    WriteFailed { route: String, error: EndpointError },
    /// No endpoint under this route
    NotFound { route: String },
    /// Route found but the value text did not parse
    BadValue { route: String, input: String },
}

/// Running UDP server; stops when dropped
pub struct ControlServer {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    events: Receiver<ServerEvent>,
    thread: Option<JoinHandle<()>>,
}

/// Split `"route value;"` into its parts
fn parse_message(msg: &str) -> (&str, &str) {
    let msg = msg.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    let msg = msg.trim_end_matches(';');
    match msg.split_once(' ') {
        Some((route, value)) => (route.trim(), value.trim()),
        None => (msg, ""),
    }
}

fn publish(events: &Sender<ServerEvent>, event: ServerEvent) {
    match events.try_send(event) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
        Err(TrySendError::Full(event)) => log::debug!("Server event queue full; dropping {:?}", event),
    }
}

/// Handle one message, returning the reply text
fn handle_message(msg: &str, table: &Mutex<RouteTable>, session: &Session, events: &Sender<ServerEvent>) -> &'static str {
    let (route, input) = parse_message(msg);
    let ep = {
        let table = table.lock().unwrap_or_else(|p| p.into_inner());
        table.get(route).cloned()
    };
    let Some(ep) = ep else {
        log::warn!("Endpoint not found: {}", route);
        publish(
            events,
            ServerEvent::NotFound {
                route: route.to_string(),
            },
        );
        return REPLY_NOT_FOUND;
    };
    let value = match Value::parse(ep.val_type(), input) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("{}", e);
            publish(
                events,
                ServerEvent::BadValue {
                    route: route.to_string(),
                    input: input.to_string(),
                },
            );
            return REPLY_BAD_VALUE;
        }
    };
    let route = route.to_string();
    let event = match ep.write(session, ThreadId::Server, value, WriteFlags::ALL_CALLBACKS) {
        Ok(_) => ServerEvent::Write { route, value },
        Err(error) => {
            log::warn!("Server write to {} failed: {}", route, error);
            ServerEvent::WriteFailed { route, error }
        }
    };
    publish(events, event);
    // Replied even when the write was refused
    REPLY_OK
}

impl ControlServer {
    /// Bind `0.0.0.0:port` and start serving
    ///
    /// Port 0 picks a free port; see [`ControlServer::local_addr`].
    pub fn start(port: u16, table: Arc<Mutex<RouteTable>>, session: Arc<Session>) -> io::Result<Self> {
        Self::start_on(SocketAddr::from(([0, 0, 0, 0], port)), table, session)
    }

    pub fn start_on(addr: SocketAddr, table: Arc<Mutex<RouteTable>>, session: Arc<Session>) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        let local_addr = socket.local_addr()?;
        let running = Arc::new(AtomicBool::new(true));
        let (event_tx, event_rx) = bounded(EVENT_QUEUE_CAPACITY);

        let thread_running = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("jackdaw-server".to_string())
            .spawn(move || {
                log::info!("Server active on {}", local_addr);
                let mut buf = [0u8; RECV_BUF_LEN];
                while thread_running.load(Ordering::Acquire) {
                    let (n, peer) = match socket.recv_from(&mut buf) {
                        Ok(r) => r,
                        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => continue,
                        Err(e) => {
                            log::error!("recv_from failed: {}", e);
                            break;
                        }
                    };
                    let msg = String::from_utf8_lossy(&buf[..n]);
                    let reply = handle_message(&msg, &table, &session, &event_tx);
                    if let Err(e) = socket.send_to(reply.as_bytes(), peer) {
                        log::warn!("send_to {} failed: {}", peer, e);
                    }
                }
                log::info!("Server on {} exiting", local_addr);
            })?;

        Ok(Self {
            local_addr,
            running,
            events: event_rx,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Receiver for server activity
    pub fn events(&self) -> Receiver<ServerEvent> {
        self.events.clone()
    }

    /// Stop the thread and wait for it
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("Server thread panicked");
            }
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.stop();
    }
}
