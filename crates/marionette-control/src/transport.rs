//! Control server transport (TCP/Unix).
//!
//! Sockets are served by plain threads that only move lines. Requests are
//! forwarded to the main loop over a channel, so every object access stays
//! on the loop's thread; responses and broadcast events travel back through
//! one writer thread per client.

#![allow(missing_docs)]

use std::cell::RefCell;
use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
#[cfg(unix)]
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use indexmap::IndexMap;
use marionette_core::mainloop::{LoopWaker, SourceId};
use marionette_core::{ControlError, MainLoop};
use tracing::{debug, error, info, warn};

use crate::control::Controller;

pub const DEFAULT_PORT: u16 = 7700;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEndpoint {
    Tcp(SocketAddr),
    #[cfg(unix)]
    Unix(PathBuf),
}

impl Default for ControlEndpoint {
    fn default() -> Self {
        Self::Tcp(SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)))
    }
}

impl fmt::Display for ControlEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
            #[cfg(unix)]
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

impl ControlEndpoint {
    pub fn parse(text: &str) -> Result<Self, ControlError> {
        if let Some(rest) = text.strip_prefix("tcp://") {
            let addr = rest.parse::<SocketAddr>().map_err(|err| {
                ControlError::InvalidConfig(format!("invalid tcp endpoint: {err}").into())
            })?;
            if !addr.ip().is_loopback() {
                return Err(ControlError::InvalidConfig(
                    "tcp endpoint must be loopback (use unix:// for local sockets)".into(),
                ));
            }
            return Ok(Self::Tcp(addr));
        }
        #[cfg(unix)]
        if let Some(rest) = text.strip_prefix("unix://") {
            if rest.is_empty() {
                return Err(ControlError::InvalidConfig("empty unix socket path".into()));
            }
            return Ok(Self::Unix(PathBuf::from(rest)));
        }
        Err(ControlError::InvalidConfig(
            format!("unsupported endpoint '{text}'").into(),
        ))
    }
}

type ClientId = u64;

enum ClientMessage {
    Connected {
        client: ClientId,
        sender: Sender<String>,
    },
    Request {
        client: ClientId,
        line: String,
    },
    Disconnected {
        client: ClientId,
    },
}

type Clients = Rc<RefCell<IndexMap<ClientId, Sender<String>>>>;

/// A registered control surface. Dropping it stops dispatching requests,
/// closes the listener and releases the endpoint.
pub struct ControlServer {
    endpoint: ControlEndpoint,
    main_loop: MainLoop,
    source: SourceId,
    clients: Clients,
    shutdown: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
}

impl fmt::Debug for ControlServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlServer")
            .field("endpoint", &self.endpoint)
            .field("clients", &self.clients.borrow().len())
            .finish_non_exhaustive()
    }
}

impl ControlServer {
    /// Bound endpoint; for TCP this carries the actual port.
    #[must_use]
    pub fn endpoint(&self) -> &ControlEndpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.endpoint {
            ControlEndpoint::Tcp(addr) => Some(*addr),
            #[cfg(unix)]
            ControlEndpoint::Unix(_) => None,
        }
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.borrow().len()
    }

    /// Unblock the accept thread with a throwaway connection.
    fn wake_acceptor(&self) -> bool {
        match &self.endpoint {
            ControlEndpoint::Tcp(addr) => TcpStream::connect(addr).is_ok(),
            #[cfg(unix)]
            ControlEndpoint::Unix(path) => std::os::unix::net::UnixStream::connect(path).is_ok(),
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.main_loop.source_remove(self.source);
        self.clients.borrow_mut().clear();
        self.shutdown.store(true, Ordering::Release);
        if let Some(acceptor) = self.acceptor.take() {
            if self.wake_acceptor() {
                let _ = acceptor.join();
            } else {
                warn!(endpoint = %self.endpoint, "control listener did not wake up");
            }
        }
        #[cfg(unix)]
        if let ControlEndpoint::Unix(path) = &self.endpoint {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Bind `endpoint` and serve `controller` from `main_loop`.
///
/// A failure to bind is logged and leaves the application without a
/// control surface.
pub fn register_control_surface(
    endpoint: &ControlEndpoint,
    controller: &Controller,
    main_loop: &MainLoop,
) -> Option<ControlServer> {
    match spawn_control_server(endpoint, controller, main_loop) {
        Ok(server) => {
            info!(endpoint = %server.endpoint, "control surface registered");
            Some(server)
        }
        Err(err) => {
            error!(%endpoint, %err, "control surface not registered");
            None
        }
    }
}

fn spawn_control_server(
    endpoint: &ControlEndpoint,
    controller: &Controller,
    main_loop: &MainLoop,
) -> Result<ControlServer, ControlError> {
    let (messages, receiver) = mpsc::channel::<ClientMessage>();
    let waker = main_loop.waker();
    let shutdown = Arc::new(AtomicBool::new(false));
    let stop = Arc::clone(&shutdown);
    let (bound, acceptor) = match endpoint {
        ControlEndpoint::Tcp(addr) => {
            let listener = TcpListener::bind(addr)
                .map_err(|err| ControlError::Transport(format!("bind {addr}: {err}").into()))?;
            let local = listener
                .local_addr()
                .map_err(|err| ControlError::Transport(format!("local address: {err}").into()))?;
            let acceptor = thread::spawn(move || {
                for (client, stream) in (1..).zip(listener.incoming().map_while(Result::ok)) {
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    let peer = stream.peer_addr().map(|addr| addr.to_string()).ok();
                    debug!(client, peer, "control client connected");
                    let Ok(writer) = stream.try_clone() else {
                        continue;
                    };
                    let messages = messages.clone();
                    let waker = waker.clone();
                    thread::spawn(move || handle_client(stream, writer, client, &messages, &waker));
                }
            });
            (ControlEndpoint::Tcp(local), acceptor)
        }
        #[cfg(unix)]
        ControlEndpoint::Unix(path) => {
            if path.exists() {
                let _ = std::fs::remove_file(path);
            }
            let listener = std::os::unix::net::UnixListener::bind(path).map_err(|err| {
                ControlError::Transport(format!("bind {}: {err}", path.display()).into())
            })?;
            set_unix_permissions(path)?;
            let acceptor = thread::spawn(move || {
                for (client, stream) in (1..).zip(listener.incoming().map_while(Result::ok)) {
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    debug!(client, "control client connected");
                    let Ok(writer) = stream.try_clone() else {
                        continue;
                    };
                    let messages = messages.clone();
                    let waker = waker.clone();
                    thread::spawn(move || handle_client(stream, writer, client, &messages, &waker));
                }
            });
            (endpoint.clone(), acceptor)
        }
    };

    let clients: Clients = Rc::new(RefCell::new(IndexMap::new()));
    let weak_clients = Rc::downgrade(&clients);
    controller.subscribe(move |event| {
        let Some(clients) = weak_clients.upgrade() else {
            return false;
        };
        match serde_json::to_string(event) {
            Ok(line) => broadcast_line(&clients, &line),
            Err(err) => warn!(%err, "failed to encode control event"),
        }
        true
    });

    let dispatch_clients = Rc::clone(&clients);
    let controller = controller.clone();
    let source = main_loop.attach_receiver(receiver, move |message: ClientMessage| match message {
        ClientMessage::Connected { client, sender } => {
            dispatch_clients.borrow_mut().insert(client, sender);
        }
        ClientMessage::Request { client, line } => {
            let Some(response) = controller.handle_request_line(&line) else {
                return;
            };
            let sender = dispatch_clients.borrow().get(&client).cloned();
            if let Some(sender) = sender {
                if sender.send(response).is_err() {
                    dispatch_clients.borrow_mut().shift_remove(&client);
                }
            }
        }
        ClientMessage::Disconnected { client } => {
            debug!(client, "control client disconnected");
            dispatch_clients.borrow_mut().shift_remove(&client);
        }
    });

    Ok(ControlServer {
        endpoint: bound,
        main_loop: main_loop.clone(),
        source,
        clients,
        shutdown,
        acceptor: Some(acceptor),
    })
}

fn broadcast_line(clients: &Clients, line: &str) {
    clients
        .borrow_mut()
        .retain(|_, sender| sender.send(line.to_owned()).is_ok());
}

fn handle_client(
    reader: impl Read,
    mut writer: impl Write + Send + 'static,
    client: ClientId,
    messages: &Sender<ClientMessage>,
    waker: &LoopWaker,
) {
    let (sender, lines) = mpsc::channel::<String>();
    thread::spawn(move || {
        for line in lines {
            if writeln!(writer, "{line}").is_err() {
                break;
            }
        }
    });
    if messages
        .send(ClientMessage::Connected { client, sender })
        .is_err()
    {
        return;
    }
    waker.wake();
    for line in BufReader::new(reader).lines().map_while(Result::ok) {
        if messages.send(ClientMessage::Request { client, line }).is_err() {
            return;
        }
        waker.wake();
    }
    let _ = messages.send(ClientMessage::Disconnected { client });
    waker.wake();
}

#[cfg(unix)]
fn set_unix_permissions(path: &std::path::Path) -> Result<(), ControlError> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)
        .map_err(|err| ControlError::Transport(format!("socket metadata: {err}").into()))?
        .permissions();
    perms.set_mode(0o600);
    std::fs::set_permissions(path, perms)
        .map_err(|err| ControlError::Transport(format!("socket chmod: {err}").into()))
}
