//! Client connection state machine
//!
//! [`NetClient`] owns one non-blocking stream to the server and is driven by
//! calling [`NetClient::update`] once per frame. It reconnects on a fixed
//! interval, keeps the link alive with `PING`/`PONG`, keeps asking for its
//! name until the server admits it, and turns incoming frames into
//! [`NetEvent`]s for the game layer.

use log::{debug, error, info, warn};
use shared::protocol::{Cmd, Frame, OutQueue, RecvBuffer};
use shared::snapshot::{decode_simulation, decode_tiles, encode_action, Snapshot};
use shared::{Action, Grid, MAP_SIZE};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

/// Seconds between connection attempts while disconnected.
pub const RECONNECT_INTERVAL: f32 = 1.0;
/// Seconds between keepalive checks.
pub const ALIVE_WINDOW: f32 = 5.0;
/// Seconds between `SET_NAME` attempts while not yet in game.
pub const RENAME_INTERVAL: f32 = 1.0;
/// How long one resolved address may stay in progress before the next
/// one is tried.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(300);

/// Anything the client can speak the protocol over.
pub trait Stream: Read + Write {}

impl<T: Read + Write> Stream for T {}

/// A connection attempt in flight. Polled once per update with the frame
/// time until it yields a stream or fails.
pub trait PendingConnect {
    /// `Ok(None)` while still in progress. Must not block.
    fn poll(&mut self, dt: f32) -> io::Result<Option<Box<dyn Stream>>>;
}

/// Starts connection attempts. Implementations must return without
/// waiting on the network, and the streams they finally hand out must be
/// non-blocking.
pub trait Connector {
    fn connect(&mut self, host: &str, port: u16) -> io::Result<Box<dyn PendingConnect>>;
}

/// An attempt that finished before it was handed out, for connectors
/// whose streams need no handshake.
pub struct Ready(Option<Box<dyn Stream>>);

impl Ready {
    pub fn new<S: Stream + 'static>(stream: S) -> Box<dyn PendingConnect> {
        Box::new(Ready(Some(Box::new(stream))))
    }
}

impl PendingConnect for Ready {
    fn poll(&mut self, _: f32) -> io::Result<Option<Box<dyn Stream>>> {
        match self.0.take() {
            Some(stream) => Ok(Some(stream)),
            None => Err(io::Error::new(ErrorKind::Other, "stream already taken")),
        }
    }
}

/// Connects over TCP without blocking, trying each resolved address in
/// turn.
///
/// Each address gets `timeout` of accumulated update time before the next
/// one is tried. The resulting socket is non-blocking with Nagle disabled.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    pub timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self {
            timeout: CONNECT_TIMEOUT,
        }
    }
}

impl Connector for TcpConnector {
    fn connect(&mut self, host: &str, port: u16) -> io::Result<Box<dyn PendingConnect>> {
        Ok(Box::new(TcpPending::start(host, port, self.timeout)?))
    }
}

/// One TCP connection attempt across every resolved address.
pub struct TcpPending {
    host: String,
    resolver: Option<Receiver<io::Result<Vec<SocketAddr>>>>,
    addrs: VecDeque<SocketAddr>,
    attempt: Option<(Socket, SocketAddr)>,
    elapsed: f32,
    timeout: f32,
    last_err: Option<io::Error>,
}

impl TcpPending {
    /// IP literals are used directly; host names are resolved on a helper
    /// thread so the caller never waits on DNS.
    pub fn start(host: &str, port: u16, timeout: Duration) -> io::Result<Self> {
        let mut pending = Self {
            host: host.to_string(),
            resolver: None,
            addrs: VecDeque::new(),
            attempt: None,
            elapsed: 0.0,
            timeout: timeout.as_secs_f32(),
            last_err: None,
        };

        match host.parse::<IpAddr>() {
            Ok(ip) => pending.addrs.push_back(SocketAddr::new(ip, port)),
            Err(_) => {
                let (tx, rx) = mpsc::channel();
                let name = host.to_string();
                thread::Builder::new()
                    .name("resolve".into())
                    .spawn(move || {
                        let result = (name.as_str(), port)
                            .to_socket_addrs()
                            .map(|addrs| addrs.collect());
                        // the attempt may have been dropped meanwhile
                        let _ = tx.send(result);
                    })?;
                pending.resolver = Some(rx);
            }
        }

        Ok(pending)
    }

    fn resolved(&mut self) -> io::Result<bool> {
        let Some(resolver) = self.resolver.as_ref() else {
            return Ok(true);
        };

        match resolver.try_recv() {
            Ok(result) => {
                self.resolver = None;
                self.addrs = result?.into_iter().collect();
                Ok(true)
            }
            Err(TryRecvError::Empty) => Ok(false),
            Err(TryRecvError::Disconnected) => {
                self.resolver = None;
                Err(io::Error::new(ErrorKind::Other, "resolver thread exited"))
            }
        }
    }

    fn start_next(&mut self) -> io::Result<Option<Box<dyn Stream>>> {
        while let Some(addr) = self.addrs.pop_front() {
            match begin_connect(addr) {
                Ok((socket, true)) => return into_stream(socket).map(Some),
                Ok((socket, false)) => {
                    debug!("Connecting to {}", addr);
                    self.elapsed = 0.0;
                    self.attempt = Some((socket, addr));
                    return Ok(None);
                }
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    self.last_err = Some(e);
                }
            }
        }

        Err(self.last_err.take().unwrap_or_else(|| {
            io::Error::new(ErrorKind::NotFound, format!("{} did not resolve", self.host))
        }))
    }
}

impl PendingConnect for TcpPending {
    fn poll(&mut self, dt: f32) -> io::Result<Option<Box<dyn Stream>>> {
        if !self.resolved()? {
            return Ok(None);
        }

        if let Some((socket, addr)) = self.attempt.take() {
            match is_established(&socket) {
                Ok(true) => return into_stream(socket).map(Some),
                Ok(false) => {
                    self.elapsed += dt;
                    if self.elapsed < self.timeout {
                        self.attempt = Some((socket, addr));
                        return Ok(None);
                    }
                    debug!("Connect to {} timed out", addr);
                    self.last_err = Some(io::Error::new(
                        ErrorKind::TimedOut,
                        format!("connect to {} timed out", addr),
                    ));
                }
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    self.last_err = Some(e);
                }
            }
        }

        self.start_next()
    }
}

/// Opens a non-blocking socket and starts connecting. The flag is true
/// when the connect already completed.
fn begin_connect(addr: SocketAddr) -> io::Result<(Socket, bool)> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nonblocking(true)?;

    match socket.connect(&addr.into()) {
        Ok(()) => Ok((socket, true)),
        Err(e) if connect_in_progress(&e) => Ok((socket, false)),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn connect_in_progress(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EINPROGRESS) || e.kind() == ErrorKind::WouldBlock
}

#[cfg(not(unix))]
fn connect_in_progress(e: &io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock
}

fn is_established(socket: &Socket) -> io::Result<bool> {
    if let Some(e) = socket.take_error()? {
        return Err(e);
    }

    match socket.peer_addr() {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotConnected => Ok(false),
        Err(e) => Err(e),
    }
}

fn into_stream(socket: Socket) -> io::Result<Box<dyn Stream>> {
    let stream: TcpStream = socket.into();
    stream.set_nodelay(true)?;
    Ok(Box::new(stream))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    /// A connection attempt is in flight
    Connecting,
    /// Connected, name not yet accepted
    Connected,
    InGame,
}

/// What the server told us during one update.
#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    Connected,
    Disconnected,
    /// `NAME_OK`: the name the server registered
    Registered(String),
    MustRename(String),
    GameFull,
    Chat(String),
    Simulation(Snapshot),
    Tiles(Grid),
}

pub struct NetClient<C: Connector> {
    connector: C,
    host: String,
    port: u16,
    name: String,
    /// Rename sent while in game, not yet confirmed
    pending_name: Option<String>,

    pending: Option<Box<dyn PendingConnect>>,
    stream: Option<Box<dyn Stream>>,
    send: OutQueue,
    recv: RecvBuffer,

    has_to_reconnect: bool,
    server_alive: bool,
    in_game: bool,

    time_since_reconnect: f32,
    time_since_alive_check: f32,
    time_since_rename: f32,

    alive_window: f32,
}

impl<C: Connector> NetClient<C> {
    /// Creates a disconnected client that will attempt to connect on the
    /// first update.
    pub fn new(connector: C, host: &str, port: u16, name: &str) -> Self {
        Self {
            connector,
            host: host.to_string(),
            port,
            name: name.to_string(),
            pending_name: None,
            pending: None,
            stream: None,
            send: OutQueue::new(),
            recv: RecvBuffer::default(),
            has_to_reconnect: true,
            server_alive: false,
            in_game: false,
            time_since_reconnect: RECONNECT_INTERVAL,
            time_since_alive_check: 0.0,
            time_since_rename: 0.0,
            alive_window: ALIVE_WINDOW,
        }
    }

    pub fn with_alive_window(mut self, seconds: f32) -> Self {
        self.alive_window = seconds;
        self
    }

    pub fn state(&self) -> ConnState {
        match (&self.stream, self.in_game) {
            (None, _) if self.pending.is_some() => ConnState::Connecting,
            (None, _) => ConnState::Disconnected,
            (Some(_), false) => ConnState::Connected,
            (Some(_), true) => ConnState::InGame,
        }
    }

    pub fn has_to_reconnect(&self) -> bool {
        self.has_to_reconnect
    }

    pub fn is_in_game(&self) -> bool {
        self.in_game
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Changes the requested name. In game this is a rename request and
    /// [`NetClient::name`] only changes once the server answers `NAME_OK`;
    /// otherwise the next registration attempt happens right away.
    pub fn set_name(&mut self, name: &str) {
        if !self.in_game {
            self.name = name.to_string();
            self.time_since_rename = RENAME_INTERVAL;
            return;
        }

        if name == self.name {
            self.pending_name = None;
            return;
        }
        self.pending_name = Some(name.to_string());
        self.send.push(Cmd::SetName, name);
    }

    /// Switches servers. The current connection, if any, is dropped.
    pub fn set_host(&mut self, host: &str) -> Vec<NetEvent> {
        self.host = host.to_string();

        let mut events = Vec::new();
        if self.stream.is_some() {
            self.disconnect(&mut events);
        }
        self.pending = None;
        self.has_to_reconnect = true;
        self.time_since_reconnect = RECONNECT_INTERVAL;
        events
    }

    pub fn send_input(&mut self, action: &Action) {
        if self.in_game {
            self.send.push(Cmd::PlayerInput, &encode_action(action));
        }
    }

    pub fn send_chat(&mut self, text: &str) {
        if self.in_game {
            self.send.push(Cmd::Chat, text);
        }
    }

    pub fn add_bot(&mut self) {
        if self.in_game {
            self.send.push(Cmd::AddBot, "");
        }
    }

    pub fn remove_bot(&mut self) {
        if self.in_game {
            self.send.push(Cmd::RemoveBot, "");
        }
    }

    /// Advances timers, performs socket I/O and returns what happened.
    pub fn update(&mut self, dt: f32) -> Vec<NetEvent> {
        let mut events = Vec::new();

        if self.stream.is_none() {
            self.try_connect(dt, &mut events);
        } else {
            self.check_alive(dt, &mut events);
        }

        if self.stream.is_some() {
            self.retry_registration(dt);
            self.receive(&mut events);
            self.flush(&mut events);
        }

        events
    }

    fn try_connect(&mut self, dt: f32, events: &mut Vec<NetEvent>) {
        let poll_dt = if self.pending.is_some() {
            dt
        } else {
            self.time_since_reconnect += dt;
            if self.time_since_reconnect < RECONNECT_INTERVAL {
                return;
            }
            self.time_since_reconnect = 0.0;

            match self.connector.connect(&self.host, self.port) {
                Ok(pending) => self.pending = Some(pending),
                Err(e) => {
                    debug!("Connect to {}:{} failed: {}", self.host, self.port, e);
                    return;
                }
            }
            0.0
        };

        let Some(pending) = self.pending.as_mut() else {
            return;
        };

        match pending.poll(poll_dt) {
            Ok(None) => {}
            Ok(Some(stream)) => {
                self.pending = None;
                self.establish(stream, events);
            }
            Err(e) => {
                debug!("Connect to {}:{} failed: {}", self.host, self.port, e);
                self.pending = None;
                self.time_since_reconnect = 0.0;
            }
        }
    }

    fn establish(&mut self, stream: Box<dyn Stream>, events: &mut Vec<NetEvent>) {
        info!("Connected to {}:{}", self.host, self.port);
        self.stream = Some(stream);
        self.has_to_reconnect = false;
        self.server_alive = true;
        self.in_game = false;
        self.time_since_alive_check = 0.0;
        // register immediately
        self.time_since_rename = RENAME_INTERVAL;
        self.send.clear();
        self.recv.clear();
        events.push(NetEvent::Connected);
    }

    fn check_alive(&mut self, dt: f32, events: &mut Vec<NetEvent>) {
        self.time_since_alive_check += dt;
        if self.time_since_alive_check < self.alive_window {
            return;
        }
        self.time_since_alive_check = 0.0;

        if !self.server_alive {
            warn!("Server did not answer PING, reconnecting");
            self.disconnect(events);
            return;
        }

        self.server_alive = false;
        self.send.push(Cmd::Ping, "");
    }

    fn retry_registration(&mut self, dt: f32) {
        if self.in_game {
            return;
        }

        self.time_since_rename += dt;
        if self.time_since_rename >= RENAME_INTERVAL {
            self.time_since_rename = 0.0;
            self.send.push(Cmd::SetName, &self.name);
        }
    }

    fn receive(&mut self, events: &mut Vec<NetEvent>) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        match self.recv.fill_from(stream) {
            Ok(report) => {
                if report.overflowed {
                    warn!("Receive buffer overflowed, dropping buffered data");
                }
                if report.closed {
                    info!("Server closed the connection");
                    self.drain(events);
                    self.disconnect(events);
                    return;
                }
            }
            Err(e) => {
                error!("Receive failed: {}", e);
                self.disconnect(events);
                return;
            }
        }

        self.drain(events);
    }

    fn drain(&mut self, events: &mut Vec<NetEvent>) {
        for frame in self.recv.drain_frames() {
            match frame {
                Ok(frame) => self.handle_frame(frame, events),
                Err(e) => warn!("{}", e),
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame, events: &mut Vec<NetEvent>) {
        match frame.cmd {
            Cmd::Ping => self.send.push(Cmd::Pong, ""),
            Cmd::Pong => self.server_alive = true,
            Cmd::Chat => events.push(NetEvent::Chat(frame.payload)),
            Cmd::NameOk => {
                let requested = self.pending_name.take();
                let name = frame.payload.trim();
                if !name.is_empty() {
                    self.name = name.to_string();
                } else if let Some(requested) = requested {
                    self.name = requested;
                }
                info!("Registered as {}", self.name);
                self.in_game = true;
                events.push(NetEvent::Registered(self.name.clone()));
            }
            Cmd::MustRename => {
                if self.in_game {
                    self.pending_name = None;
                    warn!("Server rejected rename to {:?}, keeping {:?}", frame.payload, self.name);
                } else {
                    warn!("Server rejected name {:?}", self.name);
                }
                events.push(NetEvent::MustRename(frame.payload));
            }
            Cmd::GameFull => {
                info!("Game is full");
                events.push(NetEvent::GameFull);
            }
            Cmd::Simulation if self.in_game => match decode_simulation(&frame.payload) {
                Ok(snapshot) => events.push(NetEvent::Simulation(snapshot)),
                Err(e) => warn!("Rejected snapshot: {}", e),
            },
            Cmd::InitTileData if self.in_game => match decode_tiles(&frame.payload, MAP_SIZE) {
                Ok(grid) => events.push(NetEvent::Tiles(grid)),
                Err(e) => warn!("Rejected tile data: {}", e),
            },
            Cmd::Simulation | Cmd::InitTileData => {
                debug!("Ignoring {} before registration", frame.cmd.token());
            }
            Cmd::SetName | Cmd::PlayerInput | Cmd::AddBot | Cmd::RemoveBot => {
                warn!("Unexpected {} from server", frame.cmd.token());
            }
        }
    }

    fn flush(&mut self, events: &mut Vec<NetEvent>) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        if self.send.is_empty() {
            return;
        }

        if let Err(e) = self.send.flush_to(stream) {
            error!("Send failed: {}", e);
            self.disconnect(events);
        }
    }

    fn disconnect(&mut self, events: &mut Vec<NetEvent>) {
        // an unanswered rename becomes the name asked for on reconnect
        if let Some(name) = self.pending_name.take() {
            self.name = name;
        }
        self.stream = None;
        self.in_game = false;
        self.has_to_reconnect = true;
        self.time_since_reconnect = 0.0;
        self.send.clear();
        self.recv.clear();
        events.push(NetEvent::Disconnected);
    }
}
