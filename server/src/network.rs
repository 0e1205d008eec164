//! Server network layer: non-blocking TCP polling and the authoritative game loop

use crate::client_manager::{ClientManager, ClientStatus};
use log::{debug, error, info, warn};
use shared::protocol::{is_valid_name, Cmd, Frame};
use shared::snapshot::{decode_action, encode_simulation, encode_tiles};
use shared::{ExploEvent, Simulation, MAX_PLAYERS};
use std::future::Future;
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_CLIENTS: usize = 10;
/// Seconds between keepalive windows.
pub const KEEPALIVE_WINDOW: f32 = 5.0;
/// Sleep between loop iterations.
pub const DEFAULT_TICK: Duration = Duration::from_millis(4);

const BROWSER_PAGE: &[u8] = b"HTTP/1.1 200 OK\r\n\
Content-Type: text/html; charset=utf-8\r\n\
Connection: close\r\n\
\r\n\
<!DOCTYPE html><html><head><title>cavetiles</title></head>\
<body><h1>cavetiles game server</h1>\
<p>This port speaks the game protocol. Connect with the game client.</p>\
</body></html>";

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Authoritative game server
///
/// Owns the listener, every client socket and the one `Simulation`. All
/// work happens in `poll_once`, which never blocks.
pub struct Server {
    listener: TcpListener,
    clients: ClientManager<TcpStream>,
    sim: Simulation,
    /// Bot player names, oldest first
    bots: Vec<String>,
    keepalive_timer: f32,
    keepalive_window: f32,
    events: Vec<ExploEvent>,
}

impl Server {
    pub fn bind(addr: &str, max_clients: usize, seed: u64) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            clients: ClientManager::new(max_clients),
            sim: Simulation::new(seed),
            bots: Vec::new(),
            keepalive_timer: 0.0,
            keepalive_window: KEEPALIVE_WINDOW,
            events: Vec::new(),
        })
    }

    /// Overrides the keepalive window, mostly for tests.
    pub fn with_keepalive_window(mut self, seconds: f32) -> Self {
        self.keepalive_window = seconds;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn clients(&self) -> &ClientManager<TcpStream> {
        &self.clients
    }

    pub fn bots(&self) -> &[String] {
        &self.bots
    }

    /// One loop iteration: keepalive, accept, receive, dispatch, simulate,
    /// send, prune.
    pub fn poll_once(&mut self, dt: f32) {
        self.keepalive_timer += dt;
        if self.keepalive_timer >= self.keepalive_window {
            self.keepalive_timer = 0.0;
            self.clients.check_keepalive();
        }

        self.accept_clients();

        for (client_id, frame) in self.receive() {
            self.dispatch(client_id, frame);
        }

        self.simulate(dt);
        self.send();
        self.prune();
    }

    /// Runs `poll_once` every `tick` until `shutdown` resolves.
    pub async fn run<F>(&mut self, tick: Duration, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let mut tick_interval = interval(tick);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut last_tick = Instant::now();
        info!("Server started");

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    if dt > 0.1 {
                        warn!("Large delta time detected ({:.3}s)", dt);
                    }

                    self.poll_once(dt);
                }
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    fn accept_clients(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nonblocking(true).and_then(|_| stream.set_nodelay(true)) {
                        error!("Failed to configure socket for {}: {}", addr, e);
                        continue;
                    }
                    if self.clients.add_client(stream, addr).is_none() {
                        info!("Rejected {}: server full", addr);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("Accept failed: {}", e);
                    break;
                }
            }
        }
    }

    fn receive(&mut self) -> Vec<(u32, Frame)> {
        let mut frames = Vec::new();

        for client in self.clients.iter_mut().filter(|c| !c.remove) {
            match client.recv.fill_from(&mut client.stream) {
                Ok(report) if report.overflowed => {
                    warn!("Client {} overflowed its receive buffer", client.id);
                    client.remove = true;
                    continue;
                }
                Ok(report) if report.closed => {
                    client.remove = true;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Receive from client {} failed: {}", client.id, e);
                    client.remove = true;
                    continue;
                }
            }

            if client.status == ClientStatus::WaitingForInit && client.recv.starts_with(b"GET") {
                info!("Client {} is a browser, answering with a page", client.id);
                client.status = ClientStatus::Browser;
                client.recv.clear();
                client.send.push_raw(BROWSER_PAGE);
                client.remove = true;
                continue;
            }

            for frame in client.recv.drain_frames() {
                match frame {
                    Ok(frame) => frames.push((client.id, frame)),
                    Err(e) => warn!("Client {}: {}", client.id, e),
                }
            }
        }

        frames
    }

    fn dispatch(&mut self, client_id: u32, frame: Frame) {
        let Some(client) = self.clients.get_mut(client_id) else {
            return;
        };
        let in_game = client.is_in_game();

        match frame.cmd {
            Cmd::Ping => client.send.push(Cmd::Pong, ""),
            Cmd::Pong => client.alive = true,
            Cmd::Chat => {
                if in_game {
                    let line = format!("{}: {}", client.name, frame.payload);
                    self.clients.broadcast(Cmd::Chat, &line);
                } else {
                    debug!("Ignoring chat from unregistered client {}", client_id);
                }
            }
            Cmd::SetName => self.handle_set_name(client_id, frame.payload.trim()),
            Cmd::PlayerInput if in_game => {
                let name = client.name.clone();
                match decode_action(&frame.payload) {
                    Ok(action) => {
                        if let Err(e) = self.sim.process_player_input(&action, &name) {
                            warn!("Input from client {}: {}", client_id, e);
                        }
                    }
                    Err(e) => warn!("Bad input from client {}: {}", client_id, e),
                }
            }
            Cmd::AddBot if in_game => self.add_bot(),
            Cmd::RemoveBot if in_game => self.remove_bot(),
            Cmd::PlayerInput | Cmd::AddBot | Cmd::RemoveBot => {
                debug!("Ignoring {} from unregistered client {}", frame.cmd.token(), client_id);
            }
            Cmd::GameFull | Cmd::NameOk | Cmd::MustRename | Cmd::Simulation | Cmd::InitTileData => {
                warn!("Unexpected {} from client {}", frame.cmd.token(), client_id);
            }
        }
    }

    fn handle_set_name(&mut self, client_id: u32, name: &str) {
        let taken_by_bot = self.bots.iter().any(|b| b == name);
        let available = self.clients.name_available(name, Some(client_id));
        let room = self.clients.in_game_count() + self.bots.len() < MAX_PLAYERS;

        let Some(client) = self.clients.get_mut(client_id) else {
            return;
        };

        if !is_valid_name(name) {
            debug!("Client {} sent unusable name {:?}", client_id, name);
            client.send.push(Cmd::MustRename, name);
            return;
        }

        let in_game = client.is_in_game();
        if in_game && client.name == name {
            return;
        }

        // capacity is checked before availability: a full game answers
        // GAME_FULL even when the name is also taken
        if !in_game {
            client.status = ClientStatus::Lobby;
            if !room {
                client.send.push(Cmd::GameFull, "");
                return;
            }
        }

        if taken_by_bot || !available {
            debug!("Client {} must rename from {:?}", client_id, name);
            client.send.push(Cmd::MustRename, name);
            return;
        }

        let announcement = if in_game {
            let old = std::mem::replace(&mut client.name, name.to_string());
            info!("Client {} renamed {} -> {}", client_id, old, name);
            format!("{} changed name to {}!", old, name)
        } else {
            client.status = ClientStatus::InGame;
            client.name = name.to_string();
            info!("Client {} joined as {}", client_id, name);
            format!("{} has joined the game!", name)
        };

        client.send.push(Cmd::NameOk, name);
        self.clients.broadcast(Cmd::Chat, &announcement);
        self.rebuild_roster();
    }

    fn add_bot(&mut self) {
        if self.clients.in_game_count() + self.bots.len() >= MAX_PLAYERS {
            debug!("Ignoring ADD_BOT: roster full");
            return;
        }

        let humans = self.clients.in_game_names();
        let name = (0..)
            .map(|n| format!("bot_{}", n))
            .find(|candidate| !humans.contains(candidate) && !self.bots.contains(candidate))
            .unwrap_or_default();

        info!("Adding {}", name);
        self.clients
            .broadcast(Cmd::Chat, &format!("{} has joined the game!", name));
        self.bots.push(name);
        self.rebuild_roster();
    }

    fn remove_bot(&mut self) {
        if let Some(name) = self.bots.pop() {
            info!("Removing {}", name);
            self.clients.broadcast(Cmd::Chat, &format!("{} has left", name));
            self.rebuild_roster();
        }
    }

    /// In-game clients in connection order, then bots. Starts a fresh round.
    fn rebuild_roster(&mut self) {
        let mut names = self.clients.in_game_names();
        names.extend(self.bots.iter().cloned());

        self.sim.set_roster(names);
        self.sim.set_new_game();
        self.clients
            .broadcast(Cmd::InitTileData, &encode_tiles(&self.sim.grid));
    }

    fn simulate(&mut self, dt: f32) {
        if self.clients.in_game_count() == 0 {
            return;
        }

        for bot in &self.bots {
            if let Err(e) = self.sim.update_and_process_bot_input(bot, dt) {
                warn!("Bot {}: {}", bot, e);
            }
        }

        self.events.clear();
        let new_round = self.sim.update(dt, &mut self.events);

        if !self.events.is_empty() {
            debug!("{} explosion events", self.events.len());
        }

        let snapshot = encode_simulation(&self.sim, &self.events);
        self.clients.broadcast(Cmd::Simulation, &snapshot);

        if new_round {
            self.clients
                .broadcast(Cmd::InitTileData, &encode_tiles(&self.sim.grid));
        }
    }

    fn send(&mut self) {
        for client in self.clients.iter_mut() {
            if client.send.is_empty() {
                continue;
            }
            if let Err(e) = client.send.flush_to(&mut client.stream) {
                error!("Send to client {} failed: {}", client.id, e);
                client.remove = true;
                client.send.clear();
            }
        }
    }

    fn prune(&mut self) {
        let removed = self.clients.prune();

        let mut roster_changed = false;
        for client in removed.iter().filter(|c| c.is_in_game()) {
            self.clients
                .broadcast(Cmd::Chat, &format!("{} has left", client.name));
            roster_changed = true;
        }

        if roster_changed {
            self.rebuild_roster();
        }
    }
}
