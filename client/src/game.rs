use crate::input::{Command, InputManager};
use crate::network::{Connector, NetClient, NetEvent};
use log::{debug, info, warn};
use shared::{ExploEvent, Grid, Simulation};

/// Bot slots the client can fill on its own while offline.
pub const MAX_LOCAL_BOTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Running the simulation locally
    Offline,
    /// Mirroring the server's simulation
    Online,
}

/// Things the presentation layer should know about after a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    Explosion(ExploEvent),
    Chat(String),
    Status(String),
}

/// Drives one local [`Simulation`], either as a mirror of the server's
/// or, when not registered with a server, as a standalone game.
pub struct ClientGame<C: Connector> {
    sim: Simulation,
    net: NetClient<C>,
    input: InputManager,
    mode: Mode,
    local_bots: usize,
}

impl<C: Connector> ClientGame<C> {
    pub fn new(net: NetClient<C>, local_bots: usize, seed: u64) -> Self {
        let mut game = Self {
            sim: Simulation::new(seed),
            net,
            input: InputManager::new(),
            mode: Mode::Offline,
            local_bots: local_bots.min(MAX_LOCAL_BOTS),
        };
        game.reset_offline();
        game
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn network(&self) -> &NetClient<C> {
        &self.net
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn local_bots(&self) -> usize {
        self.local_bots
    }

    /// Feeds one parsed input line. `Quit` is left to the caller.
    pub fn handle_command(&mut self, cmd: &Command) -> Vec<GameEvent> {
        if self.input.apply(cmd) {
            return Vec::new();
        }

        match cmd {
            Command::SetName(name) => {
                self.net.set_name(name);
                if self.mode == Mode::Offline {
                    self.reset_offline();
                }
            }
            Command::SetHost(host) => {
                let events = self.net.set_host(host);
                return self.handle_net_events(events);
            }
            Command::Chat(text) => {
                if self.mode == Mode::Online {
                    self.net.send_chat(text);
                } else {
                    return vec![GameEvent::Status("chat needs a server".to_string())];
                }
            }
            Command::AddBot => match self.mode {
                Mode::Online => self.net.add_bot(),
                Mode::Offline if self.local_bots < MAX_LOCAL_BOTS => {
                    self.local_bots += 1;
                    self.reset_offline();
                }
                Mode::Offline => {}
            },
            Command::RemoveBot => match self.mode {
                Mode::Online => self.net.remove_bot(),
                Mode::Offline if self.local_bots > 0 => {
                    self.local_bots -= 1;
                    self.reset_offline();
                }
                Mode::Offline => {}
            },
            Command::Hold(_) | Command::Release | Command::Drop | Command::Quit => {}
        }

        Vec::new()
    }

    /// Runs one frame: queues input, talks to the server, then either
    /// applies what the server sent or steps the local simulation.
    pub fn update(&mut self, dt: f32) -> Vec<GameEvent> {
        let (action, to_send) = self.input.update(dt);
        if self.mode == Mode::Online {
            if let Some(action) = to_send {
                self.net.send_input(&action);
            }
        }

        let net_events = self.net.update(dt);
        let mut out = self.handle_net_events(net_events);

        if self.mode == Mode::Offline {
            let name = self.net.name().to_string();
            if let Err(e) = self.sim.process_player_input(&action, &name) {
                debug!("{}", e);
            }

            for bot in 0..self.local_bots {
                if let Err(e) = self.sim.update_and_process_bot_input(&bot_name(bot), dt) {
                    debug!("{}", e);
                }
            }

            let mut explosions = Vec::new();
            if self.sim.update(dt, &mut explosions) {
                info!("New local round");
            }
            out.extend(explosions.into_iter().map(GameEvent::Explosion));
        }

        out
    }

    fn handle_net_events(&mut self, events: Vec<NetEvent>) -> Vec<GameEvent> {
        let mut out = Vec::new();
        // tile data overrides crate edits from snapshots in the same batch
        let mut tiles: Option<Grid> = None;

        for event in events {
            match event {
                NetEvent::Connected => out.push(GameEvent::Status(format!(
                    "connected to {}",
                    self.net.host()
                ))),
                NetEvent::Registered(name) => {
                    info!("Switching to server simulation as {}", name);
                    self.mode = Mode::Online;
                    out.push(GameEvent::Status(format!("joined as {}", name)));
                }
                NetEvent::Disconnected => {
                    if self.mode == Mode::Online {
                        warn!("Lost server, continuing offline");
                        self.mode = Mode::Offline;
                        self.reset_offline();
                    }
                    out.push(GameEvent::Status("disconnected".to_string()));
                }
                NetEvent::MustRename(name) => out.push(GameEvent::Status(format!(
                    "name {} is taken or invalid, use /name",
                    name
                ))),
                NetEvent::GameFull => {
                    out.push(GameEvent::Status("game is full".to_string()))
                }
                NetEvent::Chat(text) => out.push(GameEvent::Chat(text)),
                NetEvent::Simulation(snapshot) if self.mode == Mode::Online => {
                    let explosions = self.sim.apply_snapshot(snapshot);
                    out.extend(explosions.into_iter().map(GameEvent::Explosion));
                }
                NetEvent::Tiles(grid) if self.mode == Mode::Online => tiles = Some(grid),
                NetEvent::Simulation(_) | NetEvent::Tiles(_) => {}
            }
        }

        if let Some(grid) = tiles {
            self.sim.grid = grid;
        }

        out
    }

    fn reset_offline(&mut self) {
        let mut roster = vec![self.net.name().to_string()];
        roster.extend((0..self.local_bots).map(bot_name));

        self.sim.set_roster(roster);
        self.sim.set_new_game();
        debug!("Offline roster with {} bots", self.local_bots);
    }
}

fn bot_name(n: usize) -> String {
    format!("bot_{}", n)
}
