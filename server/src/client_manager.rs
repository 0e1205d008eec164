//! Connected client roster for the game server
//!
//! This module tracks every accepted socket together with its protocol
//! state:
//! - Connection lifecycle (accept, registration, removal)
//! - Per-client receive reassembly and outbound queues
//! - Keepalive bookkeeping across fixed windows
//! - Name ownership checks for registration and renames
//!
//! Clients are kept in connection order. The authoritative roster is built
//! from the in-game clients in that order, so the order is observable in
//! spawn positions.

use log::info;
use shared::protocol::{Cmd, OutQueue, RecvBuffer};
use std::net::SocketAddr;

/// Where a connection is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    /// Connected but has not sent a name yet
    WaitingForInit,
    /// Sent an HTTP request instead of speaking the game protocol
    Browser,
    /// Registration was refused (game full or name taken); may retry
    Lobby,
    /// Owns a player slot in the simulation
    InGame,
}

/// One accepted connection
///
/// Each client maintains:
/// - Connection metadata (ID, address, status, display name)
/// - A receive buffer that reassembles frames across reads
/// - An outbound queue drained whenever the socket accepts bytes
#[derive(Debug)]
pub struct Client<S> {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Peer address, for logging
    pub addr: SocketAddr,
    pub status: ClientStatus,
    /// Player name; empty until registration succeeds
    pub name: String,
    pub stream: S,
    pub send: OutQueue,
    pub recv: RecvBuffer,
    /// Marked for pruning at the end of the current iteration
    pub remove: bool,
    /// Answered since the last keepalive window
    pub alive: bool,
}

impl<S> Client<S> {
    /// Creates a client that has one full keepalive window to register
    pub fn new(id: u32, addr: SocketAddr, stream: S) -> Self {
        Self {
            id,
            addr,
            status: ClientStatus::WaitingForInit,
            name: String::new(),
            stream,
            send: OutQueue::new(),
            recv: RecvBuffer::default(),
            remove: false,
            alive: true,
        }
    }

    pub fn is_in_game(&self) -> bool {
        self.status == ClientStatus::InGame
    }
}

/// Manages all connected clients
///
/// The ClientManager enforces the connection cap and keeps clients in the
/// order they connected. It is generic over the stream type so the
/// bookkeeping can be tested without sockets.
#[derive(Debug)]
pub struct ClientManager<S> {
    clients: Vec<Client<S>>,
    /// Next available client ID for new connections
    next_client_id: u32,
    /// Maximum number of concurrent connections allowed
    max_clients: usize,
}

impl<S> ClientManager<S> {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: Vec::with_capacity(max_clients),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to add a new connection
    ///
    /// Returns Some(client_id) if successful, None if the server is at
    /// capacity. The stream is dropped (and so closed) on rejection.
    pub fn add_client(&mut self, stream: S, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.push(Client::new(client_id, addr, stream));

        Some(client_id)
    }

    pub fn get(&self, client_id: u32) -> Option<&Client<S>> {
        self.clients.iter().find(|c| c.id == client_id)
    }

    pub fn get_mut(&mut self, client_id: u32) -> Option<&mut Client<S>> {
        self.clients.iter_mut().find(|c| c.id == client_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Client<S>> {
        self.clients.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Client<S>> {
        self.clients.iter_mut()
    }

    /// Names of in-game clients in connection order
    pub fn in_game_names(&self) -> Vec<String> {
        self.clients
            .iter()
            .filter(|c| c.is_in_game())
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn in_game_count(&self) -> usize {
        self.clients.iter().filter(|c| c.is_in_game()).count()
    }

    /// True if no in-game client other than `except` uses `name`
    pub fn name_available(&self, name: &str, except: Option<u32>) -> bool {
        !self
            .clients
            .iter()
            .any(|c| c.is_in_game() && Some(c.id) != except && c.name == name)
    }

    /// Queues a message for every in-game client
    pub fn broadcast(&mut self, cmd: Cmd, payload: &str) {
        for client in self.clients.iter_mut().filter(|c| c.is_in_game()) {
            client.send.push(cmd, payload);
        }
    }

    /// Closes one keepalive window
    ///
    /// Clients that stayed silent through the window are marked for
    /// removal. Everyone else is reset and, once past `WaitingForInit`,
    /// pinged. Returns the IDs that timed out.
    pub fn check_keepalive(&mut self) -> Vec<u32> {
        let mut timed_out = Vec::new();

        for client in self.clients.iter_mut().filter(|c| !c.remove) {
            if !client.alive {
                info!("Client {} timed out", client.id);
                client.remove = true;
                timed_out.push(client.id);
                continue;
            }

            client.alive = false;
            if client.status != ClientStatus::WaitingForInit {
                client.send.push(Cmd::Ping, "");
            }
        }

        timed_out
    }

    /// Removes every client marked for removal and hands them back
    pub fn prune(&mut self) -> Vec<Client<S>> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.clients)
            .into_iter()
            .partition(|c| c.remove);
        self.clients = kept;

        for client in &removed {
            info!("Client {} disconnected", client.id);
        }

        removed
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
