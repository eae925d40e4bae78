use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::config::NetConfig;
use crate::roster::{Roster, Slot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LobbyState {
    Waiting,
    InGame,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbySettings {
    pub capacity: usize,
    /// Readiness also requires every slot to be occupied.
    pub require_full: bool,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            capacity: 4,
            require_full: false,
        }
    }
}

impl From<&NetConfig> for LobbySettings {
    fn from(config: &NetConfig) -> Self {
        Self {
            capacity: config.lobby_capacity,
            require_full: config.require_full,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub slot: Slot,
    pub address: SocketAddr,
    pub username: String,
    pub ready: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined(Slot),
    AlreadyPresent(Slot),
}

impl JoinOutcome {
    pub fn slot(&self) -> Slot {
        match *self {
            JoinOutcome::Joined(slot) | JoinOutcome::AlreadyPresent(slot) => slot,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("lobby is full ({capacity} slots)")]
    Full { capacity: usize },
}

#[derive(Debug, Clone)]
struct Seat {
    address: SocketAddr,
    username: String,
    ready: bool,
}

#[derive(Debug, Clone)]
pub struct Lobby {
    settings: LobbySettings,
    state: LobbyState,
    seats: Roster<Seat>,
}

impl Default for Lobby {
    fn default() -> Self {
        Self::new(LobbySettings::default())
    }
}

impl Lobby {
    pub fn new(settings: LobbySettings) -> Self {
        Self {
            seats: Roster::new(settings.capacity),
            state: LobbyState::Waiting,
            settings,
        }
    }

    pub fn settings(&self) -> &LobbySettings {
        &self.settings
    }

    pub fn state(&self) -> LobbyState {
        self.state
    }

    pub fn set_state(&mut self, state: LobbyState) {
        self.state = state;
    }

    pub fn player_count(&self) -> usize {
        self.seats.len()
    }

    pub fn is_full(&self) -> bool {
        self.seats.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    pub fn join(&mut self, address: SocketAddr, username: &str) -> Result<JoinOutcome, LobbyError> {
        if let Some(slot) = self.slot_of(username) {
            return Ok(JoinOutcome::AlreadyPresent(slot));
        }

        let seat = Seat {
            address,
            username: username.to_string(),
            ready: false,
        };
        self.seats
            .push(seat)
            .map(JoinOutcome::Joined)
            .map_err(|_| LobbyError::Full {
                capacity: self.settings.capacity,
            })
    }

    /// Returns whether a seat with that username existed.
    pub fn set_ready(&mut self, username: &str, ready: bool) -> bool {
        match self.seats.find_mut(|s| s.username == username) {
            Some(seat) => {
                seat.ready = ready;
                true
            }
            None => false,
        }
    }

    pub fn all_ready(&self) -> bool {
        if self.seats.is_empty() {
            return false;
        }
        if self.settings.require_full && !self.seats.is_full() {
            return false;
        }
        self.seats.iter().all(|(_, s)| s.ready)
    }

    pub fn leave_username(&mut self, username: &str) -> Option<RosterEntry> {
        let slot = self.slot_of(username)?;
        self.seats.remove(slot).map(|seat| to_entry(slot, seat))
    }

    pub fn leave_address(&mut self, address: SocketAddr) -> Vec<RosterEntry> {
        let slots: Vec<Slot> = self
            .seats
            .iter()
            .filter(|(_, s)| s.address == address)
            .map(|(slot, _)| slot)
            .collect();
        self.seats
            .remove_where(|s| s.address == address)
            .into_iter()
            .zip(slots)
            .map(|(seat, slot)| to_entry(slot, seat))
            .collect()
    }

    pub fn slot_of(&self, username: &str) -> Option<Slot> {
        self.seats.position(|s| s.username == username)
    }

    pub fn entry(&self, username: &str) -> Option<RosterEntry> {
        let slot = self.slot_of(username)?;
        self.seats.get(slot).map(|seat| to_entry(slot, seat.clone()))
    }

    pub fn entries(&self) -> Vec<RosterEntry> {
        self.seats
            .iter()
            .map(|(slot, seat)| to_entry(slot, seat.clone()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.seats.drain();
        self.state = LobbyState::Waiting;
    }
}

fn to_entry(slot: Slot, seat: Seat) -> RosterEntry {
    RosterEntry {
        slot,
        address: seat.address,
        username: seat.username,
        ready: seat.ready,
    }
}
