#![forbid(unsafe_code)]

// Poker module - room registry, membership index, and the voting state machine

pub mod api;
pub mod snapshot;
pub mod stats;

use crate::metrics::ServerMetrics;
use crate::signaling::protocol::ServerMessage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock as StdRwLock;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Domain errors for poker operations. Every failure is delivered as a
/// private error to the initiating connection; shared room state is never
/// mutated on the failure path.
#[derive(Error, Debug)]
pub enum PokerError {
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Player not found: {0}")]
    PlayerNotFound(String),

    #[error("Not authorized")]
    Unauthorized,

    #[error("Name already taken: {0}")]
    NameTaken(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for poker operations
pub type PokerResult<T> = Result<T, PokerError>;

/// Room voting phase. Votes are hidden while `Voting`, disclosed in `Reveal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    #[serde(rename = "VOTING")]
    Voting,
    #[serde(rename = "REVEAL")]
    Reveal,
}

/// Player role. Exactly one `Admin` (the moderator) per populated room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ADMIN")]
    Admin,
    #[serde(rename = "COMMON")]
    Common,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Per-player sender for outbound WebSocket JSON messages.
/// Holding a player's sender in its room is what subscribes the connection
/// to that room's broadcast group.
pub type PlayerSender = mpsc::Sender<Arc<String>>;

/// A participant seated in a room, keyed by its connection identity.
pub struct Player {
    pub id: String,
    pub name: String,
    pub can_vote: bool,
    /// `None` is the not-voted sentinel; vote values are opaque strings.
    pub choice: Option<String>,
    /// Audit trail: set only when a moderator overrides a revealed vote.
    pub previous_choice: Option<String>,
    pub role: Role,
    /// Monotonic per-room join sequence number. Snapshot order and admin
    /// succession both use it; map iteration order is never relied on.
    pub(crate) seat: u64,
    sender: PlayerSender,
}

/// Room state: one voting session and its seated players.
pub struct Room {
    pub id: String,
    pub status: RoomStatus,
    pub players: HashMap<String, Player>,
    next_seat: u64,
}

impl Room {
    fn new(id: String) -> Self {
        Self {
            id,
            status: RoomStatus::Voting,
            players: HashMap::new(),
            next_seat: 0,
        }
    }

    /// Exact, case-sensitive name collision scan over current players.
    fn is_name_taken(&self, name: &str, exclude: Option<&str>) -> bool {
        self.players
            .values()
            .any(|p| p.name == name && exclude != Some(p.id.as_str()))
    }

    /// Broadcast a message to every player in the room
    fn broadcast_all(&self, message: &ServerMessage) {
        let json = match serde_json::to_string(message) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!("Failed to serialize broadcast message: {}", e);
                return;
            }
        };
        for (id, player) in &self.players {
            match player.sender.try_send(json.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Channel full for player {} in room {}, dropping message", id, self.id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Channel closed for player {} in room {} (disconnected)", id, self.id);
                }
            }
        }
    }
}

/// Send a message to a single connection outside any room broadcast.
fn send_direct(sender: &PlayerSender, message: &ServerMessage) {
    let json = match serde_json::to_string(message) {
        Ok(j) => Arc::new(j),
        Err(e) => {
            warn!("Failed to serialize message: {}", e);
            return;
        }
    };
    if let Err(mpsc::error::TrySendError::Full(_)) = sender.try_send(json) {
        warn!("Channel full for direct message, dropping");
    }
}

/// Publish the room's sanitized snapshot to its broadcast group.
fn broadcast_room_update(room: &Room) {
    let snap = snapshot::build(room);
    room.broadcast_all(&ServerMessage::RoomUpdate { room: snap });
}

struct HubState {
    /// Room store: the only mapping from room identifier to room state.
    rooms: HashMap<String, Room>,
    /// Membership index: connection identity -> room identifier. Updated
    /// transactionally with every join, kick, and disconnect so resolving
    /// a connection's room never scans all rooms.
    memberships: HashMap<String, String>,
}

/// Owns all room and membership state and applies every inbound event.
///
/// The state sits behind a std::sync::RwLock held only inside the synchronous
/// hub methods, never across an await point. Each method runs its full
/// read-validate-mutate-broadcast sequence under the lock, so handlers are
/// atomic with respect to each other; broadcasts use `try_send` and cannot
/// block. Rooms are mutually independent beyond sharing the one lock.
pub struct PokerHub {
    state: StdRwLock<HubState>,
    metrics: ServerMetrics,
}

impl PokerHub {
    pub fn new(metrics: ServerMetrics) -> Self {
        Self {
            state: StdRwLock::new(HubState {
                rooms: HashMap::new(),
                memberships: HashMap::new(),
            }),
            metrics,
        }
    }

    /// Registers a fresh room identifier (status VOTING, no players yet).
    /// Exposed over the HTTP collaborator; joining requires the identifier
    /// to exist here.
    pub fn create_room(&self) -> String {
        let room_id = Uuid::new_v4().to_string();
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.rooms.insert(room_id.clone(), Room::new(room_id.clone()));
        self.metrics.inc_rooms_created();
        info!("Created room {}", room_id);
        room_id
    }

    pub fn room_exists(&self, room_id: &str) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.rooms.contains_key(room_id)
    }

    /// Name-availability check for the out-of-band HTTP collaborator.
    ///
    /// # Errors
    /// Returns `RoomNotFound` if the room does not exist.
    pub fn is_name_available(&self, room_id: &str, name: &str) -> PokerResult<bool> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let room = state
            .rooms
            .get(room_id)
            .ok_or_else(|| PokerError::RoomNotFound(room_id.to_string()))?;
        Ok(!room.is_name_taken(name, None))
    }

    /// Gets current room count
    pub fn room_count(&self) -> usize {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.rooms.len()
    }

    /// Gets total player count across all rooms
    pub fn total_player_count(&self) -> usize {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.rooms.values().map(|r| r.players.len()).sum()
    }

    /// Seats a connection in a room.
    ///
    /// The first player to join becomes `Admin`; everyone after joins as
    /// `Common` with voting eligibility. A connection already seated in a
    /// different room is unseated from it, but only once the join has
    /// validated — a rejected join leaves the connection exactly where it
    /// was. Rejoining the room it already sits in refreshes the display
    /// name and sender in place, keeping seat and role.
    ///
    /// # Errors
    /// `InvalidInput` for an empty (post-trim) name, `RoomNotFound` for an
    /// unknown room identifier, `NameTaken` on an exact name collision.
    pub fn join_room(
        &self,
        conn_id: &str,
        room_id: &str,
        player_name: &str,
        sender: PlayerSender,
    ) -> PokerResult<()> {
        let name = player_name.trim();
        if name.is_empty() {
            return Err(PokerError::InvalidInput(
                "player name must not be empty".to_string(),
            ));
        }

        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        let state = &mut *guard;

        // All validation happens before any mutation
        {
            let Some(room) = state.rooms.get(room_id) else {
                return Err(PokerError::RoomNotFound(room_id.to_string()));
            };
            if room.is_name_taken(name, Some(conn_id)) {
                return Err(PokerError::NameTaken(name.to_string()));
            }
        }

        // A connection belongs to at most one room at a time
        if state.memberships.get(conn_id).is_some_and(|r| r != room_id) {
            remove_connection(state, conn_id);
        }

        let Some(room) = state.rooms.get_mut(room_id) else {
            return Err(PokerError::RoomNotFound(room_id.to_string()));
        };

        if let Some(player) = room.players.get_mut(conn_id) {
            player.name = name.to_string();
            player.sender = sender;
            info!("Player {} refreshed its seat in room {} as {}", conn_id, room_id, name);
        } else {
            let role = if room.players.is_empty() {
                Role::Admin
            } else {
                Role::Common
            };
            let seat = room.next_seat;
            room.next_seat += 1;

            room.players.insert(
                conn_id.to_string(),
                Player {
                    id: conn_id.to_string(),
                    name: name.to_string(),
                    can_vote: true,
                    choice: None,
                    previous_choice: None,
                    role,
                    seat,
                    sender,
                },
            );
            state.memberships.insert(conn_id.to_string(), room_id.to_string());

            self.metrics.inc_joins();
            info!("Player {} ({}) joined room {} as {:?}", conn_id, name, room_id, role);
        }

        broadcast_room_update(room);
        Ok(())
    }

    /// Removes a departing connection from its room, if seated anywhere.
    ///
    /// Deletes the room synchronously when the last player leaves (no
    /// broadcast, there are no recipients). When the departing player held
    /// admin, the earliest still-present joiner is promoted before the
    /// snapshot goes out.
    pub fn disconnect(&self, conn_id: &str) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.memberships.contains_key(conn_id) {
            self.metrics.inc_leaves();
        }
        remove_connection(&mut state, conn_id);
    }

    /// Removes a target player on the admin's behalf.
    ///
    /// # Errors
    /// `Unauthorized` unless the actor is admin and the target is someone
    /// else; `PlayerNotFound` if the target is not seated in the room.
    pub fn kick_player(&self, actor_id: &str, target_id: &str) -> PokerResult<()> {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        let state = &mut *guard;
        let Some(room_id) = state.memberships.get(actor_id).cloned() else {
            return Ok(());
        };
        let Some(room) = state.rooms.get_mut(&room_id) else {
            return Ok(());
        };

        let is_admin = room
            .players
            .get(actor_id)
            .is_some_and(|p| p.role.is_admin());
        if !is_admin || actor_id == target_id {
            return Err(PokerError::Unauthorized);
        }

        let Some(kicked) = room.players.remove(target_id) else {
            return Err(PokerError::PlayerNotFound(target_id.to_string()));
        };
        state.memberships.remove(target_id);

        let notice = ServerMessage::PlayerKicked {
            target_id: target_id.to_string(),
        };
        // The kicked connection learns about the kick too; its sender was
        // captured before it left the broadcast group.
        send_direct(&kicked.sender, &notice);
        room.broadcast_all(&notice);
        broadcast_room_update(room);

        self.metrics.inc_kicks();
        info!("Player {} kicked {} from room {}", actor_id, target_id, room_id);
        Ok(())
    }

    /// Renames a player. An actor may rename itself; only the admin may
    /// rename someone else. An empty post-trim name is a silent no-op.
    ///
    /// # Errors
    /// `Unauthorized` for a non-admin targeting another player,
    /// `PlayerNotFound` for an absent target, `NameTaken` on collision with
    /// any other player's name.
    pub fn change_name(&self, actor_id: &str, target_id: &str, new_name: &str) -> PokerResult<()> {
        let name = new_name.trim();
        if name.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let Some(room) = seated_room(&mut state, actor_id) else {
            return Ok(());
        };

        if target_id != actor_id {
            let is_admin = room
                .players
                .get(actor_id)
                .is_some_and(|p| p.role.is_admin());
            if !is_admin {
                return Err(PokerError::Unauthorized);
            }
        }
        if !room.players.contains_key(target_id) {
            return Err(PokerError::PlayerNotFound(target_id.to_string()));
        }
        if room.is_name_taken(name, Some(target_id)) {
            return Err(PokerError::NameTaken(name.to_string()));
        }

        if let Some(target) = room.players.get_mut(target_id) {
            target.name = name.to_string();
        }
        broadcast_room_update(room);
        Ok(())
    }

    /// Sets a player's voting eligibility (admin only). Outside REVEAL the
    /// target's current vote is cleared so a toggled player never carries a
    /// stale vote into the live tally.
    ///
    /// # Errors
    /// `Unauthorized` for non-admin actors, `PlayerNotFound` for an absent
    /// target.
    pub fn update_voting_status(
        &self,
        actor_id: &str,
        target_id: &str,
        can_vote: bool,
    ) -> PokerResult<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let Some(room) = seated_room(&mut state, actor_id) else {
            return Ok(());
        };

        let is_admin = room
            .players
            .get(actor_id)
            .is_some_and(|p| p.role.is_admin());
        if !is_admin {
            return Err(PokerError::Unauthorized);
        }

        let status = room.status;
        let Some(target) = room.players.get_mut(target_id) else {
            return Err(PokerError::PlayerNotFound(target_id.to_string()));
        };
        target.can_vote = can_vote;
        if status != RoomStatus::Reveal {
            target.choice = None;
        }

        broadcast_room_update(room);
        Ok(())
    }

    /// Hands the admin role to another player as a single state transition:
    /// observers never see zero or two admins. No-op if the target is
    /// missing or is the actor itself.
    ///
    /// # Errors
    /// `Unauthorized` for non-admin actors.
    pub fn transfer_admin(&self, actor_id: &str, target_id: &str) -> PokerResult<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let Some(room) = seated_room(&mut state, actor_id) else {
            return Ok(());
        };

        let is_admin = room
            .players
            .get(actor_id)
            .is_some_and(|p| p.role.is_admin());
        if !is_admin {
            return Err(PokerError::Unauthorized);
        }
        if target_id == actor_id || !room.players.contains_key(target_id) {
            return Ok(());
        }

        if let Some(old_admin) = room.players.get_mut(actor_id) {
            old_admin.role = Role::Common;
        }
        if let Some(new_admin) = room.players.get_mut(target_id) {
            new_admin.role = Role::Admin;
        }

        info!("Admin of room {} transferred from {} to {}", room.id, actor_id, target_id);
        broadcast_room_update(room);
        Ok(())
    }

    /// Casts the acting player's vote. Silently ignored when the value is
    /// empty, the round is revealed, or the player is ineligible; a repeat
    /// of the current value is a no-op with no broadcast.
    pub fn choose_card(&self, actor_id: &str, choice: &str) -> PokerResult<()> {
        if choice.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let Some(room) = seated_room(&mut state, actor_id) else {
            return Ok(());
        };
        if room.status == RoomStatus::Reveal {
            return Ok(());
        }

        let Some(player) = room.players.get_mut(actor_id) else {
            return Ok(());
        };
        if !player.can_vote || player.choice.as_deref() == Some(choice) {
            return Ok(());
        }
        player.choice = Some(choice.to_string());

        self.metrics.inc_votes();
        broadcast_room_update(room);
        Ok(())
    }

    /// Audited post-hoc override of a revealed vote (admin only). Ignored
    /// while the round is still collecting; the overwritten value is kept
    /// in the target's audit field.
    ///
    /// # Errors
    /// `Unauthorized` for non-admin actors, `PlayerNotFound` for an absent
    /// target.
    pub fn admin_change_player_choice(
        &self,
        actor_id: &str,
        target_id: &str,
        choice: &str,
    ) -> PokerResult<()> {
        if choice.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let Some(room) = seated_room(&mut state, actor_id) else {
            return Ok(());
        };

        let is_admin = room
            .players
            .get(actor_id)
            .is_some_and(|p| p.role.is_admin());
        if !is_admin {
            return Err(PokerError::Unauthorized);
        }
        if room.status != RoomStatus::Reveal {
            return Ok(());
        }

        let Some(target) = room.players.get_mut(target_id) else {
            return Err(PokerError::PlayerNotFound(target_id.to_string()));
        };
        if target.choice.as_deref() == Some(choice) {
            return Ok(());
        }
        target.previous_choice = target.choice.take();
        target.choice = Some(choice.to_string());

        info!("Admin {} overrode vote of {} in room {}", actor_id, target_id, room.id);
        broadcast_room_update(room);
        Ok(())
    }

    /// Starts a fresh round (admin only): clears every vote and audit field
    /// and returns the room to VOTING.
    ///
    /// # Errors
    /// `Unauthorized` unless the actor is the room's admin.
    pub fn reset(&self, actor_id: &str, room_id: &str) -> PokerResult<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let Some(room) = state.rooms.get_mut(room_id) else {
            return Ok(());
        };

        let is_admin = room
            .players
            .get(actor_id)
            .is_some_and(|p| p.role.is_admin());
        if !is_admin {
            return Err(PokerError::Unauthorized);
        }

        for player in room.players.values_mut() {
            player.choice = None;
            player.previous_choice = None;
        }
        room.status = RoomStatus::Voting;

        self.metrics.inc_resets();
        info!("Room {} reset to a fresh voting round", room_id);
        broadcast_room_update(room);
        Ok(())
    }

    /// Discloses the votes (admin only): flips the room to REVEAL; the
    /// outgoing snapshot carries the derived statistics.
    ///
    /// # Errors
    /// `Unauthorized` unless the actor is the room's admin.
    pub fn reveal_cards(&self, actor_id: &str, room_id: &str) -> PokerResult<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let Some(room) = state.rooms.get_mut(room_id) else {
            return Ok(());
        };

        let is_admin = room
            .players
            .get(actor_id)
            .is_some_and(|p| p.role.is_admin());
        if !is_admin {
            return Err(PokerError::Unauthorized);
        }

        room.status = RoomStatus::Reveal;

        self.metrics.inc_reveals();
        info!("Room {} revealed its votes", room_id);
        broadcast_room_update(room);
        Ok(())
    }

    #[cfg(test)]
    fn with_player<R>(
        &self,
        room_id: &str,
        player_id: &str,
        f: impl FnOnce(&Player) -> R,
    ) -> Option<R> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .rooms
            .get(room_id)
            .and_then(|r| r.players.get(player_id))
            .map(f)
    }
}

/// Resolves the acting connection's room through the membership index.
fn seated_room<'a>(state: &'a mut HubState, conn_id: &str) -> Option<&'a mut Room> {
    let room_id = state.memberships.get(conn_id)?;
    state.rooms.get_mut(room_id)
}

/// Shared removal path for disconnects, kicks-by-rejoin, and room moves.
/// Keeps the membership index and room store consistent in one step.
fn remove_connection(state: &mut HubState, conn_id: &str) {
    let Some(room_id) = state.memberships.remove(conn_id) else {
        return;
    };

    let (became_empty, was_admin) = {
        let Some(room) = state.rooms.get_mut(&room_id) else {
            return;
        };
        let Some(player) = room.players.remove(conn_id) else {
            return;
        };
        info!("Player {} ({}) left room {}", conn_id, player.name, room_id);
        (room.players.is_empty(), player.role.is_admin())
    };

    if became_empty {
        state.rooms.remove(&room_id);
        info!("Room {} is empty, deleting", room_id);
        return;
    }

    let Some(room) = state.rooms.get_mut(&room_id) else {
        return;
    };
    if was_admin {
        room.broadcast_all(&ServerMessage::AdminDisconnected);
        if let Some(successor) = room.players.values_mut().min_by_key(|p| p.seat) {
            successor.role = Role::Admin;
            info!("Promoted {} to admin of room {}", successor.id, room_id);
        }
    }
    broadcast_room_update(room);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio::sync::mpsc::Receiver;

    fn hub() -> PokerHub {
        PokerHub::new(ServerMetrics::new())
    }

    fn join(hub: &PokerHub, room_id: &str, conn_id: &str, name: &str) -> Receiver<Arc<String>> {
        let (tx, rx) = mpsc::channel(32);
        hub.join_room(conn_id, room_id, name, tx)
            .unwrap_or_else(|e| panic!("join {conn_id} failed: {e}"));
        rx
    }

    fn drain(rx: &mut Receiver<Arc<String>>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(json) = rx.try_recv() {
            out.push(serde_json::from_str(&json).unwrap());
        }
        out
    }

    fn last_room_update(rx: &mut Receiver<Arc<String>>) -> Value {
        drain(rx)
            .into_iter()
            .filter(|m| m["type"] == "roomUpdate")
            .next_back()
            .expect("no roomUpdate received")
    }

    fn admin_ids(snapshot: &Value) -> Vec<String> {
        snapshot["players"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|p| p["role"] == "ADMIN")
            .map(|p| p["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn first_joiner_is_admin_later_joiners_are_common() {
        let h = hub();
        let room = h.create_room();
        let mut rx1 = join(&h, &room, "c1", "alice");
        let _rx2 = join(&h, &room, "c2", "bob");
        let _rx3 = join(&h, &room, "c3", "carol");

        let snap = last_room_update(&mut rx1);
        assert_eq!(admin_ids(&snap), vec!["c1"]);
        let players = snap["players"].as_array().unwrap();
        assert_eq!(players.len(), 3);
        // join order is preserved in the snapshot
        let names: Vec<&str> = players.iter().map(|p| p["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn join_unknown_room_fails() {
        let h = hub();
        let (tx, _rx) = mpsc::channel(8);
        let err = h.join_room("c1", "no-such-room", "alice", tx).unwrap_err();
        assert!(matches!(err, PokerError::RoomNotFound(_)));
    }

    #[test]
    fn duplicate_name_is_rejected_without_mutation() {
        let h = hub();
        let room = h.create_room();
        let _rx1 = join(&h, &room, "c1", "alice");

        let (tx, _rx) = mpsc::channel(8);
        let err = h.join_room("c2", &room, "alice", tx).unwrap_err();
        assert!(matches!(err, PokerError::NameTaken(_)));
        assert_eq!(h.total_player_count(), 1);
    }

    #[test]
    fn join_trims_name_and_rejects_whitespace_only() {
        let h = hub();
        let room = h.create_room();
        let (tx, _rx) = mpsc::channel(8);
        let err = h.join_room("c1", &room, "   ", tx).unwrap_err();
        assert!(matches!(err, PokerError::InvalidInput(_)));

        let mut rx = join(&h, &room, "c2", "  dave  ");
        let snap = last_room_update(&mut rx);
        assert_eq!(snap["players"][0]["name"], "dave");
    }

    #[test]
    fn choose_card_is_idempotent_for_the_same_value() {
        let h = hub();
        let room = h.create_room();
        let mut rx1 = join(&h, &room, "c1", "alice");
        let _rx2 = join(&h, &room, "c2", "bob");
        drain(&mut rx1);

        h.choose_card("c2", "5").unwrap();
        h.choose_card("c2", "5").unwrap();

        let updates: Vec<Value> = drain(&mut rx1)
            .into_iter()
            .filter(|m| m["type"] == "roomUpdate")
            .collect();
        assert_eq!(updates.len(), 1, "repeat vote must not rebroadcast");
    }

    #[test]
    fn choose_card_ignored_when_revealed_or_ineligible() {
        let h = hub();
        let room = h.create_room();
        let mut rx1 = join(&h, &room, "c1", "alice");
        let _rx2 = join(&h, &room, "c2", "bob");

        h.update_voting_status("c1", "c2", false).unwrap();
        drain(&mut rx1);
        h.choose_card("c2", "8").unwrap();
        assert!(drain(&mut rx1).is_empty(), "ineligible vote must be silent");

        h.update_voting_status("c1", "c2", true).unwrap();
        h.reveal_cards("c1", &room).unwrap();
        drain(&mut rx1);
        h.choose_card("c2", "8").unwrap();
        assert!(drain(&mut rx1).is_empty(), "vote after reveal must be silent");
    }

    #[test]
    fn revoking_eligibility_mid_round_clears_the_vote() {
        let h = hub();
        let room = h.create_room();
        let mut rx1 = join(&h, &room, "c1", "alice");
        let _rx2 = join(&h, &room, "c2", "bob");

        h.choose_card("c2", "13").unwrap();
        h.update_voting_status("c1", "c2", false).unwrap();

        let cleared = h
            .with_player(&room, "c2", |p| p.choice.is_none())
            .unwrap();
        assert!(cleared);

        let snap = last_room_update(&mut rx1);
        assert_eq!(snap["players"][1]["canVote"], false);
        assert_eq!(snap["players"][1]["choice"], false);
    }

    #[test]
    fn reveal_and_reset_round_trip() {
        let h = hub();
        let room = h.create_room();
        let mut rx1 = join(&h, &room, "c1", "alice");
        let _rx2 = join(&h, &room, "c2", "bob");
        let _rx3 = join(&h, &room, "c3", "carol");

        h.choose_card("c1", "1").unwrap();
        h.choose_card("c2", "2").unwrap();
        h.choose_card("c3", "3").unwrap();
        h.reveal_cards("c1", &room).unwrap();

        let snap = last_room_update(&mut rx1);
        assert_eq!(snap["status"], "REVEAL");
        assert_eq!(snap["players"][0]["choice"], "1");
        assert_eq!(snap["minChoice"], 1.0);
        assert_eq!(snap["maxChoice"], 3.0);
        assert_eq!(snap["averageChoice"], 2.0);

        h.reset("c1", &room).unwrap();
        let snap = last_room_update(&mut rx1);
        assert_eq!(snap["status"], "VOTING");
        for player in snap["players"].as_array().unwrap() {
            assert_eq!(player["choice"], false);
        }
        assert!(snap.get("minChoice").is_none());
    }

    #[test]
    fn admin_override_is_audited_and_ignored_while_voting() {
        let h = hub();
        let room = h.create_room();
        let mut rx1 = join(&h, &room, "c1", "alice");
        let _rx2 = join(&h, &room, "c2", "bob");

        h.choose_card("c2", "5").unwrap();
        drain(&mut rx1);

        // During VOTING the override is a silent no-op
        h.admin_change_player_choice("c1", "c2", "8").unwrap();
        assert!(drain(&mut rx1).is_empty());

        h.reveal_cards("c1", &room).unwrap();
        h.admin_change_player_choice("c1", "c2", "8").unwrap();

        let (choice, previous) = h
            .with_player(&room, "c2", |p| (p.choice.clone(), p.previous_choice.clone()))
            .unwrap();
        assert_eq!(choice.as_deref(), Some("8"));
        assert_eq!(previous.as_deref(), Some("5"));

        let snap = last_room_update(&mut rx1);
        assert_eq!(snap["players"][1]["choice"], "8");
    }

    #[test]
    fn admin_disconnect_promotes_earliest_remaining_joiner() {
        let h = hub();
        let room = h.create_room();
        let _rx1 = join(&h, &room, "c1", "alice");
        let mut rx2 = join(&h, &room, "c2", "bob");
        let mut rx3 = join(&h, &room, "c3", "carol");
        drain(&mut rx2);
        drain(&mut rx3);

        h.disconnect("c1");

        let msgs = drain(&mut rx2);
        assert!(msgs.iter().any(|m| m["type"] == "adminDisconnected"));
        let snap = msgs
            .into_iter()
            .filter(|m| m["type"] == "roomUpdate")
            .next_back()
            .unwrap();
        assert_eq!(admin_ids(&snap), vec!["c2"]);
        assert_eq!(snap["players"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn last_player_departure_deletes_the_room() {
        let h = hub();
        let room = h.create_room();
        let _rx1 = join(&h, &room, "c1", "alice");
        assert!(h.room_exists(&room));

        h.disconnect("c1");
        assert!(!h.room_exists(&room));
        assert_eq!(h.total_player_count(), 0);
    }

    #[test]
    fn kick_removes_target_and_notifies_everyone() {
        let h = hub();
        let room = h.create_room();
        let mut rx1 = join(&h, &room, "c1", "alice");
        let mut rx2 = join(&h, &room, "c2", "bob");
        drain(&mut rx1);
        drain(&mut rx2);

        h.kick_player("c1", "c2").unwrap();

        let to_target = drain(&mut rx2);
        assert!(to_target.iter().any(|m| m["type"] == "playerKicked" && m["targetId"] == "c2"));

        let msgs = drain(&mut rx1);
        assert!(msgs.iter().any(|m| m["type"] == "playerKicked"));
        let snap = msgs
            .into_iter()
            .filter(|m| m["type"] == "roomUpdate")
            .next_back()
            .unwrap();
        assert_eq!(snap["players"].as_array().unwrap().len(), 1);

        // The kicked connection is no longer seated anywhere
        h.choose_card("c2", "5").unwrap();
        assert!(drain(&mut rx1).is_empty());
    }

    #[test]
    fn kick_requires_admin_and_another_target() {
        let h = hub();
        let room = h.create_room();
        let mut rx1 = join(&h, &room, "c1", "alice");
        let _rx2 = join(&h, &room, "c2", "bob");
        drain(&mut rx1);

        assert!(matches!(h.kick_player("c2", "c1"), Err(PokerError::Unauthorized)));
        assert!(matches!(h.kick_player("c1", "c1"), Err(PokerError::Unauthorized)));
        assert!(matches!(
            h.kick_player("c1", "nobody"),
            Err(PokerError::PlayerNotFound(_))
        ));
        assert!(drain(&mut rx1).is_empty(), "failed kicks must not broadcast");
        assert_eq!(h.total_player_count(), 2);
    }

    #[test]
    fn transfer_admin_swaps_roles_atomically() {
        let h = hub();
        let room = h.create_room();
        let mut rx1 = join(&h, &room, "c1", "alice");
        let _rx2 = join(&h, &room, "c2", "bob");

        h.transfer_admin("c1", "c2").unwrap();
        let snap = last_room_update(&mut rx1);
        assert_eq!(admin_ids(&snap), vec!["c2"]);

        // Missing target is a no-op, not an error
        drain(&mut rx1);
        h.transfer_admin("c2", "nobody").unwrap();
        assert!(drain(&mut rx1).is_empty());
    }

    #[test]
    fn change_name_rules() {
        let h = hub();
        let room = h.create_room();
        let mut rx1 = join(&h, &room, "c1", "alice");
        let _rx2 = join(&h, &room, "c2", "bob");
        drain(&mut rx1);

        // Empty post-trim name is silent
        h.change_name("c2", "c2", "   ").unwrap();
        assert!(drain(&mut rx1).is_empty());

        // Collision with another player's name
        assert!(matches!(
            h.change_name("c2", "c2", "alice"),
            Err(PokerError::NameTaken(_))
        ));

        // Non-admin may not rename someone else
        assert!(matches!(
            h.change_name("c2", "c1", "eve"),
            Err(PokerError::Unauthorized)
        ));

        // Admin renames another player
        h.change_name("c1", "c2", "robert").unwrap();
        let snap = last_room_update(&mut rx1);
        assert_eq!(snap["players"][1]["name"], "robert");

        // Self-rename to the same name (non-collision with itself)
        h.change_name("c2", "c2", "robert").unwrap();
    }

    #[test]
    fn admin_only_operations_reject_common_players() {
        let h = hub();
        let room = h.create_room();
        let mut rx1 = join(&h, &room, "c1", "alice");
        let _rx2 = join(&h, &room, "c2", "bob");
        drain(&mut rx1);

        assert!(matches!(h.reveal_cards("c2", &room), Err(PokerError::Unauthorized)));
        assert!(matches!(h.reset("c2", &room), Err(PokerError::Unauthorized)));
        assert!(matches!(h.kick_player("c2", "c1"), Err(PokerError::Unauthorized)));
        assert!(matches!(h.transfer_admin("c2", "c1"), Err(PokerError::Unauthorized)));
        assert!(matches!(
            h.update_voting_status("c2", "c1", false),
            Err(PokerError::Unauthorized)
        ));

        assert!(drain(&mut rx1).is_empty(), "rejected operations must not broadcast");
        assert_eq!(h.with_player(&room, "c1", |p| p.role).unwrap(), Role::Admin);
    }

    #[test]
    fn failed_join_leaves_current_seat_untouched() {
        let h = hub();
        let room_a = h.create_room();
        let room_b = h.create_room();
        let mut rx1 = join(&h, &room_a, "c1", "alice");
        let _rx2 = join(&h, &room_b, "c2", "bob");
        drain(&mut rx1);

        // Unknown target room: the connection stays where it was
        let (tx, _rx) = mpsc::channel(8);
        let err = h.join_room("c1", "no-such-room", "alice", tx).unwrap_err();
        assert!(matches!(err, PokerError::RoomNotFound(_)));
        assert!(h.room_exists(&room_a));
        assert_eq!(h.total_player_count(), 2);

        // Name collision in the target room: same rule
        let (tx, _rx) = mpsc::channel(8);
        let err = h.join_room("c1", &room_b, "bob", tx).unwrap_err();
        assert!(matches!(err, PokerError::NameTaken(_)));
        assert!(h.room_exists(&room_a));
        assert_eq!(h.total_player_count(), 2);

        assert!(drain(&mut rx1).is_empty(), "failed joins must not broadcast");

        // Still seated in the old room
        h.choose_card("c1", "5").unwrap();
        assert_eq!(last_room_update(&mut rx1)["id"], room_a);
    }

    #[test]
    fn rejoining_own_room_refreshes_the_seat_in_place() {
        let h = hub();
        let room = h.create_room();
        let _rx1 = join(&h, &room, "c1", "alice");
        let mut rx2 = join(&h, &room, "c2", "bob");

        let mut rx1b = join(&h, &room, "c1", "alicia");

        assert!(h.room_exists(&room));
        assert_eq!(h.total_player_count(), 2);

        let snap = last_room_update(&mut rx2);
        assert_eq!(admin_ids(&snap), vec!["c1"]);
        let names: Vec<&str> = snap["players"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["alicia", "bob"]);

        // The refreshed sender receives subsequent broadcasts
        drain(&mut rx1b);
        h.choose_card("c2", "3").unwrap();
        assert_eq!(last_room_update(&mut rx1b)["id"], room);
    }

    #[test]
    fn rejoining_elsewhere_moves_the_connection() {
        let h = hub();
        let room_a = h.create_room();
        let room_b = h.create_room();
        let _rx1 = join(&h, &room_a, "c1", "alice");
        let _rx1b = join(&h, &room_b, "c1", "alice");

        // Room A lost its only player and was deleted
        assert!(!h.room_exists(&room_a));
        assert!(h.room_exists(&room_b));
        assert_eq!(h.total_player_count(), 1);
    }

    #[test]
    fn name_availability_check() {
        let h = hub();
        let room = h.create_room();
        let _rx1 = join(&h, &room, "c1", "alice");

        assert!(h.is_name_available(&room, "bob").unwrap());
        assert!(!h.is_name_available(&room, "alice").unwrap());
        assert!(matches!(
            h.is_name_available("missing", "bob"),
            Err(PokerError::RoomNotFound(_))
        ));
    }
}
