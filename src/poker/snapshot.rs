#![forbid(unsafe_code)]

// Snapshot builder - sanitized outward view of a room, decoupled from the
// internal Room/Player representation

use super::stats;
use super::{Player, Room, RoomStatus};
use crate::signaling::protocol::{ChoiceView, PlayerView, RoomSnapshot};

/// Builds the room snapshot pushed to every member on `roomUpdate`.
///
/// Players appear in join order. Vote values are only disclosed once the
/// room is in REVEAL; before that each player carries a has-voted flag so
/// raw votes never leak mid-round. Voted/pending counts range over
/// vote-eligible players only, and the derived statistics are attached
/// during REVEAL.
pub fn build(room: &Room) -> RoomSnapshot {
    let mut players: Vec<&Player> = room.players.values().collect();
    players.sort_by_key(|p| p.seat);

    let voted_players_count = players
        .iter()
        .filter(|p| p.can_vote && p.choice.is_some())
        .count();
    let voting_players_count = players
        .iter()
        .filter(|p| p.can_vote && p.choice.is_none())
        .count();

    let vote_stats = if room.status == RoomStatus::Reveal {
        stats::calculate(players.iter().filter_map(|p| p.choice.as_deref()))
    } else {
        None
    };

    let views = players
        .iter()
        .map(|p| PlayerView {
            id: p.id.clone(),
            name: p.name.clone(),
            can_vote: p.can_vote,
            choice: choice_view(p, room.status),
            role: p.role,
        })
        .collect();

    RoomSnapshot {
        id: room.id.clone(),
        status: room.status,
        players: views,
        voted_players_count,
        voting_players_count,
        min_choice: vote_stats.as_ref().map(|s| s.min),
        max_choice: vote_stats.as_ref().map(|s| s.max),
        average_choice: vote_stats.as_ref().map(|s| s.average),
    }
}

fn choice_view(player: &Player, status: RoomStatus) -> ChoiceView {
    match status {
        RoomStatus::Reveal => match &player.choice {
            Some(value) => ChoiceView::Value(value.clone()),
            None => ChoiceView::Voted(false),
        },
        RoomStatus::Voting => ChoiceView::Voted(player.choice.is_some()),
    }
}
