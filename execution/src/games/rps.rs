use super::{finish, GameError, Transition};
use crate::policy::RpsTiePolicy;
use memento_types::{GameChange, RpsGame, RpsMove, Seat};
use std::cmp::Ordering;

/// Compares two throws from the host's point of view.
pub fn resolve(host: RpsMove, guest: RpsMove) -> Ordering {
    if host.beats(guest) {
        Ordering::Greater
    } else if guest.beats(host) {
        Ordering::Less
    } else {
        Ordering::Equal
    }
}

pub(super) fn submit(
    game: &mut RpsGame,
    seat: Seat,
    choice: RpsMove,
    tie: RpsTiePolicy,
) -> Result<Transition, GameError> {
    let slot = match seat {
        Seat::Host => &mut game.host_move,
        Seat::Guest => &mut game.guest_move,
    };
    if slot.is_some() {
        return Err(GameError::InvalidMove("already moved this round"));
    }
    *slot = Some(choice);

    let (Some(host), Some(guest)) = (game.host_move, game.guest_move) else {
        return Ok(Transition::new(GameChange::MoveSubmitted));
    };

    let winner = match resolve(host, guest) {
        Ordering::Greater => Some(game.table.host.clone()),
        Ordering::Less => game.table.guest.clone(),
        Ordering::Equal => None,
    };
    if winner.is_none() && tie == RpsTiePolicy::Replay {
        game.host_move = None;
        game.guest_move = None;
        return Ok(Transition::new(GameChange::RoundTied));
    }
    Ok(finish(&mut game.table, winner))
}
