use super::{finish, GameError, TableRng, Transition};
use commonware_cryptography::ed25519::PublicKey;
use memento_types::{Board, GameChange, Symbol, TttGame, BOARD_CELLS};

/// Rows, columns, then diagonals.
pub const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// The symbol holding a full line, if any.
pub fn check_winner(board: &Board) -> Option<Symbol> {
    LINES.iter().find_map(|[a, b, c]| {
        let symbol = board.get(*a)?;
        (board.get(*b) == Some(symbol) && board.get(*c) == Some(symbol)).then_some(symbol)
    })
}

fn pick_turn(game: &mut TttGame, rng: &mut TableRng) {
    game.turn = if rng.coin() {
        Some(game.table.host.clone())
    } else {
        game.table.guest.clone()
    };
}

/// Assigns symbols and the opening turn when the guest sits down.
pub(super) fn deal(game: &mut TttGame, rng: &mut TableRng) {
    let host = if rng.coin() { Symbol::X } else { Symbol::O };
    game.host_symbol = Some(host);
    game.guest_symbol = Some(host.other());
    game.board = Board::default();
    pick_turn(game, rng);
}

/// Clears the board for the next round. Symbols are kept.
pub(super) fn reset(game: &mut TttGame, rng: &mut TableRng) {
    game.board = Board::default();
    game.round = game.round.saturating_add(1);
    pick_turn(game, rng);
}

pub(super) fn submit(game: &mut TttGame, user: &PublicKey, cell: u8) -> Result<Transition, GameError> {
    let cell = cell as usize;
    if cell >= BOARD_CELLS {
        return Err(GameError::InvalidInput("cell out of range"));
    }
    if game.turn.as_ref() != Some(user) {
        return Err(GameError::InvalidMove("not your turn"));
    }
    let symbol = game
        .symbol_of(user)
        .ok_or(GameError::InvalidMove("no symbol assigned"))?;
    if !game.board.place(cell, symbol) {
        return Err(GameError::InvalidMove("cell occupied"));
    }

    if let Some(line) = check_winner(&game.board) {
        let winner = game.player_with(line).cloned();
        game.turn = None;
        return Ok(finish(&mut game.table, winner));
    }
    if game.board.is_full() {
        game.turn = None;
        return Ok(finish(&mut game.table, None));
    }
    game.turn = game.table.opponent(user).cloned();
    Ok(Transition::new(GameChange::MoveSubmitted))
}
