//! Two-player game rooms.
//!
//! Every transition is a pure function over a [Game] record. Stakes move
//! between balances and the table escrow through the returned [Transfer]s,
//! which the caller applies together with the updated record.

pub mod negotiation;
pub mod rps;
pub mod ttt;

pub use negotiation::BetNegotiable;

use crate::policy::{ForfeitPolicy, Policy};
use commonware_cryptography::{ed25519::PublicKey, sha256::Sha256, Hasher};
use memento_types::{
    Game, GameChange, GameKind, GameStatus, Play, RpsGame, Seat, Table, TttGame,
    JOIN_CODE_ALPHABET, JOIN_CODE_LENGTH,
};

/// Deterministic randomness for a table, derived from the intent entropy,
/// the game id and the round.
#[derive(Clone)]
pub struct TableRng {
    state: [u8; 32],
    index: usize,
}

impl TableRng {
    pub fn new(entropy: u64, game: u64, round: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(&entropy.to_be_bytes());
        hasher.update(&game.to_be_bytes());
        hasher.update(&round.to_be_bytes());
        Self {
            state: hasher.finalize().0,
            index: 0,
        }
    }

    pub fn next_u8(&mut self) -> u8 {
        if self.index >= self.state.len() {
            let mut hasher = Sha256::new();
            hasher.update(&self.state);
            self.state = hasher.finalize().0;
            self.index = 0;
        }
        let result = self.state[self.index];
        self.index += 1;
        result
    }

    pub fn coin(&mut self) -> bool {
        self.next_u8() & 1 == 1
    }

    /// Six characters from an alphabet without lookalikes.
    pub fn join_code(&mut self) -> String {
        (0..JOIN_CODE_LENGTH)
            .map(|_| {
                let i = self.next_u8() as usize % JOIN_CODE_ALPHABET.len();
                JOIN_CODE_ALPHABET[i] as char
            })
            .collect()
    }
}

/// MMC moving between a player's balance and the escrow. Positive amounts
/// pay the player, negative amounts stake from them.
#[derive(Clone, Debug, PartialEq)]
pub struct Transfer {
    pub user: PublicKey,
    pub amount: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("amount must be positive and finite")]
    InvalidAmount,
    #[error("invalid move: {0}")]
    InvalidMove(&'static str),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("game cannot be joined")]
    NotJoinable,
    #[error("bet proposal rejected: {0}")]
    BetRejected(&'static str),
    #[error("not a participant")]
    NotParticipant,
    #[error("cannot {action} from {from:?}")]
    InvalidTransition {
        from: GameStatus,
        action: &'static str,
    },
}

/// The effect of one transition.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub change: GameChange,
    pub transfers: Vec<Transfer>,
}

impl Transition {
    pub fn new(change: GameChange) -> Self {
        Self {
            change,
            transfers: Vec::new(),
        }
    }

    pub(crate) fn transfer(&mut self, user: &PublicKey, amount: f64) {
        if amount != 0.0 {
            self.transfers.push(Transfer {
                user: user.clone(),
                amount,
            });
        }
    }
}

pub(crate) fn check_amount(amount: f64) -> Result<(), GameError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(GameError::InvalidAmount);
    }
    Ok(())
}

pub(crate) fn require_participant(table: &Table, user: &PublicKey) -> Result<Seat, GameError> {
    table.seat(user).ok_or(GameError::NotParticipant)
}

/// Sets each seated player's stake to `amount`, collecting or refunding the difference.
pub(crate) fn restake(table: &mut Table, amount: f64, transition: &mut Transition) {
    let host_delta = amount - table.escrow.host;
    table.escrow.host = amount;
    transition.transfer(&table.host.clone(), -host_delta);

    if let Some(guest) = table.guest.clone() {
        let guest_delta = amount - table.escrow.guest;
        table.escrow.guest = amount;
        transition.transfer(&guest, -guest_delta);
    }
}

/// Returns each seat's stake.
pub(crate) fn refund(table: &mut Table, transition: &mut Transition) {
    let host = std::mem::take(&mut table.escrow.host);
    transition.transfer(&table.host.clone(), host);
    let guest = std::mem::take(&mut table.escrow.guest);
    if let Some(player) = table.guest.clone() {
        transition.transfer(&player, guest);
    }
}

/// Pays the whole escrow to `winner` and returns the amount.
pub(crate) fn award(table: &mut Table, winner: &PublicKey, transition: &mut Transition) -> f64 {
    let payout = table.escrow.total();
    table.escrow = Default::default();
    transition.transfer(winner, payout);
    payout
}

/// Finishes the round with `winner` (or a draw), settling the escrow.
pub(crate) fn finish(table: &mut Table, winner: Option<PublicKey>) -> Transition {
    let mut transition = Transition::new(GameChange::Finished {
        winner: winner.clone(),
        payout: 0.0,
    });
    let payout = match &winner {
        Some(winner) => award(table, winner, &mut transition),
        None => {
            refund(table, &mut transition);
            0.0
        }
    };
    table.status = GameStatus::Finished;
    table.winner = winner.clone();
    table.bet.proposal = None;
    transition.change = GameChange::Finished { winner, payout };
    transition
}

/// Opens a new room in `Waiting`. A given bet is staked by the host immediately.
pub fn create(
    kind: GameKind,
    mut table: Table,
    bet: Option<f64>,
) -> Result<(Game, Transition), GameError> {
    let mut transition = Transition::new(GameChange::Created);
    if let Some(amount) = bet {
        check_amount(amount)?;
        table.bet.amount = Some(amount);
        restake(&mut table, amount, &mut transition);
    }
    let game = match kind {
        GameKind::Rps => Game::Rps(RpsGame::new(table)),
        GameKind::Ttt => Game::Ttt(TttGame::new(table)),
    };
    Ok((game, transition))
}

/// Seats `guest` and activates the game.
pub fn join(game: &mut Game, guest: &PublicKey, rng: &mut TableRng) -> Result<Transition, GameError> {
    let table = game.table_mut();
    if table.status != GameStatus::Waiting || table.guest.is_some() || &table.host == guest {
        return Err(GameError::NotJoinable);
    }
    table.guest = Some(guest.clone());
    table.status = GameStatus::Active;

    let mut transition = Transition::new(GameChange::Joined);
    if let Some(amount) = table.bet.amount {
        restake(table, amount, &mut transition);
    }
    if let Game::Ttt(ttt) = game {
        ttt::deal(ttt, rng);
    }
    Ok(transition)
}

pub fn submit_move(
    game: &mut Game,
    user: &PublicKey,
    play: Play,
    policy: &Policy,
) -> Result<Transition, GameError> {
    let table = game.table();
    let seat = require_participant(table, user)?;
    if table.status != GameStatus::Active {
        return Err(GameError::InvalidMove("game is not active"));
    }
    if table.bet.amount.is_none() {
        return Err(GameError::InvalidMove("no bet agreed"));
    }
    match (game, play) {
        (Game::Rps(rps), Play::Rps(choice)) => rps::submit(rps, seat, choice, policy.rps_tie),
        (Game::Ttt(ttt), Play::Ttt(cell)) => ttt::submit(ttt, user, cell),
        _ => Err(GameError::InvalidMove("move does not match game kind")),
    }
}

/// Starts another round between the same players, keeping the agreed bet.
pub fn restart(game: &mut Game, user: &PublicKey, rng: &mut TableRng) -> Result<Transition, GameError> {
    let table = game.table_mut();
    require_participant(table, user)?;
    if table.status != GameStatus::Finished {
        return Err(GameError::InvalidTransition {
            from: table.status,
            action: "restart",
        });
    }
    table.status = GameStatus::Active;
    table.winner = None;
    table.bet.proposal = None;

    let mut transition = Transition::new(GameChange::Restarted);
    if let Some(amount) = table.bet.amount {
        restake(table, amount, &mut transition);
    }
    match game {
        Game::Rps(rps) => {
            rps.host_move = None;
            rps.guest_move = None;
        }
        Game::Ttt(ttt) => ttt::reset(ttt, rng),
    }
    Ok(transition)
}

/// Leaves a waiting or active game. The game ends `Cancelled` with no winner.
pub fn forfeit(game: &mut Game, user: &PublicKey, policy: ForfeitPolicy) -> Result<Transition, GameError> {
    let table = game.table_mut();
    require_participant(table, user)?;
    let from = table.status;
    if !from.is_open() {
        return Err(GameError::InvalidTransition {
            from,
            action: "forfeit",
        });
    }
    table.status = GameStatus::Cancelled;
    table.bet.proposal = None;

    let opponent = table.opponent(user).cloned();
    let mut transition = Transition::new(GameChange::Cancelled { awarded: None });
    match (from, policy, opponent) {
        (GameStatus::Active, ForfeitPolicy::AwardOpponent, Some(opponent)) => {
            award(table, &opponent, &mut transition);
            transition.change = GameChange::Cancelled {
                awarded: Some(opponent),
            };
        }
        _ => refund(table, &mut transition),
    }
    if let Game::Ttt(ttt) = game {
        ttt.turn = None;
    }
    Ok(transition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::create_account_keypair;
    use memento_types::RpsMove;

    fn new_game(kind: GameKind, bet: Option<f64>) -> (Game, PublicKey, PublicKey) {
        let (_, host) = create_account_keypair(1);
        let (_, guest) = create_account_keypair(2);
        let (game, _) = create(kind, Table::new(1, host.clone(), 0), bet).unwrap();
        (game, host, guest)
    }

    fn net(transition: &Transition) -> f64 {
        transition.transfers.iter().map(|t| t.amount).sum()
    }

    #[test]
    fn test_join_code_alphabet() {
        let mut rng = TableRng::new(9, 1, 0);
        let code = rng.join_code();
        assert_eq!(code.len(), JOIN_CODE_LENGTH);
        assert!(code.bytes().all(|c| JOIN_CODE_ALPHABET.contains(&c)));
        assert_ne!(code, TableRng::new(10, 1, 0).join_code());
    }

    #[test]
    fn test_rng_deterministic() {
        let mut a = TableRng::new(1, 2, 3);
        let mut b = TableRng::new(1, 2, 3);
        for _ in 0..100 {
            assert_eq!(a.next_u8(), b.next_u8());
        }
    }

    #[test]
    fn test_create_stakes_host() {
        let (_, host) = create_account_keypair(1);
        let (game, transition) =
            create(GameKind::Rps, Table::new(1, host.clone(), 0), Some(25.0)).unwrap();
        assert_eq!(game.table().escrow.host, 25.0);
        assert_eq!(
            transition.transfers,
            vec![Transfer {
                user: host.clone(),
                amount: -25.0
            }]
        );
        assert_eq!(
            create(GameKind::Rps, Table::new(1, host.clone(), 0), Some(0.0)).unwrap_err(),
            GameError::InvalidAmount
        );
        assert_eq!(
            create(GameKind::Rps, Table::new(1, host, 0), Some(f64::NAN)).unwrap_err(),
            GameError::InvalidAmount
        );
    }

    #[test]
    fn test_join_rules() {
        let (mut game, host, guest) = new_game(GameKind::Rps, Some(10.0));
        let mut rng = TableRng::new(0, 1, 1);
        assert_eq!(join(&mut game, &host, &mut rng), Err(GameError::NotJoinable));

        let transition = join(&mut game, &guest, &mut rng).unwrap();
        assert_eq!(game.status(), GameStatus::Active);
        assert_eq!(game.table().guest.as_ref(), Some(&guest));
        assert_eq!(net(&transition), -10.0);

        let (_, third) = create_account_keypair(3);
        assert_eq!(join(&mut game, &third, &mut rng), Err(GameError::NotJoinable));
    }

    #[test]
    fn test_ttt_join_deals_symbols() {
        let (mut game, host, guest) = new_game(GameKind::Ttt, None);
        join(&mut game, &guest, &mut TableRng::new(5, 1, 1)).unwrap();
        let Game::Ttt(ttt) = &game else {
            panic!("expected ttt");
        };
        let host_symbol = ttt.symbol_of(&host).unwrap();
        assert_eq!(ttt.symbol_of(&guest), Some(host_symbol.other()));
        assert!(ttt.turn == Some(host) || ttt.turn == Some(guest));
        assert_eq!(ttt.round, 1);
    }

    #[test]
    fn test_move_requires_bet() {
        let (mut game, host, guest) = new_game(GameKind::Rps, None);
        join(&mut game, &guest, &mut TableRng::new(0, 1, 1)).unwrap();
        let policy = Policy::default();
        assert_eq!(
            submit_move(&mut game, &host, Play::Rps(RpsMove::Rock), &policy),
            Err(GameError::InvalidMove("no bet agreed"))
        );
        let (_, stranger) = create_account_keypair(3);
        assert_eq!(
            submit_move(&mut game, &stranger, Play::Rps(RpsMove::Rock), &policy),
            Err(GameError::NotParticipant)
        );
    }

    #[test]
    fn test_move_kind_mismatch() {
        let (mut game, host, guest) = new_game(GameKind::Rps, Some(1.0));
        join(&mut game, &guest, &mut TableRng::new(0, 1, 1)).unwrap();
        assert!(matches!(
            submit_move(&mut game, &host, Play::Ttt(0), &Policy::default()),
            Err(GameError::InvalidMove(_))
        ));
    }

    #[test]
    fn test_restart_restakes() {
        let (mut game, host, guest) = new_game(GameKind::Rps, Some(10.0));
        join(&mut game, &guest, &mut TableRng::new(0, 1, 1)).unwrap();
        let policy = Policy::default();
        submit_move(&mut game, &host, Play::Rps(RpsMove::Rock), &policy).unwrap();
        let finished =
            submit_move(&mut game, &guest, Play::Rps(RpsMove::Scissors), &policy).unwrap();
        assert_eq!(net(&finished), 20.0);
        assert_eq!(game.table().winner.as_ref(), Some(&host));

        let mut rng = TableRng::new(0, 1, 2);
        let restarted = restart(&mut game, &guest, &mut rng).unwrap();
        assert_eq!(net(&restarted), -20.0);
        assert_eq!(game.status(), GameStatus::Active);
        assert_eq!(game.table().winner, None);
        assert_eq!(game.table().escrow.total(), 20.0);
        assert_eq!(
            restart(&mut game, &guest, &mut rng),
            Err(GameError::InvalidTransition {
                from: GameStatus::Active,
                action: "restart"
            })
        );
    }

    #[test]
    fn test_forfeit_waiting_refunds_host() {
        let (mut game, host, _) = new_game(GameKind::Ttt, Some(5.0));
        let transition = forfeit(&mut game, &host, ForfeitPolicy::AwardOpponent).unwrap();
        assert_eq!(game.status(), GameStatus::Cancelled);
        assert_eq!(
            transition.transfers,
            vec![Transfer {
                user: host.clone(),
                amount: 5.0
            }]
        );
        assert!(matches!(
            forfeit(&mut game, &host, ForfeitPolicy::Cancel),
            Err(GameError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_forfeit_policies() {
        for policy in [ForfeitPolicy::Cancel, ForfeitPolicy::AwardOpponent] {
            let (mut game, host, guest) = new_game(GameKind::Ttt, Some(5.0));
            join(&mut game, &guest, &mut TableRng::new(0, 1, 1)).unwrap();
            let transition = forfeit(&mut game, &host, policy).unwrap();
            assert_eq!(game.status(), GameStatus::Cancelled);
            assert_eq!(game.table().winner, None);
            assert_eq!(game.table().escrow.total(), 0.0);
            assert_eq!(net(&transition), 10.0);
            match policy {
                ForfeitPolicy::Cancel => {
                    assert_eq!(transition.change, GameChange::Cancelled { awarded: None });
                    assert_eq!(transition.transfers.len(), 2);
                }
                ForfeitPolicy::AwardOpponent => {
                    assert_eq!(
                        transition.change,
                        GameChange::Cancelled {
                            awarded: Some(guest.clone())
                        }
                    );
                    assert_eq!(transition.transfers.len(), 1);
                }
            }
            let Game::Ttt(ttt) = &game else {
                panic!("expected ttt");
            };
            assert_eq!(ttt.turn, None);
        }
    }
}
