use super::{check_amount, require_participant, restake, GameError, Transition};
use commonware_cryptography::ed25519::PublicKey;
use memento_types::{Game, GameChange, GameStatus, Proposal, RpsGame, Table, TttGame};

/// Propose/accept protocol for agreeing a stake once both players are seated.
///
/// Implementors only decide when the negotiation window is open.
pub trait BetNegotiable {
    fn table(&self) -> &Table;
    fn table_mut(&mut self) -> &mut Table;

    /// Whether the current round has not started yet.
    fn window_open(&self) -> bool;

    /// Records `amount` as the outstanding proposal, replacing any earlier one.
    fn propose_bet(&mut self, user: &PublicKey, amount: f64) -> Result<Transition, GameError> {
        let table = self.table();
        require_participant(table, user)?;
        if table.status != GameStatus::Active {
            return Err(GameError::BetRejected("game is not active"));
        }
        check_amount(amount)?;
        if !self.window_open() {
            return Err(GameError::BetRejected("round already started"));
        }
        self.table_mut().bet.proposal = Some(Proposal {
            amount,
            proposer: user.clone(),
        });
        Ok(Transition::new(GameChange::BetProposed { amount }))
    }

    /// Commits the other player's proposal and restakes both seats to it.
    fn accept_bet(&mut self, user: &PublicKey) -> Result<Transition, GameError> {
        let table = self.table();
        require_participant(table, user)?;
        if table.status != GameStatus::Active || !self.window_open() {
            return Err(GameError::BetRejected("negotiation closed"));
        }
        let amount = match &table.bet.proposal {
            None => return Err(GameError::BetRejected("no pending proposal")),
            Some(proposal) if &proposal.proposer == user => {
                return Err(GameError::BetRejected("cannot accept own proposal"))
            }
            Some(proposal) => proposal.amount,
        };

        let table = self.table_mut();
        table.bet.amount = Some(amount);
        table.bet.proposal = None;
        let mut transition = Transition::new(GameChange::BetAccepted { amount });
        restake(table, amount, &mut transition);
        Ok(transition)
    }
}

impl BetNegotiable for RpsGame {
    fn table(&self) -> &Table {
        &self.table
    }

    fn table_mut(&mut self) -> &mut Table {
        &mut self.table
    }

    fn window_open(&self) -> bool {
        self.host_move.is_none() && self.guest_move.is_none()
    }
}

impl BetNegotiable for TttGame {
    fn table(&self) -> &Table {
        &self.table
    }

    fn table_mut(&mut self) -> &mut Table {
        &mut self.table
    }

    fn window_open(&self) -> bool {
        self.board.is_empty()
    }
}

impl BetNegotiable for Game {
    fn table(&self) -> &Table {
        Game::table(self)
    }

    fn table_mut(&mut self) -> &mut Table {
        Game::table_mut(self)
    }

    fn window_open(&self) -> bool {
        match self {
            Game::Rps(game) => game.window_open(),
            Game::Ttt(game) => game.window_open(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        games::{create, join, TableRng},
        mocks::create_account_keypair,
    };
    use memento_types::{Board, GameKind, RpsMove, Symbol};

    fn active(kind: GameKind, bet: Option<f64>) -> (Game, PublicKey, PublicKey) {
        let (_, host) = create_account_keypair(1);
        let (_, guest) = create_account_keypair(2);
        let (mut game, _) = create(kind, Table::new(7, host.clone(), 0), bet).unwrap();
        join(&mut game, &guest, &mut TableRng::new(0, 7, 1)).unwrap();
        (game, host, guest)
    }

    #[test]
    fn test_propose_then_accept() {
        let (mut game, host, guest) = active(GameKind::Rps, None);
        game.propose_bet(&host, 50.0).unwrap();
        let transition = game.accept_bet(&guest).unwrap();

        let table = BetNegotiable::table(&game);
        assert_eq!(table.bet.amount, Some(50.0));
        assert_eq!(table.bet.proposal, None);
        assert_eq!(table.status, GameStatus::Active);
        assert_eq!(table.escrow.host, 50.0);
        assert_eq!(table.escrow.guest, 50.0);
        assert_eq!(transition.change, GameChange::BetAccepted { amount: 50.0 });
        assert_eq!(transition.transfers.len(), 2);
        let Game::Rps(rps) = &game else {
            panic!("expected rps");
        };
        assert_eq!(rps.host_move, None);
        assert_eq!(rps.guest_move, None);
    }

    #[test]
    fn test_accept_without_proposal() {
        let (mut game, _, guest) = active(GameKind::Ttt, None);
        assert_eq!(
            game.accept_bet(&guest),
            Err(GameError::BetRejected("no pending proposal"))
        );
    }

    #[test]
    fn test_accept_own_proposal() {
        let (mut game, host, _) = active(GameKind::Ttt, None);
        game.propose_bet(&host, 10.0).unwrap();
        assert_eq!(
            game.accept_bet(&host),
            Err(GameError::BetRejected("cannot accept own proposal"))
        );
    }

    #[test]
    fn test_counter_offer_overwrites() {
        let (mut game, host, guest) = active(GameKind::Rps, None);
        game.propose_bet(&host, 10.0).unwrap();
        game.propose_bet(&guest, 30.0).unwrap();
        let proposal = BetNegotiable::table(&game).bet.proposal.clone().unwrap();
        assert_eq!(proposal.amount, 30.0);
        assert_eq!(proposal.proposer, guest);

        // The original proposer accepts the counter-offer.
        game.accept_bet(&host).unwrap();
        assert_eq!(BetNegotiable::table(&game).bet.amount, Some(30.0));
    }

    #[test]
    fn test_renegotiate_refunds_difference() {
        let (mut game, host, guest) = active(GameKind::Rps, Some(40.0));
        game.propose_bet(&guest, 15.0).unwrap();
        let transition = game.accept_bet(&host).unwrap();
        assert!(transition.transfers.iter().all(|t| t.amount == 25.0));
        assert_eq!(BetNegotiable::table(&game).escrow.total(), 30.0);
    }

    #[test]
    fn test_window_closes() {
        let (mut game, host, _) = active(GameKind::Rps, Some(5.0));
        if let Game::Rps(rps) = &mut game {
            rps.guest_move = Some(RpsMove::Rock);
        }
        assert_eq!(
            game.propose_bet(&host, 10.0),
            Err(GameError::BetRejected("round already started"))
        );

        let (mut game, host, _) = active(GameKind::Ttt, Some(5.0));
        if let Game::Ttt(ttt) = &mut game {
            let mut board = Board::default();
            board.place(0, Symbol::X);
            ttt.board = board;
        }
        assert!(game.propose_bet(&host, 10.0).is_err());
    }

    #[test]
    fn test_invalid_amounts() {
        let (mut game, host, _) = active(GameKind::Rps, None);
        for amount in [0.0, -3.0, f64::INFINITY] {
            assert_eq!(game.propose_bet(&host, amount), Err(GameError::InvalidAmount));
        }
    }

    #[test]
    fn test_waiting_game_rejects_proposal() {
        let (_, host) = create_account_keypair(1);
        let (mut game, _) = create(GameKind::Rps, Table::new(1, host.clone(), 0), None).unwrap();
        assert!(matches!(
            game.propose_bet(&host, 5.0),
            Err(GameError::BetRejected(_))
        ));
    }
}
