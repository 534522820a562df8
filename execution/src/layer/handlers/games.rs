use super::super::*;
use super::normalize_code;
use crate::{
    games::{self, BetNegotiable, TableRng, Transfer, Transition},
    state::{game_index, open_game},
};
use memento_types::{Game, GameKind, GameStatus, Play, Table};
use tracing::info;

/// Fresh draws tried before giving up on finding an unused join code.
const JOIN_CODE_ATTEMPTS: usize = 16;

fn round_of(game: &Game) -> u32 {
    match game {
        Game::Rps(_) => 0,
        Game::Ttt(ttt) => ttt.round,
    }
}

impl<'a, S: Store> Layer<'a, S> {
    // === Game Room Helpers ===

    async fn load_game(&self, id: u64) -> Result<Game, Error> {
        crate::state::game(self, id)
            .await
            .ok_or(Error::NotFound(Key::Game(id)))
    }

    async fn apply_transfers(&mut self, transfers: &[Transfer]) -> Result<(), Error> {
        for transfer in transfers {
            self.adjust_balance(&transfer.user, Currency::Mmc, transfer.amount)
                .await?;
        }
        Ok(())
    }

    /// Points `user` at game `id`, unless they are already seated elsewhere.
    async fn claim_seat(&mut self, user: &PublicKey, id: u64) -> Result<(), Error> {
        if let Some(open) = open_game(self, user).await {
            if open.id() != id {
                return Err(Error::AlreadyInGame);
            }
        }
        self.insert(Key::OpenGame(user.clone()), Value::GameId(id));
        Ok(())
    }

    async fn release_seat(&mut self, user: &PublicKey, id: u64) {
        let key = Key::OpenGame(user.clone());
        if let Some(Value::GameId(open)) = self.get(&key).await {
            if open == id {
                self.remove(key);
            }
        }
    }

    /// Drops a game from the lobby listing and retires its join code.
    async fn close_lobby(&mut self, table: &Table) {
        if table.is_private {
            if let Some(code) = &table.code {
                self.remove(Key::GameCode(code.clone()));
            }
            return;
        }
        let mut ids = game_index(self).await;
        let before = ids.len();
        ids.retain(|id| *id != table.id);
        if ids.len() != before {
            self.insert(Key::WaitingGames, Value::GameIndex(ids));
        }
    }

    /// Persists the game, moves stakes and reports the change.
    async fn settle(&mut self, game: Game, transition: Transition) -> Result<Vec<Event>, Error> {
        self.apply_transfers(&transition.transfers).await?;
        let table = game.table().clone();
        if !table.status.is_open() {
            for player in table.players() {
                self.release_seat(player, table.id).await;
            }
        }
        self.insert(Key::Game(table.id), Value::Game(game.clone()));
        Ok(vec![Event::GameUpdated {
            game,
            change: transition.change,
        }])
    }

    async fn unused_join_code(&mut self, id: u64) -> Result<String, Error> {
        let mut rng = TableRng::new(self.entropy, id, 0);
        for _ in 0..JOIN_CODE_ATTEMPTS {
            let code = rng.join_code();
            if self.get(&Key::GameCode(code.clone())).await.is_none() {
                return Ok(code);
            }
        }
        Err(Error::InvalidInput("no unused join code"))
    }

    // === Game Room Handlers ===

    pub(in crate::layer) async fn handle_create_game(
        &mut self,
        public: &PublicKey,
        kind: GameKind,
        bet: Option<f64>,
        private: bool,
    ) -> Result<Vec<Event>, Error> {
        if open_game(self, public).await.is_some() {
            return Err(Error::AlreadyInGame);
        }
        let id = self.next_id(Key::NextGameId).await;
        let mut table = Table::new(id, public.clone(), self.now);
        table.expires_at = self.policy.game_ttl.map(|ttl| self.now.saturating_add(ttl));
        if private {
            let code = self.unused_join_code(id).await?;
            self.insert(Key::GameCode(code.clone()), Value::GameId(id));
            table.code = Some(code);
            table.is_private = true;
        } else {
            let mut ids = game_index(self).await;
            ids.push(id);
            self.insert(Key::WaitingGames, Value::GameIndex(ids));
        }

        let (game, transition) = games::create(kind, table, bet)?;
        self.claim_seat(public, id).await?;
        info!(game = id, ?kind, private, "game created");
        self.settle(game, transition).await
    }

    pub(in crate::layer) async fn handle_join_game(
        &mut self,
        public: &PublicKey,
        id: u64,
    ) -> Result<Vec<Event>, Error> {
        let game = self.load_game(id).await?;
        // Private rooms are only reachable through their join code.
        if game.table().is_private {
            return Err(Error::GameNotJoinable);
        }
        self.seat_guest(public, game).await
    }

    async fn seat_guest(
        &mut self,
        public: &PublicKey,
        mut game: Game,
    ) -> Result<Vec<Event>, Error> {
        let id = game.id();
        let mut rng = TableRng::new(self.entropy, id, round_of(&game));
        let transition = games::join(&mut game, public, &mut rng)?;
        self.claim_seat(public, id).await?;
        self.close_lobby(game.table()).await;
        info!(game = id, "game joined");
        self.settle(game, transition).await
    }

    pub(in crate::layer) async fn handle_join_by_code(
        &mut self,
        public: &PublicKey,
        code: &str,
    ) -> Result<Vec<Event>, Error> {
        let key = Key::GameCode(normalize_code(code)?);
        let id = match self.get(&key).await {
            Some(Value::GameId(id)) => id,
            _ => return Err(Error::NotFound(key)),
        };
        let game = self.load_game(id).await?;
        self.seat_guest(public, game).await
    }

    pub(in crate::layer) async fn handle_propose_bet(
        &mut self,
        public: &PublicKey,
        id: u64,
        amount: f64,
    ) -> Result<Vec<Event>, Error> {
        let mut game = self.load_game(id).await?;
        let transition = game.propose_bet(public, amount)?;
        self.settle(game, transition).await
    }

    pub(in crate::layer) async fn handle_accept_bet(
        &mut self,
        public: &PublicKey,
        id: u64,
    ) -> Result<Vec<Event>, Error> {
        let mut game = self.load_game(id).await?;
        let transition = game.accept_bet(public)?;
        self.settle(game, transition).await
    }

    pub(in crate::layer) async fn handle_submit_move(
        &mut self,
        public: &PublicKey,
        id: u64,
        play: Play,
    ) -> Result<Vec<Event>, Error> {
        let mut game = self.load_game(id).await?;
        let transition = games::submit_move(&mut game, public, play, &self.policy)?;
        if game.status() == GameStatus::Finished {
            info!(game = id, change = ?transition.change, "game finished");
        }
        self.settle(game, transition).await
    }

    pub(in crate::layer) async fn handle_restart(
        &mut self,
        public: &PublicKey,
        id: u64,
    ) -> Result<Vec<Event>, Error> {
        let mut game = self.load_game(id).await?;
        let mut rng = TableRng::new(self.entropy, id, round_of(&game).saturating_add(1));
        let transition = games::restart(&mut game, public, &mut rng)?;
        let players: Vec<PublicKey> = game.table().players().cloned().collect();
        for player in &players {
            self.claim_seat(player, id).await?;
        }
        self.settle(game, transition).await
    }

    pub(in crate::layer) async fn handle_forfeit(
        &mut self,
        public: &PublicKey,
        id: u64,
    ) -> Result<Vec<Event>, Error> {
        let mut game = self.load_game(id).await?;
        let waiting = game.status() == GameStatus::Waiting;
        let transition = games::forfeit(&mut game, public, self.policy.forfeit)?;
        if waiting {
            self.close_lobby(game.table()).await;
        }
        info!(game = id, "game cancelled");
        self.settle(game, transition).await
    }
}
