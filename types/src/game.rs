use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};
use commonware_cryptography::ed25519::PublicKey;
use std::{fmt, str::FromStr};

use crate::{
    opt_f64_encode_size, opt_string_encode_size, read_f64, read_opt_f64, read_opt_string,
    write_f64, write_opt_f64, write_opt_string, BOARD_CELLS, F64_SIZE, JOIN_CODE_LENGTH,
};

/// Failure to parse a textual game field.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown game status: {0}")]
    Status(String),
    #[error("unknown move: {0}")]
    Move(String),
    #[error("invalid board: {0}")]
    Board(String),
}

/// Game room variants
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GameKind {
    Rps = 0,
    Ttt = 1,
}

impl Write for GameKind {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for GameKind {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(Self::Rps),
            1 => Ok(Self::Ttt),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl FixedSize for GameKind {
    const SIZE: usize = 1;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GameStatus {
    /// Host is seated, no guest yet.
    Waiting = 0,
    /// Both players seated; negotiating or playing.
    Active = 1,
    /// Round resolved. May be restarted.
    Finished = 2,
    /// Terminal.
    Cancelled = 3,
}

impl GameStatus {
    /// Waiting and active games hold their players.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Waiting | Self::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Finished => "finished",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for GameStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            // Older rows use "playing" for a seated game.
            "active" | "playing" => Ok(Self::Active),
            "finished" => Ok(Self::Finished),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ParseError::Status(other.to_string())),
        }
    }
}

impl Write for GameStatus {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for GameStatus {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(Self::Waiting),
            1 => Ok(Self::Active),
            2 => Ok(Self::Finished),
            3 => Ok(Self::Cancelled),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl FixedSize for GameStatus {
    const SIZE: usize = 1;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RpsMove {
    Rock = 0,
    Paper = 1,
    Scissors = 2,
}

impl RpsMove {
    pub const ALL: [RpsMove; 3] = [RpsMove::Rock, RpsMove::Paper, RpsMove::Scissors];

    /// Rock > Scissors > Paper > Rock.
    pub fn beats(self, other: RpsMove) -> bool {
        matches!(
            (self, other),
            (Self::Rock, Self::Scissors) | (Self::Scissors, Self::Paper) | (Self::Paper, Self::Rock)
        )
    }
}

impl FromStr for RpsMove {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rock" => Ok(Self::Rock),
            "paper" => Ok(Self::Paper),
            "scissors" => Ok(Self::Scissors),
            _ => Err(ParseError::Move(s.to_string())),
        }
    }
}

impl Write for RpsMove {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for RpsMove {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(Self::Rock),
            1 => Ok(Self::Paper),
            2 => Ok(Self::Scissors),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl FixedSize for RpsMove {
    const SIZE: usize = 1;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Symbol {
    X = 1,
    O = 2,
}

impl Symbol {
    pub fn other(self) -> Self {
        match self {
            Self::X => Self::O,
            Self::O => Self::X,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::X => 'X',
            Self::O => 'O',
        }
    }
}

impl Write for Symbol {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for Symbol {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            1 => Ok(Self::X),
            2 => Ok(Self::O),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl FixedSize for Symbol {
    const SIZE: usize = 1;
}

/// Tic-tac-toe board, row-major. Renders as 9 chars over `X`, `O`, `_`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Board([Option<Symbol>; BOARD_CELLS]);

impl Board {
    pub fn get(&self, cell: usize) -> Option<Symbol> {
        self.0.get(cell).copied().flatten()
    }

    /// Returns false if the cell is out of range or already taken.
    pub fn place(&mut self, cell: usize, symbol: Symbol) -> bool {
        match self.0.get_mut(cell) {
            Some(slot @ None) => {
                *slot = Some(symbol);
                true
            }
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    pub fn is_full(&self) -> bool {
        self.0.iter().all(Option::is_some)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cell in &self.0 {
            let c = cell.map_or('_', Symbol::as_char);
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl FromStr for Board {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != BOARD_CELLS {
            return Err(ParseError::Board(s.to_string()));
        }
        let mut board = Board::default();
        for (i, c) in chars.into_iter().enumerate() {
            board.0[i] = match c {
                'X' => Some(Symbol::X),
                'O' => Some(Symbol::O),
                '_' => None,
                _ => return Err(ParseError::Board(s.to_string())),
            };
        }
        Ok(board)
    }
}

impl Write for Board {
    fn write(&self, writer: &mut impl BufMut) {
        for cell in &self.0 {
            cell.map_or(0u8, |s| s as u8).write(writer);
        }
    }
}

impl Read for Board {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let mut board = Board::default();
        for slot in board.0.iter_mut() {
            *slot = match u8::read(reader)? {
                0 => None,
                1 => Some(Symbol::X),
                2 => Some(Symbol::O),
                i => return Err(Error::InvalidEnum(i)),
            };
        }
        Ok(board)
    }
}

impl FixedSize for Board {
    const SIZE: usize = BOARD_CELLS;
}

/// A counter-offer waiting on the other player.
#[derive(Clone, Debug, PartialEq)]
pub struct Proposal {
    pub amount: f64,
    pub proposer: PublicKey,
}

/// Stake agreed for the round plus at most one outstanding proposal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BetTerms {
    pub amount: Option<f64>,
    pub proposal: Option<Proposal>,
}

impl Write for BetTerms {
    fn write(&self, writer: &mut impl BufMut) {
        write_opt_f64(self.amount, writer);
        match &self.proposal {
            Some(proposal) => {
                true.write(writer);
                write_f64(proposal.amount, writer);
                proposal.proposer.write(writer);
            }
            None => false.write(writer),
        }
    }
}

impl Read for BetTerms {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let amount = read_opt_f64(reader)?;
        let proposal = if bool::read(reader)? {
            Some(Proposal {
                amount: read_f64(reader)?,
                proposer: PublicKey::read(reader)?,
            })
        } else {
            None
        };
        Ok(Self { amount, proposal })
    }
}

impl EncodeSize for BetTerms {
    fn encode_size(&self) -> usize {
        opt_f64_encode_size(self.amount)
            + bool::SIZE
            + self
                .proposal
                .as_ref()
                .map_or(0, |_| F64_SIZE + PublicKey::SIZE)
    }
}

/// MMC currently held by the table on behalf of each seat.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Escrow {
    pub host: f64,
    pub guest: f64,
}

impl Escrow {
    pub fn total(&self) -> f64 {
        self.host + self.guest
    }
}

impl Write for Escrow {
    fn write(&self, writer: &mut impl BufMut) {
        write_f64(self.host, writer);
        write_f64(self.guest, writer);
    }
}

impl Read for Escrow {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            host: read_f64(reader)?,
            guest: read_f64(reader)?,
        })
    }
}

impl FixedSize for Escrow {
    const SIZE: usize = 2 * F64_SIZE;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Seat {
    Host,
    Guest,
}

/// State shared by every two-player game room.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub id: u64,
    pub host: PublicKey,
    pub guest: Option<PublicKey>,
    pub status: GameStatus,
    pub winner: Option<PublicKey>,
    pub bet: BetTerms,
    pub escrow: Escrow,
    pub code: Option<String>,
    pub is_private: bool,
    pub created_at: u64,
    pub expires_at: Option<u64>,
}

impl Table {
    pub fn new(id: u64, host: PublicKey, created_at: u64) -> Self {
        Self {
            id,
            host,
            guest: None,
            status: GameStatus::Waiting,
            winner: None,
            bet: BetTerms::default(),
            escrow: Escrow::default(),
            code: None,
            is_private: false,
            created_at,
            expires_at: None,
        }
    }

    pub fn seat(&self, user: &PublicKey) -> Option<Seat> {
        if &self.host == user {
            Some(Seat::Host)
        } else if self.guest.as_ref() == Some(user) {
            Some(Seat::Guest)
        } else {
            None
        }
    }

    pub fn player(&self, seat: Seat) -> Option<&PublicKey> {
        match seat {
            Seat::Host => Some(&self.host),
            Seat::Guest => self.guest.as_ref(),
        }
    }

    pub fn opponent(&self, user: &PublicKey) -> Option<&PublicKey> {
        match self.seat(user)? {
            Seat::Host => self.guest.as_ref(),
            Seat::Guest => Some(&self.host),
        }
    }

    /// Host first, then guest if seated.
    pub fn players(&self) -> impl Iterator<Item = &PublicKey> {
        std::iter::once(&self.host).chain(self.guest.as_ref())
    }
}

impl Write for Table {
    fn write(&self, writer: &mut impl BufMut) {
        self.id.write(writer);
        self.host.write(writer);
        self.guest.write(writer);
        self.status.write(writer);
        self.winner.write(writer);
        self.bet.write(writer);
        self.escrow.write(writer);
        write_opt_string(&self.code, writer);
        self.is_private.write(writer);
        self.created_at.write(writer);
        self.expires_at.write(writer);
    }
}

impl Read for Table {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            id: u64::read(reader)?,
            host: PublicKey::read(reader)?,
            guest: Option::<PublicKey>::read(reader)?,
            status: GameStatus::read(reader)?,
            winner: Option::<PublicKey>::read(reader)?,
            bet: BetTerms::read(reader)?,
            escrow: Escrow::read(reader)?,
            code: read_opt_string(reader, JOIN_CODE_LENGTH)?,
            is_private: bool::read(reader)?,
            created_at: u64::read(reader)?,
            expires_at: Option::<u64>::read(reader)?,
        })
    }
}

impl EncodeSize for Table {
    fn encode_size(&self) -> usize {
        self.id.encode_size()
            + self.host.encode_size()
            + self.guest.encode_size()
            + self.status.encode_size()
            + self.winner.encode_size()
            + self.bet.encode_size()
            + self.escrow.encode_size()
            + opt_string_encode_size(&self.code)
            + self.is_private.encode_size()
            + self.created_at.encode_size()
            + self.expires_at.encode_size()
    }
}

/// Rock-paper-scissors room. Moves are hidden until both are in.
#[derive(Clone, Debug, PartialEq)]
pub struct RpsGame {
    pub table: Table,
    pub host_move: Option<RpsMove>,
    pub guest_move: Option<RpsMove>,
}

impl RpsGame {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            host_move: None,
            guest_move: None,
        }
    }

    pub fn move_of(&self, seat: Seat) -> Option<RpsMove> {
        match seat {
            Seat::Host => self.host_move,
            Seat::Guest => self.guest_move,
        }
    }
}

impl Write for RpsGame {
    fn write(&self, writer: &mut impl BufMut) {
        self.table.write(writer);
        self.host_move.write(writer);
        self.guest_move.write(writer);
    }
}

impl Read for RpsGame {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            table: Table::read(reader)?,
            host_move: Option::<RpsMove>::read(reader)?,
            guest_move: Option::<RpsMove>::read(reader)?,
        })
    }
}

impl EncodeSize for RpsGame {
    fn encode_size(&self) -> usize {
        self.table.encode_size() + self.host_move.encode_size() + self.guest_move.encode_size()
    }
}

/// Tic-tac-toe room. `round` starts at 1 and grows on every restart.
#[derive(Clone, Debug, PartialEq)]
pub struct TttGame {
    pub table: Table,
    pub host_symbol: Option<Symbol>,
    pub guest_symbol: Option<Symbol>,
    pub board: Board,
    pub turn: Option<PublicKey>,
    pub round: u32,
}

impl TttGame {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            host_symbol: None,
            guest_symbol: None,
            board: Board::default(),
            turn: None,
            round: 1,
        }
    }

    pub fn symbol_of(&self, user: &PublicKey) -> Option<Symbol> {
        match self.table.seat(user)? {
            Seat::Host => self.host_symbol,
            Seat::Guest => self.guest_symbol,
        }
    }

    pub fn player_with(&self, symbol: Symbol) -> Option<&PublicKey> {
        if self.host_symbol == Some(symbol) {
            Some(&self.table.host)
        } else if self.guest_symbol == Some(symbol) {
            self.table.guest.as_ref()
        } else {
            None
        }
    }
}

impl Write for TttGame {
    fn write(&self, writer: &mut impl BufMut) {
        self.table.write(writer);
        self.host_symbol.write(writer);
        self.guest_symbol.write(writer);
        self.board.write(writer);
        self.turn.write(writer);
        self.round.write(writer);
    }
}

impl Read for TttGame {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            table: Table::read(reader)?,
            host_symbol: Option::<Symbol>::read(reader)?,
            guest_symbol: Option::<Symbol>::read(reader)?,
            board: Board::read(reader)?,
            turn: Option::<PublicKey>::read(reader)?,
            round: u32::read(reader)?,
        })
    }
}

impl EncodeSize for TttGame {
    fn encode_size(&self) -> usize {
        self.table.encode_size()
            + self.host_symbol.encode_size()
            + self.guest_symbol.encode_size()
            + self.board.encode_size()
            + self.turn.encode_size()
            + self.round.encode_size()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Game {
    Rps(RpsGame),
    Ttt(TttGame),
}

impl Game {
    pub fn table(&self) -> &Table {
        match self {
            Self::Rps(game) => &game.table,
            Self::Ttt(game) => &game.table,
        }
    }

    pub fn table_mut(&mut self) -> &mut Table {
        match self {
            Self::Rps(game) => &mut game.table,
            Self::Ttt(game) => &mut game.table,
        }
    }

    pub fn id(&self) -> u64 {
        self.table().id
    }

    pub fn kind(&self) -> GameKind {
        match self {
            Self::Rps(_) => GameKind::Rps,
            Self::Ttt(_) => GameKind::Ttt,
        }
    }

    pub fn status(&self) -> GameStatus {
        self.table().status
    }
}

impl Write for Game {
    fn write(&self, writer: &mut impl BufMut) {
        self.kind().write(writer);
        match self {
            Self::Rps(game) => game.write(writer),
            Self::Ttt(game) => game.write(writer),
        }
    }
}

impl Read for Game {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match GameKind::read(reader)? {
            GameKind::Rps => Ok(Self::Rps(RpsGame::read(reader)?)),
            GameKind::Ttt => Ok(Self::Ttt(TttGame::read(reader)?)),
        }
    }
}

impl EncodeSize for Game {
    fn encode_size(&self) -> usize {
        GameKind::SIZE
            + match self {
                Self::Rps(game) => game.encode_size(),
                Self::Ttt(game) => game.encode_size(),
            }
    }
}
