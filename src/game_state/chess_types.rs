//! Move and status value types shared by the encoder, search and game loop.
//!
//! Board representation is delegated to `shakmaty`; this module wraps its
//! `Move` with the allegiance of the side that played it and gives every move
//! a stable canonical string (UCI, castling as a king move).

use std::fmt;

use shakmaty::{CastlingMode, Move, Role, Square};

pub use shakmaty::Color;

/// Canonical text of the synthetic history entry seeded at game start.
pub const INIT_MOVE_TEXT: &str = "init";

/// An immutable move record tagged with the side that played it.
///
/// `mv == None` is the synthetic "init" entry used to seed the position
/// history before any real move has been played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChessMove {
    side: Color,
    mv: Option<Move>,
}

impl ChessMove {
    #[inline]
    pub fn new(side: Color, mv: Move) -> Self {
        Self { side, mv: Some(mv) }
    }

    #[inline]
    pub fn init(side: Color) -> Self {
        Self { side, mv: None }
    }

    #[inline]
    pub fn is_init(&self) -> bool {
        self.mv.is_none()
    }

    #[inline]
    pub fn side(&self) -> Color {
        self.side
    }

    #[inline]
    pub fn inner(&self) -> Option<Move> {
        self.mv
    }

    #[inline]
    pub fn from_square(&self) -> Option<Square> {
        self.mv.and_then(|m| m.from())
    }

    /// Destination square; for castling this is the king's target square.
    pub fn to_square(&self) -> Option<Square> {
        let m = self.mv?;
        match m.castling_side() {
            Some(side) => Some(side.king_to(self.side)),
            None => Some(m.to()),
        }
    }

    #[inline]
    pub fn moved_role(&self) -> Option<Role> {
        self.mv.map(|m| m.role())
    }

    /// Role of the piece removed by this move, if any.
    #[inline]
    pub fn captured(&self) -> Option<Role> {
        self.mv.and_then(|m| m.capture())
    }

    #[inline]
    pub fn is_castle(&self) -> bool {
        self.mv.is_some_and(|m| m.is_castle())
    }

    #[inline]
    pub fn is_en_passant(&self) -> bool {
        self.mv.is_some_and(|m| m.is_en_passant())
    }

    #[inline]
    pub fn promotion(&self) -> Option<Role> {
        self.mv.and_then(|m| m.promotion())
    }

    /// True for captures and pawn moves, which reset the no-progress counter.
    #[inline]
    pub fn is_zeroing(&self) -> bool {
        self.mv.is_some_and(|m| m.is_zeroing())
    }

    /// Stable canonical form used for legality checks, hashing and
    /// duplicate detection.
    pub fn uci(&self) -> String {
        match self.mv {
            Some(m) => m.to_uci(CastlingMode::Standard).to_string(),
            None => INIT_MOVE_TEXT.to_owned(),
        }
    }

    /// Canonical string equality, ignoring everything else.
    #[inline]
    pub fn same_text(&self, other: &ChessMove) -> bool {
        self.uci() == other.uci()
    }
}

impl fmt::Display for ChessMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uci())
    }
}

/// Lower-case side name used in logs and hash strings.
#[inline]
pub fn side_name(color: Color) -> &'static str {
    match color {
        Color::White => "white",
        Color::Black => "black",
    }
}

/// Game lifecycle status. Anything but `InProgress` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameStatus {
    InProgress,
    Stalemate,
    /// White is checkmated; Black won.
    WhiteMated,
    /// Black is checkmated; White won.
    BlackMated,
    DrawBy50Moves,
    DrawByRepetition,
    DrawBy300Plies,
    DrawInsufficientMaterial,
}

impl GameStatus {
    #[inline]
    pub fn is_terminal(self) -> bool {
        self != GameStatus::InProgress
    }

    /// PGN result token for this status.
    pub fn result_token(self) -> &'static str {
        match self {
            GameStatus::InProgress => "*",
            GameStatus::WhiteMated => "0-1",
            GameStatus::BlackMated => "1-0",
            _ => "1/2-1/2",
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            GameStatus::InProgress => "IN_PROGRESS",
            GameStatus::Stalemate => "STALEMATE",
            GameStatus::WhiteMated => "WHITE_MATED",
            GameStatus::BlackMated => "BLACK_MATED",
            GameStatus::DrawBy50Moves => "DRAW_BY_50_MOVES",
            GameStatus::DrawByRepetition => "DRAW_BY_REPETITION",
            GameStatus::DrawBy300Plies => "DRAW_BY_300_PLIES",
            GameStatus::DrawInsufficientMaterial => "DRAW_INSUFFICIENT_MATERIAL",
        };
        f.write_str(text)
    }
}
