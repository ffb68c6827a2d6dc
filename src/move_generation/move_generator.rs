//! Rules-engine contract consumed by the game loop and search.
//!
//! Legal-move generation and move execution are delegated to `shakmaty`;
//! everything above this seam only sees `ChessMove` values and opaque
//! `Chess` boards.

use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position};

use crate::errors::{ChessError, ChessResult};
use crate::game_state::chess_types::ChessMove;

pub trait RulesEngine: Send + Sync {
    /// Legal moves of the side to move, in generation order.
    fn legal_moves(&self, board: &Chess) -> Vec<ChessMove>;

    /// Returns the board after `mv`; fails if `mv` is not legal on `board`.
    fn execute(&self, board: &Chess, mv: &ChessMove) -> ChessResult<Chess>;
}

/// Standard chess rules backed by `shakmaty`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRules;

impl RulesEngine for StandardRules {
    fn legal_moves(&self, board: &Chess) -> Vec<ChessMove> {
        let side = board.turn();
        board
            .legal_moves()
            .into_iter()
            .map(|m| ChessMove::new(side, m))
            .collect()
    }

    fn execute(&self, board: &Chess, mv: &ChessMove) -> ChessResult<Chess> {
        let inner = mv
            .inner()
            .ok_or_else(|| ChessError::IllegalMove(mv.uci()))?;
        if mv.side() != board.turn() || !board.is_legal(inner) {
            return Err(ChessError::IllegalMove(mv.uci()));
        }
        let mut next = board.clone();
        next.play_unchecked(inner);
        Ok(next)
    }
}

pub fn parse_fen(fen: &str) -> ChessResult<Chess> {
    let parsed: Fen = fen.parse().map_err(|e: shakmaty::fen::ParseFenError| {
        ChessError::InvalidFen {
            fen: fen.to_owned(),
            reason: e.to_string(),
        }
    })?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| ChessError::InvalidFen {
            fen: fen.to_owned(),
            reason: e.to_string(),
        })
}

pub fn board_fen(board: &Chess) -> String {
    Fen::from_position(board, EnPassantMode::Legal).to_string()
}

/// Finds the legal move whose canonical text is `uci`.
pub fn find_legal_move(rules: &dyn RulesEngine, board: &Chess, uci: &str) -> Option<ChessMove> {
    rules.legal_moves(board).into_iter().find(|m| m.uci() == uci)
}
