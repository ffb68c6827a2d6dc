//! Game record owned by the game controller.
//!
//! `GameState` holds the current board, the board the game started from, the
//! ordered move list and the counters behind the draw rules. It is mutated
//! once per ply and becomes terminal when `status` leaves `InProgress`.

use std::collections::HashMap;
use std::fmt;

use shakmaty::zobrist::Zobrist64;
use shakmaty::{Chess, Color, EnPassantMode, Position};

use crate::errors::ChessResult;
use crate::game_state::chess_rules::{
    MAX_GAME_PLIES, NO_PROGRESS_PLY_LIMIT, REPETITION_LIMIT, STARTING_POSITION_FEN,
};
use crate::game_state::chess_types::{ChessMove, GameStatus};
use crate::move_generation::move_generator::{board_fen, parse_fen};

#[derive(Debug, Clone)]
pub struct GameState {
    board: Chess,
    initial_board: Chess,
    move_history: Vec<ChessMove>,
    status: GameStatus,
    // occurrences per position (placement, side, castling, en passant)
    repetitions: HashMap<u64, u32>,
    no_progress_plies: u32,
    // boards applied so far; runs ahead of move_history while a ply is recorded
    plies_played: usize,
}

#[inline]
fn position_id(board: &Chess) -> u64 {
    board.zobrist_hash::<Zobrist64>(EnPassantMode::Legal).0
}

impl Default for GameState {
    fn default() -> Self {
        Self::new_game()
    }
}

impl GameState {
    pub fn new_game() -> Self {
        Self::from_board(Chess::default())
    }

    pub fn from_fen(fen: &str) -> ChessResult<Self> {
        Ok(Self::from_board(parse_fen(fen)?))
    }

    pub fn from_board(board: Chess) -> Self {
        let mut repetitions = HashMap::new();
        repetitions.insert(position_id(&board), 1);
        let no_progress_plies = board.halfmoves();
        let mut state = Self {
            initial_board: board.clone(),
            board,
            move_history: Vec::new(),
            status: GameStatus::InProgress,
            repetitions,
            no_progress_plies,
            plies_played: 0,
        };
        state.status = state.calculate_status();
        state
    }

    #[inline]
    pub fn board(&self) -> &Chess {
        &self.board
    }

    #[inline]
    pub fn initial_board(&self) -> &Chess {
        &self.initial_board
    }

    #[inline]
    pub fn move_history(&self) -> &[ChessMove] {
        &self.move_history
    }

    #[inline]
    pub fn last_move(&self) -> Option<&ChessMove> {
        self.move_history.last()
    }

    #[inline]
    pub fn status(&self) -> GameStatus {
        self.status
    }

    #[inline]
    pub fn active_side(&self) -> Color {
        self.board.turn()
    }

    #[inline]
    pub fn ply_count(&self) -> usize {
        self.move_history.len()
    }

    #[inline]
    pub fn no_progress_plies(&self) -> u32 {
        self.no_progress_plies
    }

    /// Occurrences of the current position so far, including this one.
    pub fn repetition_count(&self) -> u32 {
        self.repetitions
            .get(&position_id(&self.board))
            .copied()
            .unwrap_or(0)
    }

    pub fn fen(&self) -> String {
        board_fen(&self.board)
    }

    pub fn starts_from_standard_position(&self) -> bool {
        board_fen(&self.initial_board) == STARTING_POSITION_FEN
    }

    /// Installs the board reached by `mv` and updates the draw counters.
    pub(crate) fn apply_board(&mut self, next: Chess, mv: &ChessMove) {
        if mv.is_zeroing() {
            self.no_progress_plies = 0;
        } else {
            self.no_progress_plies += 1;
        }
        *self.repetitions.entry(position_id(&next)).or_insert(0) += 1;
        self.plies_played += 1;
        self.board = next;
    }

    pub(crate) fn set_status(&mut self, status: GameStatus) {
        self.status = status;
    }

    pub(crate) fn push_move(&mut self, mv: ChessMove) {
        self.move_history.push(mv);
    }

    /// Terminal status of the current board, checked in rule order:
    /// mate, stalemate, insufficient material, no-progress limit,
    /// repetition, game-length limit.
    pub fn calculate_status(&self) -> GameStatus {
        let board = &self.board;
        if board.is_checkmate() {
            return match board.turn() {
                Color::White => GameStatus::WhiteMated,
                Color::Black => GameStatus::BlackMated,
            };
        }
        if board.is_stalemate() {
            return GameStatus::Stalemate;
        }
        if board.is_insufficient_material() {
            return GameStatus::DrawInsufficientMaterial;
        }
        if self.no_progress_plies >= NO_PROGRESS_PLY_LIMIT {
            return GameStatus::DrawBy50Moves;
        }
        if self.repetition_count() >= REPETITION_LIMIT {
            return GameStatus::DrawByRepetition;
        }
        if self.plies_played >= MAX_GAME_PLIES {
            return GameStatus::DrawBy300Plies;
        }
        GameStatus::InProgress
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let moves: Vec<String> = self.move_history.iter().map(|m| m.uci()).collect();
        writeln!(f, "GAME STATUS: {}", self.status)?;
        writeln!(f, "MOVES: {}", moves.join(","))?;
        writeln!(f, "PLIES: {}", self.move_history.len())?;
        writeln!(
            f,
            "REPETITION: {}  |  NO PROGRESS: {}",
            self.repetition_count(),
            self.no_progress_plies
        )?;
        write!(f, "FEN: {}", self.fen())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::move_generation::move_generator::{find_legal_move, RulesEngine, StandardRules};

    fn advance(state: &mut GameState, uci: &str) {
        let mv = find_legal_move(&StandardRules, state.board(), uci).expect("legal");
        let next = StandardRules.execute(state.board(), &mv).expect("execute");
        state.apply_board(next, &mv);
        let status = state.calculate_status();
        state.set_status(status);
        state.push_move(mv);
    }

    #[test]
    fn new_game_is_in_progress() {
        let state = GameState::new_game();
        assert_eq!(state.status(), GameStatus::InProgress);
        assert_eq!(state.active_side(), Color::White);
        assert_eq!(state.repetition_count(), 1);
        assert!(state.starts_from_standard_position());
    }

    #[test]
    fn finished_positions_are_recognized_at_load() {
        let mated = GameState::from_fen("7k/6Q1/6K1/8/8/8/8/8 b - - 0 1").expect("fen");
        assert_eq!(mated.status(), GameStatus::BlackMated);
        let stale = GameState::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").expect("fen");
        assert_eq!(stale.status(), GameStatus::Stalemate);
        let bare = GameState::from_fen("8/8/4k3/8/8/4K3/8/8 w - - 0 1").expect("fen");
        assert_eq!(bare.status(), GameStatus::DrawInsufficientMaterial);
    }

    #[test]
    fn counters_track_progress() {
        let mut state = GameState::new_game();
        advance(&mut state, "g1f3");
        assert_eq!(state.no_progress_plies(), 1);
        advance(&mut state, "e7e5");
        assert_eq!(state.no_progress_plies(), 0);
        assert_eq!(state.ply_count(), 2);
        assert!(state.to_string().contains("MOVES: g1f3,e7e5"));
    }

    #[test]
    fn game_length_limit_draws() {
        let mut state = GameState::new_game();
        state.plies_played = MAX_GAME_PLIES - 1;
        assert_eq!(state.calculate_status(), GameStatus::InProgress);
        advance(&mut state, "e2e4");
        assert_eq!(state.status(), GameStatus::DrawBy300Plies);
        assert_eq!(GameStatus::DrawBy300Plies.result_token(), "1/2-1/2");
    }

    #[test]
    fn draw_rules_outrank_the_game_length_limit() {
        let mut state = GameState::new_game();
        state.plies_played = MAX_GAME_PLIES;
        state.no_progress_plies = NO_PROGRESS_PLY_LIMIT;
        assert_eq!(state.calculate_status(), GameStatus::DrawBy50Moves);

        state.no_progress_plies = 0;
        state
            .repetitions
            .insert(position_id(state.board()), REPETITION_LIMIT);
        assert_eq!(state.calculate_status(), GameStatus::DrawByRepetition);

        let mated = parse_fen("7k/6Q1/6K1/8/8/8/8/8 b - - 0 1").expect("fen");
        let mut mated = GameState::from_board(mated);
        mated.plies_played = MAX_GAME_PLIES;
        mated.no_progress_plies = NO_PROGRESS_PLY_LIMIT;
        assert_eq!(mated.calculate_status(), GameStatus::BlackMated);
    }
}
