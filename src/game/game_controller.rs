//! Game controller state machine.
//!
//! Alternates two strategies over one `GameState`. Each `step` plays exactly
//! one ply: the encoder is advanced with the previous move, the active
//! strategy chooses among the legal moves, the choice is validated and
//! applied, and the status is recomputed. `play_all` loops until the game
//! ends or the stop flag is raised.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use shakmaty::{Chess, Color};

use crate::engines::engine_trait::Strategy;
use crate::errors::{ChessError, ChessResult};
use crate::game_state::chess_types::{side_name, ChessMove, GameStatus};
use crate::game_state::game_state::GameState;
use crate::inputs::position_encoder::PositionEncoder;
use crate::move_generation::move_generator::{RulesEngine, StandardRules};
use crate::utils::pgn::write_pgn;

pub struct GameController {
    rules: StandardRules,
    state: GameState,
    encoder: PositionEncoder,
    white: Box<dyn Strategy>,
    black: Box<dyn Strategy>,
    // applied to the board but not yet registered with the encoder
    last_applied: Option<ChessMove>,
    stop: Arc<AtomicBool>,
}

impl GameController {
    pub fn new(white: Box<dyn Strategy>, black: Box<dyn Strategy>) -> Self {
        let state = GameState::new_game();
        let encoder = PositionEncoder::new(state.board());
        Self::assemble(state, encoder, white, black)
    }

    pub fn from_fen(fen: &str, white: Box<dyn Strategy>, black: Box<dyn Strategy>) -> ChessResult<Self> {
        let state = GameState::from_fen(fen)?;
        let encoder = PositionEncoder::new(state.board());
        Ok(Self::assemble(state, encoder, white, black))
    }

    /// Resumes a game from `initial` after replaying `moves`.
    pub fn from_moves(
        initial: Chess,
        moves: &[ChessMove],
        white: Box<dyn Strategy>,
        black: Box<dyn Strategy>,
    ) -> ChessResult<Self> {
        let rules = StandardRules;
        let mut state = GameState::from_board(initial);
        for mv in moves {
            if state.status().is_terminal() {
                return Err(ChessError::GameOver(state.status().to_string()));
            }
            let next = rules.execute(state.board(), mv)?;
            state.apply_board(next, mv);
            let status = state.calculate_status();
            state.set_status(status);
            state.push_move(*mv);
        }
        let encoder = PositionEncoder::rebuild(&rules, state.initial_board(), state.move_history())?;
        Ok(Self::assemble(state, encoder, white, black))
    }

    fn assemble(
        state: GameState,
        encoder: PositionEncoder,
        mut white: Box<dyn Strategy>,
        mut black: Box<dyn Strategy>,
    ) -> Self {
        white.new_game();
        black.new_game();
        Self {
            rules: StandardRules,
            state,
            encoder,
            white,
            black,
            last_applied: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[inline]
    pub fn state(&self) -> &GameState {
        &self.state
    }

    #[inline]
    pub fn status(&self) -> GameStatus {
        self.state.status()
    }

    #[inline]
    pub fn encoder(&self) -> &PositionEncoder {
        &self.encoder
    }

    /// Raising this flag makes `play_all` return after the current ply.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn strategy_names(&self) -> (&str, &str) {
        (self.white.name(), self.black.name())
    }

    /// Plays one ply and returns the resulting status.
    pub fn step(&mut self) -> ChessResult<GameStatus> {
        if self.state.status().is_terminal() {
            return Err(ChessError::GameOver(self.state.status().to_string()));
        }
        if let Some(mv) = self.last_applied.take() {
            self.encoder.register_input(self.state.board(), mv);
        }

        let legal = self.rules.legal_moves(self.state.board());
        let side = self.state.active_side();
        let strategy = match side {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        };
        let output = strategy.choose_move(&self.state, &self.encoder, &legal)?;
        for line in &output.info_lines {
            debug!("{} {}: {}", strategy.name(), side_name(side), line);
        }

        let chosen = output.best_move.ok_or(ChessError::NoMoveReturned)?;
        let mv = legal
            .iter()
            .find(|m| m.same_text(&chosen))
            .copied()
            .ok_or_else(|| ChessError::IllegalMoveChosen {
                chosen: chosen.uci(),
                legal: legal.iter().map(|m| m.uci()).collect::<Vec<_>>().join(","),
            })?;

        let next = self.rules.execute(self.state.board(), &mv)?;
        self.state.apply_board(next, &mv);
        let status = self.state.calculate_status();
        self.state.set_status(status);
        self.state.push_move(mv);
        self.last_applied = Some(mv);
        Ok(status)
    }

    /// Steps until the game ends or the stop flag is raised.
    pub fn play_all(&mut self) -> ChessResult<GameStatus> {
        while !self.state.status().is_terminal() {
            if self.stop.load(Ordering::Relaxed) {
                info!("stop requested after {} plies", self.state.ply_count());
                break;
            }
            let side = self.state.active_side();
            let status = self.step()?;
            let played = self.state.last_move().map(|m| m.uci()).unwrap_or_default();
            info!(
                "step {} {} {} -> {}",
                self.state.ply_count(),
                side_name(side),
                played,
                status
            );
        }
        Ok(self.state.status())
    }

    pub fn pgn(&self) -> ChessResult<String> {
        write_pgn(&self.state, self.white.name(), self.black.name())
    }
}
