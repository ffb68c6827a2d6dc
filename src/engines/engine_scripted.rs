//! Replays a fixed list of moves for one side.
//!
//! Moves are given in UCI text and resolved against the legal moves at the
//! time they are played. Once the script runs out the strategy returns no
//! move, which the controller treats as a contract violation.

use std::collections::VecDeque;

use shakmaty::Color;

use crate::engines::engine_trait::{Strategy, StrategyOutput};
use crate::errors::{ChessError, ChessResult};
use crate::game_state::chess_types::ChessMove;
use crate::game_state::game_state::GameState;
use crate::inputs::position_encoder::PositionEncoder;

pub struct ScriptedStrategy {
    side: Color,
    script: Vec<String>,
    remaining: VecDeque<String>,
}

impl ScriptedStrategy {
    pub fn new<S: AsRef<str>>(side: Color, moves: &[S]) -> Self {
        let script: Vec<String> = moves.iter().map(|m| m.as_ref().to_owned()).collect();
        Self {
            side,
            remaining: script.iter().cloned().collect(),
            script,
        }
    }

    /// Splits a whole game line ("e2e4 e7e5 ...") into the moves of each side.
    pub fn pair_from_line(line: &str) -> (Self, Self) {
        let moves: Vec<&str> = line.split_whitespace().collect();
        let white: Vec<&str> = moves.iter().step_by(2).copied().collect();
        let black: Vec<&str> = moves.iter().skip(1).step_by(2).copied().collect();
        (
            Self::new(Color::White, &white),
            Self::new(Color::Black, &black),
        )
    }

    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}

impl Strategy for ScriptedStrategy {
    fn name(&self) -> &str {
        "scripted"
    }

    fn side(&self) -> Color {
        self.side
    }

    fn new_game(&mut self) {
        self.remaining = self.script.iter().cloned().collect();
    }

    fn choose_move(
        &mut self,
        _game: &GameState,
        _encoder: &PositionEncoder,
        legal_moves: &[ChessMove],
    ) -> ChessResult<StrategyOutput> {
        let Some(text) = self.remaining.pop_front() else {
            return Ok(StrategyOutput::default());
        };
        let found = legal_moves
            .iter()
            .find(|m| m.uci() == text)
            .copied()
            .ok_or(ChessError::IllegalMove(text))?;
        Ok(StrategyOutput {
            best_move: Some(found),
            info_lines: vec![format!("info string scripted {}", found)],
        })
    }
}
