//! Random-move strategy.
//!
//! Selects uniformly from legal moves with a seeded generator; used as a
//! sparring partner and in integration tests.

use rand::prelude::IndexedRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shakmaty::Color;

use crate::engines::engine_trait::{Strategy, StrategyOutput};
use crate::errors::ChessResult;
use crate::game_state::chess_types::{side_name, ChessMove};
use crate::game_state::game_state::GameState;
use crate::inputs::position_encoder::PositionEncoder;

pub struct RandomStrategy {
    side: Color,
    seed: u64,
    rng: StdRng,
}

impl RandomStrategy {
    pub fn new(side: Color, seed: u64) -> Self {
        Self {
            side,
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Strategy for RandomStrategy {
    fn name(&self) -> &str {
        "random"
    }

    fn side(&self) -> Color {
        self.side
    }

    fn new_game(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    fn choose_move(
        &mut self,
        _game: &GameState,
        _encoder: &PositionEncoder,
        legal_moves: &[ChessMove],
    ) -> ChessResult<StrategyOutput> {
        let mut out = StrategyOutput::default();
        out.info_lines.push(format!(
            "info string random {} legal_moves {}",
            side_name(self.side),
            legal_moves.len()
        ));
        out.best_move = legal_moves.choose(&mut self.rng).copied();
        Ok(out)
    }
}
