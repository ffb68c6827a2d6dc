//! Strategy abstraction used by the game controller.
//!
//! Each side of a game is driven by one `Strategy`. The controller hands it
//! the game record, the shared position encoder (already advanced to the
//! current ply) and the legal moves, and expects one of those moves back.

use shakmaty::Color;

use crate::errors::ChessResult;
use crate::game_state::chess_types::ChessMove;
use crate::game_state::game_state::GameState;
use crate::inputs::position_encoder::PositionEncoder;

#[derive(Debug, Clone, Default)]
pub struct StrategyOutput {
    pub best_move: Option<ChessMove>,
    pub info_lines: Vec<String>,
}

pub trait Strategy: Send {
    fn name(&self) -> &str;

    fn side(&self) -> Color;

    /// Drops any state carried over from a previous game.
    fn new_game(&mut self) {}

    fn choose_move(
        &mut self,
        game: &GameState,
        encoder: &PositionEncoder,
        legal_moves: &[ChessMove],
    ) -> ChessResult<StrategyOutput>;
}
