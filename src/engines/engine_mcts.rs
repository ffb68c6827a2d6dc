//! Neural-guided MCTS strategy.
//!
//! Owns one `MctsSearch` and its inference server. Between its own turns the
//! strategy replays the moves played in the game onto its tree so the
//! subtree under the current position is reused.

use std::sync::Arc;

use log::debug;
use shakmaty::Color;

use crate::cache::evaluation_cache::EvaluationCache;
use crate::config::mcts_config::StrategyConfig;
use crate::engines::engine_trait::{Strategy, StrategyOutput};
use crate::errors::ChessResult;
use crate::evaluator::batch_evaluator::BatchEvaluator;
use crate::evaluator::neural_evaluator::{evaluator_from_reference, NeuralEvaluator};
use crate::game_state::chess_types::{side_name, ChessMove};
use crate::game_state::game_state::GameState;
use crate::inputs::position_encoder::PositionEncoder;
use crate::search::mcts::MctsSearch;

pub struct MctsStrategy {
    side: Color,
    name: String,
    search: MctsSearch,
    // game moves already replayed onto the tree
    applied: usize,
}

impl MctsStrategy {
    /// Builds the strategy with the evaluator named by `config.nn_reference`.
    pub fn new(side: Color, config: StrategyConfig, cache: Arc<EvaluationCache>) -> ChessResult<Self> {
        let evaluator = evaluator_from_reference(config.nn_reference.as_deref())?;
        Ok(Self::with_evaluator(side, config, cache, evaluator))
    }

    pub fn with_evaluator(
        side: Color,
        config: StrategyConfig,
        cache: Arc<EvaluationCache>,
        evaluator: Box<dyn NeuralEvaluator>,
    ) -> Self {
        let server = Arc::new(BatchEvaluator::spawn(evaluator, config.batch));
        let name = format!("mcts-{}", server.name());
        Self {
            side,
            name,
            search: MctsSearch::new(config, cache, server),
            applied: 0,
        }
    }

    #[inline]
    pub fn search(&self) -> &MctsSearch {
        &self.search
    }

    fn catch_up(&mut self, history: &[ChessMove]) {
        if history.len() < self.applied {
            self.search.reset();
            self.applied = 0;
        }
        for mv in &history[self.applied..] {
            self.search.advance(mv);
        }
        self.applied = history.len();
    }
}

impl Strategy for MctsStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn side(&self) -> Color {
        self.side
    }

    fn new_game(&mut self) {
        self.search.reset();
        // entries and propagate counts from the previous game are not reused
        self.search.cache().clear_cache();
        self.applied = 0;
    }

    fn choose_move(
        &mut self,
        game: &GameState,
        encoder: &PositionEncoder,
        _legal_moves: &[ChessMove],
    ) -> ChessResult<StrategyOutput> {
        self.catch_up(game.move_history());
        let outcome = self.search.search(game.board(), encoder)?;
        debug!(
            "{} {} picked {:?} after {} simulations",
            self.name,
            side_name(self.side),
            outcome.best_move.map(|m| m.uci()),
            outcome.simulations
        );
        let stats = self.search.cache().stats();
        Ok(StrategyOutput {
            best_move: outcome.best_move,
            info_lines: vec![
                format!(
                    "info nodes {} visits {} abandoned {} time {} value {:.3}",
                    outcome.simulations,
                    outcome.root_visits,
                    outcome.abandoned,
                    outcome.elapsed_ms,
                    outcome.best_value
                ),
                format!(
                    "info string cache entries {} hits {} misses {} evictions {}",
                    self.search.cache().len(),
                    stats.hits,
                    stats.misses,
                    stats.evictions
                ),
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::cache_value::{DRAW_KEY, LOSS_KEY, WIN_KEY};
    use crate::move_generation::move_generator::{find_legal_move, RulesEngine, StandardRules};

    fn small_config() -> StrategyConfig {
        StrategyConfig {
            steps: 64,
            threads: Some(2),
            batch: 4,
            ..StrategyConfig::default()
        }
    }

    #[test]
    fn unknown_reference_is_rejected() {
        let mut config = small_config();
        config.nn_reference = Some("resnet-20b".to_owned());
        let cache = Arc::new(EvaluationCache::new(64));
        assert!(MctsStrategy::new(Color::White, config, cache).is_err());
    }

    #[test]
    fn reuses_tree_across_turns() {
        let cache = Arc::new(EvaluationCache::new(4096));
        let mut white = MctsStrategy::new(Color::White, small_config(), cache).expect("strategy");
        assert_eq!(white.name(), "mcts-uniform");

        let mut game = GameState::new_game();
        let mut encoder = PositionEncoder::new(game.board());
        let legal = StandardRules.legal_moves(game.board());
        let first = white
            .choose_move(&game, &encoder, &legal)
            .expect("search")
            .best_move
            .expect("move");

        for mv in [first.uci(), "e7e5".to_owned()] {
            let chosen = find_legal_move(&StandardRules, game.board(), &mv).expect("legal");
            let next = StandardRules.execute(game.board(), &chosen).expect("execute");
            game.apply_board(next, &chosen);
            game.push_move(chosen);
            encoder.register_input(game.board(), chosen);
        }

        let legal = StandardRules.legal_moves(game.board());
        let out = white.choose_move(&game, &encoder, &legal).expect("search");
        let second = out.best_move.expect("move");
        assert!(legal.iter().any(|m| m.same_text(&second)));
        assert_eq!(out.info_lines.len(), 2);
        assert!(white.search().root_visits() >= 64);
    }

    #[test]
    fn new_game_starts_from_an_empty_cache() {
        let cache = Arc::new(EvaluationCache::new(4096));
        let mut white =
            MctsStrategy::new(Color::White, small_config(), Arc::clone(&cache)).expect("strategy");
        let game = GameState::new_game();
        let encoder = PositionEncoder::new(game.board());
        let legal = StandardRules.legal_moves(game.board());
        white.choose_move(&game, &encoder, &legal).expect("search");
        assert!(!cache.is_empty());
        let old_draw = cache.get(DRAW_KEY).expect("draw");

        white.new_game();
        assert!(cache.is_empty());
        assert_eq!(white.search().root_visits(), 0);
        let new_draw = cache.get(DRAW_KEY).expect("draw");
        assert!(!Arc::ptr_eq(&old_draw, &new_draw));
        for key in [LOSS_KEY, DRAW_KEY, WIN_KEY] {
            assert_eq!(cache.propagate_count(key), Some(0));
        }

        let out = white.choose_move(&game, &encoder, &legal).expect("search");
        assert!(out.best_move.is_some());
    }
}
