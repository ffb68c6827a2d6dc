//! Parallel PUCT search over a shared arena tree.
//!
//! Workers run in a thread scope and repeat one simulation at a time:
//! select a leaf under the tree lock, replay the path outside it, resolve the
//! leaf through the evaluation cache (evaluating on a miss), then expand and
//! back up under the lock again. Forced outcomes bind to the sentinel keys
//! and never reach the evaluator.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error, warn};
use parking_lot::Mutex;
use shakmaty::{Chess, Position};

use crate::cache::cache_value::{NodeBinding, PositionKey, DRAW_KEY, LOSS_KEY, WIN_KEY};
use crate::cache::evaluation_cache::{Claim, EvaluationCache};
use crate::config::mcts_config::StrategyConfig;
use crate::errors::{ChessError, ChessResult};
use crate::evaluator::batch_evaluator::BatchEvaluator;
use crate::game_state::chess_rules::{NO_PROGRESS_PLY_LIMIT, REPETITION_LIMIT};
use crate::game_state::chess_types::ChessMove;
use crate::inputs::position_encoder::{GameView, PositionEncoder};
use crate::move_generation::move_generator::{board_fen, RulesEngine, StandardRules};
use crate::search::policy::{policy_index, DirichletNoise};
use crate::search::search_tree::{NodeId, NodeState, SearchTree};
use crate::search::threading::SearchState;

/// Longest a worker waits for another worker's evaluation of the same key.
pub const PENDING_EVALUATION_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub best_move: Option<ChessMove>,
    pub simulations: u64,
    pub abandoned: u64,
    pub elapsed_ms: u64,
    pub root_visits: u32,
    /// Mean value of the chosen move for the side to move at the root.
    pub best_value: f32,
}

enum Simulation {
    Completed,
    Abandoned,
}

fn sentinel_value(key: PositionKey) -> f32 {
    match key {
        LOSS_KEY => -1.0,
        WIN_KEY => 1.0,
        _ => 0.0,
    }
}

fn legal_policy_indexes(moves: &[ChessMove]) -> ChessResult<Vec<usize>> {
    moves
        .iter()
        .map(|mv| policy_index(mv).ok_or_else(|| ChessError::IllegalMove(mv.uci())))
        .collect()
}

pub struct MctsSearch {
    config: StrategyConfig,
    rules: StandardRules,
    cache: Arc<EvaluationCache>,
    evaluator: Arc<BatchEvaluator>,
    tree: Mutex<SearchTree>,
    state: Arc<SearchState>,
}

impl MctsSearch {
    pub fn new(
        config: StrategyConfig,
        cache: Arc<EvaluationCache>,
        evaluator: Arc<BatchEvaluator>,
    ) -> Self {
        Self {
            config,
            rules: StandardRules,
            cache,
            evaluator,
            tree: Mutex::new(SearchTree::new()),
            state: SearchState::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    #[inline]
    pub fn cache(&self) -> &Arc<EvaluationCache> {
        &self.cache
    }

    /// Shared control state; raising its stop flag ends the current search.
    #[inline]
    pub fn state(&self) -> &Arc<SearchState> {
        &self.state
    }

    pub fn tree_size(&self) -> usize {
        self.tree.lock().len()
    }

    pub fn root_visits(&self) -> u32 {
        let tree = self.tree.lock();
        tree.node(tree.root()).visits
    }

    /// Discards the tree.
    pub fn reset(&self) {
        *self.tree.lock() = SearchTree::new();
    }

    /// Follows a move played in the game, keeping the subtree below it.
    pub fn advance(&self, mv: &ChessMove) {
        let mut tree = self.tree.lock();
        let old_root_key = tree.node(tree.root()).key;
        if !tree.advance_root(mv) {
            debug!("move {} not in tree, starting fresh", mv);
        }
        if let Some(key) = old_root_key {
            self.cache.demote(key);
        }
    }

    /// Runs one search step from `board`, whose history is `encoder`.
    pub fn search(&self, board: &Chess, encoder: &PositionEncoder) -> ChessResult<SearchOutcome> {
        if self.rules.legal_moves(board).is_empty() {
            return Ok(SearchOutcome::default());
        }
        let root_key = encoder.position_hash(GameView::current(board));
        self.prepare_root(root_key)?;
        match self.cache.reset_propagate(root_key) {
            Ok(()) | Err(ChessError::MissingCacheKey(_)) => {}
            Err(err) => return Err(err),
        }

        self.state.reset_accounting();
        self.state
            .set_step_budget(Some(u64::from(self.config.steps.max(1))));
        self.state.set_time_budget_ms(self.config.time_budget_ms());

        let failure: Mutex<Option<ChessError>> = Mutex::new(None);
        let workers = self.config.worker_threads();
        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| self.worker(board, encoder, &failure));
            }
        });
        if let Some(err) = failure.into_inner() {
            return Err(err);
        }

        let tree = self.tree.lock();
        let root = tree.node(tree.root());
        let best = tree.best_child().map(|id| tree.node(id));
        let outcome = SearchOutcome {
            best_move: best.and_then(|n| n.mv),
            simulations: self.state.completed(),
            abandoned: self.state.abandoned(),
            elapsed_ms: self.state.elapsed_ms(),
            root_visits: root.visits,
            best_value: best.map(|n| n.q()).unwrap_or(0.0),
        };
        debug!(
            "search done: {} simulations, {} abandoned, {} ms, tree {}, root propagations {}",
            outcome.simulations,
            outcome.abandoned,
            outcome.elapsed_ms,
            tree.len(),
            self.cache.propagate_count(root_key).unwrap_or(0)
        );
        Ok(outcome)
    }

    #[inline]
    fn root_noise(&self) -> Option<DirichletNoise> {
        self.config.dirichlet.then(DirichletNoise::default)
    }

    /// Re-binds a reused root to its cache entry with root noise, or starts
    /// over when the entry is gone or belongs to another position.
    fn prepare_root(&self, root_key: PositionKey) -> ChessResult<()> {
        let mut tree = self.tree.lock();
        let root = tree.root();
        let (Some(key), true) = (tree.node(root).key, tree.node(root).expanded) else {
            *tree = SearchTree::new();
            return Ok(());
        };
        if key != root_key {
            debug!("reused root does not match the position, starting fresh");
            *tree = SearchTree::new();
            return Ok(());
        }

        let moves: Vec<ChessMove> = tree
            .node(root)
            .children
            .iter()
            .filter_map(|&c| tree.node(c).mv)
            .collect();
        let binding = NodeBinding {
            node: root,
            legal_indexes: legal_policy_indexes(&moves)?,
            root_noise: self.root_noise(),
            seed: self.config.seed,
        };
        match self.cache.attach(key, binding) {
            Ok(()) => {
                let priors: Vec<f32> = self
                    .cache
                    .get(key)
                    .map(|entry| entry.policy().into_iter().map(|(_, p)| p).collect())
                    .unwrap_or_default();
                tree.set_priors(root, &priors);
                Ok(())
            }
            Err(ChessError::MissingCacheKey(_)) => {
                debug!("root entry {} evicted, starting fresh", key);
                *tree = SearchTree::new();
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn worker(&self, board: &Chess, encoder: &PositionEncoder, failure: &Mutex<Option<ChessError>>) {
        while self.state.try_begin_simulation() {
            match self.simulate(board, encoder) {
                Ok(Simulation::Completed) => self.state.finish_simulation(),
                Ok(Simulation::Abandoned) => self.state.abandon_simulation(),
                Err(err) => {
                    error!("search aborted: {err}");
                    failure.lock().get_or_insert(err);
                    self.state.request_stop();
                    break;
                }
            }
        }
    }

    fn simulate(&self, root_board: &Chess, root_encoder: &PositionEncoder) -> ChessResult<Simulation> {
        let (leaf, path, known_terminal) = {
            let mut tree = self.tree.lock();
            let leaf = tree.select_leaf(self.config.max_cpuct);
            let node = tree.node(leaf);
            let known_terminal = (node.state == NodeState::Leaf).then_some(node.key).flatten();
            (leaf, tree.moves_to(leaf), known_terminal)
        };
        if let Some(key) = known_terminal {
            self.back_up(leaf, sentinel_value(key));
            return Ok(Simulation::Completed);
        }

        let mut encoder = root_encoder.clone();
        let mut board = root_board.clone();
        let mut pending = None;
        for (i, mv) in path.iter().enumerate() {
            board = self.rules.execute(&board, mv)?;
            if i + 1 == path.len() {
                pending = Some(*mv);
            } else {
                encoder.register_input(&board, *mv);
            }
        }
        let view = match pending {
            Some(mv) => GameView::after(&board, mv),
            None => GameView::current(&board),
        };

        if pending.is_some() {
            let repeats = encoder.repeat_count(&board) + 1;
            if let Some(key) = self.terminal_key(&board, repeats) {
                let mut tree = self.tree.lock();
                tree.mark_terminal(leaf, key);
                drop(tree);
                self.back_up(leaf, sentinel_value(key));
                return Ok(Simulation::Completed);
            }
        }

        let moves = self.rules.legal_moves(&board);
        let key = encoder.position_hash(view);
        let entry = match self.cache.claim(key, &board_fen(&board), self.config.dirichlet) {
            Claim::Created(entry) => {
                let tensor = encoder.build_feature_tensor(view);
                let evaluation = self.evaluator.evaluate(tensor)?;
                self.cache
                    .fill_claimed(&entry, evaluation.value, evaluation.policy_logits)?;
                entry
            }
            Claim::Existing(entry) => {
                if !entry.wait_initialized(PENDING_EVALUATION_WAIT) {
                    warn!("evaluation of {} still pending, abandoning simulation", key);
                    self.tree.lock().revert_virtual_loss(leaf);
                    return Ok(Simulation::Abandoned);
                }
                entry
            }
        };

        let mut tree = self.tree.lock();
        if tree.expand(leaf, &moves) {
            let binding = NodeBinding {
                node: leaf,
                legal_indexes: legal_policy_indexes(&moves)?,
                root_noise: if leaf == tree.root() { self.root_noise() } else { None },
                seed: self.config.seed,
            };
            entry.bind(binding)?;
            let priors: Vec<f32> = entry.policy().into_iter().map(|(_, p)| p).collect();
            tree.set_priors(leaf, &priors);
        }
        tree.node_mut(leaf).key = Some(key);
        drop(tree);
        self.back_up(leaf, entry.value());
        Ok(Simulation::Completed)
    }

    /// Sentinel key for a forced outcome, from the side to move's view.
    fn terminal_key(&self, board: &Chess, repeats: u32) -> Option<PositionKey> {
        if board.is_checkmate() {
            return Some(LOSS_KEY);
        }
        if board.is_stalemate()
            || board.is_insufficient_material()
            || board.halfmoves() >= NO_PROGRESS_PLY_LIMIT
            || repeats >= REPETITION_LIMIT
        {
            return Some(DRAW_KEY);
        }
        None
    }

    /// Backs `value` up from `leaf` and bumps the propagate count of every
    /// cache entry on the path.
    fn back_up(&self, leaf: NodeId, value: f32) {
        let keys: Vec<PositionKey> = {
            let mut tree = self.tree.lock();
            let path = tree.backup(leaf, value);
            path.into_iter().filter_map(|id| tree.node(id).key).collect()
        };
        self.cache.inc_propagate(&keys);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::neural_evaluator::{MaterialEvaluator, UniformEvaluator};
    use crate::move_generation::move_generator::{find_legal_move, parse_fen};

    fn search_with(config: StrategyConfig) -> MctsSearch {
        let cache = Arc::new(EvaluationCache::new(4096));
        let evaluator = Arc::new(BatchEvaluator::spawn(Box::new(UniformEvaluator), config.batch));
        MctsSearch::new(config, cache, evaluator)
    }

    fn config(steps: u32, threads: i64) -> StrategyConfig {
        StrategyConfig {
            steps,
            threads: Some(threads),
            dirichlet: false,
            batch: 8,
            ..StrategyConfig::default()
        }
    }

    #[test]
    fn finds_back_rank_mate() {
        let board = parse_fen("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1").expect("fen");
        let encoder = PositionEncoder::new(&board);
        let search = search_with(config(400, 2));
        let outcome = search.search(&board, &encoder).expect("search");
        assert_eq!(outcome.best_move.map(|m| m.uci()), Some("a1a8".to_owned()));
        assert!(outcome.best_value > 0.9);
    }

    #[test]
    fn completed_simulations_match_root_visits() {
        let board = Chess::default();
        let encoder = PositionEncoder::new(&board);
        let search = search_with(config(48, 3));
        let outcome = search.search(&board, &encoder).expect("search");
        assert_eq!(outcome.simulations + outcome.abandoned, 48);
        assert_eq!(u64::from(outcome.root_visits), outcome.simulations);
        let chosen = outcome.best_move.expect("a move");
        assert!(StandardRules
            .legal_moves(&board)
            .iter()
            .any(|m| m.same_text(&chosen)));
    }

    #[test]
    fn single_step_still_picks_a_move() {
        let board = Chess::default();
        let encoder = PositionEncoder::new(&board);
        let search = search_with(config(1, 1));
        let outcome = search.search(&board, &encoder).expect("search");
        assert!(outcome.best_move.is_some());
        assert_eq!(outcome.simulations, 1);
    }

    #[test]
    fn time_budget_stops_early() {
        let board = Chess::default();
        let encoder = PositionEncoder::new(&board);
        let mut cfg = config(u32::MAX, 2);
        cfg.millis_per_step = Some(30);
        let search = search_with(cfg);
        let outcome = search.search(&board, &encoder).expect("search");
        assert!(outcome.best_move.is_some());
        assert!(outcome.simulations < u64::from(u32::MAX));
    }

    #[test]
    fn subtree_survives_advance() {
        let board = Chess::default();
        let mut encoder = PositionEncoder::new(&board);
        let mut cfg = config(200, 2);
        cfg.dirichlet = true;
        let search = search_with(cfg);
        let outcome = search.search(&board, &encoder).expect("search");
        let chosen = outcome.best_move.expect("a move");

        let tree = search.tree.lock();
        let child = tree.best_child().expect("child");
        let child_visits = tree.node(child).visits;
        drop(tree);
        assert!(child_visits > 0);

        search.advance(&chosen);
        assert_eq!(search.root_visits(), child_visits);

        let next = StandardRules.execute(&board, &chosen).expect("execute");
        encoder.register_input(&next, chosen);
        let reply = search.search(&next, &encoder).expect("search");
        let reply_move = reply.best_move.expect("reply");
        assert_eq!(reply_move.side(), shakmaty::Color::Black);
        assert!(search.root_visits() > child_visits);
    }

    #[test]
    fn stale_root_is_discarded() {
        let board = Chess::default();
        let encoder = PositionEncoder::new(&board);
        let search = search_with(config(20, 1));
        search.search(&board, &encoder).expect("search");
        // search a different position without advancing the tree
        let other = parse_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1").expect("fen");
        let other_encoder = PositionEncoder::new(&other);
        let outcome = search.search(&other, &other_encoder).expect("search");
        let mv = outcome.best_move.expect("move");
        assert!(find_legal_move(&StandardRules, &other, &mv.uci()).is_some());
    }

    #[test]
    fn cache_smaller_than_worker_count_keeps_searching() {
        let board = Chess::default();
        let encoder = PositionEncoder::new(&board);
        for _ in 0..5 {
            let cfg = config(200, 8);
            let cache = Arc::new(EvaluationCache::new(4));
            let evaluator = Arc::new(BatchEvaluator::spawn(Box::new(UniformEvaluator), cfg.batch));
            let search = MctsSearch::new(cfg, Arc::clone(&cache), evaluator);
            let outcome = search.search(&board, &encoder).expect("search");
            assert_eq!(outcome.simulations + outcome.abandoned, 200);
            assert!(outcome.best_move.is_some());
            assert!(cache.len() <= 4);
        }
    }

    #[test]
    fn root_propagations_restart_each_search() {
        let board = Chess::default();
        let encoder = PositionEncoder::new(&board);
        let search = search_with(config(32, 2));
        let root_key = encoder.position_hash(GameView::current(&board));

        let first = search.search(&board, &encoder).expect("search");
        assert_eq!(
            search.cache().propagate_count(root_key),
            Some(first.simulations as u32)
        );
        let second = search.search(&board, &encoder).expect("search");
        assert_eq!(
            search.cache().propagate_count(root_key),
            Some(second.simulations as u32)
        );
        assert_eq!(search.root_visits() as u64, first.simulations + second.simulations);
    }

    #[test]
    fn mated_root_has_no_move() {
        let board = parse_fen("7k/6Q1/6K1/8/8/8/8/8 b - - 0 1").expect("fen");
        let encoder = PositionEncoder::new(&board);
        let search = search_with(config(10, 1));
        assert!(search.search(&board, &encoder).expect("search").best_move.is_none());
    }

    #[test]
    fn material_evaluator_takes_hanging_queen() {
        let board = parse_fen("4k3/8/8/3q4/8/8/3R4/4K3 w - - 0 1").expect("fen");
        let encoder = PositionEncoder::new(&board);
        let cfg = config(300, 2);
        let cache = Arc::new(EvaluationCache::new(4096));
        let evaluator = Arc::new(BatchEvaluator::spawn(Box::new(MaterialEvaluator), 8));
        let search = MctsSearch::new(cfg, cache, evaluator);
        let outcome = search.search(&board, &encoder).expect("search");
        assert_eq!(outcome.best_move.map(|m| m.uci()), Some("d2d5".to_owned()));
    }
}
