//! Crate root module declarations for the Plum Zero search engine.
//!
//! This file exposes all top-level subsystems (game state, rules, position
//! encoding, evaluation cache, tree search, evaluators, strategies and the
//! game controller) so the binary, tests and benches can import stable
//! module paths.

pub mod errors;

pub mod game_state {
    pub mod chess_rules;
    pub mod chess_types;
    pub mod game_state;
}

pub mod move_generation {
    pub mod move_generator;
}

pub mod inputs {
    pub mod feature_planes;
    pub mod position_encoder;
    pub mod position_history;
}

pub mod cache {
    pub mod cache_value;
    pub mod evaluation_cache;
}

pub mod search {
    pub mod mcts;
    pub mod policy;
    pub mod search_tree;
    pub mod threading;
}

pub mod evaluator {
    pub mod batch_evaluator;
    pub mod neural_evaluator;
}

pub mod engines {
    pub mod engine_mcts;
    pub mod engine_random;
    pub mod engine_scripted;
    pub mod engine_trait;
}

pub mod config {
    pub mod mcts_config;
}

pub mod game {
    pub mod game_controller;
}

pub mod utils {
    pub mod pgn;
}
