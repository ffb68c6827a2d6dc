//! Errors used throughout the search engine.
//!
//! `ChessError` is the single error type returned by the cache, encoder,
//! search and game-controller layers. Variants fall into two groups:
//! - contract violations (`DuplicateCacheKey`, `MissingCacheKey`,
//!   `IllegalMoveChosen`, `NanPolicy`, `PolicyLength`) which mean the
//!   in-memory state is inconsistent and the current run must abort;
//! - input/environment failures (`InvalidFen`, `Config`, `Io`, evaluator
//!   failures) which are reported to the caller.

use thiserror::Error;

use crate::cache::cache_value::PositionKey;

#[derive(Debug, Error)]
pub enum ChessError {
    #[error("cache entry already exists for key {key} ({label})")]
    DuplicateCacheKey { key: PositionKey, label: String },

    #[error("no cache entry for key {0}")]
    MissingCacheKey(PositionKey),

    #[error("policy for key {key} has {got} logits, expected {expected}")]
    PolicyLength {
        key: PositionKey,
        got: usize,
        expected: usize,
    },

    #[error("normalized policy contains NaN for key {key} ({label})")]
    NanPolicy { key: PositionKey, label: String },

    #[error("strategy chose {chosen} which is not legal here; legal moves: {legal}")]
    IllegalMoveChosen { chosen: String, legal: String },

    #[error("move {0} cannot be played on the current board")]
    IllegalMove(String),

    #[error("strategy returned no move while the game is still in progress")]
    NoMoveReturned,

    #[error("game is already over: {0}")]
    GameOver(String),

    #[error("invalid FEN '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },

    #[error("evaluator failed: {0}")]
    Evaluator(String),

    #[error("evaluator returned {got} results for a batch of {expected}")]
    EvaluatorBatchMismatch { got: usize, expected: usize },

    #[error("evaluator service is no longer running")]
    EvaluatorDisconnected,

    #[error("unknown evaluator reference '{0}'")]
    UnknownEvaluator(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ChessResult<T> = Result<T, ChessError>;
