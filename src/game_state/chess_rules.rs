//! Canonical chess-rule and game-length constants.
//!
//! Board legality itself lives in the rules engine; this module only stores
//! the literals the game controller and encoder agree on.

/// Standard chess starting position in Forsyth-Edwards Notation (FEN).
pub const STARTING_POSITION_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Plies without a capture or pawn move before the game is drawn.
pub const NO_PROGRESS_PLY_LIMIT: u32 = 50;

/// Occurrences of the same position (board + side to move) that draw the game.
pub const REPETITION_LIMIT: u32 = 3;

/// Hard ceiling on game length; games reaching it are drawn.
pub const MAX_GAME_PLIES: usize = 300;

/// Number of past plies retained by the position encoder.
pub const HISTORY_CAPACITY: usize = 8;
