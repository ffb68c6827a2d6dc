//! History-aware position encoder.
//!
//! Turns the current board plus the last eight plies into a `FeatureTensor`
//! for the evaluator, and into a `PositionKey` for the evaluation cache.
//! One encoder exists per game or search line; cloning it forks the line.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use log::debug;
use sha2::{Digest, Sha256};
use shakmaty::attacks::king_attacks;
use shakmaty::zobrist::Zobrist64;
use shakmaty::{CastlingSide, Chess, Color, EnPassantMode, Piece, Position, Role, Square};

use crate::cache::cache_value::{is_reserved_key, PositionKey};
use crate::errors::ChessResult;
use crate::game_state::chess_rules::{HISTORY_CAPACITY, NO_PROGRESS_PLY_LIMIT};
use crate::game_state::chess_types::{side_name, ChessMove};
use crate::inputs::feature_planes::*;
use crate::inputs::position_history::{HistoryEntry, PositionHistory};
use crate::move_generation::move_generator::RulesEngine;

/// Added to a hash that collides with a sentinel key.
const RESERVED_KEY_REMAP: i64 = 0x2545_F491_4F6C_DD1D;

/// Position to encode, plus the move that produced it if that move has not
/// been registered with the encoder yet.
#[derive(Debug, Clone, Copy)]
pub struct GameView<'a> {
    pub board: &'a Chess,
    pub pending_move: Option<ChessMove>,
}

impl<'a> GameView<'a> {
    #[inline]
    pub fn current(board: &'a Chess) -> Self {
        Self {
            board,
            pending_move: None,
        }
    }

    #[inline]
    pub fn after(board: &'a Chess, mv: ChessMove) -> Self {
        Self {
            board,
            pending_move: Some(mv),
        }
    }
}

#[inline]
fn zobrist(board: &Chess) -> u64 {
    board.zobrist_hash::<Zobrist64>(EnPassantMode::Legal).0
}

/// Encodes the piece placement of `board` seen from `perspective`.
pub fn encode_one_position(board: &Chess, perspective: Color, is_repeat: bool) -> EncodedPosition {
    let mut slab = EncodedPosition::empty(perspective);
    for (sq, piece) in board.board().iter() {
        slab.set(
            piece_plane(piece, perspective),
            oriented_index(sq, perspective),
            1.0,
        );
    }
    if is_repeat {
        for index in 0..BOARD_SQUARES {
            slab.set(REPETITION_PLANE, index, 1.0);
        }
    }
    slab
}

#[derive(Debug, Clone)]
pub struct PositionEncoder {
    history: PositionHistory,
    seen: HashMap<u64, u32>,
}

impl PositionEncoder {
    /// Starts a fresh line at `board` with a single synthetic init entry.
    pub fn new(board: &Chess) -> Self {
        let mut seen = HashMap::new();
        seen.insert(zobrist(board), 1);
        let mut history = PositionHistory::new();
        history.push(HistoryEntry {
            encoded: Arc::new(encode_one_position(board, board.turn(), false)),
            mv: ChessMove::init(board.turn()),
            repeat: false,
        });
        Self { history, seen }
    }

    /// Replays `moves` from `initial`, keeping the last eight plies.
    pub fn rebuild(
        rules: &dyn RulesEngine,
        initial: &Chess,
        moves: &[ChessMove],
    ) -> ChessResult<Self> {
        let mut encoder = Self::new(initial);
        let mut board = initial.clone();
        for mv in moves {
            board = rules.execute(&board, mv)?;
            encoder.register_input(&board, *mv);
        }
        Ok(encoder)
    }

    #[inline]
    pub fn history(&self) -> &PositionHistory {
        &self.history
    }

    /// How many times `board` has occurred on this line.
    pub fn repeat_count(&self, board: &Chess) -> u32 {
        self.seen.get(&zobrist(board)).copied().unwrap_or(0)
    }

    /// Advances the history by one ply. A move textually identical to the
    /// newest entry is skipped; returns whether the history grew.
    pub fn register_input(&mut self, board_after: &Chess, mv: ChessMove) -> bool {
        if self.is_duplicate(&mv) {
            debug!("skipping duplicate history move {}", mv);
            return false;
        }
        let count = self.seen.entry(zobrist(board_after)).or_insert(0);
        *count += 1;
        let repeat = *count > 1;
        self.history.push(HistoryEntry {
            encoded: Arc::new(encode_one_position(
                board_after,
                board_after.turn(),
                repeat,
            )),
            mv,
            repeat,
        });
        true
    }

    fn is_duplicate(&self, mv: &ChessMove) -> bool {
        self.history
            .last()
            .is_some_and(|last| last.mv.same_text(mv))
    }

    /// History entries used for `view`, newest first, at most eight.
    fn entries_for(&self, view: &GameView<'_>) -> Vec<HistoryEntry> {
        let mut out = Vec::with_capacity(HISTORY_CAPACITY);
        if let Some(mv) = view.pending_move {
            if !self.is_duplicate(&mv) {
                let repeat = self.repeat_count(view.board) > 0;
                out.push(HistoryEntry {
                    encoded: Arc::new(encode_one_position(
                        view.board,
                        view.board.turn(),
                        repeat,
                    )),
                    mv,
                    repeat,
                });
            }
        }
        let remaining = HISTORY_CAPACITY - out.len();
        out.extend(self.history.iter_newest_first().take(remaining).cloned());
        out
    }

    pub fn build_feature_tensor(&self, view: GameView<'_>) -> FeatureTensor {
        let board = view.board;
        let perspective = board.turn();
        let mut tensor = FeatureTensor::zeros();

        for (slot, entry) in self.entries_for(&view).iter().enumerate() {
            tensor.write_slab(slot, &entry.encoded.oriented(perspective));
        }

        write_move_planes(&mut tensor, board, perspective);
        write_pawn_advance_planes(&mut tensor, board, perspective);

        let castles = board.castles();
        let rights = [
            (Color::White, CastlingSide::QueenSide),
            (Color::White, CastlingSide::KingSide),
            (Color::Black, CastlingSide::QueenSide),
            (Color::Black, CastlingSide::KingSide),
        ];
        for (offset, (color, side)) in rights.into_iter().enumerate() {
            if castles.has(color, side) {
                tensor.fill_plane(CASTLING_PLANES_START + offset, 1.0);
            }
        }
        if perspective == Color::Black {
            tensor.fill_plane(SIDE_TO_MOVE_PLANE, 1.0);
        }
        let fifty = (board.halfmoves() as f32 / NO_PROGRESS_PLY_LIMIT as f32).min(1.0);
        tensor.fill_plane(FIFTY_MOVE_PLANE, fifty);
        tensor.fill_plane(EDGE_PLANE, 1.0);
        tensor
    }

    /// Deterministic cache key of board, history, repeat flags and side to
    /// move. Never returns one of the reserved sentinel keys.
    pub fn position_hash(&self, view: GameView<'_>) -> PositionKey {
        let board = view.board;
        let mut text = String::with_capacity(512);
        for sq in Square::ALL {
            if let Some(piece) = board.board().piece_at(sq) {
                let _ = write!(text, "{}={},", piece.char(), sq);
            }
        }
        text.push('\n');

        let mut entries = self.entries_for(&view);
        entries.reverse();
        let moves: Vec<String> = entries
            .iter()
            .map(|e| format!("{}-{}", side_name(e.mv.side()), e.mv.uci()))
            .collect();
        text.push_str(&moves.join(","));
        text.push('\n');
        let flags: Vec<&str> = entries
            .iter()
            .map(|e| if e.repeat { "1" } else { "0" })
            .collect();
        text.push_str(&flags.join(","));
        text.push('\n');
        text.push_str(side_name(board.turn()));

        let digest = Sha256::digest(text.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let key = i64::from_le_bytes(head);
        if is_reserved_key(key) {
            key.wrapping_add(RESERVED_KEY_REMAP)
        } else {
            key
        }
    }
}

fn write_move_planes(tensor: &mut FeatureTensor, board: &Chess, perspective: Color) {
    let own_moves = board.legal_moves();
    // The opponent's moves are only defined when the mover is not in check.
    let opponent = board.clone().swap_turn().ok();
    let opponent_moves = opponent
        .as_ref()
        .map(|pos| pos.legal_moves())
        .unwrap_or_default();

    let sides = [
        (perspective, own_moves.as_slice()),
        (perspective.other(), opponent_moves.as_slice()),
    ];
    for (color, moves) in sides {
        for m in moves {
            let cm = ChessMove::new(color, *m);
            if let Some(to) = cm.to_square() {
                let piece = Piece {
                    color,
                    role: m.role(),
                };
                tensor.set(
                    MOVE_PLANES_START + piece_plane(piece, perspective),
                    oriented_index(to, perspective),
                    1.0,
                );
            }
            if let (Some(victim), Some(from)) = (m.capture(), m.from()) {
                let victim_sq = if m.is_en_passant() {
                    Square::from_coords(m.to().file(), from.rank())
                } else {
                    m.to()
                };
                let piece = Piece {
                    color: color.other(),
                    role: victim,
                };
                tensor.set(
                    ATTACK_PLANES_START + piece_plane(piece, perspective),
                    oriented_index(victim_sq, perspective),
                    1.0,
                );
            }
        }
    }

    let opponent_color = perspective.other();
    if let Some(king) = board.board().king_of(opponent_color) {
        let liberties: Vec<Square> = if opponent.is_some() {
            opponent_moves
                .iter()
                .filter(|m| m.role() == Role::King && !m.is_castle())
                .map(|m| m.to())
                .collect()
        } else {
            (king_attacks(king) & !board.board().by_color(opponent_color))
                .into_iter()
                .collect()
        };
        for sq in liberties {
            tensor.set(KING_LIBERTY_PLANE, oriented_index(sq, perspective), 1.0);
        }
    }
}

/// Marks the empty squares each pawn could advance through until blocked.
fn write_pawn_advance_planes(tensor: &mut FeatureTensor, board: &Chess, perspective: Color) {
    let occupied = board.board().occupied();
    for (sq, piece) in board.board().iter() {
        if piece.role != Role::Pawn {
            continue;
        }
        let plane = if piece.color == perspective {
            PAWN_ADVANCE_OWN_PLANE
        } else {
            PAWN_ADVANCE_OPPONENT_PLANE
        };
        let step = if piece.color == Color::White { 8 } else { -8 };
        let mut cursor = sq.offset(step);
        while let Some(next) = cursor {
            if occupied.contains(next) {
                break;
            }
            tensor.set(plane, oriented_index(next, perspective), 1.0);
            cursor = next.offset(step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::move_generation::move_generator::{find_legal_move, parse_fen, StandardRules};

    fn play(board: &Chess, uci: &str) -> (Chess, ChessMove) {
        let mv = find_legal_move(&StandardRules, board, uci).expect("legal move");
        let next = StandardRules.execute(board, &mv).expect("execute");
        (next, mv)
    }

    #[test]
    fn one_position_marks_pieces_from_perspective() {
        let board = Chess::default();
        let white = encode_one_position(&board, Color::White, false);
        assert_eq!(white.get(0, Square::E2.to_usize()), 1.0);
        assert_eq!(white.get(6, Square::E7.to_usize()), 1.0);
        let black = encode_one_position(&board, Color::Black, true);
        // black's own pawns sit on the mirrored second rank
        assert_eq!(black.get(0, Square::E2.to_usize()), 1.0);
        assert_eq!(black.get(REPETITION_PLANE, 17), 1.0);
    }

    #[test]
    fn tensor_meta_planes_on_startpos() {
        let board = Chess::default();
        let encoder = PositionEncoder::new(&board);
        let tensor = encoder.build_feature_tensor(GameView::current(&board));
        for plane in CASTLING_PLANES_START..CASTLING_PLANES_START + 4 {
            assert_eq!(tensor.plane_sum(plane), 64.0);
        }
        assert_eq!(tensor.plane_sum(SIDE_TO_MOVE_PLANE), 0.0);
        assert_eq!(tensor.plane_sum(FIFTY_MOVE_PLANE), 0.0);
        assert_eq!(tensor.plane_sum(EDGE_PLANE), 64.0);
        // eight own pawns and the slab for the init entry
        assert_eq!(tensor.plane_sum(0), 8.0);
        assert_eq!(tensor.plane_sum(PLANES_PER_POSITION), 0.0);
        // own pawn pushes reach ranks 3 and 4; knights reach a3 c3 f3 h3
        assert_eq!(tensor.plane_sum(MOVE_PLANES_START), 16.0);
        assert_eq!(tensor.plane_sum(MOVE_PLANES_START + 1), 4.0);
        // pawns advance through ranks 3..6 on every file
        assert_eq!(tensor.plane_sum(PAWN_ADVANCE_OWN_PLANE), 32.0);
        assert_eq!(tensor.plane_sum(PAWN_ADVANCE_OPPONENT_PLANE), 32.0);
        assert_eq!(tensor.plane_sum(KING_LIBERTY_PLANE), 0.0);
    }

    #[test]
    fn history_slabs_are_newest_first() {
        let start = Chess::default();
        let mut encoder = PositionEncoder::new(&start);
        let (b1, m1) = play(&start, "e2e4");
        encoder.register_input(&b1, m1);
        let tensor = encoder.build_feature_tensor(GameView::current(&b1));
        // black to move; newest slab has black's pawns as own on mirrored rank 2
        assert_eq!(tensor.plane_sum(SIDE_TO_MOVE_PLANE), 64.0);
        assert_eq!(tensor.get(0, Square::E2.to_usize()), 1.0);
        // opponent pawn on e4 appears mirrored on e5
        assert_eq!(tensor.get(6, Square::E5.to_usize()), 1.0);
        // older slab (start position) is present too
        assert_eq!(tensor.plane_sum(PLANES_PER_POSITION), 8.0);
        assert_eq!(tensor.plane_sum(2 * PLANES_PER_POSITION), 0.0);
    }

    #[test]
    fn pending_move_counts_as_newest_entry() {
        let start = Chess::default();
        let encoder = PositionEncoder::new(&start);
        let (b1, m1) = play(&start, "d2d4");
        let mut registered = encoder.clone();
        registered.register_input(&b1, m1);

        let pending = encoder.build_feature_tensor(GameView::after(&b1, m1));
        let direct = registered.build_feature_tensor(GameView::current(&b1));
        assert_eq!(pending, direct);
        assert_eq!(
            encoder.position_hash(GameView::after(&b1, m1)),
            registered.position_hash(GameView::current(&b1))
        );
        // pending move equal to the newest entry is not appended again
        assert_eq!(
            registered.position_hash(GameView::after(&b1, m1)),
            registered.position_hash(GameView::current(&b1))
        );
    }

    #[test]
    fn duplicate_move_does_not_grow_history() {
        let start = Chess::default();
        let mut encoder = PositionEncoder::new(&start);
        let (b1, m1) = play(&start, "e2e4");
        assert!(encoder.register_input(&b1, m1));
        let n = encoder.history().len();
        assert!(!encoder.register_input(&b1, m1));
        assert_eq!(encoder.history().len(), n);
    }

    #[test]
    fn twenty_moves_keep_last_eight() {
        let mut board = Chess::default();
        let mut encoder = PositionEncoder::new(&board);
        let shuffle = ["g1f3", "g8f6", "f3g1", "f6g8"];
        let mut played = Vec::new();
        for i in 0..20 {
            let (next, mv) = play(&board, shuffle[i % 4]);
            assert!(encoder.register_input(&next, mv));
            played.push(mv);
            board = next;
        }
        assert_eq!(encoder.history().len(), 8);
        assert_eq!(encoder.history().moves(), played[12..].to_vec());
        // positions repeat after the first cycle
        assert!(encoder.history().iter().all(|e| e.repeat));
        assert_eq!(encoder.repeat_count(&board), 6);
    }

    #[test]
    fn hash_is_deterministic_and_sensitive() {
        let start = Chess::default();
        let encoder = PositionEncoder::new(&start);
        let view = GameView::current(&start);
        assert_eq!(encoder.position_hash(view), encoder.position_hash(view));

        // board differs
        let (b1, m1) = play(&start, "e2e4");
        let mut moved = encoder.clone();
        moved.register_input(&b1, m1);
        assert_ne!(moved.position_hash(GameView::current(&b1)), encoder.position_hash(view));

        // side to move differs on the same placement
        let flipped = parse_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR b KQkq - 0 1")
            .expect("fen");
        let flipped_encoder = PositionEncoder::new(&flipped);
        assert_ne!(
            flipped_encoder.position_hash(GameView::current(&flipped)),
            encoder.position_hash(view)
        );
    }

    #[test]
    fn hash_depends_on_history_and_repeat_flags() {
        // same final board reached by two move orders
        let start = Chess::default();
        let line_a = ["g1f3", "g8f6", "b1c3"];
        let line_b = ["b1c3", "g8f6", "g1f3"];
        let key_of = |line: &[&str]| {
            let mut encoder = PositionEncoder::new(&start);
            let mut board = start.clone();
            for uci in line {
                let (next, mv) = play(&board, uci);
                encoder.register_input(&next, mv);
                board = next;
            }
            encoder.position_hash(GameView::current(&board))
        };
        assert_ne!(key_of(&line_a), key_of(&line_b));

        // same board and move texts, but the second visit carries a repeat flag
        let cycle = ["g1f3", "g8f6", "f3g1", "f6g8"];
        let mut encoder = PositionEncoder::new(&start);
        let mut board = start.clone();
        let mut keys = Vec::new();
        for round in 0..3 {
            for uci in cycle {
                let (next, mv) = play(&board, uci);
                encoder.register_input(&next, mv);
                board = next;
            }
            keys.push((round, encoder.position_hash(GameView::current(&board))));
        }
        assert_ne!(keys[0].1, keys[1].1);
    }

    #[test]
    fn hundred_histories_do_not_collide() {
        let start = Chess::default();
        let mut keys = HashSet::new();
        let mut count = 0;
        // every pair of opening replies plus a third ply gives distinct histories
        for first in StandardRules.legal_moves(&start) {
            let b1 = StandardRules.execute(&start, &first).expect("execute");
            for second in StandardRules.legal_moves(&b1).into_iter().take(6) {
                let b2 = StandardRules.execute(&b1, &second).expect("execute");
                let mut encoder = PositionEncoder::new(&start);
                encoder.register_input(&b1, first);
                encoder.register_input(&b2, second);
                let key = encoder.position_hash(GameView::current(&b2));
                assert!(!is_reserved_key(key));
                keys.insert(key);
                count += 1;
            }
        }
        assert!(count >= 100);
        assert_eq!(keys.len(), count);
    }

    #[test]
    fn rebuild_matches_incremental_registration() {
        let start = Chess::default();
        let mut board = start.clone();
        let mut encoder = PositionEncoder::new(&start);
        let mut moves = Vec::new();
        for uci in ["e2e4", "e7e5", "g1f3", "b8c6"] {
            let (next, mv) = play(&board, uci);
            encoder.register_input(&next, mv);
            moves.push(mv);
            board = next;
        }
        let rebuilt = PositionEncoder::rebuild(&StandardRules, &start, &moves).expect("rebuild");
        assert_eq!(
            rebuilt.position_hash(GameView::current(&board)),
            encoder.position_hash(GameView::current(&board))
        );
    }

    #[test]
    fn king_liberty_uses_opponent_king_moves() {
        // black king on e8 with free squares d8 f8 d7 e7 f7
        let board = parse_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").expect("fen");
        let encoder = PositionEncoder::new(&board);
        let tensor = encoder.build_feature_tensor(GameView::current(&board));
        assert_eq!(tensor.plane_sum(KING_LIBERTY_PLANE), 5.0);
        assert_eq!(tensor.get(KING_LIBERTY_PLANE, Square::E7.to_usize()), 1.0);
    }
}
