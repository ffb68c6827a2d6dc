//! Plane layout of the evaluator input and the tensor containers.
//!
//! All planes are 8x8, stored row-major by square index (a1 = 0, h8 = 63)
//! after orientation to the perspective of the side to move: when Black is
//! to move, ranks are mirrored so the mover always plays "up the board".

use shakmaty::{Color, Piece, Role, Square};

pub const BOARD_SQUARES: usize = 64;

/// 6 own piece planes, 6 opponent piece planes, 1 repetition plane.
pub const PLANES_PER_POSITION: usize = 13;
pub const REPETITION_PLANE: usize = 12;
pub const HISTORY_POSITIONS: usize = 8;
pub const HISTORY_PLANES: usize = HISTORY_POSITIONS * PLANES_PER_POSITION;

pub const MOVE_PLANES_START: usize = HISTORY_PLANES;
pub const ATTACK_PLANES_START: usize = MOVE_PLANES_START + 12;
pub const PAWN_ADVANCE_OWN_PLANE: usize = ATTACK_PLANES_START + 12;
pub const PAWN_ADVANCE_OPPONENT_PLANE: usize = PAWN_ADVANCE_OWN_PLANE + 1;
pub const KING_LIBERTY_PLANE: usize = PAWN_ADVANCE_OPPONENT_PLANE + 1;
/// White queenside, White kingside, Black queenside, Black kingside.
pub const CASTLING_PLANES_START: usize = KING_LIBERTY_PLANE + 1;
pub const SIDE_TO_MOVE_PLANE: usize = CASTLING_PLANES_START + 4;
pub const FIFTY_MOVE_PLANE: usize = SIDE_TO_MOVE_PLANE + 1;
pub const EDGE_PLANE: usize = FIFTY_MOVE_PLANE + 1;
pub const FEATURE_PLANES: usize = EDGE_PLANE + 1;

const _: () = assert!(FEATURE_PLANES == 138);

#[inline]
pub const fn role_index(role: Role) -> usize {
    match role {
        Role::Pawn => 0,
        Role::Knight => 1,
        Role::Bishop => 2,
        Role::Rook => 3,
        Role::Queen => 4,
        Role::King => 5,
    }
}

/// Plane of `piece` within a 12-plane piece block seen from `perspective`.
#[inline]
pub fn piece_plane(piece: Piece, perspective: Color) -> usize {
    let base = if piece.color == perspective { 0 } else { 6 };
    base + role_index(piece.role)
}

/// Square index after orienting the board to `perspective`.
#[inline]
pub fn oriented_index(sq: Square, perspective: Color) -> usize {
    match perspective {
        Color::White => sq.to_usize(),
        Color::Black => sq.flip_vertical().to_usize(),
    }
}

/// A 13-plane slab describing one position from one side's perspective.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPosition {
    perspective: Color,
    planes: Vec<f32>,
}

impl EncodedPosition {
    pub fn empty(perspective: Color) -> Self {
        Self {
            perspective,
            planes: vec![0.0; PLANES_PER_POSITION * BOARD_SQUARES],
        }
    }

    #[inline]
    pub fn perspective(&self) -> Color {
        self.perspective
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.planes
    }

    #[inline]
    pub fn get(&self, plane: usize, index: usize) -> f32 {
        self.planes[plane * BOARD_SQUARES + index]
    }

    #[inline]
    pub(crate) fn set(&mut self, plane: usize, index: usize, value: f32) {
        self.planes[plane * BOARD_SQUARES + index] = value;
    }

    /// Copy of this slab as seen from `perspective`: own and opponent
    /// blocks swap and ranks mirror when the perspective differs.
    pub fn oriented(&self, perspective: Color) -> EncodedPosition {
        if perspective == self.perspective {
            return self.clone();
        }
        let mut out = EncodedPosition::empty(perspective);
        for plane in 0..PLANES_PER_POSITION {
            let target = match plane {
                0..=5 => plane + 6,
                6..=11 => plane - 6,
                _ => plane,
            };
            for index in 0..BOARD_SQUARES {
                // rank mirror: a1 <-> a8
                out.set(target, index ^ 56, self.get(plane, index));
            }
        }
        out
    }
}

/// Full evaluator input: `FEATURE_PLANES` planes of 64 squares.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTensor {
    data: Vec<f32>,
}

impl Default for FeatureTensor {
    fn default() -> Self {
        Self::zeros()
    }
}

impl FeatureTensor {
    pub fn zeros() -> Self {
        Self {
            data: vec![0.0; FEATURE_PLANES * BOARD_SQUARES],
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn plane(&self, plane: usize) -> &[f32] {
        &self.data[plane * BOARD_SQUARES..(plane + 1) * BOARD_SQUARES]
    }

    #[inline]
    pub fn get(&self, plane: usize, index: usize) -> f32 {
        self.data[plane * BOARD_SQUARES + index]
    }

    #[inline]
    pub(crate) fn set(&mut self, plane: usize, index: usize, value: f32) {
        self.data[plane * BOARD_SQUARES + index] = value;
    }

    pub(crate) fn fill_plane(&mut self, plane: usize, value: f32) {
        self.data[plane * BOARD_SQUARES..(plane + 1) * BOARD_SQUARES].fill(value);
    }

    /// Writes a history slab into history slot `slot` (0 = newest).
    pub(crate) fn write_slab(&mut self, slot: usize, slab: &EncodedPosition) {
        let start = slot * PLANES_PER_POSITION * BOARD_SQUARES;
        self.data[start..start + PLANES_PER_POSITION * BOARD_SQUARES]
            .copy_from_slice(slab.as_slice());
    }

    #[inline]
    pub fn plane_sum(&self, plane: usize) -> f32 {
        self.plane(plane).iter().sum()
    }
}
