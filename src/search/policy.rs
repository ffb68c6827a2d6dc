//! Policy-vector indexing, normalization and PUCT scoring.
//!
//! Policy vectors are indexed by `from * 64 + to` (absolute squares, castling
//! as the king's move, queen promotions included). Under-promotions get a
//! dedicated block after the 4096 square pairs.

use rand::Rng;
use rand_distr::{Distribution, Gamma};
use shakmaty::Role;

use crate::game_state::chess_types::ChessMove;

const SQUARE_PAIRS: usize = 64 * 64;
const UNDERPROMOTION_PIECES: usize = 3;
const UNDERPROMOTION_DIRECTIONS: usize = 3;

/// Length of every raw policy vector produced by an evaluator.
pub const MAX_POLICY_INDEX: usize =
    SQUARE_PAIRS + UNDERPROMOTION_PIECES * 8 * UNDERPROMOTION_DIRECTIONS;

/// AlphaZero exploration schedule.
pub const CPUCT_INIT: f64 = 1.25;
pub const CPUCT_BASE: f64 = 19652.0;

/// Index of `mv` in a raw policy vector; `None` for the synthetic init move.
pub fn policy_index(mv: &ChessMove) -> Option<usize> {
    let from = mv.from_square()?;
    let to = mv.to_square()?;
    let piece = match mv.promotion() {
        Some(Role::Knight) => Some(0),
        Some(Role::Bishop) => Some(1),
        Some(Role::Rook) => Some(2),
        _ => None,
    };
    match piece {
        None => Some(from.to_usize() * 64 + to.to_usize()),
        Some(piece) => {
            // 0 = capture towards the a-file, 1 = push, 2 = capture towards the h-file
            let direction = (to.file().to_u32() as i32 - from.file().to_u32() as i32 + 1) as usize;
            let file = from.file().to_usize();
            Some(SQUARE_PAIRS + (piece * 8 + file) * UNDERPROMOTION_DIRECTIONS + direction)
        }
    }
}

/// Root exploration noise parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirichletNoise {
    pub alpha: f64,
    pub epsilon: f64,
}

impl Default for DirichletNoise {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            epsilon: 0.25,
        }
    }
}

impl DirichletNoise {
    /// Draws one sample of Dir(alpha, ..., alpha) of dimension `n`.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<f64> {
        let Ok(gamma) = Gamma::new(self.alpha, 1.0) else {
            return vec![1.0 / n.max(1) as f64; n];
        };
        let raw: Vec<f64> = (0..n).map(|_| gamma.sample(rng)).collect();
        let sum: f64 = raw.iter().sum();
        if sum <= 0.0 {
            return vec![1.0 / n.max(1) as f64; n];
        }
        raw.into_iter().map(|x| x / sum).collect()
    }
}

/// Softmax over `logits`, optionally blended with Dirichlet noise and
/// renormalized. The output may contain NaN if the input does; callers
/// treat that as fatal.
pub fn normalize_logits<R: Rng + ?Sized>(
    logits: &[f32],
    noise: Option<(&DirichletNoise, &mut R)>,
) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut probs: Vec<f64> = logits.iter().map(|&x| f64::from(x - max).exp()).collect();
    let sum: f64 = probs.iter().sum();
    for p in &mut probs {
        *p /= sum;
    }

    if let Some((params, rng)) = noise {
        let sample = params.sample(probs.len(), rng);
        for (p, n) in probs.iter_mut().zip(sample) {
            *p = (1.0 - params.epsilon) * *p + params.epsilon * n;
        }
        let sum: f64 = probs.iter().sum();
        for p in &mut probs {
            *p /= sum;
        }
    }
    probs.into_iter().map(|p| p as f32).collect()
}

/// Exploration constant growing slowly with parent visits, capped at `max_cpuct`.
#[inline]
pub fn dynamic_cpuct(parent_visits: u32, max_cpuct: f64) -> f64 {
    let grown = CPUCT_INIT + ((f64::from(parent_visits) + CPUCT_BASE + 1.0) / CPUCT_BASE).ln();
    grown.min(max_cpuct)
}

#[inline]
pub fn puct_score(q: f64, prior: f64, parent_visits: u32, child_visits: u32, cpuct: f64) -> f64 {
    q + cpuct * prior * f64::from(parent_visits).sqrt() / (1.0 + f64::from(child_visits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use rand::{rngs::StdRng, SeedableRng};
    use shakmaty::{Chess, Position};

    use crate::move_generation::move_generator::{parse_fen, RulesEngine, StandardRules};

    #[test]
    fn indices_are_unique_per_position() {
        let positions = [
            Chess::default(),
            parse_fen("r3k2r/1P6/8/8/8/8/6p1/R3K2R w KQkq - 0 1").expect("fen"),
            parse_fen("n1n5/1P6/8/8/8/8/8/4K2k w - - 0 1").expect("fen"),
        ];
        for pos in positions {
            let moves = StandardRules.legal_moves(&pos);
            let indexes: HashSet<usize> = moves
                .iter()
                .map(|m| policy_index(m).expect("real move"))
                .collect();
            assert_eq!(indexes.len(), moves.len());
            assert!(indexes.iter().all(|&i| i < MAX_POLICY_INDEX));
        }
    }

    #[test]
    fn underpromotions_use_tail_block() {
        let pos = parse_fen("n1n5/1P6/8/8/8/8/8/4K2k w - - 0 1").expect("fen");
        let tail = StandardRules
            .legal_moves(&pos)
            .iter()
            .filter(|m| policy_index(m).expect("index") >= 4096)
            .count();
        // knight, bishop, rook for push and both captures
        assert_eq!(tail, 9);
        assert_eq!(pos.legal_moves().len(), 12 + 5);
    }

    #[test]
    fn softmax_sums_to_one() {
        let probs = normalize_logits::<StdRng>(&[1.0, 2.0, 3.0], None);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn noisy_softmax_sums_to_one() {
        let mut rng = StdRng::seed_from_u64(7);
        let noise = DirichletNoise::default();
        let probs = normalize_logits(&[0.0; 20], Some((&noise, &mut rng)));
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs.iter().all(|p| *p >= 0.0));
    }

    #[test]
    fn cpuct_is_capped() {
        assert!((dynamic_cpuct(0, 10.0) - CPUCT_INIT).abs() < 1e-3);
        assert_eq!(dynamic_cpuct(10_000_000, 2.5), 2.5);
        assert!(puct_score(0.0, 0.5, 100, 0, 1.0) > puct_score(0.0, 0.5, 100, 10, 1.0));
    }
}
