//! Evaluator contract and the built-in evaluators.
//!
//! A real network plugs in by implementing `NeuralEvaluator`; the crate
//! ships a flat `UniformEvaluator` and a `MaterialEvaluator` that reads the
//! newest history slab of the tensor, both usable without any weights.

use crate::errors::{ChessError, ChessResult};
use crate::inputs::feature_planes::{
    FeatureTensor, ATTACK_PLANES_START, BOARD_SQUARES, SIDE_TO_MOVE_PLANE,
};
use crate::search::policy::MAX_POLICY_INDEX;

/// Evaluator output for one tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Expected outcome for the side to move, in [-1, 1].
    pub value: f32,
    /// Raw logits, `MAX_POLICY_INDEX` long.
    pub policy_logits: Vec<f32>,
}

pub trait NeuralEvaluator: Send {
    fn name(&self) -> &str;

    /// Evaluates a batch; output order matches input order.
    fn evaluate(&mut self, batch: &[FeatureTensor]) -> ChessResult<Vec<Evaluation>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UniformEvaluator;

impl NeuralEvaluator for UniformEvaluator {
    fn name(&self) -> &str {
        "uniform"
    }

    fn evaluate(&mut self, batch: &[FeatureTensor]) -> ChessResult<Vec<Evaluation>> {
        Ok(batch
            .iter()
            .map(|_| Evaluation {
                value: 0.0,
                policy_logits: vec![0.0; MAX_POLICY_INDEX],
            })
            .collect())
    }
}

/// Standard piece values for pawn, knight, bishop, rook, queen, king.
const PIECE_VALUES: [f32; 6] = [1.0, 3.0, 3.0, 5.0, 9.0, 0.0];
const MATERIAL_SCALE: f32 = 0.15;
const CAPTURE_BONUS: f32 = 2.0;

/// Material balance evaluator with a capture-seeking policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaterialEvaluator;

impl MaterialEvaluator {
    fn material(tensor: &FeatureTensor) -> f32 {
        let mut balance = 0.0;
        for (role, value) in PIECE_VALUES.iter().enumerate() {
            balance += value * tensor.plane_sum(role);
            balance -= value * tensor.plane_sum(role + 6);
        }
        balance
    }

    fn logits(tensor: &FeatureTensor) -> Vec<f32> {
        let mut logits = vec![0.0; MAX_POLICY_INDEX];
        let black = tensor.plane_sum(SIDE_TO_MOVE_PLANE) > 0.0;
        // opponent pieces we can capture live in the second half of the attack block
        for role in 0..6 {
            let plane = tensor.plane(ATTACK_PLANES_START + 6 + role);
            for (index, hit) in plane.iter().enumerate() {
                if *hit == 0.0 {
                    continue;
                }
                let to = if black { index ^ 56 } else { index };
                let bonus = CAPTURE_BONUS + PIECE_VALUES[role] * 0.1;
                for from in 0..BOARD_SQUARES {
                    logits[from * BOARD_SQUARES + to] = bonus;
                }
            }
        }
        logits
    }
}

impl NeuralEvaluator for MaterialEvaluator {
    fn name(&self) -> &str {
        "material"
    }

    fn evaluate(&mut self, batch: &[FeatureTensor]) -> ChessResult<Vec<Evaluation>> {
        Ok(batch
            .iter()
            .map(|tensor| Evaluation {
                value: (Self::material(tensor) * MATERIAL_SCALE).tanh(),
                policy_logits: Self::logits(tensor),
            })
            .collect())
    }
}

/// Resolves a configured evaluator reference; `None` means uniform.
pub fn evaluator_from_reference(reference: Option<&str>) -> ChessResult<Box<dyn NeuralEvaluator>> {
    match reference.map(str::trim) {
        None | Some("") | Some("uniform") => Ok(Box::new(UniformEvaluator)),
        Some("material") => Ok(Box::new(MaterialEvaluator)),
        Some(other) => Err(ChessError::UnknownEvaluator(other.to_owned())),
    }
}
