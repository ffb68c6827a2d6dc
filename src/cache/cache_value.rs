//! One cached evaluation: value, policy and search bookkeeping.
//!
//! A `CacheValue` is created uninitialized by whichever worker first claims
//! its key, filled exactly once with the evaluator output, and afterwards
//! only touched by policy normalization and propagate-count bookkeeping.
//! Raw logits are kept dense until the entry is bound to a search node;
//! after that only the logits of legal moves are retained.

use std::time::Duration;

use log::debug;
use parking_lot::{Condvar, Mutex};
use rand::{rngs::StdRng, SeedableRng};

use crate::errors::{ChessError, ChessResult};
use crate::search::policy::{normalize_logits, DirichletNoise, MAX_POLICY_INDEX};
use crate::search::search_tree::NodeId;

pub type PositionKey = i64;

/// Sentinel keys for forced outcomes, from the side to move's point of view.
pub const LOSS_KEY: PositionKey = -1;
pub const DRAW_KEY: PositionKey = 0;
pub const WIN_KEY: PositionKey = 1;

#[inline]
pub fn is_reserved_key(key: PositionKey) -> bool {
    (LOSS_KEY..=WIN_KEY).contains(&key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Intermediate,
    Root,
    /// Forced outcome; never normalized or re-evaluated.
    Leaf,
}

/// Binds an entry to the search node reading it.
#[derive(Debug, Clone)]
pub struct NodeBinding {
    pub node: NodeId,
    /// Policy indexes of the node's legal child moves, in child order.
    pub legal_indexes: Vec<usize>,
    /// Noise parameters when the node is the search root.
    pub root_noise: Option<DirichletNoise>,
    /// Seed for the noise draw.
    pub seed: u64,
}

#[derive(Debug)]
enum RawLogits {
    None,
    Dense(Vec<f32>),
    /// `(policy index, logit)` restricted to the bound node's legal moves.
    Legal(Vec<(usize, f32)>),
}

#[derive(Debug)]
struct CacheState {
    value: f32,
    raw: RawLogits,
    policy: Vec<(usize, f32)>,
    kind: CacheKind,
    initialized: bool,
    binding: Option<NodeBinding>,
    propagate_count: u32,
}

#[derive(Debug)]
pub struct CacheValue {
    key: PositionKey,
    label: String,
    dirichlet: bool,
    state: Mutex<CacheState>,
    ready: Condvar,
}

impl CacheValue {
    pub(crate) fn new(key: PositionKey, label: impl Into<String>, dirichlet: bool) -> Self {
        Self {
            key,
            label: label.into(),
            dirichlet,
            state: Mutex::new(CacheState {
                value: 0.0,
                raw: RawLogits::None,
                policy: Vec::new(),
                kind: CacheKind::Intermediate,
                initialized: false,
                binding: None,
                propagate_count: 0,
            }),
            ready: Condvar::new(),
        }
    }

    pub(crate) fn sentinel(key: PositionKey, label: &str, value: f32) -> Self {
        let entry = Self::new(key, label, false);
        {
            let mut state = entry.state.lock();
            state.value = value;
            state.kind = CacheKind::Leaf;
            state.initialized = true;
        }
        entry
    }

    #[inline]
    pub fn key(&self) -> PositionKey {
        self.key
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether this position's side asked for root exploration noise.
    #[inline]
    pub fn is_dirichlet(&self) -> bool {
        self.dirichlet
    }

    pub fn value(&self) -> f32 {
        self.state.lock().value
    }

    pub fn kind(&self) -> CacheKind {
        self.state.lock().kind
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn owner(&self) -> Option<NodeId> {
        self.state.lock().binding.as_ref().map(|b| b.node)
    }

    pub fn propagate_count(&self) -> u32 {
        self.state.lock().propagate_count
    }

    /// Normalized `(policy index, probability)` pairs; empty until the
    /// entry is both initialized and bound.
    pub fn policy(&self) -> Vec<(usize, f32)> {
        self.state.lock().policy.clone()
    }

    /// Policy expanded to `MAX_POLICY_INDEX` entries, zero off the legal set.
    pub fn dense_policies(&self) -> Vec<f32> {
        let mut dense = vec![0.0; MAX_POLICY_INDEX];
        for (index, p) in self.state.lock().policy.iter() {
            dense[*index] = *p;
        }
        dense
    }

    /// Blocks until the entry is initialized or `timeout` elapses.
    pub fn wait_initialized(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if state.initialized {
            return true;
        }
        let _ = self
            .ready
            .wait_while_for(&mut state, |s| !s.initialized, timeout);
        state.initialized
    }

    pub(crate) fn fill(&self, value: f32, logits: Vec<f32>) -> ChessResult<()> {
        if logits.len() != MAX_POLICY_INDEX {
            return Err(ChessError::PolicyLength {
                key: self.key,
                got: logits.len(),
                expected: MAX_POLICY_INDEX,
            });
        }
        let mut state = self.state.lock();
        if state.initialized {
            debug!("entry {} ({}) already filled, keeping first result", self.key, self.label);
            return Ok(());
        }
        state.value = value;
        state.raw = RawLogits::Dense(logits);
        state.initialized = true;
        let result = if state.binding.is_some() {
            self.normalize_locked(&mut state)
        } else {
            Ok(())
        };
        self.ready.notify_all();
        result
    }

    pub(crate) fn bind(&self, binding: NodeBinding) -> ChessResult<()> {
        let mut state = self.state.lock();
        if state.kind == CacheKind::Leaf {
            state.binding = Some(binding);
            return Ok(());
        }
        state.kind = if binding.root_noise.is_some() {
            CacheKind::Root
        } else {
            CacheKind::Intermediate
        };
        state.binding = Some(binding);
        if state.initialized {
            self.normalize_locked(&mut state)
        } else {
            Ok(())
        }
    }

    pub(crate) fn set_kind(&self, kind: CacheKind) {
        let mut state = self.state.lock();
        if state.kind != CacheKind::Leaf {
            state.kind = kind;
        }
    }

    pub(crate) fn inc_propagate(&self) {
        self.state.lock().propagate_count += 1;
    }

    pub(crate) fn reset_propagate(&self) {
        self.state.lock().propagate_count = 0;
    }

    fn normalize_locked(&self, state: &mut CacheState) -> ChessResult<()> {
        if state.kind == CacheKind::Leaf {
            return Ok(());
        }
        let Some(binding) = state.binding.as_ref() else {
            return Ok(());
        };

        let legal: Vec<(usize, f32)> = match &state.raw {
            RawLogits::None => return Ok(()),
            RawLogits::Dense(dense) => binding
                .legal_indexes
                .iter()
                .map(|&i| (i, dense.get(i).copied().unwrap_or(0.0)))
                .collect(),
            RawLogits::Legal(kept) => binding
                .legal_indexes
                .iter()
                .map(|&i| {
                    let logit = kept
                        .iter()
                        .find(|(k, _)| *k == i)
                        .map(|(_, l)| *l)
                        .unwrap_or(0.0);
                    (i, logit)
                })
                .collect(),
        };

        let logits: Vec<f32> = legal.iter().map(|(_, l)| *l).collect();
        let noise = binding.root_noise.filter(|_| self.dirichlet);
        let probs = match noise {
            Some(params) => {
                let mut rng = StdRng::seed_from_u64(binding.seed ^ self.key as u64);
                normalize_logits(&logits, Some((&params, &mut rng)))
            }
            None => normalize_logits::<StdRng>(&logits, None),
        };
        if probs.iter().any(|p| p.is_nan()) {
            return Err(ChessError::NanPolicy {
                key: self.key,
                label: self.label.clone(),
            });
        }

        state.policy = legal.iter().map(|(i, _)| *i).zip(probs).collect();
        state.raw = RawLogits::Legal(legal);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(legal: &[usize], noise: bool) -> NodeBinding {
        NodeBinding {
            node: 3,
            legal_indexes: legal.to_vec(),
            root_noise: noise.then(DirichletNoise::default),
            seed: 1,
        }
    }

    fn logits() -> Vec<f32> {
        (0..MAX_POLICY_INDEX).map(|i| (i % 7) as f32 * 0.1).collect()
    }

    fn assert_distribution(entry: &CacheValue, legal: &[usize]) {
        let dense = entry.dense_policies();
        let sum: f32 = dense.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4, "sum was {sum}");
        for (i, p) in dense.iter().enumerate() {
            if !legal.contains(&i) {
                assert_eq!(*p, 0.0, "illegal index {i} has mass");
            }
        }
    }

    #[test]
    fn normalization_waits_for_binding() {
        let entry = CacheValue::new(42, "pos", false);
        entry.fill(0.5, logits()).expect("fill");
        assert!(entry.is_initialized());
        assert!(entry.policy().is_empty());
        entry.bind(binding(&[12, 28, 700], false)).expect("bind");
        assert_distribution(&entry, &[12, 28, 700]);
        assert_eq!(entry.owner(), Some(3));
    }

    #[test]
    fn normalization_on_fill_when_already_bound() {
        let entry = CacheValue::new(42, "pos", true);
        entry.bind(binding(&[1, 2, 3, 4], true)).expect("bind");
        assert_eq!(entry.kind(), CacheKind::Root);
        entry.fill(0.0, logits()).expect("fill");
        assert_distribution(&entry, &[1, 2, 3, 4]);
    }

    #[test]
    fn rebinding_renormalizes_from_retained_logits() {
        let entry = CacheValue::new(9, "pos", true);
        entry.fill(0.0, logits()).expect("fill");
        entry.bind(binding(&[5, 6], false)).expect("bind");
        let plain = entry.policy();
        entry.bind(binding(&[5, 6], true)).expect("rebind as root");
        assert_distribution(&entry, &[5, 6]);
        assert_ne!(plain, entry.policy());
    }

    #[test]
    fn nan_logits_are_fatal() {
        let entry = CacheValue::new(9, "broken", false);
        entry.bind(binding(&[0, 1], false)).expect("bind");
        let mut raw = logits();
        raw[1] = f32::NAN;
        assert!(matches!(
            entry.fill(0.0, raw),
            Err(ChessError::NanPolicy { key: 9, .. })
        ));
    }

    #[test]
    fn wrong_policy_length_is_rejected() {
        let entry = CacheValue::new(9, "short", false);
        assert!(matches!(
            entry.fill(0.0, vec![0.0; 10]),
            Err(ChessError::PolicyLength { got: 10, .. })
        ));
        assert!(!entry.is_initialized());
    }

    #[test]
    fn second_fill_keeps_first_result() {
        let entry = CacheValue::new(11, "pos", false);
        entry.fill(0.75, logits()).expect("fill");
        entry.fill(-0.5, vec![0.0; MAX_POLICY_INDEX]).expect("refill");
        assert_eq!(entry.value(), 0.75);
        entry.bind(binding(&[0, 6], false)).expect("bind");
        let policy = entry.policy();
        assert!(policy[1].1 > policy[0].1);
    }

    #[test]
    fn sentinels_are_initialized_leaves() {
        let win = CacheValue::sentinel(WIN_KEY, "win", 1.0);
        assert!(win.is_initialized());
        assert_eq!(win.kind(), CacheKind::Leaf);
        win.set_kind(CacheKind::Root);
        assert_eq!(win.kind(), CacheKind::Leaf);
        assert!(win.wait_initialized(Duration::from_millis(1)));
    }
}
