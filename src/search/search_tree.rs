//! Arena-allocated MCTS tree.
//!
//! Nodes refer to each other by `NodeId` and to their evaluation by
//! `PositionKey`; the cache never owns a node and a node never owns its
//! cache entry, so a cache clear only requires re-resolving keys.
//!
//! `value_sum` is accumulated from the point of view of the side that played
//! the move leading into the node, so a parent always maximizes child Q.

use crate::cache::cache_value::PositionKey;
use crate::game_state::chess_types::ChessMove;
use crate::search::policy::{dynamic_cpuct, puct_score};

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Root,
    Intermediate,
    /// Forced outcome, bound to a sentinel key.
    Leaf,
}

#[derive(Debug, Clone)]
pub struct SearchNode {
    pub mv: Option<ChessMove>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub key: Option<PositionKey>,
    pub state: NodeState,
    pub visits: u32,
    pub value_sum: f32,
    pub virtual_loss: u32,
    pub prior: f32,
    pub expanded: bool,
}

impl SearchNode {
    fn new(mv: Option<ChessMove>, parent: Option<NodeId>, state: NodeState, prior: f32) -> Self {
        Self {
            mv,
            parent,
            children: Vec::new(),
            key: None,
            state,
            visits: 0,
            value_sum: 0.0,
            virtual_loss: 0,
            prior,
            expanded: false,
        }
    }

    /// Mean value; 0 for unvisited nodes.
    #[inline]
    pub fn q(&self) -> f32 {
        if self.visits == 0 {
            0.0
        } else {
            self.value_sum / self.visits as f32
        }
    }

    #[inline]
    pub fn effective_visits(&self) -> u32 {
        self.visits + self.virtual_loss
    }
}

#[derive(Debug, Clone)]
pub struct SearchTree {
    nodes: Vec<SearchNode>,
    root: NodeId,
}

impl Default for SearchTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![SearchNode::new(None, None, NodeState::Root, 1.0)],
            root: 0,
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &SearchNode {
        &self.nodes[id]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut SearchNode {
        &mut self.nodes[id]
    }

    /// Moves from the root down to `id`.
    pub fn moves_to(&self, id: NodeId) -> Vec<ChessMove> {
        let mut moves = Vec::new();
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            if let Some(mv) = self.nodes[current].mv {
                moves.push(mv);
            }
            current = parent;
        }
        moves.reverse();
        moves
    }

    fn child_score(&self, child: NodeId, parent_visits: u32, cpuct: f64) -> f64 {
        let c = &self.nodes[child];
        let n = c.effective_visits();
        // virtual losses count as visits worth -1
        let q = if n == 0 {
            0.0
        } else {
            (f64::from(c.value_sum) - f64::from(c.virtual_loss)) / f64::from(n)
        };
        puct_score(q, f64::from(c.prior), parent_visits.max(1), n, cpuct)
    }

    /// Descends by PUCT to an unexpanded or terminal node, adding one
    /// virtual loss to every node on the way.
    pub fn select_leaf(&mut self, max_cpuct: f64) -> NodeId {
        let mut current = self.root;
        self.nodes[current].virtual_loss += 1;
        loop {
            let node = &self.nodes[current];
            if node.state == NodeState::Leaf || !node.expanded || node.children.is_empty() {
                return current;
            }
            let parent_visits = node.effective_visits();
            let cpuct = dynamic_cpuct(parent_visits, max_cpuct);
            let mut best = node.children[0];
            let mut best_score = f64::NEG_INFINITY;
            for &child in &node.children {
                let score = self.child_score(child, parent_visits, cpuct);
                if score > best_score {
                    best_score = score;
                    best = child;
                }
            }
            current = best;
            self.nodes[current].virtual_loss += 1;
        }
    }

    /// Adds one child per move with a uniform prior. No-op when already
    /// expanded; returns whether children were created.
    pub fn expand(&mut self, id: NodeId, moves: &[ChessMove]) -> bool {
        if self.nodes[id].expanded {
            return false;
        }
        let prior = if moves.is_empty() {
            0.0
        } else {
            1.0 / moves.len() as f32
        };
        let mut children = Vec::with_capacity(moves.len());
        for mv in moves {
            let child = self.nodes.len();
            self.nodes.push(SearchNode::new(
                Some(*mv),
                Some(id),
                NodeState::Intermediate,
                prior,
            ));
            children.push(child);
        }
        let node = &mut self.nodes[id];
        node.children = children;
        node.expanded = true;
        true
    }

    /// Sets child priors in child order.
    pub fn set_priors(&mut self, id: NodeId, priors: &[f32]) {
        let children = self.nodes[id].children.clone();
        for (child, prior) in children.into_iter().zip(priors) {
            self.nodes[child].prior = *prior;
        }
    }

    pub fn mark_terminal(&mut self, id: NodeId, key: PositionKey) {
        let node = &mut self.nodes[id];
        node.state = NodeState::Leaf;
        node.key = Some(key);
        node.expanded = true;
    }

    /// Backs up `value` (side to move at `id`) to the root, removing the
    /// virtual loss applied during selection. Returns the visited path.
    pub fn backup(&mut self, id: NodeId, value: f32) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut v = -value;
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &mut self.nodes[node_id];
            node.visits += 1;
            node.value_sum += v;
            node.virtual_loss = node.virtual_loss.saturating_sub(1);
            path.push(node_id);
            v = -v;
            current = node.parent;
        }
        path
    }

    /// Undoes selection of an abandoned simulation.
    pub fn revert_virtual_loss(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &mut self.nodes[node_id];
            node.virtual_loss = node.virtual_loss.saturating_sub(1);
            current = node.parent;
        }
    }

    /// Root child with the most visits; ties go to the higher prior.
    pub fn best_child(&self) -> Option<NodeId> {
        self.nodes[self.root]
            .children
            .iter()
            .copied()
            .max_by(|&a, &b| {
                let (na, nb) = (&self.nodes[a], &self.nodes[b]);
                na.visits
                    .cmp(&nb.visits)
                    .then(na.prior.total_cmp(&nb.prior))
            })
    }

    /// Re-roots the tree on the child reached by `mv`, keeping its subtree.
    /// Starts a fresh tree when that child does not exist.
    pub fn advance_root(&mut self, mv: &ChessMove) -> bool {
        let target = self.nodes[self.root]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c].mv.is_some_and(|m| m.same_text(mv)));
        let Some(target) = target else {
            *self = SearchTree::new();
            return false;
        };

        let mut remap = vec![usize::MAX; self.nodes.len()];
        let mut order = vec![target];
        let mut cursor = 0;
        while cursor < order.len() {
            let id = order[cursor];
            remap[id] = cursor;
            order.extend(self.nodes[id].children.iter().copied());
            cursor += 1;
        }

        let mut nodes = Vec::with_capacity(order.len());
        for &old in &order {
            let mut node = self.nodes[old].clone();
            node.parent = node.parent.map(|p| remap[p]).filter(|p| *p != usize::MAX);
            node.children = node.children.iter().map(|c| remap[*c]).collect();
            node.virtual_loss = 0;
            nodes.push(node);
        }
        if nodes[0].state != NodeState::Leaf {
            nodes[0].state = NodeState::Root;
        }
        nodes[0].parent = None;
        self.nodes = nodes;
        self.root = 0;
        true
    }
}
