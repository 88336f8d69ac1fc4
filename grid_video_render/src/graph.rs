// Render graph.
//
// A grid video is described as a DAG of render operations before anything is
// rendered. Nodes live in an arena (`Vec<RenderNode>`) and refer to their
// inputs by `NodeId`. A node can only be added after all of its inputs, so
// every edge points from a higher id to a lower one and the graph cannot
// contain cycles.
//
// Identical nodes are interned: adding a node equal to an existing one (same
// operation, same inputs, same parameters) returns the existing id. Many
// notes trimmed to the same length from the same clip therefore share one
// node and are rendered once.
//
// Evaluation lives in `evaluate.rs`; this module only builds and orders.

use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use crate::error::RenderError;

pub type NodeId = usize;

/// One render operation.
#[derive(Debug, Clone)]
pub enum RenderNode {
    /// An existing file. Needs no rendering.
    Source(PathBuf),
    /// `[start, end)` seconds of the input.
    Trim { input: NodeId, start: f64, end: f64 },
    /// Inputs played back to back.
    Concat(Vec<NodeId>),
    /// Input video resized to `width` x `height`.
    Scale { input: NodeId, width: u32, height: u32 },
    /// Each cell's video placed at its position on a `canvas`-sized
    /// background of `color`.
    Overlay {
        cells: Vec<NodeId>,
        positions: Vec<(u32, u32)>,
        canvas: (u32, u32),
        color: String,
    },
    /// Audio track of the input.
    ExtractAudio(NodeId),
    /// Inputs' audio mixed together.
    Mix(Vec<NodeId>),
    /// Video of `video` with audio of `audio`, cut to the shorter stream.
    Mux { video: NodeId, audio: NodeId },
}

impl RenderNode {
    /// Ids of the nodes this one consumes, in input order.
    pub fn dependencies(&self) -> Vec<NodeId> {
        match self {
            RenderNode::Source(_) => Vec::new(),
            RenderNode::Trim { input, .. } | RenderNode::Scale { input, .. } => vec![*input],
            RenderNode::ExtractAudio(input) => vec![*input],
            RenderNode::Concat(inputs) | RenderNode::Mix(inputs) => inputs.clone(),
            RenderNode::Overlay { cells, .. } => cells.clone(),
            RenderNode::Mux { video, audio } => vec![*video, *audio],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RenderNode::Source(_) => "source",
            RenderNode::Trim { .. } => "trim",
            RenderNode::Concat(_) => "concat",
            RenderNode::Scale { .. } => "scale",
            RenderNode::Overlay { .. } => "overlay",
            RenderNode::ExtractAudio(_) => "extract-audio",
            RenderNode::Mix(_) => "mix",
            RenderNode::Mux { .. } => "mux",
        }
    }
}

// Trim bounds compare bitwise so that interning is well defined for every
// f64, NaN included.
impl PartialEq for RenderNode {
    fn eq(&self, other: &Self) -> bool {
        use RenderNode::*;
        match (self, other) {
            (Source(a), Source(b)) => a == b,
            (
                Trim { input, start, end },
                Trim {
                    input: i2,
                    start: s2,
                    end: e2,
                },
            ) => input == i2 && start.to_bits() == s2.to_bits() && end.to_bits() == e2.to_bits(),
            (Concat(a), Concat(b)) | (Mix(a), Mix(b)) => a == b,
            (
                Scale { input, width, height },
                Scale {
                    input: i2,
                    width: w2,
                    height: h2,
                },
            ) => input == i2 && width == w2 && height == h2,
            (
                Overlay {
                    cells,
                    positions,
                    canvas,
                    color,
                },
                Overlay {
                    cells: c2,
                    positions: p2,
                    canvas: cv2,
                    color: col2,
                },
            ) => cells == c2 && positions == p2 && canvas == cv2 && color == col2,
            (ExtractAudio(a), ExtractAudio(b)) => a == b,
            (Mux { video, audio }, Mux { video: v2, audio: a2 }) => video == v2 && audio == a2,
            _ => false,
        }
    }
}

impl Eq for RenderNode {}

impl Hash for RenderNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            RenderNode::Source(path) => path.hash(state),
            RenderNode::Trim { input, start, end } => {
                input.hash(state);
                start.to_bits().hash(state);
                end.to_bits().hash(state);
            }
            RenderNode::Concat(inputs) | RenderNode::Mix(inputs) => inputs.hash(state),
            RenderNode::Scale { input, width, height } => (input, width, height).hash(state),
            RenderNode::Overlay {
                cells,
                positions,
                canvas,
                color,
            } => (cells, positions, canvas, color).hash(state),
            RenderNode::ExtractAudio(input) => input.hash(state),
            RenderNode::Mux { video, audio } => (video, audio).hash(state),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderGraph {
    nodes: Vec<RenderNode>,
    interned: HashMap<RenderNode, NodeId>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, or return the id of an identical existing one.
    ///
    /// Fails if the node refers to an id not yet in the graph, or if a
    /// many-input operation has no inputs.
    pub fn add(&mut self, node: RenderNode) -> Result<NodeId, RenderError> {
        if let Some(&id) = self.interned.get(&node) {
            return Ok(id);
        }
        let id = self.nodes.len();
        let dependencies = node.dependencies();
        if dependencies.is_empty() && !matches!(node, RenderNode::Source(_)) {
            return Err(RenderError::EmptyNode(node.kind()));
        }
        if let Some(&dependency) = dependencies.iter().find(|&&d| d >= id) {
            return Err(RenderError::DanglingNode {
                node: id,
                dependency,
            });
        }
        self.interned.insert(node.clone(), id);
        self.nodes.push(node);
        Ok(id)
    }

    pub fn source(&mut self, path: impl Into<PathBuf>) -> NodeId {
        let node = RenderNode::Source(path.into());
        if let Some(&id) = self.interned.get(&node) {
            return id;
        }
        let id = self.nodes.len();
        self.interned.insert(node.clone(), id);
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> Result<&RenderNode, RenderError> {
        self.nodes.get(id).ok_or(RenderError::UnknownNode(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes reachable from `root`, dependencies before dependents.
    ///
    /// Kahn's algorithm over the reachable subgraph. Ties are broken by
    /// ascending id so the order is deterministic.
    pub fn topological_order(&self, root: NodeId) -> Result<Vec<NodeId>, RenderError> {
        self.node(root)?;

        let mut reachable = vec![false; self.nodes.len()];
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut reachable[id], true) {
                continue;
            }
            stack.extend(self.nodes[id].dependencies());
        }

        // Count distinct inputs only: a node listing the same input twice
        // still waits for it once.
        let mut pending = vec![0usize; self.nodes.len()];
        let mut dependents: Vec<Vec<NodeId>> = vec![Vec::new(); self.nodes.len()];
        for id in (0..self.nodes.len()).filter(|&id| reachable[id]) {
            let mut deps = self.nodes[id].dependencies();
            deps.sort_unstable();
            deps.dedup();
            pending[id] = deps.len();
            for dep in deps {
                dependents[dep].push(id);
            }
        }

        let mut ready: VecDeque<NodeId> = (0..self.nodes.len())
            .filter(|&id| reachable[id] && pending[id] == 0)
            .collect();
        let mut order = Vec::with_capacity(reachable.iter().filter(|&&r| r).count());
        while let Some(id) = ready.pop_front() {
            order.push(id);
            for &next in &dependents[id] {
                pending[next] -= 1;
                if pending[next] == 0 {
                    ready.push_back(next);
                }
            }
        }
        Ok(order)
    }
}
