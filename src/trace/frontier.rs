//! Arena-backed search frontier.

use crate::types::{LatticePoint, Offset};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// One discovered border point. Nodes are never mutated once pushed; `parent` is an index
/// into the same arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontierNode {
    pub cost: u64,
    pub position: LatticePoint,
    /// Neighbour direction that proved this point a border point
    pub offset: Offset,
    pub parent: Option<usize>,
}

/// Priority queue of arena indices, ordered by `(cost, x, y)` ascending.
///
/// Arena index 0 is always the root: the start point, or the most recent checkpoint after
/// [`Frontier::rebase`].
#[derive(Debug)]
pub struct Frontier {
    nodes: Vec<FrontierNode>,
    heap: BinaryHeap<Reverse<(u64, i64, i64, usize)>>,
}

impl Frontier {
    /// Create a frontier whose only entry is the root
    pub fn with_root(position: LatticePoint, offset: Offset) -> Self {
        let mut frontier = Self {
            nodes: Vec::new(),
            heap: BinaryHeap::new(),
        };
        frontier.insert(FrontierNode {
            cost: 0,
            position,
            offset,
            parent: None,
        });
        frontier
    }

    fn insert(&mut self, node: FrontierNode) -> usize {
        let index = self.nodes.len();
        self.heap.push(Reverse((
            node.cost,
            node.position.x,
            node.position.y,
            index,
        )));
        self.nodes.push(node);
        index
    }

    pub fn push(&mut self, cost: u64, position: LatticePoint, offset: Offset, parent: usize) -> usize {
        self.insert(FrontierNode {
            cost,
            position,
            offset,
            parent: Some(parent),
        })
    }

    /// Pop the cheapest entry
    pub fn pop(&mut self) -> Option<usize> {
        self.heap.pop().map(|Reverse((_, _, _, index))| index)
    }

    pub fn node(&self, index: usize) -> &FrontierNode {
        &self.nodes[index]
    }

    /// Entries waiting to be popped
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Nodes held in the arena, popped or not
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    /// Positions from just below the root down to `index`, in discovery order.
    pub fn path_from_root(&self, index: usize) -> Vec<LatticePoint> {
        let mut path = Vec::new();
        let mut cursor = Some(index);
        while let Some(i) = cursor {
            let node = &self.nodes[i];
            if node.parent.is_none() {
                break;
            }
            path.push(node.position);
            cursor = node.parent;
        }
        path.reverse();
        path
    }

    /// Make the node at `index` the new root and drop every other popped node.
    ///
    /// Unit edge weights keep every waiting entry within one step of the popped cost, so each
    /// waiting entry is re-parented directly onto the new root.
    pub fn rebase(&mut self, index: usize) {
        let root = FrontierNode {
            parent: None,
            ..self.nodes[index]
        };
        let waiting: Vec<FrontierNode> = std::mem::take(&mut self.heap)
            .into_sorted_vec()
            .into_iter()
            .rev()
            .map(|Reverse((_, _, _, i))| self.nodes[i])
            .collect();

        self.nodes.clear();
        self.nodes.push(root);
        for node in waiting {
            self.insert(FrontierNode {
                parent: Some(0),
                ..node
            });
        }
    }
}
