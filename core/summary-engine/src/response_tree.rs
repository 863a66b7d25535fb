//! FILENAME: core/summary-engine/src/response_tree.rs
//! Response Tree - orders the flat answer for display.
//!
//! The answer of the DP is a set of cube nodes whose tree ancestors are not
//! necessarily part of the answer. This module:
//! 1. Sorts the answer in pre-order (descending `DimensionValues`)
//! 2. Links every node to the closest preceding node sharing its prefix,
//!    inserting placeholder nodes where a common ancestor is missing
//! 3. Orders siblings by the cost of their subtree, largest first
//! 4. Flattens the tree back into a list
//!
//! Display costs are measured against the top node's original totals and
//! returned next to the order, leaving the selection costs on the cube
//! nodes untouched.

use cube::{compare_f64, CostFunction, CubeTree, NodeId};
use rustc_hash::FxHashMap;

/// Display order and display costs of an answer.
#[derive(Debug, Clone, Default)]
pub struct SortedResponse {
    pub nodes: Vec<NodeId>,
    pub costs: FxHashMap<NodeId, f64>,
}

impl SortedResponse {
    /// The display cost of `node`, or its selection cost if it was never
    /// re-scored (the top node).
    pub fn cost_of(&self, tree: &CubeTree, node: NodeId) -> f64 {
        self.costs
            .get(&node)
            .copied()
            .unwrap_or_else(|| tree.node(node).cost())
    }
}

#[derive(Debug, Clone)]
struct ResponseTreeNode {
    /// `None` for a placeholder of a missing common ancestor.
    cube_node: Option<NodeId>,
    level: usize,
    parent: Option<usize>,
    children: Vec<usize>,
    subtree_cost: f64,
}

struct ResponseTreeBuilder<'a, C: CostFunction> {
    tree: &'a CubeTree,
    cost_function: &'a C,
    top: NodeId,
    nodes: Vec<ResponseTreeNode>,
    costs: FxHashMap<NodeId, f64>,
}

impl<'a, C: CostFunction> ResponseTreeBuilder<'a, C> {
    fn new(tree: &'a CubeTree, cost_function: &'a C, top: NodeId) -> Self {
        ResponseTreeBuilder {
            tree,
            cost_function,
            top,
            nodes: Vec::new(),
            costs: FxHashMap::default(),
        }
    }

    fn push(&mut self, cube_node: Option<NodeId>, level: usize, parent: Option<usize>) -> usize {
        self.nodes.push(ResponseTreeNode {
            cube_node,
            level,
            parent,
            children: Vec::new(),
            subtree_cost: 0.0,
        });
        self.nodes.len() - 1
    }

    /// Finds (or creates) the display parent shared by `previous` and `next`.
    ///
    /// The target level is the length of the common dimension-value prefix.
    /// Walking up from `previous`, the first node at that level is the parent;
    /// if the walk skips over that level, the node just above the gap is
    /// split: its content moves into a new child and it becomes a placeholder
    /// at the target level.
    fn common_parent(&mut self, previous: usize, next: NodeId) -> usize {
        let target_level = match self.nodes[previous].cube_node {
            Some(id) => self
                .tree
                .dimension_values(id)
                .common_prefix_len(self.tree.dimension_values(next)),
            None => 0,
        };

        let mut node = previous;
        let mut pre_node = previous;
        loop {
            let level = self.nodes[node].level;
            if level == target_level {
                return node;
            }
            if level < target_level {
                let moved = self.split_placeholder(pre_node, target_level);
                debug_assert_eq!(self.nodes[moved].parent, Some(pre_node));
                return pre_node;
            }
            pre_node = node;
            node = match self.nodes[node].parent {
                Some(parent) => parent,
                None => panic!(
                    "response tree has no common ancestor at level {} for {}",
                    target_level,
                    self.tree.dimension_values(next)
                ),
            };
        }
    }

    /// Moves the content of `index` into a fresh child and turns `index`
    /// into a placeholder at `level`. Returns the new child.
    fn split_placeholder(&mut self, index: usize, level: usize) -> usize {
        let cube_node = self.nodes[index].cube_node.take();
        let old_level = self.nodes[index].level;
        let children = std::mem::take(&mut self.nodes[index].children);

        let moved = self.push(cube_node, old_level, Some(index));
        for &child in &children {
            self.nodes[child].parent = Some(moved);
        }
        self.nodes[moved].children = children;
        self.nodes[index].children.push(moved);
        self.nodes[index].level = level;
        moved
    }

    /// Change ratio of the node, or of its closest real ancestor for a
    /// placeholder.
    fn current_change_ratio(&self, index: usize) -> f64 {
        let mut current = index;
        loop {
            let node = &self.nodes[current];
            if let Some(id) = node.cube_node {
                return self.tree.node(id).change_ratio();
            }
            current = match node.parent {
                Some(parent) => parent,
                None => return 1.0,
            };
        }
    }

    fn sort_child_nodes(&mut self, index: usize) {
        if self.nodes[index].children.is_empty() {
            return;
        }
        let children = self.nodes[index].children.clone();
        for &child in &children {
            self.sort_child_nodes(child);
        }
        let ratio = self.current_change_ratio(index);
        for &child in &children {
            self.compute_cost(child, ratio);
        }
        let mut children = children;
        children.sort_by(|a, b| compare_f64(self.nodes[*b].subtree_cost, self.nodes[*a].subtree_cost));
        self.nodes[index].children = children;
    }

    fn compute_cost(&mut self, index: usize, target_ratio: f64) {
        let own_cost = match self.nodes[index].cube_node {
            Some(id) => {
                let node = self.tree.node(id);
                let top = self.tree.node(self.top).original_values();
                let cost = self.cost_function.compute_cost(
                    target_ratio,
                    node.baseline_value(),
                    node.current_value(),
                    node.baseline_size(),
                    node.current_size(),
                    top.baseline_value(),
                    top.current_value(),
                    top.baseline_size(),
                    top.current_size(),
                );
                self.costs.insert(id, cost);
                cost
            }
            None => 0.0,
        };
        self.nodes[index].subtree_cost = own_cost;

        let children = self.nodes[index].children.clone();
        for child in children {
            self.compute_cost(child, target_ratio);
            self.nodes[index].subtree_cost += self.nodes[child].subtree_cost;
        }
    }

    fn flatten(&self, index: usize, out: &mut Vec<NodeId>) {
        let node = &self.nodes[index];
        if let Some(id) = node.cube_node {
            out.push(id);
        }
        for &child in &node.children {
            self.flatten(child, out);
        }
    }
}

/// Orders the answer nodes for display.
///
/// The top node is the root if it is part of the answer, otherwise the first
/// node given.
///
/// # Panics
/// Panics if two answer nodes share no ancestor inside the answer, which
/// cannot happen when the root is part of it.
pub fn sort_response_tree<C: CostFunction>(
    tree: &CubeTree,
    answer: &[NodeId],
    cost_function: &C,
) -> SortedResponse {
    let Some(&first) = answer.first() else {
        return SortedResponse::default();
    };
    let top = answer
        .iter()
        .copied()
        .find(|id| tree.level(*id) == 0)
        .unwrap_or(first);

    let mut ordered = answer.to_vec();
    ordered.sort_by(|a, b| tree.dimension_values(*b).cmp(tree.dimension_values(*a)));

    let mut builder = ResponseTreeBuilder::new(tree, cost_function, top);
    let mut previous: Option<usize> = None;
    for &id in &ordered {
        let parent = previous.map(|pre| builder.common_parent(pre, id));
        let index = builder.push(Some(id), tree.level(id), parent);
        if let Some(parent) = parent {
            builder.nodes[parent].children.push(index);
        }
        previous = Some(index);
    }

    builder.sort_child_nodes(0);
    let mut nodes = Vec::with_capacity(ordered.len());
    builder.flatten(0, &mut nodes);

    SortedResponse {
        nodes,
        costs: builder.costs,
    }
}
