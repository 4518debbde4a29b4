use super::node::Node;
use crate::error::Error;
use crate::error::Result;
use crate::mdp::measurement;
use crate::mdp::measurement::Measurement;
use petgraph::graph::DiGraph;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction::Outgoing;

/// the decision tree over the measurement space. nodes live in a petgraph
/// arena and edges carry the child slot, so routing order is explicit and
/// sibling order survives arbitrary splits. leaves carry the state numbers
/// that index the model's state array.
#[derive(Debug, Clone)]
pub struct Tree {
    graph: DiGraph<Node, usize>,
    root: NodeIndex,
}

impl Tree {
    /// a fresh tree is a single leaf standing for state zero.
    pub fn new() -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(Node::Leaf { num: 0 });
        Self { graph, root }
    }

    /// the state number the measurement routes to: at every router, the first
    /// threshold the value falls below picks the child, the last child catches
    /// everything else.
    pub fn route(&self, measurement: &Measurement) -> Result<usize> {
        let mut index = self.root;
        loop {
            match self.node(index) {
                Node::Leaf { num } => return Ok(*num),
                Node::Internal {
                    parameter,
                    thresholds,
                } => {
                    let value = measurement::require(measurement, parameter)?;
                    let slot = thresholds
                        .iter()
                        .position(|threshold| value < *threshold)
                        .unwrap_or(thresholds.len());
                    index = self.child(index, slot)?;
                }
            }
        }
    }

    /// in-order state numbers of every leaf.
    pub fn leaves(&self) -> Vec<usize> {
        let mut leaves = Vec::new();
        self.collect(self.root, &mut leaves);
        leaves
    }

    /// replace the leaf standing for the given state with a router over the
    /// thresholds. the first fresh leaf reuses the dissolved state's number,
    /// the rest take numbers off the tail of the state array; all are returned
    /// in slot order.
    pub fn split(
        &mut self,
        num: usize,
        parameter: &str,
        thresholds: &[f64],
        total: usize,
    ) -> Result<Vec<usize>> {
        let index = self.find(num).ok_or_else(|| {
            Error::Internal(format!("tried to replace leaf {} but it is not in the tree", num))
        })?;
        *self
            .graph
            .node_weight_mut(index)
            .expect("indices never leave the arena") = Node::Internal {
            parameter: parameter.to_string(),
            thresholds: thresholds.to_vec(),
        };
        let nums = std::iter::once(num)
            .chain((0..thresholds.len()).map(|i| total + i))
            .collect::<Vec<_>>();
        for (slot, &leaf) in nums.iter().enumerate() {
            let child = self.graph.add_node(Node::Leaf { num: leaf });
            self.graph.add_edge(index, child, slot);
        }
        Ok(nums)
    }

    fn node(&self, index: NodeIndex) -> &Node {
        self.graph
            .node_weight(index)
            .expect("indices never leave the arena")
    }

    fn collect(&self, index: NodeIndex, leaves: &mut Vec<usize>) {
        match self.node(index) {
            Node::Leaf { num } => leaves.push(*num),
            Node::Internal { .. } => {
                for child in self.children(index) {
                    self.collect(child, leaves);
                }
            }
        }
    }

    /// children in slot order.
    fn children(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut children = self
            .graph
            .edges_directed(index, Outgoing)
            .map(|edge| (*edge.weight(), edge.target()))
            .collect::<Vec<_>>();
        children.sort_by_key(|(slot, _)| *slot);
        children.into_iter().map(|(_, child)| child).collect()
    }

    fn child(&self, index: NodeIndex, slot: usize) -> Result<NodeIndex> {
        self.graph
            .edges_directed(index, Outgoing)
            .find(|edge| *edge.weight() == slot)
            .map(|edge| edge.target())
            .ok_or_else(|| Error::Internal(format!("router is missing child slot {}", slot)))
    }

    fn find(&self, num: usize) -> Option<NodeIndex> {
        self.graph.node_indices().find(|&index| {
            matches!(self.graph.node_weight(index), Some(Node::Leaf { num: leaf }) if *leaf == num)
        })
    }

    fn render(&self, index: NodeIndex, depth: usize, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let indent = "  ".repeat(depth);
        match self.node(index) {
            Node::Leaf { num } => writeln!(f, "{}state {}", indent, num),
            Node::Internal {
                parameter,
                thresholds,
            } => {
                writeln!(f, "{}{} @ {:?}", indent, parameter, thresholds)?;
                for child in self.children(index) {
                    self.render(child, depth + 1, f)?;
                }
                Ok(())
            }
        }
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.render(self.root, 0, f)
    }
}
