//! Flow graphs: the occurrences reachable from one start occurrence along
//! data-dependence edges, with a shortest-path tree for enumeration.
//!
//! The number of distinct paths through such a graph can be exponential in
//! its size; enumeration therefore works off a breadth-first shortest-path
//! tree (smaller node ids win ties) and offers bounded policies instead of
//! raw path enumeration.

use std::collections::HashMap;

use estree::NodeId;
use pdg::Pdg;

use crate::flow::Flow;

/// Which flows to enumerate from a flow graph. A trade-off between runtime
/// and recall; every policy is deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowPolicy {
    /// One shortest flow per reachable occurrence. Full node coverage,
    /// linear in the graph size. The default.
    #[default]
    OnePerNode,
    /// One shortest flow per occurrence without outgoing edges. May miss
    /// intermediate nodes but yields only "finished" flows.
    OnePerFinalNode,
    /// A single greedy flow; cheap, mostly for tests.
    JustOne,
}

#[derive(Debug)]
pub struct FlowGraph {
    start: NodeId,
    /// Reachable occurrences in breadth-first discovery order.
    nodes: Vec<NodeId>,
    children: HashMap<NodeId, Vec<NodeId>>,
    predecessor: HashMap<NodeId, NodeId>,
    /// Occurrences whose expansion was cut by the depth bound.
    truncated_at: Vec<NodeId>,
}

impl FlowGraph {
    /// Explores everything reachable from `start` along forward
    /// data-dependence edges. `depth_limit` of `None` is unbounded; cycles
    /// terminate through the visited set either way.
    pub fn forward(pdg: &Pdg, start: NodeId, depth_limit: Option<usize>) -> FlowGraph {
        FlowGraph::explore(pdg, start, depth_limit, |p, n| p.children_of(n))
    }

    /// Same exploration along backward edges.
    pub fn backward(pdg: &Pdg, start: NodeId, depth_limit: Option<usize>) -> FlowGraph {
        FlowGraph::explore(pdg, start, depth_limit, |p, n| p.parents_of(n))
    }

    fn explore(
        pdg: &Pdg,
        start: NodeId,
        depth_limit: Option<usize>,
        step: impl Fn(&Pdg, NodeId) -> Vec<NodeId>,
    ) -> FlowGraph {
        let tree = pdg.tree();
        let mut graph = FlowGraph {
            start,
            nodes: vec![start],
            children: HashMap::new(),
            predecessor: HashMap::new(),
            truncated_at: Vec::new(),
        };
        let mut depth_of: HashMap<NodeId, usize> = HashMap::new();
        depth_of.insert(start, 0);

        // Breadth-first layers; within a layer smaller ids expand first so
        // ties in the predecessor tree resolve deterministically.
        let mut layer = vec![start];
        while !layer.is_empty() {
            layer.sort_by_key(|&n| tree.order_key(n));
            let mut next = Vec::new();
            for &node in &layer {
                let depth = depth_of[&node];
                if let Some(limit) = depth_limit {
                    if depth >= limit {
                        graph.truncated_at.push(node);
                        graph.children.insert(node, Vec::new());
                        continue;
                    }
                }
                let successors = step(pdg, node);
                for &succ in &successors {
                    if !depth_of.contains_key(&succ) {
                        depth_of.insert(succ, depth + 1);
                        graph.predecessor.insert(succ, node);
                        graph.nodes.push(succ);
                        next.push(succ);
                    }
                }
                graph.children.insert(node, successors);
            }
            layer = next;
        }
        graph
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.children.contains_key(&node) || node == self.start
    }

    fn path_to(&self, node: NodeId) -> Flow {
        let mut reverse = vec![node];
        while let Some(&pred) = self.predecessor.get(reverse.last().unwrap()) {
            reverse.push(pred);
        }
        reverse.reverse();
        let truncated = self.truncated_at.contains(&node);
        Flow {
            nodes: reverse,
            truncated,
        }
    }

    /// Enumerates flows under the given policy, in discovery order.
    pub fn flows(&self, policy: FlowPolicy) -> Vec<Flow> {
        match policy {
            FlowPolicy::OnePerNode => self.nodes.iter().map(|&n| self.path_to(n)).collect(),
            FlowPolicy::OnePerFinalNode => self
                .nodes
                .iter()
                .filter(|&&n| self.children.get(&n).map(|c| c.is_empty()).unwrap_or(true))
                .map(|&n| self.path_to(n))
                .collect(),
            FlowPolicy::JustOne => {
                let mut nodes = vec![self.start];
                loop {
                    let current = *nodes.last().unwrap();
                    let Some(children) = self.children.get(&current) else {
                        break;
                    };
                    let Some(&next) = children.first() else { break };
                    if nodes.contains(&next) {
                        nodes.push(next);
                        break;
                    }
                    nodes.push(next);
                }
                vec![Flow {
                    truncated: self.truncated_at.contains(nodes.last().unwrap()),
                    nodes,
                }]
            }
        }
    }

    /// The shortest flow from the start to `node`, when `node` is in the
    /// graph.
    pub fn flow_to(&self, node: NodeId) -> Option<Flow> {
        self.contains(node).then(|| self.path_to(node))
    }
}
