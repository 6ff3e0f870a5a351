use std::collections::{HashSet, VecDeque};

use log::{debug, warn};

use crate::errors::{BayesError, Result};
use crate::node::{Node, NodeId};
use crate::propagation::{Message, PropagationConfig, PropagationStats};
use crate::state::State;
use crate::table::ProbabilityTable;

/// Directed parent -> child relation. The weight is carried for callers and
/// never read by inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub parent: NodeId,
    pub child: NodeId,
    pub weight: i64,
}

/// A Bayesian network: an arena of nodes plus the edge list.
///
/// Every operation that changes topology or tables re-initializes the whole
/// network, which costs O(network size) per call and clears all observations.
#[derive(Debug, Clone)]
pub struct Network {
    name: String,
    pub(crate) nodes: Vec<Node>,
    edges: Vec<Edge>,
    pub(crate) config: PropagationConfig,
}

impl Network {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            config: PropagationConfig::default(),
        }
    }

    pub fn with_config(name: impl Into<String>, config: PropagationConfig) -> Result<Self> {
        let mut network = Self::new(name);
        network.config = config.validate()?;
        Ok(network)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    /// Adds a node with `k` uniformly probable states named `State1..StateK`.
    pub fn add_node(&mut self, name: impl Into<String>, weight: i64, k: usize) -> Result<NodeId> {
        let names = (1..=k).map(State::default_name).collect();
        self.push_node(name.into(), weight, names)
    }

    pub fn add_node_with_states(
        &mut self,
        name: impl Into<String>,
        weight: i64,
        states: &[&str],
    ) -> Result<NodeId> {
        let names = states.iter().map(|s| s.to_string()).collect();
        self.push_node(name.into(), weight, names)
    }

    fn push_node(&mut self, name: String, weight: i64, states: Vec<String>) -> Result<NodeId> {
        if self.find_by_name(&name).is_some() {
            return Err(BayesError::DuplicateNode(name));
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(id, name, weight, states)?);
        debug!("added node {} `{}` to `{}`", id, self.nodes[id.0].name(), self.name);
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| BayesError::Index(format!("no node {id} in `{}`", self.name)))
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.node_by_name(name).map(Node::id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn parents(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(self.node(id)?.parents())
    }

    pub fn children(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(self.node(id)?.children())
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().filter(|n| n.is_root()).map(Node::id)
    }

    /// Current state probabilities of a node.
    pub fn posterior(&self, id: NodeId) -> Result<Vec<f64>> {
        Ok(self.node(id)?.probabilities())
    }

    pub fn connect(&mut self, parent: NodeId, child: NodeId) -> Result<bool> {
        self.connect_with_weight(parent, child, 0)
    }

    /// Adds the edge `parent -> child`.
    ///
    /// An identical edge is not added twice and the call returns `false`.
    /// Either way the child's table is reset to uniform for its parent set and
    /// the network is re-initialized.
    pub fn connect_with_weight(
        &mut self,
        parent: NodeId,
        child: NodeId,
        weight: i64,
    ) -> Result<bool> {
        self.node(parent)?;
        self.node(child)?;

        if parent == child {
            return Err(BayesError::Topology(format!(
                "self-loop on `{}`",
                self.nodes[parent.0].name()
            )));
        }

        let edge = Edge { parent, child, weight };
        let duplicate = self.edges.contains(&edge);

        if !duplicate {
            self.check_new_edge(parent, child)?;
        }

        self.transact(|net| {
            if !duplicate {
                net.edges.push(edge);
                net.nodes[parent.0].children.push(child);
                net.nodes[child.0].parents.push(parent);
                debug!(
                    "connected `{}` -> `{}` in `{}`",
                    net.nodes[parent.0].name(),
                    net.nodes[child.0].name(),
                    net.name
                );
            }
            net.reset_table_shape(child);
            net.initialize()?;
            Ok(!duplicate)
        })
    }

    // NB reachability count over the edge list; a directed path back from the
    // child is a cycle, any undirected path is a second route between the two.
    fn check_new_edge(&self, parent: NodeId, child: NodeId) -> Result<()> {
        let (p, c) = (self.nodes[parent.0].name(), self.nodes[child.0].name());

        if self.edges.iter().any(|e| e.parent == parent && e.child == child) {
            return Err(BayesError::Topology(format!(
                "`{p}` -> `{c}` already exists with another weight"
            )));
        }

        if self.reachable(child, true).contains(&parent) {
            return Err(BayesError::Topology(format!(
                "`{p}` -> `{c}` closes a directed cycle"
            )));
        }

        let reachable = self.reachable(parent, false);
        if reachable.contains(&child) {
            let msg = format!(
                "`{p}` -> `{c}` adds a second path between them ({} nodes reachable from `{p}`)",
                reachable.len()
            );
            if self.config.enforce_polytree {
                return Err(BayesError::Topology(msg));
            }
            warn!("{msg}; propagation is no longer exact");
        }
        Ok(())
    }

    fn reachable(&self, from: NodeId, directed: bool) -> HashSet<NodeId> {
        let mut seen = HashSet::from([from]);
        let mut frontier = vec![from];

        while let Some(id) = frontier.pop() {
            let node = &self.nodes[id.0];
            let upstream: &[NodeId] = if directed { &[] } else { &node.parents };
            for &next in node.children.iter().chain(upstream) {
                if seen.insert(next) {
                    frontier.push(next);
                }
            }
        }
        seen
    }

    fn reset_table_shape(&mut self, id: NodeId) {
        let parents = self.nodes[id.0].parents.clone();
        let radices = parents.iter().map(|p| self.nodes[p.0].cardinality()).collect();
        self.nodes[id.0].table_mut().resize(parents, radices);
    }

    /// Clamps a node to a 1-based state and propagates the evidence.
    pub fn observe(&mut self, id: NodeId, state: usize) -> Result<PropagationStats> {
        self.node(id)?;
        self.transact(|net| {
            let node = &mut net.nodes[id.0];
            node.clamp(state)?;
            debug!("observed `{}` = {}", node.name(), state);

            let mut queue = VecDeque::new();
            for &p in &node.parents {
                queue.push_back(Message::Lambda { from: id, to: p });
            }
            for &c in &node.children {
                queue.push_back(Message::Pi { from: id, to: c });
            }
            net.propagate(queue)
        })
    }

    /// A uniform table shaped for the node's current parents.
    pub fn blank_table(&self, id: NodeId) -> Result<ProbabilityTable> {
        self.table_from_fn(id, |_, _| 0.0).map(|mut t| {
            t.initialize_uniform();
            t
        })
    }

    /// A table for the node built from `rule(state, combination)`, both 1-based.
    pub fn table_from_fn<F>(&self, id: NodeId, rule: F) -> Result<ProbabilityTable>
    where
        F: FnMut(usize, &[usize]) -> f64,
    {
        let node = self.node(id)?;
        let parents = node.parents.clone();
        let radices = parents.iter().map(|p| self.nodes[p.0].cardinality()).collect();
        Ok(ProbabilityTable::from_fn(node.cardinality(), parents, radices, rule))
    }

    /// Installs a precomputed table on a node and re-initializes the network.
    pub fn install_table(&mut self, id: NodeId, table: &ProbabilityTable) -> Result<()> {
        self.node(id)?;
        self.transact(|net| {
            net.nodes[id.0].table_mut().replace_with(table)?;
            net.initialize()
        })
    }

    /// Resets one node's table to uniform and re-initializes the network.
    pub fn reset_table(&mut self, id: NodeId) -> Result<()> {
        self.node(id)?;
        self.transact(|net| {
            net.nodes[id.0].table_mut().initialize_uniform();
            net.initialize()
        })
    }

    /// Clears every observation and recomputes the priors.
    pub fn reset(&mut self) -> Result<()> {
        self.transact(|net| net.initialize())
    }

    /// Rebuilds every node's caches, then sends the priors down from the
    /// roots in one topological pass: one pi-message per edge.
    pub fn initialize(&mut self) -> Result<()> {
        for i in 0..self.nodes.len() {
            let cards: Vec<(NodeId, usize)> = self.nodes[i]
                .parents
                .iter()
                .map(|&p| (p, self.nodes[p.0].cardinality()))
                .collect();
            self.nodes[i].initialize(&cards);
        }

        // NB every lambda is flat here, so pi alone settles each node.
        let mut delivered = 0;
        for id in self.topological_order() {
            let parents = self.nodes[id.0].parents.clone();
            if parents.is_empty() {
                continue;
            }
            for p in parents {
                let msg = self.compute_pi_message(p, id)?;
                self.nodes[id.0].pi_messages.insert(p, msg);
                delivered += 1;
            }
            let pi = self.compute_pi_evidence(id)?;
            let node = &mut self.nodes[id.0];
            node.pi_evidence = pi;
            node.posterior_probabilities()?;
        }

        debug!(
            "initialized `{}`: {} nodes, {} pi messages",
            self.name,
            self.nodes.len(),
            delivered
        );
        Ok(())
    }

    /// Kahn's order over the parent -> child edges. Cycles are rejected in
    /// `connect`, so every node appears.
    fn topological_order(&self) -> Vec<NodeId> {
        let mut pending: Vec<usize> = self.nodes.iter().map(|n| n.parents.len()).collect();
        let mut ready: VecDeque<NodeId> = self.roots().collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = ready.pop_front() {
            order.push(id);
            for &c in &self.nodes[id.0].children {
                pending[c.0] -= 1;
                if pending[c.0] == 0 {
                    ready.push_back(c);
                }
            }
        }
        order
    }

    /// Runs `op` against a snapshot; on failure the nodes and edges are
    /// restored so no partial update survives.
    fn transact<T, F>(&mut self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let nodes = self.nodes.clone();
        let edges = self.edges.clone();

        let result = op(self);
        if let Err(err) = &result {
            warn!("rolled back `{}` after: {err}", self.name);
            self.nodes = nodes;
            self.edges = edges;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(k: usize) -> (Network, NodeId, NodeId, NodeId) {
        let mut net = Network::new("chain");
        let a = net.add_node("A", 0, k).unwrap();
        let b = net.add_node("B", 0, k).unwrap();
        let c = net.add_node("C", 0, k).unwrap();
        net.connect(a, b).unwrap();
        net.connect(b, c).unwrap();
        (net, a, b, c)
    }

    #[test]
    fn test_duplicate_node_name() {
        let mut net = Network::new("dup");
        net.add_node("A", 0, 2).unwrap();
        assert!(matches!(net.add_node("A", 1, 3), Err(BayesError::DuplicateNode(_))));
        assert_eq!(net.node_count(), 1);
    }

    #[test]
    fn test_connect_is_idempotent_but_resets_table() {
        let (mut net, a, b, _) = chain(2);
        let table = net.table_from_fn(b, |s, c| if s == c[0] { 0.8 } else { 0.2 }).unwrap();
        net.install_table(b, &table).unwrap();
        assert_eq!(net.node(b).unwrap().table().probability(1, &[1]).unwrap(), 0.8);

        assert!(!net.connect(a, b).unwrap());
        assert_eq!(net.edges().len(), 2);
        assert_eq!(net.parents(b).unwrap(), &[a]);
        for column in 0..2 {
            assert_eq!(net.node(b).unwrap().table().column(column).unwrap(), vec![0.5, 0.5]);
        }
    }

    #[test]
    fn test_connect_resizes_child_table() {
        let mut net = Network::new("sizes");
        let a = net.add_node("A", 0, 3).unwrap();
        let b = net.add_node("B", 0, 2).unwrap();
        let c = net.add_node("C", 0, 4).unwrap();
        net.connect(a, c).unwrap();
        net.connect(b, c).unwrap();

        let table = net.node(c).unwrap().table();
        assert_eq!(table.width(), 4);
        assert_eq!(table.height(), 6);
        assert_eq!(table.parents(), &[a, b]);
        for column in 0..table.height() {
            for p in table.column(column).unwrap() {
                assert!((p - 0.25).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_rejects_cycles_and_second_paths() {
        let (mut net, a, _, c) = chain(2);
        assert!(matches!(net.connect(c, a), Err(BayesError::Topology(_))));
        assert!(matches!(net.connect(a, c), Err(BayesError::Topology(_))));
        assert!(matches!(net.connect(a, a), Err(BayesError::Topology(_))));
        assert_eq!(net.edges().len(), 2);
    }

    #[test]
    fn test_advisory_topology_is_bounded() {
        let config = PropagationConfig {
            enforce_polytree: false,
            max_steps: 64,
            ..Default::default()
        };
        let mut net = Network::with_config("loop", config).unwrap();
        let a = net.add_node("A", 0, 2).unwrap();
        let b = net.add_node("B", 0, 2).unwrap();
        let c = net.add_node("C", 0, 2).unwrap();
        net.connect(a, b).unwrap();
        net.connect(a, c).unwrap();
        // NB A -> B -> C and A -> C: two paths, accepted with a warning.
        net.connect(b, c).unwrap();
        assert_eq!(net.edges().len(), 3);
        assert!(net.connect(c, a).is_err());
    }

    #[test]
    fn test_unknown_node() {
        let (mut net, a, _, _) = chain(2);
        assert!(matches!(net.connect(a, NodeId(9)), Err(BayesError::Index(_))));
        assert!(matches!(net.observe(NodeId(9), 1), Err(BayesError::Index(_))));
    }

    #[test]
    fn test_observe_propagates_down_and_up() {
        let (mut net, a, b, c) = chain(2);
        for id in [b, c] {
            let t = net.table_from_fn(id, |s, p| if s == p[0] { 0.9 } else { 0.1 }).unwrap();
            net.install_table(id, &t).unwrap();
        }
        net.observe(a, 1).unwrap();
        assert_eq!(net.posterior(a).unwrap(), vec![1.0, 0.0]);
        let pc = net.posterior(c).unwrap();
        assert!((pc[0] - 0.82).abs() < 1e-12);

        net.reset().unwrap();
        net.observe(c, 1).unwrap();
        let pa = net.posterior(a).unwrap();
        assert!((pa[0] - 0.82).abs() < 1e-12);
        assert!(net.node(c).unwrap().is_observed());
        assert!(!net.node(a).unwrap().is_observed());
    }

    #[test]
    fn test_failed_observe_rolls_back() {
        let (mut net, a, b, c) = chain(2);
        for id in [b, c] {
            let t = net.table_from_fn(id, |s, p| if s == p[0] { 1.0 } else { 0.0 }).unwrap();
            net.install_table(id, &t).unwrap();
        }
        net.observe(c, 1).unwrap();
        assert_eq!(net.posterior(a).unwrap(), vec![1.0, 0.0]);
        let before: Vec<Vec<f64>> = net.nodes().iter().map(Node::probabilities).collect();

        assert!(matches!(net.observe(a, 2), Err(BayesError::DegenerateDistribution(_))));
        let after: Vec<Vec<f64>> = net.nodes().iter().map(Node::probabilities).collect();
        assert_eq!(before, after);
        assert!(!net.node(a).unwrap().is_observed());
        assert!(after.iter().flatten().all(|p| p.is_finite()));
    }

    #[test]
    fn test_install_table_shape_mismatch() {
        let (mut net, a, b, _) = chain(2);
        let wrong = net.table_from_fn(a, |_, _| 0.5).unwrap();
        assert!(matches!(net.install_table(b, &wrong), Err(BayesError::ShapeMismatch(_))));
    }

    #[test]
    fn test_reset_table() {
        let (mut net, _, b, _) = chain(2);
        let t = net.table_from_fn(b, |s, p| if s == p[0] { 1.0 } else { 0.0 }).unwrap();
        net.install_table(b, &t).unwrap();
        net.reset_table(b).unwrap();
        assert_eq!(net.node(b).unwrap().table(), &net.blank_table(b).unwrap());
    }
}
