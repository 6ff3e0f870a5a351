use std::collections::HashMap;
use std::fmt;

use log::trace;

use crate::errors::{BayesError, Result};
use crate::state::State;
use crate::table::ProbabilityTable;

/// Stable arena index of a node within its network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Evidence clamp on a node. `Observed` holds the zero-based state index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Observation {
    #[default]
    Unobserved,
    Observed(usize),
}

/// A discrete random variable and its share of the message-passing state.
///
/// Message caches are keyed by the neighbour's id: `pi_messages[u]` is the
/// last pi-message parent `u` sent here, `lambda_messages[y]` the last
/// lambda-message child `y` sent here.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    name: String,
    weight: i64,
    states: Vec<State>,
    observation: Observation,
    table: ProbabilityTable,
    pub(crate) parents: Vec<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) pi_evidence: Vec<f64>,
    pub(crate) lambda_evidence: Vec<f64>,
    pub(crate) pi_messages: HashMap<NodeId, Vec<f64>>,
    pub(crate) lambda_messages: HashMap<NodeId, Vec<f64>>,
}

impl Node {
    /// A node with uniform states and a uniform single-column table.
    pub fn new(
        id: NodeId,
        name: impl Into<String>,
        weight: i64,
        state_names: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();
        let k = state_names.len();
        if k == 0 {
            return Err(BayesError::ShapeMismatch(format!(
                "node `{name}` needs at least one state"
            )));
        }

        let p = 1.0 / k as f64;
        let states = state_names
            .into_iter()
            .enumerate()
            .map(|(i, state_name)| State::new(i + 1, state_name, p, id))
            .collect();

        Ok(Self {
            id,
            name,
            weight,
            states,
            observation: Observation::Unobserved,
            table: ProbabilityTable::uniform(k, Vec::new(), Vec::new()),
            parents: Vec::new(),
            children: Vec::new(),
            pi_evidence: vec![p; k],
            lambda_evidence: vec![1.0; k],
            pi_messages: HashMap::new(),
            lambda_messages: HashMap::new(),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> i64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: i64) {
        self.weight = weight;
    }

    pub fn cardinality(&self) -> usize {
        self.states.len()
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// Current probability of each state, in state order.
    pub fn probabilities(&self) -> Vec<f64> {
        self.states.iter().map(|s| s.probability).collect()
    }

    pub fn table(&self) -> &ProbabilityTable {
        &self.table
    }

    pub(crate) fn table_mut(&mut self) -> &mut ProbabilityTable {
        &mut self.table
    }

    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn observation(&self) -> Observation {
        self.observation
    }

    pub fn is_observed(&self) -> bool {
        matches!(self.observation, Observation::Observed(_))
    }

    /// True if the node is clamped to the given 1-based state.
    pub fn is_observed_state(&self, state: usize) -> Result<bool> {
        self.check_state(state)?;
        Ok(self.observation == Observation::Observed(state - 1))
    }

    /// The 1-based state the node is clamped to, if any.
    pub fn observed_state(&self) -> Option<usize> {
        match self.observation {
            Observation::Observed(s) => Some(s + 1),
            Observation::Unobserved => None,
        }
    }

    pub fn pi_evidence(&self) -> &[f64] {
        &self.pi_evidence
    }

    pub fn lambda_evidence(&self) -> &[f64] {
        &self.lambda_evidence
    }

    pub fn pi_message_from(&self, parent: NodeId) -> Option<&[f64]> {
        self.pi_messages.get(&parent).map(Vec::as_slice)
    }

    pub fn lambda_message_from(&self, child: NodeId) -> Option<&[f64]> {
        self.lambda_messages.get(&child).map(Vec::as_slice)
    }

    /// Rebuilds every cache for the current neighbourhood and clears evidence.
    ///
    /// `parent_cards` lists `(parent, cardinality)` in parent order. Roots take
    /// their prior straight from the single table column.
    pub fn initialize(&mut self, parent_cards: &[(NodeId, usize)]) {
        let k = self.cardinality();
        self.observation = Observation::Unobserved;
        self.lambda_evidence = vec![1.0; k];
        self.lambda_messages = self.children.iter().map(|&c| (c, vec![1.0; k])).collect();
        self.pi_messages = parent_cards
            .iter()
            .map(|&(parent, card)| (parent, vec![1.0; card]))
            .collect();

        if self.is_root() {
            self.pi_evidence = (0..k).map(|s| self.table.at(s, 0)).collect();
            for (state, &p) in self.states.iter_mut().zip(&self.pi_evidence) {
                state.probability = p;
            }
        } else {
            self.pi_evidence = vec![1.0; k];
        }
        trace!(
            "initialized `{}` with {} parents, {} children",
            self.name,
            self.parents.len(),
            self.children.len()
        );
    }

    /// Clamps the node to a 1-based state: one-hot probabilities and an
    /// indicator lambda-evidence. Sending the resulting messages is up to the
    /// network.
    pub fn clamp(&mut self, state: usize) -> Result<()> {
        self.check_state(state)?;
        for s in self.states.iter_mut() {
            s.probability = if s.id == state { 1.0 } else { 0.0 };
        }
        self.observation = Observation::Observed(state - 1);
        self.update_lambda_evidence();
        Ok(())
    }

    /// Recomputes lambda-evidence from the clamp or the children's messages.
    pub fn update_lambda_evidence(&mut self) {
        let k = self.cardinality();
        self.lambda_evidence = match self.observation {
            Observation::Observed(observed) => (0..k)
                .map(|s| if s == observed { 1.0 } else { 0.0 })
                .collect(),
            Observation::Unobserved => {
                let mut product = vec![1.0; k];
                for child in &self.children {
                    if let Some(msg) = self.lambda_messages.get(child) {
                        for (p, m) in product.iter_mut().zip(msg) {
                            *p *= m;
                        }
                    }
                }
                product
            }
        };
    }

    /// True when lambda-evidence carries no information: every entry equal.
    pub fn has_flat_lambda(&self) -> bool {
        match self.lambda_evidence.first() {
            Some(&first) => self.lambda_evidence.iter().all(|&l| l == first),
            None => true,
        }
    }

    /// Combines pi- and lambda-evidence into normalised state probabilities.
    ///
    /// Fails without touching the states if the combined weight is zero.
    pub fn posterior_probabilities(&mut self) -> Result<()> {
        let belief: Vec<f64> = self
            .lambda_evidence
            .iter()
            .zip(&self.pi_evidence)
            .map(|(l, p)| l * p)
            .collect();
        let sum: f64 = belief.iter().sum();

        if sum <= 0.0 || !sum.is_finite() {
            return Err(BayesError::DegenerateDistribution(self.name.clone()));
        }

        let alpha = 1.0 / sum;
        for (state, b) in self.states.iter_mut().zip(belief) {
            state.probability = alpha * b;
        }
        Ok(())
    }

    fn check_state(&self, state: usize) -> Result<()> {
        if state < 1 || state > self.cardinality() {
            return Err(BayesError::Index(format!(
                "state {state} of `{}` outside 1..={}",
                self.name,
                self.cardinality()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(k: usize) -> Node {
        let names = (1..=k).map(State::default_name).collect();
        Node::new(NodeId(0), "X", 0, names).unwrap()
    }

    #[test]
    fn test_new_node_is_uniform() {
        let n = node(4);
        assert_eq!(n.probabilities(), vec![0.25; 4]);
        assert_eq!(n.table().height(), 1);
        assert!(n.is_root());
        assert!(!n.is_observed());
    }

    #[test]
    fn test_empty_node_is_rejected() {
        assert!(matches!(
            Node::new(NodeId(0), "X", 0, Vec::new()),
            Err(BayesError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_clamp_is_one_hot_and_reclamps() {
        let mut n = node(3);
        n.clamp(2).unwrap();
        assert_eq!(n.probabilities(), vec![0.0, 1.0, 0.0]);
        assert_eq!(n.lambda_evidence(), &[0.0, 1.0, 0.0]);
        assert!(n.is_observed());
        assert!(n.is_observed_state(2).unwrap());

        n.clamp(3).unwrap();
        assert_eq!(n.probabilities(), vec![0.0, 0.0, 1.0]);
        assert!(!n.is_observed_state(2).unwrap());
        assert_eq!(n.observed_state(), Some(3));
    }

    #[test]
    fn test_clamp_out_of_range() {
        let mut n = node(3);
        assert!(matches!(n.clamp(0), Err(BayesError::Index(_))));
        assert!(matches!(n.clamp(4), Err(BayesError::Index(_))));
        assert!(!n.is_observed());
        assert!(n.is_observed_state(4).is_err());
    }

    #[test]
    fn test_root_pi_evidence_is_table_column() {
        let mut n = node(2);
        n.table_mut().set_cell(1, 0, 0.3).unwrap();
        n.table_mut().set_cell(2, 0, 0.7).unwrap();
        n.initialize(&[]);
        assert_eq!(n.pi_evidence(), &[0.3, 0.7]);
        assert_eq!(n.probabilities(), vec![0.3, 0.7]);
    }

    #[test]
    fn test_posterior_normalizes() {
        let mut n = node(3);
        n.pi_evidence = vec![0.2, 0.3, 0.5];
        n.lambda_evidence = vec![2.0, 0.0, 1.0];
        n.posterior_probabilities().unwrap();
        let sum: f64 = n.probabilities().iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!((n.probabilities()[0] - 4.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_posterior_leaves_states() {
        let mut n = node(2);
        n.pi_evidence = vec![1.0, 0.0];
        n.lambda_evidence = vec![0.0, 1.0];
        let before = n.probabilities();
        assert!(matches!(n.posterior_probabilities(), Err(BayesError::DegenerateDistribution(_))));
        assert_eq!(n.probabilities(), before);
        assert!(n.probabilities().iter().all(|p| p.is_finite()));
    }
}
