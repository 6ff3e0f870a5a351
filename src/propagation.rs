//! Pearl's pi/lambda message passing.
//!
//! Every observation seeds a FIFO queue of messages. Delivering a message
//! stores it in the receiver's cache, recomputes the receiver's evidence and
//! posterior, and queues the receiver's own messages to every neighbour except
//! the sender.
//! On a polytree each wave therefore visits a node at most once and stops at
//! the leaves; `max_steps` bounds the queue in case the graph is not a tree.
//! Re-initialization does not use the queue; see `Network::initialize`.

use std::collections::VecDeque;

use log::{debug, trace};

use crate::errors::{BayesError, Result};
use crate::network::Network;
use crate::node::{NodeId, Observation};
use crate::table::{advance, rank, Assignments};

/// Configuration for message propagation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropagationConfig {
    /// Maximum messages delivered per network event.
    pub max_steps: usize,
    /// Reject edges that would create a second path between two nodes.
    /// When false such edges are only logged.
    pub enforce_polytree: bool,
    /// Allowed deviation of a table column sum from 1 when reading tables.
    pub tolerance: f64,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            max_steps: 100_000,
            enforce_polytree: true,
            tolerance: 1e-9,
        }
    }
}

impl PropagationConfig {
    pub fn validate(self) -> Result<Self> {
        if self.max_steps == 0 {
            return Err(BayesError::InvalidConfig("max_steps must be > 0".into()));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(BayesError::InvalidConfig(
                "tolerance must be finite and >= 0".into(),
            ));
        }
        Ok(self)
    }
}

/// A pending message, named by sender and receiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Message {
    /// Parent `from` tells child `to` about its own belief.
    Pi { from: NodeId, to: NodeId },
    /// Child `from` tells parent `to` how likely the evidence below is.
    Lambda { from: NodeId, to: NodeId },
}

/// Counters for one propagation event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationStats {
    pub pi_messages: usize,
    pub lambda_messages: usize,
}

impl PropagationStats {
    pub fn messages(&self) -> usize {
        self.pi_messages + self.lambda_messages
    }
}

fn indicator(k: usize, observed: usize) -> Vec<f64> {
    (0..k).map(|s| if s == observed { 1.0 } else { 0.0 }).collect()
}

// NB messages are only defined up to a constant; rescale to keep long chains
// away from underflow. An all-zero message is left as is.
fn normalize(msg: &mut [f64]) {
    let norm: f64 = msg.iter().sum();
    if norm > 0.0 && norm.is_finite() {
        for v in msg.iter_mut() {
            *v /= norm;
        }
    }
}

impl Network {
    /// Cached pi-messages of `id`, one slice per parent in parent order.
    fn pi_inputs(&self, id: NodeId) -> Result<Vec<&[f64]>> {
        let node = &self.nodes[id.0];
        node.parents
            .iter()
            .map(|p| {
                node.pi_messages.get(p).map(Vec::as_slice).ok_or_else(|| {
                    BayesError::Topology(format!(
                        "`{}` holds no pi-message from parent {p}",
                        node.name()
                    ))
                })
            })
            .collect()
    }

    /// π(x): the prior column for a root, otherwise the table marginalised
    /// over every parent combination weighted by the parents' pi-messages.
    pub fn compute_pi_evidence(&self, id: NodeId) -> Result<Vec<f64>> {
        let node = self.node(id)?;
        let table = node.table();
        let k = node.cardinality();

        if node.is_root() {
            return Ok((0..k).map(|s| table.at(s, 0)).collect());
        }

        let inputs = self.pi_inputs(id)?;
        let mut pi = vec![0.0; k];

        for (column, assignment) in Assignments::new(table.radices()).enumerate() {
            let weight: f64 = assignment
                .iter()
                .zip(&inputs)
                .map(|(&a, msg)| msg[a])
                .product();
            if weight == 0.0 {
                continue;
            }
            for (s, p) in pi.iter_mut().enumerate() {
                *p += table.at(s, column) * weight;
            }
        }

        Ok(pi)
    }

    /// π-message from parent `from` to child `to`.
    ///
    /// An observed parent sends its indicator. Otherwise the parent's belief
    /// is divided by the lambda-message the child last sent, removing the
    /// child's own contribution.
    pub fn compute_pi_message(&self, from: NodeId, to: NodeId) -> Result<Vec<f64>> {
        let parent = self.node(from)?;
        let k = parent.cardinality();

        if let Observation::Observed(observed) = parent.observation() {
            return Ok(indicator(k, observed));
        }

        let lambda = parent.lambda_messages.get(&to).ok_or_else(|| {
            BayesError::Topology(format!("{to} is not a child of `{}`", parent.name()))
        })?;

        let mut msg = Vec::with_capacity(k);
        for (state, &l) in parent.states().iter().zip(lambda) {
            if l == 0.0 {
                return Err(BayesError::ZeroMessage {
                    parent: parent.name().to_string(),
                    child: self.nodes[to.0].name().to_string(),
                    state: state.id,
                });
            }
            msg.push(state.probability / l);
        }

        normalize(&mut msg);
        Ok(msg)
    }

    /// λ-message from child `from` to parent `to`, one entry per parent state.
    ///
    /// For each parent state x, sums over the child's states and over every
    /// combination of the child's other parents with x held fixed.
    pub fn compute_lambda_message(&self, from: NodeId, to: NodeId) -> Result<Vec<f64>> {
        let child = self.node(from)?;
        let slot = child.parents.iter().position(|&p| p == to).ok_or_else(|| {
            BayesError::Topology(format!("{to} is not a parent of `{}`", child.name()))
        })?;

        let table = child.table();
        let radices = table.radices();
        let inputs = self.pi_inputs(from)?;
        let lambda = child.lambda_evidence();

        let mut msg = vec![0.0; radices[slot]];

        for (x, out) in msg.iter_mut().enumerate() {
            let mut assignment = vec![0; radices.len()];
            assignment[slot] = x;
            let mut sum = 0.0;

            loop {
                let weight: f64 = assignment
                    .iter()
                    .zip(&inputs)
                    .enumerate()
                    .filter(|&(j, _)| j != slot)
                    .map(|(_, (&a, m))| m[a])
                    .product();

                if weight != 0.0 {
                    let column = rank(&assignment, radices);
                    let likelihood: f64 = lambda
                        .iter()
                        .enumerate()
                        .map(|(y, &l)| l * table.at(y, column))
                        .sum();
                    sum += weight * likelihood;
                }

                if !advance(&mut assignment, radices, Some(slot)) {
                    break;
                }
            }

            *out = sum;
        }

        normalize(&mut msg);
        Ok(msg)
    }

    /// Drains `queue`, delivering each message and queueing the follow-ups.
    pub(crate) fn propagate(&mut self, mut queue: VecDeque<Message>) -> Result<PropagationStats> {
        let mut stats = PropagationStats::default();

        while let Some(message) = queue.pop_front() {
            if stats.messages() >= self.config.max_steps {
                return Err(BayesError::Topology(format!(
                    "propagation exceeded {} messages; the network is probably not a polytree",
                    self.config.max_steps
                )));
            }

            match message {
                Message::Pi { from, to } => {
                    stats.pi_messages += 1;
                    self.deliver_pi(from, to, &mut queue)?;
                }
                Message::Lambda { from, to } => {
                    stats.lambda_messages += 1;
                    self.deliver_lambda(from, to, &mut queue)?;
                }
            }
        }

        debug!(
            "propagation on `{}` delivered {} pi and {} lambda messages",
            self.name(),
            stats.pi_messages,
            stats.lambda_messages
        );
        Ok(stats)
    }

    fn deliver_pi(
        &mut self,
        from: NodeId,
        to: NodeId,
        queue: &mut VecDeque<Message>,
    ) -> Result<()> {
        let msg = self.compute_pi_message(from, to)?;
        trace!("pi {} -> {}: {:?}", self.nodes[from.0].name(), self.nodes[to.0].name(), msg);
        self.nodes[to.0].pi_messages.insert(from, msg);

        let node = &self.nodes[to.0];
        if node.is_observed() {
            // NB belief is clamped, but the siblings' lambda-messages depend
            // on this parent through the table (explaining away).
            for &p in node.parents.iter().filter(|&&p| p != from) {
                queue.push_back(Message::Lambda { from: to, to: p });
            }
            return Ok(());
        }

        let pi = self.compute_pi_evidence(to)?;
        let node = &mut self.nodes[to.0];
        node.pi_evidence = pi;
        node.posterior_probabilities()?;

        for &c in &node.children {
            queue.push_back(Message::Pi { from: to, to: c });
        }
        // NB a flat lambda sends flat lambda-messages, which carry nothing.
        if !node.has_flat_lambda() {
            for &p in node.parents.iter().filter(|&&p| p != from) {
                queue.push_back(Message::Lambda { from: to, to: p });
            }
        }
        Ok(())
    }

    fn deliver_lambda(
        &mut self,
        from: NodeId,
        to: NodeId,
        queue: &mut VecDeque<Message>,
    ) -> Result<()> {
        let msg = self.compute_lambda_message(from, to)?;
        trace!(
            "lambda {} -> {}: {:?}",
            self.nodes[from.0].name(),
            self.nodes[to.0].name(),
            msg
        );

        let node = &mut self.nodes[to.0];
        node.lambda_messages.insert(from, msg);

        if node.is_observed() {
            return Ok(());
        }

        node.update_lambda_evidence();
        node.posterior_probabilities()?;

        for &p in &node.parents {
            queue.push_back(Message::Lambda { from: to, to: p });
        }
        for &c in node.children.iter().filter(|&&c| c != from) {
            queue.push_back(Message::Pi { from: to, to: c });
        }
        Ok(())
    }
}
