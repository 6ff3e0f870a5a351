//! Hidden Markov chains as Bayesian networks.
//!
//! A chain H0 -> H1 -> ... with one emission child per hidden node is a
//! polytree, so propagation must agree with forward-backward.

use crate::errors::Result;
use crate::network::Network;
use crate::node::NodeId;

pub struct HMM {
    pub n_states: usize,
    pub n_symbols: usize,
    /// Row-major, `trans[i * n_states + j]` = P(next = j | current = i).
    pub trans: Vec<f64>,
    /// Row-major, `emit[i * n_symbols + o]` = P(symbol o | state i).
    pub emit: Vec<f64>,
    pub prior: Vec<f64>,
}

/// The network built from an HMM and an observation sequence.
pub struct ChainNetwork {
    pub network: Network,
    pub hidden: Vec<NodeId>,
    pub emitted: Vec<NodeId>,
}

impl HMM {
    pub fn new(
        n_states: usize,
        n_symbols: usize,
        trans: Vec<f64>,
        emit: Vec<f64>,
        prior: Vec<f64>,
    ) -> Self {
        Self {
            n_states,
            n_symbols,
            trans,
            emit,
            prior,
        }
    }

    fn emission(&self, state: usize, symbol: usize) -> f64 {
        self.emit[state * self.n_symbols + symbol]
    }

    /// Normalised forward messages, alpha[t][i] ∝ P(o_0..o_t, h_t = i).
    pub fn forward(&self, obs: &[usize]) -> Vec<Vec<f64>> {
        let n = self.n_states;
        let mut alpha: Vec<Vec<f64>> = Vec::with_capacity(obs.len());

        for (t, &o) in obs.iter().enumerate() {
            let mut row: Vec<f64> = (0..n)
                .map(|j| {
                    let reach = if t == 0 {
                        self.prior[j]
                    } else {
                        (0..n).map(|i| alpha[t - 1][i] * self.trans[i * n + j]).sum()
                    };
                    reach * self.emission(j, o)
                })
                .collect();
            let s: f64 = row.iter().sum();
            row.iter_mut().for_each(|v| *v /= s);
            alpha.push(row);
        }
        alpha
    }

    /// Normalised backward messages, beta[t][i] ∝ P(o_{t+1}.. | h_t = i).
    pub fn backward(&self, obs: &[usize]) -> Vec<Vec<f64>> {
        let n = self.n_states;
        let chain_len = obs.len();
        let mut beta = vec![vec![1.0; n]; chain_len];

        for t in (0..chain_len.saturating_sub(1)).rev() {
            for i in 0..n {
                beta[t][i] = (0..n)
                    .map(|j| self.trans[i * n + j] * self.emission(j, obs[t + 1]) * beta[t + 1][j])
                    .sum();
            }
            let s: f64 = beta[t].iter().sum();
            beta[t].iter_mut().for_each(|v| *v /= s);
        }
        beta
    }

    /// Posterior of every hidden state by forward-backward.
    pub fn marginals(&self, obs: &[usize]) -> Vec<Vec<f64>> {
        let alpha = self.forward(obs);
        let beta = self.backward(obs);

        alpha
            .iter()
            .zip(&beta)
            .map(|(a, b)| {
                let mut m: Vec<f64> = a.iter().zip(b).map(|(x, y)| x * y).collect();
                let s: f64 = m.iter().sum();
                m.iter_mut().for_each(|v| *v /= s);
                m
            })
            .collect()
    }

    /// Builds the chain as a network and observes every emission node.
    /// `obs` holds zero-based symbols.
    pub fn network(&self, obs: &[usize]) -> Result<ChainNetwork> {
        let mut network = Network::new(format!("hmm-{}", obs.len()));
        let mut hidden = Vec::with_capacity(obs.len());
        let mut emitted = Vec::with_capacity(obs.len());

        for t in 0..obs.len() {
            let h = network.add_node(format!("H{t}"), 0, self.n_states)?;
            let o = network.add_node(format!("O{t}"), 0, self.n_symbols)?;
            if let Some(&prev) = hidden.last() {
                network.connect(prev, h)?;
            }
            network.connect(h, o)?;
            hidden.push(h);
            emitted.push(o);
        }

        let n = self.n_states;
        for (t, (&h, &o)) in hidden.iter().zip(&emitted).enumerate() {
            let table = if t == 0 {
                network.table_from_fn(h, |s, _| self.prior[s - 1])?
            } else {
                network.table_from_fn(h, |s, p| self.trans[(p[0] - 1) * n + s - 1])?
            };
            network.install_table(h, &table)?;

            let table = network.table_from_fn(o, |sym, p| self.emission(p[0] - 1, sym - 1))?;
            network.install_table(o, &table)?;
        }

        for (&o, &symbol) in emitted.iter().zip(obs) {
            network.observe(o, symbol + 1)?;
        }

        Ok(ChainNetwork {
            network,
            hidden,
            emitted,
        })
    }
}

/// A two-symbol chain with a sticky transition matrix and a fixed
/// observation sequence of length `chain_len`.
pub fn get_test_hmm(n_states: usize, chain_len: usize) -> (HMM, Vec<usize>) {
    let stay = 0.7;
    let mut trans = vec![(1.0 - stay) / (n_states as f64 - 1.0).max(1.0); n_states * n_states];
    for i in 0..n_states {
        trans[i * n_states + i] = if n_states == 1 { 1.0 } else { stay };
    }

    let mut emit = Vec::with_capacity(n_states * 2);
    for i in 0..n_states {
        let p = 0.2 + 0.6 * i as f64 / (n_states as f64 - 1.0).max(1.0);
        emit.push(1.0 - p);
        emit.push(p);
    }

    let prior = vec![1.0 / n_states as f64; n_states];
    let obs = (0..chain_len).map(|t| (t * 7 / 3) % 2).collect();

    (HMM::new(n_states, 2, trans, emit, prior), obs)
}
