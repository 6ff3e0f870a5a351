//! Reference inference by enumerating the joint distribution.
//!
//! Exponential in the number of nodes; meant for checking propagation on
//! small networks.

use rayon::prelude::*;

use crate::errors::{BayesError, Result};
use crate::network::Network;
use crate::node::Node;
use crate::table::rank;

/// Joint probability of one full assignment (zero-based state per node),
/// the product of every node's table entry.
pub fn joint_probability(network: &Network, config: &[usize]) -> Result<f64> {
    if config.len() != network.node_count() {
        return Err(BayesError::ShapeMismatch(format!(
            "assignment of {} nodes for `{}` with {}",
            config.len(),
            network.name(),
            network.node_count()
        )));
    }
    for (node, &c) in network.nodes().iter().zip(config) {
        if c >= node.cardinality() {
            return Err(BayesError::Index(format!(
                "state index {c} of `{}` outside 0..{}",
                node.name(),
                node.cardinality()
            )));
        }
    }
    Ok(joint_unchecked(network, config))
}

fn joint_unchecked(network: &Network, config: &[usize]) -> f64 {
    network
        .nodes()
        .iter()
        .map(|node| {
            let table = node.table();
            let parent_states: Vec<usize> = node.parents().iter().map(|p| config[p.0]).collect();
            table.at(config[node.id().0], rank(&parent_states, table.radices()))
        })
        .product()
}

/// Exact marginals of every node given the network's current observations.
pub fn exact_marginals(network: &Network) -> Result<Vec<Vec<f64>>> {
    let nodes = network.nodes();
    let cards: Vec<usize> = nodes.iter().map(Node::cardinality).collect();
    let evidence: Vec<Option<usize>> = nodes
        .iter()
        .map(|n| n.observed_state().map(|s| s - 1))
        .collect();

    // NB warning: exponential complexity in the number of nodes.
    let n_configs = cards
        .iter()
        .try_fold(1usize, |acc, &k| acc.checked_mul(k))
        .ok_or_else(|| {
            BayesError::ShapeMismatch(format!(
                "joint state space of `{}` overflows usize",
                network.name()
            ))
        })?;
    let empty = || (cards.iter().map(|&k| vec![0.0; k]).collect::<Vec<Vec<f64>>>(), 0.0);

    let (mut marginals, total) = (0..n_configs)
        .into_par_iter()
        .fold(empty, |(mut acc, mut total), config_idx| {
            let mut config = vec![0; cards.len()];
            let mut tmp = config_idx;
            for (i, &k) in cards.iter().enumerate() {
                config[i] = tmp % k;
                tmp /= k;
            }

            let consistent = evidence
                .iter()
                .zip(&config)
                .all(|(e, &c)| e.map_or(true, |s| s == c));
            if !consistent {
                return (acc, total);
            }

            let prob = joint_unchecked(network, &config);
            total += prob;
            for (i, &c) in config.iter().enumerate() {
                acc[i][c] += prob;
            }
            (acc, total)
        })
        .reduce(empty, |(mut a, ta), (b, tb)| {
            for (row_a, row_b) in a.iter_mut().zip(b) {
                for (x, y) in row_a.iter_mut().zip(row_b) {
                    *x += y;
                }
            }
            (a, ta + tb)
        });

    if total <= 0.0 {
        return Err(BayesError::DegenerateDistribution(format!(
            "joint distribution of `{}`",
            network.name()
        )));
    }

    for row in marginals.iter_mut() {
        for v in row.iter_mut() {
            *v /= total;
        }
    }
    Ok(marginals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_marginals_of_independent_roots() {
        let mut net = Network::new("roots");
        let a = net.add_node("A", 0, 2).unwrap();
        net.add_node("B", 0, 3).unwrap();
        let t = net.table_from_fn(a, |s, _| if s == 1 { 0.3 } else { 0.7 }).unwrap();
        net.install_table(a, &t).unwrap();

        let marginals = exact_marginals(&net).unwrap();
        assert!((marginals[0][0] - 0.3).abs() < 1e-12);
        for p in &marginals[1] {
            assert!((p - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_joint_probability_sums_to_one() {
        let mut net = Network::new("pair");
        let a = net.add_node("A", 0, 2).unwrap();
        let b = net.add_node("B", 0, 2).unwrap();
        net.connect(a, b).unwrap();
        let t = net.table_from_fn(b, |s, p| if s == p[0] { 0.6 } else { 0.4 }).unwrap();
        net.install_table(b, &t).unwrap();

        let total: f64 = [[0, 0], [0, 1], [1, 0], [1, 1]]
            .iter()
            .map(|c| joint_probability(&net, c).unwrap())
            .sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!((joint_probability(&net, &[1, 1]).unwrap() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_joint_probability_checks_assignment() {
        let mut net = Network::new("pair");
        let a = net.add_node("A", 0, 2).unwrap();
        let b = net.add_node("B", 0, 3).unwrap();
        net.connect(a, b).unwrap();

        assert!(matches!(joint_probability(&net, &[0]), Err(BayesError::ShapeMismatch(_))));
        assert!(matches!(joint_probability(&net, &[0, 3]), Err(BayesError::Index(_))));
        assert!(matches!(joint_probability(&net, &[2, 0]), Err(BayesError::Index(_))));
    }

    #[test]
    fn test_exact_marginals_rejects_overflowing_space() {
        let mut net = Network::new("wide");
        for i in 0..80 {
            net.add_node(format!("X{i}"), 0, 2).unwrap();
        }
        assert!(matches!(exact_marginals(&net), Err(BayesError::ShapeMismatch(_))));
    }
}
