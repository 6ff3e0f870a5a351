use rand::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::errors::Result;
use crate::network::Network;
use crate::node::NodeId;

/// Random polytree with strictly positive tables.
///
/// Grows an undirected tree by picking a random frontier node and giving it
/// up to two neighbours, then orients every edge by a coin flip. Any
/// orientation of a tree is a polytree.
pub fn get_test_polytree(num_vars: usize, n_states: usize, seed: u64) -> Result<Network> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut net = Network::new(format!("polytree-{num_vars}x{n_states}-{seed}"));

    let ids: Vec<NodeId> = (0..num_vars)
        .map(|i| net.add_node(format!("X{i}"), 0, n_states))
        .collect::<Result<_>>()?;

    let mut frontier = vec![0];
    let mut current_vars = 1;

    while current_vars < num_vars && !frontier.is_empty() {
        let idx = rng.random_range(0..frontier.len());
        let u = frontier.swap_remove(idx);

        for _ in 0..2 {
            if current_vars < num_vars {
                let v = current_vars;
                if rng.random_bool(0.5) {
                    net.connect(ids[u], ids[v])?;
                } else {
                    net.connect(ids[v], ids[u])?;
                }
                frontier.push(v);
                current_vars += 1;
            }
        }
    }

    // NB tables go in last: every connect resets the child's table.
    for &id in &ids {
        let mut table = net.blank_table(id)?;
        for column in 0..table.height() {
            let row: Vec<f64> = (0..n_states).map(|_| 0.05 + rng.random::<f64>()).collect();
            let sum: f64 = row.iter().sum();
            for (s, p) in row.iter().enumerate() {
                table.set_cell(s + 1, column, p / sum)?;
            }
        }
        net.install_table(id, &table)?;
    }

    Ok(net)
}

/// Handles to the S, T -> U -> V, W network.
pub struct DivergingTree {
    pub network: Network,
    pub s: NodeId,
    pub t: NodeId,
    pub u: NodeId,
    pub v: NodeId,
    pub w: NodeId,
}

/// Two binary roots converging on U, which fans out to two binary leaves.
/// All tables are left uniform.
pub fn get_diverging_tree() -> Result<DivergingTree> {
    let mut network = Network::new("diverging");
    let s = network.add_node("S", 0, 2)?;
    let t = network.add_node("T", 0, 2)?;
    let u = network.add_node("U", 0, 2)?;
    let v = network.add_node("V", 0, 2)?;
    let w = network.add_node("W", 0, 2)?;

    network.connect(s, u)?;
    network.connect(t, u)?;
    network.connect(u, v)?;
    network.connect(u, w)?;

    Ok(DivergingTree { network, s, t, u, v, w })
}
