use crate::errors::Result;
use crate::network::Network;
use crate::node::NodeId;

/// Handles to the three-door network: CAR and PLAYER are parents of HOST.
pub struct MontyHall {
    pub network: Network,
    pub car: NodeId,
    pub player: NodeId,
    pub host: NodeId,
}

/// P(host opens `door` | car, player), 1-based doors, parents ordered
/// `[car, player]`.
///
/// The host never opens the car's door or the player's door, and picks
/// uniformly when two doors are left. Any other parent arity gets 0.
pub fn host_rule(door: usize, parents: &[usize]) -> f64 {
    let &[car, player] = parents else {
        return 0.0;
    };
    if door == car || door == player {
        0.0
    } else if car == player {
        0.5
    } else {
        1.0
    }
}

pub fn monty_hall() -> Result<MontyHall> {
    let mut network = Network::new("monty hall");
    let car = network.add_node("CAR", 0, 3)?;
    let player = network.add_node("PLAYER", 2, 3)?;
    let host = network.add_node("HOST", 7, 3)?;

    network.connect(car, host)?;
    network.connect(player, host)?;

    let table = network.table_from_fn(host, host_rule)?;
    network.install_table(host, &table)?;

    Ok(MontyHall {
        network,
        car,
        player,
        host,
    })
}
