// NB module level configuration.
#![allow(clippy::needless_range_loop)]

// NB declare the public modules.
pub mod errors;
pub mod exact;
pub mod hmm;
pub mod io;
pub mod monty;
pub mod network;
pub mod node;
pub mod polytree;
pub mod propagation;
pub mod state;
pub mod table;

pub use errors::{BayesError, Result};
pub use network::{Edge, Network};
pub use node::{Node, NodeId, Observation};
pub use propagation::{Message, PropagationConfig, PropagationStats};
pub use state::State;
pub use table::ProbabilityTable;
