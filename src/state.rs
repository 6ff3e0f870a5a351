use crate::node::NodeId;

/// A discrete value a node can take, with its current probability.
///
/// Ids are 1-based and follow the node's evaluation order: state `id` sits in
/// table row `id - 1` and at index `id - 1` of every message.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: usize,
    pub name: String,
    pub probability: f64,
    pub owner: NodeId,
}

impl State {
    pub fn new(id: usize, name: impl Into<String>, probability: f64, owner: NodeId) -> Self {
        Self {
            id,
            name: name.into(),
            probability,
            owner,
        }
    }

    /// Default label, `State1..StateK`.
    pub fn default_name(id: usize) -> String {
        format!("State{id}")
    }

    /// Zero-based position in the owning node's state list.
    pub fn index(&self) -> usize {
        self.id - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_index_is_zero_based() {
        let s = State::new(3, State::default_name(3), 0.25, NodeId(0));
        assert_eq!(s.index(), 2);
        assert_eq!(s.name, "State3");
    }
}
