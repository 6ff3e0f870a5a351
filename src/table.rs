use crate::errors::{BayesError, Result};
use crate::node::NodeId;
use crate::state::State;

/// Steps a mixed-radix assignment to the next parent combination.
///
/// The last digit varies fastest. When `fixed` names a digit it is left
/// untouched, so the walk covers every combination of the remaining digits.
/// Returns false once the walk wraps back to the all-zero start.
pub fn advance(assignment: &mut [usize], radices: &[usize], fixed: Option<usize>) -> bool {
    for j in (0..assignment.len()).rev() {
        if Some(j) == fixed {
            continue;
        }
        assignment[j] += 1;

        if assignment[j] < radices[j] {
            return true;
        }
        assignment[j] = 0;
    }

    false
}

/// Rank of a zero-based assignment, `Σ a[i] * Π_{j>i} radix[j]`.
pub fn rank(assignment: &[usize], radices: &[usize]) -> usize {
    assignment
        .iter()
        .zip(radices)
        .fold(0, |idx, (&a, &radix)| idx * radix + a)
}

/// Odometer over every zero-based parent assignment in rank order.
///
/// With no parents it yields a single empty assignment.
#[derive(Debug, Clone)]
pub struct Assignments {
    radices: Vec<usize>,
    current: Option<Vec<usize>>,
}

impl Assignments {
    pub fn new(radices: &[usize]) -> Self {
        let current = if radices.iter().any(|&r| r == 0) {
            None
        } else {
            Some(vec![0; radices.len()])
        };
        Self {
            radices: radices.to_vec(),
            current,
        }
    }
}

impl Iterator for Assignments {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.current.take()?;
        let mut next = current.clone();
        if advance(&mut next, &self.radices, None) {
            self.current = Some(next);
        }
        Some(current)
    }
}

/// Conditional probability table P(node | parents).
///
/// `width` is the node's cardinality, `height` the number of parent
/// combinations. Cells are flattened state-major: `cells[state * height + column]`,
/// and the column of a combination is its mixed-radix rank over the parents in
/// connection order, last parent fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityTable {
    width: usize,
    parents: Vec<NodeId>,
    radices: Vec<usize>,
    height: usize,
    cells: Vec<f64>,
}

impl ProbabilityTable {
    /// A table where every cell is `1 / width`.
    pub fn uniform(width: usize, parents: Vec<NodeId>, radices: Vec<usize>) -> Self {
        let height = radices.iter().product();
        let mut table = Self {
            width,
            parents,
            radices,
            height,
            cells: Vec::new(),
        };
        table.initialize_uniform();
        table
    }

    /// Builds a table by evaluating `rule(state, combination)` for every cell.
    /// Both arguments are 1-based, the combination in parent order.
    pub fn from_fn<F>(width: usize, parents: Vec<NodeId>, radices: Vec<usize>, mut rule: F) -> Self
    where
        F: FnMut(usize, &[usize]) -> f64,
    {
        let mut table = Self::uniform(width, parents, radices);
        let height = table.height;
        for (column, assignment) in Assignments::new(&table.radices).enumerate() {
            let combination: Vec<usize> = assignment.iter().map(|&a| a + 1).collect();
            for state in 0..width {
                table.cells[state * height + column] = rule(state + 1, &combination);
            }
        }
        table
    }

    /// Re-shapes the table for a new parent set and resets it to uniform.
    pub fn resize(&mut self, parents: Vec<NodeId>, radices: Vec<usize>) {
        self.height = radices.iter().product();
        self.parents = parents;
        self.radices = radices;
        self.initialize_uniform();
    }

    pub fn initialize_uniform(&mut self) {
        let p = 1.0 / self.width as f64;
        self.cells = vec![p; self.width * self.height];
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    pub fn radices(&self) -> &[usize] {
        &self.radices
    }

    /// Unchecked read with zero-based indices, for the message computations.
    pub(crate) fn at(&self, state: usize, column: usize) -> f64 {
        self.cells[state * self.height + column]
    }

    /// The distribution over states for one column.
    pub fn column(&self, column: usize) -> Result<Vec<f64>> {
        self.check_column(column)?;
        Ok((0..self.width).map(|s| self.at(s, column)).collect())
    }

    /// Cell value for a 1-based state and a zero-based column.
    pub fn cell(&self, state: usize, column: usize) -> Result<f64> {
        self.check_state(state)?;
        self.check_column(column)?;
        Ok(self.at(state - 1, column))
    }

    /// Writes one cell. Indices are validated before anything is written.
    pub fn set_cell(&mut self, state: usize, column: usize, value: f64) -> Result<()> {
        self.check_state(state)?;
        self.check_column(column)?;
        self.cells[(state - 1) * self.height + column] = value;
        Ok(())
    }

    /// Column of a combination given as 1-based state indices, one per parent.
    pub fn row_index(&self, combination: &[usize]) -> Result<usize> {
        self.check_arity(combination.len())?;
        let mut assignment = Vec::with_capacity(combination.len());
        for (i, (&c, &radix)) in combination.iter().zip(&self.radices).enumerate() {
            if c < 1 || c > radix {
                return Err(BayesError::Index(format!(
                    "state {c} of parent {i} outside 1..={radix}"
                )));
            }
            assignment.push(c - 1);
        }
        Ok(rank(&assignment, &self.radices))
    }

    /// Column of a combination of parent states, in parent order.
    ///
    /// Each state must belong to the parent at its position.
    pub fn row_index_of(&self, combination: &[&State]) -> Result<usize> {
        self.check_arity(combination.len())?;
        for (state, parent) in combination.iter().zip(&self.parents) {
            if state.owner != *parent {
                return Err(BayesError::Index(format!(
                    "state `{}` belongs to node {}, expected a state of node {}",
                    state.name, state.owner, parent
                )));
            }
        }
        let ids: Vec<usize> = combination.iter().map(|s| s.id).collect();
        self.row_index(&ids)
    }

    /// P(state | combination), both 1-based.
    pub fn probability(&self, state: usize, combination: &[usize]) -> Result<f64> {
        self.check_state(state)?;
        let column = self.row_index(combination)?;
        Ok(self.at(state - 1, column))
    }

    pub fn probability_of(&self, state: usize, combination: &[&State]) -> Result<f64> {
        self.check_state(state)?;
        let column = self.row_index_of(combination)?;
        Ok(self.at(state - 1, column))
    }

    /// Swaps in `other`, which must have this table's shape and parents.
    pub fn replace_with(&mut self, other: &ProbabilityTable) -> Result<()> {
        if other.width != self.width
            || other.height != self.height
            || other.radices != self.radices
            || other.parents != self.parents
        {
            return Err(BayesError::ShapeMismatch(format!(
                "table {}x{} over {:?} cannot replace {}x{} over {:?}",
                other.width, other.height, other.parents, self.width, self.height, self.parents
            )));
        }
        self.cells.clone_from(&other.cells);
        Ok(())
    }

    /// Visits every column in rank order with its 1-based combination.
    pub fn for_each_column<F>(&self, mut visit: F)
    where
        F: FnMut(&[usize], usize),
    {
        for (column, assignment) in Assignments::new(&self.radices).enumerate() {
            let combination: Vec<usize> = assignment.iter().map(|&a| a + 1).collect();
            visit(&combination, column);
        }
    }

    pub fn column_sums(&self) -> Vec<f64> {
        (0..self.height)
            .map(|c| (0..self.width).map(|s| self.at(s, c)).sum())
            .collect()
    }

    fn check_state(&self, state: usize) -> Result<()> {
        if state < 1 || state > self.width {
            return Err(BayesError::Index(format!(
                "state {state} outside 1..={}",
                self.width
            )));
        }
        Ok(())
    }

    fn check_column(&self, column: usize) -> Result<()> {
        if column >= self.height {
            return Err(BayesError::Index(format!(
                "column {column} outside 0..{}",
                self.height
            )));
        }
        Ok(())
    }

    fn check_arity(&self, len: usize) -> Result<()> {
        if len != self.radices.len() {
            return Err(BayesError::ShapeMismatch(format!(
                "combination of {len} states for a table with {} parents",
                self.radices.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn two_parent_table() -> ProbabilityTable {
        ProbabilityTable::uniform(2, vec![NodeId(0), NodeId(1)], vec![3, 2])
    }

    #[test]
    fn test_uniform_table_shape() {
        let table = two_parent_table();
        assert_eq!(table.width(), 2);
        assert_eq!(table.height(), 6);
        for sum in table.column_sums() {
            assert!((sum - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_root_table_has_single_column() {
        let table = ProbabilityTable::uniform(4, vec![], vec![]);
        assert_eq!(table.height(), 1);
        assert_eq!(table.probability(2, &[]).unwrap(), 0.25);
    }

    #[test]
    fn test_last_parent_varies_fastest() {
        let table = two_parent_table();
        let mut seen = Vec::new();
        table.for_each_column(|combo, column| seen.push((combo.to_vec(), column)));
        assert_eq!(
            seen,
            vec![
                (vec![1, 1], 0),
                (vec![1, 2], 1),
                (vec![2, 1], 2),
                (vec![2, 2], 3),
                (vec![3, 1], 4),
                (vec![3, 2], 5),
            ]
        );
    }

    #[test]
    fn test_row_index_is_a_bijection() {
        let parents = vec![NodeId(0), NodeId(1), NodeId(2)];
        let table = ProbabilityTable::uniform(2, parents, vec![2, 3, 4]);
        let mut ranks = Vec::new();
        table.for_each_column(|combo, column| {
            let r = table.row_index(combo).unwrap();
            assert_eq!(r, column);
            ranks.push(r);
        });
        assert_eq!(ranks, (0..24).collect::<Vec<_>>());
        let unique: HashSet<usize> = ranks.into_iter().collect();
        assert_eq!(unique.len(), table.height());
    }

    #[test]
    fn test_advance_holds_fixed_digit() {
        let radices = [2, 3, 2];
        let mut assignment = vec![0, 2, 0];
        let mut visited = vec![assignment.clone()];
        while advance(&mut assignment, &radices, Some(1)) {
            visited.push(assignment.clone());
        }
        assert_eq!(visited.len(), 4);
        assert!(visited.iter().all(|a| a[1] == 2));
        assert_eq!(assignment, vec![0, 2, 0]);
    }

    #[test]
    fn test_row_index_of_checks_owner_and_arity() {
        let table = two_parent_table();
        let a = State::new(3, "a3", 0.0, NodeId(0));
        let b = State::new(2, "b2", 0.0, NodeId(1));
        assert_eq!(table.row_index_of(&[&a, &b]).unwrap(), 5);

        let foreign = State::new(1, "x", 0.0, NodeId(7));
        assert!(matches!(table.row_index_of(&[&a, &foreign]), Err(BayesError::Index(_))));
        assert!(matches!(table.row_index_of(&[&a]), Err(BayesError::ShapeMismatch(_))));
    }

    #[test]
    fn test_out_of_range_lookup_leaves_table_untouched() {
        let mut table = two_parent_table();
        table.set_cell(1, 3, 0.9).unwrap();
        let before = table.clone();

        assert!(matches!(table.probability(3, &[1, 1]), Err(BayesError::Index(_))));
        assert!(matches!(table.probability(0, &[1, 1]), Err(BayesError::Index(_))));
        assert!(matches!(table.probability(1, &[4, 1]), Err(BayesError::Index(_))));
        assert!(matches!(table.set_cell(1, 6, 0.5), Err(BayesError::Index(_))));
        assert_eq!(table, before);
        assert_eq!(table.probability(1, &[2, 2]).unwrap(), 0.9);
    }

    #[test]
    fn test_replace_with_checks_shape() {
        let mut table = two_parent_table();
        let parents = vec![NodeId(0), NodeId(1)];
        let other = ProbabilityTable::from_fn(2, parents, vec![3, 2], |s, combo| {
            if s == combo[1] {
                1.0
            } else {
                0.0
            }
        });
        table.replace_with(&other).unwrap();
        assert_eq!(table.probability(2, &[3, 2]).unwrap(), 1.0);
        assert_eq!(table.probability(1, &[3, 2]).unwrap(), 0.0);

        let wrong = ProbabilityTable::uniform(2, vec![NodeId(0)], vec![3]);
        assert!(matches!(table.replace_with(&wrong), Err(BayesError::ShapeMismatch(_))));
    }

    #[test]
    fn test_resize_resets_to_uniform() {
        let mut table = ProbabilityTable::uniform(3, vec![], vec![]);
        table.set_cell(1, 0, 1.0).unwrap();
        table.resize(vec![NodeId(4)], vec![2]);
        assert_eq!(table.height(), 2);
        for column in 0..2 {
            for p in table.column(column).unwrap() {
                assert!((p - 1.0 / 3.0).abs() < 1e-12);
            }
        }
    }
}
