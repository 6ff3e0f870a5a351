//! Tab-separated text for tables and state reports.
//!
//! A table is written as a header row (parent names, then the node's state
//! names) followed by one line per parent combination in column order: the
//! parents' state names, then P(state | combination) for every state.

use std::io::{BufRead, Write};

use crate::errors::{BayesError, Result};
use crate::network::Network;
use crate::node::NodeId;
use crate::table::ProbabilityTable;

fn header(network: &Network, id: NodeId) -> Result<Vec<String>> {
    let node = network.node(id)?;
    let mut fields: Vec<String> = node
        .parents()
        .iter()
        .map(|&p| network.node(p).map(|n| n.name().to_string()))
        .collect::<Result<_>>()?;
    fields.extend(node.states().iter().map(|s| s.name.clone()));
    Ok(fields)
}

/// Parent state names for every column of the node's table, in column order.
fn column_labels(network: &Network, id: NodeId) -> Result<Vec<Vec<String>>> {
    let node = network.node(id)?;
    let parents = node
        .parents()
        .iter()
        .map(|&p| network.node(p))
        .collect::<Result<Vec<_>>>()?;

    let mut labels: Vec<Vec<String>> = Vec::with_capacity(node.table().height());
    node.table().for_each_column(|combination, _| {
        labels.push(
            combination
                .iter()
                .zip(&parents)
                .map(|(&s, parent)| parent.states()[s - 1].name.clone())
                .collect(),
        );
    });
    Ok(labels)
}

pub fn write_table<W: Write>(network: &Network, id: NodeId, writer: &mut W) -> Result<()> {
    let table = network.node(id)?.table();
    writeln!(writer, "{}", header(network, id)?.join("\t"))?;

    for (column, labels) in column_labels(network, id)?.into_iter().enumerate() {
        let values = table.column(column)?;
        let fields: Vec<String> = labels
            .into_iter()
            .chain(values.iter().map(|p| p.to_string()))
            .collect();
        writeln!(writer, "{}", fields.join("\t"))?;
    }
    Ok(())
}

/// Parses a table for `id` in the layout `write_table` produces.
///
/// Blank lines are skipped. Every column must sum to 1 within the network's
/// configured tolerance.
pub fn read_table<R: BufRead>(
    network: &Network,
    id: NodeId,
    reader: R,
) -> Result<ProbabilityTable> {
    let expected_header = header(network, id)?;
    let labels = column_labels(network, id)?;
    let mut table = network.blank_table(id)?;
    let k = table.width();
    let n_parents = table.radices().len();

    let mut lines = reader
        .lines()
        .enumerate()
        .map(|(i, line)| line.map(|l| (i + 1, l)))
        .filter(|line| !matches!(line, Ok((_, l)) if l.trim().is_empty()));

    let (line_no, first) = lines
        .next()
        .transpose()?
        .ok_or_else(|| BayesError::ShapeMismatch("empty table text".into()))?;
    let found: Vec<&str> = first.split('\t').map(str::trim).collect();
    if found != expected_header {
        return Err(BayesError::Parse {
            line: line_no,
            msg: format!("header {found:?}, expected {expected_header:?}"),
        });
    }

    for (column, expected) in labels.iter().enumerate() {
        let (line_no, line) = lines.next().transpose()?.ok_or_else(|| {
            BayesError::ShapeMismatch(format!("{} columns, expected {}", column, labels.len()))
        })?;
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        if fields.len() != n_parents + k {
            return Err(BayesError::ShapeMismatch(format!(
                "line {line_no} has {} fields, expected {}",
                fields.len(),
                n_parents + k
            )));
        }
        if fields[..n_parents] != expected[..] {
            return Err(BayesError::Parse {
                line: line_no,
                msg: format!("combination {:?}, expected {expected:?}", &fields[..n_parents]),
            });
        }

        let mut sum = 0.0;
        for (s, field) in fields[n_parents..].iter().enumerate() {
            let p: f64 = field.parse().map_err(|_| BayesError::Parse {
                line: line_no,
                msg: format!("`{field}` is not a probability"),
            })?;
            if !(0.0..=1.0).contains(&p) {
                return Err(BayesError::Parse {
                    line: line_no,
                    msg: format!("{p} is outside [0, 1]"),
                });
            }
            table.set_cell(s + 1, column, p)?;
            sum += p;
        }

        if (sum - 1.0).abs() > network.config().tolerance {
            return Err(BayesError::Parse {
                line: line_no,
                msg: format!("column sums to {sum}"),
            });
        }
    }

    if let Some((line_no, _)) = lines.next().transpose()? {
        return Err(BayesError::ShapeMismatch(format!(
            "unexpected line {line_no} after {} columns",
            labels.len()
        )));
    }

    Ok(table)
}

/// Reads a table and installs it on the node.
pub fn load_table<R: BufRead>(network: &mut Network, id: NodeId, reader: R) -> Result<()> {
    let table = read_table(network, id, reader)?;
    network.install_table(id, &table)
}

/// Writes every node's state probabilities, one state per line.
pub fn write_states<W: Write>(network: &Network, writer: &mut W) -> Result<()> {
    writeln!(writer, "# node\tid\tname\tprobability")?;
    for node in network.nodes() {
        for state in node.states() {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}",
                node.name(),
                state.id,
                state.name,
                state.probability
            )?;
        }
    }
    Ok(())
}
