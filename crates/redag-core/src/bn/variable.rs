//! Observed variables with categorical discretization.

use crate::errors::EngineError;

/// One variable: an immutable identity plus the categorical labeling of
/// its observations.
///
/// Continuous observations are classed once at construction by
/// equal-frequency binning over the distinct observed values (the
/// upstream discretization step the engine consumes as a black box);
/// after that the variable never changes and is shared read-only across
/// every chain.
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    number: usize,
    discrete: Vec<u16>,
    cardinality: usize,
}

fn strip_quotes(name: &str) -> &str {
    name.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(name)
}

impl Variable {
    /// Builds a variable from raw observations, binning them into
    /// `classes` equal-frequency categories.
    pub fn new(
        name: &str,
        data: &[f64],
        classes: usize,
        number: usize,
    ) -> Result<Self, EngineError> {
        if data.is_empty() {
            return Err(EngineError::Data(format!("variable {name} has no observations")));
        }
        if classes == 0 {
            return Err(EngineError::Data("at least one class required".into()));
        }

        let mut order: Vec<usize> = (0..data.len()).collect();
        order.sort_by(|&a, &b| data[a].partial_cmp(&data[b]).expect("NaN observation"));

        let mut uniq: Vec<f64> = Vec::new();
        for &i in &order {
            if uniq.last().map_or(true, |&last| data[i] != last) {
                uniq.push(data[i]);
            }
        }
        if classes > uniq.len() {
            return Err(EngineError::Data(format!(
                "variable {name}: {classes} classes but only {} distinct values",
                uniq.len()
            )));
        }

        // Class boundaries at equal-frequency positions over the distinct
        // values, placed halfway between neighbors.
        let mut edges: Vec<f64> = Vec::with_capacity(classes - 1);
        for i in 1..classes {
            let pos = uniq.len() * i / classes;
            edges.push((uniq[pos - 1] + uniq[pos]) / 2.0);
        }

        let discrete: Vec<u16> = data
            .iter()
            .map(|&x| edges.partition_point(|&e| e <= x) as u16)
            .collect();

        Ok(Self {
            name: strip_quotes(name).to_string(),
            number,
            discrete,
            cardinality: classes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stable input-order index, used for output naming after the chain's
    /// internal permutation is undone.
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    pub fn observation_count(&self) -> usize {
        self.discrete.len()
    }

    /// Class label of observation `i`, in `0..cardinality()`.
    pub fn discrete_value(&self, i: usize) -> usize {
        usize::from(self.discrete[i])
    }
}
