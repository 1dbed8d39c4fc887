//! Search space — named parameter value lists, constraints, and trial
//! generation (exhaustive grid or seeded random sample).

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One candidate value of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
}

impl ParamValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            ParamValue::Int(v) => v as f64,
            ParamValue::Float(v) => v,
        }
    }

    /// Total order by numeric value; an integer sorts before an equal float.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.as_f64()
            .total_cmp(&other.as_f64())
            .then_with(|| self.is_float().cmp(&other.is_float()))
    }

    fn is_float(&self) -> bool {
        matches!(self, ParamValue::Float(_))
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// One parameter assignment.
pub type Params = BTreeMap<String, ParamValue>;

/// Lexicographic total order over assignments.
pub fn cmp_params(a: &Params, b: &Params) -> Ordering {
    let mut left = a.iter();
    let mut right = b.iter();
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some((ka, va)), Some((kb, vb))) => {
                let ord = ka.cmp(kb).then_with(|| va.total_cmp(vb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Predicate a parameter assignment must satisfy.
pub type Constraint = Arc<dyn Fn(&Params) -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchError {
    #[error("search parameter name must not be empty")]
    EmptyName,

    #[error("search parameter '{name}' has no candidate values")]
    EmptyValues { name: String },

    #[error("no search spaces defined")]
    EmptySpace,

    #[error("no valid parameter combinations after applying constraints ({total} rejected)")]
    NoValidCombinations { total: usize },
}

/// How trials are drawn from the constrained grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    #[default]
    Grid,
    Random,
}

pub const DEFAULT_N_TRIALS: usize = 100;

/// Ordered parameter → candidate values, plus constraints.
#[derive(Clone, Default)]
pub struct SearchSpace {
    params: Vec<(String, Vec<ParamValue>)>,
    constraints: Vec<Constraint>,
}

impl fmt::Debug for SearchSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchSpace")
            .field("params", &self.params)
            .field("constraints", &self.constraints.len())
            .finish()
    }
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter. Re-adding a name replaces its values in place.
    pub fn add(&mut self, name: &str, values: Vec<ParamValue>) -> Result<(), SearchError> {
        if name.trim().is_empty() {
            return Err(SearchError::EmptyName);
        }
        if values.is_empty() {
            return Err(SearchError::EmptyValues {
                name: name.to_string(),
            });
        }
        match self.params.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = values,
            None => self.params.push((name.to_string(), values)),
        }
        Ok(())
    }

    pub fn add_constraint<F>(&mut self, predicate: F)
    where
        F: Fn(&Params) -> bool + Send + Sync + 'static,
    {
        self.constraints.push(Arc::new(predicate));
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.params.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn values(&self, name: &str) -> Option<&[ParamValue]> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Name → values map for persistence.
    pub fn to_map(&self) -> BTreeMap<String, Vec<ParamValue>> {
        self.params.iter().cloned().collect()
    }

    pub fn satisfies(&self, params: &Params) -> bool {
        self.constraints.iter().all(|c| c(params))
    }

    /// Size of the unconstrained Cartesian product.
    pub fn cardinality(&self) -> usize {
        if self.params.is_empty() {
            return 0;
        }
        self.params.iter().map(|(_, v)| v.len()).product()
    }

    /// Every combination that passes all constraints, first parameter
    /// varying slowest.
    pub fn grid(&self) -> Result<Vec<Params>, SearchError> {
        if self.params.is_empty() {
            return Err(SearchError::EmptySpace);
        }
        let mut combos: Vec<Params> = vec![Params::new()];
        for (name, values) in &self.params {
            combos = combos
                .into_iter()
                .flat_map(|base| {
                    values.iter().map(move |v| {
                        let mut next = base.clone();
                        next.insert(name.clone(), *v);
                        next
                    })
                })
                .collect();
        }
        let total = combos.len();
        combos.retain(|p| self.satisfies(p));
        if combos.is_empty() {
            return Err(SearchError::NoValidCombinations { total });
        }
        Ok(combos)
    }

    /// Uniform sample without replacement of `min(n_trials, grid)` valid
    /// combinations. The same seed always yields the same sample.
    pub fn sample(&self, n_trials: usize, seed: Option<u64>) -> Result<Vec<Params>, SearchError> {
        let grid = self.grid()?;
        if n_trials >= grid.len() {
            return Ok(grid);
        }
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut picked: Vec<usize> = index::sample(&mut rng, grid.len(), n_trials).into_vec();
        picked.sort_unstable();
        let mut grid: Vec<Option<Params>> = grid.into_iter().map(Some).collect();
        Ok(picked.into_iter().filter_map(|i| grid[i].take()).collect())
    }

    /// Trials for `method`.
    pub fn generate(
        &self,
        method: SearchMethod,
        n_trials: usize,
        seed: Option<u64>,
    ) -> Result<Vec<Params>, SearchError> {
        match method {
            SearchMethod::Grid => self.grid(),
            SearchMethod::Random => self.sample(n_trials, seed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<ParamValue> {
        values.iter().map(|&v| ParamValue::Int(v)).collect()
    }

    fn ma_space() -> SearchSpace {
        let mut space = SearchSpace::new();
        space.add("ma_short", ints(&[5, 10, 20])).unwrap();
        space.add("ma_long", ints(&[20, 50, 100])).unwrap();
        space
    }

    fn get(p: &Params, name: &str) -> f64 {
        p[name].as_f64()
    }

    #[test]
    fn empty_inputs_rejected() {
        let mut space = SearchSpace::new();
        assert_eq!(space.add("", ints(&[1])), Err(SearchError::EmptyName));
        assert_eq!(
            space.add("x", vec![]),
            Err(SearchError::EmptyValues { name: "x".into() })
        );
        assert_eq!(space.grid(), Err(SearchError::EmptySpace));
    }

    #[test]
    fn grid_is_full_product() {
        let grid = ma_space().grid().unwrap();
        assert_eq!(grid.len(), 9);
        assert_eq!(get(&grid[0], "ma_short"), 5.0);
        assert_eq!(get(&grid[0], "ma_long"), 20.0);
        assert_eq!(get(&grid[1], "ma_long"), 50.0);
    }

    #[test]
    fn constraint_filters_grid() {
        let mut space = ma_space();
        space.add_constraint(|p| p["ma_short"].as_f64() < p["ma_long"].as_f64());
        let grid = space.grid().unwrap();
        // (20, 20) is the only rejected pair.
        assert_eq!(grid.len(), 8);
        assert!(grid.iter().all(|p| get(p, "ma_short") < get(p, "ma_long")));
    }

    #[test]
    fn constraint_rejecting_everything_is_error() {
        let mut space = ma_space();
        space.add_constraint(|_| false);
        assert_eq!(
            space.grid(),
            Err(SearchError::NoValidCombinations { total: 9 })
        );
    }

    #[test]
    fn readding_replaces_values() {
        let mut space = ma_space();
        space.add("ma_short", ints(&[1])).unwrap();
        assert_eq!(space.names(), vec!["ma_short", "ma_long"]);
        assert_eq!(space.grid().unwrap().len(), 3);
    }

    #[test]
    fn random_sample_is_seeded_and_unique() {
        let space = ma_space();
        let a = space.sample(4, Some(42)).unwrap();
        let b = space.sample(4, Some(42)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 4);
        for i in 0..a.len() {
            for j in (i + 1)..a.len() {
                assert_ne!(a[i], a[j]);
            }
        }
    }

    #[test]
    fn random_sample_caps_at_grid() {
        let sample = ma_space().sample(100, Some(1)).unwrap();
        assert_eq!(sample.len(), 9);
    }

    #[test]
    fn param_value_untagged_serde() {
        let values: Vec<ParamValue> = serde_json::from_str("[5, -0.1]").unwrap();
        assert_eq!(values, vec![ParamValue::Int(5), ParamValue::Float(-0.1)]);
        assert_eq!(serde_json::to_string(&values).unwrap(), "[5,-0.1]");
    }

    #[test]
    fn params_order_is_total() {
        let a: Params = [("x".to_string(), ParamValue::Int(1))].into_iter().collect();
        let b: Params = [("x".to_string(), ParamValue::Int(2))].into_iter().collect();
        assert_eq!(cmp_params(&a, &b), Ordering::Less);
        assert_eq!(cmp_params(&b, &a), Ordering::Greater);
        assert_eq!(cmp_params(&a, &a), Ordering::Equal);
    }
}
