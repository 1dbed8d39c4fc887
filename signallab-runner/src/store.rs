//! Optimization results store — ranking, top-N tables, heatmaps, and
//! persistence of trial outcomes.
//!
//! Persisted as a JSON bundle `{metric, search_spaces, trials}`. Metric
//! values that are not finite (an all-winner profit factor is `+∞`) are
//! written as the strings `"inf"`, `"-inf"` and `"nan"` so the file stays
//! valid JSON and loads back to the same values.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::history::read_trials;
use crate::search::{cmp_params, ParamValue, Params};

/// Metric name → value.
pub type Metrics = BTreeMap<String, f64>;

/// The metric minimized rather than maximized.
pub const MINIMIZED_METRIC: &str = "max_drawdown";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("parameter '{name}' not found in search spaces")]
    UnknownParameter { name: String },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ─── Trials ─────────────────────────────────────────────────────────

/// Outcome of one parameter assignment. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub params: Params,
    #[serde(with = "lenient_float")]
    pub metrics: Metrics,
    #[serde(default, with = "lenient_float::option")]
    pub oos_metrics: Option<Metrics>,
}

/// What "best" means: one metric, or a weighted blend of several.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricSpec {
    Single(String),
    Weighted(BTreeMap<String, f64>),
}

impl Default for MetricSpec {
    fn default() -> Self {
        MetricSpec::Single("sharpe_ratio".to_string())
    }
}

impl fmt::Display for MetricSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricSpec::Single(name) => f.write_str(name),
            MetricSpec::Weighted(weights) => {
                let parts: Vec<String> = weights.iter().map(|(m, w)| format!("{w}*{m}")).collect();
                f.write_str(&parts.join(" + "))
            }
        }
    }
}

impl MetricSpec {
    /// Composite score Σ w·v, with `max_drawdown` entering as `1 − v`.
    /// Metrics absent from the trial count as zero.
    pub fn composite(weights: &BTreeMap<String, f64>, metrics: &Metrics) -> f64 {
        weights
            .iter()
            .map(|(name, weight)| {
                let value = metrics.get(name).copied().unwrap_or(0.0);
                let value = if name == MINIMIZED_METRIC {
                    1.0 - value
                } else {
                    value
                };
                value * weight
            })
            .sum()
    }

    /// Higher-is-better ranking key. `None` ranks last.
    fn rank_key(&self, metrics: &Metrics) -> Option<f64> {
        let key = match self {
            MetricSpec::Single(name) => {
                let value = *metrics.get(name)?;
                if name == MINIMIZED_METRIC {
                    -value
                } else {
                    value
                }
            }
            MetricSpec::Weighted(weights) => Self::composite(weights, metrics),
        };
        (!key.is_nan()).then_some(key)
    }
}

/// One row of [`OptimizationResults::top`].
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow {
    pub params: Params,
    pub metrics: Metrics,
    /// Present only under a weighted metric.
    pub composite_score: Option<f64>,
}

// ─── Results ────────────────────────────────────────────────────────

/// The set of trials produced by one optimization run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResults {
    metric: MetricSpec,
    search_spaces: BTreeMap<String, Vec<ParamValue>>,
    trials: Vec<TrialResult>,
}

impl OptimizationResults {
    pub fn new(
        trials: Vec<TrialResult>,
        metric: MetricSpec,
        search_spaces: BTreeMap<String, Vec<ParamValue>>,
    ) -> Self {
        Self {
            metric,
            search_spaces,
            trials,
        }
    }

    pub fn metric(&self) -> &MetricSpec {
        &self.metric
    }

    pub fn search_spaces(&self) -> &BTreeMap<String, Vec<ParamValue>> {
        &self.search_spaces
    }

    pub fn trials(&self) -> &[TrialResult] {
        &self.trials
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Trials in ranking order: best first, missing metric last, ties
    /// broken by parameter order.
    pub fn ranked(&self) -> Vec<&TrialResult> {
        let mut keyed: Vec<(Option<f64>, &TrialResult)> = self
            .trials
            .iter()
            .map(|t| (self.metric.rank_key(&t.metrics), t))
            .collect();
        keyed.sort_by(|(ka, a), (kb, b)| {
            let by_key = match (ka, kb) {
                (Some(x), Some(y)) => y.total_cmp(x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            by_key.then_with(|| cmp_params(&a.params, &b.params))
        });
        keyed.into_iter().map(|(_, t)| t).collect()
    }

    pub fn best(&self) -> Option<&TrialResult> {
        self.ranked().into_iter().next()
    }

    /// The first `min(n, len)` trials in ranking order.
    pub fn top(&self, n: usize) -> Vec<RankedRow> {
        self.ranked()
            .into_iter()
            .take(n)
            .map(|t| RankedRow {
                params: t.params.clone(),
                metrics: t.metrics.clone(),
                composite_score: match &self.metric {
                    MetricSpec::Weighted(w) => Some(MetricSpec::composite(w, &t.metrics)),
                    MetricSpec::Single(_) => None,
                },
            })
            .collect()
    }

    /// Grid of `metric` over two registered parameters.
    pub fn heatmap(&self, x_param: &str, y_param: &str, metric: &str) -> Result<Heatmap, StoreError> {
        let x_values = self.axis(x_param)?;
        let y_values = self.axis(y_param)?;
        let mut cells = vec![vec![None; x_values.len()]; y_values.len()];

        for trial in &self.trials {
            let (Some(x), Some(y)) = (trial.params.get(x_param), trial.params.get(y_param)) else {
                continue;
            };
            let xi = x_values.iter().position(|v| v.total_cmp(x) == Ordering::Equal);
            let yi = y_values.iter().position(|v| v.total_cmp(y) == Ordering::Equal);
            if let (Some(xi), Some(yi)) = (xi, yi) {
                cells[yi][xi] = trial.metrics.get(metric).copied();
            }
        }

        Ok(Heatmap {
            x_param: x_param.to_string(),
            y_param: y_param.to_string(),
            metric: metric.to_string(),
            x_values,
            y_values,
            cells,
        })
    }

    fn axis(&self, param: &str) -> Result<Vec<ParamValue>, StoreError> {
        let values = self
            .search_spaces
            .get(param)
            .ok_or_else(|| StoreError::UnknownParameter {
                name: param.to_string(),
            })?;
        Ok(sorted_unique(values.iter().copied()))
    }

    // ── Persistence ──

    /// Write to `path`. A `.csv` path gets the full ranked table; anything
    /// else is written as the JSON bundle with a `.json` extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<PathBuf, StoreError> {
        let path = path.as_ref();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        let (path, content) = if is_csv {
            (path.to_path_buf(), rows_to_csv(&self.top(self.len()))?)
        } else {
            (path.with_extension("json"), serde_json::to_string_pretty(self)?)
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        std::fs::write(&path, content).map_err(io_error(&path))?;
        info!(path = %path.display(), trials = self.len(), "saved optimization results");
        Ok(path)
    }

    /// Load a JSON bundle written by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(io_error(path))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Rebuild results from a streaming NDJSON file. Search spaces are the
    /// sorted union of the values observed per parameter.
    pub fn load_streaming(path: impl AsRef<Path>, metric: MetricSpec) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let trials = read_trials(path).map_err(io_error(path))?;

        let mut observed: BTreeMap<String, Vec<ParamValue>> = BTreeMap::new();
        for trial in &trials {
            for (name, value) in &trial.params {
                observed.entry(name.clone()).or_default().push(*value);
            }
        }
        let search_spaces = observed
            .into_iter()
            .map(|(name, values)| (name, sorted_unique(values.into_iter())))
            .collect();

        Ok(Self::new(trials, metric, search_spaces))
    }
}

fn sorted_unique(values: impl Iterator<Item = ParamValue>) -> Vec<ParamValue> {
    let mut values: Vec<ParamValue> = values.collect();
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
    values
}

// ─── Rendering ──────────────────────────────────────────────────────

/// Column layout shared by the CSV and Markdown renderers.
fn row_columns(rows: &[RankedRow]) -> (Vec<String>, Vec<String>, bool) {
    let params: BTreeSet<&String> = rows.iter().flat_map(|r| r.params.keys()).collect();
    let metrics: BTreeSet<&String> = rows.iter().flat_map(|r| r.metrics.keys()).collect();
    let composite = rows.iter().any(|r| r.composite_score.is_some());
    (
        params.into_iter().cloned().collect(),
        metrics.into_iter().cloned().collect(),
        composite,
    )
}

fn row_cells(row: &RankedRow, params: &[String], metrics: &[String], composite: bool) -> Vec<String> {
    let mut cells: Vec<String> = params
        .iter()
        .map(|p| row.params.get(p).map(|v| v.to_string()).unwrap_or_default())
        .collect();
    cells.extend(
        metrics
            .iter()
            .map(|m| row.metrics.get(m).map(|v| v.to_string()).unwrap_or_default()),
    );
    if composite {
        cells.push(row.composite_score.map(|v| v.to_string()).unwrap_or_default());
    }
    cells
}

/// Ranked rows as CSV: parameter columns, metric columns, then
/// `composite_score` when present.
pub fn rows_to_csv(rows: &[RankedRow]) -> Result<String, StoreError> {
    let (params, metrics, composite) = row_columns(rows);
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header: Vec<&str> = params.iter().chain(&metrics).map(|s| s.as_str()).collect();
    if composite {
        header.push("composite_score");
    }
    wtr.write_record(&header)?;
    for row in rows {
        wtr.write_record(row_cells(row, &params, &metrics, composite))?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| StoreError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Ranked rows as a Markdown table with a leading rank column.
pub fn rows_to_markdown(rows: &[RankedRow]) -> String {
    let (params, metrics, composite) = row_columns(rows);
    let mut header: Vec<&str> = vec!["#"];
    header.extend(params.iter().chain(&metrics).map(|s| s.as_str()));
    if composite {
        header.push("composite_score");
    }

    let mut md = String::new();
    md.push_str(&format!("| {} |\n", header.join(" | ")));
    md.push_str(&format!("|{}\n", " --- |".repeat(header.len())));
    for (rank, row) in rows.iter().enumerate() {
        let cells = row_cells(row, &params, &metrics, composite)
            .into_iter()
            .map(|c| match c.parse::<f64>() {
                Ok(v) if c.contains('.') => format!("{v:.4}"),
                _ => c,
            })
            .collect::<Vec<_>>();
        md.push_str(&format!("| {} | {} |\n", rank + 1, cells.join(" | ")));
    }
    md
}

/// Metric values over a two-parameter grid. `cells[y][x]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    pub x_param: String,
    pub y_param: String,
    pub metric: String,
    pub x_values: Vec<ParamValue>,
    pub y_values: Vec<ParamValue>,
    pub cells: Vec<Vec<Option<f64>>>,
}

impl Heatmap {
    pub fn get(&self, x: ParamValue, y: ParamValue) -> Option<f64> {
        let xi = self.x_values.iter().position(|v| v.total_cmp(&x) == Ordering::Equal)?;
        let yi = self.y_values.iter().position(|v| v.total_cmp(&y) == Ordering::Equal)?;
        self.cells[yi][xi]
    }

    /// CSV with `y \ x` in the corner; empty cells stay blank.
    pub fn to_csv(&self) -> Result<String, StoreError> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        let mut header = vec![format!("{}\\{}", self.y_param, self.x_param)];
        header.extend(self.x_values.iter().map(|v| v.to_string()));
        wtr.write_record(&header)?;
        for (y, row) in self.y_values.iter().zip(&self.cells) {
            let mut record = vec![y.to_string()];
            record.extend(row.iter().map(|c| c.map(|v| v.to_string()).unwrap_or_default()));
            wtr.write_record(&record)?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| StoreError::Csv(e.into_error().into()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl fmt::Display for Heatmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} by {} (x) and {} (y)", self.metric, self.x_param, self.y_param)?;
        write!(f, "{:>10}", "")?;
        for x in &self.x_values {
            write!(f, " {:>10}", x.to_string())?;
        }
        writeln!(f)?;
        for (y, row) in self.y_values.iter().zip(&self.cells) {
            write!(f, "{:>10}", y.to_string())?;
            for cell in row {
                match cell {
                    Some(v) => write!(f, " {v:>10.4}")?,
                    None => write!(f, " {:>10}", "-")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// ─── Non-finite float codec ─────────────────────────────────────────

/// Serde adapter for [`Metrics`] that writes non-finite values as strings.
mod lenient_float {
    use std::collections::BTreeMap;
    use std::fmt;

    use serde::de::{self, Deserializer, Unexpected, Visitor};
    use serde::ser::Serializer;
    use serde::{Deserialize, Serialize};

    use super::Metrics;

    struct Lenient(f64);

    impl Serialize for Lenient {
        fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
            let v = self.0;
            if v.is_finite() {
                s.serialize_f64(v)
            } else if v.is_nan() {
                s.serialize_str("nan")
            } else if v > 0.0 {
                s.serialize_str("inf")
            } else {
                s.serialize_str("-inf")
            }
        }
    }

    struct LenientVisitor;

    impl<'de> Visitor<'de> for LenientVisitor {
        type Value = Lenient;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number or one of \"inf\", \"-inf\", \"nan\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Lenient, E> {
            Ok(Lenient(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Lenient, E> {
            Ok(Lenient(v as f64))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Lenient, E> {
            Ok(Lenient(v as f64))
        }

        fn visit_unit<E: de::Error>(self) -> Result<Lenient, E> {
            Ok(Lenient(f64::NAN))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Lenient, E> {
            match v.to_ascii_lowercase().as_str() {
                "inf" | "+inf" | "infinity" => Ok(Lenient(f64::INFINITY)),
                "-inf" | "-infinity" => Ok(Lenient(f64::NEG_INFINITY)),
                "nan" => Ok(Lenient(f64::NAN)),
                _ => v
                    .parse::<f64>()
                    .map(Lenient)
                    .map_err(|_| E::invalid_value(Unexpected::Str(v), &self)),
            }
        }
    }

    impl<'de> Deserialize<'de> for Lenient {
        fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
            d.deserialize_any(LenientVisitor)
        }
    }

    struct LenientMap<'a>(&'a Metrics);

    impl Serialize for LenientMap<'_> {
        fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
            s.collect_map(self.0.iter().map(|(k, v)| (k, Lenient(*v))))
        }
    }

    fn unwrap_map(raw: BTreeMap<String, Lenient>) -> Metrics {
        raw.into_iter().map(|(k, v)| (k, v.0)).collect()
    }

    pub fn serialize<S: Serializer>(map: &Metrics, s: S) -> Result<S::Ok, S::Error> {
        LenientMap(map).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Metrics, D::Error> {
        BTreeMap::<String, Lenient>::deserialize(d).map(unwrap_map)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(map: &Option<Metrics>, s: S) -> Result<S::Ok, S::Error> {
            match map {
                Some(map) => s.serialize_some(&LenientMap(map)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Metrics>, D::Error> {
            Option::<BTreeMap<String, Lenient>>::deserialize(d).map(|m| m.map(unwrap_map))
        }
    }
}
