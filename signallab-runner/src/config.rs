//! TOML run configuration.
//!
//! One file describes a backtest (symbols, dates, signals, exit rules) and,
//! optionally, a parameter search over it:
//!
//! ```toml
//! [backtest]
//! symbols = ["AAPL", "MSFT"]
//! start = "2023-01-01"
//! end = "2023-12-31"
//! commission = 0.001
//!
//! [[signals]]
//! name = "golden_cross"
//! params = { short = 10, long = 50 }
//!
//! [[exit_rules]]
//! name = "stop_loss"
//! params = { threshold = -0.05 }
//!
//! [optimize]
//! method = "random"
//! n_trials = 20
//! seed = 7
//! metric = { sharpe_ratio = 0.6, max_drawdown = 0.4 }
//!
//! [search_space]
//! ma_short = [5, 10, 20]
//! ma_long = [50, 100]
//!
//! [[constraints]]
//! left = "ma_short"
//! op = "<"
//! right = "ma_long"
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use signallab_core::data::{
    CsvPriceProvider, DataError, PriceProvider, ScreenerFilter, SyntheticProvider, Universe,
};
use signallab_core::engine::DEFAULT_CASH;
use signallab_core::ConfigError;

use crate::backtester::Backtester;
use crate::optimizer::{OptimizeRequest, Optimizer};
use crate::search::{ParamValue, Params, SearchError, SearchMethod, DEFAULT_N_TRIALS};
use crate::store::MetricSpec;
use crate::walk_forward::WalkForwardConfig;

#[derive(Debug, Error)]
pub enum RunConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid run configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Component(#[from] ConfigError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("constraint references unknown search parameter '{name}'")]
    UnknownConstraintParam { name: String },

    #[error("configuration has no [optimize] section")]
    NoOptimizeSection,

    #[error("timeout_secs must be a non-negative number of seconds, got {secs}")]
    InvalidTimeout { secs: f64 },
}

// ─── File layout ─────────────────────────────────────────────────────

/// Parsed run file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub backtest: BacktestSection,
    #[serde(default)]
    pub signals: Vec<ComponentConfig>,
    #[serde(default)]
    pub exit_rules: Vec<ComponentConfig>,
    #[serde(default)]
    pub optimize: Option<OptimizeSection>,
    /// Parameter name → candidate values, in declaration order. The first
    /// parameter varies slowest in the grid.
    #[serde(
        default,
        deserialize_with = "ordered_entries",
        serialize_with = "entries_as_map"
    )]
    pub search_space: Vec<(String, Vec<ParamValue>)>,
    #[serde(default)]
    pub constraints: Vec<ConstraintConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSection {
    /// Explicit symbols. When empty, symbols come from `universe`.
    #[serde(default)]
    pub symbols: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default = "default_cash")]
    pub cash: f64,
    #[serde(default)]
    pub commission: f64,
    #[serde(default)]
    pub max_workers: Option<usize>,
    /// Directory of `<SYMBOL>.csv` files; synthetic prices when absent.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub entry_rule: Option<String>,
    /// Sector universe file used for screening and sector breakdowns.
    #[serde(default)]
    pub universe: Option<PathBuf>,
    /// Screener filter applied to the universe.
    #[serde(default)]
    pub screener: ScreenerFilter,
}

fn default_cash() -> f64 {
    DEFAULT_CASH
}

type SearchEntries = Vec<(String, Vec<ParamValue>)>;

/// Read a table as `(key, value)` pairs in document order.
fn ordered_entries<'de, D>(deserializer: D) -> Result<SearchEntries, D::Error>
where
    D: Deserializer<'de>,
{
    struct EntriesVisitor;

    impl<'de> Visitor<'de> for EntriesVisitor {
        type Value = SearchEntries;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a table of parameter value lists")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(EntriesVisitor)
}

fn entries_as_map<S>(entries: &SearchEntries, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(entries.iter().map(|(name, values)| (name, values)))
}

/// A named component with numeric parameters (signal or exit rule).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeSection {
    #[serde(default)]
    pub method: SearchMethod,
    #[serde(default = "default_n_trials")]
    pub n_trials: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub metric: MetricSpec,
    #[serde(default)]
    pub n_jobs: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<f64>,
    #[serde(default)]
    pub streaming_output: Option<PathBuf>,
    #[serde(default)]
    pub walk_forward: Option<WalkForwardConfig>,
}

fn default_n_trials() -> usize {
    DEFAULT_N_TRIALS
}

// ─── Constraints ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl CompareOp {
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }
}

/// Right-hand side of a constraint: a literal or another parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Value(f64),
    Param(String),
}

/// `left op right` over a parameter assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintConfig {
    pub left: String,
    pub op: CompareOp,
    pub right: Operand,
}

impl ConstraintConfig {
    /// Evaluate against `params`. A missing parameter fails the constraint.
    pub fn holds(&self, params: &Params) -> bool {
        let Some(left) = params.get(&self.left).map(ParamValue::as_f64) else {
            return false;
        };
        let right = match &self.right {
            Operand::Value(v) => *v,
            Operand::Param(name) => match params.get(name) {
                Some(v) => v.as_f64(),
                None => return false,
            },
        };
        self.op.apply(left, right)
    }

    fn referenced(&self) -> impl Iterator<Item = &str> {
        let right = match &self.right {
            Operand::Param(name) => Some(name.as_str()),
            Operand::Value(_) => None,
        };
        std::iter::once(self.left.as_str()).chain(right)
    }
}

impl fmt::Display for ConstraintConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.right {
            Operand::Value(v) => write!(f, "{} {} {v}", self.left, self.op.symbol()),
            Operand::Param(p) => write!(f, "{} {} {p}", self.left, self.op.symbol()),
        }
    }
}

// ─── Loading and building ────────────────────────────────────────────

impl RunConfig {
    pub fn from_toml(content: &str) -> Result<Self, RunConfigError> {
        let config: RunConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, RunConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| RunConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    fn validate(&self) -> Result<(), RunConfigError> {
        for constraint in &self.constraints {
            if let Some(name) = constraint
                .referenced()
                .find(|name| !self.search_space.iter().any(|(n, _)| n == name))
            {
                return Err(RunConfigError::UnknownConstraintParam {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// CSV directory provider when `data_dir` is set, synthetic otherwise.
    pub fn provider(&self) -> Arc<dyn PriceProvider> {
        match &self.backtest.data_dir {
            Some(dir) => Arc::new(CsvPriceProvider::new(dir.clone())),
            None => Arc::new(SyntheticProvider::new()),
        }
    }

    pub fn universe(&self) -> Result<Option<Universe>, RunConfigError> {
        match &self.backtest.universe {
            Some(path) => Ok(Some(Universe::from_file(path)?)),
            None => Ok(None),
        }
    }

    /// Backtester with the configured cash, commission, signals and rules.
    pub fn backtester(&self, provider: Arc<dyn PriceProvider>) -> Result<Backtester, RunConfigError> {
        let mut bt = Backtester::new(provider)
            .with_cash(self.backtest.cash)
            .with_commission(self.backtest.commission);
        if self.signals.is_empty() {
            return Err(ConfigError::NoSignals.into());
        }
        for signal in &self.signals {
            bt.add_signal(&signal.name, signal.params.clone())?;
        }
        if let Some(name) = &self.backtest.entry_rule {
            bt.add_entry_rule(name, &BTreeMap::new())?;
        }
        for rule in &self.exit_rules {
            bt.add_exit_rule(&rule.name, &rule.params)?;
        }
        Ok(bt)
    }

    /// Optimizer with the configured search space and constraints.
    pub fn optimizer(&self, provider: Arc<dyn PriceProvider>) -> Result<Optimizer, RunConfigError> {
        let mut optimizer = Optimizer::new(provider)
            .with_cash(self.backtest.cash)
            .with_commission(self.backtest.commission);
        for (name, values) in &self.search_space {
            optimizer.add_search_space(name, values.clone())?;
        }
        for constraint in &self.constraints {
            let constraint = constraint.clone();
            optimizer.add_constraint(move |params| constraint.holds(params));
        }
        Ok(optimizer)
    }

    /// Optimization request over `symbols`.
    pub fn optimize_request(&self, symbols: Vec<String>) -> Result<OptimizeRequest, RunConfigError> {
        let section = self
            .optimize
            .as_ref()
            .ok_or(RunConfigError::NoOptimizeSection)?;
        let timeout = section
            .timeout_secs
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map_err(|_| RunConfigError::InvalidTimeout { secs })
            })
            .transpose()?;
        Ok(OptimizeRequest {
            symbols,
            start: self.backtest.start,
            end: self.backtest.end,
            method: section.method,
            n_trials: section.n_trials,
            seed: section.seed,
            metric: section.metric.clone(),
            n_jobs: section.n_jobs,
            timeout,
            walk_forward: section.walk_forward,
            streaming_output: section.streaming_output.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[backtest]
symbols = ["AAA", "BBB"]
start = "2023-01-01"
end = "2023-12-31"
commission = 0.001
max_workers = 2

[[signals]]
name = "golden_cross"
params = { short = 5, long = 20 }

[[signals]]
name = "rsi_oversold"

[[exit_rules]]
name = "stop_loss"
params = { threshold = -0.05 }

[[exit_rules]]
name = "max_holding_days"
params = { days = 10 }

[optimize]
method = "random"
n_trials = 3
seed = 7
metric = { sharpe_ratio = 0.6, max_drawdown = 0.4 }
timeout_secs = 30
streaming_output = "out/trials.jsonl"

[optimize.walk_forward]
n_splits = 4

[search_space]
ma_short = [5, 10, 20]
ma_long = [20, 50]
stop_loss = [-0.05, -0.1]

[[constraints]]
left = "ma_short"
op = "<"
right = "ma_long"

[[constraints]]
left = "stop_loss"
op = ">="
right = -0.1
"#;

    #[test]
    fn parses_full_file() {
        let config = RunConfig::from_toml(FULL).unwrap();
        assert_eq!(config.backtest.symbols, vec!["AAA", "BBB"]);
        assert_eq!(config.backtest.cash, DEFAULT_CASH);
        assert_eq!(config.backtest.max_workers, Some(2));
        assert_eq!(config.signals.len(), 2);
        assert_eq!(config.signals[0].params["long"], 20.0);
        assert!(config.signals[1].params.is_empty());
        let names: Vec<&str> = config.search_space.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["ma_short", "ma_long", "stop_loss"]);
        assert_eq!(config.search_space[0].1[0], ParamValue::Int(5));
        assert_eq!(config.search_space[2].1[1], ParamValue::Float(-0.1));
        assert_eq!(config.constraints[0].right, Operand::Param("ma_long".into()));
        assert_eq!(config.constraints[1].right, Operand::Value(-0.1));
        assert_eq!(config.constraints[0].to_string(), "ma_short < ma_long");

        let optimize = config.optimize.as_ref().unwrap();
        assert_eq!(optimize.method, SearchMethod::Random);
        assert!(matches!(optimize.metric, MetricSpec::Weighted(ref w) if w.len() == 2));
        let wf = optimize.walk_forward.unwrap();
        assert_eq!(wf.n_splits, 4);
        assert_eq!(wf.train_ratio, 0.7);
    }

    #[test]
    fn builds_backtester() {
        let config = RunConfig::from_toml(FULL).unwrap();
        let bt = config.backtester(config.provider()).unwrap();
        assert_eq!(bt.signals().len(), 2);
        let sim = bt.simulation_config();
        assert_eq!(sim.commission, 0.001);
        assert_eq!(sim.exit_rules.stop_loss, Some(-0.05));
        assert_eq!(sim.exit_rules.max_holding_days, Some(10));
    }

    #[test]
    fn builds_constrained_optimizer() {
        let config = RunConfig::from_toml(FULL).unwrap();
        let optimizer = config.optimizer(config.provider()).unwrap();
        let space = optimizer.search_space();
        assert_eq!(space.constraint_count(), 2);
        // 3 × 2 × 2 = 12; (20, 20) pairs fail ma_short < ma_long.
        assert_eq!(space.cardinality(), 12);
        assert_eq!(space.grid().unwrap().len(), 10);
    }

    #[test]
    fn builds_request() {
        let config = RunConfig::from_toml(FULL).unwrap();
        let request = config.optimize_request(vec!["AAA".into()]).unwrap();
        assert_eq!(request.n_trials, 3);
        assert_eq!(request.seed, Some(7));
        assert_eq!(request.timeout, Some(Duration::from_secs(30)));
        assert_eq!(request.start, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert_eq!(
            request.streaming_output.as_deref(),
            Some(Path::new("out/trials.jsonl"))
        );
    }

    #[test]
    fn minimal_file_defaults() {
        let config = RunConfig::from_toml(
            "[backtest]\nstart = \"2024-01-01\"\nend = \"2024-06-30\"\n",
        )
        .unwrap();
        assert!(config.optimize.is_none());
        assert!(config.backtest.symbols.is_empty());
        assert!(matches!(
            config.optimize_request(vec![]),
            Err(RunConfigError::NoOptimizeSection)
        ));
        assert!(matches!(
            config.backtester(config.provider()),
            Err(RunConfigError::Component(ConfigError::NoSignals))
        ));
    }

    #[test]
    fn unknown_constraint_param_rejected() {
        let err = RunConfig::from_toml(
            r#"
[backtest]
start = "2024-01-01"
end = "2024-06-30"

[search_space]
ma_short = [5]

[[constraints]]
left = "ma_short"
op = "<"
right = "ma_long"
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RunConfigError::UnknownConstraintParam { ref name } if name == "ma_long"
        ));
    }

    #[test]
    fn unknown_signal_surfaces_component_error() {
        let mut config = RunConfig::from_toml(FULL).unwrap();
        config.signals[0].name = "nope".into();
        assert!(matches!(
            config.backtester(config.provider()),
            Err(RunConfigError::Component(ConfigError::UnknownSignal { .. }))
        ));
    }

    #[test]
    fn constraint_operators() {
        let params: Params = [
            ("a".to_string(), ParamValue::Int(5)),
            ("b".to_string(), ParamValue::Float(5.0)),
        ]
        .into_iter()
        .collect();
        let check = |op, right| {
            ConstraintConfig {
                left: "a".into(),
                op,
                right,
            }
            .holds(&params)
        };
        assert!(check(CompareOp::Eq, Operand::Param("b".into())));
        assert!(check(CompareOp::Le, Operand::Value(5.0)));
        assert!(!check(CompareOp::Lt, Operand::Value(5.0)));
        assert!(check(CompareOp::Ne, Operand::Value(4.0)));
        assert!(!check(CompareOp::Gt, Operand::Param("missing".into())));
    }

    #[test]
    fn search_space_keeps_declaration_order() {
        let config = RunConfig::from_toml(
            r#"
[backtest]
start = "2024-01-01"
end = "2024-06-30"

[search_space]
stop_loss = [-0.05, -0.1]
ma_short = [5, 10]
ma_long = [20]
"#,
        )
        .unwrap();
        let optimizer = config.optimizer(config.provider()).unwrap();
        let space = optimizer.search_space();
        assert_eq!(space.names(), vec!["stop_loss", "ma_short", "ma_long"]);

        // First declared parameter varies slowest.
        let grid = space.grid().unwrap();
        assert_eq!(grid[0]["stop_loss"], ParamValue::Float(-0.05));
        assert_eq!(grid[1]["stop_loss"], ParamValue::Float(-0.05));
        assert_eq!(grid[2]["stop_loss"], ParamValue::Float(-0.1));

        let rendered = serde_json::to_string(&config).unwrap();
        let stop = rendered.find("\"stop_loss\"").unwrap();
        let short = rendered.find("\"ma_short\"").unwrap();
        assert!(stop < short, "{rendered}");
    }

    #[test]
    fn invalid_timeout_is_config_error() {
        for secs in ["-1.0", "1e30", "nan"] {
            let config = RunConfig::from_toml(&format!(
                "[backtest]\nstart = \"2024-01-01\"\nend = \"2024-06-30\"\n\n\
                 [optimize]\ntimeout_secs = {secs}\n"
            ))
            .unwrap();
            let err = config.optimize_request(vec!["AAA".into()]).unwrap_err();
            assert!(
                matches!(err, RunConfigError::InvalidTimeout { .. }),
                "{secs}: {err:?}"
            );
        }

        let config = RunConfig::from_toml(
            "[backtest]\nstart = \"2024-01-01\"\nend = \"2024-06-30\"\n\n[optimize]\ntimeout_secs = 0.5\n",
        )
        .unwrap();
        let request = config.optimize_request(vec![]).unwrap();
        assert_eq!(request.timeout, Some(Duration::from_millis(500)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RunConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, RunConfigError::Io { .. }));
    }
}
