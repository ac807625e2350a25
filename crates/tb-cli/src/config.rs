//! Run configuration: command-line flags layered over an optional config file.

use anyhow::{Result, bail};
use clap::Args;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tb_core::{
    CalculatorType, Error, FitType, JobSeed, ModelRef, PointRange, TestSpec, TestStatistic,
};
use tb_inference::StoreMeta;

pub const DEFAULT_PREFIX: &str = "upper_limit";
pub const DEFAULT_WORKSPACE: &str = "ModelConfig";
pub const DEFAULT_POI: &str = "mu_SIG";
pub const DEFAULT_POINTS: [f64; 3] = [0.0, 40.0, 20.0];
pub const DEFAULT_NTOYS: usize = 3000;
pub const DEFAULT_NBATCH: usize = 100;
pub const DEFAULT_CHANNEL: &str = "DR-WHO";
pub const DEFAULT_CL: f64 = 0.95;

/// One step of a `run` invocation. Steps always execute in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Operation {
    Invert,
    Test,
    Dump,
    Output,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Invert => "invert",
            Operation::Test => "test",
            Operation::Dump => "dump",
            Operation::Output => "output",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "invert" => Ok(Operation::Invert),
            "test" => Ok(Operation::Test),
            "dump" => Ok(Operation::Dump),
            "output" => Ok(Operation::Output),
            other => Err(format!(
                "unknown operation '{}'; expected invert, test, dump or output",
                other
            )),
        }
    }
}

/// Flags of `toybail run`.
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Operations: invert, test, dump, output
    #[arg(required = true, num_args = 1..)]
    pub operations: Vec<Operation>,

    /// Run config file (YAML, or JSON by extension). Flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Workspace file (counting-model JSON)
    #[arg(long)]
    pub filename: Option<PathBuf>,

    /// Model name inside the workspace
    #[arg(long)]
    pub workspace: Option<String>,

    /// Parameter of interest
    #[arg(long)]
    pub poi: Option<String>,

    /// Scan range: START STOP COUNT (inclusive linear spacing)
    #[arg(long, num_args = 3, value_names = ["START", "STOP", "COUNT"], allow_negative_numbers = true)]
    pub points: Option<Vec<f64>>,

    /// Toys per point and hypothesis
    #[arg(long)]
    pub ntoys: Option<usize>,

    /// Toys per worker process
    #[arg(long)]
    pub nbatch: Option<usize>,

    /// Job seed in [0, 65536); required for toy calculators
    #[arg(long)]
    pub seed: Option<u32>,

    /// Concurrent worker processes (0 = auto)
    #[arg(long)]
    pub processes: Option<usize>,

    /// frequentist, hybrid, asymptotic or asimov
    #[arg(long)]
    pub calculator: Option<CalculatorType>,

    /// simple_likelihood_ratio, profile_likelihood_ratio, profile_likelihood,
    /// profile_likelihood_one_sided or max_likelihood
    #[arg(long)]
    pub statistic: Option<TestStatistic>,

    /// Confidence level in (0, 1)
    #[arg(long)]
    pub cl: Option<f64>,

    /// Use CLs (true) or CLs+b (false)
    #[arg(long, value_name = "BOOL")]
    pub use_cls: Option<bool>,

    /// Result bundles to merge with this run's results
    #[arg(long, num_args = 1..)]
    pub load: Vec<PathBuf>,

    /// Output file prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Channel label used in report file names
    #[arg(long)]
    pub channel: Option<String>,

    /// Integrated luminosity; adds visible cross-section limits to the report
    #[arg(long)]
    pub lumi: Option<f64>,

    /// Kill a worker process after this many seconds
    #[arg(long)]
    pub unit_timeout_secs: Option<f64>,

    /// Stop dispatching new units after this many seconds
    #[arg(long)]
    pub deadline_secs: Option<f64>,

    /// Generate toys in this process instead of worker processes
    #[arg(long)]
    pub in_process: bool,
}

/// Config-file view of [`RunArgs`]; every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub filename: Option<PathBuf>,
    pub workspace: Option<String>,
    pub poi: Option<String>,
    pub points: Option<Vec<f64>>,
    pub ntoys: Option<usize>,
    pub nbatch: Option<usize>,
    pub seed: Option<u32>,
    pub processes: Option<usize>,
    pub calculator: Option<CalculatorType>,
    pub statistic: Option<TestStatistic>,
    pub cl: Option<f64>,
    pub use_cls: Option<bool>,
    pub load: Option<Vec<PathBuf>>,
    pub prefix: Option<String>,
    pub channel: Option<String>,
    pub lumi: Option<f64>,
    pub unit_timeout_secs: Option<f64>,
    pub deadline_secs: Option<f64>,
    pub in_process: Option<bool>,
}

impl RunConfig {
    /// Values set here win; unset ones come from `fallback`.
    fn or(self, fallback: RunConfig) -> RunConfig {
        RunConfig {
            filename: self.filename.or(fallback.filename),
            workspace: self.workspace.or(fallback.workspace),
            poi: self.poi.or(fallback.poi),
            points: self.points.or(fallback.points),
            ntoys: self.ntoys.or(fallback.ntoys),
            nbatch: self.nbatch.or(fallback.nbatch),
            seed: self.seed.or(fallback.seed),
            processes: self.processes.or(fallback.processes),
            calculator: self.calculator.or(fallback.calculator),
            statistic: self.statistic.or(fallback.statistic),
            cl: self.cl.or(fallback.cl),
            use_cls: self.use_cls.or(fallback.use_cls),
            load: self.load.or(fallback.load),
            prefix: self.prefix.or(fallback.prefix),
            channel: self.channel.or(fallback.channel),
            lumi: self.lumi.or(fallback.lumi),
            unit_timeout_secs: self.unit_timeout_secs.or(fallback.unit_timeout_secs),
            deadline_secs: self.deadline_secs.or(fallback.deadline_secs),
            in_process: self.in_process.or(fallback.in_process),
        }
    }
}

impl From<&RunArgs> for RunConfig {
    fn from(args: &RunArgs) -> Self {
        RunConfig {
            filename: args.filename.clone(),
            workspace: args.workspace.clone(),
            poi: args.poi.clone(),
            points: args.points.clone(),
            ntoys: args.ntoys,
            nbatch: args.nbatch,
            seed: args.seed,
            processes: args.processes,
            calculator: args.calculator,
            statistic: args.statistic,
            cl: args.cl,
            use_cls: args.use_cls,
            load: (!args.load.is_empty()).then(|| args.load.clone()),
            prefix: args.prefix.clone(),
            channel: args.channel.clone(),
            lumi: args.lumi,
            unit_timeout_secs: args.unit_timeout_secs,
            deadline_secs: args.deadline_secs,
            in_process: args.in_process.then_some(true),
        }
    }
}

pub fn read_run_config(path: &Path) -> Result<RunConfig> {
    let bytes = std::fs::read(path).map_err(|e| {
        Error::Io(std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))
    })?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let cfg: std::result::Result<RunConfig, String> = if ext == "json" {
        serde_json::from_slice(&bytes).map_err(|e| e.to_string())
    } else {
        // Default: YAML (serde_yaml_ng).
        serde_yaml_ng::from_slice(&bytes).map_err(|e| e.to_string())
    };
    match cfg {
        Ok(cfg) => Ok(cfg),
        Err(e) => bail!(Error::Validation(format!("invalid run config {}: {}", path.display(), e))),
    }
}

/// Fully resolved settings of one `run` invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub operations: Vec<Operation>,
    pub filename: Option<PathBuf>,
    pub workspace: String,
    pub poi: String,
    pub range: PointRange,
    pub n_toys: usize,
    pub n_batch: usize,
    pub seed: Option<JobSeed>,
    pub processes: usize,
    pub calculator: CalculatorType,
    pub statistic: TestStatistic,
    pub confidence_level: f64,
    pub use_cls: bool,
    pub load: Vec<PathBuf>,
    pub prefix: String,
    pub channel: String,
    pub lumi: Option<f64>,
    pub unit_timeout: Option<Duration>,
    pub deadline: Option<Duration>,
    pub in_process: bool,
}

fn positive_secs(name: &str, value: Option<f64>) -> Result<Option<Duration>> {
    match value {
        None => Ok(None),
        Some(v) if v.is_finite() && v > 0.0 => match Duration::try_from_secs_f64(v) {
            Ok(d) => Ok(Some(d)),
            Err(e) => bail!(Error::Validation(format!("{} of {} seconds: {}", name, v, e))),
        },
        Some(v) => bail!(Error::Validation(format!("{} must be finite and > 0, got {}", name, v))),
    }
}

fn scan_range(points: &[f64]) -> Result<PointRange> {
    let [start, stop, count] = points else {
        bail!(Error::Validation(format!(
            "points needs START STOP COUNT, got {} values",
            points.len()
        )));
    };
    if !(count.is_finite() && count.fract() == 0.0 && *count >= 1.0) {
        bail!(Error::Validation(format!("points COUNT must be a positive integer, got {}", count)));
    }
    Ok(PointRange::new(*start, *stop, *count as usize)?)
}

impl Settings {
    /// Layer `args` over the config file it names (if any), then defaults.
    pub fn resolve(args: &RunArgs) -> Result<Settings> {
        let file = match &args.config {
            Some(path) => read_run_config(path)?,
            None => RunConfig::default(),
        };
        Self::from_layers(&args.operations, RunConfig::from(args).or(file))
    }

    pub fn from_layers(operations: &[Operation], cfg: RunConfig) -> Result<Settings> {
        let mut operations = operations.to_vec();
        operations.sort();
        operations.dedup();
        if operations.is_empty() {
            bail!(Error::Validation("no operation given".to_string()));
        }

        let points = cfg.points.unwrap_or_else(|| DEFAULT_POINTS.to_vec());
        let seed = cfg.seed.map(JobSeed::new).transpose()?;
        let settings = Settings {
            operations,
            filename: cfg.filename,
            workspace: cfg.workspace.unwrap_or_else(|| DEFAULT_WORKSPACE.to_string()),
            poi: cfg.poi.unwrap_or_else(|| DEFAULT_POI.to_string()),
            range: scan_range(&points)?,
            n_toys: cfg.ntoys.unwrap_or(DEFAULT_NTOYS),
            n_batch: cfg.nbatch.unwrap_or(DEFAULT_NBATCH),
            seed,
            processes: cfg.processes.unwrap_or(1),
            calculator: cfg.calculator.unwrap_or(CalculatorType::Frequentist),
            statistic: cfg.statistic.unwrap_or(TestStatistic::ProfileLikelihoodOneSided),
            confidence_level: cfg.cl.unwrap_or(DEFAULT_CL),
            use_cls: cfg.use_cls.unwrap_or(true),
            load: cfg.load.unwrap_or_default(),
            prefix: cfg.prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            channel: cfg.channel.unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
            lumi: cfg.lumi,
            unit_timeout: positive_secs("unit_timeout_secs", cfg.unit_timeout_secs)?,
            deadline: positive_secs("deadline_secs", cfg.deadline_secs)?,
            in_process: cfg.in_process.unwrap_or(false),
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            bail!(Error::Validation(format!(
                "cl must be in (0, 1), got {}",
                self.confidence_level
            )));
        }
        if self.n_batch == 0 {
            bail!(Error::Validation("nbatch must be > 0".to_string()));
        }
        if let Some(lumi) = self.lumi
            && !(lumi.is_finite() && lumi > 0.0)
        {
            bail!(Error::Validation(format!("lumi must be finite and > 0, got {}", lumi)));
        }
        if self.prefix.is_empty() || self.channel.is_empty() {
            bail!(Error::Validation("prefix and channel must not be empty".to_string()));
        }

        if self.needs_model() {
            if self.filename.is_none() {
                bail!(Error::Validation("invert and test need a workspace --filename".to_string()));
            }
            if self.calculator.uses_toys() {
                if self.n_toys == 0 {
                    bail!(Error::Validation("ntoys must be > 0".to_string()));
                }
                if self.seed.is_none() {
                    bail!(Error::Validation(format!(
                        "--seed is required for the {} calculator",
                        self.calculator
                    )));
                }
            }
            for op in [Operation::Invert, Operation::Test] {
                if self.runs(op) {
                    self.spec(op_fit_type(op))?;
                }
            }
        } else if self.load.is_empty() {
            bail!(Error::Validation(format!(
                "nothing to {}: run invert/test or pass --load",
                self.operations.iter().map(|o| o.as_str()).collect::<Vec<_>>().join("/")
            )));
        }
        Ok(())
    }

    pub fn runs(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }

    pub fn needs_model(&self) -> bool {
        self.runs(Operation::Invert) || self.runs(Operation::Test)
    }

    pub fn model_ref(&self) -> Result<ModelRef> {
        let Some(path) = &self.filename else {
            bail!(Error::Validation("no workspace --filename given".to_string()));
        };
        Ok(ModelRef { path: path.clone(), model: self.workspace.clone(), poi: self.poi.clone() })
    }

    pub fn spec(&self, fit_type: FitType) -> Result<TestSpec> {
        Ok(TestSpec::new(self.calculator, self.statistic, fit_type)?)
    }

    pub fn meta(&self, fit_type: FitType, model_digest: &str) -> Result<StoreMeta> {
        let spec = self.spec(fit_type)?;
        Ok(StoreMeta {
            poi: self.poi.clone(),
            model: self.workspace.clone(),
            model_digest: model_digest.to_string(),
            calculator: spec.calculator,
            statistic: spec.statistic,
            fit_type,
            confidence_level: self.confidence_level,
            use_cls: self.use_cls,
        })
    }

    pub fn dump_path(&self) -> PathBuf {
        PathBuf::from(format!("{}_dump.json", self.prefix))
    }

    pub fn report_path(&self, ext: &str) -> PathBuf {
        PathBuf::from(format!("{}_limit_{}.{}", self.prefix, self.channel, ext))
    }
}

pub fn op_fit_type(op: Operation) -> FitType {
    match op {
        Operation::Test => FitType::Discovery,
        _ => FitType::Exclusion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn base() -> RunConfig {
        RunConfig { filename: Some("ws.json".into()), seed: Some(1), ..RunConfig::default() }
    }

    fn validation_message(r: Result<Settings>) -> String {
        let err = r.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Validation(_))), "{err}");
        err.to_string()
    }

    #[test]
    fn test_defaults() {
        let s = Settings::from_layers(&[Operation::Invert], base()).unwrap();
        assert_eq!(s.workspace, DEFAULT_WORKSPACE);
        assert_eq!(s.poi, DEFAULT_POI);
        assert_eq!(s.range.points().len(), 20);
        assert_eq!(s.n_toys, 3000);
        assert_eq!(s.n_batch, 100);
        assert_eq!(s.processes, 1);
        assert_eq!(s.calculator, CalculatorType::Frequentist);
        assert!(s.use_cls);
        assert_eq!(s.dump_path(), PathBuf::from("upper_limit_dump.json"));
        assert_eq!(s.report_path("csv"), PathBuf::from("upper_limit_limit_DR-WHO.csv"));
    }

    #[test]
    fn test_operations_sorted_and_deduplicated() {
        let ops = [Operation::Output, Operation::Invert, Operation::Test, Operation::Invert];
        let s = Settings::from_layers(&ops, base()).unwrap();
        assert_eq!(s.operations, vec![Operation::Invert, Operation::Test, Operation::Output]);
    }

    #[test]
    fn test_flags_override_file() {
        let file = RunConfig { ntoys: Some(10), nbatch: Some(5), cl: Some(0.9), ..base() };
        let cli = RunConfig { ntoys: Some(20), ..RunConfig::default() };
        let s = Settings::from_layers(&[Operation::Invert], cli.or(file)).unwrap();
        assert_eq!(s.n_toys, 20);
        assert_eq!(s.n_batch, 5);
        assert_eq!(s.confidence_level, 0.9);
    }

    #[test]
    fn test_rejects_bad_values() {
        let ops = [Operation::Invert];
        let msg = validation_message(Settings::from_layers(&ops, RunConfig { cl: Some(1.0), ..base() }));
        assert!(msg.contains("cl must be"));
        let msg = validation_message(Settings::from_layers(&ops, RunConfig { nbatch: Some(0), ..base() }));
        assert!(msg.contains("nbatch"));
        let msg = validation_message(Settings::from_layers(
            &ops,
            RunConfig { points: Some(vec![0.0, 1.0, 2.5]), ..base() },
        ));
        assert!(msg.contains("COUNT"));
        let msg =
            validation_message(Settings::from_layers(&ops, RunConfig { seed: Some(70000), ..base() }));
        assert!(msg.contains("seed"));
        let msg = validation_message(Settings::from_layers(&ops, RunConfig { seed: None, ..base() }));
        assert!(msg.contains("--seed is required"));
    }

    #[test]
    fn test_rejects_unrepresentable_durations() {
        let ops = [Operation::Invert];
        let msg = validation_message(Settings::from_layers(
            &ops,
            RunConfig { deadline_secs: Some(1e300), ..base() },
        ));
        assert!(msg.contains("deadline_secs"), "{msg}");
        let msg = validation_message(Settings::from_layers(
            &ops,
            RunConfig { deadline_secs: Some(-2.0), ..base() },
        ));
        assert!(msg.contains("> 0"), "{msg}");
        let s = Settings::from_layers(&ops, RunConfig { deadline_secs: Some(0.25), ..base() }).unwrap();
        assert_eq!(s.deadline, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_asymptotic_needs_no_seed_but_checks_statistic() {
        let cfg = RunConfig {
            seed: None,
            calculator: Some(CalculatorType::Asymptotic),
            ..base()
        };
        assert!(Settings::from_layers(&[Operation::Invert, Operation::Test], cfg.clone()).is_ok());
        let bad = RunConfig { statistic: Some(TestStatistic::MaxLikelihood), ..cfg };
        assert!(Settings::from_layers(&[Operation::Invert], bad).is_err());
    }

    #[test]
    fn test_dump_without_work_or_inputs_rejected() {
        let msg = validation_message(Settings::from_layers(&[Operation::Dump], RunConfig::default()));
        assert!(msg.contains("nothing to dump"));
        let cfg = RunConfig { load: Some(vec!["a.json".into()]), ..RunConfig::default() };
        assert!(Settings::from_layers(&[Operation::Dump], cfg).is_ok());
    }

    #[test]
    fn test_read_yaml_and_json_configs() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("run.yaml");
        let mut f = std::fs::File::create(&yaml).unwrap();
        writeln!(f, "filename: ws.json\npoints: [0, 30, 6]\ncalculator: hybrid\nseed: 4").unwrap();
        let cfg = read_run_config(&yaml).unwrap();
        assert_eq!(cfg.calculator, Some(CalculatorType::Hybrid));
        let s = Settings::from_layers(&[Operation::Invert], cfg).unwrap();
        assert_eq!(s.range.points(), vec![0.0, 6.0, 12.0, 18.0, 24.0, 30.0]);

        let json = dir.path().join("run.json");
        std::fs::write(&json, r#"{"ntoys": 50, "use_cls": false}"#).unwrap();
        let cfg = read_run_config(&json).unwrap();
        assert_eq!(cfg.ntoys, Some(50));
        assert_eq!(cfg.use_cls, Some(false));

        std::fs::write(&json, r#"{"n_toys": 50}"#).unwrap();
        assert!(read_run_config(&json).is_err());
    }
}
