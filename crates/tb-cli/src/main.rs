//! toybail CLI

mod config;
mod exit_codes;
mod output;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use config::{Operation, RunArgs, Settings};
use exit_codes::ExitCode;
use tb_core::{Error, FitType};
use tb_inference::{
    CancelToken, DISCOVERY_POINT, DiscoveryTester, InProcessExecutor, InversionScanner, JobStatus,
    LimitReport, ProcessExecutor, ProcessPool, ReportOptions, ResultBundle, ResultStore, RunOutcome,
    ScanConfig, UnitExecutor,
};
use tb_model::CountingGenerator;

#[derive(Parser)]
#[command(name = "toybail")]
#[command(about = "toybail - toy-based upper limits and discovery tests")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one or more operations: invert, test, dump, output
    Run(RunArgs),

    /// Execute one unit of toy work (JSON request on stdin, batch on stdout)
    #[command(hide = true)]
    Worker,

    /// Print version
    Version,
}

fn main() {
    let cli = Cli::parse();

    // stdout is the worker's result channel, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let code = match cli.command {
        Commands::Run(args) => cmd_run(&args),
        Commands::Worker => cmd_worker().map(|()| ExitCode::Clean),
        Commands::Version => {
            println!("toybail {}", tb_core::VERSION);
            Ok(ExitCode::Clean)
        }
    }
    .unwrap_or_else(|err| {
        let code = ExitCode::from_error(&err);
        tracing::error!(code = %code, "{:#}", err);
        code
    });
    std::process::exit(code.as_i32());
}

fn cmd_worker() -> Result<()> {
    let stdin = std::io::stdin().lock();
    let stdout = std::io::stdout().lock();
    tb_inference::serve_worker(stdin, stdout, CountingGenerator::from_model_ref)?;
    Ok(())
}

fn make_executor(
    settings: &Settings,
    generator: &CountingGenerator,
    fit_type: FitType,
) -> Result<Box<dyn UnitExecutor>> {
    let spec = settings.spec(fit_type)?;
    if settings.in_process {
        return Ok(Box::new(InProcessExecutor::new(generator.clone(), spec)));
    }
    let program = std::env::current_exe().context("cannot locate the toybail executable")?;
    let mut args = Vec::new();
    if tracing::enabled!(tracing::Level::DEBUG) {
        args.extend(["--log-level".to_string(), "debug".to_string()]);
    }
    args.push("worker".to_string());
    Ok(Box::new(
        ProcessExecutor::new(program, args, settings.model_ref()?, spec)
            .with_timeout(settings.unit_timeout),
    ))
}

fn log_outcome(op: Operation, outcome: &RunOutcome) {
    let s = &outcome.summary;
    tracing::info!(
        operation = %op,
        points = outcome.store.records.len(),
        units_completed = s.completed,
        units_failed = s.failed,
        units_skipped = s.skipped,
        status = ?outcome.status,
        "operation finished"
    );
    for record in &outcome.store.records {
        if record.missing() > 0 {
            tracing::warn!(
                operation = %op,
                poi = record.point,
                missing = record.missing(),
                requested = record.requested,
                "toys missing at point"
            );
        }
    }
}

/// Run `invert` / `test` and bundle their stores.
fn run_new_work(settings: &Settings, cancel: &CancelToken) -> Result<Option<ResultBundle>> {
    if !settings.needs_model() {
        return Ok(None);
    }
    let model_ref = settings.model_ref()?;
    let generator = CountingGenerator::from_model_ref(&model_ref)?;
    let digest = generator.digest().unwrap_or_default().to_string();
    let pool = ProcessPool::new(settings.processes);
    if settings.processes != 0 && pool.workers() < settings.processes {
        tracing::warn!(requested = settings.processes, workers = pool.workers(), "worker count capped");
    }

    let mut inversion: Option<ResultStore> = None;
    let mut discovery: Option<ResultStore> = None;

    if settings.runs(Operation::Invert) {
        let executor = make_executor(settings, &generator, FitType::Exclusion)?;
        let scanner = InversionScanner::new(&generator, executor.as_ref(), &pool, cancel);
        let config = ScanConfig {
            range: settings.range,
            n_toys: settings.n_toys,
            n_batch: settings.n_batch,
        };
        let outcome = scanner
            .run(settings.meta(FitType::Exclusion, &digest)?, &config, settings.seed)
            .context("invert")?;
        log_outcome(Operation::Invert, &outcome);
        inversion = Some(outcome.store);
    }

    if settings.runs(Operation::Test) {
        let executor = make_executor(settings, &generator, FitType::Discovery)?;
        let tester = DiscoveryTester::new(&generator, executor.as_ref(), &pool, cancel);
        let outcome = tester
            .run(
                settings.meta(FitType::Discovery, &digest)?,
                settings.n_toys,
                settings.n_batch,
                settings.seed,
            )
            .context("test")?;
        log_outcome(Operation::Test, &outcome);
        discovery = Some(outcome.store);
    }

    Ok(Some(ResultBundle::new(settings.seed, &run_source(settings), inversion, discovery)))
}

fn load_bundles(settings: &Settings) -> Result<Vec<ResultBundle>> {
    let mut bundles = Vec::with_capacity(settings.load.len());
    for path in &settings.load {
        let mut bundle = ResultBundle::load(path)?;
        // Attribute every seed of a loaded file to that file in collision messages.
        let name = path.display().to_string();
        for names in bundle.sources.values_mut() {
            if !names.contains(&name) {
                names.push(name.clone());
            }
        }
        tracing::info!(file = %name, seeds = bundle.sources.len(), "loaded results");
        bundles.push(bundle);
    }
    Ok(bundles)
}

/// Reject a job seed the loaded results already hold, before any toys are thrown.
fn check_seed_free(settings: &Settings, loaded: &ResultBundle) -> Result<()> {
    let Some(seed) = settings.seed else {
        return Ok(());
    };
    if !settings.needs_model() || !settings.calculator.uses_toys() {
        return Ok(());
    }
    let inversion =
        if settings.runs(Operation::Invert) { settings.range.points() } else { Vec::new() };
    let discovery = if settings.runs(Operation::Test) { vec![DISCOVERY_POINT] } else { Vec::new() };
    loaded.check_seed_free(seed, &run_source(settings), &inversion, &discovery)?;
    Ok(())
}

fn run_source(settings: &Settings) -> String {
    format!("run with prefix '{}'", settings.prefix)
}

fn write_report(settings: &Settings, bundle: &ResultBundle) -> Result<()> {
    let (Some(inversion), Some(discovery)) = (&bundle.inversion, &bundle.discovery) else {
        bail!(Error::Validation(
            "output needs both an inversion (invert) and a discovery (test) result".to_string()
        ));
    };
    let options = ReportOptions {
        confidence_level: settings.confidence_level,
        use_cls: settings.use_cls,
        luminosity: settings.lumi,
    };
    let report = LimitReport::build(&settings.channel, inversion, discovery, options)?;

    let json_path = settings.report_path("json");
    output::write_json(&json_path, &output::report_json(&report)?)?;
    let csv_path = settings.report_path("csv");
    output::write_curve_csv(&csv_path, &report)?;

    match report.observed.value() {
        Some(v) => tracing::info!(channel = %report.channel, limit = v, "observed upper limit"),
        None => tracing::warn!(channel = %report.channel, observed = ?report.observed, "no observed limit in range"),
    }
    tracing::info!(
        p0 = report.discovery.p0_capped,
        significance = report.discovery.significance,
        json = %json_path.display(),
        csv = %csv_path.display(),
        "report written"
    );
    Ok(())
}

fn cmd_run(args: &RunArgs) -> Result<ExitCode> {
    let settings = Settings::resolve(args)?;
    tracing::info!(
        operations = ?settings.operations,
        calculator = %settings.calculator,
        statistic = %settings.statistic,
        "starting run"
    );

    let cancel = match settings.deadline {
        Some(deadline) => CancelToken::with_deadline(deadline),
        None => CancelToken::new(),
    };

    // Validate inputs before spending time on toys.
    let loaded = ResultBundle::merge_all(load_bundles(&settings)?)?;
    if let Some(loaded) = &loaded {
        check_seed_free(&settings, loaded)?;
    }
    let fresh = run_new_work(&settings, &cancel)?;
    let merged = match (loaded, fresh) {
        (Some(loaded), Some(fresh)) => loaded.merge(&fresh)?,
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => bail!(Error::Validation("no results to process".to_string())),
    };

    if settings.runs(Operation::Dump) {
        let path = settings.dump_path();
        merged.save(&path)?;
        tracing::info!(file = %path.display(), "results dumped");
    }
    if settings.runs(Operation::Output) {
        write_report(&settings, &merged)?;
    }
    if !settings.runs(Operation::Dump) && !settings.runs(Operation::Output) {
        tracing::warn!("neither dump nor output requested; results are not saved");
    }

    if cancel.is_cancelled() {
        return Ok(ExitCode::Cancelled);
    }
    Ok(match merged.status() {
        JobStatus::Complete => ExitCode::Clean,
        JobStatus::Partial => ExitCode::PartialToys,
        JobStatus::Failed => ExitCode::FailedToys,
    })
}
