//! papercut command-line interface
//!
//! Reads one SystemVerilog file, writes the concretized design and one file
//! per mutant into the output directory, optionally checks each mutant for
//! equivalence with an external verifier, and writes `summary.txt` and
//! `summary.json`.
//!
//! Exit codes: `0` success, `1` fatal error, `2` at least one mutant ended
//! in `ERROR` or `TIMEOUT`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use papercut::pipeline::{
    consolidate, consolidated_path, mux_predicates, muxed_path, prepare_output_dir,
    write_concretized, write_consolidated, write_muxed, write_mutants,
};
use papercut::{
    generate_mutants, load_design, Aggregator, MutationOptions, PapercutError, ParamOverride,
    Strategy, Summary, VerificationStatus,
};
use papercut_equiv::{CancellationToken, EquivConfig, EquivError, EquivOrchestrator, Profile};
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Narrow the semantics of an HDL design one papercut at a time
#[derive(Parser, Debug)]
#[command(name = "papercut")]
#[command(about = "Generate semantics-narrowing mutants of a SystemVerilog design")]
#[command(version)]
struct Cli {
    /// SystemVerilog source file
    input: PathBuf,

    /// Shrink declared bit widths to the widest constant they hold
    #[arg(short = 's', long)]
    shrink_bits: bool,

    /// Delete one case branch per mutant
    #[arg(short = 'c', long)]
    delete_case_branch: bool,

    /// Replace each if statement with its then or else branch
    #[arg(short = 'i', long)]
    remove_if_conditionals: bool,

    /// Replace each ternary with its true or false arm
    #[arg(short = 't', long)]
    remove_ternary_conditionals: bool,

    /// Enable every strategy
    #[arg(short = 'a', long)]
    all: bool,

    /// Check each mutant against the original with a formal verifier
    #[arg(short = 'e', long)]
    check_equivalence: bool,

    /// Output directory
    #[arg(short = 'o', long, default_value = "outputs", env = "PAPERCUT_OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Override a top-level parameter
    #[arg(short = 'P', long = "param", value_name = "NAME=VALUE")]
    params: Vec<ParamOverride>,

    /// Top module (default: first module in the file)
    #[arg(long)]
    top: Option<String>,

    /// Emit one combined mutant per strategy instead of one per site
    #[arg(long)]
    combined: bool,

    /// Verifier config (JSON)
    #[arg(long, env = "PAPERCUT_EQUIV_CONFIG", conflicts_with = "profile")]
    config: Option<PathBuf>,

    /// Verifier profile: jasper, symbiyosys, or custom
    #[arg(long)]
    profile: Option<Profile>,

    /// Per-mutant verifier timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Maximum concurrent verifier runs
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn strategies(&self) -> Vec<Strategy> {
        if self.all {
            return Strategy::ALL.to_vec();
        }
        [
            (self.shrink_bits, Strategy::ShrinkBits),
            (self.delete_case_branch, Strategy::CaseBranch),
            (self.remove_if_conditionals, Strategy::IfRemoval),
            (self.remove_ternary_conditionals, Strategy::Ternary),
        ]
        .into_iter()
        .filter_map(|(on, strategy)| on.then_some(strategy))
        .collect()
    }

    fn equiv_config(&self) -> Result<EquivConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => EquivConfig::from_file(path)?,
            None => EquivConfig::for_profile(self.profile.unwrap_or_default()),
        };
        if let Some(secs) = self.timeout {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(jobs) = self.jobs {
            config = config.with_max_concurrent(jobs);
        }
        Ok(config)
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("no mutation strategy selected (use -s, -c, -i, -t, or -a)")]
    NoStrategy,

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Design(#[from] PapercutError),

    #[error(transparent)]
    Equiv(#[from] EquivError),
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli).await {
        Ok(summary) => {
            print!("{}", summary.render_text());
            if summary.has_errors() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("{e}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: &Cli) -> Result<Summary, CliError> {
    let strategies = cli.strategies();
    if strategies.is_empty() {
        return Err(CliError::NoStrategy);
    }

    let source = std::fs::read_to_string(&cli.input).map_err(|source| CliError::Read {
        path: cli.input.clone(),
        source,
    })?;
    let design = load_design(&source, cli.top.as_deref(), &cli.params)?;
    info!(top = %design.top_name(), input = %cli.input.display(), "design loaded");

    let out = cli.output_dir.as_path();
    prepare_output_dir(out)?;
    write_concretized(&design, out)?;
    match mux_predicates(&design, &strategies)? {
        Some(muxed) => {
            let path = write_muxed(&design, &muxed, out)?;
            info!(path = %path.display(), selects = muxed.selects, "wrote muxed design");
        }
        None => remove_stale(&muxed_path(&design, out))?,
    }

    let options = MutationOptions::default()
        .with_strategies(strategies)
        .with_combined(cli.combined)
        .with_source_id(source_id(&cli.input));
    let generated = generate_mutants(&design, &options)?;
    write_mutants(&generated.mutants, out)?;
    info!(
        mutants = generated.mutants.len(),
        skipped = generated.skips.len(),
        "mutants written"
    );

    let mut aggregator = Aggregator::new();
    for mutant in &generated.mutants {
        aggregator.record_mutant(mutant);
    }
    aggregator.record_skips(generated.skips.iter().cloned());

    if cli.check_equivalence && !generated.mutants.is_empty() {
        let orchestrator = EquivOrchestrator::new(cli.equiv_config()?, out)?;
        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, cancelling outstanding checks");
                    cancel.cancel();
                }
            })
        };

        let results = orchestrator
            .check_all(&design, &generated.mutants, &cancel)
            .await;
        interrupt.abort();

        for result in &results {
            aggregator.record_result(result);
        }

        let passing = generated
            .mutants
            .iter()
            .zip(&results)
            .filter(|(_, r)| r.status == VerificationStatus::Pass)
            .map(|(m, _)| m);
        match consolidate(design.source(), passing)? {
            Some(text) => {
                let path = write_consolidated(&design, &text, out)?;
                info!(path = %path.display(), "wrote consolidated design");
            }
            None => remove_stale(&consolidated_path(&design, out))?,
        }
    }

    let summary = aggregator.summary();
    summary.write(out)?;
    Ok(summary)
}

/// Remove a file left by an earlier run into the same directory.
fn remove_stale(path: &Path) -> Result<(), CliError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "removed stale output");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PapercutError::io(path, e).into()),
    }
}

fn source_id(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "design".to_string())
}
