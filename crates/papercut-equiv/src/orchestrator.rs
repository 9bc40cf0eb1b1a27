//! Bounded, cancellable equivalence checking of a batch of mutants
//!
//! Each mutant moves through `Pending -> WrapperGenerated -> Invoked ->
//! Finished`. Preparation needs the (non-`Send`) syntax tree and happens on
//! the calling thread in [`EquivOrchestrator::prepare`]; verifier runs are
//! tokio tasks limited by a semaphore.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use papercut::{Concretized, DesignInterface, Mutant, VerificationResult};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::config::{EquivConfig, Markers, ScriptSource};
use crate::error::{EquivError, EquivResult, LaunchError};
use crate::runner::{classify, CommandVerifier, Invocation, RunOutcome, Verifier};
use crate::script::{render, ScriptContext};
use crate::wrapper::{generate_wrapper, rename_modules, MUTANT_SUFFIX};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Pending,
    WrapperGenerated,
    Invoked,
    Finished,
}

impl Stage {
    fn can_advance_to(self, next: Stage) -> bool {
        match (self, next) {
            (Stage::Finished, _) => false,
            (_, Stage::Finished) => true,
            (Stage::Pending, Stage::WrapperGenerated) => true,
            (Stage::WrapperGenerated, Stage::Invoked) => true,
            _ => false,
        }
    }
}

struct Progress<'a> {
    mutant_id: &'a str,
    stage: Stage,
}

impl<'a> Progress<'a> {
    fn new(mutant_id: &'a str) -> Self {
        Self {
            mutant_id,
            stage: Stage::Pending,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "mutant {}: illegal transition {:?} -> {:?}",
            self.mutant_id,
            self.stage,
            next
        );
        debug!(mutant = %self.mutant_id, from = ?self.stage, to = ?next, "stage");
        self.stage = next;
    }
}

/// Inputs shared by every mutant of one design.
#[derive(Debug)]
struct Shared {
    original: String,
    wrapper: String,
    top: String,
    mutant_top: String,
    wrapper_top: String,
}

/// One mutant ready to be checked.
#[derive(Debug)]
pub struct Job {
    mutant_id: String,
    mutant_text: Result<String, LaunchError>,
    shared: Arc<Shared>,
}

impl Job {
    pub fn mutant_id(&self) -> &str {
        &self.mutant_id
    }
}

struct Inner<V> {
    config: EquivConfig,
    markers: Markers,
    verifier: V,
    out_dir: PathBuf,
}

/// Runs the configured verifier over a batch of mutants.
pub struct EquivOrchestrator<V = CommandVerifier> {
    inner: Arc<Inner<V>>,
}

impl EquivOrchestrator<CommandVerifier> {
    pub fn new(config: EquivConfig, out_dir: impl Into<PathBuf>) -> EquivResult<Self> {
        Self::with_verifier(config, out_dir, CommandVerifier::new())
    }
}

impl<V: Verifier + 'static> EquivOrchestrator<V> {
    pub fn with_verifier(
        config: EquivConfig,
        out_dir: impl Into<PathBuf>,
        verifier: V,
    ) -> EquivResult<Self> {
        let markers = config.validate()?;
        let out_dir = absolute(out_dir.into())?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                markers,
                verifier,
                out_dir,
            }),
        })
    }

    pub fn config(&self) -> &EquivConfig {
        &self.inner.config
    }

    /// Private work directory of one mutant.
    pub fn work_dir(&self, mutant_id: &str) -> PathBuf {
        self.inner.out_dir.join("equiv").join(mutant_id)
    }

    pub fn log_path(&self, mutant_id: &str) -> PathBuf {
        self.inner.out_dir.join("logs").join(format!("{mutant_id}.log"))
    }

    /// Build the wrapper and rename each mutant's modules.
    ///
    /// A mutant that cannot be prepared still yields a job; it fails alone.
    pub fn prepare(&self, design: &Concretized, mutants: &[Mutant]) -> Vec<Job> {
        let iface = DesignInterface::of_top(design);
        let mutant_top = format!("{}{MUTANT_SUFFIX}", iface.module);
        let wrapper_top = format!("{}_wrapper", iface.module);
        let shared = Arc::new(Shared {
            original: design.source().to_string(),
            wrapper: generate_wrapper(&iface, &mutant_top, &wrapper_top),
            top: iface.module.clone(),
            mutant_top,
            wrapper_top,
        });
        mutants
            .iter()
            .map(|mutant| Job {
                mutant_id: mutant.id.clone(),
                mutant_text: rename_modules(&mutant.mutated_text, MUTANT_SUFFIX)
                    .map_err(LaunchError::from),
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Check every job, at most `max_concurrent` at a time.
    ///
    /// Returns one result per job, in job order. Cancelled and never-started
    /// jobs are `Error` results with detail `cancelled`.
    pub async fn run(&self, jobs: Vec<Job>, cancel: &CancellationToken) -> Vec<VerificationResult> {
        let semaphore = Arc::new(Semaphore::new(self.inner.config.max_concurrent));
        let order: Vec<String> = jobs.iter().map(|j| j.mutant_id.clone()).collect();
        info!(
            mutants = jobs.len(),
            max_concurrent = self.inner.config.max_concurrent,
            program = %self.inner.config.program,
            "starting equivalence checks"
        );

        let mut set = JoinSet::new();
        for job in jobs {
            let inner = Arc::clone(&self.inner);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            set.spawn(async move {
                inner.clear_stale(&job.mutant_id).await;
                let permit = tokio::select! {
                    permit = semaphore.acquire_owned() => permit.ok(),
                    () = cancel.cancelled() => None,
                };
                let Some(_permit) = permit.filter(|_| !cancel.is_cancelled()) else {
                    return VerificationResult::cancelled(job.mutant_id);
                };
                inner.check(job, &cancel).await
            });
        }

        let mut results: HashMap<String, VerificationResult> = HashMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => {
                    info!(mutant = %result.mutant_id, status = %result.status, "equivalence check finished");
                    results.insert(result.mutant_id.clone(), result);
                }
                Err(e) => warn!("verification task failed: {e}"),
            }
        }

        order
            .into_iter()
            .map(|id| {
                results.remove(&id).unwrap_or_else(|| {
                    VerificationResult::error(id, "verification task failed", Duration::ZERO)
                })
            })
            .collect()
    }

    /// Prepare and run in one call.
    pub async fn check_all(
        &self,
        design: &Concretized,
        mutants: &[Mutant],
        cancel: &CancellationToken,
    ) -> Vec<VerificationResult> {
        let jobs = self.prepare(design, mutants);
        self.run(jobs, cancel).await
    }
}

impl<V: Verifier> Inner<V> {
    async fn check(&self, job: Job, cancel: &CancellationToken) -> VerificationResult {
        let Job {
            mutant_id,
            mutant_text,
            shared,
        } = job;
        let start = Instant::now();
        let mut progress = Progress::new(&mutant_id);

        let invocation = match self.write_work_dir(&mutant_id, mutant_text, &shared).await {
            Ok(invocation) => invocation,
            Err(e) => {
                progress.advance(Stage::Finished);
                warn!(mutant = %mutant_id, "cannot prepare verifier run: {e}");
                let result = VerificationResult::error(&mutant_id, e.to_string(), start.elapsed());
                self.write_log(None, &result).await;
                return result;
            }
        };
        progress.advance(Stage::WrapperGenerated);

        progress.advance(Stage::Invoked);
        let outcome = self.verifier.run(&invocation, cancel).await;
        progress.advance(Stage::Finished);

        let result = match outcome {
            Ok(RunOutcome::Completed { output, duration }) => {
                let status = classify(&output, &self.markers);
                let mut result = VerificationResult::new(&mutant_id, status, output, duration);
                if !status.is_definitive() {
                    result.detail = Some("no pass or fail marker in verifier output".to_string());
                }
                result
            }
            Ok(RunOutcome::TimedOut { duration }) => {
                VerificationResult::timeout(&mutant_id, String::new(), duration)
            }
            Ok(RunOutcome::Cancelled) => {
                self.clear_stale(&mutant_id).await;
                return VerificationResult::cancelled(&mutant_id);
            }
            Err(e) => {
                warn!(mutant = %mutant_id, "verifier launch failed: {e}");
                VerificationResult::error(&mutant_id, e.to_string(), start.elapsed())
            }
        };
        self.write_log(Some(&invocation), &result).await;
        result
    }

    /// Write the original, the renamed mutant, the wrapper, and the rendered
    /// script into the mutant's work directory.
    async fn write_work_dir(
        &self,
        mutant_id: &str,
        mutant_text: Result<String, LaunchError>,
        shared: &Shared,
    ) -> Result<Invocation, LaunchError> {
        let mutant_text = mutant_text?;
        let work_dir = self.out_dir.join("equiv").join(mutant_id);
        create_dir(&work_dir).await?;

        let original = work_dir.join("original.sv");
        let mutant = work_dir.join("mutant.sv");
        let wrapper = work_dir.join(format!("{mutant_id}_wrapper.sv"));
        let script = work_dir.join(self.config.script_name.replace("{id}", mutant_id));
        let ctx = ScriptContext {
            id: mutant_id,
            work_dir: &work_dir,
            original: &original,
            mutant: &mutant,
            wrapper: &wrapper,
            script: &script,
            top: &shared.top,
            mutant_top: &shared.mutant_top,
            wrapper_top: &shared.wrapper_top,
            timeout_secs: self.config.timeout.as_secs(),
        };

        let template = match &self.config.script {
            ScriptSource::Inline(text) => text.clone(),
            ScriptSource::File(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|source| LaunchError::Template {
                    path: path.clone(),
                    source,
                })?,
        };

        write_file(&original, &shared.original).await?;
        write_file(&mutant, &mutant_text).await?;
        write_file(&wrapper, &shared.wrapper).await?;
        write_file(&script, &render(&template, &ctx)).await?;

        Ok(Invocation {
            mutant_id: mutant_id.to_string(),
            program: self.config.program.clone(),
            args: self.config.args.iter().map(|a| render(a, &ctx)).collect(),
            work_dir,
            timeout: self.config.timeout,
        })
    }

    /// Remove the log and work directory of `mutant_id`, so a cancelled or
    /// failed run never leaves an earlier run's artifacts behind.
    async fn clear_stale(&self, mutant_id: &str) {
        let log = self.out_dir.join("logs").join(format!("{mutant_id}.log"));
        if let Err(e) = tokio::fs::remove_file(&log).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(mutant = %mutant_id, path = %log.display(), "cannot remove stale log: {e}");
            }
        }
        let work_dir = self.out_dir.join("equiv").join(mutant_id);
        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(mutant = %mutant_id, path = %work_dir.display(), "cannot remove stale work directory: {e}");
            }
        }
    }

    async fn write_log(&self, invocation: Option<&Invocation>, result: &VerificationResult) {
        let logs = self.out_dir.join("logs");
        let path = logs.join(format!("{}.log", result.mutant_id));
        let mut text = format!("mutant: {}\n", result.mutant_id);
        if let Some(inv) = invocation {
            text.push_str(&format!("command: {} {}\n", inv.program, inv.args.join(" ")));
            text.push_str(&format!("work_dir: {}\n", inv.work_dir.display()));
        }
        text.push_str(&format!("status: {}\n", result.status));
        if let Some(detail) = &result.detail {
            text.push_str(&format!("detail: {detail}\n"));
        }
        text.push_str(&format!("duration: {:.3}s\n", result.duration.as_secs_f64()));
        text.push_str("---- verifier output ----\n");
        text.push_str(&result.raw_output);

        let written = match create_dir(&logs).await {
            Ok(()) => write_file(&path, &text).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(mutant = %result.mutant_id, "cannot write log: {e}");
        }
    }
}

async fn create_dir(path: &Path) -> Result<(), LaunchError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| LaunchError::Io {
            path: path.to_path_buf(),
            source,
        })
}

async fn write_file(path: &Path, contents: &str) -> Result<(), LaunchError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| LaunchError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn absolute(path: PathBuf) -> EquivResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().map_err(|source| EquivError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(cwd.join(path))
}
