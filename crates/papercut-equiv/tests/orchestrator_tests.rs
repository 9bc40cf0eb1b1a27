//! Orchestrator tests: real subprocesses through `sh`, plus a scripted
//! verifier for the concurrency and cancellation paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use papercut::{
    generate_mutants, load_design, Concretized, Mutant, MutationOptions, Strategy,
    VerificationStatus,
};
use papercut_equiv::{
    CancellationToken, EquivConfig, EquivOrchestrator, Invocation, LaunchError, Profile,
    RunOutcome, ScriptSource, Verifier,
};

const DESIGN: &str = "module top (input s, input [3:0] a, b, output [3:0] y, z);
  assign y = s ? a : b;
  assign z = s ? b : a;
endmodule
";

fn design_and_mutants() -> (Concretized, Vec<Mutant>) {
    let design = load_design(DESIGN, None, &[]).expect("load");
    let options = MutationOptions::default().with_strategies([Strategy::Ternary]);
    let mutants = generate_mutants(&design, &options).expect("generate").mutants;
    assert_eq!(mutants.len(), 4);
    (design, mutants)
}

fn sh_config(script: &str) -> EquivConfig {
    EquivConfig::for_profile(Profile::Custom)
        .with_program("sh")
        .with_args(["-c", script])
        .with_timeout(Duration::from_secs(20))
}

#[tokio::test]
async fn test_pass_marker_and_work_directory() {
    let out = tempfile::tempdir().expect("tempdir");
    let (design, mutants) = design_and_mutants();
    let orchestrator =
        EquivOrchestrator::new(sh_config("echo PAPERCUT_EQUIV: PASS"), out.path()).expect("config");

    let results = orchestrator
        .check_all(&design, &mutants, &CancellationToken::new())
        .await;
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.status == VerificationStatus::Pass));
    for (result, mutant) in results.iter().zip(&mutants) {
        assert_eq!(result.mutant_id, mutant.id);
    }

    let id = &mutants[0].id;
    let work = orchestrator.work_dir(id);
    let original = std::fs::read_to_string(work.join("original.sv")).expect("original");
    assert_eq!(original, DESIGN);
    let mutant = std::fs::read_to_string(work.join("mutant.sv")).expect("mutant");
    assert!(mutant.starts_with("module top_mutant ("));
    let wrapper = std::fs::read_to_string(work.join(format!("{id}_wrapper.sv"))).expect("wrapper");
    assert!(wrapper.contains("top_mutant mutant ("));
    assert!(wrapper.contains("assert(equiv);"));
    let script = std::fs::read_to_string(work.join(format!("{id}.tcl"))).expect("script");
    assert!(script.contains("elaborate -top top_wrapper"));

    let log = std::fs::read_to_string(orchestrator.log_path(id)).expect("log");
    assert!(log.contains("status: PASS"));
    assert!(log.contains("PAPERCUT_EQUIV: PASS"));
}

#[tokio::test]
async fn test_fail_marker_wins_and_unknown_output_is_error() {
    let out = tempfile::tempdir().expect("tempdir");
    let (design, mutants) = design_and_mutants();

    let both = "echo PAPERCUT_EQUIV: PASS; echo PAPERCUT_EQUIV: FAIL";
    let orchestrator = EquivOrchestrator::new(sh_config(both), out.path()).expect("config");
    let results = orchestrator
        .check_all(&design, &mutants[..1], &CancellationToken::new())
        .await;
    assert_eq!(results[0].status, VerificationStatus::Fail);

    let orchestrator =
        EquivOrchestrator::new(sh_config("echo licence error; exit 0"), out.path()).expect("config");
    let results = orchestrator
        .check_all(&design, &mutants[..1], &CancellationToken::new())
        .await;
    assert_eq!(results[0].status, VerificationStatus::Error);
}

#[tokio::test]
async fn test_timeout_is_reported() {
    let out = tempfile::tempdir().expect("tempdir");
    let (design, mutants) = design_and_mutants();
    let config = sh_config("sleep 30").with_timeout(Duration::from_millis(300));
    let orchestrator = EquivOrchestrator::new(config, out.path()).expect("config");
    let results = orchestrator
        .check_all(&design, &mutants[..2], &CancellationToken::new())
        .await;
    assert!(results
        .iter()
        .all(|r| r.status == VerificationStatus::Timeout));
}

#[tokio::test]
async fn test_missing_program_fails_each_mutant_alone() {
    let out = tempfile::tempdir().expect("tempdir");
    let (design, mutants) = design_and_mutants();
    let config = sh_config("").with_program("papercut-missing-verifier");
    let orchestrator = EquivOrchestrator::new(config, out.path()).expect("config");
    let results = orchestrator
        .check_all(&design, &mutants, &CancellationToken::new())
        .await;
    assert_eq!(results.len(), 4);
    for result in &results {
        assert_eq!(result.status, VerificationStatus::Error);
        assert!(result
            .detail
            .as_deref()
            .is_some_and(|d| d.contains("not found")));
    }
}

#[tokio::test]
async fn test_unreadable_template_is_a_per_mutant_error() {
    let out = tempfile::tempdir().expect("tempdir");
    let (design, mutants) = design_and_mutants();
    let config = sh_config("echo PAPERCUT_EQUIV: PASS")
        .with_script(ScriptSource::File(out.path().join("no-such-template.tcl")));
    let orchestrator = EquivOrchestrator::new(config, out.path()).expect("config");
    let results = orchestrator
        .check_all(&design, &mutants[..1], &CancellationToken::new())
        .await;
    assert_eq!(results[0].status, VerificationStatus::Error);
    assert!(orchestrator.log_path(&mutants[0].id).exists());
}

/// Records the peak number of concurrent runs; optionally blocks until
/// cancelled.
struct Scripted {
    running: AtomicUsize,
    peak: AtomicUsize,
    block: bool,
}

impl Scripted {
    fn new(block: bool) -> Self {
        Self {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            block,
        }
    }
}

/// Local handle so the test can keep its own `Arc` to the counters
/// (the orphan rule forbids implementing `Verifier` for `Arc<Scripted>`).
struct Shared(Arc<Scripted>);

impl std::ops::Deref for Shared {
    type Target = Scripted;
    fn deref(&self) -> &Scripted {
        &self.0
    }
}

#[async_trait]
impl Verifier for Shared {
    async fn run(
        &self,
        _invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, LaunchError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let outcome = if self.block {
            cancel.cancelled().await;
            RunOutcome::Cancelled
        } else {
            tokio::time::sleep(Duration::from_millis(50)).await;
            RunOutcome::Completed {
                output: "PAPERCUT_EQUIV: FAIL\n".to_string(),
                duration: Duration::from_millis(50),
            }
        };
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(outcome)
    }
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let out = tempfile::tempdir().expect("tempdir");
    let (design, mutants) = design_and_mutants();
    let verifier = Arc::new(Scripted::new(false));
    let config = EquivConfig::default().with_max_concurrent(2);
    let orchestrator =
        EquivOrchestrator::with_verifier(config, out.path(), Shared(Arc::clone(&verifier))).expect("config");
    let results = orchestrator
        .check_all(&design, &mutants, &CancellationToken::new())
        .await;
    assert!(results.iter().all(|r| r.status == VerificationStatus::Fail));
    assert!(verifier.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_cancellation_reports_every_mutant_and_skips_logs() {
    let out = tempfile::tempdir().expect("tempdir");
    let (design, mutants) = design_and_mutants();
    let verifier = Arc::new(Scripted::new(true));
    let config = EquivConfig::default().with_max_concurrent(1);
    let orchestrator =
        EquivOrchestrator::with_verifier(config, out.path(), Shared(Arc::clone(&verifier))).expect("config");

    for mutant in &mutants {
        let log = orchestrator.log_path(&mutant.id);
        std::fs::create_dir_all(log.parent().expect("logs dir")).expect("mkdir logs");
        std::fs::write(&log, "status: PASS\n").expect("stale log");
        let work = orchestrator.work_dir(&mutant.id);
        std::fs::create_dir_all(&work).expect("mkdir work");
        std::fs::write(work.join("mutant.sv"), "module stale;\nendmodule\n").expect("stale mutant");
    }

    let cancel = CancellationToken::new();
    let trigger = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        })
    };
    let jobs = orchestrator.prepare(&design, &mutants);
    let results = tokio::time::timeout(Duration::from_secs(10), orchestrator.run(jobs, &cancel))
        .await
        .expect("cancellation ends the batch");
    trigger.await.expect("join");

    assert_eq!(results.len(), 4);
    for (result, mutant) in results.iter().zip(&mutants) {
        assert_eq!(result.status, VerificationStatus::Error);
        assert_eq!(result.detail.as_deref(), Some("cancelled"));
        assert!(!orchestrator.log_path(&mutant.id).exists());
        assert!(!orchestrator.work_dir(&mutant.id).exists());
    }
    assert_eq!(verifier.peak.load(Ordering::SeqCst), 1);
}
