//! Verification results and the run summary

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PapercutResult;
use crate::mutant::{Mutant, SourceLocation, Strategy, StrategySkip};
use crate::pipeline::write_atomic;

/// Outcome of one equivalence check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    /// The mutant was proven equivalent to the original
    Pass,

    /// The verifier found a difference
    Fail,

    /// The verifier could not be run, gave unrecognised output, or was cancelled
    Error,

    /// The verifier exceeded its wall-clock budget
    Timeout,
}

impl VerificationStatus {
    /// Check if the verifier reached a verdict
    pub fn is_definitive(&self) -> bool {
        matches!(self, Self::Pass | Self::Fail)
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
            Self::Timeout => "TIMEOUT",
        };
        f.write_str(s)
    }
}

/// Result of verifying one mutant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub mutant_id: String,
    pub status: VerificationStatus,

    /// Combined stdout and stderr of the verifier
    #[serde(skip)]
    pub raw_output: String,

    /// Why the result is not a verdict (launch failure, cancellation, ...)
    pub detail: Option<String>,

    pub duration: Duration,
}

impl VerificationResult {
    pub fn new(
        mutant_id: impl Into<String>,
        status: VerificationStatus,
        raw_output: String,
        duration: Duration,
    ) -> Self {
        Self {
            mutant_id: mutant_id.into(),
            status,
            raw_output,
            detail: None,
            duration,
        }
    }

    /// Create an error result that never reached a verdict
    pub fn error(mutant_id: impl Into<String>, detail: impl Into<String>, duration: Duration) -> Self {
        Self {
            mutant_id: mutant_id.into(),
            status: VerificationStatus::Error,
            raw_output: String::new(),
            detail: Some(detail.into()),
            duration,
        }
    }

    /// Create a timeout result
    pub fn timeout(mutant_id: impl Into<String>, raw_output: String, duration: Duration) -> Self {
        Self {
            mutant_id: mutant_id.into(),
            status: VerificationStatus::Timeout,
            raw_output,
            detail: Some(format!("timed out after {:.1}s", duration.as_secs_f64())),
            duration,
        }
    }

    /// Create the result for a run that was cancelled before finishing
    pub fn cancelled(mutant_id: impl Into<String>) -> Self {
        Self::error(mutant_id, "cancelled", Duration::ZERO)
    }
}

/// Status column of the summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    /// Mutant written; equivalence checking disabled
    Generated,
    Pass,
    Fail,
    Error,
    Timeout,
}

impl From<VerificationStatus> for ReportStatus {
    fn from(status: VerificationStatus) -> Self {
        match status {
            VerificationStatus::Pass => Self::Pass,
            VerificationStatus::Fail => Self::Fail,
            VerificationStatus::Error => Self::Error,
            VerificationStatus::Timeout => Self::Timeout,
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generated => f.write_str("GENERATED"),
            Self::Pass => VerificationStatus::Pass.fmt(f),
            Self::Fail => VerificationStatus::Fail.fmt(f),
            Self::Error => VerificationStatus::Error.fmt(f),
            Self::Timeout => VerificationStatus::Timeout.fmt(f),
        }
    }
}

/// One row of the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub id: String,
    pub strategy: Strategy,
    pub variant: String,
    pub location: SourceLocation,
    pub status: ReportStatus,
    pub detail: Option<String>,
    pub duration_ms: Option<u64>,
}

/// Collects per-mutant outcomes. Single writer; order of recording does not
/// affect the summary.
#[derive(Debug, Default)]
pub struct Aggregator {
    entries: HashMap<String, SummaryEntry>,
    skips: Vec<StrategySkip>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_mutant(&mut self, mutant: &Mutant) {
        self.entries.insert(
            mutant.id.clone(),
            SummaryEntry {
                id: mutant.id.clone(),
                strategy: mutant.strategy,
                variant: mutant.variant.clone(),
                location: mutant.location,
                status: ReportStatus::Generated,
                detail: None,
                duration_ms: None,
            },
        );
    }

    pub fn record_result(&mut self, result: &VerificationResult) {
        match self.entries.get_mut(&result.mutant_id) {
            Some(entry) => {
                entry.status = result.status.into();
                entry.detail = result.detail.clone();
                entry.duration_ms = Some(u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX));
            }
            None => warn!(mutant = %result.mutant_id, "result for unknown mutant ignored"),
        }
    }

    pub fn record_skips(&mut self, skips: impl IntoIterator<Item = StrategySkip>) {
        self.skips.extend(skips);
    }

    /// Entries sorted by strategy, source offset, variant, then id.
    /// Numbered variants sort by number, so `item2` precedes `item10`.
    pub fn summary(&self) -> Summary {
        let mut entries: Vec<SummaryEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| {
            (a.strategy, a.location.offset, variant_key(&a.variant), &a.id).cmp(&(
                b.strategy,
                b.location.offset,
                variant_key(&b.variant),
                &b.id,
            ))
        });
        let mut counts = BTreeMap::new();
        for entry in &entries {
            *counts.entry(entry.status).or_insert(0usize) += 1;
        }
        let mut skips = self.skips.clone();
        skips.sort_by(|a, b| {
            (a.strategy, a.location.offset).cmp(&(b.strategy, b.location.offset))
        });
        Summary {
            entries,
            counts,
            skips,
        }
    }
}

/// A variant split into its text stem and trailing number.
fn variant_key(variant: &str) -> (&str, Option<u64>, &str) {
    let stem = variant.trim_end_matches(|c: char| c.is_ascii_digit());
    let digits = &variant[stem.len()..];
    (stem, digits.parse().ok(), digits)
}

/// The final report of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub entries: Vec<SummaryEntry>,
    pub counts: BTreeMap<ReportStatus, usize>,
    pub skips: Vec<StrategySkip>,
}

impl Summary {
    pub fn count(&self, status: ReportStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// True if any check ended without a verdict.
    pub fn has_errors(&self) -> bool {
        self.count(ReportStatus::Error) + self.count(ReportStatus::Timeout) > 0
    }

    /// Tab-separated `strategy  location  id  status` lines.
    pub fn render_text(&self) -> String {
        let mut out = String::from("strategy\tlocation\tid\tstatus\n");
        for entry in &self.entries {
            out.push_str(&format!(
                "{}\t{}\t{}\t{}\n",
                entry.strategy, entry.location, entry.id, entry.status
            ));
        }
        out
    }

    /// Write `summary.txt` and `summary.json` into `dir`.
    pub fn write(&self, dir: &Path) -> PapercutResult<()> {
        write_atomic(&dir.join("summary.txt"), &self.render_text())?;
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(&dir.join("summary.json"), &json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::Edit;

    fn mutant(id: &str, strategy: Strategy, offset: usize, variant: &str) -> Mutant {
        Mutant {
            id: id.to_string(),
            source_id: "design".to_string(),
            strategy,
            variant: variant.to_string(),
            location: SourceLocation {
                offset,
                line: 1,
                column: offset + 1,
            },
            edits: vec![Edit::delete(offset..offset + 1)],
            description: String::new(),
            mutated_text: String::new(),
        }
    }

    #[test]
    fn test_summary_order() {
        let mut agg = Aggregator::new();
        agg.record_mutant(&mutant("t_true", Strategy::Ternary, 5, "true"));
        agg.record_mutant(&mutant("i_else", Strategy::IfRemoval, 9, "else"));
        agg.record_mutant(&mutant("i_then", Strategy::IfRemoval, 9, "then"));
        agg.record_mutant(&mutant("i_early", Strategy::IfRemoval, 2, "then"));
        let ids: Vec<_> = agg.summary().entries.into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["i_early", "i_else", "i_then", "t_true"]);
    }

    #[test]
    fn test_numbered_variants_sort_numerically() {
        let mut agg = Aggregator::new();
        for item in [10, 2, 1, 11] {
            let variant = format!("item{item}");
            agg.record_mutant(&mutant(&format!("c_{variant}"), Strategy::CaseBranch, 4, &variant));
        }
        agg.record_mutant(&mutant("c_default", Strategy::CaseBranch, 4, "default"));
        let variants: Vec<_> = agg.summary().entries.into_iter().map(|e| e.variant).collect();
        assert_eq!(variants, vec!["default", "item1", "item2", "item10", "item11"]);
    }

    #[test]
    fn test_summary_is_idempotent() {
        let mut agg = Aggregator::new();
        for i in 0..10 {
            agg.record_mutant(&mutant(&format!("m{i}"), Strategy::CaseBranch, 10 - i, "item1"));
        }
        assert_eq!(agg.summary(), agg.summary());
    }

    #[test]
    fn test_results_update_status() {
        let mut agg = Aggregator::new();
        agg.record_mutant(&mutant("a", Strategy::Ternary, 1, "true"));
        agg.record_mutant(&mutant("b", Strategy::Ternary, 1, "false"));
        assert_eq!(agg.summary().count(ReportStatus::Generated), 2);

        agg.record_result(&VerificationResult::new(
            "a",
            VerificationStatus::Pass,
            String::new(),
            Duration::from_millis(1500),
        ));
        agg.record_result(&VerificationResult::cancelled("b"));
        agg.record_result(&VerificationResult::cancelled("unknown"));

        let summary = agg.summary();
        assert_eq!(summary.count(ReportStatus::Pass), 1);
        assert_eq!(summary.count(ReportStatus::Error), 1);
        assert!(summary.has_errors());
        let b = summary.entries.iter().find(|e| e.id == "b").expect("b");
        assert_eq!(b.detail.as_deref(), Some("cancelled"));
        let a = summary.entries.iter().find(|e| e.id == "a").expect("a");
        assert_eq!(a.duration_ms, Some(1500));
    }

    #[test]
    fn test_render_text() {
        let mut agg = Aggregator::new();
        agg.record_mutant(&mutant("m__ternary__L1C4__true", Strategy::Ternary, 3, "true"));
        let text = agg.summary().render_text();
        assert_eq!(
            text,
            "strategy\tlocation\tid\tstatus\nternary\t1:4\tm__ternary__L1C4__true\tGENERATED\n"
        );
    }

    #[test]
    fn test_status_display() {
        assert_eq!(VerificationStatus::Timeout.to_string(), "TIMEOUT");
        assert_eq!(ReportStatus::Generated.to_string(), "GENERATED");
        assert!(!VerificationStatus::Error.is_definitive());
    }

    #[test]
    fn test_write_summary_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut agg = Aggregator::new();
        agg.record_mutant(&mutant("x", Strategy::IfRemoval, 0, "then"));
        agg.summary().write(dir.path()).expect("write");
        let json = std::fs::read_to_string(dir.path().join("summary.json")).expect("json");
        let parsed: Summary = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed.entries.len(), 1);
        assert!(dir.path().join("summary.txt").exists());
    }
}
