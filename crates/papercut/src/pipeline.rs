//! Turning strategy proposals into mutant files

use std::cmp::Reverse;
use std::io::Write;
use std::path::{Path, PathBuf};

use papercut_syntax::{ast, byte_range, SyntaxKind, SyntaxNode, SyntaxToken};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::concretize::Concretized;
use crate::edit::{combine_greedy, Edit, EditSet};
use crate::error::{PapercutError, PapercutResult};
use crate::mutant::{
    dedupe_ids, sanitize, Mutant, Mutation, SourceLocation, Strategy, StrategySkip,
};
use crate::strategy;

/// Which mutants to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOptions {
    pub strategies: Vec<Strategy>,
    /// One greedy non-overlapping mutant per strategy instead of one per edit
    pub combined: bool,
    /// Stem of the input file, recorded on every mutant
    pub source_id: String,
}

impl Default for MutationOptions {
    fn default() -> Self {
        Self {
            strategies: Strategy::ALL.to_vec(),
            combined: false,
            source_id: String::from("design"),
        }
    }
}

impl MutationOptions {
    pub fn with_strategies(mut self, strategies: impl IntoIterator<Item = Strategy>) -> Self {
        self.strategies = strategies.into_iter().collect();
        self
    }

    pub fn with_combined(mut self, combined: bool) -> Self {
        self.combined = combined;
        self
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }
}

/// Mutants of one design, with everything the strategies skipped.
#[derive(Debug, Clone, Default)]
pub struct Generated {
    pub mutants: Vec<Mutant>,
    pub skips: Vec<StrategySkip>,
}

/// Run the selected strategies and patch one mutant per proposal (or per
/// strategy in combined mode).
///
/// Strategies run here on the calling thread; patching is parallel.
pub fn generate_mutants(design: &Concretized, options: &MutationOptions) -> PapercutResult<Generated> {
    let mut strategies = options.strategies.clone();
    strategies.sort();
    strategies.dedup();

    let mut drafts: Vec<Draft> = Vec::new();
    let mut skips = Vec::new();
    for strategy in strategies {
        let output = strategy::run(strategy, design);
        skips.extend(output.skips);
        if options.combined {
            drafts.extend(Draft::combined(design, strategy, output.mutations));
        } else {
            drafts.extend(output.mutations.into_iter().map(Draft::single));
        }
    }

    let mut ids: Vec<String> = drafts.iter().map(|d| d.id.clone()).collect();
    dedupe_ids(&mut ids);

    let source = design.source();
    let mutants = drafts
        .into_par_iter()
        .zip(ids)
        .map(|(draft, id)| draft.patch(id, &options.source_id, source))
        .collect::<PapercutResult<Vec<_>>>()?;

    info!(
        mutants = mutants.len(),
        skips = skips.len(),
        combined = options.combined,
        "generated mutants"
    );
    Ok(Generated { mutants, skips })
}

/// A mutant before its text exists.
struct Draft {
    id: String,
    strategy: Strategy,
    variant: String,
    location: SourceLocation,
    edits: EditSet,
    description: String,
}

impl Draft {
    fn single(mutation: Mutation) -> Self {
        let id = mutation.base_id();
        Self {
            id,
            strategy: mutation.strategy,
            variant: mutation.variant,
            location: mutation.location,
            edits: EditSet::from(mutation.edit),
            description: mutation.description,
        }
    }

    fn combined(design: &Concretized, strategy: Strategy, mutations: Vec<Mutation>) -> Option<Self> {
        let location = mutations.first()?.location;
        let proposed = mutations.len();
        let edits = combine_greedy(mutations.into_iter().map(|m| m.edit));
        debug!(%strategy, proposed, kept = edits.len(), "combined strategy edits");
        Some(Self {
            id: format!("{}__{}__combined", sanitize(&design.top_name()), strategy),
            strategy,
            variant: String::from("combined"),
            location,
            description: format!("{} non-overlapping {} edits", edits.len(), strategy),
            edits,
        })
    }

    fn patch(self, id: String, source_id: &str, source: &str) -> PapercutResult<Mutant> {
        let mutated_text = self.edits.apply(source)?;
        Ok(Mutant {
            id,
            source_id: source_id.to_string(),
            strategy: self.strategy,
            variant: self.variant,
            location: self.location,
            edits: self.edits.into_edits(),
            description: self.description,
            mutated_text,
        })
    }
}

/// Create `dir` (and parents) if needed.
pub fn prepare_output_dir(dir: &Path) -> PapercutResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| PapercutError::io(dir, e))
}

/// Write `contents` to `path` through a temporary file in the same directory,
/// so readers never see a partial file.
pub fn write_atomic(path: &Path, contents: &str) -> PapercutResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| PapercutError::io(dir, e))?;
    tmp.write_all(contents.as_bytes())
        .map_err(|e| PapercutError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| PapercutError::io(path, e.error))?;
    Ok(())
}

/// Write every mutant as `<dir>/<id>.sv`, in parallel.
pub fn write_mutants(mutants: &[Mutant], dir: &Path) -> PapercutResult<Vec<PathBuf>> {
    mutants
        .par_iter()
        .map(|mutant| -> PapercutResult<PathBuf> {
            let path = mutant_path(dir, mutant);
            write_atomic(&path, &mutant.mutated_text)?;
            debug!(mutant = %mutant.id, path = %path.display(), "wrote mutant");
            Ok(path)
        })
        .collect()
}

pub fn mutant_path(dir: &Path, mutant: &Mutant) -> PathBuf {
    dir.join(format!("{}.sv", mutant.id))
}

/// Write the constant-folded design as `<dir>/<top>_concretized.sv`.
pub fn write_concretized(design: &Concretized, dir: &Path) -> PapercutResult<PathBuf> {
    let path = dir.join(format!("{}_concretized.sv", sanitize(&design.top_name())));
    write_atomic(&path, &design.render_concretized()?)?;
    Ok(path)
}

/// Greedily merge the edits of the given mutants into one design.
///
/// Returns `None` when there is nothing to merge.
pub fn consolidate<'a>(
    source: &str,
    mutants: impl IntoIterator<Item = &'a Mutant>,
) -> PapercutResult<Option<String>> {
    let set = combine_greedy(mutants.into_iter().flat_map(|m| m.edits.iter().cloned()));
    if set.is_empty() {
        return Ok(None);
    }
    info!(edits = set.len(), "consolidating passing mutants");
    Ok(Some(set.apply(source)?))
}

pub fn consolidated_path(design: &Concretized, dir: &Path) -> PathBuf {
    dir.join(format!("{}_consolidated.sv", sanitize(&design.top_name())))
}

/// Write the consolidated design as `<dir>/<top>_consolidated.sv`.
pub fn write_consolidated(design: &Concretized, text: &str, dir: &Path) -> PapercutResult<PathBuf> {
    let path = consolidated_path(design, dir);
    write_atomic(&path, text)?;
    Ok(path)
}

/// Name stem of the select inputs added to the muxed design.
pub const SELECT_PREFIX: &str = "pc_sel";

/// The top module with every removable predicate routed through select
/// inputs, so one design covers all if and ternary mutants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxedDesign {
    pub module: String,
    /// Number of `pc_sel` inputs; always two per predicate
    pub selects: usize,
    pub text: String,
}

/// Rewrite predicate `i` of the top module (ifs first, then ternaries, each
/// in source order) to `(pc_sel{2i+1} | (!pc_sel{2i} & (p)))`, rename the
/// module `<top>_muxed`, and add the selects as `input logic` ports.
///
/// With both selects of a pair low the predicate is unchanged; the odd
/// select forces it true and the even select alone forces it false.
/// Returns `None` when no selected strategy has a predicate to mux.
pub fn mux_predicates(
    design: &Concretized,
    strategies: &[Strategy],
) -> PapercutResult<Option<MuxedDesign>> {
    let top = design.top().syntax().clone();
    let mut predicates: Vec<SyntaxNode> = Vec::new();
    if strategies.contains(&Strategy::IfRemoval) {
        predicates.extend(
            top.descendants()
                .filter_map(ast::IfStmt::cast)
                .filter_map(|s| s.condition()),
        );
    }
    if strategies.contains(&Strategy::Ternary) {
        predicates.extend(
            top.descendants()
                .filter_map(ast::TernaryExpr::cast)
                .filter_map(|t| t.condition()),
        );
    }
    let Some(name) = design.top().name_token() else {
        return Ok(None);
    };
    if predicates.is_empty() {
        return Ok(None);
    }

    // Nested predicates share offsets: closers go first, inner before outer,
    // then openers, outer before inner.
    let mut splices: Vec<(usize, u8, Reverse<usize>, usize, String)> = Vec::new();
    for (i, predicate) in predicates.iter().enumerate() {
        let range = byte_range(predicate);
        let opener = format!(
            "({SELECT_PREFIX}{} | (!{SELECT_PREFIX}{} & (",
            2 * i + 1,
            2 * i
        );
        splices.push((range.start, 1, Reverse(range.end), i, opener));
        splices.push((range.end, 0, Reverse(range.start), i, String::from(")))")));
    }
    splices.sort();

    let mut edits: Vec<Edit> = Vec::new();
    for (offset, _, _, _, text) in splices {
        match edits.last_mut() {
            Some(last) if last.range.start == offset => {
                let merged = format!("{}{}", last.text(), text);
                *last = Edit::replace(offset..offset, merged);
            }
            _ => edits.push(Edit::replace(offset..offset, text)),
        }
    }

    let module = format!("{}_muxed", design.top_name());
    let selects = 2 * predicates.len();
    let names = (0..selects)
        .map(|i| format!("{SELECT_PREFIX}{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    edits.push(Edit::replace(byte_range_of(&name), module.clone()));
    edits.extend(select_ports(&top, &names));

    let text = EditSet::new(edits)?.apply(design.source())?;
    debug!(%module, selects, "muxed predicates");
    Ok(Some(MuxedDesign {
        module,
        selects,
        text,
    }))
}

fn byte_range_of(token: &SyntaxToken) -> std::ops::Range<usize> {
    let range = token.text_range();
    usize::from(range.start())..usize::from(range.end())
}

/// Edits declaring `names` as inputs in the header of `module`.
fn select_ports(module: &SyntaxNode, names: &str) -> Vec<Edit> {
    let header_semi = module
        .children_with_tokens()
        .filter_map(|e| e.into_token())
        .find(|t| t.kind() == SyntaxKind::Semi);
    let Some(list) = module.children().find(|n| n.kind() == SyntaxKind::PortList) else {
        return header_semi
            .map(|semi| {
                let at = byte_range_of(&semi).start;
                Edit::replace(at..at, format!(" (input logic {names})"))
            })
            .into_iter()
            .collect();
    };
    let Some(open) = list
        .children_with_tokens()
        .filter_map(|e| e.into_token())
        .find(|t| t.kind() == SyntaxKind::LParen)
    else {
        return Vec::new();
    };
    let at = byte_range_of(&open).end;
    let ansi = list.children().any(|n| n.kind() == SyntaxKind::PortDecl);
    let named = list
        .children_with_tokens()
        .filter_map(|e| e.into_token())
        .any(|t| t.kind() == SyntaxKind::Ident);
    if ansi {
        return vec![Edit::replace(at..at, format!("input logic {names}, "))];
    }
    if !named {
        return vec![Edit::replace(at..at, format!("input logic {names}"))];
    }
    let mut edits = vec![Edit::replace(at..at, format!("{names}, "))];
    if let Some(semi) = header_semi {
        let end = byte_range_of(&semi).end;
        edits.push(Edit::replace(end..end, format!("\n  input logic {names};")));
    }
    edits
}

pub fn muxed_path(design: &Concretized, dir: &Path) -> PathBuf {
    dir.join(format!("{}_muxed.sv", sanitize(&design.top_name())))
}

/// Write the muxed design as `<dir>/<top>_muxed.sv`.
pub fn write_muxed(design: &Concretized, muxed: &MuxedDesign, dir: &Path) -> PapercutResult<PathBuf> {
    let path = muxed_path(design, dir);
    write_atomic(&path, &muxed.text)?;
    Ok(path)
}
