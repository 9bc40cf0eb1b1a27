//! papercut: semantics-probing mutations for SystemVerilog designs
//!
//! Pipeline: parse (`papercut-syntax`), fold parameters to constants
//! ([`concretize`]), propose edits per [`strategy`], and patch each proposal
//! into a standalone mutant ([`pipeline`]). Equivalence checking lives in
//! `papercut-equiv`; its results are collected by [`report::Aggregator`].

pub mod concretize;
pub mod edit;
pub mod error;
pub mod interface;
pub mod mutant;
pub mod pipeline;
pub mod report;
pub mod strategy;
pub mod value;

pub use concretize::{concretize, Concretized, ConcretizedValue, ParamInfo, ParamOverride};
pub use edit::{combine_greedy, Edit, EditSet, Replacement};
pub use error::{
    ConcretizationError, OverlapError, PapercutError, PapercutResult, PatchError,
};
pub use interface::{DesignInterface, Port, PortDirection};
pub use mutant::{Mutant, Mutation, SourceLocation, Strategy, StrategySkip};
pub use pipeline::{generate_mutants, Generated, MutationOptions, MuxedDesign};
pub use report::{
    Aggregator, ReportStatus, Summary, SummaryEntry, VerificationResult, VerificationStatus,
};
pub use value::{BitVector, ValueType};

pub use papercut_syntax::SyntaxTree;

/// Parse `source` and fold its constants in one step.
pub fn load_design(
    source: &str,
    top: Option<&str>,
    overrides: &[ParamOverride],
) -> PapercutResult<Concretized> {
    let tree = SyntaxTree::parse(source)?;
    Ok(concretize(&tree, top, overrides)?)
}
