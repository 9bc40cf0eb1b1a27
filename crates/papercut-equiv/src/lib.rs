//! Equivalence checking for papercut mutants
//!
//! For each mutant a work directory receives the original design, the mutant
//! with its modules renamed, a wrapper that asserts output equality, and a
//! rendered verifier script. The verifier (JasperGold, SymbiYosys, or any
//! command) runs as a subprocess; its output is classified by regex markers.

pub mod cancel;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod runner;
pub mod script;
pub mod wrapper;

pub use cancel::CancellationToken;
pub use config::{EquivConfig, Markers, Profile, ScriptSource};
pub use error::{EquivError, EquivResult, LaunchError};
pub use orchestrator::{EquivOrchestrator, Job};
pub use runner::{classify, CommandVerifier, Invocation, RunOutcome, Verifier};
pub use wrapper::{generate_wrapper, rename_modules, MUTANT_SUFFIX};
