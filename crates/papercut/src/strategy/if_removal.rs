//! If-conditional removal
//!
//! Every `if` yields two mutants: the statement replaced by its then-branch
//! (condition forced true) and by its else-branch, or by an empty block when
//! there is no else (condition forced false).

use papercut_syntax::{ast, byte_range};

use super::{node_text, StrategyOutput};
use crate::concretize::Concretized;
use crate::edit::Edit;
use crate::mutant::Strategy;

pub fn propose(design: &Concretized) -> StrategyOutput {
    let mut out = StrategyOutput::default();
    for stmt in design.tree().root().descendants().filter_map(ast::IfStmt::cast) {
        let node = stmt.syntax();
        let Some(then_branch) = stmt.then_branch() else {
            out.skip(design, Strategy::IfRemoval, node, "if without a then branch");
            continue;
        };
        let range = byte_range(node);

        out.propose(
            design,
            Strategy::IfRemoval,
            node,
            "then",
            Edit::replace(range.clone(), node_text(design, &then_branch)),
            "condition forced true",
        );

        let (else_text, description) = match stmt.else_branch() {
            Some(else_branch) => (node_text(design, &else_branch), "condition forced false"),
            None => (
                "begin end".to_string(),
                "condition forced false (no else branch)",
            ),
        };
        out.propose(
            design,
            Strategy::IfRemoval,
            node,
            "else",
            Edit::replace(range, else_text),
            description,
        );
    }
    out.finish()
}
