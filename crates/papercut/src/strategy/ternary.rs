//! Ternary removal: `c ? a : b` becomes `a`, and separately `b`.

use papercut_syntax::{ast, byte_range};

use super::{node_text, StrategyOutput};
use crate::concretize::Concretized;
use crate::edit::Edit;
use crate::mutant::Strategy;

pub fn propose(design: &Concretized) -> StrategyOutput {
    let mut out = StrategyOutput::default();
    for expr in design
        .tree()
        .root()
        .descendants()
        .filter_map(ast::TernaryExpr::cast)
    {
        let node = expr.syntax();
        let (Some(then_expr), Some(else_expr)) = (expr.then_expr(), expr.else_expr()) else {
            out.skip(design, Strategy::Ternary, node, "incomplete conditional expression");
            continue;
        };
        let range = byte_range(node);
        out.propose(
            design,
            Strategy::Ternary,
            node,
            "true",
            Edit::replace(range.clone(), node_text(design, &then_expr)),
            "selected true operand",
        );
        out.propose(
            design,
            Strategy::Ternary,
            node,
            "false",
            Edit::replace(range, node_text(design, &else_expr)),
            "selected false operand",
        );
    }
    out.finish()
}
