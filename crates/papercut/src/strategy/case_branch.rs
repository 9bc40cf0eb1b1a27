//! Case-branch deletion
//!
//! One mutant per non-default item, each deleting that item. A `case` with a
//! single non-default item is removed as a whole instead.

use papercut_syntax::{ast, byte_range};

use super::{remove_statement, StrategyOutput};
use crate::concretize::Concretized;
use crate::edit::Edit;
use crate::mutant::Strategy;

pub fn propose(design: &Concretized) -> StrategyOutput {
    let mut out = StrategyOutput::default();
    for case in design.tree().root().descendants().filter_map(ast::CaseStmt::cast) {
        let node = case.syntax();
        let items = case.items();
        match items.len() {
            0 => out.skip(design, Strategy::CaseBranch, node, "case has only a default item"),
            1 => {
                let edit = Edit {
                    range: byte_range(node),
                    replacement: remove_statement(node),
                };
                out.propose(
                    design,
                    Strategy::CaseBranch,
                    node,
                    "whole",
                    edit,
                    "removed case with a single branch",
                );
            }
            _ => {
                for (i, item) in items.iter().enumerate() {
                    out.propose(
                        design,
                        Strategy::CaseBranch,
                        item.syntax(),
                        format!("item{}", i + 1),
                        Edit::delete(byte_range(item.syntax())),
                        format!("deleted case item {}", i + 1),
                    );
                }
            }
        }
    }
    out.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concretize::concretize;
    use crate::edit::{EditSet, Replacement};
    use papercut_syntax::SyntaxTree;

    fn design(src: &str) -> Concretized {
        let tree = SyntaxTree::parse(src).expect("parse");
        concretize(&tree, None, &[]).expect("concretize")
    }

    #[test]
    fn test_one_mutant_per_non_default_item() {
        let src = "module m; always_comb case(s) 2'b00: y=0; 2'b01: y=1; default: y=2; endcase endmodule";
        let out = propose(&design(src));
        assert_eq!(out.mutations.len(), 2);
        let texts: Vec<String> = out
            .mutations
            .iter()
            .map(|m| {
                EditSet::new(vec![m.edit.clone()])
                    .expect("single")
                    .apply(src)
                    .expect("apply")
            })
            .collect();
        assert_eq!(
            texts[0],
            "module m; always_comb case(s)  2'b01: y=1; default: y=2; endcase endmodule"
        );
        assert_eq!(
            texts[1],
            "module m; always_comb case(s) 2'b00: y=0;  default: y=2; endcase endmodule"
        );
        assert_eq!(out.mutations[0].variant, "item1");
        assert_eq!(out.mutations[1].variant, "item2");
    }

    #[test]
    fn test_single_item_removes_statement() {
        let src = "module m; always_comb begin y = 0; case (s) 1'b1: y = 1; default: ; endcase end endmodule";
        let out = propose(&design(src));
        assert_eq!(out.mutations.len(), 1);
        assert_eq!(out.mutations[0].variant, "whole");
        assert_eq!(out.mutations[0].edit.replacement, Replacement::Delete);
    }

    #[test]
    fn test_single_item_outside_block_leaves_empty_block() {
        let src = "module m; always_comb case (s) 1'b1: y = 1; endcase endmodule";
        let out = propose(&design(src));
        assert_eq!(
            out.mutations[0].edit.replacement,
            Replacement::Text("begin end".into())
        );
    }

    #[test]
    fn test_default_only_is_skipped() {
        let src = "module m; always_comb case (s) default: y = 1; endcase endmodule";
        let out = propose(&design(src));
        assert!(out.mutations.is_empty());
        assert_eq!(out.skips.len(), 1);
    }
}
