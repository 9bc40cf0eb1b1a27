//! Mutation strategies
//!
//! Each strategy is a pure function from a concretized tree to the edits it
//! proposes, in source order, plus the constructs it had to skip.

pub mod case_branch;
pub mod if_removal;
pub mod shrink_bits;
pub mod ternary;

use papercut_syntax::{ast, byte_range, SyntaxKind, SyntaxNode};
use tracing::debug;

use crate::concretize::Concretized;
use crate::edit::{Edit, Replacement};
use crate::mutant::{Mutation, SourceLocation, Strategy, StrategySkip};

/// Everything one strategy produced for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyOutput {
    pub mutations: Vec<Mutation>,
    pub skips: Vec<StrategySkip>,
}

impl StrategyOutput {
    fn propose(
        &mut self,
        design: &Concretized,
        strategy: Strategy,
        anchor: &SyntaxNode,
        variant: impl Into<String>,
        edit: Edit,
        description: impl Into<String>,
    ) {
        self.mutations.push(Mutation {
            strategy,
            module: enclosing_module(anchor),
            variant: variant.into(),
            location: SourceLocation::at(design.source(), edit.range.start),
            edit,
            description: description.into(),
        });
    }

    fn skip(
        &mut self,
        design: &Concretized,
        strategy: Strategy,
        node: &SyntaxNode,
        reason: impl Into<String>,
    ) {
        let location = SourceLocation::at(design.source(), byte_range(node).start);
        let reason = reason.into();
        debug!(%strategy, %location, %reason, "skipping construct");
        self.skips.push(StrategySkip {
            strategy,
            location,
            reason,
        });
    }

    /// Stable source order; variants of one construct keep their relative order.
    fn finish(mut self) -> Self {
        self.mutations.sort_by_key(|m| m.edit.range.start);
        self
    }
}

/// Run one strategy over the whole design.
pub fn run(strategy: Strategy, design: &Concretized) -> StrategyOutput {
    let output = match strategy {
        Strategy::ShrinkBits => shrink_bits::propose(design),
        Strategy::CaseBranch => case_branch::propose(design),
        Strategy::IfRemoval => if_removal::propose(design),
        Strategy::Ternary => ternary::propose(design),
    };
    debug!(
        %strategy,
        mutations = output.mutations.len(),
        skips = output.skips.len(),
        "strategy finished"
    );
    output
}

/// Name of the module containing `node`.
pub(crate) fn enclosing_module(node: &SyntaxNode) -> String {
    node.ancestors()
        .find_map(ast::Module::cast)
        .and_then(|m| m.name())
        .unwrap_or_default()
}

/// How to make a statement disappear: delete it inside a `begin ... end`,
/// otherwise leave an empty block where a statement is required.
pub(crate) fn remove_statement(stmt: &SyntaxNode) -> Replacement {
    match stmt.parent().map(|p| p.kind()) {
        Some(SyntaxKind::BlockStmt) => Replacement::Delete,
        _ => Replacement::Text("begin end".to_string()),
    }
}

/// Source text of a node.
pub(crate) fn node_text(design: &Concretized, node: &SyntaxNode) -> String {
    design.source()[byte_range(node)].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concretize::concretize;
    use papercut_syntax::SyntaxTree;

    #[test]
    fn test_remove_statement_in_block_deletes() {
        let tree = SyntaxTree::parse(
            "module m; always_comb begin a = 1; b = 2; end always_comb c = 3; endmodule",
        )
        .expect("parse");
        let stmts: Vec<_> = tree
            .root()
            .descendants()
            .filter(|n| n.kind() == SyntaxKind::AssignStmt)
            .collect();
        assert_eq!(remove_statement(&stmts[0]), Replacement::Delete);
        assert_eq!(
            remove_statement(&stmts[2]),
            Replacement::Text("begin end".into())
        );
    }

    const FSM: &str = "module fsm (input clk, input rst, input go, output logic busy);
  typedef enum logic [1:0] {IDLE, RUN, DONE} state_t;
  state_t state, next;
  function automatic logic is_active(input state_t s);
    return s != IDLE;
  endfunction
  always_ff @(posedge clk) if (rst) state <= IDLE; else state <= next;
  always_comb begin
    next = state;
    case (state)
      IDLE: if (go) next = RUN;
      RUN: next = DONE;
      DONE: next = IDLE;
    endcase
  end
  assign busy = is_active(state);
endmodule
";

    #[test]
    fn test_enum_state_machine() {
        let tree = SyntaxTree::parse(FSM).expect("parse");
        let design = concretize(&tree, None, &[]).expect("concretize");
        assert_eq!(design.render_concretized().expect("render"), FSM);

        let cases = run(Strategy::CaseBranch, &design);
        let variants: Vec<_> = cases.mutations.iter().map(|m| m.variant.as_str()).collect();
        assert_eq!(variants, vec!["item1", "item2", "item3"]);

        let ifs = run(Strategy::IfRemoval, &design);
        assert_eq!(ifs.mutations.len(), 4);
        assert!(ifs.mutations.iter().all(|m| m.module == "fsm"));

        // Enum-typed state is never a width candidate
        let shrink = run(Strategy::ShrinkBits, &design);
        assert!(shrink.mutations.is_empty());
        assert!(shrink.skips.is_empty());
    }

    #[test]
    fn test_every_strategy_runs_on_empty_module() {
        let tree = SyntaxTree::parse("module m; endmodule").expect("parse");
        let design = concretize(&tree, None, &[]).expect("concretize");
        for strategy in Strategy::ALL {
            assert_eq!(run(strategy, &design), StrategyOutput::default());
        }
    }
}
