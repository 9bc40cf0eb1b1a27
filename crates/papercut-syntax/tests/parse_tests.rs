//! End-to-end parsing of realistic designs

use papercut_syntax::{ast, byte_range, SyntaxKind, SyntaxTree};
use proptest::prelude::*;

const ALU: &str = r#"`timescale 1ns/1ps
// Small ALU used across the papercut tests
module alu #(
    parameter int WIDTH = 8,
    parameter OPS = 4
) (
    input  logic             clk,
    input  logic             rst_n,
    input  logic [1:0]       op,
    input  logic [WIDTH-1:0] a,
    input  logic [WIDTH-1:0] b,
    output logic [WIDTH-1:0] y
);
    localparam int SEL_W = $clog2(OPS);
    logic [WIDTH-1:0] result;
    logic [7:0] counter;

    always_comb begin
        unique case (op)
            2'b00: result = a + b;
            2'b01: result = a - b;
            2'b10: result = a & b;
            default: result = '0;
        endcase
    end

    always_ff @(posedge clk or negedge rst_n) begin : seq
        if (!rst_n) begin
            counter <= 8'd0;
            y <= '0;
        end else begin
            counter <= counter + 1;
            y <= (op == 2'b11) ? {WIDTH{1'b1}} : result;
        end
    end : seq
endmodule
"#;

#[test]
fn test_alu_parses_losslessly() {
    let tree = SyntaxTree::parse(ALU).expect("alu parses");
    assert_eq!(tree.root().text().to_string(), ALU);

    let module = tree.module("alu").expect("alu module");
    assert_eq!(module.port_names(), vec!["clk", "rst_n", "op", "a", "b", "y"]);
    assert_eq!(module.params().len(), 3);

    let kinds: Vec<SyntaxKind> = tree.root().descendants().map(|n| n.kind()).collect();
    assert_eq!(kinds.iter().filter(|k| **k == SyntaxKind::CaseItem).count(), 3);
    assert_eq!(kinds.iter().filter(|k| **k == SyntaxKind::IfStmt).count(), 1);
    assert_eq!(kinds.iter().filter(|k| **k == SyntaxKind::TernaryExpr).count(), 1);
}

#[test]
fn test_ranges_slice_the_source() {
    let tree = SyntaxTree::parse(ALU).expect("alu parses");
    for node in tree.root().descendants() {
        let range = byte_range(&node);
        assert_eq!(&ALU[range], node.text().to_string());
    }
    let first_if = tree
        .root()
        .descendants()
        .find_map(ast::IfStmt::cast)
        .expect("if");
    let text = &ALU[byte_range(first_if.syntax())];
    assert!(text.starts_with("if (!rst_n)"));
    assert!(text.ends_with("end"));
}

#[test]
fn test_non_ansi_module_with_instances() {
    let src = "\
module leaf (a, y);
    parameter W = 4;
    input [W-1:0] a;
    output [W-1:0] y;
    assign y = ~a;
endmodule

module top (x, z);
    input [7:0] x;
    output [7:0] z;
    leaf #(.W(8)) u_leaf (.a(x), .y(z));
endmodule
";
    let tree = SyntaxTree::parse(src).expect("parses");
    let top = tree.module("top").expect("top");
    let inst = top.instantiations().next().expect("instance");
    assert_eq!(inst.module_name().as_deref(), Some("leaf"));
    assert_eq!(inst.items()[0].connections().len(), 2);
}

#[test]
fn test_unsupported_constructs_are_rejected() {
    for src in [
        "module m; generate endgenerate endmodule",
        "module m; typedef logic [3:0] nib_t; endmodule",
        "package p; endpackage",
        "module m; assign y = ; endmodule",
    ] {
        assert!(SyntaxTree::parse(src).is_err(), "{src}");
    }
}

proptest! {
    /// Any interleaving of trivia between tokens survives parsing untouched.
    #[test]
    fn prop_trivia_is_preserved(pads in proptest::collection::vec(0usize..4, 12)) {
        const TRIVIA: [&str; 4] = [" ", "\n", " /* c */ ", " // c\n"];
        let parts = ["module", "m", ";", "assign", "y", "=", "a", "?", "b", ":", "c", ";"];
        let mut src = String::new();
        for (part, pad) in parts.iter().zip(pads.iter()) {
            src.push_str(part);
            src.push_str(TRIVIA[*pad]);
        }
        src.push_str("endmodule");
        let tree = SyntaxTree::parse(&src).expect("parses");
        prop_assert_eq!(tree.root().text().to_string(), src);
    }
}
