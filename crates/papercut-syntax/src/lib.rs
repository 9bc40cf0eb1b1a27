//! Lossless front end for the synthesizable SystemVerilog subset papercut mutates
//!
//! This crate uses:
//! - `logos` for lexical analysis
//! - `rowan` for a lossless syntax tree (whitespace, comments, and directives
//!   are preserved, so `tree.text() == source`)
//!
//! Only the subset needed for mutation is accepted: modules with parameters and
//! ports, declarations, continuous assignments, procedural blocks, instances,
//! and the usual statements and expressions, plus `typedef` (including
//! `enum`), functions and tasks, `generate` regions and loops, and packages
//! with `import` and `pkg::name` references. Anything else is a parse error.

pub mod ast;
pub mod kinds;
pub mod lexer;
pub mod parser;

pub use kinds::{HdlLanguage, SyntaxElement, SyntaxKind, SyntaxNode, SyntaxToken};
pub use lexer::{tokenize, Lexeme, Token};
pub use parser::{parse, ParseError, ParseResult};
pub use rowan::{TextRange, TextSize, WalkEvent};

use std::fmt;

/// Every error from a failed parse, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseErrors {
    pub errors: Vec<ParseError>,
}

impl std::error::Error for ParseErrors {}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => write!(f, "parse failed"),
            [only] => write!(f, "{only}"),
            [first, rest @ ..] => write!(f, "{first} (and {} more)", rest.len()),
        }
    }
}

/// A parsed source file that owns its text.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    text: String,
    root: SyntaxNode,
}

impl SyntaxTree {
    /// Parse `text`, failing if any syntax error was found.
    pub fn parse(text: &str) -> Result<Self, ParseErrors> {
        let result = parse(text);
        if !result.errors.is_empty() {
            return Err(ParseErrors {
                errors: result.errors,
            });
        }
        Ok(Self {
            text: text.to_string(),
            root: result.syntax(),
        })
    }

    pub fn root(&self) -> &SyntaxNode {
        &self.root
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn modules(&self) -> impl Iterator<Item = ast::Module> + '_ {
        self.root.children().filter_map(ast::Module::cast)
    }

    pub fn module(&self, name: &str) -> Option<ast::Module> {
        self.modules().find(|m| m.name().as_deref() == Some(name))
    }

    /// 1-based line and column of a byte offset in this tree's text.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        line_col(&self.text, offset)
    }
}

/// Byte range of a node as plain offsets.
pub fn byte_range(node: &SyntaxNode) -> std::ops::Range<usize> {
    let range = node.text_range();
    usize::from(range.start())..usize::from(range.end())
}

/// 1-based line and column (in characters) of `offset` within `text`.
/// Offsets past the end clamp to the end.
pub fn line_col(text: &str, offset: usize) -> (usize, usize) {
    let mut end = offset.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let prefix = &text[..end];
    let line = prefix.bytes().filter(|&b| b == b'\n').count() + 1;
    let line_start = prefix.rfind('\n').map_or(0, |i| i + 1);
    let column = prefix[line_start..].chars().count() + 1;
    (line, column)
}
