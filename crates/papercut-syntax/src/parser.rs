//! Recursive-descent parser producing a rowan green tree
//!
//! Trivia is attached before each node is opened, so a node's text range starts
//! at its first significant token. Errors are collected rather than returned
//! early; the parser always makes progress and always produces a tree.

use rowan::{Checkpoint, GreenNode, GreenNodeBuilder};

use crate::kinds::{SyntaxKind, SyntaxNode};
use crate::lexer::{tokenize, Lexeme};

/// A syntax error with the byte offset of the offending token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at byte {offset}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

/// Parser output: the green tree plus every error encountered.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub green: GreenNode,
    pub errors: Vec<ParseError>,
}

impl ParseResult {
    pub fn syntax(&self) -> SyntaxNode {
        SyntaxNode::new_root(self.green.clone())
    }
}

/// Parse a complete source file.
pub fn parse(input: &str) -> ParseResult {
    let tokens = tokenize(input);
    let mut parser = Parser {
        tokens,
        pos: 0,
        builder: GreenNodeBuilder::new(),
        errors: Vec::new(),
    };
    parser.source_file();
    ParseResult {
        green: parser.builder.finish(),
        errors: parser.errors,
    }
}

/// Binding power of `?:`; lower than every binary operator.
const TERNARY_BP: u8 = 1;
const UNARY_BP: u8 = 25;

fn infix_binding_power(kind: SyntaxKind) -> Option<(u8, u8)> {
    use SyntaxKind as K;
    let bp = match kind {
        K::PipePipe => (3, 4),
        K::AmpAmp => (5, 6),
        K::Pipe | K::TildePipe => (7, 8),
        K::Caret | K::TildeCaret => (9, 10),
        K::Amp | K::TildeAmp => (11, 12),
        K::EqEq | K::BangEq | K::EqEqEq | K::BangEqEq => (13, 14),
        K::Lt | K::LtEq | K::Gt | K::GtEq => (15, 16),
        K::Shl | K::Shr | K::AShl | K::AShr => (17, 18),
        K::Plus | K::Minus => (19, 20),
        K::Star | K::Slash | K::Percent => (21, 22),
        // `**` is right associative
        K::StarStar => (24, 23),
        _ => return None,
    };
    Some(bp)
}

fn is_prefix_operator(kind: SyntaxKind) -> bool {
    use SyntaxKind as K;
    matches!(
        kind,
        K::Bang
            | K::Tilde
            | K::Minus
            | K::Plus
            | K::Amp
            | K::Pipe
            | K::Caret
            | K::TildeAmp
            | K::TildePipe
            | K::TildeCaret
    )
}

/// Tokens an expression error never consumes, so enclosing rules can resync.
fn is_expr_stop(kind: SyntaxKind) -> bool {
    use SyntaxKind as K;
    matches!(
        kind,
        K::Semi | K::Comma | K::Colon | K::RParen | K::RBrack | K::RBrace
    ) || kind.is_block_end()
}

struct Parser<'a> {
    tokens: Vec<Lexeme<'a>>,
    pos: usize,
    builder: GreenNodeBuilder<'static>,
    errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    // === Token plumbing ===

    /// Kind of the `n`th significant token ahead.
    fn nth(&self, n: usize) -> SyntaxKind {
        self.tokens[self.pos..]
            .iter()
            .filter(|t| !t.kind.is_trivia())
            .nth(n)
            .map_or(SyntaxKind::Eof, |t| t.kind)
    }

    fn current(&self) -> SyntaxKind {
        self.nth(0)
    }

    fn at(&self, kind: SyntaxKind) -> bool {
        self.current() == kind
    }

    fn at_eof(&self) -> bool {
        self.at(SyntaxKind::Eof)
    }

    fn current_offset(&self) -> usize {
        self.tokens[self.pos..]
            .iter()
            .find(|t| !t.kind.is_trivia())
            .or_else(|| self.tokens.last())
            .map_or(0, |t| {
                if t.kind.is_trivia() {
                    t.offset + t.text.len()
                } else {
                    t.offset
                }
            })
    }

    fn eat_trivia(&mut self) {
        while let Some(token) = self.tokens.get(self.pos) {
            if !token.kind.is_trivia() {
                break;
            }
            self.builder.token(token.kind.into(), token.text);
            self.pos += 1;
        }
    }

    fn bump(&mut self) {
        self.eat_trivia();
        if let Some(token) = self.tokens.get(self.pos) {
            self.builder.token(token.kind.into(), token.text);
            self.pos += 1;
        }
    }

    fn eat(&mut self, kind: SyntaxKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: SyntaxKind) -> bool {
        if self.eat(kind) {
            return true;
        }
        self.error(format!(
            "expected {}, found {}",
            kind.describe(),
            self.current().describe()
        ));
        false
    }

    fn error(&mut self, message: impl Into<String>) {
        let offset = self.current_offset();
        self.errors.push(ParseError {
            message: message.into(),
            offset,
        });
    }

    fn start_node(&mut self, kind: SyntaxKind) {
        self.eat_trivia();
        self.builder.start_node(kind.into());
    }

    fn start_node_at(&mut self, checkpoint: Checkpoint, kind: SyntaxKind) {
        self.builder.start_node_at(checkpoint, kind.into());
    }

    fn finish_node(&mut self) {
        self.builder.finish_node();
    }

    fn checkpoint(&mut self) -> Checkpoint {
        self.eat_trivia();
        self.builder.checkpoint()
    }

    /// Wrap exactly one token in an error node.
    fn bump_error(&mut self) {
        self.start_node(SyntaxKind::ErrorNode);
        self.bump();
        self.finish_node();
    }

    /// Skip to the end of the current item: through the next `;`, or up to a
    /// block terminator.
    fn recover_item(&mut self, message: &str) {
        self.error(message);
        self.start_node(SyntaxKind::ErrorNode);
        loop {
            match self.current() {
                SyntaxKind::Eof | SyntaxKind::EndmoduleKw => break,
                SyntaxKind::Semi => {
                    self.bump();
                    break;
                }
                _ => self.bump(),
            }
        }
        self.finish_node();
    }

    // === Top level ===

    fn source_file(&mut self) {
        use SyntaxKind as K;
        self.builder.start_node(K::SourceFile.into());
        while !self.at_eof() {
            match self.current() {
                K::ModuleKw => self.module(),
                K::PackageKw => self.package(),
                K::ImportKw => self.import_decl(),
                K::TypedefKw => self.typedef_decl(),
                other => {
                    self.error(format!(
                        "expected `module` or `package`, found {}",
                        other.describe()
                    ));
                    self.bump_error();
                }
            }
        }
        self.eat_trivia();
        self.builder.finish_node();
    }

    fn module(&mut self) {
        self.start_node(SyntaxKind::Module);
        self.bump();
        self.expect(SyntaxKind::Ident);
        while self.at(SyntaxKind::ImportKw) {
            self.import_decl();
        }
        if self.at(SyntaxKind::Hash) {
            self.param_port_list();
        }
        if self.at(SyntaxKind::LParen) {
            self.port_list();
        }
        self.expect(SyntaxKind::Semi);
        self.module_items();
        self.expect(SyntaxKind::EndmoduleKw);
        self.end_label();
        self.finish_node();
    }

    /// Optional `: name` after a closing keyword.
    fn end_label(&mut self) {
        if self.eat(SyntaxKind::Colon) {
            self.expect(SyntaxKind::Ident);
        }
    }

    fn package(&mut self) {
        use SyntaxKind as K;
        self.start_node(K::PackageDecl);
        self.bump();
        self.expect(K::Ident);
        self.expect(K::Semi);
        self.module_items();
        self.expect(K::EndpackageKw);
        self.end_label();
        self.finish_node();
    }

    /// `import p::*;` or `import p::a, q::b;`
    fn import_decl(&mut self) {
        use SyntaxKind as K;
        self.start_node(K::ImportDecl);
        self.bump();
        loop {
            self.expect(K::Ident);
            self.expect(K::ColonColon);
            if !self.eat(K::Star) {
                self.expect(K::Ident);
            }
            if !self.eat(K::Comma) {
                break;
            }
        }
        self.expect(K::Semi);
        self.finish_node();
    }

    fn param_port_list(&mut self) {
        self.start_node(SyntaxKind::ParamPortList);
        self.bump();
        self.expect(SyntaxKind::LParen);
        if !self.at(SyntaxKind::RParen) {
            loop {
                self.start_node(SyntaxKind::ParamDecl);
                if !self.eat(SyntaxKind::ParameterKw) {
                    self.eat(SyntaxKind::LocalparamKw);
                }
                if self.at_type_start() {
                    self.data_type();
                }
                self.declarator();
                self.finish_node();
                if !self.eat(SyntaxKind::Comma) {
                    break;
                }
            }
        }
        self.expect(SyntaxKind::RParen);
        self.finish_node();
    }

    fn port_list(&mut self) {
        self.start_node(SyntaxKind::PortList);
        self.bump();
        if self.eat(SyntaxKind::RParen) {
            self.finish_node();
            return;
        }
        if self.current().is_direction() {
            loop {
                self.start_node(SyntaxKind::PortDecl);
                if self.current().is_direction() {
                    self.bump();
                }
                self.eat(SyntaxKind::VarKw);
                if self.at_type_start() {
                    self.data_type();
                }
                self.declarator();
                self.finish_node();
                if !self.eat(SyntaxKind::Comma) {
                    break;
                }
            }
        } else {
            loop {
                self.expect(SyntaxKind::Ident);
                if !self.eat(SyntaxKind::Comma) {
                    break;
                }
            }
        }
        self.expect(SyntaxKind::RParen);
        self.finish_node();
    }

    fn at_type_start(&self) -> bool {
        use SyntaxKind as K;
        let kind = self.current();
        kind.is_type_keyword()
            || matches!(kind, K::SignedKw | K::UnsignedKw | K::LBrack | K::EnumKw)
            || self.at_type_name()
    }

    /// A user-defined type name followed by the declared name: `state_t s`
    /// or `pkg::word_t w`.
    fn at_type_name(&self) -> bool {
        use SyntaxKind as K;
        if !self.at(K::Ident) {
            return false;
        }
        let after = match self.nth(1) {
            K::Ident => 2,
            K::ColonColon if self.nth(2) == K::Ident && self.nth(3) == K::Ident => 4,
            _ => return false,
        };
        // `sub u0 (...)` and `sub u[3:0] (...)` are instances
        !matches!(self.nth(after), K::LParen | K::LBrack)
    }

    /// A declaration that may appear among statements.
    fn at_declaration(&self) -> bool {
        use SyntaxKind as K;
        let kind = self.current();
        kind.is_type_keyword()
            || matches!(kind, K::VarKw | K::AutomaticKw | K::EnumKw)
            || self.at_type_name()
    }

    fn data_type(&mut self) {
        use SyntaxKind as K;
        self.start_node(K::DataType);
        match self.current() {
            K::EnumKw => self.enum_type(),
            K::VoidKw => self.bump(),
            kind if kind.is_type_keyword() => self.bump(),
            K::Ident if self.at_type_name() => {
                self.bump();
                if self.eat(K::ColonColon) {
                    self.expect(K::Ident);
                }
            }
            _ => {}
        }
        if !self.eat(K::SignedKw) {
            self.eat(K::UnsignedKw);
        }
        while self.at(K::LBrack) {
            self.dimension();
        }
        self.finish_node();
    }

    /// `enum [base] { A, B = expr, ... }`
    fn enum_type(&mut self) {
        use SyntaxKind as K;
        self.start_node(K::EnumType);
        self.bump();
        if self.at_type_start() {
            self.data_type();
        }
        self.expect(K::LBrace);
        loop {
            self.start_node(K::EnumMember);
            self.expect(K::Ident);
            if self.eat(K::Eq) {
                self.expr();
            }
            self.finish_node();
            if !self.eat(K::Comma) {
                break;
            }
        }
        self.expect(K::RBrace);
        self.finish_node();
    }

    fn typedef_decl(&mut self) {
        use SyntaxKind as K;
        self.start_node(K::TypedefDecl);
        self.bump();
        if self.at_type_start() {
            self.data_type();
        } else {
            self.error(format!("expected a type, found {}", self.current().describe()));
        }
        self.expect(K::Ident);
        while self.at(K::LBrack) {
            self.dimension();
        }
        self.expect(K::Semi);
        self.finish_node();
    }

    fn dimension(&mut self) {
        self.start_node(SyntaxKind::Dimension);
        self.bump();
        self.expr();
        if matches!(
            self.current(),
            SyntaxKind::Colon | SyntaxKind::PlusColon | SyntaxKind::MinusColon
        ) {
            self.bump();
            self.expr();
        }
        self.expect(SyntaxKind::RBrack);
        self.finish_node();
    }

    fn declarator(&mut self) {
        self.start_node(SyntaxKind::Declarator);
        self.expect(SyntaxKind::Ident);
        while self.at(SyntaxKind::LBrack) {
            self.dimension();
        }
        if self.eat(SyntaxKind::Eq) {
            self.expr();
        }
        self.finish_node();
    }

    fn declarator_list(&mut self) {
        loop {
            self.declarator();
            if !self.eat(SyntaxKind::Comma) {
                break;
            }
        }
    }

    // === Module items ===

    /// Module items up to the next block terminator.
    fn module_items(&mut self) {
        while !self.current().is_block_end() {
            let before = self.pos;
            self.module_item();
            if self.pos == before {
                self.bump_error();
            }
        }
    }

    fn module_item(&mut self) {
        use SyntaxKind as K;
        match self.current() {
            K::ParameterKw | K::LocalparamKw => {
                self.start_node(K::ParamDecl);
                self.bump();
                if self.at_type_start() {
                    self.data_type();
                }
                self.declarator_list();
                self.expect(K::Semi);
                self.finish_node();
            }
            kind if kind.is_direction() => self.port_decl(),
            _ if self.at_declaration() => self.data_decl(),
            K::TypedefKw => self.typedef_decl(),
            K::FunctionKw | K::TaskKw => self.subroutine(),
            K::ImportKw => self.import_decl(),
            K::GenerateKw => {
                self.start_node(K::GenerateRegion);
                self.bump();
                self.module_items();
                self.expect(K::EndgenerateKw);
                self.finish_node();
            }
            K::ForKw => {
                self.start_node(K::GenerateFor);
                self.bump();
                self.for_header();
                self.generate_block();
                self.finish_node();
            }
            K::IfKw => self.generate_if(),
            K::BeginKw => self.generate_block(),
            K::AssignKw => {
                self.start_node(K::ContinuousAssign);
                self.bump();
                loop {
                    self.assignment();
                    if !self.eat(K::Comma) {
                        break;
                    }
                }
                self.expect(K::Semi);
                self.finish_node();
            }
            K::AlwaysKw | K::AlwaysCombKw | K::AlwaysFfKw | K::AlwaysLatchKw => {
                self.start_node(K::AlwaysBlock);
                self.bump();
                if self.at(K::At) {
                    self.event_control();
                }
                self.statement();
                self.finish_node();
            }
            K::InitialKw => {
                self.start_node(K::InitialBlock);
                self.bump();
                self.statement();
                self.finish_node();
            }
            K::Ident if matches!(self.nth(1), K::Ident | K::Hash) => self.instantiation(),
            K::Semi => self.bump(),
            other => {
                let message = format!("unsupported module item starting with {}", other.describe());
                self.recover_item(&message);
            }
        }
    }

    fn port_decl(&mut self) {
        use SyntaxKind as K;
        self.start_node(K::PortDecl);
        self.bump();
        self.eat(K::VarKw);
        if self.at_type_start() {
            self.data_type();
        }
        self.declarator_list();
        self.expect(K::Semi);
        self.finish_node();
    }

    fn data_decl(&mut self) {
        use SyntaxKind as K;
        self.start_node(K::DataDecl);
        self.eat(K::AutomaticKw);
        self.eat(K::VarKw);
        self.data_type();
        self.declarator_list();
        self.expect(K::Semi);
        self.finish_node();
    }

    /// `function` or `task` through its closing keyword. Old-style port
    /// declarations and locals may precede or mix with the body statements.
    fn subroutine(&mut self) {
        use SyntaxKind as K;
        let function = self.at(K::FunctionKw);
        let (kind, end) = if function {
            (K::FunctionDecl, K::EndfunctionKw)
        } else {
            (K::TaskDecl, K::EndtaskKw)
        };
        self.start_node(kind);
        self.bump();
        self.eat(K::AutomaticKw);
        if function && (self.at(K::VoidKw) || self.at_type_start()) {
            self.data_type();
        }
        self.expect(K::Ident);
        if self.at(K::LParen) {
            self.tf_port_list();
        }
        self.expect(K::Semi);
        while !self.current().is_block_end() {
            let before = self.pos;
            if self.current().is_direction() {
                self.port_decl();
            } else {
                self.statement();
            }
            if self.pos == before {
                self.bump_error();
            }
        }
        self.expect(end);
        self.end_label();
        self.finish_node();
    }

    fn tf_port_list(&mut self) {
        use SyntaxKind as K;
        self.start_node(K::TfPortList);
        self.bump();
        if !self.at(K::RParen) {
            loop {
                self.start_node(K::TfPortItem);
                if self.current().is_direction() {
                    self.bump();
                }
                self.eat(K::VarKw);
                if self.at_type_start() {
                    self.data_type();
                }
                self.declarator();
                self.finish_node();
                if !self.eat(K::Comma) {
                    break;
                }
            }
        }
        self.expect(K::RParen);
        self.finish_node();
    }

    fn generate_if(&mut self) {
        use SyntaxKind as K;
        self.start_node(K::GenerateIf);
        self.bump();
        self.expect(K::LParen);
        self.expr();
        self.expect(K::RParen);
        self.generate_block();
        if self.at(K::ElseKw) {
            self.start_node(K::ElseClause);
            self.bump();
            self.generate_block();
            self.finish_node();
        }
        self.finish_node();
    }

    /// `begin [: name] items end [: name]`, or a single module item.
    fn generate_block(&mut self) {
        use SyntaxKind as K;
        if !self.at(K::BeginKw) {
            self.module_item();
            return;
        }
        self.start_node(K::GenerateBlock);
        self.bump();
        self.end_label();
        self.module_items();
        self.expect(K::EndKw);
        self.end_label();
        self.finish_node();
    }

    fn assignment(&mut self) {
        self.start_node(SyntaxKind::Assignment);
        self.lvalue();
        self.expect(SyntaxKind::Eq);
        self.expr();
        self.finish_node();
    }

    fn event_control(&mut self) {
        use SyntaxKind as K;
        self.start_node(K::EventControl);
        self.bump();
        if self.eat(K::Star) {
            self.finish_node();
            return;
        }
        if self.eat(K::LParen) {
            if !self.eat(K::Star) {
                loop {
                    if !self.eat(K::PosedgeKw) {
                        self.eat(K::NegedgeKw);
                    }
                    self.expr();
                    if !(self.eat(K::OrKw) || self.eat(K::Comma)) {
                        break;
                    }
                }
            }
            self.expect(K::RParen);
        } else {
            self.postfix_expr();
        }
        self.finish_node();
    }

    fn instantiation(&mut self) {
        use SyntaxKind as K;
        self.start_node(K::Instantiation);
        self.bump();
        if self.at(K::Hash) {
            self.start_node(K::ParamValueList);
            self.bump();
            self.expect(K::LParen);
            self.argument_list_tail();
            self.finish_node();
        }
        loop {
            self.start_node(K::InstanceItem);
            self.expect(K::Ident);
            while self.at(K::LBrack) {
                self.dimension();
            }
            self.start_node(K::PortConnectionList);
            self.expect(K::LParen);
            self.argument_list_tail();
            self.finish_node();
            self.finish_node();
            if !self.eat(K::Comma) {
                break;
            }
        }
        self.expect(K::Semi);
        self.finish_node();
    }

    /// Arguments after an already consumed `(`, through the closing `)`.
    fn argument_list_tail(&mut self) {
        if !self.at(SyntaxKind::RParen) {
            loop {
                self.argument();
                if !self.eat(SyntaxKind::Comma) {
                    break;
                }
            }
        }
        self.expect(SyntaxKind::RParen);
    }

    fn argument(&mut self) {
        use SyntaxKind as K;
        if self.at(K::Dot) {
            self.start_node(K::NamedArg);
            self.bump();
            if !self.eat(K::Star) {
                self.expect(K::Ident);
                if self.eat(K::LParen) {
                    if !self.at(K::RParen) {
                        self.expr();
                    }
                    self.expect(K::RParen);
                }
            }
            self.finish_node();
        } else {
            self.start_node(K::OrderedArg);
            self.expr();
            self.finish_node();
        }
    }

    // === Statements ===

    fn statement(&mut self) {
        use SyntaxKind as K;
        match self.current() {
            K::BeginKw => self.block(),
            K::IfKw => self.if_stmt(),
            K::CaseKw | K::CasezKw | K::CasexKw => self.case_stmt(),
            K::UniqueKw | K::PriorityKw => match self.nth(1) {
                K::IfKw => self.if_stmt(),
                K::CaseKw | K::CasezKw | K::CasexKw => self.case_stmt(),
                _ => self.recover_item("expected `if` or `case` after qualifier"),
            },
            K::ForKw => self.for_stmt(),
            K::ReturnKw => {
                self.start_node(K::ReturnStmt);
                self.bump();
                if !self.at(K::Semi) {
                    self.expr();
                }
                self.expect(K::Semi);
                self.finish_node();
            }
            _ if self.at_declaration() => self.data_decl(),
            K::Semi => {
                self.start_node(K::NullStmt);
                self.bump();
                self.finish_node();
            }
            K::At => {
                self.start_node(K::EventStmt);
                self.event_control();
                self.statement();
                self.finish_node();
            }
            K::SystemIdent => self.expr_stmt(),
            K::Ident if self.nth(1) == K::LParen => self.expr_stmt(),
            K::Ident if self.nth(1) == K::ColonColon && self.nth(3) == K::LParen => {
                self.expr_stmt()
            }
            K::Ident | K::LBrace => self.assign_stmt(),
            kind if kind.is_block_end() || kind == K::ElseKw => {
                self.error(format!(
                    "expected statement, found {}",
                    self.current().describe()
                ));
            }
            other => {
                let message = format!("expected statement, found {}", other.describe());
                self.recover_item(&message);
            }
        }
    }

    fn block(&mut self) {
        use SyntaxKind as K;
        self.start_node(K::BlockStmt);
        self.bump();
        self.end_label();
        while !self.current().is_block_end() {
            let before = self.pos;
            self.statement();
            if self.pos == before {
                self.bump_error();
            }
        }
        self.expect(K::EndKw);
        self.end_label();
        self.finish_node();
    }

    fn if_stmt(&mut self) {
        use SyntaxKind as K;
        self.start_node(K::IfStmt);
        if !self.eat(K::UniqueKw) {
            self.eat(K::PriorityKw);
        }
        self.expect(K::IfKw);
        self.expect(K::LParen);
        self.expr();
        self.expect(K::RParen);
        self.statement();
        if self.at(K::ElseKw) {
            self.start_node(K::ElseClause);
            self.bump();
            self.statement();
            self.finish_node();
        }
        self.finish_node();
    }

    fn case_stmt(&mut self) {
        use SyntaxKind as K;
        self.start_node(K::CaseStmt);
        if !self.eat(K::UniqueKw) {
            self.eat(K::PriorityKw);
        }
        self.bump();
        self.expect(K::LParen);
        self.expr();
        self.expect(K::RParen);
        while !self.current().is_block_end() {
            let before = self.pos;
            self.case_item();
            if self.pos == before {
                self.bump_error();
            }
        }
        self.expect(K::EndcaseKw);
        self.finish_node();
    }

    fn case_item(&mut self) {
        use SyntaxKind as K;
        if self.at(K::DefaultKw) {
            self.start_node(K::DefaultItem);
            self.bump();
            self.eat(K::Colon);
            self.statement();
            self.finish_node();
            return;
        }
        self.start_node(K::CaseItem);
        loop {
            self.expr();
            if !self.eat(K::Comma) {
                break;
            }
        }
        self.expect(K::Colon);
        self.statement();
        self.finish_node();
    }

    fn for_stmt(&mut self) {
        self.start_node(SyntaxKind::ForStmt);
        self.bump();
        self.for_header();
        self.statement();
        self.finish_node();
    }

    /// `(init; condition; step)`, shared by loop statements and generate loops.
    fn for_header(&mut self) {
        use SyntaxKind as K;
        self.expect(K::LParen);

        self.start_node(K::ForInit);
        if self.at_type_start() {
            self.data_type();
        }
        loop {
            self.assignment();
            if !self.eat(K::Comma) {
                break;
            }
        }
        self.finish_node();
        self.expect(K::Semi);

        self.expr();
        self.expect(K::Semi);

        self.start_node(K::ForStep);
        if self.at(K::Ident) && matches!(self.nth(1), K::PlusPlus | K::MinusMinus) {
            self.bump();
            self.bump();
        } else {
            self.assignment();
        }
        self.finish_node();
        self.expect(K::RParen);
    }

    fn expr_stmt(&mut self) {
        self.start_node(SyntaxKind::ExprStmt);
        self.expr();
        self.expect(SyntaxKind::Semi);
        self.finish_node();
    }

    fn assign_stmt(&mut self) {
        use SyntaxKind as K;
        self.start_node(K::AssignStmt);
        self.lvalue();
        if matches!(self.current(), K::Eq | K::LtEq) {
            self.bump();
        } else {
            self.error(format!(
                "expected `=` or `<=`, found {}",
                self.current().describe()
            ));
        }
        self.expr();
        self.expect(K::Semi);
        self.finish_node();
    }

    // === Expressions ===

    fn lvalue(&mut self) {
        self.postfix_expr();
    }

    fn expr(&mut self) {
        self.expr_bp(0);
    }

    fn expr_bp(&mut self, min_bp: u8) {
        let checkpoint = self.checkpoint();

        if is_prefix_operator(self.current()) {
            self.start_node(SyntaxKind::UnaryExpr);
            self.bump();
            self.expr_bp(UNARY_BP);
            self.finish_node();
        } else if !self.postfix_expr() {
            return;
        }

        loop {
            let op = self.current();
            if op == SyntaxKind::Question {
                if TERNARY_BP < min_bp {
                    break;
                }
                self.start_node_at(checkpoint, SyntaxKind::TernaryExpr);
                self.bump();
                self.expr_bp(0);
                self.expect(SyntaxKind::Colon);
                self.expr_bp(TERNARY_BP);
                self.finish_node();
                continue;
            }
            let Some((l_bp, r_bp)) = infix_binding_power(op) else {
                break;
            };
            if l_bp < min_bp {
                break;
            }
            self.start_node_at(checkpoint, SyntaxKind::BinaryExpr);
            self.bump();
            self.expr_bp(r_bp);
            self.finish_node();
        }
    }

    /// A primary followed by any number of `[...]` selects.
    fn postfix_expr(&mut self) -> bool {
        use SyntaxKind as K;
        let checkpoint = self.checkpoint();
        if !self.primary() {
            return false;
        }
        while self.at(K::LBrack) {
            self.start_node_at(checkpoint, K::SelectExpr);
            self.bump();
            self.expr();
            if matches!(self.current(), K::Colon | K::PlusColon | K::MinusColon) {
                self.bump();
                self.expr();
            }
            self.expect(K::RBrack);
            self.finish_node();
        }
        true
    }

    fn primary(&mut self) -> bool {
        use SyntaxKind as K;
        match self.current() {
            K::IntLiteral | K::BasedLiteral | K::UnbasedLiteral | K::StringLiteral => {
                self.start_node(K::LiteralExpr);
                self.bump();
                self.finish_node();
            }
            K::Ident | K::SystemIdent if self.nth(self.name_len()) == K::LParen => {
                self.start_node(K::CallExpr);
                self.name();
                self.start_node(K::ArgList);
                self.bump();
                if !self.at(K::RParen) {
                    loop {
                        self.expr();
                        if !self.eat(K::Comma) {
                            break;
                        }
                    }
                }
                self.expect(K::RParen);
                self.finish_node();
                self.finish_node();
            }
            K::Ident | K::SystemIdent => {
                self.start_node(K::NameExpr);
                self.name();
                self.finish_node();
            }
            K::LParen => {
                self.start_node(K::ParenExpr);
                self.bump();
                self.expr();
                self.expect(K::RParen);
                self.finish_node();
            }
            K::LBrace => self.concat_or_replicate(),
            other => {
                self.error(format!("expected expression, found {}", other.describe()));
                if !is_expr_stop(other) {
                    self.bump_error();
                }
                return false;
            }
        }
        true
    }

    /// Tokens in the name at the cursor: 3 for `pkg::name`, otherwise 1.
    fn name_len(&self) -> usize {
        if self.at(SyntaxKind::Ident) && self.nth(1) == SyntaxKind::ColonColon {
            3
        } else {
            1
        }
    }

    fn name(&mut self) {
        let scoped = self.name_len() == 3;
        self.bump();
        if scoped {
            self.bump();
            self.expect(SyntaxKind::Ident);
        }
    }

    fn concat_or_replicate(&mut self) {
        use SyntaxKind as K;
        let checkpoint = self.checkpoint();
        self.bump();
        self.expr();
        if self.at(K::LBrace) {
            self.start_node_at(checkpoint, K::ReplicateExpr);
            self.start_node(K::ConcatExpr);
            self.bump();
            loop {
                self.expr();
                if !self.eat(K::Comma) {
                    break;
                }
            }
            self.expect(K::RBrace);
            self.finish_node();
        } else {
            self.start_node_at(checkpoint, K::ConcatExpr);
            while self.eat(K::Comma) {
                self.expr();
            }
        }
        self.expect(K::RBrace);
        self.finish_node();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> SyntaxNode {
        let result = parse(src);
        assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
        result.syntax()
    }

    fn find(root: &SyntaxNode, kind: SyntaxKind) -> Vec<SyntaxNode> {
        root.descendants().filter(|n| n.kind() == kind).collect()
    }

    #[test]
    fn test_empty_module() {
        let root = parse_ok("module m; endmodule\n");
        assert_eq!(find(&root, SyntaxKind::Module).len(), 1);
    }

    #[test]
    fn test_node_range_excludes_leading_trivia() {
        let src = "// header\nmodule m;\n  assign a = b;\nendmodule\n";
        let root = parse_ok(src);
        let module = &find(&root, SyntaxKind::Module)[0];
        assert_eq!(u32::from(module.text_range().start()) as usize, 10);
        let assign = &find(&root, SyntaxKind::ContinuousAssign)[0];
        assert_eq!(assign.text().to_string(), "assign a = b;");
    }

    #[test]
    fn test_precedence() {
        let root = parse_ok("module m; assign y = a + b * c; endmodule");
        let bin = find(&root, SyntaxKind::BinaryExpr);
        assert_eq!(bin.len(), 2);
        // Outer node is the addition, inner the product
        assert_eq!(bin[0].text().to_string(), "a + b * c");
        assert_eq!(bin[1].text().to_string(), "b * c");
    }

    #[test]
    fn test_ternary_is_right_associative() {
        let root = parse_ok("module m; assign y = a ? b : c ? d : e; endmodule");
        let ternaries = find(&root, SyntaxKind::TernaryExpr);
        assert_eq!(ternaries.len(), 2);
        assert_eq!(ternaries[0].text().to_string(), "a ? b : c ? d : e");
        assert_eq!(ternaries[1].text().to_string(), "c ? d : e");
    }

    #[test]
    fn test_ternary_condition_takes_binary() {
        let root = parse_ok("module m; assign y = a || b ? c : d; endmodule");
        let ternary = &find(&root, SyntaxKind::TernaryExpr)[0];
        let first = ternary.children().next().map(|n| n.kind());
        assert_eq!(first, Some(SyntaxKind::BinaryExpr));
    }

    #[test]
    fn test_nonblocking_vs_relational() {
        let root = parse_ok(
            "module m; always_ff @(posedge clk) q <= a <= b; endmodule",
        );
        let stmt = &find(&root, SyntaxKind::AssignStmt)[0];
        let rhs = stmt.children().nth(1).map(|n| n.kind());
        assert_eq!(rhs, Some(SyntaxKind::BinaryExpr));
    }

    #[test]
    fn test_case_with_default() {
        let root = parse_ok(
            "module m; always_comb case (s) 2'b00: y = a; 2'b01, 2'b10: y = b; default: y = c; endcase endmodule",
        );
        assert_eq!(find(&root, SyntaxKind::CaseItem).len(), 2);
        assert_eq!(find(&root, SyntaxKind::DefaultItem).len(), 1);
    }

    #[test]
    fn test_instantiation() {
        let root = parse_ok(
            "module top; sub #(.W(8)) u0 (.a(x), .b(), .*); sub u1 (x, y); endmodule",
        );
        assert_eq!(find(&root, SyntaxKind::Instantiation).len(), 2);
        assert_eq!(find(&root, SyntaxKind::NamedArg).len(), 4);
        assert_eq!(find(&root, SyntaxKind::OrderedArg).len(), 2);
    }

    #[test]
    fn test_replication_and_concat() {
        let root = parse_ok("module m; assign y = {2{a, b}}; assign z = {a, b[3:0]}; endmodule");
        assert_eq!(find(&root, SyntaxKind::ReplicateExpr).len(), 1);
        assert_eq!(find(&root, SyntaxKind::ConcatExpr).len(), 2);
        assert_eq!(find(&root, SyntaxKind::SelectExpr).len(), 1);
    }

    #[test]
    fn test_errors_are_collected() {
        let result = parse("module m; wait (a); assign a = ; endmodule");
        assert_eq!(result.errors.len(), 2);
        assert_eq!(
            result.syntax().text().to_string(),
            "module m; wait (a); assign a = ; endmodule"
        );
    }

    #[test]
    fn test_enum_typedef_and_typed_signals() {
        let root = parse_ok(
            "module fsm (input clk, input go, output logic busy);
  typedef enum logic [1:0] {IDLE, RUN = 2'd2} state_t;
  state_t state, next;
  always_ff @(posedge clk) state <= next;
  always_comb begin
    next = state;
    case (state)
      IDLE: if (go) next = RUN;
      RUN: next = IDLE;
      default: next = IDLE;
    endcase
  end
  assign busy = state == RUN;
endmodule",
        );
        assert_eq!(find(&root, SyntaxKind::TypedefDecl).len(), 1);
        assert_eq!(find(&root, SyntaxKind::EnumMember).len(), 2);
        let decl = &find(&root, SyntaxKind::DataDecl)[0];
        assert_eq!(decl.text().to_string(), "state_t state, next;");
        assert_eq!(find(&root, SyntaxKind::CaseItem).len(), 2);
    }

    #[test]
    fn test_instance_is_not_a_typed_declaration() {
        let root = parse_ok("module m; sub u0 (.a(x)); sub u1 [1:0] (x); state_t s; endmodule");
        assert_eq!(find(&root, SyntaxKind::Instantiation).len(), 2);
        assert_eq!(find(&root, SyntaxKind::DataDecl).len(), 1);
    }

    #[test]
    fn test_function_and_task() {
        let root = parse_ok(
            "module m (input [1:0] a, output [1:0] y);
  function automatic logic [1:0] inc(input logic [1:0] v);
    logic [1:0] t;
    t = v + 2'd1;
    return t;
  endfunction : inc
  task show;
    input [1:0] v;
    $display(\"%d\", v);
  endtask
  assign y = inc(a);
endmodule",
        );
        let function = &find(&root, SyntaxKind::FunctionDecl)[0];
        assert_eq!(find(function, SyntaxKind::TfPortItem).len(), 1);
        assert_eq!(find(function, SyntaxKind::DataDecl).len(), 1);
        assert_eq!(find(function, SyntaxKind::ReturnStmt).len(), 1);
        let task = &find(&root, SyntaxKind::TaskDecl)[0];
        assert_eq!(find(task, SyntaxKind::PortDecl).len(), 1);
        assert_eq!(find(&root, SyntaxKind::CallExpr).len(), 2);
    }

    #[test]
    fn test_generate_constructs() {
        let root = parse_ok(
            "module m #(parameter N = 4) (input [N-1:0] a, b, output [N-1:0] y);
  genvar i;
  generate
    for (i = 0; i < N; i = i + 1) begin : lane
      assign y[i] = a[i] ^ b[i];
    end
  endgenerate
  for (genvar j = 0; j < 2; j++) begin : g
    logic t;
  end
  if (N > 2) begin : wide
    logic w;
  end else begin
    logic n;
  end
endmodule",
        );
        assert_eq!(find(&root, SyntaxKind::GenerateRegion).len(), 1);
        assert_eq!(find(&root, SyntaxKind::GenerateFor).len(), 2);
        assert_eq!(find(&root, SyntaxKind::GenerateIf).len(), 1);
        assert_eq!(find(&root, SyntaxKind::GenerateBlock).len(), 4);
        assert!(find(&root, SyntaxKind::IfStmt).is_empty());
    }

    #[test]
    fn test_package_and_import() {
        let root = parse_ok(
            "package p;
  localparam int W = 8;
  typedef logic [W-1:0] word_t;
endpackage : p
import p::*;
module m import p::W; (input p::word_t a, output logic [p::W-1:0] y);
  assign y = a;
endmodule",
        );
        assert_eq!(find(&root, SyntaxKind::PackageDecl).len(), 1);
        assert_eq!(find(&root, SyntaxKind::ImportDecl).len(), 2);
        assert_eq!(find(&root, SyntaxKind::Module).len(), 1);
        let scoped = find(&root, SyntaxKind::NameExpr)
            .into_iter()
            .any(|n| n.text().to_string() == "p::W");
        assert!(scoped);
    }

    #[test]
    fn test_unterminated_module_terminates() {
        let result = parse("module m; always begin a = 1;");
        assert!(!result.errors.is_empty());
    }
}
