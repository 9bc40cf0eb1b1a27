//! HDL lexer
//!
//! Tokenizes the supported SystemVerilog subset using the logos crate. Unlike a
//! throwaway lexer, trivia (whitespace, comments, compiler directives) is kept
//! as tokens so the syntax tree stays lossless.

use logos::Logos;

use crate::kinds::SyntaxKind;

/// Raw tokens produced by logos.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    #[regex(r"[ \t\r\n\f]+")]
    Whitespace,

    #[regex(r"//[^\n]*")]
    LineComment,

    #[regex(r"/\*([^*]|\*+[^*/])*\*+/")]
    BlockComment,

    /// Preprocessor lines are carried through untouched.
    #[regex(r"`(timescale|define|include|ifdef|ifndef|elsif|else|endif|default_nettype|resetall|undef|celldefine|endcelldefine)[^\n]*")]
    Directive,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_$]*")]
    Ident,

    #[regex(r"\$[a-zA-Z_][a-zA-Z0-9_$]*")]
    SystemIdent,

    #[regex(r"[0-9][0-9_]*")]
    IntLiteral,

    /// Sized or unsized based literal (`8'hFF`, `'d10`, `4'sb1010`)
    #[regex(r"([0-9][0-9_]*)?'[sS]?[bB][01xXzZ?_]+")]
    #[regex(r"([0-9][0-9_]*)?'[sS]?[oO][0-7xXzZ?_]+")]
    #[regex(r"([0-9][0-9_]*)?'[sS]?[dD][0-9xXzZ?_]+")]
    #[regex(r"([0-9][0-9_]*)?'[sS]?[hH][0-9a-fA-FxXzZ?_]+")]
    BasedLiteral,

    /// Fill literal (`'0`, `'1`, `'x`, `'z`)
    #[regex(r"'[01xXzZ]")]
    UnbasedLiteral,

    #[regex(r#""([^"\\\n]|\\.)*""#)]
    StringLiteral,

    #[token("module")]
    Module,
    #[token("endmodule")]
    Endmodule,
    #[token("parameter")]
    Parameter,
    #[token("localparam")]
    Localparam,
    #[token("input")]
    Input,
    #[token("output")]
    Output,
    #[token("inout")]
    Inout,
    #[token("logic")]
    Logic,
    #[token("wire")]
    Wire,
    #[token("reg")]
    Reg,
    #[token("bit")]
    Bit,
    #[token("byte")]
    Byte,
    #[token("int")]
    Int,
    #[token("integer")]
    Integer,
    #[token("genvar")]
    Genvar,
    #[token("var")]
    Var,
    #[token("signed")]
    Signed,
    #[token("unsigned")]
    Unsigned,
    #[token("assign")]
    Assign,
    #[token("always")]
    Always,
    #[token("always_comb")]
    AlwaysComb,
    #[token("always_ff")]
    AlwaysFf,
    #[token("always_latch")]
    AlwaysLatch,
    #[token("initial")]
    Initial,
    #[token("begin")]
    Begin,
    #[token("end")]
    End,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("case")]
    Case,
    #[token("casez")]
    Casez,
    #[token("casex")]
    Casex,
    #[token("endcase")]
    Endcase,
    #[token("default")]
    Default,
    #[token("unique")]
    Unique,
    #[token("priority")]
    Priority,
    #[token("posedge")]
    Posedge,
    #[token("negedge")]
    Negedge,
    #[token("or")]
    Or,
    #[token("for")]
    For,
    #[token("typedef")]
    Typedef,
    #[token("enum")]
    Enum,
    #[token("function")]
    Function,
    #[token("endfunction")]
    Endfunction,
    #[token("task")]
    Task,
    #[token("endtask")]
    Endtask,
    #[token("automatic")]
    Automatic,
    #[token("return")]
    Return,
    #[token("void")]
    Void,
    #[token("generate")]
    Generate,
    #[token("endgenerate")]
    Endgenerate,
    #[token("package")]
    Package,
    #[token("endpackage")]
    Endpackage,
    #[token("import")]
    Import,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBrack,
    #[token("]")]
    RBrack,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token(":")]
    Colon,
    #[token("::")]
    ColonColon,
    #[token("?")]
    Question,
    #[token("#")]
    Hash,
    #[token("@")]
    At,
    #[token("=")]
    Eq,
    #[token("<=")]
    LtEq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("**")]
    StarStar,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~^")]
    #[token("^~")]
    TildeCaret,
    #[token("~&")]
    TildeAmp,
    #[token("~|")]
    TildePipe,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("===")]
    EqEqEq,
    #[token("!==")]
    BangEqEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("<<<")]
    AShl,
    #[token(">>>")]
    AShr,
    #[token("+:")]
    PlusColon,
    #[token("-:")]
    MinusColon,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
}

impl Token {
    pub fn kind(self) -> SyntaxKind {
        use SyntaxKind as K;
        match self {
            Token::Whitespace => K::Whitespace,
            Token::LineComment => K::LineComment,
            Token::BlockComment => K::BlockComment,
            Token::Directive => K::Directive,
            Token::Ident => K::Ident,
            Token::SystemIdent => K::SystemIdent,
            Token::IntLiteral => K::IntLiteral,
            Token::BasedLiteral => K::BasedLiteral,
            Token::UnbasedLiteral => K::UnbasedLiteral,
            Token::StringLiteral => K::StringLiteral,
            Token::Module => K::ModuleKw,
            Token::Endmodule => K::EndmoduleKw,
            Token::Parameter => K::ParameterKw,
            Token::Localparam => K::LocalparamKw,
            Token::Input => K::InputKw,
            Token::Output => K::OutputKw,
            Token::Inout => K::InoutKw,
            Token::Logic => K::LogicKw,
            Token::Wire => K::WireKw,
            Token::Reg => K::RegKw,
            Token::Bit => K::BitKw,
            Token::Byte => K::ByteKw,
            Token::Int => K::IntKw,
            Token::Integer => K::IntegerKw,
            Token::Genvar => K::GenvarKw,
            Token::Var => K::VarKw,
            Token::Signed => K::SignedKw,
            Token::Unsigned => K::UnsignedKw,
            Token::Assign => K::AssignKw,
            Token::Always => K::AlwaysKw,
            Token::AlwaysComb => K::AlwaysCombKw,
            Token::AlwaysFf => K::AlwaysFfKw,
            Token::AlwaysLatch => K::AlwaysLatchKw,
            Token::Initial => K::InitialKw,
            Token::Begin => K::BeginKw,
            Token::End => K::EndKw,
            Token::If => K::IfKw,
            Token::Else => K::ElseKw,
            Token::Case => K::CaseKw,
            Token::Casez => K::CasezKw,
            Token::Casex => K::CasexKw,
            Token::Endcase => K::EndcaseKw,
            Token::Default => K::DefaultKw,
            Token::Unique => K::UniqueKw,
            Token::Priority => K::PriorityKw,
            Token::Posedge => K::PosedgeKw,
            Token::Negedge => K::NegedgeKw,
            Token::Or => K::OrKw,
            Token::For => K::ForKw,
            Token::Typedef => K::TypedefKw,
            Token::Enum => K::EnumKw,
            Token::Function => K::FunctionKw,
            Token::Endfunction => K::EndfunctionKw,
            Token::Task => K::TaskKw,
            Token::Endtask => K::EndtaskKw,
            Token::Automatic => K::AutomaticKw,
            Token::Return => K::ReturnKw,
            Token::Void => K::VoidKw,
            Token::Generate => K::GenerateKw,
            Token::Endgenerate => K::EndgenerateKw,
            Token::Package => K::PackageKw,
            Token::Endpackage => K::EndpackageKw,
            Token::Import => K::ImportKw,
            Token::LParen => K::LParen,
            Token::RParen => K::RParen,
            Token::LBrack => K::LBrack,
            Token::RBrack => K::RBrack,
            Token::LBrace => K::LBrace,
            Token::RBrace => K::RBrace,
            Token::Semi => K::Semi,
            Token::Comma => K::Comma,
            Token::Dot => K::Dot,
            Token::Colon => K::Colon,
            Token::ColonColon => K::ColonColon,
            Token::Question => K::Question,
            Token::Hash => K::Hash,
            Token::At => K::At,
            Token::Eq => K::Eq,
            Token::LtEq => K::LtEq,
            Token::Plus => K::Plus,
            Token::Minus => K::Minus,
            Token::Star => K::Star,
            Token::Slash => K::Slash,
            Token::Percent => K::Percent,
            Token::StarStar => K::StarStar,
            Token::Bang => K::Bang,
            Token::Tilde => K::Tilde,
            Token::Amp => K::Amp,
            Token::Pipe => K::Pipe,
            Token::Caret => K::Caret,
            Token::TildeCaret => K::TildeCaret,
            Token::TildeAmp => K::TildeAmp,
            Token::TildePipe => K::TildePipe,
            Token::AmpAmp => K::AmpAmp,
            Token::PipePipe => K::PipePipe,
            Token::EqEq => K::EqEq,
            Token::BangEq => K::BangEq,
            Token::EqEqEq => K::EqEqEq,
            Token::BangEqEq => K::BangEqEq,
            Token::Lt => K::Lt,
            Token::Gt => K::Gt,
            Token::GtEq => K::GtEq,
            Token::Shl => K::Shl,
            Token::Shr => K::Shr,
            Token::AShl => K::AShl,
            Token::AShr => K::AShr,
            Token::PlusColon => K::PlusColon,
            Token::MinusColon => K::MinusColon,
            Token::PlusPlus => K::PlusPlus,
            Token::MinusMinus => K::MinusMinus,
        }
    }
}

/// A token with its source slice and byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lexeme<'a> {
    pub kind: SyntaxKind,
    pub text: &'a str,
    pub offset: usize,
}

/// Tokenize `input`. Every byte of the input ends up in exactly one lexeme;
/// unrecognised characters become `SyntaxKind::Error` lexemes.
pub fn tokenize(input: &str) -> Vec<Lexeme<'_>> {
    let mut lexer = Token::lexer(input);
    let mut out = Vec::new();
    while let Some(result) = lexer.next() {
        let kind = match result {
            Ok(token) => token.kind(),
            Err(()) => SyntaxKind::Error,
        };
        out.push(Lexeme {
            kind,
            text: lexer.slice(),
            offset: lexer.span().start,
        });
    }
    out
}
