//! Syntax kinds and the rowan language binding

/// Every token and node kind in the concrete syntax tree.
///
/// Tokens come first, then nodes. The enum is `repr(u16)` so it can round-trip
/// through `rowan::SyntaxKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum SyntaxKind {
    // Trivia
    Whitespace = 0,
    LineComment,
    BlockComment,
    Directive,

    // Names and literals
    Ident,
    SystemIdent,
    IntLiteral,
    BasedLiteral,
    UnbasedLiteral,
    StringLiteral,

    // Keywords
    ModuleKw,
    EndmoduleKw,
    ParameterKw,
    LocalparamKw,
    InputKw,
    OutputKw,
    InoutKw,
    LogicKw,
    WireKw,
    RegKw,
    BitKw,
    ByteKw,
    IntKw,
    IntegerKw,
    GenvarKw,
    VarKw,
    SignedKw,
    UnsignedKw,
    AssignKw,
    AlwaysKw,
    AlwaysCombKw,
    AlwaysFfKw,
    AlwaysLatchKw,
    InitialKw,
    BeginKw,
    EndKw,
    IfKw,
    ElseKw,
    CaseKw,
    CasezKw,
    CasexKw,
    EndcaseKw,
    DefaultKw,
    UniqueKw,
    PriorityKw,
    PosedgeKw,
    NegedgeKw,
    OrKw,
    ForKw,
    TypedefKw,
    EnumKw,
    FunctionKw,
    EndfunctionKw,
    TaskKw,
    EndtaskKw,
    AutomaticKw,
    ReturnKw,
    VoidKw,
    GenerateKw,
    EndgenerateKw,
    PackageKw,
    EndpackageKw,
    ImportKw,

    // Punctuation and operators
    LParen,
    RParen,
    LBrack,
    RBrack,
    LBrace,
    RBrace,
    Semi,
    Comma,
    Dot,
    Colon,
    ColonColon,
    Question,
    Hash,
    At,
    Eq,
    LtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    StarStar,
    Bang,
    Tilde,
    Amp,
    Pipe,
    Caret,
    TildeCaret,
    TildeAmp,
    TildePipe,
    AmpAmp,
    PipePipe,
    EqEq,
    BangEq,
    EqEqEq,
    BangEqEq,
    Lt,
    Gt,
    GtEq,
    Shl,
    Shr,
    AShl,
    AShr,
    PlusColon,
    MinusColon,
    PlusPlus,
    MinusMinus,

    /// Unrecognised input character(s)
    Error,
    /// Pseudo-kind returned by the parser past the last token
    Eof,

    // Nodes
    SourceFile,
    Module,
    ParamPortList,
    PortList,
    ParamDecl,
    PortDecl,
    DataDecl,
    DataType,
    Dimension,
    Declarator,
    ContinuousAssign,
    Assignment,
    AlwaysBlock,
    InitialBlock,
    EventControl,
    Instantiation,
    ParamValueList,
    InstanceItem,
    PortConnectionList,
    NamedArg,
    OrderedArg,
    TypedefDecl,
    EnumType,
    EnumMember,
    FunctionDecl,
    TaskDecl,
    TfPortList,
    TfPortItem,
    GenerateRegion,
    GenerateFor,
    GenerateIf,
    GenerateBlock,
    PackageDecl,
    ImportDecl,

    BlockStmt,
    IfStmt,
    ElseClause,
    CaseStmt,
    CaseItem,
    DefaultItem,
    AssignStmt,
    ForStmt,
    ForInit,
    ForStep,
    EventStmt,
    ExprStmt,
    ReturnStmt,
    NullStmt,

    LiteralExpr,
    NameExpr,
    ParenExpr,
    UnaryExpr,
    BinaryExpr,
    TernaryExpr,
    ConcatExpr,
    ReplicateExpr,
    SelectExpr,
    CallExpr,
    ArgList,

    ErrorNode,

    #[doc(hidden)]
    __Last,
}

impl SyntaxKind {
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            Self::Whitespace | Self::LineComment | Self::BlockComment | Self::Directive
        )
    }

    /// Expression node kinds.
    pub fn is_expr(self) -> bool {
        matches!(
            self,
            Self::LiteralExpr
                | Self::NameExpr
                | Self::ParenExpr
                | Self::UnaryExpr
                | Self::BinaryExpr
                | Self::TernaryExpr
                | Self::ConcatExpr
                | Self::ReplicateExpr
                | Self::SelectExpr
                | Self::CallExpr
        )
    }

    /// Procedural statement node kinds.
    pub fn is_stmt(self) -> bool {
        matches!(
            self,
            Self::BlockStmt
                | Self::IfStmt
                | Self::CaseStmt
                | Self::AssignStmt
                | Self::ForStmt
                | Self::EventStmt
                | Self::ExprStmt
                | Self::ReturnStmt
                | Self::NullStmt
        )
    }

    /// Keywords that close a block of items or statements.
    pub fn is_block_end(self) -> bool {
        matches!(
            self,
            Self::EndKw
                | Self::EndcaseKw
                | Self::EndmoduleKw
                | Self::EndfunctionKw
                | Self::EndtaskKw
                | Self::EndgenerateKw
                | Self::EndpackageKw
                | Self::Eof
        )
    }

    /// Keywords that can open a data type.
    pub fn is_type_keyword(self) -> bool {
        matches!(
            self,
            Self::LogicKw
                | Self::WireKw
                | Self::RegKw
                | Self::BitKw
                | Self::ByteKw
                | Self::IntKw
                | Self::IntegerKw
                | Self::GenvarKw
        )
    }

    pub fn is_direction(self) -> bool {
        matches!(self, Self::InputKw | Self::OutputKw | Self::InoutKw)
    }

    /// Human readable name used in parse diagnostics.
    pub fn describe(self) -> String {
        let text = match self {
            Self::Ident => "identifier",
            Self::Semi => "`;`",
            Self::Comma => "`,`",
            Self::Colon => "`:`",
            Self::LParen => "`(`",
            Self::RParen => "`)`",
            Self::LBrack => "`[`",
            Self::RBrack => "`]`",
            Self::LBrace => "`{`",
            Self::RBrace => "`}`",
            Self::Eq => "`=`",
            Self::EndKw => "`end`",
            Self::EndcaseKw => "`endcase`",
            Self::EndmoduleKw => "`endmodule`",
            Self::EndfunctionKw => "`endfunction`",
            Self::EndtaskKw => "`endtask`",
            Self::EndgenerateKw => "`endgenerate`",
            Self::EndpackageKw => "`endpackage`",
            Self::ModuleKw => "`module`",
            Self::Eof => "end of file",
            other => return format!("{other:?}"),
        };
        text.to_string()
    }
}

impl From<SyntaxKind> for rowan::SyntaxKind {
    fn from(kind: SyntaxKind) -> Self {
        Self(kind as u16)
    }
}

/// rowan language tag for the HDL tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HdlLanguage {}

impl rowan::Language for HdlLanguage {
    type Kind = SyntaxKind;

    fn kind_from_raw(raw: rowan::SyntaxKind) -> Self::Kind {
        assert!(raw.0 < SyntaxKind::__Last as u16);
        // SAFETY: SyntaxKind is repr(u16) with contiguous discriminants below __Last.
        unsafe { std::mem::transmute::<u16, SyntaxKind>(raw.0) }
    }

    fn kind_to_raw(kind: Self::Kind) -> rowan::SyntaxKind {
        kind.into()
    }
}

pub type SyntaxNode = rowan::SyntaxNode<HdlLanguage>;
pub type SyntaxToken = rowan::SyntaxToken<HdlLanguage>;
pub type SyntaxElement = rowan::SyntaxElement<HdlLanguage>;

#[cfg(test)]
mod tests {
    use super::*;
    use rowan::Language;

    #[test]
    fn raw_kind_round_trip() {
        for kind in [
            SyntaxKind::Whitespace,
            SyntaxKind::Ident,
            SyntaxKind::MinusMinus,
            SyntaxKind::SourceFile,
            SyntaxKind::ErrorNode,
        ] {
            let raw = HdlLanguage::kind_to_raw(kind);
            assert_eq!(HdlLanguage::kind_from_raw(raw), kind);
        }
    }

    #[test]
    fn classification_is_disjoint() {
        assert!(SyntaxKind::TernaryExpr.is_expr());
        assert!(!SyntaxKind::TernaryExpr.is_stmt());
        assert!(SyntaxKind::IfStmt.is_stmt());
        assert!(!SyntaxKind::IfStmt.is_expr());
        assert!(SyntaxKind::Directive.is_trivia());
        assert!(SyntaxKind::ReturnStmt.is_stmt());
        assert!(SyntaxKind::EndfunctionKw.is_block_end());
        assert!(!SyntaxKind::FunctionDecl.is_stmt());
    }
}
