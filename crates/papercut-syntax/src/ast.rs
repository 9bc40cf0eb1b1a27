//! Typed views over the untyped rowan tree
//!
//! Each wrapper is a zero-cost newtype over a `SyntaxNode` of one kind with
//! accessors for the children the rest of the workspace cares about.

use crate::kinds::{SyntaxKind, SyntaxNode, SyntaxToken};

macro_rules! ast_node {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(SyntaxNode);

        impl $name {
            pub fn cast(node: SyntaxNode) -> Option<Self> {
                (node.kind() == SyntaxKind::$name).then(|| Self(node))
            }

            pub fn syntax(&self) -> &SyntaxNode {
                &self.0
            }
        }
    };
}

ast_node!(Module);
ast_node!(ParamDecl);
ast_node!(PortDecl);
ast_node!(DataDecl);
ast_node!(DataType);
ast_node!(
    /// `typedef <type> name;`
    TypedefDecl
);
ast_node!(EnumType);
ast_node!(EnumMember);
ast_node!(Dimension);
ast_node!(Declarator);
ast_node!(
    /// `if (cond) then [else other]`
    IfStmt
);
ast_node!(CaseStmt);
ast_node!(CaseItem);
ast_node!(
    /// `cond ? a : b`
    TernaryExpr
);
ast_node!(SelectExpr);
ast_node!(BinaryExpr);
ast_node!(UnaryExpr);
ast_node!(CallExpr);
ast_node!(Instantiation);
ast_node!(InstanceItem);
ast_node!(NamedArg);

/// First non-trivia token of `node` among its direct children.
fn first_token(node: &SyntaxNode) -> Option<SyntaxToken> {
    node.children_with_tokens()
        .filter_map(|e| e.into_token())
        .find(|t| !t.kind().is_trivia())
}

fn child_token(node: &SyntaxNode, kind: SyntaxKind) -> Option<SyntaxToken> {
    node.children_with_tokens()
        .filter_map(|e| e.into_token())
        .find(|t| t.kind() == kind)
}

/// Expression children of `node`, in source order.
pub fn expr_children(node: &SyntaxNode) -> impl Iterator<Item = SyntaxNode> {
    node.children().filter(|n| n.kind().is_expr())
}

/// Statement children of `node`, in source order.
pub fn stmt_children(node: &SyntaxNode) -> impl Iterator<Item = SyntaxNode> {
    node.children().filter(|n| n.kind().is_stmt())
}

/// Strip any number of enclosing parentheses.
pub fn unparen(mut node: SyntaxNode) -> SyntaxNode {
    while node.kind() == SyntaxKind::ParenExpr {
        match expr_children(&node).next() {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

/// Concatenated text of the direct name tokens of `node` (`a`, `pkg::a`).
fn name_text(node: &SyntaxNode) -> Option<String> {
    let text: String = node
        .children_with_tokens()
        .filter_map(|e| e.into_token())
        .filter(|t| !t.kind().is_trivia())
        .map(|t| t.text().to_string())
        .collect();
    (!text.is_empty()).then_some(text)
}

/// Identifier text of a `NameExpr`; package-scoped names keep their prefix.
pub fn name_of(node: &SyntaxNode) -> Option<String> {
    if node.kind() != SyntaxKind::NameExpr {
        return None;
    }
    name_text(node)
}

impl Module {
    pub fn name_token(&self) -> Option<SyntaxToken> {
        child_token(&self.0, SyntaxKind::Ident)
    }

    pub fn name(&self) -> Option<String> {
        self.name_token().map(|t| t.text().to_string())
    }

    /// Parameters in declaration order: header `#(...)` first, then body items.
    pub fn params(&self) -> Vec<ParamDecl> {
        let mut params = Vec::new();
        for child in self.0.children() {
            match child.kind() {
                SyntaxKind::ParamPortList => {
                    params.extend(child.children().filter_map(ParamDecl::cast));
                }
                SyntaxKind::ParamDecl => params.extend(ParamDecl::cast(child)),
                _ => {}
            }
        }
        params
    }

    /// Port declarations, whether ANSI-style in the header or in the body.
    pub fn port_decls(&self) -> Vec<PortDecl> {
        let mut ports = Vec::new();
        for child in self.0.children() {
            match child.kind() {
                SyntaxKind::PortList => {
                    ports.extend(child.children().filter_map(PortDecl::cast));
                }
                SyntaxKind::PortDecl => ports.extend(PortDecl::cast(child)),
                _ => {}
            }
        }
        ports
    }

    /// Names listed in the header port list, in order.
    pub fn port_names(&self) -> Vec<String> {
        let Some(list) = self.0.children().find(|n| n.kind() == SyntaxKind::PortList) else {
            return Vec::new();
        };
        let ansi: Vec<PortDecl> = list.children().filter_map(PortDecl::cast).collect();
        if !ansi.is_empty() {
            return ansi
                .iter()
                .flat_map(|p| p.declarators())
                .filter_map(|d| d.name())
                .collect();
        }
        list.children_with_tokens()
            .filter_map(|e| e.into_token())
            .filter(|t| t.kind() == SyntaxKind::Ident)
            .map(|t| t.text().to_string())
            .collect()
    }

    pub fn data_decls(&self) -> impl Iterator<Item = DataDecl> {
        self.0.children().filter_map(DataDecl::cast)
    }

    pub fn instantiations(&self) -> impl Iterator<Item = Instantiation> {
        self.0.children().filter_map(Instantiation::cast)
    }

    pub fn typedefs(&self) -> impl Iterator<Item = TypedefDecl> {
        self.0.children().filter_map(TypedefDecl::cast)
    }
}

impl TypedefDecl {
    pub fn name(&self) -> Option<String> {
        child_token(&self.0, SyntaxKind::Ident).map(|t| t.text().to_string())
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.0.children().find_map(DataType::cast)
    }
}

impl EnumType {
    /// Declared base type; `int` when absent.
    pub fn base(&self) -> Option<DataType> {
        self.0.children().find_map(DataType::cast)
    }

    pub fn members(&self) -> Vec<EnumMember> {
        self.0.children().filter_map(EnumMember::cast).collect()
    }
}

impl EnumMember {
    pub fn name(&self) -> Option<String> {
        child_token(&self.0, SyntaxKind::Ident).map(|t| t.text().to_string())
    }

    pub fn value(&self) -> Option<SyntaxNode> {
        expr_children(&self.0).next()
    }
}

impl ParamDecl {
    pub fn is_local(&self) -> bool {
        child_token(&self.0, SyntaxKind::LocalparamKw).is_some()
    }

    /// True when the declaration carries its own `parameter`/`localparam` keyword.
    pub fn has_keyword(&self) -> bool {
        self.is_local() || child_token(&self.0, SyntaxKind::ParameterKw).is_some()
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.0.children().find_map(DataType::cast)
    }

    pub fn declarators(&self) -> Vec<Declarator> {
        self.0.children().filter_map(Declarator::cast).collect()
    }
}

impl PortDecl {
    pub fn direction(&self) -> Option<SyntaxKind> {
        first_token(&self.0)
            .map(|t| t.kind())
            .filter(|k| k.is_direction())
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.0.children().find_map(DataType::cast)
    }

    pub fn declarators(&self) -> Vec<Declarator> {
        self.0.children().filter_map(Declarator::cast).collect()
    }
}

impl DataDecl {
    pub fn data_type(&self) -> Option<DataType> {
        self.0.children().find_map(DataType::cast)
    }

    pub fn declarators(&self) -> Vec<Declarator> {
        self.0.children().filter_map(Declarator::cast).collect()
    }
}

impl DataType {
    /// The type keyword (`logic`, `int`, ...), if one was written.
    pub fn keyword(&self) -> Option<SyntaxKind> {
        first_token(&self.0)
            .map(|t| t.kind())
            .filter(|k| k.is_type_keyword())
    }

    /// A user-defined type name such as `state_t` or `pkg::word_t`.
    pub fn type_name(&self) -> Option<String> {
        let first = first_token(&self.0)?;
        if first.kind() != SyntaxKind::Ident {
            return None;
        }
        let name: String = self
            .0
            .children_with_tokens()
            .filter_map(|e| e.into_token())
            .filter(|t| matches!(t.kind(), SyntaxKind::Ident | SyntaxKind::ColonColon))
            .map(|t| t.text().to_string())
            .collect();
        Some(name)
    }

    pub fn enum_type(&self) -> Option<EnumType> {
        self.0.children().find_map(EnumType::cast)
    }

    /// No keyword, type name, or range: only a signing, or nothing at all.
    pub fn is_implicit(&self) -> bool {
        self.keyword().is_none()
            && self.type_name().is_none()
            && self.enum_type().is_none()
            && self.dimensions().is_empty()
    }

    pub fn is_signed(&self) -> bool {
        child_token(&self.0, SyntaxKind::SignedKw).is_some()
    }

    pub fn is_unsigned(&self) -> bool {
        child_token(&self.0, SyntaxKind::UnsignedKw).is_some()
    }

    /// Packed dimensions.
    pub fn dimensions(&self) -> Vec<Dimension> {
        self.0.children().filter_map(Dimension::cast).collect()
    }
}

impl Dimension {
    /// `:`, `+:` or `-:`; `None` for a single-expression dimension.
    pub fn separator(&self) -> Option<SyntaxKind> {
        self.0
            .children_with_tokens()
            .filter_map(|e| e.into_token())
            .map(|t| t.kind())
            .find(|k| {
                matches!(
                    k,
                    SyntaxKind::Colon | SyntaxKind::PlusColon | SyntaxKind::MinusColon
                )
            })
    }

    pub fn left(&self) -> Option<SyntaxNode> {
        expr_children(&self.0).next()
    }

    pub fn right(&self) -> Option<SyntaxNode> {
        expr_children(&self.0).nth(1)
    }
}

impl Declarator {
    pub fn name_token(&self) -> Option<SyntaxToken> {
        child_token(&self.0, SyntaxKind::Ident)
    }

    pub fn name(&self) -> Option<String> {
        self.name_token().map(|t| t.text().to_string())
    }

    /// Unpacked dimensions following the name.
    pub fn dimensions(&self) -> Vec<Dimension> {
        self.0.children().filter_map(Dimension::cast).collect()
    }

    pub fn initializer(&self) -> Option<SyntaxNode> {
        expr_children(&self.0).next()
    }
}

impl IfStmt {
    pub fn condition(&self) -> Option<SyntaxNode> {
        expr_children(&self.0).next()
    }

    pub fn then_branch(&self) -> Option<SyntaxNode> {
        stmt_children(&self.0).next()
    }

    pub fn else_branch(&self) -> Option<SyntaxNode> {
        self.0
            .children()
            .find(|n| n.kind() == SyntaxKind::ElseClause)
            .and_then(|clause| stmt_children(&clause).next())
    }
}

impl CaseStmt {
    pub fn selector(&self) -> Option<SyntaxNode> {
        expr_children(&self.0).next()
    }

    /// Non-default items in source order.
    pub fn items(&self) -> Vec<CaseItem> {
        self.0.children().filter_map(CaseItem::cast).collect()
    }

    pub fn default_item(&self) -> Option<SyntaxNode> {
        self.0
            .children()
            .find(|n| n.kind() == SyntaxKind::DefaultItem)
    }
}

impl CaseItem {
    pub fn labels(&self) -> Vec<SyntaxNode> {
        expr_children(&self.0).collect()
    }

    pub fn body(&self) -> Option<SyntaxNode> {
        stmt_children(&self.0).next()
    }
}

impl TernaryExpr {
    pub fn condition(&self) -> Option<SyntaxNode> {
        expr_children(&self.0).next()
    }

    pub fn then_expr(&self) -> Option<SyntaxNode> {
        expr_children(&self.0).nth(1)
    }

    pub fn else_expr(&self) -> Option<SyntaxNode> {
        expr_children(&self.0).nth(2)
    }
}

impl SelectExpr {
    pub fn base(&self) -> Option<SyntaxNode> {
        expr_children(&self.0).next()
    }

    pub fn index(&self) -> Option<SyntaxNode> {
        expr_children(&self.0).nth(1)
    }

    /// Second bound of a range or indexed part select.
    pub fn upper(&self) -> Option<SyntaxNode> {
        expr_children(&self.0).nth(2)
    }

    pub fn separator(&self) -> Option<SyntaxKind> {
        self.0
            .children_with_tokens()
            .filter_map(|e| e.into_token())
            .map(|t| t.kind())
            .find(|k| {
                matches!(
                    k,
                    SyntaxKind::Colon | SyntaxKind::PlusColon | SyntaxKind::MinusColon
                )
            })
    }
}

impl BinaryExpr {
    pub fn lhs(&self) -> Option<SyntaxNode> {
        expr_children(&self.0).next()
    }

    pub fn rhs(&self) -> Option<SyntaxNode> {
        expr_children(&self.0).nth(1)
    }

    pub fn op(&self) -> Option<SyntaxKind> {
        first_token(&self.0).map(|t| t.kind())
    }
}

impl UnaryExpr {
    pub fn op(&self) -> Option<SyntaxKind> {
        first_token(&self.0).map(|t| t.kind())
    }

    pub fn operand(&self) -> Option<SyntaxNode> {
        expr_children(&self.0).next()
    }
}

impl CallExpr {
    pub fn callee(&self) -> Option<String> {
        name_text(&self.0)
    }

    pub fn is_system(&self) -> bool {
        first_token(&self.0).is_some_and(|t| t.kind() == SyntaxKind::SystemIdent)
    }

    pub fn args(&self) -> Vec<SyntaxNode> {
        self.0
            .children()
            .find(|n| n.kind() == SyntaxKind::ArgList)
            .map(|list| expr_children(&list).collect())
            .unwrap_or_default()
    }
}

impl Instantiation {
    /// The instantiated module's name token.
    pub fn module_name_token(&self) -> Option<SyntaxToken> {
        child_token(&self.0, SyntaxKind::Ident)
    }

    pub fn module_name(&self) -> Option<String> {
        self.module_name_token().map(|t| t.text().to_string())
    }

    /// Entries of the `#(...)` list; `NamedArg` or `OrderedArg` nodes.
    pub fn param_values(&self) -> Vec<SyntaxNode> {
        self.0
            .children()
            .find(|n| n.kind() == SyntaxKind::ParamValueList)
            .map(|list| {
                list.children()
                    .filter(|n| matches!(n.kind(), SyntaxKind::NamedArg | SyntaxKind::OrderedArg))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn items(&self) -> Vec<InstanceItem> {
        self.0.children().filter_map(InstanceItem::cast).collect()
    }
}

impl InstanceItem {
    pub fn name(&self) -> Option<String> {
        child_token(&self.0, SyntaxKind::Ident).map(|t| t.text().to_string())
    }

    /// `NamedArg` or `OrderedArg` port connections.
    pub fn connections(&self) -> Vec<SyntaxNode> {
        self.0
            .children()
            .find(|n| n.kind() == SyntaxKind::PortConnectionList)
            .map(|list| {
                list.children()
                    .filter(|n| matches!(n.kind(), SyntaxKind::NamedArg | SyntaxKind::OrderedArg))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl NamedArg {
    /// `None` for the `.*` wildcard.
    pub fn name(&self) -> Option<String> {
        child_token(&self.0, SyntaxKind::Ident).map(|t| t.text().to_string())
    }

    pub fn value(&self) -> Option<SyntaxNode> {
        expr_children(&self.0).next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn module(src: &str) -> Module {
        let root = parse(src).syntax();
        root.descendants()
            .find_map(Module::cast)
            .expect("module in source")
    }

    #[test]
    fn test_module_params_header_then_body() {
        let m = module(
            "module m #(parameter W = 8, D = 2) (input logic [W-1:0] a); localparam int H = W / 2; endmodule",
        );
        let names: Vec<_> = m
            .params()
            .iter()
            .flat_map(|p| p.declarators())
            .filter_map(|d| d.name())
            .collect();
        assert_eq!(names, vec!["W", "D", "H"]);
        assert!(m.params()[2].is_local());
        assert!(!m.params()[1].has_keyword());
        assert_eq!(
            m.params()[2].data_type().and_then(|t| t.keyword()),
            Some(SyntaxKind::IntKw)
        );
    }

    #[test]
    fn test_ports_ansi_and_non_ansi() {
        let ansi = module("module m (input a, output logic [3:0] y); endmodule");
        assert_eq!(ansi.port_names(), vec!["a", "y"]);
        assert_eq!(ansi.port_decls()[1].direction(), Some(SyntaxKind::OutputKw));

        let classic = module("module m (a, y); input a; output [3:0] y; endmodule");
        assert_eq!(classic.port_names(), vec!["a", "y"]);
        assert_eq!(classic.port_decls().len(), 2);
    }

    #[test]
    fn test_if_branches() {
        let m = module("module m; always_comb if (c) y = a; else y = b; endmodule");
        let stmt = m.syntax().descendants().find_map(IfStmt::cast).expect("if");
        assert_eq!(stmt.condition().map(|n| n.text().to_string()).as_deref(), Some("c"));
        assert_eq!(stmt.then_branch().map(|n| n.text().to_string()).as_deref(), Some("y = a;"));
        assert_eq!(stmt.else_branch().map(|n| n.text().to_string()).as_deref(), Some("y = b;"));
    }

    #[test]
    fn test_ternary_operands() {
        let m = module("module m; assign y = s ? (a + 1) : b; endmodule");
        let t = m.syntax().descendants().find_map(TernaryExpr::cast).expect("ternary");
        assert_eq!(t.then_expr().map(|n| n.text().to_string()).as_deref(), Some("(a + 1)"));
        assert_eq!(t.else_expr().map(|n| n.text().to_string()).as_deref(), Some("b"));
        let inner = t.then_expr().map(unparen).map(|n| n.kind());
        assert_eq!(inner, Some(SyntaxKind::BinaryExpr));
    }

    #[test]
    fn test_enum_typedef_accessors() {
        let m = module(
            "module m; typedef enum logic [1:0] {IDLE, RUN = 2'd2} state_t; state_t s; p::word_t w; endmodule",
        );
        let typedef = m.typedefs().next().expect("typedef");
        assert_eq!(typedef.name().as_deref(), Some("state_t"));
        let enum_type = typedef
            .data_type()
            .and_then(|t| t.enum_type())
            .expect("enum");
        let base = enum_type.base().expect("base type");
        assert_eq!(base.keyword(), Some(SyntaxKind::LogicKw));
        let members: Vec<_> = enum_type.members().iter().filter_map(|m| m.name()).collect();
        assert_eq!(members, vec!["IDLE", "RUN"]);
        assert!(enum_type.members()[1].value().is_some());

        let names: Vec<_> = m
            .data_decls()
            .filter_map(|d| d.data_type())
            .filter_map(|t| t.type_name())
            .collect();
        assert_eq!(names, vec!["state_t", "p::word_t"]);
    }

    #[test]
    fn test_scoped_names() {
        let m = module("module m; assign y = p::W + f(a) + p::g(b); endmodule");
        let names: Vec<_> = m.syntax().descendants().filter_map(|n| name_of(&n)).collect();
        assert_eq!(names, vec!["y", "p::W", "a", "b"]);
        let callees: Vec<_> = m
            .syntax()
            .descendants()
            .filter_map(CallExpr::cast)
            .filter_map(|c| c.callee())
            .collect();
        assert_eq!(callees, vec!["f", "p::g"]);
    }

    #[test]
    fn test_instance_accessors() {
        let m = module("module top; sub #(.W(4), 3) u0 (.a(x), y); endmodule");
        let inst = m.instantiations().next().expect("instance");
        assert_eq!(inst.module_name().as_deref(), Some("sub"));
        assert_eq!(inst.param_values().len(), 2);
        let item = &inst.items()[0];
        assert_eq!(item.name().as_deref(), Some("u0"));
        assert_eq!(item.connections().len(), 2);
        let named = NamedArg::cast(item.connections()[0].clone()).expect("named");
        assert_eq!(named.name().as_deref(), Some("a"));
    }
}
