//! Bit-width shrink
//!
//! For internal declarations with a single descending packed range, a use-def
//! pass over the enclosing module finds how many low-order bits are ever
//! written or read. When that is provably fewer than the declared width, the
//! range is narrowed to `[L+k-1:L]`.
//!
//! Anything the pass cannot bound (non-constant whole writes, dynamic selects,
//! concatenation targets or operands, port connections, system calls) makes the
//! declaration unprovable and it is skipped.
//!
//! A whole read is safe only if narrowing the signal cannot change what its
//! expression computes. Narrowing can shrink the width of the context the read
//! sits in, so the context must either be exact at any width or, under an
//! assignment, preserve the low bits the target keeps.

use std::collections::{HashMap, HashSet};

use papercut_syntax::{ast, byte_range, SyntaxKind, SyntaxNode};

use super::StrategyOutput;
use crate::concretize::{operands, Concretized, Operands};
use crate::edit::Edit;
use crate::mutant::Strategy;

/// A declaration that may be narrowed.
struct Candidate {
    decl: ast::DataDecl,
    dim: ast::Dimension,
    lo: i128,
    width: u32,
    names: Vec<String>,
}

#[derive(Debug, Default, Clone)]
struct Usage {
    required: u32,
    written: bool,
    blocker: Option<String>,
}

impl Usage {
    fn block(&mut self, reason: &str) {
        self.blocker.get_or_insert_with(|| reason.to_string());
    }

    fn record(&mut self, access: Access) {
        match access {
            Access::Read(bits) => self.required = self.required.max(bits),
            Access::Write(bits) => {
                self.written = true;
                self.required = self.required.max(bits);
            }
            Access::Unprovable(reason) => self.block(reason),
        }
    }
}

/// Effect of one occurrence of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// Read needing this many low bits
    Read(u32),
    /// Write needing this many low bits
    Write(u32),
    Unprovable(&'static str),
}

pub fn propose(design: &Concretized) -> StrategyOutput {
    let mut out = StrategyOutput::default();
    for module in design.tree().modules() {
        let candidates = collect_candidates(design, &module, &mut out);
        if candidates.is_empty() {
            continue;
        }
        let usages = analyze(design, &module, &candidates);

        for cand in &candidates {
            let node = cand.decl.syntax();
            let mut required = 0;
            let mut verdict: Result<(), String> = Ok(());
            for name in &cand.names {
                let usage = usages.get(name).cloned().unwrap_or_default();
                if let Some(reason) = usage.blocker {
                    verdict = Err(format!("`{name}`: {reason}"));
                    break;
                }
                if !usage.written {
                    verdict = Err(format!("`{name}` is never written"));
                    break;
                }
                required = required.max(usage.required);
            }
            if let Err(reason) = verdict {
                out.skip(design, Strategy::ShrinkBits, node, reason);
                continue;
            }

            let k = required.max(1);
            if k >= cand.width {
                continue;
            }
            let hi = cand.lo + i128::from(k) - 1;
            let edit = Edit::replace(byte_range(cand.dim.syntax()), format!("[{hi}:{}]", cand.lo));
            out.propose(
                design,
                Strategy::ShrinkBits,
                node,
                format!("w{k}"),
                edit,
                format!(
                    "narrowed {} from {} to {k} bits",
                    cand.names.join(", "),
                    cand.width
                ),
            );
        }
    }
    out.finish()
}

fn collect_candidates(
    design: &Concretized,
    module: &ast::Module,
    out: &mut StrategyOutput,
) -> Vec<Candidate> {
    let ports: HashSet<String> = module
        .port_names()
        .into_iter()
        .chain(
            module
                .port_decls()
                .iter()
                .flat_map(|p| p.declarators())
                .filter_map(|d| d.name()),
        )
        .collect();

    let mut candidates = Vec::new();
    for decl in module.data_decls() {
        let node = decl.syntax();
        let Some(ty) = decl.data_type() else { continue };
        if !matches!(
            ty.keyword(),
            Some(SyntaxKind::LogicKw | SyntaxKind::RegKw | SyntaxKind::BitKw | SyntaxKind::WireKw)
        ) {
            continue;
        }
        let dims = ty.dimensions();
        if dims.is_empty() {
            continue;
        }
        let declarators = decl.declarators();
        let names: Vec<String> = declarators.iter().filter_map(|d| d.name()).collect();
        if names.iter().any(|n| ports.contains(n)) {
            continue;
        }

        let reason = if ty.is_signed() {
            Some("signed declaration")
        } else if dims.len() > 1 {
            Some("multiple packed dimensions")
        } else if declarators.iter().any(|d| !d.dimensions().is_empty()) {
            Some("unpacked dimensions")
        } else {
            None
        };
        if let Some(reason) = reason {
            out.skip(design, Strategy::ShrinkBits, node, reason);
            continue;
        }

        let dim = dims[0].clone();
        let bounds = (dim.separator() == Some(SyntaxKind::Colon))
            .then(|| {
                let hi = design.literal(&dim.left()?)?.to_i128()?;
                let lo = design.literal(&dim.right()?)?.to_i128()?;
                Some((hi, lo))
            })
            .flatten();
        let Some((hi, lo)) = bounds else {
            out.skip(design, Strategy::ShrinkBits, node, "range bounds are not constant");
            continue;
        };
        if hi < lo {
            out.skip(design, Strategy::ShrinkBits, node, "ascending range");
            continue;
        }
        let Ok(width) = u32::try_from(hi - lo + 1) else { continue };
        if width <= 1 {
            continue;
        }
        candidates.push(Candidate {
            decl,
            dim,
            lo,
            width,
            names,
        });
    }
    candidates
}

/// Walk every use of every candidate name in `module`.
fn analyze(
    design: &Concretized,
    module: &ast::Module,
    candidates: &[Candidate],
) -> HashMap<String, Usage> {
    let by_name: HashMap<&str, &Candidate> = candidates
        .iter()
        .flat_map(|c| c.names.iter().map(move |n| (n.as_str(), c)))
        .collect();
    let mut usages: HashMap<String, Usage> = HashMap::new();

    // Declaration initialisers are writes
    for cand in candidates {
        for declarator in cand.decl.declarators() {
            let (Some(name), Some(init)) = (declarator.name(), declarator.initializer()) else {
                continue;
            };
            let access = literal_write(design, &init, cand.width)
                .unwrap_or(Access::Unprovable("non-constant initializer"));
            usages.entry(name).or_default().record(access);
        }
    }

    for node in module.syntax().descendants() {
        match node.kind() {
            SyntaxKind::NameExpr => {
                let Some(name) = ast::name_of(&node) else { continue };
                let Some(cand) = by_name.get(name.as_str()) else { continue };
                let access = classify(design, &node, cand);
                usages.entry(name).or_default().record(access);
            }
            SyntaxKind::NamedArg => {
                let Some(arg) = ast::NamedArg::cast(node.clone()) else { continue };
                let in_ports = node
                    .parent()
                    .is_some_and(|p| p.kind() == SyntaxKind::PortConnectionList);
                if !in_ports || arg.value().is_some() {
                    continue;
                }
                match arg.name() {
                    // `.name` connects the signal of the same name
                    Some(name) if by_name.contains_key(name.as_str()) => {
                        usages
                            .entry(name)
                            .or_default()
                            .block("instance port connection");
                    }
                    Some(_) => {}
                    None => {
                        for name in by_name.keys() {
                            usages
                                .entry((*name).to_string())
                                .or_default()
                                .block("wildcard port connection");
                        }
                    }
                }
            }
            SyntaxKind::ForStep => {
                let stepped = node
                    .children_with_tokens()
                    .filter_map(|e| e.into_token())
                    .find(|t| t.kind() == SyntaxKind::Ident);
                if let Some(token) = stepped {
                    if by_name.contains_key(token.text()) {
                        usages
                            .entry(token.text().to_string())
                            .or_default()
                            .block("increment");
                    }
                }
            }
            _ => {}
        }
    }
    usages
}

/// A whole write of a constant needs the bit length of the value as stored.
///
/// A right-hand side narrower than the target is evaluated at the target's
/// width, so after narrowing it must still produce the same low bits.
fn literal_write(design: &Concretized, rhs: &SyntaxNode, width: u32) -> Option<Access> {
    let value = design.literal(rhs)?.resize(width)?;
    let own = design.expr_type(rhs).map_or(0, |t| t.width);
    if own < width && !Narrowing::of_tree(vec![rhs.clone()]).low_bits {
        return Some(Access::Unprovable("width-sensitive write"));
    }
    Some(Access::Write(value.bit_length()))
}

/// Low bits needed by a constant select, relative to the range's low bound.
fn select_bits(design: &Concretized, select: &ast::SelectExpr, lo: i128) -> Option<u32> {
    let index = design.literal(&select.index()?)?.to_i128()?;
    let top = match select.separator() {
        None | Some(SyntaxKind::MinusColon) => index,
        Some(SyntaxKind::Colon) => index.max(design.literal(&select.upper()?)?.to_i128()?),
        Some(_) => index + design.literal(&select.upper()?)?.to_i128()? - 1,
    };
    u32::try_from((top - lo + 1).max(0)).ok()
}

fn is_reduction(node: &SyntaxNode) -> bool {
    ast::UnaryExpr::cast(node.clone())
        .and_then(|u| u.op())
        .is_some_and(|op| {
            matches!(
                op,
                SyntaxKind::Amp
                    | SyntaxKind::Pipe
                    | SyntaxKind::Caret
                    | SyntaxKind::TildeAmp
                    | SyntaxKind::TildePipe
                    | SyntaxKind::TildeCaret
            )
        })
}

/// Classify one `NameExpr` occurrence of a candidate signal.
fn classify(design: &Concretized, name: &SyntaxNode, cand: &Candidate) -> Access {
    // A constant select narrows the access to the selected bits
    let (outer, partial) = match name.parent().and_then(ast::SelectExpr::cast) {
        Some(select) if select.base().as_ref() == Some(name) => {
            match select_bits(design, &select, cand.lo) {
                Some(bits) => (select.syntax().clone(), Some(bits)),
                None => return Access::Unprovable("dynamic select"),
            }
        }
        _ => (name.clone(), None),
    };

    // Climb to the first node that is not part of an expression
    let mut child = outer.clone();
    let mut in_concat = false;
    let mut container = None;
    for ancestor in outer.ancestors().skip(1) {
        let kind = ancestor.kind();
        match kind {
            SyntaxKind::ConcatExpr | SyntaxKind::ReplicateExpr => in_concat = true,
            SyntaxKind::UnaryExpr if partial.is_none() && is_reduction(&ancestor) => {
                return Access::Unprovable("reduction operand");
            }
            SyntaxKind::CallExpr => {
                let call = ast::CallExpr::cast(ancestor.clone());
                if call.as_ref().is_some_and(ast::CallExpr::is_system) {
                    return Access::Unprovable("system call argument");
                }
                if ancestor
                    .parent()
                    .is_some_and(|p| p.kind() == SyntaxKind::ExprStmt)
                {
                    return Access::Unprovable("task argument");
                }
            }
            _ => {}
        }
        if kind.is_expr() || kind == SyntaxKind::ArgList {
            child = ancestor;
            continue;
        }
        container = Some(ancestor);
        break;
    }
    let Some(container) = container else {
        return match partial {
            Some(bits) => Access::Read(bits),
            None => whole_read(&outer),
        };
    };

    match container.kind() {
        SyntaxKind::AssignStmt | SyntaxKind::Assignment => {
            let lhs = ast::expr_children(&container).next();
            if lhs.as_ref() == Some(&child) {
                if in_concat {
                    return Access::Unprovable("concatenation target");
                }
                if child != outer {
                    return Access::Unprovable("unrecognised assignment target");
                }
                return match partial {
                    Some(bits) => Access::Write(bits),
                    None => ast::expr_children(&container)
                        .nth(1)
                        .and_then(|rhs| literal_write(design, &rhs, cand.width))
                        .unwrap_or(Access::Unprovable("non-constant write")),
                };
            }
        }
        SyntaxKind::NamedArg | SyntaxKind::OrderedArg
            if container
                .parent()
                .is_some_and(|p| p.kind() == SyntaxKind::PortConnectionList) =>
        {
            return Access::Unprovable("instance port connection");
        }
        _ => {}
    }

    match partial {
        Some(bits) => Access::Read(bits),
        None if in_concat => Access::Unprovable("concatenation operand"),
        None => whole_read(&outer),
    }
}

/// Children of `node` evaluated at `node`'s own context width.
fn context_children(node: &SyntaxNode) -> Vec<SyntaxNode> {
    let kids: Vec<SyntaxNode> = ast::expr_children(node).collect();
    match node.kind() {
        SyntaxKind::ParenExpr => kids,
        SyntaxKind::UnaryExpr => {
            let op = ast::UnaryExpr::cast(node.clone()).and_then(|u| u.op());
            match op {
                Some(SyntaxKind::Plus | SyntaxKind::Minus | SyntaxKind::Tilde) => kids,
                _ => Vec::new(),
            }
        }
        SyntaxKind::BinaryExpr => {
            let op = ast::BinaryExpr::cast(node.clone()).and_then(|b| b.op());
            match op.and_then(operands) {
                Some(Operands::Context) => kids,
                Some(Operands::LeftContext) => kids.into_iter().take(1).collect(),
                _ => Vec::new(),
            }
        }
        SyntaxKind::TernaryExpr => kids.into_iter().skip(1).collect(),
        _ => Vec::new(),
    }
}

/// How a node's result behaves when its context gets narrower while every
/// leaf keeps its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Narrowing {
    /// The value is unchanged
    exact: bool,
    /// The low bits, up to the narrower width, are unchanged
    low_bits: bool,
}

impl Narrowing {
    const BOTH: Self = Self {
        exact: true,
        low_bits: true,
    };
    const EXACT: Self = Self {
        exact: true,
        low_bits: false,
    };
    const LOW_BITS: Self = Self {
        exact: false,
        low_bits: true,
    };

    fn of(node: &SyntaxNode) -> Self {
        use SyntaxKind as K;
        match node.kind() {
            K::UnaryExpr => match ast::UnaryExpr::cast(node.clone()).and_then(|u| u.op()) {
                Some(K::Minus | K::Tilde) => Self::LOW_BITS,
                _ => Self::BOTH,
            },
            K::BinaryExpr => match ast::BinaryExpr::cast(node.clone()).and_then(|b| b.op()) {
                Some(K::Slash | K::Percent | K::Shr | K::AShr) => Self::EXACT,
                Some(K::Plus | K::Minus | K::Star | K::TildeCaret | K::Shl | K::AShl | K::StarStar) => {
                    Self::LOW_BITS
                }
                _ => Self::BOTH,
            },
            // `'1`, `'x` and `'z` fill whatever width they are given
            K::LiteralExpr => {
                let fill = node
                    .first_token()
                    .is_some_and(|t| t.text().len() == 2 && t.text().starts_with('\'') && t.text() != "'0");
                if fill {
                    Self::LOW_BITS
                } else {
                    Self::BOTH
                }
            }
            _ => Self::BOTH,
        }
    }

    /// Combined behaviour of every node sharing a context with `roots`.
    fn of_tree(roots: Vec<SyntaxNode>) -> Self {
        let mut combined = Self::BOTH;
        let mut pending = roots;
        while let Some(node) = pending.pop() {
            let narrowing = Self::of(&node);
            combined.exact &= narrowing.exact;
            combined.low_bits &= narrowing.low_bits;
            pending.extend(context_children(&node));
        }
        combined
    }
}

/// Whether narrowing the signal read whole at `read` leaves every expression
/// it feeds unchanged.
fn whole_read(read: &SyntaxNode) -> Access {
    use SyntaxKind as K;
    // Climb to the largest expression sharing the read's context width
    let mut top = read.clone();
    while let Some(parent) = top.parent() {
        if !context_children(&parent).contains(&top) {
            break;
        }
        top = parent;
    }
    let Some(stop) = top.parent() else {
        return Access::Read(0);
    };

    let mut low_bits_suffice = false;
    let roots: Vec<SyntaxNode> = match stop.kind() {
        // Comparison operands are sized to each other
        K::BinaryExpr
            if ast::BinaryExpr::cast(stop.clone())
                .and_then(|b| b.op())
                .and_then(operands)
                == Some(Operands::Compared) =>
        {
            ast::expr_children(&stop).collect()
        }
        K::CaseStmt | K::CaseItem => {
            let stmt = match stop.kind() {
                K::CaseItem => stop.parent(),
                _ => Some(stop.clone()),
            };
            match stmt.and_then(ast::CaseStmt::cast) {
                Some(stmt) => stmt
                    .selector()
                    .into_iter()
                    .chain(stmt.items().iter().flat_map(|i| i.labels()))
                    .collect(),
                None => return Access::Unprovable("width-sensitive read"),
            }
        }
        K::AssignStmt | K::Assignment => {
            low_bits_suffice = ast::expr_children(&stop).nth(1).as_ref() == Some(&top);
            vec![top]
        }
        K::Declarator => {
            low_bits_suffice = true;
            vec![top]
        }
        _ => vec![top],
    };

    let Narrowing { exact, low_bits } = Narrowing::of_tree(roots);
    if exact || (low_bits && low_bits_suffice) {
        Access::Read(0)
    } else {
        Access::Unprovable("width-sensitive read")
    }
}
