//! Constant concretization
//!
//! Resolves every parameter to a literal where possible and annotates every
//! constant expression in the tree with its value. Parameter resolution is a
//! topological fold over `(module, parameter)` nodes: edges come from
//! identifiers in default values and declared types, and from parameter
//! assignments at instantiation sites in the same file.
//!
//! Expressions are folded the way Verilog sizes them. A first pass computes
//! each operand's self-determined type; the second evaluates context-determined
//! operands at the type of the whole expression, which for an assignment
//! includes its target. Where that type cannot be known, context-determined
//! constants stay symbolic.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use papercut_syntax::ast::{self, DataType};
use papercut_syntax::{SyntaxKind, SyntaxNode, SyntaxTree, WalkEvent};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::edit::{Edit, EditSet};
use crate::error::{ConcretizationError, PapercutResult};
use crate::value::{self, literal_type, parse_literal, BinaryOp, BitVector, UnaryOp, ValueType};

/// Result of folding an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConcretizedValue {
    Literal(BitVector),
    Symbolic,
}

impl ConcretizedValue {
    pub fn literal(self) -> Option<BitVector> {
        match self {
            Self::Literal(v) => Some(v),
            Self::Symbolic => None,
        }
    }
}

impl From<Option<BitVector>> for ConcretizedValue {
    fn from(value: Option<BitVector>) -> Self {
        value.map_or(Self::Symbolic, Self::Literal)
    }
}

impl fmt::Display for ConcretizedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => write!(f, "{v}"),
            Self::Symbolic => f.write_str("<symbolic>"),
        }
    }
}

/// A `NAME=VALUE` parameter override for the top module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamOverride {
    pub name: String,
    pub value: String,
}

impl FromStr for ParamOverride {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=VALUE, got `{s}`"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("missing parameter name in `{s}`"));
        }
        Ok(Self {
            name: name.to_string(),
            value: value.trim().to_string(),
        })
    }
}

/// A resolved parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamInfo {
    pub module: String,
    pub name: String,
    pub local: bool,
    pub value: ConcretizedValue,
}

/// A folded expression. `value` has the type the expression's context gives
/// it; `spelling` is a literal that can replace the expression in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Folded {
    value: BitVector,
    spelling: BitVector,
}

/// A parsed tree annotated with constant values.
#[derive(Debug, Clone)]
pub struct Concretized {
    tree: SyntaxTree,
    top: ast::Module,
    params: Vec<ParamInfo>,
    scopes: Scopes,
    values: HashMap<SyntaxNode, Folded>,
}

impl Concretized {
    pub fn tree(&self) -> &SyntaxTree {
        &self.tree
    }

    pub fn source(&self) -> &str {
        self.tree.text()
    }

    /// The module treated as the design top.
    pub fn top(&self) -> &ast::Module {
        &self.top
    }

    pub fn top_name(&self) -> String {
        self.top.name().unwrap_or_default()
    }

    /// Value of an expression node at the type its context gives it;
    /// non-constants are `Symbolic`.
    pub fn value(&self, node: &SyntaxNode) -> ConcretizedValue {
        self.literal(node).into()
    }

    pub fn literal(&self, node: &SyntaxNode) -> Option<BitVector> {
        self.values.get(node).map(|f| f.value)
    }

    /// Parameters of `module` in declaration order.
    pub fn params_of<'a>(&'a self, module: &'a str) -> impl Iterator<Item = &'a ParamInfo> + 'a {
        self.params.iter().filter(move |p| p.module == module)
    }

    pub fn param(&self, module: &str, name: &str) -> ConcretizedValue {
        self.params
            .iter()
            .find(|p| p.module == module && p.name == name)
            .map_or(ConcretizedValue::Symbolic, |p| p.value)
    }

    /// Declared type of a signal of `module`. `None` for arrays, names
    /// declared twice with different types, and types that do not fold.
    pub fn signal_type(&self, module: &str, name: &str) -> Option<ValueType> {
        self.scopes
            .signals
            .get(module)
            .and_then(|s| s.get(name))
            .map(|s| s.ty)
    }

    /// Self-determined type of an expression node.
    pub fn expr_type(&self, node: &SyntaxNode) -> Option<ValueType> {
        let module = node.ancestors().find_map(ast::Module::cast)?.name()?;
        Folder {
            params: &self.params,
            module: &module,
            scopes: Some(&self.scopes),
            memo: None,
        }
        .self_type(node)
    }

    /// Edits replacing every maximal constant expression that is not already a
    /// single literal with its folded literal text.
    pub fn concretization_edits(&self) -> Vec<Edit> {
        let mut edits = Vec::new();
        let mut preorder = self.tree.root().preorder();
        while let Some(event) = preorder.next() {
            let WalkEvent::Enter(node) = event else {
                continue;
            };
            if !node.kind().is_expr() {
                continue;
            }
            let Some(folded) = self.values.get(&node) else {
                continue;
            };
            preorder.skip_subtree();
            if node.kind() != SyntaxKind::LiteralExpr {
                edits.push(Edit::replace(
                    papercut_syntax::byte_range(&node),
                    folded.spelling.to_verilog(),
                ));
            }
        }
        edits
    }

    /// The source with every constant expression folded, for inspection.
    pub fn render_concretized(&self) -> PapercutResult<String> {
        let set = EditSet::new(self.concretization_edits())?;
        Ok(set.apply(self.source())?)
    }
}

/// Fold constants in `tree`, applying `overrides` to the top module.
///
/// `top` selects the top module by name; by default it is the first module.
pub fn concretize(
    tree: &SyntaxTree,
    top: Option<&str>,
    overrides: &[ParamOverride],
) -> Result<Concretized, ConcretizationError> {
    let top = match top {
        Some(name) => tree
            .module(name)
            .ok_or_else(|| ConcretizationError::UnknownTop(name.to_string()))?,
        None => tree.modules().next().ok_or(ConcretizationError::NoModules)?,
    };
    let top_name = top.name().unwrap_or_default();

    let graph = ParamGraph::build(tree);
    let override_values = graph.check_overrides(&top_name, overrides)?;
    let params = graph.resolve(&override_values)?;
    let scopes = graph.scopes(tree, &params);

    let mut values = HashMap::new();
    for module in tree.modules() {
        let Some(name) = module.name() else { continue };
        let mut folder = Folder {
            params: &params,
            module: &name,
            scopes: Some(&scopes),
            memo: Some(&mut values),
        };
        for node in module.syntax().descendants() {
            if is_root_expr(&node) {
                folder.fold(&node);
            }
        }
    }
    debug!(
        top = %top_name,
        params = params.len(),
        constants = values.len(),
        "concretized design"
    );

    Ok(Concretized {
        tree: tree.clone(),
        top,
        params,
        scopes,
        values,
    })
}

/// An expression whose parent is not itself part of an expression.
fn is_root_expr(node: &SyntaxNode) -> bool {
    node.kind().is_expr()
        && node.parent().map_or(true, |p| {
            !p.kind().is_expr() && p.kind() != SyntaxKind::ArgList
        })
}

/// Identifier names referenced anywhere under `node`.
fn referenced_names(node: &SyntaxNode) -> impl Iterator<Item = String> {
    node.descendants().filter_map(|n| ast::name_of(&n))
}

/// Typedefs visible in each module: file-level ones, then the module's own.
fn collect_typedefs(tree: &SyntaxTree) -> HashMap<String, HashMap<String, DataType>> {
    let global: HashMap<String, DataType> = tree
        .root()
        .children()
        .filter_map(ast::TypedefDecl::cast)
        .filter_map(|t| Some((t.name()?, t.data_type()?)))
        .collect();
    tree.modules()
        .filter_map(|module| {
            let mut visible = global.clone();
            visible.extend(
                module
                    .typedefs()
                    .filter_map(|t| Some((t.name()?, t.data_type()?))),
            );
            Some((module.name()?, visible))
        })
        .collect()
}

/// Folded type of a declaration. `flat` is false when a single index selects
/// more than one bit (multiple packed dimensions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SignalType {
    ty: ValueType,
    flat: bool,
}

/// How a parameter's declaration constrains its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamType {
    /// The value keeps the type of its expression
    Untyped,
    /// `parameter signed P`
    Signing(bool),
    Typed(ValueType),
    /// A type that does not fold, or an enum
    Unknown,
}

/// Type names and parameters visible in one module.
struct TypeEnv<'a> {
    module: &'a str,
    params: &'a [ParamInfo],
    typedefs: Option<&'a HashMap<String, DataType>>,
}

impl TypeEnv<'_> {
    const MAX_TYPEDEF_DEPTH: u8 = 16;

    /// Type of a declaration; no data type at all means a single bit.
    fn signal_type(&self, ty: Option<&DataType>) -> Option<SignalType> {
        match ty {
            Some(ty) => self.resolve(ty, 0),
            None => Some(SignalType {
                ty: ValueType::BIT,
                flat: true,
            }),
        }
    }

    fn resolve(&self, ty: &DataType, depth: u8) -> Option<SignalType> {
        use SyntaxKind as K;
        if depth > Self::MAX_TYPEDEF_DEPTH {
            return None;
        }
        let unsigned = ty.is_unsigned();
        let base = if let Some(enum_type) = ty.enum_type() {
            match enum_type.base() {
                Some(base) => self.resolve(&base, depth + 1)?,
                None => SignalType {
                    ty: ValueType::INT,
                    flat: true,
                },
            }
        } else if let Some(name) = ty.type_name() {
            self.resolve(self.typedefs?.get(&name)?, depth + 1)?
        } else {
            let ty = match ty.keyword() {
                Some(K::IntKw | K::IntegerKw | K::GenvarKw) => ValueType::new(32, !unsigned),
                Some(K::ByteKw) => ValueType::new(8, !unsigned),
                _ => ValueType::new(1, ty.is_signed()),
            };
            SignalType { ty, flat: true }
        };

        let dims = ty.dimensions();
        if dims.is_empty() {
            return Some(base);
        }
        let mut width = base.ty.width;
        for dim in &dims {
            width = width.checked_mul(packed_width(dim, self.module, self.params)?)?;
        }
        Some(SignalType {
            ty: ValueType::new(width, ty.is_signed()),
            flat: base.flat && base.ty.width == 1 && dims.len() == 1,
        })
    }

    /// Whether `ty` names an enum, directly or through typedefs.
    fn is_enum(&self, ty: &DataType) -> bool {
        let mut ty = ty.clone();
        for _ in 0..Self::MAX_TYPEDEF_DEPTH {
            if ty.enum_type().is_some() {
                return true;
            }
            let next = ty
                .type_name()
                .and_then(|name| self.typedefs.and_then(|t| t.get(&name)));
            match next {
                Some(next) => ty = next.clone(),
                None => return false,
            }
        }
        false
    }
}

/// Declared types of one module's signals. A `None` entry marks a name whose
/// type is unknown: an unpacked array, or declarations that disagree.
#[derive(Debug, Clone, Default)]
struct Signals(HashMap<String, Option<SignalType>>);

impl Signals {
    fn collect(module: &ast::Module, env: &TypeEnv<'_>) -> Self {
        use SyntaxKind as K;
        // Name -> (type, declared only by a port declaration with no type)
        let mut entries: HashMap<String, (Option<SignalType>, bool)> = HashMap::new();
        let mut previous_ansi: Option<Option<DataType>> = None;

        for node in module.syntax().descendants() {
            let (data_type, declarators, implicit_port) = match node.kind() {
                K::PortDecl => {
                    let Some(decl) = ast::PortDecl::cast(node.clone()) else { continue };
                    let mut data_type = decl.data_type();
                    let ansi = node.parent().is_some_and(|p| p.kind() == K::PortList);
                    if ansi {
                        if decl.direction().is_none() && data_type.is_none() {
                            data_type = previous_ansi.clone().flatten();
                        }
                        previous_ansi = Some(data_type.clone());
                    }
                    let implicit = !ansi && data_type.as_ref().map_or(true, DataType::is_implicit);
                    (data_type, decl.declarators(), implicit)
                }
                K::DataDecl => {
                    let Some(decl) = ast::DataDecl::cast(node.clone()) else { continue };
                    (decl.data_type(), decl.declarators(), false)
                }
                K::TfPortItem => (
                    node.children().find_map(DataType::cast),
                    node.children().filter_map(ast::Declarator::cast).collect(),
                    false,
                ),
                _ => continue,
            };

            let resolved = env.signal_type(data_type.as_ref());
            for declarator in declarators {
                let Some(name) = declarator.name() else { continue };
                let ty = resolved.filter(|_| declarator.dimensions().is_empty());
                match entries.entry(name) {
                    Entry::Vacant(slot) => {
                        slot.insert((ty, implicit_port));
                    }
                    Entry::Occupied(mut slot) => {
                        let (prev, prev_implicit) = *slot.get();
                        let merged = if prev_implicit {
                            ty
                        } else if implicit_port || prev == ty {
                            prev
                        } else {
                            None
                        };
                        slot.insert((merged, prev_implicit && implicit_port));
                    }
                }
            }
        }
        Self(entries.into_iter().map(|(name, (ty, _))| (name, ty)).collect())
    }

    fn get(&self, name: &str) -> Option<SignalType> {
        self.0.get(name).copied().flatten()
    }
}

/// Declared types of every module in the file, once parameters are known.
#[derive(Debug, Clone, Default)]
struct Scopes {
    signals: HashMap<String, Signals>,
    typedefs: HashMap<String, HashMap<String, DataType>>,
    /// Header port names, in order
    ports: HashMap<String, Vec<String>>,
    /// Overridable parameter names, in order
    overridable: HashMap<String, Vec<String>>,
    param_types: HashMap<(String, String), ParamType>,
}

struct ParamNode {
    module: String,
    name: String,
    local: bool,
    /// Position among the module's overridable parameters
    ordinal: Option<usize>,
    default: Option<SyntaxNode>,
    ty: Option<DataType>,
}

/// One instantiation of a module defined in this file.
struct Site {
    parent: String,
    assignments: HashMap<String, SyntaxNode>,
}

struct ParamGraph {
    nodes: Vec<ParamNode>,
    index: HashMap<(String, String), usize>,
    sites: HashMap<String, Vec<Site>>,
    typedefs: HashMap<String, HashMap<String, DataType>>,
}

impl ParamGraph {
    fn build(tree: &SyntaxTree) -> Self {
        let mut nodes = Vec::new();
        let mut index = HashMap::new();

        for module in tree.modules() {
            let Some(module_name) = module.name() else { continue };
            let has_header = module
                .syntax()
                .children()
                .any(|n| n.kind() == SyntaxKind::ParamPortList);
            let mut inherited: (Option<DataType>, bool) = (None, false);
            let mut ordinal = 0;

            for decl in module.params() {
                let in_header = decl
                    .syntax()
                    .parent()
                    .is_some_and(|p| p.kind() == SyntaxKind::ParamPortList);
                let (ty, mut local) =
                    if in_header && !decl.has_keyword() && decl.data_type().is_none() {
                        inherited.clone()
                    } else {
                        (decl.data_type(), decl.is_local())
                    };
                if in_header {
                    inherited = (ty.clone(), local);
                } else if has_header {
                    // Body parameters of a module with a parameter port list are local
                    local = true;
                }

                for declarator in decl.declarators() {
                    let Some(name) = declarator.name() else { continue };
                    let node_ordinal = (!local).then(|| {
                        ordinal += 1;
                        ordinal - 1
                    });
                    index.insert((module_name.clone(), name.clone()), nodes.len());
                    nodes.push(ParamNode {
                        module: module_name.clone(),
                        name,
                        local,
                        ordinal: node_ordinal,
                        default: declarator.initializer(),
                        ty: ty.clone(),
                    });
                }
            }
        }

        let mut sites: HashMap<String, Vec<Site>> = HashMap::new();
        for module in tree.modules() {
            let Some(parent) = module.name() else { continue };
            for inst in module.instantiations() {
                let Some(child) = inst.module_name() else { continue };
                if tree.module(&child).is_none() {
                    continue;
                }
                let overridable: Vec<&ParamNode> = nodes
                    .iter()
                    .filter(|n| n.module == child && n.ordinal.is_some())
                    .collect();
                let mut assignments = HashMap::new();
                let mut position = 0;
                for arg in inst.param_values() {
                    if let Some(named) = ast::NamedArg::cast(arg.clone()) {
                        if let (Some(name), Some(value)) = (named.name(), named.value()) {
                            assignments.insert(name, value);
                        }
                    } else if let Some(value) = ast::expr_children(&arg).next() {
                        if let Some(target) = overridable.get(position) {
                            assignments.insert(target.name.clone(), value);
                        }
                        position += 1;
                    }
                }
                sites.entry(child).or_default().push(Site {
                    parent: parent.clone(),
                    assignments,
                });
            }
        }

        Self {
            nodes,
            index,
            sites,
            typedefs: collect_typedefs(tree),
        }
    }

    /// Parse overrides that target real, overridable top-level parameters.
    fn check_overrides(
        &self,
        top: &str,
        overrides: &[ParamOverride],
    ) -> Result<HashMap<usize, BitVector>, ConcretizationError> {
        let mut out = HashMap::new();
        for ov in overrides {
            let value = parse_literal(&ov.value).ok_or_else(|| {
                ConcretizationError::InvalidOverride {
                    name: ov.name.clone(),
                    value: ov.value.clone(),
                }
            })?;
            match self.index.get(&(top.to_string(), ov.name.clone())) {
                Some(&idx) if !self.nodes[idx].local => {
                    out.insert(idx, value);
                }
                Some(_) => warn!(param = %ov.name, "ignoring override of local parameter"),
                None => warn!(param = %ov.name, module = %top, "ignoring override of unknown parameter"),
            }
        }
        Ok(out)
    }

    fn dependencies(&self, idx: usize) -> BTreeSet<usize> {
        let node = &self.nodes[idx];
        let mut deps = BTreeSet::new();
        let mut add = |module: &str, expr: &SyntaxNode| {
            for name in referenced_names(expr) {
                if let Some(&dep) = self.index.get(&(module.to_string(), name)) {
                    deps.insert(dep);
                }
            }
        };
        if let Some(default) = &node.default {
            add(&node.module, default);
        }
        if let Some(ty) = &node.ty {
            for syntax in self.type_syntax(&node.module, ty) {
                add(&node.module, &syntax);
            }
        }
        if !node.local {
            for site in self.sites.get(&node.module).into_iter().flatten() {
                if let Some(expr) = site.assignments.get(&node.name) {
                    add(&site.parent, expr);
                }
            }
        }
        deps
    }

    /// `ty` and the typedefs it names, transitively.
    fn type_syntax(&self, module: &str, ty: &DataType) -> Vec<SyntaxNode> {
        let mut out = vec![ty.syntax().clone()];
        let mut seen = HashSet::new();
        let mut current = ty.clone();
        while let Some(name) = current.type_name() {
            if !seen.insert(name.clone()) {
                break;
            }
            let Some(next) = self.typedefs.get(module).and_then(|t| t.get(&name)) else {
                break;
            };
            out.push(next.syntax().clone());
            current = next.clone();
        }
        out
    }

    fn label(&self, idx: usize) -> String {
        format!("{}.{}", self.nodes[idx].module, self.nodes[idx].name)
    }

    /// Kahn's algorithm over the dependency graph, folding each parameter once
    /// all of its dependencies are known.
    fn resolve(
        &self,
        overrides: &HashMap<usize, BitVector>,
    ) -> Result<Vec<ParamInfo>, ConcretizationError> {
        let n = self.nodes.len();
        let deps: Vec<BTreeSet<usize>> = (0..n).map(|i| self.dependencies(i)).collect();
        let mut dependents = vec![Vec::new(); n];
        let mut pending: Vec<usize> = deps.iter().map(BTreeSet::len).collect();
        for (idx, set) in deps.iter().enumerate() {
            for &dep in set {
                dependents[dep].push(idx);
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
        let mut resolved: Vec<Option<ConcretizedValue>> = vec![None; n];
        let mut done = 0;

        while let Some(idx) = ready.pop_first() {
            let value = self.fold_param(idx, overrides, &resolved);
            resolved[idx] = Some(value);
            done += 1;
            for &next in &dependents[idx] {
                pending[next] -= 1;
                if pending[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if done < n {
            return Err(ConcretizationError::Cycle {
                params: self.find_cycle(&deps, &resolved),
            });
        }

        Ok(self
            .nodes
            .iter()
            .zip(resolved)
            .map(|(node, value)| ParamInfo {
                module: node.module.clone(),
                name: node.name.clone(),
                local: node.local,
                value: value.unwrap_or(ConcretizedValue::Symbolic),
            })
            .collect())
    }

    /// Walk unresolved dependencies until a node repeats.
    fn find_cycle(
        &self,
        deps: &[BTreeSet<usize>],
        resolved: &[Option<ConcretizedValue>],
    ) -> Vec<String> {
        let Some(start) = resolved.iter().position(Option::is_none) else {
            return Vec::new();
        };
        let mut path = vec![start];
        let mut seen = HashSet::from([start]);
        let mut current = start;
        loop {
            let Some(&next) = deps[current].iter().find(|&&d| resolved[d].is_none()) else {
                break;
            };
            if !seen.insert(next) {
                let from = path.iter().position(|&p| p == next).unwrap_or(0);
                let mut cycle: Vec<String> = path[from..].iter().map(|&i| self.label(i)).collect();
                cycle.push(self.label(next));
                return cycle;
            }
            path.push(next);
            current = next;
        }
        path.iter().map(|&i| self.label(i)).collect()
    }

    fn fold_param(
        &self,
        idx: usize,
        overrides: &HashMap<usize, BitVector>,
        resolved: &[Option<ConcretizedValue>],
    ) -> ConcretizedValue {
        let node = &self.nodes[idx];
        let params = self.snapshot(resolved);
        let declared = self.param_type(node, &params);
        if declared == ParamType::Unknown {
            return ConcretizedValue::Symbolic;
        }
        // A typed parameter is assigned its value: the declared type widens
        // the expression's context.
        let eval = |module: &str, expr: &SyntaxNode| -> ConcretizedValue {
            let mut folder = Folder {
                params: &params,
                module,
                scopes: None,
                memo: None,
            };
            let own = folder.self_type(expr);
            let context = match declared {
                ParamType::Typed(ty) => own.map(|own| own.assigned_to(ty)),
                _ => own,
            };
            folder.eval(expr, context).into()
        };
        let typed = |value: ConcretizedValue| match (value, declared) {
            (ConcretizedValue::Literal(v), ParamType::Typed(ty)) => v.cast(ty).into(),
            (ConcretizedValue::Literal(v), ParamType::Signing(signed)) => {
                ConcretizedValue::Literal(v.with_signed(signed))
            }
            _ => value,
        };

        if let Some(value) = overrides.get(&idx) {
            return typed(ConcretizedValue::Literal(*value));
        }
        let sites = self.sites.get(&node.module).filter(|s| !node.local && !s.is_empty());
        let Some(sites) = sites else {
            return typed(node.default.as_ref().map_or(ConcretizedValue::Symbolic, |d| {
                eval(&node.module, d)
            }));
        };

        let mut agreed: Option<ConcretizedValue> = None;
        for site in sites {
            let value = typed(match (site.assignments.get(&node.name), &node.default) {
                (Some(expr), _) => eval(&site.parent, expr),
                (None, Some(default)) => eval(&node.module, default),
                (None, None) => ConcretizedValue::Symbolic,
            });
            match agreed {
                None => agreed = Some(value),
                Some(prev) if prev == value => {}
                Some(_) => {
                    debug!(param = %self.label(idx), "instances disagree; leaving symbolic");
                    return ConcretizedValue::Symbolic;
                }
            }
        }
        agreed.unwrap_or(ConcretizedValue::Symbolic)
    }

    fn param_type(&self, node: &ParamNode, params: &[ParamInfo]) -> ParamType {
        let Some(ty) = &node.ty else {
            return ParamType::Untyped;
        };
        if ty.is_implicit() {
            return match (ty.is_signed(), ty.is_unsigned()) {
                (true, _) => ParamType::Signing(true),
                (_, true) => ParamType::Signing(false),
                _ => ParamType::Untyped,
            };
        }
        let env = TypeEnv {
            module: &node.module,
            params,
            typedefs: self.typedefs.get(&node.module),
        };
        // Enum-typed parameters stay symbolic: a literal in their place would
        // not be assignable to the enum.
        if env.is_enum(ty) {
            return ParamType::Unknown;
        }
        env.signal_type(Some(ty))
            .map_or(ParamType::Unknown, |s| ParamType::Typed(s.ty))
    }

    fn scopes(&self, tree: &SyntaxTree, params: &[ParamInfo]) -> Scopes {
        let mut scopes = Scopes {
            typedefs: self.typedefs.clone(),
            ..Scopes::default()
        };
        for module in tree.modules() {
            let Some(name) = module.name() else { continue };
            let env = TypeEnv {
                module: &name,
                params,
                typedefs: self.typedefs.get(&name),
            };
            scopes
                .signals
                .insert(name.clone(), Signals::collect(&module, &env));
            scopes.ports.insert(name, module.port_names());
        }
        for node in &self.nodes {
            scopes.param_types.insert(
                (node.module.clone(), node.name.clone()),
                self.param_type(node, params),
            );
            if node.ordinal.is_some() {
                scopes
                    .overridable
                    .entry(node.module.clone())
                    .or_default()
                    .push(node.name.clone());
            }
        }
        scopes
    }

    fn snapshot(&self, resolved: &[Option<ConcretizedValue>]) -> Vec<ParamInfo> {
        self.nodes
            .iter()
            .zip(resolved)
            .filter_map(|(node, value)| {
                value.map(|value| ParamInfo {
                    module: node.module.clone(),
                    name: node.name.clone(),
                    local: node.local,
                    value,
                })
            })
            .collect()
    }
}

/// Width of a `[hi:lo]` packed dimension with constant bounds.
fn packed_width(
    dim: &ast::Dimension,
    module: &str,
    params: &[ParamInfo],
) -> Option<u32> {
    if dim.separator() != Some(SyntaxKind::Colon) {
        return None;
    }
    let mut folder = Folder {
        params,
        module,
        scopes: None,
        memo: None,
    };
    let hi = folder.fold_self(&dim.left()?)?.to_i128()?;
    let lo = folder.fold_self(&dim.right()?)?.to_i128()?;
    u32::try_from((hi - lo).abs() + 1).ok()
}

fn unary_op(kind: SyntaxKind) -> Option<UnaryOp> {
    use SyntaxKind as K;
    Some(match kind {
        K::Plus => UnaryOp::Plus,
        K::Minus => UnaryOp::Neg,
        K::Tilde => UnaryOp::Not,
        K::Bang => UnaryOp::LogicalNot,
        K::Amp => UnaryOp::ReduceAnd,
        K::Pipe => UnaryOp::ReduceOr,
        K::Caret => UnaryOp::ReduceXor,
        K::TildeAmp => UnaryOp::ReduceNand,
        K::TildePipe => UnaryOp::ReduceNor,
        K::TildeCaret => UnaryOp::ReduceXnor,
        _ => return None,
    })
}

fn binary_op(kind: SyntaxKind) -> Option<BinaryOp> {
    use SyntaxKind as K;
    Some(match kind {
        K::Plus => BinaryOp::Add,
        K::Minus => BinaryOp::Sub,
        K::Star => BinaryOp::Mul,
        K::Slash => BinaryOp::Div,
        K::Percent => BinaryOp::Mod,
        K::StarStar => BinaryOp::Pow,
        K::Amp => BinaryOp::And,
        K::Pipe => BinaryOp::Or,
        K::Caret => BinaryOp::Xor,
        K::TildeCaret => BinaryOp::Xnor,
        K::EqEq | K::EqEqEq => BinaryOp::Eq,
        K::BangEq | K::BangEqEq => BinaryOp::Ne,
        K::Lt => BinaryOp::Lt,
        K::LtEq => BinaryOp::Le,
        K::Gt => BinaryOp::Gt,
        K::GtEq => BinaryOp::Ge,
        K::AmpAmp => BinaryOp::LogicalAnd,
        K::PipePipe => BinaryOp::LogicalOr,
        K::Shl => BinaryOp::Shl,
        K::Shr => BinaryOp::Shr,
        K::AShl => BinaryOp::AShl,
        K::AShr => BinaryOp::AShr,
        _ => return None,
    })
}

/// How a binary operator sizes its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operands {
    /// Both operands take the expression's type (`+`, `&`, ...)
    Context,
    /// Operands are sized to each other; the result is one bit
    Compared,
    /// Each operand is self-determined; the result is one bit
    Logical,
    /// The left operand takes the expression's type, the right is
    /// self-determined (shifts, `**`)
    LeftContext,
}

pub(crate) fn operands(op: SyntaxKind) -> Option<Operands> {
    use BinaryOp::*;
    Some(match binary_op(op)? {
        Add | Sub | Mul | Div | Mod | And | Or | Xor | Xnor => Operands::Context,
        Eq | Ne | Lt | Le | Gt | Ge => Operands::Compared,
        LogicalAnd | LogicalOr => Operands::Logical,
        Shl | Shr | AShl | AShr | Pow => Operands::LeftContext,
    })
}

/// Constant folder for one module scope.
///
/// `eval` folds a node at a given type: the type its context propagates down,
/// or `None` when that context is unknown. When `memo` is set every folded
/// sub-expression is recorded against its node.
struct Folder<'a> {
    params: &'a [ParamInfo],
    module: &'a str,
    scopes: Option<&'a Scopes>,
    memo: Option<&'a mut HashMap<SyntaxNode, Folded>>,
}

impl<'a> Folder<'a> {
    /// Fold a root expression in the context its parent gives it.
    fn fold(&mut self, root: &SyntaxNode) -> Option<BitVector> {
        let ty = self.root_type(root);
        self.eval(root, ty)
    }

    fn detached(&self) -> Folder<'a> {
        Folder {
            params: self.params,
            module: self.module,
            scopes: self.scopes,
            memo: None,
        }
    }

    fn param(&self, name: &str) -> Option<ConcretizedValue> {
        self.params
            .iter()
            .find(|p| p.module == self.module && p.name == name)
            .map(|p| p.value)
    }

    fn signal(&self, name: &str) -> Option<SignalType> {
        self.scopes?.signals.get(self.module)?.get(name)
    }

    fn env(&self) -> TypeEnv<'a> {
        TypeEnv {
            module: self.module,
            params: self.params,
            typedefs: self.scopes.and_then(|s| s.typedefs.get(self.module)),
        }
    }

    /// Value of a self-determined expression, without recording anything.
    fn constant(&self, node: &SyntaxNode) -> Option<BitVector> {
        self.detached().fold_self(node)
    }

    fn fold_self(&mut self, node: &SyntaxNode) -> Option<BitVector> {
        let ty = self.self_type(node);
        self.eval(node, ty)
    }

    /// Self-determined type of an expression.
    fn self_type(&self, node: &SyntaxNode) -> Option<ValueType> {
        use SyntaxKind as K;
        let kids: Vec<SyntaxNode> = ast::expr_children(node).collect();
        match node.kind() {
            K::LiteralExpr => node.first_token().and_then(|t| literal_type(t.text())),
            K::NameExpr => {
                let name = ast::name_of(node)?;
                match self.param(&name) {
                    Some(value) => value.literal().map(|v| v.ty()),
                    None => self.signal(&name).map(|s| s.ty),
                }
            }
            K::ParenExpr => self.self_type(kids.first()?),
            K::UnaryExpr => {
                let op = ast::UnaryExpr::cast(node.clone())?.op().and_then(unary_op)?;
                match op {
                    UnaryOp::Plus | UnaryOp::Neg | UnaryOp::Not => self.self_type(kids.first()?),
                    _ => Some(ValueType::BIT),
                }
            }
            K::BinaryExpr => {
                let op = ast::BinaryExpr::cast(node.clone())?.op()?;
                match operands(op)? {
                    Operands::Context => {
                        Some(self.self_type(kids.first()?)?.join(self.self_type(kids.get(1)?)?))
                    }
                    Operands::LeftContext => self.self_type(kids.first()?),
                    Operands::Compared | Operands::Logical => Some(ValueType::BIT),
                }
            }
            K::TernaryExpr => {
                Some(self.self_type(kids.get(1)?)?.join(self.self_type(kids.get(2)?)?))
            }
            K::ConcatExpr => {
                let mut width = 0u32;
                for kid in &kids {
                    width = width.checked_add(self.self_type(kid)?.width)?;
                }
                Some(ValueType::new(width, false))
            }
            K::ReplicateExpr => {
                let count = u32::try_from(self.constant(kids.first()?)?.to_u64()?).ok()?;
                let inner = self.self_type(kids.get(1)?)?;
                Some(ValueType::new(count.checked_mul(inner.width)?, false))
            }
            K::SelectExpr => self.select_type(node),
            K::CallExpr => {
                let call = ast::CallExpr::cast(node.clone())?;
                match call.callee()?.as_str() {
                    "$signed" => Some(ValueType {
                        signed: true,
                        ..self.self_type(call.args().first()?)?
                    }),
                    "$unsigned" => Some(ValueType {
                        signed: false,
                        ..self.self_type(call.args().first()?)?
                    }),
                    "$clog2" | "$bits" => Some(ValueType::INT),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn select_type(&self, node: &SyntaxNode) -> Option<ValueType> {
        let select = ast::SelectExpr::cast(node.clone())?;
        let width = match select.separator() {
            // One bit only when the base is a known single-dimension vector
            None => {
                let base = ast::unparen(select.base()?);
                let name = ast::name_of(&base)?;
                let flat = match self.param(&name) {
                    Some(value) => value.literal().is_some(),
                    None => self.signal(&name).is_some_and(|s| s.flat),
                };
                if !flat {
                    return None;
                }
                1
            }
            Some(SyntaxKind::Colon) => {
                let hi = self.constant(&select.index()?)?.to_i128()?;
                let lo = self.constant(&select.upper()?)?.to_i128()?;
                u32::try_from((hi - lo).abs() + 1).ok()?
            }
            Some(_) => u32::try_from(self.constant(&select.upper()?)?.to_u64()?).ok()?,
        };
        Some(ValueType::new(width, false))
    }

    /// Type a root expression is evaluated at.
    fn root_type(&self, root: &SyntaxNode) -> Option<ValueType> {
        use SyntaxKind as K;
        let own = self.self_type(root);
        let Some(parent) = root.parent() else {
            return own;
        };
        match parent.kind() {
            K::AssignStmt | K::Assignment => {
                let lhs = ast::expr_children(&parent).next()?;
                if &lhs == root {
                    return own;
                }
                Some(own?.assigned_to(self.self_type(&lhs)?))
            }
            K::Declarator => self.declarator_context(&parent, own?),
            K::CaseStmt | K::CaseItem => self.case_type(&parent),
            K::NamedArg | K::OrderedArg => self.argument_context(&parent, own?),
            K::ReturnStmt => {
                let function = parent
                    .ancestors()
                    .find(|n| n.kind() == K::FunctionDecl)?;
                let ret = function.children().find_map(DataType::cast);
                Some(own?.assigned_to(self.env().signal_type(ret.as_ref())?.ty))
            }
            K::EnumMember => {
                let enum_type = parent.parent().and_then(ast::EnumType::cast)?;
                let base = match enum_type.base() {
                    Some(base) => self.env().signal_type(Some(&base))?.ty,
                    None => ValueType::INT,
                };
                Some(own?.assigned_to(base))
            }
            _ => own,
        }
    }

    fn declarator_context(&self, declarator: &SyntaxNode, own: ValueType) -> Option<ValueType> {
        let name = ast::Declarator::cast(declarator.clone())?.name()?;
        if declarator.parent()?.kind() == SyntaxKind::ParamDecl {
            let key = (self.module.to_string(), name);
            return match self.scopes?.param_types.get(&key)? {
                ParamType::Typed(ty) => Some(own.assigned_to(*ty)),
                ParamType::Unknown => None,
                ParamType::Untyped | ParamType::Signing(_) => Some(own),
            };
        }
        Some(own.assigned_to(self.signal(&name)?.ty))
    }

    /// Selector and labels of a case statement share one type.
    fn case_type(&self, node: &SyntaxNode) -> Option<ValueType> {
        let stmt = match node.kind() {
            SyntaxKind::CaseItem => node.parent()?,
            _ => node.clone(),
        };
        let stmt = ast::CaseStmt::cast(stmt)?;
        let mut ty = self.self_type(&stmt.selector()?)?;
        for item in stmt.items() {
            for label in item.labels() {
                ty = ty.join(self.self_type(&label)?);
            }
        }
        Some(ty)
    }

    /// Context of a port connection or parameter value at an instance of a
    /// module defined in this file.
    fn argument_context(&self, arg: &SyntaxNode, own: ValueType) -> Option<ValueType> {
        use SyntaxKind as K;
        let list = arg.parent()?;
        let inst = list.ancestors().find_map(ast::Instantiation::cast)?;
        let child = inst.module_name()?;
        let scopes = self.scopes?;
        let named = ast::NamedArg::cast(arg.clone()).and_then(|a| a.name());
        let position = || {
            list.children()
                .filter(|n| n.kind() == K::OrderedArg)
                .position(|n| &n == arg)
        };
        match list.kind() {
            K::PortConnectionList => {
                let port = match named {
                    Some(name) => name,
                    None => scopes.ports.get(&child)?.get(position()?)?.clone(),
                };
                let ty = scopes.signals.get(&child)?.get(&port)?.ty;
                Some(own.assigned_to(ty))
            }
            K::ParamValueList => {
                let param = match named {
                    Some(name) => name,
                    None => scopes.overridable.get(&child)?.get(position()?)?.clone(),
                };
                match scopes.param_types.get(&(child, param))? {
                    ParamType::Typed(ty) => Some(own.assigned_to(*ty)),
                    ParamType::Unknown => None,
                    ParamType::Untyped | ParamType::Signing(_) => Some(own),
                }
            }
            _ => Some(own),
        }
    }

    /// Fold `node` at type `ty` and record the result.
    fn eval(&mut self, node: &SyntaxNode, ty: Option<ValueType>) -> Option<BitVector> {
        let value = self.eval_inner(node, ty)?;
        if self.memo.is_some() {
            // Keep the expression's own literal where it means the same thing
            let spelling = self
                .self_type(node)
                .and_then(|own| self.detached().eval(node, Some(own)))
                .filter(|own| own.cast(value.ty()) == Some(value))
                .unwrap_or(value);
            if let Some(memo) = self.memo.as_deref_mut() {
                memo.insert(node.clone(), Folded { value, spelling });
            }
        }
        Some(value)
    }

    // Every child is folded before any early return so nested constants
    // (indices, replication counts) are recorded even when the parent is not.
    fn eval_inner(&mut self, node: &SyntaxNode, ty: Option<ValueType>) -> Option<BitVector> {
        use SyntaxKind as K;
        let kids: Vec<SyntaxNode> = ast::expr_children(node).collect();
        match node.kind() {
            K::LiteralExpr => {
                let text = node.first_token()?.text().to_string();
                let ty = ty?;
                match text.as_str() {
                    "'1" => BitVector::new(u128::MAX, ty.width, ty.signed),
                    _ => parse_literal(&text)?.cast(ty),
                }
            }
            K::NameExpr => self.param(&ast::name_of(node)?)?.literal()?.cast(ty?),
            K::ParenExpr => self.eval(kids.first()?, ty),
            K::UnaryExpr => {
                let op = ast::UnaryExpr::cast(node.clone())
                    .and_then(|e| e.op())
                    .and_then(unary_op);
                let operand = kids.first()?;
                match op {
                    Some(op @ (UnaryOp::Plus | UnaryOp::Neg | UnaryOp::Not)) => {
                        value::unary(op, self.eval(operand, ty)?)
                    }
                    Some(op) => {
                        let a = self.fold_self(operand);
                        value::unary(op, a?)?.cast(ty?)
                    }
                    None => {
                        self.fold_self(operand);
                        None
                    }
                }
            }
            K::BinaryExpr => {
                let op = ast::BinaryExpr::cast(node.clone()).and_then(|e| e.op());
                let (lhs, rhs) = (kids.first()?, kids.get(1)?);
                let (a, b) = match op.and_then(operands) {
                    Some(Operands::Context) => (self.eval(lhs, ty), self.eval(rhs, ty)),
                    Some(Operands::Compared) => {
                        let common = match (self.self_type(lhs), self.self_type(rhs)) {
                            (Some(l), Some(r)) => Some(l.join(r)),
                            _ => None,
                        };
                        (self.eval(lhs, common), self.eval(rhs, common))
                    }
                    Some(Operands::LeftContext) => (self.eval(lhs, ty), self.fold_self(rhs)),
                    Some(Operands::Logical) | None => (self.fold_self(lhs), self.fold_self(rhs)),
                };
                let op = op.and_then(binary_op)?;
                value::binary(op, a?, b?)?.cast(ty?)
            }
            K::TernaryExpr => {
                let pred = self.fold_self(kids.first()?);
                let then = self.eval(kids.get(1)?, ty);
                let other = self.eval(kids.get(2)?, ty);
                value::conditional(pred?, then?, other?)
            }
            K::ConcatExpr => {
                let parts: Vec<Option<BitVector>> =
                    kids.iter().map(|kid| self.fold_self(kid)).collect();
                let parts: Vec<BitVector> = parts.into_iter().collect::<Option<_>>()?;
                value::concat(&parts)?.cast(ty?)
            }
            K::ReplicateExpr => {
                let count = self.fold_self(kids.first()?);
                let inner = self.fold_self(kids.get(1)?);
                value::replicate(count?.to_u64()?, inner?)?.cast(ty?)
            }
            K::SelectExpr => {
                let folded: Vec<Option<BitVector>> =
                    kids.iter().map(|kid| self.fold_self(kid)).collect();
                select(node, &folded)?.cast(ty?)
            }
            K::CallExpr => {
                let call = ast::CallExpr::cast(node.clone())?;
                let args: Vec<Option<BitVector>> = call
                    .args()
                    .iter()
                    .map(|arg| self.fold_self(arg))
                    .collect();
                let result = match (call.callee().as_deref(), args.as_slice()) {
                    (Some("$clog2"), [Some(arg)]) => value::clog2(*arg),
                    (Some("$signed"), [Some(arg)]) => Some(arg.with_signed(true)),
                    (Some("$unsigned"), [Some(arg)]) => Some(arg.with_signed(false)),
                    _ => None,
                };
                result?.cast(ty?)
            }
            _ => None,
        }
    }
}

fn select(node: &SyntaxNode, kids: &[Option<BitVector>]) -> Option<BitVector> {
    let select = ast::SelectExpr::cast(node.clone())?;
    let base = (*kids.first()?)?;
    let index = (*kids.get(1)?)?.to_u64()?;
    match select.separator() {
        None => value::select(base, index, index),
        Some(SyntaxKind::Colon) => value::select(base, index, (*kids.get(2)?)?.to_u64()?),
        Some(SyntaxKind::PlusColon) => {
            let width = (*kids.get(2)?)?.to_u64()?;
            value::select(base, index.checked_add(width)?.checked_sub(1)?, index)
        }
        Some(_) => {
            let width = (*kids.get(2)?)?.to_u64()?;
            value::select(base, index, index.checked_add(1)?.checked_sub(width)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Concretized {
        let tree = SyntaxTree::parse(src).expect("parse");
        concretize(&tree, None, &[]).expect("concretize")
    }

    fn lit(c: &Concretized, module: &str, name: &str) -> Option<u128> {
        c.param(module, name).literal().map(|v| v.value())
    }

    #[test]
    fn test_dependent_parameters_fold() {
        let c = run("module m #(parameter W = 8) (); localparam H = W / 2; localparam D = $clog2(W) + H; endmodule");
        assert_eq!(lit(&c, "m", "W"), Some(8));
        assert_eq!(lit(&c, "m", "H"), Some(4));
        assert_eq!(lit(&c, "m", "D"), Some(7));
    }

    #[test]
    fn test_declaration_order_does_not_matter() {
        let c = run("module m; localparam A = B + 1; localparam B = 2; endmodule");
        assert_eq!(lit(&c, "m", "A"), Some(3));
    }

    #[test]
    fn test_cycle_is_reported() {
        let tree = SyntaxTree::parse("module m; localparam A = B; localparam B = A; endmodule")
            .expect("parse");
        let err = concretize(&tree, None, &[]).expect_err("cycle");
        match err {
            ConcretizationError::Cycle { params } => {
                assert!(params.contains(&"m.A".to_string()));
                assert!(params.contains(&"m.B".to_string()));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_typed_parameter_is_resized() {
        let c = run("module m; localparam logic [3:0] N = 8'hff; localparam int I = 4'hf; endmodule");
        let n = c.param("m", "N").literal().expect("literal");
        assert_eq!((n.value(), n.width()), (0xf, 4));
        let i = c.param("m", "I").literal().expect("literal");
        assert_eq!((i.value(), i.width(), i.is_signed()), (15, 32, true));
    }

    #[test]
    fn test_symbolic_is_not_an_error() {
        let c = run("module m (input [3:0] a); localparam P = 1'bx; wire [3:0] y = a + 1; endmodule");
        assert_eq!(c.param("m", "P"), ConcretizedValue::Symbolic);
    }

    #[test]
    fn test_instances_agree() {
        let c = run(
            "module top; leaf #(.W(4)) a (); leaf #(4) b (); endmodule\n\
             module leaf #(parameter W = 8) (); localparam H = W * 2; endmodule",
        );
        assert_eq!(lit(&c, "leaf", "W"), Some(4));
        assert_eq!(lit(&c, "leaf", "H"), Some(8));
    }

    #[test]
    fn test_instances_disagree() {
        let c = run(
            "module top; leaf #(.W(4)) a (); leaf b (); endmodule\n\
             module leaf #(parameter W = 8) (); endmodule",
        );
        assert_eq!(c.param("leaf", "W"), ConcretizedValue::Symbolic);
    }

    #[test]
    fn test_instance_override_uses_parent_scope() {
        let c = run(
            "module top #(parameter N = 3) (); leaf #(.W(N + 1)) a (); endmodule\n\
             module leaf #(parameter W = 8) (); endmodule",
        );
        assert_eq!(lit(&c, "leaf", "W"), Some(4));
    }

    #[test]
    fn test_overrides_apply_to_top_only() {
        let tree = SyntaxTree::parse(
            "module m #(parameter W = 8) (); localparam L = 1; localparam H = W - 1; endmodule",
        )
        .expect("parse");
        let overrides = vec![
            "W=16".parse::<ParamOverride>().expect("override"),
            "L=5".parse::<ParamOverride>().expect("override"),
            "NOPE=1".parse::<ParamOverride>().expect("override"),
        ];
        let c = concretize(&tree, None, &overrides).expect("concretize");
        assert_eq!(lit(&c, "m", "W"), Some(16));
        assert_eq!(lit(&c, "m", "H"), Some(15));
        assert_eq!(lit(&c, "m", "L"), Some(1));
    }

    #[test]
    fn test_invalid_override() {
        let tree = SyntaxTree::parse("module m #(parameter W = 8) (); endmodule").expect("parse");
        let overrides = vec!["W=banana".parse::<ParamOverride>().expect("override")];
        assert!(matches!(
            concretize(&tree, None, &overrides),
            Err(ConcretizationError::InvalidOverride { .. })
        ));
    }

    #[test]
    fn test_unknown_top() {
        let tree = SyntaxTree::parse("module m; endmodule").expect("parse");
        assert_eq!(
            concretize(&tree, Some("x"), &[]).err(),
            Some(ConcretizationError::UnknownTop("x".into()))
        );
    }

    #[test]
    fn test_body_parameters_are_local_with_header() {
        let c = run("module m #(parameter A = 1) (); parameter B = 2; endmodule");
        let b = c.params_of("m").find(|p| p.name == "B").expect("B");
        assert!(b.local);
    }

    #[test]
    fn test_render_concretized() {
        let src = "module m #(parameter W = 8) (input [W-1:0] a, output [W-1:0] y);\n  assign y = a + (W >> 1);\nendmodule\n";
        let c = run(src);
        let rendered = c.render_concretized().expect("render");
        assert_eq!(
            rendered,
            "module m #(parameter W = 8) (input [7:0] a, output [7:0] y);\n  assign y = a + 4;\nendmodule\n"
        );
    }

    #[test]
    fn test_expression_values_are_annotated() {
        let c = run("module m; localparam W = 4; wire [W-1:0] x; endmodule");
        let dim = c
            .tree()
            .root()
            .descendants()
            .find_map(ast::Dimension::cast)
            .expect("dimension");
        let left = dim.left().expect("left bound");
        assert_eq!(c.literal(&left).map(|v| v.value()), Some(3));
    }

    #[test]
    fn test_assignment_context_widens_operands() {
        let src = "module m (input [8:0] a, output [8:0] y);\n  assign y = a + (4'hf + 4'h1);\nendmodule\n";
        let rendered = run(src).render_concretized().expect("render");
        assert!(rendered.contains("assign y = a + 9'd16;"), "{rendered}");
        assert!(!rendered.contains("4'd0"));
    }

    #[test]
    fn test_assignment_target_widens_whole_right_hand_side() {
        let c = run("module m; logic [7:0] r; initial r = 4'hf + 4'h1; endmodule");
        let rhs = c
            .tree()
            .root()
            .descendants()
            .find(|n| n.kind() == SyntaxKind::BinaryExpr)
            .expect("sum");
        let v = c.literal(&rhs).expect("constant");
        assert_eq!((v.value(), v.width()), (16, 8));

        let c = run("module m; logic [7:0] r = 4'hf + 4'h1; endmodule");
        let init = c
            .tree()
            .root()
            .descendants()
            .find(|n| n.kind() == SyntaxKind::BinaryExpr)
            .expect("sum");
        assert_eq!(c.literal(&init).map(|v| v.value()), Some(16));
    }

    #[test]
    fn test_typed_parameter_context() {
        let c = run(
            "module m; localparam logic [8:0] P = (8'hff + 8'h01) >> 1; localparam Q = (8'hff + 8'h01) >> 1; endmodule",
        );
        let p = c.param("m", "P").literal().expect("P");
        assert_eq!((p.value(), p.width()), (128, 9));
        let q = c.param("m", "Q").literal().expect("Q");
        assert_eq!((q.value(), q.width()), (0, 8));
    }

    #[test]
    fn test_unknown_context_stays_symbolic() {
        let src = "module m;\n  logic [7:0] mem [0:3];\n  assign t = 4'hf + 4'h1;\n  initial mem[0] = 4'hf + 4'h1;\nendmodule\n";
        let c = run(src);
        let sums = c
            .tree()
            .root()
            .descendants()
            .filter(|n| n.kind() == SyntaxKind::BinaryExpr);
        for sum in sums {
            assert_eq!(c.value(&sum), ConcretizedValue::Symbolic);
        }
        assert_eq!(c.render_concretized().expect("render"), src);
    }

    #[test]
    fn test_self_determined_operands_keep_their_width() {
        let src = "module m (input [8:0] a, output [8:0] y, output logic z);\n  assign y = a + {4'hf + 4'h1};\n  always_comb if ((4'hf + 4'h1) == 5'd16) z = 1'b1; else z = 1'b0;\nendmodule\n";
        let rendered = run(src).render_concretized().expect("render");
        assert!(rendered.contains("assign y = a + 4'd0;"), "{rendered}");
        assert!(rendered.contains("if (1'd1)"), "{rendered}");
    }

    #[test]
    fn test_port_connection_takes_port_width() {
        let src = "module top (output [7:0] y);\n  leaf u (.a(4'hf + 4'h1), .y(y));\nendmodule\nmodule leaf (input [7:0] a, output [7:0] y);\n  assign y = a;\nendmodule\n";
        let rendered = run(src).render_concretized().expect("render");
        assert!(rendered.contains(".a(8'd16)"), "{rendered}");
    }

    #[test]
    fn test_signal_types() {
        let c = run(
            "module m #(parameter W = 8) (input [W-1:0] a, b, input int n);\n\
             typedef logic [3:0] nibble_t;\n\
             logic [3:0][7:0] packed_words;\n\
             logic [7:0] mem [0:3];\n\
             nibble_t nib;\n\
             logic signed [5:0] s;\n\
             endmodule",
        );
        assert_eq!(c.signal_type("m", "b"), Some(ValueType::new(8, false)));
        assert_eq!(c.signal_type("m", "n"), Some(ValueType::INT));
        assert_eq!(c.signal_type("m", "packed_words"), Some(ValueType::new(32, false)));
        assert_eq!(c.signal_type("m", "mem"), None);
        assert_eq!(c.signal_type("m", "nib"), Some(ValueType::new(4, false)));
        assert_eq!(c.signal_type("m", "s"), Some(ValueType::new(6, true)));
    }

    #[test]
    fn test_enum_values_stay_symbolic() {
        let src = "module m (output logic busy);\n  typedef enum logic [1:0] {IDLE, RUN} state_t;\n  localparam state_t START = RUN;\n  state_t s;\n  assign busy = s == IDLE;\nendmodule\n";
        let c = run(src);
        assert_eq!(c.param("m", "START"), ConcretizedValue::Symbolic);
        assert_eq!(c.signal_type("m", "s"), Some(ValueType::new(2, false)));
        assert_eq!(c.render_concretized().expect("render"), src);
    }

    #[test]
    fn test_parse_override() {
        assert_eq!(
            "W = 4".parse::<ParamOverride>(),
            Ok(ParamOverride {
                name: "W".into(),
                value: "4".into()
            })
        );
        assert!("W".parse::<ParamOverride>().is_err());
        assert!("=4".parse::<ParamOverride>().is_err());
    }
}
