//! Port and parameter view of the top module, used to build equivalence
//! wrappers.

use std::collections::HashMap;

use papercut_syntax::{ast, byte_range, SyntaxKind};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::concretize::{Concretized, ConcretizedValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
    Inout,
}

impl PortDirection {
    fn from_kind(kind: SyntaxKind) -> Option<Self> {
        match kind {
            SyntaxKind::InputKw => Some(Self::Input),
            SyntaxKind::OutputKw => Some(Self::Output),
            SyntaxKind::InoutKw => Some(Self::Inout),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub direction: PortDirection,
    /// Packed range with constant bounds folded, e.g. `[7:0]`
    pub range: Option<String>,
    pub signed: bool,
}

impl Port {
    /// `[7:0] ` or empty, ready to splice into a declaration.
    pub fn range_prefix(&self) -> String {
        let signed = if self.signed { "signed " } else { "" };
        match &self.range {
            Some(range) => format!("{signed}{range} "),
            None => signed.to_string(),
        }
    }
}

/// Interface of one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignInterface {
    pub module: String,
    pub ports: Vec<Port>,
    /// Overridable parameters with a constant value, as Verilog literals
    pub params: Vec<(String, String)>,
}

impl DesignInterface {
    /// Extract the interface of the design's top module.
    pub fn of_top(design: &Concretized) -> Self {
        let top = design.top();
        let module = design.top_name();
        Self {
            ports: ports(design, top),
            params: design
                .params_of(&module)
                .filter(|p| !p.local)
                .filter_map(|p| match p.value {
                    ConcretizedValue::Literal(v) => Some((p.name.clone(), v.to_verilog())),
                    ConcretizedValue::Symbolic => None,
                })
                .collect(),
            module,
        }
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Port> {
        self.ports
            .iter()
            .filter(|p| p.direction != PortDirection::Output)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Port> {
        self.ports
            .iter()
            .filter(|p| p.direction == PortDirection::Output)
    }
}

/// Integer atoms and user-defined types carry their width in the type itself.
fn is_sized_type(ty: &ast::DataType) -> bool {
    ty.type_name().is_some()
        || ty.enum_type().is_some()
        || matches!(
            ty.keyword(),
            Some(SyntaxKind::IntKw | SyntaxKind::IntegerKw | SyntaxKind::ByteKw)
        )
}

fn ports(design: &Concretized, top: &ast::Module) -> Vec<Port> {
    let module = top.name().unwrap_or_default();
    // ANSI ports with neither direction nor type repeat the previous port's.
    let mut declared: HashMap<String, Port> = HashMap::new();
    let mut previous: Option<(PortDirection, Option<ast::DataType>)> = None;
    for decl in top.port_decls() {
        let (direction, data_type) = match (decl.direction(), decl.data_type()) {
            (Some(kind), ty) => match PortDirection::from_kind(kind) {
                Some(dir) => (dir, ty),
                None => continue,
            },
            (None, None) => match &previous {
                Some((dir, ty)) => (*dir, ty.clone()),
                None => continue,
            },
            (None, Some(ty)) => match &previous {
                Some((dir, _)) => (*dir, Some(ty)),
                None => continue,
            },
        };
        previous = Some((direction, data_type.clone()));
        for name in decl.declarators().iter().filter_map(|d| d.name()) {
            let (range, signed) = match data_type.as_ref() {
                Some(ty) if is_sized_type(ty) => {
                    let folded = design.signal_type(&module, &name);
                    if folded.is_none() {
                        warn!(port = %name, "port type has no constant width; treating it as one bit");
                    }
                    (
                        folded
                            .filter(|t| t.width > 1)
                            .map(|t| format!("[{}:0]", t.width - 1)),
                        folded.is_some_and(|t| t.signed),
                    )
                }
                ty => (
                    ty.and_then(|ty| range_of(design, ty)),
                    ty.is_some_and(ast::DataType::is_signed),
                ),
            };
            declared.insert(
                name.clone(),
                Port {
                    name,
                    direction,
                    range,
                    signed,
                },
            );
        }
    }

    // Non-ANSI `output y; reg [3:0] y;` keeps the range on the data declaration.
    for decl in top.data_decls() {
        let Some(ty) = decl.data_type() else { continue };
        for name in decl.declarators().iter().filter_map(|d| d.name()) {
            if let Some(port) = declared.get_mut(&name) {
                if port.range.is_none() {
                    port.range = range_of(design, &ty);
                }
                port.signed |= ty.is_signed();
            }
        }
    }

    top.port_names()
        .into_iter()
        .filter_map(|name| declared.remove(&name))
        .collect()
}

fn range_of(design: &Concretized, ty: &ast::DataType) -> Option<String> {
    let dims = ty.dimensions();
    if dims.is_empty() {
        return None;
    }
    let mut out = String::new();
    for dim in dims {
        let bounds = (dim.separator() == Some(SyntaxKind::Colon))
            .then(|| {
                let hi = design.literal(&dim.left()?)?.to_i128()?;
                let lo = design.literal(&dim.right()?)?.to_i128()?;
                Some((hi, lo))
            })
            .flatten();
        match bounds {
            Some((hi, lo)) => out.push_str(&format!("[{hi}:{lo}]")),
            None => out.push_str(&design.source()[byte_range(dim.syntax())]),
        }
    }
    Some(out)
}
