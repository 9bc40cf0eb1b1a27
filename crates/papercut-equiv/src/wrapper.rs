//! Equivalence wrapper generation and mutant module renaming

use std::collections::HashSet;
use std::ops::Range;

use papercut::{DesignInterface, Edit, EditSet, PapercutResult, PortDirection, SyntaxTree};
use papercut_syntax::SyntaxToken;

/// Suffix appended to every module of a mutant so both designs can be
/// elaborated together.
pub const MUTANT_SUFFIX: &str = "_mutant";

fn token_range(token: &SyntaxToken) -> Range<usize> {
    let range = token.text_range();
    usize::from(range.start())..usize::from(range.end())
}

/// Rename every module defined in `text` to `<name><suffix>`, along with
/// instantiations of those modules. Instances of modules defined elsewhere
/// are left alone.
pub fn rename_modules(text: &str, suffix: &str) -> PapercutResult<String> {
    let tree = SyntaxTree::parse(text)?;
    let local: HashSet<String> = tree.modules().filter_map(|m| m.name()).collect();

    let mut edits = Vec::new();
    for module in tree.modules() {
        if let Some(token) = module.name_token() {
            edits.push(Edit::replace(
                token_range(&token),
                format!("{}{suffix}", token.text()),
            ));
        }
        for inst in module.instantiations() {
            let Some(token) = inst.module_name_token() else {
                continue;
            };
            if local.contains(token.text()) {
                edits.push(Edit::replace(
                    token_range(&token),
                    format!("{}{suffix}", token.text()),
                ));
            }
        }
    }
    Ok(EditSet::new(edits)?.apply(text)?)
}

/// Build a wrapper module that drives the original top and the renamed
/// mutant top from shared inputs, and asserts that every output matches.
pub fn generate_wrapper(iface: &DesignInterface, mutant_top: &str, wrapper_top: &str) -> String {
    let mut ports: Vec<String> = iface
        .inputs()
        .map(|p| {
            let dir = match p.direction {
                PortDirection::Inout => "inout",
                _ => "input",
            };
            format!("    {dir} {}{}", p.range_prefix(), p.name)
        })
        .collect();
    for prefix in ["orig", "mut"] {
        ports.extend(
            iface
                .outputs()
                .map(|p| format!("    output {}{prefix}_{}", p.range_prefix(), p.name)),
        );
    }
    ports.push("    output logic equiv".to_string());

    let params = if iface.params.is_empty() {
        String::new()
    } else {
        let list: Vec<String> = iface
            .params
            .iter()
            .map(|(name, value)| format!(".{name}({value})"))
            .collect();
        format!(" #({})", list.join(", "))
    };

    let instance = |module: &str, inst: &str, prefix: &str| {
        let conns: Vec<String> = iface
            .ports
            .iter()
            .map(|p| match p.direction {
                PortDirection::Output => format!("    .{0}({prefix}_{0})", p.name),
                _ => format!("    .{0}({0})", p.name),
            })
            .collect();
        format!("  {module}{params} {inst} (\n{}\n  );\n", conns.join(",\n"))
    };

    let checks: Vec<String> = iface
        .outputs()
        .map(|p| format!("(orig_{0} == mut_{0})", p.name))
        .collect();
    let equiv = if checks.is_empty() {
        "1'b1".to_string()
    } else {
        checks.join(" & ")
    };

    let mut out = String::new();
    out.push_str(&format!("module {wrapper_top} (\n{}\n);\n\n", ports.join(",\n")));
    out.push_str(&instance(&iface.module, "orig", "orig"));
    out.push('\n');
    out.push_str(&instance(mutant_top, "mutant", "mut"));
    out.push_str(&format!("\n  assign equiv = {equiv};\n"));
    out.push_str("\n`ifdef FORMAL\n  always @(*) begin\n    assert(equiv);\n  end\n`endif\n");
    out.push_str("\nendmodule\n");
    out
}
