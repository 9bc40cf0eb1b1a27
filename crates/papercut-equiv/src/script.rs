//! Verifier script templates
//!
//! Templates and argument lists use `{name}` placeholders. Only the names
//! listed in [`ScriptContext::vars`] are substituted; any other braces (TCL
//! blocks, for instance) are left alone.

use std::path::Path;

/// JasperGold: prove the wrapper assertion and print a marker line.
pub const JASPER_TEMPLATE: &str = r#"# papercut equivalence check for {id}
if {[catch {
    analyze -sv {original} {mutant} {wrapper} +define+FORMAL
    elaborate -top {wrapper_top} -bbox_mul 64 -bbox_div 64 -bbox_mod 64
    clock -none
    reset -none

    set res [autoprove -all -silent]

    if {$res eq "proven"} {
        puts "PAPERCUT_EQUIV: PASS"
    } else {
        puts "PAPERCUT_EQUIV: FAIL"
    }
} err]} {
    puts "papercut: verification aborted: $err"
    exit 1
}
exit 0
"#;

/// SymbiYosys: unbounded proof of the same assertion.
pub const SBY_TEMPLATE: &str = r#"[options]
mode prove

[engines]
smtbmc

[script]
read -formal -DFORMAL original.sv
read -formal -DFORMAL mutant.sv
read -formal -DFORMAL {wrapper_file}
prep -top {wrapper_top}

[files]
{original}
{mutant}
{wrapper}
"#;

/// Values available to templates for one mutant.
#[derive(Debug, Clone)]
pub struct ScriptContext<'a> {
    pub id: &'a str,
    pub work_dir: &'a Path,
    pub original: &'a Path,
    pub mutant: &'a Path,
    pub wrapper: &'a Path,
    pub script: &'a Path,
    pub top: &'a str,
    pub mutant_top: &'a str,
    pub wrapper_top: &'a str,
    pub timeout_secs: u64,
}

impl ScriptContext<'_> {
    pub fn vars(&self) -> Vec<(&'static str, String)> {
        let file_name = |p: &Path| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        vec![
            ("id", self.id.to_string()),
            ("work_dir", self.work_dir.display().to_string()),
            ("original", self.original.display().to_string()),
            ("mutant", self.mutant.display().to_string()),
            ("wrapper", self.wrapper.display().to_string()),
            ("wrapper_file", file_name(self.wrapper)),
            ("script", self.script.display().to_string()),
            ("top", self.top.to_string()),
            ("mutant_top", self.mutant_top.to_string()),
            ("wrapper_top", self.wrapper_top.to_string()),
            ("timeout", self.timeout_secs.to_string()),
        ]
    }
}

/// Substitute every known `{name}` in `template`.
pub fn render(template: &str, ctx: &ScriptContext<'_>) -> String {
    ctx.vars()
        .into_iter()
        .fold(template.to_string(), |text, (name, value)| {
            text.replace(&format!("{{{name}}}"), &value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn with_ctx<R>(f: impl FnOnce(&ScriptContext<'_>) -> R) -> R {
        let work = PathBuf::from("/tmp/out/equiv/m1");
        let original = work.join("original.sv");
        let mutant = work.join("mutant.sv");
        let wrapper = work.join("m1_wrapper.sv");
        let script = work.join("m1.tcl");
        let ctx = ScriptContext {
            id: "m1",
            work_dir: &work,
            original: &original,
            mutant: &mutant,
            wrapper: &wrapper,
            script: &script,
            top: "alu",
            mutant_top: "alu_mutant",
            wrapper_top: "alu_wrapper",
            timeout_secs: 600,
        };
        f(&ctx)
    }

    #[test]
    fn test_jasper_template_keeps_tcl_braces() {
        let text = with_ctx(|ctx| render(JASPER_TEMPLATE, ctx));
        assert!(text.contains("if {[catch {"));
        assert!(text.contains("if {$res eq \"proven\"} {"));
        assert!(text.contains("elaborate -top alu_wrapper -bbox_mul 64"));
        assert!(text.contains(
            "analyze -sv /tmp/out/equiv/m1/original.sv /tmp/out/equiv/m1/mutant.sv /tmp/out/equiv/m1/m1_wrapper.sv +define+FORMAL"
        ));
        assert!(!text.contains("{id}"));
    }

    #[test]
    fn test_sby_template() {
        let text = with_ctx(|ctx| render(SBY_TEMPLATE, ctx));
        assert!(text.contains("read -formal -DFORMAL m1_wrapper.sv"));
        assert!(text.contains("prep -top alu_wrapper"));
    }

    #[test]
    fn test_unknown_placeholders_survive() {
        let text = with_ctx(|ctx| render("{top} {bogus} {timeout}", ctx));
        assert_eq!(text, "alu {bogus} 600");
    }
}
