//! Mutation proposals and materialised mutants

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::edit::Edit;

/// The four papercut rewrite families.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ShrinkBits,
    CaseBranch,
    IfRemoval,
    Ternary,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::ShrinkBits,
        Strategy::CaseBranch,
        Strategy::IfRemoval,
        Strategy::Ternary,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::ShrinkBits => "shrink_bits",
            Strategy::CaseBranch => "case_branch",
            Strategy::IfRemoval => "if_removal",
            Strategy::Ternary => "ternary",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|st| st.name() == s)
            .ok_or_else(|| format!("unknown strategy `{s}`"))
    }
}

/// A position in the source file.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct SourceLocation {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn at(source: &str, offset: usize) -> Self {
        let (line, column) = papercut_syntax::line_col(source, offset);
        Self {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One edit proposed by a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub strategy: Strategy,
    /// Enclosing module
    pub module: String,
    /// Which collapse of the construct this is (`then`, `false`, `item1`, `w3`, ...)
    pub variant: String,
    pub edit: Edit,
    pub location: SourceLocation,
    pub description: String,
}

impl Mutation {
    /// Deterministic identifier, also used as a file stem.
    pub fn base_id(&self) -> String {
        format!(
            "{}__{}__L{}C{}__{}",
            sanitize(&self.module),
            self.strategy,
            self.location.line,
            self.location.column,
            sanitize(&self.variant)
        )
    }
}

/// A construct a strategy saw but could not rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategySkip {
    pub strategy: Strategy,
    pub location: SourceLocation,
    pub reason: String,
}

/// A fully patched variant of the input design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutant {
    pub id: String,
    /// Stem of the input file
    pub source_id: String,
    pub strategy: Strategy,
    pub variant: String,
    pub location: SourceLocation,
    pub edits: Vec<Edit>,
    pub description: String,
    #[serde(skip)]
    pub mutated_text: String,
}

/// Keep only characters legal in an identifier and a file name.
pub fn sanitize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Make ids unique by appending `_<n>` to repeats, in the given order.
pub fn dedupe_ids(ids: &mut [String]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for id in ids.iter_mut() {
        let count = seen.entry(id.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            let mut n = *count - 1;
            let mut candidate = format!("{id}_{n}");
            while seen.contains_key(&candidate) {
                n += 1;
                candidate = format!("{id}_{n}");
            }
            seen.insert(candidate.clone(), 1);
            *id = candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_id_format() {
        let m = Mutation {
            strategy: Strategy::IfRemoval,
            module: "alu".into(),
            variant: "then".into(),
            edit: Edit::delete(0..1),
            location: SourceLocation {
                offset: 40,
                line: 3,
                column: 5,
            },
            description: String::new(),
        };
        assert_eq!(m.base_id(), "alu__if_removal__L3C5__then");
    }

    #[test]
    fn test_strategy_round_trip_names() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.name().parse::<Strategy>(), Ok(strategy));
        }
        assert!("bogus".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_dedupe_ids() {
        let mut ids = vec!["a".to_string(), "b".into(), "a".into(), "a".into()];
        dedupe_ids(&mut ids);
        assert_eq!(ids, vec!["a", "b", "a_1", "a_2"]);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("w[3]"), "w_3_");
        assert_eq!(sanitize(""), "_");
    }
}
