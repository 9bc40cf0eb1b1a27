//! Verifier configuration
//!
//! A profile supplies defaults for every field; a JSON config file and CLI
//! flags override them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{EquivError, EquivResult};
use crate::script::{JASPER_TEMPLATE, SBY_TEMPLATE};

/// Marker printed by the default Jasper script on a proof
pub const JASPER_PASS_MARKER: &str = r"(?m)^PAPERCUT_EQUIV: PASS\b";
/// Marker printed by the default Jasper script on a counterexample
pub const JASPER_FAIL_MARKER: &str = r"(?m)^PAPERCUT_EQUIV: FAIL\b";

/// Named verifier defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Cadence JasperGold `autoprove`
    #[default]
    Jasper,
    /// YosysHQ SymbiYosys in prove mode
    Symbiyosys,
    /// Everything comes from the config file
    Custom,
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Profile::Jasper => "jasper",
            Profile::Symbiyosys => "symbiyosys",
            Profile::Custom => "custom",
        };
        f.write_str(s)
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jasper" | "jaspergold" => Ok(Profile::Jasper),
            "symbiyosys" | "sby" => Ok(Profile::Symbiyosys),
            "custom" => Ok(Profile::Custom),
            other => Err(format!("unknown verifier profile `{other}`")),
        }
    }
}

/// Where the script template comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptSource {
    Inline(String),
    /// Read when each mutant is prepared; a missing file fails only that mutant
    File(PathBuf),
}

/// Complete verifier configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EquivConfig {
    pub profile: Profile,
    /// Program name (looked up on `PATH`) or explicit path
    pub program: String,
    /// Argument templates
    pub args: Vec<String>,
    pub script: ScriptSource,
    /// File name template for the rendered script inside the work directory
    pub script_name: String,
    pub pass_marker: String,
    pub fail_marker: String,
    /// Wall-clock limit per verifier run
    pub timeout: Duration,
    pub max_concurrent: usize,
}

impl Default for EquivConfig {
    fn default() -> Self {
        Self::for_profile(Profile::Jasper)
    }
}

impl EquivConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
    pub const DEFAULT_MAX_CONCURRENT: usize = 32;

    pub fn for_profile(profile: Profile) -> Self {
        let base = Self {
            profile,
            program: "jg".to_string(),
            args: ["-no_gui", "-tcl", "{script}", "-proj", "{work_dir}/jgproject"]
                .map(String::from)
                .to_vec(),
            script: ScriptSource::Inline(JASPER_TEMPLATE.to_string()),
            script_name: "{id}.tcl".to_string(),
            pass_marker: JASPER_PASS_MARKER.to_string(),
            fail_marker: JASPER_FAIL_MARKER.to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
            max_concurrent: Self::DEFAULT_MAX_CONCURRENT,
        };
        match profile {
            Profile::Jasper => base,
            Profile::Symbiyosys => Self {
                program: "sby".to_string(),
                args: ["-f", "{script}"].map(String::from).to_vec(),
                script: ScriptSource::Inline(SBY_TEMPLATE.to_string()),
                script_name: "{id}.sby".to_string(),
                pass_marker: r"DONE \(PASS".to_string(),
                fail_marker: r"DONE \(FAIL".to_string(),
                ..base
            },
            Profile::Custom => Self {
                program: String::new(),
                args: vec!["{script}".to_string()],
                ..base
            },
        }
    }

    /// Load a JSON config file; fields it omits keep their profile defaults.
    pub fn from_file(path: &Path) -> EquivResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| EquivError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| EquivError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let file: ConfigFile = serde_json::from_str(text)?;
        Ok(file.resolve())
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_script(mut self, script: ScriptSource) -> Self {
        self.script = script;
        self
    }

    pub fn with_script_name(mut self, name: impl Into<String>) -> Self {
        self.script_name = name.into();
        self
    }

    pub fn with_markers(mut self, pass: impl Into<String>, fail: impl Into<String>) -> Self {
        self.pass_marker = pass.into();
        self.fail_marker = fail.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Check the config and compile its markers.
    pub fn validate(&self) -> EquivResult<Markers> {
        if self.program.trim().is_empty() {
            return Err(EquivError::MissingProgram);
        }
        if self.max_concurrent == 0 {
            return Err(EquivError::ZeroConcurrency);
        }
        Markers::new(&self.pass_marker, &self.fail_marker)
    }
}

/// On-disk shape of a config file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    profile: Option<Profile>,
    program: Option<String>,
    args: Option<Vec<String>>,
    script_template: Option<String>,
    script_template_file: Option<PathBuf>,
    script_name: Option<String>,
    pass_marker: Option<String>,
    fail_marker: Option<String>,
    timeout_secs: Option<u64>,
    max_concurrent: Option<usize>,
}

impl ConfigFile {
    fn resolve(self) -> EquivConfig {
        let mut config = EquivConfig::for_profile(self.profile.unwrap_or_default());
        if let Some(program) = self.program {
            config.program = program;
        }
        if let Some(args) = self.args {
            config.args = args;
        }
        if let Some(path) = self.script_template_file {
            config.script = ScriptSource::File(path);
        }
        if let Some(text) = self.script_template {
            config.script = ScriptSource::Inline(text);
        }
        if let Some(name) = self.script_name {
            config.script_name = name;
        }
        if let Some(marker) = self.pass_marker {
            config.pass_marker = marker;
        }
        if let Some(marker) = self.fail_marker {
            config.fail_marker = marker;
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = self.max_concurrent {
            config.max_concurrent = n;
        }
        config
    }
}

/// Compiled pass/fail markers.
#[derive(Debug, Clone)]
pub struct Markers {
    pass: Regex,
    fail: Regex,
}

impl Markers {
    pub fn new(pass: &str, fail: &str) -> EquivResult<Self> {
        let compile = |which: &'static str, pattern: &str| {
            Regex::new(pattern).map_err(|source| EquivError::Marker {
                which,
                pattern: pattern.to_string(),
                source,
            })
        };
        Ok(Self {
            pass: compile("pass", pass)?,
            fail: compile("fail", fail)?,
        })
    }

    pub fn is_fail(&self, output: &str) -> bool {
        self.fail.is_match(output)
    }

    pub fn is_pass(&self, output: &str) -> bool {
        self.pass.is_match(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EquivConfig::default();
        assert_eq!(config.profile, Profile::Jasper);
        assert_eq!(config.program, "jg");
        assert_eq!(config.timeout, Duration::from_secs(600));
        assert_eq!(config.max_concurrent, 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_symbiyosys_profile() {
        let config = EquivConfig::for_profile(Profile::Symbiyosys);
        assert_eq!(config.program, "sby");
        assert_eq!(config.args, vec!["-f", "{script}"]);
        let markers = config.validate().expect("markers");
        assert!(markers.is_pass("SBY 12:00:01 [job] DONE (PASS, rc=0)"));
        assert!(markers.is_fail("SBY 12:00:01 [job] DONE (FAIL, rc=2)"));
    }

    #[test]
    fn test_file_overrides_profile_defaults() {
        let config = EquivConfig::from_json(
            r#"{"profile": "custom", "program": "sh", "args": ["-c", "echo hi"], "timeout_secs": 5}"#,
        )
        .expect("parse");
        assert_eq!(config.profile, Profile::Custom);
        assert_eq!(config.program, "sh");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.pass_marker, JASPER_PASS_MARKER);
        assert_eq!(config.max_concurrent, 32);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(EquivConfig::from_json(r#"{"programme": "jg"}"#).is_err());
    }

    #[test]
    fn test_custom_requires_program() {
        let config = EquivConfig::for_profile(Profile::Custom);
        assert!(matches!(config.validate(), Err(EquivError::MissingProgram)));
    }

    #[test]
    fn test_bad_marker() {
        let config = EquivConfig::default().with_markers("(", "FAIL");
        assert!(matches!(
            config.validate(),
            Err(EquivError::Marker { which: "pass", .. })
        ));
    }

    #[test]
    fn test_jasper_markers_anchor_to_line_start() {
        let markers = EquivConfig::default().validate().expect("markers");
        assert!(markers.is_pass("info\nPAPERCUT_EQUIV: PASS\n"));
        assert!(!markers.is_pass("puts \"PAPERCUT_EQUIV: PASS\""));
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!("SBY".parse::<Profile>(), Ok(Profile::Symbiyosys));
        assert!("yosys".parse::<Profile>().is_err());
    }
}
