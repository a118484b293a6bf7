//! Template entity — the unit of work for a red-team run

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Severity of the weakness a template probes for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
            Self::Info => write!(f, "info"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            "info" => Ok(Self::Info),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// Declared variable in a template's schema.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VariableSpec {
    #[serde(rename = "type", default = "default_var_type")]
    pub var_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub required: bool,
}

fn default_var_type() -> String {
    "string".to_string()
}

/// Detection rule kinds applied to the provider response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionType {
    Contains,
    NotContains,
    Regex,
}

/// A single detection rule. A template is `detected` when any rule matches.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectionRule {
    #[serde(rename = "type")]
    pub rule_type: DetectionType,
    pub value: String,
    #[serde(default)]
    pub case_sensitive: bool,
}

/// A declarative security test case: prompt plus detection rules.
///
/// Templates are immutable once validated. Execution always works on a
/// clone produced by variable resolution; the registry keeps the original.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub severity: Severity,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, VariableSpec>,
    pub prompt: String,
    #[serde(default)]
    pub detection: Vec<DetectionRule>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Template {
    /// All `{{name}}` references appearing in the prompt body.
    pub fn variable_references(&self) -> Vec<String> {
        variable_references(&self.prompt)
    }
}

/// Template ids: lowercase alphanumeric + underscore, optional `_vMAJOR.MINOR` suffix.
pub fn is_valid_id(id: &str) -> bool {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^[a-z0-9_]+(_v\d+\.\d+)?$").expect("template id regex")
    })
    .is_match(id)
}

/// Versions: `MAJOR.MINOR`.
pub fn is_valid_version(version: &str) -> bool {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^\d+\.\d+$").expect("template version regex"))
        .is_match(version)
}

/// Extract `{{name}}` placeholder names from a prompt body, in order,
/// deduplicated.
pub fn variable_references(body: &str) -> Vec<String> {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        regex::Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder regex")
    });
    let mut seen = Vec::new();
    for cap in re.captures_iter(body) {
        let name = cap[1].to_string();
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_regex_accepts_canonical_forms() {
        assert!(is_valid_id("llm01_direct_injection_v1.0"));
        assert!(is_valid_id("probe"));
        assert!(is_valid_id("a_b_c_v12.34"));
    }

    #[test]
    fn id_regex_rejects_bad_forms() {
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("Probe"));
        assert!(!is_valid_id("has-dash"));
        assert!(!is_valid_id("spaces here"));
    }

    #[test]
    fn version_regex() {
        assert!(is_valid_version("1.0"));
        assert!(is_valid_version("12.34"));
        assert!(!is_valid_version("1"));
        assert!(!is_valid_version("1.0.0"));
        assert!(!is_valid_version("v1.0"));
    }

    #[test]
    fn placeholder_extraction_dedups_in_order() {
        let refs = variable_references("{{target}} and {{payload}}, again {{target}}");
        assert_eq!(refs, vec!["target", "payload"]);
    }

    #[test]
    fn placeholder_allows_padding() {
        assert_eq!(variable_references("{{ name }}"), vec!["name"]);
    }

    #[test]
    fn severity_roundtrip() {
        let s: Severity = "critical".parse().unwrap();
        assert_eq!(s, Severity::Critical);
        assert_eq!(s.to_string(), "critical");
        assert!("catastrophic".parse::<Severity>().is_err());
    }
}
