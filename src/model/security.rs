//! Security records computed by the remote platform: threats and the
//! countermeasures that mitigate them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Ordinal threat severity.
///
/// Ordering follows risk: `Unknown < VeryLow < ... < Critical`. `Unknown` is
/// never part of a severity comparison.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Unknown,
    VeryLow,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Parse a severity label such as `"HIGH"`, `"very-low"` or `"Very Low"`.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "verylow" | "info" | "informational" => Some(Self::VeryLow),
            "low" => Some(Self::Low),
            "medium" | "moderate" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "veryhigh" => Some(Self::Critical),
            "unknown" | "none" | "unset" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Map a numeric rating (1 = very low ... 5 = critical).
    #[must_use]
    pub const fn from_ordinal(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Unknown),
            1 => Some(Self::VeryLow),
            2 => Some(Self::Low),
            3 => Some(Self::Medium),
            4 => Some(Self::High),
            5 => Some(Self::Critical),
            _ => None,
        }
    }

    /// Numeric rank; `Unknown` is 0.
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::VeryLow => 1,
            Self::Low => 2,
            Self::Medium => 3,
            Self::High => 4,
            Self::Critical => 5,
        }
    }

    /// True when `self` is a known severity strictly above a known `before`.
    #[must_use]
    pub fn is_increase_over(self, before: Self) -> bool {
        self != Self::Unknown && before != Self::Unknown && self > before
    }

    /// Label used in diffs and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::VeryLow => "VERY_LOW",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a free-text state label to kebab-case.
fn kebab(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut prev_lower = false;
    for c in label.trim().chars() {
        if c == '_' || c == ' ' || c == '-' {
            if !out.ends_with('-') && !out.is_empty() {
                out.push('-');
            }
            prev_lower = false;
        } else if c.is_uppercase() {
            if prev_lower && !out.ends_with('-') {
                out.push('-');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out.trim_end_matches('-').to_string()
}

/// Lifecycle state of a threat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ThreatState {
    Exposed,
    Accepted,
    Mitigated,
    PartlyMitigated,
    NotApplicable,
    Hidden,
    /// Any state the platform reports that is not modelled above
    Other(String),
}

impl From<String> for ThreatState {
    fn from(label: String) -> Self {
        match kebab(&label).as_str() {
            "exposed" | "expose" => Self::Exposed,
            "accepted" | "accept" => Self::Accepted,
            "mitigated" | "mitigate" => Self::Mitigated,
            "partly-mitigated" | "partially-mitigated" | "partly-mitigate" => Self::PartlyMitigated,
            "not-applicable" | "na" | "n-a" => Self::NotApplicable,
            "hidden" => Self::Hidden,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<ThreatState> for String {
    fn from(state: ThreatState) -> Self {
        state.to_string()
    }
}

impl fmt::Display for ThreatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exposed => write!(f, "exposed"),
            Self::Accepted => write!(f, "accepted"),
            Self::Mitigated => write!(f, "mitigated"),
            Self::PartlyMitigated => write!(f, "partly-mitigated"),
            Self::NotApplicable => write!(f, "not-applicable"),
            Self::Hidden => write!(f, "hidden"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Implementation state of a countermeasure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ControlState {
    Required,
    Recommended,
    Implemented,
    Rejected,
    NotApplicable,
    Other(String),
}

impl From<String> for ControlState {
    fn from(label: String) -> Self {
        match kebab(&label).as_str() {
            "required" => Self::Required,
            "recommended" => Self::Recommended,
            "implemented" => Self::Implemented,
            "rejected" => Self::Rejected,
            "not-applicable" | "na" | "n-a" => Self::NotApplicable,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<ControlState> for String {
    fn from(state: ControlState) -> Self {
        state.to_string()
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "required"),
            Self::Recommended => write!(f, "recommended"),
            Self::Implemented => write!(f, "implemented"),
            Self::Rejected => write!(f, "rejected"),
            Self::NotApplicable => write!(f, "not-applicable"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// A threat computed against the architecture.
///
/// Fields the schema does not model are kept in `extra` so a change to any of
/// them still shows up as a modification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Threat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub state: Option<ThreatState>,
    /// Raw ids of affected components, sorted
    #[serde(default)]
    pub component_ids: Vec<String>,
    /// Raw ids of related dataflows, sorted
    #[serde(default)]
    pub dataflow_ids: Vec<String>,
    /// Category tags, sorted
    #[serde(default)]
    pub categories: Vec<String>,
    /// Unmodelled fields, preserved verbatim
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

impl Threat {
    /// Create a threat with an id and name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            reference_id: None,
            name: name.into(),
            description: String::new(),
            severity: Severity::Unknown,
            state: None,
            component_ids: Vec::new(),
            dataflow_ids: Vec::new(),
            categories: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_reference_id(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    #[must_use]
    pub const fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: ThreatState) -> Self {
        self.state = Some(state);
        self
    }

    #[must_use]
    pub fn affecting<I, S>(mut self, component_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.component_ids = super::normalize_labels(component_ids);
        self
    }

    /// Identity shown to users: id, or reference id when the id is absent.
    #[must_use]
    pub fn display_key(&self) -> &str {
        self.id
            .as_deref()
            .or(self.reference_id.as_deref())
            .unwrap_or_default()
    }

    /// Whether `reference` names this threat by id or reference id.
    #[must_use]
    pub fn is_named_by(&self, reference: &str) -> bool {
        self.id.as_deref() == Some(reference) || self.reference_id.as_deref() == Some(reference)
    }
}

/// A security control mitigating one or more threats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Countermeasure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub state: Option<ControlState>,
    /// Ids (or reference ids) of the threats this control mitigates, sorted
    #[serde(default)]
    pub threat_ids: Vec<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

impl Countermeasure {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            reference_id: None,
            name: name.into(),
            description: String::new(),
            state: None,
            threat_ids: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_reference_id(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: ControlState) -> Self {
        self.state = Some(state);
        self
    }

    #[must_use]
    pub fn mitigating<I, S>(mut self, threat_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.threat_ids = super::normalize_labels(threat_ids);
        self
    }

    #[must_use]
    pub fn display_key(&self) -> &str {
        self.id
            .as_deref()
            .or(self.reference_id.as_deref())
            .unwrap_or_default()
    }
}
