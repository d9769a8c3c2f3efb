//! Architecture description (Open Threat Model) parsing and pre-import
//! validation.
//!
//! The document is only inspected here, never rewritten: the exact source
//! text is what gets uploaded to the platform.

use crate::error::{Result, ThreatDiffError};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Raw architecture description as provided by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchitectureSource {
    /// Name used in logs and provenance (usually the file name)
    pub name: String,
    /// Document text, YAML or JSON
    pub content: String,
}

impl ArchitectureSource {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Read a description from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ThreatDiffError::io(path, e))?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self { name, content })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtmDocument {
    pub otm_version: Option<String>,
    pub project: Option<OtmProject>,
    #[serde(default)]
    pub trust_zones: Vec<OtmTrustZone>,
    #[serde(default)]
    pub components: Vec<OtmComponent>,
    #[serde(default)]
    pub dataflows: Vec<OtmDataflow>,
    /// Sections not inspected here (representations, threats, mitigations)
    #[serde(flatten)]
    pub other: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtmProject {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtmTrustZone {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub risk: Option<OtmRisk>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtmRisk {
    pub trust_rating: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtmComponent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub component_type: Option<String>,
    pub parent: Option<OtmParent>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtmParent {
    pub trust_zone: Option<String>,
    pub component: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtmDataflow {
    #[serde(default)]
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A description that passed validation and may be imported.
#[derive(Debug, Clone)]
pub struct ValidatedArchitecture {
    source: ArchitectureSource,
    document: OtmDocument,
}

impl ValidatedArchitecture {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.source.name
    }

    /// The untouched document text to upload.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.source.content
    }

    #[must_use]
    pub const fn document(&self) -> &OtmDocument {
        &self.document
    }

    /// Project id declared by the document, if any.
    #[must_use]
    pub fn project_id(&self) -> Option<&str> {
        self.document
            .project
            .as_ref()
            .map(|p| p.id.as_str())
            .filter(|id| !id.is_empty())
    }
}

/// Parser and validator for architecture descriptions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchitectureParser;

impl ArchitectureParser {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Parse and fully validate a description.
    pub fn parse(&self, source: &ArchitectureSource) -> Result<ValidatedArchitecture> {
        if source.content.trim().is_empty() {
            return Err(ThreatDiffError::malformed_architecture(
                &source.name,
                "document is empty",
            ));
        }
        // JSON is valid YAML, so one deserializer handles both.
        let document: OtmDocument = serde_yaml::from_str(&source.content).map_err(|e| {
            ThreatDiffError::malformed_architecture(&source.name, format!("cannot parse: {e}"))
        })?;
        validate(&document)?;
        tracing::debug!(
            source = %source.name,
            components = document.components.len(),
            dataflows = document.dataflows.len(),
            trust_zones = document.trust_zones.len(),
            "Validated architecture description"
        );
        Ok(ValidatedArchitecture {
            source: source.clone(),
            document,
        })
    }
}

fn validate(doc: &OtmDocument) -> Result<()> {
    let version = doc.otm_version.as_deref().unwrap_or_default();
    if version.trim().is_empty() {
        return Err(ThreatDiffError::malformed_architecture(
            "otmVersion",
            "missing document version",
        ));
    }
    let project = doc.project.as_ref().ok_or_else(|| {
        ThreatDiffError::malformed_architecture("project", "missing project section")
    })?;
    if project.id.trim().is_empty() {
        return Err(ThreatDiffError::malformed_architecture("project", "missing project id"));
    }

    let mut ids: HashSet<&str> = HashSet::new();
    let require_id = |kind: &str, index: usize, id: &str| -> Result<()> {
        if id.trim().is_empty() {
            return Err(ThreatDiffError::malformed_architecture(
                format!("{kind}[{index}]"),
                "missing id",
            ));
        }
        Ok(())
    };
    for (i, zone) in doc.trust_zones.iter().enumerate() {
        require_id("trustZones", i, &zone.id)?;
    }
    for (i, component) in doc.components.iter().enumerate() {
        require_id("components", i, &component.id)?;
    }
    for (i, flow) in doc.dataflows.iter().enumerate() {
        require_id("dataflows", i, &flow.id)?;
    }

    let all_ids = doc
        .trust_zones
        .iter()
        .map(|z| z.id.as_str())
        .chain(doc.components.iter().map(|c| c.id.as_str()))
        .chain(doc.dataflows.iter().map(|d| d.id.as_str()));
    for id in all_ids {
        if !ids.insert(id) {
            return Err(ThreatDiffError::malformed_architecture(id, "duplicate id"));
        }
    }

    let zones: HashSet<&str> = doc.trust_zones.iter().map(|z| z.id.as_str()).collect();
    let components: HashSet<&str> = doc.components.iter().map(|c| c.id.as_str()).collect();
    let mut component_parent: HashMap<&str, &str> = HashMap::new();

    for component in &doc.components {
        let Some(parent) = &component.parent else {
            continue;
        };
        match (parent.trust_zone.as_deref(), parent.component.as_deref()) {
            (Some(zone), None) => {
                if !zones.contains(zone) {
                    return Err(ThreatDiffError::malformed_architecture(
                        &component.id,
                        format!("parent trust zone '{zone}' does not exist"),
                    ));
                }
            }
            (None, Some(parent_id)) => {
                if !components.contains(parent_id) {
                    return Err(ThreatDiffError::malformed_architecture(
                        &component.id,
                        format!("parent component '{parent_id}' does not exist"),
                    ));
                }
                component_parent.insert(component.id.as_str(), parent_id);
            }
            (Some(_), Some(_)) => {
                return Err(ThreatDiffError::malformed_architecture(
                    &component.id,
                    "parent names both a trust zone and a component",
                ))
            }
            (None, None) => {
                return Err(ThreatDiffError::malformed_architecture(
                    &component.id,
                    "parent names neither a trust zone nor a component",
                ))
            }
        }
    }

    // Walk in document order so the reported component is stable.
    for component in &doc.components {
        let start = component.id.as_str();
        let mut seen = HashSet::from([start]);
        let mut cursor = component_parent.get(start);
        while let Some(next) = cursor {
            if !seen.insert(*next) {
                return Err(ThreatDiffError::malformed_architecture(
                    start,
                    "component containment cycle",
                ));
            }
            cursor = component_parent.get(next);
        }
    }

    for flow in &doc.dataflows {
        for (role, endpoint) in [("source", &flow.source), ("destination", &flow.destination)] {
            if !components.contains(endpoint.as_str()) {
                return Err(ThreatDiffError::malformed_architecture(
                    &flow.id,
                    format!("{role} '{endpoint}' is not a component"),
                ));
            }
        }
    }
    Ok(())
}
