//! Threat and countermeasure collection parser.
//!
//! Platforms have shipped several JSON shapes over time: a bare array, a
//! HAL-style `_embedded.items` envelope, and plain `items`/`threats`
//! envelopes. Field names vary too (`riskRating` vs `severity`, `status` vs
//! `state`). Each record is normalized on its own; anything not modelled
//! ends up in `extra` so it still participates in the diff.

use crate::error::{ArtifactKind, Result, ThreatDiffError};
use crate::model::{normalize_labels, ControlState, Countermeasure, Severity, Threat, ThreatState};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const ID_KEYS: &[&str] = &["id", "uuid"];
const REFERENCE_KEYS: &[&str] = &["referenceId", "ref"];
const NAME_KEYS: &[&str] = &["name", "title"];
const DESCRIPTION_KEYS: &[&str] = &["description", "desc"];
const SEVERITY_KEYS: &[&str] = &["severity", "riskRating", "risk", "inherentRisk"];
const THREAT_STATE_KEYS: &[&str] = &["state", "status"];
const CONTROL_STATE_KEYS: &[&str] = &["state", "status", "implementationState"];
const COMPONENT_KEYS: &[&str] = &["componentIds", "affectedComponents", "components", "component"];
const DATAFLOW_KEYS: &[&str] = &["dataflowIds", "dataflows", "relatedDataflows"];
const CATEGORY_KEYS: &[&str] = &["categories", "category", "tags"];
const THREAT_REF_KEYS: &[&str] = &["threatIds", "threats", "mitigates"];

/// Parsed security collections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArtifacts {
    pub threats: Vec<Threat>,
    pub countermeasures: Vec<Countermeasure>,
}

/// Parser for the threat and countermeasure JSON collections.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityArtifactParser;

impl SecurityArtifactParser {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Parse both collections.
    pub fn parse(&self, threats: &str, countermeasures: &str) -> Result<ParsedArtifacts> {
        Ok(ParsedArtifacts {
            threats: self.parse_threats(threats)?,
            countermeasures: self.parse_countermeasures(countermeasures)?,
        })
    }

    pub fn parse_threats(&self, json: &str) -> Result<Vec<Threat>> {
        let records = records(json, ArtifactKind::Threats)?;
        let threats = records
            .into_iter()
            .map(normalize_threat)
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(count = threats.len(), "Parsed threats");
        Ok(threats)
    }

    pub fn parse_countermeasures(&self, json: &str) -> Result<Vec<Countermeasure>> {
        let records = records(json, ArtifactKind::Countermeasures)?;
        let countermeasures = records
            .into_iter()
            .map(normalize_countermeasure)
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(count = countermeasures.len(), "Parsed countermeasures");
        Ok(countermeasures)
    }
}

/// Unwrap the record list from whichever envelope the document uses.
fn records(json: &str, kind: ArtifactKind) -> Result<Vec<Map<String, Value>>> {
    if json.trim().is_empty() {
        return Err(ThreatDiffError::malformed_artifact(kind, "", "empty document"));
    }
    let root: Value = serde_json::from_str(json)
        .map_err(|e| ThreatDiffError::malformed_artifact(kind, json, format!("invalid JSON: {e}")))?;

    let collection_key = match kind {
        ArtifactKind::Threats => "threats",
        ArtifactKind::Countermeasures => "countermeasures",
    };
    let items = match root {
        Value::Array(items) => items,
        Value::Object(mut envelope) => {
            let embedded = envelope
                .get_mut("_embedded")
                .and_then(|e| e.get_mut("items"))
                .map(Value::take);
            let found = embedded.or_else(|| {
                ["items", collection_key, "content", "data"]
                    .iter()
                    .find_map(|key| envelope.remove(*key))
            });
            match found {
                Some(Value::Array(items)) => items,
                Some(other) => {
                    return Err(ThreatDiffError::malformed_artifact(
                        kind,
                        other.to_string(),
                        "collection is not an array",
                    ))
                }
                None => {
                    return Err(ThreatDiffError::malformed_artifact(
                        kind,
                        Value::Object(envelope).to_string(),
                        "no record collection found",
                    ))
                }
            }
        }
        other => {
            return Err(ThreatDiffError::malformed_artifact(
                kind,
                other.to_string(),
                "expected an array or an envelope object",
            ))
        }
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            other => Err(ThreatDiffError::malformed_artifact(
                kind,
                other.to_string(),
                "record is not an object",
            )),
        })
        .collect()
}

/// Removes aliased fields from one record, remembering the original for
/// error reports.
struct Record {
    kind: ArtifactKind,
    fields: Map<String, Value>,
    original: String,
}

impl Record {
    fn new(kind: ArtifactKind, fields: Map<String, Value>) -> Self {
        let original = Value::Object(fields.clone()).to_string();
        Self {
            kind,
            fields,
            original,
        }
    }

    fn error(&self, message: impl Into<String>) -> ThreatDiffError {
        ThreatDiffError::malformed_artifact(self.kind, self.original.clone(), message)
    }

    /// Take the first present alias as `(key, value)`.
    fn take(&mut self, keys: &[&str]) -> Option<(String, Value)> {
        keys.iter()
            .find_map(|key| self.fields.remove_entry(*key))
    }

    fn take_string(&mut self, keys: &[&str]) -> Result<Option<String>> {
        match self.take(keys) {
            None | Some((_, Value::Null)) => Ok(None),
            Some((_, Value::String(s))) => Ok(Some(s).filter(|s| !s.trim().is_empty())),
            Some((_, Value::Number(n))) => Ok(Some(n.to_string())),
            Some((key, _)) => Err(self.error(format!("field '{key}' must be a string"))),
        }
    }

    fn take_id_list(&mut self, keys: &[&str]) -> Result<Vec<String>> {
        let Some((key, value)) = self.take(keys) else {
            return Ok(Vec::new());
        };
        let items = match value {
            Value::Null => Vec::new(),
            Value::Array(items) => items,
            single => vec![single],
        };
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::String(s) => ids.push(s),
                Value::Number(n) => ids.push(n.to_string()),
                Value::Object(obj) => {
                    let id = ["id", "referenceId", "ref"]
                        .iter()
                        .find_map(|k| obj.get(*k).and_then(Value::as_str));
                    match id {
                        Some(id) => ids.push(id.to_string()),
                        None => return Err(self.error(format!("entry in '{key}' has no id"))),
                    }
                }
                _ => return Err(self.error(format!("field '{key}' must list ids"))),
            }
        }
        Ok(normalize_labels(ids))
    }

    /// Interpret a severity given as a label, an ordinal or an object
    /// (`{"name": "HIGH", "value": 4}`). Unrecognized values are put back so
    /// they are preserved verbatim.
    fn take_severity(&mut self) -> Severity {
        let Some((key, value)) = self.take(SEVERITY_KEYS) else {
            return Severity::Unknown;
        };
        let severity = match &value {
            Value::String(label) => Severity::from_label(label),
            Value::Number(n) => n.as_i64().and_then(Severity::from_ordinal),
            Value::Object(obj) => obj
                .get("name")
                .and_then(Value::as_str)
                .and_then(Severity::from_label)
                .or_else(|| {
                    ["value", "level"]
                        .iter()
                        .find_map(|k| obj.get(*k).and_then(Value::as_i64))
                        .and_then(Severity::from_ordinal)
                }),
            _ => None,
        };
        match severity {
            Some(severity) => severity,
            None => {
                if !value.is_null() {
                    self.fields.insert(key, value);
                }
                Severity::Unknown
            }
        }
    }

    fn require_identity(&self, id: Option<&String>, reference_id: Option<&String>) -> Result<()> {
        if id.is_none() && reference_id.is_none() {
            return Err(self.error("record has neither id nor referenceId"));
        }
        Ok(())
    }

    fn into_extra(self) -> BTreeMap<String, Value> {
        self.fields.into_iter().collect()
    }
}

fn normalize_threat(fields: Map<String, Value>) -> Result<Threat> {
    let mut record = Record::new(ArtifactKind::Threats, fields);
    let id = record.take_string(ID_KEYS)?;
    let reference_id = record.take_string(REFERENCE_KEYS)?;
    record.require_identity(id.as_ref(), reference_id.as_ref())?;

    let name = record.take_string(NAME_KEYS)?;
    let description = record.take_string(DESCRIPTION_KEYS)?.unwrap_or_default();
    let severity = record.take_severity();
    let state = record.take_string(THREAT_STATE_KEYS)?.map(ThreatState::from);
    let component_ids = record.take_id_list(COMPONENT_KEYS)?;
    let dataflow_ids = record.take_id_list(DATAFLOW_KEYS)?;
    let categories = record.take_id_list(CATEGORY_KEYS)?;

    let display = reference_id.clone().or_else(|| id.clone()).unwrap_or_default();
    Ok(Threat {
        id,
        reference_id,
        name: name.unwrap_or(display),
        description,
        severity,
        state,
        component_ids,
        dataflow_ids,
        categories,
        extra: record.into_extra(),
    })
}

fn normalize_countermeasure(fields: Map<String, Value>) -> Result<Countermeasure> {
    let mut record = Record::new(ArtifactKind::Countermeasures, fields);
    let id = record.take_string(ID_KEYS)?;
    let reference_id = record.take_string(REFERENCE_KEYS)?;
    record.require_identity(id.as_ref(), reference_id.as_ref())?;

    let name = record.take_string(NAME_KEYS)?;
    let description = record.take_string(DESCRIPTION_KEYS)?.unwrap_or_default();
    let state = record.take_string(CONTROL_STATE_KEYS)?.map(ControlState::from);
    let threat_ids = record.take_id_list(THREAT_REF_KEYS)?;

    let display = reference_id.clone().or_else(|| id.clone()).unwrap_or_default();
    Ok(Countermeasure {
        id,
        reference_id,
        name: name.unwrap_or(display),
        description,
        state,
        threat_ids,
        extra: record.into_extra(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_array_of_threats() {
        let json = r#"[
            {"id": "t1", "referenceId": "SQLI", "name": "SQL injection",
             "riskRating": "HIGH", "state": "exposed",
             "affectedComponents": ["db", "web"], "tags": ["injection"]}
        ]"#;
        let threats = SecurityArtifactParser::new().parse_threats(json).unwrap();
        assert_eq!(threats.len(), 1);
        let t = &threats[0];
        assert_eq!(t.reference_id.as_deref(), Some("SQLI"));
        assert_eq!(t.severity, Severity::High);
        assert_eq!(t.state, Some(ThreatState::Exposed));
        assert_eq!(t.component_ids, vec!["db", "web"]);
        assert_eq!(t.categories, vec!["injection"]);
        assert!(t.extra.is_empty());
    }

    #[test]
    fn test_embedded_envelope_and_object_references() {
        let json = r#"{"_embedded": {"items": [
            {"id": "c1", "name": "Use prepared statements", "status": "IMPLEMENTED",
             "threats": [{"id": "t1"}, {"referenceId": "XSS"}]}
        ]}, "page": {"totalPages": 1}}"#;
        let cms = SecurityArtifactParser::new()
            .parse_countermeasures(json)
            .unwrap();
        assert_eq!(cms[0].state, Some(ControlState::Implemented));
        assert_eq!(cms[0].threat_ids, vec!["XSS", "t1"]);
    }

    #[test]
    fn test_numeric_and_object_severity() {
        let json = r#"{"items": [
            {"id": "a", "severity": 5},
            {"id": "b", "risk": {"name": "Medium", "value": 3}},
            {"id": "c", "severity": "catastrophic"}
        ]}"#;
        let threats = SecurityArtifactParser::new().parse_threats(json).unwrap();
        assert_eq!(threats[0].severity, Severity::Critical);
        assert_eq!(threats[1].severity, Severity::Medium);
        assert_eq!(threats[2].severity, Severity::Unknown);
        assert_eq!(
            threats[2].extra.get("severity"),
            Some(&Value::String("catastrophic".into()))
        );
    }

    #[test]
    fn test_unknown_fields_kept_as_extra() {
        let json = r#"[{"referenceId": "T-9", "owner": "team-a", "likelihood": 2}]"#;
        let threats = SecurityArtifactParser::new().parse_threats(json).unwrap();
        let t = &threats[0];
        assert_eq!(t.id, None);
        assert_eq!(t.name, "T-9");
        assert_eq!(t.extra.len(), 2);
        assert_eq!(t.extra["likelihood"], Value::from(2));
    }

    #[test]
    fn test_record_without_identity_is_malformed() {
        let json = r#"[{"name": "anonymous"}]"#;
        match SecurityArtifactParser::new().parse_threats(json) {
            Err(ThreatDiffError::MalformedArtifact {
                artifact, fragment, ..
            }) => {
                assert_eq!(artifact, ArtifactKind::Threats);
                assert!(fragment.contains("anonymous"));
            }
            other => panic!("expected malformed artifact, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_documents() {
        let parser = SecurityArtifactParser::new();
        assert!(parser.parse_threats("").is_err());
        assert!(parser.parse_threats("{not json").is_err());
        assert!(parser.parse_threats("42").is_err());
        assert!(parser.parse_threats(r#"{"unrelated": true}"#).is_err());
        assert!(parser.parse_threats(r#"["t1"]"#).is_err());
        assert!(parser
            .parse_countermeasures(r#"[{"id": "c", "threatIds": [true]}]"#)
            .is_err());
    }

    #[test]
    fn test_empty_collections() {
        let parser = SecurityArtifactParser::new();
        let parsed = parser.parse("[]", r#"{"countermeasures": []}"#).unwrap();
        assert!(parsed.threats.is_empty());
        assert!(parsed.countermeasures.is_empty());
    }

    #[test]
    fn test_single_string_reference_becomes_list() {
        let json = r#"[{"id": "t", "component": "web", "dataflows": null}]"#;
        let threats = SecurityArtifactParser::new().parse_threats(json).unwrap();
        assert_eq!(threats[0].component_ids, vec!["web"]);
        assert!(threats[0].dataflow_ids.is_empty());
    }
}
