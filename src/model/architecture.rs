//! Architecture records extracted from a diagram: components, dataflows and
//! trust zones.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A component placed on the architecture diagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// Diagram node identifier
    pub id: String,
    /// Stable reference key that survives re-imports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    /// Display label
    pub name: String,
    /// Component type (`generic` when the diagram does not say)
    pub component_type: String,
    /// Enclosing trust zone, resolved from containment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_zone: Option<String>,
    /// Enclosing component, resolved from containment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_component: Option<String>,
    /// Free-form semantic attributes (description, technology, ...)
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Component {
    /// Create a component with the default type and no placement.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reference_id: None,
            name: name.into(),
            component_type: DEFAULT_COMPONENT_TYPE.to_string(),
            trust_zone: None,
            parent_component: None,
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_reference_id(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    #[must_use]
    pub fn with_type(mut self, component_type: impl Into<String>) -> Self {
        self.component_type = component_type.into();
        self
    }

    #[must_use]
    pub fn in_trust_zone(mut self, zone_id: impl Into<String>) -> Self {
        self.trust_zone = Some(zone_id.into());
        self
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Type assigned to components the diagram leaves untyped.
pub const DEFAULT_COMPONENT_TYPE: &str = "generic";

/// A data flow between two diagram nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Dataflow {
    /// Diagram edge identifier
    pub id: String,
    /// Edge label
    #[serde(default)]
    pub name: String,
    /// Source node id
    pub source: String,
    /// Destination node id
    pub destination: String,
    /// Data-type labels, sorted and de-duplicated
    #[serde(default)]
    pub data_types: Vec<String>,
    /// Transport protocol, if labelled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// True when source and destination sit in different trust zones
    #[serde(default)]
    pub crosses_trust_boundary: bool,
    /// Other semantic attributes
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Dataflow {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            source: source.into(),
            destination: destination.into(),
            data_types: Vec::new(),
            protocol: None,
            crosses_trust_boundary: false,
            properties: BTreeMap::new(),
        }
    }

    /// Replace the data types, normalizing them to a sorted set.
    #[must_use]
    pub fn with_data_types<I, S>(mut self, data_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.data_types = normalize_labels(data_types);
        self
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    #[must_use]
    pub const fn crossing_boundary(mut self, crosses: bool) -> Self {
        self.crosses_trust_boundary = crosses;
        self
    }

    /// Composite identity used when edge ids are regenerated:
    /// source, destination and the data-type set.
    #[must_use]
    pub fn composite_key(&self) -> String {
        format!(
            "{}->{}[{}]",
            self.source,
            self.destination,
            self.data_types.join(",")
        )
    }
}

/// Trust level classification of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ZoneType {
    Internal,
    External,
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::External => write!(f, "external"),
        }
    }
}

impl ZoneType {
    /// Parse a zone type label, accepting common synonyms.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "internal" | "private" | "trusted" => Some(Self::Internal),
            "external" | "public" | "untrusted" | "internet" => Some(Self::External),
            _ => None,
        }
    }

    /// Zones rated at or below this value are treated as external when the
    /// diagram does not label them.
    pub const EXTERNAL_RATING_CEILING: u8 = 30;

    /// Derive a zone type from a trust rating.
    #[must_use]
    pub const fn from_rating(rating: u8) -> Self {
        if rating <= Self::EXTERNAL_RATING_CEILING {
            Self::External
        } else {
            Self::Internal
        }
    }
}

/// A named security boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrustZone {
    pub id: String,
    pub name: String,
    /// Ordinal trust rating (higher is more trusted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_rating: Option<u8>,
    pub zone_type: ZoneType,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl TrustZone {
    pub fn new(id: impl Into<String>, name: impl Into<String>, zone_type: ZoneType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            trust_rating: None,
            zone_type,
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn with_rating(mut self, rating: u8) -> Self {
        self.trust_rating = Some(rating);
        self
    }
}

/// Trim, drop empties, sort and de-duplicate a list of labels.
pub fn normalize_labels<I, S>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = labels
        .into_iter()
        .map(Into::into)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_key_ignores_label_order() {
        let a = Dataflow::new("e1", "web", "db").with_data_types(["pii", "credentials"]);
        let b = Dataflow::new("e2", "web", "db").with_data_types(["credentials", "pii", "pii"]);
        assert_eq!(a.composite_key(), b.composite_key());
    }

    #[test]
    fn test_zone_type_from_rating() {
        assert_eq!(ZoneType::from_rating(1), ZoneType::External);
        assert_eq!(ZoneType::from_rating(30), ZoneType::External);
        assert_eq!(ZoneType::from_rating(31), ZoneType::Internal);
    }

    #[test]
    fn test_zone_type_labels() {
        assert_eq!(ZoneType::from_label(" Public "), Some(ZoneType::External));
        assert_eq!(ZoneType::from_label("internal"), Some(ZoneType::Internal));
        assert_eq!(ZoneType::from_label("dmz"), None);
    }

    #[test]
    fn test_normalize_labels() {
        assert_eq!(
            normalize_labels(["b", " a ", "", "b"]),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
