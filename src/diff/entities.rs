//! [`DiffableEntity`] implementations for the model records.

use super::traits::{DiffableEntity, EntityKind, MatchKey};
use crate::model::{Component, Countermeasure, Dataflow, Threat, TrustZone};
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Fields never compared: they carry identity, not content.
const IDENTITY_FIELDS: &[&str] = &["id", "referenceId"];

/// Serialize a record into a flat field map.
///
/// Open maps listed in `nested` are expanded into `"<map>.<key>"` entries so
/// a change to one property is reported on its own.
pub(crate) fn flatten_fields<T: Serialize>(record: &T, nested: &[&str]) -> BTreeMap<String, Value> {
    let Ok(Value::Object(map)) = serde_json::to_value(record) else {
        return BTreeMap::new();
    };
    let mut fields = BTreeMap::new();
    for (key, value) in map {
        if IDENTITY_FIELDS.contains(&key.as_str()) {
            continue;
        }
        match value {
            Value::Object(inner) if nested.contains(&key.as_str()) => {
                for (inner_key, inner_value) in inner {
                    fields.insert(format!("{key}.{inner_key}"), inner_value);
                }
            }
            other => {
                fields.insert(key, other);
            }
        }
    }
    fields
}

impl DiffableEntity for Component {
    const KIND: EntityKind = EntityKind::Component;
    const FALLBACK: Option<MatchKey> = Some(MatchKey::ReferenceId);

    fn primary_key(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn fallback_key(&self) -> Option<Cow<'_, str>> {
        self.reference_id.as_deref().map(Cow::Borrowed)
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn reference_id(&self) -> Option<&str> {
        self.reference_id.as_deref()
    }

    fn field_map(&self) -> BTreeMap<String, Value> {
        flatten_fields(self, &["properties"])
    }
}

impl DiffableEntity for Dataflow {
    const KIND: EntityKind = EntityKind::Dataflow;
    const FALLBACK: Option<MatchKey> = Some(MatchKey::CompositeKey);

    fn primary_key(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn fallback_key(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Owned(self.composite_key()))
    }

    fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    fn field_map(&self) -> BTreeMap<String, Value> {
        flatten_fields(self, &["properties"])
    }
}

impl DiffableEntity for TrustZone {
    const KIND: EntityKind = EntityKind::TrustZone;
    const FALLBACK: Option<MatchKey> = None;

    fn primary_key(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn fallback_key(&self) -> Option<Cow<'_, str>> {
        None
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn field_map(&self) -> BTreeMap<String, Value> {
        flatten_fields(self, &["properties"])
    }
}

impl DiffableEntity for Threat {
    const KIND: EntityKind = EntityKind::Threat;
    const FALLBACK: Option<MatchKey> = Some(MatchKey::ReferenceId);

    fn primary_key(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn fallback_key(&self) -> Option<Cow<'_, str>> {
        self.reference_id.as_deref().map(Cow::Borrowed)
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn reference_id(&self) -> Option<&str> {
        self.reference_id.as_deref()
    }

    fn field_map(&self) -> BTreeMap<String, Value> {
        flatten_fields(self, &["extra"])
    }
}

impl DiffableEntity for Countermeasure {
    const KIND: EntityKind = EntityKind::Countermeasure;
    const FALLBACK: Option<MatchKey> = Some(MatchKey::ReferenceId);

    fn primary_key(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn fallback_key(&self) -> Option<Cow<'_, str>> {
        self.reference_id.as_deref().map(Cow::Borrowed)
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn reference_id(&self) -> Option<&str> {
        self.reference_id.as_deref()
    }

    fn field_map(&self) -> BTreeMap<String, Value> {
        flatten_fields(self, &["extra"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;

    #[test]
    fn test_identity_fields_excluded() {
        let threat = Threat::new("t1", "Spoofing").with_reference_id("SPOOF");
        let fields = threat.field_map();
        assert!(!fields.contains_key("id"));
        assert!(!fields.contains_key("referenceId"));
        assert_eq!(fields["name"], Value::from("Spoofing"));
    }

    #[test]
    fn test_open_maps_are_flattened() {
        let mut threat = Threat::new("t1", "Spoofing").with_severity(Severity::High);
        threat.extra.insert("owner".into(), Value::from("team-a"));
        let fields = threat.field_map();
        assert_eq!(fields["extra.owner"], Value::from("team-a"));
        assert_eq!(fields["severity"], Value::from("HIGH"));
        assert!(!fields.contains_key("extra"));

        let component = Component::new("c", "Web").with_property("technology", "nginx");
        assert_eq!(component.field_map()["properties.technology"], Value::from("nginx"));
    }
}
