//! Immutable threat-model snapshots.

use super::{Component, Countermeasure, Dataflow, Threat, TrustZone};
use crate::error::DanglingReference;
use crate::utils::content_hash;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a snapshot's content came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Provenance {
    /// A tagged version of a remote project
    #[serde(rename_all = "camelCase")]
    TaggedVersion {
        project_id: String,
        version_id: String,
    },
    /// The current live state of a remote project
    #[serde(rename_all = "camelCase")]
    LiveState { project_id: String },
    /// A freshly imported architecture description, downloaded through a
    /// transient version
    #[serde(rename_all = "camelCase")]
    ImportedArchitecture {
        project_id: String,
        source_name: String,
        transient_version_id: String,
    },
    /// Files on the local disk
    #[serde(rename_all = "camelCase")]
    Local { label: String },
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TaggedVersion {
                project_id,
                version_id,
            } => write!(f, "{project_id}@{version_id}"),
            Self::LiveState { project_id } => write!(f, "{project_id} (live)"),
            Self::ImportedArchitecture {
                project_id,
                source_name,
                ..
            } => write!(f, "{project_id} + {source_name}"),
            Self::Local { label } => write!(f, "{label}"),
        }
    }
}

/// A read-only bundle of architecture and security records.
///
/// Built once per comparison side through [`SnapshotBuilder`]; there is no
/// way to mutate a snapshot after `build()`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    provenance: Provenance,
    components: Vec<Component>,
    dataflows: Vec<Dataflow>,
    trust_zones: Vec<TrustZone>,
    threats: Vec<Threat>,
    countermeasures: Vec<Countermeasure>,
    /// References that did not resolve while parsing this snapshot
    warnings: Vec<DanglingReference>,
    #[serde(skip)]
    content_hash: u64,
}

impl Snapshot {
    /// Start building a snapshot.
    pub fn builder(provenance: Provenance) -> SnapshotBuilder {
        SnapshotBuilder {
            provenance,
            components: Vec::new(),
            dataflows: Vec::new(),
            trust_zones: Vec::new(),
            threats: Vec::new(),
            countermeasures: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub const fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    #[must_use]
    pub fn dataflows(&self) -> &[Dataflow] {
        &self.dataflows
    }

    #[must_use]
    pub fn trust_zones(&self) -> &[TrustZone] {
        &self.trust_zones
    }

    #[must_use]
    pub fn threats(&self) -> &[Threat] {
        &self.threats
    }

    #[must_use]
    pub fn countermeasures(&self) -> &[Countermeasure] {
        &self.countermeasures
    }

    #[must_use]
    pub fn warnings(&self) -> &[DanglingReference] {
        &self.warnings
    }

    /// Hash over all entity content (not provenance or warnings).
    #[must_use]
    pub const fn content_hash(&self) -> u64 {
        self.content_hash
    }

    /// Total number of records across all collections.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.components.len()
            + self.dataflows.len()
            + self.trust_zones.len()
            + self.threats.len()
            + self.countermeasures.len()
    }

    /// Whether a component exists under `reference` (id or reference id).
    #[must_use]
    pub fn has_component(&self, reference: &str) -> bool {
        self.components
            .iter()
            .any(|c| c.id == reference || c.reference_id.as_deref() == Some(reference))
    }

    #[must_use]
    pub fn has_dataflow(&self, reference: &str) -> bool {
        self.dataflows.iter().any(|d| d.id == reference)
    }

    /// Whether a threat exists under `reference` (id or reference id).
    #[must_use]
    pub fn has_threat(&self, reference: &str) -> bool {
        self.threats.iter().any(|t| t.is_named_by(reference))
    }
}

/// Builder for [`Snapshot`].
#[derive(Debug)]
#[must_use]
pub struct SnapshotBuilder {
    provenance: Provenance,
    components: Vec<Component>,
    dataflows: Vec<Dataflow>,
    trust_zones: Vec<TrustZone>,
    threats: Vec<Threat>,
    countermeasures: Vec<Countermeasure>,
    warnings: Vec<DanglingReference>,
}

impl SnapshotBuilder {
    pub fn component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    pub fn components(mut self, components: impl IntoIterator<Item = Component>) -> Self {
        self.components.extend(components);
        self
    }

    pub fn dataflow(mut self, dataflow: Dataflow) -> Self {
        self.dataflows.push(dataflow);
        self
    }

    pub fn dataflows(mut self, dataflows: impl IntoIterator<Item = Dataflow>) -> Self {
        self.dataflows.extend(dataflows);
        self
    }

    pub fn trust_zone(mut self, zone: TrustZone) -> Self {
        self.trust_zones.push(zone);
        self
    }

    pub fn trust_zones(mut self, zones: impl IntoIterator<Item = TrustZone>) -> Self {
        self.trust_zones.extend(zones);
        self
    }

    pub fn threat(mut self, threat: Threat) -> Self {
        self.threats.push(threat);
        self
    }

    pub fn threats(mut self, threats: impl IntoIterator<Item = Threat>) -> Self {
        self.threats.extend(threats);
        self
    }

    pub fn countermeasure(mut self, countermeasure: Countermeasure) -> Self {
        self.countermeasures.push(countermeasure);
        self
    }

    pub fn countermeasures(
        mut self,
        countermeasures: impl IntoIterator<Item = Countermeasure>,
    ) -> Self {
        self.countermeasures.extend(countermeasures);
        self
    }

    pub fn warnings(mut self, warnings: impl IntoIterator<Item = DanglingReference>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    /// Freeze the snapshot and compute its content hash.
    #[must_use]
    pub fn build(self) -> Snapshot {
        let content_hash = hash_content(
            &self.components,
            &self.dataflows,
            &self.trust_zones,
            &self.threats,
            &self.countermeasures,
        );
        Snapshot {
            provenance: self.provenance,
            components: self.components,
            dataflows: self.dataflows,
            trust_zones: self.trust_zones,
            threats: self.threats,
            countermeasures: self.countermeasures,
            warnings: self.warnings,
            content_hash,
        }
    }
}

/// Hash entity collections in a canonical order so record order does not
/// change the hash.
fn hash_content(
    components: &[Component],
    dataflows: &[Dataflow],
    trust_zones: &[TrustZone],
    threats: &[Threat],
    countermeasures: &[Countermeasure],
) -> u64 {
    fn canonical<T: Serialize>(items: &[T]) -> Vec<Vec<u8>> {
        let mut encoded: Vec<Vec<u8>> = items
            .iter()
            .filter_map(|item| serde_json::to_vec(item).ok())
            .collect();
        encoded.sort();
        encoded
    }

    let mut input = Vec::new();
    for section in [
        canonical(components),
        canonical(dataflows),
        canonical(trust_zones),
        canonical(threats),
        canonical(countermeasures),
    ] {
        input.extend_from_slice(&(section.len() as u64).to_le_bytes());
        for item in section {
            input.extend(item);
            input.push(0);
        }
    }
    content_hash(&input)
}
