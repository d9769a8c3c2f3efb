//! Input parsers.
//!
//! Three input formats feed a comparison:
//! - the diagram exchange document (mxGraph XML) for the architecture side
//! - the threat and countermeasure JSON collections for the security side
//! - the architecture description (Open Threat Model) imported in the
//!   mutating verification modes
//!
//! ## Usage
//!
//! ```no_run
//! use tmdiff::model::{Provenance, Snapshot};
//! use std::path::Path;
//!
//! let snapshot = Snapshot::load(
//!     Provenance::Local { label: "before".into() },
//!     Path::new("diagram.xml"),
//!     Path::new("threats.json"),
//!     Path::new("countermeasures.json"),
//! )
//! .unwrap();
//! println!("{} records", snapshot.entity_count());
//! ```

mod architecture;
mod artifacts;
mod diagram;
mod geometry;

pub use architecture::{
    ArchitectureParser, ArchitectureSource, OtmComponent, OtmDataflow, OtmDocument, OtmParent,
    OtmProject, OtmRisk, OtmTrustZone, ValidatedArchitecture,
};
pub use artifacts::{ParsedArtifacts, SecurityArtifactParser};
pub use diagram::{DiagramParser, ParsedDiagram};
pub use geometry::{resolve_containment, NodeGeometry, Rect};

use crate::error::{Result, ThreatDiffError};
use crate::model::{Provenance, Snapshot};
use std::path::Path;

/// Parse the three raw artifacts of one side into a snapshot.
pub fn parse_snapshot(
    provenance: Provenance,
    diagram: &[u8],
    threats: &str,
    countermeasures: &str,
) -> Result<Snapshot> {
    let parsed_diagram = DiagramParser::new().parse(diagram)?;
    let artifacts = SecurityArtifactParser::new().parse(threats, countermeasures)?;

    for warning in &parsed_diagram.warnings {
        tracing::warn!(side = %provenance, "{warning}");
    }

    Ok(Snapshot::builder(provenance)
        .components(parsed_diagram.components)
        .dataflows(parsed_diagram.dataflows)
        .trust_zones(parsed_diagram.trust_zones)
        .threats(artifacts.threats)
        .countermeasures(artifacts.countermeasures)
        .warnings(parsed_diagram.warnings)
        .build())
}

impl Snapshot {
    /// Load and parse one side from files on disk.
    pub fn load(
        provenance: Provenance,
        diagram_path: &Path,
        threats_path: &Path,
        countermeasures_path: &Path,
    ) -> Result<Self> {
        let diagram = std::fs::read(diagram_path).map_err(|e| ThreatDiffError::io(diagram_path, e))?;
        let threats =
            std::fs::read_to_string(threats_path).map_err(|e| ThreatDiffError::io(threats_path, e))?;
        let countermeasures = std::fs::read_to_string(countermeasures_path)
            .map_err(|e| ThreatDiffError::io(countermeasures_path, e))?;
        parse_snapshot(provenance, &diagram, &threats, &countermeasures)
    }
}
