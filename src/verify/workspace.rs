//! Ephemeral local workspace holding downloaded artifacts.

use crate::error::{Result, ThreatDiffError};
use crate::model::{Provenance, Snapshot};
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Comparison side an artifact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Baseline,
    Target,
}

impl Side {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Target => "target",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three downloaded artifacts of one side.
#[derive(Debug, Clone)]
pub struct RawArtifacts {
    pub diagram: Vec<u8>,
    pub threats: String,
    pub countermeasures: String,
}

/// A fresh temporary directory, removed on [`close`](Self::close) or drop.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a workspace under `root`, or under the system temp directory.
    pub fn create(root: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(|e| ThreatDiffError::io(root, e))?;
                builder
                    .tempdir_in(root)
                    .map_err(|e| ThreatDiffError::io(root, e))?
            }
            None => builder
                .tempdir()
                .map_err(|e| ThreatDiffError::io(std::env::temp_dir(), e))?,
        };
        tracing::debug!(path = %dir.path().display(), "Created workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Paths of the diagram, threats and countermeasures files of `side`.
    #[must_use]
    pub fn artifact_paths(&self, side: Side) -> (PathBuf, PathBuf, PathBuf) {
        let root = self.dir.path();
        (
            root.join(format!("{side}-diagram.xml")),
            root.join(format!("{side}-threats.json")),
            root.join(format!("{side}-countermeasures.json")),
        )
    }

    pub fn write_artifacts(&self, side: Side, artifacts: &RawArtifacts) -> Result<()> {
        let (diagram, threats, countermeasures) = self.artifact_paths(side);
        write(&diagram, &artifacts.diagram)?;
        write(&threats, artifacts.threats.as_bytes())?;
        write(&countermeasures, artifacts.countermeasures.as_bytes())
    }

    /// Parse the stored artifacts of `side`.
    pub fn load_snapshot(&self, side: Side, provenance: Provenance) -> Result<Snapshot> {
        let (diagram, threats, countermeasures) = self.artifact_paths(side);
        Snapshot::load(provenance, &diagram, &threats, &countermeasures)
    }

    /// Remove the directory, reporting failures.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| ThreatDiffError::Cleanup {
            resource: format!("workspace {}", path.display()),
            message: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "Removed workspace");
        Ok(())
    }
}

fn write(path: &Path, content: &[u8]) -> Result<()> {
    std::fs::write(path, content).map_err(|e| ThreatDiffError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIAGRAM: &str = r#"<mxfile><diagram><mxGraphModel><root>
        <mxCell id="0"/><mxCell id="1" parent="0"/>
        <mxCell id="web" value="Web" vertex="1" parent="1"/>
    </root></mxGraphModel></diagram></mxfile>"#;

    #[test]
    fn test_artifacts_round_trip_through_disk() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(Some(root.path()), "tmdiff-test-").unwrap();
        assert!(workspace.path().starts_with(root.path()));

        workspace
            .write_artifacts(
                Side::Baseline,
                &RawArtifacts {
                    diagram: DIAGRAM.as_bytes().to_vec(),
                    threats: r#"[{"id":"t1","name":"XSS","componentIds":["web"]}]"#.into(),
                    countermeasures: "[]".into(),
                },
            )
            .unwrap();
        let (diagram, _, _) = workspace.artifact_paths(Side::Baseline);
        assert!(diagram.ends_with("baseline-diagram.xml"));

        let snapshot = workspace
            .load_snapshot(
                Side::Baseline,
                Provenance::Local {
                    label: "disk".into(),
                },
            )
            .unwrap();
        assert_eq!(snapshot.components().len(), 1);
        assert_eq!(snapshot.threats().len(), 1);
    }

    #[test]
    fn test_close_removes_directory() {
        let workspace = Workspace::create(None, "tmdiff-test-").unwrap();
        let path = workspace.path().to_path_buf();
        assert!(path.exists());
        workspace.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_side_fails_to_load() {
        let workspace = Workspace::create(None, "tmdiff-test-").unwrap();
        let result = workspace.load_snapshot(
            Side::Target,
            Provenance::Local {
                label: "disk".into(),
            },
        );
        assert!(matches!(result, Err(ThreatDiffError::Io { .. })));
    }
}
