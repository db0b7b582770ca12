//! Values that flow along graph edges.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pitgrid_core::{AggregatedResult, ChunkResult, Metric, RedistributionManifest, SkySpec};

use crate::error::EngineError;

/// A value produced by one node and consumed by another.
#[derive(Debug, Clone)]
pub enum Artifact {
    /// A file or folder on disk.
    Path(PathBuf),
    /// Free text, passed through verbatim.
    Text(String),
    Metric(Metric),
    Sky(SkySpec),
    /// Partitioner output; drives fan-out width.
    Manifest(Arc<RedistributionManifest>),
    /// Collected fan-out output.
    ChunkResults(Arc<Vec<ChunkResult>>),
    /// Merged per-unit results.
    Aggregated(Arc<Vec<AggregatedResult>>),
}

impl Artifact {
    /// Kind name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Path(_) => "path",
            Self::Text(_) => "text",
            Self::Metric(_) => "metric",
            Self::Sky(_) => "sky",
            Self::Manifest(_) => "manifest",
            Self::ChunkResults(_) => "chunk results",
            Self::Aggregated(_) => "aggregated results",
        }
    }
}

impl From<PathBuf> for Artifact {
    fn from(p: PathBuf) -> Self {
        Self::Path(p)
    }
}

impl From<&Path> for Artifact {
    fn from(p: &Path) -> Self {
        Self::Path(p.to_path_buf())
    }
}

impl From<String> for Artifact {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Artifact {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Metric> for Artifact {
    fn from(m: Metric) -> Self {
        Self::Metric(m)
    }
}

impl From<SkySpec> for Artifact {
    fn from(s: SkySpec) -> Self {
        Self::Sky(s)
    }
}

impl From<RedistributionManifest> for Artifact {
    fn from(m: RedistributionManifest) -> Self {
        Self::Manifest(Arc::new(m))
    }
}

impl From<Vec<AggregatedResult>> for Artifact {
    fn from(r: Vec<AggregatedResult>) -> Self {
        Self::Aggregated(Arc::new(r))
    }
}

/// Named artifacts: the inputs a node receives or the outputs it returns.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    owner: String,
    values: HashMap<String, Artifact>,
}

impl Artifacts {
    /// Create an empty set owned by `owner` (used in error messages).
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            values: HashMap::new(),
        }
    }

    /// Builder method to add an artifact.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Artifact>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert an artifact.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Artifact>) {
        self.values.insert(name.into(), value.into());
    }

    /// Look up an artifact.
    pub fn get(&self, name: &str) -> Result<&Artifact, EngineError> {
        self.values.get(name).ok_or_else(|| EngineError::MissingArtifact {
            node: self.owner.clone(),
            input: name.to_string(),
        })
    }

    /// Returns true if an artifact with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of artifacts.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no artifacts.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn path(&self, name: &str) -> Result<&Path, EngineError> {
        match self.get(name)? {
            Artifact::Path(p) => Ok(p.as_path()),
            other => Err(self.type_error(name, "path", other)),
        }
    }

    pub fn text(&self, name: &str) -> Result<&str, EngineError> {
        match self.get(name)? {
            Artifact::Text(s) => Ok(s.as_str()),
            other => Err(self.type_error(name, "text", other)),
        }
    }

    pub fn metric(&self, name: &str) -> Result<Metric, EngineError> {
        match self.get(name)? {
            Artifact::Metric(m) => Ok(*m),
            other => Err(self.type_error(name, "metric", other)),
        }
    }

    pub fn sky(&self, name: &str) -> Result<&SkySpec, EngineError> {
        match self.get(name)? {
            Artifact::Sky(s) => Ok(s),
            other => Err(self.type_error(name, "sky", other)),
        }
    }

    pub fn manifest(&self, name: &str) -> Result<Arc<RedistributionManifest>, EngineError> {
        match self.get(name)? {
            Artifact::Manifest(m) => Ok(m.clone()),
            other => Err(self.type_error(name, "manifest", other)),
        }
    }

    pub fn chunk_results(&self, name: &str) -> Result<Arc<Vec<ChunkResult>>, EngineError> {
        match self.get(name)? {
            Artifact::ChunkResults(r) => Ok(r.clone()),
            other => Err(self.type_error(name, "chunk results", other)),
        }
    }

    pub fn aggregated(&self, name: &str) -> Result<Arc<Vec<AggregatedResult>>, EngineError> {
        match self.get(name)? {
            Artifact::Aggregated(r) => Ok(r.clone()),
            other => Err(self.type_error(name, "aggregated results", other)),
        }
    }

    fn type_error(&self, name: &str, expected: &'static str, actual: &Artifact) -> EngineError {
        EngineError::ArtifactType {
            input: format!("{}.{}", self.owner, name),
            expected,
            actual: actual.kind(),
        }
    }
}
