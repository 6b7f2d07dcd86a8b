//! Typed compiled artifacts returned to the host.

use std::path::PathBuf;

/// Role of an emitted artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Script,
    SourceMap,
    Stylesheet,
    GenericAsset,
}

/// One emitted file: a relative output path and its payload.
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub data: Vec<u8>,
}

impl CompiledArtifact {
    pub fn new(kind: ArtifactKind, path: impl Into<PathBuf>, data: Vec<u8>) -> Self {
        Self {
            kind,
            path: path.into(),
            data,
        }
    }

    pub fn script(path: impl Into<PathBuf>, data: Vec<u8>) -> Self {
        Self::new(ArtifactKind::Script, path, data)
    }

    pub fn source_map(path: impl Into<PathBuf>, data: Vec<u8>) -> Self {
        Self::new(ArtifactKind::SourceMap, path, data)
    }

    pub fn stylesheet(path: impl Into<PathBuf>, data: Vec<u8>) -> Self {
        Self::new(ArtifactKind::Stylesheet, path, data)
    }

    pub fn asset(path: impl Into<PathBuf>, data: Vec<u8>) -> Self {
        Self::new(ArtifactKind::GenericAsset, path, data)
    }
}
