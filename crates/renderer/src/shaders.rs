use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::RenderError;

const EMBEDDED_VERTEX: &str = include_str!("../shaders/vertex.wgsl");
const EMBEDDED_FRAGMENT: &str = include_str!("../shaders/fragment.wgsl");

pub const VERTEX_FILE: &str = "vertex.wgsl";
pub const FRAGMENT_FILE: &str = "fragment.wgsl";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn file_name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => VERTEX_FILE,
            ShaderStage::Fragment => FRAGMENT_FILE,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// WGSL sources for the refocus pipeline, read once per session.
///
/// Clones share the underlying text.
#[derive(Debug, Clone)]
pub struct ShaderSources {
    vertex: Arc<str>,
    fragment: Arc<str>,
    origin: Option<PathBuf>,
}

impl ShaderSources {
    /// The shaders compiled into the binary.
    pub fn embedded() -> Self {
        Self {
            vertex: Arc::from(EMBEDDED_VERTEX),
            fragment: Arc::from(EMBEDDED_FRAGMENT),
            origin: None,
        }
    }

    /// Reads `vertex.wgsl` and `fragment.wgsl` from `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, RenderError> {
        let vertex = read_stage(dir, ShaderStage::Vertex)?;
        let fragment = read_stage(dir, ShaderStage::Fragment)?;
        tracing::debug!(dir = %dir.display(), "loaded shader sources");
        Ok(Self {
            vertex: Arc::from(vertex),
            fragment: Arc::from(fragment),
            origin: Some(dir.to_path_buf()),
        })
    }

    /// Directory override when configured, embedded sources otherwise.
    pub fn load(directory: Option<&Path>) -> Result<Self, RenderError> {
        match directory {
            Some(dir) => Self::from_dir(dir),
            None => Ok(Self::embedded()),
        }
    }

    pub fn vertex(&self) -> &str {
        &self.vertex
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn stage(&self, stage: ShaderStage) -> &str {
        match stage {
            ShaderStage::Vertex => self.vertex(),
            ShaderStage::Fragment => self.fragment(),
        }
    }

    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }
}

impl Default for ShaderSources {
    fn default() -> Self {
        Self::embedded()
    }
}

fn read_stage(dir: &Path, stage: ShaderStage) -> Result<String, RenderError> {
    let path = dir.join(stage.file_name());
    let text = fs::read_to_string(&path).map_err(|source| RenderError::ShaderLoad {
        stage,
        path: path.clone(),
        source,
    })?;
    if text.trim().is_empty() {
        return Err(RenderError::EmptyShader { stage, path });
    }
    Ok(text)
}
