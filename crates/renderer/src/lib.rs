//! Synthetic-aperture renderer for packed light-field image arrays.
//!
//! The flow mirrors one frame of an interactive viewer:
//!
//! ```text
//!   ImageArrayBuffer ──▶ Surface::create_or_update ──▶ SurfaceBackend (cpu | gpu)
//!                               ▲                              │
//!   ViewerPose ──▶ FrameLoop ───┘ RenderParams ─▶ FieldUniforms ┴─▶ RenderedFrame
//! ```
//!
//! `Surface` owns the geometry and material for the current grid shape and
//! rebuilds them only when the shape changes. The refocus itself lives in the
//! fragment shader (`shaders/fragment.wgsl`) and in [`refocus`], a CPU port
//! of the same arithmetic used for headless rendering and tests.

use std::path::PathBuf;

use lightfield::{GridShape, LoadError};

mod cpu;
mod frame;
mod gpu;
mod output;
pub mod refocus;
mod shaders;
mod surface;
mod types;
mod uniforms;

pub use cpu::{CpuBackend, CpuMaterial};
pub use frame::{FrameLoop, HeadTracker, LoadStatus};
pub use gpu::{GpuBackend, GpuGeometry, GpuMaterial};
pub use output::RenderedFrame;
pub use shaders::{ShaderSources, ShaderStage};
pub use surface::{PlaneGeometry, Surface, SurfaceBackend};
pub use types::{ParamEvent, RenderParams, SurfaceSettings, ViewerPose, MIN_FOCUS};
pub use uniforms::FieldUniforms;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to read {stage} shader at {path}: {source}")]
    ShaderLoad {
        stage: ShaderStage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{stage} shader at {path} is empty")]
    EmptyShader { stage: ShaderStage, path: PathBuf },
    #[error("{stage} shader failed to compile: {message}")]
    ShaderCompile { stage: ShaderStage, message: String },
    #[error("image array is {found:?} but the surface expects {expected:?}")]
    ShapeMismatch {
        expected: GridShape,
        found: GridShape,
    },
    #[error("no image array is bound to the surface material")]
    NoField,
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("failed to write {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Gpu(#[from] anyhow::Error),
}
