use bytemuck::{Pod, Zeroable};
use lightfield::GridShape;

use crate::types::{RenderParams, SurfaceSettings};

/// Uniform block consumed by `fs_main`.
///
/// Field order and sizes match `FieldUniforms` in `fragment.wgsl`; the
/// vec4 background lands on a 16-byte boundary without explicit padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FieldUniforms {
    /// Grid size in cameras: (columns, rows).
    pub cam_array: [f32; 2],
    /// Per-view resolution, also the output resolution.
    pub image_size: [f32; 2],
    pub viewer_offset: [f32; 2],
    pub aperture: f32,
    pub focus: f32,
    pub baseline: f32,
    pub camera_gap: f32,
    pub grid_overlay: u32,
    pub _padding: u32,
    pub background: [f32; 4],
}

impl FieldUniforms {
    pub fn new(shape: GridShape, settings: &SurfaceSettings, params: &RenderParams) -> Self {
        Self {
            cam_array: [shape.columns as f32, shape.rows as f32],
            image_size: [shape.width as f32, shape.height as f32],
            viewer_offset: params.viewer_offset(),
            aperture: params.aperture(),
            focus: params.focus(),
            baseline: settings.baseline,
            camera_gap: settings.camera_gap,
            grid_overlay: u32::from(settings.grid_overlay),
            _padding: 0,
            background: settings.background,
        }
    }

    pub fn columns(&self) -> u32 {
        self.cam_array[0] as u32
    }

    pub fn rows(&self) -> u32 {
        self.cam_array[1] as u32
    }

    pub fn output_size(&self) -> (u32, u32) {
        (self.image_size[0] as u32, self.image_size[1] as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_wgsl_block() {
        assert_eq!(std::mem::size_of::<FieldUniforms>(), 64);
        assert_eq!(std::mem::align_of::<FieldUniforms>(), 4);
    }

    #[test]
    fn copies_shape_settings_and_params() {
        let shape = GridShape {
            columns: 3,
            rows: 2,
            width: 8,
            height: 4,
        };
        let settings = SurfaceSettings {
            grid_overlay: true,
            ..SurfaceSettings::default()
        };
        let params = RenderParams::new(1.5, 2.0).with_viewer_offset([0.05, 0.0]);
        let uniforms = FieldUniforms::new(shape, &settings, &params);
        assert_eq!(uniforms.cam_array, [3.0, 2.0]);
        assert_eq!(uniforms.output_size(), (8, 4));
        assert_eq!(uniforms.viewer_offset, [0.05, 0.0]);
        assert_eq!(uniforms.grid_overlay, 1);
        assert_eq!(uniforms.focus, 2.0);

        let bytes = bytemuck::bytes_of(&uniforms);
        assert_eq!(&bytes[24..28], &1.5f32.to_ne_bytes());
    }
}
