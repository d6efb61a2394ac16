use lightfield::{GridShape, ImageArrayBuffer};

use crate::output::RenderedFrame;
use crate::refocus;
use crate::surface::{PlaneGeometry, SurfaceBackend};
use crate::types::SurfaceSettings;
use crate::uniforms::FieldUniforms;
use crate::RenderError;

/// Software backend evaluating the fragment shader per pixel.
#[derive(Debug, Default)]
pub struct CpuBackend {
    live_materials: usize,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_materials(&self) -> usize {
        self.live_materials
    }
}

#[derive(Debug)]
pub struct CpuMaterial {
    shape: GridShape,
    field: Option<ImageArrayBuffer>,
}

impl CpuMaterial {
    pub fn field(&self) -> Option<&ImageArrayBuffer> {
        self.field.as_ref()
    }
}

impl SurfaceBackend for CpuBackend {
    type Geometry = PlaneGeometry;
    type Material = CpuMaterial;

    fn create_geometry(
        &mut self,
        plane: &PlaneGeometry,
        _shape: GridShape,
    ) -> Result<PlaneGeometry, RenderError> {
        Ok(*plane)
    }

    fn create_material(
        &mut self,
        shape: GridShape,
        _settings: &SurfaceSettings,
    ) -> Result<CpuMaterial, RenderError> {
        self.live_materials += 1;
        Ok(CpuMaterial { shape, field: None })
    }

    fn bind_field(
        &mut self,
        material: &mut CpuMaterial,
        field: ImageArrayBuffer,
    ) -> Result<(), RenderError> {
        if field.shape() != material.shape {
            return Err(RenderError::ShapeMismatch {
                expected: material.shape,
                found: field.shape(),
            });
        }
        material.field = Some(field);
        Ok(())
    }

    fn unbind_field(&mut self, material: &mut CpuMaterial) {
        material.field = None;
    }

    fn draw(
        &mut self,
        _geometry: &PlaneGeometry,
        material: &CpuMaterial,
        uniforms: &FieldUniforms,
    ) -> Result<RenderedFrame, RenderError> {
        let field = material.field.as_ref().ok_or(RenderError::NoField)?;
        Ok(refocus::render_cpu(uniforms, field))
    }

    fn dispose_geometry(&mut self, _geometry: PlaneGeometry) {}

    fn dispose_material(&mut self, _material: CpuMaterial) {
        self.live_materials = self.live_materials.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Surface;
    use crate::types::RenderParams;

    #[test]
    fn renders_bound_field_through_surface() {
        let shape = GridShape {
            columns: 1,
            rows: 2,
            width: 2,
            height: 2,
        };
        let mut bytes = vec![10u8; shape.image_bytes()];
        bytes.extend(vec![200u8; shape.image_bytes()]);
        let field = ImageArrayBuffer::from_bytes(shape, bytes).unwrap();

        let mut backend = CpuBackend::new();
        let mut surface = Surface::new(SurfaceSettings::default());
        surface
            .create_or_update(&mut backend, Some(field), shape, RenderParams::new(1.0, 1.0))
            .unwrap();
        let frame = surface.draw(&mut backend).unwrap().unwrap();
        // centre (0, 0.5) blends both cameras evenly
        assert_eq!(frame.pixel(0, 0), Some([105, 105, 105, 255]));
        assert_eq!(backend.live_materials(), 1);

        surface.clear(&mut backend);
        assert_eq!(backend.live_materials(), 0);
    }
}
