use lightfield::{GridShape, ImageArrayBuffer};
use tracing::debug;

use crate::output::RenderedFrame;
use crate::types::{RenderParams, SurfaceSettings};
use crate::uniforms::FieldUniforms;
use crate::RenderError;

/// Plane the refocused image is shown on, sized by the physical rig.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneGeometry {
    pub width: f32,
    pub height: f32,
    /// Distance from the viewer; zoom 1.0 places the plane at the origin.
    pub z: f32,
    pub width_segments: u32,
    pub height_segments: u32,
}

impl PlaneGeometry {
    pub fn for_grid(shape: GridShape, camera_gap: f32, zoom: f32) -> Self {
        Self {
            width: shape.columns as f32 * camera_gap,
            height: shape.rows as f32 * camera_gap,
            z: zoom - 1.0,
            width_segments: shape.columns,
            height_segments: shape.rows,
        }
    }
}

/// Resource factory behind a [`Surface`].
///
/// Every geometry and material handed out must come back through the
/// matching `dispose_*` call; `Surface` guarantees that.
pub trait SurfaceBackend {
    type Geometry;
    type Material;

    fn create_geometry(
        &mut self,
        plane: &PlaneGeometry,
        shape: GridShape,
    ) -> Result<Self::Geometry, RenderError>;

    fn create_material(
        &mut self,
        shape: GridShape,
        settings: &SurfaceSettings,
    ) -> Result<Self::Material, RenderError>;

    /// Takes ownership of a fully loaded array.
    fn bind_field(
        &mut self,
        material: &mut Self::Material,
        field: ImageArrayBuffer,
    ) -> Result<(), RenderError>;

    /// Drops the bound array, leaving the material pending.
    fn unbind_field(&mut self, material: &mut Self::Material);

    fn draw(
        &mut self,
        geometry: &Self::Geometry,
        material: &Self::Material,
        uniforms: &FieldUniforms,
    ) -> Result<RenderedFrame, RenderError>;

    fn dispose_geometry(&mut self, geometry: Self::Geometry);

    fn dispose_material(&mut self, material: Self::Material);
}

struct Active<B: SurfaceBackend> {
    shape: GridShape,
    plane: PlaneGeometry,
    geometry: B::Geometry,
    material: B::Material,
    has_field: bool,
}

/// Owns the geometry and material for the grid currently on screen.
pub struct Surface<B: SurfaceBackend> {
    settings: SurfaceSettings,
    params: RenderParams,
    zoom: f32,
    active: Option<Active<B>>,
}

impl<B: SurfaceBackend> Surface<B> {
    pub fn new(settings: SurfaceSettings) -> Self {
        Self {
            settings,
            params: RenderParams::default(),
            zoom: 1.0,
            active: None,
        }
    }

    pub fn settings(&self) -> &SurfaceSettings {
        &self.settings
    }

    pub fn params(&self) -> RenderParams {
        self.params
    }

    pub fn set_params(&mut self, params: RenderParams) {
        self.params = params;
    }

    /// Moves the plane to `z = zoom - 1`, now if geometry exists and on
    /// every later rebuild.
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom;
        let camera_gap = self.settings.camera_gap;
        if let Some(active) = self.active.as_mut() {
            active.plane = PlaneGeometry::for_grid(active.shape, camera_gap, zoom);
        }
    }

    pub fn shape(&self) -> Option<GridShape> {
        self.active.as_ref().map(|active| active.shape)
    }

    pub fn plane(&self) -> Option<PlaneGeometry> {
        self.active.as_ref().map(|active| active.plane)
    }

    pub fn has_field(&self) -> bool {
        self.active.as_ref().is_some_and(|active| active.has_field)
    }

    /// Shows `field` for a grid of `shape`.
    ///
    /// The first call builds geometry and material, a call with the same
    /// shape only rebinds the field, and a new shape disposes both before
    /// rebuilding. Passing `None` keeps the resources but leaves them
    /// without a field until the next call.
    pub fn create_or_update(
        &mut self,
        backend: &mut B,
        field: Option<ImageArrayBuffer>,
        shape: GridShape,
        params: RenderParams,
    ) -> Result<(), RenderError> {
        if let Some(field) = &field {
            if field.shape() != shape {
                return Err(RenderError::ShapeMismatch {
                    expected: shape,
                    found: field.shape(),
                });
            }
        }
        self.params = params;

        let reuse = self
            .active
            .as_ref()
            .is_some_and(|active| active.shape == shape);
        if !reuse {
            self.clear(backend);
            let plane = PlaneGeometry::for_grid(shape, self.settings.camera_gap, self.zoom);
            let geometry = backend.create_geometry(&plane, shape)?;
            let material = match backend.create_material(shape, &self.settings) {
                Ok(material) => material,
                Err(err) => {
                    backend.dispose_geometry(geometry);
                    return Err(err);
                }
            };
            debug!(
                columns = shape.columns,
                rows = shape.rows,
                width = plane.width,
                height = plane.height,
                "built surface"
            );
            self.active = Some(Active {
                shape,
                plane,
                geometry,
                material,
                has_field: false,
            });
        }

        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        match field {
            Some(field) => {
                backend.bind_field(&mut active.material, field)?;
                active.has_field = true;
            }
            None => {
                if active.has_field {
                    backend.unbind_field(&mut active.material);
                }
                active.has_field = false;
            }
        }
        Ok(())
    }

    /// Draws with the current params; `Ok(None)` while no field is bound.
    pub fn draw(&self, backend: &mut B) -> Result<Option<RenderedFrame>, RenderError> {
        let Some(active) = self.active.as_ref().filter(|active| active.has_field) else {
            debug!("surface has no field yet; skipping draw");
            return Ok(None);
        };
        let uniforms = FieldUniforms::new(active.shape, &self.settings, &self.params);
        backend
            .draw(&active.geometry, &active.material, &uniforms)
            .map(Some)
    }

    /// Disposes geometry and material.
    pub fn clear(&mut self, backend: &mut B) {
        if let Some(active) = self.active.take() {
            debug!(
                columns = active.shape.columns,
                rows = active.shape.rows,
                "disposing surface"
            );
            backend.dispose_geometry(active.geometry);
            backend.dispose_material(active.material);
        }
    }
}
