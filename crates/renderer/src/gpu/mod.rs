//! Headless wgpu backend.
//!
//! - `context` picks an adapter and opens a device without any surface.
//! - `pipeline` compiles the WGSL pair and owns the single bind group layout
//!   (uniform block plus the 2D-array field texture).
//!
//! Geometry maps to the offscreen colour target and its readback buffer;
//! material maps to the uniform buffer, the field texture and their bind
//! group. Disposal destroys the wgpu objects right away instead of waiting
//! for the last handle to drop.

mod context;
mod pipeline;

use anyhow::{anyhow, Context as AnyhowContext};
use lightfield::{GridShape, ImageArrayBuffer, BYTES_PER_PIXEL};
use wgpu::util::{BufferInitDescriptor, DeviceExt, TextureDataOrder};

use crate::output::RenderedFrame;
use crate::shaders::ShaderSources;
use crate::surface::{PlaneGeometry, SurfaceBackend};
use crate::types::SurfaceSettings;
use crate::uniforms::FieldUniforms;
use crate::RenderError;

use context::GpuContext;
use pipeline::{FieldPipeline, FIELD_FORMAT, TARGET_FORMAT};

pub struct GpuBackend {
    context: GpuContext,
    pipeline: FieldPipeline,
    live_textures: usize,
}

pub struct GpuGeometry {
    target: wgpu::Texture,
    view: wgpu::TextureView,
    readback: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
}

pub struct GpuMaterial {
    shape: GridShape,
    uniforms: wgpu::Buffer,
    field: Option<(wgpu::Texture, wgpu::BindGroup)>,
}

impl GpuBackend {
    /// Opens a headless device and compiles `sources`.
    pub fn new(sources: &ShaderSources) -> Result<Self, RenderError> {
        let context = GpuContext::headless()?;
        let pipeline = FieldPipeline::new(&context.device, sources)?;
        Ok(Self {
            context,
            pipeline,
            live_textures: 0,
        })
    }

    /// Textures (targets and field arrays) not yet destroyed.
    pub fn live_textures(&self) -> usize {
        self.live_textures
    }

    fn check_shape(&self, shape: GridShape) -> Result<(), RenderError> {
        let layers = shape.columns.saturating_mul(shape.rows);
        if layers > self.context.max_array_layers {
            return Err(anyhow!(
                "grid has {layers} views but the GPU supports {} array layers",
                self.context.max_array_layers
            )
            .into());
        }
        let max = self.context.max_dimension;
        if shape.width > max || shape.height > max {
            return Err(anyhow!(
                "views are {}x{} but the GPU max texture dimension is {max}",
                shape.width,
                shape.height
            )
            .into());
        }
        Ok(())
    }
}

impl SurfaceBackend for GpuBackend {
    type Geometry = GpuGeometry;
    type Material = GpuMaterial;

    fn create_geometry(
        &mut self,
        _plane: &PlaneGeometry,
        shape: GridShape,
    ) -> Result<GpuGeometry, RenderError> {
        self.check_shape(shape)?;
        let device = &self.context.device;
        let (width, height) = (shape.width, shape.height);
        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("field target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let unpadded = width * BYTES_PER_PIXEL as u32;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded.div_ceil(align) * align;
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("field readback"),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        self.live_textures += 1;

        Ok(GpuGeometry {
            target,
            view,
            readback,
            width,
            height,
            padded_bytes_per_row,
        })
    }

    fn create_material(
        &mut self,
        shape: GridShape,
        settings: &SurfaceSettings,
    ) -> Result<GpuMaterial, RenderError> {
        let initial = FieldUniforms::new(shape, settings, &Default::default());
        let uniforms = self.context.device.create_buffer_init(&BufferInitDescriptor {
            label: Some("field uniforms"),
            contents: bytemuck::bytes_of(&initial),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        Ok(GpuMaterial {
            shape,
            uniforms,
            field: None,
        })
    }

    fn bind_field(
        &mut self,
        material: &mut GpuMaterial,
        field: ImageArrayBuffer,
    ) -> Result<(), RenderError> {
        let shape = field.shape();
        if shape != material.shape {
            return Err(RenderError::ShapeMismatch {
                expected: material.shape,
                found: shape,
            });
        }
        self.unbind_field(material);

        let device = &self.context.device;
        let texture = device.create_texture_with_data(
            &self.context.queue,
            &wgpu::TextureDescriptor {
                label: Some("light field array"),
                size: wgpu::Extent3d {
                    width: shape.width,
                    height: shape.height,
                    depth_or_array_layers: shape.columns * shape.rows,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: FIELD_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            field.as_bytes(),
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("light field array view"),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("field bind group"),
            layout: &self.pipeline.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: material.uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
            ],
        });
        tracing::debug!(
            layers = shape.columns * shape.rows,
            bytes = field.len(),
            "uploaded light field array"
        );
        self.live_textures += 1;
        material.field = Some((texture, bind_group));
        Ok(())
    }

    fn unbind_field(&mut self, material: &mut GpuMaterial) {
        if let Some((texture, _)) = material.field.take() {
            texture.destroy();
            self.live_textures = self.live_textures.saturating_sub(1);
        }
    }

    fn draw(
        &mut self,
        geometry: &GpuGeometry,
        material: &GpuMaterial,
        uniforms: &FieldUniforms,
    ) -> Result<RenderedFrame, RenderError> {
        let (_, bind_group) = material.field.as_ref().ok_or(RenderError::NoField)?;
        let GpuContext { device, queue, .. } = &self.context;
        queue.write_buffer(&material.uniforms, 0, bytemuck::bytes_of(uniforms));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("field encoder"),
        });
        {
            let [r, g, b, a] = uniforms.background.map(f64::from);
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("field pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &geometry.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline.pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &geometry.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &geometry.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(geometry.padded_bytes_per_row),
                    rows_per_image: Some(geometry.height),
                },
            },
            wgpu::Extent3d {
                width: geometry.width,
                height: geometry.height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(Some(encoder.finish()));

        let pixels = read_back(device, geometry)?;
        Ok(RenderedFrame::new(geometry.width, geometry.height, pixels))
    }

    fn dispose_geometry(&mut self, geometry: GpuGeometry) {
        geometry.target.destroy();
        geometry.readback.destroy();
        self.live_textures = self.live_textures.saturating_sub(1);
    }

    fn dispose_material(&mut self, mut material: GpuMaterial) {
        self.unbind_field(&mut material);
        material.uniforms.destroy();
    }
}

fn read_back(device: &wgpu::Device, geometry: &GpuGeometry) -> anyhow::Result<Vec<u8>> {
    let slice = geometry.readback.slice(..);
    let (tx, rx) = crossbeam_channel::bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .context("failed to wait for GPU readback")?;
    rx.recv()
        .context("readback callback was dropped")?
        .context("failed to map readback buffer")?;

    let row_bytes = geometry.width as usize * BYTES_PER_PIXEL;
    let mut pixels = Vec::with_capacity(row_bytes * geometry.height as usize);
    {
        let mapped = slice.get_mapped_range();
        for row in mapped.chunks(geometry.padded_bytes_per_row as usize) {
            pixels.extend_from_slice(&row[..row_bytes]);
        }
    }
    geometry.readback.unmap();
    Ok(pixels)
}
