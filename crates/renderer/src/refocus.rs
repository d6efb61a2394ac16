//! CPU evaluation of the refocus fragment shader.
//!
//! Every step follows `fs_main` in `fragment.wgsl` operation for operation,
//! so the software backend and the GPU agree on which cameras contribute
//! and which texel each of them reads.

use lightfield::ImageArrayBuffer;

use crate::output::RenderedFrame;
use crate::uniforms::FieldUniforms;

const GRID_SPACING: f32 = 0.1;
const GRID_LINE_WIDTH: f32 = 0.002;
const GRID_COLOR: [f32; 3] = [0.0, 0.0, 1.0];
const GRID_MIX: f32 = 0.3;

/// Camera-grid position the viewer is looking from, in camera units.
pub fn viewpoint_center(u: &FieldUniforms) -> [f32; 2] {
    [
        (u.cam_array[0] - 1.0) * 0.5 + u.viewer_offset[0] / u.camera_gap,
        (u.cam_array[1] - 1.0) * 0.5 + u.viewer_offset[1] / u.camera_gap,
    ]
}

/// Image-space shift per camera step for the current focus depth.
pub fn disparity(u: &FieldUniforms) -> f32 {
    u.camera_gap * (1.0 / u.focus - u.baseline)
}

/// Cameras blended for this viewpoint, in the order the shader visits them.
///
/// Falls back to the single nearest camera when the aperture disc contains
/// none; a viewpoint outside the grid with a small aperture yields nothing.
pub fn footprint(u: &FieldUniforms) -> Vec<[f32; 2]> {
    let center = viewpoint_center(u);
    let grid_max = [u.cam_array[0] - 1.0, u.cam_array[1] - 1.0];
    let radius = u.aperture.max(0.0);
    let lo = [
        (center[0] - radius).ceil().max(0.0),
        (center[1] - radius).ceil().max(0.0),
    ];
    let hi = [
        (center[0] + radius).floor().min(grid_max[0]),
        (center[1] + radius).floor().min(grid_max[1]),
    ];

    let mut cameras = Vec::new();
    let mut c = lo[0];
    while c <= hi[0] {
        let mut r = lo[1];
        while r <= hi[1] {
            let d = [c - center[0], r - center[1]];
            if d[0] * d[0] + d[1] * d[1] <= radius * radius {
                cameras.push([c, r]);
            }
            r += 1.0;
        }
        c += 1.0;
    }

    if cameras.is_empty() {
        let nearest = [(center[0] + 0.5).floor(), (center[1] + 0.5).floor()];
        let inside = nearest[0] >= 0.0
            && nearest[1] >= 0.0
            && nearest[0] <= grid_max[0]
            && nearest[1] <= grid_max[1];
        if inside {
            cameras.push(nearest);
        }
    }
    cameras
}

fn sample_view(
    u: &FieldUniforms,
    field: &ImageArrayBuffer,
    cam: [f32; 2],
    center: [f32; 2],
    uv: [f32; 2],
    disparity: f32,
) -> Option<[f32; 3]> {
    let shifted = [
        uv[0] + (cam[0] - center[0]) * disparity,
        uv[1] + (cam[1] - center[1]) * disparity,
    ];
    if shifted.iter().any(|v| *v < 0.0 || *v >= 1.0) {
        return None;
    }
    let width = u.image_size[0] as u32;
    let height = u.image_size[1] as u32;
    let x = ((shifted[0] * u.image_size[0]).floor() as u32).min(width - 1);
    let y = ((shifted[1] * u.image_size[1]).floor() as u32).min(height - 1);
    let layer = cam[0] as usize * u.rows() as usize + cam[1] as usize;
    let texel = field.texel(layer, x, y)?;
    Some([
        f32::from(texel[0]) / 255.0,
        f32::from(texel[1]) / 255.0,
        f32::from(texel[2]) / 255.0,
    ])
}

/// Colour of output pixel `(x, y)` as normalized RGBA.
pub fn shade(u: &FieldUniforms, field: &ImageArrayBuffer, x: u32, y: u32) -> [f32; 4] {
    let cameras = footprint(u);
    shade_with(u, field, &cameras, x, y)
}

fn shade_with(
    u: &FieldUniforms,
    field: &ImageArrayBuffer,
    cameras: &[[f32; 2]],
    x: u32,
    y: u32,
) -> [f32; 4] {
    let uv = [
        (x as f32 + 0.5) / u.image_size[0],
        (y as f32 + 0.5) / u.image_size[1],
    ];
    let center = viewpoint_center(u);
    let disparity = disparity(u);

    let mut sum = [0.0f32; 3];
    let mut count = 0u32;
    for cam in cameras {
        if let Some(rgb) = sample_view(u, field, *cam, center, uv, disparity) {
            sum[0] += rgb[0];
            sum[1] += rgb[1];
            sum[2] += rgb[2];
            count += 1;
        }
    }
    if count == 0 {
        return u.background;
    }

    let n = count as f32;
    let mut rgb = [sum[0] / n, sum[1] / n, sum[2] / n];
    if u.grid_overlay != 0 && on_grid_line(uv) {
        for (channel, target) in rgb.iter_mut().zip(GRID_COLOR) {
            *channel += (target - *channel) * GRID_MIX;
        }
    }
    [rgb[0], rgb[1], rgb[2], 1.0]
}

fn on_grid_line(uv: [f32; 2]) -> bool {
    uv.iter()
        .any(|v| v - (v / GRID_SPACING).floor() * GRID_SPACING < GRID_LINE_WIDTH)
}

pub fn to_unorm8(color: [f32; 4]) -> [u8; 4] {
    color.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Renders every pixel of the output in software.
pub fn render_cpu(u: &FieldUniforms, field: &ImageArrayBuffer) -> RenderedFrame {
    let (width, height) = u.output_size();
    let cameras = footprint(u);
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            pixels.extend_from_slice(&to_unorm8(shade_with(u, field, &cameras, x, y)));
        }
    }
    RenderedFrame::new(width, height, pixels)
}

#[cfg(test)]
mod tests {
    use lightfield::GridShape;

    use super::*;
    use crate::types::{RenderParams, SurfaceSettings};

    /// Each camera gets a distinct colour with a horizontal ramp in red.
    fn gradient_field(columns: u32, rows: u32, size: u32) -> ImageArrayBuffer {
        let shape = GridShape {
            columns,
            rows,
            width: size,
            height: size,
        };
        let mut bytes = Vec::with_capacity(shape.buffer_len());
        for c in 0..columns {
            for r in 0..rows {
                for _y in 0..size {
                    for x in 0..size {
                        bytes.extend_from_slice(&[
                            (x * 255 / size.max(2).saturating_sub(1).max(1)).min(255) as u8,
                            (c * 60) as u8,
                            (r * 60) as u8,
                            255,
                        ]);
                    }
                }
            }
        }
        ImageArrayBuffer::from_bytes(shape, bytes).unwrap()
    }

    fn uniforms(field: &ImageArrayBuffer, params: RenderParams) -> FieldUniforms {
        FieldUniforms::new(field.shape(), &SurfaceSettings::default(), &params)
    }

    #[test]
    fn pinhole_reads_a_single_camera() {
        let field = gradient_field(3, 3, 8);
        let u = uniforms(&field, RenderParams::new(0.0, 0.4));
        assert_eq!(footprint(&u), vec![[1.0, 1.0]]);

        let u = uniforms(
            &field,
            RenderParams::new(0.0, 1.0).with_viewer_offset([0.08, -0.06]),
        );
        // center (1.8, 0.4) snaps to camera (2, 0)
        assert_eq!(footprint(&u), vec![[2.0, 0.0]]);
        let frame = render_cpu(&u, &field);
        assert_eq!(frame.pixel(3, 3), Some(field.texel(6, 3, 3).unwrap()));
    }

    #[test]
    fn centre_camera_round_trips_at_neutral_focus() {
        let field = gradient_field(3, 3, 6);
        let settings = SurfaceSettings::default();
        let params = RenderParams::new(0.0, settings.neutral_focus());
        let u = FieldUniforms::new(field.shape(), &settings, &params);
        assert_eq!(disparity(&u), 0.0);

        let frame = render_cpu(&u, &field);
        assert_eq!(frame.pixels(), field.layer(1, 1).unwrap());
    }

    #[test]
    fn aperture_widens_the_footprint() {
        let field = gradient_field(3, 3, 4);
        let u = uniforms(&field, RenderParams::new(1.0, 1.0));
        assert_eq!(footprint(&u).len(), 5);
        let u = uniforms(&field, RenderParams::new(1.5, 1.0));
        assert_eq!(footprint(&u).len(), 9);
    }

    #[test]
    fn blend_is_mean_of_cameras_at_neutral_focus() {
        let field = gradient_field(2, 1, 4);
        let u = uniforms(&field, RenderParams::new(1.0, 1.0));
        assert_eq!(footprint(&u), vec![[0.0, 0.0], [1.0, 0.0]]);
        let color = shade(&u, &field, 0, 0);
        // green channel: cameras carry 0 and 60
        assert!((color[1] - 30.0 / 255.0).abs() < 1e-6);
        assert_eq!(color[3], 1.0);
    }

    #[test]
    fn shifted_lookups_outside_the_view_fall_back_to_background() {
        let field = gradient_field(3, 1, 4);
        let settings = SurfaceSettings {
            background: [0.25, 0.5, 0.75, 1.0],
            ..SurfaceSettings::default()
        };
        // disparity 0.1 * (1 / 0.01 - 1) = 9.9 pushes both cameras out of [0, 1)
        let params = RenderParams::new(0.6, 0.01).with_viewer_offset([0.05, 0.0]);
        let u = FieldUniforms::new(field.shape(), &settings, &params);
        assert_eq!(footprint(&u), vec![[1.0, 0.0], [2.0, 0.0]]);
        assert_eq!(shade(&u, &field, 1, 1), [0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn viewpoint_far_outside_grid_renders_background() {
        let field = gradient_field(2, 2, 4);
        let u = uniforms(
            &field,
            RenderParams::new(0.0, 1.0).with_viewer_offset([5.0, 5.0]),
        );
        assert!(footprint(&u).is_empty());
        let frame = render_cpu(&u, &field);
        assert!(frame.pixels().chunks(4).all(|px| px == [0, 0, 0, 255]));
    }

    #[test]
    fn grid_overlay_tints_lines_blue() {
        let shape = GridShape {
            columns: 1,
            rows: 1,
            width: 500,
            height: 2,
        };
        let bytes = [200u8, 100, 55, 255].repeat(shape.image_count() * 1000);
        let field = ImageArrayBuffer::from_bytes(shape, bytes).unwrap();
        let settings = SurfaceSettings {
            grid_overlay: true,
            ..SurfaceSettings::default()
        };
        let u = FieldUniforms::new(shape, &settings, &RenderParams::default());

        // x = 50 -> u = 0.101, just past the 0.1 line
        assert_eq!(to_unorm8(shade(&u, &field, 50, 0)), [140, 70, 115, 255]);
        assert_eq!(to_unorm8(shade(&u, &field, 25, 0)), [200, 100, 55, 255]);

        let plain = FieldUniforms::new(shape, &SurfaceSettings::default(), &RenderParams::default());
        assert_eq!(to_unorm8(shade(&plain, &field, 50, 0)), [200, 100, 55, 255]);
    }
}
