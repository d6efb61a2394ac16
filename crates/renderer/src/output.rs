use std::path::Path;

use image::RgbaImage;

use crate::RenderError;

/// One rendered image: tightly packed RGBA8 rows, top row first.
#[derive(Clone, PartialEq, Eq)]
pub struct RenderedFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RenderedFrame {
    pub(crate) fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 4);
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.pixels.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn into_image(self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels)
    }

    pub fn save_png(&self, path: &Path) -> Result<(), RenderError> {
        image::save_buffer_with_format(
            path,
            &self.pixels,
            self.width,
            self.height,
            image::ExtendedColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .map_err(|source| RenderError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), width = self.width, height = self.height, "saved frame");
        Ok(())
    }
}

impl std::fmt::Debug for RenderedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_png_decodes_to_the_same_pixels() {
        let frame = RenderedFrame::new(2, 1, vec![255, 0, 0, 255, 0, 0, 255, 255]);
        assert_eq!(frame.pixel(1, 0), Some([0, 0, 255, 255]));
        assert_eq!(frame.pixel(2, 0), None);

        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("frame.png");
        frame.save_png(&path).unwrap();
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.as_raw(), frame.pixels());
    }
}
