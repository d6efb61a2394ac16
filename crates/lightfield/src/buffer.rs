use crate::grid::{GridShape, BYTES_PER_PIXEL};

/// Packed RGBA8 views of a whole camera grid, one layer per camera.
///
/// Layer `(column, row)` starts at `cell_index(column, row) * image_bytes`
/// and is stored row-major. The buffer is only ever built by the loader and
/// is read-only afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageArrayBuffer {
    shape: GridShape,
    bytes: Vec<u8>,
}

impl ImageArrayBuffer {
    pub(crate) fn zeroed(shape: GridShape) -> Self {
        Self {
            shape,
            bytes: vec![0; shape.buffer_len()],
        }
    }

    /// Wraps already packed bytes, e.g. a texture produced elsewhere.
    pub fn from_bytes(shape: GridShape, bytes: Vec<u8>) -> Option<Self> {
        (bytes.len() == shape.buffer_len()).then_some(Self { shape, bytes })
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn layer_count(&self) -> usize {
        self.shape.image_count()
    }

    /// Bytes of the view taken by camera `(column, row)`.
    pub fn layer(&self, column: u32, row: u32) -> Option<&[u8]> {
        if column >= self.shape.columns || row >= self.shape.rows {
            return None;
        }
        let start = self.shape.cell_index(column, row) * self.shape.image_bytes();
        self.bytes.get(start..start + self.shape.image_bytes())
    }

    /// RGBA texel of `layer` at `(x, y)`.
    pub fn texel(&self, layer: usize, x: u32, y: u32) -> Option<[u8; 4]> {
        if layer >= self.layer_count() || x >= self.shape.width || y >= self.shape.height {
            return None;
        }
        let offset = layer * self.shape.image_bytes()
            + (y as usize * self.shape.width as usize + x as usize) * BYTES_PER_PIXEL;
        let px = self.bytes.get(offset..offset + BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    pub(crate) fn layer_mut(&mut self, index: usize) -> &mut [u8] {
        let size = self.shape.image_bytes();
        let start = index * size;
        &mut self.bytes[start..start + size]
    }
}

impl std::fmt::Debug for ImageArrayBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageArrayBuffer")
            .field("shape", &self.shape)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> GridShape {
        GridShape {
            columns: 2,
            rows: 1,
            width: 2,
            height: 1,
        }
    }

    #[test]
    fn from_bytes_checks_length() {
        assert!(ImageArrayBuffer::from_bytes(shape(), vec![0; 15]).is_none());
        assert!(ImageArrayBuffer::from_bytes(shape(), vec![0; 16]).is_some());
    }

    #[test]
    fn texel_addresses_layers() {
        let bytes: Vec<u8> = (0..16).collect();
        let buffer = ImageArrayBuffer::from_bytes(shape(), bytes).unwrap();
        assert_eq!(buffer.texel(0, 1, 0), Some([4, 5, 6, 7]));
        assert_eq!(buffer.texel(1, 0, 0), Some([8, 9, 10, 11]));
        assert_eq!(buffer.texel(2, 0, 0), None);
        assert_eq!(buffer.layer(1, 0).unwrap(), &[8, 9, 10, 11, 12, 13, 14, 15]);
    }
}
