use crate::LoadError;

/// Bytes per RGBA8 texel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Identifies one fetchable light-field sample: where its views live and how
/// the camera grid and images are shaped.
///
/// Views are addressed as `{directory}{prefix}{column}_{row}.png`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSpec {
    directory: String,
    prefix: String,
    columns: u32,
    rows: u32,
    width: u32,
    height: u32,
}

/// Camera grid and per-view resolution without the addressing information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridShape {
    pub columns: u32,
    pub rows: u32,
    pub width: u32,
    pub height: u32,
}

impl GridShape {
    pub fn image_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    pub fn image_bytes(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    pub fn buffer_len(&self) -> usize {
        self.image_count() * self.image_bytes()
    }

    /// Layer index of camera `(column, row)`; rows vary fastest.
    pub fn cell_index(&self, column: u32, row: u32) -> usize {
        column as usize * self.rows as usize + row as usize
    }
}

/// One grid cell in fetch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub column: u32,
    pub row: u32,
    pub index: usize,
}

impl GridSpec {
    pub fn new(
        directory: impl Into<String>,
        prefix: impl Into<String>,
        columns: u32,
        rows: u32,
        width: u32,
        height: u32,
    ) -> Result<Self, LoadError> {
        if columns == 0 || rows == 0 {
            return Err(LoadError::InvalidGrid(format!(
                "camera grid must be at least 1x1, got {columns}x{rows}"
            )));
        }
        if width == 0 || height == 0 {
            return Err(LoadError::InvalidGrid(format!(
                "image resolution must be non-zero, got {width}x{height}"
            )));
        }
        let overflow = (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(BYTES_PER_PIXEL))
            .and_then(|bytes| bytes.checked_mul(columns as usize))
            .and_then(|bytes| bytes.checked_mul(rows as usize))
            .is_none();
        if overflow {
            return Err(LoadError::InvalidGrid(format!(
                "{columns}x{rows} views of {width}x{height} do not fit in memory"
            )));
        }

        Ok(Self {
            directory: directory.into(),
            prefix: prefix.into(),
            columns,
            rows,
            width,
            height,
        })
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn shape(&self) -> GridShape {
        GridShape {
            columns: self.columns,
            rows: self.rows,
            width: self.width,
            height: self.height,
        }
    }

    pub fn image_count(&self) -> usize {
        self.shape().image_count()
    }

    pub fn buffer_len(&self) -> usize {
        self.shape().buffer_len()
    }

    pub fn cell_location(&self, column: u32, row: u32) -> String {
        format!("{}{}{}_{}.png", self.directory, self.prefix, column, row)
    }

    /// Cells in fetch order: columns outer, rows inner.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        let shape = self.shape();
        (0..self.columns).flat_map(move |column| {
            (0..shape.rows).map(move |row| Cell {
                column,
                row,
                index: shape.cell_index(column, row),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_locations_from_prefix() {
        let grid = GridSpec::new("/x/", "p_", 2, 2, 4, 4).unwrap();
        assert_eq!(grid.cell_location(1, 0), "/x/p_1_0.png");
        assert_eq!(grid.buffer_len(), 256);
    }

    #[test]
    fn cells_follow_column_major_order() {
        let grid = GridSpec::new("", "", 2, 3, 1, 1).unwrap();
        let order: Vec<_> = grid.cells().map(|c| (c.column, c.row, c.index)).collect();
        assert_eq!(
            order,
            vec![
                (0, 0, 0),
                (0, 1, 1),
                (0, 2, 2),
                (1, 0, 3),
                (1, 1, 4),
                (1, 2, 5)
            ]
        );
    }

    #[test]
    fn rejects_empty_grid() {
        assert!(matches!(
            GridSpec::new("", "", 0, 3, 4, 4),
            Err(LoadError::InvalidGrid(_))
        ));
        assert!(matches!(
            GridSpec::new("", "", 3, 3, 0, 4),
            Err(LoadError::InvalidGrid(_))
        ));
    }
}
