//! Rectangular windows over a raster grid and block-layout iteration

/// A rectangular sub-region of a raster, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    /// Row offset in the source raster
    pub row_off: usize,
    /// Column offset in the source raster
    pub col_off: usize,
    /// Number of rows in this window
    pub rows: usize,
    /// Number of columns in this window
    pub cols: usize,
}

impl Window {
    pub fn new(row_off: usize, col_off: usize, rows: usize, cols: usize) -> Self {
        Self {
            row_off,
            col_off,
            rows,
            cols,
        }
    }

    /// Window covering a whole `rows` x `cols` raster
    pub fn full(rows: usize, cols: usize) -> Self {
        Self::new(0, 0, rows, cols)
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// One past the last row
    pub fn row_end(&self) -> usize {
        self.row_off + self.rows
    }

    /// One past the last column
    pub fn col_end(&self) -> usize {
        self.col_off + self.cols
    }

    /// Whether the window lies entirely inside a `rows` x `cols` raster
    pub fn fits_in(&self, rows: usize, cols: usize) -> bool {
        self.row_end() <= rows && self.col_end() <= cols
    }

    /// Overlap of two windows, if any
    pub fn intersection(&self, other: &Window) -> Option<Window> {
        let row_off = self.row_off.max(other.row_off);
        let col_off = self.col_off.max(other.col_off);
        let row_end = self.row_end().min(other.row_end());
        let col_end = self.col_end().min(other.col_end());
        if row_off >= row_end || col_off >= col_end {
            return None;
        }
        Some(Window::new(row_off, col_off, row_end - row_off, col_end - col_off))
    }
}

/// Row-major iterator over the blocks of a raster.
///
/// Blocks on the right and bottom edges are clipped to the raster, so the
/// windows tile the raster exactly, without overlap.
#[derive(Debug, Clone)]
pub struct BlockWindows {
    total_rows: usize,
    total_cols: usize,
    block_rows: usize,
    block_cols: usize,
    current_row: usize,
    current_col: usize,
}

impl BlockWindows {
    /// Create an iterator over `block_rows` x `block_cols` blocks.
    ///
    /// A zero block dimension is treated as one.
    pub fn new(total_rows: usize, total_cols: usize, block_rows: usize, block_cols: usize) -> Self {
        Self {
            total_rows,
            total_cols,
            block_rows: block_rows.max(1),
            block_cols: block_cols.max(1),
            current_row: 0,
            current_col: 0,
        }
    }

    /// Number of blocks along (rows, cols)
    pub fn grid_shape(&self) -> (usize, usize) {
        (
            self.total_rows.div_ceil(self.block_rows),
            self.total_cols.div_ceil(self.block_cols),
        )
    }

    /// Total number of blocks
    pub fn block_count(&self) -> usize {
        let (r, c) = self.grid_shape();
        r * c
    }
}

impl Iterator for BlockWindows {
    type Item = Window;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_row >= self.total_rows || self.total_cols == 0 {
            return None;
        }

        let rows = self.block_rows.min(self.total_rows - self.current_row);
        let cols = self.block_cols.min(self.total_cols - self.current_col);
        let window = Window::new(self.current_row, self.current_col, rows, cols);

        self.current_col += self.block_cols;
        if self.current_col >= self.total_cols {
            self.current_col = 0;
            self.current_row += self.block_rows;
        }

        Some(window)
    }
}
