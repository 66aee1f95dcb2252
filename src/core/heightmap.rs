use crate::error::Error;

use super::geometry::site::Site;

/// Row-major elevation grid in meters.
///
/// The sample at column `col` and row `row` lies at `(col * cell_size, row * cell_size)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Heightmap {
    width: usize,
    height: usize,
    cell_size: f64,
    data: Vec<f64>,
}

/// Inclusive ranges of columns and rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub cols: (usize, usize),
    pub rows: (usize, usize),
}

impl Heightmap {
    /// Create a heightmap from row-major data.
    pub fn new(width: usize, height: usize, cell_size: f64, data: Vec<f64>) -> Result<Self, Error> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(Error::InvalidCellSize(cell_size));
        }
        if data.len() != width * height {
            return Err(Error::HeightmapSize {
                width,
                height,
                found: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            cell_size,
            data,
        })
    }

    /// Create a heightmap by evaluating a function at every sample site.
    pub fn from_fn<F>(width: usize, height: usize, cell_size: f64, f: F) -> Result<Self, Error>
    where
        F: Fn(Site) -> f64,
    {
        let data = (0..width * height)
            .map(|index| {
                f(Site::new(
                    (index % width) as f64 * cell_size,
                    (index / width) as f64 * cell_size,
                ))
            })
            .collect();
        Self::new(width, height, cell_size, data)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn index(&self, col: usize, row: usize) -> usize {
        row * self.width + col
    }

    pub fn get(&self, col: usize, row: usize) -> Option<f64> {
        if col < self.width && row < self.height {
            Some(self.data[self.index(col, row)])
        } else {
            None
        }
    }

    /// Get the site of the sample with the given flat index.
    pub fn site_of_index(&self, index: usize) -> Site {
        Site::new(
            (index % self.width) as f64 * self.cell_size,
            (index / self.width) as f64 * self.cell_size,
        )
    }

    /// Cells whose sites lie inside the bounds, or None if the bounds miss the grid.
    pub fn cells_within(&self, min: Site, max: Site) -> Option<CellRange> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let col_min = (min.x / self.cell_size).ceil().max(0.0);
        let row_min = (min.y / self.cell_size).ceil().max(0.0);
        let col_max = (max.x / self.cell_size).floor().min((self.width - 1) as f64);
        let row_max = (max.y / self.cell_size).floor().min((self.height - 1) as f64);
        if !(col_min <= col_max && row_min <= row_max) {
            return None;
        }
        Some(CellRange {
            cols: (col_min as usize, col_max as usize),
            rows: (row_min as usize, row_max as usize),
        })
    }

    /// Bilinear sample of the elevation at an arbitrary site.
    ///
    /// Sites outside the grid are clamped to its border.
    /// Return None if the grid is empty or any contributing sample is not finite.
    pub fn sample(&self, site: &Site) -> Option<f64> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let fx = (site.x / self.cell_size).clamp(0.0, (self.width - 1) as f64);
        let fy = (site.y / self.cell_size).clamp(0.0, (self.height - 1) as f64);
        if !(fx.is_finite() && fy.is_finite()) {
            return None;
        }
        let (col0, row0) = (fx.floor() as usize, fy.floor() as usize);
        let (tx, ty) = (fx - col0 as f64, fy - row0 as f64);
        // neighbors with zero weight are not read, so a NaN next to an exact site does not leak in
        let col1 = if tx > 0.0 { col0 + 1 } else { col0 };
        let row1 = if ty > 0.0 { row0 + 1 } else { row0 };

        let h00 = self.data[self.index(col0, row0)];
        let h10 = self.data[self.index(col1, row0)];
        let h01 = self.data[self.index(col0, row1)];
        let h11 = self.data[self.index(col1, row1)];

        let top = h00 + (h10 - h00) * tx;
        let bottom = h01 + (h11 - h01) * tx;
        let value = top + (bottom - top) * ty;
        value.is_finite().then_some(value)
    }

    /// Mean of the finite samples within the radius around the site.
    ///
    /// Fall back to the bilinear sample when the disc is clipped by the grid border or holds no
    /// grid site.
    pub fn mean_around(&self, site: &Site, radius: f64) -> Option<f64> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let extent = Site::new(
            (self.width - 1) as f64 * self.cell_size,
            (self.height - 1) as f64 * self.cell_size,
        );
        let clipped = site.x - radius < 0.0
            || site.y - radius < 0.0
            || site.x + radius > extent.x
            || site.y + radius > extent.y;
        if clipped {
            return self.sample(site);
        }
        let range = self.cells_within(
            Site::new(site.x - radius, site.y - radius),
            Site::new(site.x + radius, site.y + radius),
        );
        let (sum, count) = range
            .map(|range| {
                (range.rows.0..=range.rows.1)
                    .flat_map(|row| (range.cols.0..=range.cols.1).map(move |col| (col, row)))
                    .filter_map(|(col, row)| {
                        let index = self.index(col, row);
                        let value = self.data[index];
                        (value.is_finite() && self.site_of_index(index).distance(site) <= radius)
                            .then_some(value)
                    })
                    .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1))
            })
            .unwrap_or((0.0, 0));
        if count > 0 {
            Some(sum / count as f64)
        } else {
            self.sample(site)
        }
    }

    /// Replace the whole grid with the blended data.
    ///
    /// This is the single mutation the pipeline performs on the caller's heightmap.
    pub(crate) fn commit(&mut self, data: Vec<f64>) {
        debug_assert_eq!(data.len(), self.data.len());
        self.data = data;
    }
}
