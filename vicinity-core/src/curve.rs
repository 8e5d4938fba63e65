//! Projection of 2D coordinates onto a Hilbert curve.
//!
//! Coordinates are scaled into a `grid_size x grid_size` integer grid
//! (`grid_size = 2^order`) and each cell is numbered by its position along
//! the curve. Cells that are close in the plane tend to get close numbers,
//! but not always: two neighbouring cells on either side of a fold can be
//! far apart on the curve, and two close numbers can sit in distant cells.

use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::error::{CurveError, Result, VicinityError};
use crate::index::{merge_ranges, IndexRange};

pub const MAX_ORDER: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Bounds of the first two vector components, widened on each side by
    /// `padding` times the axis extent.
    pub fn from_coordinates<'a, I>(coords: I, padding: f64) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Coordinate>,
    {
        let mut min_x = f64::MAX;
        let mut max_x = f64::MIN;
        let mut min_y = f64::MAX;
        let mut max_y = f64::MIN;
        let mut seen = 0usize;
        for c in coords {
            if c.dim() < 2 {
                return Err(VicinityError::UnsupportedDimension(c.dim()));
            }
            let (x, y) = (c.vector[0], c.vector[1]);
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
            seen += 1;
        }
        if seen == 0 {
            return Err(VicinityError::EmptySnapshot);
        }
        let pad_x = (max_x - min_x) * padding;
        let pad_y = (max_y - min_y) * padding;
        Ok(Self {
            min_x: min_x - pad_x,
            max_x: max_x + pad_x,
            min_y: min_y - pad_y,
            max_y: max_y + pad_y,
        })
    }

    pub fn is_degenerate_x(&self) -> bool {
        self.max_x <= self.min_x
    }

    pub fn is_degenerate_y(&self) -> bool {
        self.max_y <= self.min_y
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: u32,
    pub y: u32,
}

impl GridPosition {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveMapper {
    bounds: BoundingBox,
    order: u32,
    grid_size: u32,
}

impl CurveMapper {
    pub fn new(bounds: BoundingBox, order: u32) -> std::result::Result<Self, CurveError> {
        let grid_size = grid_size_for(order)?;
        if bounds.is_degenerate_x() {
            tracing::debug!(min_x = bounds.min_x, "x axis degenerate, all nodes map to column 0");
        }
        if bounds.is_degenerate_y() {
            tracing::debug!(min_y = bounds.min_y, "y axis degenerate, all nodes map to row 0");
        }
        Ok(Self {
            bounds,
            order,
            grid_size,
        })
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    /// Number of cells, which is also one past the largest curve index.
    pub fn cells(&self) -> u64 {
        u64::from(self.grid_size) * u64::from(self.grid_size)
    }

    pub fn max_index(&self) -> u64 {
        self.cells() - 1
    }

    pub fn normalize(&self, x: f64, y: f64) -> GridPosition {
        GridPosition {
            x: axis_cell(x, self.bounds.min_x, self.bounds.max_x, self.grid_size),
            y: axis_cell(y, self.bounds.min_y, self.bounds.max_y, self.grid_size),
        }
    }

    pub fn map_to_index(&self, pos: GridPosition) -> std::result::Result<u64, CurveError> {
        if pos.x >= self.grid_size || pos.y >= self.grid_size {
            return Err(CurveError::OutOfGrid {
                x: pos.x,
                y: pos.y,
                grid_size: self.grid_size,
            });
        }
        Ok(xy_to_index(
            u64::from(self.grid_size),
            u64::from(pos.x),
            u64::from(pos.y),
        ))
    }

    pub fn index_to_position(&self, index: u64) -> std::result::Result<GridPosition, CurveError> {
        if index >= self.cells() {
            return Err(CurveError::IndexOutOfRange {
                index,
                cells: self.cells(),
            });
        }
        let (x, y) = index_to_xy(u64::from(self.grid_size), index);
        Ok(GridPosition::new(x as u32, y as u32))
    }

    pub fn map_coordinate(&self, coord: &Coordinate) -> Result<(GridPosition, u64)> {
        if coord.dim() < 2 {
            return Err(VicinityError::UnsupportedDimension(coord.dim()));
        }
        let pos = self.normalize(coord.vector[0], coord.vector[1]);
        let index = self.map_to_index(pos)?;
        Ok((pos, index))
    }

    /// Grid cells covering the square of half-width `radius` around
    /// `(cx, cy)`, clamped to the grid.
    pub fn cell_rect(&self, cx: f64, cy: f64, radius: f64) -> (GridPosition, GridPosition) {
        let lo = self.normalize(cx - radius, cy - radius);
        let hi = self.normalize(cx + radius, cy + radius);
        (lo, hi)
    }

    /// Merged curve-index ranges covering exactly the cells of the inclusive
    /// rectangle `lo..=hi`.
    pub fn rect_ranges(
        &self,
        lo: GridPosition,
        hi: GridPosition,
    ) -> std::result::Result<Vec<IndexRange>, CurveError> {
        for pos in [lo, hi] {
            if pos.x >= self.grid_size || pos.y >= self.grid_size {
                return Err(CurveError::OutOfGrid {
                    x: pos.x,
                    y: pos.y,
                    grid_size: self.grid_size,
                });
            }
        }
        let rect = Rect {
            x0: lo.x.min(hi.x),
            x1: lo.x.max(hi.x),
            y0: lo.y.min(hi.y),
            y1: lo.y.max(hi.y),
        };
        let mut out = Vec::new();
        self.collect_ranges(0, 0, self.grid_size, &rect, &mut out);
        Ok(merge_ranges(out))
    }

    // Every aligned sub-square of the grid is walked by the curve in one
    // contiguous run, so a block fully inside the rectangle is one range.
    fn collect_ranges(&self, bx: u32, by: u32, size: u32, rect: &Rect, out: &mut Vec<IndexRange>) {
        let bx1 = bx + (size - 1);
        let by1 = by + (size - 1);
        if bx > rect.x1 || bx1 < rect.x0 || by > rect.y1 || by1 < rect.y0 {
            return;
        }
        if bx >= rect.x0 && bx1 <= rect.x1 && by >= rect.y0 && by1 <= rect.y1 {
            let span = u64::from(size) * u64::from(size);
            let d = xy_to_index(u64::from(self.grid_size), u64::from(bx), u64::from(by));
            let start = d - d % span;
            out.push(IndexRange::new(start, start + span - 1));
            return;
        }
        let half = size / 2;
        self.collect_ranges(bx, by, half, rect, out);
        self.collect_ranges(bx + half, by, half, rect, out);
        self.collect_ranges(bx, by + half, half, rect, out);
        self.collect_ranges(bx + half, by + half, half, rect, out);
    }
}

struct Rect {
    x0: u32,
    x1: u32,
    y0: u32,
    y1: u32,
}

pub fn grid_size_for(order: u32) -> std::result::Result<u32, CurveError> {
    if order == 0 || order > MAX_ORDER {
        return Err(CurveError::InvalidOrder {
            order,
            max: MAX_ORDER,
        });
    }
    Ok(1u32 << order)
}

fn axis_cell(v: f64, lo: f64, hi: f64, grid_size: u32) -> u32 {
    if hi <= lo {
        return 0;
    }
    let last = f64::from(grid_size - 1);
    let scaled = ((v - lo) * last / (hi - lo)).round();
    // max() maps NaN to 0.0
    scaled.max(0.0).min(last) as u32
}

fn rotate(n: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = n - 1 - *x;
            *y = n - 1 - *y;
        }
        std::mem::swap(x, y);
    }
}

fn xy_to_index(n: u64, mut x: u64, mut y: u64) -> u64 {
    let mut d = 0u64;
    let mut s = n / 2;
    while s > 0 {
        let rx = u64::from(x & s > 0);
        let ry = u64::from(y & s > 0);
        d += s * s * ((3 * rx) ^ ry);
        rotate(n, &mut x, &mut y, rx, ry);
        s /= 2;
    }
    d
}

fn index_to_xy(n: u64, d: u64) -> (u64, u64) {
    let mut t = d;
    let mut x = 0u64;
    let mut y = 0u64;
    let mut s = 1u64;
    while s < n {
        let rx = 1 & (t / 2);
        let ry = 1 & (t ^ rx);
        rotate(s, &mut x, &mut y, rx, ry);
        x += s * rx;
        y += s * ry;
        t /= 4;
        s *= 2;
    }
    (x, y)
}
