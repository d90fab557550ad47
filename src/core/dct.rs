use std::f64::consts::PI;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::core::grid::PixelGrid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DctError {
    #[error("Invalid axis specified: {0}. Must be 0 or 1")]
    InvalidAxis(usize),
}

/// Cosine basis values `cos(π·k·(2n+1) / 2N)` for one transform size N.
#[derive(Debug)]
pub struct CosineBasis {
    size: usize,
    values: Vec<f64>,
}

impl CosineBasis {
    fn build(size: usize) -> Self {
        let mut values = vec![0.0; size * size];
        for n in 0..size {
            for k in 0..size {
                values[n * size + k] =
                    ((PI * k as f64) * (2 * n + 1) as f64 / (2 * size) as f64).cos();
            }
        }
        Self { size, values }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn get(&self, n: usize, k: usize) -> f64 {
        self.values[n * self.size + k]
    }
}

/// Lazily built cosine table holding a single active transform size.
///
/// A request for a different size discards the table and rebuilds it whole.
/// Readers holding an `Arc` from before the rebuild keep their own complete copy.
#[derive(Debug, Default)]
pub struct CosineTable {
    active: RwLock<Option<Arc<CosineBasis>>>,
}

impl CosineTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Basis for transform size `size`, rebuilding if another size is active.
    pub fn basis(&self, size: usize) -> Arc<CosineBasis> {
        {
            let guard = self.active.read().unwrap_or_else(|e| e.into_inner());
            if let Some(basis) = guard.as_ref().filter(|b| b.size == size) {
                return Arc::clone(basis);
            }
        }

        let mut guard = self.active.write().unwrap_or_else(|e| e.into_inner());
        // another thread may have rebuilt while we waited for the write lock
        if let Some(basis) = guard.as_ref().filter(|b| b.size == size) {
            return Arc::clone(basis);
        }
        log::debug!("Building cosine table for N={}", size);
        let basis = Arc::new(CosineBasis::build(size));
        *guard = Some(Arc::clone(&basis));
        basis
    }

    /// `cos(π·k·(2n+1) / 2N)` for `0 <= n, k < N`.
    pub fn cos(&self, n: usize, size: usize, k: usize) -> f64 {
        self.basis(size).get(n, k)
    }

    /// Size the table is currently built for, if any.
    pub fn active_size(&self) -> Option<usize> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|b| b.size)
    }
}

/// Unnormalised DCT-II (scipy `dct(type=2, norm=None)` convention).
#[derive(Debug, Default)]
pub struct Dct {
    table: CosineTable,
}

impl Dct {
    pub fn new() -> Self {
        Self::default()
    }

    /// DCT-II along `axis`: 0 transforms each column, 1 transforms each row.
    pub fn transform(&self, grid: &PixelGrid, axis: usize) -> Result<PixelGrid, DctError> {
        let axis = match axis {
            0 => Axis::Columns,
            1 => Axis::Rows,
            other => return Err(DctError::InvalidAxis(other)),
        };
        Ok(self.transform_along(grid, axis))
    }

    /// Separable 2-D DCT-II: columns first, then rows.
    pub fn transform_2d(&self, grid: &PixelGrid) -> PixelGrid {
        let columns = self.transform_along(grid, Axis::Columns);
        self.transform_along(&columns, Axis::Rows)
    }

    fn transform_along(&self, grid: &PixelGrid, axis: Axis) -> PixelGrid {
        let (width, height) = (grid.width(), grid.height());
        let mut out = PixelGrid::zeros(width, height);

        match axis {
            Axis::Columns => {
                let basis = self.table.basis(height);
                for col in 0..width {
                    for k in 0..height {
                        let sum: f64 = (0..height)
                            .map(|n| grid.get(n, col) * basis.get(n, k))
                            .sum();
                        out.set(k, col, 2.0 * sum);
                    }
                }
            }
            Axis::Rows => {
                let basis = self.table.basis(width);
                for row in 0..height {
                    let values = grid.row(row);
                    for k in 0..width {
                        let sum: f64 = values
                            .iter()
                            .enumerate()
                            .map(|(n, v)| v * basis.get(n, k))
                            .sum();
                        out.set(row, k, 2.0 * sum);
                    }
                }
            }
        }

        out
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    Columns,
    Rows,
}
