use image::{DynamicImage, imageops::FilterType};

/// Row-major grid of luminance values.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelGrid {
    width: usize,
    height: usize,
    values: Vec<f64>,
}

impl PixelGrid {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            values: vec![0.0; width * height],
        }
    }

    /// Build a grid from a function of `(row, col)`.
    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> f64) -> Self {
        let values = (0..height)
            .flat_map(|row| (0..width).map(move |col| (row, col)))
            .map(|(row, col)| f(row, col))
            .collect();
        Self {
            width,
            height,
            values,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.values[row * self.width + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.values[row * self.width..(row + 1) * self.width]
    }

    /// Top-left `width × height` block.
    pub fn crop(&self, width: usize, height: usize) -> PixelGrid {
        PixelGrid::from_fn(width, height, |row, col| self.get(row, col))
    }

    /// Mean of all cells. Accumulated relative to the first cell so a constant
    /// grid yields exactly that constant.
    pub fn mean(&self) -> f64 {
        let Some(&pivot) = self.values.first() else {
            return 0.0;
        };
        let offset: f64 = self.values.iter().map(|v| v - pivot).sum();
        pivot + offset / self.values.len() as f64
    }
}

/// Grayscale `img` and resample it to exactly `width × height`, scaled to [0, 1].
pub fn luma_grid(img: &DynamicImage, width: u32, height: u32) -> PixelGrid {
    let gray = img.to_luma8();
    let small = image::imageops::resize(&gray, width, height, FilterType::Triangle);

    let values = small.pixels().map(|p| p.0[0] as f64 / 255.0).collect();
    PixelGrid {
        width: width as usize,
        height: height as usize,
        values,
    }
}
