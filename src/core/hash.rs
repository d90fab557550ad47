use image::{DynamicImage, ImageReader};
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::core::dct::Dct;
use crate::core::grid::{PixelGrid, luma_grid};

/// Side of the decision grid; every hash carries `HASH_SIZE²` bits.
pub const HASH_SIZE: usize = 8;

/// Resolution the perceptual hash samples before taking the DCT.
pub const PERCEPTUAL_SIZE: usize = HASH_SIZE * 4;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid hash method '{0}', must be one of average, perceptual, difference")]
    UnknownMethod(String),
}

/// 64-bit perceptual fingerprint; bit `row * 8 + col` is one decision cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImageHash(pub u64);

impl ImageHash {
    pub fn bit(&self, row: usize, col: usize) -> bool {
        self.0 & (1 << (row * HASH_SIZE + col)) != 0
    }

    /// Encode a decision grid: `decide(row, col)` sets bit `row * 8 + col`.
    fn from_decisions(decide: impl Fn(usize, usize) -> bool) -> Self {
        let mut out = 0u64;
        for row in 0..HASH_SIZE {
            for col in 0..HASH_SIZE {
                if decide(row, col) {
                    out |= 1 << (row * HASH_SIZE + col);
                }
            }
        }
        ImageHash(out)
    }
}

impl fmt::Display for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:064b}", self.0)
    }
}

impl fmt::LowerHex for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Serialize for ImageHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HashMethod {
    Average,
    Perceptual,
    Difference,
}

impl HashMethod {
    pub const ALL: [HashMethod; 3] = [
        HashMethod::Average,
        HashMethod::Perceptual,
        HashMethod::Difference,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HashMethod::Average => "average",
            HashMethod::Perceptual => "perceptual",
            HashMethod::Difference => "difference",
        }
    }
}

impl fmt::Display for HashMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashMethod {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "average" | "ahash" => Ok(HashMethod::Average),
            "perceptual" | "phash" => Ok(HashMethod::Perceptual),
            "difference" | "dhash" => Ok(HashMethod::Difference),
            _ => Err(HashError::UnknownMethod(s.to_string())),
        }
    }
}

/// Pixels brighter than the grid mean become 1 bits. Expects an 8×8 grid.
pub(crate) fn average_hash(grid: &PixelGrid) -> ImageHash {
    assert_eq!((grid.width(), grid.height()), (HASH_SIZE, HASH_SIZE));

    let mean = grid.mean();
    ImageHash::from_decisions(|row, col| grid.get(row, col) > mean)
}

/// Low-frequency DCT coefficients above their mean become 1 bits. Expects a 32×32 grid.
pub(crate) fn perceptual_hash(dct: &Dct, grid: &PixelGrid) -> ImageHash {
    assert_eq!(
        (grid.width(), grid.height()),
        (PERCEPTUAL_SIZE, PERCEPTUAL_SIZE)
    );

    let low_freqs = dct.transform_2d(grid).crop(HASH_SIZE, HASH_SIZE);
    let mean = low_freqs.mean();
    ImageHash::from_decisions(|row, col| low_freqs.get(row, col) > mean)
}

/// A bit is 1 when a pixel is brighter than its right neighbour. Expects 9 columns × 8 rows.
pub(crate) fn difference_hash(grid: &PixelGrid) -> ImageHash {
    assert_eq!((grid.width(), grid.height()), (HASH_SIZE + 1, HASH_SIZE));

    ImageHash::from_decisions(|row, col| grid.get(row, col) > grid.get(row, col + 1))
}

/// Hashes decoded images with one method for the lifetime of a run.
#[derive(Debug)]
pub struct ImageHasher {
    method: HashMethod,
    dct: Dct,
}

impl ImageHasher {
    pub fn new(method: HashMethod) -> Self {
        Self {
            method,
            dct: Dct::new(),
        }
    }

    pub fn method(&self) -> HashMethod {
        self.method
    }

    pub fn hash(&self, img: &DynamicImage) -> ImageHash {
        match self.method {
            HashMethod::Average => {
                let size = HASH_SIZE as u32;
                average_hash(&luma_grid(img, size, size))
            }
            HashMethod::Perceptual => {
                let size = PERCEPTUAL_SIZE as u32;
                perceptual_hash(&self.dct, &luma_grid(img, size, size))
            }
            HashMethod::Difference => {
                let size = HASH_SIZE as u32;
                difference_hash(&luma_grid(img, size + 1, size))
            }
        }
    }

    /// Decode the file at `path` (format picked from its content) and hash it.
    pub fn hash_file(&self, path: &Path) -> Result<ImageHash, HashError> {
        let img = ImageReader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(|source| HashError::Decode {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(self.hash(&img))
    }
}
