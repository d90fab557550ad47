use rayon::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub const PNG_MAGIC_BYTES: [u8; 4] = [0x89, 0x50, 0x4E, 0x47];
pub const JPEG_MAGIC_BYTES: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];
pub const JPEG_EXIF_MAGIC_BYTES: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE1];

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    #[error("Failed to walk directory: {0}")]
    Traversal(#[from] walkdir::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Classify a file by its leading magic bytes.
    pub fn sniff(header: &[u8]) -> Option<Self> {
        let magic: [u8; 4] = header.get(..4)?.try_into().ok()?;
        match magic {
            PNG_MAGIC_BYTES => Some(ImageFormat::Png),
            JPEG_MAGIC_BYTES | JPEG_EXIF_MAGIC_BYTES => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanOptions {
    pub max_depth: Option<usize>,
    pub follow_links: bool,
}

/// Read the first 4 bytes of `path` and classify them.
pub fn sniff_file(path: &Path) -> std::io::Result<Option<ImageFormat>> {
    let mut header = [0u8; 4];
    let mut file = File::open(path)?;
    match file.read_exact(&mut header) {
        Ok(()) => Ok(ImageFormat::sniff(&header)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// Recursively walk `root`, returning every file whose content is PNG or JPEG.
///
/// Any traversal error aborts the scan. Files that can't be opened or whose
/// header doesn't match are left out.
pub fn scan_candidates(root: &Path, options: &ScanOptions) -> Result<Vec<PathBuf>, ScanError> {
    if root.exists() && !root.is_dir() {
        return Err(ScanError::InvalidPath {
            path: format!("{} is not a directory", root.display()),
        });
    }

    let mut walker = WalkDir::new(root).follow_links(options.follow_links);
    if let Some(max_depth) = options.max_depth {
        walker = walker.max_depth(max_depth);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    let candidates: Vec<PathBuf> = files
        .into_par_iter()
        .filter(|path| match sniff_file(path) {
            Ok(Some(_)) => true,
            Ok(None) => {
                log::debug!("Skipping {}: not a PNG or JPEG", path.display());
                false
            }
            Err(e) => {
                log::debug!("Skipping {}: {}", path.display(), e);
                false
            }
        })
        .collect();

    log::info!(
        "Found {} candidate image(s) under {}",
        candidates.len(),
        root.display()
    );
    Ok(candidates)
}
