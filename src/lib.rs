//! Perceptual-hash duplicate image detection.
//!
//! Candidates are found by sniffing file headers, fingerprinted with an
//! average, perceptual (DCT) or difference hash, and grouped by exact hash.

pub mod config;
pub mod core;

pub use config::Config;
pub use crate::core::duplicate::{DuplicateFinder, DuplicateReport};
pub use crate::core::hash::{HashMethod, ImageHash, ImageHasher};
