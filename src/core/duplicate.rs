use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use thiserror::Error;

use crate::config::Config;
use crate::core::hash::{HashMethod, ImageHash, ImageHasher};
use crate::core::scanner::{ScanError, ScanOptions, scan_candidates};

#[derive(Debug, Error)]
pub enum DuplicateError {
    #[error("Scan failed: {0}")]
    Scan(#[from] ScanError),

    #[error("Invalid worker count: {0}")]
    InvalidWorkers(usize),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Called once for every path the hashing stage finishes with, hashed or skipped.
pub type ProgressCallback<'a> = dyn Fn(&Path) + Send + Sync + 'a;

/// Paths keyed by the hash they produced.
pub type DuplicateGroups = HashMap<ImageHash, Vec<PathBuf>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedImage {
    pub path: PathBuf,
    pub hash: ImageHash,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub hash: ImageHash,
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateReport {
    pub method: HashMethod,
    pub root: Option<PathBuf>,
    pub candidates: usize,
    pub hashed: usize,
    pub skipped: usize,
    pub generated_at: String,
    pub groups: Vec<DuplicateGroup>,
}

impl DuplicateReport {
    /// Keep groups with at least two members, sorted so output is stable.
    fn from_groups(method: HashMethod, candidates: usize, groups: DuplicateGroups) -> Self {
        let hashed: usize = groups.values().map(Vec::len).sum();

        let mut duplicates: Vec<DuplicateGroup> = groups
            .into_iter()
            .filter(|(_, paths)| paths.len() > 1)
            .map(|(hash, mut paths)| {
                paths.sort();
                DuplicateGroup { hash, paths }
            })
            .collect();
        duplicates.sort_by(|a, b| a.paths.cmp(&b.paths));

        Self {
            method,
            root: None,
            candidates,
            hashed,
            skipped: candidates - hashed,
            generated_at: Utc::now().to_rfc3339(),
            groups: duplicates,
        }
    }
}

/// Fingerprints candidate files on a bounded worker pool and groups them by hash.
pub struct DuplicateFinder {
    hasher: ImageHasher,
    scan_options: ScanOptions,
    pool: rayon::ThreadPool,
}

impl DuplicateFinder {
    pub fn new(config: &Config) -> Result<Self, DuplicateError> {
        if config.workers == 0 {
            return Err(DuplicateError::InvalidWorkers(config.workers));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("imgdupes-worker-{}", i))
            .build()?;

        Ok(Self {
            hasher: ImageHasher::new(config.method),
            scan_options: config.scan.clone(),
            pool,
        })
    }

    pub fn method(&self) -> HashMethod {
        self.hasher.method()
    }

    /// Walk `root` and return the files whose content is PNG or JPEG.
    pub fn scan(&self, root: &Path) -> Result<Vec<PathBuf>, ScanError> {
        self.pool
            .install(|| scan_candidates(root, &self.scan_options))
    }

    /// Scan `root`, hash every candidate and report the duplicate groups.
    pub fn find_duplicates(
        &self,
        root: &Path,
        progress: Option<&ProgressCallback<'_>>,
    ) -> Result<DuplicateReport, DuplicateError> {
        let candidates = self.scan(root)?;
        let mut report = self.hash_paths(&candidates, progress);
        report.root = Some(root.to_path_buf());
        Ok(report)
    }

    /// Hash each path exactly once and group the results.
    ///
    /// Files that fail to open or decode are logged and skipped.
    pub fn hash_paths(
        &self,
        paths: &[PathBuf],
        progress: Option<&ProgressCallback<'_>>,
    ) -> DuplicateReport {
        let (tx, rx) = mpsc::channel::<HashedImage>();

        let groups = thread::scope(|s| {
            let aggregator = s.spawn(move || aggregate(rx));

            // every split owns a sender clone; the channel closes when the last one drops
            self.pool.install(|| {
                paths.par_iter().for_each_with(tx, |tx, path| {
                    match self.hasher.hash_file(path) {
                        Ok(hash) => {
                            let hashed = HashedImage {
                                path: path.clone(),
                                hash,
                            };
                            if tx.send(hashed).is_err() {
                                log::error!("Aggregator stopped, dropping {}", path.display());
                            }
                        }
                        Err(e) => log::warn!("Skipping {}: {}", path.display(), e),
                    }
                    if let Some(progress) = progress {
                        progress(path);
                    }
                });
            });

            aggregator
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        });

        DuplicateReport::from_groups(self.hasher.method(), paths.len(), groups)
    }
}

/// Drain `rx` into groups. Returns once every sender has been dropped.
fn aggregate(rx: Receiver<HashedImage>) -> DuplicateGroups {
    let mut groups = DuplicateGroups::new();
    for hashed in rx {
        groups.entry(hashed.hash).or_default().push(hashed.path);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn create_gradient_image(path: &Path) {
        let img = ImageBuffer::from_fn(64, 64, |x, _| {
            let intensity = (x * 4) as u8;
            Rgb([intensity, intensity, intensity])
        });
        img.save(path).unwrap();
    }

    fn create_checker_image(path: &Path) {
        let img = ImageBuffer::from_fn(64, 64, |x, y| {
            let v = if (x / 16 + y / 16) % 2 == 0 { 230u8 } else { 20 };
            Rgb([v, v, v])
        });
        img.save(path).unwrap();
    }

    fn finder(method: HashMethod, workers: usize) -> DuplicateFinder {
        let config = Config {
            workers,
            ..Config::with_method(method)
        };
        DuplicateFinder::new(&config).unwrap()
    }

    #[test]
    fn test_identical_copies_form_one_group() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("original.png");
        let copy = temp_dir.path().join("copy of original.png");
        let distinct = temp_dir.path().join("distinct.png");

        create_gradient_image(&original);
        fs::copy(&original, &copy).unwrap();
        create_checker_image(&distinct);

        for method in HashMethod::ALL {
            let report = finder(method, 2)
                .find_duplicates(temp_dir.path(), None)
                .unwrap();

            assert_eq!(report.candidates, 3);
            assert_eq!(report.hashed, 3);
            assert_eq!(report.skipped, 0);
            assert_eq!(report.groups.len(), 1, "method {}", method);

            let mut expected = vec![original.clone(), copy.clone()];
            expected.sort();
            assert_eq!(report.groups[0].paths, expected);
        }
    }

    #[test]
    fn test_fake_png_never_reaches_hashing() {
        let temp_dir = TempDir::new().unwrap();
        create_gradient_image(&temp_dir.path().join("a.png"));
        fs::write(temp_dir.path().join("b.png"), b"plain text").unwrap();

        let hashed = AtomicUsize::new(0);
        let progress = |_: &Path| {
            hashed.fetch_add(1, Ordering::Relaxed);
        };
        let report = finder(HashMethod::Average, 2)
            .find_duplicates(temp_dir.path(), Some(&progress))
            .unwrap();

        assert_eq!(report.candidates, 1);
        assert_eq!(hashed.load(Ordering::Relaxed), 1);
        assert!(report.groups.is_empty());
    }

    #[test]
    fn test_corrupt_image_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let good = temp_dir.path().join("good.png");
        let corrupt = temp_dir.path().join("corrupt.png");
        create_gradient_image(&good);

        // valid magic, truncated payload
        let bytes = fs::read(&good).unwrap();
        fs::write(&corrupt, &bytes[..20]).unwrap();

        let report = finder(HashMethod::Difference, 2)
            .find_duplicates(temp_dir.path(), None)
            .unwrap();

        assert_eq!(report.candidates, 2);
        assert_eq!(report.hashed, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.groups.is_empty());
    }

    #[test]
    fn test_every_result_is_drained() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("img_0.png");
        create_gradient_image(&original);
        for i in 1..40 {
            fs::copy(&original, temp_dir.path().join(format!("img_{}.png", i))).unwrap();
        }

        let progress_calls = AtomicUsize::new(0);
        let progress = |_: &Path| {
            progress_calls.fetch_add(1, Ordering::Relaxed);
        };

        let report = finder(HashMethod::Perceptual, 4)
            .find_duplicates(temp_dir.path(), Some(&progress))
            .unwrap();

        assert_eq!(progress_calls.load(Ordering::Relaxed), 40);
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].paths.len(), 40);
    }

    #[test]
    fn test_single_worker_completes() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.png");
        create_checker_image(&a);
        fs::copy(&a, temp_dir.path().join("b.png")).unwrap();

        let report = finder(HashMethod::Average, 1)
            .find_duplicates(temp_dir.path(), None)
            .unwrap();
        assert_eq!(report.groups.len(), 1);
    }

    #[test]
    fn test_missing_file_is_skipped_while_hashing() {
        let temp_dir = TempDir::new().unwrap();
        let present = temp_dir.path().join("present.png");
        create_gradient_image(&present);
        let missing = temp_dir.path().join("vanished.png");

        let report = finder(HashMethod::Average, 2).hash_paths(&[present, missing], None);
        assert_eq!(report.hashed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.root, None);
    }

    #[test]
    fn test_empty_input_with_borrowing_progress() {
        let seen = AtomicUsize::new(0);
        let progress = |_: &Path| {
            seen.fetch_add(1, Ordering::Relaxed);
        };

        let report = finder(HashMethod::Average, 2).hash_paths(&[], Some(&progress));
        assert_eq!(seen.load(Ordering::Relaxed), 0);
        assert_eq!(report.candidates, 0);
        assert_eq!(report.skipped, 0);
        assert!(report.groups.is_empty());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = Config {
            workers: 0,
            ..Config::default()
        };
        assert!(matches!(
            DuplicateFinder::new(&config),
            Err(DuplicateError::InvalidWorkers(0))
        ));
    }

    #[test]
    fn test_traversal_error_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let result = finder(HashMethod::Average, 1)
            .find_duplicates(&temp_dir.path().join("nope"), None);
        assert!(matches!(
            result,
            Err(DuplicateError::Scan(ScanError::Traversal(_)))
        ));
    }

    #[test]
    fn test_report_keeps_only_groups_with_two_members() {
        let mut groups = DuplicateGroups::new();
        groups.insert(ImageHash(1), vec![PathBuf::from("/b"), PathBuf::from("/a")]);
        groups.insert(ImageHash(2), vec![PathBuf::from("/c")]);

        let report = DuplicateReport::from_groups(HashMethod::Average, 4, groups);
        assert_eq!(report.hashed, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(
            report.groups,
            vec![DuplicateGroup {
                hash: ImageHash(1),
                paths: vec![PathBuf::from("/a"), PathBuf::from("/b")],
            }]
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["method"], "average");
        assert_eq!(json["groups"][0]["hash"], ImageHash(1).to_string());
    }
}
