use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Builder, Target};
use imgdupes::core::duplicate::DuplicateReport;
use imgdupes::core::scanner::ScanOptions;
use imgdupes::{Config, DuplicateFinder, HashMethod};
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(
    name = "imgdupes",
    version,
    about = "Find visually duplicate PNG/JPEG images by perceptual hash"
)]
struct Cli {
    /// Directory to scan
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Hash method: average, perceptual or difference
    #[arg(short, long, default_value = "average")]
    method: HashMethod,

    /// Worker threads (default: number of CPUs)
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,

    /// Maximum directory depth to descend
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,

    /// Follow symbolic links while walking
    #[arg(long)]
    follow_links: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> Config {
        let defaults = Config::default();
        Config {
            method: self.method,
            workers: self.jobs.unwrap_or(defaults.workers),
            scan: ScanOptions {
                max_depth: self.max_depth,
                follow_links: self.follow_links,
            },
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    Builder::new()
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .parse_default_env()
        .target(Target::Stderr)
        .init();

    let finder = DuplicateFinder::new(&cli.config()).context("Invalid configuration")?;

    eprintln!(
        "▶ Detecting duplicates in {} with method {}",
        cli.directory.display(),
        finder.method()
    );
    let mut report = find_duplicates(&finder, &cli.directory)?;
    report.root = Some(cli.directory.clone());

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

/// Scan `dir` behind a spinner, then hash the candidates behind a progress bar.
fn find_duplicates(finder: &DuplicateFinder, dir: &Path) -> Result<DuplicateReport> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message("Scanning for images…");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let candidates = benchmark("scanning", || finder.scan(dir))
        .inspect_err(|_| spinner.finish_and_clear())
        .with_context(|| format!("Failed to scan {}", dir.display()))?;
    spinner.finish_with_message(format!("Found {} images", candidates.len()));

    let bar = ProgressBar::new(candidates.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {wide_msg}")?
            .progress_chars("##-"),
    );
    let progress = |path: &Path| {
        bar.set_message(path.display().to_string());
        bar.inc(1);
    };

    let report = benchmark("hashing all images", || {
        finder.hash_paths(&candidates, Some(&progress))
    });
    bar.finish_and_clear();

    Ok(report)
}

fn print_report(report: &DuplicateReport) {
    if report.groups.is_empty() {
        println!("No duplicates found.");
    } else {
        println!("Found {} duplicate group(s):", report.groups.len());
        for (i, group) in report.groups.iter().enumerate() {
            println!(" Group {}:", i + 1);
            println!("   Hash: {}", group.hash);
            for path in &group.paths {
                println!("   ▶ {}", path.display());
            }
        }
    }

    println!(
        "\n{} candidate image(s), {} hashed, {} skipped",
        report.candidates, report.hashed, report.skipped
    );
}

/// Run `f()`, log how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    log::info!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
