use crate::core::hash::HashMethod;
use crate::core::scanner::ScanOptions;

/// Run-wide settings. The hash method is fixed for the whole run.
#[derive(Debug, Clone)]
pub struct Config {
    pub method: HashMethod,
    pub workers: usize,
    pub scan: ScanOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            method: HashMethod::Average,
            workers: num_cpus::get(),
            scan: ScanOptions::default(),
        }
    }
}

impl Config {
    pub fn with_method(method: HashMethod) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }
}
