//! Test runner for SIL source corpora.
//!
//! Discovers `.sil` files recursively and checks that each one compiles,
//! reporting per-file results and a summary.

use crate::CompilerOptions;
use crate::compile_source;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

const RED: &str = "\x1b[91m";
const GREEN: &str = "\x1b[92m";
const YELLOW: &str = "\x1b[93m";
const RESET: &str = "\x1b[0m";

/// Result of compiling a single test file.
#[derive(Debug)]
pub struct TestResult {
    pub path: PathBuf,
    pub passed: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Summary of a whole run.
#[derive(Debug, Default)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<TestResult>,
}

pub struct TestRunner {
    pub verbose: bool,
    /// Only run files whose name contains this pattern.
    pub filter: Option<String>,
}

impl TestRunner {
    pub fn new(verbose: bool, filter: Option<String>) -> Self {
        TestRunner { verbose, filter }
    }

    /// Find `.sil` files under the given paths, sorted.
    pub fn discover(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for path in paths {
            if path.is_file() {
                if self.matches(path) {
                    files.push(path.clone());
                }
            } else if path.is_dir() {
                self.discover_in_directory(path, &mut files);
            }
        }
        files.sort();
        files
    }

    fn matches(&self, path: &Path) -> bool {
        let is_sil = path.extension().is_some_and(|e| e == "sil");
        if !is_sil {
            return false;
        }
        match &self.filter {
            Some(pattern) => path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains(pattern.as_str())),
            None => true,
        }
    }

    fn discover_in_directory(&self, dir: &Path, files: &mut Vec<PathBuf>) {
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() && self.matches(&path) {
                    files.push(path);
                } else if path.is_dir() {
                    self.discover_in_directory(&path, files);
                }
            }
        }
    }

    /// Compile every discovered file and collect the results.
    pub fn run(&self, paths: &[PathBuf]) -> TestSummary {
        let mut summary = TestSummary::default();
        for path in self.discover(paths) {
            let start = Instant::now();
            let outcome = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|source| {
                    compile_source(&source, &CompilerOptions::default())
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                });
            let duration_ms = start.elapsed().as_millis() as u64;

            summary.total += 1;
            if outcome.is_ok() {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }
            summary.results.push(TestResult {
                path,
                passed: outcome.is_ok(),
                duration_ms,
                error: outcome.err(),
            });
        }
        summary
    }

    pub fn print_results(&self, summary: &TestSummary) {
        println!("{}==== SIL TEST RESULTS ===={}", YELLOW, RESET);
        for result in &summary.results {
            if result.passed {
                if self.verbose {
                    println!(
                        "{}\u{2713} Passed:{} {} ({} ms)",
                        GREEN,
                        RESET,
                        result.path.display(),
                        result.duration_ms
                    );
                } else {
                    println!("{}\u{2713} Passed:{} {}", GREEN, RESET, result.path.display());
                }
            } else {
                println!("{}\u{2717} Failed:{} {}", RED, RESET, result.path.display());
                if let Some(error) = &result.error {
                    println!("  {}", error);
                }
            }
        }
        println!(
            "\n{}{} passed{}, {}{} failed{}, {} total",
            GREEN, summary.passed, RESET, RED, summary.failed, RESET, summary.total
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_discovers_sil_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.sil", "kernel k(out: int) { return; }");
        write(dir.path(), "ignored.txt", "not a test");
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        write(&nested, "b.sil", "kernel k(out: int) { return; }");

        let runner = TestRunner::new(false, None);
        let files = runner.discover(&[dir.path().to_path_buf()]);
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_filter_narrows_discovery() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "add.sil", "kernel k(out: int) { return; }");
        write(dir.path(), "mul.sil", "kernel k(out: int) { return; }");

        let runner = TestRunner::new(false, Some("add".to_string()));
        let files = runner.discover(&[dir.path().to_path_buf()]);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("add.sil"));
    }

    #[test]
    fn test_run_counts_passes_and_failures() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.sil", "kernel k(out: int) { out = 1; return; }");
        write(dir.path(), "bad.sil", "kernel k(out: int) { out = missing; }");

        let runner = TestRunner::new(false, None);
        let summary = runner.run(&[dir.path().to_path_buf()]);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        let failed = summary.results.iter().find(|r| !r.passed).unwrap();
        assert!(failed.error.as_ref().unwrap().contains("unknown identifier"));
    }
}
