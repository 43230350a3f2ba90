// src/cli/mod.rs
//
// Command-line interface module

mod args;
mod output;

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::media::ContainerFormat;
use crate::detection::{DetectionReport, Verdict};

pub use args::Args;
pub use output::{format_error, format_json, format_report, format_summary};

/// Process exit status: nothing found
pub const EXIT_CLEAN: i32 = 0;
/// At least one file is suspicious or detected
pub const EXIT_FLAGGED: i32 = 1;
/// No requested file could be analyzed
pub const EXIT_ERROR: i32 = 2;

fn has_known_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| ContainerFormat::known_extensions().contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Expand the requested paths into files. Explicit files are always kept;
/// directories contribute files with a known media extension.
pub fn collect_files(paths: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let walker = WalkDir::new(path).follow_links(true).sort_by_file_name();
            let walker = if recursive { walker } else { walker.max_depth(1) };
            files.extend(
                walker
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file() && has_known_extension(e.path()))
                    .map(|e| e.into_path()),
            );
        } else {
            files.push(path.clone());
        }
    }
    files
}

/// Map batch results to the process exit status
pub fn exit_code(reports: &[DetectionReport], errors: usize) -> i32 {
    if reports.is_empty() && errors > 0 {
        EXIT_ERROR
    } else if reports.iter().any(|r| r.verdict != Verdict::Clean) {
        EXIT_FLAGGED
    } else {
        EXIT_CLEAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("b.WAV"), b"x").unwrap();

        let flat = collect_files(&[dir.path().to_path_buf()], false);
        assert_eq!(flat, vec![dir.path().join("a.png")]);

        let deep = collect_files(&[dir.path().to_path_buf()], true);
        assert_eq!(deep.len(), 2);

        let explicit = collect_files(&[dir.path().join("notes.txt")], false);
        assert_eq!(explicit.len(), 1);
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(&[], 3), EXIT_ERROR);
        assert_eq!(exit_code(&[], 0), EXIT_CLEAN);
    }
}
