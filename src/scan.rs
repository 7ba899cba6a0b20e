//! Input discovery for batch commands.
//!
//! Command-line inputs may be files or directories. Files are taken as
//! given (decoding sniffs the format, so the extension is not checked).
//! Directories are walked recursively and contribute every file with a
//! [supported extension](crate::fundus::supported_input_extensions):
//!
//! ```text
//! clinic/                      collect_inputs(["clinic"])
//! ├── 2024-03/                 →  clinic/2024-03/left.jpg
//! │   ├── left.jpg                clinic/2024-03/right.JPG
//! │   ├── right.JPG               clinic/notes/odd.tif
//! │   └── notes.txt
//! ├── .thumbs/                 hidden: skipped
//! │   └── left.jpg
//! └── notes/
//!     └── odd.tif
//! ```
//!
//! Directory contents are sorted by file name so runs are reproducible.
//! A path reached twice (listed directly and through its directory) is
//! kept once, at its first position.

use crate::fundus::is_supported_image;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Input not found: {0}")]
    NotFound(PathBuf),
    #[error("Cannot read directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Expand files and directories into the list of images to screen.
///
/// `skip_dir`, when given, is left out of the walk. The CLI passes its
/// output directory so exported mask PNGs are never screened as inputs.
pub fn collect_inputs(
    inputs: &[PathBuf],
    skip_dir: Option<&Path>,
) -> Result<Vec<PathBuf>, ScanError> {
    let skip = skip_dir.and_then(|d| d.canonicalize().ok());
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for input in inputs {
        if input.is_file() {
            if seen.insert(input.clone()) {
                found.push(input.clone());
            }
            continue;
        }
        if !input.is_dir() {
            return Err(ScanError::NotFound(input.clone()));
        }

        let walker = WalkDir::new(input)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !(is_hidden(e) || is_skipped(e, skip.as_deref())));
        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_file() && is_supported_image(entry.path()) {
                let path = entry.into_path();
                if seen.insert(path.clone()) {
                    found.push(path);
                }
            }
        }
    }

    Ok(found)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn is_skipped(entry: &DirEntry, skip: Option<&Path>) -> bool {
    let Some(skip) = skip else {
        return false;
    };
    entry.file_type().is_dir() && entry.path().canonicalize().is_ok_and(|p| p == skip)
}
