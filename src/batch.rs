//! Screening many images on the worker pool.
//!
//! Takes the inputs found by [`scan`](crate::scan), runs each through the
//! [`Pipeline`] on the global rayon pool, and collects one
//! [`ScreeningSummary`] per input, in input order.
//!
//! ## Failure isolation
//!
//! Every image is screened independently. A file that fails to decode or a
//! scorer error for one image is recorded as [`ScreeningSummary::Failed`]
//! and the batch carries on. Only I/O on the report itself is fatal.
//!
//! ## Output Structure
//!
//! ```text
//! screening/
//! ├── report.json              # ScreeningReport, one entry per input
//! ├── .screening-cache.json    # Result cache (see crate::cache)
//! ├── left-microaneurysms.png  # Mask PNGs from `segment`
//! └── ...
//! ```
//!
//! ## Progress
//!
//! Callers can pass an [`mpsc::Sender`] to receive a [`BatchEvent`] as each
//! image finishes. Events arrive in completion order, which under
//! parallelism is not input order; the `index` field ties them back.

use crate::cache::{CacheManifest, CacheStats};
use crate::error::ScreenError;
use crate::fundus::FundusImage;
use crate::lesions::{LesionKind, segment};
use crate::pipeline::Pipeline;
use crate::scan::{self, ScanError};
use crate::severity::DrStage;
use crate::types::ScreeningSummary;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{info, warn};

/// File name of the JSON report inside the output directory.
pub const REPORT_FILENAME: &str = "report.json";

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Scan(#[from] ScanError),
    #[error("{0}")]
    Screen(#[from] ScreenError),
}

/// Progress notifications emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    /// Sent once before any image is screened.
    Started { image_count: usize },
    /// An image finished screening (or failed).
    ImageScreened {
        /// Position in the input list, 0-based.
        index: usize,
        path: PathBuf,
        summary: ScreeningSummary,
        /// Result came from the cache instead of the scorers.
        cached: bool,
    },
    /// An image was segmented and its masks written.
    ImageSegmented {
        index: usize,
        path: PathBuf,
        coverage: Vec<(LesionKind, f32)>,
    },
    /// Segmentation failed for an image.
    SegmentationFailed {
        index: usize,
        path: PathBuf,
        error: String,
    },
}

/// Everything `diagnose` found, as written to `report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningReport {
    /// [`ScorerSet::fingerprint`](crate::scoring::ScorerSet::fingerprint) of the scorers used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scorers: Option<String>,
    pub results: Vec<ScreeningSummary>,
}

impl ScreeningReport {
    pub fn diagnosed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, ScreeningSummary::Diagnosed(_)))
            .count()
    }

    pub fn rejected(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, ScreeningSummary::Rejected { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_failure()).count()
    }

    /// Number of diagnosed images per stage, indexed by stage.
    pub fn stage_counts(&self) -> [usize; 5] {
        let mut counts = [0; 5];
        for result in &self.results {
            if let ScreeningSummary::Diagnosed(d) = result {
                counts[d.stage.index() as usize] += 1;
            }
        }
        counts
    }

    /// Diagnosed images at [urgent](DrStage::is_urgent) stages.
    pub fn urgent(&self) -> usize {
        DrStage::ALL
            .iter()
            .filter(|s| s.is_urgent())
            .map(|s| self.stage_counts()[s.index() as usize])
            .sum()
    }

    /// Write as pretty JSON to `<output_dir>/report.json`.
    pub fn write(&self, output_dir: &Path) -> Result<PathBuf, BatchError> {
        std::fs::create_dir_all(output_dir)?;
        let path = output_dir.join(REPORT_FILENAME);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

/// Result of [`screen_all`].
#[derive(Debug)]
pub struct BatchResult {
    pub report: ScreeningReport,
    pub cache_stats: CacheStats,
}

/// Screen every input. Results come back in input order.
///
/// `cache` is consulted and updated only when the scorers have a
/// fingerprint; otherwise every image goes through the pipeline.
pub fn screen_all(
    pipeline: Pipeline<'_>,
    inputs: &[PathBuf],
    cache: Option<&mut CacheManifest>,
    progress: Option<Sender<BatchEvent>>,
) -> BatchResult {
    let fingerprint = pipeline.scorers().fingerprint();
    if cache.is_some() && fingerprint.is_none() {
        info!("scorers have no fingerprint, result cache disabled");
    }

    if let Some(tx) = &progress {
        tx.send(BatchEvent::Started {
            image_count: inputs.len(),
        })
        .ok();
    }

    let screened: Vec<(ScreeningSummary, bool)> = {
        let lookup = match (&cache, &fingerprint) {
            (Some(c), Some(f)) => Some((&**c, f.as_str())),
            _ => None,
        };
        inputs
            .par_iter()
            .enumerate()
            .map_with(progress, |tx, (index, path)| {
                let (summary, cached) = screen_one(pipeline, path, lookup);
                if let Some(tx) = tx {
                    tx.send(BatchEvent::ImageScreened {
                        index,
                        path: path.clone(),
                        summary: summary.clone(),
                        cached,
                    })
                    .ok();
                }
                (summary, cached)
            })
            .collect()
    };

    let mut cache_stats = CacheStats::default();
    let mut cache = cache.filter(|_| fingerprint.is_some());
    for (summary, cached) in &screened {
        if *cached {
            cache_stats.hit();
            continue;
        }
        cache_stats.miss();
        if let (Some(cache), Some(fp)) = (cache.as_deref_mut(), &fingerprint) {
            cache.insert(fp, summary.clone());
        }
    }

    let report = ScreeningReport {
        scorers: fingerprint,
        results: screened.into_iter().map(|(s, _)| s).collect(),
    };
    info!(
        diagnosed = report.diagnosed(),
        rejected = report.rejected(),
        failed = report.failed(),
        "batch finished"
    );
    BatchResult {
        report,
        cache_stats,
    }
}

fn screen_one(
    pipeline: Pipeline<'_>,
    path: &Path,
    cache: Option<(&CacheManifest, &str)>,
) -> (ScreeningSummary, bool) {
    let image = match FundusImage::open(path) {
        Ok(image) => image,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot load image");
            return (ScreeningSummary::failed(path, e), false);
        }
    };

    if let Some((cache, fingerprint)) = cache
        && let Some(hit) = cache.find(image.digest(), fingerprint)
    {
        return (hit.clone().with_path(path), true);
    }

    match pipeline.run(image.clone()) {
        Ok(outcome) => (
            ScreeningSummary::from_outcome(&outcome, &image, Some(path)),
            false,
        ),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "screening failed");
            (ScreeningSummary::failed(path, e), false)
        }
    }
}

/// Collect inputs, screen them with the on-disk cache, and write the report.
///
/// This is the whole `diagnose` command minus printing.
pub fn diagnose(
    pipeline: Pipeline<'_>,
    inputs: &[PathBuf],
    output_dir: &Path,
    use_cache: bool,
    progress: Option<Sender<BatchEvent>>,
) -> Result<BatchResult, BatchError> {
    let files = scan::collect_inputs(inputs, Some(output_dir))?;
    let mut cache = if use_cache {
        CacheManifest::load(output_dir)
    } else {
        CacheManifest::empty()
    };

    let result = screen_all(pipeline, &files, Some(&mut cache), progress);

    result.report.write(output_dir)?;
    if let Some(fingerprint) = pipeline.scorers().fingerprint() {
        cache.retain_fingerprint(&fingerprint);
        cache.save(output_dir)?;
    }
    Ok(result)
}

/// Per-image outcome of [`segment_all`].
#[derive(Debug)]
pub struct SegmentationOutput {
    pub path: PathBuf,
    pub result: Result<SegmentedImage, ScreenError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedImage {
    pub coverage: Vec<(LesionKind, f32)>,
    pub masks: Vec<PathBuf>,
}

/// Segment every input and write its masks as `<output_dir>/<stem>-<kind>.png`.
pub fn segment_all(
    inputs: &[PathBuf],
    output_dir: &Path,
    progress: Option<Sender<BatchEvent>>,
) -> Result<Vec<SegmentationOutput>, BatchError> {
    let files = scan::collect_inputs(inputs, Some(output_dir))?;
    std::fs::create_dir_all(output_dir)?;
    if let Some(tx) = &progress {
        tx.send(BatchEvent::Started {
            image_count: files.len(),
        })
        .ok();
    }

    let stems = mask_stems(&files);
    Ok(files
        .par_iter()
        .zip(stems.par_iter())
        .enumerate()
        .map_with(progress, |tx, (index, (path, stem))| {
            let result = segment_file(path, output_dir, stem);
            if let Some(tx) = tx {
                let event = match &result {
                    Ok(done) => BatchEvent::ImageSegmented {
                        index,
                        path: path.clone(),
                        coverage: done.coverage.clone(),
                    },
                    Err(e) => BatchEvent::SegmentationFailed {
                        index,
                        path: path.clone(),
                        error: e.to_string(),
                    },
                };
                tx.send(event).ok();
            }
            SegmentationOutput {
                path: path.clone(),
                result,
            }
        })
        .collect())
}

fn segment_file(path: &Path, output_dir: &Path, stem: &str) -> Result<SegmentedImage, ScreenError> {
    let image = FundusImage::open(path)?;
    let masks = segment(&image);
    let written = masks.save_pngs(output_dir, stem)?;
    Ok(SegmentedImage {
        coverage: masks.iter().map(|(kind, _)| (kind, masks.coverage(kind))).collect(),
        masks: written,
    })
}

/// File stems for mask names, suffixed `-2`, `-3`... when two inputs share one.
///
/// A suffixed candidate is skipped if another input already owns that stem.
fn mask_stems(files: &[PathBuf]) -> Vec<String> {
    let mut issued = HashSet::new();
    files
        .iter()
        .map(|path| {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());
            let mut candidate = stem.clone();
            let mut n = 1;
            while issued.contains(&candidate) {
                n += 1;
                candidate = format!("{stem}-{n}");
            }
            issued.insert(candidate.clone());
            candidate
        })
        .collect()
}
