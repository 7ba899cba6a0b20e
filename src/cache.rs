//! Screening result cache for repeated batch runs.
//!
//! Scoring a large folder of photographs twice with unchanged weights gives
//! the same answers twice. This module lets the batch runner skip the
//! pipeline for images it has already screened.
//!
//! # Cache keys
//!
//! The cache is **content-addressed**. Entries are keyed by
//! `"{image_sha256}:{scorer_fingerprint}"`, not by file path:
//!
//! - **`image_sha256`**: [`FundusImage::digest`](crate::fundus::FundusImage::digest),
//!   a hash of the decoded pixels. Renaming or re-encoding a file losslessly
//!   keeps its entry.
//! - **`scorer_fingerprint`**: [`ScorerSet::fingerprint`](crate::scoring::ScorerSet::fingerprint).
//!   New weights produce a new fingerprint, so old results are never reused
//!   against them.
//!
//! Scorer sets without a fingerprint (stubs, custom backends) cannot be
//! cached at all; the batch runner checks this before using the cache.
//! Failed images are never stored.
//!
//! ## Storage
//!
//! The manifest is a JSON file at `<output_dir>/.screening-cache.json`, next
//! to the report it helps produce.
//!
//! ## Bypassing the cache
//!
//! Pass `--no-cache` to `diagnose` to screen every image again. This starts
//! from an empty manifest; the file is overwritten at the end of the run.

use crate::types::ScreeningSummary;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the cache manifest file within the output directory.
const MANIFEST_FILENAME: &str = ".screening-cache.json";

/// Version of the cache manifest format. Bump this to invalidate all
/// existing caches when the format or key computation changes.
const MANIFEST_VERSION: u32 = 1;

/// On-disk map from content key to the summary produced for it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheManifest {
    pub version: u32,
    pub entries: HashMap<String, ScreeningSummary>,
}

impl CacheManifest {
    /// Create an empty manifest (used for `--no-cache` or a first run).
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: HashMap::new(),
        }
    }

    /// Load from the output directory. Returns an empty manifest if the
    /// file doesn't exist or can't be parsed (version mismatch, corruption).
    pub fn load(output_dir: &Path) -> Self {
        let path = manifest_path(output_dir);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let manifest: Self = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable cache");
                return Self::empty();
            }
        };
        if manifest.version != MANIFEST_VERSION {
            warn!(
                found = manifest.version,
                expected = MANIFEST_VERSION,
                "ignoring cache from another version"
            );
            return Self::empty();
        }
        manifest
    }

    /// Save to the output directory, creating it if needed.
    pub fn save(&self, output_dir: &Path) -> io::Result<()> {
        std::fs::create_dir_all(output_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(manifest_path(output_dir), json)
    }

    /// Look up the stored summary for an image under the given scorers.
    pub fn find(&self, image_sha256: &str, fingerprint: &str) -> Option<&ScreeningSummary> {
        self.entries.get(&content_key(image_sha256, fingerprint))
    }

    /// Record the summary for an image. Failures are not cached.
    pub fn insert(&mut self, fingerprint: &str, summary: ScreeningSummary) {
        let Some(image) = summary.image() else {
            return;
        };
        let key = content_key(&image.sha256, fingerprint);
        self.entries.insert(key, summary);
    }

    /// Drop entries recorded under any other scorer fingerprint.
    ///
    /// Called before saving, so results for replaced weights do not
    /// accumulate in the manifest.
    pub fn retain_fingerprint(&mut self, fingerprint: &str) {
        let suffix = format!(":{}", fingerprint);
        let before = self.entries.len();
        self.entries.retain(|key, _| key.ends_with(&suffix));
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!(dropped, "pruned cache entries from other scorers");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn content_key(image_sha256: &str, fingerprint: &str) -> String {
    format!("{}:{}", image_sha256, fingerprint)
}

/// Summary of cache performance for a batch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} screened ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} screened", self.misses)
        }
    }
}

/// Resolve the cache manifest path for an output directory.
pub fn manifest_path(output_dir: &Path) -> PathBuf {
    output_dir.join(MANIFEST_FILENAME)
}
