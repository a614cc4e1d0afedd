//! On-disk cache for fitted models.
//!
//! Each artifact is a JSON document wrapping the serialized model with its
//! kind, fit time and (optionally) a fingerprint. Writes go to a temporary
//! file in the cache directory, are synced, and then renamed over the
//! target, so a concurrent reader sees either the old artifact or the new
//! one and never a partial file.

use crate::config::{CacheConfig, CacheKeyPolicy};
use crate::error::{AdvisorError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A persisted model and its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact<T> {
    pub kind: String,
    pub fitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fingerprint: Option<String>,
    pub model: T,
}

/// Incremental SHA-256 over the inputs that identify a fit.
#[derive(Clone, Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    pub fn new(kind: &str) -> Self {
        let mut fingerprint = Self::default();
        fingerprint.hasher.update(kind.as_bytes());
        fingerprint
    }

    pub fn f64(mut self, value: f64) -> Self {
        self.hasher.update(value.to_bits().to_le_bytes());
        self
    }

    pub fn usize(mut self, value: usize) -> Self {
        self.hasher.update((value as u64).to_le_bytes());
        self
    }

    pub fn str(mut self, value: &str) -> Self {
        self.hasher.update((value.len() as u64).to_le_bytes());
        self.hasher.update(value.as_bytes());
        self
    }

    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Shared model cache rooted at one directory.
#[derive(Debug)]
pub struct ModelCache {
    dir: PathBuf,
    policy: CacheKeyPolicy,
    write_lock: Mutex<()>,
}

static_assertions::assert_impl_all!(ModelCache: Send, Sync);

impl ModelCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            policy: config.key_policy,
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn policy(&self) -> CacheKeyPolicy {
        self.policy
    }

    /// Path of the artifact `name` for a fit identified by `fingerprint`.
    ///
    /// Under [`CacheKeyPolicy::Existence`] the fingerprint is ignored and
    /// every fit shares one file.
    pub fn artifact_path(&self, name: &str, fingerprint: &str) -> PathBuf {
        match self.policy {
            CacheKeyPolicy::Existence => self.dir.join(name),
            CacheKeyPolicy::Fingerprint => {
                let short = &fingerprint[..fingerprint.len().min(16)];
                let keyed = match name.rsplit_once('.') {
                    Some((stem, ext)) => format!("{}-{}.{}", stem, short, ext),
                    None => format!("{}-{}", name, short),
                };
                self.dir.join(keyed)
            }
        }
    }

    /// Load an artifact if one exists.
    ///
    /// Returns `Ok(None)` when the file is absent and an error when it
    /// exists but cannot be read, decoded, or holds a different kind.
    pub fn load<T: DeserializeOwned>(
        &self,
        name: &str,
        kind: &str,
        fingerprint: &str,
    ) -> Result<Option<ModelArtifact<T>>> {
        let path = self.artifact_path(name, fingerprint);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        let artifact: ModelArtifact<T> = serde_json::from_str(&content).map_err(|e| {
            AdvisorError::Cache(format!("cannot decode {}: {}", path.display(), e))
        })?;
        if artifact.kind != kind {
            return Err(AdvisorError::Cache(format!(
                "{} holds a '{}' model, expected '{}'",
                path.display(),
                artifact.kind,
                kind
            )));
        }

        debug!(path = %path.display(), fitted_at = %artifact.fitted_at, "Loaded cached model");
        Ok(Some(artifact))
    }

    /// Persist a fitted model, replacing any previous artifact atomically.
    pub fn store<T: Serialize>(
        &self,
        name: &str,
        kind: &str,
        fingerprint: &str,
        model: &T,
    ) -> Result<PathBuf> {
        let path = self.artifact_path(name, fingerprint);
        let artifact = ModelArtifact {
            kind: kind.to_string(),
            fitted_at: Utc::now(),
            fingerprint: match self.policy {
                CacheKeyPolicy::Existence => None,
                CacheKeyPolicy::Fingerprint => Some(fingerprint.to_string()),
            },
            model,
        };
        let bytes = serde_json::to_vec_pretty(&artifact)?;

        let _guard = self.write_lock.lock();
        write_atomic(&path, &bytes)
            .map_err(|e| AdvisorError::Cache(format!("cannot write {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), bytes = bytes.len(), "Stored model artifact");
        Ok(path)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let tmp = parent.join(format!(
        ".{}.tmp.{}.{}",
        path.file_name().and_then(|s| s.to_str()).unwrap_or("model"),
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let result = (|| -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}
