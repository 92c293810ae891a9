//! Stage cache: memoization of expensive externally-computed results
//! (typically mask-provider output) by a caller-supplied name.
//!
//! The compositor never consults the cache itself; the calling layer uses
//! it to skip recomputation across repeated requests with the same key.

use std::fs;
use std::path::PathBuf;

use serde_json::Value;
use tracing::debug;

use crate::error::Result;

/// Key-value store for named stage results.
pub trait StageCache {
    fn get(&self, name: &str) -> Result<Option<Value>>;
    fn put(&mut self, name: &str, value: &Value) -> Result<()>;
}

/// Filesystem-backed stage cache storing one JSON file per name.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crashed writer never leaves a half-written entry behind.
pub struct FsStageCache {
    dir: PathBuf,
}

impl FsStageCache {
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        // Keep names filesystem-safe
        let safe: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl StageCache for FsStageCache {
    fn get(&self, name: &str) -> Result<Option<Value>> {
        let path = self.entry_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(&path)?;
        match serde_json::from_slice(&data) {
            Ok(value) => {
                debug!("Stage cache hit: {}", name);
                Ok(Some(value))
            }
            // A corrupt entry behaves like a miss
            Err(_) => Ok(None),
        }
    }

    fn put(&mut self, name: &str, value: &Value) -> Result<()> {
        let path = self.entry_path(name);
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec(value)
            .map_err(|e| crate::error::CompositorError::generic(format!("stage cache encode failed: {}", e)))?;
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        debug!("Stage cache stored: {}", name);
        Ok(())
    }
}
