//! Atomic JSON artifact store.
//!
//! All data flows through cache files in one directory:
//! collectors → cache (JSON) → engines / query layer / external readers.
//!
//! Writes go to a temp file in the same directory followed by an atomic
//! rename, so readers always observe either the previous complete artifact
//! or the new complete artifact, never a partial one.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use signal_core::{SignalError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Manage JSON cache files in a single directory.
///
/// ```no_run
/// use cache_store::CacheStore;
/// let cache = CacheStore::new("data").unwrap();
/// let data = cache.read("congress.json").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct CacheStore {
    cache_dir: PathBuf,
}

impl CacheStore {
    /// Open (creating if needed) a cache directory.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;
        Ok(CacheStore { cache_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Resolve a filename inside the cache directory, rejecting anything
    /// whose basename differs from the name itself (subdirectories, parent
    /// references).
    fn filepath(&self, filename: &str) -> Result<PathBuf> {
        let base = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if base != filename || filename.is_empty() {
            return Err(SignalError::PathTraversal(filename.to_string()));
        }
        Ok(self.cache_dir.join(filename))
    }

    /// Read a JSON cache file as an object.
    ///
    /// Returns an empty map when the file is missing, is not valid JSON, or
    /// its root is not an object; content problems never fail. The only
    /// error is a path-traversal attempt in the name itself.
    pub fn read(&self, filename: &str) -> Result<Map<String, Value>> {
        let filepath = self.filepath(filename)?;
        let text = match fs::read_to_string(&filepath) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("cache file not found: {filename}");
                return Ok(Map::new());
            }
            Err(e) => {
                tracing::error!("error reading {filename}: {e}");
                return Ok(Map::new());
            }
        };
        Ok(match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                tracing::warn!(
                    "cache file {filename} is not a JSON object, got {}",
                    json_type_name(&other)
                );
                Map::new()
            }
            Err(e) => {
                tracing::error!("invalid JSON in {filename}: {e}");
                Map::new()
            }
        })
    }

    /// Read and deserialize an artifact into a typed value; falls back to
    /// the type's default on a missing or unreadable file.
    pub fn read_as<T: DeserializeOwned + Default>(&self, filename: &str) -> T {
        let map = match self.read(filename) {
            Ok(map) => map,
            Err(e) => {
                tracing::error!("cache read rejected: {e}");
                return T::default();
            }
        };
        if map.is_empty() {
            return T::default();
        }
        match serde_json::from_value(Value::Object(map)) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("cache file {filename} does not match expected shape: {e}");
                T::default()
            }
        }
    }

    /// Write a value to a JSON cache file atomically.
    ///
    /// Pretty-printed UTF-8 with non-ASCII preserved. On any OS error the
    /// temp file is cleaned up and the previous artifact stays intact.
    pub fn write<T: Serialize>(&self, filename: &str, data: &T) -> Result<()> {
        let filepath = self.filepath(filename)?;
        let json = serde_json::to_string_pretty(data)
            .map_err(|e| SignalError::StoreWrite(format!("{filename}: {e}")))?;

        let tmp_path = self
            .cache_dir
            .join(format!(".{filename}.{}.tmp", std::process::id()));

        if let Err(e) = fs::write(&tmp_path, json.as_bytes()) {
            let _ = fs::remove_file(&tmp_path);
            return Err(SignalError::StoreWrite(format!("{filename}: {e}")));
        }
        if let Err(e) = fs::rename(&tmp_path, &filepath) {
            let _ = fs::remove_file(&tmp_path);
            return Err(SignalError::StoreWrite(format!("{filename}: {e}")));
        }
        tracing::debug!("wrote cache file: {filename} ({} bytes)", json.len());
        Ok(())
    }

    /// Append one JSON line to a `.jsonl` log file in the cache directory.
    /// Append-only files trade atomicity for ordering; they are never read
    /// back by the core.
    pub fn append_jsonl<T: Serialize>(&self, filename: &str, row: &T) -> Result<()> {
        use std::io::Write;
        let filepath = self.filepath(filename)?;
        let line = serde_json::to_string(row)
            .map_err(|e| SignalError::StoreWrite(format!("{filename}: {e}")))?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&filepath)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Read every row of a `.jsonl` log file, skipping unparseable lines.
    pub fn read_jsonl<T: DeserializeOwned>(&self, filename: &str) -> Vec<T> {
        let filepath = match self.filepath(filename) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("jsonl read rejected: {e}");
                return Vec::new();
            }
        };
        let text = match fs::read_to_string(&filepath) {
            Ok(t) => t,
            Err(_) => return Vec::new(),
        };
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| match serde_json::from_str(l) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("skipping bad line in {filename}: {e}");
                    None
                }
            })
            .collect()
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.filepath(filename).map(|p| p.exists()).unwrap_or(false)
    }

    /// Modification time as a Unix timestamp. `None` when missing.
    pub fn mtime(&self, filename: &str) -> Option<f64> {
        let filepath = self.filepath(filename).ok()?;
        let meta = fs::metadata(&filepath).ok()?;
        let mtime = meta.modified().ok()?;
        mtime
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs_f64())
    }

    /// Age of the file in seconds. `None` when missing.
    pub fn age_seconds(&self, filename: &str) -> Option<f64> {
        let mtime = self.mtime(filename)?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()?
            .as_secs_f64();
        Some(now - mtime)
    }

    /// True when the file is older than `max_age_seconds` or missing.
    pub fn is_stale(&self, filename: &str, max_age_seconds: f64) -> bool {
        match self.age_seconds(filename) {
            Some(age) => age > max_age_seconds,
            None => true,
        }
    }

    /// Sorted list of `.json` filenames in the cache directory.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.cache_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().is_file())
                    .filter_map(|e| e.file_name().into_string().ok())
                    .filter(|n| n.ends_with(".json"))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Best-effort delete. Returns true when a file was removed.
    pub fn delete(&self, filename: &str) -> bool {
        match self.filepath(filename) {
            Ok(p) => fs::remove_file(p).is_ok(),
            Err(_) => false,
        }
    }

    /// File size in bytes. `None` when missing.
    pub fn size_bytes(&self, filename: &str) -> Option<u64> {
        let filepath = self.filepath(filename).ok()?;
        fs::metadata(&filepath).ok().map(|m| m.len())
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
