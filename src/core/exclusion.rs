/*!
 * Exclusion store: operator-declared alarm keys that must never trigger
 *
 * Exclusions are read from a newline-delimited list of keys, one per line,
 * in exactly the form the paging system shows as the incident key. Blank
 * lines and `#` comments are ignored. A missing source means "no
 * exclusions", never a reason to block triggering.
 */

use std::collections::HashSet;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use super::key::AlarmKey;

/// Errors that can occur while loading exclusions
#[derive(Error, Debug)]
pub enum ExclusionError {
    #[error("Failed to read exclusion file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to fetch exclusions from '{url}': {reason}")]
    Remote { url: String, reason: String },

    #[error("Failed to write exclusion cache '{path}': {source}")]
    CacheWrite {
        path: String,
        source: std::io::Error,
    },
}

/// Anything that can produce the raw list of excluded keys
pub trait ExclusionSource {
    /// Short description used in log lines
    fn describe(&self) -> String;

    fn fetch(&self) -> Result<Vec<String>, ExclusionError>;
}

/// Set of excluded keys; membership is the only operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    keys: HashSet<String>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &AlarmKey) -> bool {
        self.keys.contains(key.as_str())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Holds the last successfully loaded exclusion set
#[derive(Debug, Default)]
pub struct ExclusionStore {
    current: ExclusionSet,
    loaded_once: bool,
}

impl ExclusionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload from `source`.
    ///
    /// On failure the previously loaded set (empty on first load) stays in
    /// effect and the degradation is logged; the error never reaches callers.
    pub fn load(&mut self, source: &dyn ExclusionSource) -> &ExclusionSet {
        match source.fetch() {
            Ok(lines) => {
                self.current = lines.into_iter().collect();
                self.loaded_once = true;
                info!(
                    source = %source.describe(),
                    count = self.current.len(),
                    "Loaded alarm exclusions"
                );
            }
            Err(e) => {
                if self.loaded_once {
                    warn!(
                        "Exclusion source unavailable, keeping last {} exclusions: {}",
                        self.current.len(),
                        e
                    );
                } else {
                    warn!("Exclusion source unavailable, running without exclusions: {}", e);
                }
            }
        }
        &self.current
    }

    pub fn contains(&self, key: &AlarmKey) -> bool {
        self.current.contains(key)
    }

    pub fn set(&self) -> &ExclusionSet {
        &self.current
    }

    pub fn into_set(self) -> ExclusionSet {
        self.current
    }
}

/// Exclusions kept in a local text file
#[derive(Debug, Clone)]
pub struct FileExclusionSource {
    path: PathBuf,
}

impl FileExclusionSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ExclusionSource for FileExclusionSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch(&self) -> Result<Vec<String>, ExclusionError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let read_err = |e| ExclusionError::FileRead {
            path: self.path.to_string_lossy().to_string(),
            source: e,
        };

        let file = fs::File::open(&self.path).map_err(read_err)?;
        let mut keys = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(read_err)?;
            if let Some(key) = parse_line(&line) {
                keys.push(key.to_string());
            }
        }
        Ok(keys)
    }
}

/// Remote exclusion list mirrored into a local file.
///
/// A successful fetch replaces the local file atomically; a failed fetch
/// falls back to whatever the local file holds from an earlier run.
#[derive(Debug, Clone)]
pub struct MirroredExclusionSource {
    url: String,
    timeout: Duration,
    cache: FileExclusionSource,
}

impl MirroredExclusionSource {
    pub fn new(url: impl Into<String>, cache: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            cache: FileExclusionSource::new(cache),
        }
    }

    fn fetch_remote(&self) -> Result<Vec<String>, ExclusionError> {
        let remote_err = |reason: String| ExclusionError::Remote {
            url: self.url.clone(),
            reason,
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| remote_err(e.to_string()))?;
        let body = client
            .get(&self.url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.text())
            .map_err(|e| remote_err(e.to_string()))?;

        Ok(body.lines().filter_map(parse_line).map(str::to_string).collect())
    }
}

impl ExclusionSource for MirroredExclusionSource {
    fn describe(&self) -> String {
        format!("{} (cached at {})", self.url, self.cache.describe())
    }

    fn fetch(&self) -> Result<Vec<String>, ExclusionError> {
        match self.fetch_remote() {
            Ok(keys) => {
                if let Err(e) = write_exclusion_file(self.cache.path(), &keys) {
                    warn!("{}", e);
                }
                Ok(keys)
            }
            Err(e) => {
                warn!("{}; using cached exclusion file", e);
                self.cache.fetch()
            }
        }
    }
}

/// Replace an exclusion file atomically (temp file in the same directory, then rename)
pub fn write_exclusion_file(path: &Path, keys: &[String]) -> Result<(), ExclusionError> {
    let write_err = |e| ExclusionError::CacheWrite {
        path: path.to_string_lossy().to_string(),
        source: e,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
    for key in keys {
        writeln!(tmp, "{}", key).map_err(write_err)?;
    }
    tmp.flush().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

fn parse_line(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        None
    } else {
        Some(line)
    }
}
