/*!
 * File-backed incident ledger: the `current` / `previous` rotation pair
 *
 * During a run every triggered key, and every key that was open and is
 * not resolved, is appended to `{prefix}_current`. At
 * the start of the next run `current` is renamed to `previous` and a fresh
 * empty `current` is created, so that run's resolve decisions are made
 * against what the last run triggered. These two files are the only
 * durable state the engine owns.
 *
 * A run killed mid-way leaves a partial `current`; the next rotation
 * simply promotes whatever was written.
 */

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use super::key::AlarmKey;
use super::registry::IncidentStore;
use crate::error::Result;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to create ledger directory '{path}': {source}")]
    CreateDir { path: String, source: io::Error },

    #[error("Failed to rotate '{from}' to '{to}': {source}")]
    Rotate {
        from: String,
        to: String,
        source: io::Error,
    },

    #[error("Failed to read ledger file '{path}': {source}")]
    Read { path: String, source: io::Error },

    #[error("Failed to append to ledger file '{path}': {source}")]
    Append { path: String, source: io::Error },
}

/// The pair of rotation files living in one directory
#[derive(Debug, Clone)]
pub struct IncidentLedger {
    current: PathBuf,
    previous: PathBuf,
}

impl IncidentLedger {
    pub fn new(dir: impl AsRef<Path>, prefix: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            current: dir.join(format!("{}_current", prefix)),
            previous: dir.join(format!("{}_previous", prefix)),
        }
    }

    pub fn current_path(&self) -> &Path {
        &self.current
    }

    pub fn previous_path(&self) -> &Path {
        &self.previous
    }

    /// Promote `current` to `previous` and start an empty `current`
    pub fn rotate(&self) -> std::result::Result<(), LedgerError> {
        if let Some(dir) = self.current.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(|e| LedgerError::CreateDir {
                    path: dir.to_string_lossy().to_string(),
                    source: e,
                })?;
            }
        }

        // First run: nothing to promote yet
        if !self.current.exists() {
            touch(&self.current).map_err(|e| self.append_err(e))?;
        }

        fs::rename(&self.current, &self.previous).map_err(|e| LedgerError::Rotate {
            from: self.current.to_string_lossy().to_string(),
            to: self.previous.to_string_lossy().to_string(),
            source: e,
        })?;

        File::create(&self.current).map_err(|e| self.append_err(e))?;
        debug!(
            "Rotated incident ledger {} -> {}",
            self.current.display(),
            self.previous.display()
        );
        Ok(())
    }

    /// Keys recorded by the last run. A missing file is created and read as empty.
    pub fn read_previous(&self) -> std::result::Result<BTreeSet<AlarmKey>, LedgerError> {
        if !self.previous.exists() {
            warn!(
                "Previous incident file {} missing, treating as empty",
                self.previous.display()
            );
            touch(&self.previous).map_err(|e| LedgerError::Read {
                path: self.previous.to_string_lossy().to_string(),
                source: e,
            })?;
            return Ok(BTreeSet::new());
        }
        read_keys(&self.previous)
    }

    /// Keys appended during this run
    pub fn read_current(&self) -> std::result::Result<BTreeSet<AlarmKey>, LedgerError> {
        if !self.current.exists() {
            return Ok(BTreeSet::new());
        }
        read_keys(&self.current)
    }

    pub fn append(&self, key: &AlarmKey) -> std::result::Result<(), LedgerError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.current)
            .map_err(|e| self.append_err(e))?;
        writeln!(file, "{}", key).map_err(|e| self.append_err(e))
    }

    fn append_err(&self, source: io::Error) -> LedgerError {
        LedgerError::Append {
            path: self.current.to_string_lossy().to_string(),
            source,
        }
    }
}

impl IncidentStore for IncidentLedger {
    fn describe(&self) -> String {
        format!("previous-run file {}", self.previous.display())
    }

    fn rotate(&mut self) -> Result<()> {
        IncidentLedger::rotate(self)?;
        Ok(())
    }

    fn load_open(&self) -> Result<BTreeSet<AlarmKey>> {
        Ok(self.read_previous()?)
    }

    fn record_triggered(&mut self, key: &AlarmKey) -> Result<()> {
        self.append(key)?;
        Ok(())
    }
}

/// Read-only view for dry runs: no rotation, nothing recorded.
///
/// Loads `current`, which is what a real run would promote to `previous`.
#[derive(Debug, Clone)]
pub struct LedgerPreview {
    ledger: IncidentLedger,
}

impl LedgerPreview {
    pub fn new(ledger: IncidentLedger) -> Self {
        Self { ledger }
    }
}

impl IncidentStore for LedgerPreview {
    fn describe(&self) -> String {
        format!("last-run file {} (read only)", self.ledger.current.display())
    }

    fn load_open(&self) -> Result<BTreeSet<AlarmKey>> {
        Ok(self.ledger.read_current()?)
    }
}

fn read_keys(path: &Path) -> std::result::Result<BTreeSet<AlarmKey>, LedgerError> {
    let read_err = |e| LedgerError::Read {
        path: path.to_string_lossy().to_string(),
        source: e,
    };

    let file = File::open(path).map_err(read_err)?;
    let mut keys = BTreeSet::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(read_err)?;
        let line = line.trim();
        if !line.is_empty() {
            keys.insert(AlarmKey::from(line));
        }
    }
    Ok(keys)
}

fn touch(path: &Path) -> io::Result<()> {
    OpenOptions::new().create(true).append(true).open(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_rotation_creates_both_files() {
        let dir = TempDir::new().unwrap();
        let ledger = IncidentLedger::new(dir.path(), "cisco_snmp_alarms");

        ledger.rotate().unwrap();

        assert!(ledger.current_path().exists());
        assert!(ledger.previous_path().exists());
        assert!(ledger.read_previous().unwrap().is_empty());
        assert!(ledger.read_current().unwrap().is_empty());
    }

    #[test]
    fn test_rotation_promotes_current() {
        let dir = TempDir::new().unwrap();
        let ledger = IncidentLedger::new(dir.path(), "alarms");
        ledger.rotate().unwrap();

        ledger.append(&AlarmKey::from("snmp/fan/sw1/3")).unwrap();
        ledger.append(&AlarmKey::from("snmp/psu/sw1/1")).unwrap();
        ledger.rotate().unwrap();

        let previous = ledger.read_previous().unwrap();
        assert_eq!(previous.len(), 2);
        assert!(previous.contains(&AlarmKey::from("snmp/fan/sw1/3")));
        assert!(ledger.read_current().unwrap().is_empty());
        assert_eq!(fs::read_to_string(ledger.current_path()).unwrap(), "");
    }

    #[test]
    fn test_missing_previous_is_created_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = IncidentLedger::new(dir.path(), "alarms");

        assert!(ledger.read_previous().unwrap().is_empty());
        assert!(ledger.previous_path().exists());
    }

    #[test]
    fn test_rotation_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let ledger = IncidentLedger::new(dir.path().join("state/nested"), "alarms");
        ledger.rotate().unwrap();
        assert!(ledger.current_path().exists());
    }

    #[test]
    fn test_preview_leaves_files_alone() {
        let dir = TempDir::new().unwrap();
        let ledger = IncidentLedger::new(dir.path(), "alarms");
        ledger.append(&AlarmKey::from("snmp/hdd/srv1/2")).unwrap();

        let mut preview = LedgerPreview::new(ledger.clone());
        preview.rotate().unwrap();
        preview.record_triggered(&AlarmKey::from("snmp/fan/sw1/3")).unwrap();

        let open = preview.load_open().unwrap();
        assert_eq!(open.len(), 1);
        assert!(open.contains(&AlarmKey::from("snmp/hdd/srv1/2")));
        assert!(!ledger.previous_path().exists());
        assert_eq!(ledger.read_current().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_appends_collapse_on_read() {
        let dir = TempDir::new().unwrap();
        let ledger = IncidentLedger::new(dir.path(), "alarms");
        ledger.append(&AlarmKey::from("snmp/fan/sw1/3")).unwrap();
        ledger.append(&AlarmKey::from("snmp/fan/sw1/3")).unwrap();
        assert_eq!(ledger.read_current().unwrap().len(), 1);
    }
}
