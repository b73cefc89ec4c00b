/*!
 * Device inventory: `hostname[,manufacturer[,model]]` per line
 */

use std::path::Path;

use tracing::debug;

use crate::error::{MonitorError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    pub hostname: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
}

impl InventoryEntry {
    pub fn new(hostname: &str, manufacturer: Option<&str>, model: Option<&str>) -> Self {
        Self {
            hostname: hostname.to_string(),
            manufacturer: manufacturer.map(str::to_string),
            model: model.map(str::to_string),
        }
    }

    /// Parse one line. Blank lines and `#` comments yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let mut fields = line.split(',').map(str::trim);
        let hostname = fields.next().filter(|h| !h.is_empty())?;
        let non_empty = |f: Option<&str>| f.filter(|v| !v.is_empty()).map(str::to_string);

        Some(Self {
            hostname: hostname.to_string(),
            manufacturer: non_empty(fields.next()),
            model: non_empty(fields.next()),
        })
    }
}

pub fn parse_inventory(contents: &str) -> Vec<InventoryEntry> {
    contents.lines().filter_map(InventoryEntry::parse_line).collect()
}

pub fn load_inventory(path: &Path) -> Result<Vec<InventoryEntry>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| MonitorError::Inventory(format!("{}: {}", path.display(), e)))?;
    let entries = parse_inventory(&contents);
    debug!("Loaded {} inventory entries from {}", entries.len(), path.display());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_inventory() {
        let contents = "\
# core switches
sw1,Cisco,C9300
srv1, HP ,
  bare-host
,Cisco

";
        let entries = parse_inventory(contents);
        assert_eq!(
            entries,
            vec![
                InventoryEntry::new("sw1", Some("Cisco"), Some("C9300")),
                InventoryEntry::new("srv1", Some("HP"), None),
                InventoryEntry::new("bare-host", None, None),
            ]
        );
    }

    #[test]
    fn test_missing_inventory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = load_inventory(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, MonitorError::Inventory(_)));
    }
}
