// JSONL file operations

use eyre::{Context, Result};
use fs2::FileExt;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::{info, warn};

/// Append one entry to a JSONL file under an exclusive lock
pub fn append_jsonl<T: Serialize>(path: &Path, entry: &T) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context("Failed to open JSONL file for appending")?;

    file.lock_exclusive().context("Failed to acquire file lock")?;

    let json = serde_json::to_string(entry)?;
    writeln!(file, "{}", json)?;
    file.sync_all()?; // Ensure data is flushed to disk

    // Lock is released when file is dropped
    Ok(())
}

/// Read all entries from a JSONL file, returning the latest version per ID
///
/// For entries with duplicate IDs, the one with the highest updated-at wins;
/// on equal timestamps the later line wins, since the file is append-only.
pub fn read_jsonl_latest<T>(path: &Path) -> Result<HashMap<String, T>>
where
    T: DeserializeOwned + HasId + HasUpdatedAt,
{
    if !path.exists() {
        // File doesn't exist yet, return empty map
        return Ok(HashMap::new());
    }

    let file = File::open(path).context("Failed to open JSONL file")?;
    let reader = BufReader::new(file);
    let mut entries: HashMap<String, T> = HashMap::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(
                    file = ?path,
                    line = line_num + 1,
                    error = ?e,
                    "Failed to read line, skipping"
                );
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let entry: T = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    file = ?path,
                    line = line_num + 1,
                    error = ?e,
                    "Failed to parse JSON, skipping"
                );
                continue;
            }
        };

        let Some(id) = entry.id() else {
            warn!(file = ?path, line = line_num + 1, "Entry has no id, skipping");
            continue;
        };

        let newer = entries
            .get(&id)
            .is_none_or(|existing| entry.updated_at() >= existing.updated_at());
        if newer {
            entries.insert(id, entry);
        }
    }

    info!(
        file = ?path,
        count = entries.len(),
        "Loaded latest entries from JSONL"
    );

    Ok(entries)
}

/// Types that carry an ID field
pub trait HasId {
    fn id(&self) -> Option<String>;
}

/// Types that carry an updated-at timestamp (milliseconds since epoch)
pub trait HasUpdatedAt {
    fn updated_at(&self) -> i64;
}

impl HasId for Value {
    fn id(&self) -> Option<String> {
        self.get("id").and_then(Value::as_str).map(str::to_string)
    }
}

impl HasUpdatedAt for Value {
    fn updated_at(&self) -> i64 {
        self.get("updatedAt").and_then(Value::as_i64).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_append_jsonl() {
        let temp = TempDir::new().unwrap();
        let jsonl_path = temp.path().join("users.jsonl");

        append_jsonl(&jsonl_path, &json!({"id": "u1", "name": "Ada", "updatedAt": 1000})).unwrap();

        let content = fs::read_to_string(&jsonl_path).unwrap();
        assert!(content.contains("\"id\":\"u1\""));
        assert!(content.contains("\"name\":\"Ada\""));
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_read_jsonl_latest() {
        let temp = TempDir::new().unwrap();
        let jsonl_path = temp.path().join("users.jsonl");

        append_jsonl(&jsonl_path, &json!({"id": "u1", "name": "Version 1", "updatedAt": 1000})).unwrap();
        append_jsonl(&jsonl_path, &json!({"id": "u1", "name": "Version 2", "updatedAt": 2000})).unwrap();
        append_jsonl(&jsonl_path, &json!({"id": "u1", "name": "Stale", "updatedAt": 1500})).unwrap();

        let entries: HashMap<String, Value> = read_jsonl_latest(&jsonl_path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries["u1"]["name"], "Version 2");
    }

    #[test]
    fn test_read_jsonl_equal_timestamps_later_line_wins() {
        let temp = TempDir::new().unwrap();
        let jsonl_path = temp.path().join("users.jsonl");

        append_jsonl(&jsonl_path, &json!({"id": "u1", "name": "First", "updatedAt": 1000})).unwrap();
        append_jsonl(&jsonl_path, &json!({"id": "u1", "deleted": true, "updatedAt": 1000})).unwrap();

        let entries: HashMap<String, Value> = read_jsonl_latest(&jsonl_path).unwrap();
        assert_eq!(entries["u1"]["deleted"], true);
    }

    #[test]
    fn test_read_jsonl_nonexistent_file() {
        let temp = TempDir::new().unwrap();
        let jsonl_path = temp.path().join("nonexistent.jsonl");

        let entries: HashMap<String, Value> = read_jsonl_latest(&jsonl_path).unwrap();
        assert_eq!(entries.len(), 0);
    }

    #[test]
    fn test_read_jsonl_malformed_line() {
        let temp = TempDir::new().unwrap();
        let jsonl_path = temp.path().join("users.jsonl");

        // Valid entry, malformed line, entry without id, another valid entry
        fs::write(
            &jsonl_path,
            r#"{"id":"u1","name":"Valid","updatedAt":1000}
{malformed json}
{"name":"No id","updatedAt":1000}
{"id":"u2","name":"Also Valid","updatedAt":1000}
"#,
        )
        .unwrap();

        let entries: HashMap<String, Value> = read_jsonl_latest(&jsonl_path).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.contains_key("u1"));
        assert!(entries.contains_key("u2"));
    }
}
