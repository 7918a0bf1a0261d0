// Document store: JSONL source of truth, SQLite mirror, live snapshot push

use crate::jsonl;
use crate::record::RawDocument;
use crate::subscription::{Snapshot, Subscription, SubscriptionManager};
use crate::timestamp::now_ms;
use eyre::{Context, Result, eyre};
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CURRENT_VERSION: u32 = 1;

/// Fields the store owns; callers cannot set them
const RESERVED_FIELDS: [&str; 4] = ["id", "createdAt", "updatedAt", "deleted"];

/// Remote document store as seen by the view layer
///
/// `subscribe` pushes the full current document set of a collection on every
/// change. Mutations stamp `createdAt`/`updatedAt` with the store's own clock.
pub trait DocumentStore {
    fn subscribe(&self, collection: &str) -> Result<Subscription>;

    /// Create a document, returning its store-assigned id
    fn create(&mut self, collection: &str, fields: Map<String, Value>) -> Result<String>;

    /// Merge `patch` into an existing document
    fn update(&mut self, collection: &str, id: &str, patch: Map<String, Value>) -> Result<()>;

    fn delete(&mut self, collection: &str, id: &str) -> Result<()>;
}

/// Local document store with a SQLite cache and JSONL source of truth
pub struct Store {
    base_path: PathBuf,
    db: Connection,
    subscriptions: SubscriptionManager,
}

impl Store {
    /// Open or create a store at the given path
    ///
    /// The store will be created in a `.userview` subdirectory of the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref().join(".userview");

        fs::create_dir_all(&base_path).context("Failed to create store directory")?;

        let db_path = base_path.join("userview.db");
        let db = Connection::open(&db_path).context("Failed to open SQLite database")?;

        let mut store = Self {
            base_path,
            db,
            subscriptions: SubscriptionManager::new(),
        };

        store.create_schema()?;
        store.create_gitignore()?;
        store.write_version()?;

        if store.is_stale()? {
            info!("Database is stale, syncing from JSONL files");
            store.sync()?;
        }

        Ok(store)
    }

    /// Get the base path of this store
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn create_schema(&self) -> Result<()> {
        debug!("Creating database schema");

        self.db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);

            -- Sync metadata for staleness detection
            CREATE TABLE IF NOT EXISTS sync_metadata (
                collection TEXT PRIMARY KEY,
                last_sync_time INTEGER NOT NULL,
                file_mtime INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    fn create_gitignore(&self) -> Result<()> {
        let gitignore_path = self.base_path.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(gitignore_path, "userview.db\nuserview.db-shm\nuserview.db-wal\n")?;
        }
        Ok(())
    }

    fn write_version(&self) -> Result<()> {
        let version_path = self.base_path.join(".version");
        if !version_path.exists() {
            fs::write(version_path, CURRENT_VERSION.to_string())?;
        }
        Ok(())
    }

    /// Check if the database needs syncing from JSONL
    ///
    /// True if any JSONL file was modified after its last sync, or was never synced.
    pub fn is_stale(&self) -> Result<bool> {
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();

            let Some(collection) = jsonl_collection(&path) else {
                continue;
            };

            let file_mtime = file_mtime(&path)?;
            let stored_mtime: Option<i64> = self
                .db
                .query_row(
                    "SELECT file_mtime FROM sync_metadata WHERE collection = ?1",
                    [collection],
                    |row| row.get(0),
                )
                .optional()?;

            match stored_mtime {
                None => return Ok(true),                              // Never synced
                Some(mtime) if file_mtime > mtime => return Ok(true), // File modified
                _ => continue,
            }
        }

        Ok(false)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Current document set of a collection, ordered by id
    pub fn documents(&self, collection: &str) -> Result<Vec<RawDocument>> {
        let mut stmt = self
            .db
            .prepare("SELECT data_json FROM documents WHERE collection = ?1 ORDER BY id")?;

        let rows = stmt.query_map([collection], |row| row.get::<_, String>(0))?;

        let mut results = Vec::new();
        for row_result in rows {
            let data_json = row_result?;
            let doc: RawDocument = serde_json::from_str(&data_json).context("Failed to deserialize document")?;
            results.push(doc);
        }
        Ok(results)
    }

    /// Get a document by ID
    pub fn get(&self, collection: &str, id: &str) -> Result<Option<RawDocument>> {
        let data_json: Option<String> = self
            .db
            .query_row(
                "SELECT data_json FROM documents WHERE collection = ?1 AND id = ?2",
                rusqlite::params![collection, id],
                |row| row.get(0),
            )
            .optional()?;

        match data_json {
            Some(json) => {
                let doc = serde_json::from_str(&json).context("Failed to deserialize document from database")?;
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    // ========================================================================
    // Helper methods
    // ========================================================================

    fn jsonl_path(&self, collection: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", collection))
    }

    /// Append to the log, mirror into SQLite, then push the new snapshot
    fn write_document(&mut self, collection: &str, doc: &RawDocument, updated_at: i64) -> Result<()> {
        jsonl::append_jsonl(&self.jsonl_path(collection), doc)?;

        let data_json = serde_json::to_string(doc).context("Failed to serialize document")?;
        self.db.execute(
            "INSERT OR REPLACE INTO documents (collection, id, data_json, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![collection, &doc.id, data_json, updated_at],
        )?;

        self.publish(collection)
    }

    fn publish(&self, collection: &str) -> Result<()> {
        if !self.subscriptions.has_subscribers(collection) {
            return Ok(());
        }
        let snapshot: Snapshot = self.documents(collection)?;
        self.subscriptions.publish(collection, &snapshot);
        Ok(())
    }

    fn strip_reserved(fields: &mut Map<String, Value>) {
        for field in RESERVED_FIELDS {
            fields.remove(field);
        }
    }

    fn validate_collection_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(eyre!("Collection name cannot be empty"));
        }
        if name.len() > 64 {
            return Err(eyre!("Collection name too long: {} (max 64 chars)", name));
        }
        if !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
            return Err(eyre!(
                "Invalid collection name: {} (must be alphanumeric with _/-)",
                name
            ));
        }
        Ok(())
    }

    fn validate_id(id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(eyre!("Document ID cannot be empty or whitespace-only"));
        }
        if id.len() > 256 {
            return Err(eyre!("Document ID too long: {} chars (max 256)", id.len()));
        }
        Ok(())
    }

    // ========================================================================
    // Sync operations
    // ========================================================================

    /// Rebuild the SQLite mirror from JSONL files
    pub fn sync(&mut self) -> Result<()> {
        info!("Syncing database from JSONL files");

        let tx = self.db.transaction()?;
        tx.execute("DELETE FROM documents", [])?;

        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();

            let Some(collection) = jsonl_collection(&path) else {
                continue;
            };
            debug!(collection, "Syncing collection");

            let file_mtime = file_mtime(&path)?;
            let entries: std::collections::HashMap<String, Value> = jsonl::read_jsonl_latest(&path)?;

            for (id, doc) in entries {
                // Skip tombstones
                if doc.get("deleted").and_then(Value::as_bool).unwrap_or(false) {
                    continue;
                }

                let data_json = serde_json::to_string(&doc)?;
                let updated_at = doc.get("updatedAt").and_then(Value::as_i64).unwrap_or(0);

                tx.execute(
                    "INSERT OR REPLACE INTO documents (collection, id, data_json, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![collection, &id, data_json, updated_at],
                )?;
            }

            tx.execute(
                "INSERT OR REPLACE INTO sync_metadata (collection, last_sync_time, file_mtime)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![collection, now_ms(), file_mtime],
            )?;
        }

        tx.commit()?;

        let collections: Vec<String> = {
            let mut stmt = self.db.prepare("SELECT collection FROM sync_metadata")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            names
        };
        for collection in collections {
            self.publish(&collection)?;
        }

        info!("Sync complete");
        Ok(())
    }
}

impl DocumentStore for Store {
    fn subscribe(&self, collection: &str) -> Result<Subscription> {
        Self::validate_collection_name(collection)?;

        // First delivery is the current set
        let snapshot = self.documents(collection)?;
        Ok(self.subscriptions.subscribe_with(collection, snapshot))
    }

    fn create(&mut self, collection: &str, mut fields: Map<String, Value>) -> Result<String> {
        Self::validate_collection_name(collection)?;

        let id = uuid::Uuid::now_v7().to_string();
        let now = now_ms();

        Self::strip_reserved(&mut fields);
        fields.insert("createdAt".to_string(), Value::from(now));
        fields.insert("updatedAt".to_string(), Value::from(now));

        let doc = RawDocument::new(id.clone(), fields);
        self.write_document(collection, &doc, now)?;

        debug!(collection, id = %id, "Document created");
        Ok(id)
    }

    fn update(&mut self, collection: &str, id: &str, mut patch: Map<String, Value>) -> Result<()> {
        Self::validate_collection_name(collection)?;
        Self::validate_id(id)?;

        let mut doc = self
            .get(collection, id)?
            .ok_or_else(|| eyre!("Document not found: {}/{}", collection, id))?;

        let now = now_ms();
        Self::strip_reserved(&mut patch);
        doc.fields.extend(patch);
        doc.fields.insert("updatedAt".to_string(), Value::from(now));

        self.write_document(collection, &doc, now)?;

        debug!(collection, id, "Document updated");
        Ok(())
    }

    fn delete(&mut self, collection: &str, id: &str) -> Result<()> {
        Self::validate_collection_name(collection)?;
        Self::validate_id(id)?;

        // 1. Append tombstone to JSONL
        let tombstone = serde_json::json!({
            "id": id,
            "deleted": true,
            "updatedAt": now_ms(),
        });
        jsonl::append_jsonl(&self.jsonl_path(collection), &tombstone)?;

        // 2. Delete from SQLite
        let removed = self.db.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            rusqlite::params![collection, id],
        )?;

        debug!(collection, id, removed, "Document deleted");
        self.publish(collection)
    }
}

fn jsonl_collection(path: &Path) -> Option<&str> {
    if path.extension().and_then(|s| s.to_str()) != Some("jsonl") {
        return None;
    }
    path.file_stem().and_then(|s| s.to_str())
}

fn file_mtime(path: &Path) -> Result<i64> {
    Ok(fs::metadata(path)?
        .modified()?
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("fields must be an object"),
        }
    }

    #[test]
    fn test_store_open_creates_directory() {
        let temp = TempDir::new().unwrap();

        let _store = Store::open(temp.path()).unwrap();
        let store_path = temp.path().join(".userview");
        assert!(store_path.exists());
        assert!(store_path.join("userview.db").exists());
        assert!(store_path.join(".gitignore").exists());
        assert!(store_path.join(".version").exists());
    }

    #[test]
    fn test_create_stamps_server_timestamps() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();

        let before = now_ms();
        let id = store
            .create(
                "users",
                fields(json!({"name": "Ada", "createdAt": "1999-01-01", "id": "spoofed"})),
            )
            .unwrap();
        assert_ne!(id, "spoofed");

        let doc = store.get("users", &id).unwrap().unwrap();
        assert_eq!(doc.get("name"), Some(&json!("Ada")));
        let created = doc.get("createdAt").and_then(Value::as_i64).unwrap();
        assert!(created >= before);
        assert_eq!(doc.get("updatedAt"), doc.get("createdAt"));

        assert!(temp.path().join(".userview/users.jsonl").exists());
    }

    #[test]
    fn test_update_merges_patch() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();

        let id = store
            .create("users", fields(json!({"name": "Ada", "email": "ada@example.com"})))
            .unwrap();
        let created = store.get("users", &id).unwrap().unwrap();

        store.update("users", &id, fields(json!({"name": "Ada L."}))).unwrap();

        let doc = store.get("users", &id).unwrap().unwrap();
        assert_eq!(doc.get("name"), Some(&json!("Ada L.")));
        assert_eq!(doc.get("email"), Some(&json!("ada@example.com")));
        assert_eq!(doc.get("createdAt"), created.get("createdAt"));
        let updated = doc.get("updatedAt").and_then(Value::as_i64).unwrap();
        let created_at = doc.get("createdAt").and_then(Value::as_i64).unwrap();
        assert!(updated >= created_at);
    }

    #[test]
    fn test_update_missing_document_fails() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();

        let result = store.update("users", "missing", Map::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_delete_document() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();

        let id = store.create("users", fields(json!({"name": "Ada"}))).unwrap();
        store.delete("users", &id).unwrap();

        assert!(store.get("users", &id).unwrap().is_none());

        let content = fs::read_to_string(temp.path().join(".userview/users.jsonl")).unwrap();
        assert!(content.contains("\"deleted\":true"));

        // Deleting again is a no-op
        store.delete("users", &id).unwrap();
    }

    #[test]
    fn test_subscribe_delivers_initial_and_subsequent_snapshots() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();
        store.create("users", fields(json!({"name": "Ada"}))).unwrap();

        let sub = store.subscribe("users").unwrap();
        let initial = sub.try_next().unwrap();
        assert_eq!(initial.len(), 1);

        let id = store.create("users", fields(json!({"name": "Bob"}))).unwrap();
        assert_eq!(sub.try_next().unwrap().len(), 2);

        store.delete("users", &id).unwrap();
        assert_eq!(sub.try_next().unwrap().len(), 1);
        assert!(sub.try_next().is_none());
    }

    #[test]
    fn test_no_delivery_after_unsubscribe() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();

        let sub = store.subscribe("users").unwrap();
        sub.unsubscribe();
        assert_eq!(store.subscriptions.active_count(), 0);

        store.create("users", fields(json!({"name": "Ada"}))).unwrap();
        assert_eq!(store.subscriptions.active_count(), 0);
    }

    #[test]
    fn test_sync_rebuilds_from_jsonl() {
        let temp = TempDir::new().unwrap();
        let (kept, removed) = {
            let mut store = Store::open(temp.path()).unwrap();
            let kept = store.create("users", fields(json!({"name": "Ada"}))).unwrap();
            let removed = store.create("users", fields(json!({"name": "Bob"}))).unwrap();
            store.delete("users", &removed).unwrap();
            (kept, removed)
        };

        // Drop the mirror, then rebuild it from the log
        fs::remove_file(temp.path().join(".userview/userview.db")).unwrap();
        let mut store = Store::open(temp.path()).unwrap();
        store.sync().unwrap();

        let docs = store.documents("users").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, kept);
        assert!(store.get("users", &removed).unwrap().is_none());
    }

    #[test]
    fn test_validation_collection_name() {
        assert!(Store::validate_collection_name("users").is_ok());
        assert!(Store::validate_collection_name("user-records_2").is_ok());

        assert!(Store::validate_collection_name("invalid/name").is_err());
        assert!(Store::validate_collection_name("").is_err());
        assert!(Store::validate_collection_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_validation_id() {
        assert!(Store::validate_id("abc").is_ok());
        assert!(Store::validate_id("   ").is_err());
        assert!(Store::validate_id(&"a".repeat(257)).is_err());
    }
}
