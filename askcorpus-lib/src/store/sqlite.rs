use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info, warn};

use crate::corpus::{Document, Metadata};
use crate::embed::Embedding;
use crate::store::{check_batch, cosine_similarity, rank, CollectionInfo, SearchResult, VectorStore};
use crate::{Error, Result};

/// File name of the database inside the persist directory. Its presence is
/// the marker that an index was built here.
pub const DB_FILE_NAME: &str = "askcorpus.sqlite3";

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    model TEXT NOT NULL,
    dimension INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
    doc_id TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL,
    embedding BLOB NOT NULL,
    UNIQUE (collection, doc_id)
);
";

const INDEX_SQL: &str = "CREATE INDEX IF NOT EXISTS idx_entries_collection ON entries(collection);";

/// Columns the store reads back; a database missing any of them is foreign.
const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("collections", &["name", "model", "dimension"]),
    ("entries", &["collection", "doc_id", "content", "metadata", "embedding"]),
];

/// Files SQLite keeps next to the database.
const SIDECAR_SUFFIXES: &[&str] = &["-journal", "-wal", "-shm"];

/// Durable store: one SQLite database per persist directory, holding any
/// number of collections.
///
/// The database is opened on first use and never created by read-only
/// calls, so [`VectorStore::marker_exists`] stays false until something
/// has been written. Search is brute-force cosine over the collection.
pub struct SqliteStore {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Create a store rooted at `persist_dir`. Nothing is touched on disk yet.
    pub fn new(persist_dir: impl AsRef<Path>) -> Self {
        Self {
            path: persist_dir.as_ref().join(DB_FILE_NAME),
            conn: Mutex::new(None),
        }
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| Error::Store("sqlite connection lock poisoned".to_string()))?;

        if guard.is_none() {
            *guard = Some(self.open_database()?);
        }

        match guard.as_mut() {
            Some(conn) => f(conn),
            None => Err(Error::Store("sqlite connection unavailable".to_string())),
        }
    }

    /// Open the database, moving an unreadable file aside and starting fresh.
    fn open_database(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match connect(&self.path) {
            Ok(conn) => Ok(conn),
            Err(e) if is_unreadable(&e) => {
                let quarantined = self.quarantine()?;
                warn!(
                    path = %self.path.display(),
                    quarantined = %quarantined.display(),
                    error = %e,
                    "index database unreadable, starting fresh"
                );
                Ok(connect(&self.path)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Rename the database (and any sidecar files) to `<name>.corrupt-<millis>`.
    fn quarantine(&self) -> Result<PathBuf> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let mut target = self.path.clone().into_os_string();
        target.push(format!(".corrupt-{millis}"));
        let target = PathBuf::from(target);

        std::fs::rename(&self.path, &target)?;
        for suffix in SIDECAR_SUFFIXES {
            let mut sidecar = self.path.clone().into_os_string();
            sidecar.push(suffix);
            let sidecar = PathBuf::from(sidecar);
            if sidecar.exists() {
                let mut moved = target.clone().into_os_string();
                moved.push(suffix);
                std::fs::rename(&sidecar, PathBuf::from(moved))?;
            }
        }
        Ok(target)
    }
}

fn connect(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "foreign_keys", 1)?;
    conn.execute_batch(SCHEMA_SQL)?;
    check_schema(&conn)?;
    conn.execute_batch(INDEX_SQL)?;
    debug!(path = %path.display(), "opened index database");
    Ok(conn)
}

/// Fail with `SQLITE_CORRUPT` when an existing table lacks a column we read.
fn check_schema(conn: &Connection) -> rusqlite::Result<()> {
    for (table, columns) in REQUIRED_COLUMNS {
        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
        let present = stmt
            .query_map(params![table], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if let Some(missing) = columns.iter().find(|c| !present.iter().any(|p| p.as_str() == **c)) {
            return Err(rusqlite::Error::SqliteFailure(
                ffi::Error::new(ffi::SQLITE_CORRUPT),
                Some(format!("table {table} has no column {missing}")),
            ));
        }
    }
    Ok(())
}

fn is_unreadable(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt)
    )
}

impl VectorStore for SqliteStore {
    fn replace(
        &mut self,
        collection: &str,
        model: &str,
        documents: &[Document],
        embeddings: &[Embedding],
    ) -> Result<()> {
        let dimension = check_batch(documents, embeddings)?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM collections WHERE name = ?1", params![collection])?;
            tx.execute(
                "INSERT INTO collections (name, model, dimension, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![collection, model, dimension as i64, now as i64],
            )?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO entries (collection, doc_id, content, metadata, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for (document, embedding) in documents.iter().zip(embeddings) {
                    let metadata = serde_json::to_string(&document.metadata)
                        .map_err(|e| Error::Store(format!("failed to encode metadata: {e}")))?;
                    stmt.execute(params![
                        collection,
                        document.id,
                        document.text,
                        metadata,
                        serialize_embedding(embedding),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })?;

        info!(collection, entries = documents.len(), dimension, "collection written");
        Ok(())
    }

    fn collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        if !self.path.exists() {
            return Ok(None);
        }

        self.with_conn(|conn| {
            let info = conn
                .query_row(
                    "SELECT c.model, c.dimension,
                            (SELECT COUNT(*) FROM entries e WHERE e.collection = c.name)
                     FROM collections c WHERE c.name = ?1",
                    params![name],
                    |row| {
                        Ok(CollectionInfo {
                            name: name.to_string(),
                            model: row.get(0)?,
                            dimension: row.get::<_, i64>(1)? as usize,
                            count: row.get::<_, i64>(2)? as usize,
                        })
                    },
                )
                .optional()?;
            Ok(info)
        })
    }

    fn search(&self, collection: &str, query: &Embedding, k: usize) -> Result<Vec<SearchResult>> {
        if !self.path.exists() || k == 0 {
            return Ok(Vec::new());
        }

        let results = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT doc_id, content, metadata, embedding FROM entries
                 WHERE collection = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![collection], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })?;

            let mut results = Vec::new();
            for row in rows {
                let (id, text, metadata, blob) = row?;
                let metadata: Metadata = serde_json::from_str(&metadata)
                    .map_err(|e| Error::Store(format!("corrupt metadata for {id}: {e}")))?;
                let score = cosine_similarity(query, &deserialize_embedding(&blob));
                results.push(SearchResult {
                    document: Document { id, text, metadata },
                    score,
                });
            }
            Ok(results)
        })?;

        Ok(rank(results, k))
    }

    fn drop_collection(&mut self, name: &str) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        self.with_conn(|conn| {
            conn.execute("DELETE FROM collections WHERE name = ?1", params![name])?;
            Ok(())
        })
    }

    fn marker_exists(&self) -> bool {
        std::fs::metadata(&self.path).is_ok_and(|m| m.len() > 0)
    }
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
