//! SQLite ledger of observed POI digests, keyed by a content hash of (deployment, block, indexer, source).
//!
//! Only trusted-source POIs for concrete block hashes are recorded. The first observation of a key
//! is kept; later fetches are compared against it so that a source changing its answer for a
//! finalized block is reported instead of silently accepted. Network settings, epochs and blocks
//! are never stored here.

use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// One recorded POI observation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Observation {
    pub deployment: String,
    pub block_number: u64,
    pub block_hash: String,
    pub indexer: String,
    pub source: String,
    pub digest: String,
}

pub struct PoiCache {
    conn: Mutex<Connection>,
}

impl PoiCache {
    /// Open or create the cache at `path`. Creates parent dirs if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS poi_observations (
                key TEXT PRIMARY KEY,
                deployment TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                block_hash TEXT NOT NULL,
                indexer TEXT NOT NULL,
                source TEXT NOT NULL,
                digest TEXT NOT NULL,
                observed_utc INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_poi_deployment ON poi_observations(deployment, block_number);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Content-hash key for an observation; inputs are lowercased so hex case does not split keys.
    pub fn key_for(deployment: &str, block_hash: &str, indexer: &str, source: &str) -> String {
        let normalized = format!(
            "{}|{}|{}|{}",
            deployment.to_lowercase(),
            block_hash.to_lowercase(),
            indexer.to_lowercase(),
            source
        );
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|e| CacheError::Io(std::io::Error::other(e.to_string())))
    }

    /// Digest first recorded for `key`, if any.
    pub fn recorded(&self, key: &str) -> Result<Option<String>, CacheError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT digest FROM poi_observations WHERE key = ?1")?;
        let row = stmt
            .query_row([key], |r| r.get::<_, String>(0))
            .optional()?;
        Ok(row)
    }

    /// Record an observation unless one already exists for `key`.
    pub fn record(&self, key: &str, obs: &Observation) -> Result<(), CacheError> {
        let observed = time::OffsetDateTime::now_utc().unix_timestamp();
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO poi_observations \
             (key, deployment, block_number, block_hash, indexer, source, digest, observed_utc) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                key,
                obs.deployment,
                obs.block_number as i64,
                obs.block_hash,
                obs.indexer,
                obs.source,
                obs.digest,
                observed
            ],
        )?;
        Ok(())
    }

    pub fn observation_count(&self) -> Result<u64, CacheError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM poi_observations", [], |r| r.get(0))?;
        Ok(n.max(0) as u64)
    }
}
