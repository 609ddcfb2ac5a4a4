//! dualstore mode persistence: a minimal key-value side store holding the
//! active dual-write mode per `(resourceKind, deploymentID)`.
//! Keep code tiny and predictable.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use metrics::{counter, histogram};
use rustc_hash::FxHashMap;

/// Injectable configuration store: the single writer of mode transitions.
/// Decoupled from any particular persistence technology.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory store for tests and single-process setups.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: std::sync::Mutex<FxHashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// SQLite-backed store. Simple, synchronous; mode transitions are rare and
/// not latency sensitive.
pub struct SqliteKvStore {
    db: std::sync::Mutex<rusqlite::Connection>,
}

impl SqliteKvStore {
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("DUALSTORE_DB_PATH").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> Result<Self> {
        let started = std::time::Instant::now();
        let db = rusqlite::Connection::open(path)
            .with_context(|| format!("opening sqlite db at {}", path))?;
        db.pragma_update(None, "journal_mode", "WAL").ok();
        db.pragma_update(None, "synchronous", "NORMAL").ok();
        db.execute(
            "CREATE TABLE IF NOT EXISTS dual_write_mode (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_ts INTEGER NOT NULL
            )",
            [],
        )
        .context("creating dual_write_mode table")?;
        let me = Self {
            db: std::sync::Mutex::new(db),
        };
        tracing::debug!(path = %path, "opened mode store");
        histogram!("modestore_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(me)
    }
}

impl KvStore for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let started = std::time::Instant::now();
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare("SELECT value FROM dual_write_mode WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        let out = match rows.next()? {
            Some(row) => Some(row.get::<_, String>(0)?),
            None => None,
        };
        histogram!("modestore_get_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(out)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let started = std::time::Instant::now();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO dual_write_mode(key, value, updated_ts) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_ts = excluded.updated_ts",
            (key, value, now_ts()),
        )?;
        histogram!("modestore_set_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("modestore_set_total", 1u64);
        Ok(())
    }
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".dualstore");
        let _ = std::fs::create_dir_all(&p);
        p.push("dualstore.db");
        return p.to_string_lossy().to_string();
    }
    // Fallback to current directory
    "dualstore.db".to_string()
}

pub fn now_ts() -> i64 {
    // seconds since epoch
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs() as i64
}
