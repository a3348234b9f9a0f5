//! SQLite-backed tree store.

use super::{NodeStat, TreeStore, Version, basename, now_ms, parent, validate_path};
use crate::error::{JonesError, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Tree store persisted in a single SQLite table.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL so concurrent readers in other processes see committed writes
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA busy_timeout=5000;",
        )?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.run_migrations()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        self.with_conn_mut(|conn| {
            embedded::migrations::runner().run(conn)?;
            Ok(())
        })
    }

    /// Execute a function with exclusive access to the connection.
    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| JonesError::internal("sqlite connection lock poisoned"))?;
        f(&conn)
    }

    /// Execute a function with mutable access to the connection (for transactions).
    fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| JonesError::internal("sqlite connection lock poisoned"))?;
        f(&mut conn)
    }
}

fn read_stat(conn: &Connection, path: &str) -> Result<Option<NodeStat>> {
    let stat = conn
        .query_row(
            "SELECT version, created_at, modified_at FROM nodes WHERE path = ?1",
            params![path],
            |row| {
                Ok(NodeStat {
                    version: row.get(0)?,
                    created_at: row.get(1)?,
                    modified_at: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(stat)
}

fn require_stat(conn: &Connection, path: &str) -> Result<NodeStat> {
    read_stat(conn, path)?.ok_or_else(|| JonesError::not_found(path))
}

fn check_version(path: &str, stat: &NodeStat, expected: Option<Version>) -> Result<()> {
    match expected {
        Some(v) if v != stat.version => Err(JonesError::version_conflict(path, v, stat.version)),
        _ => Ok(()),
    }
}

impl TreeStore for SqliteStore {
    fn ensure_path(&self, path: &str) -> Result<()> {
        validate_path(path)?;
        let now = now_ms();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut current = String::new();
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                let parent_path = if current.is_empty() {
                    "/".to_string()
                } else {
                    current.clone()
                };
                current.push('/');
                current.push_str(segment);
                tx.execute(
                    "INSERT OR IGNORE INTO nodes (path, parent, data, version, created_at, modified_at)
                     VALUES (?1, ?2, x'', 0, ?3, ?3)",
                    params![&current, &parent_path, now],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn get(&self, path: &str) -> Result<(Vec<u8>, NodeStat)> {
        validate_path(path)?;
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT data, version, created_at, modified_at FROM nodes WHERE path = ?1",
                params![path],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        NodeStat {
                            version: row.get(1)?,
                            created_at: row.get(2)?,
                            modified_at: row.get(3)?,
                        },
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| JonesError::not_found(path))
        })
    }

    fn set(&self, path: &str, data: &[u8], expected: Option<Version>) -> Result<NodeStat> {
        validate_path(path)?;
        let now = now_ms();
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE nodes SET data = ?1, version = version + 1, modified_at = ?2
                 WHERE path = ?3 AND (?4 IS NULL OR version = ?4)",
                params![data, now, path, expected],
            )?;

            if updated == 0 {
                // Distinguish a missing node from a lost race
                let stat = require_stat(conn, path)?;
                check_version(path, &stat, expected)?;
                return Err(JonesError::internal(format!("update of {} had no effect", path)));
            }

            debug!(path = %path, expected = ?expected, "node updated");
            require_stat(conn, path)
        })
    }

    fn create(&self, path: &str, data: &[u8]) -> Result<NodeStat> {
        validate_path(path)?;
        let now = now_ms();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if read_stat(&tx, path)?.is_some() {
                return Err(JonesError::already_exists(path));
            }
            let parent_path = parent(path);
            if let Some(p) = parent_path {
                if read_stat(&tx, p)?.is_none() {
                    return Err(JonesError::not_found(p));
                }
            }
            tx.execute(
                "INSERT INTO nodes (path, parent, data, version, created_at, modified_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?4)",
                params![path, parent_path, data, now],
            )?;
            let stat = require_stat(&tx, path)?;
            tx.commit()?;
            debug!(path = %path, "node created");
            Ok(stat)
        })
    }

    fn delete(&self, path: &str, expected: Option<Version>, recursive: bool) -> Result<()> {
        validate_path(path)?;
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let stat = require_stat(&tx, path)?;
            check_version(path, &stat, expected)?;

            let child_count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM nodes WHERE parent = ?1",
                params![path],
                |row| row.get(0),
            )?;
            if child_count > 0 && !recursive {
                return Err(JonesError::not_empty(path));
            }

            let prefix = if path == "/" {
                "/".to_string()
            } else {
                format!("{}/", path)
            };
            let removed = tx.execute(
                "DELETE FROM nodes
                 WHERE path != '/'
                   AND (path = ?1 OR substr(path, 1, length(?2)) = ?2)",
                params![path, &prefix],
            )?;
            tx.commit()?;
            debug!(path = %path, removed, "nodes deleted");
            Ok(())
        })
    }

    fn exists(&self, path: &str) -> Result<bool> {
        validate_path(path)?;
        self.with_conn(|conn| Ok(read_stat(conn, path)?.is_some()))
    }

    fn children(&self, path: &str) -> Result<Vec<String>> {
        validate_path(path)?;
        self.with_conn(|conn| {
            require_stat(conn, path)?;
            let mut stmt = conn.prepare("SELECT path FROM nodes WHERE parent = ?1 ORDER BY path")?;
            let paths = stmt
                .query_map(params![path], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(paths.iter().map(|p| basename(p).to_string()).collect())
        })
    }
}
