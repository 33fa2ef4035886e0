//! SQLite persistence for accounts and finished matches.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, OptionalExtension};

/// A registered account row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub password: String,
}

/// A finished match: both usernames and their final cumulative scores.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub user1: String,
    pub score1: f64,
    pub user2: String,
    pub score2: f64,
}

/// Handle to the server database. Clones share one connection; rusqlite's
/// `Connection` is `Send` but not `Sync`, so it lives behind a mutex and
/// every statement is short-lived.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> rusqlite::Result<Self> {
        Self::from_conn(rusqlite::Connection::open(path)?)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::from_conn(rusqlite::Connection::open_in_memory()?)
    }

    fn from_conn(conn: rusqlite::Connection) -> rusqlite::Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                username TEXT PRIMARY KEY,
                password TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS matches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user1 TEXT NOT NULL,
                score1 REAL NOT NULL,
                user2 TEXT NOT NULL,
                score2 REAL NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn user_by_name(&self, username: &str) -> rusqlite::Result<Option<User>> {
        self.conn
            .lock()
            .unwrap()
            .query_row(
                "SELECT username, password FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(User {
                        username: row.get(0)?,
                        password: row.get(1)?,
                    })
                },
            )
            .optional()
    }

    pub fn add_user(&self, user: &User) -> rusqlite::Result<()> {
        self.conn.lock().unwrap().execute(
            "INSERT INTO users (username, password) VALUES (?1, ?2)",
            params![user.username, user.password],
        )?;
        Ok(())
    }

    pub fn add_match(&self, m: &MatchRecord) -> rusqlite::Result<()> {
        self.conn.lock().unwrap().execute(
            "INSERT INTO matches (user1, score1, user2, score2) VALUES (?1, ?2, ?3, ?4)",
            params![m.user1, m.score1, m.user2, m.score2],
        )?;
        Ok(())
    }

    /// All matches a user took part in, oldest first.
    #[cfg(test)]
    pub fn matches_for(&self, username: &str) -> rusqlite::Result<Vec<MatchRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT user1, score1, user2, score2 FROM matches
             WHERE user1 = ?1 OR user2 = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![username], |row| {
            Ok(MatchRecord {
                user1: row.get(0)?,
                score1: row.get(1)?,
                user2: row.get(2)?,
                score2: row.get(3)?,
            })
        })?;
        rows.collect()
    }
}
