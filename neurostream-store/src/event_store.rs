//! SQLite event sink
//!
//! One row per emitted metric sample, tagged with the session context that
//! was in effect when the sample was produced. Writes come from the
//! acquisition loop; reads serve historical queries and per-user stats.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use neurostream_dsp::MetricSample;
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, Row};

use crate::error::{Result, StoreError};

/// One metric sample bound to its session context, ready to persist.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub mode: String,
    pub focus_score: f64,
    pub load_score: f64,
    pub anomaly_score: f64,
    pub context: serde_json::Value,
    pub user_id: String,
}

impl EventRecord {
    /// Bind an extracted metric sample to the session context it was
    /// produced under.
    pub fn from_sample(
        sample: &MetricSample,
        mode: impl Into<String>,
        context: serde_json::Value,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: sample.timestamp,
            mode: mode.into(),
            focus_score: sample.focus_score,
            load_score: sample.load_score,
            anomaly_score: sample.anomaly_score,
            context,
            user_id: user_id.into(),
        }
    }
}

/// A persisted event, as read back from the database.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub id: i64,
    pub record: EventRecord,
}

/// Aggregate statistics for one user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserStats {
    pub user_id: String,
    pub total_events: i64,
    pub avg_focus: f64,
    pub avg_load: f64,
    pub avg_anomaly: f64,
}

/// Thread-safe SQLite store for metric events.
pub struct EventStore {
    conn: Arc<Mutex<Connection>>,
}

impl EventStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    /// In-memory store for tests and dry runs.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp REAL NOT NULL,
                mode TEXT NOT NULL,
                focus_score REAL NOT NULL,
                load_score REAL NOT NULL,
                anomaly_score REAL NOT NULL,
                context TEXT NOT NULL DEFAULT '{}',
                user_id TEXT NOT NULL DEFAULT 'default'
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_mode ON events(mode)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_user_id ON events(user_id)",
            [],
        )?;

        Ok(())
    }

    /// Append one event, returning its row id.
    pub fn append(&self, record: &EventRecord) -> Result<i64> {
        let conn = self.conn.lock();
        let context = serde_json::to_string(&record.context)?;

        conn.execute(
            "INSERT INTO events (
                timestamp, mode, focus_score, load_score, anomaly_score, context, user_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                timestamp_to_f64(record.timestamp),
                record.mode,
                record.focus_score,
                record.load_score,
                record.anomaly_score,
                context,
                record.user_id,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Newest-first events, optionally filtered by user and/or mode.
    pub fn recent_events(
        &self,
        user_id: Option<&str>,
        mode: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredEvent>> {
        let conn = self.conn.lock();

        let mut sql = String::from("SELECT * FROM events");
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(user) = user_id {
            conditions.push("user_id = ?");
            values.push(SqlValue::Text(user.to_string()));
        }
        if let Some(mode) = mode {
            conditions.push("mode = ?");
            values.push(SqlValue::Text(mode.to_string()));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY timestamp DESC LIMIT ?");
        values.push(SqlValue::Integer(limit as i64));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values), row_to_event)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// All user ids that have at least one event.
    pub fn distinct_users(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT user_id FROM events ORDER BY user_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Event count and mean scores for one user. All-zero for unknown users.
    pub fn user_stats(&self, user_id: &str) -> Result<UserStats> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT COUNT(*),
                    COALESCE(AVG(focus_score), 0),
                    COALESCE(AVG(load_score), 0),
                    COALESCE(AVG(anomaly_score), 0)
             FROM events WHERE user_id = ?1",
        )?;

        let stats = stmt.query_row(params![user_id], |row| {
            Ok(UserStats {
                user_id: user_id.to_string(),
                total_events: row.get(0)?,
                avg_focus: row.get(1)?,
                avg_load: row.get(2)?,
                avg_anomaly: row.get(3)?,
            })
        })?;

        Ok(stats)
    }
}

fn timestamp_to_f64(ts: DateTime<Utc>) -> f64 {
    ts.timestamp() as f64 + f64::from(ts.timestamp_subsec_micros()) / 1.0e6
}

fn f64_to_timestamp(secs: f64) -> DateTime<Utc> {
    let whole = secs.trunc() as i64;
    let micros = ((secs - secs.trunc()) * 1.0e6).round() as u32;
    Utc.timestamp_opt(whole, micros * 1000)
        .single()
        .unwrap_or_else(Utc::now)
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<StoredEvent> {
    let context_raw: String = row.get("context")?;
    let context = serde_json::from_str(&context_raw)
        .unwrap_or(serde_json::Value::Object(Default::default()));

    Ok(StoredEvent {
        id: row.get("id")?,
        record: EventRecord {
            timestamp: f64_to_timestamp(row.get("timestamp")?),
            mode: row.get("mode")?,
            focus_score: row.get("focus_score")?,
            load_score: row.get("load_score")?,
            anomaly_score: row.get("anomaly_score")?,
            context,
            user_id: row.get("user_id")?,
        },
    })
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::InvalidContext(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(mode: &str, user: &str, focus: f64) -> EventRecord {
        EventRecord {
            timestamp: Utc::now(),
            mode: mode.to_string(),
            focus_score: focus,
            load_score: 40.0,
            anomaly_score: 5.0,
            context: json!({"tab": "editor"}),
            user_id: user.to_string(),
        }
    }

    #[test]
    fn append_then_read_back() {
        let store = EventStore::in_memory().unwrap();
        let id = store.append(&record("study", "alice", 72.5)).unwrap();
        assert!(id > 0);

        let events = store.recent_events(None, None, 10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].record.mode, "study");
        assert_eq!(events[0].record.focus_score, 72.5);
        assert_eq!(events[0].record.context["tab"], "editor");
    }

    #[test]
    fn filters_by_user_and_mode() {
        let store = EventStore::in_memory().unwrap();
        store.append(&record("study", "alice", 70.0)).unwrap();
        store.append(&record("meeting", "alice", 60.0)).unwrap();
        store.append(&record("study", "bob", 50.0)).unwrap();

        let alice_study = store
            .recent_events(Some("alice"), Some("study"), 10)
            .unwrap();
        assert_eq!(alice_study.len(), 1);
        assert_eq!(alice_study[0].record.user_id, "alice");

        let all_study = store.recent_events(None, Some("study"), 10).unwrap();
        assert_eq!(all_study.len(), 2);
    }

    #[test]
    fn limit_and_ordering_newest_first() {
        let store = EventStore::in_memory().unwrap();
        for i in 0..5 {
            let mut r = record("background", "alice", i as f64);
            r.timestamp = Utc.timestamp_opt(1_700_000_000 + i, 0).single().unwrap();
            store.append(&r).unwrap();
        }
        let events = store.recent_events(None, None, 3).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].record.focus_score, 4.0);
        assert_eq!(events[2].record.focus_score, 2.0);
    }

    #[test]
    fn distinct_users_sorted() {
        let store = EventStore::in_memory().unwrap();
        store.append(&record("study", "bob", 1.0)).unwrap();
        store.append(&record("study", "alice", 2.0)).unwrap();
        store.append(&record("study", "bob", 3.0)).unwrap();
        assert_eq!(store.distinct_users().unwrap(), vec!["alice", "bob"]);
    }

    #[test]
    fn stats_average_scores() {
        let store = EventStore::in_memory().unwrap();
        store.append(&record("study", "alice", 60.0)).unwrap();
        store.append(&record("study", "alice", 80.0)).unwrap();

        let stats = store.user_stats("alice").unwrap();
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.avg_focus, 70.0);

        let unknown = store.user_stats("nobody").unwrap();
        assert_eq!(unknown.total_events, 0);
        assert_eq!(unknown.avg_focus, 0.0);
    }

    #[test]
    fn opens_on_disk_with_parent_creation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("events.db");
        let store = EventStore::open(&path).unwrap();
        store.append(&record("study", "alice", 1.0)).unwrap();
        assert!(path.exists());
    }
}
