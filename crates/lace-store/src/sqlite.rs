// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `SqliteThreadStore` — the sole production [`ThreadStore`] implementation.
//!
//! Schema-on-write, three tables plus a child `task_notes` (spec.md §6):
//! `threads`, `events`, `tasks`, `task_notes`. Modelled directly on the
//! sibling pack's `agtrace-index::Database` (`open`/`open_in_memory`,
//! `execute_batch` schema init, `ON CONFLICT DO UPDATE` upserts, prepared
//! `query_map`, `.optional()`, `LIKE`-prefix queries) — adapted from a
//! read-mostly metadata index to an append-heavy event log guarded by a
//! single connection-wide mutex so concurrent agent turns serialize safely.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::schema::{
    Event, EventData, EventType, Task, TaskNote, TaskPatch, TaskPriority, TaskStatus, Thread,
    ThreadMetadata,
};
use crate::store::ThreadStore;

pub struct SqliteThreadStore {
    conn: Mutex<Connection>,
}

impl SqliteThreadStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS threads (
                id          TEXT PRIMARY KEY,
                parent_id   TEXT,
                created_at  TEXT NOT NULL,
                metadata    TEXT NOT NULL,
                closed      BOOLEAN NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS events (
                thread_id   TEXT NOT NULL,
                seq         INTEGER NOT NULL,
                event_type  TEXT NOT NULL,
                timestamp   TEXT NOT NULL,
                payload     TEXT NOT NULL,
                PRIMARY KEY (thread_id, seq)
            );
            CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);

            CREATE TABLE IF NOT EXISTS tasks (
                id           TEXT PRIMARY KEY,
                title        TEXT NOT NULL,
                description  TEXT NOT NULL,
                prompt       TEXT NOT NULL,
                status       TEXT NOT NULL,
                priority     TEXT NOT NULL,
                assigned_to  TEXT,
                created_by   TEXT NOT NULL,
                thread_id    TEXT NOT NULL,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_thread ON tasks(thread_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_assignee ON tasks(assigned_to);

            CREATE TABLE IF NOT EXISTS task_notes (
                task_id    TEXT NOT NULL,
                seq        INTEGER NOT NULL,
                id         TEXT NOT NULL,
                author     TEXT NOT NULL,
                content    TEXT NOT NULL,
                timestamp  TEXT NOT NULL,
                PRIMARY KEY (task_id, seq)
            );
            "#,
        )?;
        Ok(())
    }

    fn row_to_thread(
        id: String,
        parent_id: Option<String>,
        created_at: String,
        metadata: String,
        closed: bool,
    ) -> Result<Thread> {
        Ok(Thread {
            id,
            parent_id,
            created_at: created_at.parse::<DateTime<Utc>>().map_err(|e| {
                Error::Storage(rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
            })?,
            metadata: serde_json::from_str::<ThreadMetadata>(&metadata)?,
            closed,
        })
    }

    fn load_task_notes(conn: &Connection, task_id: &str) -> Result<Vec<TaskNote>> {
        let mut stmt = conn.prepare(
            "SELECT id, author, content, timestamp FROM task_notes WHERE task_id = ?1 ORDER BY seq ASC",
        )?;
        let notes = stmt
            .query_map(params![task_id], |row| {
                let ts: String = row.get(3)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    ts,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        notes
            .into_iter()
            .map(|(id, author, content, ts)| {
                Ok(TaskNote {
                    id,
                    author,
                    content,
                    timestamp: ts.parse::<DateTime<Utc>>().map_err(|e| {
                        Error::Storage(rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
                    })?,
                })
            })
            .collect()
    }

    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<TaskRow> {
        Ok(TaskRow {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            prompt: row.get(3)?,
            status: row.get(4)?,
            priority: row.get(5)?,
            assigned_to: row.get(6)?,
            created_by: row.get(7)?,
            thread_id: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn finish_task(conn: &Connection, row: TaskRow) -> Result<Task> {
        let notes = Self::load_task_notes(conn, &row.id)?;
        Ok(Task {
            id: row.id,
            title: row.title,
            description: row.description,
            prompt: row.prompt,
            status: TaskStatus::from_str(&row.status).ok_or_else(|| {
                Error::Storage(rusqlite::Error::InvalidColumnType(
                    4,
                    "status".into(),
                    rusqlite::types::Type::Text,
                ))
            })?,
            priority: TaskPriority::from_str(&row.priority).ok_or_else(|| {
                Error::Storage(rusqlite::Error::InvalidColumnType(
                    5,
                    "priority".into(),
                    rusqlite::types::Type::Text,
                ))
            })?,
            assigned_to: row.assigned_to,
            created_by: row.created_by,
            thread_id: row.thread_id,
            created_at: row.created_at.parse().map_err(|e| {
                Error::Storage(rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
            })?,
            updated_at: row.updated_at.parse().map_err(|e| {
                Error::Storage(rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
            })?,
            notes,
        })
    }
}

struct TaskRow {
    id: String,
    title: String,
    description: String,
    prompt: String,
    status: String,
    priority: String,
    assigned_to: Option<String>,
    created_by: String,
    thread_id: String,
    created_at: String,
    updated_at: String,
}

const TASK_COLUMNS: &str = "id, title, description, prompt, status, priority, assigned_to, created_by, thread_id, created_at, updated_at";

#[async_trait]
impl ThreadStore for SqliteThreadStore {
    async fn create_thread(
        &self,
        id: &str,
        parent_id: Option<&str>,
        metadata: ThreadMetadata,
    ) -> Result<Thread> {
        let conn = self.conn.lock().unwrap();
        let created_at = Utc::now();
        let metadata_json = serde_json::to_string(&metadata)?;
        conn.execute(
            "INSERT INTO threads (id, parent_id, created_at, metadata, closed) VALUES (?1, ?2, ?3, ?4, 0)",
            params![id, parent_id, created_at.to_rfc3339(), metadata_json],
        )?;
        Ok(Thread {
            id: id.to_string(),
            parent_id: parent_id.map(str::to_string),
            created_at,
            metadata,
            closed: false,
        })
    }

    async fn get_thread(&self, id: &str) -> Result<Option<Thread>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, parent_id, created_at, metadata, closed FROM threads WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, bool>(4)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, parent_id, created_at, metadata, closed)| {
            Self::row_to_thread(id, parent_id, created_at, metadata, closed)
        })
        .transpose()
    }

    async fn list_descendant_threads(&self, root_id: &str) -> Result<Vec<Thread>> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("{root_id}.%");
        let mut stmt = conn.prepare(
            "SELECT id, parent_id, created_at, metadata, closed FROM threads WHERE id = ?1 OR id LIKE ?2",
        )?;
        let rows = stmt
            .query_map(params![root_id, pattern], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, bool>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(id, parent_id, created_at, metadata, closed)| {
                Self::row_to_thread(id, parent_id, created_at, metadata, closed)
            })
            .collect()
    }

    async fn update_metadata(&self, id: &str, metadata: ThreadMetadata) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let metadata_json = serde_json::to_string(&metadata)?;
        let changed = conn.execute(
            "UPDATE threads SET metadata = ?1 WHERE id = ?2",
            params![metadata_json, id],
        )?;
        if changed == 0 {
            return Err(Error::UnknownThread(id.to_string()));
        }
        Ok(())
    }

    async fn set_closed(&self, id: &str, closed: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE threads SET closed = ?1 WHERE id = ?2",
            params![closed, id],
        )?;
        if changed == 0 {
            return Err(Error::UnknownThread(id.to_string()));
        }
        Ok(())
    }

    async fn append_event(
        &self,
        thread_id: &str,
        event_type: EventType,
        data: EventData,
    ) -> Result<Event> {
        let conn = self.conn.lock().unwrap();
        let next_seq: i64 = conn.query_row(
            "SELECT COALESCE(MAX(seq), -1) + 1 FROM events WHERE thread_id = ?1",
            params![thread_id],
            |row| row.get(0),
        )?;
        let timestamp = Utc::now();
        let payload = serde_json::to_string(&data)?;
        conn.execute(
            "INSERT INTO events (thread_id, seq, event_type, timestamp, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![thread_id, next_seq, event_type.as_str(), timestamp.to_rfc3339(), payload],
        )?;
        Ok(Event {
            seq: next_seq as u64,
            thread_id: thread_id.to_string(),
            event_type,
            timestamp,
            data,
        })
    }

    async fn list_events(&self, thread_id: &str, since_seq: Option<u64>) -> Result<Vec<Event>> {
        let conn = self.conn.lock().unwrap();
        let since = since_seq.map(|s| s as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(
            "SELECT thread_id, seq, event_type, timestamp, payload FROM events \
             WHERE thread_id = ?1 AND seq > ?2 ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![thread_id, since], event_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(decode_event).collect()
    }

    async fn list_main_and_delegate_events(&self, root_thread_id: &str) -> Result<Vec<Event>> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("{root_thread_id}.%");
        let mut stmt = conn.prepare(
            "SELECT thread_id, seq, event_type, timestamp, payload FROM events \
             WHERE thread_id = ?1 OR thread_id LIKE ?2 \
             ORDER BY timestamp ASC, thread_id ASC, seq ASC",
        )?;
        let rows = stmt
            .query_map(params![root_thread_id, pattern], event_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(decode_event).collect()
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                task.id,
                task.title,
                task.description,
                task.prompt,
                task.status.as_str(),
                task.priority.as_str(),
                task.assigned_to,
                task.created_by,
                task.thread_id,
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
            ],
        )?;
        for note in &task.notes {
            insert_note(&conn, &task.id, note)?;
        }
        Ok(())
    }

    async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        let conn = self.conn.lock().unwrap();
        let row: TaskRow = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                |row| Self::row_to_task(row),
            )
            .optional()?
            .ok_or_else(|| Error::UnknownTask(id.to_string()))?;

        let mut current = Self::finish_task(&conn, row)?;
        if let Some(v) = patch.title {
            current.title = v;
        }
        if let Some(v) = patch.description {
            current.description = v;
        }
        if let Some(v) = patch.prompt {
            current.prompt = v;
        }
        if let Some(v) = patch.status {
            current.status = v;
        }
        if let Some(v) = patch.priority {
            current.priority = v;
        }
        if let Some(v) = patch.assigned_to {
            current.assigned_to = v;
        }
        current.updated_at = Utc::now();

        conn.execute(
            "UPDATE tasks SET title=?1, description=?2, prompt=?3, status=?4, priority=?5, \
             assigned_to=?6, updated_at=?7 WHERE id=?8",
            params![
                current.title,
                current.description,
                current.prompt,
                current.status.as_str(),
                current.priority.as_str(),
                current.assigned_to,
                current.updated_at.to_rfc3339(),
                id,
            ],
        )?;
        Ok(current)
    }

    async fn load_task(&self, id: &str) -> Result<Option<Task>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<TaskRow> = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                |row| Self::row_to_task(row),
            )
            .optional()?;
        row.map(|r| Self::finish_task(&conn, r)).transpose()
    }

    async fn load_tasks_by_thread(&self, thread_id: &str) -> Result<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE thread_id = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt
            .query_map(params![thread_id], |row| Self::row_to_task(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(|r| Self::finish_task(&conn, r)).collect()
    }

    async fn load_tasks_by_assignee(&self, assignee: &str) -> Result<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE assigned_to = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt
            .query_map(params![assignee], |row| Self::row_to_task(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(|r| Self::finish_task(&conn, r)).collect()
    }

    async fn add_note(&self, task_id: &str, note: TaskNote) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let exists: Option<String> = conn
            .query_row("SELECT id FROM tasks WHERE id = ?1", params![task_id], |row| row.get(0))
            .optional()?;
        if exists.is_none() {
            return Err(Error::UnknownTask(task_id.to_string()));
        }
        insert_note(&conn, task_id, &note)?;
        conn.execute(
            "UPDATE tasks SET updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), task_id],
        )?;
        Ok(())
    }
}

fn insert_note(conn: &Connection, task_id: &str, note: &TaskNote) -> Result<()> {
    let next_seq: i64 = conn.query_row(
        "SELECT COALESCE(MAX(seq), -1) + 1 FROM task_notes WHERE task_id = ?1",
        params![task_id],
        |row| row.get(0),
    )?;
    conn.execute(
        "INSERT INTO task_notes (task_id, seq, id, author, content, timestamp) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![task_id, next_seq, note.id, note.author, note.content, note.timestamp.to_rfc3339()],
    )?;
    Ok(())
}

type EventRow = (String, i64, String, String, String);

fn event_row(row: &rusqlite::Row) -> rusqlite::Result<EventRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn decode_event(row: EventRow) -> Result<Event> {
    let (thread_id, seq, event_type, timestamp, payload) = row;
    Ok(Event {
        seq: seq as u64,
        thread_id,
        event_type: EventType::from_str(&event_type).ok_or_else(|| {
            Error::Storage(rusqlite::Error::InvalidColumnType(
                2,
                "event_type".into(),
                rusqlite::types::Type::Text,
            ))
        })?,
        timestamp: timestamp
            .parse()
            .map_err(|e| Error::Storage(rusqlite::Error::ToSqlConversionFailure(Box::new(e))))?,
        data: serde_json::from_str(&payload)?,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
