use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use vibe_common::{
    Fragment, Message, MessageRole, MessageType, MessageWithFragment, NewFragment, Project,
    RunStatus, WorkflowOutput, WorkflowRun,
};

/// Async-safe handle to the database.
///
/// Wraps `VibeDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<VibeDb>>,
}

impl DbHandle {
    pub fn new(db: VibeDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&VibeDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct VibeDb {
    conn: Connection,
}

impl VibeDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Like [`VibeDb::new`], creating missing parent directories first.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }
        Self::new(path)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS messages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    message_type TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS fragments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    message_id INTEGER NOT NULL UNIQUE REFERENCES messages(id) ON DELETE CASCADE,
                    sandbox_url TEXT NOT NULL,
                    title TEXT NOT NULL,
                    files TEXT NOT NULL DEFAULT '{}',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS workflow_runs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    event_id TEXT NOT NULL UNIQUE,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    input TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'queued',
                    attempts INTEGER NOT NULL DEFAULT 0,
                    output TEXT,
                    error TEXT,
                    started_at TEXT NOT NULL DEFAULT (datetime('now')),
                    completed_at TEXT
                );

                CREATE TABLE IF NOT EXISTS workflow_steps (
                    run_id INTEGER NOT NULL REFERENCES workflow_runs(id) ON DELETE CASCADE,
                    step_id TEXT NOT NULL,
                    output TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (run_id, step_id)
                );

                CREATE INDEX IF NOT EXISTS idx_messages_project ON messages(project_id, created_at);
                CREATE INDEX IF NOT EXISTS idx_workflow_runs_project ON workflow_runs(project_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Projects ──────────────────────────────────────────────────────

    pub fn create_project(&self, name: &str) -> Result<Project> {
        self.conn
            .execute("INSERT INTO projects (name) VALUES (?1)", params![name])
            .context("Failed to insert project")?;
        let id = self.conn.last_insert_rowid();
        self.get_project(id)?
            .context("Project not found after insert")
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at, updated_at FROM projects ORDER BY updated_at DESC, id DESC")
            .context("Failed to prepare list_projects")?;
        let rows = stmt
            .query_map([], project_from_row)
            .context("Failed to query projects")?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row.context("Failed to read project row")?);
        }
        Ok(projects)
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        self.conn
            .query_row(
                "SELECT id, name, created_at, updated_at FROM projects WHERE id = ?1",
                params![id],
                project_from_row,
            )
            .optional()
            .context("Failed to query project")
    }

    // ── Messages & fragments ──────────────────────────────────────────

    /// Insert a message, and its fragment when given, in one transaction.
    pub fn create_message(
        &self,
        project_id: i64,
        role: MessageRole,
        content: &str,
        message_type: MessageType,
        fragment: Option<&NewFragment>,
    ) -> Result<MessageWithFragment> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin message transaction")?;
        let message_id = insert_message(&tx, project_id, role, content, message_type, fragment)?;
        tx.commit().context("Failed to commit message transaction")?;
        self.message_with_fragment(message_id)
    }

    /// Insert the assistant message of a run and record it as journal step
    /// `step_id` in the same transaction.
    ///
    /// Fails, writing nothing, when the step is already recorded.
    pub fn create_message_with_step(
        &self,
        run_id: i64,
        step_id: &str,
        project_id: i64,
        content: &str,
        message_type: MessageType,
        fragment: Option<&NewFragment>,
    ) -> Result<MessageWithFragment> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin message transaction")?;
        let message_id = insert_message(
            &tx,
            project_id,
            MessageRole::Assistant,
            content,
            message_type,
            fragment,
        )?;
        let created = self.message_with_fragment(message_id)?;
        let output = serde_json::to_string(&created).context("Failed to encode stored message")?;
        tx.execute(
            "INSERT INTO workflow_steps (run_id, step_id, output) VALUES (?1, ?2, ?3)",
            params![run_id, step_id, output],
        )
        .context("Failed to save workflow step")?;
        tx.commit().context("Failed to commit message transaction")?;
        Ok(created)
    }

    fn message_with_fragment(&self, message_id: i64) -> Result<MessageWithFragment> {
        let message = self
            .get_message(message_id)?
            .context("Message not found after insert")?;
        let fragment = self.get_fragment_for_message(message_id)?;
        Ok(MessageWithFragment { message, fragment })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<Message>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, project_id, role, content, message_type, created_at, updated_at
                 FROM messages WHERE id = ?1",
                params![id],
                message_row,
            )
            .optional()
            .context("Failed to query message")?;
        row.map(MessageRow::into_message).transpose()
    }

    /// All messages of a project, oldest first, each with its fragment.
    pub fn list_messages(&self, project_id: i64) -> Result<Vec<MessageWithFragment>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, project_id, role, content, message_type, created_at, updated_at
                 FROM messages WHERE project_id = ?1 ORDER BY created_at ASC, id ASC",
            )
            .context("Failed to prepare list_messages")?;
        let rows = stmt
            .query_map(params![project_id], message_row)
            .context("Failed to query messages")?;
        let mut out = Vec::new();
        for row in rows {
            let message = row.context("Failed to read message row")?.into_message()?;
            let fragment = self.get_fragment_for_message(message.id)?;
            out.push(MessageWithFragment { message, fragment });
        }
        Ok(out)
    }

    /// The `limit` most recent messages of a project, newest first.
    pub fn recent_messages(&self, project_id: i64, limit: usize) -> Result<Vec<Message>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, project_id, role, content, message_type, created_at, updated_at
                 FROM messages WHERE project_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
            )
            .context("Failed to prepare recent_messages")?;
        let rows = stmt
            .query_map(params![project_id, limit as i64], message_row)
            .context("Failed to query recent messages")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("Failed to read message row")?.into_message()?);
        }
        Ok(out)
    }

    pub fn get_fragment_for_message(&self, message_id: i64) -> Result<Option<Fragment>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, message_id, sandbox_url, title, files, created_at, updated_at
                 FROM fragments WHERE message_id = ?1",
                params![message_id],
                |row| {
                    Ok(FragmentRow {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        sandbox_url: row.get(2)?,
                        title: row.get(3)?,
                        files: row.get(4)?,
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                },
            )
            .optional()
            .context("Failed to query fragment")?;
        row.map(FragmentRow::into_fragment).transpose()
    }

    // ── Workflow runs ─────────────────────────────────────────────────

    pub fn create_run(&self, event_id: &str, project_id: i64, input: &str) -> Result<WorkflowRun> {
        self.conn
            .execute(
                "INSERT INTO workflow_runs (event_id, project_id, input) VALUES (?1, ?2, ?3)",
                params![event_id, project_id, input],
            )
            .context("Failed to insert workflow run")?;
        let id = self.conn.last_insert_rowid();
        self.get_run(id)?.context("Workflow run not found after insert")
    }

    pub fn get_run(&self, id: i64) -> Result<Option<WorkflowRun>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, event_id, project_id, input, status, attempts, output, error, started_at, completed_at
                 FROM workflow_runs WHERE id = ?1",
                params![id],
                run_row,
            )
            .optional()
            .context("Failed to query workflow run")?;
        row.map(RunRow::into_run).transpose()
    }

    pub fn get_run_by_event_id(&self, event_id: &str) -> Result<Option<WorkflowRun>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, event_id, project_id, input, status, attempts, output, error, started_at, completed_at
                 FROM workflow_runs WHERE event_id = ?1",
                params![event_id],
                run_row,
            )
            .optional()
            .context("Failed to query workflow run by event id")?;
        row.map(RunRow::into_run).transpose()
    }

    pub fn list_runs(&self, project_id: i64) -> Result<Vec<WorkflowRun>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, event_id, project_id, input, status, attempts, output, error, started_at, completed_at
                 FROM workflow_runs WHERE project_id = ?1 ORDER BY id DESC",
            )
            .context("Failed to prepare list_runs")?;
        let rows = stmt
            .query_map(params![project_id], run_row)
            .context("Failed to query workflow runs")?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(row.context("Failed to read workflow run row")?.into_run()?);
        }
        Ok(runs)
    }

    /// Runs still `queued` or `running`, oldest first.
    pub fn list_unfinished_runs(&self) -> Result<Vec<WorkflowRun>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, event_id, project_id, input, status, attempts, output, error, started_at, completed_at
                 FROM workflow_runs WHERE status IN ('queued', 'running') ORDER BY id ASC",
            )
            .context("Failed to prepare list_unfinished_runs")?;
        let rows = stmt
            .query_map([], run_row)
            .context("Failed to query unfinished workflow runs")?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(row.context("Failed to read workflow run row")?.into_run()?);
        }
        Ok(runs)
    }

    /// Mark a run as running and count the attempt.
    pub fn start_run_attempt(&self, id: i64) -> Result<WorkflowRun> {
        self.conn
            .execute(
                "UPDATE workflow_runs SET status = 'running', attempts = attempts + 1, error = NULL, completed_at = NULL WHERE id = ?1",
                params![id],
            )
            .context("Failed to start workflow run attempt")?;
        self.get_run(id)?
            .context("Workflow run not found after update")
    }

    /// Record an attempt's error without ending the run.
    pub fn record_run_error(&self, id: i64, error: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE workflow_runs SET error = ?1 WHERE id = ?2",
                params![error, id],
            )
            .context("Failed to record workflow run error")?;
        Ok(())
    }

    pub fn complete_run(&self, id: i64, output: &WorkflowOutput) -> Result<WorkflowRun> {
        let output = serde_json::to_string(output).context("Failed to encode workflow output")?;
        self.conn
            .execute(
                "UPDATE workflow_runs SET status = 'completed', output = ?1, error = NULL, completed_at = datetime('now') WHERE id = ?2",
                params![output, id],
            )
            .context("Failed to complete workflow run")?;
        self.get_run(id)?
            .context("Workflow run not found after completion")
    }

    pub fn fail_run(&self, id: i64, error: &str) -> Result<WorkflowRun> {
        self.conn
            .execute(
                "UPDATE workflow_runs SET status = 'failed', error = ?1, completed_at = datetime('now') WHERE id = ?2",
                params![error, id],
            )
            .context("Failed to mark workflow run failed")?;
        self.get_run(id)?
            .context("Workflow run not found after failure")
    }

    // ── Step journal ──────────────────────────────────────────────────

    pub fn get_step(&self, run_id: i64, step_id: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT output FROM workflow_steps WHERE run_id = ?1 AND step_id = ?2",
                params![run_id, step_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query workflow step")
    }

    pub fn save_step(&self, run_id: i64, step_id: &str, output: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO workflow_steps (run_id, step_id, output) VALUES (?1, ?2, ?3)",
                params![run_id, step_id, output],
            )
            .context("Failed to save workflow step")?;
        Ok(())
    }

    /// Step ids recorded for a run, in insertion order.
    pub fn list_step_ids(&self, run_id: i64) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT step_id FROM workflow_steps WHERE run_id = ?1 ORDER BY rowid")
            .context("Failed to prepare list_step_ids")?;
        let rows = stmt
            .query_map(params![run_id], |row| row.get(0))
            .context("Failed to query workflow steps")?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.context("Failed to read workflow step row")?);
        }
        Ok(ids)
    }
}

fn insert_message(
    conn: &Connection,
    project_id: i64,
    role: MessageRole,
    content: &str,
    message_type: MessageType,
    fragment: Option<&NewFragment>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO messages (project_id, role, content, message_type) VALUES (?1, ?2, ?3, ?4)",
        params![project_id, role.as_str(), content, message_type.as_str()],
    )
    .context("Failed to insert message")?;
    let message_id = conn.last_insert_rowid();

    if let Some(fragment) = fragment {
        let files =
            serde_json::to_string(&fragment.files).context("Failed to encode fragment files")?;
        conn.execute(
            "INSERT INTO fragments (message_id, sandbox_url, title, files) VALUES (?1, ?2, ?3, ?4)",
            params![message_id, fragment.sandbox_url, fragment.title, files],
        )
        .context("Failed to insert fragment")?;
    }

    conn.execute(
        "UPDATE projects SET updated_at = datetime('now') WHERE id = ?1",
        params![project_id],
    )
    .context("Failed to touch project")?;
    Ok(message_id)
}

// ── Row mapping ───────────────────────────────────────────────────────

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

/// Intermediate row struct for messages.
struct MessageRow {
    id: i64,
    project_id: i64,
    role: String,
    content: String,
    message_type: String,
    created_at: String,
    updated_at: String,
}

fn message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        message_type: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl MessageRow {
    fn into_message(self) -> Result<Message> {
        let role = MessageRole::from_str(&self.role)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse message role")?;
        let message_type = MessageType::from_str(&self.message_type)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse message type")?;
        Ok(Message {
            id: self.id,
            project_id: self.project_id,
            role,
            content: self.content,
            message_type,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct FragmentRow {
    id: i64,
    message_id: i64,
    sandbox_url: String,
    title: String,
    files: String,
    created_at: String,
    updated_at: String,
}

impl FragmentRow {
    fn into_fragment(self) -> Result<Fragment> {
        let files = serde_json::from_str(&self.files).context("Failed to parse fragment files JSON")?;
        Ok(Fragment {
            id: self.id,
            message_id: self.message_id,
            sandbox_url: self.sandbox_url,
            title: self.title,
            files,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Intermediate row struct for workflow_runs.
struct RunRow {
    id: i64,
    event_id: String,
    project_id: i64,
    input: String,
    status: String,
    attempts: i32,
    output: Option<String>,
    error: Option<String>,
    started_at: String,
    completed_at: Option<String>,
}

fn run_row(row: &Row<'_>) -> rusqlite::Result<RunRow> {
    Ok(RunRow {
        id: row.get(0)?,
        event_id: row.get(1)?,
        project_id: row.get(2)?,
        input: row.get(3)?,
        status: row.get(4)?,
        attempts: row.get(5)?,
        output: row.get(6)?,
        error: row.get(7)?,
        started_at: row.get(8)?,
        completed_at: row.get(9)?,
    })
}

impl RunRow {
    fn into_run(self) -> Result<WorkflowRun> {
        let status = RunStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse workflow run status")?;
        let output = self
            .output
            .map(|o| serde_json::from_str(&o))
            .transpose()
            .context("Failed to parse workflow output JSON")?;
        Ok(WorkflowRun {
            id: self.id,
            event_id: self.event_id,
            project_id: self.project_id,
            input: self.input,
            status,
            attempts: self.attempts,
            output,
            error: self.error,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use vibe_common::FileMap;

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = VibeDb::new_in_memory()?;
        let table_count: i32 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('projects', 'messages', 'fragments', 'workflow_runs', 'workflow_steps')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(table_count, 5, "Expected 5 tables to exist");
        Ok(())
    }

    #[test]
    fn test_migrations_are_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("vibe.db");
        let db = VibeDb::new(&path)?;
        db.create_project("first")?;
        drop(db);
        let db = VibeDb::new(&path)?;
        assert_eq!(db.list_projects()?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_open_creates_parent_directories() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(".vibe").join("nested").join("vibe.db");
        VibeDb::open(&path)?;
        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn test_create_and_get_project() -> Result<()> {
        let db = VibeDb::new_in_memory()?;
        let project = db.create_project("sunny-otter")?;
        assert_eq!(project.name, "sunny-otter");
        let fetched = db.get_project(project.id)?.unwrap();
        assert_eq!(fetched.id, project.id);
        assert!(db.get_project(999)?.is_none());
        Ok(())
    }

    #[test]
    fn test_create_message_without_fragment() -> Result<()> {
        let db = VibeDb::new_in_memory()?;
        let project = db.create_project("p")?;
        let created = db.create_message(
            project.id,
            MessageRole::Assistant,
            "Something went wrong. Please try again.",
            MessageType::Error,
            None,
        )?;
        assert_eq!(created.message.message_type, MessageType::Error);
        assert!(created.fragment.is_none());
        Ok(())
    }

    #[test]
    fn test_create_message_with_fragment() -> Result<()> {
        let db = VibeDb::new_in_memory()?;
        let project = db.create_project("p")?;
        let mut files = FileMap::new();
        files.insert("app/page.tsx".into(), "export default 1".into());
        let fragment = NewFragment {
            sandbox_url: "https://3000-sbx.e2b.app".into(),
            title: "Landing Page".into(),
            files: files.clone(),
        };
        let created = db.create_message(
            project.id,
            MessageRole::Assistant,
            "Built it.",
            MessageType::Result,
            Some(&fragment),
        )?;
        let stored = created.fragment.unwrap();
        assert_eq!(stored.message_id, created.message.id);
        assert_eq!(stored.title, "Landing Page");
        assert_eq!(stored.files, files);
        Ok(())
    }

    #[test]
    fn test_create_message_rolls_back_on_missing_project() -> Result<()> {
        let db = VibeDb::new_in_memory()?;
        let result = db.create_message(42, MessageRole::User, "hi", MessageType::Result, None);
        assert!(result.is_err());
        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        assert_eq!(count, 0);
        Ok(())
    }

    fn count_messages(db: &VibeDb) -> Result<i64> {
        Ok(db
            .conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?)
    }

    #[test]
    fn test_create_message_with_step_records_both() -> Result<()> {
        let db = VibeDb::new_in_memory()?;
        let project = db.create_project("p")?;
        let run = db.create_run("evt-1", project.id, "x")?;
        let created = db.create_message_with_step(
            run.id,
            "save-result",
            project.id,
            "Built it.",
            MessageType::Result,
            Some(&NewFragment {
                sandbox_url: "https://x".into(),
                title: "T".into(),
                files: FileMap::new(),
            }),
        )?;
        assert_eq!(created.message.role, MessageRole::Assistant);
        assert!(created.fragment.is_some());

        let recorded = db.get_step(run.id, "save-result")?.unwrap();
        let replayed: MessageWithFragment = serde_json::from_str(&recorded)?;
        assert_eq!(replayed, created);
        Ok(())
    }

    #[test]
    fn test_create_message_with_step_is_written_once() -> Result<()> {
        let db = VibeDb::new_in_memory()?;
        let project = db.create_project("p")?;
        let run = db.create_run("evt-1", project.id, "x")?;
        db.create_message_with_step(run.id, "save-result", project.id, "a", MessageType::Result, None)?;
        let again = db.create_message_with_step(
            run.id,
            "save-result",
            project.id,
            "a",
            MessageType::Result,
            None,
        );
        assert!(again.is_err());
        assert_eq!(count_messages(&db)?, 1);
        Ok(())
    }

    #[test]
    fn test_create_message_with_step_rolls_back_when_journal_write_fails() -> Result<()> {
        let db = VibeDb::new_in_memory()?;
        let project = db.create_project("p")?;
        // No such run, so the journal insert violates its foreign key.
        let result =
            db.create_message_with_step(999, "save-result", project.id, "a", MessageType::Error, None);
        assert!(result.is_err());
        assert_eq!(count_messages(&db)?, 0);
        assert!(db.get_step(999, "save-result")?.is_none());
        Ok(())
    }

    #[test]
    fn test_recent_messages_newest_first_and_limited() -> Result<()> {
        let db = VibeDb::new_in_memory()?;
        let project = db.create_project("p")?;
        for i in 0..12 {
            db.create_message(
                project.id,
                MessageRole::User,
                &format!("msg {}", i),
                MessageType::Result,
                None,
            )?;
        }
        let recent = db.recent_messages(project.id, 10)?;
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].content, "msg 11");
        assert_eq!(recent[9].content, "msg 2");
        Ok(())
    }

    #[test]
    fn test_list_messages_oldest_first_with_fragments() -> Result<()> {
        let db = VibeDb::new_in_memory()?;
        let project = db.create_project("p")?;
        db.create_message(project.id, MessageRole::User, "build", MessageType::Result, None)?;
        db.create_message(
            project.id,
            MessageRole::Assistant,
            "done",
            MessageType::Result,
            Some(&NewFragment {
                sandbox_url: "https://x".into(),
                title: "T".into(),
                files: FileMap::new(),
            }),
        )?;
        let all = db.list_messages(project.id)?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].message.content, "build");
        assert!(all[0].fragment.is_none());
        assert!(all[1].fragment.is_some());
        Ok(())
    }

    #[test]
    fn test_run_lifecycle() -> Result<()> {
        let db = VibeDb::new_in_memory()?;
        let project = db.create_project("p")?;
        let run = db.create_run("evt-1", project.id, "make a page")?;
        assert_eq!(run.status, RunStatus::Queued);
        assert_eq!(run.attempts, 0);

        let run = db.start_run_attempt(run.id)?;
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.attempts, 1);

        db.record_run_error(run.id, "timeout")?;
        let run = db.start_run_attempt(run.id)?;
        assert_eq!(run.attempts, 2);
        assert!(run.error.is_none());

        let output = WorkflowOutput {
            url: "https://3000-sbx.e2b.app".into(),
            title: "Fragment".into(),
            files: FileMap::new(),
            summary: "<task_summary>ok</task_summary>".into(),
        };
        let run = db.complete_run(run.id, &output)?;
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.output, Some(output));
        assert!(run.completed_at.is_some());
        Ok(())
    }

    #[test]
    fn test_list_unfinished_runs() -> Result<()> {
        let db = VibeDb::new_in_memory()?;
        let project = db.create_project("p")?;
        let queued = db.create_run("evt-1", project.id, "a")?;
        let running = db.create_run("evt-2", project.id, "b")?;
        db.start_run_attempt(running.id)?;
        let failed = db.create_run("evt-3", project.id, "c")?;
        db.fail_run(failed.id, "boom")?;

        let ids: Vec<i64> = db.list_unfinished_runs()?.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![queued.id, running.id]);
        Ok(())
    }

    #[test]
    fn test_fail_run_records_error() -> Result<()> {
        let db = VibeDb::new_in_memory()?;
        let project = db.create_project("p")?;
        let run = db.create_run("evt-1", project.id, "x")?;
        let run = db.fail_run(run.id, "sandbox quota exceeded")?;
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("sandbox quota exceeded"));
        Ok(())
    }

    #[test]
    fn test_duplicate_event_id_is_rejected() -> Result<()> {
        let db = VibeDb::new_in_memory()?;
        let project = db.create_project("p")?;
        let run = db.create_run("evt-1", project.id, "x")?;
        assert!(db.create_run("evt-1", project.id, "x").is_err());
        assert_eq!(db.get_run_by_event_id("evt-1")?.map(|r| r.id), Some(run.id));
        assert!(db.get_run_by_event_id("evt-2")?.is_none());
        Ok(())
    }

    #[test]
    fn test_step_journal_round_trip() -> Result<()> {
        let db = VibeDb::new_in_memory()?;
        let project = db.create_project("p")?;
        let run = db.create_run("evt-1", project.id, "x")?;
        assert!(db.get_step(run.id, "get-sandbox-id")?.is_none());
        db.save_step(run.id, "get-sandbox-id", "\"sbx-1\"")?;
        db.save_step(run.id, "terminal", "\"ok\"")?;
        assert_eq!(db.get_step(run.id, "get-sandbox-id")?.as_deref(), Some("\"sbx-1\""));
        assert_eq!(db.list_step_ids(run.id)?, vec!["get-sandbox-id", "terminal"]);
        Ok(())
    }
}
