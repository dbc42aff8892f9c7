//! StateStore — redb-backed persistence for task records and statuses.
//!
//! Supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use berth_core::{TaskRecord, TaskStatus};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::task_store::TaskStore;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe task store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "task store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory task store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(TASKS).map_err(map_err!(Table))?;
        txn.open_table(STATUSES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Remove a task record and its status. Returns true if the record existed.
    pub fn delete_task(&self, name: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut tasks = txn.open_table(TASKS).map_err(map_err!(Table))?;
            existed = tasks.remove(name).map_err(map_err!(Write))?.is_some();
            let mut statuses = txn.open_table(STATUSES).map_err(map_err!(Table))?;
            statuses.remove(name).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%name, existed, "task deleted");
        Ok(existed)
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn get<T: DeserializeOwned>(
        &self,
        table: JsonTable,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn put_all<'a, T: Serialize + 'a>(
        &self,
        table: JsonTable,
        entries: impl IntoIterator<Item = (&'a str, &'a T)>,
    ) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            for (key, value) in entries {
                let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
                table
                    .insert(key, bytes.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

impl TaskStore for StateStore {
    fn fetch_tasks(&self) -> StateResult<Vec<TaskRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TASKS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let task: TaskRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(task);
        }
        Ok(results)
    }

    fn fetch_task(&self, name: &str) -> StateResult<Option<TaskRecord>> {
        self.get(TASKS, name)
    }

    fn fetch_status(&self, name: &str) -> StateResult<Option<TaskStatus>> {
        self.get(STATUSES, name)
    }

    fn store_tasks(&self, tasks: &[TaskRecord]) -> StateResult<()> {
        self.put_all(TASKS, tasks.iter().map(|t| (t.name.as_str(), t)))?;
        debug!(count = tasks.len(), "tasks stored");
        Ok(())
    }

    fn store_status(&self, name: &str, status: &TaskStatus) -> StateResult<()> {
        if self.fetch_task(name)?.is_none() {
            return Err(StateError::NotFound(format!("task {name}")));
        }
        self.put_all(STATUSES, [(name, status)])?;
        debug!(%name, state = %status.state, "task status stored");
        Ok(())
    }
}
