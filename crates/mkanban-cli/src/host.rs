//! Local adapters that let the engine run against a `.mkanban/` directory.
//!
//! Boards live under `.mkanban/boards/<board>/`, one directory per column and
//! one YAML file per task. An optional `board.yaml` names the board and fixes
//! its column order; without it the column directories are used.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use mkanban_core::board::{Board, NewTask, Task};
use mkanban_core::config::ActionsConfig;
use mkanban_core::missed::FileMissedActionLog;
use mkanban_core::store::ActionDb;
use mkanban_core::{io, paths, MkanbanError, Result};
use mkanban_engine::clock::SystemClock;
use mkanban_engine::ports::{BoardLookup, Notification, NotificationPort, TaskMutationPort};
use mkanban_engine::{ActionService, ActionsRuntime, RuntimeDeps, SharedConfig};

// ---------------------------------------------------------------------------
// Board directory store
// ---------------------------------------------------------------------------

pub struct DirBoards {
    root: PathBuf,
}

impl DirBoards {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn load_board(&self, board_id: &str) -> Result<Option<Board>> {
        if paths::validate_id(board_id).is_err() {
            return Ok(None);
        }
        let dir = paths::board_dir(&self.root, board_id);
        if !dir.is_dir() {
            return Ok(None);
        }
        if let Some(board) = io::read_yaml::<Board>(&paths::board_manifest(&self.root, board_id))? {
            return Ok(Some(board));
        }
        Ok(Some(Board {
            id: board_id.to_string(),
            name: board_id.to_string(),
            columns: column_dirs(&dir)?,
        }))
    }

    fn read_task(&self, board_id: &str, column_id: &str, task_id: &str) -> Result<Option<Task>> {
        let path = paths::task_path(&self.root, board_id, column_id, task_id);
        let task: Option<Task> = io::read_yaml(&path)?;
        Ok(task.map(|mut t| {
            t.id = task_id.to_string();
            t.column_id = column_id.to_string();
            t
        }))
    }

    fn find_task(&self, board_id: &str, column_id: &str, task_id: &str) -> Result<Option<Task>> {
        if paths::validate_id(task_id).is_err() {
            return Ok(None);
        }
        let Some(board) = self.load_board(board_id)? else {
            return Ok(None);
        };
        if paths::validate_id(column_id).is_ok() {
            if let Some(task) = self.read_task(board_id, column_id, task_id)? {
                return Ok(Some(task));
            }
        }
        for column in board.columns.iter().filter(|c| paths::validate_id(c).is_ok()) {
            if let Some(task) = self.read_task(board_id, column, task_id)? {
                return Ok(Some(task));
            }
        }
        Ok(None)
    }

    fn unique_task_id(&self, board_id: &str, title: &str) -> Result<String> {
        let base = match paths::slugify(title, 40) {
            s if s.is_empty() => "task".to_string(),
            s => s,
        };
        let board_dir = paths::board_dir(&self.root, board_id);
        let columns = column_dirs(&board_dir)?;
        let taken = |id: &str| {
            columns
                .iter()
                .any(|c| paths::task_path(&self.root, board_id, c, id).exists())
        };
        if !taken(&base) {
            return Ok(base);
        }
        let id = (2..)
            .map(|n| format!("{base}-{n}"))
            .find(|id| !taken(id))
            .unwrap_or(base);
        Ok(id)
    }
}

/// Column directory names, sorted.
fn column_dirs(board_dir: &Path) -> Result<Vec<String>> {
    if !board_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut columns = Vec::new();
    for entry in std::fs::read_dir(board_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            columns.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    columns.sort();
    Ok(columns)
}

#[async_trait]
impl BoardLookup for DirBoards {
    async fn get_board(&self, board_id: &str) -> Result<Option<Board>> {
        self.load_board(board_id)
    }
}

#[async_trait]
impl TaskMutationPort for DirBoards {
    async fn get_task(&self, board_id: &str, column_id: &str, task_id: &str) -> Result<Option<Task>> {
        self.find_task(board_id, column_id, task_id)
    }

    async fn move_task(
        &self,
        board_id: &str,
        task: &Task,
        from_column: &str,
        to_column: &str,
    ) -> Result<bool> {
        paths::validate_id(to_column)?;
        let src = paths::task_path(&self.root, board_id, from_column, &task.id);
        if !src.exists() {
            return Ok(false);
        }
        if from_column == to_column {
            return Ok(true);
        }
        let moved = Task {
            column_id: to_column.to_string(),
            modified_at: Utc::now(),
            ..task.clone()
        };
        io::write_yaml(&paths::task_path(&self.root, board_id, to_column, &task.id), &moved)?;
        std::fs::remove_file(&src)?;
        debug!(board = board_id, task = %task.id, from = from_column, to = to_column, "moved task");
        Ok(true)
    }

    async fn create_task(&self, board_id: &str, column_id: &str, input: NewTask) -> Result<Option<Task>> {
        if self.load_board(board_id)?.is_none() {
            return Ok(None);
        }
        paths::validate_id(column_id)?;
        let id = self.unique_task_id(board_id, &input.title)?;
        let now = Utc::now();
        let task = Task {
            id: id.clone(),
            title: input.title,
            description: input.description,
            column_id: column_id.to_string(),
            created_at: now,
            modified_at: now,
        };
        io::write_yaml(&paths::task_path(&self.root, board_id, column_id, &id), &task)?;
        Ok(Some(task))
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Prints notifications to stdout and the log.
pub struct ConsoleNotifier {
    enabled: bool,
    sent: AtomicU64,
}

impl ConsoleNotifier {
    pub fn new(config: &ActionsConfig) -> Self {
        Self {
            enabled: config.notifications.system.enabled,
            sent: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl NotificationPort for ConsoleNotifier {
    async fn send(&self, n: Notification) -> Result<Option<String>> {
        if !self.enabled {
            debug!(title = %n.title, "system notifications disabled, dropping");
            return Ok(None);
        }
        let seq = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
        info!(title = %n.title, priority = ?n.priority, "notification");
        println!("[{}] {}: {}", format!("{:?}", n.priority).to_lowercase(), n.title, n.message);
        Ok(Some(format!("console-{seq}")))
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn require_init(root: &Path) -> anyhow::Result<()> {
    if !paths::mkanban_dir(root).is_dir() {
        return Err(MkanbanError::NotInitialized.into());
    }
    Ok(())
}

pub fn load_config(root: &Path) -> anyhow::Result<ActionsConfig> {
    ActionsConfig::load(root).context("failed to load config")
}

fn open_db(root: &Path) -> anyhow::Result<Arc<ActionDb>> {
    let path = paths::actions_db_path(root);
    let db = ActionDb::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(Arc::new(db))
}

/// Service over the local store, for commands that don't need the engine.
pub fn open_service(root: &Path) -> anyhow::Result<ActionService> {
    require_init(root)?;
    let config = load_config(root)?;
    Ok(ActionService::new(
        open_db(root)?,
        Arc::new(DirBoards::new(root)),
        SharedConfig::new(config),
        Arc::new(SystemClock),
    ))
}

/// Full runtime over the local store and board directories. Not started.
pub fn open_runtime(root: &Path) -> anyhow::Result<ActionsRuntime> {
    require_init(root)?;
    let config = load_config(root)?;
    let boards = Arc::new(DirBoards::new(root));
    Ok(ActionsRuntime::new(RuntimeDeps {
        store: open_db(root)?,
        boards: boards.clone(),
        tasks: boards,
        notifier: Arc::new(ConsoleNotifier::new(&config)),
        missed_log: Arc::new(FileMissedActionLog::new(paths::missed_actions_path(root))),
        config,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn board_with_task(root: &Path) {
        let task = Task {
            id: "write-docs".into(),
            title: "Write docs".into(),
            description: None,
            column_id: "todo".into(),
            created_at: Utc::now(),
            modified_at: Utc::now(),
        };
        io::write_yaml(&paths::task_path(root, "work", "todo", "write-docs"), &task).unwrap();
        io::ensure_dir(&paths::column_dir(root, "work", "done")).unwrap();
    }

    #[tokio::test]
    async fn board_without_manifest_uses_column_dirs() {
        let dir = TempDir::new().unwrap();
        board_with_task(dir.path());
        let boards = DirBoards::new(dir.path());

        let board = boards.get_board("work").await.unwrap().unwrap();
        assert_eq!(board.columns, vec!["done".to_string(), "todo".to_string()]);
        assert!(boards.get_board("home").await.unwrap().is_none());
        assert!(boards.get_board("../etc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn task_is_found_without_its_column() {
        let dir = TempDir::new().unwrap();
        board_with_task(dir.path());
        let boards = DirBoards::new(dir.path());

        let task = boards.get_task("work", "", "write-docs").await.unwrap().unwrap();
        assert_eq!(task.column_id, "todo");
        assert!(boards.get_task("work", "done", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn move_task_relocates_the_file() {
        let dir = TempDir::new().unwrap();
        board_with_task(dir.path());
        let boards = DirBoards::new(dir.path());
        let task = boards.get_task("work", "todo", "write-docs").await.unwrap().unwrap();

        assert!(boards.move_task("work", &task, "todo", "done").await.unwrap());
        assert!(!paths::task_path(dir.path(), "work", "todo", "write-docs").exists());
        let moved = boards.get_task("work", "done", "write-docs").await.unwrap().unwrap();
        assert_eq!(moved.column_id, "done");

        // the source is gone now
        assert!(!boards.move_task("work", &task, "todo", "done").await.unwrap());
    }

    #[tokio::test]
    async fn create_task_picks_a_free_id() {
        let dir = TempDir::new().unwrap();
        board_with_task(dir.path());
        let boards = DirBoards::new(dir.path());
        let input = || NewTask {
            title: "Write docs".into(),
            description: Some("again".into()),
        };

        let created = boards.create_task("work", "todo", input()).await.unwrap().unwrap();
        assert_eq!(created.id, "write-docs-2");
        assert!(paths::task_path(dir.path(), "work", "todo", "write-docs-2").exists());
        assert!(boards.create_task("nope", "todo", input()).await.unwrap().is_none());
    }
}
