//! redb-backed action store.
//!
//! A single `actions` table maps the action id to its JSON encoding. Every
//! mutation runs in its own write transaction, so `create` and `update` check
//! existence and write atomically.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use super::{ActionFilter, ActionStore};
use crate::action::Action;
use crate::error::{MkanbanError, Result};

const ACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("actions");

fn store_err(e: impl std::fmt::Display) -> MkanbanError {
    MkanbanError::Store(e.to_string())
}

pub struct ActionDb {
    db: Database,
}

impl ActionDb {
    /// Open or create the database at `path`, creating the table if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(ACTIONS).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    fn put(&self, action: &Action, must_exist: bool) -> Result<()> {
        let value = serde_json::to_vec(action)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(ACTIONS).map_err(store_err)?;
            let present = table
                .get(action.id.as_str())
                .map_err(store_err)?
                .is_some();
            match (must_exist, present) {
                (true, false) => return Err(MkanbanError::ActionNotFound(action.id.clone())),
                (false, true) => return Err(MkanbanError::ActionExists(action.id.clone())),
                _ => {}
            }
            table
                .insert(action.id.as_str(), value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }
}

impl ActionStore for ActionDb {
    fn get_all(&self, filter: &ActionFilter) -> Result<Vec<Action>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ACTIONS).map_err(store_err)?;

        let mut result = Vec::new();
        for entry in table.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            let action: Action = serde_json::from_slice(v.value()).map_err(store_err)?;
            if filter.matches(&action) {
                result.push(action);
            }
        }
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(result)
    }

    fn get_by_id(&self, id: &str) -> Result<Option<Action>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ACTIONS).map_err(store_err)?;
        let Some(v) = table.get(id).map_err(store_err)? else {
            return Ok(None);
        };
        let action = serde_json::from_slice(v.value()).map_err(store_err)?;
        Ok(Some(action))
    }

    fn create(&self, action: &Action) -> Result<()> {
        self.put(action, false)
    }

    fn update(&self, action: &Action) -> Result<()> {
        self.put(action, true)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let wt = self.db.begin_write().map_err(store_err)?;
        let removed = {
            let mut table = wt.open_table(ACTIONS).map_err(store_err)?;
            let removed = table.remove(id).map_err(store_err)?;
            removed.is_some()
        };
        wt.commit().map_err(store_err)?;
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::tests::sample_action;
    use crate::action::ActionScope;
    use crate::types::ScopeType;
    use chrono::Duration;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, ActionDb) {
        let dir = TempDir::new().unwrap();
        let db = ActionDb::open(&dir.path().join("actions.redb")).unwrap();
        (dir, db)
    }

    #[test]
    fn create_get_update_delete() {
        let (_dir, db) = open_tmp();
        let mut a = sample_action();
        db.create(&a).unwrap();
        assert!(matches!(db.create(&a), Err(MkanbanError::ActionExists(_))));

        a.execution.total_executions = 4;
        db.update(&a).unwrap();
        let back = db.get_by_id(&a.id).unwrap().unwrap();
        assert_eq!(back, a);

        assert!(db.delete(&a.id).unwrap());
        assert!(db.get_by_id(&a.id).unwrap().is_none());
        assert!(!db.delete(&a.id).unwrap());
    }

    #[test]
    fn update_unknown_is_not_found() {
        let (_dir, db) = open_tmp();
        assert!(matches!(
            db.update(&sample_action()),
            Err(MkanbanError::ActionNotFound(_))
        ));
    }

    #[test]
    fn get_all_sorted_oldest_first_and_filtered() {
        let (_dir, db) = open_tmp();
        let mut newer = sample_action();
        newer.id = "a-newer".into();
        let mut older = sample_action();
        older.id = "z-older".into();
        older.created_at = newer.created_at - Duration::hours(1);
        older.scope = ActionScope::board("work");
        db.create(&newer).unwrap();
        db.create(&older).unwrap();

        let all = db.get_all(&ActionFilter::default()).unwrap();
        assert_eq!(all[0].id, "z-older");
        assert_eq!(all[1].id, "a-newer");

        let boards = db.get_by_scope(ScopeType::Board, Some("work")).unwrap();
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].id, "z-older");
    }

    #[test]
    fn reopen_keeps_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/actions.redb");
        {
            let db = ActionDb::open(&path).unwrap();
            db.create(&sample_action()).unwrap();
        }
        let db = ActionDb::open(&path).unwrap();
        assert!(db.exists("a-standup").unwrap());
    }
}
