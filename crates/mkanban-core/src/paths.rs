use crate::error::{MkanbanError, Result};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const MKANBAN_DIR: &str = ".mkanban";
pub const BOARDS_DIR: &str = ".mkanban/boards";

pub const CONFIG_FILE: &str = ".mkanban/config.yaml";
pub const ACTIONS_DB: &str = ".mkanban/actions.redb";
pub const MISSED_ACTIONS_FILE: &str = ".mkanban/missed_actions.yaml";

pub const BOARD_MANIFEST: &str = "board.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn mkanban_dir(root: &Path) -> PathBuf {
    root.join(MKANBAN_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn actions_db_path(root: &Path) -> PathBuf {
    root.join(ACTIONS_DB)
}

pub fn missed_actions_path(root: &Path) -> PathBuf {
    root.join(MISSED_ACTIONS_FILE)
}

pub fn boards_dir(root: &Path) -> PathBuf {
    root.join(BOARDS_DIR)
}

pub fn board_dir(root: &Path, board_id: &str) -> PathBuf {
    boards_dir(root).join(board_id)
}

pub fn board_manifest(root: &Path, board_id: &str) -> PathBuf {
    board_dir(root, board_id).join(BOARD_MANIFEST)
}

pub fn column_dir(root: &Path, board_id: &str, column_id: &str) -> PathBuf {
    board_dir(root, board_id).join(column_id)
}

pub fn task_path(root: &Path, board_id: &str, column_id: &str, task_id: &str) -> PathBuf {
    column_dir(root, board_id, column_id).join(format!("{task_id}.yaml"))
}

// ---------------------------------------------------------------------------
// Id validation
// ---------------------------------------------------------------------------

/// Board, column and task ids become path components, so they are limited to
/// lowercase ascii, digits, `-` and `_`.
pub fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= 96
        && !id.starts_with('-')
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if !valid {
        return Err(MkanbanError::Validation(format!("invalid id '{id}'")));
    }
    Ok(())
}

/// Lowercase, collapse non-alphanumerics to single dashes, cap at `max` chars.
pub fn slugify(input: &str, max: usize) -> String {
    let mut out = String::new();
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    out.truncate(max);
    out.trim_end_matches('-').to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
