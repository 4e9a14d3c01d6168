use anyhow::Context;
use mkanban_core::config::ActionsConfig;
use mkanban_core::store::ActionDb;
use mkanban_core::{io, paths};
use std::path::Path;

use crate::output::print_json;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    if !json {
        println!("Initializing mkanban in: {}", root.display());
    }

    for dir in [paths::MKANBAN_DIR, paths::BOARDS_DIR] {
        let p = root.join(dir);
        io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    let mut created = Vec::new();

    let config_path = paths::config_path(root);
    if !config_path.exists() {
        ActionsConfig::default()
            .save(root)
            .context("failed to write config.yaml")?;
        created.push(paths::CONFIG_FILE);
    }

    let db_path = paths::actions_db_path(root);
    if !db_path.exists() {
        ActionDb::open(&db_path).context("failed to create action database")?;
        created.push(paths::ACTIONS_DB);
    }

    if json {
        print_json(&serde_json::json!({
            "root": root.display().to_string(),
            "created": created,
        }))?;
    } else {
        for file in [paths::CONFIG_FILE, paths::ACTIONS_DB] {
            let verb = if created.contains(&file) { "created:" } else { "exists: " };
            println!("  {verb} {file}");
        }
    }
    Ok(())
}
