use clap::Subcommand;
use mkanban_core::missed::MissedAction;
use std::path::Path;

use super::block_on;
use crate::host::open_runtime;
use crate::output::{local_time, print_json, print_table};

#[derive(Subcommand)]
pub enum MissedSubcommand {
    /// Record fires scheduled since the last check
    Check,
    /// List recorded missed actions within the retention window
    List,
    /// Forget one missed action, or all of them
    Clear { id: Option<String> },
    /// Run a missed action now and forget it
    Run { id: String },
}

pub fn run(root: &Path, subcmd: MissedSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        MissedSubcommand::Check => check(root, json),
        MissedSubcommand::List => list(root, json),
        MissedSubcommand::Clear { id } => clear(root, id.as_deref(), json),
        MissedSubcommand::Run { id } => run_missed(root, &id, json),
    }
}

fn print_missed(entries: &[MissedAction]) {
    let rows = entries
        .iter()
        .map(|m| {
            vec![
                m.action_id.clone(),
                m.action_name.clone(),
                local_time(m.scheduled_time),
                m.message.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["ACTION", "NAME", "SCHEDULED", "MESSAGE"], rows);
}

fn check(root: &Path, json: bool) -> anyhow::Result<()> {
    let runtime = open_runtime(root)?;
    let found = runtime.missed().check_for_missed_actions()?;
    if json {
        print_json(&found)?;
    } else if found.is_empty() {
        println!("No new missed actions.");
    } else {
        println!("Found {} missed action(s):", found.len());
        print_missed(&found);
    }
    Ok(())
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let runtime = open_runtime(root)?;
    let entries = runtime.missed().get_missed_actions()?;
    if json {
        print_json(&entries)?;
    } else if entries.is_empty() {
        println!("No missed actions.");
    } else {
        print_missed(&entries);
    }
    Ok(())
}

fn clear(root: &Path, id: Option<&str>, json: bool) -> anyhow::Result<()> {
    let runtime = open_runtime(root)?;
    let missed = runtime.missed();
    let cleared = match id {
        Some(id) => {
            if !missed.clear_missed_action(id)? {
                anyhow::bail!("no missed action recorded for '{id}'");
            }
            1
        }
        None => {
            let count = missed.get_missed_actions_count()?;
            missed.clear_all_missed_actions()?;
            count
        }
    };
    if json {
        print_json(&serde_json::json!({ "cleared": cleared }))?;
    } else {
        println!("Cleared {cleared} missed action(s)");
    }
    Ok(())
}

fn run_missed(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let runtime = open_runtime(root)?;
    let ran = block_on(async {
        let ran = runtime.missed().execute_missed_action(id)?;
        runtime.engine().wait_idle().await;
        Ok::<_, mkanban_core::MkanbanError>(ran)
    })??;
    if !ran {
        anyhow::bail!("action '{id}' no longer exists");
    }
    let action = runtime.service().get_action_by_id(id)?;
    let success = action
        .as_ref()
        .map(|a| a.execution.consecutive_failures == 0)
        .unwrap_or(false);
    if json {
        print_json(&serde_json::json!({ "id": id, "ran": true, "success": success }))?;
    } else if success {
        println!("Ran missed action {id}");
    } else {
        println!("Ran missed action {id}, but it failed");
    }
    Ok(())
}
