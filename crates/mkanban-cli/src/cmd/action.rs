use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use mkanban_core::action::{Action, ActionUpdate, NewAction};
use mkanban_core::config::is_snooze_token;
use mkanban_core::evaluator::TimeTriggerEvaluator;
use mkanban_core::store::ActionFilter;
use mkanban_core::types::{ActionType, ScopeType};
use std::path::{Path, PathBuf};

use super::block_on;
use crate::host::open_service;
use crate::output::{opt_time, print_json, print_table};

#[derive(Subcommand)]
pub enum ActionSubcommand {
    /// List actions, oldest first
    List {
        /// reminder, automation, watcher, hook or scheduled_job
        #[arg(long = "type", value_name = "TYPE")]
        action_type: Option<ActionType>,
        /// global, board or task
        #[arg(long)]
        scope: Option<ScopeType>,
        /// Board or task id the action is scoped to
        #[arg(long)]
        target: Option<String>,
        #[arg(long)]
        enabled: Option<bool>,
        /// Only actions carrying this tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Show one action in full
    Show { id: String },
    /// Create an action from a YAML file
    Create {
        #[arg(long)]
        file: PathBuf,
    },
    /// Apply a partial YAML update to an action
    Update {
        id: String,
        #[arg(long)]
        file: PathBuf,
    },
    Enable { id: String },
    Disable { id: String },
    Delete { id: String },
    /// Snooze an action: 10m, 1h, 2d, tomorrow or next_week
    Snooze { id: String, duration: String },
    Unsnooze { id: String },
    /// List board-scoped actions whose board no longer exists
    Orphans,
    /// Apply the configured orphan policy now
    Clean,
}

pub fn run(root: &Path, subcmd: ActionSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ActionSubcommand::List {
            action_type,
            scope,
            target,
            enabled,
            tags,
        } => list(
            root,
            ActionFilter {
                action_type,
                scope_type: scope,
                target_id: target,
                enabled,
                tags,
            },
            json,
        ),
        ActionSubcommand::Show { id } => show(root, &id, json),
        ActionSubcommand::Create { file } => create(root, &file, json),
        ActionSubcommand::Update { id, file } => update(root, &id, &file, json),
        ActionSubcommand::Enable { id } => set_enabled(root, &id, true, json),
        ActionSubcommand::Disable { id } => set_enabled(root, &id, false, json),
        ActionSubcommand::Delete { id } => delete(root, &id, json),
        ActionSubcommand::Snooze { id, duration } => snooze(root, &id, &duration, json),
        ActionSubcommand::Unsnooze { id } => unsnooze(root, &id, json),
        ActionSubcommand::Orphans => orphans(root, json),
        ActionSubcommand::Clean => clean(root, json),
    }
}

fn scope_label(action: &Action) -> String {
    match action.scope.target_id.as_deref() {
        Some(target) => format!("{}:{target}", action.scope.scope_type),
        None => action.scope.scope_type.to_string(),
    }
}

fn status_label(action: &Action) -> &'static str {
    if !action.enabled {
        "disabled"
    } else if action.is_snoozed(Utc::now()) {
        "snoozed"
    } else {
        "enabled"
    }
}

fn print_actions(actions: &[Action]) {
    let rows = actions
        .iter()
        .map(|a| {
            vec![
                a.id.clone(),
                a.name.clone(),
                a.action_type.to_string(),
                scope_label(a),
                status_label(a).to_string(),
                opt_time(a.execution.last_triggered),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "TYPE", "SCOPE", "STATUS", "LAST RUN"], rows);
}

fn list(root: &Path, filter: ActionFilter, json: bool) -> anyhow::Result<()> {
    let service = open_service(root)?;
    let actions = service.get_all_actions(&filter)?;
    if json {
        print_json(&actions)?;
    } else if actions.is_empty() {
        println!("No actions.");
    } else {
        print_actions(&actions);
    }
    Ok(())
}

fn show(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let service = open_service(root)?;
    let action = service
        .get_action_by_id(id)?
        .with_context(|| format!("action '{id}' not found"))?;
    let next = TimeTriggerEvaluator::new().get_next_trigger_time(&action, service.now());

    if json {
        let mut value = serde_json::to_value(&action)?;
        value["next_trigger"] = serde_json::to_value(next)?;
        print_json(&value)?;
        return Ok(());
    }

    println!("{} ({})", action.name, action.id);
    println!("  type:       {}", action.action_type);
    println!("  scope:      {}", scope_label(&action));
    println!("  status:     {}", status_label(&action));
    if let Some(until) = action.snooze.until.filter(|_| action.snooze.enabled) {
        println!("  snoozed to: {}", crate::output::local_time(until));
    }
    if let Some(desc) = &action.description {
        println!("  about:      {desc}");
    }
    println!("  triggers:   {}", action.triggers.len());
    println!(
        "  executors:  {}",
        action
            .executors
            .iter()
            .map(|e| e.kind().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  next:       {}", opt_time(next));
    println!("  last run:   {}", opt_time(action.execution.last_triggered));
    println!(
        "  runs:       {} ({} ok, {} consecutive failures)",
        action.execution.total_executions,
        action.execution.successful_executions,
        action.execution.consecutive_failures
    );
    if let Some(err) = &action.execution.last_error {
        println!("  last error: {err}");
    }
    Ok(())
}

fn read_yaml_file<T: serde::de::DeserializeOwned>(file: &Path) -> anyhow::Result<T> {
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    serde_yaml::from_str(&data).with_context(|| format!("failed to parse {}", file.display()))
}

fn create(root: &Path, file: &Path, json: bool) -> anyhow::Result<()> {
    let input: NewAction = read_yaml_file(file)?;
    let service = open_service(root)?;
    let action = service.create_action(input)?;
    if json {
        print_json(&action)?;
    } else {
        println!("Created action {}: {}", action.id, action.name);
    }
    Ok(())
}

fn update(root: &Path, id: &str, file: &Path, json: bool) -> anyhow::Result<()> {
    let patch: ActionUpdate = read_yaml_file(file)?;
    let service = open_service(root)?;
    let action = service.update_action(id, patch)?;
    if json {
        print_json(&action)?;
    } else {
        println!("Updated action {}", action.id);
    }
    Ok(())
}

fn set_enabled(root: &Path, id: &str, enabled: bool, json: bool) -> anyhow::Result<()> {
    let service = open_service(root)?;
    let action = if enabled {
        service.enable_action(id)?
    } else {
        service.disable_action(id)?
    };
    if json {
        print_json(&serde_json::json!({ "id": action.id, "enabled": action.enabled }))?;
    } else {
        let verb = if enabled { "Enabled" } else { "Disabled" };
        println!("{verb} action {}", action.id);
    }
    Ok(())
}

fn delete(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let service = open_service(root)?;
    if !service.delete_action(id)? {
        anyhow::bail!("action '{id}' not found");
    }
    if json {
        print_json(&serde_json::json!({ "id": id, "deleted": true }))?;
    } else {
        println!("Deleted action {id}");
    }
    Ok(())
}

fn snooze(root: &Path, id: &str, duration: &str, json: bool) -> anyhow::Result<()> {
    if !is_snooze_token(duration) {
        eprintln!("warning: '{duration}' is not a known snooze duration, using 1h");
    }
    let service = open_service(root)?;
    let action = service.snooze_action(id, duration)?;
    let until = action.snooze.until;
    if json {
        print_json(&serde_json::json!({
            "id": action.id,
            "until": until,
            "count": action.snooze.count,
        }))?;
    } else {
        println!("Snoozed {} until {}", action.id, opt_time(until));
    }
    Ok(())
}

fn unsnooze(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let service = open_service(root)?;
    let action = service.unsnooze_action(id)?;
    if json {
        print_json(&serde_json::json!({ "id": action.id, "snoozed": false }))?;
    } else {
        println!("Unsnoozed {}", action.id);
    }
    Ok(())
}

fn orphans(root: &Path, json: bool) -> anyhow::Result<()> {
    let service = open_service(root)?;
    let orphaned = block_on(service.get_orphaned_actions())??;
    if json {
        print_json(&orphaned)?;
    } else if orphaned.is_empty() {
        println!("No orphaned actions.");
    } else {
        print_actions(&orphaned);
    }
    Ok(())
}

fn clean(root: &Path, json: bool) -> anyhow::Result<()> {
    let service = open_service(root)?;
    let policy = service.config().get().orphan_action;
    let cleaned = block_on(service.clean_orphaned_actions())??;
    if json {
        print_json(&serde_json::json!({ "policy": policy, "cleaned": cleaned }))?;
    } else {
        println!("Orphan policy {policy}: {cleaned} action(s) cleaned");
    }
    Ok(())
}
