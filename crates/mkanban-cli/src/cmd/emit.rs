use anyhow::Context;
use mkanban_core::event::{ColumnEvent, EventData, EventPayload, EventType, GitEventData};
use mkanban_engine::daemon::{DaemonTask, EventListenerTask};
use std::collections::HashMap;
use std::path::Path;

use super::block_on;
use crate::host::open_runtime;
use crate::output::print_json;

pub struct EmitArgs {
    pub event: String,
    pub board: Option<String>,
    pub task: Option<String>,
    pub column: Option<String>,
    pub title: Option<String>,
    pub branch: Option<String>,
}

fn payload_for(event: EventType, args: &EmitArgs) -> anyhow::Result<EventPayload> {
    let name = event.as_str();
    let board = || args.board.as_deref().with_context(|| format!("{name} needs --board"));
    let payload = if name.starts_with("task_") {
        let task = args.task.as_deref().with_context(|| format!("{name} needs --task"))?;
        let title = args.title.as_deref().unwrap_or(task);
        EventPayload::task(task, title, board()?, args.column.as_deref().unwrap_or(""))
    } else if name.starts_with("board_") {
        let board = board()?;
        EventPayload::board(board, args.title.as_deref().unwrap_or(board))
    } else if name.starts_with("column_") {
        let column = args.column.as_deref().with_context(|| format!("{name} needs --column"))?;
        EventPayload::new(EventData::Column(ColumnEvent {
            column_id: column.to_string(),
            column_name: args.title.clone().unwrap_or_else(|| column.to_string()),
            board_id: board()?.to_string(),
        }))
    } else if name.starts_with("git_") {
        let branch = args.branch.as_deref().with_context(|| format!("{name} needs --branch"))?;
        EventPayload::new(EventData::Git(GitEventData {
            branch_name: branch.to_string(),
            repository_path: None,
            commit_hash: None,
        }))
    } else {
        EventPayload::system()
    };
    Ok(payload.with_source("cli"))
}

pub fn run(root: &Path, args: EmitArgs, json: bool) -> anyhow::Result<()> {
    let event: EventType = args.event.parse()?;
    let payload = payload_for(event, &args)?;
    let runtime = open_runtime(root)?;

    let before: HashMap<String, u64> = runtime
        .service()
        .get_all_actions(&Default::default())?
        .into_iter()
        .map(|a| (a.id, a.execution.total_executions))
        .collect();

    let listener = runtime
        .runner()
        .get_task(EventListenerTask::NAME)
        .context("event listener is not registered")?;
    block_on(async {
        listener.start().await?;
        runtime.bus().publish(event, payload).await;
        runtime.engine().wait_idle().await;
        listener.stop();
        runtime.engine().cancel_pending_retries();
        Ok::<_, mkanban_core::MkanbanError>(())
    })??;

    let ran: Vec<_> = runtime
        .service()
        .get_all_actions(&Default::default())?
        .into_iter()
        .filter(|a| before.get(&a.id).copied().unwrap_or(0) < a.execution.total_executions)
        .collect();

    if json {
        let ran: Vec<_> = ran
            .iter()
            .map(|a| {
                serde_json::json!({
                    "id": a.id,
                    "name": a.name,
                    "success": a.execution.consecutive_failures == 0,
                })
            })
            .collect();
        print_json(&serde_json::json!({ "event": event, "ran": ran }))?;
    } else if ran.is_empty() {
        println!("{event}: no actions triggered");
    } else {
        println!("{event}: ran {} action(s)", ran.len());
        for a in &ran {
            let status = if a.execution.consecutive_failures == 0 { "ok" } else { "failed" };
            println!("  {} ({}) {status}", a.name, a.id);
        }
    }
    Ok(())
}
