use std::path::Path;
use tracing::info;

use crate::host::open_runtime;

/// Hosts the runtime in the foreground until Ctrl-C.
pub fn run(root: &Path) -> anyhow::Result<()> {
    let runtime = open_runtime(root)?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async move {
        runtime.init().await?;
        let status = runtime.runner().get_status();
        let pending = runtime.missed().get_missed_actions_count()?;
        println!(
            "mkanban daemon running: {} task(s) active [{}]  (PID {})",
            status.active_tasks.len(),
            status.active_tasks.join(", "),
            std::process::id()
        );
        if pending > 0 {
            println!("{pending} missed action(s) waiting, see `mkanban missed list`");
        }

        tokio::signal::ctrl_c().await?;
        info!("interrupt received, shutting down");
        runtime.shutdown().await;
        Ok(())
    })
}
