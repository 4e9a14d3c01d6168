pub mod action;
pub mod config;
pub mod daemon;
pub mod emit;
pub mod init;
pub mod missed;

/// Commands are synchronous; the ones that drive the engine block on this.
pub(crate) fn block_on<F: std::future::Future>(fut: F) -> anyhow::Result<F::Output> {
    let rt = tokio::runtime::Runtime::new()?;
    Ok(rt.block_on(fut))
}
