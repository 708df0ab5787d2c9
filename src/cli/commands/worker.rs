//! The hidden `worker` command run by each slot of the process pool.

use anyhow::Context;

use tallyscan::services::extraction::serve;

/// Serve page tasks from stdin until the dispatcher closes it.
pub async fn cmd_worker() -> anyhow::Result<()> {
    let handled = tokio::task::spawn_blocking(|| {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        serve(stdin.lock(), stdout.lock())
    })
    .await
    .context("worker loop panicked")?
    .context("worker protocol failed")?;

    tracing::debug!("Worker {} exiting after {} pages", std::process::id(), handled);
    Ok(())
}
