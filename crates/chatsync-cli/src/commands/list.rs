//! List command handler

use anyhow::{bail, Context, Result};

use chatsync_core::{Config, Operation, SyncStatus};

use super::{drain_failures, open_session};
use crate::output::Output;
use crate::viewer;

/// Fetch the feed once and print it
pub async fn run(config: &Config, output: &Output) -> Result<()> {
    let (session, mut events) = open_session(config)?;
    let presenter = session.presenter(viewer(config));
    let mut status = session.sync().subscribe_status();

    session.start()?;
    // The loop reaches Running once the first fetch has an outcome
    status
        .wait_for(|s| *s == SyncStatus::Running)
        .await
        .context("Sync loop shut down before the first fetch")?;
    session.stop();

    if session.sync().store().version() == 0 {
        let reason = drain_failures(&mut events)
            .into_iter()
            .find(|report| report.operation == Operation::FetchMessages)
            .map(|report| report.message)
            .unwrap_or_else(|| "no response".to_string());
        bail!("Failed to fetch messages from {}: {}", config.server_url, reason);
    }

    output.print_feed(&presenter);
    Ok(())
}
