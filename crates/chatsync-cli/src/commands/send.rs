//! Send command handler

use anyhow::{Context, Result};

use chatsync_core::{Config, SendOutcome};

use super::open_session;
use crate::output::Output;
use crate::viewer;

/// Send one message
pub async fn run(config: &Config, text: &str, output: &Output) -> Result<()> {
    let (session, _events) = open_session(config)?;
    let presenter = session.presenter(viewer(config));

    match presenter.submit(text).await.context("Failed to send message")? {
        SendOutcome::Sent => output.success("Message sent"),
        SendOutcome::Skipped => output.message("Nothing to send (message is blank)"),
    }
    Ok(())
}
