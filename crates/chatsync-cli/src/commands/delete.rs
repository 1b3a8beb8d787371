//! Delete command handler

use anyhow::{bail, Result};

use chatsync_core::{Config, PresenterError};

use super::open_session;
use crate::output::Output;
use crate::viewer;

/// Delete one message by id
pub async fn run(config: &Config, id: &str, output: &Output) -> Result<()> {
    let (session, _events) = open_session(config)?;
    let presenter = session.presenter(viewer(config));

    match presenter.request_delete(id).await {
        Ok(()) => {
            output.success(&format!("Deleted message {}", id));
            Ok(())
        }
        Err(PresenterError::NotPermitted { role }) => bail!(
            "Deleting messages requires the admin role (current role: {}).\n  \
             chatsync config set role admin",
            role
        ),
        // Already gone on the server: nothing left to do
        Err(PresenterError::Mutation(err)) if err.is_soft() => {
            output.message(&format!("Message {} no longer exists", id));
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
