//! Watch command handler
//!
//! Follows the room until `/quit` or Ctrl-C. The feed is reprinted whenever a
//! fetch brings different content; stdin lines are sent as messages. Sends
//! and deletes run as tasks so the loop keeps redrawing while they are out.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::debug;

use chatsync_core::{ChatEvent, ChatPresenter, Config, Message, PresenterError};

use super::open_session;
use crate::output::Output;
use crate::viewer;

/// A line typed at the prompt
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Quit,
    Send(&'a str),
    Delete(&'a str),
    Unknown(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }

    let Some(command) = trimmed.strip_prefix('/') else {
        return Input::Send(line);
    };
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match name {
        "quit" | "q" => Input::Quit,
        "delete" | "rm" if !arg.is_empty() => Input::Delete(arg),
        _ => Input::Unknown(trimmed),
    }
}

/// A mutation handed off to a task
#[derive(Debug, PartialEq, Eq)]
enum Intent {
    Send(String),
    Delete(String),
}

type Pending = JoinSet<Result<(), PresenterError>>;

/// Start a mutation without waiting for it
fn dispatch(pending: &mut Pending, presenter: &Arc<ChatPresenter>, intent: Intent) {
    let presenter = Arc::clone(presenter);
    pending.spawn(async move {
        match intent {
            Intent::Send(text) => presenter.submit(&text).await.map(|_| ()),
            Intent::Delete(id) => presenter.request_delete(&id).await,
        }
    });
}

fn report_joined(
    output: &Output,
    joined: Result<Result<(), PresenterError>, tokio::task::JoinError>,
) {
    match joined {
        Ok(result) => warn_unreported(output, result),
        Err(e) => output.warn(&format!("Mutation task failed: {}", e)),
    }
}

/// Follow the feed and send stdin lines
pub async fn run(config: &Config, output: &Output) -> Result<()> {
    let (session, mut events) = open_session(config)?;
    let presenter = Arc::new(session.presenter(viewer(config)));
    let mut view = session.sync().store();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    session.start()?;
    output.message(&format!(
        "Watching {} (type to send, /delete <id>, /quit)",
        config.server_url
    ));
    output.print_feed(&presenter);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut shown: Option<Arc<[Message]>> = None;
    let mut stdin_open = true;
    let mut pending = Pending::new();

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                pending.abort_all();
                break;
            }
            snapshot = view.changed() => {
                let Some(snapshot) = snapshot else { break };
                if shown.as_deref() != Some(&*snapshot.messages) {
                    output.print_feed(&presenter);
                    shown = Some(snapshot.messages);
                }
            }
            Some(joined) = pending.join_next(), if !pending.is_empty() => {
                report_joined(output, joined);
            }
            Some(event) = events.recv() => {
                if let ChatEvent::Failure(report) = event {
                    output.print_failure(&report);
                }
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    // Keep following the feed with stdin closed
                    debug!("stdin closed");
                    stdin_open = false;
                    continue;
                };
                match parse_input(&line) {
                    Input::Empty => {}
                    Input::Quit => {
                        // Let sends already typed reach the server
                        while let Some(joined) = pending.join_next().await {
                            report_joined(output, joined);
                        }
                        break;
                    }
                    Input::Send(text) => {
                        dispatch(&mut pending, &presenter, Intent::Send(text.to_string()));
                    }
                    Input::Delete(id) => {
                        dispatch(&mut pending, &presenter, Intent::Delete(id.to_string()));
                    }
                    Input::Unknown(command) => {
                        output.warn(&format!("Unknown command: {}", command));
                    }
                }
            }
        }
    }

    session.stop();
    Ok(())
}

/// Print errors that never reach the event channel
///
/// Transport failures are reported there and printed by the event branch.
fn warn_unreported(output: &Output, result: Result<(), PresenterError>) {
    match result {
        Ok(()) => {}
        Err(PresenterError::Mutation(err)) if err.transport_error().is_some() => {}
        Err(err) => output.warn(&err.to_string()),
    }
}
