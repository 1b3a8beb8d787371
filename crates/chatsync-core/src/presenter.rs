//! Presentation adapter
//!
//! Turns the store into something a front end can render and forwards user
//! intents to the mutation coordinator. Delete is gated here, on the viewer's
//! role; the coordinator itself performs no authorization.

use std::str::FromStr;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::MutationError;
use crate::models::Message;
use crate::mutation::{MutationCoordinator, SendOutcome};
use crate::sync::SyncHandle;

/// Viewer privilege level
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(format!("Unknown role '{}'. Use 'admin' or 'user'.", other)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::User => f.write_str("user"),
        }
    }
}

/// Who is looking at the feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
    pub username: Option<String>,
    pub role: Role,
}

impl Viewer {
    pub fn new(username: Option<String>, role: Role) -> Self {
        Self { username, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// What the feed area should show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedView {
    /// First fetch has not completed yet
    Loading,
    /// Loaded, no messages
    Empty,
    /// Messages in server order
    Messages(Arc<[Message]>),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PresenterError {
    #[error("Deleting messages requires the admin role (current role: {role})")]
    NotPermitted { role: Role },

    #[error(transparent)]
    Mutation(#[from] MutationError),
}

/// The intents a presenter forwards
pub trait Mutations: Send + Sync {
    fn send<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<SendOutcome, MutationError>>;
    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), MutationError>>;
}

impl Mutations for MutationCoordinator {
    fn send<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<SendOutcome, MutationError>> {
        MutationCoordinator::send(self, text).boxed()
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), MutationError>> {
        MutationCoordinator::delete(self, id).boxed()
    }
}

/// Render model and intent router for one viewer
pub struct ChatPresenter {
    viewer: Viewer,
    mutations: Arc<dyn Mutations>,
    sync: SyncHandle,
}

impl ChatPresenter {
    pub fn new(viewer: Viewer, mutations: Arc<dyn Mutations>, sync: SyncHandle) -> Self {
        Self {
            viewer,
            mutations,
            sync,
        }
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    /// Whether the delete control should be shown
    pub fn can_delete(&self) -> bool {
        self.viewer.is_admin()
    }

    /// Whether a message was written by the viewer
    pub fn is_own(&self, message: &Message) -> bool {
        self.viewer
            .username
            .as_deref()
            .is_some_and(|name| message.is_from(name))
    }

    /// Current feed, distinguishing "not loaded yet" from "empty"
    pub fn feed(&self) -> FeedView {
        if self.sync.is_loading() {
            return FeedView::Loading;
        }
        let messages = self.sync.store().current();
        if messages.is_empty() {
            FeedView::Empty
        } else {
            FeedView::Messages(messages)
        }
    }

    /// Forward a send intent
    pub async fn submit(&self, text: &str) -> Result<SendOutcome, PresenterError> {
        Ok(self.mutations.send(text).await?)
    }

    /// Forward a delete intent, if the viewer may delete
    pub async fn request_delete(&self, id: &str) -> Result<(), PresenterError> {
        if !self.can_delete() {
            debug!(id, role = %self.viewer.role, "delete not permitted for viewer");
            return Err(PresenterError::NotPermitted {
                role: self.viewer.role,
            });
        }
        Ok(self.mutations.delete(id).await?)
    }
}
