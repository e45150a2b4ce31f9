// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The messaging surface trait: the seam between routing logic and the
//! concrete chat transport.
//!
//! The routing engine and payment processor are written against this
//! trait; `purser-telegram` provides the production implementation and
//! tests substitute an in-memory fake.

use async_trait::async_trait;

use crate::error::PurserError;
use crate::types::{MessageId, ThreadId, UserId, WorkspaceId};

/// Outbound operations against the chat transport.
///
/// Every method maps to one transport call and returns `Channel` errors
/// for transport failures, so callers can apply their retry policy.
#[async_trait]
pub trait MessagingSurface: Send + Sync {
    /// Allocates a new discussion thread in the workspace and returns its id.
    async fn create_thread(
        &self,
        workspace: WorkspaceId,
        title: &str,
    ) -> Result<ThreadId, PurserError>;

    /// Forwards an existing user message into a workspace thread, returning
    /// the id of the forwarded copy.
    async fn forward_to_thread(
        &self,
        workspace: WorkspaceId,
        thread: ThreadId,
        from_user: UserId,
        message: MessageId,
    ) -> Result<MessageId, PurserError>;

    /// Sends freeform text into a workspace thread.
    async fn deliver_to_thread(
        &self,
        workspace: WorkspaceId,
        thread: ThreadId,
        text: &str,
    ) -> Result<MessageId, PurserError>;

    /// Sends freeform text to a user's direct chat.
    async fn deliver_to_user(&self, user: UserId, text: &str) -> Result<MessageId, PurserError>;

    /// Sends freeform text into the workspace outside any thread. Used for
    /// admin alerts that have no thread to land in.
    async fn deliver_to_workspace(
        &self,
        workspace: WorkspaceId,
        text: &str,
    ) -> Result<MessageId, PurserError>;

    /// Posts a delivery acknowledgment for `message` into its thread.
    /// Callers treat this as best-effort; failure never undoes a delivery.
    async fn acknowledge(
        &self,
        workspace: WorkspaceId,
        thread: ThreadId,
        message: MessageId,
    ) -> Result<(), PurserError>;
}
