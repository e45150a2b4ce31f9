// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The routing engine: user -> admin forwarding and two-stage admin
//! reply resolution.

use std::sync::Arc;

use purser_core::{
    MessageId, MessagingSurface, PurserError, ThreadId, UserId, UserProfile, WorkspaceId,
};
use purser_storage::{ConversationDirectory, LedgerStore, MessageRefRecord, ThreadBinding};
use tracing::{error, info, warn};

/// An inbound message from an end user's direct chat.
#[derive(Debug, Clone)]
pub struct InboundUserMessage {
    pub user_id: UserId,
    pub profile: UserProfile,
    pub message_id: MessageId,
}

/// An inbound message posted by an admin inside the workspace.
#[derive(Debug, Clone)]
pub struct InboundAdminMessage {
    pub sender_id: UserId,
    pub message_id: MessageId,
    /// Thread the message was posted in, if any.
    pub thread_id: Option<ThreadId>,
    /// Message the admin replied to, if reply context was used.
    pub reply_to: Option<MessageId>,
    pub text: String,
}

/// Result of routing a user message into the workspace.
#[derive(Debug, Clone)]
pub struct UserRouteOutcome {
    pub thread_id: ThreadId,
    /// Balance after the per-message debit, when debiting is enabled.
    pub remaining_credits: Option<i64>,
}

/// Result of routing an admin reply back to a user.
#[derive(Debug, Clone)]
pub struct AdminRouteOutcome {
    pub user_id: UserId,
    pub delivered_message: MessageId,
}

/// Bridges user chats and workspace threads over a [`MessagingSurface`].
pub struct RoutingEngine {
    directory: ConversationDirectory,
    ledger: LedgerStore,
    surface: Arc<dyn MessagingSurface>,
    workspace: WorkspaceId,
    debit_per_message: bool,
}

impl RoutingEngine {
    pub fn new(
        directory: ConversationDirectory,
        ledger: LedgerStore,
        surface: Arc<dyn MessagingSurface>,
        workspace: WorkspaceId,
        debit_per_message: bool,
    ) -> Self {
        Self {
            directory,
            ledger,
            surface,
            workspace,
            debit_per_message,
        }
    }

    /// Routes a user message into the user's workspace thread.
    ///
    /// Upserts the user, debits one credit when enabled (surfacing
    /// `InsufficientBalance` untouched), resolves or creates the thread,
    /// forwards the message, and records the message reference for later
    /// reply resolution. A forwarding failure after a debit refunds the
    /// credit before the error propagates.
    pub async fn route_user_message(
        &self,
        msg: &InboundUserMessage,
    ) -> Result<UserRouteOutcome, PurserError> {
        let user = self.ledger.upsert_user(msg.user_id, &msg.profile).await?;
        if user.is_banned {
            return Err(PurserError::Validation(format!(
                "user {} is banned",
                msg.user_id
            )));
        }

        let mut remaining = None;
        if self.debit_per_message {
            let balance = self.ledger.adjust_balance(msg.user_id, -1).await?;
            remaining = Some(balance);
        }

        match self.forward_to_workspace(msg).await {
            Ok(binding) => {
                info!(
                    user_id = %msg.user_id,
                    thread_id = %binding.thread_id,
                    "user message forwarded"
                );
                Ok(UserRouteOutcome {
                    thread_id: binding.thread_id,
                    remaining_credits: remaining,
                })
            }
            Err(err) => {
                if remaining.is_some() {
                    // Compensate the debit; the message never reached the
                    // workspace.
                    if let Err(refund_err) = self.ledger.adjust_balance(msg.user_id, 1).await {
                        error!(
                            user_id = %msg.user_id,
                            error = %refund_err,
                            "failed to refund credit after forwarding failure"
                        );
                    }
                }
                Err(err)
            }
        }
    }

    async fn forward_to_workspace(
        &self,
        msg: &InboundUserMessage,
    ) -> Result<ThreadBinding, PurserError> {
        let surface = Arc::clone(&self.surface);
        let workspace = self.workspace;
        let title = thread_title(msg.user_id, &msg.profile);

        let binding = self
            .directory
            .get_or_create_thread(msg.user_id, workspace, || {
                let surface = Arc::clone(&surface);
                let title = title.clone();
                async move { surface.create_thread(workspace, &title).await }
            })
            .await?;

        if binding.pinned_message_id.is_none() {
            // First traffic on this thread: post the summary card. Losing
            // it costs nothing but the pin, so a failure only logs.
            let card = summary_card(msg.user_id, &msg.profile);
            match self
                .surface
                .deliver_to_thread(workspace, binding.thread_id, &card)
                .await
            {
                Ok(card_id) => {
                    self.directory
                        .set_pinned_message(msg.user_id, workspace, card_id.0)
                        .await?;
                }
                Err(err) => {
                    warn!(thread_id = %binding.thread_id, error = %err, "summary card delivery failed");
                }
            }
        }

        let admin_copy = self
            .surface
            .forward_to_thread(workspace, binding.thread_id, msg.user_id, msg.message_id)
            .await?;

        self.directory
            .record_message_ref(&MessageRefRecord {
                workspace_id: workspace,
                admin_message_id: admin_copy.0,
                user_message_id: msg.message_id.0,
                user_id: msg.user_id,
                thread_id: binding.thread_id,
                created_at: String::new(),
            })
            .await?;
        self.directory.touch(msg.user_id, workspace).await?;

        Ok(binding)
    }

    /// Routes an admin message back to a user via two-stage resolution.
    ///
    /// Stage 1 (direct context): the replied-to message is looked up in
    /// the message references and is authoritative when it resolves.
    /// Stage 2 (thread identity): the containing thread resolves the user
    /// through the directory. When both resolve and disagree, the
    /// disagreement is logged and stage 1 wins. Both failing is a
    /// `RoutingFailure`, never a silent drop.
    ///
    /// Delivery acknowledgment back into the source thread is
    /// best-effort; its failure does not roll back the delivery.
    pub async fn route_admin_reply(
        &self,
        msg: &InboundAdminMessage,
    ) -> Result<AdminRouteOutcome, PurserError> {
        let stage1 = match msg.reply_to {
            Some(reply) => {
                self.directory
                    .resolve_message_ref(self.workspace, reply.0)
                    .await?
            }
            None => None,
        };

        let stage2 = match msg.thread_id {
            Some(thread) => match self
                .directory
                .resolve_user_for_thread(self.workspace, thread)
                .await
            {
                Ok(user) => Some((user, thread)),
                Err(PurserError::NotFound { .. }) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };

        let (user_id, thread_id) = match (stage1, stage2) {
            (Some(reference), Some((stage2_user, _))) => {
                if reference.user_id != stage2_user {
                    warn!(
                        stage1_user = %reference.user_id,
                        stage2_user = %stage2_user,
                        message_id = %msg.message_id,
                        "reply resolution stages disagree, using direct context"
                    );
                }
                (reference.user_id, reference.thread_id)
            }
            (Some(reference), None) => (reference.user_id, reference.thread_id),
            (None, Some((user, thread))) => (user, thread),
            (None, None) => {
                return Err(PurserError::RoutingFailure {
                    reason: format!(
                        "admin message {} has no resolvable reply context or thread binding",
                        msg.message_id
                    ),
                });
            }
        };

        let delivered = self.surface.deliver_to_user(user_id, &msg.text).await?;
        info!(user_id = %user_id, admin = %msg.sender_id, "admin reply delivered");

        let ack_thread = msg.thread_id.unwrap_or(thread_id);
        if let Err(err) = self
            .surface
            .acknowledge(self.workspace, ack_thread, msg.message_id)
            .await
        {
            warn!(
                thread_id = %ack_thread,
                error = %err,
                "delivery acknowledgment failed"
            );
        }

        Ok(AdminRouteOutcome {
            user_id,
            delivered_message: delivered,
        })
    }

    /// Outbound-only dispatch to a user's direct chat. Used by the
    /// payment processor for confirmations.
    pub async fn notify_user(&self, user_id: UserId, text: &str) -> Result<(), PurserError> {
        self.surface.deliver_to_user(user_id, text).await?;
        Ok(())
    }

    /// Outbound-only dispatch to the admin side: lands in the user's
    /// thread when one is open, otherwise in the workspace at large.
    pub async fn notify_workspace(&self, user_id: UserId, text: &str) -> Result<(), PurserError> {
        match self.directory.find_open(user_id, self.workspace).await? {
            Some(binding) => {
                self.surface
                    .deliver_to_thread(self.workspace, binding.thread_id, text)
                    .await?;
            }
            None => {
                self.surface
                    .deliver_to_workspace(self.workspace, text)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Thread title shown in the workspace topic list.
fn thread_title(user_id: UserId, profile: &UserProfile) -> String {
    match &profile.username {
        Some(username) => format!("{} (@{}) - {}", profile.display_name(), username, user_id),
        None => format!("{} - {}", profile.display_name(), user_id),
    }
}

/// Pinned summary card posted when a thread is first created.
fn summary_card(user_id: UserId, profile: &UserProfile) -> String {
    let handle = profile
        .username
        .as_deref()
        .map(|u| format!("@{u}"))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "User: {}\nUsername: {}\nId: {}\nReply to any message in this topic to respond.",
        profile.display_name(),
        handle,
        user_id
    )
}
