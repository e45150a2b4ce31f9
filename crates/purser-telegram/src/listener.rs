// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound update loop: long polling, message classification, and
//! error reporting back to the source chat.
//!
//! Every inbound message is classified into exactly one of: a user
//! message from a private chat, an admin message inside the workspace,
//! or noise to be ignored. Routing failures are reported into the chat
//! they came from — a message that cannot be routed is never dropped
//! silently.

use std::sync::Arc;

use purser_core::{MessageId, PurserError, ThreadId, UserId, UserProfile, WorkspaceId};
use purser_router::{InboundAdminMessage, InboundUserMessage, RoutingEngine};
use teloxide::prelude::*;
use teloxide::types::ChatKind;
use tracing::{debug, error, info, warn};

/// What an inbound Telegram message means to the bridge.
#[derive(Debug)]
pub enum Classification {
    User(InboundUserMessage),
    Admin(InboundAdminMessage),
    Ignored,
}

/// Classifies a message against the workspace and admin roster.
///
/// Pure so it can be tested without a live bot: private chats with a
/// sender become user messages; workspace posts from rostered admins
/// become admin messages; everything else (other groups, channel posts,
/// non-admin workspace chatter, non-text admin posts) is ignored.
pub fn classify(msg: &Message, workspace: WorkspaceId, admin_user_ids: &[i64]) -> Classification {
    let Some(from) = msg.from.as_ref() else {
        return Classification::Ignored;
    };
    let sender_id = from.id.0 as i64;

    if msg.chat.id.0 == workspace.0 {
        if !admin_user_ids.contains(&sender_id) {
            debug!(sender_id, "non-admin message in workspace ignored");
            return Classification::Ignored;
        }
        let Some(text) = msg.text() else {
            debug!(msg_id = msg.id.0, "non-text admin message ignored");
            return Classification::Ignored;
        };
        // In forum groups a plain topic message carries a reply to the
        // topic's root service message; that reference resolves to no
        // stored copy, so stage-1 lookup misses and thread-identity
        // fallback takes over.
        return Classification::Admin(InboundAdminMessage {
            sender_id: UserId(sender_id),
            message_id: MessageId(msg.id.0 as i64),
            thread_id: msg.thread_id.map(|t| ThreadId(t.0 .0 as i64)),
            reply_to: msg.reply_to_message().map(|m| MessageId(m.id.0 as i64)),
            text: text.to_string(),
        });
    }

    if matches!(msg.chat.kind, ChatKind::Private(_)) {
        return Classification::User(InboundUserMessage {
            user_id: UserId(sender_id),
            profile: UserProfile {
                username: from.username.clone(),
                first_name: from.first_name.clone(),
                last_name: from.last_name.clone(),
            },
            message_id: MessageId(msg.id.0 as i64),
        });
    }

    debug!(chat_id = msg.chat.id.0, "message outside workspace and DMs ignored");
    Classification::Ignored
}

/// Long-polling inbound loop feeding the routing engine.
pub struct TelegramListener {
    bot: Bot,
    engine: Arc<RoutingEngine>,
    workspace: WorkspaceId,
    admin_user_ids: Arc<Vec<i64>>,
}

impl TelegramListener {
    pub fn new(
        bot: Bot,
        engine: Arc<RoutingEngine>,
        workspace: WorkspaceId,
        admin_user_ids: Vec<i64>,
    ) -> Self {
        Self {
            bot,
            engine,
            workspace,
            admin_user_ids: Arc::new(admin_user_ids),
        }
    }

    /// Runs the dispatcher until the process shuts down.
    pub async fn run(self) {
        let engine = self.engine;
        let workspace = self.workspace;
        let admins = self.admin_user_ids;

        info!(workspace = workspace.0, "starting Telegram long polling");

        let handler = Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
            let engine = Arc::clone(&engine);
            let admins = Arc::clone(&admins);
            async move {
                match classify(&msg, workspace, &admins) {
                    Classification::User(user_msg) => {
                        handle_user_message(&bot, &engine, &msg, user_msg).await;
                    }
                    Classification::Admin(admin_msg) => {
                        handle_admin_message(&bot, &engine, &msg, admin_msg).await;
                    }
                    Classification::Ignored => {}
                }
                respond(())
            }
        });

        Dispatcher::builder(self.bot, handler)
            .default_handler(|_| async {}) // Silently ignore non-message updates
            .build()
            .dispatch()
            .await;
    }
}

async fn handle_user_message(
    bot: &Bot,
    engine: &RoutingEngine,
    msg: &Message,
    user_msg: InboundUserMessage,
) {
    match engine.route_user_message(&user_msg).await {
        Ok(outcome) => {
            let confirmation = match outcome.remaining_credits {
                Some(remaining) if remaining <= 1 => format!(
                    "Message sent. {remaining} credit{} remaining — top up with /buy to keep the conversation going.",
                    if remaining == 1 { "" } else { "s" }
                ),
                Some(remaining) => format!("Message sent. Credits remaining: {remaining}."),
                None => "Message sent.".to_string(),
            };
            reply_best_effort(bot, msg, &confirmation).await;
        }
        Err(PurserError::InsufficientBalance { .. }) => {
            reply_best_effort(
                bot,
                msg,
                "You need at least 1 credit to send a message. Use /buy to purchase credits.",
            )
            .await;
        }
        Err(PurserError::Validation(reason)) => {
            // Banned users get no feedback channel.
            debug!(user_id = %user_msg.user_id, reason = %reason, "user message rejected");
        }
        Err(err) => {
            error!(user_id = %user_msg.user_id, error = %err, "user message routing failed");
            reply_best_effort(
                bot,
                msg,
                "Message delivery failed and your credit was refunded. Please try again.",
            )
            .await;
        }
    }
}

async fn handle_admin_message(
    bot: &Bot,
    engine: &RoutingEngine,
    msg: &Message,
    admin_msg: InboundAdminMessage,
) {
    match engine.route_admin_reply(&admin_msg).await {
        Ok(outcome) => {
            debug!(user_id = %outcome.user_id, "admin reply routed");
        }
        Err(PurserError::RoutingFailure { reason }) => {
            warn!(message_id = %admin_msg.message_id, reason = %reason, "admin reply unroutable");
            reply_best_effort(
                bot,
                msg,
                "Could not route this reply: no user is bound to this context.",
            )
            .await;
        }
        Err(err) => {
            error!(message_id = %admin_msg.message_id, error = %err, "admin reply delivery failed");
            reply_best_effort(bot, msg, &format!("Delivery failed: {err}")).await;
        }
    }
}

/// Replies in the source chat (and thread, for forum messages); failure
/// to report is logged, never escalated.
async fn reply_best_effort(bot: &Bot, source: &Message, text: &str) {
    let mut request = bot.send_message(source.chat.id, text);
    if let Some(thread) = source.thread_id {
        request = request.message_thread_id(thread);
    }
    if let Err(err) = request.await {
        warn!(chat_id = source.chat.id.0, error = %err, "failed to report back to chat");
    }
}
