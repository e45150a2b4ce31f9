// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram transport for the Purser support bridge.
//!
//! [`TelegramSurface`] implements the outbound [`MessagingSurface`] over
//! the Bot API via teloxide (forum topics as workspace threads);
//! [`listener::TelegramListener`] long-polls for inbound updates and
//! feeds them through the routing engine.

pub mod listener;

use async_trait::async_trait;
use purser_core::{MessageId, MessagingSurface, PurserError, ThreadId, UserId, WorkspaceId};
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, MessageId as TgMessageId, ReplyParameters, ThreadId as TgThreadId,
};

pub use listener::TelegramListener;

/// Outbound Telegram operations for the routing and payment crates.
pub struct TelegramSurface {
    bot: Bot,
}

impl TelegramSurface {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Returns a reference to the underlying teloxide Bot.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

fn tg_thread(thread: ThreadId) -> TgThreadId {
    TgThreadId(TgMessageId(thread.0 as i32))
}

fn channel_err(what: &'static str) -> impl FnOnce(teloxide::RequestError) -> PurserError {
    move |e| PurserError::Channel {
        message: format!("{what}: {e}"),
        source: Some(Box::new(e)),
    }
}

#[async_trait]
impl MessagingSurface for TelegramSurface {
    async fn create_thread(
        &self,
        workspace: WorkspaceId,
        title: &str,
    ) -> Result<ThreadId, PurserError> {
        let topic = self
            .bot
            .create_forum_topic(ChatId(workspace.0), title)
            .await
            .map_err(channel_err("create forum topic"))?;
        Ok(ThreadId(topic.thread_id.0 .0 as i64))
    }

    async fn forward_to_thread(
        &self,
        workspace: WorkspaceId,
        thread: ThreadId,
        from_user: UserId,
        message: MessageId,
    ) -> Result<MessageId, PurserError> {
        let forwarded = self
            .bot
            .forward_message(
                ChatId(workspace.0),
                ChatId(from_user.0),
                TgMessageId(message.0 as i32),
            )
            .message_thread_id(tg_thread(thread))
            .await
            .map_err(channel_err("forward message"))?;
        Ok(MessageId(forwarded.id.0 as i64))
    }

    async fn deliver_to_thread(
        &self,
        workspace: WorkspaceId,
        thread: ThreadId,
        text: &str,
    ) -> Result<MessageId, PurserError> {
        let sent = self
            .bot
            .send_message(ChatId(workspace.0), text)
            .message_thread_id(tg_thread(thread))
            .await
            .map_err(channel_err("send to thread"))?;
        Ok(MessageId(sent.id.0 as i64))
    }

    async fn deliver_to_user(&self, user: UserId, text: &str) -> Result<MessageId, PurserError> {
        let sent = self
            .bot
            .send_message(ChatId(user.0), text)
            .await
            .map_err(channel_err("send to user"))?;
        Ok(MessageId(sent.id.0 as i64))
    }

    async fn deliver_to_workspace(
        &self,
        workspace: WorkspaceId,
        text: &str,
    ) -> Result<MessageId, PurserError> {
        let sent = self
            .bot
            .send_message(ChatId(workspace.0), text)
            .await
            .map_err(channel_err("send to workspace"))?;
        Ok(MessageId(sent.id.0 as i64))
    }

    /// Delivery receipt: a short reply to the acknowledged message in its
    /// thread.
    async fn acknowledge(
        &self,
        workspace: WorkspaceId,
        thread: ThreadId,
        message: MessageId,
    ) -> Result<(), PurserError> {
        self.bot
            .send_message(ChatId(workspace.0), "✓ delivered")
            .message_thread_id(tg_thread(thread))
            .reply_parameters(ReplyParameters::new(TgMessageId(message.0 as i32)))
            .await
            .map_err(channel_err("send delivery receipt"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_id_conversion_round_trips() {
        let thread = ThreadId(4093);
        let tg = tg_thread(thread);
        assert_eq!(tg.0 .0, 4093);
    }
}
