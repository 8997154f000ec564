//! In-process chat room: one history, one broadcast channel.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::ChatConfig;

const MAX_USERNAME_CHARS: usize = 30;
const MAX_BODY_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Position in the room, starting at 1.
    pub seq: u64,
    pub username: String,
    pub body: String,
    pub sent_at: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("username must be 1 to 30 characters")]
    InvalidUsername,

    #[error("message cannot be empty")]
    EmptyBody,

    #[error("message must be 1000 characters or less")]
    BodyTooLong,
}

struct History {
    messages: VecDeque<ChatMessage>,
    next_seq: u64,
}

pub struct ChatRoom {
    name: String,
    limit: Option<usize>,
    history: Mutex<History>,
    tx: broadcast::Sender<ChatMessage>,
}

/// What a new member receives: everything so far, then the live feed.
pub struct Membership {
    pub history: Vec<ChatMessage>,
    pub live: broadcast::Receiver<ChatMessage>,
}

impl ChatRoom {
    pub fn new(config: &ChatConfig) -> Self {
        let (tx, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            name: config.room.clone(),
            limit: config.history_limit,
            history: Mutex::new(History {
                messages: VecDeque::new(),
                next_seq: 1,
            }),
            tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot and subscribe under the same lock `post` appends under, so
    /// every message lands in exactly one of the two.
    pub fn join(&self) -> Membership {
        let history = self.lock();
        let live = self.tx.subscribe();
        Membership {
            history: history.messages.iter().cloned().collect(),
            live,
        }
    }

    pub fn post(&self, username: &str, body: &str) -> Result<ChatMessage, ChatError> {
        let username = username.trim();
        let body = body.trim();
        let username_len = username.chars().count();
        if username_len == 0 || username_len > MAX_USERNAME_CHARS {
            return Err(ChatError::InvalidUsername);
        }
        if body.is_empty() {
            return Err(ChatError::EmptyBody);
        }
        if body.chars().count() > MAX_BODY_CHARS {
            return Err(ChatError::BodyTooLong);
        }

        let mut history = self.lock();
        let message = ChatMessage {
            seq: history.next_seq,
            username: username.to_string(),
            body: body.to_string(),
            sent_at: Utc::now().to_rfc3339(),
        };
        history.next_seq += 1;
        history.messages.push_back(message.clone());
        if let Some(limit) = self.limit {
            while history.messages.len() > limit {
                history.messages.pop_front();
            }
        }

        // No subscribers is fine; the message is still in history.
        let _ = self.tx.send(message.clone());
        Ok(message)
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.lock().messages.iter().cloned().collect()
    }

    pub fn member_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, History> {
        // A panic while holding the lock cannot leave History half-written.
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }
}
