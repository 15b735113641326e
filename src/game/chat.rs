//! Capped chat history

use std::collections::VecDeque;

use super::color::Color;
use crate::util::time::unix_millis;
use crate::ws::protocol::ServerMsg;

/// Author name of server announcements
pub const SYSTEM_SENDER: &str = "System";

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub from: String,
    pub text: String,
    /// Unix millis
    pub time: u64,
    pub color: Color,
}

impl ChatMessage {
    pub fn new(from: impl Into<String>, text: impl Into<String>, color: Color) -> Self {
        Self {
            from: from.into(),
            text: text.into(),
            time: unix_millis(),
            color,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(SYSTEM_SENDER, text, Color::SYSTEM)
    }

    pub fn to_server_msg(&self) -> ServerMsg {
        ServerMsg::Chat {
            from: self.from.clone(),
            text: self.text.clone(),
            time: self.time,
            color: self.color,
        }
    }
}

/// Ring of the most recent messages; the oldest is evicted past `cap`
#[derive(Debug)]
pub struct ChatLog {
    messages: VecDeque<ChatMessage>,
    cap: usize,
}

impl ChatLog {
    pub fn new(cap: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(cap.min(1024)),
            cap: cap.max(1),
        }
    }

    pub fn push(&mut self, msg: ChatMessage) {
        if self.messages.len() == self.cap {
            self.messages.pop_front();
        }
        self.messages.push_back(msg);
    }

    /// Up to `n` newest messages, oldest first
    pub fn recent(&self, n: usize) -> Vec<ChatMessage> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Cut `text` to at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
