use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::attachment::Attachment;

/// Reserved id of the "generating" placeholder.
pub const PLACEHOLDER_ID: &str = "generating";
pub const PLACEHOLDER_TEXT: &str = "Generating response...";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sent_by_user: bool,
    pub is_pending: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

impl Message {
    pub fn user(id: String, text: String, attachment: Option<Attachment>) -> Self {
        Self {
            id,
            text,
            sent_by_user: true,
            is_pending: false,
            attachment,
        }
    }

    pub fn assistant(id: String, text: String) -> Self {
        Self {
            id,
            text,
            sent_by_user: false,
            is_pending: false,
            attachment: None,
        }
    }

    pub fn placeholder() -> Self {
        Self {
            id: PLACEHOLDER_ID.to_string(),
            text: PLACEHOLDER_TEXT.to_string(),
            sent_by_user: false,
            is_pending: true,
            attachment: None,
        }
    }
}

/// Millisecond timestamps, bumped when two ids land in the same millisecond.
#[derive(Debug, Default)]
pub struct MessageIds {
    last: i64,
}

impl MessageIds {
    pub fn next(&mut self) -> String {
        let now = Utc::now().timestamp_millis();
        self.last = now.max(self.last + 1);
        self.last.to_string()
    }
}

/// Messages of the running session, in display order. Never persisted.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Swaps the message with `id` for `replacement`, keeping its slot.
    /// Appends when no message has that id. Returns whether a slot was reused.
    pub fn replace(&mut self, id: &str, replacement: Message) -> bool {
        match self.messages.iter().position(|message| message.id == id) {
            Some(index) => {
                self.messages[index] = replacement;
                true
            }
            None => {
                self.messages.push(replacement);
                false
            }
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
