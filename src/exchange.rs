//! Optimistic send/receive cycle.
//!
//! A submit appends the user's message and a pending placeholder before any
//! network I/O, then swaps the placeholder for the reply (or for a fixed
//! apology when the request fails). Only one exchange may be outstanding.

use tracing::{debug, error, warn};

use crate::attachment::{self, Attachment, AttachmentError};
use crate::completion::{CompletionClient, RemoteError};
use crate::conversation::{Conversation, Message, MessageIds, PLACEHOLDER_ID};

pub const FALLBACK_REPLY: &str = "Sorry, something went wrong. Please try again.";

#[derive(Debug, Default)]
pub struct MessageExchange {
    conversation: Conversation,
    ids: MessageIds,
    draft: String,
    staged: Option<Attachment>,
    in_flight: bool,
}

impl MessageExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    #[cfg(test)]
    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn staged(&self) -> Option<&Attachment> {
        self.staged.as_ref()
    }

    /// Validates and stages an attachment for the next submit. A rejected
    /// attachment leaves the previous one staged.
    pub fn stage(&mut self, attachment: Attachment) -> Result<(), AttachmentError> {
        attachment::validate(&attachment)?;
        debug!(name = %attachment.display_name, kind = attachment.kind.as_str(), "attachment staged");
        self.staged = Some(attachment);
        Ok(())
    }

    pub fn unstage(&mut self) -> Option<Attachment> {
        self.staged.take()
    }

    pub fn can_submit(&self, text: &str, attachment: Option<&Attachment>) -> bool {
        !self.in_flight && (!text.trim().is_empty() || attachment.is_some())
    }

    /// First phase: records the user message and the placeholder and clears
    /// the compose state. Returns the text to send, or `None` when the submit
    /// is refused. An oversize attachment refuses the submit.
    pub fn begin(&mut self, text: &str, attachment: Option<Attachment>) -> Option<String> {
        if self.in_flight {
            debug!("submit ignored, exchange already in flight");
            return None;
        }
        if !self.can_submit(text, attachment.as_ref()) {
            return None;
        }
        if let Some(Err(err)) = attachment.as_ref().map(attachment::validate) {
            warn!(error = %err, "submit refused, attachment rejected");
            return None;
        }
        let text = text.trim();

        let id = self.ids.next();
        self.conversation
            .push(Message::user(id, text.to_string(), attachment));
        self.conversation.push(Message::placeholder());
        self.draft.clear();
        self.staged = None;
        self.in_flight = true;
        debug!(len = self.conversation.len(), "exchange started");
        Some(text.to_string())
    }

    /// Second phase: settles the placeholder.
    pub fn complete(&mut self, result: Result<String, RemoteError>) {
        if !self.in_flight {
            warn!("completion arrived with no exchange in flight");
            return;
        }
        let text = match result {
            Ok(reply) => reply,
            Err(err) => {
                error!(error = %err, "completion failed");
                FALLBACK_REPLY.to_string()
            }
        };
        let reply = Message::assistant(self.ids.next(), text);
        self.conversation.replace(PLACEHOLDER_ID, reply);
        self.in_flight = false;
        debug!(len = self.conversation.len(), "exchange settled");
    }

    /// Both phases in one call. Returns whether anything was sent.
    pub async fn submit<C>(&mut self, client: &C, text: &str, attachment: Option<Attachment>) -> bool
    where
        C: CompletionClient + ?Sized,
    {
        let Some(outgoing) = self.begin(text, attachment) else {
            return false;
        };
        self.finish(client, &outgoing).await;
        true
    }

    /// Submits the compose draft and staged attachment. Both are left
    /// untouched when the submit is refused. `on_begin` sees the optimistic
    /// transcript before the request goes out.
    pub async fn submit_draft<C>(&mut self, client: &C, on_begin: impl FnOnce(&[Message])) -> bool
    where
        C: CompletionClient + ?Sized,
    {
        let text = self.draft.clone();
        let attachment = self.staged.clone();
        let Some(outgoing) = self.begin(&text, attachment) else {
            return false;
        };
        on_begin(self.messages());
        self.finish(client, &outgoing).await;
        true
    }

    async fn finish<C>(&mut self, client: &C, outgoing: &str)
    where
        C: CompletionClient + ?Sized,
    {
        // The attachment stays local; only the text goes upstream.
        let result = client.send(outgoing).await;
        self.complete(result);
    }

    pub fn clear(&mut self) {
        if self.in_flight {
            warn!("clearing conversation with an exchange in flight");
        }
        self.conversation.clear();
        self.in_flight = false;
    }
}
