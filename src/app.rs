use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::attachment::{AttachmentError, AttachmentPicker, AttachmentSource};
use crate::auth::CredentialStore;
use crate::completion::CompletionClient;
use crate::conversation::Message;
use crate::exchange::MessageExchange;
use crate::profile::ProfileStore;
use crate::storage::KeyValueStore;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not logged in. Run `chatpad login` first.")]
    NotLoggedIn,
}

/// Everything the session needs, owned in one place and handed to whichever
/// command needs it.
pub struct App {
    pub auth: CredentialStore,
    pub profile: ProfileStore,
    pub exchange: MessageExchange,
    client: Arc<dyn CompletionClient>,
}

impl App {
    /// Restores the persisted session and profile. Load failures fall back
    /// to a logged-out session and the default profile.
    pub async fn open(store: Arc<dyn KeyValueStore>, client: Arc<dyn CompletionClient>) -> Self {
        let mut auth = CredentialStore::new(store.clone());
        auth.restore().await;
        let mut profile = ProfileStore::new(store);
        profile.load().await;
        debug!(authenticated = auth.is_authenticated(), "app state ready");
        Self {
            auth,
            profile,
            exchange: MessageExchange::new(),
            client,
        }
    }

    pub fn require_session(&self) -> Result<(), AppError> {
        if self.auth.is_authenticated() {
            Ok(())
        } else {
            Err(AppError::NotLoggedIn)
        }
    }

    pub async fn send_draft(&mut self, on_begin: impl FnOnce(&[Message])) -> bool {
        self.exchange.submit_draft(self.client.as_ref(), on_begin).await
    }

    /// One-shot send of `text` together with whatever attachment is staged.
    pub async fn ask(&mut self, text: &str) -> bool {
        let attachment = self.exchange.unstage();
        self.exchange.submit(self.client.as_ref(), text, attachment).await
    }

    /// Picks an image or document through `source` and stages it. `Ok(false)`
    /// when the pick was cancelled.
    pub async fn attach<S: AttachmentSource>(
        &mut self,
        source: S,
        document: bool,
    ) -> Result<bool, AttachmentError> {
        let picker = AttachmentPicker::new(source);
        let picked = if document {
            picker.pick_document().await?
        } else {
            picker.pick_image().await?
        };
        match picked {
            Some(attachment) => {
                self.exchange.stage(attachment)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use async_trait::async_trait;

    use super::*;
    use crate::attachment::{PickKind, PickedFile};
    use crate::auth::TOKEN_KEY;
    use crate::completion::RemoteError;
    use crate::profile::PROFILE_KEY;
    use crate::storage::memory::MemoryStore;

    struct Echo;

    #[async_trait]
    impl CompletionClient for Echo {
        async fn send(&self, text: &str) -> Result<String, RemoteError> {
            Ok(format!("echo: {text}"))
        }
    }

    struct OneFile(PickedFile);

    #[async_trait]
    impl AttachmentSource for OneFile {
        async fn pick(&self, _kind: PickKind, _accept: &[&str]) -> Result<Option<PickedFile>, io::Error> {
            Ok(Some(self.0.clone()))
        }
    }

    #[tokio::test]
    async fn fresh_app_is_logged_out_with_default_profile() {
        let app = App::open(Arc::new(MemoryStore::default()), Arc::new(Echo)).await;
        assert!(matches!(app.require_session(), Err(AppError::NotLoggedIn)));
        assert_eq!(app.profile.profile().name, "Test User");
    }

    #[tokio::test]
    async fn persisted_state_is_restored() {
        let kv = Arc::new(MemoryStore::with_entry(TOKEN_KEY, "logged_in"));
        kv.set_raw(PROFILE_KEY, r#"{"name":"Lin","email":"lin@example.com"}"#);

        let app = App::open(kv, Arc::new(Echo)).await;
        assert!(app.require_session().is_ok());
        assert_eq!(app.profile.profile().name, "Lin");
    }

    #[tokio::test]
    async fn unreadable_storage_never_blocks_startup() {
        let kv = Arc::new(MemoryStore::with_entry(TOKEN_KEY, "logged_in"));
        kv.fail_reads(true);
        let app = App::open(kv, Arc::new(Echo)).await;
        assert!(app.require_session().is_err());
        assert_eq!(app.profile.profile().email, "test@example.com");
    }

    #[tokio::test]
    async fn staged_attachment_rides_along_with_draft() {
        let mut app = App::open(Arc::new(MemoryStore::default()), Arc::new(Echo)).await;
        let picked = PickedFile {
            uri: "file:///tmp/brief.pdf".to_string(),
            name: Some("brief.pdf".to_string()),
            size_bytes: Some(4096),
            mime_type: Some("application/pdf".to_string()),
        };
        assert!(app.attach(OneFile(picked), true).await.unwrap());

        app.exchange.set_draft("summarize");
        let mut seen = Vec::new();
        assert!(app.send_draft(|messages| seen = messages.to_vec()).await);
        assert_eq!(seen.len(), 2);
        assert!(seen[1].is_pending);

        let messages = app.exchange.messages();
        assert_eq!(messages[0].attachment.as_ref().unwrap().display_name, "brief.pdf");
        assert_eq!(messages[1].text, "echo: summarize");
        assert!(app.exchange.staged().is_none());
    }

    #[tokio::test]
    async fn ask_sends_text_with_staged_attachment() {
        let mut app = App::open(Arc::new(MemoryStore::default()), Arc::new(Echo)).await;
        let picked = PickedFile {
            uri: "file:///tmp/cat.png".to_string(),
            name: None,
            size_bytes: Some(512),
            mime_type: Some("image/png".to_string()),
        };
        assert!(app.attach(OneFile(picked), false).await.unwrap());

        assert!(app.ask("what is this?").await);
        let messages = app.exchange.messages();
        assert_eq!(messages[0].attachment.as_ref().unwrap().display_name, "cat.png");
        assert_eq!(messages[1].text, "echo: what is this?");
        assert!(!app.ask("   ").await);
    }

    #[tokio::test]
    async fn oversize_pick_surfaces_error_and_stages_nothing() {
        let mut app = App::open(Arc::new(MemoryStore::default()), Arc::new(Echo)).await;
        let picked = PickedFile {
            uri: "file:///tmp/huge.jpg".to_string(),
            name: None,
            size_bytes: Some(20 * 1024 * 1024),
            mime_type: Some("image/jpeg".to_string()),
        };
        let err = app.attach(OneFile(picked), false).await.unwrap_err();
        assert_eq!(err.to_string(), "File size exceeds 10 MB limit");
        assert!(app.exchange.staged().is_none());
    }
}
