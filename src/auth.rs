use std::sync::Arc;

use tracing::{debug, warn};

use crate::storage::{KeyValueStore, PersistenceError};

pub const TOKEN_KEY: &str = "userToken";
const TOKEN_VALUE: &str = "logged_in";

// Demo credentials; there is no identity provider behind this store.
const VALID_EMAIL: &str = "test@example.com";
const VALID_PASSWORD: &str = "password123";

/// Holds the authenticated flag and mirrors it into the key-value store.
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
    authenticated: bool,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            authenticated: false,
        }
    }

    /// Picks up a marker written by an earlier process. Read failures leave
    /// the session logged out.
    pub async fn restore(&mut self) {
        self.authenticated = match self.store.get(TOKEN_KEY).await {
            Ok(Some(token)) => !token.trim().is_empty(),
            Ok(None) => false,
            Err(error) => {
                warn!(%error, "failed to read auth marker");
                false
            }
        };
        debug!(authenticated = self.authenticated, "auth session restored");
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<bool, PersistenceError> {
        if email != VALID_EMAIL || password != VALID_PASSWORD {
            debug!("login rejected");
            return Ok(false);
        }
        self.store.set(TOKEN_KEY, TOKEN_VALUE).await?;
        self.authenticated = true;
        debug!("login accepted");
        Ok(true)
    }

    pub async fn logout(&mut self) {
        if let Err(error) = self.store.remove(TOKEN_KEY).await {
            warn!(%error, "failed to clear auth marker");
        }
        self.authenticated = false;
    }
}
