use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::{KeyValueStore, PersistenceError};

pub const PROFILE_KEY: &str = "user";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, rename = "phoneNumber", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
            avatar: None,
            bio: None,
            phone: None,
        }
    }
}

/// Fields a user may change. Email is not editable. For the optional
/// fields an empty string clears the value.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub phone: Option<String>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.avatar.is_none() && self.bio.is_none() && self.phone.is_none()
    }

    fn apply(self, profile: &UserProfile) -> UserProfile {
        let mut merged = profile.clone();
        if let Some(name) = self.name {
            merged.name = name;
        }
        if let Some(avatar) = self.avatar {
            merged.avatar = non_empty(avatar);
        }
        if let Some(bio) = self.bio {
            merged.bio = non_empty(bio);
        }
        if let Some(phone) = self.phone {
            merged.phone = non_empty(phone);
        }
        merged
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() { None } else { Some(value) }
}

pub struct ProfileStore {
    store: Arc<dyn KeyValueStore>,
    profile: UserProfile,
}

impl ProfileStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            profile: UserProfile::default(),
        }
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    /// Reads the persisted record. Missing or unreadable data falls back to
    /// the default profile.
    pub async fn load(&mut self) -> &UserProfile {
        self.profile = match self.store.get(PROFILE_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(profile) => profile,
                Err(error) => {
                    warn!(%error, "stored profile is not valid json, using default");
                    UserProfile::default()
                }
            },
            Ok(None) => UserProfile::default(),
            Err(error) => {
                warn!(%error, "failed to read stored profile, using default");
                UserProfile::default()
            }
        };
        &self.profile
    }

    /// Merges `patch` and persists the result. The in-memory profile only
    /// changes once the write succeeded.
    pub async fn update(&mut self, patch: ProfilePatch) -> Result<&UserProfile, PersistenceError> {
        let merged = patch.apply(&self.profile);
        let payload = serde_json::to_string(&merged)?;
        self.store.set(PROFILE_KEY, &payload).await?;
        debug!(name = %merged.name, "profile updated");
        self.profile = merged;
        Ok(&self.profile)
    }

    pub async fn set_avatar(&mut self, uri: &str) -> Result<&UserProfile, PersistenceError> {
        self.update(ProfilePatch {
            avatar: Some(uri.to_string()),
            ..ProfilePatch::default()
        })
        .await
    }
}
