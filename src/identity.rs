use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Display metadata for a platform user. Message records reference users by
/// id only; this is what the rest of the platform knows about them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Lookup from an opaque user id to display metadata. In production this is
/// backed by the platform's user service; the chat core never writes to it.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, user_id: &str) -> anyhow::Result<Option<UserInfo>>;
}

#[derive(Clone, Default)]
pub struct MemoryIdentityResolver {
    inner: Arc<Mutex<HashMap<String, UserInfo>>>,
}

impl MemoryIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: UserInfo) {
        self.inner.lock().await.insert(user.id.clone(), user);
    }
}

#[async_trait]
impl IdentityResolver for MemoryIdentityResolver {
    async fn resolve(&self, user_id: &str) -> anyhow::Result<Option<UserInfo>> {
        Ok(self.inner.lock().await.get(user_id).cloned())
    }
}
