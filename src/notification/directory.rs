//! Lookup of contact data for recipient user ids.

use async_trait::async_trait;
use dashmap::DashMap;

use super::error::Result;
use super::recipient::RecipientProfile;

/// Resolves user identifiers to contact profiles.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// Profiles for the known ids among `user_ids`, in input order.
    async fn resolve(&self, user_ids: &[String]) -> Result<Vec<RecipientProfile>>;
}

/// Directory held in process memory, filled by the HTTP API or at startup.
#[derive(Default)]
pub struct MemoryRecipientDirectory {
    profiles: DashMap<String, RecipientProfile>,
}

impl MemoryRecipientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, profile: RecipientProfile) {
        self.profiles.insert(profile.user_id.clone(), profile);
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl RecipientDirectory for MemoryRecipientDirectory {
    async fn resolve(&self, user_ids: &[String]) -> Result<Vec<RecipientProfile>> {
        let mut profiles = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            match self.profiles.get(user_id) {
                Some(profile) => profiles.push(profile.clone()),
                None => tracing::debug!(user_id = %user_id, "No profile for recipient"),
            }
        }
        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_skips_unknown_users() {
        let directory = MemoryRecipientDirectory::new();
        directory.upsert(RecipientProfile::new("1").with_email("one@example.com"));
        directory.upsert(RecipientProfile::new("2").with_phone("+38640111222"));

        let profiles = directory
            .resolve(&["2".to_string(), "404".to_string(), "1".to_string()])
            .await
            .unwrap();

        let ids: Vec<_> = profiles.iter().map(|p| p.user_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
    }
}
