use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Field two [`Recipient`]s are compared on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UniqueAttribute {
    #[default]
    Identifier,
    Email,
    PhoneNumber,
}

/// Contact data resolved for one user, stored on the notification record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RecipientProfile {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

impl RecipientProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }
}

/// Addressable target of one channel send.
///
/// Equality and hashing only look at the field selected by
/// `unique_attribute`, so a set of recipients collapses users sharing that
/// address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub identifier: String,
    pub phone_number: String,
    pub email: String,
    pub unique_attribute: UniqueAttribute,
}

impl Recipient {
    pub fn new(
        identifier: impl Into<String>,
        phone_number: impl Into<String>,
        email: impl Into<String>,
        unique_attribute: UniqueAttribute,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            phone_number: phone_number.into(),
            email: email.into(),
            unique_attribute,
        }
    }

    pub fn from_profile(profile: &RecipientProfile, unique_attribute: UniqueAttribute) -> Self {
        Self::new(
            profile.user_id.clone(),
            profile.phone_number.clone().unwrap_or_default(),
            profile.email.clone().unwrap_or_default(),
            unique_attribute,
        )
    }

    fn key(&self) -> &str {
        match self.unique_attribute {
            UniqueAttribute::Identifier => &self.identifier,
            UniqueAttribute::Email => &self.email,
            UniqueAttribute::PhoneNumber => &self.phone_number,
        }
    }
}

impl PartialEq for Recipient {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Recipient {}

impl Hash for Recipient {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Drop duplicates (by each recipient's unique attribute), keeping the
/// first occurrence and the input order.
pub fn clean_recipients(recipients: impl IntoIterator<Item = Recipient>) -> Vec<Recipient> {
    let mut seen = HashSet::new();
    recipients
        .into_iter()
        .filter(|r| seen.insert(r.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_uses_unique_attribute_only() {
        let a = Recipient::new("1", "+38640111222", "ana@example.com", UniqueAttribute::Email);
        let b = Recipient::new("2", "", "ana@example.com", UniqueAttribute::Email);
        assert_eq!(a, b);

        let a = Recipient::new("1", "", "ana@example.com", UniqueAttribute::Identifier);
        let b = Recipient::new("2", "", "ana@example.com", UniqueAttribute::Identifier);
        assert_ne!(a, b);
    }

    #[test]
    fn test_clean_recipients_collapses_same_email() {
        let cleaned = clean_recipients(vec![
            Recipient::new("1", "", "ana@example.com", UniqueAttribute::Email),
            Recipient::new("2", "", "ana@example.com", UniqueAttribute::Email),
            Recipient::new("3", "", "bor@example.com", UniqueAttribute::Email),
        ]);

        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].identifier, "1");
        assert_eq!(cleaned[1].identifier, "3");
    }

    #[test]
    fn test_from_profile_defaults_missing_contacts() {
        let profile = RecipientProfile::new("42").with_email("x@example.com");
        let recipient = Recipient::from_profile(&profile, UniqueAttribute::PhoneNumber);
        assert_eq!(recipient.phone_number, "");
        assert_eq!(recipient.email, "x@example.com");
    }
}
