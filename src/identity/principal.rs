use serde::{Deserialize, Serialize};

/// Profile of a user signed in through the identity provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    #[serde(default, skip_serializing)]
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

impl UserProfile {
    /// Fill any missing field from `other` (userinfo on top of ID token claims).
    pub fn merge(&mut self, other: UserProfile) {
        if self.sub.is_empty() { self.sub = other.sub; }
        if self.email.is_none() { self.email = other.email; }
        if self.name.is_none() { self.name = other.name; }
        if self.picture.is_none() { self.picture = other.picture; }
    }
}
