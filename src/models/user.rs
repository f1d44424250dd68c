use serde::{Deserialize, Deserializer, Serialize};

use crate::models::subscription::Subscription;

/// Authenticated user's record as returned by the profile endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(
        rename = "Subscriptions",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub subscriptions: Vec<Subscription>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Subscription>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Subscription>>::deserialize(deserializer)?.unwrap_or_default())
}

impl UserProfile {
    pub fn new(id: String, name: String, email: String) -> Self {
        Self {
            id,
            name,
            email: email.to_lowercase(),
            subscriptions: Vec::new(),
        }
    }
}
