use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    subscription::{CreateSubscriptionRequest, Subscription, UpdateSubscriptionRequest},
    user::UserProfile,
};
use crate::services::store::SubscriptionStore;

/// Process-local stand-in for the hotel API, selected with `HOTEL_API_URL=memory://`.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    users: Arc<RwLock<HashMap<String, UserProfile>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user with no subscriptions and returns the stored profile.
    pub async fn add_user(&self, name: &str, email: &str) -> UserProfile {
        let profile = UserProfile::new(Uuid::new_v4().to_string(), name.to_string(), email.to_string());
        self.users
            .write()
            .await
            .insert(profile.email.clone(), profile.clone());
        log::info!("Registered user {} ({})", profile.name, profile.id);
        profile
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn get_profile(&self, email: &str) -> Result<UserProfile, StoreError> {
        self.users
            .read()
            .await
            .get(&email.to_lowercase())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(email.to_string()))
    }

    async fn create_subscription(&self, request: CreateSubscriptionRequest) -> Result<Subscription, StoreError> {
        let mut users = self.users.write().await;
        let user = users
            .values_mut()
            .find(|u| u.id == request.userid)
            .ok_or_else(|| anyhow!("Unknown user {}", request.userid))?;

        let subscription = Subscription {
            id: Uuid::new_v4().to_string(),
            userid: request.userid,
            expireson: request.expireson,
            amountpaid: request.amountpaid,
        };

        // Newest first, matching the hotel API's ordering.
        user.subscriptions.insert(0, subscription.clone());
        Ok(subscription)
    }

    async fn update_subscription(&self, request: UpdateSubscriptionRequest) -> Result<Subscription, StoreError> {
        let mut users = self.users.write().await;
        let subscription = users
            .values_mut()
            .flat_map(|u| u.subscriptions.iter_mut())
            .find(|s| s.id == request.id)
            .ok_or_else(|| anyhow!("Subscription {} not found", request.id))?;

        subscription.expireson = request.expireson;
        subscription.amountpaid = request.amountpaid;
        Ok(subscription.clone())
    }
}
