use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{
    subscription::{CreateSubscriptionRequest, Subscription, UpdateSubscriptionRequest},
    user::UserProfile,
};

/// Remote owner of user profiles and subscription records.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Profile of the user with every subscription record they ever held.
    async fn get_profile(&self, email: &str) -> Result<UserProfile, StoreError>;

    async fn create_subscription(&self, request: CreateSubscriptionRequest) -> Result<Subscription, StoreError>;

    async fn update_subscription(&self, request: UpdateSubscriptionRequest) -> Result<Subscription, StoreError>;
}
