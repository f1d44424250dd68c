use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::HotelApiConfig;
use crate::error::StoreError;
use crate::models::{
    subscription::{CreateSubscriptionRequest, Subscription, UpdateSubscriptionRequest},
    user::UserProfile,
};
use crate::services::store::SubscriptionStore;

/// JSON client for the hotel REST API's user and subscription endpoints.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: HotelApiConfig,
}

impl ApiClient {
    pub fn new(config: HotelApiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Appends `segments` to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| anyhow!("Invalid hotel API URL {}: {}", self.config.base_url, e))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Hotel API URL {} cannot be a base", self.config.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn profile_url(&self, email: &str) -> Result<Url, StoreError> {
        self.endpoint(&["user", "profile", email])
    }

    fn subscriptions_url(&self) -> Result<Url, StoreError> {
        self.endpoint(&["subscription"])
    }

    fn subscription_url(&self, id: &str) -> Result<Url, StoreError> {
        self.endpoint(&["subscription", id])
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("Accept", "application/json");
        match &self.config.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_json<T: DeserializeOwned>(response: Response, action: &str) -> Result<T, StoreError> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} failed with {}: {}", action, status, error_text).into());
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl SubscriptionStore for ApiClient {
    async fn get_profile(&self, email: &str) -> Result<UserProfile, StoreError> {
        log::debug!("Fetching profile for {}", email);

        let response = self
            .authorize(self.client.get(self.profile_url(email)?))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(email.to_string()));
        }

        Self::read_json(response, "Profile fetch").await
    }

    async fn create_subscription(&self, request: CreateSubscriptionRequest) -> Result<Subscription, StoreError> {
        log::info!("Creating subscription for user {} until {}", request.userid, request.expireson);

        let response = self
            .authorize(self.client.post(self.subscriptions_url()?))
            .json(&request)
            .send()
            .await?;

        Self::read_json(response, "Subscription creation").await
    }

    async fn update_subscription(&self, request: UpdateSubscriptionRequest) -> Result<Subscription, StoreError> {
        log::info!("Updating subscription {} until {}", request.id, request.expireson);

        let response = self
            .authorize(self.client.put(self.subscription_url(&request.id)?))
            .json(&request)
            .send()
            .await?;

        Self::read_json(response, "Subscription update").await
    }
}
