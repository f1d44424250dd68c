pub mod config;
pub mod error;
pub mod handlers;
pub mod membership;
pub mod models;
pub mod services;

use actix_web::web;
use std::sync::Arc;
use std::time::Duration;

use config::Config;
use membership::service::MembershipService;
use services::{
    api_client::ApiClient,
    memory_store::InMemoryStore,
    notifier::{HttpNotifier, LogNotifier, Notifier},
    store::SubscriptionStore,
};

/// Wires the subscription store and notifier chosen by configuration.
pub async fn build_membership_service(config: &Config) -> anyhow::Result<MembershipService> {
    let store: Arc<dyn SubscriptionStore> = if config.hotel_api.is_in_memory() {
        log::warn!("HOTEL_API_URL not set to a remote API, using in-memory subscription store");
        let store = InMemoryStore::new();
        for email in &config.hotel_api.seed_users {
            let name = email.split('@').next().unwrap_or(email.as_str());
            store.add_user(name, email).await;
        }
        Arc::new(store)
    } else {
        log::info!("Using hotel API at {}", config.hotel_api.base_url);
        Arc::new(ApiClient::new(config.hotel_api.clone())?)
    };

    let notifier: Arc<dyn Notifier> = match &config.mail.endpoint {
        Some(endpoint) => Arc::new(HttpNotifier::new(
            endpoint.clone(),
            Duration::from_millis(config.mail.timeout_milliseconds),
        )?),
        None => Arc::new(LogNotifier),
    };

    Ok(MembershipService::new(store, notifier, config.membership.selection_policy))
}

/// Routes under `/api/v1`.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::scope("/membership")
                    .service(handlers::membership::list_plans)
                    .service(handlers::membership::purchase_membership)
                    .service(handlers::membership::renew_membership)
                    .service(handlers::membership::quote_price)
                    .service(handlers::membership::get_membership),
            )
            .route("/health", web::get().to(handlers::health::health_check)),
    );
}
