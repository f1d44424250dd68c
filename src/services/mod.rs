pub mod api_client;
pub mod memory_store;
pub mod notifier;
pub mod store;
